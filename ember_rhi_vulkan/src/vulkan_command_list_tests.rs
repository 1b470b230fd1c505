use super::*;

fn copy_source() -> StateAccess {
    StateAccess {
        stage: vk::PipelineStageFlags2::COPY,
        access: vk::AccessFlags2::TRANSFER_READ,
        layout: vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    }
}

fn shader_read() -> StateAccess {
    StateAccess {
        stage: vk::PipelineStageFlags2::COMPUTE_SHADER,
        access: vk::AccessFlags2::SHADER_SAMPLED_READ,
        layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
    }
}

// ============================================================================
// OWNERSHIP SCOPES ACROSS FAMILIES
// ============================================================================

#[test]
fn test_release_across_families_drops_destination_scope() {
    let (src, dst) = ownership_scopes(copy_source(), shader_read(), QueueOp::Release, true);

    assert_eq!(src, copy_source());
    assert_eq!(dst.stage, vk::PipelineStageFlags2::NONE);
    assert_eq!(dst.access, vk::AccessFlags2::NONE);
    assert_eq!(dst.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
}

#[test]
fn test_acquire_across_families_drops_source_scope() {
    let (src, dst) = ownership_scopes(copy_source(), shader_read(), QueueOp::Acquire, true);

    assert_eq!(src.stage, vk::PipelineStageFlags2::NONE);
    assert_eq!(src.access, vk::AccessFlags2::NONE);
    assert_eq!(src.layout, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
    assert_eq!(dst, shader_read());
}

// ============================================================================
// OWNERSHIP SCOPES WITHIN ONE FAMILY
// ============================================================================

#[test]
fn test_release_within_family_keeps_both_scopes() {
    let (src, dst) = ownership_scopes(copy_source(), shader_read(), QueueOp::Release, false);

    assert_eq!(src, copy_source());
    assert_eq!(dst, shader_read());
}

#[test]
fn test_acquire_within_family_keeps_scopes_without_second_transition() {
    let (src, dst) = ownership_scopes(copy_source(), shader_read(), QueueOp::Acquire, false);

    assert_eq!(src.stage, vk::PipelineStageFlags2::COPY);
    assert_eq!(src.access, vk::AccessFlags2::TRANSFER_READ);
    assert_eq!(src.layout, dst.layout);
    assert_eq!(dst, shader_read());
}

#[test]
fn test_ignored_op_keeps_both_scopes() {
    let (src, dst) = ownership_scopes(copy_source(), shader_read(), QueueOp::Ignored, true);

    assert_eq!(src, copy_source());
    assert_eq!(dst, shader_read());
}
