use super::*;

// ============================================================================
// MIP LEVEL COUNT
// ============================================================================

#[test]
fn test_mip_levels_square_power_of_two() {
    assert_eq!(mip_level_count(256, 256, true), 9);
}

#[test]
fn test_mip_levels_disabled_is_one() {
    assert_eq!(mip_level_count(64, 64, false), 1);
    assert_eq!(mip_level_count(4096, 4096, false), 1);
}

#[test]
fn test_mip_levels_use_largest_dimension() {
    // floor(log2(300)) = 8
    assert_eq!(mip_level_count(300, 100, true), 9);
    assert_eq!(mip_level_count(100, 300, true), 9);
}

#[test]
fn test_mip_levels_capped_at_max() {
    assert_eq!(mip_level_count(2048, 2048, true), 12);
    assert_eq!(mip_level_count(8192, 8192, true), MAX_MIP_LEVEL);
    assert_eq!(mip_level_count(u32::MAX, 1, true), MAX_MIP_LEVEL);
}

#[test]
fn test_mip_levels_degenerate_sizes() {
    assert_eq!(mip_level_count(1, 1, true), 1);
    assert_eq!(mip_level_count(0, 0, true), 1);
}

// ============================================================================
// QUEUES AND MEMORY
// ============================================================================

#[test]
fn test_queue_type_indices_are_dense() {
    for (i, queue) in QueueType::ALL.iter().enumerate() {
        assert_eq!(queue.index(), i);
    }
}

#[test]
fn test_memory_flag_heap_types() {
    assert_eq!(MemoryFlag::CpuVisible.heap_type(), HeapType::Upload);
    assert_eq!(MemoryFlag::Dedicated.heap_type(), HeapType::Default);
    assert_eq!(MemoryFlag::GpuToCpu.heap_type(), HeapType::Readback);
    assert!(!MemoryFlag::Dedicated.is_host_visible());
}

// ============================================================================
// FLAGS
// ============================================================================

#[test]
fn test_resource_state_composites() {
    assert!(ResourceState::SHADER_RESOURCE.contains(ResourceState::PIXEL_SHADER_RESOURCE));
    assert!(ResourceState::GENERIC_READ.contains(ResourceState::COPY_SOURCE));
    assert!(!ResourceState::GENERIC_READ.contains(ResourceState::COPY_DEST));
    assert_eq!(ResourceState::GENERIC_READ.bits(), 0xAC3);
}

#[test]
fn test_resource_state_writes() {
    assert!(ResourceState::UNORDERED_ACCESS.is_write());
    assert!(ResourceState::COPY_DEST.is_write());
    assert!(!ResourceState::GENERIC_READ.is_write());
    assert!(!ResourceState::UNDEFINED.is_write());
}

#[test]
fn test_descriptor_type_raw_variants_include_base() {
    assert!(DescriptorTypes::BUFFER_RAW.contains(DescriptorTypes::BUFFER));
    assert!(DescriptorTypes::RW_BUFFER_RAW.contains(DescriptorTypes::RW_BUFFER));
    assert!(DescriptorTypes::TEXTURE_CUBE.contains(DescriptorTypes::TEXTURE));
}

#[test]
fn test_heap_visibility() {
    assert!(!DescriptorHeapKind::Rtv.is_shader_visible());
    assert!(DescriptorHeapKind::CbvSrvUav.is_shader_visible());
    assert!(DescriptorHeapKind::Sampler.is_shader_visible());
}

// ============================================================================
// FORMATS AND SHADERS
// ============================================================================

#[test]
fn test_format_sizes() {
    assert_eq!(TextureFormat::R8G8B8A8_UNORM.bytes_per_pixel(), 4);
    assert_eq!(TextureFormat::R16G16B16A16_FLOAT.bytes_per_pixel(), 8);
    assert_eq!(TextureFormat::R32G32B32A32_FLOAT.bytes_per_pixel(), 16);
    assert!(TextureFormat::D32_FLOAT.is_depth());
    assert!(!TextureFormat::D32_FLOAT.has_stencil());
    assert!(TextureFormat::D24_UNORM_S8_UINT.has_stencil());
}

#[test]
fn test_shader_targets() {
    assert_eq!(ShaderType::Vertex.target(), "vs_6_0");
    assert_eq!(ShaderType::Pixel.target(), "ps_6_0");
    assert_eq!(ShaderType::Compute.target(), "cs_6_0");
    assert_eq!(ShaderType::Compute.pipeline_type(), PipelineType::Compute);
    assert_eq!(ShaderType::Pixel.pipeline_type(), PipelineType::Graphics);
}
