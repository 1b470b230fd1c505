use super::*;

const GRAPHICS_ALL: vk::QueueFlags = vk::QueueFlags::from_raw(
    vk::QueueFlags::GRAPHICS.as_raw() | vk::QueueFlags::COMPUTE.as_raw() | vk::QueueFlags::TRANSFER.as_raw(),
);
const COMPUTE_TRANSFER: vk::QueueFlags =
    vk::QueueFlags::from_raw(vk::QueueFlags::COMPUTE.as_raw() | vk::QueueFlags::TRANSFER.as_raw());

// ============================================================================
// QUEUE FAMILY SELECTION
// ============================================================================

#[test]
fn test_queue_families_discrete_layout() {
    // Typical discrete GPU: universal, async compute, dedicated copy
    let families = [GRAPHICS_ALL, COMPUTE_TRANSFER, vk::QueueFlags::TRANSFER];
    assert_eq!(select_queue_families(&families, true), Some([0, 1, 2]));
}

#[test]
fn test_queue_families_single_family() {
    let families = [GRAPHICS_ALL];
    assert_eq!(select_queue_families(&families, true), Some([0, 0, 0]));
}

#[test]
fn test_queue_families_transfer_falls_back_to_compute() {
    let families = [GRAPHICS_ALL, COMPUTE_TRANSFER];
    assert_eq!(select_queue_families(&families, true), Some([0, 1, 1]));
}

#[test]
fn test_queue_families_graphics_not_first() {
    let families = [vk::QueueFlags::TRANSFER, GRAPHICS_ALL];
    assert_eq!(select_queue_families(&families, true), Some([1, 1, 0]));
}

#[test]
fn test_queue_families_async_disabled() {
    let families = [GRAPHICS_ALL, COMPUTE_TRANSFER, vk::QueueFlags::TRANSFER];
    assert_eq!(select_queue_families(&families, false), Some([0, 0, 0]));
}

#[test]
fn test_queue_families_without_graphics() {
    let families = [COMPUTE_TRANSFER, vk::QueueFlags::TRANSFER];
    assert_eq!(select_queue_families(&families, true), None);
    assert_eq!(select_queue_families(&[], true), None);
}

// ============================================================================
// ADAPTERS AND FEATURES
// ============================================================================

#[test]
fn test_adapter_kind_mapping() {
    assert_eq!(adapter_kind(vk::PhysicalDeviceType::DISCRETE_GPU), AdapterKind::Discrete);
    assert_eq!(adapter_kind(vk::PhysicalDeviceType::INTEGRATED_GPU), AdapterKind::Integrated);
    assert_eq!(adapter_kind(vk::PhysicalDeviceType::VIRTUAL_GPU), AdapterKind::Virtual);
    assert_eq!(adapter_kind(vk::PhysicalDeviceType::CPU), AdapterKind::Cpu);
    assert_eq!(adapter_kind(vk::PhysicalDeviceType::OTHER), AdapterKind::Other);
}

#[test]
fn test_missing_features_all_supported() {
    let v12 = vk::PhysicalDeviceVulkan12Features::default()
        .timeline_semaphore(true)
        .descriptor_indexing(true)
        .runtime_descriptor_array(true)
        .descriptor_binding_partially_bound(true)
        .descriptor_binding_sampled_image_update_after_bind(true)
        .descriptor_binding_storage_image_update_after_bind(true)
        .descriptor_binding_storage_buffer_update_after_bind(true);
    let v13 = vk::PhysicalDeviceVulkan13Features::default()
        .synchronization2(true)
        .dynamic_rendering(true);
    assert!(missing_features(&v12, &v13).is_empty());
}

#[test]
fn test_missing_features_reports_names() {
    let v12 = vk::PhysicalDeviceVulkan12Features::default().timeline_semaphore(true);
    let v13 = vk::PhysicalDeviceVulkan13Features::default().synchronization2(true);
    let missing = missing_features(&v12, &v13);
    assert!(missing.contains(&"dynamicRendering"));
    assert!(missing.contains(&"descriptorIndexing"));
    assert!(!missing.contains(&"timelineSemaphore"));
    assert!(!missing.contains(&"synchronization2"));
}

// ============================================================================
// HEADLESS BACKEND
// ============================================================================

#[test]
#[ignore] // Requires GPU
fn test_headless_backend_rejects_swap_chain_without_display() {
    let config = DeviceConfig {
        enable_validation: false,
        ..DeviceConfig::default()
    };
    let backend = VulkanBackend::new_headless(&config).expect("headless backend");
    assert!(!backend.context().presentable);
    assert!(!backend.adapter().name.is_empty());
    backend.wait_idle().expect("wait idle");
}
