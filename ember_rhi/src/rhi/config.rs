//! Device configuration

use crate::rhi::adapter::AdapterPreference;

/// Capacity of each descriptor heap, fixed at device creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapCapacities {
    pub rtv: u32,
    pub cbv_srv_uav: u32,
    pub sampler: u32,
}

impl Default for HeapCapacities {
    fn default() -> Self {
        Self {
            rtv: 8,
            cbv_srv_uav: 2048,
            sampler: 128,
        }
    }
}

/// Configuration consumed by the backend and by [`crate::rhi::Device`]
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Application name reported to the driver
    pub app_name: String,

    /// Enable the backend validation layer and debug messenger
    pub enable_validation: bool,

    /// Adapter ordering used during GPU selection
    pub adapter_preference: AdapterPreference,

    /// Use dedicated compute/transfer queues when the adapter exposes them.
    /// When false every queue type resolves to the graphics queue.
    pub async_queues: bool,

    /// Descriptor heap sizes
    pub heap_capacities: HeapCapacities,

    /// Vertical blanks to wait per present (0 = immediate)
    pub present_sync_interval: u32,

    /// Requested swapchain image count
    pub back_buffer_count: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            app_name: "Ember Application".to_string(),
            enable_validation: cfg!(debug_assertions),
            adapter_preference: AdapterPreference::HighPerformance,
            async_queues: true,
            heap_capacities: HeapCapacities::default(),
            present_sync_interval: 1,
            back_buffer_count: 3,
        }
    }
}

impl HeapCapacities {
    pub fn get(&self, kind: crate::rhi::DescriptorHeapKind) -> u32 {
        match kind {
            crate::rhi::DescriptorHeapKind::Rtv => self.rtv,
            crate::rhi::DescriptorHeapKind::CbvSrvUav => self.cbv_srv_uav,
            crate::rhi::DescriptorHeapKind::Sampler => self.sampler,
        }
    }
}
