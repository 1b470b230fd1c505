//! Timeline semaphore fences

use ash::vk;
use ember_rhi::ember::rhi::backend::NativeFence;
use ember_rhi::ember::{Error, Result};
use ember_rhi::ember_err;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Monotonic fence backed by a timeline semaphore
pub struct VulkanFence {
    ctx: Arc<GpuContext>,
    pub(crate) semaphore: vk::Semaphore,
}

impl VulkanFence {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Result<Self> {
        let mut type_info = vk::SemaphoreTypeCreateInfo::default()
            .semaphore_type(vk::SemaphoreType::TIMELINE)
            .initial_value(0);
        let create_info = vk::SemaphoreCreateInfo::default().push_next(&mut type_info);
        let semaphore = unsafe { ctx.device.create_semaphore(&create_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create timeline semaphore: {:?}", e))?;
        Ok(Self { ctx, semaphore })
    }
}

impl NativeFence for VulkanFence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn completed_value(&self) -> Result<u64> {
        unsafe { self.ctx.device.get_semaphore_counter_value(self.semaphore) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to read timeline semaphore: {:?}", e))
    }

    fn wait(&self, value: u64) -> Result<()> {
        let semaphores = [self.semaphore];
        let values = [value];
        let wait_info = vk::SemaphoreWaitInfo::default()
            .semaphores(&semaphores)
            .values(&values);
        unsafe { self.ctx.device.wait_semaphores(&wait_info, u64::MAX) }.map_err(|e| match e {
            vk::Result::ERROR_DEVICE_LOST => Error::BackendError("Device lost while waiting for a fence".to_string()),
            e => ember_err!("ember::vulkan", "Failed to wait for fence value {}: {:?}", value, e),
        })
    }
}

impl Drop for VulkanFence {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_semaphore(self.semaphore, None);
        }
    }
}

pub(crate) fn vk_fence(fence: &dyn NativeFence) -> Result<&VulkanFence> {
    fence
        .as_any()
        .downcast_ref::<VulkanFence>()
        .ok_or_else(|| Error::InvalidResource("Fence was not created by the Vulkan backend".to_string()))
}
