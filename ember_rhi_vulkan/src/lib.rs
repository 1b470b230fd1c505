/*!
# Ember - Vulkan backend

Vulkan 1.3 implementation of the `ember_rhi` backend traits, built on ash
and gpu-allocator.

```no_run
use std::sync::Arc;
use ember_rhi::ember::rhi::DeviceConfig;
use ember_rhi::ember::Device;
use ember_rhi_vulkan::VulkanBackend;

let config = DeviceConfig::default();
let backend = VulkanBackend::new_headless(&config)?;
let device = Device::new(Arc::new(backend), config)?;
# Ok::<(), ember_rhi::ember::Error>(())
```
*/

mod debug;
mod vulkan;
mod vulkan_buffer;
mod vulkan_command_list;
mod vulkan_context;
mod vulkan_descriptor_heap;
mod vulkan_fence;
mod vulkan_format;
mod vulkan_pipeline;
mod vulkan_shader;
mod vulkan_swapchain;
mod vulkan_texture;

pub use vulkan::VulkanBackend;
pub use vulkan_context::{GpuContext, VulkanQueue};
pub use vulkan_descriptor_heap::BindlessLimits;

pub use debug::{get_validation_stats, print_validation_stats_report, ValidationStats};
