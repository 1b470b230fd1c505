//! Shared GPU context
//!
//! Every native Vulkan object holds an `Arc<GpuContext>`, so the device,
//! the allocator and the instance outlive whatever was created from them.
//! The last owner tears everything down in [`GpuContext`]'s `Drop`.

use ash::vk;
use ember_rhi::ember::{Error, Result};
use ember_rhi::ember::rhi::{QueueType, QUEUE_TYPE_COUNT};
use ember_rhi::{ember_err, ember_error, ember_warn};
use crate::vulkan_descriptor_heap::BindlessLimits;
use gpu_allocator::vulkan::Allocator;
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

/// One device queue as seen by a queue type.
///
/// Queue types that fall back to the same family share the handle and the
/// submit lock, since `vkQueueSubmit` needs external synchronization.
#[derive(Clone)]
pub struct VulkanQueue {
    pub handle: vk::Queue,
    pub family: u32,
    pub flags: vk::QueueFlags,
    pub(crate) submit_lock: Arc<Mutex<()>>,
}

/// Shared GPU context for all Vulkan objects
pub struct GpuContext {
    /// Loader entry, kept alive for the instance's function pointers
    pub(crate) entry: ash::Entry,

    pub instance: ash::Instance,

    pub physical_device: vk::PhysicalDevice,

    /// Vulkan logical device
    pub device: ash::Device,

    /// GPU memory allocator.
    /// Wrapped in ManuallyDrop so its memory blocks are freed BEFORE the device is destroyed.
    pub allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Queues indexed by [`QueueType::index`]
    pub queues: [VulkanQueue; QUEUE_TYPE_COUNT],

    /// Command pool for one-shot setup work on the graphics queue
    /// (TRANSIENT + RESET_COMMAND_BUFFER)
    pub(crate) upload_command_pool: Mutex<vk::CommandPool>,

    /// Pools backing reflected descriptor sets, grown when exhausted
    pub(crate) descriptor_pools: Mutex<Vec<vk::DescriptorPool>>,

    pub limits: vk::PhysicalDeviceLimits,

    /// `samplerAnisotropy` was enabled on the device
    pub(crate) sampler_anisotropy: bool,

    /// `fillModeNonSolid` was enabled on the device
    pub(crate) fill_mode_non_solid: bool,

    /// Per-binding caps of the bindless heaps
    pub(crate) bindless_limits: BindlessLimits,

    /// Whether the surface extensions were enabled on the instance
    pub(crate) presentable: bool,

    pub(crate) debug_utils_loader: Option<ash::ext::debug_utils::Instance>,
    pub(crate) debug_utils_device: Option<ash::ext::debug_utils::Device>,
    pub(crate) debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl GpuContext {
    pub fn queue(&self, queue_type: QueueType) -> &VulkanQueue {
        &self.queues[queue_type.index()]
    }

    /// Queue family index serving `queue_type`
    pub fn queue_family(&self, queue_type: QueueType) -> u32 {
        self.queue(queue_type).family
    }

    /// Submit `submits` to the queue of `queue_type` under its submit lock
    pub(crate) fn submit(&self, queue_type: QueueType, submits: &[vk::SubmitInfo2<'_>], fence: vk::Fence) -> Result<()> {
        let queue = self.queue(queue_type);
        let _guard = queue
            .submit_lock
            .lock()
            .map_err(|_| Error::InvalidState(format!("{:?} queue lock poisoned", queue_type)))?;
        unsafe {
            self.device
                .queue_submit2(queue.handle, submits, fence)
                .map_err(|e| ember_err!("ember::vulkan", "Failed to submit to the {:?} queue: {:?}", queue_type, e))
        }
    }

    /// Record with `record` into a throwaway command buffer, submit it to the
    /// graphics queue and block until it completed
    pub(crate) fn submit_one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let pool = self
            .upload_command_pool
            .lock()
            .map_err(|_| Error::InvalidState("Upload command pool lock poisoned".to_string()))?;

        unsafe {
            let alloc_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);
            let command_buffer = self
                .device
                .allocate_command_buffers(&alloc_info)
                .map_err(|e| ember_err!("ember::vulkan", "Failed to allocate upload command buffer: {:?}", e))?[0];

            let result = self.record_and_wait(command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_wait<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(&ash::Device, vk::CommandBuffer),
    {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        self.device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| ember_err!("ember::vulkan", "Failed to begin upload command buffer: {:?}", e))?;
        record(&self.device, command_buffer);
        self.device
            .end_command_buffer(command_buffer)
            .map_err(|e| ember_err!("ember::vulkan", "Failed to end upload command buffer: {:?}", e))?;

        let fence = self
            .device
            .create_fence(&vk::FenceCreateInfo::default(), None)
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create upload fence: {:?}", e))?;

        let command_buffers = [vk::CommandBufferSubmitInfo::default().command_buffer(command_buffer)];
        let submit = vk::SubmitInfo2::default().command_buffer_infos(&command_buffers);
        let result = self.submit(QueueType::Graphics, &[submit], fence).and_then(|_| {
            self.device
                .wait_for_fences(&[fence], true, u64::MAX)
                .map_err(|e| ember_err!("ember::vulkan", "Failed to wait for upload fence: {:?}", e))
        });
        self.device.destroy_fence(fence, None);
        result
    }

    /// Attach `label` to a Vulkan handle for debuggers and validation messages
    pub(crate) fn set_debug_name<H: vk::Handle>(&self, handle: H, label: &str) {
        let Some(debug_utils) = &self.debug_utils_device else {
            return;
        };
        let Ok(name) = CString::new(label) else {
            return;
        };
        let name_info = vk::DebugUtilsObjectNameInfoEXT::default()
            .object_handle(handle)
            .object_name(&name);
        if let Err(e) = unsafe { debug_utils.set_debug_utils_object_name(&name_info) } {
            ember_warn!("ember::vulkan", "Cannot name object '{}': {:?}", label, e);
        }
    }
}

impl Drop for GpuContext {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                ember_error!("ember::vulkan", "device_wait_idle failed during shutdown: {:?}", e);
            }

            // 1. Context-owned pools
            if let Ok(pool) = self.upload_command_pool.get_mut() {
                self.device.destroy_command_pool(*pool, None);
            }
            if let Ok(pools) = self.descriptor_pools.get_mut() {
                for &pool in pools.iter() {
                    self.device.destroy_descriptor_pool(pool, None);
                }
            }

            // 2. Free the allocator's memory blocks while the device is alive
            ManuallyDrop::drop(&mut self.allocator);

            // 3. Stop routing validation messages before the messenger goes away
            crate::debug::cleanup_debug_config();
            if let (Some(debug_utils), Some(messenger)) = (&self.debug_utils_loader, self.debug_messenger) {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }

            // 4. Device, then instance
            self.device.destroy_device(None);
            self.instance.destroy_instance(None);
        }
    }
}
