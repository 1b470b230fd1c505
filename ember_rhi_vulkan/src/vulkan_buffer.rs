//! Vulkan buffers

use ash::vk;
use ember_rhi::ember::rhi::backend::{NativeBuffer, NativeBufferDesc};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_err, ember_error};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{buffer_usage, heap_to_memory_location};

pub struct VulkanBuffer {
    ctx: Arc<GpuContext>,
    pub(crate) buffer: vk::Buffer,
    allocation: Option<Allocation>,
    size: u64,
}

impl VulkanBuffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &NativeBufferDesc<'_>) -> Result<Self> {
        unsafe {
            let buffer_create_info = vk::BufferCreateInfo::default()
                .size(desc.size.max(4))
                .usage(buffer_usage(desc.descriptor_types))
                .sharing_mode(vk::SharingMode::EXCLUSIVE);

            let buffer = ctx
                .device
                .create_buffer(&buffer_create_info, None)
                .map_err(|e| ember_err!("ember::vulkan", "Failed to create buffer '{}' ({} bytes): {:?}", desc.label, desc.size, e))?;

            let requirements = ctx.device.get_buffer_memory_requirements(buffer);
            let allocation = match ctx.allocator.lock() {
                Ok(mut allocator) => allocator.allocate(&AllocationCreateDesc {
                    name: desc.label,
                    requirements,
                    location: heap_to_memory_location(desc.heap),
                    linear: true,
                    allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                }),
                Err(_) => {
                    ctx.device.destroy_buffer(buffer, None);
                    return Err(Error::InvalidState("Allocator lock poisoned".to_string()));
                }
            };
            let allocation = match allocation {
                Ok(allocation) => allocation,
                Err(e) => {
                    ctx.device.destroy_buffer(buffer, None);
                    let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                    ember_error!(
                        "ember::vulkan",
                        "Out of GPU memory for buffer '{}' (required: {:.2} MB): {}",
                        desc.label,
                        size_mb,
                        e
                    );
                    return Err(Error::OutOfMemory);
                }
            };

            // From here on Drop releases both the buffer and its memory
            let vulkan_buffer = Self {
                ctx: Arc::clone(&ctx),
                buffer,
                allocation: Some(allocation),
                size: desc.size,
            };
            if let Some(allocation) = &vulkan_buffer.allocation {
                ctx.device
                    .bind_buffer_memory(buffer, allocation.memory(), allocation.offset())
                    .map_err(|e| ember_err!("ember::vulkan", "Failed to bind buffer memory: {:?}", e))?;
            }
            ctx.set_debug_name(buffer, desc.label);
            Ok(vulkan_buffer)
        }
    }

    fn mapped(&self, offset: u64, len: usize) -> Result<*mut u8> {
        if offset + len as u64 > self.size {
            return Err(Error::InvalidResource(format!(
                "Access {}+{} out of range for a {} byte buffer",
                offset, len, self.size
            )));
        }
        let allocation = self
            .allocation
            .as_ref()
            .ok_or_else(|| ember_err!("ember::vulkan", "Buffer access failed: no GPU allocation"))?;
        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::BackendError("Buffer is not CPU-accessible".to_string()))?;
        Ok(unsafe { (mapped_ptr.as_ptr() as *mut u8).add(offset as usize) })
    }
}

impl NativeBuffer for VulkanBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let dst = self.mapped(offset, data.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len());
        }
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let src = self.mapped(offset, out.len())?;
        unsafe {
            std::ptr::copy_nonoverlapping(src as *const u8, out.as_mut_ptr(), out.len());
        }
        Ok(())
    }
}

impl Drop for VulkanBuffer {
    fn drop(&mut self) {
        unsafe {
            if let Some(allocation) = self.allocation.take() {
                // Don't panic if the lock fails, the buffer still has to go
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}

/// Downcast a backend buffer handed back by the RHI
pub(crate) fn vk_buffer(buffer: &dyn NativeBuffer) -> vk::Buffer {
    match buffer.as_any().downcast_ref::<VulkanBuffer>() {
        Some(buffer) => buffer.buffer,
        None => {
            ember_error!("ember::vulkan", "Buffer was not created by the Vulkan backend");
            vk::Buffer::null()
        }
    }
}
