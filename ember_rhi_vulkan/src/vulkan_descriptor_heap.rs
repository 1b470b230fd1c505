//! Bindless descriptor heaps
//!
//! A shader-visible heap is one update-after-bind descriptor set. The
//! CBV/SRV/UAV heap exposes one array binding per descriptor type, so a heap
//! slot is the same array element in every binding:
//!
//! | binding | type           |
//! |---------|----------------|
//! | 0       | UNIFORM_BUFFER |
//! | 1       | STORAGE_BUFFER |
//! | 2       | SAMPLED_IMAGE  |
//! | 3       | STORAGE_IMAGE  |
//!
//! The sampler heap is a single SAMPLER array at binding 0. Render target
//! views have no descriptor in Vulkan, so the RTV heap only exists on the
//! RHI side.

use ash::vk;
use ember_rhi::ember::rhi::backend::{DescriptorView, NativeDescriptorHeap};
use ember_rhi::ember::rhi::{DescriptorHeapKind, ResourceState};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_debug, ember_err};
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::vk_buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_format::state_to_vk;
use crate::vulkan_texture::vk_texture;

pub(crate) const CBV_BINDING: u32 = 0;
pub(crate) const BUFFER_BINDING: u32 = 1;
pub(crate) const TEXTURE_BINDING: u32 = 2;
pub(crate) const RW_TEXTURE_BINDING: u32 = 3;
pub(crate) const SAMPLER_BINDING: u32 = 0;

/// Device caps for update-after-bind descriptor arrays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindlessLimits {
    pub uniform_buffers: u32,
    pub storage_buffers: u32,
    pub sampled_images: u32,
    pub storage_images: u32,
    pub samplers: u32,
    /// `descriptorBindingUniformBufferUpdateAfterBind`
    pub uniform_buffer_update_after_bind: bool,
}

impl BindlessLimits {
    pub(crate) fn from_properties(
        properties: &vk::PhysicalDeviceDescriptorIndexingProperties<'_>,
        limits: &vk::PhysicalDeviceLimits,
        uniform_buffer_update_after_bind: bool,
    ) -> Self {
        Self {
            uniform_buffers: if uniform_buffer_update_after_bind {
                properties.max_per_stage_descriptor_update_after_bind_uniform_buffers
            } else {
                limits.max_per_stage_descriptor_uniform_buffers
            },
            storage_buffers: properties.max_per_stage_descriptor_update_after_bind_storage_buffers,
            sampled_images: properties.max_per_stage_descriptor_update_after_bind_sampled_images,
            storage_images: properties.max_per_stage_descriptor_update_after_bind_storage_images,
            samplers: properties.max_per_stage_descriptor_update_after_bind_samplers,
            uniform_buffer_update_after_bind,
        }
    }
}

pub struct VulkanDescriptorHeap {
    ctx: Arc<GpuContext>,
    pub(crate) kind: DescriptorHeapKind,
    pub(crate) layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    pub(crate) set: vk::DescriptorSet,
    /// Array length of each binding (capacity clamped to the device caps)
    binding_counts: Vec<u32>,
    /// `vkUpdateDescriptorSets` needs the set externally synchronized
    write_lock: Mutex<()>,
}

impl VulkanDescriptorHeap {
    pub(crate) fn new(ctx: Arc<GpuContext>, kind: DescriptorHeapKind, capacity: u32) -> Result<Self> {
        if !kind.is_shader_visible() {
            return Ok(Self {
                ctx,
                kind,
                layout: vk::DescriptorSetLayout::null(),
                pool: vk::DescriptorPool::null(),
                set: vk::DescriptorSet::null(),
                binding_counts: Vec::new(),
                write_lock: Mutex::new(()),
            });
        }

        let limits = ctx.bindless_limits;
        let bindings: Vec<(vk::DescriptorType, u32, bool)> = match kind {
            DescriptorHeapKind::Sampler => vec![(vk::DescriptorType::SAMPLER, limits.samplers, true)],
            _ => vec![
                (
                    vk::DescriptorType::UNIFORM_BUFFER,
                    limits.uniform_buffers,
                    limits.uniform_buffer_update_after_bind,
                ),
                (vk::DescriptorType::STORAGE_BUFFER, limits.storage_buffers, true),
                (vk::DescriptorType::SAMPLED_IMAGE, limits.sampled_images, true),
                (vk::DescriptorType::STORAGE_IMAGE, limits.storage_images, true),
            ],
        };

        let binding_counts: Vec<u32> = bindings
            .iter()
            .map(|&(ty, limit, _)| {
                let count = capacity.min(limit).max(1);
                if count < capacity {
                    ember_debug!(
                        "ember::vulkan",
                        "{:?} heap: {:?} array clamped to {} (device limit)",
                        kind,
                        ty,
                        count
                    );
                }
                count
            })
            .collect();

        let layout_bindings: Vec<vk::DescriptorSetLayoutBinding> = bindings
            .iter()
            .zip(&binding_counts)
            .enumerate()
            .map(|(i, (&(ty, _, _), &count))| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(i as u32)
                    .descriptor_type(ty)
                    .descriptor_count(count)
                    .stage_flags(vk::ShaderStageFlags::ALL)
            })
            .collect();
        let binding_flags: Vec<vk::DescriptorBindingFlags> = bindings
            .iter()
            .map(|&(_, _, update_after_bind)| {
                if update_after_bind {
                    vk::DescriptorBindingFlags::PARTIALLY_BOUND | vk::DescriptorBindingFlags::UPDATE_AFTER_BIND
                } else {
                    vk::DescriptorBindingFlags::PARTIALLY_BOUND
                }
            })
            .collect();

        let mut flags_info = vk::DescriptorSetLayoutBindingFlagsCreateInfo::default().binding_flags(&binding_flags);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::default()
            .flags(vk::DescriptorSetLayoutCreateFlags::UPDATE_AFTER_BIND_POOL)
            .bindings(&layout_bindings)
            .push_next(&mut flags_info);
        let layout = unsafe { ctx.device.create_descriptor_set_layout(&layout_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create {:?} heap layout: {:?}", kind, e))?;

        let pool_sizes: Vec<vk::DescriptorPoolSize> = bindings
            .iter()
            .zip(&binding_counts)
            .map(|(&(ty, _, _), &count)| vk::DescriptorPoolSize { ty, descriptor_count: count })
            .collect();
        let pool_info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::UPDATE_AFTER_BIND)
            .max_sets(1)
            .pool_sizes(&pool_sizes);

        // Drop destroys the layout and pool if anything below fails
        let mut heap = Self {
            ctx: Arc::clone(&ctx),
            kind,
            layout,
            pool: vk::DescriptorPool::null(),
            set: vk::DescriptorSet::null(),
            binding_counts,
            write_lock: Mutex::new(()),
        };
        heap.pool = unsafe { ctx.device.create_descriptor_pool(&pool_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create {:?} heap pool: {:?}", kind, e))?;

        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(heap.pool)
            .set_layouts(&layouts);
        heap.set = unsafe { ctx.device.allocate_descriptor_sets(&alloc_info) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to allocate {:?} heap set: {:?}", kind, e))?[0];

        ember_debug!("ember::vulkan", "{:?} heap: {} slots per binding", kind, capacity);
        Ok(heap)
    }

    /// Binding a view occupies in a heap of this kind
    fn binding_for(view: &DescriptorView<'_>) -> Option<u32> {
        match view {
            DescriptorView::ConstantBuffer { .. } => Some(CBV_BINDING),
            DescriptorView::ShaderResourceBuffer { .. } | DescriptorView::UnorderedAccessBuffer { .. } => {
                Some(BUFFER_BINDING)
            }
            DescriptorView::ShaderResourceTexture { .. } => Some(TEXTURE_BINDING),
            DescriptorView::UnorderedAccessTexture { .. } => Some(RW_TEXTURE_BINDING),
            DescriptorView::Sampler { .. } => Some(SAMPLER_BINDING),
            DescriptorView::RenderTarget { .. } => None,
        }
    }

    pub(crate) fn write(&self, slot: u32, view: &DescriptorView<'_>) -> Result<()> {
        if view.heap_kind() != self.kind {
            return Err(Error::InvalidState(format!(
                "{:?} view written into the {:?} heap",
                view.heap_kind(),
                self.kind
            )));
        }
        let Some(binding) = Self::binding_for(view) else {
            // Render target views are created when the render pass begins
            return Ok(());
        };
        let count = self.binding_counts.get(binding as usize).copied().unwrap_or(0);
        if slot >= count {
            return Err(Error::InvalidResource(format!(
                "{:?} heap slot {} exceeds the device limit of {}",
                self.kind, slot, count
            )));
        }
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| Error::InvalidState("Descriptor heap lock poisoned".to_string()))?;
        write_view(&self.ctx.device, self.set, binding, slot, view)
    }
}

impl NativeDescriptorHeap for VulkanDescriptorHeap {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn descriptor_stride(&self) -> u32 {
        1
    }

    fn cpu_start(&self) -> u64 {
        0
    }

    fn gpu_start(&self) -> Option<u64> {
        self.kind.is_shader_visible().then_some(0)
    }
}

impl Drop for VulkanDescriptorHeap {
    fn drop(&mut self) {
        unsafe {
            // destroying the pool frees its set
            self.ctx.device.destroy_descriptor_pool(self.pool, None);
            self.ctx.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}

pub(crate) fn vk_heap(heap: &dyn NativeDescriptorHeap) -> Result<&VulkanDescriptorHeap> {
    heap.as_any()
        .downcast_ref::<VulkanDescriptorHeap>()
        .ok_or_else(|| Error::InvalidResource("Descriptor heap was not created by the Vulkan backend".to_string()))
}

/// Descriptor type a view is written as
pub(crate) fn view_descriptor_type(view: &DescriptorView<'_>) -> Option<vk::DescriptorType> {
    match view {
        DescriptorView::ConstantBuffer { .. } => Some(vk::DescriptorType::UNIFORM_BUFFER),
        DescriptorView::ShaderResourceBuffer { .. } | DescriptorView::UnorderedAccessBuffer { .. } => {
            Some(vk::DescriptorType::STORAGE_BUFFER)
        }
        DescriptorView::ShaderResourceTexture { .. } => Some(vk::DescriptorType::SAMPLED_IMAGE),
        DescriptorView::UnorderedAccessTexture { .. } => Some(vk::DescriptorType::STORAGE_IMAGE),
        DescriptorView::Sampler { .. } => Some(vk::DescriptorType::SAMPLER),
        DescriptorView::RenderTarget { .. } => None,
    }
}

/// Write one view into `binding[array_element]` of `set`
pub(crate) fn write_view(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    array_element: u32,
    view: &DescriptorView<'_>,
) -> Result<()> {
    let descriptor_type = view_descriptor_type(view).unwrap_or(vk::DescriptorType::SAMPLER);

    let buffer_info;
    let image_info;
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(array_element)
        .descriptor_type(descriptor_type);

    let write = match *view {
        DescriptorView::ConstantBuffer { buffer, size }
        | DescriptorView::ShaderResourceBuffer { buffer, size, .. }
        | DescriptorView::UnorderedAccessBuffer { buffer, size, .. } => {
            buffer_info = [vk::DescriptorBufferInfo {
                buffer: vk_buffer(buffer),
                offset: 0,
                range: if size == 0 { vk::WHOLE_SIZE } else { size },
            }];
            write.buffer_info(&buffer_info)
        }
        DescriptorView::ShaderResourceTexture { texture } => {
            let texture = vk_texture(texture)
                .ok_or_else(|| Error::InvalidResource("Foreign texture in descriptor".to_string()))?;
            image_info = [vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: texture.view,
                image_layout: state_to_vk(ResourceState::SHADER_RESOURCE, texture.format.is_depth()).layout,
            }];
            write.image_info(&image_info)
        }
        DescriptorView::UnorderedAccessTexture { texture, mip_slice } => {
            let texture = vk_texture(texture)
                .ok_or_else(|| Error::InvalidResource("Foreign texture in descriptor".to_string()))?;
            let view = texture.storage_views.get(mip_slice as usize).copied().ok_or_else(|| {
                Error::InvalidResource(format!("Texture has no storage view for mip {}", mip_slice))
            })?;
            image_info = [vk::DescriptorImageInfo {
                sampler: vk::Sampler::null(),
                image_view: view,
                image_layout: vk::ImageLayout::GENERAL,
            }];
            write.image_info(&image_info)
        }
        DescriptorView::Sampler { sampler } => {
            let sampler = crate::vulkan_texture::vk_sampler(sampler)?;
            image_info = [vk::DescriptorImageInfo {
                sampler: sampler.sampler,
                image_view: vk::ImageView::null(),
                image_layout: vk::ImageLayout::UNDEFINED,
            }];
            write.image_info(&image_info)
        }
        DescriptorView::RenderTarget { .. } => {
            return Err(Error::InvalidState("Render target views cannot be bound to shaders".to_string()));
        }
    };

    unsafe { device.update_descriptor_sets(&[write], &[]) };
    Ok(())
}
