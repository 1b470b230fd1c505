//! Vulkan images, image views and samplers

use ash::vk;
use ember_rhi::ember::rhi::backend::{NativeSampler, NativeTexture, NativeTextureDesc};
use ember_rhi::ember::rhi::{DescriptorTypes, ResourceState, SamplerDesc, TextureFormat, TextureType};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_err, ember_error};
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{
    address_mode_to_vk, aspect_mask, filter_to_vk, image_type_to_vk, image_usage, mipmap_mode_to_vk,
    state_to_vk, storage_view_type_to_vk, texture_format_to_vk, view_type_to_vk,
};

/// Vulkan texture
pub struct VulkanTexture {
    ctx: Arc<GpuContext>,
    pub(crate) image: vk::Image,
    /// View over every mip and layer, used for sampling
    pub(crate) view: vk::ImageView,
    /// Mip 0 / layer 0 view for render pass attachments
    pub(crate) attachment_view: vk::ImageView,
    /// One view per mip for storage access
    pub(crate) storage_views: Vec<vk::ImageView>,
    allocation: Option<Allocation>,
    /// Swapchain images belong to the swapchain
    owned: bool,
    pub(crate) format: TextureFormat,
    pub(crate) extent: vk::Extent3D,
    pub(crate) mip_levels: u32,
    pub(crate) array_layers: u32,
}

impl VulkanTexture {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &NativeTextureDesc<'_>) -> Result<Self> {
        let vk_format = texture_format_to_vk(desc.format);
        let depth = if desc.texture_type == TextureType::Tex3D { desc.depth.max(1) } else { 1 };
        let array_layers = if desc.texture_type == TextureType::Tex3D { 1 } else { desc.array_layers };
        let extent = vk::Extent3D {
            width: desc.width,
            height: if desc.texture_type == TextureType::Tex1D { 1 } else { desc.height },
            depth,
        };
        let flags = if desc.texture_type == TextureType::TexCube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };

        let image_info = vk::ImageCreateInfo::default()
            .flags(flags)
            .image_type(image_type_to_vk(desc.texture_type))
            .format(vk_format)
            .extent(extent)
            .mip_levels(desc.mip_levels)
            .array_layers(array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(image_usage(desc.descriptor_types))
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = unsafe { ctx.device.create_image(&image_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create image '{}': {:?}", desc.label, e))?;

        let requirements = unsafe { ctx.device.get_image_memory_requirements(image) };
        let allocation = ctx
            .allocator
            .lock()
            .map_err(|_| Error::InvalidState("Allocator lock poisoned".to_string()))
            .and_then(|mut allocator| {
                allocator
                    .allocate(&AllocationCreateDesc {
                        name: desc.label,
                        requirements,
                        location: MemoryLocation::GpuOnly,
                        linear: false,
                        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
                    })
                    .map_err(|e| {
                        let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                        ember_error!(
                            "ember::vulkan",
                            "Out of GPU memory for image '{}' (required: {:.2} MB): {}",
                            desc.label,
                            size_mb,
                            e
                        );
                        Error::OutOfMemory
                    })
            });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { ctx.device.destroy_image(image, None) };
                return Err(e);
            }
        };

        // Drop cleans up whatever was created past this point
        let mut texture = Self {
            ctx: Arc::clone(&ctx),
            image,
            view: vk::ImageView::null(),
            attachment_view: vk::ImageView::null(),
            storage_views: Vec::new(),
            allocation: Some(allocation),
            owned: true,
            format: desc.format,
            extent,
            mip_levels: desc.mip_levels,
            array_layers,
        };

        if let Some(allocation) = &texture.allocation {
            unsafe { ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()) }
                .map_err(|e| ember_err!("ember::vulkan", "Failed to bind image memory: {:?}", e))?;
        }

        // Sampled views of depth/stencil formats may only expose depth
        let sampled_aspect = if desc.format.is_depth() {
            vk::ImageAspectFlags::DEPTH
        } else {
            vk::ImageAspectFlags::COLOR
        };
        texture.view = texture.create_view(
            view_type_to_vk(desc.texture_type, array_layers),
            sampled_aspect,
            0,
            desc.mip_levels,
            array_layers,
        )?;

        let attachment = DescriptorTypes::COLOR_ATTACHMENT | DescriptorTypes::DEPTH_STENCIL_ATTACHMENT;
        if desc.descriptor_types.intersects(attachment) {
            texture.attachment_view =
                texture.create_view(vk::ImageViewType::TYPE_2D, aspect_mask(desc.format), 0, 1, 1)?;
        }
        if desc.descriptor_types.contains(DescriptorTypes::RW_TEXTURE) {
            let view_type = storage_view_type_to_vk(desc.texture_type, array_layers);
            for mip in 0..desc.mip_levels {
                let view = texture.create_view(view_type, vk::ImageAspectFlags::COLOR, mip, 1, array_layers)?;
                texture.storage_views.push(view);
            }
        }

        ctx.set_debug_name(image, desc.label);
        texture.transition_from_undefined(desc.initial_state)?;
        Ok(texture)
    }

    /// Non-owning wrapper around a swapchain image
    pub(crate) fn from_swapchain_image(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        view: vk::ImageView,
        format: TextureFormat,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            ctx,
            image,
            view,
            attachment_view: view,
            storage_views: Vec::new(),
            allocation: None,
            owned: false,
            format,
            extent: vk::Extent3D { width, height, depth: 1 },
            mip_levels: 1,
            array_layers: 1,
        }
    }

    fn create_view(
        &self,
        view_type: vk::ImageViewType,
        aspect: vk::ImageAspectFlags,
        base_mip: u32,
        mip_count: u32,
        layer_count: u32,
    ) -> Result<vk::ImageView> {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(self.image)
            .view_type(view_type)
            .format(texture_format_to_vk(self.format))
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: aspect,
                base_mip_level: base_mip,
                level_count: mip_count,
                base_array_layer: 0,
                layer_count,
            });
        unsafe { self.ctx.device.create_image_view(&create_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create image view: {:?}", e))
    }

    pub(crate) fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_mask(self.format)
    }

    pub(crate) fn full_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect(),
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// Move a fresh image into the layout of its initial state so the first
    /// tracked transition starts from the right layout
    fn transition_from_undefined(&self, initial_state: ResourceState) -> Result<()> {
        let target = state_to_vk(initial_state, self.format.is_depth());
        if target.layout == vk::ImageLayout::UNDEFINED {
            return Ok(());
        }
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(vk::PipelineStageFlags2::NONE)
            .src_access_mask(vk::AccessFlags2::NONE)
            .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
            .dst_access_mask(vk::AccessFlags2::MEMORY_READ | vk::AccessFlags2::MEMORY_WRITE)
            .old_layout(vk::ImageLayout::UNDEFINED)
            .new_layout(target.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(self.image)
            .subresource_range(self.full_range());
        self.ctx.submit_one_shot(|device, command_buffer| unsafe {
            let barriers = [barrier];
            let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
            device.cmd_pipeline_barrier2(command_buffer, &dependency);
        })
    }
}

impl NativeTexture for VulkanTexture {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanTexture {
    fn drop(&mut self) {
        if !self.owned {
            return;
        }
        unsafe {
            for &view in &self.storage_views {
                self.ctx.device.destroy_image_view(view, None);
            }
            self.ctx.device.destroy_image_view(self.attachment_view, None);
            self.ctx.device.destroy_image_view(self.view, None);

            if let Some(allocation) = self.allocation.take() {
                if let Ok(mut allocator) = self.ctx.allocator.lock() {
                    allocator.free(allocation).ok();
                }
            }
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}

/// Downcast a backend texture handed back by the RHI
pub(crate) fn vk_texture(texture: &dyn NativeTexture) -> Option<&VulkanTexture> {
    let texture = texture.as_any().downcast_ref::<VulkanTexture>();
    if texture.is_none() {
        ember_error!("ember::vulkan", "Texture was not created by the Vulkan backend");
    }
    texture
}

// ============================================================================
// SAMPLER
// ============================================================================

pub struct VulkanSampler {
    ctx: Arc<GpuContext>,
    pub(crate) sampler: vk::Sampler,
}

impl VulkanSampler {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &SamplerDesc) -> Result<Self> {
        let max_anisotropy = (desc.max_anisotropy as f32).min(ctx.limits.max_sampler_anisotropy);
        let anisotropy = ctx.sampler_anisotropy && max_anisotropy > 1.0;

        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(filter_to_vk(desc.mag_filter))
            .min_filter(filter_to_vk(desc.min_filter))
            .mipmap_mode(mipmap_mode_to_vk(desc.mip_filter))
            .address_mode_u(address_mode_to_vk(desc.address_u))
            .address_mode_v(address_mode_to_vk(desc.address_v))
            .address_mode_w(address_mode_to_vk(desc.address_w))
            .mip_lod_bias(desc.mip_lod_bias)
            .anisotropy_enable(anisotropy)
            .max_anisotropy(if anisotropy { max_anisotropy } else { 1.0 })
            .compare_enable(false)
            .min_lod(desc.min_lod)
            .max_lod(desc.max_lod)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .unnormalized_coordinates(false);

        let sampler = unsafe { ctx.device.create_sampler(&create_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create sampler: {:?}", e))?;
        Ok(Self { ctx, sampler })
    }
}

impl NativeSampler for VulkanSampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) fn vk_sampler(sampler: &dyn NativeSampler) -> Result<&VulkanSampler> {
    sampler
        .as_any()
        .downcast_ref::<VulkanSampler>()
        .ok_or_else(|| Error::InvalidResource("Sampler was not created by the Vulkan backend".to_string()))
}

impl Drop for VulkanSampler {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
        }
    }
}
