//! Window surface swapchain
//!
//! Images are acquired with a fence, so `acquire_next_image` returns once the
//! image can be written. Presenting signals a per-image semaphore from the
//! graphics queue after everything submitted so far, and the present waits
//! on it.

use ash::vk;
use ember_rhi::ember::rhi::backend::{NativeSwapChain, NativeTexture, SwapChainDesc};
use ember_rhi::ember::rhi::{QueueType, TextureFormat};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_debug, ember_err, ember_error, ember_info};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{present_mode_for, texture_format_to_vk, vk_to_texture_format};
use crate::vulkan_texture::VulkanTexture;

pub struct VulkanSwapChain {
    ctx: Arc<GpuContext>,
    surface_loader: ash::khr::surface::Instance,
    swapchain_loader: ash::khr::swapchain::Device,
    surface: vk::SurfaceKHR,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    views: Vec<vk::ImageView>,
    format: TextureFormat,
    surface_format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
    desired_image_count: u32,
    acquire_fence: vk::Fence,
    /// One per image, signalled before presenting it
    render_finished: Vec<vk::Semaphore>,
    current: u32,
}

impl VulkanSwapChain {
    /// Take ownership of `surface` and build a swapchain on it
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        surface_loader: ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
        desc: &SwapChainDesc,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);
        let acquire_fence = unsafe { ctx.device.create_fence(&vk::FenceCreateInfo::default(), None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create acquire fence: {:?}", e));
        let acquire_fence = match acquire_fence {
            Ok(fence) => fence,
            Err(e) => {
                unsafe { surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        // Drop releases the surface and fence if anything below fails
        let mut swap_chain = Self {
            ctx: Arc::clone(&ctx),
            surface_loader,
            swapchain_loader,
            surface,
            swapchain: vk::SwapchainKHR::null(),
            images: Vec::new(),
            views: Vec::new(),
            format: desc.format,
            surface_format: vk::SurfaceFormatKHR::default(),
            extent: vk::Extent2D::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            desired_image_count: desc.back_buffer_count,
            acquire_fence,
            render_finished: Vec::new(),
            current: 0,
        };

        let graphics_family = ctx.queue_family(QueueType::Graphics);
        let supported = unsafe {
            swap_chain
                .surface_loader
                .get_physical_device_surface_support(ctx.physical_device, graphics_family, surface)
        }
        .map_err(|e| ember_err!("ember::vulkan", "Failed to query present support: {:?}", e))?;
        if !supported {
            return Err(Error::InitializationFailed(format!(
                "Queue family {} cannot present to this surface",
                graphics_family
            )));
        }

        swap_chain.surface_format = swap_chain.choose_surface_format(desc.format)?;
        swap_chain.format = vk_to_texture_format(swap_chain.surface_format.format).unwrap_or(desc.format);
        let present_modes = unsafe {
            swap_chain
                .surface_loader
                .get_physical_device_surface_present_modes(ctx.physical_device, surface)
        }
        .map_err(|e| ember_err!("ember::vulkan", "Failed to query present modes: {:?}", e))?;
        swap_chain.present_mode = present_mode_for(desc.sync_interval, &present_modes);

        swap_chain.build(desc.width, desc.height)?;
        ember_info!(
            "ember::vulkan",
            "Swapchain {}x{} {:?} {:?}, {} images",
            swap_chain.extent.width,
            swap_chain.extent.height,
            swap_chain.surface_format.format,
            swap_chain.present_mode,
            swap_chain.images.len()
        );
        Ok(swap_chain)
    }

    fn choose_surface_format(&self, requested: TextureFormat) -> Result<vk::SurfaceFormatKHR> {
        let formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(self.ctx.physical_device, self.surface)
        }
        .map_err(|e| ember_err!("ember::vulkan", "Failed to query surface formats: {:?}", e))?;

        let wanted = texture_format_to_vk(requested);
        formats
            .iter()
            .find(|f| f.format == wanted)
            .or_else(|| formats.iter().find(|f| vk_to_texture_format(f.format).is_some()))
            .copied()
            .ok_or_else(|| Error::InitializationFailed("Surface offers no supported color format".to_string()))
    }

    /// (Re)create the swapchain, its views and semaphores at `width` x `height`
    fn build(&mut self, width: u32, height: u32) -> Result<()> {
        let ctx = Arc::clone(&self.ctx);
        let device = &ctx.device;
        let caps = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(self.ctx.physical_device, self.surface)
        }
        .map_err(|e| ember_err!("ember::vulkan", "Failed to query surface capabilities: {:?}", e))?;

        let extent = if caps.current_extent.width == u32::MAX {
            vk::Extent2D {
                width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
                height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
            }
        } else {
            caps.current_extent
        };
        let mut image_count = self.desired_image_count.max(caps.min_image_count);
        if caps.max_image_count > 0 {
            image_count = image_count.min(caps.max_image_count);
        }

        let old_swapchain = self.swapchain;
        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(
                vk::ImageUsageFlags::COLOR_ATTACHMENT
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::TRANSFER_SRC,
            )
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe { self.swapchain_loader.create_swapchain(&create_info, None) }.map_err(|e| {
            ember_error!("ember::vulkan", "Failed to create swapchain: {:?}", e);
            Error::InitializationFailed(format!("Failed to create swapchain: {:?}", e))
        })?;

        self.destroy_images();
        unsafe { self.swapchain_loader.destroy_swapchain(old_swapchain, None) };
        self.swapchain = swapchain;
        self.extent = extent;
        self.current = 0;

        self.images = unsafe { self.swapchain_loader.get_swapchain_images(swapchain) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to get swapchain images: {:?}", e))?;

        for &image in &self.images {
            let create_info = vk::ImageViewCreateInfo::default()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(self.surface_format.format)
                .components(vk::ComponentMapping {
                    r: vk::ComponentSwizzle::IDENTITY,
                    g: vk::ComponentSwizzle::IDENTITY,
                    b: vk::ComponentSwizzle::IDENTITY,
                    a: vk::ComponentSwizzle::IDENTITY,
                })
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.create_image_view(&create_info, None) }
                .map_err(|e| ember_err!("ember::vulkan", "Failed to create swapchain image view: {:?}", e))?;
            self.views.push(view);

            let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) }
                .map_err(|e| ember_err!("ember::vulkan", "Failed to create render-finished semaphore: {:?}", e))?;
            self.render_finished.push(semaphore);
        }

        self.transition_to_present()
    }

    /// Back buffers start tracked in PRESENT
    fn transition_to_present(&self) -> Result<()> {
        let barriers: Vec<vk::ImageMemoryBarrier2> = self
            .images
            .iter()
            .map(|&image| {
                vk::ImageMemoryBarrier2::default()
                    .src_stage_mask(vk::PipelineStageFlags2::NONE)
                    .src_access_mask(vk::AccessFlags2::NONE)
                    .dst_stage_mask(vk::PipelineStageFlags2::NONE)
                    .dst_access_mask(vk::AccessFlags2::NONE)
                    .old_layout(vk::ImageLayout::UNDEFINED)
                    .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
                    .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
                    .image(image)
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    })
            })
            .collect();
        self.ctx.submit_one_shot(|device, command_buffer| unsafe {
            let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
            device.cmd_pipeline_barrier2(command_buffer, &dependency);
        })
    }

    fn destroy_images(&mut self) {
        unsafe {
            for view in self.views.drain(..) {
                self.ctx.device.destroy_image_view(view, None);
            }
            for semaphore in self.render_finished.drain(..) {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
        }
        self.images.clear();
    }
}

impl NativeSwapChain for VulkanSwapChain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn acquire_next_image(&mut self) -> Result<u32> {
        let device = &self.ctx.device;
        let (index, suboptimal) = unsafe {
            self.swapchain_loader
                .acquire_next_image(self.swapchain, u64::MAX, vk::Semaphore::null(), self.acquire_fence)
        }
        .map_err(|e| match e {
            vk::Result::ERROR_OUT_OF_DATE_KHR => ember_err!("ember::vulkan", "Swapchain out of date during acquire"),
            e => ember_err!("ember::vulkan", "Failed to acquire next swapchain image: {:?}", e),
        })?;
        if suboptimal {
            ember_debug!("ember::vulkan", "Swapchain is suboptimal for the surface");
        }

        unsafe {
            device
                .wait_for_fences(&[self.acquire_fence], true, u64::MAX)
                .and_then(|_| device.reset_fences(&[self.acquire_fence]))
        }
        .map_err(|e| ember_err!("ember::vulkan", "Failed to wait for acquired image: {:?}", e))?;

        self.current = index;
        Ok(index)
    }

    fn present(&mut self, sync_interval: u32) -> Result<()> {
        let expected = present_mode_for(sync_interval, &[self.present_mode]);
        if expected != self.present_mode {
            ember_debug!(
                "ember::vulkan",
                "Sync interval {} ignored, present mode {:?} is fixed at creation",
                sync_interval,
                self.present_mode
            );
        }

        let semaphore = self
            .render_finished
            .get(self.current as usize)
            .copied()
            .ok_or_else(|| Error::InvalidState(format!("No image {} to present", self.current)))?;

        // Orders the present after all graphics work submitted so far
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(semaphore)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let submit = vk::SubmitInfo2::default().signal_semaphore_infos(&signal);
        self.ctx.submit(QueueType::Graphics, &[submit], vk::Fence::null())?;

        let queue = self.ctx.queue(QueueType::Graphics);
        let wait = [semaphore];
        let swapchains = [self.swapchain];
        let indices = [self.current];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait)
            .swapchains(&swapchains)
            .image_indices(&indices);
        let _guard = queue
            .submit_lock
            .lock()
            .map_err(|_| Error::InvalidState("Graphics queue lock poisoned".to_string()))?;
        match unsafe { self.swapchain_loader.queue_present(queue.handle, &present_info) } {
            Ok(false) => Ok(()),
            Ok(true) => {
                ember_debug!("ember::vulkan", "Presented to a suboptimal swapchain");
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                Err(ember_err!("ember::vulkan", "Swapchain out of date during present"))
            }
            Err(e) => Err(ember_err!("ember::vulkan", "Failed to present: {:?}", e)),
        }
    }

    fn image_count(&self) -> u32 {
        self.images.len() as u32
    }

    fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn back_buffer(&self, index: u32) -> Result<Box<dyn NativeTexture>> {
        let (Some(&image), Some(&view)) = (self.images.get(index as usize), self.views.get(index as usize)) else {
            return Err(Error::InvalidResource(format!(
                "Back buffer {} of {}",
                index,
                self.images.len()
            )));
        };
        Ok(Box::new(VulkanTexture::from_swapchain_image(
            Arc::clone(&self.ctx),
            image,
            view,
            self.format,
            self.extent.width,
            self.extent.height,
        )))
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe { self.ctx.device.device_wait_idle() }
            .map_err(|e| ember_err!("ember::vulkan", "device_wait_idle failed before resize: {:?}", e))?;
        self.build(width, height)
    }
}

impl Drop for VulkanSwapChain {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.ctx.device.device_wait_idle() {
                ember_error!("ember::vulkan", "device_wait_idle failed before swapchain teardown: {:?}", e);
            }
        }
        self.destroy_images();
        unsafe {
            self.ctx.device.destroy_fence(self.acquire_fence, None);
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
