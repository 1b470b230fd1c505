//! Command pools and command buffers
//!
//! A [`VulkanCommandAllocator`] is one command pool; resetting it recycles
//! every command buffer allocated from it. Recording goes straight to the
//! command buffer: barriers use synchronization2 and render passes use
//! dynamic rendering.

use ash::vk;
use ember_rhi::ember::rhi::backend::{
    DescriptorHandle, NativeBuffer, NativeCommandAllocator, NativeCommandList, NativeDescriptorHeap,
    NativeDescriptorSet, NativePipeline, NativeRenderPass, NativeRootSignature, NativeTexture, QueueOwnership,
    ResourceBarrier, TextureCopyRegion,
};
use ember_rhi::ember::rhi::{ClearValue, IndexType, PipelineType, QueueOp, QueueType, Rect, ResourceState, Viewport};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_err, ember_error, ember_trace};
use std::any::Any;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::vk_buffer;
use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_heap::vk_heap;
use crate::vulkan_format::{aspect_mask, index_type_to_vk, restrict_to_queue, state_to_vk, StateAccess};
use crate::vulkan_pipeline::{vk_descriptor_set, vk_root_signature, VulkanPipeline};
use crate::vulkan_texture::{vk_texture, VulkanTexture};

// ============================================================================
// COMMAND ALLOCATOR
// ============================================================================

pub struct VulkanCommandAllocator {
    ctx: Arc<GpuContext>,
    queue_type: QueueType,
    /// Command pools are externally synchronized
    pool: Mutex<vk::CommandPool>,
}

impl VulkanCommandAllocator {
    pub(crate) fn new(ctx: Arc<GpuContext>, queue_type: QueueType) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .queue_family_index(ctx.queue_family(queue_type));
        let pool = unsafe { ctx.device.create_command_pool(&create_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create {:?} command pool: {:?}", queue_type, e))?;
        Ok(Self {
            ctx,
            queue_type,
            pool: Mutex::new(pool),
        })
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let pool = self
            .pool
            .lock()
            .map_err(|_| Error::InvalidState("Command pool lock poisoned".to_string()))?;
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe { self.ctx.device.allocate_command_buffers(&alloc_info) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to allocate command buffer: {:?}", e))?;
        Ok(buffers[0])
    }
}

impl NativeCommandAllocator for VulkanCommandAllocator {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&self) -> Result<()> {
        let pool = self
            .pool
            .lock()
            .map_err(|_| Error::InvalidState("Command pool lock poisoned".to_string()))?;
        unsafe {
            self.ctx
                .device
                .reset_command_pool(*pool, vk::CommandPoolResetFlags::empty())
                .map_err(|e| ember_err!("ember::vulkan", "Failed to reset {:?} command pool: {:?}", self.queue_type, e))
        }
    }
}

impl Drop for VulkanCommandAllocator {
    fn drop(&mut self) {
        // destroying the pool frees every command buffer drawn from it
        if let Ok(pool) = self.pool.get_mut() {
            unsafe {
                self.ctx.device.destroy_command_pool(*pool, None);
            }
        }
    }
}

// ============================================================================
// COMMAND LIST
// ============================================================================

pub struct VulkanCommandList {
    ctx: Arc<GpuContext>,
    pub(crate) command_buffer: vk::CommandBuffer,
    queue_type: QueueType,
    queue_flags: vk::QueueFlags,
}

impl VulkanCommandList {
    pub(crate) fn new(ctx: Arc<GpuContext>, queue_type: QueueType, allocator: &dyn NativeCommandAllocator) -> Result<Self> {
        let allocator = vk_allocator(allocator)?;
        if allocator.queue_type != queue_type {
            return Err(Error::InvalidState(format!(
                "{:?} command list drawn from a {:?} allocator",
                queue_type, allocator.queue_type
            )));
        }
        let command_buffer = allocator.allocate_command_buffer()?;
        let queue_flags = ctx.queue(queue_type).flags;
        Ok(Self {
            ctx,
            command_buffer,
            queue_type,
            queue_flags,
        })
    }

    fn device(&self) -> &ash::Device {
        &self.ctx.device
    }

    fn scope(&self, state: ResourceState, is_depth: bool) -> StateAccess {
        restrict_to_queue(state_to_vk(state, is_depth), self.queue_flags)
    }

    /// Source and destination queue families of an ownership transfer
    fn families(&self, ownership: Option<QueueOwnership>) -> (u32, u32) {
        match ownership {
            Some(o) if o.op != QueueOp::Ignored => {
                let src = self.ctx.queue_family(o.src_queue);
                let dst = self.ctx.queue_family(o.dst_queue);
                if src == dst {
                    (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED)
                } else {
                    (src, dst)
                }
            }
            _ => (vk::QUEUE_FAMILY_IGNORED, vk::QUEUE_FAMILY_IGNORED),
        }
    }

    /// Scopes and queue families of one barrier
    fn barrier_scopes(
        &self,
        before: ResourceState,
        after: ResourceState,
        is_depth: bool,
        ownership: Option<QueueOwnership>,
    ) -> ((StateAccess, StateAccess), (u32, u32)) {
        let src = self.scope(before, is_depth);
        let dst = self.scope(after, is_depth);
        let families = self.families(ownership);
        let scopes = match ownership {
            Some(o) => ownership_scopes(src, dst, o.op, families.0 != families.1),
            None => (src, dst),
        };
        (scopes, families)
    }

    /// Whole-image barrier between two layouts, used around transfer-only helpers
    fn image_transition(
        &self,
        texture: &VulkanTexture,
        range: vk::ImageSubresourceRange,
        from: StateAccess,
        to: StateAccess,
    ) {
        let barrier = vk::ImageMemoryBarrier2::default()
            .src_stage_mask(from.stage)
            .src_access_mask(from.access)
            .dst_stage_mask(to.stage)
            .dst_access_mask(to.access)
            .old_layout(from.layout)
            .new_layout(to.layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(texture.image)
            .subresource_range(range);
        let barriers = [barrier];
        let dependency = vk::DependencyInfo::default().image_memory_barriers(&barriers);
        unsafe { self.device().cmd_pipeline_barrier2(self.command_buffer, &dependency) };
    }

    fn bind_point(pipeline_type: PipelineType) -> vk::PipelineBindPoint {
        match pipeline_type {
            PipelineType::Graphics => vk::PipelineBindPoint::GRAPHICS,
            PipelineType::Compute => vk::PipelineBindPoint::COMPUTE,
        }
    }
}

/// Scopes of one side of an ownership transfer.
///
/// Across two families the release keeps only its source half and the
/// acquire only its destination half. Within one family both sides run on
/// the same queue, so each keeps both halves and the acquire leaves the
/// layout the release already set.
pub(crate) fn ownership_scopes(
    mut src: StateAccess,
    mut dst: StateAccess,
    op: QueueOp,
    crosses_families: bool,
) -> (StateAccess, StateAccess) {
    match (op, crosses_families) {
        (QueueOp::Release, true) => {
            dst.stage = vk::PipelineStageFlags2::NONE;
            dst.access = vk::AccessFlags2::NONE;
        }
        (QueueOp::Acquire, true) => {
            src.stage = vk::PipelineStageFlags2::NONE;
            src.access = vk::AccessFlags2::NONE;
        }
        (QueueOp::Acquire, false) => src.layout = dst.layout,
        _ => {}
    }
    (src, dst)
}

fn transfer_access(write: bool, layout: vk::ImageLayout) -> StateAccess {
    StateAccess {
        stage: vk::PipelineStageFlags2::ALL_TRANSFER,
        access: if write {
            vk::AccessFlags2::TRANSFER_WRITE
        } else {
            vk::AccessFlags2::TRANSFER_READ
        },
        layout,
    }
}

fn is_transfer_layout(layout: vk::ImageLayout, write: bool) -> bool {
    layout == vk::ImageLayout::GENERAL
        || (write && layout == vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        || (!write && layout == vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
}

fn subresource_layers(texture: &VulkanTexture, mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: texture.aspect(),
        mip_level,
        base_array_layer: 0,
        layer_count: texture.array_layers,
    }
}

fn mip_extent(texture: &VulkanTexture, mip: u32) -> vk::Extent3D {
    vk::Extent3D {
        width: (texture.extent.width >> mip).max(1),
        height: (texture.extent.height >> mip).max(1),
        depth: (texture.extent.depth >> mip).max(1),
    }
}

fn mip_offset(extent: vk::Extent3D) -> vk::Offset3D {
    vk::Offset3D {
        x: extent.width as i32,
        y: extent.height as i32,
        z: extent.depth as i32,
    }
}

impl NativeCommandList for VulkanCommandList {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn begin(&mut self, _allocator: &dyn NativeCommandAllocator) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device().begin_command_buffer(self.command_buffer, &begin_info) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to begin {:?} command buffer: {:?}", self.queue_type, e))
    }

    fn close(&mut self) -> Result<()> {
        unsafe { self.device().end_command_buffer(self.command_buffer) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to close {:?} command buffer: {:?}", self.queue_type, e))
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier<'_>]) {
        let mut buffer_barriers = Vec::new();
        let mut image_barriers = Vec::new();

        for barrier in barriers {
            match *barrier {
                ResourceBarrier::Buffer {
                    buffer,
                    before,
                    after,
                    ownership,
                } => {
                    let ((src, dst), (src_family, dst_family)) =
                        self.barrier_scopes(before, after, false, ownership);
                    buffer_barriers.push(
                        vk::BufferMemoryBarrier2::default()
                            .src_stage_mask(src.stage)
                            .src_access_mask(src.access)
                            .dst_stage_mask(dst.stage)
                            .dst_access_mask(dst.access)
                            .src_queue_family_index(src_family)
                            .dst_queue_family_index(dst_family)
                            .buffer(vk_buffer(buffer))
                            .offset(0)
                            .size(vk::WHOLE_SIZE),
                    );
                }
                ResourceBarrier::Texture {
                    texture,
                    before,
                    after,
                    range,
                    ownership,
                } => {
                    let Some(texture) = vk_texture(texture) else {
                        continue;
                    };
                    let is_depth = texture.format.is_depth();
                    let ((src, dst), (src_family, dst_family)) =
                        self.barrier_scopes(before, after, is_depth, ownership);
                    image_barriers.push(
                        vk::ImageMemoryBarrier2::default()
                            .src_stage_mask(src.stage)
                            .src_access_mask(src.access)
                            .dst_stage_mask(dst.stage)
                            .dst_access_mask(dst.access)
                            .old_layout(src.layout)
                            .new_layout(dst.layout)
                            .src_queue_family_index(src_family)
                            .dst_queue_family_index(dst_family)
                            .image(texture.image)
                            .subresource_range(vk::ImageSubresourceRange {
                                aspect_mask: texture.aspect(),
                                base_mip_level: range.base_mip,
                                level_count: range.mip_count,
                                base_array_layer: range.base_layer,
                                layer_count: range.layer_count,
                            }),
                    );
                }
            }
        }

        if buffer_barriers.is_empty() && image_barriers.is_empty() {
            return;
        }
        let dependency = vk::DependencyInfo::default()
            .buffer_memory_barriers(&buffer_barriers)
            .image_memory_barriers(&image_barriers);
        unsafe { self.device().cmd_pipeline_barrier2(self.command_buffer, &dependency) };
        ember_trace!(
            "ember::vulkan",
            "{} buffer / {} image barriers",
            buffer_barriers.len(),
            image_barriers.len()
        );
    }

    fn set_pipeline_state(&mut self, pipeline: &dyn NativePipeline) {
        let Some(pipeline) = pipeline.as_any().downcast_ref::<VulkanPipeline>() else {
            ember_error!("ember::vulkan", "Pipeline was not created by the Vulkan backend");
            return;
        };
        unsafe {
            self.device()
                .cmd_bind_pipeline(self.command_buffer, pipeline.bind_point, pipeline.pipeline)
        };
    }

    fn set_descriptor_heaps(&mut self, _heaps: &[&dyn NativeDescriptorHeap]) {
        // heaps are descriptor sets, bound per table
    }

    fn set_root_descriptor_table(
        &mut self,
        pipeline_type: PipelineType,
        root: &dyn NativeRootSignature,
        root_index: u32,
        heap: &dyn NativeDescriptorHeap,
        _base: DescriptorHandle,
    ) {
        let (Some(root), Ok(heap)) = (vk_root_signature(root), vk_heap(heap)) else {
            ember_error!("ember::vulkan", "Descriptor table bound with foreign objects");
            return;
        };
        if heap.set == vk::DescriptorSet::null() {
            return;
        }
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer,
                Self::bind_point(pipeline_type),
                root.layout,
                root_index,
                &[heap.set],
                &[],
            )
        };
    }

    fn set_root_constants(&mut self, _pipeline_type: PipelineType, root: &dyn NativeRootSignature, offset: u32, data: &[u8]) {
        let Some(root) = vk_root_signature(root) else {
            ember_error!("ember::vulkan", "Root signature was not created by the Vulkan backend");
            return;
        };
        unsafe {
            self.device()
                .cmd_push_constants(self.command_buffer, root.layout, vk::ShaderStageFlags::ALL, offset, data)
        };
    }

    fn bind_descriptor_set(
        &mut self,
        pipeline_type: PipelineType,
        root: &dyn NativeRootSignature,
        set_index: u32,
        set: &dyn NativeDescriptorSet,
    ) {
        let (Some(root), Ok(set)) = (vk_root_signature(root), vk_descriptor_set(set)) else {
            ember_error!("ember::vulkan", "Descriptor set bound with foreign objects");
            return;
        };
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                self.command_buffer,
                Self::bind_point(pipeline_type),
                root.layout,
                set_index,
                &[set.set],
                &[],
            )
        };
    }

    fn copy_buffer_region(
        &mut self,
        dst: &dyn NativeBuffer,
        dst_offset: u64,
        src: &dyn NativeBuffer,
        src_offset: u64,
        size: u64,
    ) {
        let region = vk::BufferCopy {
            src_offset,
            dst_offset,
            size,
        };
        unsafe {
            self.device()
                .cmd_copy_buffer(self.command_buffer, vk_buffer(src), vk_buffer(dst), &[region])
        };
    }

    fn copy_buffer_to_texture(&mut self, dst: &dyn NativeTexture, src: &dyn NativeBuffer, region: &TextureCopyRegion) {
        let Some(texture) = vk_texture(dst) else {
            return;
        };
        let copy = vk::BufferImageCopy {
            buffer_offset: region.buffer_offset,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: texture.aspect(),
                mip_level: region.mip_level,
                base_array_layer: region.array_layer,
                layer_count: 1,
            },
            image_offset: vk::Offset3D::default(),
            image_extent: vk::Extent3D {
                width: region.width,
                height: region.height,
                depth: region.depth.max(1),
            },
        };
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                self.command_buffer,
                vk_buffer(src),
                texture.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[copy],
            )
        };
    }

    fn copy_texture(
        &mut self,
        dst: &dyn NativeTexture,
        dst_state: ResourceState,
        src: &dyn NativeTexture,
        src_state: ResourceState,
    ) {
        let (Some(dst), Some(src)) = (vk_texture(dst), vk_texture(src)) else {
            return;
        };
        let src_scope = self.scope(src_state, src.format.is_depth());
        let dst_scope = self.scope(dst_state, dst.format.is_depth());
        let src_needs_move = !is_transfer_layout(src_scope.layout, false);
        let dst_needs_move = !is_transfer_layout(dst_scope.layout, true);
        let src_transfer = transfer_access(false, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        let dst_transfer = transfer_access(true, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        if src_needs_move {
            self.image_transition(src, src.full_range(), src_scope, src_transfer);
        }
        if dst_needs_move {
            self.image_transition(dst, dst.full_range(), dst_scope, dst_transfer);
        }

        let mip_count = src.mip_levels.min(dst.mip_levels);
        let regions: Vec<vk::ImageCopy> = (0..mip_count)
            .map(|mip| vk::ImageCopy {
                src_subresource: subresource_layers(src, mip),
                src_offset: vk::Offset3D::default(),
                dst_subresource: subresource_layers(dst, mip),
                dst_offset: vk::Offset3D::default(),
                extent: mip_extent(src, mip),
            })
            .collect();
        let src_layout = if src_needs_move { src_transfer.layout } else { src_scope.layout };
        let dst_layout = if dst_needs_move { dst_transfer.layout } else { dst_scope.layout };
        unsafe {
            self.device()
                .cmd_copy_image(self.command_buffer, src.image, src_layout, dst.image, dst_layout, &regions)
        };

        if src_needs_move {
            self.image_transition(src, src.full_range(), src_transfer, src_scope);
        }
        if dst_needs_move {
            self.image_transition(dst, dst.full_range(), dst_transfer, dst_scope);
        }
    }

    fn fill_buffer(&mut self, dst: &dyn NativeBuffer, value: u32) {
        unsafe {
            self.device()
                .cmd_fill_buffer(self.command_buffer, vk_buffer(dst), 0, vk::WHOLE_SIZE, value)
        };
    }

    fn clear_texture(&mut self, texture: &dyn NativeTexture, state: ResourceState, color: [f32; 4]) {
        let Some(texture) = vk_texture(texture) else {
            return;
        };
        let scope = self.scope(state, texture.format.is_depth());
        let needs_move = !is_transfer_layout(scope.layout, true);
        let transfer = transfer_access(true, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let range = texture.full_range();
        if needs_move {
            self.image_transition(texture, range, scope, transfer);
        }

        let layout = if needs_move { transfer.layout } else { scope.layout };
        unsafe {
            if texture.format.is_depth() {
                let value = vk::ClearDepthStencilValue {
                    depth: color[0],
                    stencil: 0,
                };
                self.device()
                    .cmd_clear_depth_stencil_image(self.command_buffer, texture.image, layout, &value, &[range]);
            } else {
                let value = vk::ClearColorValue { float32: color };
                self.device()
                    .cmd_clear_color_image(self.command_buffer, texture.image, layout, &value, &[range]);
            }
        }

        if needs_move {
            self.image_transition(texture, range, transfer, scope);
        }
    }

    fn generate_mips(&mut self, texture: &dyn NativeTexture) {
        let Some(texture) = vk_texture(texture) else {
            return;
        };
        let aspect = aspect_mask(texture.format);
        let dst = transfer_access(true, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        let src = transfer_access(false, vk::ImageLayout::TRANSFER_SRC_OPTIMAL);
        let mip_range = |mip: u32| vk::ImageSubresourceRange {
            aspect_mask: aspect,
            base_mip_level: mip,
            level_count: 1,
            base_array_layer: 0,
            layer_count: texture.array_layers,
        };

        for mip in 1..texture.mip_levels {
            self.image_transition(texture, mip_range(mip - 1), dst, src);
            let src_extent = mip_extent(texture, mip - 1);
            let dst_extent = mip_extent(texture, mip);
            let blit = vk::ImageBlit {
                src_subresource: subresource_layers(texture, mip - 1),
                src_offsets: [vk::Offset3D::default(), mip_offset(src_extent)],
                dst_subresource: subresource_layers(texture, mip),
                dst_offsets: [vk::Offset3D::default(), mip_offset(dst_extent)],
            };
            unsafe {
                self.device().cmd_blit_image(
                    self.command_buffer,
                    texture.image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    texture.image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &[blit],
                    vk::Filter::LINEAR,
                )
            };
        }
        // the last mip was only written
        self.image_transition(texture, mip_range(texture.mip_levels.saturating_sub(1)), dst, src);
    }

    fn begin_render_pass(&mut self, pass: &NativeRenderPass<'_>) {
        let color_attachments: Vec<vk::RenderingAttachmentInfo> = pass
            .color_targets
            .iter()
            .filter_map(|target| {
                let texture = vk_texture(target.texture)?;
                let (load_op, clear_value) = match target.clear {
                    Some(ClearValue::Color(color)) => (
                        vk::AttachmentLoadOp::CLEAR,
                        vk::ClearValue {
                            color: vk::ClearColorValue { float32: color },
                        },
                    ),
                    _ => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
                };
                Some(
                    vk::RenderingAttachmentInfo::default()
                        .image_view(texture.attachment_view)
                        .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
                        .load_op(load_op)
                        .store_op(vk::AttachmentStoreOp::STORE)
                        .clear_value(clear_value),
                )
            })
            .collect();

        let depth = pass.depth_target.and_then(|target| {
            let texture = vk_texture(target.texture)?;
            let (load_op, clear_value) = match target.clear {
                Some(ClearValue::DepthStencil { depth, stencil }) => (
                    vk::AttachmentLoadOp::CLEAR,
                    vk::ClearValue {
                        depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
                    },
                ),
                _ => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
            };
            let attachment = vk::RenderingAttachmentInfo::default()
                .image_view(texture.attachment_view)
                .image_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
                .load_op(load_op)
                .store_op(vk::AttachmentStoreOp::STORE)
                .clear_value(clear_value);
            Some((attachment, target.format.has_stencil()))
        });

        let area = pass.render_area;
        let mut rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: area.x, y: area.y },
                extent: vk::Extent2D {
                    width: area.width,
                    height: area.height,
                },
            })
            .layer_count(1)
            .color_attachments(&color_attachments);
        if let Some((attachment, has_stencil)) = &depth {
            rendering_info = rendering_info.depth_attachment(attachment);
            if *has_stencil {
                rendering_info = rendering_info.stencil_attachment(attachment);
            }
        }
        unsafe { self.device().cmd_begin_rendering(self.command_buffer, &rendering_info) };
    }

    fn end_render_pass(&mut self) {
        unsafe { self.device().cmd_end_rendering(self.command_buffer) };
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        // Negative height flips Y so clip space matches the top-left origin
        let viewport = vk::Viewport {
            x: viewport.x,
            y: viewport.y + viewport.height,
            width: viewport.width,
            height: -viewport.height,
            min_depth: viewport.min_depth,
            max_depth: viewport.max_depth,
        };
        unsafe { self.device().cmd_set_viewport(self.command_buffer, 0, &[viewport]) };
    }

    fn set_scissor(&mut self, rect: &Rect) {
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: rect.x, y: rect.y },
            extent: vk::Extent2D {
                width: rect.width,
                height: rect.height,
            },
        };
        unsafe { self.device().cmd_set_scissor(self.command_buffer, 0, &[scissor]) };
    }

    fn bind_vertex_buffers(&mut self, first_slot: u32, buffers: &[(&dyn NativeBuffer, u64)]) {
        let handles: Vec<vk::Buffer> = buffers.iter().map(|(buffer, _)| vk_buffer(*buffer)).collect();
        let offsets: Vec<u64> = buffers.iter().map(|&(_, offset)| offset).collect();
        unsafe {
            self.device()
                .cmd_bind_vertex_buffers(self.command_buffer, first_slot, &handles, &offsets)
        };
    }

    fn bind_index_buffer(&mut self, buffer: &dyn NativeBuffer, offset: u64, index_type: IndexType) {
        unsafe {
            self.device().cmd_bind_index_buffer(
                self.command_buffer,
                vk_buffer(buffer),
                offset,
                index_type_to_vk(index_type),
            )
        };
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.device()
                .cmd_draw(self.command_buffer, vertex_count, instance_count, first_vertex, first_instance)
        };
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) {
        unsafe {
            self.device().cmd_draw_indexed(
                self.command_buffer,
                index_count,
                instance_count,
                first_index,
                vertex_offset,
                first_instance,
            )
        };
    }

    fn draw_indexed_indirect(&mut self, buffer: &dyn NativeBuffer, offset: u64, draw_count: u32, stride: u32) {
        unsafe {
            self.device()
                .cmd_draw_indexed_indirect(self.command_buffer, vk_buffer(buffer), offset, draw_count, stride)
        };
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        unsafe { self.device().cmd_dispatch(self.command_buffer, x, y, z) };
    }

    fn dispatch_indirect(&mut self, buffer: &dyn NativeBuffer, offset: u64) {
        unsafe {
            self.device()
                .cmd_dispatch_indirect(self.command_buffer, vk_buffer(buffer), offset)
        };
    }
}

fn vk_allocator(allocator: &dyn NativeCommandAllocator) -> Result<&VulkanCommandAllocator> {
    allocator
        .as_any()
        .downcast_ref::<VulkanCommandAllocator>()
        .ok_or_else(|| Error::InvalidResource("Command allocator was not created by the Vulkan backend".to_string()))
}

pub(crate) fn vk_command_list(list: &dyn NativeCommandList) -> Result<&VulkanCommandList> {
    list.as_any()
        .downcast_ref::<VulkanCommandList>()
        .ok_or_else(|| Error::InvalidResource("Command list was not created by the Vulkan backend".to_string()))
}

#[cfg(test)]
#[path = "vulkan_command_list_tests.rs"]
mod tests;
