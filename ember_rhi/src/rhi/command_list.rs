//! Command recording
//!
//! A [`CommandList`] wraps one native recorder drawn from its thread's
//! per-queue allocator. It is handed out by a `CommandContext` behind an
//! `Arc<Mutex<_>>` and must be recorded by one thread at a time.

use glam::Vec4;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::rhi::backend::{
    NativeAttachment, NativeCommandAllocator, NativeCommandList, NativeRenderPass, TextureCopyRegion,
};
use crate::rhi::barrier::{lower_barriers, BarrierDesc};
use crate::rhi::buffer::Buffer;
use crate::rhi::command_context::ResetEpoch;
use crate::rhi::context::RendererContext;
use crate::rhi::pipeline::{BindingLayout, DescriptorSet, Pipeline};
use crate::rhi::texture::{RenderTarget, RenderTargetType, Texture};
use crate::rhi::types::{
    DescriptorHeapKind, IndexType, PipelineType, QueueType, Rect, ResourceState, Viewport,
    MAX_RENDER_TARGETS,
};
use crate::{ember_debug, ember_trace, ember_warn};

/// One attachment of a render pass
#[derive(Clone, Copy)]
pub struct RenderPassTarget<'a> {
    pub target: &'a RenderTarget,
    /// Clear to the target's clear value instead of loading
    pub clear: bool,
}

impl<'a> RenderPassTarget<'a> {
    pub fn clear(target: &'a RenderTarget) -> Self {
        Self { target, clear: true }
    }

    pub fn load(target: &'a RenderTarget) -> Self {
        Self { target, clear: false }
    }
}

/// Attachments of a render pass
#[derive(Clone, Default)]
pub struct RenderPassDesc<'a> {
    pub color_targets: Vec<RenderPassTarget<'a>>,
    pub depth_target: Option<RenderPassTarget<'a>>,
    /// `None` covers the first attachment
    pub render_area: Option<Rect>,
}

pub struct CommandList {
    context: Arc<RendererContext>,
    queue_type: QueueType,
    // declared before `allocator` so the recorder is destroyed first
    native: Box<dyn NativeCommandList>,
    allocator: Arc<dyn NativeCommandAllocator>,
    epoch: ResetEpoch,
    // context reset count when recording began
    recording_epoch: u64,
    is_recording: bool,
    in_render_pass: bool,
    bound_pipeline: Option<PipelineType>,
}

impl CommandList {
    pub(crate) fn new(
        context: Arc<RendererContext>,
        queue_type: QueueType,
        allocator: Arc<dyn NativeCommandAllocator>,
        epoch: ResetEpoch,
    ) -> Result<Self> {
        let native = context
            .backend()
            .create_command_list(queue_type, allocator.as_ref())?;
        Ok(Self {
            context,
            queue_type,
            native,
            allocator,
            recording_epoch: epoch.current(),
            epoch,
            is_recording: false,
            in_render_pass: false,
            bound_pipeline: None,
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn in_render_pass(&self) -> bool {
        self.in_render_pass
    }

    pub(crate) fn native(&self) -> &dyn NativeCommandList {
        self.native.as_ref()
    }

    // ===== RECORDING STATE =====

    /// Reset the recorder and open it.
    ///
    /// A recording abandoned before its context was reset is discarded.
    pub fn begin_recording(&mut self) -> Result<()> {
        if self.is_recording {
            if !self.is_stale() {
                return Err(Error::InvalidState(format!(
                    "{:?} command list is already recording",
                    self.queue_type
                )));
            }
            ember_warn!(
                "ember::CommandList",
                "{:?} command list was still recording when its context reset, discarding it",
                self.queue_type
            );
            self.is_recording = false;
        }
        self.native.begin(self.allocator.as_ref())?;
        self.recording_epoch = self.epoch.current();
        self.is_recording = true;
        self.in_render_pass = false;
        self.bound_pipeline = None;
        Ok(())
    }

    /// Close the recorder so it can be submitted
    pub fn end_recording(&mut self) -> Result<()> {
        self.ensure_recording("end_recording")?;
        if self.in_render_pass {
            return Err(Error::InvalidState("end_recording inside a render pass".to_string()));
        }
        self.native.close()?;
        self.is_recording = false;
        Ok(())
    }

    /// Recording began before the last reset of the owning context
    fn is_stale(&self) -> bool {
        self.epoch.current() != self.recording_epoch
    }

    fn ensure_recording(&self, op: &str) -> Result<()> {
        if !self.is_recording {
            return Err(Error::InvalidState(format!(
                "{} on a {:?} command list that is not recording",
                op, self.queue_type
            )));
        }
        if self.is_stale() {
            return Err(Error::InvalidState(format!(
                "{} on a {:?} command list whose allocator was reset, begin a new recording",
                op, self.queue_type
            )));
        }
        Ok(())
    }

    fn ensure_outside_pass(&self, op: &str) -> Result<()> {
        self.ensure_recording(op)?;
        if self.in_render_pass {
            return Err(Error::InvalidState(format!("{} inside a render pass", op)));
        }
        Ok(())
    }

    fn ensure_queue(&self, op: &str, allowed: &[QueueType]) -> Result<()> {
        if !allowed.contains(&self.queue_type) {
            return Err(Error::InvalidState(format!(
                "{} is not supported on a {:?} command list",
                op, self.queue_type
            )));
        }
        Ok(())
    }

    // ===== PIPELINE AND BINDINGS =====

    /// Bind the pipeline state and, outside the transfer queue, the
    /// shader-visible heaps. Global-table pipelines get root tables 0 and 1
    /// pointed at the heap starts.
    pub fn bind_pipeline(&mut self, pipeline: &Pipeline) -> Result<()> {
        self.ensure_recording("bind_pipeline")?;
        let pipeline_type = pipeline.pipeline_type();
        if pipeline_type == PipelineType::Graphics && self.queue_type != QueueType::Graphics {
            return Err(Error::InvalidState(format!(
                "Graphics pipeline '{}' bound on a {:?} command list",
                pipeline.label(),
                self.queue_type
            )));
        }
        let (native_pipeline, root) = pipeline.native_parts()?;

        self.native.set_pipeline_state(native_pipeline);
        self.bound_pipeline = Some(pipeline_type);

        if self.queue_type == QueueType::Transfer {
            return Ok(());
        }

        let resources = self.context.heap(DescriptorHeapKind::CbvSrvUav);
        let samplers = self.context.heap(DescriptorHeapKind::Sampler);
        self.native
            .set_descriptor_heaps(&[resources.native(), samplers.native()]);

        if pipeline.binding_layout() == BindingLayout::GlobalTable {
            self.native
                .set_root_descriptor_table(pipeline_type, root, 0, resources.native(), resources.start());
            self.native
                .set_root_descriptor_table(pipeline_type, root, 1, samplers.native(), samplers.start());
        }
        ember_trace!("ember::CommandList", "Bound pipeline '{}'", pipeline.label());
        Ok(())
    }

    /// Bind an updated descriptor set of a reflected pipeline
    pub fn bind_descriptor_set(&mut self, pipeline: &Pipeline, set: &DescriptorSet) -> Result<()> {
        self.ensure_recording("bind_descriptor_set")?;
        if set.has_pending_writes() {
            return Err(Error::InvalidState(format!(
                "Descriptor set {} has writes that were never updated",
                set.set_index()
            )));
        }
        if set.pipeline_type() != pipeline.pipeline_type() {
            return Err(Error::InvalidState(format!(
                "Descriptor set {} belongs to a {:?} pipeline, '{}' is {:?}",
                set.set_index(),
                set.pipeline_type(),
                pipeline.label(),
                pipeline.pipeline_type()
            )));
        }
        let (_, root) = pipeline.native_parts()?;
        self.native
            .bind_descriptor_set(pipeline.pipeline_type(), root, set.set_index(), set.native());
        Ok(())
    }

    /// Write root constants at byte `offset`
    pub fn push_constants(&mut self, pipeline: &Pipeline, offset: u32, data: &[u8]) -> Result<()> {
        self.ensure_recording("push_constants")?;
        let end = offset as u64 + data.len() as u64;
        if offset % 4 != 0 || data.len() % 4 != 0 || end > pipeline.push_constant_size() as u64 {
            return Err(Error::InvalidResource(format!(
                "Push constant range {}+{} invalid for '{}' ({} bytes, 4-byte aligned)",
                offset,
                data.len(),
                pipeline.label(),
                pipeline.push_constant_size()
            )));
        }
        let (_, root) = pipeline.native_parts()?;
        self.native
            .set_root_constants(pipeline.pipeline_type(), root, offset, data);
        Ok(())
    }

    // ===== BARRIERS =====

    /// Issue every transition of `desc` in one native call, buffers first
    pub fn insert_barrier(&mut self, desc: &BarrierDesc<'_>) -> Result<()> {
        self.ensure_outside_pass("insert_barrier")?;
        let lowered = lower_barriers(desc, self.queue_type);
        if lowered.is_empty() {
            return Ok(());
        }
        ember_trace!("ember::CommandList", "{} barriers", lowered.len());
        self.native.resource_barrier(&lowered);
        Ok(())
    }

    // ===== TRANSFERS =====

    /// Upload `data` into `buffer` at `offset`.
    ///
    /// Host-visible buffers are written directly. Dedicated buffers go
    /// through a staging buffer from the destination's ring and a recorded
    /// copy; the destination should be in COPY_DEST.
    pub fn update_buffer(&mut self, buffer: &Buffer, offset: u64, data: &[u8]) -> Result<()> {
        self.ensure_outside_pass("update_buffer")?;
        check_range(buffer, offset, data.len() as u64)?;
        if data.is_empty() {
            return Ok(());
        }

        if buffer.memory().is_host_visible() {
            return buffer.write(offset, data);
        }

        if buffer.state() != ResourceState::COPY_DEST {
            ember_warn!(
                "ember::CommandList",
                "update_buffer on '{}' in {:?}, expected COPY_DEST",
                buffer.label(),
                buffer.state()
            );
        }

        let native = &mut self.native;
        buffer.staging().upload(
            self.context.backend(),
            buffer.label(),
            data,
            &self.epoch,
            |staging| {
                native.copy_buffer_region(buffer.native(), offset, staging, 0, data.len() as u64);
                Ok(())
            },
        )
    }

    /// Upload tightly packed texels of one mip of one layer
    pub fn update_texture(&mut self, texture: &Texture, mip_level: u32, array_layer: u32, data: &[u8]) -> Result<()> {
        self.ensure_outside_pass("update_texture")?;
        if mip_level >= texture.mip_levels() || array_layer >= texture.array_layers() {
            return Err(Error::InvalidResource(format!(
                "'{}' has no mip {} / layer {}",
                texture.label(),
                mip_level,
                array_layer
            )));
        }
        let width = (texture.width() >> mip_level).max(1);
        let height = (texture.height() >> mip_level).max(1);
        let depth = (texture.depth() >> mip_level).max(1);
        let expected = width as u64 * height as u64 * depth as u64 * texture.format().bytes_per_pixel() as u64;
        if data.len() as u64 != expected {
            return Err(Error::InvalidResource(format!(
                "'{}' mip {} needs {} bytes, got {}",
                texture.label(),
                mip_level,
                expected,
                data.len()
            )));
        }
        if texture.state() != ResourceState::COPY_DEST {
            ember_warn!(
                "ember::CommandList",
                "update_texture on '{}' in {:?}, expected COPY_DEST",
                texture.label(),
                texture.state()
            );
        }

        let region = TextureCopyRegion {
            buffer_offset: 0,
            mip_level,
            array_layer,
            width,
            height,
            depth,
        };
        let native = &mut self.native;
        texture.staging().upload(
            self.context.backend(),
            texture.label(),
            data,
            &self.epoch,
            |staging| {
                native.copy_buffer_to_texture(texture.native(), staging, &region);
                Ok(())
            },
        )
    }

    pub fn copy_buffer(
        &mut self,
        dst: &Buffer,
        dst_offset: u64,
        src: &Buffer,
        src_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.ensure_outside_pass("copy_buffer")?;
        check_range(dst, dst_offset, size)?;
        check_range(src, src_offset, size)?;
        self.native
            .copy_buffer_region(dst.native(), dst_offset, src.native(), src_offset, size);
        Ok(())
    }

    /// Copy every subresource of `src` into `dst`
    pub fn copy_texture(&mut self, dst: &Texture, src: &Texture) -> Result<()> {
        self.ensure_outside_pass("copy_texture")?;
        if (dst.width(), dst.height(), dst.depth(), dst.format()) != (src.width(), src.height(), src.depth(), src.format())
            || dst.mip_levels() != src.mip_levels()
            || dst.array_layers() != src.array_layers()
        {
            return Err(Error::InvalidResource(format!(
                "Cannot copy '{}' into '{}': shapes differ",
                src.label(),
                dst.label()
            )));
        }
        self.native
            .copy_texture(dst.native(), dst.state(), src.native(), src.state());
        Ok(())
    }

    /// Fill the whole buffer with `value`
    pub fn clear_buffer(&mut self, buffer: &Buffer, value: f32) -> Result<()> {
        self.ensure_outside_pass("clear_buffer")?;
        self.native.fill_buffer(buffer.native(), value.to_bits());
        Ok(())
    }

    /// Clear every subresource of a color texture
    pub fn clear_texture(&mut self, texture: &Texture, color: Vec4) -> Result<()> {
        self.ensure_outside_pass("clear_texture")?;
        if texture.format().is_depth() {
            return Err(Error::InvalidResource(format!(
                "'{}' is a depth texture, clear it in a render pass",
                texture.label()
            )));
        }
        self.native
            .clear_texture(texture.native(), texture.state(), color.to_array());
        Ok(())
    }

    /// Fill mips 1.. from mip 0. Leaves the texture in COPY_SOURCE.
    pub fn generate_mip_map(&mut self, texture: &Texture) -> Result<()> {
        self.ensure_outside_pass("generate_mip_map")?;
        self.ensure_queue("generate_mip_map", &[QueueType::Graphics])?;
        if texture.mip_levels() <= 1 {
            ember_debug!("ember::CommandList", "'{}' has a single mip, nothing to generate", texture.label());
            return Ok(());
        }

        let to_copy_dest = BarrierDesc::new().texture(texture, texture.state(), ResourceState::COPY_DEST);
        let lowered = lower_barriers(&to_copy_dest, self.queue_type);
        if !lowered.is_empty() {
            self.native.resource_barrier(&lowered);
        }
        self.native.generate_mips(texture.native());
        texture.set_state(ResourceState::COPY_SOURCE);
        Ok(())
    }

    // ===== RENDER PASSES =====

    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc<'_>) -> Result<()> {
        self.ensure_outside_pass("begin_render_pass")?;
        self.ensure_queue("begin_render_pass", &[QueueType::Graphics])?;

        if desc.color_targets.len() > MAX_RENDER_TARGETS {
            return Err(Error::InvalidResource(format!(
                "{} color targets bound (max {})",
                desc.color_targets.len(),
                MAX_RENDER_TARGETS
            )));
        }
        let first = match desc.color_targets.first().or(desc.depth_target.as_ref()) {
            Some(first) => first.target,
            None => return Err(Error::InvalidResource("Render pass without attachments".to_string())),
        };

        let mut color_targets = Vec::with_capacity(desc.color_targets.len());
        for attachment in &desc.color_targets {
            let target = attachment.target;
            if target.rt_type() != RenderTargetType::Color {
                return Err(Error::InvalidResource(format!(
                    "'{}' is a depth target bound as color",
                    target.texture().label()
                )));
            }
            if target.state() != ResourceState::RENDER_TARGET {
                ember_warn!(
                    "ember::CommandList",
                    "'{}' used as color target in {:?}",
                    target.texture().label(),
                    target.state()
                );
            }
            color_targets.push(native_attachment(attachment));
        }

        let depth_target = match &desc.depth_target {
            Some(attachment) if attachment.target.rt_type() != RenderTargetType::DepthStencil => {
                return Err(Error::InvalidResource(format!(
                    "'{}' is a color target bound as depth",
                    attachment.target.texture().label()
                )));
            }
            Some(attachment) => Some(native_attachment(attachment)),
            None => None,
        };

        let render_area = desc.render_area.unwrap_or(Rect {
            x: 0,
            y: 0,
            width: first.width(),
            height: first.height(),
        });
        self.native.begin_render_pass(&NativeRenderPass {
            color_targets,
            depth_target,
            render_area,
        });
        self.in_render_pass = true;
        Ok(())
    }

    pub fn end_render_pass(&mut self) -> Result<()> {
        self.ensure_recording("end_render_pass")?;
        if !self.in_render_pass {
            return Err(Error::InvalidState("end_render_pass without begin_render_pass".to_string()));
        }
        self.native.end_render_pass();
        self.in_render_pass = false;
        Ok(())
    }

    pub fn set_viewport(&mut self, viewport: &Viewport) -> Result<()> {
        self.ensure_recording("set_viewport")?;
        self.native.set_viewport(viewport);
        Ok(())
    }

    pub fn set_scissor(&mut self, rect: &Rect) -> Result<()> {
        self.ensure_recording("set_scissor")?;
        self.native.set_scissor(rect);
        Ok(())
    }

    /// Bind `(buffer, offset)` pairs starting at `first_slot`
    pub fn bind_vertex_buffers(&mut self, first_slot: u32, buffers: &[(&Buffer, u64)]) -> Result<()> {
        self.ensure_recording("bind_vertex_buffers")?;
        let natives: Vec<_> = buffers.iter().map(|(b, offset)| (b.native(), *offset)).collect();
        self.native.bind_vertex_buffers(first_slot, &natives);
        Ok(())
    }

    pub fn bind_index_buffer(&mut self, buffer: &Buffer, offset: u64, index_type: IndexType) -> Result<()> {
        self.ensure_recording("bind_index_buffer")?;
        self.native.bind_index_buffer(buffer.native(), offset, index_type);
        Ok(())
    }

    // ===== DRAWS AND DISPATCHES =====

    fn ensure_draw(&self, op: &str) -> Result<()> {
        self.ensure_recording(op)?;
        if !self.in_render_pass {
            return Err(Error::InvalidState(format!("{} outside a render pass", op)));
        }
        if self.bound_pipeline != Some(PipelineType::Graphics) {
            return Err(Error::InvalidState(format!("{} without a graphics pipeline", op)));
        }
        Ok(())
    }

    fn ensure_dispatch(&self, op: &str) -> Result<()> {
        self.ensure_outside_pass(op)?;
        self.ensure_queue(op, &[QueueType::Graphics, QueueType::Compute])?;
        if self.bound_pipeline != Some(PipelineType::Compute) {
            return Err(Error::InvalidState(format!("{} without a compute pipeline", op)));
        }
        Ok(())
    }

    pub fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) -> Result<()> {
        self.ensure_draw("draw_instanced")?;
        self.native
            .draw_instanced(vertex_count, instance_count, first_vertex, first_instance);
        Ok(())
    }

    pub fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    ) -> Result<()> {
        self.ensure_draw("draw_indexed_instanced")?;
        self.native.draw_indexed_instanced(
            index_count,
            instance_count,
            first_index,
            vertex_offset,
            first_instance,
        );
        Ok(())
    }

    pub fn draw_indexed_indirect(&mut self, args: &Buffer, offset: u64, draw_count: u32, stride: u32) -> Result<()> {
        self.ensure_draw("draw_indexed_indirect")?;
        check_range(args, offset, draw_count as u64 * stride as u64)?;
        self.native
            .draw_indexed_indirect(args.native(), offset, draw_count, stride);
        Ok(())
    }

    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<()> {
        self.ensure_dispatch("dispatch")?;
        ember_trace!("ember::CommandList", "dispatch {}x{}x{}", x, y, z);
        self.native.dispatch(x, y, z);
        Ok(())
    }

    /// Dispatch with group counts read from `args` at `offset` (3 x u32)
    pub fn dispatch_indirect(&mut self, args: &Buffer, offset: u64) -> Result<()> {
        self.ensure_dispatch("dispatch_indirect")?;
        check_range(args, offset, 12)?;
        self.native.dispatch_indirect(args.native(), offset);
        Ok(())
    }
}

fn native_attachment<'a>(attachment: &RenderPassTarget<'a>) -> NativeAttachment<'a> {
    NativeAttachment {
        texture: attachment.target.texture().native(),
        format: attachment.target.format(),
        clear: attachment.clear.then(|| attachment.target.clear_value()),
    }
}

fn check_range(buffer: &Buffer, offset: u64, len: u64) -> Result<()> {
    match offset.checked_add(len) {
        Some(end) if end <= buffer.size() => Ok(()),
        _ => Err(Error::InvalidResource(format!(
            "Range {}+{} out of bounds for '{}' ({} bytes)",
            offset,
            len,
            buffer.label(),
            buffer.size()
        ))),
    }
}

#[cfg(test)]
#[path = "command_list_tests.rs"]
mod tests;
