//! Transition barrier descriptions and their lowering to native barriers

use crate::rhi::backend::{QueueOwnership, ResourceBarrier, SubresourceRange};
use crate::rhi::buffer::Buffer;
use crate::rhi::texture::Texture;
use crate::rhi::types::{QueueOp, QueueType, ResourceState};
use crate::{ember_debug, ember_warn};

/// Transition of one buffer
#[derive(Debug, Clone, Copy)]
pub struct BufferBarrierDesc<'a> {
    pub buffer: &'a Buffer,
    pub src_state: ResourceState,
    pub dst_state: ResourceState,
    pub queue_op: QueueOp,
    /// Queue on the other side of a release/acquire
    pub other_queue: QueueType,
}

impl<'a> BufferBarrierDesc<'a> {
    pub fn new(buffer: &'a Buffer, src_state: ResourceState, dst_state: ResourceState) -> Self {
        Self {
            buffer,
            src_state,
            dst_state,
            queue_op: QueueOp::Ignored,
            other_queue: QueueType::Graphics,
        }
    }

    /// Hand the buffer over to `queue` after this transition
    pub fn release_to(mut self, queue: QueueType) -> Self {
        self.queue_op = QueueOp::Release;
        self.other_queue = queue;
        self
    }

    /// Take the buffer over from `queue`
    pub fn acquire_from(mut self, queue: QueueType) -> Self {
        self.queue_op = QueueOp::Acquire;
        self.other_queue = queue;
        self
    }
}

/// Transition of a texture or part of it
#[derive(Debug, Clone, Copy)]
pub struct TextureBarrierDesc<'a> {
    pub texture: &'a Texture,
    pub src_state: ResourceState,
    pub dst_state: ResourceState,
    /// `None` covers every mip and layer
    pub range: Option<SubresourceRange>,
    pub queue_op: QueueOp,
    pub other_queue: QueueType,
}

impl<'a> TextureBarrierDesc<'a> {
    pub fn new(texture: &'a Texture, src_state: ResourceState, dst_state: ResourceState) -> Self {
        Self {
            texture,
            src_state,
            dst_state,
            range: None,
            queue_op: QueueOp::Ignored,
            other_queue: QueueType::Graphics,
        }
    }

    pub fn with_range(mut self, range: SubresourceRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn release_to(mut self, queue: QueueType) -> Self {
        self.queue_op = QueueOp::Release;
        self.other_queue = queue;
        self
    }

    pub fn acquire_from(mut self, queue: QueueType) -> Self {
        self.queue_op = QueueOp::Acquire;
        self.other_queue = queue;
        self
    }
}

/// A batch of buffer and texture transitions issued together
#[derive(Debug, Clone, Default)]
pub struct BarrierDesc<'a> {
    pub buffer_barriers: Vec<BufferBarrierDesc<'a>>,
    pub texture_barriers: Vec<TextureBarrierDesc<'a>>,
}

impl<'a> BarrierDesc<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(mut self, buffer: &'a Buffer, src_state: ResourceState, dst_state: ResourceState) -> Self {
        self.buffer_barriers.push(BufferBarrierDesc::new(buffer, src_state, dst_state));
        self
    }

    pub fn texture(mut self, texture: &'a Texture, src_state: ResourceState, dst_state: ResourceState) -> Self {
        self.texture_barriers.push(TextureBarrierDesc::new(texture, src_state, dst_state));
        self
    }

    pub fn with_buffer_barrier(mut self, barrier: BufferBarrierDesc<'a>) -> Self {
        self.buffer_barriers.push(barrier);
        self
    }

    pub fn with_texture_barrier(mut self, barrier: TextureBarrierDesc<'a>) -> Self {
        self.texture_barriers.push(barrier);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.buffer_barriers.is_empty() && self.texture_barriers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffer_barriers.len() + self.texture_barriers.len()
    }
}

fn ownership(op: QueueOp, recording_queue: QueueType, other_queue: QueueType) -> Option<QueueOwnership> {
    match op {
        QueueOp::Ignored => None,
        QueueOp::Release => Some(QueueOwnership {
            op,
            src_queue: recording_queue,
            dst_queue: other_queue,
        }),
        QueueOp::Acquire => Some(QueueOwnership {
            op,
            src_queue: other_queue,
            dst_queue: recording_queue,
        }),
    }
}

/// Resolve the `before` state of a transition against the tracked state
fn resolve_before(label: &str, tracked: ResourceState, requested: ResourceState) -> ResourceState {
    if tracked != requested {
        ember_warn!(
            "ember::Barrier",
            "'{}' is tracked in {:?} but the barrier expects {:?}, using the tracked state",
            label,
            tracked,
            requested
        );
    }
    tracked
}

/// Same-state transitions are dropped unless they order UAV accesses or
/// carry a queue handover
fn is_redundant(before: ResourceState, after: ResourceState, op: QueueOp) -> bool {
    before == after && !after.contains(ResourceState::UNORDERED_ACCESS) && op == QueueOp::Ignored
}

/// Lower `desc` to native barriers (buffers first) and advance the tracked
/// states. Partial texture ranges trust `src_state` and leave the
/// whole-texture state untouched.
pub(crate) fn lower_barriers<'a>(desc: &BarrierDesc<'a>, queue: QueueType) -> Vec<ResourceBarrier<'a>> {
    let mut lowered = Vec::with_capacity(desc.len());

    for barrier in &desc.buffer_barriers {
        let buffer = barrier.buffer;
        let before = resolve_before(buffer.label(), buffer.state(), barrier.src_state);
        if is_redundant(before, barrier.dst_state, barrier.queue_op) {
            ember_debug!("ember::Barrier", "Skipping redundant barrier on '{}' ({:?})", buffer.label(), before);
            continue;
        }
        lowered.push(ResourceBarrier::Buffer {
            buffer: buffer.native(),
            before,
            after: barrier.dst_state,
            ownership: ownership(barrier.queue_op, queue, barrier.other_queue),
        });
        buffer.set_state(barrier.dst_state);
    }

    for barrier in &desc.texture_barriers {
        let texture = barrier.texture;
        let full = texture.full_range();
        let range = barrier.range.unwrap_or(full);
        // only whole-texture state is tracked
        let before = if range == full {
            resolve_before(texture.label(), texture.state(), barrier.src_state)
        } else {
            barrier.src_state
        };
        if is_redundant(before, barrier.dst_state, barrier.queue_op) {
            ember_debug!("ember::Barrier", "Skipping redundant barrier on '{}' ({:?})", texture.label(), before);
            continue;
        }
        lowered.push(ResourceBarrier::Texture {
            texture: texture.native(),
            before,
            after: barrier.dst_state,
            range,
            ownership: ownership(barrier.queue_op, queue, barrier.other_queue),
        });
        if range == full {
            texture.set_state(barrier.dst_state);
        }
    }

    lowered
}

#[cfg(test)]
#[path = "barrier_tests.rs"]
mod tests;
