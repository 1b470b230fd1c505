//! Per-thread command list pools

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::rhi::backend::NativeCommandAllocator;
use crate::rhi::command_list::CommandList;
use crate::rhi::context::RendererContext;
use crate::rhi::types::{QueueType, QUEUE_TYPE_COUNT};
use crate::ember_debug;

/// Reset counter of one [`CommandContext`].
///
/// Lists and the staging slots they fill hold a clone. Work recorded under
/// count `n` is finished once the counter moved past `n`: the context only
/// resets after the frame fences were waited.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResetEpoch(Arc<AtomicU64>);

impl ResetEpoch {
    pub(crate) fn current(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::AcqRel) + 1
    }
}

/// One allocator and one growable list pool per queue type.
///
/// `count` tracks how many lists were handed out since the last reset; the
/// pool itself only ever grows, so a warm pool serves a frame without
/// creating native objects.
pub struct CommandContext {
    context: Arc<RendererContext>,
    allocators: [Option<Arc<dyn NativeCommandAllocator>>; QUEUE_TYPE_COUNT],
    command_lists: [Vec<Arc<Mutex<CommandList>>>; QUEUE_TYPE_COUNT],
    counts: [u32; QUEUE_TYPE_COUNT],
    epoch: ResetEpoch,
}

impl CommandContext {
    pub(crate) fn new(context: Arc<RendererContext>) -> Self {
        Self {
            context,
            allocators: [None, None, None],
            command_lists: [Vec::new(), Vec::new(), Vec::new()],
            counts: [0; QUEUE_TYPE_COUNT],
            epoch: ResetEpoch::default(),
        }
    }

    /// The next list of this reset cycle for `queue_type`, created if the
    /// pool is exhausted
    pub fn get_command_list(&mut self, queue_type: QueueType) -> Result<Arc<Mutex<CommandList>>> {
        let index = queue_type.index();

        let allocator = match &self.allocators[index] {
            Some(allocator) => Arc::clone(allocator),
            None => {
                let allocator: Arc<dyn NativeCommandAllocator> =
                    Arc::from(self.context.backend().create_command_allocator(queue_type)?);
                self.allocators[index] = Some(Arc::clone(&allocator));
                allocator
            }
        };

        let slot = self.counts[index] as usize;
        let list = if slot < self.command_lists[index].len() {
            Arc::clone(&self.command_lists[index][slot])
        } else {
            let list = Arc::new(Mutex::new(CommandList::new(
                Arc::clone(&self.context),
                queue_type,
                allocator,
                self.epoch.clone(),
            )?));
            self.command_lists[index].push(Arc::clone(&list));
            ember_debug!(
                "ember::CommandContext",
                "{:?} pool grew to {} lists",
                queue_type,
                self.command_lists[index].len()
            );
            list
        };

        self.counts[index] += 1;
        Ok(list)
    }

    /// Reset every created allocator and zero the per-queue counts.
    ///
    /// The GPU must be done with every list of this context. Lists left
    /// recording are discarded on their next `begin_recording`, and staging
    /// memory they filled becomes reusable.
    pub fn reset(&mut self) -> Result<()> {
        for allocator in self.allocators.iter().flatten() {
            allocator.reset()?;
        }
        self.counts = [0; QUEUE_TYPE_COUNT];
        let epoch = self.epoch.advance();
        ember_debug!("ember::CommandContext", "Reset #{}", epoch);
        Ok(())
    }

    /// Number of resets so far
    pub fn reset_count(&self) -> u64 {
        self.epoch.current()
    }

    /// Lists handed out for `queue_type` since the last reset
    pub fn count(&self, queue_type: QueueType) -> u32 {
        self.counts[queue_type.index()]
    }

    /// Lists ever created for `queue_type`
    pub fn pool_size(&self, queue_type: QueueType) -> usize {
        self.command_lists[queue_type.index()].len()
    }

    pub fn has_allocator(&self, queue_type: QueueType) -> bool {
        self.allocators[queue_type.index()].is_some()
    }
}

#[cfg(test)]
#[path = "command_context_tests.rs"]
mod tests;
