//! Submission fences and their frame-scoped tracking

use crate::error::Result;
use crate::rhi::backend::{Backend, NativeFence};
use crate::rhi::types::{QueueType, QUEUE_TYPE_COUNT};
use crate::{ember_debug, ember_trace, ember_warn};

/// A native fence bound to one queue type
pub struct Fence {
    native: Box<dyn NativeFence>,
    queue_type: QueueType,
    next_value: u64,
}

impl Fence {
    pub(crate) fn new(backend: &dyn Backend, queue_type: QueueType) -> Result<Self> {
        Ok(Self {
            native: backend.create_fence()?,
            queue_type,
            next_value: 1,
        })
    }

    pub fn queue_type(&self) -> QueueType {
        self.queue_type
    }

    /// Signal on the fence's queue and block until the GPU reaches it
    pub fn signal_and_wait(&mut self, backend: &dyn Backend) -> Result<()> {
        let value = self.next_value;
        self.next_value += 1;
        backend.signal_fence(self.queue_type, self.native.as_ref(), value)?;
        if self.native.completed_value()? < value {
            self.native.wait(value)?;
        }
        Ok(())
    }

    /// Last value the GPU reached
    pub fn completed_value(&self) -> Result<u64> {
        self.native.completed_value()
    }
}

/// Sentinel fence index meaning "waited since the last reset"
pub const WAITED: u32 = u32::MAX;

/// Fences requested by submissions, per queue type, for the current frame
pub struct FenceTracker {
    fences: [Vec<Fence>; QUEUE_TYPE_COUNT],
    fence_index: [u32; QUEUE_TYPE_COUNT],
}

impl Default for FenceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl FenceTracker {
    pub fn new() -> Self {
        Self {
            fences: [Vec::new(), Vec::new(), Vec::new()],
            fence_index: [0; QUEUE_TYPE_COUNT],
        }
    }

    /// Take the next fence slot for a submission on `queue_type`
    pub fn acquire(&mut self, backend: &dyn Backend, queue_type: QueueType) -> Result<()> {
        let q = queue_type.index();
        if self.fence_index[q] == WAITED {
            self.fence_index[q] = 0;
        }
        let slot = self.fence_index[q] as usize;
        if slot >= self.fences[q].len() {
            self.fences[q].push(Fence::new(backend, queue_type)?);
        }
        self.fence_index[q] += 1;
        ember_trace!("ember::Fence", "{:?} submission fence {}", queue_type, slot);
        Ok(())
    }

    /// Signal and wait every fence taken for `queue_type` since the last
    /// wait. A second call without a new submission does nothing.
    pub fn wait(&mut self, backend: &dyn Backend, queue_type: QueueType) -> Result<()> {
        let q = queue_type.index();
        match self.fence_index[q] {
            WAITED => {
                ember_debug!("ember::Fence", "{:?} already waited, nothing to do", queue_type);
                Ok(())
            }
            0 => Ok(()),
            pending => {
                for fence in &mut self.fences[q][..pending as usize] {
                    fence.signal_and_wait(backend)?;
                }
                self.fence_index[q] = WAITED;
                Ok(())
            }
        }
    }

    /// Frame boundary: wait whatever was never waited, then release every
    /// fence and reset the indices
    pub fn reset_frame(&mut self, backend: &dyn Backend) -> Result<()> {
        for queue_type in QueueType::ALL {
            let pending = self.fence_index[queue_type.index()];
            if pending != WAITED && pending > 0 {
                ember_warn!(
                    "ember::Fence",
                    "{} {:?} submissions were never waited, waiting at frame boundary",
                    pending,
                    queue_type
                );
                self.wait(backend, queue_type)?;
            }
        }
        for fences in &mut self.fences {
            fences.clear();
        }
        self.fence_index = [0; QUEUE_TYPE_COUNT];
        Ok(())
    }

    /// Raw fence index of `queue_type` (`WAITED` after a wait)
    pub fn fence_index(&self, queue_type: QueueType) -> u32 {
        self.fence_index[queue_type.index()]
    }

    /// Fence objects currently held for `queue_type`
    pub fn fence_count(&self, queue_type: QueueType) -> usize {
        self.fences[queue_type.index()].len()
    }
}

#[cfg(test)]
#[path = "fence_tests.rs"]
mod tests;
