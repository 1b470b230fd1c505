//! Per-resource ring of host-visible upload buffers

use std::sync::Mutex;

use crate::error::Result;
use crate::rhi::backend::{Backend, NativeBuffer, NativeBufferDesc};
use crate::rhi::command_context::ResetEpoch;
use crate::rhi::types::{DescriptorTypes, HeapType, ResourceState};
use crate::ember_trace;

struct StagingSlot {
    buffer: Box<dyn NativeBuffer>,
    // context of the list that recorded the copy, and its reset count then
    owner: ResetEpoch,
    epoch: u64,
}

impl StagingSlot {
    fn is_retired(&self) -> bool {
        self.owner.current() > self.epoch
    }
}

/// Upload buffers owned by one destination resource.
///
/// A slot stays reserved until the command context that recorded its copy
/// resets. Frames started by other threads do not release it.
pub(crate) struct StagingRing {
    slots: Mutex<Vec<StagingSlot>>,
}

impl StagingRing {
    pub(crate) fn new() -> Self {
        Self {
            slots: Mutex::new(Vec::new()),
        }
    }

    /// Number of upload buffers created so far
    pub(crate) fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    /// Fill a retired (or new) upload buffer with `data` and hand it to `record`
    pub(crate) fn upload<F>(
        &self,
        backend: &dyn Backend,
        label: &str,
        data: &[u8],
        epoch: &ResetEpoch,
        record: F,
    ) -> Result<()>
    where
        F: FnOnce(&dyn NativeBuffer) -> Result<()>,
    {
        let mut slots = self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let size = data.len() as u64;

        let reusable = slots
            .iter()
            .position(|slot| slot.is_retired() && slot.buffer.size() >= size);

        let index = match reusable {
            Some(index) => {
                let slot = &mut slots[index];
                slot.owner = epoch.clone();
                slot.epoch = epoch.current();
                index
            }
            None => {
                let staging_label = format!("{} (staging {})", label, slots.len());
                ember_trace!("ember::Staging", "Allocating '{}' ({} bytes)", staging_label, size);
                let buffer = backend.create_buffer(&NativeBufferDesc {
                    label: &staging_label,
                    size,
                    descriptor_types: DescriptorTypes::empty(),
                    heap: HeapType::Upload,
                    initial_state: ResourceState::GENERIC_READ,
                })?;
                slots.push(StagingSlot {
                    buffer,
                    owner: epoch.clone(),
                    epoch: epoch.current(),
                });
                slots.len() - 1
            }
        };

        let staging = slots[index].buffer.as_ref();
        staging.write(0, data)?;
        record(staging)
    }
}
