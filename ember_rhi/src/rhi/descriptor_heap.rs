//! Descriptor heaps with slot recycling
//!
//! One heap exists per [`DescriptorHeapKind`] for the lifetime of a device.
//! Resources take slots when they are created and give them back on drop.

use std::sync::Mutex;

use crate::error::{Error, Result};
use crate::rhi::backend::{Backend, DescriptorHandle, DescriptorView, NativeDescriptorHeap};
use crate::rhi::types::DescriptorHeapKind;
use crate::utils::SlotAllocator;
use crate::{ember_error, ember_trace};

/// Native heap plus its slot allocator
pub struct DescriptorHeap {
    kind: DescriptorHeapKind,
    native: Box<dyn NativeDescriptorHeap>,
    stride: u32,
    cpu_start: u64,
    gpu_start: Option<u64>,
    slots: Mutex<SlotAllocator>,
}

impl DescriptorHeap {
    pub(crate) fn new(backend: &dyn Backend, kind: DescriptorHeapKind, capacity: u32) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::InitializationFailed(format!(
                "{:?} descriptor heap needs a non-zero capacity",
                kind
            )));
        }

        let native = backend.create_descriptor_heap(kind, capacity)?;
        let stride = native.descriptor_stride();
        let cpu_start = native.cpu_start();
        let gpu_start = if kind.is_shader_visible() {
            native.gpu_start()
        } else {
            None
        };

        Ok(Self {
            kind,
            native,
            stride,
            cpu_start,
            gpu_start,
            slots: Mutex::new(SlotAllocator::with_capacity(capacity)),
        })
    }

    pub fn kind(&self) -> DescriptorHeapKind {
        self.kind
    }

    pub fn capacity(&self) -> u32 {
        self.lock_slots().capacity()
    }

    /// Distance in bytes between consecutive slots
    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Number of live slots
    pub fn allocated(&self) -> u32 {
        self.lock_slots().len()
    }

    /// One past the highest slot ever handed out
    pub fn high_water_mark(&self) -> u32 {
        self.lock_slots().high_water_mark()
    }

    pub fn native(&self) -> &dyn NativeDescriptorHeap {
        self.native.as_ref()
    }

    /// Handle of slot 0, the base of the global tables
    pub fn start(&self) -> DescriptorHandle {
        self.handle(0)
    }

    /// CPU/GPU addresses of `slot`
    pub fn handle(&self, slot: u32) -> DescriptorHandle {
        let offset = slot as u64 * self.stride as u64;
        DescriptorHandle {
            index: slot,
            cpu: self.cpu_start + offset,
            gpu: self.gpu_start.map(|gpu| gpu + offset),
        }
    }

    /// Take a free slot
    pub fn allocate(&self) -> Result<u32> {
        let mut slots = self.lock_slots();
        match slots.try_alloc() {
            Some(slot) => {
                ember_trace!("ember::DescriptorHeap", "{:?} slot {} allocated", self.kind, slot);
                Ok(slot)
            }
            None => {
                let capacity = slots.capacity();
                ember_error!(
                    "ember::DescriptorHeap",
                    "{:?} heap exhausted ({} descriptors)",
                    self.kind,
                    capacity
                );
                Err(Error::DescriptorHeapExhausted {
                    kind: self.kind,
                    capacity,
                })
            }
        }
    }

    /// Return `slot` to the heap
    pub fn free(&self, slot: u32) {
        if !self.lock_slots().free(slot) {
            ember_error!(
                "ember::DescriptorHeap",
                "{:?} slot {} freed twice or never allocated",
                self.kind,
                slot
            );
        }
    }

    /// Allocate a slot and write `view` into it
    pub(crate) fn register(&self, backend: &dyn Backend, view: &DescriptorView<'_>) -> Result<u32> {
        debug_assert_eq!(view.heap_kind(), self.kind);
        let slot = self.allocate()?;
        if let Err(e) = backend.write_descriptor(self.native(), slot, view) {
            self.free(slot);
            return Err(e);
        }
        Ok(slot)
    }

    fn lock_slots(&self) -> std::sync::MutexGuard<'_, SlotAllocator> {
        // a panic while holding the lock cannot leave the free list inconsistent
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// The three heaps of a device, indexed by [`DescriptorHeapKind::index`]
pub struct DescriptorHeaps {
    heaps: [DescriptorHeap; 3],
}

impl DescriptorHeaps {
    pub(crate) fn new(backend: &dyn Backend, capacities: &crate::rhi::config::HeapCapacities) -> Result<Self> {
        Ok(Self {
            heaps: [
                DescriptorHeap::new(backend, DescriptorHeapKind::Rtv, capacities.rtv)?,
                DescriptorHeap::new(backend, DescriptorHeapKind::CbvSrvUav, capacities.cbv_srv_uav)?,
                DescriptorHeap::new(backend, DescriptorHeapKind::Sampler, capacities.sampler)?,
            ],
        })
    }

    pub fn get(&self, kind: DescriptorHeapKind) -> &DescriptorHeap {
        &self.heaps[kind.index()]
    }

    /// Native heaps in [`DescriptorHeapKind::index`] order
    pub fn natives(&self) -> [&dyn NativeDescriptorHeap; 3] {
        [
            self.heaps[0].native(),
            self.heaps[1].native(),
            self.heaps[2].native(),
        ]
    }
}

#[cfg(test)]
#[path = "descriptor_heap_tests.rs"]
mod tests;
