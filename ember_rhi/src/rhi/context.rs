//! State shared by the device and every object it creates

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::rhi::backend::Backend;
use crate::rhi::config::DeviceConfig;
use crate::rhi::descriptor_heap::{DescriptorHeap, DescriptorHeaps};
use crate::rhi::types::DescriptorHeapKind;

/// Backend, descriptor heaps and frame counter behind one `Arc`.
///
/// Resources keep the context alive so their descriptor slots can be
/// returned on drop regardless of destruction order.
pub struct RendererContext {
    backend: Arc<dyn Backend>,
    heaps: DescriptorHeaps,
    frame_generation: AtomicU64,
    config: DeviceConfig,
}

impl RendererContext {
    pub(crate) fn new(backend: Arc<dyn Backend>, config: DeviceConfig) -> Result<Self> {
        let heaps = DescriptorHeaps::new(backend.as_ref(), &config.heap_capacities)?;
        Ok(Self {
            backend,
            heaps,
            frame_generation: AtomicU64::new(0),
            config,
        })
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn heap(&self, kind: DescriptorHeapKind) -> &DescriptorHeap {
        self.heaps.get(kind)
    }

    pub fn heaps(&self) -> &DescriptorHeaps {
        &self.heaps
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Number of frames started so far
    pub fn frame_generation(&self) -> u64 {
        self.frame_generation.load(Ordering::Acquire)
    }

    pub(crate) fn advance_frame(&self) -> u64 {
        self.frame_generation.fetch_add(1, Ordering::AcqRel) + 1
    }
}
