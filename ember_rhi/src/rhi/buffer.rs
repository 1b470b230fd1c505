//! GPU buffers
//!
//! A [`Buffer`] owns its native allocation, one descriptor slot per requested
//! view and a staging ring used by `CommandList::update_buffer`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::rhi::backend::{DescriptorView, NativeBuffer, NativeBufferDesc};
use crate::rhi::context::RendererContext;
use crate::rhi::staging::StagingRing;
use crate::rhi::types::{
    DescriptorHeapKind, DescriptorTypes, MemoryFlag, ResourceState, CONSTANT_BUFFER_ALIGNMENT,
};
use crate::ember_debug;

/// Buffer creation parameters
#[derive(Debug, Clone)]
pub struct BufferCreateInfo {
    pub label: String,
    /// Size in bytes
    pub size: u64,
    pub descriptor_types: DescriptorTypes,
    /// Requested initial state for dedicated memory.
    /// `UNDEFINED` means COPY_DEST.
    pub initial_state: ResourceState,
}

impl Default for BufferCreateInfo {
    fn default() -> Self {
        Self {
            label: String::from("buffer"),
            size: 0,
            descriptor_types: DescriptorTypes::empty(),
            initial_state: ResourceState::UNDEFINED,
        }
    }
}

/// State a buffer starts in for a given residency
pub fn initial_buffer_state(memory: MemoryFlag, requested: ResourceState) -> ResourceState {
    match memory {
        MemoryFlag::CpuVisible => ResourceState::GENERIC_READ,
        MemoryFlag::GpuToCpu => ResourceState::COPY_DEST,
        MemoryFlag::Dedicated if requested.is_empty() => ResourceState::COPY_DEST,
        MemoryFlag::Dedicated => requested,
    }
}

/// Heap slots of the views a buffer exposes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferViews {
    pub cbv: Option<u32>,
    pub srv: Option<u32>,
    pub uav: Option<u32>,
}

pub struct Buffer {
    context: Arc<RendererContext>,
    native: Box<dyn NativeBuffer>,
    label: String,
    size: u64,
    descriptor_types: DescriptorTypes,
    memory: MemoryFlag,
    state: AtomicU32,
    views: BufferViews,
    staging: StagingRing,
}

impl Buffer {
    pub(crate) fn new(context: Arc<RendererContext>, info: &BufferCreateInfo, memory: MemoryFlag) -> Result<Self> {
        if info.descriptor_types.contains(DescriptorTypes::CONSTANT_BUFFER) {
            assert!(
                info.size % CONSTANT_BUFFER_ALIGNMENT == 0,
                "constant buffer '{}' size {} is not a multiple of {}",
                info.label,
                info.size,
                CONSTANT_BUFFER_ALIGNMENT
            );
        }
        if info.size == 0 {
            return Err(Error::InvalidResource(format!("Buffer '{}' has zero size", info.label)));
        }

        let state = initial_buffer_state(memory, info.initial_state);
        let native = context.backend().create_buffer(&NativeBufferDesc {
            label: &info.label,
            size: info.size,
            descriptor_types: info.descriptor_types,
            heap: memory.heap_type(),
            initial_state: state,
        })?;

        let mut buffer = Self {
            context,
            native,
            label: info.label.clone(),
            size: info.size,
            descriptor_types: info.descriptor_types,
            memory,
            state: AtomicU32::new(state.bits()),
            views: BufferViews::default(),
            staging: StagingRing::new(),
        };

        // Drop releases whatever slots were taken if a later view fails
        buffer.views.cbv = buffer.register_view(DescriptorTypes::CONSTANT_BUFFER)?;
        buffer.views.srv = buffer.register_view(DescriptorTypes::BUFFER)?;
        buffer.views.uav = buffer.register_view(DescriptorTypes::RW_BUFFER)?;

        ember_debug!(
            "ember::Buffer",
            "Created '{}' ({} bytes, {:?}, {:?})",
            buffer.label,
            buffer.size,
            memory,
            state
        );
        Ok(buffer)
    }

    fn register_view(&self, view_type: DescriptorTypes) -> Result<Option<u32>> {
        if !self.descriptor_types.contains(view_type) {
            return Ok(None);
        }
        let native = self.native.as_ref();
        let size = self.size;
        let view = if view_type == DescriptorTypes::CONSTANT_BUFFER {
            DescriptorView::ConstantBuffer { buffer: native, size }
        } else if view_type == DescriptorTypes::BUFFER {
            DescriptorView::ShaderResourceBuffer {
                buffer: native,
                size,
                raw: self.descriptor_types.contains(DescriptorTypes::BUFFER_RAW),
            }
        } else {
            DescriptorView::UnorderedAccessBuffer {
                buffer: native,
                size,
                raw: self.descriptor_types.contains(DescriptorTypes::RW_BUFFER_RAW),
            }
        };
        let heap = self.context.heap(DescriptorHeapKind::CbvSrvUav);
        heap.register(self.context.backend(), &view).map(Some)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn descriptor_types(&self) -> DescriptorTypes {
        self.descriptor_types
    }

    pub fn memory(&self) -> MemoryFlag {
        self.memory
    }

    /// Last tracked state
    pub fn state(&self) -> ResourceState {
        ResourceState::from_bits_retain(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        self.state.store(state.bits(), Ordering::Release);
    }

    pub fn views(&self) -> BufferViews {
        self.views
    }

    /// Heap index of the constant buffer view
    pub fn cbv_index(&self) -> Option<u32> {
        self.views.cbv
    }

    pub fn srv_index(&self) -> Option<u32> {
        self.views.srv
    }

    pub fn uav_index(&self) -> Option<u32> {
        self.views.uav
    }

    pub fn native(&self) -> &dyn NativeBuffer {
        self.native.as_ref()
    }

    /// Copy `data` into host-visible memory at `offset`
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        self.check_host_access(offset, data.len() as u64)?;
        self.native.write(offset, data)
    }

    /// Copy host-visible memory at `offset` into `out`
    pub fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        self.check_host_access(offset, out.len() as u64)?;
        self.native.read(offset, out)
    }

    /// Typed variant of [`Buffer::read`]
    pub fn read_pod<T: bytemuck::Pod + bytemuck::Zeroable>(&self, offset: u64, count: usize) -> Result<Vec<T>> {
        let mut values = vec![T::zeroed(); count];
        self.read(offset, bytemuck::cast_slice_mut(&mut values))?;
        Ok(values)
    }

    /// Number of staging buffers created for uploads into this buffer
    pub fn staging_buffer_count(&self) -> usize {
        self.staging.len()
    }

    pub(crate) fn staging(&self) -> &StagingRing {
        &self.staging
    }

    pub(crate) fn context(&self) -> &Arc<RendererContext> {
        &self.context
    }

    fn check_host_access(&self, offset: u64, len: u64) -> Result<()> {
        if !self.memory.is_host_visible() {
            return Err(Error::InvalidState(format!(
                "Buffer '{}' lives in dedicated memory and cannot be mapped",
                self.label
            )));
        }
        match offset.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Error::InvalidResource(format!(
                "Range {}+{} out of bounds for buffer '{}' ({} bytes)",
                offset, len, self.label, self.size
            ))),
        }
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        let heap = self.context.heap(DescriptorHeapKind::CbvSrvUav);
        for slot in [self.views.cbv, self.views.srv, self.views.uav].into_iter().flatten() {
            heap.free(slot);
        }
    }
}

impl std::fmt::Debug for Buffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Buffer")
            .field("label", &self.label)
            .field("size", &self.size)
            .field("memory", &self.memory)
            .field("state", &self.state())
            .field("views", &self.views)
            .finish()
    }
}

#[cfg(test)]
#[path = "buffer_tests.rs"]
mod tests;
