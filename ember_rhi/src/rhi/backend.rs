//! Native backend seam
//!
//! Everything that talks to a real GPU API goes through these traits. The
//! logical layer ([`crate::rhi::Device`], [`crate::rhi::CommandList`], ...)
//! owns the lifecycle rules; a backend only translates calls. Native objects
//! are handed back to the backend as trait objects and downcast through
//! `as_any`.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::any::Any;

use crate::error::Result;
use crate::rhi::adapter::AdapterInfo;
use crate::rhi::pipeline::{GraphicsPipelineDesc, RootSignatureDesc};
use crate::rhi::shader::ShaderReflection;
use crate::rhi::texture::SamplerDesc;
use crate::rhi::types::{
    ClearValue, DescriptorHeapKind, DescriptorTypes, HeapType, IndexType, PipelineType, QueueOp,
    QueueType, Rect, ResourceState, ShaderType, TextureFormat, TextureType, Viewport,
};

// ============================================================================
// DESCRIPTORS PASSED TO THE BACKEND
// ============================================================================

/// Native buffer creation parameters
#[derive(Debug, Clone)]
pub struct NativeBufferDesc<'a> {
    pub label: &'a str,
    pub size: u64,
    pub descriptor_types: DescriptorTypes,
    pub heap: HeapType,
    pub initial_state: ResourceState,
}

/// Native texture creation parameters
#[derive(Debug, Clone)]
pub struct NativeTextureDesc<'a> {
    pub label: &'a str,
    pub texture_type: TextureType,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub descriptor_types: DescriptorTypes,
    pub initial_state: ResourceState,
}

/// Shader module creation parameters
#[derive(Debug, Clone)]
pub struct ShaderModuleDesc<'a> {
    pub label: &'a str,
    pub shader_type: ShaderType,
    pub entry_point: &'a str,
    /// Shader-model target (`cs_6_0`, ...)
    pub target: &'a str,
    pub code: &'a [u8],
}

/// Native swapchain creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainDesc {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub back_buffer_count: u32,
    pub sync_interval: u32,
}

/// Location of one descriptor inside a heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHandle {
    /// Slot index in the heap
    pub index: u32,
    /// CPU address (`cpu_start + index * stride`)
    pub cpu: u64,
    /// GPU address for shader-visible heaps
    pub gpu: Option<u64>,
}

/// A view written into a descriptor heap slot or a descriptor set binding
#[derive(Clone, Copy)]
pub enum DescriptorView<'a> {
    ConstantBuffer {
        buffer: &'a dyn NativeBuffer,
        size: u64,
    },
    ShaderResourceBuffer {
        buffer: &'a dyn NativeBuffer,
        size: u64,
        raw: bool,
    },
    UnorderedAccessBuffer {
        buffer: &'a dyn NativeBuffer,
        size: u64,
        raw: bool,
    },
    ShaderResourceTexture {
        texture: &'a dyn NativeTexture,
    },
    UnorderedAccessTexture {
        texture: &'a dyn NativeTexture,
        mip_slice: u32,
    },
    Sampler {
        sampler: &'a dyn NativeSampler,
    },
    RenderTarget {
        texture: &'a dyn NativeTexture,
    },
}

impl DescriptorView<'_> {
    /// Heap a view of this kind belongs to
    pub fn heap_kind(&self) -> DescriptorHeapKind {
        match self {
            DescriptorView::Sampler { .. } => DescriptorHeapKind::Sampler,
            DescriptorView::RenderTarget { .. } => DescriptorHeapKind::Rtv,
            _ => DescriptorHeapKind::CbvSrvUav,
        }
    }
}

/// One binding update of a reflected descriptor set
#[derive(Clone, Copy)]
pub struct DescriptorSetWrite<'a> {
    pub binding: u32,
    pub array_element: u32,
    pub view: DescriptorView<'a>,
}

/// Mip/layer range of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubresourceRange {
    pub base_mip: u32,
    pub mip_count: u32,
    pub base_layer: u32,
    pub layer_count: u32,
}

/// Queue family handover attached to a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOwnership {
    pub op: QueueOp,
    pub src_queue: QueueType,
    pub dst_queue: QueueType,
}

/// One lowered transition barrier
#[derive(Clone, Copy)]
pub enum ResourceBarrier<'a> {
    Buffer {
        buffer: &'a dyn NativeBuffer,
        before: ResourceState,
        after: ResourceState,
        ownership: Option<QueueOwnership>,
    },
    Texture {
        texture: &'a dyn NativeTexture,
        before: ResourceState,
        after: ResourceState,
        range: SubresourceRange,
        ownership: Option<QueueOwnership>,
    },
}

/// Buffer → texture copy footprint (tightly packed rows)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopyRegion {
    pub buffer_offset: u64,
    pub mip_level: u32,
    pub array_layer: u32,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}

/// Attachment of a native render pass
#[derive(Clone, Copy)]
pub struct NativeAttachment<'a> {
    pub texture: &'a dyn NativeTexture,
    pub format: TextureFormat,
    /// `None` keeps the existing contents
    pub clear: Option<ClearValue>,
}

/// Native render pass begin parameters
#[derive(Clone)]
pub struct NativeRenderPass<'a> {
    pub color_targets: Vec<NativeAttachment<'a>>,
    pub depth_target: Option<NativeAttachment<'a>>,
    pub render_area: Rect,
}

// ============================================================================
// BACKEND FACTORY
// ============================================================================

/// Device-level entry point of a native API
pub trait Backend: Send + Sync {
    /// Adapter the backend opened
    fn adapter(&self) -> &AdapterInfo;

    fn create_command_allocator(&self, queue: QueueType) -> Result<Box<dyn NativeCommandAllocator>>;

    /// Create a command list drawing its memory from `allocator`
    fn create_command_list(
        &self,
        queue: QueueType,
        allocator: &dyn NativeCommandAllocator,
    ) -> Result<Box<dyn NativeCommandList>>;

    /// Execute closed command lists on `queue` in slice order
    fn execute_command_lists(&self, queue: QueueType, lists: &[&dyn NativeCommandList]) -> Result<()>;

    fn create_fence(&self) -> Result<Box<dyn NativeFence>>;

    /// Make `queue` set `fence` to `value` once all previously submitted work completed
    fn signal_fence(&self, queue: QueueType, fence: &dyn NativeFence, value: u64) -> Result<()>;

    fn create_buffer(&self, desc: &NativeBufferDesc<'_>) -> Result<Box<dyn NativeBuffer>>;

    fn create_texture(&self, desc: &NativeTextureDesc<'_>) -> Result<Box<dyn NativeTexture>>;

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Box<dyn NativeSampler>>;

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<Box<dyn NativeDescriptorHeap>>;

    /// Write `view` into `slot` of `heap`
    fn write_descriptor(
        &self,
        heap: &dyn NativeDescriptorHeap,
        slot: u32,
        view: &DescriptorView<'_>,
    ) -> Result<()>;

    /// Create and validate a shader module, returning its reflection
    fn create_shader(&self, desc: &ShaderModuleDesc<'_>) -> Result<Box<dyn NativeShader>>;

    /// `heaps` is indexed by [`DescriptorHeapKind::index`]
    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
        heaps: &[&dyn NativeDescriptorHeap],
    ) -> Result<Box<dyn NativeRootSignature>>;

    fn create_compute_pipeline(
        &self,
        root: &dyn NativeRootSignature,
        shader: &dyn NativeShader,
    ) -> Result<Box<dyn NativePipeline>>;

    fn create_graphics_pipeline(
        &self,
        root: &dyn NativeRootSignature,
        desc: &GraphicsPipelineDesc,
        vertex: &dyn NativeShader,
        pixel: Option<&dyn NativeShader>,
    ) -> Result<Box<dyn NativePipeline>>;

    /// Allocate a descriptor set for table `set_index` of a reflected root signature
    fn create_descriptor_set(
        &self,
        root: &dyn NativeRootSignature,
        set_index: u32,
    ) -> Result<Box<dyn NativeDescriptorSet>>;

    fn update_descriptor_set(
        &self,
        set: &dyn NativeDescriptorSet,
        writes: &[DescriptorSetWrite<'_>],
    ) -> Result<()>;

    fn create_swap_chain(
        &self,
        desc: &SwapChainDesc,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Box<dyn NativeSwapChain>>;

    /// Block until every queue is idle
    fn wait_idle(&self) -> Result<()>;
}

// ============================================================================
// NATIVE OBJECTS
// ============================================================================

/// Backing memory of command lists
pub trait NativeCommandAllocator: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Recycle the memory of every list drawn from this allocator
    fn reset(&self) -> Result<()>;
}

/// Native command recorder. Recording calls cannot fail; errors surface at
/// `close` or submission.
pub trait NativeCommandList: Send {
    fn as_any(&self) -> &dyn Any;

    /// Reset against `allocator` and open for recording
    fn begin(&mut self, allocator: &dyn NativeCommandAllocator) -> Result<()>;

    fn close(&mut self) -> Result<()>;

    /// Issue every barrier in one native call
    fn resource_barrier(&mut self, barriers: &[ResourceBarrier<'_>]);

    fn set_pipeline_state(&mut self, pipeline: &dyn NativePipeline);

    fn set_descriptor_heaps(&mut self, heaps: &[&dyn NativeDescriptorHeap]);

    fn set_root_descriptor_table(
        &mut self,
        pipeline_type: PipelineType,
        root: &dyn NativeRootSignature,
        root_index: u32,
        heap: &dyn NativeDescriptorHeap,
        base: DescriptorHandle,
    );

    fn set_root_constants(
        &mut self,
        pipeline_type: PipelineType,
        root: &dyn NativeRootSignature,
        offset: u32,
        data: &[u8],
    );

    fn bind_descriptor_set(
        &mut self,
        pipeline_type: PipelineType,
        root: &dyn NativeRootSignature,
        set_index: u32,
        set: &dyn NativeDescriptorSet,
    );

    fn copy_buffer_region(
        &mut self,
        dst: &dyn NativeBuffer,
        dst_offset: u64,
        src: &dyn NativeBuffer,
        src_offset: u64,
        size: u64,
    );

    fn copy_buffer_to_texture(
        &mut self,
        dst: &dyn NativeTexture,
        src: &dyn NativeBuffer,
        region: &TextureCopyRegion,
    );

    fn copy_texture(
        &mut self,
        dst: &dyn NativeTexture,
        dst_state: ResourceState,
        src: &dyn NativeTexture,
        src_state: ResourceState,
    );

    /// Fill the whole buffer with a repeated 32-bit pattern
    fn fill_buffer(&mut self, dst: &dyn NativeBuffer, value: u32);

    fn clear_texture(&mut self, texture: &dyn NativeTexture, state: ResourceState, color: [f32; 4]);

    /// Downsample mip 0 into the rest of the chain; every mip starts in
    /// COPY_DEST and ends in COPY_SOURCE
    fn generate_mips(&mut self, texture: &dyn NativeTexture);

    fn begin_render_pass(&mut self, pass: &NativeRenderPass<'_>);

    fn end_render_pass(&mut self);

    fn set_viewport(&mut self, viewport: &Viewport);

    fn set_scissor(&mut self, rect: &Rect);

    fn bind_vertex_buffers(&mut self, first_slot: u32, buffers: &[(&dyn NativeBuffer, u64)]);

    fn bind_index_buffer(&mut self, buffer: &dyn NativeBuffer, offset: u64, index_type: IndexType);

    fn draw_instanced(
        &mut self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    );

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        first_index: u32,
        vertex_offset: i32,
        first_instance: u32,
    );

    fn draw_indexed_indirect(&mut self, buffer: &dyn NativeBuffer, offset: u64, draw_count: u32, stride: u32);

    fn dispatch(&mut self, x: u32, y: u32, z: u32);

    fn dispatch_indirect(&mut self, buffer: &dyn NativeBuffer, offset: u64);
}

/// Monotonic GPU/CPU fence
pub trait NativeFence: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Last value the GPU reached
    fn completed_value(&self) -> Result<u64>;

    /// Block the calling thread until the fence reaches `value`
    fn wait(&self, value: u64) -> Result<()>;
}

pub trait NativeBuffer: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn size(&self) -> u64;

    /// Map, copy `data` at `offset`, unmap. Host-visible memory only.
    fn write(&self, offset: u64, data: &[u8]) -> Result<()>;

    /// Map, copy into `out` from `offset`, unmap. Host-visible memory only.
    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()>;
}

pub trait NativeTexture: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait NativeSampler: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait NativeDescriptorHeap: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    /// Distance in bytes between two consecutive slots
    fn descriptor_stride(&self) -> u32;

    fn cpu_start(&self) -> u64;

    /// `None` for heaps shaders cannot see
    fn gpu_start(&self) -> Option<u64>;
}

pub trait NativeShader: Send + Sync {
    fn as_any(&self) -> &dyn Any;

    fn reflection(&self) -> &ShaderReflection;
}

pub trait NativeRootSignature: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait NativePipeline: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait NativeDescriptorSet: Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

pub trait NativeSwapChain: Send {
    fn as_any(&self) -> &dyn Any;

    /// Acquire the next presentable image and return its index
    fn acquire_next_image(&mut self) -> Result<u32>;

    fn present(&mut self, sync_interval: u32) -> Result<()>;

    fn image_count(&self) -> u32;

    fn extent(&self) -> (u32, u32);

    fn format(&self) -> TextureFormat;

    /// Non-owning handle to back buffer `index`
    fn back_buffer(&self, index: u32) -> Result<Box<dyn NativeTexture>>;

    /// Recreate the images at the new size
    fn resize(&mut self, width: u32, height: u32) -> Result<()>;
}
