//! Shared RHI enums, flags and constants

use bitflags::bitflags;

/// Upper bound on texture mip chains
pub const MAX_MIP_LEVEL: u32 = 12;

/// Constant buffer sizes must be a multiple of this
pub const CONSTANT_BUFFER_ALIGNMENT: u64 = 256;

/// Maximum simultaneously bound color targets in a render pass
pub const MAX_RENDER_TARGETS: usize = 8;

/// Entry point every shader module must export
pub const SHADER_ENTRY_POINT: &str = "Main";

/// Number of queue types
pub const QUEUE_TYPE_COUNT: usize = 3;

// ===== QUEUES =====

/// Hardware queue a command list records for and is submitted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueType {
    Graphics,
    Compute,
    Transfer,
}

impl QueueType {
    /// All queue types in index order
    pub const ALL: [QueueType; QUEUE_TYPE_COUNT] =
        [QueueType::Graphics, QueueType::Compute, QueueType::Transfer];

    /// Dense index used by per-queue arrays
    pub fn index(self) -> usize {
        match self {
            QueueType::Graphics => 0,
            QueueType::Compute => 1,
            QueueType::Transfer => 2,
        }
    }
}

/// Queue-ownership transfer carried by a barrier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueueOp {
    #[default]
    Ignored,
    /// Hand the resource over to another queue type
    Release,
    /// Take the resource over from another queue type
    Acquire,
}

// ===== MEMORY =====

/// Where a resource lives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MemoryFlag {
    /// Host-writable upload memory
    CpuVisible,
    /// Device-local memory, only reachable through copies
    #[default]
    Dedicated,
    /// Host-readable memory for GPU readback
    GpuToCpu,
}

/// Native heap type a [`MemoryFlag`] resolves to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapType {
    Upload,
    Default,
    Readback,
}

impl MemoryFlag {
    pub fn heap_type(self) -> HeapType {
        match self {
            MemoryFlag::CpuVisible => HeapType::Upload,
            MemoryFlag::Dedicated => HeapType::Default,
            MemoryFlag::GpuToCpu => HeapType::Readback,
        }
    }

    /// Whether the CPU can map the memory
    pub fn is_host_visible(self) -> bool {
        !matches!(self, MemoryFlag::Dedicated)
    }
}

bitflags! {
    /// Usage state of a resource on the GPU timeline
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceState: u32 {
        const UNDEFINED = 0;
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        const INDEX_BUFFER = 0x2;
        const RENDER_TARGET = 0x4;
        const UNORDERED_ACCESS = 0x8;
        const DEPTH_WRITE = 0x10;
        const DEPTH_READ = 0x20;
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        const PIXEL_SHADER_RESOURCE = 0x80;
        const SHADER_RESOURCE = 0x40 | 0x80;
        const STREAM_OUT = 0x100;
        const INDIRECT_ARGUMENT = 0x200;
        const COPY_DEST = 0x400;
        const COPY_SOURCE = 0x800;
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        const PRESENT = 0x1000;
        const COMMON = 0x2000;
        const RAYTRACING_ACCELERATION_STRUCTURE = 0x4000;
        const SHADING_RATE_SOURCE = 0x8000;
        const HOST_READ = 0x10000;
        const HOST_WRITE = 0x20000;
    }
}

impl ResourceState {
    /// States in which the GPU may write the resource
    pub fn is_write(self) -> bool {
        self.intersects(
            ResourceState::RENDER_TARGET
                | ResourceState::UNORDERED_ACCESS
                | ResourceState::DEPTH_WRITE
                | ResourceState::STREAM_OUT
                | ResourceState::COPY_DEST
                | ResourceState::HOST_WRITE,
        )
    }
}

bitflags! {
    /// Views and bind points requested for a resource
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorTypes: u32 {
        const SAMPLER = 0x1;
        const TEXTURE = 0x2;
        const RW_TEXTURE = 0x4;
        const BUFFER = 0x8;
        const BUFFER_RAW = 0x8 | 0x10;
        const RW_BUFFER = 0x20;
        const RW_BUFFER_RAW = 0x20 | 0x40;
        const CONSTANT_BUFFER = 0x80;
        const ROOT_CONSTANT = 0x100;
        const VERTEX_BUFFER = 0x200;
        const INDEX_BUFFER = 0x400;
        const INDIRECT_BUFFER = 0x800;
        const TEXTURE_CUBE = 0x2 | 0x1000;
        const COLOR_ATTACHMENT = 0x2000;
        const DEPTH_STENCIL_ATTACHMENT = 0x4000;
    }
}

// ===== DESCRIPTOR HEAPS =====

/// Descriptor heap flavors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Render target views (CPU only)
    Rtv,
    /// Constant, shader-resource and unordered-access views
    CbvSrvUav,
    Sampler,
}

impl DescriptorHeapKind {
    pub const ALL: [DescriptorHeapKind; 3] = [
        DescriptorHeapKind::Rtv,
        DescriptorHeapKind::CbvSrvUav,
        DescriptorHeapKind::Sampler,
    ];

    pub fn index(self) -> usize {
        match self {
            DescriptorHeapKind::Rtv => 0,
            DescriptorHeapKind::CbvSrvUav => 1,
            DescriptorHeapKind::Sampler => 2,
        }
    }

    /// Whether shaders can index the heap
    pub fn is_shader_visible(self) -> bool {
        !matches!(self, DescriptorHeapKind::Rtv)
    }
}

// ===== TEXTURES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextureType {
    Tex1D,
    #[default]
    Tex2D,
    Tex3D,
    TexCube,
}

#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureFormat {
    #[default]
    R8G8B8A8_UNORM,
    R8G8B8A8_SRGB,
    B8G8R8A8_UNORM,
    B8G8R8A8_SRGB,
    R16G16B16A16_FLOAT,
    R32_FLOAT,
    R32_UINT,
    R32G32_FLOAT,
    R32G32B32A32_FLOAT,
    D32_FLOAT,
    D24_UNORM_S8_UINT,
}

impl TextureFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            TextureFormat::R8G8B8A8_UNORM
            | TextureFormat::R8G8B8A8_SRGB
            | TextureFormat::B8G8R8A8_UNORM
            | TextureFormat::B8G8R8A8_SRGB
            | TextureFormat::R32_FLOAT
            | TextureFormat::R32_UINT
            | TextureFormat::D32_FLOAT
            | TextureFormat::D24_UNORM_S8_UINT => 4,
            TextureFormat::R16G16B16A16_FLOAT | TextureFormat::R32G32_FLOAT => 8,
            TextureFormat::R32G32B32A32_FLOAT => 16,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, TextureFormat::D32_FLOAT | TextureFormat::D24_UNORM_S8_UINT)
    }

    pub fn has_stencil(self) -> bool {
        matches!(self, TextureFormat::D24_UNORM_S8_UINT)
    }
}

/// Mip chain length for a texture.
///
/// `min(MAX_MIP_LEVEL, floor(log2(max(width, height))) + 1)` when mipmaps are
/// enabled, 1 otherwise.
pub fn mip_level_count(width: u32, height: u32, enable_mipmap: bool) -> u32 {
    if !enable_mipmap {
        return 1;
    }
    let largest = width.max(height).max(1);
    let floor_log2 = 31 - largest.leading_zeros();
    (floor_log2 + 1).min(MAX_MIP_LEVEL)
}

// ===== SHADERS AND PIPELINES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderType {
    Vertex,
    Pixel,
    Compute,
}

impl ShaderType {
    /// Shader-model target string (`vs_6_0`, `ps_6_0`, `cs_6_0`)
    pub fn target(self) -> &'static str {
        match self {
            ShaderType::Vertex => "vs_6_0",
            ShaderType::Pixel => "ps_6_0",
            ShaderType::Compute => "cs_6_0",
        }
    }

    pub fn pipeline_type(self) -> PipelineType {
        match self {
            ShaderType::Vertex | ShaderType::Pixel => PipelineType::Graphics,
            ShaderType::Compute => PipelineType::Compute,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineType {
    Graphics,
    Compute,
}

// ===== RECORDING HELPERS =====

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub min_depth: f32,
    pub max_depth: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexType {
    U16,
    U32,
}

#[cfg(test)]
#[path = "types_tests.rs"]
mod tests;
