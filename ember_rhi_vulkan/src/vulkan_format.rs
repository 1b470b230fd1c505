//! Conversions from RHI enums and flags to Vulkan

use ash::vk;
use ember_rhi::ember::rhi::{
    AddressMode, BindingKind, CompareOp, CullMode, DescriptorTypes, Filter, FrontFace, HeapType, IndexType,
    PrimitiveTopology, ResourceState, TextureFormat, TextureType, VertexFormat, VertexInputRate,
};
use gpu_allocator::MemoryLocation;

// ============================================================================
// FORMATS
// ============================================================================

pub(crate) fn texture_format_to_vk(format: TextureFormat) -> vk::Format {
    match format {
        TextureFormat::R8G8B8A8_UNORM => vk::Format::R8G8B8A8_UNORM,
        TextureFormat::R8G8B8A8_SRGB => vk::Format::R8G8B8A8_SRGB,
        TextureFormat::B8G8R8A8_UNORM => vk::Format::B8G8R8A8_UNORM,
        TextureFormat::B8G8R8A8_SRGB => vk::Format::B8G8R8A8_SRGB,
        TextureFormat::R16G16B16A16_FLOAT => vk::Format::R16G16B16A16_SFLOAT,
        TextureFormat::R32_FLOAT => vk::Format::R32_SFLOAT,
        TextureFormat::R32_UINT => vk::Format::R32_UINT,
        TextureFormat::R32G32_FLOAT => vk::Format::R32G32_SFLOAT,
        TextureFormat::R32G32B32A32_FLOAT => vk::Format::R32G32B32A32_SFLOAT,
        TextureFormat::D32_FLOAT => vk::Format::D32_SFLOAT,
        TextureFormat::D24_UNORM_S8_UINT => vk::Format::D24_UNORM_S8_UINT,
    }
}

/// Swapchain surface format back to an RHI format
pub(crate) fn vk_to_texture_format(format: vk::Format) -> Option<TextureFormat> {
    match format {
        vk::Format::R8G8B8A8_UNORM => Some(TextureFormat::R8G8B8A8_UNORM),
        vk::Format::R8G8B8A8_SRGB => Some(TextureFormat::R8G8B8A8_SRGB),
        vk::Format::B8G8R8A8_UNORM => Some(TextureFormat::B8G8R8A8_UNORM),
        vk::Format::B8G8R8A8_SRGB => Some(TextureFormat::B8G8R8A8_SRGB),
        vk::Format::R16G16B16A16_SFLOAT => Some(TextureFormat::R16G16B16A16_FLOAT),
        _ => None,
    }
}

pub(crate) fn aspect_mask(format: TextureFormat) -> vk::ImageAspectFlags {
    if format.has_stencil() {
        vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
    } else if format.is_depth() {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

pub(crate) fn vertex_format_to_vk(format: VertexFormat) -> vk::Format {
    match format {
        VertexFormat::Float32 => vk::Format::R32_SFLOAT,
        VertexFormat::Float32x2 => vk::Format::R32G32_SFLOAT,
        VertexFormat::Float32x3 => vk::Format::R32G32B32_SFLOAT,
        VertexFormat::Float32x4 => vk::Format::R32G32B32A32_SFLOAT,
        VertexFormat::Uint32 => vk::Format::R32_UINT,
        VertexFormat::Unorm8x4 => vk::Format::R8G8B8A8_UNORM,
    }
}

pub(crate) fn index_type_to_vk(index_type: IndexType) -> vk::IndexType {
    match index_type {
        IndexType::U16 => vk::IndexType::UINT16,
        IndexType::U32 => vk::IndexType::UINT32,
    }
}

// ============================================================================
// IMAGES
// ============================================================================

pub(crate) fn image_type_to_vk(texture_type: TextureType) -> vk::ImageType {
    match texture_type {
        TextureType::Tex1D => vk::ImageType::TYPE_1D,
        TextureType::Tex2D | TextureType::TexCube => vk::ImageType::TYPE_2D,
        TextureType::Tex3D => vk::ImageType::TYPE_3D,
    }
}

pub(crate) fn view_type_to_vk(texture_type: TextureType, array_layers: u32) -> vk::ImageViewType {
    match (texture_type, array_layers) {
        (TextureType::Tex1D, 1) => vk::ImageViewType::TYPE_1D,
        (TextureType::Tex1D, _) => vk::ImageViewType::TYPE_1D_ARRAY,
        (TextureType::Tex2D, 1) => vk::ImageViewType::TYPE_2D,
        (TextureType::Tex2D, _) => vk::ImageViewType::TYPE_2D_ARRAY,
        (TextureType::Tex3D, _) => vk::ImageViewType::TYPE_3D,
        (TextureType::TexCube, 6) => vk::ImageViewType::CUBE,
        (TextureType::TexCube, _) => vk::ImageViewType::CUBE_ARRAY,
    }
}

/// Storage views cannot be cubes; they address every face as a layer
pub(crate) fn storage_view_type_to_vk(texture_type: TextureType, array_layers: u32) -> vk::ImageViewType {
    match texture_type {
        TextureType::TexCube => vk::ImageViewType::TYPE_2D_ARRAY,
        other => view_type_to_vk(other, array_layers),
    }
}

pub(crate) fn image_usage(descriptor_types: DescriptorTypes) -> vk::ImageUsageFlags {
    let mut usage = vk::ImageUsageFlags::TRANSFER_SRC | vk::ImageUsageFlags::TRANSFER_DST;
    if descriptor_types.intersects(DescriptorTypes::TEXTURE | DescriptorTypes::TEXTURE_CUBE) {
        usage |= vk::ImageUsageFlags::SAMPLED;
    }
    if descriptor_types.contains(DescriptorTypes::RW_TEXTURE) {
        usage |= vk::ImageUsageFlags::STORAGE;
    }
    if descriptor_types.contains(DescriptorTypes::COLOR_ATTACHMENT) {
        usage |= vk::ImageUsageFlags::COLOR_ATTACHMENT;
    }
    if descriptor_types.contains(DescriptorTypes::DEPTH_STENCIL_ATTACHMENT) {
        usage |= vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;
    }
    usage
}

// ============================================================================
// BUFFERS AND MEMORY
// ============================================================================

pub(crate) fn buffer_usage(descriptor_types: DescriptorTypes) -> vk::BufferUsageFlags {
    let mut usage = vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST;
    if descriptor_types.contains(DescriptorTypes::CONSTANT_BUFFER) {
        usage |= vk::BufferUsageFlags::UNIFORM_BUFFER;
    }
    if descriptor_types.intersects(DescriptorTypes::BUFFER | DescriptorTypes::RW_BUFFER) {
        usage |= vk::BufferUsageFlags::STORAGE_BUFFER;
    }
    if descriptor_types.contains(DescriptorTypes::VERTEX_BUFFER) {
        usage |= vk::BufferUsageFlags::VERTEX_BUFFER;
    }
    if descriptor_types.contains(DescriptorTypes::INDEX_BUFFER) {
        usage |= vk::BufferUsageFlags::INDEX_BUFFER;
    }
    if descriptor_types.contains(DescriptorTypes::INDIRECT_BUFFER) {
        usage |= vk::BufferUsageFlags::INDIRECT_BUFFER;
    }
    usage
}

pub(crate) fn heap_to_memory_location(heap: HeapType) -> MemoryLocation {
    match heap {
        HeapType::Upload => MemoryLocation::CpuToGpu,
        HeapType::Default => MemoryLocation::GpuOnly,
        HeapType::Readback => MemoryLocation::GpuToCpu,
    }
}

// ============================================================================
// SAMPLERS AND BINDINGS
// ============================================================================

pub(crate) fn filter_to_vk(filter: Filter) -> vk::Filter {
    match filter {
        Filter::Nearest => vk::Filter::NEAREST,
        Filter::Linear => vk::Filter::LINEAR,
    }
}

pub(crate) fn mipmap_mode_to_vk(filter: Filter) -> vk::SamplerMipmapMode {
    match filter {
        Filter::Nearest => vk::SamplerMipmapMode::NEAREST,
        Filter::Linear => vk::SamplerMipmapMode::LINEAR,
    }
}

pub(crate) fn address_mode_to_vk(mode: AddressMode) -> vk::SamplerAddressMode {
    match mode {
        AddressMode::Repeat => vk::SamplerAddressMode::REPEAT,
        AddressMode::MirroredRepeat => vk::SamplerAddressMode::MIRRORED_REPEAT,
        AddressMode::ClampToEdge => vk::SamplerAddressMode::CLAMP_TO_EDGE,
        AddressMode::ClampToBorder => vk::SamplerAddressMode::CLAMP_TO_BORDER,
    }
}

pub(crate) fn binding_kind_to_vk(kind: BindingKind) -> vk::DescriptorType {
    match kind {
        BindingKind::ConstantBuffer => vk::DescriptorType::UNIFORM_BUFFER,
        BindingKind::ShaderResourceBuffer | BindingKind::UnorderedAccessBuffer => vk::DescriptorType::STORAGE_BUFFER,
        BindingKind::ShaderResourceTexture => vk::DescriptorType::SAMPLED_IMAGE,
        BindingKind::UnorderedAccessTexture => vk::DescriptorType::STORAGE_IMAGE,
        BindingKind::Sampler => vk::DescriptorType::SAMPLER,
    }
}

// ============================================================================
// PIPELINE STATE
// ============================================================================

pub(crate) fn topology_to_vk(topology: PrimitiveTopology) -> vk::PrimitiveTopology {
    match topology {
        PrimitiveTopology::TriangleList => vk::PrimitiveTopology::TRIANGLE_LIST,
        PrimitiveTopology::TriangleStrip => vk::PrimitiveTopology::TRIANGLE_STRIP,
        PrimitiveTopology::LineList => vk::PrimitiveTopology::LINE_LIST,
        PrimitiveTopology::PointList => vk::PrimitiveTopology::POINT_LIST,
    }
}

pub(crate) fn cull_mode_to_vk(mode: CullMode) -> vk::CullModeFlags {
    match mode {
        CullMode::None => vk::CullModeFlags::NONE,
        CullMode::Front => vk::CullModeFlags::FRONT,
        CullMode::Back => vk::CullModeFlags::BACK,
    }
}

pub(crate) fn front_face_to_vk(face: FrontFace) -> vk::FrontFace {
    match face {
        FrontFace::CounterClockwise => vk::FrontFace::COUNTER_CLOCKWISE,
        FrontFace::Clockwise => vk::FrontFace::CLOCKWISE,
    }
}

pub(crate) fn compare_op_to_vk(op: CompareOp) -> vk::CompareOp {
    match op {
        CompareOp::Never => vk::CompareOp::NEVER,
        CompareOp::Less => vk::CompareOp::LESS,
        CompareOp::Equal => vk::CompareOp::EQUAL,
        CompareOp::LessOrEqual => vk::CompareOp::LESS_OR_EQUAL,
        CompareOp::Greater => vk::CompareOp::GREATER,
        CompareOp::NotEqual => vk::CompareOp::NOT_EQUAL,
        CompareOp::GreaterOrEqual => vk::CompareOp::GREATER_OR_EQUAL,
        CompareOp::Always => vk::CompareOp::ALWAYS,
    }
}

pub(crate) fn input_rate_to_vk(rate: VertexInputRate) -> vk::VertexInputRate {
    match rate {
        VertexInputRate::Vertex => vk::VertexInputRate::VERTEX,
        VertexInputRate::Instance => vk::VertexInputRate::INSTANCE,
    }
}

// ============================================================================
// RESOURCE STATES
// ============================================================================

/// Synchronization scope and image layout of a resource state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct StateAccess {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

const SHADER_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw()
        | vk::PipelineStageFlags2::FRAGMENT_SHADER.as_raw()
        | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
);

const NON_PIXEL_SHADER_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::VERTEX_SHADER.as_raw() | vk::PipelineStageFlags2::COMPUTE_SHADER.as_raw(),
);

const FRAGMENT_TESTS: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

const SHADER_READ: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_SAMPLED_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_READ.as_raw(),
);

/// (state bit, stages, accesses) folded by [`state_to_vk`]
const STATE_SCOPES: [(ResourceState, vk::PipelineStageFlags2, vk::AccessFlags2); 18] = [
    (
        ResourceState::VERTEX_AND_CONSTANT_BUFFER,
        vk::PipelineStageFlags2::from_raw(
            vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT.as_raw() | SHADER_STAGES.as_raw(),
        ),
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::VERTEX_ATTRIBUTE_READ.as_raw() | vk::AccessFlags2::UNIFORM_READ.as_raw(),
        ),
    ),
    (
        ResourceState::INDEX_BUFFER,
        vk::PipelineStageFlags2::INDEX_INPUT,
        vk::AccessFlags2::INDEX_READ,
    ),
    (
        ResourceState::RENDER_TARGET,
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
    ),
    (
        ResourceState::UNORDERED_ACCESS,
        SHADER_STAGES,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
        ),
    ),
    (
        ResourceState::DEPTH_WRITE,
        FRAGMENT_TESTS,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
    ),
    (
        ResourceState::DEPTH_READ,
        FRAGMENT_TESTS,
        vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
    ),
    (
        ResourceState::NON_PIXEL_SHADER_RESOURCE,
        NON_PIXEL_SHADER_STAGES,
        SHADER_READ,
    ),
    (
        ResourceState::PIXEL_SHADER_RESOURCE,
        vk::PipelineStageFlags2::FRAGMENT_SHADER,
        SHADER_READ,
    ),
    (
        ResourceState::STREAM_OUT,
        vk::PipelineStageFlags2::ALL_COMMANDS,
        vk::AccessFlags2::MEMORY_WRITE,
    ),
    (
        ResourceState::INDIRECT_ARGUMENT,
        vk::PipelineStageFlags2::DRAW_INDIRECT,
        vk::AccessFlags2::INDIRECT_COMMAND_READ,
    ),
    (
        ResourceState::COPY_DEST,
        vk::PipelineStageFlags2::ALL_TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
    ),
    (
        ResourceState::COPY_SOURCE,
        vk::PipelineStageFlags2::ALL_TRANSFER,
        vk::AccessFlags2::TRANSFER_READ,
    ),
    (
        ResourceState::PRESENT,
        vk::PipelineStageFlags2::NONE,
        vk::AccessFlags2::NONE,
    ),
    (
        ResourceState::COMMON,
        vk::PipelineStageFlags2::ALL_COMMANDS,
        vk::AccessFlags2::from_raw(vk::AccessFlags2::MEMORY_READ.as_raw() | vk::AccessFlags2::MEMORY_WRITE.as_raw()),
    ),
    (
        ResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
        vk::PipelineStageFlags2::ALL_COMMANDS,
        vk::AccessFlags2::from_raw(vk::AccessFlags2::MEMORY_READ.as_raw() | vk::AccessFlags2::MEMORY_WRITE.as_raw()),
    ),
    (
        ResourceState::SHADING_RATE_SOURCE,
        vk::PipelineStageFlags2::ALL_COMMANDS,
        vk::AccessFlags2::MEMORY_READ,
    ),
    (
        ResourceState::HOST_READ,
        vk::PipelineStageFlags2::HOST,
        vk::AccessFlags2::HOST_READ,
    ),
    (
        ResourceState::HOST_WRITE,
        vk::PipelineStageFlags2::HOST,
        vk::AccessFlags2::HOST_WRITE,
    ),
];

/// Stages, accesses and layout a resource in `state` is used with.
///
/// Combined read states fold the scopes of every bit; their layout is the
/// most specific one all bits agree on, GENERAL otherwise.
pub(crate) fn state_to_vk(state: ResourceState, is_depth: bool) -> StateAccess {
    let mut stage = vk::PipelineStageFlags2::NONE;
    let mut access = vk::AccessFlags2::NONE;
    for (bit, bit_stage, bit_access) in STATE_SCOPES {
        if state.contains(bit) {
            stage |= bit_stage;
            access |= bit_access;
        }
    }
    StateAccess {
        stage,
        access,
        layout: state_layout(state, is_depth),
    }
}

fn state_layout(state: ResourceState, is_depth: bool) -> vk::ImageLayout {
    let shader_read = ResourceState::SHADER_RESOURCE;
    if state.is_empty() {
        vk::ImageLayout::UNDEFINED
    } else if state == ResourceState::PRESENT {
        vk::ImageLayout::PRESENT_SRC_KHR
    } else if state == ResourceState::RENDER_TARGET {
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
    } else if state == ResourceState::DEPTH_WRITE {
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL
    } else if state == ResourceState::COPY_DEST {
        vk::ImageLayout::TRANSFER_DST_OPTIMAL
    } else if state == ResourceState::COPY_SOURCE {
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL
    } else if is_depth && shader_read.union(ResourceState::DEPTH_READ).contains(state) {
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL
    } else if !is_depth && shader_read.contains(state) {
        vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
    } else {
        vk::ImageLayout::GENERAL
    }
}

/// Drop the stages a queue family cannot execute.
///
/// When anything was dropped the accesses widen to MEMORY_READ/WRITE so they
/// stay valid for the remaining stages.
pub(crate) fn restrict_to_queue(scope: StateAccess, queue_flags: vk::QueueFlags) -> StateAccess {
    let mut unsupported = vk::PipelineStageFlags2::NONE;
    if !queue_flags.contains(vk::QueueFlags::GRAPHICS) {
        unsupported |= vk::PipelineStageFlags2::VERTEX_ATTRIBUTE_INPUT
            | vk::PipelineStageFlags2::INDEX_INPUT
            | vk::PipelineStageFlags2::VERTEX_SHADER
            | vk::PipelineStageFlags2::FRAGMENT_SHADER
            | FRAGMENT_TESTS
            | vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
        if !queue_flags.contains(vk::QueueFlags::COMPUTE) {
            unsupported |= vk::PipelineStageFlags2::COMPUTE_SHADER | vk::PipelineStageFlags2::DRAW_INDIRECT;
        }
    }
    if !scope.stage.intersects(unsupported) {
        return scope;
    }

    let mut stage = scope.stage & !unsupported;
    if stage.is_empty() {
        stage = vk::PipelineStageFlags2::ALL_COMMANDS;
    }
    let mut access = vk::AccessFlags2::NONE;
    if scope.access.intersects(read_accesses()) {
        access |= vk::AccessFlags2::MEMORY_READ;
    }
    if scope.access.intersects(write_accesses()) {
        access |= vk::AccessFlags2::MEMORY_WRITE;
    }
    StateAccess {
        stage,
        access,
        layout: scope.layout,
    }
}

fn read_accesses() -> vk::AccessFlags2 {
    vk::AccessFlags2::VERTEX_ATTRIBUTE_READ
        | vk::AccessFlags2::UNIFORM_READ
        | vk::AccessFlags2::INDEX_READ
        | vk::AccessFlags2::COLOR_ATTACHMENT_READ
        | vk::AccessFlags2::SHADER_STORAGE_READ
        | vk::AccessFlags2::SHADER_SAMPLED_READ
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ
        | vk::AccessFlags2::INDIRECT_COMMAND_READ
        | vk::AccessFlags2::TRANSFER_READ
        | vk::AccessFlags2::HOST_READ
        | vk::AccessFlags2::MEMORY_READ
}

fn write_accesses() -> vk::AccessFlags2 {
    vk::AccessFlags2::COLOR_ATTACHMENT_WRITE
        | vk::AccessFlags2::SHADER_STORAGE_WRITE
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE
        | vk::AccessFlags2::TRANSFER_WRITE
        | vk::AccessFlags2::HOST_WRITE
        | vk::AccessFlags2::MEMORY_WRITE
}

// ============================================================================
// PRESENTATION
// ============================================================================

/// Present mode for a sync interval: FIFO when waiting on vblank, otherwise
/// MAILBOX or IMMEDIATE when the surface offers them
pub(crate) fn present_mode_for(sync_interval: u32, available: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if sync_interval > 0 {
        return vk::PresentModeKHR::FIFO;
    }
    [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| available.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

#[cfg(test)]
#[path = "vulkan_format_tests.rs"]
mod tests;
