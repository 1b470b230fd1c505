//! Render hardware interface
//!
//! Logical layer over a native GPU API. [`Device`] is the entry point:
//! it creates resources and pipelines, hands out per-thread command lists,
//! submits them and paces frames with fences. Native objects are reached
//! through the [`backend`] traits.

pub mod adapter;
pub mod backend;
pub mod barrier;
pub mod buffer;
pub mod command_context;
pub mod command_list;
pub mod config;
pub mod context;
pub mod descriptor_heap;
pub mod device;
pub mod fence;
pub mod pipeline;
pub mod shader;
mod staging;
pub mod swap_chain;
pub mod texture;
mod types;

#[cfg(test)]
pub(crate) mod mock_backend;

pub use adapter::{order_adapters, select_adapter, AdapterInfo, AdapterKind, AdapterPreference};
pub use barrier::{BarrierDesc, BufferBarrierDesc, TextureBarrierDesc};
pub use buffer::{initial_buffer_state, Buffer, BufferCreateInfo, BufferViews};
pub use command_context::CommandContext;
pub use command_list::{CommandList, RenderPassDesc, RenderPassTarget};
pub use config::{DeviceConfig, HeapCapacities};
pub use context::RendererContext;
pub use descriptor_heap::{DescriptorHeap, DescriptorHeaps};
pub use device::{Device, QueueSubmitInfo};
pub use fence::{Fence, FenceTracker};
pub use pipeline::{
    BindingLayout, CompareOp, ComputePipelineDesc, CullMode, DepthStencilState, DescriptorRange, DescriptorSet,
    FrontFace, GraphicsPipelineDesc, Pipeline, PrimitiveTopology, RasterizerState, RootParameter, RootSignatureDesc,
    VertexAttribute, VertexBufferLayout, VertexFormat, VertexInputRate,
};
pub use shader::{BindingKind, ReflectedBinding, Shader, ShaderReflection};
pub use swap_chain::{SwapChain, SwapChainCreateInfo};
pub use texture::{
    AddressMode, Filter, RenderTarget, RenderTargetCreateInfo, RenderTargetType, Sampler, SamplerDesc, Texture,
    TextureCreateInfo,
};
pub use types::*;
