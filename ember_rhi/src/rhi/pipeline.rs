//! Pipelines, root signatures and reflected descriptor sets
//!
//! A [`Pipeline`] is created empty and finalized by its first
//! `set_*_shader` call, which builds the root signature from the pipeline's
//! [`BindingLayout`] and compiles the native pipeline state.

use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::rhi::backend::{DescriptorSetWrite, DescriptorView, NativeDescriptorSet, NativePipeline, NativeRootSignature};
use crate::rhi::buffer::Buffer;
use crate::rhi::context::RendererContext;
use crate::rhi::shader::{BindingKind, Shader};
use crate::rhi::texture::{Sampler, Texture};
use crate::rhi::types::{
    DescriptorHeapKind, DescriptorTypes, PipelineType, ShaderType, TextureFormat, MAX_RENDER_TARGETS,
};
use crate::{ember_debug, ember_info};

// ============================================================================
// BINDING LAYOUT
// ============================================================================

/// How shader resources reach a pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BindingLayout {
    /// Two root tables spanning the whole CBV/SRV/UAV heap and the whole
    /// sampler heap. Shaders index resources by heap slot.
    #[default]
    GlobalTable,
    /// One descriptor table per set the shaders declare, filled through
    /// [`DescriptorSet`]s.
    Reflected,
}

/// One range of a reflected descriptor table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorRange {
    pub name: String,
    pub kind: BindingKind,
    pub binding: u32,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RootParameter {
    /// Table over an entire device heap
    HeapTable(DescriptorHeapKind),
    /// Table over the ranges of one descriptor set
    DescriptorTable { set: u32, ranges: Vec<DescriptorRange> },
}

/// Backend-neutral root signature
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootSignatureDesc {
    /// Parameter `i` binds at root index (set) `i`
    pub parameters: Vec<RootParameter>,
    pub push_constant_size: u32,
}

impl BindingLayout {
    /// Root signature for `shaders` under this layout
    pub fn root_signature(&self, shaders: &[&Shader]) -> Result<RootSignatureDesc> {
        let push_constant_size = shaders
            .iter()
            .map(|s| s.reflection().push_constant_size)
            .max()
            .unwrap_or(0);

        match self {
            BindingLayout::GlobalTable => Ok(RootSignatureDesc {
                parameters: vec![
                    RootParameter::HeapTable(DescriptorHeapKind::CbvSrvUav),
                    RootParameter::HeapTable(DescriptorHeapKind::Sampler),
                ],
                push_constant_size,
            }),
            BindingLayout::Reflected => {
                let mut sets: Vec<Vec<DescriptorRange>> = Vec::new();
                for shader in shaders {
                    for binding in &shader.reflection().bindings {
                        let set = binding.set as usize;
                        if sets.len() <= set {
                            sets.resize_with(set + 1, Vec::new);
                        }
                        match sets[set].iter().find(|r| r.binding == binding.binding) {
                            Some(existing) if existing.kind != binding.kind => {
                                return Err(Error::InvalidResource(format!(
                                    "Binding {}.{} is '{}' ({:?}) in one stage and '{}' ({:?}) in another",
                                    binding.set, binding.binding, existing.name, existing.kind, binding.name, binding.kind
                                )));
                            }
                            Some(_) => {}
                            None => sets[set].push(DescriptorRange {
                                name: binding.name.clone(),
                                kind: binding.kind,
                                binding: binding.binding,
                                count: binding.count,
                            }),
                        }
                    }
                }

                let parameters = sets
                    .into_iter()
                    .enumerate()
                    .map(|(set, mut ranges)| {
                        ranges.sort_by_key(|r| r.binding);
                        RootParameter::DescriptorTable { set: set as u32, ranges }
                    })
                    .collect();
                Ok(RootSignatureDesc {
                    parameters,
                    push_constant_size,
                })
            }
        }
    }
}

// ============================================================================
// GRAPHICS STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Unorm8x4,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Unorm8x4 => 4,
            VertexFormat::Float32x2 => 8,
            VertexFormat::Float32x3 => 12,
            VertexFormat::Float32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VertexInputRate {
    #[default]
    Vertex,
    Instance,
}

/// Layout of one vertex buffer slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub stride: u32,
    pub input_rate: VertexInputRate,
    pub attributes: Vec<VertexAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    #[default]
    CounterClockwise,
    Clockwise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompareOp {
    Never,
    #[default]
    Less,
    Equal,
    LessOrEqual,
    Greater,
    NotEqual,
    GreaterOrEqual,
    Always,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RasterizerState {
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub wireframe: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DepthStencilState {
    pub depth_test: bool,
    pub depth_write: bool,
    pub compare: CompareOp,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            compare: CompareOp::Less,
        }
    }
}

/// Graphics pipeline parameters
#[derive(Debug, Clone)]
pub struct GraphicsPipelineDesc {
    pub label: String,
    pub binding_layout: BindingLayout,
    pub vertex_layouts: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    /// Standard alpha blending on every color target
    pub alpha_blend: bool,
    pub color_formats: Vec<TextureFormat>,
    pub depth_format: Option<TextureFormat>,
}

impl Default for GraphicsPipelineDesc {
    fn default() -> Self {
        Self {
            label: String::from("graphics pipeline"),
            binding_layout: BindingLayout::GlobalTable,
            vertex_layouts: Vec::new(),
            topology: PrimitiveTopology::TriangleList,
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            alpha_blend: false,
            color_formats: vec![TextureFormat::R8G8B8A8_UNORM],
            depth_format: None,
        }
    }
}

impl GraphicsPipelineDesc {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.color_formats.len() > MAX_RENDER_TARGETS {
            return Err(Error::InvalidResource(format!(
                "Pipeline '{}' declares {} color targets (max {})",
                self.label,
                self.color_formats.len(),
                MAX_RENDER_TARGETS
            )));
        }
        if let Some(format) = self.color_formats.iter().find(|f| f.is_depth()) {
            return Err(Error::InvalidResource(format!(
                "Pipeline '{}' uses depth format {:?} as a color target",
                self.label, format
            )));
        }
        if let Some(format) = self.depth_format {
            if !format.is_depth() {
                return Err(Error::InvalidResource(format!(
                    "Pipeline '{}' uses {:?} as its depth format",
                    self.label, format
                )));
            }
        }
        Ok(())
    }
}

/// Compute pipeline parameters
#[derive(Debug, Clone)]
pub struct ComputePipelineDesc {
    pub label: String,
    pub binding_layout: BindingLayout,
}

impl Default for ComputePipelineDesc {
    fn default() -> Self {
        Self {
            label: String::from("compute pipeline"),
            binding_layout: BindingLayout::GlobalTable,
        }
    }
}

// ============================================================================
// PIPELINE
// ============================================================================

struct CompiledPipeline {
    root_desc: RootSignatureDesc,
    // declared before `root` so the pipeline is destroyed first
    native: Box<dyn NativePipeline>,
    root: Box<dyn NativeRootSignature>,
}

pub struct Pipeline {
    context: Arc<RendererContext>,
    pipeline_type: PipelineType,
    label: String,
    binding_layout: BindingLayout,
    graphics_desc: Option<GraphicsPipelineDesc>,
    compute_shader: Option<Arc<Shader>>,
    vertex_shader: Option<Arc<Shader>>,
    pixel_shader: Option<Arc<Shader>>,
    compiled: Option<CompiledPipeline>,
}

impl Pipeline {
    pub(crate) fn new_compute(context: Arc<RendererContext>, desc: &ComputePipelineDesc) -> Self {
        Self {
            context,
            pipeline_type: PipelineType::Compute,
            label: desc.label.clone(),
            binding_layout: desc.binding_layout,
            graphics_desc: None,
            compute_shader: None,
            vertex_shader: None,
            pixel_shader: None,
            compiled: None,
        }
    }

    pub(crate) fn new_graphics(context: Arc<RendererContext>, desc: &GraphicsPipelineDesc) -> Result<Self> {
        desc.validate()?;
        Ok(Self {
            context,
            pipeline_type: PipelineType::Graphics,
            label: desc.label.clone(),
            binding_layout: desc.binding_layout,
            graphics_desc: Some(desc.clone()),
            compute_shader: None,
            vertex_shader: None,
            pixel_shader: None,
            compiled: None,
        })
    }

    /// Attach the compute shader and build the pipeline state.
    /// Calling it again on a finalized pipeline does nothing.
    pub fn set_compute_shader(&mut self, shader: Arc<Shader>) -> Result<()> {
        if self.pipeline_type != PipelineType::Compute {
            return Err(Error::InvalidState(format!(
                "'{}' is a graphics pipeline, use set_graphics_shader",
                self.label
            )));
        }
        if self.compute_shader.is_some() {
            ember_debug!("ember::Pipeline", "'{}' already has a compute shader, ignoring", self.label);
            return Ok(());
        }
        expect_stage(&shader, ShaderType::Compute)?;

        let root_desc = self.binding_layout.root_signature(&[shader.as_ref()])?;
        let backend = self.context.backend();
        let heaps = self.context.heaps().natives();
        let root = backend.create_root_signature(&root_desc, &heaps)?;
        let native = backend.create_compute_pipeline(root.as_ref(), shader.native())?;

        self.compiled = Some(CompiledPipeline { root_desc, native, root });
        self.compute_shader = Some(shader);
        ember_info!("ember::Pipeline", "Compute pipeline '{}' ready", self.label);
        Ok(())
    }

    /// Attach the vertex (and optional pixel) shader and build the pipeline
    /// state. Calling it again on a finalized pipeline does nothing.
    pub fn set_graphics_shader(&mut self, vertex: Arc<Shader>, pixel: Option<Arc<Shader>>) -> Result<()> {
        let desc = match (&self.graphics_desc, self.pipeline_type) {
            (Some(desc), PipelineType::Graphics) => desc,
            _ => {
                return Err(Error::InvalidState(format!(
                    "'{}' is a compute pipeline, use set_compute_shader",
                    self.label
                )))
            }
        };
        if self.vertex_shader.is_some() {
            ember_debug!("ember::Pipeline", "'{}' already has graphics shaders, ignoring", self.label);
            return Ok(());
        }
        expect_stage(&vertex, ShaderType::Vertex)?;
        if let Some(pixel) = &pixel {
            expect_stage(pixel, ShaderType::Pixel)?;
        }

        let mut stages: Vec<&Shader> = vec![vertex.as_ref()];
        if let Some(pixel) = &pixel {
            stages.push(pixel.as_ref());
        }
        let root_desc = self.binding_layout.root_signature(&stages)?;
        let backend = self.context.backend();
        let heaps = self.context.heaps().natives();
        let root = backend.create_root_signature(&root_desc, &heaps)?;
        let native = backend.create_graphics_pipeline(
            root.as_ref(),
            desc,
            vertex.native(),
            pixel.as_ref().map(|p| p.native()),
        )?;

        self.compiled = Some(CompiledPipeline { root_desc, native, root });
        self.vertex_shader = Some(vertex);
        self.pixel_shader = pixel;
        ember_info!("ember::Pipeline", "Graphics pipeline '{}' ready", self.label);
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn pipeline_type(&self) -> PipelineType {
        self.pipeline_type
    }

    pub fn binding_layout(&self) -> BindingLayout {
        self.binding_layout
    }

    /// Whether a shader was attached and the native state exists
    pub fn is_finalized(&self) -> bool {
        self.compiled.is_some()
    }

    pub fn root_signature_desc(&self) -> Option<&RootSignatureDesc> {
        self.compiled.as_ref().map(|c| &c.root_desc)
    }

    pub fn push_constant_size(&self) -> u32 {
        self.compiled.as_ref().map_or(0, |c| c.root_desc.push_constant_size)
    }

    pub(crate) fn native_parts(&self) -> Result<(&dyn NativePipeline, &dyn NativeRootSignature)> {
        match &self.compiled {
            Some(compiled) => Ok((compiled.native.as_ref(), compiled.root.as_ref())),
            None => Err(Error::InvalidState(format!("Pipeline '{}' has no shader yet", self.label))),
        }
    }

    /// Allocate a descriptor set for table `set` of a reflected pipeline
    pub fn create_descriptor_set(&self, set: u32) -> Result<DescriptorSet> {
        if self.binding_layout != BindingLayout::Reflected {
            return Err(Error::InvalidState(format!(
                "'{}' uses the global table layout and has no descriptor sets",
                self.label
            )));
        }
        let compiled = self.compiled.as_ref().ok_or_else(|| {
            Error::InvalidState(format!("Pipeline '{}' has no shader yet", self.label))
        })?;
        let ranges = match compiled.root_desc.parameters.get(set as usize) {
            Some(RootParameter::DescriptorTable { ranges, .. }) => ranges.clone(),
            _ => {
                return Err(Error::InvalidResource(format!(
                    "Pipeline '{}' has no descriptor set {}",
                    self.label, set
                )))
            }
        };

        let native = self
            .context
            .backend()
            .create_descriptor_set(compiled.root.as_ref(), set)?;
        Ok(DescriptorSet {
            context: Arc::clone(&self.context),
            pipeline_type: self.pipeline_type,
            set,
            ranges: ranges.into_iter().map(|r| (r.name.clone(), r)).collect(),
            native,
            pending: FxHashMap::default(),
            bound: FxHashMap::default(),
        })
    }
}

fn expect_stage(shader: &Shader, expected: ShaderType) -> Result<()> {
    if shader.shader_type() != expected {
        return Err(Error::InvalidResource(format!(
            "'{}' is a {:?} shader, expected {:?}",
            shader.label(),
            shader.shader_type(),
            expected
        )));
    }
    Ok(())
}

// ============================================================================
// DESCRIPTOR SET
// ============================================================================

#[derive(Clone)]
enum BoundResource {
    Buffer(Arc<Buffer>),
    Texture(Arc<Texture>),
    Sampler(Arc<Sampler>),
}

/// Named bindings of one reflected descriptor table.
///
/// `set_*` calls are staged and reach the GPU on [`DescriptorSet::update`].
/// Bound resources are kept alive by the set.
pub struct DescriptorSet {
    context: Arc<RendererContext>,
    pipeline_type: PipelineType,
    set: u32,
    ranges: FxHashMap<String, DescriptorRange>,
    native: Box<dyn NativeDescriptorSet>,
    pending: FxHashMap<u32, (BindingKind, BoundResource)>,
    bound: FxHashMap<u32, (BindingKind, BoundResource)>,
}

impl DescriptorSet {
    pub fn set_index(&self) -> u32 {
        self.set
    }

    pub fn pipeline_type(&self) -> PipelineType {
        self.pipeline_type
    }

    /// Names of every binding in the table
    pub fn binding_names(&self) -> impl Iterator<Item = &str> {
        self.ranges.keys().map(String::as_str)
    }

    /// Whether staged writes are waiting for [`DescriptorSet::update`]
    pub fn has_pending_writes(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn set_buffer(&mut self, name: &str, buffer: &Arc<Buffer>) -> Result<()> {
        let range = self.range(name)?;
        let required = match range.kind {
            BindingKind::ConstantBuffer => DescriptorTypes::CONSTANT_BUFFER,
            BindingKind::ShaderResourceBuffer => DescriptorTypes::BUFFER,
            BindingKind::UnorderedAccessBuffer => DescriptorTypes::RW_BUFFER,
            other => return Err(kind_mismatch(name, other, "a buffer")),
        };
        if !buffer.descriptor_types().contains(required) {
            return Err(Error::InvalidResource(format!(
                "Buffer '{}' was not created with {:?} for binding '{}'",
                buffer.label(),
                required,
                name
            )));
        }
        let (binding, kind) = (range.binding, range.kind);
        self.pending.insert(binding, (kind, BoundResource::Buffer(Arc::clone(buffer))));
        Ok(())
    }

    pub fn set_texture(&mut self, name: &str, texture: &Arc<Texture>) -> Result<()> {
        let range = self.range(name)?;
        let required = match range.kind {
            BindingKind::ShaderResourceTexture => DescriptorTypes::TEXTURE,
            BindingKind::UnorderedAccessTexture => DescriptorTypes::RW_TEXTURE,
            other => return Err(kind_mismatch(name, other, "a texture")),
        };
        if !texture.descriptor_types().contains(required) {
            return Err(Error::InvalidResource(format!(
                "Texture '{}' was not created with {:?} for binding '{}'",
                texture.label(),
                required,
                name
            )));
        }
        let (binding, kind) = (range.binding, range.kind);
        self.pending.insert(binding, (kind, BoundResource::Texture(Arc::clone(texture))));
        Ok(())
    }

    pub fn set_sampler(&mut self, name: &str, sampler: &Arc<Sampler>) -> Result<()> {
        let range = self.range(name)?;
        if range.kind != BindingKind::Sampler {
            return Err(kind_mismatch(name, range.kind, "a sampler"));
        }
        let (binding, kind) = (range.binding, range.kind);
        self.pending.insert(binding, (kind, BoundResource::Sampler(Arc::clone(sampler))));
        Ok(())
    }

    /// Write every staged binding to the native set
    pub fn update(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }

        let writes: Vec<DescriptorSetWrite<'_>> = self
            .pending
            .iter()
            .map(|(&binding, (kind, resource))| DescriptorSetWrite {
                binding,
                array_element: 0,
                view: binding_view(*kind, resource),
            })
            .collect();
        self.context
            .backend()
            .update_descriptor_set(self.native.as_ref(), &writes)?;
        drop(writes);

        ember_debug!("ember::DescriptorSet", "Set {} updated ({} bindings)", self.set, self.pending.len());
        self.bound.extend(self.pending.drain());
        Ok(())
    }

    pub(crate) fn native(&self) -> &dyn NativeDescriptorSet {
        self.native.as_ref()
    }

    fn range(&self, name: &str) -> Result<&DescriptorRange> {
        self.ranges.get(name).ok_or_else(|| {
            Error::InvalidResource(format!("Descriptor set {} has no binding named '{}'", self.set, name))
        })
    }
}

fn binding_view(kind: BindingKind, resource: &BoundResource) -> DescriptorView<'_> {
    match (kind, resource) {
        (BindingKind::ConstantBuffer, BoundResource::Buffer(b)) => DescriptorView::ConstantBuffer {
            buffer: b.native(),
            size: b.size(),
        },
        (BindingKind::ShaderResourceBuffer, BoundResource::Buffer(b)) => DescriptorView::ShaderResourceBuffer {
            buffer: b.native(),
            size: b.size(),
            raw: b.descriptor_types().contains(DescriptorTypes::BUFFER_RAW),
        },
        (_, BoundResource::Buffer(b)) => DescriptorView::UnorderedAccessBuffer {
            buffer: b.native(),
            size: b.size(),
            raw: b.descriptor_types().contains(DescriptorTypes::RW_BUFFER_RAW),
        },
        (BindingKind::UnorderedAccessTexture, BoundResource::Texture(t)) => DescriptorView::UnorderedAccessTexture {
            texture: t.native(),
            mip_slice: 0,
        },
        (_, BoundResource::Texture(t)) => DescriptorView::ShaderResourceTexture { texture: t.native() },
        (_, BoundResource::Sampler(s)) => DescriptorView::Sampler { sampler: s.native() },
    }
}

fn kind_mismatch(name: &str, kind: BindingKind, given: &str) -> Error {
    Error::InvalidResource(format!("Binding '{}' is {:?}, cannot bind {}", name, kind, given))
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
