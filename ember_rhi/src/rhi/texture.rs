//! Textures, samplers and render targets

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::rhi::backend::{
    DescriptorView, NativeSampler, NativeTexture, NativeTextureDesc, SubresourceRange,
};
use crate::rhi::context::RendererContext;
use crate::rhi::staging::StagingRing;
use crate::rhi::types::{
    mip_level_count, ClearValue, DescriptorHeapKind, DescriptorTypes, ResourceState, TextureFormat,
    TextureType,
};
use crate::ember_debug;

// ===== TEXTURE =====

/// Texture creation parameters
#[derive(Debug, Clone)]
pub struct TextureCreateInfo {
    pub label: String,
    pub texture_type: TextureType,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Depth for 3D textures, ignored otherwise
    pub depth: u32,
    /// Array layers (a multiple of 6 for cube maps)
    pub array_layers: u32,
    pub enable_mipmap: bool,
    pub descriptor_types: DescriptorTypes,
    /// `UNDEFINED` means COMMON
    pub initial_state: ResourceState,
}

impl Default for TextureCreateInfo {
    fn default() -> Self {
        Self {
            label: String::from("texture"),
            texture_type: TextureType::Tex2D,
            format: TextureFormat::R8G8B8A8_UNORM,
            width: 1,
            height: 1,
            depth: 1,
            array_layers: 1,
            enable_mipmap: false,
            descriptor_types: DescriptorTypes::TEXTURE,
            initial_state: ResourceState::UNDEFINED,
        }
    }
}

pub struct Texture {
    context: Arc<RendererContext>,
    native: Box<dyn NativeTexture>,
    label: String,
    texture_type: TextureType,
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: u32,
    array_layers: u32,
    mip_levels: u32,
    descriptor_types: DescriptorTypes,
    state: AtomicU32,
    srv: Option<u32>,
    uav: Option<u32>,
    staging: StagingRing,
}

impl Texture {
    pub(crate) fn new(context: Arc<RendererContext>, info: &TextureCreateInfo) -> Result<Self> {
        validate_texture_info(info)?;

        let mip_levels = mip_level_count(info.width, info.height, info.enable_mipmap);
        let state = if info.initial_state.is_empty() {
            ResourceState::COMMON
        } else {
            info.initial_state
        };
        let depth = if info.texture_type == TextureType::Tex3D { info.depth } else { 1 };

        let native = context.backend().create_texture(&NativeTextureDesc {
            label: &info.label,
            texture_type: info.texture_type,
            format: info.format,
            width: info.width,
            height: info.height,
            depth,
            mip_levels,
            array_layers: info.array_layers,
            descriptor_types: info.descriptor_types,
            initial_state: state,
        })?;

        let mut texture = Self::from_native(context, native, info, mip_levels, depth, state);
        if info.descriptor_types.contains(DescriptorTypes::TEXTURE) {
            let view = DescriptorView::ShaderResourceTexture {
                texture: texture.native.as_ref(),
            };
            texture.srv = Some(texture.register(&view)?);
        }
        if info.descriptor_types.contains(DescriptorTypes::RW_TEXTURE) {
            let view = DescriptorView::UnorderedAccessTexture {
                texture: texture.native.as_ref(),
                mip_slice: 0,
            };
            texture.uav = Some(texture.register(&view)?);
        }

        ember_debug!(
            "ember::Texture",
            "Created '{}' {}x{}x{} ({:?}, {} mips, {:?})",
            texture.label,
            texture.width,
            texture.height,
            texture.depth,
            texture.format,
            mip_levels,
            state
        );
        Ok(texture)
    }

    /// Wrap a native image the backend owns, such as a swapchain back buffer
    pub(crate) fn from_native(
        context: Arc<RendererContext>,
        native: Box<dyn NativeTexture>,
        info: &TextureCreateInfo,
        mip_levels: u32,
        depth: u32,
        state: ResourceState,
    ) -> Self {
        Self {
            context,
            native,
            label: info.label.clone(),
            texture_type: info.texture_type,
            format: info.format,
            width: info.width,
            height: info.height,
            depth,
            array_layers: info.array_layers,
            mip_levels,
            descriptor_types: info.descriptor_types,
            state: AtomicU32::new(state.bits()),
            srv: None,
            uav: None,
            staging: StagingRing::new(),
        }
    }

    fn register(&self, view: &DescriptorView<'_>) -> Result<u32> {
        self.context
            .heap(DescriptorHeapKind::CbvSrvUav)
            .register(self.context.backend(), view)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn texture_type(&self) -> TextureType {
        self.texture_type
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn descriptor_types(&self) -> DescriptorTypes {
        self.descriptor_types
    }

    /// Last tracked state of the whole texture
    pub fn state(&self) -> ResourceState {
        ResourceState::from_bits_retain(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ResourceState) {
        self.state.store(state.bits(), Ordering::Release);
    }

    pub fn srv_index(&self) -> Option<u32> {
        self.srv
    }

    pub fn uav_index(&self) -> Option<u32> {
        self.uav
    }

    /// Every mip of every layer
    pub fn full_range(&self) -> SubresourceRange {
        SubresourceRange {
            base_mip: 0,
            mip_count: self.mip_levels,
            base_layer: 0,
            layer_count: self.array_layers,
        }
    }

    pub fn native(&self) -> &dyn NativeTexture {
        self.native.as_ref()
    }

    pub fn staging_buffer_count(&self) -> usize {
        self.staging.len()
    }

    pub(crate) fn staging(&self) -> &StagingRing {
        &self.staging
    }

    pub(crate) fn context(&self) -> &Arc<RendererContext> {
        &self.context
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        let heap = self.context.heap(DescriptorHeapKind::CbvSrvUav);
        for slot in [self.srv, self.uav].into_iter().flatten() {
            heap.free(slot);
        }
    }
}

impl std::fmt::Debug for Texture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Texture")
            .field("label", &self.label)
            .field("format", &self.format)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("mip_levels", &self.mip_levels)
            .field("state", &self.state())
            .finish()
    }
}

fn validate_texture_info(info: &TextureCreateInfo) -> Result<()> {
    if info.width == 0 || info.height == 0 || info.array_layers == 0 {
        return Err(Error::InvalidResource(format!(
            "Texture '{}' has a zero dimension ({}x{}, {} layers)",
            info.label, info.width, info.height, info.array_layers
        )));
    }
    if info.texture_type == TextureType::Tex3D && info.depth == 0 {
        return Err(Error::InvalidResource(format!("3D texture '{}' has zero depth", info.label)));
    }
    if info.texture_type == TextureType::TexCube && info.array_layers % 6 != 0 {
        return Err(Error::InvalidResource(format!(
            "Cube texture '{}' needs a multiple of 6 layers, got {}",
            info.label, info.array_layers
        )));
    }
    if info.format.is_depth() && info.descriptor_types.contains(DescriptorTypes::RW_TEXTURE) {
        return Err(Error::InvalidResource(format!(
            "Depth texture '{}' cannot have an unordered access view",
            info.label
        )));
    }
    Ok(())
}

// ===== SAMPLER =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Filter {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirroredRepeat,
    ClampToEdge,
    ClampToBorder,
}

/// Sampler creation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    pub min_filter: Filter,
    pub mag_filter: Filter,
    pub mip_filter: Filter,
    pub address_u: AddressMode,
    pub address_v: AddressMode,
    pub address_w: AddressMode,
    pub mip_lod_bias: f32,
    /// 1 disables anisotropic filtering
    pub max_anisotropy: u32,
    pub min_lod: f32,
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: Filter::Linear,
            mag_filter: Filter::Linear,
            mip_filter: Filter::Linear,
            address_u: AddressMode::Repeat,
            address_v: AddressMode::Repeat,
            address_w: AddressMode::Repeat,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

pub struct Sampler {
    context: Arc<RendererContext>,
    native: Box<dyn NativeSampler>,
    desc: SamplerDesc,
    slot: u32,
}

impl Sampler {
    pub(crate) fn new(context: Arc<RendererContext>, desc: &SamplerDesc) -> Result<Self> {
        let native = context.backend().create_sampler(desc)?;
        let slot = context.heap(DescriptorHeapKind::Sampler).register(
            context.backend(),
            &DescriptorView::Sampler {
                sampler: native.as_ref(),
            },
        )?;
        Ok(Self {
            context,
            native,
            desc: *desc,
            slot,
        })
    }

    pub fn desc(&self) -> &SamplerDesc {
        &self.desc
    }

    /// Index in the sampler heap
    pub fn heap_index(&self) -> u32 {
        self.slot
    }

    pub fn native(&self) -> &dyn NativeSampler {
        self.native.as_ref()
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        self.context.heap(DescriptorHeapKind::Sampler).free(self.slot);
    }
}

// ===== RENDER TARGET =====

/// What a render target is attached as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderTargetType {
    Color,
    DepthStencil,
}

/// Render target creation parameters
#[derive(Debug, Clone)]
pub struct RenderTargetCreateInfo {
    pub label: String,
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    /// Optimized clear value; `None` uses black or depth 1.0
    pub clear_value: Option<ClearValue>,
    /// Also expose a shader resource view
    pub sampled: bool,
}

impl Default for RenderTargetCreateInfo {
    fn default() -> Self {
        Self {
            label: String::from("render target"),
            format: TextureFormat::R8G8B8A8_UNORM,
            width: 1,
            height: 1,
            clear_value: None,
            sampled: false,
        }
    }
}

/// Texture bound as a color or depth attachment
pub struct RenderTarget {
    texture: Texture,
    rt_type: RenderTargetType,
    clear_value: ClearValue,
    rtv: u32,
}

impl RenderTarget {
    pub(crate) fn new(context: Arc<RendererContext>, info: &RenderTargetCreateInfo) -> Result<Self> {
        let (rt_type, attachment, state) = if info.format.is_depth() {
            (
                RenderTargetType::DepthStencil,
                DescriptorTypes::DEPTH_STENCIL_ATTACHMENT,
                ResourceState::DEPTH_WRITE,
            )
        } else {
            (
                RenderTargetType::Color,
                DescriptorTypes::COLOR_ATTACHMENT,
                ResourceState::RENDER_TARGET,
            )
        };
        let mut descriptor_types = attachment;
        if info.sampled {
            descriptor_types |= DescriptorTypes::TEXTURE;
        }

        let texture = Texture::new(
            context,
            &TextureCreateInfo {
                label: info.label.clone(),
                texture_type: TextureType::Tex2D,
                format: info.format,
                width: info.width,
                height: info.height,
                depth: 1,
                array_layers: 1,
                enable_mipmap: false,
                descriptor_types,
                initial_state: state,
            },
        )?;

        let clear_value = info.clear_value.unwrap_or(match rt_type {
            RenderTargetType::Color => ClearValue::Color([0.0, 0.0, 0.0, 1.0]),
            RenderTargetType::DepthStencil => ClearValue::DepthStencil { depth: 1.0, stencil: 0 },
        });
        Self::with_texture(texture, rt_type, clear_value)
    }

    /// Render target over a swapchain image, tracked in PRESENT
    pub(crate) fn from_back_buffer(
        context: Arc<RendererContext>,
        native: Box<dyn NativeTexture>,
        index: u32,
        width: u32,
        height: u32,
        format: TextureFormat,
    ) -> Result<Self> {
        let info = TextureCreateInfo {
            label: format!("back buffer {}", index),
            texture_type: TextureType::Tex2D,
            format,
            width,
            height,
            depth: 1,
            array_layers: 1,
            enable_mipmap: false,
            descriptor_types: DescriptorTypes::COLOR_ATTACHMENT,
            initial_state: ResourceState::PRESENT,
        };
        let texture = Texture::from_native(context, native, &info, 1, 1, ResourceState::PRESENT);
        Self::with_texture(texture, RenderTargetType::Color, ClearValue::Color([0.0, 0.0, 0.0, 1.0]))
    }

    fn with_texture(texture: Texture, rt_type: RenderTargetType, clear_value: ClearValue) -> Result<Self> {
        let context = Arc::clone(texture.context());
        let rtv = context.heap(DescriptorHeapKind::Rtv).register(
            context.backend(),
            &DescriptorView::RenderTarget {
                texture: texture.native(),
            },
        )?;
        Ok(Self {
            texture,
            rt_type,
            clear_value,
            rtv,
        })
    }

    pub fn texture(&self) -> &Texture {
        &self.texture
    }

    pub fn rt_type(&self) -> RenderTargetType {
        self.rt_type
    }

    pub fn clear_value(&self) -> ClearValue {
        self.clear_value
    }

    /// Index in the RTV heap
    pub fn rtv_index(&self) -> u32 {
        self.rtv
    }

    pub fn width(&self) -> u32 {
        self.texture.width()
    }

    pub fn height(&self) -> u32 {
        self.texture.height()
    }

    pub fn format(&self) -> TextureFormat {
        self.texture.format()
    }

    pub fn state(&self) -> ResourceState {
        self.texture.state()
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.texture
            .context()
            .heap(DescriptorHeapKind::Rtv)
            .free(self.rtv);
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
