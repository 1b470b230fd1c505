//! Shader modules and their reflection data

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::rhi::backend::{NativeShader, ShaderModuleDesc};
use crate::rhi::context::RendererContext;
use crate::rhi::types::{ShaderType, SHADER_ENTRY_POINT};
use crate::{ember_error, ember_info};

/// Resource class of a reflected binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingKind {
    ConstantBuffer,
    ShaderResourceBuffer,
    UnorderedAccessBuffer,
    ShaderResourceTexture,
    UnorderedAccessTexture,
    Sampler,
}

/// One resource binding a shader declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectedBinding {
    pub name: String,
    pub set: u32,
    pub binding: u32,
    pub kind: BindingKind,
    /// Array length, 1 for scalars
    pub count: u32,
}

/// Resource interface of a shader module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderReflection {
    pub bindings: Vec<ReflectedBinding>,
    /// Bytes of push/root constants
    pub push_constant_size: u32,
}

impl ShaderReflection {
    pub fn binding(&self, name: &str) -> Option<&ReflectedBinding> {
        self.bindings.iter().find(|b| b.name == name)
    }

    /// Highest set index used, `None` without bindings
    pub fn max_set(&self) -> Option<u32> {
        self.bindings.iter().map(|b| b.set).max()
    }
}

/// A validated shader module
pub struct Shader {
    shader_type: ShaderType,
    label: String,
    native: Box<dyn NativeShader>,
}

impl Shader {
    pub(crate) fn from_file(context: &Arc<RendererContext>, shader_type: ShaderType, path: &Path) -> Result<Self> {
        let code = std::fs::read(path).map_err(|e| {
            ember_error!("ember::Shader", "Cannot read '{}': {}", path.display(), e);
            Error::InvalidResource(format!("Cannot read shader '{}': {}", path.display(), e))
        })?;
        Self::from_bytes(context, shader_type, &path.display().to_string(), &code)
    }

    pub(crate) fn from_bytes(
        context: &Arc<RendererContext>,
        shader_type: ShaderType,
        label: &str,
        code: &[u8],
    ) -> Result<Self> {
        if code.is_empty() {
            return Err(Error::InvalidResource(format!("Shader '{}' is empty", label)));
        }

        let desc = ShaderModuleDesc {
            label,
            shader_type,
            entry_point: SHADER_ENTRY_POINT,
            target: shader_type.target(),
            code,
        };
        let native = context.backend().create_shader(&desc).map_err(|e| {
            ember_error!("ember::Shader", "'{}' ({}) rejected: {}", label, desc.target, e);
            match e {
                Error::ShaderCompilation(_) => e,
                other => Error::ShaderCompilation(other.to_string()),
            }
        })?;

        ember_info!(
            "ember::Shader",
            "Loaded '{}' ({}, {} bindings)",
            label,
            desc.target,
            native.reflection().bindings.len()
        );
        Ok(Self {
            shader_type,
            label: label.to_string(),
            native,
        })
    }

    pub fn shader_type(&self) -> ShaderType {
        self.shader_type
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn entry_point(&self) -> &'static str {
        SHADER_ENTRY_POINT
    }

    pub fn target(&self) -> &'static str {
        self.shader_type.target()
    }

    pub fn reflection(&self) -> &ShaderReflection {
        self.native.reflection()
    }

    pub fn native(&self) -> &dyn NativeShader {
        self.native.as_ref()
    }
}

impl std::fmt::Debug for Shader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shader")
            .field("shader_type", &self.shader_type)
            .field("label", &self.label)
            .finish()
    }
}
