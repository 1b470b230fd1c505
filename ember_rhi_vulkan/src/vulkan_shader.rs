//! SPIR-V shader modules and their reflection

use ash::vk;
use ember_rhi::ember::rhi::backend::{NativeShader, ShaderModuleDesc};
use ember_rhi::ember::rhi::{BindingKind, ReflectedBinding, ShaderReflection, ShaderType};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_debug, ember_error};
use std::any::Any;
use std::ffi::CString;
use std::io::Cursor;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

const SPIRV_MAGIC: u32 = 0x0723_0203;

pub struct VulkanShader {
    ctx: Arc<GpuContext>,
    pub(crate) module: vk::ShaderModule,
    pub(crate) stage: vk::ShaderStageFlags,
    pub(crate) entry_point: CString,
    reflection: ShaderReflection,
}

impl VulkanShader {
    pub(crate) fn new(ctx: Arc<GpuContext>, desc: &ShaderModuleDesc<'_>) -> Result<Self> {
        let words = parse_spirv(desc.label, desc.code)?;
        let reflection = reflect(&words, desc.entry_point)
            .map_err(|e| Error::ShaderCompilation(format!("'{}': {}", desc.label, e)))?;
        let entry_point = CString::new(desc.entry_point)
            .map_err(|_| Error::ShaderCompilation(format!("Invalid entry point name '{}'", desc.entry_point)))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);
        let module = unsafe { ctx.device.create_shader_module(&create_info, None) }.map_err(|e| {
            ember_error!("ember::vulkan", "Failed to create shader module '{}': {:?}", desc.label, e);
            Error::ShaderCompilation(format!("'{}' rejected by the driver: {:?}", desc.label, e))
        })?;
        ctx.set_debug_name(module, desc.label);

        ember_debug!(
            "ember::vulkan",
            "Shader '{}': {} bindings, {} push constant bytes",
            desc.label,
            reflection.bindings.len(),
            reflection.push_constant_size
        );
        Ok(Self {
            ctx,
            module,
            stage: shader_stage_to_vk(desc.shader_type),
            entry_point,
            reflection,
        })
    }
}

impl NativeShader for VulkanShader {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }
}

impl Drop for VulkanShader {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_shader_module(self.module, None);
        }
    }
}

pub(crate) fn vk_shader(shader: &dyn NativeShader) -> Result<&VulkanShader> {
    shader
        .as_any()
        .downcast_ref::<VulkanShader>()
        .ok_or_else(|| Error::InvalidResource("Shader was not created by the Vulkan backend".to_string()))
}

pub(crate) fn shader_stage_to_vk(shader_type: ShaderType) -> vk::ShaderStageFlags {
    match shader_type {
        ShaderType::Vertex => vk::ShaderStageFlags::VERTEX,
        ShaderType::Pixel => vk::ShaderStageFlags::FRAGMENT,
        ShaderType::Compute => vk::ShaderStageFlags::COMPUTE,
    }
}

/// Check the module header and convert the bytes to SPIR-V words
pub(crate) fn parse_spirv(label: &str, code: &[u8]) -> Result<Vec<u32>> {
    if code.len() % 4 != 0 {
        return Err(Error::ShaderCompilation(format!(
            "'{}' is not 4-byte aligned ({} bytes)",
            label,
            code.len()
        )));
    }
    let magic = code
        .get(..4)
        .map(|bytes| u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]));
    if magic != Some(SPIRV_MAGIC) {
        return Err(Error::ShaderCompilation(format!("'{}' is not a SPIR-V module", label)));
    }
    ash::util::read_spv(&mut Cursor::new(code))
        .map_err(|e| Error::ShaderCompilation(format!("'{}' cannot be read: {}", label, e)))
}

/// Reflect the resource interface of `entry_point`
pub(crate) fn reflect(words: &[u32], entry_point: &str) -> std::result::Result<ShaderReflection, String> {
    let entry_points = spirq::ReflectConfig::new()
        .spv(words)
        .ref_all_rscs(true)
        .reflect()
        .map_err(|e| format!("SPIR-V reflection failed: {:?}", e))?;

    let entry = entry_points
        .iter()
        .find(|ep| ep.name == entry_point)
        .ok_or_else(|| format!("No entry point named '{}'", entry_point))?;

    let mut reflection = ShaderReflection::default();
    for var in entry.vars.iter() {
        match var {
            spirq::var::Variable::Descriptor {
                name,
                desc_bind,
                desc_ty,
                nbind,
                ..
            } => {
                reflection.bindings.push(ReflectedBinding {
                    name: name.clone().unwrap_or_default(),
                    set: desc_bind.set(),
                    binding: desc_bind.bind(),
                    kind: binding_kind(desc_ty)?,
                    count: (*nbind).max(1),
                });
            }
            spirq::var::Variable::PushConstant { ty, .. } => {
                let size = ty.nbyte().unwrap_or(0) as u32;
                reflection.push_constant_size = reflection.push_constant_size.max(size);
            }
            _ => {}
        }
    }
    reflection.bindings.sort_by_key(|b| (b.set, b.binding));
    Ok(reflection)
}

fn binding_kind(desc_ty: &spirq::ty::DescriptorType) -> std::result::Result<BindingKind, String> {
    use spirq::ty::{AccessType, DescriptorType};
    match desc_ty {
        DescriptorType::UniformBuffer() => Ok(BindingKind::ConstantBuffer),
        DescriptorType::StorageBuffer(AccessType::ReadOnly) => Ok(BindingKind::ShaderResourceBuffer),
        DescriptorType::StorageBuffer(..) => Ok(BindingKind::UnorderedAccessBuffer),
        DescriptorType::SampledImage() => Ok(BindingKind::ShaderResourceTexture),
        DescriptorType::StorageImage(..) => Ok(BindingKind::UnorderedAccessTexture),
        DescriptorType::Sampler() => Ok(BindingKind::Sampler),
        other => Err(format!("Unsupported SPIR-V descriptor type: {:?}", other)),
    }
}

#[cfg(test)]
#[path = "vulkan_shader_tests.rs"]
mod tests;
