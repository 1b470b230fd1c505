//! Pipeline layouts, pipeline state objects and reflected descriptor sets

use ash::vk;
use ember_rhi::ember::rhi::backend::{
    DescriptorSetWrite, NativeDescriptorHeap, NativeDescriptorSet, NativePipeline, NativeRootSignature, NativeShader,
};
use ember_rhi::ember::rhi::{DescriptorHeapKind, DescriptorRange, GraphicsPipelineDesc, RootParameter, RootSignatureDesc};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_debug, ember_err};
use std::any::Any;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_descriptor_heap::{vk_heap, write_view};
use crate::vulkan_format::{
    binding_kind_to_vk, compare_op_to_vk, cull_mode_to_vk, front_face_to_vk, input_rate_to_vk, texture_format_to_vk,
    topology_to_vk, vertex_format_to_vk,
};
use crate::vulkan_shader::{vk_shader, VulkanShader};

/// Descriptors of each type in a freshly grown descriptor set pool
const DESCRIPTOR_POOL_SIZE: u32 = 256;
const DESCRIPTOR_POOL_MAX_SETS: u32 = 256;

// ============================================================================
// ROOT SIGNATURE
// ============================================================================

/// A `VkPipelineLayout` plus the set layouts it was built from
pub struct VulkanRootSignature {
    ctx: Arc<GpuContext>,
    pub(crate) layout: vk::PipelineLayout,
    /// Layout of set `i`; heap layouts are borrowed from their heap
    set_layouts: Vec<vk::DescriptorSetLayout>,
    owned_set_layouts: Vec<vk::DescriptorSetLayout>,
    /// Ranges of each reflected table, `None` for heap tables
    tables: Vec<Option<Vec<DescriptorRange>>>,
    pub(crate) push_constant_size: u32,
}

impl VulkanRootSignature {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        desc: &RootSignatureDesc,
        heaps: &[&dyn NativeDescriptorHeap],
    ) -> Result<Self> {
        let mut root = Self {
            ctx: Arc::clone(&ctx),
            layout: vk::PipelineLayout::null(),
            set_layouts: Vec::with_capacity(desc.parameters.len()),
            owned_set_layouts: Vec::new(),
            tables: Vec::with_capacity(desc.parameters.len()),
            push_constant_size: desc.push_constant_size,
        };

        for parameter in &desc.parameters {
            match parameter {
                RootParameter::HeapTable(kind) => {
                    let heap = heaps
                        .get(kind.index())
                        .ok_or_else(|| Error::InvalidState(format!("No {:?} heap to bind", kind)))?;
                    let heap = vk_heap(*heap)?;
                    if *kind == DescriptorHeapKind::Rtv || heap.layout == vk::DescriptorSetLayout::null() {
                        return Err(Error::InvalidState(format!("{:?} heap is not shader visible", kind)));
                    }
                    root.set_layouts.push(heap.layout);
                    root.tables.push(None);
                }
                RootParameter::DescriptorTable { set, ranges } => {
                    let bindings: Vec<vk::DescriptorSetLayoutBinding> = ranges
                        .iter()
                        .map(|range| {
                            vk::DescriptorSetLayoutBinding::default()
                                .binding(range.binding)
                                .descriptor_type(binding_kind_to_vk(range.kind))
                                .descriptor_count(range.count.max(1))
                                .stage_flags(vk::ShaderStageFlags::ALL)
                        })
                        .collect();
                    let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
                    let layout = unsafe { ctx.device.create_descriptor_set_layout(&layout_info, None) }
                        .map_err(|e| ember_err!("ember::vulkan", "Failed to create layout of set {}: {:?}", set, e))?;
                    root.owned_set_layouts.push(layout);
                    root.set_layouts.push(layout);
                    root.tables.push(Some(ranges.clone()));
                }
            }
        }

        let push_constant_ranges = if desc.push_constant_size > 0 {
            vec![vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::ALL,
                offset: 0,
                size: desc.push_constant_size.next_multiple_of(4),
            }]
        } else {
            Vec::new()
        };
        let layout_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(&root.set_layouts)
            .push_constant_ranges(&push_constant_ranges);
        root.layout = unsafe { ctx.device.create_pipeline_layout(&layout_info, None) }
            .map_err(|e| ember_err!("ember::vulkan", "Failed to create pipeline layout: {:?}", e))?;

        ember_debug!(
            "ember::vulkan",
            "Pipeline layout: {} sets, {} push constant bytes",
            root.set_layouts.len(),
            desc.push_constant_size
        );
        Ok(root)
    }
}

impl NativeRootSignature for VulkanRootSignature {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanRootSignature {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline_layout(self.layout, None);
            for &layout in &self.owned_set_layouts {
                self.ctx.device.destroy_descriptor_set_layout(layout, None);
            }
        }
    }
}

pub(crate) fn vk_root_signature(root: &dyn NativeRootSignature) -> Option<&VulkanRootSignature> {
    root.as_any().downcast_ref::<VulkanRootSignature>()
}

// ============================================================================
// PIPELINE
// ============================================================================

pub struct VulkanPipeline {
    ctx: Arc<GpuContext>,
    pub(crate) pipeline: vk::Pipeline,
    pub(crate) bind_point: vk::PipelineBindPoint,
}

impl VulkanPipeline {
    pub(crate) fn new_compute(ctx: Arc<GpuContext>, root: &dyn NativeRootSignature, shader: &dyn NativeShader) -> Result<Self> {
        let root = downcast_root(root)?;
        let shader = vk_shader(shader)?;

        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage_info(shader))
            .layout(root.layout);
        let pipelines = unsafe {
            ctx.device
                .create_compute_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| ember_err!("ember::vulkan", "Failed to create compute pipeline: {:?}", e))?;

        Ok(Self {
            ctx,
            pipeline: pipelines[0],
            bind_point: vk::PipelineBindPoint::COMPUTE,
        })
    }

    pub(crate) fn new_graphics(
        ctx: Arc<GpuContext>,
        root: &dyn NativeRootSignature,
        desc: &GraphicsPipelineDesc,
        vertex: &dyn NativeShader,
        pixel: Option<&dyn NativeShader>,
    ) -> Result<Self> {
        let root = downcast_root(root)?;
        let mut stages = vec![stage_info(vk_shader(vertex)?)];
        if let Some(pixel) = pixel {
            stages.push(stage_info(vk_shader(pixel)?));
        }

        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc
            .vertex_layouts
            .iter()
            .enumerate()
            .map(|(binding, layout)| vk::VertexInputBindingDescription {
                binding: binding as u32,
                stride: layout.stride,
                input_rate: input_rate_to_vk(layout.input_rate),
            })
            .collect();
        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc
            .vertex_layouts
            .iter()
            .enumerate()
            .flat_map(|(binding, layout)| {
                layout.attributes.iter().map(move |attribute| vk::VertexInputAttributeDescription {
                    location: attribute.location,
                    binding: binding as u32,
                    format: vertex_format_to_vk(attribute.format),
                    offset: attribute.offset,
                })
            })
            .collect();
        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor are dynamic; only the counts matter here
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewport_count(1)
            .scissor_count(1);

        let polygon_mode = if desc.rasterizer.wireframe && ctx.fill_mode_non_solid {
            vk::PolygonMode::LINE
        } else {
            vk::PolygonMode::FILL
        };
        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode)
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.rasterizer.cull_mode))
            .front_face(front_face_to_vk(desc.rasterizer.front_face))
            .depth_bias_enable(false);

        let has_depth = desc.depth_format.is_some();
        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(has_depth && desc.depth_stencil.depth_test)
            .depth_write_enable(has_depth && desc.depth_stencil.depth_write)
            .depth_compare_op(compare_op_to_vk(desc.depth_stencil.compare))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let blend_attachments: Vec<vk::PipelineColorBlendAttachmentState> = desc
            .color_formats
            .iter()
            .map(|_| {
                let attachment = vk::PipelineColorBlendAttachmentState::default()
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
                    .blend_enable(desc.alpha_blend);
                if desc.alpha_blend {
                    attachment
                        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                        .color_blend_op(vk::BlendOp::ADD)
                        .src_alpha_blend_factor(vk::BlendFactor::ONE)
                        .dst_alpha_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                        .alpha_blend_op(vk::BlendOp::ADD)
                } else {
                    attachment
                }
            })
            .collect();
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        // Dynamic rendering: attachment formats replace the render pass
        let color_formats: Vec<vk::Format> = desc.color_formats.iter().map(|&f| texture_format_to_vk(f)).collect();
        let depth_format = desc.depth_format.map_or(vk::Format::UNDEFINED, texture_format_to_vk);
        let stencil_format = match desc.depth_format {
            Some(format) if format.has_stencil() => depth_format,
            _ => vk::Format::UNDEFINED,
        };
        let mut rendering_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(depth_format)
            .stencil_attachment_format(stencil_format);

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .depth_stencil_state(&depth_stencil_state)
            .color_blend_state(&color_blend_state)
            .dynamic_state(&dynamic_state)
            .layout(root.layout)
            .push_next(&mut rendering_info);

        let pipelines = unsafe {
            ctx.device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
        }
        .map_err(|(_, e)| ember_err!("ember::vulkan", "Failed to create graphics pipeline '{}': {:?}", desc.label, e))?;

        ctx.set_debug_name(pipelines[0], &desc.label);
        Ok(Self {
            ctx,
            pipeline: pipelines[0],
            bind_point: vk::PipelineBindPoint::GRAPHICS,
        })
    }
}

impl NativePipeline for VulkanPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanPipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
        }
    }
}

fn downcast_root(root: &dyn NativeRootSignature) -> Result<&VulkanRootSignature> {
    vk_root_signature(root)
        .ok_or_else(|| Error::InvalidResource("Root signature was not created by the Vulkan backend".to_string()))
}

fn stage_info(shader: &VulkanShader) -> vk::PipelineShaderStageCreateInfo<'_> {
    vk::PipelineShaderStageCreateInfo::default()
        .stage(shader.stage)
        .module(shader.module)
        .name(&shader.entry_point)
}

// ============================================================================
// DESCRIPTOR SET
// ============================================================================

/// One allocated set of a reflected table
pub struct VulkanDescriptorSet {
    ctx: Arc<GpuContext>,
    pub(crate) set: vk::DescriptorSet,
    pool: vk::DescriptorPool,
}

impl VulkanDescriptorSet {
    pub(crate) fn new(ctx: Arc<GpuContext>, root: &dyn NativeRootSignature, set_index: u32) -> Result<Self> {
        let root = downcast_root(root)?;
        let ranges = match root.tables.get(set_index as usize) {
            Some(Some(ranges)) => ranges,
            _ => {
                return Err(Error::InvalidResource(format!(
                    "Set {} is not a reflected descriptor table",
                    set_index
                )))
            }
        };
        let layout = root.set_layouts[set_index as usize];
        let largest = ranges.iter().map(|r| r.count).max().unwrap_or(1);

        let mut pools = ctx
            .descriptor_pools
            .lock()
            .map_err(|_| Error::InvalidState("Descriptor pool lock poisoned".to_string()))?;

        for &pool in pools.iter().rev() {
            match allocate_set(&ctx.device, pool, layout) {
                Ok(set) => return Ok(Self { ctx: Arc::clone(&ctx), set, pool }),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => continue,
                Err(e) => return Err(ember_err!("ember::vulkan", "Failed to allocate descriptor set: {:?}", e)),
            }
        }

        let pool = create_set_pool(&ctx.device, DESCRIPTOR_POOL_SIZE.max(largest))?;
        pools.push(pool);
        ember_debug!("ember::vulkan", "Descriptor set pools grew to {}", pools.len());
        let set = allocate_set(&ctx.device, pool, layout)
            .map_err(|e| ember_err!("ember::vulkan", "Failed to allocate descriptor set: {:?}", e))?;
        drop(pools);
        Ok(Self { ctx, set, pool })
    }

    pub(crate) fn update(&self, writes: &[DescriptorSetWrite<'_>]) -> Result<()> {
        for write in writes {
            write_view(&self.ctx.device, self.set, write.binding, write.array_element, &write.view)?;
        }
        Ok(())
    }
}

impl NativeDescriptorSet for VulkanDescriptorSet {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for VulkanDescriptorSet {
    fn drop(&mut self) {
        // pools are externally synchronized
        if let Ok(_pools) = self.ctx.descriptor_pools.lock() {
            unsafe {
                self.ctx.device.free_descriptor_sets(self.pool, &[self.set]).ok();
            }
        }
    }
}

pub(crate) fn vk_descriptor_set(set: &dyn NativeDescriptorSet) -> Result<&VulkanDescriptorSet> {
    set.as_any()
        .downcast_ref::<VulkanDescriptorSet>()
        .ok_or_else(|| Error::InvalidResource("Descriptor set was not created by the Vulkan backend".to_string()))
}

fn allocate_set(
    device: &ash::Device,
    pool: vk::DescriptorPool,
    layout: vk::DescriptorSetLayout,
) -> std::result::Result<vk::DescriptorSet, vk::Result> {
    let layouts = [layout];
    let alloc_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(pool)
        .set_layouts(&layouts);
    unsafe { device.allocate_descriptor_sets(&alloc_info) }.map(|sets| sets[0])
}

fn create_set_pool(device: &ash::Device, descriptors_per_type: u32) -> Result<vk::DescriptorPool> {
    let pool_sizes = [
        vk::DescriptorType::UNIFORM_BUFFER,
        vk::DescriptorType::STORAGE_BUFFER,
        vk::DescriptorType::SAMPLED_IMAGE,
        vk::DescriptorType::STORAGE_IMAGE,
        vk::DescriptorType::SAMPLER,
    ]
    .map(|ty| vk::DescriptorPoolSize {
        ty,
        descriptor_count: descriptors_per_type,
    });
    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(DESCRIPTOR_POOL_MAX_SETS)
        .pool_sizes(&pool_sizes);
    unsafe { device.create_descriptor_pool(&pool_info, None) }
        .map_err(|e| ember_err!("ember::vulkan", "Failed to create descriptor pool: {:?}", e))
}
