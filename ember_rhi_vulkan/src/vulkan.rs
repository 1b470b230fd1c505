//! Vulkan backend
//!
//! [`VulkanBackend`] opens a Vulkan 1.3 device and implements the
//! [`Backend`] trait family on top of it. Required device features:
//! timeline semaphores, synchronization2, dynamic rendering and
//! update-after-bind descriptor indexing for the bindless heaps.

use ash::vk;
use ember_rhi::ember::rhi::backend::{
    Backend, DescriptorSetWrite, DescriptorView, NativeBuffer, NativeBufferDesc, NativeCommandAllocator,
    NativeCommandList, NativeDescriptorHeap, NativeDescriptorSet, NativeFence, NativePipeline, NativeRootSignature,
    NativeSampler, NativeShader, NativeSwapChain, NativeTexture, NativeTextureDesc, ShaderModuleDesc, SwapChainDesc,
};
use ember_rhi::ember::rhi::{
    select_adapter, AdapterInfo, AdapterKind, DescriptorHeapKind, DeviceConfig, GraphicsPipelineDesc, QueueType,
    RootSignatureDesc, SamplerDesc, QUEUE_TYPE_COUNT,
};
use ember_rhi::ember::{Error, Result};
use ember_rhi::{ember_debug, ember_err, ember_error, ember_info, ember_warn};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use raw_window_handle::{HasDisplayHandle, RawDisplayHandle, RawWindowHandle};
use std::ffi::{CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::{Arc, Mutex};

use crate::vulkan_buffer::VulkanBuffer;
use crate::vulkan_command_list::{vk_command_list, VulkanCommandAllocator, VulkanCommandList};
use crate::vulkan_context::{GpuContext, VulkanQueue};
use crate::vulkan_descriptor_heap::{vk_heap, BindlessLimits, VulkanDescriptorHeap};
use crate::vulkan_fence::{vk_fence, VulkanFence};
use crate::vulkan_pipeline::{vk_descriptor_set, VulkanDescriptorSet, VulkanPipeline, VulkanRootSignature};
use crate::vulkan_shader::VulkanShader;
use crate::vulkan_swapchain::VulkanSwapChain;
use crate::vulkan_texture::{VulkanSampler, VulkanTexture};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Vulkan implementation of [`Backend`]
pub struct VulkanBackend {
    ctx: Arc<GpuContext>,
    adapter: AdapterInfo,
}

/// Logical device opened on one adapter, before the context exists
struct OpenedDevice {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    families: [u32; QUEUE_TYPE_COUNT],
    family_flags: Vec<vk::QueueFlags>,
    limits: vk::PhysicalDeviceLimits,
    sampler_anisotropy: bool,
    fill_mode_non_solid: bool,
    bindless_limits: BindlessLimits,
}

impl VulkanBackend {
    /// Open a device without presentation support
    pub fn new_headless(config: &DeviceConfig) -> Result<Self> {
        Self::create(config, None)
    }

    /// Open a device able to present to windows of `display`
    pub fn new<D: HasDisplayHandle>(config: &DeviceConfig, display: &D) -> Result<Self> {
        let display = display
            .display_handle()
            .map_err(|e| {
                ember_error!("ember::vulkan", "Failed to get display handle: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?
            .as_raw();
        Self::create(config, Some(display))
    }

    pub fn context(&self) -> &Arc<GpuContext> {
        &self.ctx
    }

    fn create(config: &DeviceConfig, display: Option<RawDisplayHandle>) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }.map_err(|e| {
            ember_error!("ember::vulkan", "Failed to load Vulkan library: {:?}", e);
            Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
        })?;

        let validation = config.enable_validation && validation_layer_available(&entry);
        let instance = create_instance(&entry, config, display, validation)?;

        let (debug_utils_loader, debug_messenger) = if validation {
            let debug_utils = ash::ext::debug_utils::Instance::new(&entry, &instance);
            crate::debug::init_debug_config();
            match unsafe { debug_utils.create_debug_utils_messenger(&crate::debug::messenger_create_info(), None) } {
                Ok(messenger) => (Some(debug_utils), Some(messenger)),
                Err(e) => {
                    ember_warn!("ember::vulkan", "Debug messenger unavailable: {:?}", e);
                    crate::debug::cleanup_debug_config();
                    (None, None)
                }
            }
        } else {
            (None, None)
        };

        let opened = enumerate_adapters(&instance).and_then(|(physical_devices, adapters)| {
            let (index, opened) = select_adapter(&adapters, config.adapter_preference, |index, adapter| {
                open_device(&instance, physical_devices[index], adapter, config, display.is_some())
            })?;
            Ok((adapters[index].clone(), opened))
        });
        let (adapter, opened) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                unsafe {
                    crate::debug::cleanup_debug_config();
                    if let (Some(debug_utils), Some(messenger)) = (&debug_utils_loader, debug_messenger) {
                        debug_utils.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(e);
            }
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: opened.device.clone(),
            physical_device: opened.physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        });
        let upload_pool = unsafe {
            opened.device.create_command_pool(
                &vk::CommandPoolCreateInfo::default()
                    .queue_family_index(opened.families[QueueType::Graphics.index()])
                    .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER),
                None,
            )
        };
        let (allocator, upload_pool) = match (allocator, upload_pool) {
            (Ok(allocator), Ok(pool)) => (allocator, pool),
            (allocator, pool) => {
                ember_error!("ember::vulkan", "Failed to create the allocator or the upload pool");
                unsafe {
                    if let Ok(pool) = pool {
                        opened.device.destroy_command_pool(pool, None);
                    }
                    drop(allocator);
                    opened.device.destroy_device(None);
                    crate::debug::cleanup_debug_config();
                    if let (Some(debug_utils), Some(messenger)) = (&debug_utils_loader, debug_messenger) {
                        debug_utils.destroy_debug_utils_messenger(messenger, None);
                    }
                    instance.destroy_instance(None);
                }
                return Err(Error::InitializationFailed("Failed to create GPU allocator".to_string()));
            }
        };

        let queues = build_queues(&opened.device, &opened.families, &opened.family_flags);
        let debug_utils_device = debug_utils_loader
            .as_ref()
            .map(|_| ash::ext::debug_utils::Device::new(&instance, &opened.device));

        let ctx = Arc::new(GpuContext {
            entry,
            instance,
            physical_device: opened.physical_device,
            device: opened.device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            queues,
            upload_command_pool: Mutex::new(upload_pool),
            descriptor_pools: Mutex::new(Vec::new()),
            limits: opened.limits,
            sampler_anisotropy: opened.sampler_anisotropy,
            fill_mode_non_solid: opened.fill_mode_non_solid,
            bindless_limits: opened.bindless_limits,
            presentable: display.is_some(),
            debug_utils_loader,
            debug_utils_device,
            debug_messenger,
        });

        ember_info!(
            "ember::vulkan",
            "Vulkan device ready on '{}' (queue families: graphics {}, compute {}, transfer {})",
            adapter.name,
            opened.families[0],
            opened.families[1],
            opened.families[2]
        );
        Ok(Self { ctx, adapter })
    }
}

// ============================================================================
// INSTANCE AND DEVICE CREATION
// ============================================================================

fn validation_layer_available(entry: &ash::Entry) -> bool {
    let layers = unsafe { entry.enumerate_instance_layer_properties() }.unwrap_or_default();
    let found = layers
        .iter()
        .any(|layer| layer.layer_name_as_c_str().is_ok_and(|name| name == VALIDATION_LAYER));
    if !found {
        ember_warn!(
            "ember::vulkan",
            "Validation requested but {:?} is not installed, continuing without it",
            VALIDATION_LAYER
        );
    }
    found
}

fn create_instance(
    entry: &ash::Entry,
    config: &DeviceConfig,
    display: Option<RawDisplayHandle>,
    validation: bool,
) -> Result<ash::Instance> {
    let app_name = CString::new(config.app_name.as_str()).unwrap_or_else(|_| CString::from(c"Ember Application"));
    let app_info = vk::ApplicationInfo::default()
        .application_name(&app_name)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(c"Ember")
        .engine_version(vk::make_api_version(0, 0, 1, 0))
        .api_version(vk::API_VERSION_1_3);

    let mut extension_names = match display {
        Some(display) => ash_window::enumerate_required_extensions(display)
            .map_err(|e| {
                ember_error!("ember::vulkan", "Failed to get required extensions: {}", e);
                Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
            })?
            .to_vec(),
        None => Vec::new(),
    };
    let layer_names = if validation {
        extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
        vec![VALIDATION_LAYER.as_ptr()]
    } else {
        Vec::new()
    };

    let create_info = vk::InstanceCreateInfo::default()
        .application_info(&app_info)
        .enabled_layer_names(&layer_names)
        .enabled_extension_names(&extension_names);

    unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
        ember_error!("ember::vulkan", "Failed to create Vulkan instance: {:?}", e);
        Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
    })
}

pub(crate) fn adapter_kind(device_type: vk::PhysicalDeviceType) -> AdapterKind {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => AdapterKind::Discrete,
        vk::PhysicalDeviceType::INTEGRATED_GPU => AdapterKind::Integrated,
        vk::PhysicalDeviceType::VIRTUAL_GPU => AdapterKind::Virtual,
        vk::PhysicalDeviceType::CPU => AdapterKind::Cpu,
        _ => AdapterKind::Other,
    }
}

fn enumerate_adapters(instance: &ash::Instance) -> Result<(Vec<vk::PhysicalDevice>, Vec<AdapterInfo>)> {
    let physical_devices = unsafe { instance.enumerate_physical_devices() }.map_err(|e| {
        ember_error!("ember::vulkan", "Failed to enumerate physical devices: {:?}", e);
        Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
    })?;

    let adapters = physical_devices
        .iter()
        .map(|&physical_device| {
            let properties = unsafe { instance.get_physical_device_properties(physical_device) };
            let memory = unsafe { instance.get_physical_device_memory_properties(physical_device) };
            let dedicated_memory = memory.memory_heaps[..memory.memory_heap_count as usize]
                .iter()
                .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
                .map(|heap| heap.size)
                .sum();
            AdapterInfo {
                name: properties
                    .device_name_as_c_str()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                vendor_id: properties.vendor_id,
                device_id: properties.device_id,
                kind: adapter_kind(properties.device_type),
                dedicated_memory,
            }
        })
        .collect();
    Ok((physical_devices, adapters))
}

/// Queue family per queue type.
///
/// Graphics takes the first graphics family. With async queues, compute
/// prefers a compute family without graphics and transfer a transfer-only
/// family, then the compute-only family; both fall back to graphics.
pub(crate) fn select_queue_families(
    families: &[vk::QueueFlags],
    async_queues: bool,
) -> Option<[u32; QUEUE_TYPE_COUNT]> {
    let find = |wanted: vk::QueueFlags, excluded: vk::QueueFlags| {
        families
            .iter()
            .position(|&flags| flags.contains(wanted) && !flags.intersects(excluded))
            .map(|index| index as u32)
    };

    let graphics = find(vk::QueueFlags::GRAPHICS, vk::QueueFlags::empty())?;
    if !async_queues {
        return Some([graphics; QUEUE_TYPE_COUNT]);
    }
    let compute_only = find(vk::QueueFlags::COMPUTE, vk::QueueFlags::GRAPHICS);
    let transfer_only = find(vk::QueueFlags::TRANSFER, vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE);

    let mut families_by_type = [graphics; QUEUE_TYPE_COUNT];
    families_by_type[QueueType::Compute.index()] = compute_only.unwrap_or(graphics);
    families_by_type[QueueType::Transfer.index()] = transfer_only.or(compute_only).unwrap_or(graphics);
    Some(families_by_type)
}

fn open_device(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    adapter: &AdapterInfo,
    config: &DeviceConfig,
    presentable: bool,
) -> Result<OpenedDevice> {
    let mut indexing = vk::PhysicalDeviceDescriptorIndexingProperties::default();
    let mut properties2 = vk::PhysicalDeviceProperties2::default().push_next(&mut indexing);
    unsafe { instance.get_physical_device_properties2(physical_device, &mut properties2) };
    let properties = properties2.properties;

    let version = properties.api_version;
    if vk::api_version_major(version) < 1 || (vk::api_version_major(version) == 1 && vk::api_version_minor(version) < 3) {
        return Err(Error::InitializationFailed(format!(
            "'{}' supports Vulkan {}.{}, 1.3 is required",
            adapter.name,
            vk::api_version_major(version),
            vk::api_version_minor(version)
        )));
    }

    let mut supported12 = vk::PhysicalDeviceVulkan12Features::default();
    let mut supported13 = vk::PhysicalDeviceVulkan13Features::default();
    let mut features2 = vk::PhysicalDeviceFeatures2::default()
        .push_next(&mut supported12)
        .push_next(&mut supported13);
    unsafe { instance.get_physical_device_features2(physical_device, &mut features2) };
    let supported = features2.features;

    let missing = missing_features(&supported12, &supported13);
    if !missing.is_empty() {
        return Err(Error::InitializationFailed(format!(
            "'{}' lacks required features: {}",
            adapter.name,
            missing.join(", ")
        )));
    }
    let uniform_update_after_bind = supported12.descriptor_binding_uniform_buffer_update_after_bind == vk::TRUE;
    if !uniform_update_after_bind {
        ember_warn!(
            "ember::vulkan",
            "'{}' cannot update uniform buffer descriptors after bind; constant buffer views must be written before use",
            adapter.name
        );
    }

    let family_flags: Vec<vk::QueueFlags> =
        unsafe { instance.get_physical_device_queue_family_properties(physical_device) }
            .iter()
            .map(|family| family.queue_flags)
            .collect();
    let families = select_queue_families(&family_flags, config.async_queues)
        .ok_or_else(|| Error::InitializationFailed(format!("'{}' has no graphics queue", adapter.name)))?;

    let mut unique_families: Vec<u32> = families.to_vec();
    unique_families.sort_unstable();
    unique_families.dedup();
    let priorities = [1.0];
    let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique_families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(&priorities)
        })
        .collect();

    let extension_names = if presentable {
        vec![ash::khr::swapchain::NAME.as_ptr()]
    } else {
        Vec::new()
    };

    let sampler_anisotropy = supported.sampler_anisotropy == vk::TRUE;
    let fill_mode_non_solid = supported.fill_mode_non_solid == vk::TRUE;
    let enabled = vk::PhysicalDeviceFeatures::default()
        .sampler_anisotropy(sampler_anisotropy)
        .fill_mode_non_solid(fill_mode_non_solid);
    let mut enabled12 = vk::PhysicalDeviceVulkan12Features::default()
        .timeline_semaphore(true)
        .descriptor_indexing(true)
        .runtime_descriptor_array(true)
        .descriptor_binding_partially_bound(true)
        .descriptor_binding_sampled_image_update_after_bind(true)
        .descriptor_binding_storage_image_update_after_bind(true)
        .descriptor_binding_storage_buffer_update_after_bind(true)
        .descriptor_binding_uniform_buffer_update_after_bind(uniform_update_after_bind)
        .descriptor_binding_update_unused_while_pending(
            supported12.descriptor_binding_update_unused_while_pending == vk::TRUE,
        )
        .shader_sampled_image_array_non_uniform_indexing(
            supported12.shader_sampled_image_array_non_uniform_indexing == vk::TRUE,
        );
    let mut enabled13 = vk::PhysicalDeviceVulkan13Features::default()
        .synchronization2(true)
        .dynamic_rendering(true);

    let create_info = vk::DeviceCreateInfo::default()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extension_names)
        .enabled_features(&enabled)
        .push_next(&mut enabled12)
        .push_next(&mut enabled13);

    let device = unsafe { instance.create_device(physical_device, &create_info, None) }.map_err(|e| {
        ember_error!("ember::vulkan", "Failed to create logical device on '{}': {:?}", adapter.name, e);
        Error::InitializationFailed(format!("Failed to create device: {:?}", e))
    })?;

    Ok(OpenedDevice {
        device,
        physical_device,
        families,
        family_flags,
        limits: properties.limits,
        sampler_anisotropy,
        fill_mode_non_solid,
        bindless_limits: BindlessLimits::from_properties(&indexing, &properties.limits, uniform_update_after_bind),
    })
}

/// Names of required features the adapter does not support
pub(crate) fn missing_features(
    v12: &vk::PhysicalDeviceVulkan12Features<'_>,
    v13: &vk::PhysicalDeviceVulkan13Features<'_>,
) -> Vec<&'static str> {
    [
        ("timelineSemaphore", v12.timeline_semaphore),
        ("descriptorIndexing", v12.descriptor_indexing),
        ("runtimeDescriptorArray", v12.runtime_descriptor_array),
        ("descriptorBindingPartiallyBound", v12.descriptor_binding_partially_bound),
        (
            "descriptorBindingSampledImageUpdateAfterBind",
            v12.descriptor_binding_sampled_image_update_after_bind,
        ),
        (
            "descriptorBindingStorageImageUpdateAfterBind",
            v12.descriptor_binding_storage_image_update_after_bind,
        ),
        (
            "descriptorBindingStorageBufferUpdateAfterBind",
            v12.descriptor_binding_storage_buffer_update_after_bind,
        ),
        ("synchronization2", v13.synchronization2),
        ("dynamicRendering", v13.dynamic_rendering),
    ]
    .into_iter()
    .filter(|&(_, supported)| supported != vk::TRUE)
    .map(|(name, _)| name)
    .collect()
}

/// One queue per family; queue types on the same family share it
fn build_queues(
    device: &ash::Device,
    families: &[u32; QUEUE_TYPE_COUNT],
    family_flags: &[vk::QueueFlags],
) -> [VulkanQueue; QUEUE_TYPE_COUNT] {
    let mut created: Vec<VulkanQueue> = Vec::with_capacity(QUEUE_TYPE_COUNT);
    let mut queue_for = |family: u32| {
        if let Some(queue) = created.iter().find(|q| q.family == family) {
            return queue.clone();
        }
        let queue = VulkanQueue {
            handle: unsafe { device.get_device_queue(family, 0) },
            family,
            flags: family_flags.get(family as usize).copied().unwrap_or_default(),
            submit_lock: Arc::new(Mutex::new(())),
        };
        created.push(queue.clone());
        queue
    };
    let graphics = queue_for(families[0]);
    let compute = queue_for(families[1]);
    let transfer = queue_for(families[2]);
    [graphics, compute, transfer]
}

// ============================================================================
// BACKEND
// ============================================================================

impl Backend for VulkanBackend {
    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn create_command_allocator(&self, queue: QueueType) -> Result<Box<dyn NativeCommandAllocator>> {
        Ok(Box::new(VulkanCommandAllocator::new(Arc::clone(&self.ctx), queue)?))
    }

    fn create_command_list(
        &self,
        queue: QueueType,
        allocator: &dyn NativeCommandAllocator,
    ) -> Result<Box<dyn NativeCommandList>> {
        Ok(Box::new(VulkanCommandList::new(Arc::clone(&self.ctx), queue, allocator)?))
    }

    fn execute_command_lists(&self, queue: QueueType, lists: &[&dyn NativeCommandList]) -> Result<()> {
        let command_buffers = lists
            .iter()
            .map(|list| {
                vk_command_list(*list)
                    .map(|list| vk::CommandBufferSubmitInfo::default().command_buffer(list.command_buffer))
            })
            .collect::<Result<Vec<_>>>()?;
        let submit = vk::SubmitInfo2::default().command_buffer_infos(&command_buffers);
        self.ctx.submit(queue, &[submit], vk::Fence::null())
    }

    fn create_fence(&self) -> Result<Box<dyn NativeFence>> {
        Ok(Box::new(VulkanFence::new(Arc::clone(&self.ctx))?))
    }

    fn signal_fence(&self, queue: QueueType, fence: &dyn NativeFence, value: u64) -> Result<()> {
        let fence = vk_fence(fence)?;
        let signal = [vk::SemaphoreSubmitInfo::default()
            .semaphore(fence.semaphore)
            .value(value)
            .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)];
        let submit = vk::SubmitInfo2::default().signal_semaphore_infos(&signal);
        self.ctx.submit(queue, &[submit], vk::Fence::null())
    }

    fn create_buffer(&self, desc: &NativeBufferDesc<'_>) -> Result<Box<dyn NativeBuffer>> {
        Ok(Box::new(VulkanBuffer::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_texture(&self, desc: &NativeTextureDesc<'_>) -> Result<Box<dyn NativeTexture>> {
        Ok(Box::new(VulkanTexture::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Box<dyn NativeSampler>> {
        Ok(Box::new(VulkanSampler::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_descriptor_heap(
        &self,
        kind: DescriptorHeapKind,
        capacity: u32,
    ) -> Result<Box<dyn NativeDescriptorHeap>> {
        Ok(Box::new(VulkanDescriptorHeap::new(Arc::clone(&self.ctx), kind, capacity)?))
    }

    fn write_descriptor(&self, heap: &dyn NativeDescriptorHeap, slot: u32, view: &DescriptorView<'_>) -> Result<()> {
        vk_heap(heap)?.write(slot, view)
    }

    fn create_shader(&self, desc: &ShaderModuleDesc<'_>) -> Result<Box<dyn NativeShader>> {
        Ok(Box::new(VulkanShader::new(Arc::clone(&self.ctx), desc)?))
    }

    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
        heaps: &[&dyn NativeDescriptorHeap],
    ) -> Result<Box<dyn NativeRootSignature>> {
        Ok(Box::new(VulkanRootSignature::new(Arc::clone(&self.ctx), desc, heaps)?))
    }

    fn create_compute_pipeline(
        &self,
        root: &dyn NativeRootSignature,
        shader: &dyn NativeShader,
    ) -> Result<Box<dyn NativePipeline>> {
        Ok(Box::new(VulkanPipeline::new_compute(Arc::clone(&self.ctx), root, shader)?))
    }

    fn create_graphics_pipeline(
        &self,
        root: &dyn NativeRootSignature,
        desc: &GraphicsPipelineDesc,
        vertex: &dyn NativeShader,
        pixel: Option<&dyn NativeShader>,
    ) -> Result<Box<dyn NativePipeline>> {
        Ok(Box::new(VulkanPipeline::new_graphics(
            Arc::clone(&self.ctx),
            root,
            desc,
            vertex,
            pixel,
        )?))
    }

    fn create_descriptor_set(
        &self,
        root: &dyn NativeRootSignature,
        set_index: u32,
    ) -> Result<Box<dyn NativeDescriptorSet>> {
        Ok(Box::new(VulkanDescriptorSet::new(Arc::clone(&self.ctx), root, set_index)?))
    }

    fn update_descriptor_set(&self, set: &dyn NativeDescriptorSet, writes: &[DescriptorSetWrite<'_>]) -> Result<()> {
        vk_descriptor_set(set)?.update(writes)
    }

    fn create_swap_chain(
        &self,
        desc: &SwapChainDesc,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<Box<dyn NativeSwapChain>> {
        if !self.ctx.presentable {
            return Err(Error::InvalidState(
                "Backend was opened headless; use VulkanBackend::new to present".to_string(),
            ));
        }
        let surface = unsafe { ash_window::create_surface(&self.ctx.entry, &self.ctx.instance, display, window, None) }
            .map_err(|e| {
                ember_error!("ember::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;
        let surface_loader = ash::khr::surface::Instance::new(&self.ctx.entry, &self.ctx.instance);
        ember_debug!("ember::vulkan", "Surface created for a {}x{} swapchain", desc.width, desc.height);
        Ok(Box::new(VulkanSwapChain::new(Arc::clone(&self.ctx), surface_loader, surface, desc)?))
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.ctx.device.device_wait_idle() }
            .map_err(|e| ember_err!("ember::vulkan", "device_wait_idle failed: {:?}", e))
    }
}

#[cfg(test)]
#[path = "vulkan_tests.rs"]
mod tests;
