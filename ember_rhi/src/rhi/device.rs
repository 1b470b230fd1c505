//! Device: resource factory, submission and frame pacing

use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use rustc_hash::FxHashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::error::{Error, Result};
use crate::rhi::adapter::AdapterInfo;
use crate::rhi::backend::{Backend, NativeCommandList, SwapChainDesc};
use crate::rhi::buffer::{Buffer, BufferCreateInfo};
use crate::rhi::command_context::CommandContext;
use crate::rhi::command_list::CommandList;
use crate::rhi::config::DeviceConfig;
use crate::rhi::context::RendererContext;
use crate::rhi::fence::FenceTracker;
use crate::rhi::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc, Pipeline};
use crate::rhi::shader::Shader;
use crate::rhi::swap_chain::{SwapChain, SwapChainCreateInfo};
use crate::rhi::texture::{RenderTarget, RenderTargetCreateInfo, Sampler, SamplerDesc, Texture, TextureCreateInfo};
use crate::rhi::types::{MemoryFlag, QueueType, ShaderType};
use crate::{ember_debug, ember_info, ember_trace};

/// Lists submitted together to one queue, executed in slice order
pub struct QueueSubmitInfo<'a> {
    pub queue_type: QueueType,
    pub command_lists: &'a [Arc<Mutex<CommandList>>],
}

/// Top-level RHI object bound to one adapter
pub struct Device {
    thread_contexts: Mutex<FxHashMap<ThreadId, Arc<Mutex<CommandContext>>>>,
    fences: Mutex<FenceTracker>,
    context: Arc<RendererContext>,
}

fn lock<'a, T>(mutex: &'a Mutex<T>, what: &str) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| Error::InvalidState(format!("{} lock poisoned by a panicking thread", what)))
}

/// Lock for a read-only query, recovering the guard from a poisoned lock
fn peek<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Device {
    /// Wrap an opened backend and create the descriptor heaps
    pub fn new(backend: Arc<dyn Backend>, config: DeviceConfig) -> Result<Self> {
        let context = Arc::new(RendererContext::new(backend, config)?);
        let caps = context.config().heap_capacities;
        ember_info!(
            "ember::Device",
            "Device ready on '{}' (heaps: {} RTV, {} CBV/SRV/UAV, {} samplers)",
            context.backend().adapter().name,
            caps.rtv,
            caps.cbv_srv_uav,
            caps.sampler
        );
        Ok(Self {
            thread_contexts: Mutex::new(FxHashMap::default()),
            fences: Mutex::new(FenceTracker::new()),
            context,
        })
    }

    pub fn context(&self) -> &Arc<RendererContext> {
        &self.context
    }

    pub fn adapter(&self) -> &AdapterInfo {
        self.context.backend().adapter()
    }

    pub fn config(&self) -> &DeviceConfig {
        self.context.config()
    }

    // ===== RESOURCES =====

    pub fn create_buffer(&self, info: &BufferCreateInfo, memory: MemoryFlag) -> Result<Arc<Buffer>> {
        Buffer::new(Arc::clone(&self.context), info, memory).map(Arc::new)
    }

    pub fn create_texture(&self, info: &TextureCreateInfo) -> Result<Arc<Texture>> {
        Texture::new(Arc::clone(&self.context), info).map(Arc::new)
    }

    pub fn create_sampler(&self, desc: &SamplerDesc) -> Result<Arc<Sampler>> {
        Sampler::new(Arc::clone(&self.context), desc).map(Arc::new)
    }

    pub fn create_render_target(&self, info: &RenderTargetCreateInfo) -> Result<Arc<RenderTarget>> {
        RenderTarget::new(Arc::clone(&self.context), info).map(Arc::new)
    }

    /// Create a swapchain presenting into `window`
    pub fn create_swap_chain<W>(&self, window: &W, info: &SwapChainCreateInfo) -> Result<SwapChain>
    where
        W: HasDisplayHandle + HasWindowHandle,
    {
        let display = window
            .display_handle()
            .map_err(|e| Error::InitializationFailed(format!("No display handle: {}", e)))?
            .as_raw();
        let window = window
            .window_handle()
            .map_err(|e| Error::InitializationFailed(format!("No window handle: {}", e)))?
            .as_raw();

        let config = self.context.config();
        let desc = SwapChainDesc {
            width: info.width,
            height: info.height,
            format: info.format,
            back_buffer_count: config.back_buffer_count,
            sync_interval: config.present_sync_interval,
        };
        let native = self.context.backend().create_swap_chain(&desc, display, window)?;
        SwapChain::new(Arc::clone(&self.context), native)
    }

    // ===== SHADERS AND PIPELINES =====

    /// Load a compiled shader module from `path`
    pub fn create_shader(&self, shader_type: ShaderType, path: impl AsRef<Path>) -> Result<Arc<Shader>> {
        Shader::from_file(&self.context, shader_type, path.as_ref()).map(Arc::new)
    }

    pub fn create_shader_from_bytes(&self, shader_type: ShaderType, label: &str, code: &[u8]) -> Result<Arc<Shader>> {
        Shader::from_bytes(&self.context, shader_type, label, code).map(Arc::new)
    }

    /// Empty compute pipeline, finalized by `set_compute_shader`
    pub fn create_compute_pipeline(&self, desc: &ComputePipelineDesc) -> Pipeline {
        Pipeline::new_compute(Arc::clone(&self.context), desc)
    }

    /// Empty graphics pipeline, finalized by `set_graphics_shader`
    pub fn create_graphics_pipeline(&self, desc: &GraphicsPipelineDesc) -> Result<Pipeline> {
        Pipeline::new_graphics(Arc::clone(&self.context), desc)
    }

    // ===== COMMAND LISTS =====

    /// The calling thread's command context, created on first use
    pub fn command_context(&self) -> Result<Arc<Mutex<CommandContext>>> {
        let id = thread::current().id();
        let mut contexts = lock(&self.thread_contexts, "thread registry")?;
        let context = contexts.entry(id).or_insert_with(|| {
            ember_debug!("ember::Device", "New command context for {:?}", id);
            Arc::new(Mutex::new(CommandContext::new(Arc::clone(&self.context))))
        });
        Ok(Arc::clone(context))
    }

    /// Next command list of the calling thread for `queue_type`
    pub fn get_command_list(&self, queue_type: QueueType) -> Result<Arc<Mutex<CommandList>>> {
        let context = self.command_context()?;
        let mut context = lock(&context, "command context")?;
        context.get_command_list(queue_type)
    }

    /// Forget the calling thread's context. Returns whether one existed.
    pub fn release_thread_context(&self) -> Result<bool> {
        let id = thread::current().id();
        Ok(lock(&self.thread_contexts, "thread registry")?.remove(&id).is_some())
    }

    /// Number of threads holding a command context
    pub fn thread_context_count(&self) -> usize {
        peek(&self.thread_contexts).len()
    }

    /// Execute closed lists on their queue and track the submission with a fence
    pub fn submit_command_lists(&self, info: &QueueSubmitInfo<'_>) -> Result<()> {
        if info.command_lists.is_empty() {
            return Ok(());
        }
        for (i, list) in info.command_lists.iter().enumerate() {
            if info.command_lists[..i].iter().any(|other| Arc::ptr_eq(other, list)) {
                return Err(Error::InvalidState(format!("Command list {} submitted twice in one batch", i)));
            }
        }

        let guards = info
            .command_lists
            .iter()
            .map(|list| lock(list, "command list"))
            .collect::<Result<Vec<_>>>()?;
        for (i, list) in guards.iter().enumerate() {
            if list.is_recording() {
                return Err(Error::InvalidState(format!("Command list {} is still recording", i)));
            }
            if list.queue_type() != info.queue_type {
                return Err(Error::InvalidState(format!(
                    "Command list {} records for {:?}, submitted to {:?}",
                    i,
                    list.queue_type(),
                    info.queue_type
                )));
            }
        }

        let natives: Vec<&dyn NativeCommandList> = guards.iter().map(|list| list.native()).collect();
        let backend = self.context.backend();
        backend.execute_command_lists(info.queue_type, &natives)?;
        ember_trace!("ember::Device", "Submitted {} lists to {:?}", natives.len(), info.queue_type);

        lock(&self.fences, "fence tracker")?.acquire(backend, info.queue_type)
    }

    // ===== FRAMES =====

    /// Present the current back buffer with the configured sync interval
    pub fn present(&self, swap_chain: &mut SwapChain) -> Result<()> {
        swap_chain.present(self.context.config().present_sync_interval)
    }

    /// Start a new frame.
    ///
    /// Acquires the next back buffer, waits and releases every fence of the
    /// previous frame, retires its staging memory and resets the calling
    /// thread's command context. Returns the back buffer index.
    pub fn acquire_next_frame(&self, swap_chain: &mut SwapChain) -> Result<u32> {
        let index = swap_chain.acquire_next()?;
        self.begin_frame()?;
        Ok(index)
    }

    /// Frame boundary without a swapchain (headless/compute work)
    pub fn begin_frame(&self) -> Result<()> {
        lock(&self.fences, "fence tracker")?.reset_frame(self.context.backend())?;
        let generation = self.context.advance_frame();

        let id = thread::current().id();
        let context = lock(&self.thread_contexts, "thread registry")?.get(&id).cloned();
        if let Some(context) = context {
            lock(&context, "command context")?.reset()?;
        }
        ember_trace!("ember::Device", "Frame {} started", generation);
        Ok(())
    }

    /// Block until every submission on `queue_type` since the last wait completed
    pub fn wait_gpu_execution(&self, queue_type: QueueType) -> Result<()> {
        lock(&self.fences, "fence tracker")?.wait(self.context.backend(), queue_type)
    }

    /// Block until the whole GPU is idle
    pub fn wait_idle(&self) -> Result<()> {
        self.context.backend().wait_idle()
    }

    /// Current fence index of `queue_type`
    pub fn fence_index(&self, queue_type: QueueType) -> u32 {
        peek(&self.fences).fence_index(queue_type)
    }

    /// Fence objects held for `queue_type` in this frame
    pub fn fence_count(&self, queue_type: QueueType) -> usize {
        peek(&self.fences).fence_count(queue_type)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.context.backend().wait_idle() {
            crate::ember_error!("ember::Device", "wait_idle failed during shutdown: {}", e);
        }
    }
}

#[cfg(test)]
#[path = "device_tests.rs"]
mod tests;
