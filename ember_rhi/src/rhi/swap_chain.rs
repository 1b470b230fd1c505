//! Presentable back buffers

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::rhi::backend::NativeSwapChain;
use crate::rhi::context::RendererContext;
use crate::rhi::texture::RenderTarget;
use crate::rhi::types::TextureFormat;
use crate::ember_info;

/// Swapchain creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwapChainCreateInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
}

impl Default for SwapChainCreateInfo {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            format: TextureFormat::B8G8R8A8_UNORM,
        }
    }
}

pub struct SwapChain {
    // back buffers go before the native swapchain that owns their images
    back_buffers: Vec<RenderTarget>,
    native: Box<dyn NativeSwapChain>,
    context: Arc<RendererContext>,
    current: u32,
}

impl SwapChain {
    pub(crate) fn new(context: Arc<RendererContext>, native: Box<dyn NativeSwapChain>) -> Result<Self> {
        let back_buffers = collect_back_buffers(&context, native.as_ref())?;
        let (width, height) = native.extent();
        ember_info!(
            "ember::SwapChain",
            "{} back buffers {}x{} ({:?})",
            back_buffers.len(),
            width,
            height,
            native.format()
        );
        Ok(Self {
            back_buffers,
            native,
            context,
            current: 0,
        })
    }

    pub fn back_buffer_count(&self) -> u32 {
        self.back_buffers.len() as u32
    }

    /// Index of the back buffer acquired last
    pub fn current_index(&self) -> u32 {
        self.current
    }

    pub fn current_back_buffer(&self) -> &RenderTarget {
        &self.back_buffers[self.current as usize]
    }

    pub fn back_buffer(&self, index: u32) -> Option<&RenderTarget> {
        self.back_buffers.get(index as usize)
    }

    pub fn extent(&self) -> (u32, u32) {
        self.native.extent()
    }

    pub fn format(&self) -> TextureFormat {
        self.native.format()
    }

    /// Recreate the back buffers at a new size. The GPU must be idle.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidResource(format!(
                "Cannot resize swapchain to {}x{}",
                width, height
            )));
        }
        self.back_buffers.clear();
        self.native.resize(width, height)?;
        self.back_buffers = collect_back_buffers(&self.context, self.native.as_ref())?;
        self.current = 0;
        ember_info!("ember::SwapChain", "Resized to {}x{}", width, height);
        Ok(())
    }

    pub(crate) fn acquire_next(&mut self) -> Result<u32> {
        let index = self.native.acquire_next_image()?;
        if index as usize >= self.back_buffers.len() {
            return Err(Error::BackendError(format!(
                "Swapchain returned image {} of {}",
                index,
                self.back_buffers.len()
            )));
        }
        self.current = index;
        Ok(index)
    }

    pub(crate) fn present(&mut self, sync_interval: u32) -> Result<()> {
        self.native.present(sync_interval)
    }

    pub fn native(&self) -> &dyn NativeSwapChain {
        self.native.as_ref()
    }
}

fn collect_back_buffers(context: &Arc<RendererContext>, native: &dyn NativeSwapChain) -> Result<Vec<RenderTarget>> {
    let (width, height) = native.extent();
    let format = native.format();
    (0..native.image_count())
        .map(|i| {
            let texture = native.back_buffer(i)?;
            RenderTarget::from_back_buffer(Arc::clone(context), texture, i, width, height, format)
        })
        .collect()
}
