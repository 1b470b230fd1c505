#![allow(dead_code)]
//! Shared GPU objects for the integration tests
//!
//! One headless device serves every test of a binary. Windowed tests build
//! their own backend from [`create_test_window`].

use ember_rhi::ember::rhi::DeviceConfig;
use ember_rhi::ember::Device;
use ember_rhi_vulkan::VulkanBackend;
use std::sync::{Arc, OnceLock};
use winit::event_loop::{EventLoop, EventLoopBuilder};
use winit::window::Window;

#[cfg(target_os = "windows")]
use winit::platform::windows::EventLoopBuilderExtWindows;
#[cfg(all(unix, not(target_os = "macos")))]
use winit::platform::x11::EventLoopBuilderExtX11;

static GPU_DEVICE: OnceLock<Arc<Device>> = OnceLock::new();

pub fn test_config() -> DeviceConfig {
    DeviceConfig {
        app_name: "ember gpu tests".to_string(),
        enable_validation: true,
        ..DeviceConfig::default()
    }
}

/// Headless device shared by all tests, created on first call
pub fn get_test_device() -> Arc<Device> {
    GPU_DEVICE
        .get_or_init(|| {
            let config = test_config();
            let backend = VulkanBackend::new_headless(&config).expect("Failed to open Vulkan backend for tests");
            Arc::new(Device::new(Arc::new(backend), config).expect("Failed to create Device for tests"))
        })
        .clone()
}

/// Hidden window plus its event loop, creatable off the main thread
#[allow(deprecated)]
pub fn create_test_window() -> (Window, EventLoop<()>) {
    let event_loop = {
        #[cfg(any(target_os = "windows", all(unix, not(target_os = "macos"))))]
        {
            EventLoopBuilder::new().with_any_thread(true).build().unwrap()
        }
        #[cfg(not(any(target_os = "windows", all(unix, not(target_os = "macos")))))]
        {
            EventLoopBuilder::new().build().unwrap()
        }
    };

    let window_attrs = Window::default_attributes()
        .with_title("Ember GPU Test Window")
        .with_inner_size(winit::dpi::PhysicalSize::new(320, 240))
        .with_visible(false);

    let window = event_loop.create_window(window_attrs).unwrap();
    (window, event_loop)
}
