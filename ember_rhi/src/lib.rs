/*!
# Ember RHI

Backend-agnostic render hardware interface.

This crate owns the command, resource and synchronization model of the
renderer: per-thread command list pools, descriptor heaps with recycled
slots, tracked resource states lowered into batched barriers, and
frame-scoped fences. Native GPU APIs plug in through the
[`rhi::backend::Backend`] trait family (see the `ember_rhi_vulkan` crate).

## Architecture

- **Device**: resource factory, submission, present and frame pacing
- **CommandContext**: one per thread, pools command lists per queue type
- **CommandList**: barriers, copies, binds, draws and dispatches
- **Buffer / Texture / RenderTarget / Sampler**: GPU resources with views
- **Pipeline**: shader-derived root signature and pipeline state
*/

// Internal modules
mod error;
pub mod log;
pub mod rhi;
pub mod utils;

// Main ember namespace module
pub mod ember {
    // Error types
    pub use crate::error::{Error, Result};

    // Device entry point
    pub use crate::rhi::Device;

    // Logging sub-module (types and logger control)
    pub mod log {
        pub use crate::log::{reset_logger, set_logger, DefaultLogger, LogEntry, LogSeverity, Logger};
    }

    // RHI sub-module with every rendering type
    pub mod rhi {
        pub use crate::rhi::*;
    }
}

// Re-export math library at crate root
pub use glam;
