//! Error types for the Ember RHI
//!
//! This module defines the error type returned by every fallible operation of
//! the device, the resource factories and the command recording API.

use std::fmt;

use crate::rhi::DescriptorHeapKind;

/// Result type for Ember RHI operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ember RHI errors
#[derive(Debug, Clone)]
pub enum Error {
    /// Native API call failed (Vulkan, mock, ...)
    BackendError(String),

    /// Out of GPU memory
    OutOfMemory,

    /// Invalid resource (texture, buffer, shader, etc.)
    InvalidResource(String),

    /// Initialization failed (instance, adapter, device, heaps)
    InitializationFailed(String),

    /// Operation called in the wrong state (recording, finalized pipeline, ...)
    InvalidState(String),

    /// No free slot left in a descriptor heap
    DescriptorHeapExhausted {
        kind: DescriptorHeapKind,
        capacity: u32,
    },

    /// Shader module rejected, carries the native diagnostic text
    ShaderCompilation(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::OutOfMemory => write!(f, "Out of GPU memory"),
            Error::InvalidResource(msg) => write!(f, "Invalid resource: {}", msg),
            Error::InitializationFailed(msg) => write!(f, "Initialization failed: {}", msg),
            Error::InvalidState(msg) => write!(f, "Invalid state: {}", msg),
            Error::DescriptorHeapExhausted { kind, capacity } => write!(
                f,
                "Descriptor heap exhausted: {:?} heap is full ({} descriptors)",
                kind, capacity
            ),
            Error::ShaderCompilation(msg) => write!(f, "Shader compilation failed: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
