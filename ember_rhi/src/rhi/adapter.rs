//! GPU adapter description and selection policy
//!
//! Backends enumerate their adapters into [`AdapterInfo`] values, order them
//! with [`order_adapters`] and hand the attempt loop to [`select_adapter`],
//! which keeps the first adapter whose device creation succeeds.

use crate::error::{Error, Result};
use crate::{ember_info, ember_warn};

/// Physical adapter category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

/// Adapter ordering preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AdapterPreference {
    #[default]
    HighPerformance,
    MinimumPower,
}

/// What a backend knows about an adapter before opening it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_id: u32,
    pub device_id: u32,
    pub kind: AdapterKind,
    /// Device-local memory in bytes
    pub dedicated_memory: u64,
}

fn kind_rank(kind: AdapterKind, preference: AdapterPreference) -> u32 {
    match (preference, kind) {
        (AdapterPreference::HighPerformance, AdapterKind::Discrete) => 0,
        (AdapterPreference::HighPerformance, AdapterKind::Integrated) => 1,
        (AdapterPreference::MinimumPower, AdapterKind::Integrated) => 0,
        (AdapterPreference::MinimumPower, AdapterKind::Discrete) => 1,
        (_, AdapterKind::Virtual) => 2,
        (_, AdapterKind::Other) => 3,
        (_, AdapterKind::Cpu) => 4,
    }
}

/// Indices of `adapters` in preference order.
///
/// Within one kind, HighPerformance prefers more dedicated memory. The sort
/// is stable so enumeration order breaks the remaining ties.
pub fn order_adapters(adapters: &[AdapterInfo], preference: AdapterPreference) -> Vec<usize> {
    let mut order: Vec<usize> = (0..adapters.len()).collect();
    order.sort_by_key(|&i| {
        let adapter = &adapters[i];
        let memory_key = match preference {
            AdapterPreference::HighPerformance => u64::MAX - adapter.dedicated_memory,
            AdapterPreference::MinimumPower => 0,
        };
        (kind_rank(adapter.kind, preference), memory_key)
    });
    order
}

/// Try `open` on each adapter in preference order and keep the first success.
///
/// # Returns
///
/// The index of the chosen adapter and whatever `open` produced, or
/// `InitializationFailed` when no adapter could be opened.
pub fn select_adapter<T, F>(
    adapters: &[AdapterInfo],
    preference: AdapterPreference,
    mut open: F,
) -> Result<(usize, T)>
where
    F: FnMut(usize, &AdapterInfo) -> Result<T>,
{
    if adapters.is_empty() {
        return Err(Error::InitializationFailed("No GPU adapter available".to_string()));
    }

    for index in order_adapters(adapters, preference) {
        let adapter = &adapters[index];
        match open(index, adapter) {
            Ok(device) => {
                ember_info!("ember::Adapter", "Selected adapter '{}' ({:?})", adapter.name, adapter.kind);
                return Ok((index, device));
            }
            Err(e) => {
                ember_warn!("ember::Adapter", "Adapter '{}' rejected: {}", adapter.name, e);
            }
        }
    }

    Err(Error::InitializationFailed(
        "No adapter supports the required feature level".to_string(),
    ))
}

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;
