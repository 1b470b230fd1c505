use super::*;

fn adapter(name: &str, kind: AdapterKind, memory_mb: u64) -> AdapterInfo {
    AdapterInfo {
        name: name.to_string(),
        vendor_id: 0,
        device_id: 0,
        kind,
        dedicated_memory: memory_mb * 1024 * 1024,
    }
}

fn sample_adapters() -> Vec<AdapterInfo> {
    vec![
        adapter("llvmpipe", AdapterKind::Cpu, 0),
        adapter("igpu", AdapterKind::Integrated, 512),
        adapter("small dgpu", AdapterKind::Discrete, 4096),
        adapter("big dgpu", AdapterKind::Discrete, 16384),
    ]
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn test_high_performance_prefers_discrete_then_memory() {
    let order = order_adapters(&sample_adapters(), AdapterPreference::HighPerformance);
    assert_eq!(order, vec![3, 2, 1, 0]);
}

#[test]
fn test_minimum_power_prefers_integrated() {
    let order = order_adapters(&sample_adapters(), AdapterPreference::MinimumPower);
    assert_eq!(order[0], 1);
    assert_eq!(*order.last().unwrap(), 0);
}

#[test]
fn test_equal_adapters_keep_enumeration_order() {
    let adapters = vec![
        adapter("a", AdapterKind::Discrete, 1024),
        adapter("b", AdapterKind::Discrete, 1024),
    ];
    assert_eq!(order_adapters(&adapters, AdapterPreference::HighPerformance), vec![0, 1]);
}

// ============================================================================
// SELECTION
// ============================================================================

#[test]
fn test_select_first_successful_adapter() {
    let adapters = sample_adapters();
    let mut attempts = Vec::new();

    let (index, device) = select_adapter(&adapters, AdapterPreference::HighPerformance, |i, info| {
        attempts.push(i);
        if info.name == "big dgpu" {
            Err(Error::InitializationFailed("feature level".to_string()))
        } else {
            Ok(format!("device:{}", info.name))
        }
    })
    .unwrap();

    assert_eq!(attempts, vec![3, 2]);
    assert_eq!(index, 2);
    assert_eq!(device, "device:small dgpu");
}

#[test]
fn test_select_fails_when_every_adapter_fails() {
    let result: Result<(usize, ())> =
        select_adapter(&sample_adapters(), AdapterPreference::HighPerformance, |_, _| {
            Err(Error::InitializationFailed("nope".to_string()))
        });
    assert!(matches!(result, Err(Error::InitializationFailed(_))));
}

#[test]
fn test_select_fails_without_adapters() {
    let result: Result<(usize, ())> = select_adapter(&[], AdapterPreference::HighPerformance, |_, _| Ok(()));
    assert!(result.is_err());
}
