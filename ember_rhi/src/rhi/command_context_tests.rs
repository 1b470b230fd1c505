use super::*;
use crate::rhi::mock_backend::{mock_device, MockCommandAllocator};

fn context(device: &crate::rhi::Device) -> CommandContext {
    CommandContext::new(Arc::clone(device.context()))
}

// ============================================================================
// POOLS
// ============================================================================

#[test]
fn test_allocator_created_lazily_per_queue() {
    let (backend, device) = mock_device();
    let mut ctx = context(&device);
    assert!(!ctx.has_allocator(QueueType::Graphics));

    ctx.get_command_list(QueueType::Graphics).unwrap();
    ctx.get_command_list(QueueType::Graphics).unwrap();

    assert!(ctx.has_allocator(QueueType::Graphics));
    assert!(!ctx.has_allocator(QueueType::Compute));
    assert_eq!(backend.count("create_command_allocator(Graphics)"), 1);
    assert_eq!(backend.count("create_command_list(Graphics)"), 2);
}

#[test]
fn test_each_call_returns_a_distinct_list() {
    let (_backend, device) = mock_device();
    let mut ctx = context(&device);

    let a = ctx.get_command_list(QueueType::Compute).unwrap();
    let b = ctx.get_command_list(QueueType::Compute).unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(ctx.count(QueueType::Compute), 2);
    assert_eq!(ctx.pool_size(QueueType::Compute), 2);
    assert_eq!(a.lock().unwrap().queue_type(), QueueType::Compute);
}

#[test]
fn test_queues_are_independent() {
    let (_backend, device) = mock_device();
    let mut ctx = context(&device);

    ctx.get_command_list(QueueType::Graphics).unwrap();
    ctx.get_command_list(QueueType::Transfer).unwrap();
    ctx.get_command_list(QueueType::Transfer).unwrap();

    assert_eq!(ctx.count(QueueType::Graphics), 1);
    assert_eq!(ctx.count(QueueType::Compute), 0);
    assert_eq!(ctx.count(QueueType::Transfer), 2);
}

// ============================================================================
// RESET
// ============================================================================

#[test]
fn test_reset_reuses_pool_in_order() {
    let (backend, device) = mock_device();
    let mut ctx = context(&device);
    let first = ctx.get_command_list(QueueType::Graphics).unwrap();
    let second = ctx.get_command_list(QueueType::Graphics).unwrap();

    ctx.reset().unwrap();
    assert_eq!(ctx.count(QueueType::Graphics), 0);
    assert_eq!(ctx.pool_size(QueueType::Graphics), 2);

    assert!(Arc::ptr_eq(&first, &ctx.get_command_list(QueueType::Graphics).unwrap()));
    assert!(Arc::ptr_eq(&second, &ctx.get_command_list(QueueType::Graphics).unwrap()));
    ctx.get_command_list(QueueType::Graphics).unwrap();

    assert_eq!(ctx.pool_size(QueueType::Graphics), 3);
    assert_eq!(backend.count("create_command_list"), 3);
}

#[test]
fn test_reset_resets_created_allocators_only() {
    let (_backend, device) = mock_device();
    let mut ctx = context(&device);
    ctx.get_command_list(QueueType::Compute).unwrap();

    ctx.reset().unwrap();
    ctx.reset().unwrap();

    let allocator = ctx.allocators[QueueType::Compute.index()].as_ref().unwrap();
    let mock = allocator.as_any().downcast_ref::<MockCommandAllocator>().unwrap();
    assert_eq!(mock.resets.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert!(ctx.allocators[QueueType::Graphics.index()].is_none());
}

#[test]
fn test_reset_of_empty_context() {
    let (backend, device) = mock_device();
    let mut ctx = context(&device);
    ctx.reset().unwrap();
    assert_eq!(backend.count("create_command_allocator"), 0);
}

#[test]
fn test_reset_counts_and_stales_open_lists() {
    let (_backend, device) = mock_device();
    let mut ctx = context(&device);
    let list = ctx.get_command_list(QueueType::Compute).unwrap();
    list.lock().unwrap().begin_recording().unwrap();
    assert_eq!(ctx.reset_count(), 0);

    ctx.reset().unwrap();
    assert_eq!(ctx.reset_count(), 1);

    let mut list = list.lock().unwrap();
    assert!(list.is_recording());
    assert!(list.end_recording().is_err());
    list.begin_recording().unwrap();
    list.end_recording().unwrap();
}
