use super::*;
use crate::rhi::device::{Device, QueueSubmitInfo};
use crate::rhi::mock_backend::{buffer_id, mock_device, mock_texture_id, recorded, MockCommand, MockTarget};
use crate::rhi::pipeline::{ComputePipelineDesc, GraphicsPipelineDesc};
use crate::rhi::texture::RenderTargetCreateInfo;
use crate::rhi::types::{DescriptorTypes, MemoryFlag, ShaderType, TextureFormat};
use crate::rhi::{BufferCreateInfo, TextureCreateInfo};
use std::sync::Mutex;

fn open_list(device: &Device, queue_type: QueueType) -> Arc<Mutex<CommandList>> {
    let list = device.get_command_list(queue_type).unwrap();
    list.lock().unwrap().begin_recording().unwrap();
    list
}

fn buffer(device: &Device, label: &str, size: u64, memory: MemoryFlag) -> Arc<Buffer> {
    device
        .create_buffer(
            &BufferCreateInfo {
                label: label.to_string(),
                size,
                ..Default::default()
            },
            memory,
        )
        .unwrap()
}

fn compute(device: &Device, layout: BindingLayout) -> Pipeline {
    let mut pipeline = device.create_compute_pipeline(&ComputePipelineDesc {
        label: "cs".to_string(),
        binding_layout: layout,
    });
    let shader = device
        .create_shader_from_bytes(ShaderType::Compute, "cs", b"uav 0 0 Output\npush 16\n")
        .unwrap();
    pipeline.set_compute_shader(shader).unwrap();
    pipeline
}

fn graphics(device: &Device) -> Pipeline {
    let mut pipeline = device.create_graphics_pipeline(&GraphicsPipelineDesc::default()).unwrap();
    let vs = device
        .create_shader_from_bytes(ShaderType::Vertex, "vs", b"cbv 0 0 Camera\n")
        .unwrap();
    pipeline.set_graphics_shader(vs, None).unwrap();
    pipeline
}

fn color_target(device: &Device) -> Arc<RenderTarget> {
    device
        .create_render_target(&RenderTargetCreateInfo {
            label: "color".to_string(),
            width: 64,
            height: 32,
            ..Default::default()
        })
        .unwrap()
}

fn submit(device: &Device, queue_type: QueueType, list: &Arc<Mutex<CommandList>>) {
    device
        .submit_command_lists(&QueueSubmitInfo {
            queue_type,
            command_lists: std::slice::from_ref(list),
        })
        .unwrap();
}

// ============================================================================
// RECORDING STATE
// ============================================================================

#[test]
fn test_commands_require_recording() {
    let (_backend, device) = mock_device();
    let list = device.get_command_list(QueueType::Graphics).unwrap();
    let mut list = list.lock().unwrap();

    assert!(!list.is_recording());
    assert!(matches!(list.end_recording(), Err(Error::InvalidState(_))));
    assert!(matches!(list.set_scissor(&Rect::default()), Err(Error::InvalidState(_))));
    assert!(matches!(list.insert_barrier(&BarrierDesc::new()), Err(Error::InvalidState(_))));
}

#[test]
fn test_begin_twice_fails() {
    let (_backend, device) = mock_device();
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();
    assert!(list.is_recording());
    assert!(matches!(list.begin_recording(), Err(Error::InvalidState(_))));
}

#[test]
fn test_begin_recording_clears_previous_commands() {
    let (_backend, device) = mock_device();
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();
    list.set_scissor(&Rect::default()).unwrap();
    list.end_recording().unwrap();
    assert_eq!(recorded(&list).len(), 1);

    list.begin_recording().unwrap();
    assert!(recorded(&list).is_empty());
}

// ============================================================================
// PIPELINE BINDING
// ============================================================================

#[test]
fn test_bind_global_table_pipeline_sets_heaps_and_tables() {
    let (_backend, device) = mock_device();
    let pipeline = compute(&device, BindingLayout::GlobalTable);
    let list = open_list(&device, QueueType::Compute);
    let mut list = list.lock().unwrap();
    list.bind_pipeline(&pipeline).unwrap();

    let commands = recorded(&list);
    assert_eq!(commands.len(), 4);
    assert!(matches!(commands[0], MockCommand::SetPipeline(_)));
    assert_eq!(
        commands[1],
        MockCommand::SetHeaps(vec![DescriptorHeapKind::CbvSrvUav, DescriptorHeapKind::Sampler])
    );
    assert_eq!(
        commands[2],
        MockCommand::SetRootTable {
            pipeline_type: PipelineType::Compute,
            root_index: 0,
            heap: DescriptorHeapKind::CbvSrvUav,
            base: 0,
        }
    );
    assert_eq!(
        commands[3],
        MockCommand::SetRootTable {
            pipeline_type: PipelineType::Compute,
            root_index: 1,
            heap: DescriptorHeapKind::Sampler,
            base: 0,
        }
    );
}

#[test]
fn test_bind_pipeline_on_transfer_queue_only_sets_state() {
    let (_backend, device) = mock_device();
    let pipeline = compute(&device, BindingLayout::GlobalTable);
    let list = open_list(&device, QueueType::Transfer);
    let mut list = list.lock().unwrap();
    list.bind_pipeline(&pipeline).unwrap();

    let commands = recorded(&list);
    assert_eq!(commands.len(), 1);
    assert!(matches!(commands[0], MockCommand::SetPipeline(_)));
}

#[test]
fn test_graphics_pipeline_needs_graphics_queue() {
    let (_backend, device) = mock_device();
    let pipeline = graphics(&device);
    let list = open_list(&device, QueueType::Compute);
    let mut list = list.lock().unwrap();
    assert!(matches!(list.bind_pipeline(&pipeline), Err(Error::InvalidState(_))));
    assert!(recorded(&list).is_empty());
}

#[test]
fn test_bind_unfinalized_pipeline_fails() {
    let (_backend, device) = mock_device();
    let pipeline = device.create_compute_pipeline(&ComputePipelineDesc::default());
    let list = open_list(&device, QueueType::Compute);
    let mut list = list.lock().unwrap();
    assert!(matches!(list.bind_pipeline(&pipeline), Err(Error::InvalidState(_))));
}

#[test]
fn test_reflected_pipeline_binds_descriptor_sets() {
    let (_backend, device) = mock_device();
    let pipeline = compute(&device, BindingLayout::Reflected);
    let output = device
        .create_buffer(
            &BufferCreateInfo {
                label: "output".to_string(),
                size: 64,
                descriptor_types: DescriptorTypes::RW_BUFFER,
                ..Default::default()
            },
            MemoryFlag::Dedicated,
        )
        .unwrap();
    let mut set = pipeline.create_descriptor_set(0).unwrap();
    set.set_buffer("Output", &output).unwrap();

    let list = open_list(&device, QueueType::Compute);
    let mut list = list.lock().unwrap();
    list.bind_pipeline(&pipeline).unwrap();
    assert_eq!(recorded(&list).len(), 2);

    assert!(matches!(list.bind_descriptor_set(&pipeline, &set), Err(Error::InvalidState(_))));
    set.update().unwrap();
    list.bind_descriptor_set(&pipeline, &set).unwrap();
    assert_eq!(recorded(&list).last(), Some(&MockCommand::BindSet(0)));
}

#[test]
fn test_push_constants_bounds() {
    let (_backend, device) = mock_device();
    let pipeline = compute(&device, BindingLayout::GlobalTable);
    let list = open_list(&device, QueueType::Compute);
    let mut list = list.lock().unwrap();

    list.push_constants(&pipeline, 4, &[0u8; 12]).unwrap();
    assert_eq!(recorded(&list).last(), Some(&MockCommand::RootConstants { offset: 4, len: 12 }));

    assert!(list.push_constants(&pipeline, 2, &[0u8; 4]).is_err());
    assert!(list.push_constants(&pipeline, 0, &[0u8; 6]).is_err());
    assert!(list.push_constants(&pipeline, 8, &[0u8; 12]).is_err());
}

// ============================================================================
// BARRIERS
// ============================================================================

#[test]
fn test_insert_barrier_issues_one_batch() {
    let (_backend, device) = mock_device();
    let a = buffer(&device, "a", 16, MemoryFlag::Dedicated);
    let b = buffer(&device, "b", 16, MemoryFlag::Dedicated);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    list.insert_barrier(
        &BarrierDesc::new()
            .buffer(&a, ResourceState::COPY_DEST, ResourceState::SHADER_RESOURCE)
            .buffer(&b, ResourceState::COPY_DEST, ResourceState::UNORDERED_ACCESS),
    )
    .unwrap();

    let commands = recorded(&list);
    assert_eq!(commands.len(), 1);
    match &commands[0] {
        MockCommand::Barriers(barriers) => {
            assert_eq!(barriers.len(), 2);
            assert_eq!(barriers[0].target, MockTarget::Buffer(buffer_id(a.native())));
        }
        other => panic!("expected barriers, got {:?}", other),
    }
    assert_eq!(a.state(), ResourceState::SHADER_RESOURCE);
    assert_eq!(b.state(), ResourceState::UNORDERED_ACCESS);
}

#[test]
fn test_redundant_barrier_records_nothing() {
    let (_backend, device) = mock_device();
    let a = buffer(&device, "a", 16, MemoryFlag::Dedicated);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    list.insert_barrier(&BarrierDesc::new()).unwrap();
    list.insert_barrier(&BarrierDesc::new().buffer(&a, ResourceState::COPY_DEST, ResourceState::COPY_DEST))
        .unwrap();
    assert!(recorded(&list).is_empty());
}

// ============================================================================
// TRANSFERS
// ============================================================================

#[test]
fn test_update_host_visible_buffer_writes_directly() {
    let (_backend, device) = mock_device();
    let upload = buffer(&device, "upload", 16, MemoryFlag::CpuVisible);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    list.update_buffer(&upload, 4, &[1, 2, 3, 4]).unwrap();
    assert!(recorded(&list).is_empty());
    assert_eq!(upload.staging_buffer_count(), 0);

    let mut out = [0u8; 4];
    upload.read(4, &mut out).unwrap();
    assert_eq!(out, [1, 2, 3, 4]);
}

#[test]
fn test_update_dedicated_buffer_records_staged_copy() {
    let (_backend, device) = mock_device();
    let target = buffer(&device, "target", 64, MemoryFlag::Dedicated);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    list.update_buffer(&target, 16, &[7u8; 32]).unwrap();

    assert_eq!(target.staging_buffer_count(), 1);
    match recorded(&list).as_slice() {
        [MockCommand::CopyBuffer {
            dst,
            dst_offset,
            src_offset,
            size,
            ..
        }] => {
            assert_eq!(*dst, buffer_id(target.native()));
            assert_eq!((*dst_offset, *src_offset, *size), (16, 0, 32));
        }
        other => panic!("expected one copy, got {:?}", other),
    }
}

#[test]
fn test_update_buffer_out_of_range() {
    let (_backend, device) = mock_device();
    let target = buffer(&device, "target", 16, MemoryFlag::Dedicated);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    assert!(matches!(
        list.update_buffer(&target, 8, &[0u8; 16]),
        Err(Error::InvalidResource(_))
    ));
    assert!(matches!(
        list.update_buffer(&target, u64::MAX, &[0u8; 1]),
        Err(Error::InvalidResource(_))
    ));
    assert!(recorded(&list).is_empty());
}

#[test]
fn test_staging_buffers_are_reused_in_later_frames() {
    let (_backend, device) = mock_device();
    let target = buffer(&device, "target", 64, MemoryFlag::Dedicated);

    let list = open_list(&device, QueueType::Graphics);
    {
        let mut list = list.lock().unwrap();
        list.update_buffer(&target, 0, &[1u8; 32]).unwrap();
        list.update_buffer(&target, 32, &[2u8; 32]).unwrap();
        list.end_recording().unwrap();
    }
    // both copies are in flight within the same frame
    assert_eq!(target.staging_buffer_count(), 2);
    submit(&device, QueueType::Graphics, &list);
    device.wait_gpu_execution(QueueType::Graphics).unwrap();

    device.begin_frame().unwrap();
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();
    list.update_buffer(&target, 0, &[3u8; 16]).unwrap();
    assert_eq!(target.staging_buffer_count(), 2);

    // a larger upload than any retired slot needs a new buffer
    list.update_buffer(&target, 0, &[4u8; 64]).unwrap();
    assert_eq!(target.staging_buffer_count(), 3);
}

#[test]
fn test_staging_kept_while_recording_list_spans_other_thread_frame() {
    let (_backend, device) = mock_device();
    let gpu = buffer(&device, "gpu data", 16, MemoryFlag::Dedicated);
    let readback = buffer(&device, "readback", 32, MemoryFlag::GpuToCpu);

    let list = open_list(&device, QueueType::Graphics);
    {
        let mut list = list.lock().unwrap();
        list.update_buffer(&gpu, 0, &[1u8; 16]).unwrap();
        list.copy_buffer(&readback, 0, &gpu, 0, 16).unwrap();
    }

    // another thread starting a frame must not retire this list's upload
    std::thread::scope(|scope| {
        scope.spawn(|| device.begin_frame().unwrap());
    });

    {
        let mut list = list.lock().unwrap();
        list.update_buffer(&gpu, 0, &[2u8; 16]).unwrap();
        list.copy_buffer(&readback, 16, &gpu, 0, 16).unwrap();
        list.end_recording().unwrap();
    }
    assert_eq!(gpu.staging_buffer_count(), 2);
    submit(&device, QueueType::Graphics, &list);
    device.wait_gpu_execution(QueueType::Graphics).unwrap();

    let mut out = [0u8; 32];
    readback.read(0, &mut out).unwrap();
    assert_eq!(&out[..16], &[1u8; 16]);
    assert_eq!(&out[16..], &[2u8; 16]);
}

#[test]
fn test_update_buffer_round_trip_through_readback() {
    let (_backend, device) = mock_device();
    let gpu = buffer(&device, "gpu data", 16, MemoryFlag::Dedicated);
    let readback = buffer(&device, "readback", 16, MemoryFlag::GpuToCpu);
    let values: [u32; 4] = [0xdead_beef, 1, 2, 0x1234_5678];

    let list = open_list(&device, QueueType::Graphics);
    {
        let mut list = list.lock().unwrap();
        list.update_buffer(&gpu, 0, bytemuck::cast_slice(&values)).unwrap();
        list.insert_barrier(&BarrierDesc::new().buffer(&gpu, ResourceState::COPY_DEST, ResourceState::COPY_SOURCE))
            .unwrap();
        list.copy_buffer(&readback, 0, &gpu, 0, 16).unwrap();
        list.end_recording().unwrap();
    }
    submit(&device, QueueType::Graphics, &list);
    device.wait_gpu_execution(QueueType::Graphics).unwrap();

    assert_eq!(readback.read_pod::<u32>(0, 4).unwrap(), values.to_vec());
}

#[test]
fn test_update_texture_checks_size() {
    let (_backend, device) = mock_device();
    let texture = device
        .create_texture(&TextureCreateInfo {
            width: 4,
            height: 4,
            enable_mipmap: true,
            initial_state: ResourceState::COPY_DEST,
            ..Default::default()
        })
        .unwrap();
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    assert!(list.update_texture(&texture, 0, 0, &[0u8; 63]).is_err());
    assert!(list.update_texture(&texture, 3, 0, &[0u8; 4]).is_err());
    assert!(list.update_texture(&texture, 0, 1, &[0u8; 64]).is_err());

    list.update_texture(&texture, 1, 0, &[0u8; 16]).unwrap();
    match recorded(&list).as_slice() {
        [MockCommand::CopyBufferToTexture { dst, region, .. }] => {
            assert_eq!(*dst, mock_texture_id(texture.native()));
            assert_eq!((region.mip_level, region.width, region.height, region.depth), (1, 2, 2, 1));
        }
        other => panic!("expected one texture copy, got {:?}", other),
    }
    assert_eq!(texture.staging_buffer_count(), 1);
}

#[test]
fn test_copy_texture_requires_matching_shapes() {
    let (_backend, device) = mock_device();
    let small = device.create_texture(&TextureCreateInfo::default()).unwrap();
    let large = device
        .create_texture(&TextureCreateInfo {
            width: 8,
            height: 8,
            ..Default::default()
        })
        .unwrap();
    let other_small = device.create_texture(&TextureCreateInfo::default()).unwrap();
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    assert!(list.copy_texture(&large, &small).is_err());
    list.copy_texture(&other_small, &small).unwrap();
    assert_eq!(
        recorded(&list),
        vec![MockCommand::CopyTexture {
            dst: mock_texture_id(other_small.native()),
            src: mock_texture_id(small.native()),
        }]
    );
}

#[test]
fn test_clear_buffer_fills_float_bits() {
    let (_backend, device) = mock_device();
    let data = buffer(&device, "data", 16, MemoryFlag::GpuToCpu);
    let list = open_list(&device, QueueType::Graphics);
    {
        let mut list = list.lock().unwrap();
        list.clear_buffer(&data, 1.5).unwrap();
        list.end_recording().unwrap();
    }
    submit(&device, QueueType::Graphics, &list);
    device.wait_gpu_execution(QueueType::Graphics).unwrap();

    assert_eq!(data.read_pod::<f32>(0, 4).unwrap(), vec![1.5; 4]);
}

#[test]
fn test_clear_texture() {
    let (_backend, device) = mock_device();
    let color = device.create_texture(&TextureCreateInfo::default()).unwrap();
    let depth = device
        .create_texture(&TextureCreateInfo {
            format: TextureFormat::D32_FLOAT,
            descriptor_types: DescriptorTypes::DEPTH_STENCIL_ATTACHMENT,
            ..Default::default()
        })
        .unwrap();
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    assert!(matches!(
        list.clear_texture(&depth, Vec4::ONE),
        Err(Error::InvalidResource(_))
    ));
    list.clear_texture(&color, Vec4::new(0.25, 0.5, 0.75, 1.0)).unwrap();
    assert_eq!(
        recorded(&list),
        vec![MockCommand::ClearTexture {
            texture: mock_texture_id(color.native()),
            color: [0.25, 0.5, 0.75, 1.0],
        }]
    );
}

#[test]
fn test_generate_mip_map() {
    let (_backend, device) = mock_device();
    let texture = device
        .create_texture(&TextureCreateInfo {
            width: 16,
            height: 16,
            enable_mipmap: true,
            ..Default::default()
        })
        .unwrap();
    let flat = device.create_texture(&TextureCreateInfo::default()).unwrap();

    let compute_list = open_list(&device, QueueType::Compute);
    assert!(compute_list.lock().unwrap().generate_mip_map(&texture).is_err());

    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();
    list.generate_mip_map(&flat).unwrap();
    assert!(recorded(&list).is_empty());

    list.generate_mip_map(&texture).unwrap();
    let commands = recorded(&list);
    assert_eq!(commands.len(), 2);
    match &commands[0] {
        MockCommand::Barriers(barriers) => {
            assert_eq!(barriers[0].before, ResourceState::COMMON);
            assert_eq!(barriers[0].after, ResourceState::COPY_DEST);
        }
        other => panic!("expected barriers, got {:?}", other),
    }
    assert_eq!(commands[1], MockCommand::GenerateMips(mock_texture_id(texture.native())));
    assert_eq!(texture.state(), ResourceState::COPY_SOURCE);
}

// ============================================================================
// RENDER PASSES AND DRAWS
// ============================================================================

#[test]
fn test_render_pass_defaults_area_to_first_target() {
    let (_backend, device) = mock_device();
    let color = color_target(&device);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    list.begin_render_pass(&RenderPassDesc {
        color_targets: vec![RenderPassTarget::clear(&color)],
        ..Default::default()
    })
    .unwrap();
    assert!(list.in_render_pass());
    assert!(matches!(list.end_recording(), Err(Error::InvalidState(_))));
    list.end_render_pass().unwrap();
    assert!(list.end_render_pass().is_err());

    assert_eq!(
        recorded(&list)[0],
        MockCommand::BeginRenderPass {
            colors: 1,
            depth: false,
            clears: 1,
            area: Rect {
                x: 0,
                y: 0,
                width: 64,
                height: 32,
            },
        }
    );
}

#[test]
fn test_render_pass_validation() {
    let (_backend, device) = mock_device();
    let color = color_target(&device);
    let depth = device
        .create_render_target(&RenderTargetCreateInfo {
            label: "depth".to_string(),
            format: TextureFormat::D32_FLOAT,
            width: 64,
            height: 32,
            ..Default::default()
        })
        .unwrap();

    let compute_list = open_list(&device, QueueType::Compute);
    assert!(compute_list
        .lock()
        .unwrap()
        .begin_render_pass(&RenderPassDesc {
            color_targets: vec![RenderPassTarget::load(&color)],
            ..Default::default()
        })
        .is_err());

    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();
    assert!(list.begin_render_pass(&RenderPassDesc::default()).is_err());
    assert!(list
        .begin_render_pass(&RenderPassDesc {
            color_targets: vec![RenderPassTarget::load(&depth)],
            ..Default::default()
        })
        .is_err());
    assert!(list
        .begin_render_pass(&RenderPassDesc {
            color_targets: vec![RenderPassTarget::load(&color)],
            depth_target: Some(RenderPassTarget::load(&color)),
            ..Default::default()
        })
        .is_err());
    assert!(!list.in_render_pass());

    list.begin_render_pass(&RenderPassDesc {
        color_targets: vec![RenderPassTarget::load(&color)],
        depth_target: Some(RenderPassTarget::clear(&depth)),
        render_area: None,
    })
    .unwrap();
    assert!(matches!(
        list.begin_render_pass(&RenderPassDesc::default()),
        Err(Error::InvalidState(_))
    ));
}

#[test]
fn test_draw_requires_pass_and_graphics_pipeline() {
    let (_backend, device) = mock_device();
    let color = color_target(&device);
    let pipeline = graphics(&device);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    assert!(list.draw_instanced(3, 1, 0, 0).is_err());
    list.begin_render_pass(&RenderPassDesc {
        color_targets: vec![RenderPassTarget::clear(&color)],
        ..Default::default()
    })
    .unwrap();
    assert!(list.draw_instanced(3, 1, 0, 0).is_err());

    list.bind_pipeline(&pipeline).unwrap();
    list.draw_instanced(3, 2, 0, 0).unwrap();
    list.end_render_pass().unwrap();

    assert!(recorded(&list).contains(&MockCommand::Draw {
        vertex_count: 3,
        instance_count: 2,
    }));
}

#[test]
fn test_indexed_and_indirect_draws() {
    let (_backend, device) = mock_device();
    let color = color_target(&device);
    let pipeline = graphics(&device);
    let vertices = buffer(&device, "vertices", 96, MemoryFlag::Dedicated);
    let indices = buffer(&device, "indices", 12, MemoryFlag::Dedicated);
    let args = buffer(&device, "args", 40, MemoryFlag::Dedicated);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    list.begin_render_pass(&RenderPassDesc {
        color_targets: vec![RenderPassTarget::load(&color)],
        ..Default::default()
    })
    .unwrap();
    list.bind_pipeline(&pipeline).unwrap();
    list.bind_vertex_buffers(0, &[(&vertices, 0)]).unwrap();
    list.bind_index_buffer(&indices, 0, IndexType::U16).unwrap();
    list.draw_indexed_instanced(6, 1, 0, 0, 0).unwrap();
    list.draw_indexed_indirect(&args, 0, 2, 20).unwrap();
    assert!(list.draw_indexed_indirect(&args, 20, 2, 20).is_err());
    list.end_render_pass().unwrap();

    let commands = recorded(&list);
    assert!(commands.contains(&MockCommand::BindVertexBuffers { first_slot: 0, count: 1 }));
    assert!(commands.contains(&MockCommand::BindIndexBuffer(IndexType::U16)));
    assert!(commands.contains(&MockCommand::DrawIndexed {
        index_count: 6,
        instance_count: 1,
    }));
    assert!(commands.contains(&MockCommand::DrawIndexedIndirect { draw_count: 2 }));
}

#[test]
fn test_dispatch_rules() {
    let (_backend, device) = mock_device();
    let pipeline = compute(&device, BindingLayout::GlobalTable);
    let args = buffer(&device, "args", 12, MemoryFlag::Dedicated);

    let transfer = open_list(&device, QueueType::Transfer);
    {
        let mut transfer = transfer.lock().unwrap();
        transfer.bind_pipeline(&pipeline).unwrap();
        assert!(transfer.dispatch(1, 1, 1).is_err());
    }

    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();
    assert!(list.dispatch(1, 1, 1).is_err());

    list.bind_pipeline(&pipeline).unwrap();
    list.dispatch(8, 4, 1).unwrap();
    list.dispatch_indirect(&args, 0).unwrap();
    assert!(list.dispatch_indirect(&args, 4).is_err());

    let commands = recorded(&list);
    assert!(commands.contains(&MockCommand::Dispatch(8, 4, 1)));
    assert!(commands.contains(&MockCommand::DispatchIndirect));
}

#[test]
fn test_dispatch_inside_render_pass_fails() {
    let (_backend, device) = mock_device();
    let color = color_target(&device);
    let pipeline = compute(&device, BindingLayout::GlobalTable);
    let list = open_list(&device, QueueType::Graphics);
    let mut list = list.lock().unwrap();

    list.bind_pipeline(&pipeline).unwrap();
    list.begin_render_pass(&RenderPassDesc {
        color_targets: vec![RenderPassTarget::load(&color)],
        ..Default::default()
    })
    .unwrap();
    assert!(matches!(list.dispatch(1, 1, 1), Err(Error::InvalidState(_))));
}
