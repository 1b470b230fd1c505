/// Mock backend for unit tests (no GPU required)
///
/// Every factory call is logged, command lists record a [`MockCommand`]
/// stream, and buffers own real host memory so copies recorded into a list
/// become visible when the list is executed.

use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::rhi::adapter::{AdapterInfo, AdapterKind};
use crate::rhi::backend::*;
use crate::rhi::command_list::CommandList;
use crate::rhi::config::DeviceConfig;
use crate::rhi::device::Device;
use crate::rhi::pipeline::{GraphicsPipelineDesc, RootSignatureDesc};
use crate::rhi::shader::{BindingKind, ReflectedBinding, ShaderReflection};
use crate::rhi::texture::SamplerDesc;
use crate::rhi::types::{
    DescriptorHeapKind, HeapType, IndexType, PipelineType, QueueType, Rect, ResourceState, TextureFormat, Viewport,
};

// ============================================================================
// Recorded commands
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum MockTarget {
    Buffer(u64),
    Texture(u64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MockBarrier {
    pub target: MockTarget,
    pub before: ResourceState,
    pub after: ResourceState,
    pub ownership: Option<QueueOwnership>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum MockCommand {
    Barriers(Vec<MockBarrier>),
    SetPipeline(u64),
    SetHeaps(Vec<DescriptorHeapKind>),
    SetRootTable {
        pipeline_type: PipelineType,
        root_index: u32,
        heap: DescriptorHeapKind,
        base: u32,
    },
    RootConstants {
        offset: u32,
        len: usize,
    },
    BindSet(u32),
    CopyBuffer {
        dst: u64,
        dst_offset: u64,
        src: u64,
        src_offset: u64,
        size: u64,
    },
    CopyBufferToTexture {
        dst: u64,
        src: u64,
        region: TextureCopyRegion,
    },
    CopyTexture {
        dst: u64,
        src: u64,
    },
    FillBuffer {
        dst: u64,
        value: u32,
    },
    ClearTexture {
        texture: u64,
        color: [f32; 4],
    },
    GenerateMips(u64),
    BeginRenderPass {
        colors: usize,
        depth: bool,
        clears: usize,
        area: Rect,
    },
    EndRenderPass,
    SetViewport(Viewport),
    SetScissor(Rect),
    BindVertexBuffers {
        first_slot: u32,
        count: usize,
    },
    BindIndexBuffer(IndexType),
    Draw {
        vertex_count: u32,
        instance_count: u32,
    },
    DrawIndexed {
        index_count: u32,
        instance_count: u32,
    },
    DrawIndexedIndirect {
        draw_count: u32,
    },
    Dispatch(u32, u32, u32),
    DispatchIndirect,
}

type Memory = Arc<Mutex<Vec<u8>>>;

enum MemoryEffect {
    Copy {
        dst: Memory,
        dst_offset: usize,
        src: Memory,
        src_offset: usize,
        size: usize,
    },
    Fill {
        dst: Memory,
        value: u32,
    },
}

impl MemoryEffect {
    fn apply(&self) {
        match self {
            MemoryEffect::Copy {
                dst,
                dst_offset,
                src,
                src_offset,
                size,
            } => {
                if Arc::ptr_eq(dst, src) {
                    let mut data = dst.lock().unwrap();
                    data.copy_within(*src_offset..*src_offset + *size, *dst_offset);
                } else {
                    let src = src.lock().unwrap();
                    let mut dst = dst.lock().unwrap();
                    dst[*dst_offset..*dst_offset + *size].copy_from_slice(&src[*src_offset..*src_offset + *size]);
                }
            }
            MemoryEffect::Fill { dst, value } => {
                let mut data = dst.lock().unwrap();
                for chunk in data.chunks_mut(4) {
                    let bytes = value.to_le_bytes();
                    chunk.copy_from_slice(&bytes[..chunk.len()]);
                }
            }
        }
    }
}

// ============================================================================
// Mock native objects
// ============================================================================

pub(crate) struct MockCommandAllocator {
    pub queue: QueueType,
    pub resets: AtomicU32,
}

impl NativeCommandAllocator for MockCommandAllocator {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reset(&self) -> Result<()> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub(crate) struct MockCommandList {
    pub queue: QueueType,
    pub open: bool,
    pub begins: u32,
    pub commands: Vec<MockCommand>,
    effects: Vec<MemoryEffect>,
}

fn buffer(native: &dyn NativeBuffer) -> &MockBuffer {
    native.as_any().downcast_ref::<MockBuffer>().unwrap()
}

fn texture_id(native: &dyn NativeTexture) -> u64 {
    native.as_any().downcast_ref::<MockTexture>().unwrap().id
}

fn heap_kind(native: &dyn NativeDescriptorHeap) -> DescriptorHeapKind {
    native.as_any().downcast_ref::<MockDescriptorHeap>().unwrap().kind
}

impl NativeCommandList for MockCommandList {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn begin(&mut self, allocator: &dyn NativeCommandAllocator) -> Result<()> {
        let allocator = allocator.as_any().downcast_ref::<MockCommandAllocator>().unwrap();
        assert_eq!(allocator.queue, self.queue);
        self.open = true;
        self.begins += 1;
        self.commands.clear();
        self.effects.clear();
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }

    fn resource_barrier(&mut self, barriers: &[ResourceBarrier<'_>]) {
        let barriers = barriers
            .iter()
            .map(|b| match *b {
                ResourceBarrier::Buffer {
                    buffer: native,
                    before,
                    after,
                    ownership,
                } => MockBarrier {
                    target: MockTarget::Buffer(buffer(native).id),
                    before,
                    after,
                    ownership,
                },
                ResourceBarrier::Texture {
                    texture,
                    before,
                    after,
                    ownership,
                    ..
                } => MockBarrier {
                    target: MockTarget::Texture(texture_id(texture)),
                    before,
                    after,
                    ownership,
                },
            })
            .collect();
        self.commands.push(MockCommand::Barriers(barriers));
    }

    fn set_pipeline_state(&mut self, pipeline: &dyn NativePipeline) {
        let id = pipeline.as_any().downcast_ref::<MockPipeline>().unwrap().id;
        self.commands.push(MockCommand::SetPipeline(id));
    }

    fn set_descriptor_heaps(&mut self, heaps: &[&dyn NativeDescriptorHeap]) {
        self.commands
            .push(MockCommand::SetHeaps(heaps.iter().map(|h| heap_kind(*h)).collect()));
    }

    fn set_root_descriptor_table(
        &mut self,
        pipeline_type: PipelineType,
        _root: &dyn NativeRootSignature,
        root_index: u32,
        heap: &dyn NativeDescriptorHeap,
        base: DescriptorHandle,
    ) {
        self.commands.push(MockCommand::SetRootTable {
            pipeline_type,
            root_index,
            heap: heap_kind(heap),
            base: base.index,
        });
    }

    fn set_root_constants(
        &mut self,
        _pipeline_type: PipelineType,
        _root: &dyn NativeRootSignature,
        offset: u32,
        data: &[u8],
    ) {
        self.commands.push(MockCommand::RootConstants { offset, len: data.len() });
    }

    fn bind_descriptor_set(
        &mut self,
        _pipeline_type: PipelineType,
        _root: &dyn NativeRootSignature,
        set_index: u32,
        _set: &dyn NativeDescriptorSet,
    ) {
        self.commands.push(MockCommand::BindSet(set_index));
    }

    fn copy_buffer_region(
        &mut self,
        dst: &dyn NativeBuffer,
        dst_offset: u64,
        src: &dyn NativeBuffer,
        src_offset: u64,
        size: u64,
    ) {
        let (dst, src) = (buffer(dst), buffer(src));
        self.commands.push(MockCommand::CopyBuffer {
            dst: dst.id,
            dst_offset,
            src: src.id,
            src_offset,
            size,
        });
        self.effects.push(MemoryEffect::Copy {
            dst: Arc::clone(&dst.memory),
            dst_offset: dst_offset as usize,
            src: Arc::clone(&src.memory),
            src_offset: src_offset as usize,
            size: size as usize,
        });
    }

    fn copy_buffer_to_texture(&mut self, dst: &dyn NativeTexture, src: &dyn NativeBuffer, region: &TextureCopyRegion) {
        self.commands.push(MockCommand::CopyBufferToTexture {
            dst: texture_id(dst),
            src: buffer(src).id,
            region: *region,
        });
    }

    fn copy_texture(
        &mut self,
        dst: &dyn NativeTexture,
        _dst_state: ResourceState,
        src: &dyn NativeTexture,
        _src_state: ResourceState,
    ) {
        self.commands.push(MockCommand::CopyTexture {
            dst: texture_id(dst),
            src: texture_id(src),
        });
    }

    fn fill_buffer(&mut self, dst: &dyn NativeBuffer, value: u32) {
        let dst = buffer(dst);
        self.commands.push(MockCommand::FillBuffer { dst: dst.id, value });
        self.effects.push(MemoryEffect::Fill {
            dst: Arc::clone(&dst.memory),
            value,
        });
    }

    fn clear_texture(&mut self, texture: &dyn NativeTexture, _state: ResourceState, color: [f32; 4]) {
        self.commands.push(MockCommand::ClearTexture {
            texture: texture_id(texture),
            color,
        });
    }

    fn generate_mips(&mut self, texture: &dyn NativeTexture) {
        self.commands.push(MockCommand::GenerateMips(texture_id(texture)));
    }

    fn begin_render_pass(&mut self, pass: &NativeRenderPass<'_>) {
        let clears = pass.color_targets.iter().filter(|c| c.clear.is_some()).count()
            + pass.depth_target.iter().filter(|d| d.clear.is_some()).count();
        self.commands.push(MockCommand::BeginRenderPass {
            colors: pass.color_targets.len(),
            depth: pass.depth_target.is_some(),
            clears,
            area: pass.render_area,
        });
    }

    fn end_render_pass(&mut self) {
        self.commands.push(MockCommand::EndRenderPass);
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.commands.push(MockCommand::SetViewport(*viewport));
    }

    fn set_scissor(&mut self, rect: &Rect) {
        self.commands.push(MockCommand::SetScissor(*rect));
    }

    fn bind_vertex_buffers(&mut self, first_slot: u32, buffers: &[(&dyn NativeBuffer, u64)]) {
        self.commands.push(MockCommand::BindVertexBuffers {
            first_slot,
            count: buffers.len(),
        });
    }

    fn bind_index_buffer(&mut self, _buffer: &dyn NativeBuffer, _offset: u64, index_type: IndexType) {
        self.commands.push(MockCommand::BindIndexBuffer(index_type));
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.commands.push(MockCommand::Draw {
            vertex_count,
            instance_count,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        _first_index: u32,
        _vertex_offset: i32,
        _first_instance: u32,
    ) {
        self.commands.push(MockCommand::DrawIndexed {
            index_count,
            instance_count,
        });
    }

    fn draw_indexed_indirect(&mut self, _buffer: &dyn NativeBuffer, _offset: u64, draw_count: u32, _stride: u32) {
        self.commands.push(MockCommand::DrawIndexedIndirect { draw_count });
    }

    fn dispatch(&mut self, x: u32, y: u32, z: u32) {
        self.commands.push(MockCommand::Dispatch(x, y, z));
    }

    fn dispatch_indirect(&mut self, _buffer: &dyn NativeBuffer, _offset: u64) {
        self.commands.push(MockCommand::DispatchIndirect);
    }
}

pub(crate) struct MockFence {
    pub value: AtomicU64,
    pub waits: AtomicU32,
}

impl NativeFence for MockFence {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn completed_value(&self) -> Result<u64> {
        Ok(self.value.load(Ordering::SeqCst))
    }

    fn wait(&self, value: u64) -> Result<()> {
        self.waits.fetch_add(1, Ordering::SeqCst);
        if self.value.load(Ordering::SeqCst) < value {
            return Err(Error::BackendError(format!("mock fence never reaches {}", value)));
        }
        Ok(())
    }
}

pub(crate) struct MockBuffer {
    pub id: u64,
    pub label: String,
    pub heap: HeapType,
    pub memory: Memory,
}

impl MockBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.memory.lock().unwrap().clone()
    }
}

impl NativeBuffer for MockBuffer {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn size(&self) -> u64 {
        self.memory.lock().unwrap().len() as u64
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let mut memory = self.memory.lock().unwrap();
        memory[offset as usize..offset as usize + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn read(&self, offset: u64, out: &mut [u8]) -> Result<()> {
        let memory = self.memory.lock().unwrap();
        out.copy_from_slice(&memory[offset as usize..offset as usize + out.len()]);
        Ok(())
    }
}

pub(crate) struct MockTexture {
    pub id: u64,
    pub label: String,
    pub mip_levels: u32,
}

impl NativeTexture for MockTexture {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct MockSampler {
    pub desc: SamplerDesc,
}

impl NativeSampler for MockSampler {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) const MOCK_DESCRIPTOR_STRIDE: u32 = 32;

pub(crate) struct MockDescriptorHeap {
    pub kind: DescriptorHeapKind,
    pub capacity: u32,
    pub written: Mutex<Vec<u32>>,
}

impl NativeDescriptorHeap for MockDescriptorHeap {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn descriptor_stride(&self) -> u32 {
        MOCK_DESCRIPTOR_STRIDE
    }

    fn cpu_start(&self) -> u64 {
        0x1000 * (self.kind.index() as u64 + 1)
    }

    fn gpu_start(&self) -> Option<u64> {
        Some(0x10_0000 * (self.kind.index() as u64 + 1))
    }
}

pub(crate) struct MockShader {
    pub reflection: ShaderReflection,
}

impl NativeShader for MockShader {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn reflection(&self) -> &ShaderReflection {
        &self.reflection
    }
}

pub(crate) struct MockRootSignature {
    pub desc: RootSignatureDesc,
}

impl NativeRootSignature for MockRootSignature {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct MockPipeline {
    pub id: u64,
}

impl NativePipeline for MockPipeline {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct MockDescriptorSet {
    pub set_index: u32,
    pub writes: Mutex<Vec<u32>>,
}

impl NativeDescriptorSet for MockDescriptorSet {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub(crate) struct MockSwapChain {
    pub image_count: u32,
    pub next: u32,
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub presents: Arc<AtomicU32>,
    pub last_sync_interval: Arc<AtomicU32>,
    first_image_id: u64,
}

impl MockSwapChain {
    pub fn new(image_count: u32, width: u32, height: u32) -> Self {
        Self {
            image_count,
            next: 0,
            width,
            height,
            format: TextureFormat::B8G8R8A8_UNORM,
            presents: Arc::new(AtomicU32::new(0)),
            last_sync_interval: Arc::new(AtomicU32::new(u32::MAX)),
            first_image_id: 9000,
        }
    }
}

impl NativeSwapChain for MockSwapChain {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn acquire_next_image(&mut self) -> Result<u32> {
        let index = self.next;
        self.next = (self.next + 1) % self.image_count;
        Ok(index)
    }

    fn present(&mut self, sync_interval: u32) -> Result<()> {
        self.presents.fetch_add(1, Ordering::SeqCst);
        self.last_sync_interval.store(sync_interval, Ordering::SeqCst);
        Ok(())
    }

    fn image_count(&self) -> u32 {
        self.image_count
    }

    fn extent(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn back_buffer(&self, index: u32) -> Result<Box<dyn NativeTexture>> {
        Ok(Box::new(MockTexture {
            id: self.first_image_id + index as u64,
            label: format!("swapchain image {}", index),
            mip_levels: 1,
        }))
    }

    fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        self.width = width;
        self.height = height;
        self.next = 0;
        self.first_image_id += 100;
        Ok(())
    }
}

// ============================================================================
// Mock backend
// ============================================================================

/// Recorded submission
#[derive(Debug, Clone)]
pub(crate) struct MockSubmission {
    pub queue: QueueType,
    pub lists: Vec<Vec<MockCommand>>,
}

pub(crate) struct MockBackend {
    adapter: AdapterInfo,
    next_id: AtomicU64,
    calls: Mutex<Vec<String>>,
    submissions: Mutex<Vec<MockSubmission>>,
    signals: Mutex<Vec<(QueueType, u64)>>,
    pub fail_buffer_creation: AtomicBool,
}

impl MockBackend {
    pub fn new() -> Self {
        Self {
            adapter: AdapterInfo {
                name: "Mock Adapter".to_string(),
                vendor_id: 0x1234,
                device_id: 0x5678,
                kind: AdapterKind::Discrete,
                dedicated_memory: 8 * 1024 * 1024 * 1024,
            },
            next_id: AtomicU64::new(1),
            calls: Mutex::new(Vec::new()),
            submissions: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            fail_buffer_creation: AtomicBool::new(false),
        }
    }

    fn id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    /// Number of logged calls starting with `prefix`
    pub fn count(&self, prefix: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| c.starts_with(prefix)).count()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<MockSubmission> {
        self.submissions.lock().unwrap().clone()
    }

    pub fn signals(&self) -> Vec<(QueueType, u64)> {
        self.signals.lock().unwrap().clone()
    }
}

/// Parse the mock shader "bytecode": one binding per line
/// (`cbv|srv|uav|tex|rwtex|sampler <set> <binding> <name>`) or `push <bytes>`.
/// Any line starting with `error` fails compilation.
fn parse_mock_shader(code: &[u8]) -> Result<ShaderReflection> {
    let text = std::str::from_utf8(code).map_err(|_| Error::ShaderCompilation("mock: not utf-8".to_string()))?;
    let mut reflection = ShaderReflection::default();
    for (line_no, line) in text.lines().enumerate() {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            [] => {}
            ["error", rest @ ..] => {
                return Err(Error::ShaderCompilation(format!(
                    "line {}: error: {}",
                    line_no + 1,
                    rest.join(" ")
                )))
            }
            ["push", size] => reflection.push_constant_size = size.parse().unwrap(),
            [kind, set, binding, name] => {
                let kind = match *kind {
                    "cbv" => BindingKind::ConstantBuffer,
                    "srv" => BindingKind::ShaderResourceBuffer,
                    "uav" => BindingKind::UnorderedAccessBuffer,
                    "tex" => BindingKind::ShaderResourceTexture,
                    "rwtex" => BindingKind::UnorderedAccessTexture,
                    "sampler" => BindingKind::Sampler,
                    other => return Err(Error::ShaderCompilation(format!("unknown binding kind {}", other))),
                };
                reflection.bindings.push(ReflectedBinding {
                    name: name.to_string(),
                    set: set.parse().unwrap(),
                    binding: binding.parse().unwrap(),
                    kind,
                    count: 1,
                });
            }
            _ => return Err(Error::ShaderCompilation(format!("line {}: cannot parse", line_no + 1))),
        }
    }
    Ok(reflection)
}

impl Backend for MockBackend {
    fn adapter(&self) -> &AdapterInfo {
        &self.adapter
    }

    fn create_command_allocator(&self, queue: QueueType) -> Result<Box<dyn NativeCommandAllocator>> {
        self.record(format!("create_command_allocator({:?})", queue));
        Ok(Box::new(MockCommandAllocator {
            queue,
            resets: AtomicU32::new(0),
        }))
    }

    fn create_command_list(
        &self,
        queue: QueueType,
        _allocator: &dyn NativeCommandAllocator,
    ) -> Result<Box<dyn NativeCommandList>> {
        self.record(format!("create_command_list({:?})", queue));
        Ok(Box::new(MockCommandList {
            queue,
            open: false,
            begins: 0,
            commands: Vec::new(),
            effects: Vec::new(),
        }))
    }

    fn execute_command_lists(&self, queue: QueueType, lists: &[&dyn NativeCommandList]) -> Result<()> {
        self.record(format!("execute_command_lists({:?}, {})", queue, lists.len()));
        let mut recorded = Vec::with_capacity(lists.len());
        for list in lists {
            let list = list.as_any().downcast_ref::<MockCommandList>().unwrap();
            if list.open {
                return Err(Error::BackendError("mock: executing an open command list".to_string()));
            }
            for effect in &list.effects {
                effect.apply();
            }
            recorded.push(list.commands.clone());
        }
        self.submissions.lock().unwrap().push(MockSubmission { queue, lists: recorded });
        Ok(())
    }

    fn create_fence(&self) -> Result<Box<dyn NativeFence>> {
        self.record("create_fence".to_string());
        Ok(Box::new(MockFence {
            value: AtomicU64::new(0),
            waits: AtomicU32::new(0),
        }))
    }

    fn signal_fence(&self, queue: QueueType, fence: &dyn NativeFence, value: u64) -> Result<()> {
        // the mock GPU is always idle, so the signal lands immediately
        let fence = fence.as_any().downcast_ref::<MockFence>().unwrap();
        fence.value.store(value, Ordering::SeqCst);
        self.signals.lock().unwrap().push((queue, value));
        Ok(())
    }

    fn create_buffer(&self, desc: &NativeBufferDesc<'_>) -> Result<Box<dyn NativeBuffer>> {
        self.record(format!("create_buffer({}, {:?})", desc.label, desc.heap));
        if self.fail_buffer_creation.load(Ordering::SeqCst) {
            return Err(Error::OutOfMemory);
        }
        Ok(Box::new(MockBuffer {
            id: self.id(),
            label: desc.label.to_string(),
            heap: desc.heap,
            memory: Arc::new(Mutex::new(vec![0; desc.size as usize])),
        }))
    }

    fn create_texture(&self, desc: &NativeTextureDesc<'_>) -> Result<Box<dyn NativeTexture>> {
        self.record(format!("create_texture({})", desc.label));
        Ok(Box::new(MockTexture {
            id: self.id(),
            label: desc.label.to_string(),
            mip_levels: desc.mip_levels,
        }))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Box<dyn NativeSampler>> {
        self.record("create_sampler".to_string());
        Ok(Box::new(MockSampler { desc: *desc }))
    }

    fn create_descriptor_heap(&self, kind: DescriptorHeapKind, capacity: u32) -> Result<Box<dyn NativeDescriptorHeap>> {
        self.record(format!("create_descriptor_heap({:?}, {})", kind, capacity));
        Ok(Box::new(MockDescriptorHeap {
            kind,
            capacity,
            written: Mutex::new(Vec::new()),
        }))
    }

    fn write_descriptor(&self, heap: &dyn NativeDescriptorHeap, slot: u32, view: &DescriptorView<'_>) -> Result<()> {
        let heap = heap.as_any().downcast_ref::<MockDescriptorHeap>().unwrap();
        assert_eq!(heap.kind, view.heap_kind());
        assert!(slot < heap.capacity);
        self.record(format!("write_descriptor({:?}, {})", heap.kind, slot));
        heap.written.lock().unwrap().push(slot);
        Ok(())
    }

    fn create_shader(&self, desc: &ShaderModuleDesc<'_>) -> Result<Box<dyn NativeShader>> {
        self.record(format!("create_shader({}, {}, {})", desc.label, desc.entry_point, desc.target));
        Ok(Box::new(MockShader {
            reflection: parse_mock_shader(desc.code)?,
        }))
    }

    fn create_root_signature(
        &self,
        desc: &RootSignatureDesc,
        heaps: &[&dyn NativeDescriptorHeap],
    ) -> Result<Box<dyn NativeRootSignature>> {
        assert_eq!(heaps.len(), 3);
        self.record(format!("create_root_signature({})", desc.parameters.len()));
        Ok(Box::new(MockRootSignature { desc: desc.clone() }))
    }

    fn create_compute_pipeline(
        &self,
        _root: &dyn NativeRootSignature,
        _shader: &dyn NativeShader,
    ) -> Result<Box<dyn NativePipeline>> {
        self.record("create_compute_pipeline".to_string());
        Ok(Box::new(MockPipeline { id: self.id() }))
    }

    fn create_graphics_pipeline(
        &self,
        _root: &dyn NativeRootSignature,
        desc: &GraphicsPipelineDesc,
        _vertex: &dyn NativeShader,
        pixel: Option<&dyn NativeShader>,
    ) -> Result<Box<dyn NativePipeline>> {
        self.record(format!("create_graphics_pipeline({}, pixel={})", desc.label, pixel.is_some()));
        Ok(Box::new(MockPipeline { id: self.id() }))
    }

    fn create_descriptor_set(&self, root: &dyn NativeRootSignature, set_index: u32) -> Result<Box<dyn NativeDescriptorSet>> {
        let root = root.as_any().downcast_ref::<MockRootSignature>().unwrap();
        assert!((set_index as usize) < root.desc.parameters.len());
        self.record(format!("create_descriptor_set({})", set_index));
        Ok(Box::new(MockDescriptorSet {
            set_index,
            writes: Mutex::new(Vec::new()),
        }))
    }

    fn update_descriptor_set(&self, set: &dyn NativeDescriptorSet, writes: &[DescriptorSetWrite<'_>]) -> Result<()> {
        let set = set.as_any().downcast_ref::<MockDescriptorSet>().unwrap();
        self.record(format!("update_descriptor_set({}, {})", set.set_index, writes.len()));
        set.writes.lock().unwrap().extend(writes.iter().map(|w| w.binding));
        Ok(())
    }

    fn create_swap_chain(
        &self,
        desc: &SwapChainDesc,
        _display: RawDisplayHandle,
        _window: RawWindowHandle,
    ) -> Result<Box<dyn NativeSwapChain>> {
        self.record(format!("create_swap_chain({}x{})", desc.width, desc.height));
        let mut swap_chain = MockSwapChain::new(desc.back_buffer_count, desc.width, desc.height);
        swap_chain.format = desc.format;
        Ok(Box::new(swap_chain))
    }

    fn wait_idle(&self) -> Result<()> {
        self.record("wait_idle".to_string());
        Ok(())
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Device over a fresh mock backend, with the backend for inspection
pub(crate) fn mock_device() -> (Arc<MockBackend>, Device) {
    mock_device_with(DeviceConfig::default())
}

pub(crate) fn mock_device_with(config: DeviceConfig) -> (Arc<MockBackend>, Device) {
    let backend = Arc::new(MockBackend::new());
    let device = Device::new(backend.clone(), config).unwrap();
    (backend, device)
}

/// Commands currently recorded in `list`
pub(crate) fn recorded(list: &CommandList) -> Vec<MockCommand> {
    list.native()
        .as_any()
        .downcast_ref::<MockCommandList>()
        .unwrap()
        .commands
        .clone()
}

/// Mock id of a native buffer
pub(crate) fn buffer_id(native: &dyn NativeBuffer) -> u64 {
    buffer(native).id
}

pub(crate) fn mock_texture_id(native: &dyn NativeTexture) -> u64 {
    texture_id(native)
}
