//! Recording GPU device for tests
//!
//! Hands out fake handles, models buffer memory as byte vectors and fences as
//! booleans, and logs every call in order so tests can assert on protocol
//! ordering. A submission signals its fence unless fences are set to hang.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use ash::vk::{self, Handle};
use slotmap::SlotMap;

use crate::render::device::{
    AllocatedBuffer, AllocatedImage, AllocationKey, BufferBinding, DeviceLimits, GpuDevice, MemoryLocation,
    PipelineDesc, SubmitDesc,
};
use crate::render::{VulkanError, VulkanResult};

/// One recorded device call
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateFence(vk::Fence),
    DestroyFence(vk::Fence),
    WaitForFence(vk::Fence),
    ResetFence(vk::Fence),
    CreateSemaphore(vk::Semaphore),
    DestroySemaphore(vk::Semaphore),
    WaitIdle,
    CreateCommandPool(vk::CommandPool),
    DestroyCommandPool(vk::CommandPool),
    ResetCommandPool(vk::CommandPool),
    AllocateCommandBuffer(vk::CommandBuffer),
    ResetCommandBuffer(vk::CommandBuffer),
    BeginCommandBuffer(vk::CommandBuffer),
    EndCommandBuffer(vk::CommandBuffer),
    Submit { cmd: vk::CommandBuffer, fence: vk::Fence },
    Acquire(u32),
    Present(u32),
    BeginRenderPass { image_index: u32, clear_values: usize },
    EndRenderPass,
    BindPipeline(vk::Pipeline),
    BindDescriptorSet { offsets: Vec<u32> },
    BindVertexBuffer(vk::Buffer),
    Draw { vertex_count: u32, first_instance: u32 },
    CopyBuffer { src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize },
    TransitionImage { old: vk::ImageLayout, new: vk::ImageLayout },
    CopyBufferToImage { src: vk::Buffer, image: vk::Image },
    CreateBuffer(vk::Buffer),
    DestroyBuffer(vk::Buffer),
    WriteBuffer { buffer: vk::Buffer, offset: vk::DeviceSize, len: usize },
    CreateImage(vk::Image),
    DestroyImage(vk::Image),
    CreateImageView(vk::ImageView),
    DestroyImageView(vk::ImageView),
    CreateDescriptorSetLayout,
    DestroyDescriptorSetLayout,
    CreateDescriptorPool,
    DestroyDescriptorPool,
    AllocateDescriptorSet,
    WriteDescriptorSet(usize),
    CreatePipelineLayout,
    DestroyPipelineLayout,
    CreatePipeline(vk::Pipeline),
    DestroyPipeline(vk::Pipeline),
}

/// Fake device
pub struct MockDevice {
    next_handle: Cell<u64>,
    calls: RefCell<Vec<Call>>,
    fences: RefCell<HashMap<vk::Fence, bool>>,
    memory: RefCell<SlotMap<AllocationKey, Vec<u8>>>,
    hang_fences: Cell<bool>,
    fail_submits: Cell<bool>,
    next_image: Cell<u32>,
    image_count: u32,
    extent: vk::Extent2D,
    limits: DeviceLimits,
}

impl MockDevice {
    /// 720x460 surface, three swapchain images, 256/64 byte alignments
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits {
            min_uniform_buffer_offset_alignment: 256,
            min_storage_buffer_offset_alignment: 64,
        })
    }

    /// Device with specific alignment limits
    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            next_handle: Cell::new(1),
            calls: RefCell::new(Vec::new()),
            fences: RefCell::new(HashMap::new()),
            memory: RefCell::new(SlotMap::with_key()),
            hang_fences: Cell::new(false),
            fail_submits: Cell::new(false),
            next_image: Cell::new(0),
            image_count: 3,
            extent: vk::Extent2D { width: 720, height: 460 },
            limits,
        }
    }

    /// Stop submissions from signaling their fences
    pub fn hang_fences(&self, hang: bool) {
        self.hang_fences.set(hang);
    }

    /// Make submissions fail with `ERROR_DEVICE_LOST` before reaching the queue
    pub fn fail_submits(&self, fail: bool) {
        self.fail_submits.set(fail);
    }

    /// Snapshot of the call log
    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    /// Count calls matching `predicate`
    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.borrow().iter().filter(|call| predicate(call)).count()
    }

    /// Bytes currently stored in a buffer
    pub fn read_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, len: usize) -> Vec<u8> {
        let memory = self.memory.borrow();
        let start = offset as usize;
        memory[buffer.allocation][start..start + len].to_vec()
    }

    /// Allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.memory.borrow().len()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }

    fn handle(&self) -> u64 {
        let raw = self.next_handle.get();
        self.next_handle.set(raw + 1);
        raw
    }
}

impl Default for MockDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl GpuDevice for MockDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn surface_extent(&self) -> vk::Extent2D {
        self.extent
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let fence = vk::Fence::from_raw(self.handle());
        self.fences.borrow_mut().insert(fence, signaled);
        self.record(Call::CreateFence(fence));
        Ok(fence)
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        self.fences.borrow_mut().remove(&fence);
        self.record(Call::DestroyFence(fence));
    }

    fn wait_for_fence(&self, fence: vk::Fence, _timeout_ns: u64) -> VulkanResult<()> {
        self.record(Call::WaitForFence(fence));
        match self.fences.borrow().get(&fence) {
            Some(true) => Ok(()),
            Some(false) => Err(VulkanError::from_vk(vk::Result::TIMEOUT, "fence")),
            None => Err(VulkanError::InvalidOperation {
                reason: "wait on unknown fence".to_string(),
            }),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        self.record(Call::ResetFence(fence));
        self.fences.borrow_mut().insert(fence, false);
        Ok(())
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let semaphore = vk::Semaphore::from_raw(self.handle());
        self.record(Call::CreateSemaphore(semaphore));
        Ok(semaphore)
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        self.record(Call::DestroySemaphore(semaphore));
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        self.record(Call::WaitIdle);
        Ok(())
    }

    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool> {
        let pool = vk::CommandPool::from_raw(self.handle());
        self.record(Call::CreateCommandPool(pool));
        Ok(pool)
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        self.record(Call::DestroyCommandPool(pool));
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> VulkanResult<()> {
        self.record(Call::ResetCommandPool(pool));
        Ok(())
    }

    fn allocate_command_buffer(&self, _pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let cmd = vk::CommandBuffer::from_raw(self.handle());
        self.record(Call::AllocateCommandBuffer(cmd));
        Ok(cmd)
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Call::ResetCommandBuffer(cmd));
        Ok(())
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Call::BeginCommandBuffer(cmd));
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()> {
        self.record(Call::EndCommandBuffer(cmd));
        Ok(())
    }

    fn submit(&self, submit: &SubmitDesc) -> VulkanResult<()> {
        self.record(Call::Submit {
            cmd: submit.command_buffer,
            fence: submit.fence,
        });
        if self.fail_submits.get() {
            return Err(VulkanError::Api(vk::Result::ERROR_DEVICE_LOST));
        }
        if !self.hang_fences.get() {
            if let Some(signaled) = self.fences.borrow_mut().get_mut(&submit.fence) {
                *signaled = true;
            }
        }
        Ok(())
    }

    fn acquire_next_image(&self, _signal: vk::Semaphore, _timeout_ns: u64) -> VulkanResult<u32> {
        let index = self.next_image.get();
        self.next_image.set((index + 1) % self.image_count);
        self.record(Call::Acquire(index));
        Ok(index)
    }

    fn present(&self, image_index: u32, _wait: vk::Semaphore) -> VulkanResult<()> {
        self.record(Call::Present(image_index));
        Ok(())
    }

    fn cmd_begin_render_pass(&self, _cmd: vk::CommandBuffer, image_index: u32, clear_values: &[vk::ClearValue]) {
        self.record(Call::BeginRenderPass {
            image_index,
            clear_values: clear_values.len(),
        });
    }

    fn cmd_end_render_pass(&self, _cmd: vk::CommandBuffer) {
        self.record(Call::EndRenderPass);
    }

    fn cmd_bind_pipeline(&self, _cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.record(Call::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_set(
        &self,
        _cmd: vk::CommandBuffer,
        _layout: vk::PipelineLayout,
        _set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        self.record(Call::BindDescriptorSet {
            offsets: dynamic_offsets.to_vec(),
        });
    }

    fn cmd_bind_vertex_buffer(&self, _cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        self.record(Call::BindVertexBuffer(buffer));
    }

    fn cmd_draw(&self, _cmd: vk::CommandBuffer, vertex_count: u32, first_instance: u32) {
        self.record(Call::Draw {
            vertex_count,
            first_instance,
        });
    }

    fn cmd_copy_buffer(&self, _cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        self.record(Call::CopyBuffer { src, dst, size });
    }

    fn cmd_transition_image(
        &self,
        _cmd: vk::CommandBuffer,
        _image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        self.record(Call::TransitionImage {
            old: old_layout,
            new: new_layout,
        });
    }

    fn cmd_copy_buffer_to_image(&self, _cmd: vk::CommandBuffer, src: vk::Buffer, image: vk::Image, _extent: vk::Extent3D) {
        self.record(Call::CopyBufferToImage { src, image });
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        _usage: vk::BufferUsageFlags,
        _location: MemoryLocation,
    ) -> VulkanResult<AllocatedBuffer> {
        let buffer = vk::Buffer::from_raw(self.handle());
        let allocation = self.memory.borrow_mut().insert(vec![0; size as usize]);
        self.record(Call::CreateBuffer(buffer));
        Ok(AllocatedBuffer {
            buffer,
            allocation,
            size,
        })
    }

    fn destroy_buffer(&self, buffer: AllocatedBuffer) {
        self.memory.borrow_mut().remove(buffer.allocation);
        self.record(Call::DestroyBuffer(buffer.buffer));
    }

    fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let mut memory = self.memory.borrow_mut();
        let bytes = memory.get_mut(buffer.allocation).ok_or_else(|| VulkanError::InvalidOperation {
            reason: "write to freed buffer".to_string(),
        })?;
        let start = offset as usize;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("write of {} bytes at {} overflows {}", data.len(), start, bytes.len()),
            });
        }
        bytes[start..end].copy_from_slice(data);
        drop(memory);
        self.record(Call::WriteBuffer {
            buffer: buffer.buffer,
            offset,
            len: data.len(),
        });
        Ok(())
    }

    fn create_image(
        &self,
        extent: vk::Extent3D,
        format: vk::Format,
        _usage: vk::ImageUsageFlags,
    ) -> VulkanResult<AllocatedImage> {
        let image = vk::Image::from_raw(self.handle());
        let allocation = self.memory.borrow_mut().insert(Vec::new());
        self.record(Call::CreateImage(image));
        Ok(AllocatedImage {
            image,
            allocation,
            extent,
            format,
        })
    }

    fn destroy_image(&self, image: AllocatedImage) {
        self.memory.borrow_mut().remove(image.allocation);
        self.record(Call::DestroyImage(image.image));
    }

    fn create_image_view(
        &self,
        _image: vk::Image,
        _format: vk::Format,
        _aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView> {
        let view = vk::ImageView::from_raw(self.handle());
        self.record(Call::CreateImageView(view));
        Ok(view)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.record(Call::DestroyImageView(view));
    }

    fn create_descriptor_set_layout(
        &self,
        _bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        self.record(Call::CreateDescriptorSetLayout);
        Ok(vk::DescriptorSetLayout::from_raw(self.handle()))
    }

    fn destroy_descriptor_set_layout(&self, _layout: vk::DescriptorSetLayout) {
        self.record(Call::DestroyDescriptorSetLayout);
    }

    fn create_descriptor_pool(
        &self,
        _sizes: &[vk::DescriptorPoolSize],
        _max_sets: u32,
    ) -> VulkanResult<vk::DescriptorPool> {
        self.record(Call::CreateDescriptorPool);
        Ok(vk::DescriptorPool::from_raw(self.handle()))
    }

    fn destroy_descriptor_pool(&self, _pool: vk::DescriptorPool) {
        self.record(Call::DestroyDescriptorPool);
    }

    fn allocate_descriptor_set(
        &self,
        _pool: vk::DescriptorPool,
        _layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        self.record(Call::AllocateDescriptorSet);
        Ok(vk::DescriptorSet::from_raw(self.handle()))
    }

    fn write_descriptor_set(&self, _set: vk::DescriptorSet, bindings: &[BufferBinding]) {
        self.record(Call::WriteDescriptorSet(bindings.len()));
    }

    fn create_pipeline_layout(&self, _set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<vk::PipelineLayout> {
        self.record(Call::CreatePipelineLayout);
        Ok(vk::PipelineLayout::from_raw(self.handle()))
    }

    fn destroy_pipeline_layout(&self, _layout: vk::PipelineLayout) {
        self.record(Call::DestroyPipelineLayout);
    }

    fn create_graphics_pipeline(&self, _desc: &PipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let pipeline = vk::Pipeline::from_raw(self.handle());
        self.record(Call::CreatePipeline(pipeline));
        Ok(pipeline)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.record(Call::DestroyPipeline(pipeline));
    }
}
