//! GPU device seam
//!
//! [`GpuDevice`] is the narrow set of device operations the frame loop, the
//! upload path and the deletion queue need. The Vulkan backend implements it
//! over `ash` + `vk-mem`; tests drive the same code through a recording mock.
//!
//! Handles are plain `ash::vk` values. Buffers and images are returned as
//! [`AllocatedBuffer`] / [`AllocatedImage`]: `Copy` value pairs of a native
//! handle and the allocator key for its memory. They carry no destructor, so
//! whoever created one must either destroy it immediately or hand it to the
//! deletion queue.

use ash::vk;
use slotmap::new_key_type;

use crate::render::VulkanResult;

new_key_type! {
    /// Key of a live memory allocation inside the device allocator
    pub struct AllocationKey;
}

/// Where an allocation lives and who may touch it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLocation {
    /// Device-local, not mappable
    GpuOnly,
    /// Host-visible, written sequentially by the CPU and read by the GPU
    CpuToGpu,
}

/// Buffer handle plus the allocation backing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedBuffer {
    /// Native buffer handle
    pub buffer: vk::Buffer,
    /// Allocator-owned memory
    pub allocation: AllocationKey,
    /// Size in bytes
    pub size: vk::DeviceSize,
}

/// Image handle plus the allocation backing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocatedImage {
    /// Native image handle
    pub image: vk::Image,
    /// Allocator-owned memory
    pub allocation: AllocationKey,
    /// Image dimensions
    pub extent: vk::Extent3D,
    /// Texel format
    pub format: vk::Format,
}

/// Alignment limits queried from the physical device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    /// `minUniformBufferOffsetAlignment`
    pub min_uniform_buffer_offset_alignment: vk::DeviceSize,
    /// `minStorageBufferOffsetAlignment`
    pub min_storage_buffer_offset_alignment: vk::DeviceSize,
}

/// One queue submission of a single command buffer
#[derive(Debug, Clone, Copy)]
pub struct SubmitDesc {
    /// Command buffer to execute
    pub command_buffer: vk::CommandBuffer,
    /// Semaphore to wait on and the stage that waits
    pub wait: Option<(vk::Semaphore, vk::PipelineStageFlags)>,
    /// Semaphore signaled on completion
    pub signal: Option<vk::Semaphore>,
    /// Fence signaled on completion
    pub fence: vk::Fence,
}

/// A single buffer bound into a descriptor set
#[derive(Debug, Clone, Copy)]
pub struct BufferBinding {
    /// Binding slot in the set layout
    pub binding: u32,
    /// Descriptor type written at this slot
    pub descriptor_type: vk::DescriptorType,
    /// Buffer bound at offset 0 (dynamic offsets select the region)
    pub buffer: vk::Buffer,
    /// Bytes visible through the descriptor
    pub range: vk::DeviceSize,
}

/// Vertex input layout: one binding plus its attributes
#[derive(Debug, Clone, Default)]
pub struct VertexInputDescription {
    /// Binding descriptions
    pub bindings: Vec<vk::VertexInputBindingDescription>,
    /// Attribute descriptions
    pub attributes: Vec<vk::VertexInputAttributeDescription>,
}

/// Everything needed to build one graphics pipeline
#[derive(Debug, Clone, Copy)]
pub struct PipelineDesc<'a> {
    /// Vertex shader SPIR-V words
    pub vertex_spirv: &'a [u32],
    /// Fragment shader SPIR-V words
    pub fragment_spirv: &'a [u32],
    /// Vertex input layout
    pub vertex_input: &'a VertexInputDescription,
    /// Pipeline layout the pipeline is built against
    pub layout: vk::PipelineLayout,
}

/// Device operations used by the render core
///
/// All methods take `&self`; implementations own whatever interior state they
/// need. Creation methods return errors, destroy methods do not: teardown is
/// infallible and implementations log anything unexpected.
pub trait GpuDevice {
    /// Offset alignment limits for dynamic uniform and storage buffers
    fn limits(&self) -> DeviceLimits;

    /// Extent of the presentation surface
    fn surface_extent(&self) -> vk::Extent2D;

    // Synchronization

    /// Create a fence, optionally already signaled
    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence>;
    /// Destroy a fence
    fn destroy_fence(&self, fence: vk::Fence);
    /// Block until `fence` signals or `timeout_ns` expires
    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<()>;
    /// Return a fence to the unsignaled state
    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()>;
    /// Create a binary semaphore
    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore>;
    /// Destroy a semaphore
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Block until every queue is idle
    fn wait_idle(&self) -> VulkanResult<()>;

    // Commands

    /// Create a command pool on the graphics queue family
    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool>;
    /// Destroy a command pool and every buffer allocated from it
    fn destroy_command_pool(&self, pool: vk::CommandPool);
    /// Reset every command buffer allocated from `pool`
    fn reset_command_pool(&self, pool: vk::CommandPool) -> VulkanResult<()>;
    /// Allocate one primary command buffer
    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer>;
    /// Reset a single command buffer
    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()>;
    /// Begin one-time-submit recording
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()>;
    /// Finish recording
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()>;
    /// Submit on the graphics queue
    fn submit(&self, submit: &SubmitDesc) -> VulkanResult<()>;

    // Presentation

    /// Acquire the next swapchain image, signaling `signal` when it is ready
    fn acquire_next_image(&self, signal: vk::Semaphore, timeout_ns: u64) -> VulkanResult<u32>;
    /// Present `image_index` once `wait` is signaled
    fn present(&self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<()>;

    // Recording

    /// Begin the main render pass on the framebuffer of `image_index`
    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, image_index: u32, clear_values: &[vk::ClearValue]);
    /// End the current render pass
    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer);
    /// Bind a graphics pipeline
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    /// Bind one descriptor set at set 0 with dynamic offsets
    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    );
    /// Bind a vertex buffer at binding 0
    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer);
    /// Non-indexed draw of a single instance
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, first_instance: u32);
    /// Copy `size` bytes between buffers
    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize);
    /// Transition the colour aspect of `image` between layouts
    fn cmd_transition_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    );
    /// Copy a tightly packed buffer into mip 0 of an image in `TRANSFER_DST_OPTIMAL`
    fn cmd_copy_buffer_to_image(&self, cmd: vk::CommandBuffer, src: vk::Buffer, image: vk::Image, extent: vk::Extent3D);

    // Memory

    /// Create a buffer backed by allocator memory
    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> VulkanResult<AllocatedBuffer>;
    /// Destroy a buffer and free its memory
    fn destroy_buffer(&self, buffer: AllocatedBuffer);
    /// Copy `data` into a host-visible buffer at `offset`
    fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()>;
    /// Create a device-local 2D image
    fn create_image(
        &self,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<AllocatedImage>;
    /// Destroy an image and free its memory
    fn destroy_image(&self, image: AllocatedImage);
    /// Create a 2D view over mip 0
    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView>;
    /// Destroy an image view
    fn destroy_image_view(&self, view: vk::ImageView);

    // Descriptors and pipelines

    /// Create a descriptor set layout
    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout>;
    /// Destroy a descriptor set layout
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// Create a descriptor pool
    fn create_descriptor_pool(
        &self,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> VulkanResult<vk::DescriptorPool>;
    /// Destroy a descriptor pool and its sets
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// Allocate one set of `layout` from `pool`
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet>;
    /// Point buffer descriptors of `set` at the given buffers
    fn write_descriptor_set(&self, set: vk::DescriptorSet, bindings: &[BufferBinding]);
    /// Create a pipeline layout over the given set layouts
    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<vk::PipelineLayout>;
    /// Destroy a pipeline layout
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    /// Build a graphics pipeline against the main render pass
    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_>) -> VulkanResult<vk::Pipeline>;
    /// Destroy a pipeline
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);
}
