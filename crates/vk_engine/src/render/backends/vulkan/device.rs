//! The Vulkan implementation of [`GpuDevice`]
//!
//! [`VulkanDevice`] brings up the whole context for a window: instance,
//! surface, physical and logical device, the allocator, the swapchain and the
//! main render pass with its depth buffer and framebuffers. Everything the
//! engine creates on top of it goes through the [`GpuDevice`] methods and is
//! torn down by the engine's deletion queue before this value drops.

use std::ffi::CStr;

use ash::vk;

use crate::config::EngineConfig;
use crate::render::backends::vulkan::allocator::GpuAllocator;
use crate::render::backends::vulkan::context::{LogicalDevice, PhysicalDeviceInfo, SurfaceHandle, VulkanInstance};
use crate::render::backends::vulkan::swapchain::{color_subresource_range, Swapchain};
use crate::render::device::{
    AllocatedBuffer, AllocatedImage, BufferBinding, DeviceLimits, GpuDevice, MemoryLocation, PipelineDesc, SubmitDesc,
};
use crate::render::{VulkanError, VulkanResult};
use crate::window::Window;

/// Depth attachment format
pub const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;

const SHADER_ENTRY: &CStr = c"main";

/// Main render pass and the per-image targets it draws into
struct RenderTargets {
    render_pass: vk::RenderPass,
    depth_image: Option<AllocatedImage>,
    depth_view: vk::ImageView,
    framebuffers: Vec<vk::Framebuffer>,
}

impl RenderTargets {
    fn new(device: &ash::Device, allocator: &GpuAllocator, swapchain: &Swapchain) -> VulkanResult<Self> {
        let mut targets = Self {
            render_pass: vk::RenderPass::null(),
            depth_image: None,
            depth_view: vk::ImageView::null(),
            framebuffers: Vec::new(),
        };
        match targets.build(device, allocator, swapchain) {
            Ok(()) => Ok(targets),
            Err(e) => {
                targets.destroy(device, allocator);
                Err(e)
            }
        }
    }

    fn build(&mut self, device: &ash::Device, allocator: &GpuAllocator, swapchain: &Swapchain) -> VulkanResult<()> {
        self.render_pass = create_forward_pass(device, swapchain.format())?;

        let extent = swapchain.extent();
        let depth_image = allocator.create_image(
            vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
        )?;
        self.depth_image = Some(depth_image);
        self.depth_view = create_view(device, depth_image.image, DEPTH_FORMAT, vk::ImageAspectFlags::DEPTH)?;

        for &color_view in swapchain.image_views() {
            let attachments = [color_view, self.depth_view];
            let framebuffer_info = vk::FramebufferCreateInfo::builder()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);
            let framebuffer = unsafe {
                device
                    .create_framebuffer(&framebuffer_info, None)
                    .map_err(VulkanError::Api)?
            };
            self.framebuffers.push(framebuffer);
        }
        Ok(())
    }

    fn destroy(&mut self, device: &ash::Device, allocator: &GpuAllocator) {
        unsafe {
            for framebuffer in self.framebuffers.drain(..) {
                device.destroy_framebuffer(framebuffer, None);
            }
            device.destroy_image_view(self.depth_view, None);
            device.destroy_render_pass(self.render_pass, None);
        }
        if let Some(depth_image) = self.depth_image.take() {
            allocator.destroy_image(depth_image);
        }
    }
}

fn create_forward_pass(device: &ash::Device, color_format: vk::Format) -> VulkanResult<vk::RenderPass> {
    let color_attachment = vk::AttachmentDescription::builder()
        .format(color_format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();
    let depth_attachment = vk::AttachmentDescription::builder()
        .format(DEPTH_FORMAT)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::DONT_CARE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL)
        .build();
    let attachments = [color_attachment, depth_attachment];

    let color_refs = [vk::AttachmentReference {
        attachment: 0,
        layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    }];
    let depth_ref = vk::AttachmentReference {
        attachment: 1,
        layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    };
    let subpasses = [vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(&color_refs)
        .depth_stencil_attachment(&depth_ref)
        .build()];

    let stages = vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS;
    let dependencies = [vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(stages)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(stages)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
        .build()];

    let create_info = vk::RenderPassCreateInfo::builder()
        .attachments(&attachments)
        .subpasses(&subpasses)
        .dependencies(&dependencies);
    unsafe { device.create_render_pass(&create_info, None).map_err(VulkanError::Api) }
}

fn create_view(
    device: &ash::Device,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> VulkanResult<vk::ImageView> {
    let view_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: aspect,
            ..color_subresource_range()
        });
    unsafe { device.create_image_view(&view_info, None).map_err(VulkanError::Api) }
}

/// Access masks and stages for the layout transitions the upload path uses
fn barrier_scope(
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
) -> (vk::AccessFlags, vk::AccessFlags, vk::PipelineStageFlags, vk::PipelineStageFlags) {
    match (old_layout, new_layout) {
        (vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL) => (
            vk::AccessFlags::empty(),
            vk::AccessFlags::TRANSFER_WRITE,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
        ),
        (vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL) => (
            vk::AccessFlags::TRANSFER_WRITE,
            vk::AccessFlags::SHADER_READ,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
        ),
        _ => (
            vk::AccessFlags::MEMORY_WRITE,
            vk::AccessFlags::MEMORY_READ | vk::AccessFlags::MEMORY_WRITE,
            vk::PipelineStageFlags::ALL_COMMANDS,
            vk::PipelineStageFlags::ALL_COMMANDS,
        ),
    }
}

/// A window-backed Vulkan device
///
/// Field order is drop order: the swapchain goes before the allocator, the
/// allocator before the logical device, and the instance last.
pub struct VulkanDevice {
    targets: RenderTargets,
    swapchain: Swapchain,
    allocator: GpuAllocator,
    logical: LogicalDevice,
    surface: SurfaceHandle,
    physical: PhysicalDeviceInfo,
    instance: VulkanInstance,
}

impl VulkanDevice {
    /// Bring up Vulkan for `window`
    pub fn new(window: &mut Window, config: &EngineConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(window, &config.application_name, config.enable_validation)?;
        let surface = SurfaceHandle::new(&instance, window)?;
        let physical = PhysicalDeviceInfo::select_suitable_device(&instance.instance, &surface)?;
        let logical = LogicalDevice::new(&instance.instance, &physical)?;
        let allocator = GpuAllocator::new(&instance.instance, &logical.device, physical.device)?;

        let (width, height) = window.framebuffer_size();
        let swapchain = Swapchain::new(
            &logical.device,
            &logical.swapchain_loader,
            &surface,
            &physical,
            vk::Extent2D { width, height },
        )?;
        let targets = RenderTargets::new(&logical.device, &allocator, &swapchain)?;

        let limits = physical.limits();
        log::info!(
            "Vulkan device ready: uniform alignment {}, storage alignment {}",
            limits.min_uniform_buffer_offset_alignment,
            limits.min_storage_buffer_offset_alignment
        );

        Ok(Self {
            targets,
            swapchain,
            allocator,
            logical,
            surface,
            physical,
            instance,
        })
    }

    /// Name of the selected GPU
    pub fn gpu_name(&self) -> String {
        self.physical.name()
    }

    /// Allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.allocator.live_allocations()
    }

    /// Instance the device was created from
    pub fn instance(&self) -> &ash::Instance {
        &self.instance.instance
    }

    /// Presentation surface
    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface.surface
    }

    fn device(&self) -> &ash::Device {
        &self.logical.device
    }

    fn create_shader_module(&self, code: &[u32]) -> VulkanResult<vk::ShaderModule> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        unsafe {
            self.device()
                .create_shader_module(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn build_pipeline(
        &self,
        desc: &PipelineDesc<'_>,
        vertex_module: vk::ShaderModule,
        fragment_module: vk::ShaderModule,
    ) -> VulkanResult<vk::Pipeline> {
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(vertex_module)
                .name(SHADER_ENTRY)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(fragment_module)
                .name(SHADER_ENTRY)
                .build(),
        ];

        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&desc.vertex_input.bindings)
            .vertex_attribute_descriptions(&desc.vertex_input.attributes);
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let extent = self.swapchain.extent();
        #[allow(clippy::cast_precision_loss)]
        let viewports = [vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::CLOCKWISE);
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0);

        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(&blend_attachments);

        let create_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .layout(desc.layout)
            .render_pass(self.targets.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            self.device()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[create_info], None)
                .map_err(|(_, e)| VulkanError::Api(e))?
        };
        pipelines
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("Pipeline creation returned nothing".to_string()))
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.logical.device.device_wait_idle();
        }
        self.targets.destroy(&self.logical.device, &self.allocator);
        log::debug!("Vulkan device torn down");
    }
}

impl GpuDevice for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.physical.limits()
    }

    fn surface_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    fn create_fence(&self, signaled: bool) -> VulkanResult<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        unsafe { self.device().create_fence(&create_info, None).map_err(VulkanError::Api) }
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.device().destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence, timeout_ns: u64) -> VulkanResult<()> {
        unsafe {
            self.device()
                .wait_for_fences(&[fence], true, timeout_ns)
                .map_err(|e| VulkanError::from_vk(e, "fence"))
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> VulkanResult<()> {
        unsafe { self.device().reset_fences(&[fence]).map_err(VulkanError::Api) }
    }

    fn create_semaphore(&self) -> VulkanResult<vk::Semaphore> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        unsafe {
            self.device()
                .create_semaphore(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.device().destroy_semaphore(semaphore, None) }
    }

    fn wait_idle(&self) -> VulkanResult<()> {
        unsafe { self.device().device_wait_idle().map_err(VulkanError::Api) }
    }

    fn create_command_pool(&self) -> VulkanResult<vk::CommandPool> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(self.logical.graphics_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        unsafe {
            self.device()
                .create_command_pool(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_command_pool(&self, pool: vk::CommandPool) {
        unsafe { self.device().destroy_command_pool(pool, None) }
    }

    fn reset_command_pool(&self, pool: vk::CommandPool) -> VulkanResult<()> {
        unsafe {
            self.device()
                .reset_command_pool(pool, vk::CommandPoolResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    fn allocate_command_buffer(&self, pool: vk::CommandPool) -> VulkanResult<vk::CommandBuffer> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);
        let buffers = unsafe {
            self.device()
                .allocate_command_buffers(&allocate_info)
                .map_err(VulkanError::Api)?
        };
        buffers
            .into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("No command buffer allocated".to_string()))
    }

    fn reset_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe {
            self.device()
                .reset_command_buffer(cmd, vk::CommandBufferResetFlags::empty())
                .map_err(VulkanError::Api)
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe {
            self.device()
                .begin_command_buffer(cmd, &begin_info)
                .map_err(VulkanError::Api)
        }
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> VulkanResult<()> {
        unsafe { self.device().end_command_buffer(cmd).map_err(VulkanError::Api) }
    }

    fn submit(&self, submit: &SubmitDesc) -> VulkanResult<()> {
        let command_buffers = [submit.command_buffer];
        let (wait_semaphores, wait_stages): (Vec<vk::Semaphore>, Vec<vk::PipelineStageFlags>) =
            submit.wait.into_iter().unzip();
        let signal_semaphores: Vec<vk::Semaphore> = submit.signal.into_iter().collect();

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();
        unsafe {
            self.device()
                .queue_submit(self.logical.graphics_queue, &[submit_info], submit.fence)
                .map_err(VulkanError::Api)
        }
    }

    fn acquire_next_image(&self, signal: vk::Semaphore, timeout_ns: u64) -> VulkanResult<u32> {
        let (index, suboptimal) = unsafe {
            self.logical
                .swapchain_loader
                .acquire_next_image(self.swapchain.handle(), timeout_ns, signal, vk::Fence::null())
                .map_err(|e| VulkanError::from_vk(e, "swapchain image"))?
        };
        if suboptimal {
            log::debug!("Swapchain is suboptimal for the surface");
        }
        Ok(index)
    }

    fn present(&self, image_index: u32, wait: vk::Semaphore) -> VulkanResult<()> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain.handle()];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let suboptimal = unsafe {
            self.logical
                .swapchain_loader
                .queue_present(self.logical.present_queue, &present_info)
                .map_err(|e| VulkanError::from_vk(e, "present"))?
        };
        if suboptimal {
            log::debug!("Presented to a suboptimal swapchain");
        }
        Ok(())
    }

    fn cmd_begin_render_pass(&self, cmd: vk::CommandBuffer, image_index: u32, clear_values: &[vk::ClearValue]) {
        let Some(&framebuffer) = self.targets.framebuffers.get(image_index as usize) else {
            log::error!("No framebuffer for swapchain image {}", image_index);
            return;
        };
        let begin_info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.targets.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent(),
            })
            .clear_values(clear_values);
        unsafe {
            self.device()
                .cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
        }
    }

    fn cmd_end_render_pass(&self, cmd: vk::CommandBuffer) {
        unsafe { self.device().cmd_end_render_pass(cmd) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.device()
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
        }
    }

    fn cmd_bind_descriptor_set(
        &self,
        cmd: vk::CommandBuffer,
        layout: vk::PipelineLayout,
        set: vk::DescriptorSet,
        dynamic_offsets: &[u32],
    ) {
        unsafe {
            self.device().cmd_bind_descriptor_sets(
                cmd,
                vk::PipelineBindPoint::GRAPHICS,
                layout,
                0,
                &[set],
                dynamic_offsets,
            );
        }
    }

    fn cmd_bind_vertex_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer) {
        unsafe { self.device().cmd_bind_vertex_buffers(cmd, 0, &[buffer], &[0]) }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, first_instance: u32) {
        unsafe { self.device().cmd_draw(cmd, vertex_count, 1, 0, first_instance) }
    }

    fn cmd_copy_buffer(&self, cmd: vk::CommandBuffer, src: vk::Buffer, dst: vk::Buffer, size: vk::DeviceSize) {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size,
        };
        unsafe { self.device().cmd_copy_buffer(cmd, src, dst, &[region]) }
    }

    fn cmd_transition_image(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    ) {
        let (src_access, dst_access, src_stage, dst_stage) = barrier_scope(old_layout, new_layout);
        let barrier = vk::ImageMemoryBarrier::builder()
            .old_layout(old_layout)
            .new_layout(new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(image)
            .subresource_range(color_subresource_range())
            .src_access_mask(src_access)
            .dst_access_mask(dst_access)
            .build();
        unsafe {
            self.device().cmd_pipeline_barrier(
                cmd,
                src_stage,
                dst_stage,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier],
            );
        }
    }

    fn cmd_copy_buffer_to_image(&self, cmd: vk::CommandBuffer, src: vk::Buffer, image: vk::Image, extent: vk::Extent3D) {
        let region = vk::BufferImageCopy::builder()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            })
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(extent)
            .build();
        unsafe {
            self.device().cmd_copy_buffer_to_image(
                cmd,
                src,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[region],
            );
        }
    }

    fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> VulkanResult<AllocatedBuffer> {
        self.allocator.create_buffer(size, usage, location)
    }

    fn destroy_buffer(&self, buffer: AllocatedBuffer) {
        self.allocator.destroy_buffer(buffer);
    }

    fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        self.allocator.write_buffer(buffer, offset, data)
    }

    fn create_image(
        &self,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<AllocatedImage> {
        self.allocator.create_image(extent, format, usage)
    }

    fn destroy_image(&self, image: AllocatedImage) {
        self.allocator.destroy_image(image);
    }

    fn create_image_view(
        &self,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
    ) -> VulkanResult<vk::ImageView> {
        create_view(self.device(), image, format, aspect)
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.device().destroy_image_view(view, None) }
    }

    fn create_descriptor_set_layout(
        &self,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> VulkanResult<vk::DescriptorSetLayout> {
        let create_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(bindings);
        unsafe {
            self.device()
                .create_descriptor_set_layout(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device().destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(
        &self,
        sizes: &[vk::DescriptorPoolSize],
        max_sets: u32,
    ) -> VulkanResult<vk::DescriptorPool> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .pool_sizes(sizes)
            .max_sets(max_sets);
        unsafe {
            self.device()
                .create_descriptor_pool(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device().destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> VulkanResult<vk::DescriptorSet> {
        let layouts = [layout];
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        let sets = unsafe {
            self.device()
                .allocate_descriptor_sets(&allocate_info)
                .map_err(VulkanError::Api)?
        };
        sets.into_iter()
            .next()
            .ok_or_else(|| VulkanError::InitializationFailed("No descriptor set allocated".to_string()))
    }

    fn write_descriptor_set(&self, set: vk::DescriptorSet, bindings: &[BufferBinding]) {
        let buffer_infos: Vec<vk::DescriptorBufferInfo> = bindings
            .iter()
            .map(|binding| vk::DescriptorBufferInfo {
                buffer: binding.buffer,
                offset: 0,
                range: binding.range,
            })
            .collect();
        let writes: Vec<vk::WriteDescriptorSet> = bindings
            .iter()
            .zip(&buffer_infos)
            .map(|(binding, info)| {
                vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(binding.binding)
                    .descriptor_type(binding.descriptor_type)
                    .buffer_info(std::slice::from_ref(info))
                    .build()
            })
            .collect();
        unsafe { self.device().update_descriptor_sets(&writes, &[]) }
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout]) -> VulkanResult<vk::PipelineLayout> {
        let create_info = vk::PipelineLayoutCreateInfo::builder().set_layouts(set_layouts);
        unsafe {
            self.device()
                .create_pipeline_layout(&create_info, None)
                .map_err(VulkanError::Api)
        }
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.device().destroy_pipeline_layout(layout, None) }
    }

    fn create_graphics_pipeline(&self, desc: &PipelineDesc<'_>) -> VulkanResult<vk::Pipeline> {
        let vertex_module = self.create_shader_module(desc.vertex_spirv)?;
        let fragment_module = match self.create_shader_module(desc.fragment_spirv) {
            Ok(module) => module,
            Err(e) => {
                unsafe { self.device().destroy_shader_module(vertex_module, None) };
                return Err(e);
            }
        };

        let pipeline = self.build_pipeline(desc, vertex_module, fragment_module);

        // Modules are only needed while the pipeline is built.
        unsafe {
            self.device().destroy_shader_module(vertex_module, None);
            self.device().destroy_shader_module(fragment_module, None);
        }
        pipeline
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.device().destroy_pipeline(pipeline, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_barrier_scopes() {
        let (src, dst, src_stage, dst_stage) =
            barrier_scope(vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(src, vk::AccessFlags::empty());
        assert_eq!(dst, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(dst_stage, vk::PipelineStageFlags::TRANSFER);

        let (src, dst, _, dst_stage) = barrier_scope(
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        assert_eq!(src, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(dst, vk::AccessFlags::SHADER_READ);
        assert_eq!(dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);
    }

    #[test]
    fn test_shader_entry_point() {
        assert_eq!(SHADER_ENTRY.to_str().unwrap(), "main");
    }
}
