//! Render engine context and the per-frame draw protocol
//!
//! [`RenderEngine`] owns the device and everything created on it: frame slots,
//! the upload context, the shared per-frame buffers, descriptor objects,
//! registries and the deletion queue. Nothing it creates outlives it.
//!
//! Each [`RenderEngine::draw`] call runs the same strictly ordered protocol:
//!
//! 1. wait on the current slot's fence (bounded), then reset it
//! 2. acquire the next swapchain image (bounded)
//! 3. reset and record the slot's command buffer, writing this frame's global
//!    and object data into the slot's padded regions first
//! 4. end the render pass and the command buffer
//! 5. submit, waiting on image acquisition and signaling render completion and
//!    the slot fence
//! 6. present once rendering completes
//! 7. advance the frame counter
//!
//! Any failure aborts the frame and is returned to the caller; nothing is
//! retried.

use ash::vk;

use crate::config::EngineConfig;
use crate::render::deletion_queue::DeletionQueue;
use crate::render::device::{AllocatedBuffer, BufferBinding, GpuDevice, MemoryLocation, PipelineDesc, SubmitDesc};
use crate::render::frame::{current_slot, FrameRing, FrameSlot, FRAME_OVERLAP};
use crate::render::mesh::{Mesh, Vertex};
use crate::render::registry::{
    GpuMesh, GpuTexture, Material, MaterialKey, MeshKey, Registry, Renderable, TextureKey,
};
use crate::render::scene::Camera;
use crate::render::texture::ImageData;
use crate::render::uniform_layout::{
    global_region, object_region, GpuGlobalData, GpuObjectData, GpuSceneData, PaddedRegion, MAX_OBJECTS,
};
use crate::render::upload::UploadContext;
use crate::render::{VulkanError, VulkanResult};

/// Bind and draw counts of the most recent frame
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames submitted since startup
    pub frames_drawn: u64,
    /// Pipeline and descriptor rebinds in the last frame
    pub pipeline_binds: u32,
    /// Vertex buffer rebinds in the last frame
    pub vertex_buffer_binds: u32,
    /// Draw calls in the last frame
    pub draw_calls: u32,
}

/// The render context
pub struct RenderEngine<D: GpuDevice + 'static> {
    device: D,
    deletion_queue: DeletionQueue<D>,
    frames: FrameRing,
    upload: UploadContext,

    global_region: PaddedRegion,
    object_region: PaddedRegion,
    global_buffer: AllocatedBuffer,
    object_buffer: AllocatedBuffer,
    descriptor_set_layout: vk::DescriptorSetLayout,
    descriptor_set: vk::DescriptorSet,

    meshes: Registry<MeshKey, GpuMesh>,
    materials: Registry<MaterialKey, Material>,
    textures: Registry<TextureKey, GpuTexture>,
    renderables: Vec<Renderable>,

    camera: Camera,
    fence_timeout_ns: u64,
    clear_color_flash: bool,
    material_swap: Option<(MaterialKey, MaterialKey)>,
    alternate_active: bool,

    frame_number: u64,
    stats: FrameStats,
    shut_down: bool,
}

impl<D: GpuDevice + 'static> RenderEngine<D> {
    /// Build the frame ring, upload context, per-frame buffers and descriptors
    pub fn new(device: D, config: &EngineConfig) -> VulkanResult<Self> {
        let limits = device.limits();
        let global_region = global_region(limits.min_uniform_buffer_offset_alignment, FRAME_OVERLAP);
        let object_region = object_region(limits.min_storage_buffer_offset_alignment, FRAME_OVERLAP);
        global_region.validate_dynamic_offsets()?;
        object_region.validate_dynamic_offsets()?;

        let mut deletion_queue = DeletionQueue::new();
        let timeout = config.fence_timeout_ns;

        let frames = FrameRing::new(&device, &mut deletion_queue)?;
        let upload = UploadContext::new(&device, &mut deletion_queue, timeout)?;

        let global_buffer = device.create_buffer(
            global_region.total_size(),
            vk::BufferUsageFlags::UNIFORM_BUFFER,
            MemoryLocation::CpuToGpu,
        )?;
        deletion_queue.push(move |d: &D| d.destroy_buffer(global_buffer));

        let object_buffer = device.create_buffer(
            object_region.total_size(),
            vk::BufferUsageFlags::STORAGE_BUFFER,
            MemoryLocation::CpuToGpu,
        )?;
        deletion_queue.push(move |d: &D| d.destroy_buffer(object_buffer));

        log::debug!(
            "Per-frame regions: global stride {} ({} bytes), object stride {} ({} bytes)",
            global_region.stride,
            global_region.element_size,
            object_region.stride,
            object_region.element_size
        );

        let bindings = [
            vk::DescriptorSetLayoutBinding::builder()
                .binding(0)
                .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
                .build(),
            vk::DescriptorSetLayoutBinding::builder()
                .binding(1)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER_DYNAMIC)
                .descriptor_count(1)
                .stage_flags(vk::ShaderStageFlags::VERTEX)
                .build(),
        ];
        let descriptor_set_layout = device.create_descriptor_set_layout(&bindings)?;
        deletion_queue.push(move |d: &D| d.destroy_descriptor_set_layout(descriptor_set_layout));

        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                descriptor_count: 1,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
                descriptor_count: 1,
            },
        ];
        let descriptor_pool = device.create_descriptor_pool(&pool_sizes, 1)?;
        deletion_queue.push(move |d: &D| d.destroy_descriptor_pool(descriptor_pool));

        let descriptor_set = device.allocate_descriptor_set(descriptor_pool, descriptor_set_layout)?;
        device.write_descriptor_set(
            descriptor_set,
            &[
                BufferBinding {
                    binding: 0,
                    descriptor_type: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC,
                    buffer: global_buffer.buffer,
                    range: global_region.element_size,
                },
                BufferBinding {
                    binding: 1,
                    descriptor_type: vk::DescriptorType::STORAGE_BUFFER_DYNAMIC,
                    buffer: object_buffer.buffer,
                    range: object_region.element_size,
                },
            ],
        );

        log::info!("Render engine initialized ({} frames in flight)", FRAME_OVERLAP);

        Ok(Self {
            device,
            deletion_queue,
            frames,
            upload,
            global_region,
            object_region,
            global_buffer,
            object_buffer,
            descriptor_set_layout,
            descriptor_set,
            meshes: Registry::new(),
            materials: Registry::new(),
            textures: Registry::new(),
            renderables: Vec::new(),
            camera: Camera::from(&config.camera),
            fence_timeout_ns: timeout,
            clear_color_flash: config.clear_color_flash,
            material_swap: None,
            alternate_active: false,
            frame_number: 0,
            stats: FrameStats::default(),
            shut_down: false,
        })
    }

    /// Build a pipeline over the shared descriptor layout and register it
    pub fn create_material(
        &mut self,
        name: &str,
        vertex_spirv: &[u32],
        fragment_spirv: &[u32],
    ) -> VulkanResult<MaterialKey> {
        let layout = self.device.create_pipeline_layout(&[self.descriptor_set_layout])?;
        self.deletion_queue.push(move |d: &D| d.destroy_pipeline_layout(layout));

        let vertex_input = Vertex::input_description();
        let pipeline = self.device.create_graphics_pipeline(&PipelineDesc {
            vertex_spirv,
            fragment_spirv,
            vertex_input: &vertex_input,
            layout,
        })?;
        self.deletion_queue.push(move |d: &D| d.destroy_pipeline(pipeline));

        log::debug!("Created material '{}'", name);
        Ok(self.materials.create(name, Material { pipeline, layout }))
    }

    /// Upload a mesh through the staging path and register it
    ///
    /// The staging buffer is gone when this returns; the vertex buffer gets one
    /// deletion-queue entry.
    pub fn upload_mesh(&mut self, name: &str, mesh: &Mesh) -> VulkanResult<MeshKey> {
        if mesh.vertices.is_empty() {
            return Err(VulkanError::InvalidOperation {
                reason: format!("mesh '{}' has no vertices", name),
            });
        }
        let vertex_buffer = self
            .upload
            .upload_buffer(&self.device, mesh.as_bytes(), vk::BufferUsageFlags::VERTEX_BUFFER)?;
        self.deletion_queue.push(move |d: &D| d.destroy_buffer(vertex_buffer));

        log::debug!("Uploaded mesh '{}' ({} vertices)", name, mesh.vertices.len());
        Ok(self.meshes.create(
            name,
            GpuMesh {
                vertex_buffer,
                vertex_count: mesh.vertex_count(),
            },
        ))
    }

    /// Upload RGBA8 pixels into a sampled image and register it
    pub fn upload_texture(&mut self, name: &str, pixels: &ImageData) -> VulkanResult<TextureKey> {
        let image = self.upload.upload_image(&self.device, pixels)?;
        self.deletion_queue.push(move |d: &D| d.destroy_image(image));

        let view = self
            .device
            .create_image_view(image.image, image.format, vk::ImageAspectFlags::COLOR)?;
        self.deletion_queue.push(move |d: &D| d.destroy_image_view(view));

        log::debug!("Uploaded texture '{}' ({}x{})", name, pixels.width, pixels.height);
        Ok(self.textures.create(name, GpuTexture { image, view }))
    }

    /// Append a renderable; draw order is insertion order
    pub fn add_renderable(&mut self, renderable: Renderable) -> VulkanResult<()> {
        if self.renderables.len() >= MAX_OBJECTS {
            return Err(VulkanError::CapacityExceeded {
                requested: self.renderables.len() + 1,
                capacity: MAX_OBJECTS,
            });
        }
        if self.meshes.resolve(renderable.mesh).is_none() {
            return Err(VulkanError::ResourceNotFound {
                name: format!("{:?}", renderable.mesh),
            });
        }
        if self.materials.resolve(renderable.material).is_none() {
            return Err(VulkanError::ResourceNotFound {
                name: format!("{:?}", renderable.material),
            });
        }
        self.renderables.push(renderable);
        Ok(())
    }

    /// Draw `alternate` wherever `primary` is used while the toggle is active
    pub fn set_alternate_material(&mut self, primary: MaterialKey, alternate: MaterialKey) {
        self.material_swap = Some((primary, alternate));
    }

    /// Flip between the primary and alternate material
    pub fn toggle_shader(&mut self) {
        if self.material_swap.is_some() {
            self.alternate_active = !self.alternate_active;
            log::info!(
                "Shader toggle: {}",
                if self.alternate_active { "alternate" } else { "default" }
            );
        }
    }

    /// Whether the alternate material is currently drawn
    pub fn alternate_active(&self) -> bool {
        self.alternate_active
    }

    /// Run one frame of the draw protocol
    pub fn draw(&mut self) -> VulkanResult<()> {
        if self.shut_down {
            return Err(VulkanError::InvalidOperation {
                reason: "draw after shutdown".to_string(),
            });
        }
        let frame_number = self.frame_number;
        let slot_index = current_slot(frame_number);
        let timeout = self.fence_timeout_ns;

        let slot = self.frames.slot_mut(frame_number);
        slot.wait_until_idle(&self.device, timeout)?;

        let image_index = self.device.acquire_next_image(slot.image_acquired, timeout)?;

        let cmd = slot.begin_recording(&self.device)?;
        let (image_acquired, render_complete, render_fence) =
            (slot.image_acquired, slot.render_complete, slot.render_fence);

        self.write_frame_data(frame_number, slot_index)?;

        let clear_values = self.clear_values(frame_number);
        self.device.cmd_begin_render_pass(cmd, image_index, &clear_values);
        let stats = self.draw_objects(cmd, slot_index)?;
        self.device.cmd_end_render_pass(cmd);
        self.device.end_command_buffer(cmd)?;

        self.device.submit(&SubmitDesc {
            command_buffer: cmd,
            wait: Some((image_acquired, vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)),
            signal: Some(render_complete),
            fence: render_fence,
        })?;
        self.frames.slot_mut(frame_number).mark_submitted()?;

        self.device.present(image_index, render_complete)?;

        self.frame_number += 1;
        self.stats = FrameStats {
            frames_drawn: self.frame_number,
            ..stats
        };
        log::trace!(
            "Frame {} (slot {}, image {}): {} draws, {} pipeline binds, {} vertex binds",
            frame_number,
            slot_index,
            image_index,
            stats.draw_calls,
            stats.pipeline_binds,
            stats.vertex_buffer_binds
        );
        Ok(())
    }

    /// Global data written for `frame_number`
    pub fn frame_global_data(&self, frame_number: u64) -> GpuGlobalData {
        GpuGlobalData {
            camera: self.camera.gpu_data(self.device.surface_extent()),
            scene: GpuSceneData::for_frame(frame_number),
        }
    }

    fn write_frame_data(&self, frame_number: u64, slot_index: usize) -> VulkanResult<()> {
        let global = self.frame_global_data(frame_number);
        self.device.write_buffer(
            &self.global_buffer,
            self.global_region.offset(slot_index),
            bytemuck::bytes_of(&global),
        )?;

        if self.renderables.is_empty() {
            return Ok(());
        }
        let objects: Vec<GpuObjectData> = self
            .renderables
            .iter()
            .map(|r| GpuObjectData::new(&r.transform, r.color))
            .collect();
        self.device.write_buffer(
            &self.object_buffer,
            self.object_region.offset(slot_index),
            bytemuck::cast_slice(&objects),
        )
    }

    fn clear_values(&self, frame_number: u64) -> [vk::ClearValue; 2] {
        #[allow(clippy::cast_precision_loss)]
        let flash = if self.clear_color_flash {
            (frame_number as f32 / 120.0).sin().abs()
        } else {
            0.0
        };
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, flash, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ]
    }

    fn effective_material(&self, key: MaterialKey) -> MaterialKey {
        match self.material_swap {
            Some((primary, alternate)) if self.alternate_active && key == primary => alternate,
            _ => key,
        }
    }

    /// Greedy rebind: state changes only when it differs from the previous renderable
    fn draw_objects(&self, cmd: vk::CommandBuffer, slot_index: usize) -> VulkanResult<FrameStats> {
        let dynamic_offsets = [
            self.global_region.dynamic_offset(slot_index)?,
            self.object_region.dynamic_offset(slot_index)?,
        ];
        let mut stats = FrameStats::default();
        let mut bound_material: Option<MaterialKey> = None;
        let mut bound_mesh: Option<MeshKey> = None;

        for (index, renderable) in self.renderables.iter().enumerate() {
            let material_key = self.effective_material(renderable.material);
            if bound_material != Some(material_key) {
                let material = self
                    .materials
                    .resolve(material_key)
                    .ok_or_else(|| VulkanError::ResourceNotFound {
                        name: format!("{:?}", material_key),
                    })?;
                self.device.cmd_bind_pipeline(cmd, material.pipeline);
                self.device
                    .cmd_bind_descriptor_set(cmd, material.layout, self.descriptor_set, &dynamic_offsets);
                stats.pipeline_binds += 1;
                bound_material = Some(material_key);
            }

            let mesh = self
                .meshes
                .resolve(renderable.mesh)
                .ok_or_else(|| VulkanError::ResourceNotFound {
                    name: format!("{:?}", renderable.mesh),
                })?;
            if bound_mesh != Some(renderable.mesh) {
                self.device.cmd_bind_vertex_buffer(cmd, mesh.vertex_buffer.buffer);
                stats.vertex_buffer_binds += 1;
                bound_mesh = Some(renderable.mesh);
            }

            // first_instance selects the object record in the storage buffer
            self.device.cmd_draw(cmd, mesh.vertex_count, index as u32);
            stats.draw_calls += 1;
        }
        Ok(stats)
    }

    /// Wait for all in-flight frames, then run the deletion queue
    ///
    /// Runs at most once; later calls return `Ok(())`. If the wait fails the
    /// queue is left unflushed rather than freeing memory the GPU may still use.
    pub fn shutdown(&mut self) -> VulkanResult<()> {
        if self.shut_down {
            return Ok(());
        }
        self.shut_down = true;

        let pending: Vec<vk::Fence> = self.frames.pending_fences().collect();
        for fence in pending {
            self.device.wait_for_fence(fence, self.fence_timeout_ns)?;
        }
        self.device.wait_idle()?;
        self.frames.mark_all_idle();

        log::info!(
            "Shutting down after {} frames; releasing {} resource group(s)",
            self.frame_number,
            self.deletion_queue.len()
        );
        self.deletion_queue.flush(&self.device);
        Ok(())
    }

    /// Frames drawn so far
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Counters of the most recent frame
    pub fn stats(&self) -> FrameStats {
        self.stats
    }

    /// Underlying device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Registered meshes
    pub fn meshes(&self) -> &Registry<MeshKey, GpuMesh> {
        &self.meshes
    }

    /// Registered materials
    pub fn materials(&self) -> &Registry<MaterialKey, Material> {
        &self.materials
    }

    /// Registered textures
    pub fn textures(&self) -> &Registry<TextureKey, GpuTexture> {
        &self.textures
    }

    /// Renderables in draw order
    pub fn renderables(&self) -> &[Renderable] {
        &self.renderables
    }

    /// Frame slots
    pub fn frame_slots(&self) -> &[FrameSlot] {
        self.frames.slots()
    }

    /// Pending teardown actions
    pub fn pending_deletions(&self) -> usize {
        self.deletion_queue.len()
    }

    /// Layout of the global uniform buffer
    pub fn global_region(&self) -> PaddedRegion {
        self.global_region
    }

    /// Layout of the object storage buffer
    pub fn object_region(&self) -> PaddedRegion {
        self.object_region
    }
}

impl<D: GpuDevice + 'static> Drop for RenderEngine<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            log::error!("Render engine shutdown failed: {}", e);
        }
    }
}
