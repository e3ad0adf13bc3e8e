//! Immediate upload context
//!
//! A one-shot submission path, separate from the frame slots, for moving data
//! from host-visible staging buffers into device-local buffers and images. Every
//! submission blocks until its fence signals, so the staging buffer used inside
//! the recorded commands can be destroyed as soon as the call returns.

use ash::vk;

use crate::render::deletion_queue::DeletionQueue;
use crate::render::device::{AllocatedBuffer, AllocatedImage, GpuDevice, MemoryLocation, SubmitDesc};
use crate::render::texture::ImageData;
use crate::render::{VulkanError, VulkanResult};

/// Command pool, buffer and fence reserved for synchronous uploads
#[derive(Debug)]
pub struct UploadContext {
    upload_fence: vk::Fence,
    command_pool: vk::CommandPool,
    command_buffer: vk::CommandBuffer,
    timeout_ns: u64,
}

/// A failed immediate submission
struct SubmitFailure {
    error: VulkanError,
    /// The recorded commands may still be executing
    in_flight: bool,
}

impl SubmitFailure {
    /// Run `release` only if the GPU can no longer touch the resources
    fn release<F: FnOnce()>(self, release: F) -> VulkanError {
        if self.in_flight {
            log::error!("Upload abandoned while in flight ({}); leaking its buffers", self.error);
        } else {
            release();
        }
        self.error
    }
}

impl UploadContext {
    /// Create the upload objects and register their teardown
    pub fn new<D: GpuDevice + 'static>(
        device: &D,
        deletion_queue: &mut DeletionQueue<D>,
        timeout_ns: u64,
    ) -> VulkanResult<Self> {
        let upload_fence = device.create_fence(false)?;
        deletion_queue.push(move |d: &D| d.destroy_fence(upload_fence));

        let command_pool = device.create_command_pool()?;
        deletion_queue.push(move |d: &D| d.destroy_command_pool(command_pool));
        let command_buffer = device.allocate_command_buffer(command_pool)?;

        Ok(Self {
            upload_fence,
            command_pool,
            command_buffer,
            timeout_ns,
        })
    }

    /// Record with `record`, submit, and block until the GPU has finished
    ///
    /// On return the fence is unsignaled and the pool reset, ready for the next
    /// call. A wait that exceeds the timeout is returned as an error and leaves
    /// the context unusable.
    pub fn immediate_submit<D, F>(&self, device: &D, record: F) -> VulkanResult<()>
    where
        D: GpuDevice,
        F: FnOnce(&D, vk::CommandBuffer),
    {
        self.submit_blocking(device, record).map_err(|failure| failure.error)
    }

    fn submit_blocking<D, F>(&self, device: &D, record: F) -> Result<(), SubmitFailure>
    where
        D: GpuDevice,
        F: FnOnce(&D, vk::CommandBuffer),
    {
        let not_submitted = |error| SubmitFailure { error, in_flight: false };

        let cmd = self.command_buffer;
        device.begin_command_buffer(cmd).map_err(not_submitted)?;
        record(device, cmd);
        device.end_command_buffer(cmd).map_err(not_submitted)?;

        device
            .submit(&SubmitDesc {
                command_buffer: cmd,
                wait: None,
                signal: None,
                fence: self.upload_fence,
            })
            .map_err(not_submitted)?;

        device
            .wait_for_fence(self.upload_fence, self.timeout_ns)
            .map_err(|error| SubmitFailure { error, in_flight: true })?;

        // The copy has completed; failures from here on leave nothing in flight.
        device.reset_fence(self.upload_fence).map_err(not_submitted)?;
        device.reset_command_pool(self.command_pool).map_err(not_submitted)
    }

    /// Copy `data` into a new device-local buffer with `usage`
    ///
    /// The staging buffer is destroyed before returning. If the copy is still
    /// in flight when the wait fails, both buffers are leaked instead.
    /// The returned buffer belongs to the caller.
    pub fn upload_buffer<D: GpuDevice>(
        &self,
        device: &D,
        data: &[u8],
        usage: vk::BufferUsageFlags,
    ) -> VulkanResult<AllocatedBuffer> {
        let size = data.len() as vk::DeviceSize;

        let staging = device.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryLocation::CpuToGpu)?;
        let target = device.write_buffer(&staging, 0, data).and_then(|()| {
            device.create_buffer(
                size,
                usage | vk::BufferUsageFlags::TRANSFER_DST,
                MemoryLocation::GpuOnly,
            )
        });
        let target = match target {
            Ok(target) => target,
            Err(e) => {
                device.destroy_buffer(staging);
                return Err(e);
            }
        };

        self.submit_blocking(device, |d, cmd| {
            d.cmd_copy_buffer(cmd, staging.buffer, target.buffer, size);
        })
        .map_err(|failure| {
            failure.release(|| {
                device.destroy_buffer(target);
                device.destroy_buffer(staging);
            })
        })?;
        device.destroy_buffer(staging);

        log::debug!("Uploaded {} bytes into buffer {:?}", size, target.buffer);
        Ok(target)
    }

    /// Copy RGBA8 pixels into a new sampled image in `SHADER_READ_ONLY_OPTIMAL`
    ///
    /// The copy is bracketed by two layout transitions:
    /// `UNDEFINED -> TRANSFER_DST_OPTIMAL` and
    /// `TRANSFER_DST_OPTIMAL -> SHADER_READ_ONLY_OPTIMAL`.
    pub fn upload_image<D: GpuDevice>(&self, device: &D, pixels: &ImageData) -> VulkanResult<AllocatedImage> {
        let size = pixels.data.len() as vk::DeviceSize;
        let extent = pixels.extent();

        let staging = device.create_buffer(size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryLocation::CpuToGpu)?;
        let image = device.write_buffer(&staging, 0, &pixels.data).and_then(|()| {
            device.create_image(
                extent,
                ImageData::FORMAT,
                vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            )
        });
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                device.destroy_buffer(staging);
                return Err(e);
            }
        };

        self.submit_blocking(device, |d, cmd| {
            d.cmd_transition_image(
                cmd,
                image.image,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            d.cmd_copy_buffer_to_image(cmd, staging.buffer, image.image, extent);
            d.cmd_transition_image(
                cmd,
                image.image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            );
        })
        .map_err(|failure| {
            failure.release(|| {
                device.destroy_image(image);
                device.destroy_buffer(staging);
            })
        })?;
        device.destroy_buffer(staging);

        log::debug!("Uploaded {}x{} image", pixels.width, pixels.height);
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::mock::{Call, MockDevice};
    use crate::render::VulkanError;

    fn context(device: &MockDevice, queue: &mut DeletionQueue<MockDevice>) -> UploadContext {
        UploadContext::new(device, queue, 1_000_000_000).unwrap()
    }

    #[test]
    fn test_immediate_submit_protocol() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new();
        let upload = context(&device, &mut queue);
        device.clear_calls();

        upload.immediate_submit(&device, |_, _| {}).unwrap();
        let calls = device.calls();
        assert!(matches!(calls[0], Call::BeginCommandBuffer(_)));
        assert!(matches!(calls[1], Call::EndCommandBuffer(_)));
        assert!(matches!(calls[2], Call::Submit { .. }));
        assert!(matches!(calls[3], Call::WaitForFence(_)));
        assert!(matches!(calls[4], Call::ResetFence(_)));
        assert!(matches!(calls[5], Call::ResetCommandPool(_)));

        // Re-armed: a second submit works the same way.
        upload.immediate_submit(&device, |_, _| {}).unwrap();
        queue.flush(&device);
    }

    #[test]
    fn test_staging_destroyed_before_return() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new();
        let upload = context(&device, &mut queue);
        device.clear_calls();

        let data = [7u8; 132];
        let target = upload
            .upload_buffer(&device, &data, vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap();

        let calls = device.calls();
        let staging = match calls[0] {
            Call::CreateBuffer(buffer) => buffer,
            ref other => panic!("expected staging creation, got {:?}", other),
        };
        let copy = calls
            .iter()
            .position(|c| matches!(c, Call::CopyBuffer { src, dst, size: 132 } if *src == staging && *dst == target.buffer))
            .unwrap();
        let wait = calls.iter().position(|c| matches!(c, Call::WaitForFence(_))).unwrap();
        let destroy = calls.iter().position(|c| *c == Call::DestroyBuffer(staging)).unwrap();
        assert!(copy < wait && wait < destroy);
        assert_eq!(calls.last(), Some(&Call::DestroyBuffer(staging)));

        // Only the target buffer survives.
        assert_eq!(device.live_allocations(), 1);
        device.destroy_buffer(target);
        queue.flush(&device);
    }

    #[test]
    fn test_image_upload_barriers() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new();
        let upload = context(&device, &mut queue);
        device.clear_calls();

        let pixels = ImageData::solid_color(2, 2, [255; 4]);
        let image = upload.upload_image(&device, &pixels).unwrap();

        let recorded: Vec<Call> = device
            .calls()
            .into_iter()
            .filter(|c| matches!(c, Call::TransitionImage { .. } | Call::CopyBufferToImage { .. }))
            .collect();
        assert_eq!(recorded.len(), 3);
        assert_eq!(
            recorded[0],
            Call::TransitionImage {
                old: vk::ImageLayout::UNDEFINED,
                new: vk::ImageLayout::TRANSFER_DST_OPTIMAL
            }
        );
        assert!(matches!(recorded[1], Call::CopyBufferToImage { image: i, .. } if i == image.image));
        assert_eq!(
            recorded[2],
            Call::TransitionImage {
                old: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
            }
        );
        assert_eq!(image.format, vk::Format::R8G8B8A8_SRGB);
        assert_eq!(device.live_allocations(), 1);

        device.destroy_image(image);
        queue.flush(&device);
    }

    #[test]
    fn test_hung_upload_leaks_in_flight_buffers() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new();
        let upload = context(&device, &mut queue);
        device.clear_calls();
        device.hang_fences(true);

        let err = upload
            .upload_buffer(&device, &[1, 2, 3, 4], vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap_err();
        assert!(matches!(err, VulkanError::Timeout { .. }));

        let calls = device.calls();
        let wait = calls.iter().position(|c| matches!(c, Call::WaitForFence(_))).unwrap();
        assert!(!calls[wait..].iter().any(|c| matches!(c, Call::DestroyBuffer(_))));
        assert_eq!(device.live_allocations(), 2);
        queue.flush(&device);
    }

    #[test]
    fn test_hung_image_upload_leaks_in_flight_image() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new();
        let upload = context(&device, &mut queue);
        device.clear_calls();
        device.hang_fences(true);

        let pixels = ImageData::solid_color(2, 2, [255; 4]);
        assert!(upload.upload_image(&device, &pixels).is_err());
        assert_eq!(
            device.count(|c| matches!(c, Call::DestroyBuffer(_) | Call::DestroyImage(_))),
            0
        );
        assert_eq!(device.live_allocations(), 2);
        queue.flush(&device);
    }

    #[test]
    fn test_rejected_submit_frees_memory() {
        let device = MockDevice::new();
        let mut queue = DeletionQueue::new();
        let upload = context(&device, &mut queue);
        device.fail_submits(true);

        let err = upload
            .upload_buffer(&device, &[1, 2, 3, 4], vk::BufferUsageFlags::VERTEX_BUFFER)
            .unwrap_err();
        assert!(matches!(err, VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)));
        assert_eq!(device.count(|c| matches!(c, Call::WaitForFence(_))), 0);
        assert_eq!(device.live_allocations(), 0);
        queue.flush(&device);
    }
}
