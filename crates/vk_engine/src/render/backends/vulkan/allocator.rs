//! Allocator facade over vk-mem
//!
//! Buffers and images are created together with their backing memory and
//! handed out as plain-data handles. The `vk_mem::Allocation` objects stay in a
//! slot map inside the facade, keyed by the handle's [`AllocationKey`], so the
//! handles can be copied into deletion-queue closures freely.

use std::cell::RefCell;

use ash::{vk, Device, Instance};
use slotmap::SlotMap;
use vk_mem::Alloc;

use crate::render::device::{AllocatedBuffer, AllocatedImage, AllocationKey, MemoryLocation};
use crate::render::{VulkanError, VulkanResult};

/// VMA reports a missing memory type as `ERROR_FEATURE_NOT_PRESENT`
fn allocation_error(result: vk::Result) -> VulkanError {
    match result {
        vk::Result::ERROR_FEATURE_NOT_PRESENT => VulkanError::NoSuitableMemoryType,
        other => VulkanError::Api(other),
    }
}

/// Host byte range `(start, len)` of a write, checked against the buffer size
fn write_range(buffer_size: vk::DeviceSize, offset: vk::DeviceSize, len: usize) -> VulkanResult<(usize, usize)> {
    let overflow = || VulkanError::InvalidOperation {
        reason: format!(
            "write of {} bytes at offset {} overflows {}-byte buffer",
            len, offset, buffer_size
        ),
    };
    let end = offset.checked_add(len as vk::DeviceSize).ok_or_else(overflow)?;
    if end > buffer_size {
        return Err(overflow());
    }
    let start = usize::try_from(offset).map_err(|_| overflow())?;
    Ok((start, len))
}

/// Owner of all buffer and image memory
pub struct GpuAllocator {
    allocator: vk_mem::Allocator,
    allocations: RefCell<SlotMap<AllocationKey, vk_mem::Allocation>>,
}

impl GpuAllocator {
    /// Create the allocator for a device
    pub fn new(instance: &Instance, device: &Device, physical_device: vk::PhysicalDevice) -> VulkanResult<Self> {
        let create_info = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device);
        let allocator = vk_mem::Allocator::new(create_info).map_err(VulkanError::Api)?;
        log::debug!("Created vk-mem allocator");
        Ok(Self {
            allocator,
            allocations: RefCell::new(SlotMap::with_key()),
        })
    }

    fn allocation_info(location: MemoryLocation) -> vk_mem::AllocationCreateInfo {
        match location {
            MemoryLocation::GpuOnly => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            MemoryLocation::CpuToGpu => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
        }
    }

    /// Create a buffer with memory from `location`
    pub fn create_buffer(
        &self,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> VulkanResult<AllocatedBuffer> {
        if size == 0 {
            return Err(VulkanError::InvalidOperation {
                reason: "zero-sized buffer".to_string(),
            });
        }
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let (buffer, allocation) = unsafe {
            self.allocator
                .create_buffer(&buffer_info, &Self::allocation_info(location))
                .map_err(allocation_error)?
        };
        let allocation = self.allocations.borrow_mut().insert(allocation);
        log::trace!("Allocated buffer {:?}: {} bytes, {:?}", buffer, size, location);
        Ok(AllocatedBuffer {
            buffer,
            allocation,
            size,
        })
    }

    /// Destroy a buffer and free its memory
    pub fn destroy_buffer(&self, buffer: AllocatedBuffer) {
        match self.allocations.borrow_mut().remove(buffer.allocation) {
            Some(mut allocation) => unsafe { self.allocator.destroy_buffer(buffer.buffer, &mut allocation) },
            None => log::warn!("Buffer {:?} was already destroyed", buffer.buffer),
        }
    }

    /// Copy `data` into a host-visible buffer at `offset`
    ///
    /// The written range is flushed so the device sees it on non-coherent memory.
    pub fn write_buffer(&self, buffer: &AllocatedBuffer, offset: vk::DeviceSize, data: &[u8]) -> VulkanResult<()> {
        let (start, len) = write_range(buffer.size, offset, data.len())?;
        let mut allocations = self.allocations.borrow_mut();
        let allocation = allocations
            .get_mut(buffer.allocation)
            .ok_or_else(|| VulkanError::InvalidOperation {
                reason: format!("write to destroyed buffer {:?}", buffer.buffer),
            })?;

        unsafe {
            let mapped = self.allocator.map_memory(allocation).map_err(VulkanError::Api)?;
            std::ptr::copy_nonoverlapping(data.as_ptr(), mapped.add(start), len);
            self.allocator.unmap_memory(allocation);
        }
        self.allocator
            .flush_allocation(allocation, start, len)
            .map_err(VulkanError::Api)
    }

    /// Create a single-mip 2D image in device-local memory
    pub fn create_image(
        &self,
        extent: vk::Extent3D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
    ) -> VulkanResult<AllocatedImage> {
        let image_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(extent)
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);
        let (image, allocation) = unsafe {
            self.allocator
                .create_image(&image_info, &Self::allocation_info(MemoryLocation::GpuOnly))
                .map_err(allocation_error)?
        };
        let allocation = self.allocations.borrow_mut().insert(allocation);
        log::trace!("Allocated image {:?}: {}x{} {:?}", image, extent.width, extent.height, format);
        Ok(AllocatedImage {
            image,
            allocation,
            extent,
            format,
        })
    }

    /// Destroy an image and free its memory
    pub fn destroy_image(&self, image: AllocatedImage) {
        match self.allocations.borrow_mut().remove(image.allocation) {
            Some(mut allocation) => unsafe { self.allocator.destroy_image(image.image, &mut allocation) },
            None => log::warn!("Image {:?} was already destroyed", image.image),
        }
    }

    /// Allocations not yet freed
    pub fn live_allocations(&self) -> usize {
        self.allocations.borrow().len()
    }
}

impl Drop for GpuAllocator {
    fn drop(&mut self) {
        let leaked = self.live_allocations();
        if leaked > 0 {
            log::warn!("Destroying allocator with {} live allocation(s)", leaked);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_memory_type_is_reported_distinctly() {
        assert!(matches!(
            allocation_error(vk::Result::ERROR_FEATURE_NOT_PRESENT),
            VulkanError::NoSuitableMemoryType
        ));
        assert!(matches!(
            allocation_error(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            VulkanError::Api(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
        ));
    }

    #[test]
    fn test_write_range_matches_flushed_region() {
        assert_eq!(write_range(1024, 512, 272).unwrap(), (512, 272));
        assert_eq!(write_range(1024, 0, 1024).unwrap(), (0, 1024));
        assert_eq!(write_range(1024, 1024, 0).unwrap(), (1024, 0));
    }

    #[test]
    fn test_write_range_rejects_overflow() {
        assert!(matches!(
            write_range(1024, 1000, 25),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(matches!(
            write_range(u64::MAX, u64::MAX, 1),
            Err(VulkanError::InvalidOperation { .. })
        ));
    }
}
