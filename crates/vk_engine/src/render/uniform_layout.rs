//! Per-frame uniform and storage layout
//!
//! Frame data lives in shared buffers split into one region per frame slot.
//! Each region starts at a multiple of the device's dynamic offset alignment,
//! so one descriptor set serves every slot and only the dynamic offsets change
//! between frames.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::foundation::math::{Mat4, Vec4};
use crate::render::{VulkanError, VulkanResult};

/// Fixed capacity of the per-frame object array
pub const MAX_OBJECTS: usize = 10_000;

/// Round `size` up to a multiple of `align`
///
/// `align` comes from device limits and is a power of two; `0` means the device
/// imposes no alignment.
pub const fn pad(size: vk::DeviceSize, align: vk::DeviceSize) -> vk::DeviceSize {
    if align == 0 {
        size
    } else {
        (size + align - 1) & !(align - 1)
    }
}

/// One shared buffer carved into `count` equally strided regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaddedRegion {
    /// Bytes of meaningful data per region
    pub element_size: vk::DeviceSize,
    /// Distance between region starts
    pub stride: vk::DeviceSize,
    /// Number of regions
    pub count: usize,
}

impl PaddedRegion {
    /// Layout `count` regions of `element_size` bytes under `align`
    pub const fn new(element_size: vk::DeviceSize, align: vk::DeviceSize, count: usize) -> Self {
        Self {
            element_size,
            stride: pad(element_size, align),
            count,
        }
    }

    /// Byte offset of region `index`
    pub const fn offset(&self, index: usize) -> vk::DeviceSize {
        self.stride * index as vk::DeviceSize
    }

    /// Bytes the backing buffer must hold
    pub const fn total_size(&self) -> vk::DeviceSize {
        self.stride * self.count as vk::DeviceSize
    }

    /// Offset of region `index` as a dynamic descriptor offset
    ///
    /// Fails if the offset does not fit the 32-bit descriptor offset.
    pub fn dynamic_offset(&self, index: usize) -> VulkanResult<u32> {
        let offset = self.offset(index);
        u32::try_from(offset).map_err(|_| VulkanError::InvalidOperation {
            reason: format!("dynamic offset {} of region {} exceeds u32", offset, index),
        })
    }

    /// Check that every region's dynamic offset is addressable
    pub fn validate_dynamic_offsets(&self) -> VulkanResult<()> {
        match self.count {
            0 => Ok(()),
            count => self.dynamic_offset(count - 1).map(|_| ()),
        }
    }
}

/// Camera matrices
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuCameraData {
    /// World to view
    pub view: [[f32; 4]; 4],
    /// View to clip
    pub proj: [[f32; 4]; 4],
    /// `proj * view`
    pub view_proj: [[f32; 4]; 4],
}

impl GpuCameraData {
    /// Pack view and projection matrices
    pub fn new(view: &Mat4, proj: &Mat4) -> Self {
        Self {
            view: (*view).into(),
            proj: (*proj).into(),
            view_proj: (proj * view).into(),
        }
    }
}

/// Environment parameters
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuSceneData {
    /// Fog colour
    pub fog_color: [f32; 4],
    /// x = min, y = max, zw unused
    pub fog_distances: [f32; 4],
    /// Ambient light colour
    pub ambient_color: [f32; 4],
    /// w is intensity
    pub sunlight_direction: [f32; 4],
    /// Sunlight colour
    pub sunlight_color: [f32; 4],
}

impl GpuSceneData {
    /// Environment for a frame; ambient colour cycles with the frame counter
    pub fn for_frame(frame_number: u64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        let framed = frame_number as f32 / 120.0;
        Self {
            ambient_color: Vec4::new(framed.sin(), 0.0, framed.cos(), 1.0).into(),
            ..Self::zeroed()
        }
    }
}

/// Everything bound at binding 0 for one frame
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuGlobalData {
    /// Camera matrices
    pub camera: GpuCameraData,
    /// Environment
    pub scene: GpuSceneData,
}

/// Per-renderable record in the object storage array
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GpuObjectData {
    /// Model matrix
    pub model: [[f32; 4]; 4],
    /// Tint colour
    pub color: [f32; 4],
}

impl GpuObjectData {
    /// Pack a transform and colour
    pub fn new(model: &Mat4, color: [f32; 4]) -> Self {
        Self {
            model: (*model).into(),
            color,
        }
    }
}

/// Byte size of a `T` as a device size
pub const fn device_size_of<T>() -> vk::DeviceSize {
    std::mem::size_of::<T>() as vk::DeviceSize
}

/// Region layout of the global buffer
pub const fn global_region(limits_align: vk::DeviceSize, slots: usize) -> PaddedRegion {
    PaddedRegion::new(device_size_of::<GpuGlobalData>(), limits_align, slots)
}

/// Region layout of the object buffer
pub const fn object_region(limits_align: vk::DeviceSize, slots: usize) -> PaddedRegion {
    PaddedRegion::new(
        device_size_of::<GpuObjectData>() * MAX_OBJECTS as vk::DeviceSize,
        limits_align,
        slots,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pad_rounds_up_to_alignment() {
        for align in [1u64, 2, 4, 16, 64, 256] {
            for size in 1u64..=600 {
                let padded = pad(size, align);
                assert!(padded >= size);
                assert_eq!(padded % align, 0);
                assert!(padded - size < align, "not the smallest multiple");
            }
        }
    }

    #[test]
    fn test_pad_identity_on_multiples_and_idempotent() {
        assert_eq!(pad(256, 256), 256);
        assert_eq!(pad(512, 64), 512);
        for size in [1u64, 80, 272, 800_000] {
            let once = pad(size, 256);
            assert_eq!(pad(once, 256), once);
        }
    }

    #[test]
    fn test_pad_zero_alignment_is_identity() {
        assert_eq!(pad(272, 0), 272);
        assert_eq!(pad(1, 0), 1);
    }

    #[test]
    fn test_region_offsets() {
        let region = PaddedRegion::new(272, 256, 2);
        assert_eq!(region.stride, 512);
        assert_eq!(region.offset(0), 0);
        assert_eq!(region.offset(1), 512);
        assert_eq!(region.total_size(), 1024);
        assert!(region.stride >= region.element_size);
        assert_eq!(region.dynamic_offset(1).unwrap(), 512);
        assert!(region.validate_dynamic_offsets().is_ok());
    }

    #[test]
    fn test_unaddressable_dynamic_offset_is_an_error() {
        let region = PaddedRegion::new(272, 1 << 32, 2);
        assert_eq!(region.dynamic_offset(0).unwrap(), 0);
        assert!(matches!(
            region.dynamic_offset(1),
            Err(VulkanError::InvalidOperation { .. })
        ));
        assert!(region.validate_dynamic_offsets().is_err());
    }

    #[test]
    fn test_gpu_record_sizes() {
        assert_eq!(std::mem::size_of::<GpuCameraData>(), 192);
        assert_eq!(std::mem::size_of::<GpuSceneData>(), 80);
        assert_eq!(std::mem::size_of::<GpuGlobalData>(), 272);
        assert_eq!(std::mem::size_of::<GpuObjectData>(), 80);
        assert_eq!(object_region(64, 2).element_size, 80 * MAX_OBJECTS as u64);
    }

    #[test]
    fn test_camera_packs_column_major() {
        let view = Mat4::new_translation(&crate::foundation::math::Vec3::new(1.0, 2.0, 3.0));
        let camera = GpuCameraData::new(&view, &Mat4::identity());
        assert_eq!(camera.view[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(camera.view_proj, camera.view);
    }
}
