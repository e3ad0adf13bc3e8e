//! Image decoding for texture upload

use std::path::Path;

use ash::vk;

use crate::render::{VulkanError, VulkanResult};

/// Decoded RGBA8 pixels ready for GPU upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    /// Tightly packed RGBA pixel data
    pub data: Vec<u8>,
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
}

impl ImageData {
    /// Texel format the pixels are uploaded as
    pub const FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

    /// Decode an image file into RGBA8
    pub fn from_file<P: AsRef<Path>>(path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let rgba = image::open(path)
            .map_err(|e| VulkanError::AssetLoad(format!("{}: {}", path.display(), e)))?
            .to_rgba8();
        let (width, height) = rgba.dimensions();

        log::info!("Loaded image {}x{} from {}", width, height, path.display());
        Ok(Self {
            data: rgba.into_raw(),
            width,
            height,
        })
    }

    /// A single-colour image
    pub fn solid_color(width: u32, height: u32, color: [u8; 4]) -> Self {
        let pixel_count = width as usize * height as usize;
        Self {
            data: color.repeat(pixel_count),
            width,
            height,
        }
    }

    /// Extent of mip 0
    pub fn extent(&self) -> vk::Extent3D {
        vk::Extent3D {
            width: self.width,
            height: self.height,
            depth: 1,
        }
    }
}
