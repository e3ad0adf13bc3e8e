//! Camera and the built-in demo scene

use ash::vk;

use crate::config::CameraConfig;
use crate::foundation::math::{translate_scale, vulkan_perspective, Mat4, Vec3};
use crate::render::device::GpuDevice;
use crate::render::engine::RenderEngine;
use crate::render::registry::Renderable;
use crate::render::uniform_layout::GpuCameraData;
use crate::render::{VulkanError, VulkanResult};

/// Registry name of the loaded model
pub const MODEL_MESH: &str = "model";
/// Registry name of the built-in triangle
pub const TRIANGLE_MESH: &str = "triangle";
/// Registry name of the lit material
pub const DEFAULT_MATERIAL: &str = "defaultmesh";
/// Registry name of the flat-colour material swapped in by the shader toggle
pub const ALTERNATE_MATERIAL: &str = "flatmesh";

/// Scale applied to every grid triangle
const GRID_SCALE: f32 = 0.2;

/// Fixed perspective camera
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    /// World-space position; the view matrix is a pure translation by it
    pub position: Vec3,
    /// Vertical field of view in degrees
    pub fov_degrees: f32,
    /// Near clip plane
    pub near: f32,
    /// Far clip plane
    pub far: f32,
}

impl Camera {
    /// View matrix
    pub fn view(&self) -> Mat4 {
        Mat4::new_translation(&self.position)
    }

    /// Projection matrix for a surface of `extent`
    pub fn projection(&self, extent: vk::Extent2D) -> Mat4 {
        #[allow(clippy::cast_precision_loss)]
        let aspect = extent.width as f32 / extent.height.max(1) as f32;
        vulkan_perspective(aspect, self.fov_degrees, self.near, self.far)
    }

    /// Matrices as laid out for the shaders
    pub fn gpu_data(&self, extent: vk::Extent2D) -> GpuCameraData {
        GpuCameraData::new(&self.view(), &self.projection(extent))
    }
}

impl From<&CameraConfig> for Camera {
    fn from(config: &CameraConfig) -> Self {
        Self {
            position: Vec3::from(config.position),
            fov_degrees: config.fov_degrees,
            near: config.near,
            far: config.far,
        }
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::from(&CameraConfig::default())
    }
}

/// Populate the engine with the model at the origin and a grid of triangles
///
/// The grid spans `-half_extent..=half_extent` on X and Z. Meshes and the
/// material are looked up by name and must already be registered. Returns the
/// number of renderables added.
pub fn init_scene<D: GpuDevice + 'static>(engine: &mut RenderEngine<D>, half_extent: i32) -> VulkanResult<usize> {
    let lookup_mesh = |name: &str| {
        engine.meshes().get(name).ok_or_else(|| VulkanError::ResourceNotFound {
            name: name.to_string(),
        })
    };
    let model = lookup_mesh(MODEL_MESH)?;
    let triangle = lookup_mesh(TRIANGLE_MESH)?;
    let material = engine
        .materials()
        .get(DEFAULT_MATERIAL)
        .ok_or_else(|| VulkanError::ResourceNotFound {
            name: DEFAULT_MATERIAL.to_string(),
        })?;

    let before = engine.renderables().len();
    engine.add_renderable(Renderable::new(model, material, Mat4::identity()))?;

    for x in -half_extent..=half_extent {
        for y in -half_extent..=half_extent {
            #[allow(clippy::cast_precision_loss)]
            let transform = translate_scale(Vec3::new(x as f32, 0.0, y as f32), GRID_SCALE);
            engine.add_renderable(Renderable::new(triangle, material, transform))?;
        }
    }

    let added = engine.renderables().len() - before;
    log::info!("Scene populated with {} renderables", added);
    Ok(added)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_camera_matrices() {
        let camera = Camera::default();
        let view = camera.view();
        assert_relative_eq!(view[(1, 3)], -6.0);
        assert_relative_eq!(view[(2, 3)], -10.0);

        let proj = camera.projection(vk::Extent2D { width: 720, height: 460 });
        assert!(proj[(1, 1)] < 0.0);

        let data = camera.gpu_data(vk::Extent2D { width: 720, height: 460 });
        let expected: [[f32; 4]; 4] = (proj * view).into();
        assert_eq!(data.view_proj, expected);
    }
}
