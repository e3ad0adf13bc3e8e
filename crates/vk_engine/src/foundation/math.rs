//! Math types for 3D rendering
//!
//! Thin aliases over `nalgebra` plus the few camera helpers the renderer needs.

pub use nalgebra::{Matrix4, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Right-handed perspective projection with the Y axis flipped for Vulkan clip space
pub fn vulkan_perspective(aspect: f32, fov_y_degrees: f32, near: f32, far: f32) -> Mat4 {
    let mut proj = Mat4::new_perspective(aspect, fov_y_degrees.to_radians(), near, far);
    proj[(1, 1)] *= -1.0;
    proj
}

/// Translation followed by a uniform scale
pub fn translate_scale(translation: Vec3, scale: f32) -> Mat4 {
    Mat4::new_translation(&translation) * Mat4::new_scaling(scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_perspective_flips_y() {
        let gl = Mat4::new_perspective(1.5, 70f32.to_radians(), 0.1, 200.0);
        let vk = vulkan_perspective(1.5, 70.0, 0.1, 200.0);
        assert_relative_eq!(vk[(1, 1)], -gl[(1, 1)]);
        assert_relative_eq!(vk[(0, 0)], gl[(0, 0)]);
    }

    #[test]
    fn test_translate_scale() {
        let m = translate_scale(Vec3::new(3.0, 0.0, -2.0), 0.2);
        let p = m.transform_point(&nalgebra::Point3::new(1.0, 1.0, 1.0));
        assert_relative_eq!(p.x, 3.2);
        assert_relative_eq!(p.y, 0.2);
        assert_relative_eq!(p.z, -1.8);
    }
}
