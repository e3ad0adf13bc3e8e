//! Vertex format and CPU-side meshes

use std::mem::{offset_of, size_of};
use std::path::Path;

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::render::device::VertexInputDescription;
use crate::render::{VulkanError, VulkanResult};

/// Interleaved vertex record
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    /// Object-space position
    pub position: [f32; 3],
    /// Object-space normal
    pub normal: [f32; 3],
    /// Vertex colour
    pub color: [f32; 3],
    /// Texture coordinate
    pub uv: [f32; 2],
}

impl Vertex {
    /// Binding 0, per-vertex, with attributes at locations 0..=3
    pub fn input_description() -> VertexInputDescription {
        let binding = vk::VertexInputBindingDescription::builder()
            .binding(0)
            .stride(size_of::<Self>() as u32)
            .input_rate(vk::VertexInputRate::VERTEX)
            .build();

        let attribute = |location: u32, format: vk::Format, offset: usize| {
            vk::VertexInputAttributeDescription::builder()
                .binding(0)
                .location(location)
                .format(format)
                .offset(offset as u32)
                .build()
        };

        VertexInputDescription {
            bindings: vec![binding],
            attributes: vec![
                attribute(0, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, position)),
                attribute(1, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, normal)),
                attribute(2, vk::Format::R32G32B32_SFLOAT, offset_of!(Self, color)),
                attribute(3, vk::Format::R32G32_SFLOAT, offset_of!(Self, uv)),
            ],
        }
    }
}

/// Vertex list ready for upload
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    /// Non-indexed triangle list
    pub vertices: Vec<Vertex>,
}

impl Mesh {
    /// The built-in green triangle
    pub fn triangle() -> Self {
        let green = [0.0, 1.0, 0.0];
        let normal = [0.0, 0.0, 1.0];
        let vertex = |position: [f32; 3], uv: [f32; 2]| Vertex {
            position,
            normal,
            color: green,
            uv,
        };
        Self {
            vertices: vec![
                vertex([1.0, 1.0, 0.0], [1.0, 1.0]),
                vertex([-1.0, 1.0, 0.0], [0.0, 1.0]),
                vertex([0.0, -1.0, 0.0], [0.5, 0.0]),
            ],
        }
    }

    /// Load every shape of an OBJ file as one triangulated, non-indexed mesh
    ///
    /// Normals double as vertex colours.
    pub fn load_from_obj<P: AsRef<Path>>(path: P) -> VulkanResult<Self> {
        let path = path.as_ref();
        let (models, _materials) = tobj::load_obj(
            path,
            &tobj::LoadOptions {
                triangulate: true,
                ..Default::default()
            },
        )
        .map_err(|e| VulkanError::AssetLoad(format!("{}: {}", path.display(), e)))?;

        let malformed = |what: &str, index: usize| {
            VulkanError::AssetLoad(format!("{}: {} index {} out of range", path.display(), what, index))
        };

        let mut vertices = Vec::new();
        for model in &models {
            let mesh = &model.mesh;
            let has_normals = !mesh.normal_indices.is_empty() || !mesh.normals.is_empty();
            let has_uvs = !mesh.texcoord_indices.is_empty() || !mesh.texcoords.is_empty();

            for (i, &index) in mesh.indices.iter().enumerate() {
                let vi = index as usize;
                let position = read::<3>(&mesh.positions, vi).ok_or_else(|| malformed("position", vi))?;

                let normal = if has_normals {
                    let ni = mesh.normal_indices.get(i).map_or(vi, |&n| n as usize);
                    read::<3>(&mesh.normals, ni).ok_or_else(|| malformed("normal", ni))?
                } else {
                    [0.0, 0.0, 1.0]
                };

                let uv = if has_uvs {
                    let ti = mesh.texcoord_indices.get(i).map_or(vi, |&t| t as usize);
                    let [u, v] = read::<2>(&mesh.texcoords, ti).ok_or_else(|| malformed("texcoord", ti))?;
                    [u, 1.0 - v]
                } else {
                    [0.0, 0.0]
                };

                vertices.push(Vertex {
                    position,
                    normal,
                    color: normal,
                    uv,
                });
            }
        }

        log::info!(
            "Loaded {} vertices from {} ({} shape(s))",
            vertices.len(),
            path.display(),
            models.len()
        );
        Ok(Self { vertices })
    }

    /// Vertex bytes as uploaded to the GPU
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.vertices)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> u32 {
        u32::try_from(self.vertices.len()).unwrap_or(u32::MAX)
    }
}

/// The `index`-th `N`-component element of a flat attribute array
fn read<const N: usize>(values: &[f32], index: usize) -> Option<[f32; N]> {
    let start = index.checked_mul(N)?;
    values.get(start..start.checked_add(N)?)?.try_into().ok()
}
