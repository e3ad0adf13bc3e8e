//! Name-keyed resource registries
//!
//! Meshes, materials and textures are stored in generational arenas and found
//! by name through a side map. Renderables hold the arena keys, never the
//! resources, so a stale key resolves to `None` instead of dangling.

use std::collections::HashMap;

use ash::vk;
use slotmap::{new_key_type, Key, SlotMap};

use crate::foundation::math::Mat4;
use crate::render::device::{AllocatedBuffer, AllocatedImage};

new_key_type! {
    /// Key of a registered mesh
    pub struct MeshKey;
    /// Key of a registered material
    pub struct MaterialKey;
    /// Key of a registered texture
    pub struct TextureKey;
}

/// Arena of `V` values addressable by key or by name
#[derive(Debug)]
pub struct Registry<K: Key, V> {
    items: SlotMap<K, V>,
    names: HashMap<String, K>,
}

impl<K: Key, V> Registry<K, V> {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            items: SlotMap::with_key(),
            names: HashMap::new(),
        }
    }

    /// Store `value` under `name`, replacing any previous binding of the name
    ///
    /// A replaced value stays in the arena so keys already handed out keep
    /// resolving; only the name moves.
    pub fn create(&mut self, name: impl Into<String>, value: V) -> K {
        let name = name.into();
        let key = self.items.insert(value);
        if self.names.insert(name.clone(), key).is_some() {
            log::warn!("Registry name '{}' rebound to a new resource", name);
        }
        key
    }

    /// Look up the key bound to `name`
    pub fn get(&self, name: &str) -> Option<K> {
        self.names.get(name).copied()
    }

    /// Resolve a key to its value
    pub fn resolve(&self, key: K) -> Option<&V> {
        self.items.get(key)
    }

    /// Look up a value by name
    pub fn get_by_name(&self, name: &str) -> Option<&V> {
        self.get(name).and_then(|key| self.items.get(key))
    }

    /// Number of stored values
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// True when nothing is stored
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterate over every stored value
    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> + '_ {
        self.items.iter()
    }
}

impl<K: Key, V> Default for Registry<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pipeline plus the layout it was built against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Material {
    /// Graphics pipeline
    pub pipeline: vk::Pipeline,
    /// Layout used to bind descriptor sets
    pub layout: vk::PipelineLayout,
}

/// An uploaded vertex buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuMesh {
    /// Device-local vertex buffer
    pub vertex_buffer: AllocatedBuffer,
    /// Number of vertices to draw
    pub vertex_count: u32,
}

/// An uploaded sampled image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpuTexture {
    /// Device-local image in `SHADER_READ_ONLY_OPTIMAL`
    pub image: AllocatedImage,
    /// Colour view over the image
    pub view: vk::ImageView,
}

/// One drawable instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Renderable {
    /// Mesh to draw
    pub mesh: MeshKey,
    /// Material to draw it with
    pub material: MaterialKey,
    /// Model matrix
    pub transform: Mat4,
    /// Tint colour
    pub color: [f32; 4],
}

impl Renderable {
    /// Renderable with a white tint
    pub fn new(mesh: MeshKey, material: MaterialKey, transform: Mat4) -> Self {
        Self {
            mesh,
            material,
            transform,
            color: [1.0; 4],
        }
    }
}
