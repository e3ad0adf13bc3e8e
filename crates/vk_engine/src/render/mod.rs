//! # Rendering Core
//!
//! Frame pacing, GPU uploads, per-frame shader data and teardown ordering for a
//! single-window Vulkan renderer.
//!
//! ## Architecture
//!
//! - **Device seam**: [`device::GpuDevice`] is everything the core asks of the
//!   GPU. The Vulkan backend implements it; tests use a recording fake.
//! - **Engine**: [`engine::RenderEngine`] owns every resource created on the
//!   device and runs the per-frame protocol.
//! - **Frames**: [`frame::FrameRing`] rotates two slots so CPU recording of
//!   frame `k + 1` overlaps GPU execution of frame `k`.
//! - **Uploads**: [`upload::UploadContext`] blocks on a dedicated fence so
//!   staging memory can be freed immediately.
//! - **Teardown**: [`deletion_queue::DeletionQueue`] destroys resources in
//!   reverse creation order after the final fence wait.

pub mod error;
pub mod device;
pub mod deletion_queue;
pub mod frame;
pub mod uniform_layout;
pub mod upload;
pub mod registry;
pub mod mesh;
pub mod texture;
pub mod shader;
pub mod scene;
pub mod engine;

/// Graphics backend implementations
pub mod backends;

#[cfg(test)]
pub(crate) mod mock;

pub use error::{VulkanError, VulkanResult};
pub use device::GpuDevice;
pub use engine::{FrameStats, RenderEngine};
pub use mesh::{Mesh, Vertex};
pub use registry::{MaterialKey, MeshKey, Renderable, TextureKey};
pub use scene::{init_scene, Camera};
pub use texture::ImageData;
