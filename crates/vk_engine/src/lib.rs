//! # vk_engine
//!
//! A minimal Vulkan rendering core: two frames in flight, blocking staged
//! uploads, dynamic-offset uniform and storage buffers, and deterministic
//! reverse-order teardown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use vk_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::default();
//!     let mut window = Window::new(&config.application_name, 720, 460)?;
//!     let device = VulkanDevice::new(&mut window, &config)?;
//!     let mut engine = RenderEngine::new(device, &config)?;
//!     engine.upload_mesh("triangle", &Mesh::triangle())?;
//!     engine.draw()?;
//!     engine.shutdown()?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(
    clippy::module_name_repetitions,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::missing_errors_doc
)]

pub mod config;
pub mod foundation;
pub mod render;
pub mod window;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        config::{Config, EngineConfig},
        foundation::math::{Mat4, Vec3},
        render::{
            backends::vulkan::VulkanDevice, init_scene, GpuDevice, ImageData, Mesh, RenderEngine, Renderable,
            VulkanError, VulkanResult,
        },
        window::{InputActions, Window},
    };
}
