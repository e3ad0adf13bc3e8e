//! Backend implementations for the render core
//!
//! Only Vulkan is provided.

/// Vulkan rendering backend implementation
pub mod vulkan;
