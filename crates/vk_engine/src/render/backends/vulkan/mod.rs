//! Vulkan backend
//!
//! Instance and device bring-up, the swapchain, a `vk-mem` allocator facade
//! and [`VulkanDevice`], the [`GpuDevice`](crate::render::GpuDevice)
//! implementation the engine drives.

/// Instance, physical device selection and logical device
pub mod context;

/// Swapchain and its image views
pub mod swapchain;

/// Buffer and image allocation through vk-mem
pub mod allocator;

/// The device the render engine runs on
pub mod device;

pub use allocator::GpuAllocator;
pub use context::{LogicalDevice, PhysicalDeviceInfo, SurfaceHandle, VulkanInstance};
pub use device::VulkanDevice;
pub use swapchain::Swapchain;
