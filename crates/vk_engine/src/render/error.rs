//! Render error types
//!
//! Every failure in the render core is fatal to the run loop: nothing here is
//! retried, errors propagate with `?` up to the application.

use ash::vk;
use thiserror::Error;

/// Vulkan-specific error types
#[derive(Error, Debug)]
pub enum VulkanError {
    /// General Vulkan API error with result code
    #[error("Vulkan API error: {0:?}")]
    Api(vk::Result),

    /// A bounded wait on a fence or on image acquisition expired
    #[error("Timed out waiting for {operation}")]
    Timeout {
        /// What was being waited on
        operation: &'static str,
    },

    /// The swapchain no longer matches the surface
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,

    /// Invalid operation attempted
    #[error("Invalid operation: {reason}")]
    InvalidOperation {
        /// Description of why the operation is invalid
        reason: String,
    },

    /// Named resource could not be found in a registry
    #[error("Resource not found: {name}")]
    ResourceNotFound {
        /// Registry name that was looked up
        name: String,
    },

    /// A fixed-capacity GPU region would overflow
    #[error("Capacity exceeded: requested {requested}, capacity {capacity}")]
    CapacityExceeded {
        /// Number of elements requested
        requested: usize,
        /// Number of elements the region can hold
        capacity: usize,
    },

    /// Vulkan context initialization failed
    #[error("Initialization failed: {0}")]
    InitializationFailed(String),

    /// No suitable memory type found for allocation
    #[error("No suitable memory type found")]
    NoSuitableMemoryType,

    /// Asset or shader file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Asset file could not be decoded
    #[error("Asset load failed: {0}")]
    AssetLoad(String),
}

impl VulkanError {
    /// Map a raw result code, singling out the codes the frame loop reports distinctly
    pub fn from_vk(result: vk::Result, operation: &'static str) -> Self {
        match result {
            vk::Result::TIMEOUT | vk::Result::NOT_READY => Self::Timeout { operation },
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SwapchainOutOfDate,
            other => Self::Api(other),
        }
    }
}

/// Result type for Vulkan operations
pub type VulkanResult<T> = Result<T, VulkanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_codes_map_to_timeout() {
        assert!(matches!(
            VulkanError::from_vk(vk::Result::TIMEOUT, "fence"),
            VulkanError::Timeout { operation: "fence" }
        ));
        assert!(matches!(
            VulkanError::from_vk(vk::Result::NOT_READY, "acquire"),
            VulkanError::Timeout { .. }
        ));
    }

    #[test]
    fn test_out_of_date_is_distinct() {
        assert!(matches!(
            VulkanError::from_vk(vk::Result::ERROR_OUT_OF_DATE_KHR, "present"),
            VulkanError::SwapchainOutOfDate
        ));
        assert!(matches!(
            VulkanError::from_vk(vk::Result::ERROR_DEVICE_LOST, "submit"),
            VulkanError::Api(vk::Result::ERROR_DEVICE_LOST)
        ));
    }
}
