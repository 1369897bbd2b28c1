//! Error type and `Result` alias for the Vulkan runtime.
//!
//! Centralizes Vulkan API errors, allocator errors, I/O errors from shader
//! and pipeline-cache loading, and the capability failures the device core
//! can report. No panics cross the public API; every fallible operation
//! returns this crate's [`Result`].

use ash::vk;
use thiserror::Error;

/// Error type for the Vulkan runtime.
#[derive(Error, Debug)]
pub enum RenderError {
    /// An error originating directly from a Vulkan API call.
    #[error("Vulkan API error: {0}")]
    VkResult(vk::Result),

    /// An error from the VMA memory allocator.
    #[error("Allocator error: {0}")]
    Allocation(vk::Result),

    /// A standard I/O error (shader modules, pipeline caches, textures).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A component failed to initialize.
    #[error("Initialization error: {0}")]
    Initialization(String),

    /// Creation of a specific Vulkan resource failed.
    #[error("Failed to create resource '{resource_type}': {message}")]
    ResourceCreation {
        /// The kind of resource ("Buffer", "Image", "Swapchain", ...).
        resource_type: String,
        /// What went wrong.
        message: String,
    },

    /// A required capability (queue family, format feature, usage bit) is
    /// not present on the selected device.
    #[error("Required feature not present: {0}")]
    FeatureNotPresent(String),

    /// A requested format is not supported for the requested use.
    #[error("Format not supported: {0}")]
    FormatNotSupported(String),

    /// Mapping host-visible memory failed.
    #[error("Memory map failed: {0}")]
    MemoryMapFailed(String),

    /// The surface was lost and must be recreated.
    #[error("Vulkan surface lost, needs recreation")]
    SurfaceLost,

    /// The swapchain is out of date or suboptimal and must be recreated.
    #[error("Vulkan swapchain is out of date, needs recreation")]
    SwapchainOutOfDate,

    /// An error occurred while loading or parsing a shader module.
    #[error("Shader loading error: {0}")]
    ShaderLoading(String),

    /// An error occurred while decoding a texture file.
    #[error("Texture loading error: {0}")]
    TextureLoading(String),

    /// An error occurred during pipeline creation.
    #[error("Pipeline creation error: {0}")]
    PipelineCreation(String),
}

impl From<vk::Result> for RenderError {
    /// Converts a raw `vk::Result`, special-casing the recoverable
    /// swapchain conditions into their named variants.
    fn from(err: vk::Result) -> Self {
        match err {
            vk::Result::ERROR_OUT_OF_DATE_KHR => RenderError::SwapchainOutOfDate,
            vk::Result::ERROR_SURFACE_LOST_KHR => RenderError::SurfaceLost,
            other => RenderError::VkResult(other),
        }
    }
}

impl From<image::ImageError> for RenderError {
    fn from(err: image::ImageError) -> Self {
        RenderError::TextureLoading(err.to_string())
    }
}

/// `Result` alias used throughout the Vulkan runtime.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_date_maps_to_named_variant() {
        let err: RenderError = vk::Result::ERROR_OUT_OF_DATE_KHR.into();
        assert!(matches!(err, RenderError::SwapchainOutOfDate));
    }

    #[test]
    fn surface_lost_maps_to_named_variant() {
        let err: RenderError = vk::Result::ERROR_SURFACE_LOST_KHR.into();
        assert!(matches!(err, RenderError::SurfaceLost));
    }

    #[test]
    fn other_results_are_wrapped() {
        let err: RenderError = vk::Result::ERROR_DEVICE_LOST.into();
        assert!(matches!(err, RenderError::VkResult(vk::Result::ERROR_DEVICE_LOST)));
    }
}
