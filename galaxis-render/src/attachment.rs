//! Color and depth-stencil attachment bundles.
//!
//! An attachment pairs an [`ImageMemory`] with a default view over all its
//! layers. Transient attachments request lazily-allocated memory, which the
//! manual allocation path silently downgrades when the device has no such
//! memory type.

use std::sync::Arc;

use ash::vk;

use crate::allocator::Allocator;
use crate::device::DeviceShared;
use crate::error::{RenderError, Result};
use crate::handles::ImageView;
use crate::memory::ImageMemory;

fn attachment_view_type(layer_count: u32) -> vk::ImageViewType {
    if layer_count > 1 {
        vk::ImageViewType::TYPE_2D_ARRAY
    } else {
        vk::ImageViewType::TYPE_2D
    }
}

fn attachment_image_create_info(
    format: vk::Format,
    extent: vk::Extent2D,
    layer_count: u32,
    sample_count: vk::SampleCountFlags,
    usage: vk::ImageUsageFlags,
) -> vk::ImageCreateInfo {
    vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D { width: extent.width, height: extent.height, depth: 1 })
        .mip_levels(1)
        .array_layers(layer_count)
        .samples(sample_count)
        .usage(usage)
        .build()
}

fn attachment_memory_flags(extra_usage: vk::ImageUsageFlags) -> vk::MemoryPropertyFlags {
    let mut flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    if extra_usage.contains(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT) {
        flags |= vk::MemoryPropertyFlags::LAZILY_ALLOCATED;
    }
    flags
}

/// Aspect flags for a depth-stencil format, honoring the stencil-only
/// request and adding the stencil aspect for packed depth-stencil formats.
pub fn depth_stencil_aspect(format: vk::Format, stencil_only: bool) -> vk::ImageAspectFlags {
    if format == vk::Format::S8_UINT {
        return vk::ImageAspectFlags::STENCIL;
    }
    let mut aspect = if stencil_only {
        vk::ImageAspectFlags::STENCIL
    } else {
        vk::ImageAspectFlags::DEPTH
    };
    if matches!(
        format,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT
    ) {
        aspect |= vk::ImageAspectFlags::STENCIL;
    }
    aspect
}

/// A render-target color image with its default view.
pub struct ColorAttachment {
    image_memory: ImageMemory,
    image_view: ImageView,
}

impl ColorAttachment {
    pub fn new(
        shared: &DeviceShared,
        format: vk::Format,
        extent: vk::Extent2D,
        layer_count: u32,
        sample_count: vk::SampleCountFlags,
        extra_usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        Self::create(shared, None, None, format, extent, layer_count, sample_count, extra_usage)
    }

    pub fn new_pooled(
        shared: &DeviceShared,
        allocator: &Arc<Allocator>,
        allocation_create_info: &vk_mem::AllocationCreateInfo,
        format: vk::Format,
        extent: vk::Extent2D,
        layer_count: u32,
        sample_count: vk::SampleCountFlags,
        extra_usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        Self::create(
            shared,
            Some(allocator),
            Some(allocation_create_info),
            format,
            extent,
            layer_count,
            sample_count,
            extra_usage,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn create(
        shared: &DeviceShared,
        allocator: Option<&Arc<Allocator>>,
        allocation_create_info: Option<&vk_mem::AllocationCreateInfo>,
        format: vk::Format,
        extent: vk::Extent2D,
        layer_count: u32,
        sample_count: vk::SampleCountFlags,
        extra_usage: vk::ImageUsageFlags,
    ) -> Result<Self> {
        let create_info = attachment_image_create_info(
            format,
            extent,
            layer_count,
            sample_count,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | extra_usage,
        );

        let image_memory = match (allocator, allocation_create_info) {
            (Some(allocator), Some(info)) => {
                ImageMemory::new_pooled(shared, allocator, info, &create_info)?
            }
            _ => ImageMemory::new_manual(shared, &create_info, attachment_memory_flags(extra_usage))?,
        };
        if !image_memory.is_valid() {
            return Err(RenderError::ResourceCreation {
                resource_type: "ColorAttachment".to_string(),
                message: "image memory invalid after creation".to_string(),
            });
        }

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        };
        let image_view = ImageView::for_image(
            &shared.device,
            image_memory.image().handle(),
            attachment_view_type(layer_count),
            format,
            subresource_range,
        )?;

        Ok(ColorAttachment { image_memory, image_view })
    }

    /// Whether `format` is usable as a color attachment, optionally with
    /// blending.
    pub fn check_format_availability(
        shared: &DeviceShared,
        format: vk::Format,
        support_blend: bool,
    ) -> bool {
        let features = if support_blend {
            vk::FormatFeatureFlags::COLOR_ATTACHMENT | vk::FormatFeatureFlags::COLOR_ATTACHMENT_BLEND
        } else {
            vk::FormatFeatureFlags::COLOR_ATTACHMENT
        };
        shared
            .format_properties(format)
            .optimal_tiling_features
            .contains(features)
    }

    pub fn image(&self) -> vk::Image {
        self.image_memory.image().handle()
    }

    pub fn image_view(&self) -> vk::ImageView {
        self.image_view.handle()
    }

    pub fn descriptor_image_info(&self, sampler: vk::Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler,
            image_view: self.image_view.handle(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }
}

/// A depth-stencil image with its default view.
pub struct DepthStencilAttachment {
    image_memory: ImageMemory,
    image_view: ImageView,
}

impl DepthStencilAttachment {
    pub fn new(
        shared: &DeviceShared,
        format: vk::Format,
        extent: vk::Extent2D,
        layer_count: u32,
        sample_count: vk::SampleCountFlags,
        extra_usage: vk::ImageUsageFlags,
        stencil_only: bool,
    ) -> Result<Self> {
        let create_info = attachment_image_create_info(
            format,
            extent,
            layer_count,
            sample_count,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT | extra_usage,
        );

        let image_memory =
            ImageMemory::new_manual(shared, &create_info, attachment_memory_flags(extra_usage))?;
        if !image_memory.is_valid() {
            return Err(RenderError::ResourceCreation {
                resource_type: "DepthStencilAttachment".to_string(),
                message: "image memory invalid after creation".to_string(),
            });
        }

        let subresource_range = vk::ImageSubresourceRange {
            aspect_mask: depth_stencil_aspect(format, stencil_only),
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count,
        };
        let image_view = ImageView::for_image(
            &shared.device,
            image_memory.image().handle(),
            attachment_view_type(layer_count),
            format,
            subresource_range,
        )?;

        Ok(DepthStencilAttachment { image_memory, image_view })
    }

    /// Whether `format` is usable as a depth-stencil attachment.
    pub fn check_format_availability(shared: &DeviceShared, format: vk::Format) -> bool {
        shared
            .format_properties(format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
    }

    pub fn image(&self) -> vk::Image {
        self.image_memory.image().handle()
    }

    pub fn image_view(&self) -> vk::ImageView {
        self.image_view.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packed_depth_formats_gain_stencil_aspect() {
        let aspect = depth_stencil_aspect(vk::Format::D24_UNORM_S8_UINT, false);
        assert!(aspect.contains(vk::ImageAspectFlags::DEPTH));
        assert!(aspect.contains(vk::ImageAspectFlags::STENCIL));
    }

    #[test]
    fn pure_depth_has_no_stencil() {
        let aspect = depth_stencil_aspect(vk::Format::D32_SFLOAT, false);
        assert_eq!(aspect, vk::ImageAspectFlags::DEPTH);
    }

    #[test]
    fn stencil_only_formats() {
        assert_eq!(
            depth_stencil_aspect(vk::Format::S8_UINT, false),
            vk::ImageAspectFlags::STENCIL
        );
        let aspect = depth_stencil_aspect(vk::Format::D32_SFLOAT_S8_UINT, true);
        assert!(aspect.contains(vk::ImageAspectFlags::STENCIL));
        assert!(!aspect.contains(vk::ImageAspectFlags::DEPTH));
    }

    #[test]
    fn transient_usage_requests_lazy_memory() {
        let flags = attachment_memory_flags(vk::ImageUsageFlags::TRANSIENT_ATTACHMENT);
        assert!(flags.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED));
        let flags = attachment_memory_flags(vk::ImageUsageFlags::SAMPLED);
        assert!(!flags.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED));
    }
}
