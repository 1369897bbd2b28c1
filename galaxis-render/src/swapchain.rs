//! Swapchain state and creation policy.
//!
//! The policy helpers are pure so the selection rules can be tested without
//! a device. Orchestration that fires lifecycle callbacks (recreation, the
//! acquire/present retry loops) lives in [`crate::core`].

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::vk;
use log::{debug, info, warn};

use crate::error::{RenderError, Result};

/// Everything needed to (re)build a swapchain. Kept as plain data so
/// recreation can re-issue the create info with a changed extent.
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub flags: vk::SwapchainCreateFlagsKHR,
    pub min_image_count: u32,
    pub format: vk::Format,
    pub color_space: vk::ColorSpaceKHR,
    pub extent: vk::Extent2D,
    pub usage: vk::ImageUsageFlags,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
    pub composite_alpha: vk::CompositeAlphaFlagsKHR,
    pub present_mode: vk::PresentModeKHR,
    pub sharing_mode: vk::SharingMode,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        SwapchainDesc {
            flags: vk::SwapchainCreateFlagsKHR::empty(),
            min_image_count: 0,
            format: vk::Format::UNDEFINED,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            extent: vk::Extent2D::default(),
            usage: vk::ImageUsageFlags::empty(),
            pre_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            composite_alpha: vk::CompositeAlphaFlagsKHR::OPAQUE,
            present_mode: vk::PresentModeKHR::FIFO,
            sharing_mode: vk::SharingMode::EXCLUSIVE,
        }
    }
}

/// Clamps the caller-supplied extent into the surface's supported range, or
/// adopts the surface's fixed current extent when it reports one.
pub fn choose_swap_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    desired: vk::Extent2D,
) -> vk::Extent2D {
    if capabilities.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: desired.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: desired.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    } else {
        capabilities.current_extent
    }
}

/// `minImageCount + 1` when the surface allows more than the minimum.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    capabilities.min_image_count
        + u32::from(capabilities.max_image_count > capabilities.min_image_count)
}

/// Prefers `INHERIT`; otherwise the first supported of opaque,
/// pre-multiplied, post-multiplied.
pub fn choose_composite_alpha(
    supported: vk::CompositeAlphaFlagsKHR,
) -> vk::CompositeAlphaFlagsKHR {
    if supported.contains(vk::CompositeAlphaFlagsKHR::INHERIT) {
        return vk::CompositeAlphaFlagsKHR::INHERIT;
    }
    for candidate in [
        vk::CompositeAlphaFlagsKHR::OPAQUE,
        vk::CompositeAlphaFlagsKHR::PRE_MULTIPLIED,
        vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED,
    ] {
        if supported.contains(candidate) {
            return candidate;
        }
    }
    vk::CompositeAlphaFlagsKHR::OPAQUE
}

/// Color attachment plus transfer-src when available; transfer-dst is
/// required and its absence is fatal.
pub fn choose_usage(supported: vk::ImageUsageFlags) -> Result<vk::ImageUsageFlags> {
    let mut usage = vk::ImageUsageFlags::COLOR_ATTACHMENT;
    if supported.contains(vk::ImageUsageFlags::TRANSFER_SRC) {
        usage |= vk::ImageUsageFlags::TRANSFER_SRC;
    }
    if supported.contains(vk::ImageUsageFlags::TRANSFER_DST) {
        usage |= vk::ImageUsageFlags::TRANSFER_DST;
    } else {
        return Err(RenderError::FeatureNotPresent(
            "surface does not support TRANSFER_DST usage".to_string(),
        ));
    }
    Ok(usage)
}

/// FIFO under vsync; otherwise mailbox when available, FIFO as fallback.
pub fn choose_present_mode(available: &[vk::PresentModeKHR], vsync: bool) -> vk::PresentModeKHR {
    if vsync {
        return vk::PresentModeKHR::FIFO;
    }
    if available.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Resolves a requested surface format against the available set.
///
/// With `UNDEFINED` as the requested format, the first entry matching the
/// requested color space wins. Returns `None` when nothing matches.
pub fn pick_surface_format(
    available: &[vk::SurfaceFormatKHR],
    requested: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    if requested.format == vk::Format::UNDEFINED {
        available
            .iter()
            .find(|f| f.color_space == requested.color_space)
            .copied()
    } else {
        available
            .iter()
            .find(|f| f.format == requested.format && f.color_space == requested.color_space)
            .copied()
    }
}

/// Applies the default format preference chain: four-component UNORM in
/// sRGB-nonlinear (RGBA then BGRA), else the first available with a warning.
pub fn pick_default_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
    for format in [vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM] {
        let wanted = vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        if let Some(found) = pick_surface_format(available, wanted) {
            return found;
        }
    }
    warn!("Failed to select a four-component unsigned normalized surface format.");
    available[0]
}

/// The created swapchain plus its images and views.
pub struct SwapchainState {
    pub loader: SwapchainLoader,
    pub handle: vk::SwapchainKHR,
    /// Chained into the next create info and destroyed lazily at the next
    /// acquire, or eagerly during recreation.
    pub retired: vk::SwapchainKHR,
    pub desc: SwapchainDesc,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
}

impl SwapchainState {
    /// Creates the swapchain described by `desc`, chaining `old_swapchain`
    /// when recreating, and builds one color view per image.
    pub fn create(
        device: &ash::Device,
        loader: SwapchainLoader,
        surface: vk::SurfaceKHR,
        desc: SwapchainDesc,
        old_swapchain: vk::SwapchainKHR,
    ) -> Result<Self> {
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .flags(desc.flags)
            .surface(surface)
            .min_image_count(desc.min_image_count)
            .image_format(desc.format)
            .image_color_space(desc.color_space)
            .image_extent(desc.extent)
            .image_array_layers(1)
            .image_usage(desc.usage)
            .image_sharing_mode(desc.sharing_mode)
            .pre_transform(desc.pre_transform)
            .composite_alpha(desc.composite_alpha)
            .present_mode(desc.present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let handle = unsafe { loader.create_swapchain(&create_info, None) }.map_err(|e| {
            log::error!("Failed to create swapchain: {}", e);
            RenderError::from(e)
        })?;

        let images = unsafe { loader.get_swapchain_images(handle) }.map_err(RenderError::from)?;
        debug!("Retrieved {} swapchain images.", images.len());

        let mut image_views = Vec::with_capacity(images.len());
        for &image in &images {
            let view_info = vk::ImageViewCreateInfo::builder()
                .image(image)
                .view_type(vk::ImageViewType::TYPE_2D)
                .format(desc.format)
                .subresource_range(vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: 1,
                    base_array_layer: 0,
                    layer_count: 1,
                });
            let view = unsafe { device.create_image_view(&view_info, None) }.map_err(|e| {
                log::error!("Failed to create swapchain image view: {}", e);
                RenderError::from(e)
            })?;
            image_views.push(view);
        }

        info!("Swapchain created successfully with extent {:?}.", desc.extent);
        Ok(SwapchainState {
            loader,
            handle,
            retired: old_swapchain,
            desc,
            images,
            image_views,
        })
    }

    /// Destroys the image views. Images belong to the swapchain.
    pub fn destroy_views(&mut self, device: &ash::Device) {
        for view in self.image_views.drain(..) {
            unsafe {
                device.destroy_image_view(view, None);
            }
        }
        self.images.clear();
        debug!("Destroyed swapchain image views.");
    }

    /// Destroys a retired swapchain chained from a previous recreation.
    pub fn destroy_retired(&mut self) {
        if self.retired != vk::SwapchainKHR::null() && self.retired != self.handle {
            unsafe {
                self.loader.destroy_swapchain(self.retired, None);
            }
            self.retired = vk::SwapchainKHR::null();
            debug!("Destroyed retired swapchain.");
        }
    }

    /// Destroys views and the swapchain itself.
    pub fn destroy(&mut self, device: &ash::Device) {
        self.destroy_views(device);
        self.destroy_retired();
        if self.handle != vk::SwapchainKHR::null() {
            unsafe {
                self.loader.destroy_swapchain(self.handle, None);
            }
            self.handle = vk::SwapchainKHR::null();
            info!("Destroyed swapchain.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(
        current: (u32, u32),
        min: (u32, u32),
        max: (u32, u32),
        min_count: u32,
        max_count: u32,
    ) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: current.0, height: current.1 },
            min_image_extent: vk::Extent2D { width: min.0, height: min.1 },
            max_image_extent: vk::Extent2D { width: max.0, height: max.1 },
            min_image_count: min_count,
            max_image_count: max_count,
            ..Default::default()
        }
    }

    #[test]
    fn extent_clamps_when_surface_is_flexible() {
        let capabilities = caps((u32::MAX, u32::MAX), (100, 100), (2000, 1000), 2, 8);
        let extent = choose_swap_extent(&capabilities, vk::Extent2D { width: 5000, height: 50 });
        assert_eq!(extent, vk::Extent2D { width: 2000, height: 100 });
    }

    #[test]
    fn extent_adopts_fixed_current_extent() {
        let capabilities = caps((1280, 720), (1, 1), (4096, 4096), 2, 8);
        let extent = choose_swap_extent(&capabilities, vk::Extent2D { width: 640, height: 480 });
        assert_eq!(extent, vk::Extent2D { width: 1280, height: 720 });
    }

    #[test]
    fn image_count_policy() {
        assert_eq!(choose_image_count(&caps((0, 0), (0, 0), (0, 0), 2, 8)), 3);
        // max == min: no headroom.
        assert_eq!(choose_image_count(&caps((0, 0), (0, 0), (0, 0), 3, 3)), 3);
        // max == 0 means "no limit" but also no proof of headroom; the
        // comparison is against min, so 0 stays at min.
        assert_eq!(choose_image_count(&caps((0, 0), (0, 0), (0, 0), 2, 0)), 2);
    }

    #[test]
    fn composite_alpha_prefers_inherit() {
        let supported = vk::CompositeAlphaFlagsKHR::OPAQUE | vk::CompositeAlphaFlagsKHR::INHERIT;
        assert_eq!(choose_composite_alpha(supported), vk::CompositeAlphaFlagsKHR::INHERIT);
        assert_eq!(
            choose_composite_alpha(vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED),
            vk::CompositeAlphaFlagsKHR::POST_MULTIPLIED
        );
    }

    #[test]
    fn usage_requires_transfer_dst() {
        let ok = choose_usage(
            vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST,
        )
        .unwrap();
        assert!(ok.contains(vk::ImageUsageFlags::TRANSFER_SRC));
        assert!(ok.contains(vk::ImageUsageFlags::TRANSFER_DST));

        let err = choose_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT).unwrap_err();
        assert!(matches!(err, RenderError::FeatureNotPresent(_)));
    }

    #[test]
    fn present_mode_policy() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes, true), vk::PresentModeKHR::FIFO);
        assert_eq!(choose_present_mode(&modes, false), vk::PresentModeKHR::MAILBOX);
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO], false),
            vk::PresentModeKHR::FIFO
        );
    }

    #[test]
    fn surface_format_preference_chain() {
        let available = [
            vk::SurfaceFormatKHR {
                format: vk::Format::R5G6B5_UNORM_PACK16,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        ];
        let chosen = pick_default_surface_format(&available);
        assert_eq!(chosen.format, vk::Format::B8G8R8A8_UNORM);

        // Nothing matches the UNORM chain: first available wins.
        let odd = [vk::SurfaceFormatKHR {
            format: vk::Format::R16G16B16A16_SFLOAT,
            color_space: vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT,
        }];
        assert_eq!(pick_default_surface_format(&odd).format, vk::Format::R16G16B16A16_SFLOAT);
    }

    #[test]
    fn undefined_request_matches_by_color_space() {
        let available = [vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }];
        let picked = pick_surface_format(
            &available,
            vk::SurfaceFormatKHR {
                format: vk::Format::UNDEFINED,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
        )
        .unwrap();
        assert_eq!(picked.format, vk::Format::B8G8R8A8_SRGB);
    }
}
