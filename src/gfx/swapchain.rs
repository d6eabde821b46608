//! Presentation surface management: surface capability queries, the
//! format/present-mode/extent/image-count policies, and the swapchain plus
//! its views and framebuffers as one create/destroy unit.

use crate::gfx::context::DeviceCaps;
use crate::gfx::error::{RenderError, SelectError};
use ash::{khr::surface, khr::swapchain, vk, Device, Instance};
use log::debug;
use winit::dpi::PhysicalSize;

/// Surface state as reported right now. Re-queried from scratch on every
/// swapchain (re)creation; stale configurations are never reused.
pub struct SurfaceConfig {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SurfaceConfig {
    pub fn query(
        surface_loader: &surface::Instance,
        pdevice: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
    ) -> Result<Self, vk::Result> {
        unsafe {
            Ok(Self {
                capabilities: surface_loader
                    .get_physical_device_surface_capabilities(pdevice, surface)?,
                formats: surface_loader.get_physical_device_surface_formats(pdevice, surface)?,
                present_modes: surface_loader
                    .get_physical_device_surface_present_modes(pdevice, surface)?,
            })
        }
    }
}

/// The viewer requires an 8-bit BGRA sRGB surface; there is no fallback.
pub fn choose_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR, SelectError> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .copied()
        .ok_or(SelectError::NoCompatibleFormat)
}

/// Lowest-latency mode that avoids tearing first: mailbox, then immediate,
/// then fifo. Fifo is universally supported, so selection cannot fail.
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    for preferred in [
        vk::PresentModeKHR::MAILBOX,
        vk::PresentModeKHR::IMMEDIATE,
        vk::PresentModeKHR::FIFO,
    ] {
        if modes.contains(&preferred) {
            return preferred;
        }
    }
    modes.first().copied().unwrap_or(vk::PresentModeKHR::FIFO)
}

/// One image more than the minimum, clamped to the surface bounds.
/// A max of 0 means the surface imposes no upper bound.
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count + 1;
    match capabilities.max_image_count {
        0 => desired,
        max => desired.min(max),
    }
}

/// The surface's current extent verbatim, unless it reports the "any
/// extent" sentinel; then the window's framebuffer size clamped to the
/// surface bounds.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    window_size: PhysicalSize<u32>,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        capabilities.current_extent
    } else {
        vk::Extent2D {
            width: window_size.width.clamp(
                capabilities.min_image_extent.width,
                capabilities.max_image_extent.width,
            ),
            height: window_size.height.clamp(
                capabilities.min_image_extent.height,
                capabilities.max_image_extent.height,
            ),
        }
    }
}

/// Swapchain handle plus everything derived from its images. Created and
/// destroyed as one unit; `images`, `views`, and `framebuffers` stay
/// index-aligned for the bundle's whole life.
pub struct SwapchainBundle {
    pub loader: swapchain::Device,
    pub swapchain: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
    pub framebuffers: Vec<vk::Framebuffer>,
}

impl SwapchainBundle {
    /// Builds a complete bundle. `old_swapchain` lets the driver hand
    /// resources over from the chain being replaced; the caller destroys
    /// the old bundle only after this returns.
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        instance: &Instance,
        device: &Device,
        caps: &DeviceCaps,
        surface_loader: &surface::Instance,
        surface: vk::SurfaceKHR,
        window_size: PhysicalSize<u32>,
        render_pass: vk::RenderPass,
        old_swapchain: Option<vk::SwapchainKHR>,
    ) -> Result<Self, RenderError> {
        let config = SurfaceConfig::query(surface_loader, caps.physical, surface)
            .map_err(SelectError::Native)?;

        let format = choose_format(&config.formats)?;
        let present_mode = choose_present_mode(&config.present_modes);
        let extent = choose_extent(&config.capabilities, window_size);
        let image_count = choose_image_count(&config.capabilities);

        debug!(
            "Swapchain: {:?} {}x{} x{} images, {:?}",
            format.format, extent.width, extent.height, image_count, present_mode
        );

        let families = caps.unique_families();
        let mut create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(config.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain.unwrap_or(vk::SwapchainKHR::null()));

        create_info = if families.len() > 1 {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&families)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let loader = swapchain::Device::new(instance, device);
        let swapchain = unsafe { loader.create_swapchain(&create_info, None)? };
        let images = unsafe { loader.get_swapchain_images(swapchain)? };

        let views = images
            .iter()
            .map(|&image| create_image_view(device, image, format.format))
            .collect::<Result<Vec<_>, _>>()?;

        let framebuffers = views
            .iter()
            .map(|view| {
                let attachments = [*view];
                let create_info = vk::FramebufferCreateInfo::default()
                    .render_pass(render_pass)
                    .attachments(&attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);
                unsafe { device.create_framebuffer(&create_info, None) }
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug_assert_eq!(images.len(), views.len());
        debug_assert_eq!(images.len(), framebuffers.len());

        Ok(Self { loader, swapchain, format, extent, images, views, framebuffers })
    }

    /// Tears the bundle down. The images themselves belong to the
    /// presentation engine and are not destroyed individually. The caller
    /// must have established that the GPU is done with them.
    pub unsafe fn destroy(&mut self, device: &Device) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                device.destroy_framebuffer(framebuffer, None);
            }
            for &view in &self.views {
                device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        self.framebuffers.clear();
        self.views.clear();
        self.images.clear();
    }
}

fn create_image_view(
    device: &Device,
    image: vk::Image,
    format: vk::Format,
) -> Result<vk::ImageView, vk::Result> {
    let view_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });
    unsafe { device.create_image_view(&view_info, None) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mailbox_beats_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::MAILBOX);
    }

    #[test]
    fn fifo_alone_is_kept() {
        let modes = [vk::PresentModeKHR::FIFO];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn immediate_ranks_between_mailbox_and_fifo() {
        let modes = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::IMMEDIATE];
        assert_eq!(choose_present_mode(&modes), vk::PresentModeKHR::IMMEDIATE);
    }

    #[test]
    fn unbounded_max_image_count_requests_min_plus_one() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 3);
    }

    #[test]
    fn image_count_clamps_to_max() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 2,
            ..Default::default()
        };
        assert_eq!(choose_image_count(&capabilities), 2);
    }

    #[test]
    fn fixed_current_extent_is_used_verbatim() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 640, height: 480 },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, PhysicalSize::new(1920, 1080));
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn sentinel_extent_clamps_window_size_to_bounds() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 100, height: 100 },
            max_image_extent: vk::Extent2D { width: 800, height: 800 },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, PhysicalSize::new(1920, 1080));
        assert_eq!((extent.width, extent.height), (800, 800));
    }

    #[test]
    fn bgra_srgb_is_required() {
        let srgb = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_SRGB,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        let unorm = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(choose_format(&[unorm, srgb]).unwrap().format, vk::Format::B8G8R8A8_SRGB);
        assert!(matches!(
            choose_format(&[unorm]),
            Err(SelectError::NoCompatibleFormat)
        ));
    }
}
