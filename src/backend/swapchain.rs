// Swapchain - negotiation and creation
//
// Picks format, present mode, extent and image count from what the surface
// advertises, then creates the chain and one view per image.

use ash::vk;

use super::device::QueueFamilies;
use super::driver::{Driver, Resource, Sharing, SwapchainDesc};
use super::error::{BringUpError, Result, Stage};
use super::lifecycle::ReleaseStack;
use super::query::SurfaceSupport;

/// 8-bit BGRA in the sRGB non-linear color space
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Prefer BGRA8/sRGB, otherwise whatever the driver listed first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| f.format == PREFERRED_FORMAT.format && f.color_space == PREFERRED_FORMAT.color_space)
        .or_else(|| formats.first())
        .copied()
}

/// MAILBOX: no tearing, triple buffered, low latency
/// FIFO: vsync, guaranteed available
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    present_modes
        .iter()
        .copied()
        .find(|&mode| mode == vk::PresentModeKHR::MAILBOX)
        .unwrap_or(vk::PresentModeKHR::FIFO)
}

/// Use the surface's extent when it has one; otherwise fit the drawable size
/// into the supported range one dimension at a time.
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, drawable: (u32, u32)) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = drawable;
    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;

    // min/max rather than clamp: a driver reporting min > max must not panic
    vk::Extent2D {
        width: width.min(max.width).max(min.width),
        height: height.min(max.height).max(min.height),
    }
}

/// One more than the minimum, capped by the maximum when there is one
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        image_count.min(capabilities.max_image_count)
    } else {
        image_count
    }
}

/// Negotiated swapchain parameters
#[derive(Debug, Clone, Copy)]
pub struct SwapchainParams {
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
    pub sharing: Sharing,
    pub pre_transform: vk::SurfaceTransformFlagsKHR,
}

pub fn negotiate_swapchain(
    support: &SurfaceSupport,
    families: QueueFamilies,
    drawable: (u32, u32),
) -> Result<SwapchainParams> {
    let format = choose_surface_format(&support.formats).ok_or(BringUpError::SwapchainCreationFailed {
        stage: Stage::Swapchain,
        result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
    })?;

    Ok(SwapchainParams {
        format,
        present_mode: choose_present_mode(&support.present_modes),
        extent: choose_extent(&support.capabilities, drawable),
        image_count: choose_image_count(&support.capabilities),
        sharing: families.sharing(),
        pre_transform: support.capabilities.current_transform,
    })
}

/// A swapchain image and the view rendering targets it through
#[derive(Debug, Clone, Copy)]
pub struct SwapImage {
    pub image: vk::Image,
    pub view: vk::ImageView,
}

#[derive(Debug, Clone)]
pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub images: Vec<SwapImage>,
    pub format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub sharing: Sharing,
}

pub fn create_swapchain<D: Driver + ?Sized>(
    driver: &mut D,
    surface: vk::SurfaceKHR,
    params: &SwapchainParams,
    ledger: &mut ReleaseStack,
) -> Result<Swapchain> {
    log::info!(
        "Creating swapchain: {}x{}, {:?}/{:?}, {:?}, {} images",
        params.extent.width,
        params.extent.height,
        params.format.format,
        params.format.color_space,
        params.present_mode,
        params.image_count
    );

    let desc = SwapchainDesc {
        surface,
        image_count: params.image_count,
        format: params.format,
        present_mode: params.present_mode,
        extent: params.extent,
        sharing: params.sharing,
        pre_transform: params.pre_transform,
    };

    let swapchain = driver
        .create_swapchain(&desc)
        .map_err(|result| BringUpError::SwapchainCreationFailed { stage: Stage::Swapchain, result })?;
    ledger.push(Resource::Swapchain(swapchain));

    // Images belong to the swapchain; only the views are ours to destroy
    let images = driver
        .swapchain_images(swapchain)
        .map_err(|result| BringUpError::SwapchainCreationFailed { stage: Stage::Swapchain, result })?;

    let mut swap_images = Vec::with_capacity(images.len());
    for image in images {
        let view = driver
            .create_image_view(image, params.format.format)
            .map_err(|result| BringUpError::SwapchainCreationFailed { stage: Stage::ImageViews, result })?;
        ledger.push(Resource::ImageView(view));
        swap_images.push(SwapImage { image, view });
    }

    log::info!("Created swapchain with {} images", swap_images.len());

    Ok(Swapchain {
        swapchain,
        images: swap_images,
        format: params.format,
        present_mode: params.present_mode,
        extent: params.extent,
        sharing: params.sharing,
    })
}
