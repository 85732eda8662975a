// Capability queries
//
// Read-only questions asked of the host and of each physical device.
// Nothing here creates or destroys a handle.

use ash::vk;

use super::driver::Driver;

/// First name in `required` that `available` does not list
pub fn first_missing<'a, I>(available: &[String], required: I) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    required
        .into_iter()
        .find(|name| !available.iter().any(|a| a == name))
}

/// Surface-relative capability sets of one physical device
#[derive(Debug, Clone)]
pub struct SurfaceSupport {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

pub fn query_surface_support<D: Driver + ?Sized>(
    driver: &D,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> Result<SurfaceSupport, vk::Result> {
    Ok(SurfaceSupport {
        capabilities: driver.surface_capabilities(physical_device, surface)?,
        formats: driver.surface_formats(physical_device, surface)?,
        present_modes: driver.surface_present_modes(physical_device, surface)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn first_missing_is_order_independent() {
        let available = strings(&["VK_KHR_surface", "VK_KHR_swapchain", "VK_EXT_debug_utils"]);

        assert_eq!(first_missing(&available, ["VK_EXT_debug_utils", "VK_KHR_surface"]), None);
        assert_eq!(first_missing(&available, []), None);
    }

    #[test]
    fn first_missing_reports_first_absent_name() {
        let available = strings(&["VK_KHR_surface"]);

        assert_eq!(
            first_missing(&available, ["VK_KHR_surface", "VK_KHR_swapchain", "VK_KHR_other"]),
            Some("VK_KHR_swapchain")
        );
    }
}
