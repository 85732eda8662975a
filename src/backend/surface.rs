// Surface binder
//
// Binds the platform window to a presentable VkSurfaceKHR.

use ash::extensions::khr;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::ffi::CStr;

use super::driver::{Driver, NativeHandle, Resource};
use super::error::{BringUpError, Result};
use super::lifecycle::ReleaseStack;

/// Instance extensions needed to create a surface on this display
pub fn surface_extensions(display: RawDisplayHandle) -> Result<[&'static CStr; 2]> {
    let platform = match display {
        RawDisplayHandle::Windows(_) => khr::Win32Surface::name(),
        RawDisplayHandle::Xlib(_) => khr::XlibSurface::name(),
        RawDisplayHandle::Xcb(_) => khr::XcbSurface::name(),
        RawDisplayHandle::Wayland(_) => khr::WaylandSurface::name(),
        _ => {
            return Err(BringUpError::SurfaceCreationFailed {
                result: vk::Result::ERROR_EXTENSION_NOT_PRESENT,
            })
        }
    };
    Ok([khr::Surface::name(), platform])
}

pub fn bind_surface<D: Driver + ?Sized>(
    driver: &mut D,
    target: NativeHandle,
    ledger: &mut ReleaseStack,
) -> Result<vk::SurfaceKHR> {
    let surface = driver
        .create_surface(target)
        .map_err(|result| BringUpError::SurfaceCreationFailed { result })?;
    ledger.push(Resource::Surface(surface));
    log::info!("Created window surface");
    Ok(surface)
}
