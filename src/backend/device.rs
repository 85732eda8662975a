// Vulkan Device - physical device selection and logical device creation
//
// Responsibilities:
// - Walk the enumerated GPUs in order, take the first suitable one
// - Resolve graphics and presentation queue families
// - Open a logical device with one queue per unique family

use ash::extensions::khr;
use ash::vk;
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};
use thiserror::Error;

use super::driver::{DeviceDesc, Driver, Resource, Sharing};
use super::error::{BringUpError, Result, Stage};
use super::lifecycle::ReleaseStack;
use super::query::{first_missing, query_surface_support};

const QUEUE_PRIORITY: f32 = 1.0;

/// Device extensions every candidate must offer
pub fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Queue family indices found while scanning a device
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    pub fn resolve(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics?,
            present: self.present?,
        })
    }
}

/// Resolved queue families; the two may be the same family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Each family once, ascending
    pub fn unique(&self) -> Vec<u32> {
        BTreeSet::from([self.graphics, self.present]).into_iter().collect()
    }

    /// Swapchain images are shared only when two families touch them
    pub fn sharing(&self) -> Sharing {
        if self.graphics == self.present {
            Sharing::Exclusive
        } else {
            Sharing::Concurrent([self.graphics, self.present])
        }
    }
}

/// Scan queue families in index order. First graphics-capable family and
/// first family able to present to `surface` win; stops once both are known.
pub fn find_queue_families<D: Driver + ?Sized>(
    driver: &D,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> std::result::Result<QueueFamilyIndices, vk::Result> {
    let mut indices = QueueFamilyIndices::default();

    for (index, family) in driver.queue_families(physical_device).iter().enumerate() {
        let index = index as u32;

        if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
            indices.graphics = Some(index);
        }
        if indices.present.is_none() && driver.surface_support(physical_device, index, surface)? {
            indices.present = Some(index);
        }
        if indices.is_complete() {
            break;
        }
    }

    Ok(indices)
}

/// Why a candidate was passed over
#[derive(Debug, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("no graphics queue family")]
    NoGraphicsQueue,
    #[error("no queue family can present to the surface")]
    NoPresentQueue,
    #[error("missing device extension {0}")]
    MissingExtension(String),
    #[error("no surface formats")]
    NoSurfaceFormats,
    #[error("no present modes")]
    NoPresentModes,
}

/// Suitability check for one candidate. The outer error is a failed query,
/// the inner one a device that answered but does not qualify.
pub fn evaluate_device<D: Driver + ?Sized>(
    driver: &D,
    physical_device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> std::result::Result<std::result::Result<QueueFamilies, Rejection>, vk::Result> {
    let indices = find_queue_families(driver, physical_device, surface)?;
    let families = match (indices.graphics, indices.resolve()) {
        (None, _) => return Ok(Err(Rejection::NoGraphicsQueue)),
        (Some(_), None) => return Ok(Err(Rejection::NoPresentQueue)),
        (Some(_), Some(families)) => families,
    };

    let available = driver.device_extensions(physical_device)?;
    let required = required_device_extensions();
    let required = required.iter().map(|name| name.to_str().unwrap_or_default());
    if let Some(missing) = first_missing(&available, required) {
        return Ok(Err(Rejection::MissingExtension(missing.to_string())));
    }

    let support = query_surface_support(driver, physical_device, surface)?;
    if support.formats.is_empty() {
        return Ok(Err(Rejection::NoSurfaceFormats));
    }
    if support.present_modes.is_empty() {
        return Ok(Err(Rejection::NoPresentModes));
    }

    Ok(Ok(families))
}

/// The physical device bring-up settled on
#[derive(Debug, Clone)]
pub struct SelectedDevice {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub families: QueueFamilies,
}

/// Pick the first suitable GPU in enumeration order. No ranking.
pub fn select_physical_device<D: Driver + ?Sized>(driver: &D, surface: vk::SurfaceKHR) -> Result<SelectedDevice> {
    let devices = driver
        .enumerate_physical_devices()
        .map_err(|result| BringUpError::QueryFailed { stage: Stage::DeviceSelection, result })?;

    if devices.is_empty() {
        return Err(BringUpError::NoDeviceFound);
    }

    for &physical_device in &devices {
        let name = driver.device_name(physical_device);

        match evaluate_device(driver, physical_device, surface) {
            Ok(Ok(families)) => {
                log::info!(
                    "Selected GPU: {} (graphics family {}, present family {})",
                    name,
                    families.graphics,
                    families.present
                );
                return Ok(SelectedDevice {
                    physical_device,
                    name,
                    families,
                });
            }
            Ok(Err(rejection)) => log::debug!("Skipping GPU {}: {}", name, rejection),
            Err(result) => log::warn!("Skipping GPU {}: query failed: {}", name, result),
        }
    }

    Err(BringUpError::NoSuitableDevice { candidates: devices.len() })
}

/// Logical device and the queues fetched from it.
///
/// Queues belong to the device; they are never destroyed on their own.
#[derive(Debug, Clone)]
pub struct LogicalDevice {
    pub device: vk::Device,
    pub families: QueueFamilies,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
}

pub fn create_logical_device<D: Driver + ?Sized>(
    driver: &mut D,
    selected: &SelectedDevice,
    layers: &[CString],
    ledger: &mut ReleaseStack,
) -> Result<LogicalDevice> {
    let desc = DeviceDesc {
        queue_families: selected.families.unique(),
        queue_priority: QUEUE_PRIORITY,
        extensions: required_device_extensions().iter().map(|&name| name.to_owned()).collect(),
        layers: layers.to_vec(),
    };

    let device = driver
        .create_device(selected.physical_device, &desc)
        .map_err(|result| BringUpError::DeviceCreationFailed { result })?;
    ledger.push(Resource::Device(device));

    let graphics_queue = driver.device_queue(selected.families.graphics, 0);
    let present_queue = driver.device_queue(selected.families.present, 0);

    log::info!("Created logical device with {} queue(s)", desc.queue_families.len());

    Ok(LogicalDevice {
        device,
        families: selected.families,
        graphics_queue,
        present_queue,
    })
}
