// Context factory
//
// Creates the Vulkan instance and, when diagnostics are on, the debug
// messenger that forwards validation output to the log.

use ash::extensions::ext::DebugUtils;
use ash::vk;
use raw_window_handle::RawDisplayHandle;
use std::borrow::Cow;
use std::collections::BTreeSet;
use std::ffi::{CStr, CString};

use super::driver::{Driver, InstanceDesc, Resource};
use super::error::{BringUpError, Result, Stage};
use super::lifecycle::ReleaseStack;
use super::query::first_missing;
use super::surface::surface_extensions;

pub const VALIDATION_LAYER: &str = "VK_LAYER_KHRONOS_validation";

/// Everything the context factory needs to know up front
#[derive(Debug, Clone)]
pub struct ContextConfig {
    pub app_name: String,
    pub enable_diagnostics: bool,
    /// Instance extensions on top of the surface/debug ones we add ourselves
    pub required_extensions: BTreeSet<String>,
    /// Layers enabled only while diagnostics are on
    pub required_layers: BTreeSet<String>,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            app_name: "Hello Triangle".to_string(),
            enable_diagnostics: cfg!(debug_assertions),
            required_extensions: BTreeSet::new(),
            required_layers: BTreeSet::from([VALIDATION_LAYER.to_string()]),
        }
    }
}

/// A live instance plus what was enabled on it
#[derive(Debug, Clone)]
pub struct Context {
    pub instance: vk::Instance,
    pub debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
    /// Layers enabled on the instance, repeated on the device
    pub layers: Vec<CString>,
}

fn to_cstrings<'a, I, F>(names: I, on_error: F) -> Result<Vec<CString>>
where
    I: IntoIterator<Item = &'a str>,
    F: Fn(&str) -> BringUpError,
{
    names
        .into_iter()
        .map(|name| CString::new(name).map_err(|_| on_error(name)))
        .collect()
}

/// Instance extensions for this display, the config and diagnostics combined
pub fn required_instance_extensions(config: &ContextConfig, display: RawDisplayHandle) -> Result<BTreeSet<String>> {
    let mut extensions = config.required_extensions.clone();
    for name in surface_extensions(display)? {
        extensions.insert(name.to_string_lossy().into_owned());
    }
    if config.enable_diagnostics {
        extensions.insert(DebugUtils::name().to_string_lossy().into_owned());
    }
    Ok(extensions)
}

pub fn create_context<D: Driver + ?Sized>(
    driver: &mut D,
    config: &ContextConfig,
    display: RawDisplayHandle,
    ledger: &mut ReleaseStack,
) -> Result<Context> {
    let extensions = required_instance_extensions(config, display)?;
    let layers: BTreeSet<String> = if config.enable_diagnostics {
        config.required_layers.clone()
    } else {
        BTreeSet::new()
    };

    if !layers.is_empty() {
        let available = driver
            .instance_layers()
            .map_err(|result| BringUpError::QueryFailed { stage: Stage::Context, result })?;
        if let Some(layer) = first_missing(&available, layers.iter().map(String::as_str)) {
            return Err(BringUpError::ValidationLayerUnavailable { layer: layer.to_string() });
        }
    }

    let available = driver
        .instance_extensions()
        .map_err(|result| BringUpError::QueryFailed { stage: Stage::Context, result })?;
    log::debug!("{} instance extensions available", available.len());
    if let Some(extension) = first_missing(&available, extensions.iter().map(String::as_str)) {
        return Err(BringUpError::InstanceExtensionUnavailable { extension: extension.to_string() });
    }

    let desc = InstanceDesc {
        app_name: CString::new(config.app_name.replace('\0', "")).unwrap_or_default(),
        extensions: to_cstrings(extensions.iter().map(String::as_str), |name| {
            BringUpError::InstanceExtensionUnavailable { extension: name.to_string() }
        })?,
        layers: to_cstrings(layers.iter().map(String::as_str), |name| {
            BringUpError::ValidationLayerUnavailable { layer: name.to_string() }
        })?,
        diagnostics: config.enable_diagnostics,
    };

    let instance = driver
        .create_instance(&desc)
        .map_err(|result| BringUpError::ContextCreationFailed { stage: Stage::Context, result })?;
    ledger.push(Resource::Instance(instance));
    log::info!(
        "Created Vulkan instance ({} extensions, {} layers)",
        desc.extensions.len(),
        desc.layers.len()
    );

    let debug_messenger = if config.enable_diagnostics {
        let messenger = driver
            .create_debug_messenger()
            .map_err(|result| BringUpError::ContextCreationFailed { stage: Stage::Diagnostics, result })?;
        ledger.push(Resource::DebugMessenger(messenger));
        Some(messenger)
    } else {
        None
    };

    Ok(Context {
        instance,
        debug_messenger,
        layers: desc.layers,
    })
}

/// Log level a validation message is forwarded at, if any.
///
/// Warnings and errors reach the operator log; verbose and info never do.
pub fn forward_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> Option<log::Level> {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        Some(log::Level::Error)
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        Some(log::Level::Warn)
    } else {
        None
    }
}

fn category(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION) {
        "validation"
    } else if message_type.contains(vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE) {
        "performance"
    } else {
        "general"
    }
}

/// Messenger settings shared by instance creation and the standalone messenger.
/// Subscribes to everything; `debug_callback` does the filtering.
pub(super) fn debug_messenger_info() -> vk::DebugUtilsMessengerCreateInfoEXT {
    vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback))
        .build()
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let Some(level) = forward_level(message_severity) else {
        return vk::FALSE;
    };
    if p_callback_data.is_null() {
        return vk::FALSE;
    }

    let p_message = (*p_callback_data).p_message;
    let message = if p_message.is_null() {
        Cow::Borrowed("")
    } else {
        CStr::from_ptr(p_message).to_string_lossy()
    };

    log::log!(level, "[Vulkan {}] {}", category(message_type), message);

    vk::FALSE
}
