//! Vulkan instance lifecycle.
//!
//! Loads the Vulkan entry points, negotiates layers and extensions against
//! what the loader actually offers, creates the instance and, in debug
//! builds, the debug-utils messenger whose messages are forwarded into the
//! `log` macros.

use std::ffi::{c_void, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::vk;
use log::{error, info, trace, warn};

use crate::error::{RenderError, Result};

const APPLICATION_NAME: &str = "Von Neumann Probe in Galaxy";
const ENGINE_NAME: &str = "Galaxis";
const VALIDATION_LAYER_NAME: &str = "VK_LAYER_KHRONOS_validation";

/// Filters a requested name list against the available set.
///
/// Names not present are dropped; the relative order of the survivors is
/// preserved. Absence is not an error — the caller enables the reduced set.
pub fn filter_supported(requested: &[CString], available: &[CString]) -> Vec<CString> {
    if available.is_empty() {
        return Vec::new();
    }
    requested
        .iter()
        .filter(|name| available.iter().any(|avail| avail == *name))
        .cloned()
        .collect()
}

/// Owns the process-wide Vulkan instance and debug messenger.
pub struct VulkanInstance {
    entry: ash::Entry,
    instance: ash::Instance,
    api_version: u32,
    enabled_layers: Vec<CString>,
    enabled_extensions: Vec<CString>,
    debug_utils: Option<DebugUtils>,
    debug_messenger: Option<vk::DebugUtilsMessengerEXT>,
}

impl VulkanInstance {
    /// Creates the instance.
    ///
    /// `layers` and `extensions` are requests: anything the loader does not
    /// offer is dropped silently (logged at warn). Debug builds append the
    /// validation layer and the debug-utils extension before negotiation.
    pub fn new(layers: &[CString], extensions: &[CString]) -> Result<Self> {
        let entry = unsafe { ash::Entry::load() }
            .map_err(|e| RenderError::Initialization(format!("failed to load Vulkan entry: {e}")))?;

        let api_version = match entry.try_enumerate_instance_version() {
            Ok(Some(version)) => version,
            Ok(None) => {
                info!("Vulkan 1.1+ not available, using Vulkan 1.0.");
                vk::API_VERSION_1_0
            }
            Err(e) => return Err(RenderError::from(e)),
        };
        info!(
            "Vulkan API version: {}.{}.{}",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version)
        );

        let mut requested_layers = layers.to_vec();
        let mut requested_extensions = extensions.to_vec();
        if cfg!(debug_assertions) {
            push_unique(&mut requested_layers, CString::new(VALIDATION_LAYER_NAME).unwrap());
            push_unique(
                &mut requested_extensions,
                CString::new(DebugUtils::name().to_bytes()).unwrap(),
            );
        }

        let available_layers: Vec<CString> = entry
            .enumerate_instance_layer_properties()
            .map_err(RenderError::from)?
            .iter()
            .map(|p| cstring_from_property(&p.layer_name))
            .collect();
        let enabled_layers = filter_supported(&requested_layers, &available_layers);
        for dropped in requested_layers.iter().filter(|l| !enabled_layers.contains(l)) {
            warn!("Instance layer not available, dropping: {:?}", dropped);
        }

        let available_extensions: Vec<CString> = entry
            .enumerate_instance_extension_properties(None)
            .map_err(RenderError::from)?
            .iter()
            .map(|p| cstring_from_property(&p.extension_name))
            .collect();
        let enabled_extensions = filter_supported(&requested_extensions, &available_extensions);
        for dropped in requested_extensions
            .iter()
            .filter(|e| !enabled_extensions.contains(e))
        {
            warn!("Instance extension not available, dropping: {:?}", dropped);
        }

        let app_name = CString::new(APPLICATION_NAME).unwrap();
        let engine_name = CString::new(ENGINE_NAME).unwrap();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(&engine_name)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(api_version);

        let layer_ptrs: Vec<*const i8> = enabled_layers.iter().map(|l| l.as_ptr()).collect();
        let extension_ptrs: Vec<*const i8> = enabled_extensions.iter().map(|e| e.as_ptr()).collect();

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_layer_names(&layer_ptrs)
            .enabled_extension_names(&extension_ptrs);

        let instance = unsafe { entry.create_instance(&create_info, None) }.map_err(|e| {
            error!("Failed to create Vulkan instance: {}", e);
            RenderError::from(e)
        })?;
        info!("Vulkan instance created successfully.");

        let mut this = Self {
            entry,
            instance,
            api_version,
            enabled_layers,
            enabled_extensions,
            debug_utils: None,
            debug_messenger: None,
        };

        if cfg!(debug_assertions) && this.has_extension(DebugUtils::name()) {
            this.create_debug_messenger()?;
        }

        Ok(this)
    }

    fn create_debug_messenger(&mut self) -> Result<()> {
        let loader = DebugUtils::new(&self.entry, &self.instance);
        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
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
            .pfn_user_callback(Some(debug_utils_callback));

        let messenger = unsafe { loader.create_debug_utils_messenger(&create_info, None) }
            .map_err(RenderError::from)?;
        info!("Debug messenger created successfully.");

        self.debug_utils = Some(loader);
        self.debug_messenger = Some(messenger);
        Ok(())
    }

    fn has_extension(&self, name: &CStr) -> bool {
        self.enabled_extensions.iter().any(|e| e.as_c_str() == name)
    }

    /// The negotiated instance API version (may exceed what this crate's
    /// feature chain covers; the device core caps the chain itself).
    pub fn api_version(&self) -> u32 {
        self.api_version
    }

    /// Layers that survived negotiation.
    pub fn enabled_layers(&self) -> &[CString] {
        &self.enabled_layers
    }

    /// Extensions that survived negotiation.
    pub fn enabled_extensions(&self) -> &[CString] {
        &self.enabled_extensions
    }

    pub fn raw(&self) -> &ash::Instance {
        &self.instance
    }

    pub fn entry(&self) -> &ash::Entry {
        &self.entry
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let (Some(loader), Some(messenger)) = (&self.debug_utils, self.debug_messenger) {
                loader.destroy_debug_utils_messenger(messenger, None);
                info!("Destroyed debug messenger.");
            }
            self.instance.destroy_instance(None);
            info!("Destroyed Vulkan instance.");
        }
    }
}

fn push_unique(list: &mut Vec<CString>, name: CString) {
    if !list.contains(&name) {
        list.push(name);
    }
}

fn cstring_from_property(raw: &[std::os::raw::c_char]) -> CString {
    let bytes: Vec<u8> = raw
        .iter()
        .take_while(|&&c| c != 0)
        .map(|&c| c as u8)
        .collect();
    CString::new(bytes).unwrap_or_default()
}

/// Forwards validation-layer messages into the `log` macros.
unsafe extern "system" fn debug_utils_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        error!("Validation layer: {:?}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        warn!("Validation layer: {:?}", message);
    } else if message_severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::INFO) {
        info!("Validation layer: {:?}", message);
    } else {
        trace!("Validation layer: {:?}", message);
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cs(s: &str) -> CString {
        CString::new(s).unwrap()
    }

    #[test]
    fn filter_drops_absent_names_preserving_order() {
        let requested = vec![cs("a"), cs("b"), cs("c")];
        let available = vec![cs("c"), cs("x"), cs("a")];
        assert_eq!(filter_supported(&requested, &available), vec![cs("a"), cs("c")]);
    }

    #[test]
    fn filter_with_empty_available_clears_requests() {
        let requested = vec![cs("a")];
        assert_eq!(filter_supported(&requested, &[]), Vec::<CString>::new());
    }

    #[test]
    fn push_unique_deduplicates() {
        let mut list = vec![cs("a")];
        push_unique(&mut list, cs("a"));
        push_unique(&mut list, cs("b"));
        assert_eq!(list, vec![cs("a"), cs("b")]);
    }

    #[test]
    fn property_name_conversion_stops_at_nul() {
        let mut raw = [0 as std::os::raw::c_char; 8];
        for (i, b) in b"abc".iter().enumerate() {
            raw[i] = *b as std::os::raw::c_char;
        }
        assert_eq!(cstring_from_property(&raw), cs("abc"));
    }
}
