//! Logical device creation and shared device state.

use std::ffi::CString;
use std::sync::Arc;

use ash::vk;
use log::{debug, info};

use crate::error::{RenderError, Result};
use crate::instance::VulkanInstance;
use crate::physical_device::{unique_family_indices, PhysicalDeviceInfo, QueueFamilyTriple};

/// Queue handles retrieved from the logical device. A queue is `None` when
/// its family was not demanded for this device.
#[derive(Debug, Clone, Copy, Default)]
pub struct Queues {
    pub graphics: Option<vk::Queue>,
    pub present: Option<vk::Queue>,
    pub compute: Option<vk::Queue>,
}

/// State shared by resource wrappers and transfer services: instance-level
/// query access plus the logical device and its cached property bundles.
/// Cloned cheaply behind an `Arc`.
pub struct DeviceShared {
    pub instance: ash::Instance,
    pub physical_device: vk::PhysicalDevice,
    pub device: ash::Device,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

impl DeviceShared {
    /// Format properties of `format` on this adapter.
    pub fn format_properties(&self, format: vk::Format) -> vk::FormatProperties {
        unsafe {
            self.instance
                .get_physical_device_format_properties(self.physical_device, format)
        }
    }
}

/// The logical device plus its queues.
pub struct LogicalDevice {
    pub raw: ash::Device,
    pub queues: Queues,
    pub families: QueueFamilyTriple,
    shared: Arc<DeviceShared>,
}

impl LogicalDevice {
    /// Creates the logical device.
    ///
    /// One queue is created per distinct demanded family. The enabled
    /// feature set is everything the adapter reports, chained through the
    /// Vulkan 1.1/1.2/1.3 feature structs up to the negotiated API version.
    pub fn new(
        instance: &VulkanInstance,
        physical: &PhysicalDeviceInfo,
        families: QueueFamilyTriple,
        device_extensions: &[CString],
    ) -> Result<Self> {
        info!("Creating logical device...");
        let raw_instance = instance.raw();

        let queue_priority = [1.0f32];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = unique_family_indices(families)
            .into_iter()
            .map(|index| {
                debug!("Adding queue create info for family index {}.", index);
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(index)
                    .queue_priorities(&queue_priority)
                    .build()
            })
            .collect();

        let extension_ptrs: Vec<*const i8> = device_extensions.iter().map(|e| e.as_ptr()).collect();
        let api_version = instance.api_version();

        let mut features11 = vk::PhysicalDeviceVulkan11Features::default();
        let mut features12 = vk::PhysicalDeviceVulkan12Features::default();
        let mut features13 = vk::PhysicalDeviceVulkan13Features::default();

        let device = if api_version >= vk::API_VERSION_1_1 {
            // Query everything the adapter offers and enable it wholesale,
            // chaining only the feature structs the negotiated version has.
            let mut features2 = vk::PhysicalDeviceFeatures2::builder();
            if api_version >= vk::API_VERSION_1_1 {
                features2 = features2.push_next(&mut features11);
            }
            if api_version >= vk::API_VERSION_1_2 {
                features2 = features2.push_next(&mut features12);
            }
            if api_version >= vk::API_VERSION_1_3 {
                features2 = features2.push_next(&mut features13);
            }
            let mut features2 = features2.build();
            unsafe {
                raw_instance.get_physical_device_features2(physical.handle, &mut features2);
            }

            let create_info = vk::DeviceCreateInfo::builder()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&extension_ptrs)
                .push_next(&mut features2);

            unsafe { raw_instance.create_device(physical.handle, &create_info, None) }
        } else {
            let create_info = vk::DeviceCreateInfo::builder()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&extension_ptrs)
                .enabled_features(&physical.features);

            unsafe { raw_instance.create_device(physical.handle, &create_info, None) }
        }
        .map_err(|e| {
            log::error!("Failed to create logical device: {}", e);
            RenderError::from(e)
        })?;

        // Each selected family was created with exactly one queue.
        let get_queue = |index: u32| -> Option<vk::Queue> {
            (index != vk::QUEUE_FAMILY_IGNORED).then(|| unsafe { device.get_device_queue(index, 0) })
        };
        let queues = Queues {
            graphics: get_queue(families.graphics),
            present: get_queue(families.present),
            compute: get_queue(families.compute),
        };

        info!("Logical device created successfully.");
        info!("Renderer: {}", physical.name());

        let shared = Arc::new(DeviceShared {
            instance: raw_instance.clone(),
            physical_device: physical.handle,
            device: device.clone(),
            properties: physical.properties,
            memory_properties: physical.memory_properties,
        });

        Ok(LogicalDevice { raw: device, queues, families, shared })
    }

    /// Shared device state for wrappers and transfer services.
    pub fn shared(&self) -> Arc<DeviceShared> {
        Arc::clone(&self.shared)
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.raw.device_wait_idle() }.map_err(RenderError::from)
    }

    /// Destroys the device. Called by the owner during teardown, after all
    /// dependent objects are gone.
    pub fn destroy(&mut self) {
        unsafe {
            self.raw.destroy_device(None);
        }
        info!("Destroyed logical device.");
    }
}
