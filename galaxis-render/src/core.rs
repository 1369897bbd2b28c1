//! The device core: instance → surface → device → swapchain lifecycle.
//!
//! `VulkanCore` owns the five lifecycle phases in order and tears them down
//! in reverse. Subsystems hook the lifecycle through the callback
//! registries; recreation of the device or swapchain fires the destroy set,
//! rebuilds, then fires the create set.

use std::ffi::CString;
use std::sync::Arc;

use ash::extensions::khr::{Surface as SurfaceLoader, Swapchain as SwapchainLoader};
use ash::vk;
use log::{error, info, warn};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::device::{DeviceShared, LogicalDevice, Queues};
use crate::error::{RenderError, Result};
use crate::instance::{filter_supported, VulkanInstance};
use crate::physical_device::{
    enumerate_physical_devices, is_known_unsatisfiable, mark_searched, needs_search,
    select_queue_families, PhysicalDeviceInfo, QueueDemand, QueueFamilyTriple,
};
use crate::swapchain::{
    choose_composite_alpha, choose_image_count, choose_present_mode, choose_swap_extent,
    choose_usage, pick_default_surface_format, pick_surface_format, SwapchainDesc, SwapchainState,
};

/// Which lifecycle event a callback is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackKind {
    CreateSwapchain,
    DestroySwapchain,
    CreateDevice,
    DestroyDevice,
}

type LifecycleCallback = Box<dyn FnMut()>;

/// Named lifecycle callbacks.
///
/// Callbacks fire in registration order for BOTH the create and the destroy
/// sets. Subsystems with destroy-time dependencies on one another must
/// account for this ordering themselves.
#[derive(Default)]
pub struct CallbackRegistry {
    create_device: Vec<(String, LifecycleCallback)>,
    destroy_device: Vec<(String, LifecycleCallback)>,
    create_swapchain: Vec<(String, LifecycleCallback)>,
    destroy_swapchain: Vec<(String, LifecycleCallback)>,
}

impl CallbackRegistry {
    fn set_mut(&mut self, kind: CallbackKind) -> &mut Vec<(String, LifecycleCallback)> {
        match kind {
            CallbackKind::CreateDevice => &mut self.create_device,
            CallbackKind::DestroyDevice => &mut self.destroy_device,
            CallbackKind::CreateSwapchain => &mut self.create_swapchain,
            CallbackKind::DestroySwapchain => &mut self.destroy_swapchain,
        }
    }

    pub fn add(&mut self, kind: CallbackKind, name: impl Into<String>, callback: LifecycleCallback) {
        self.set_mut(kind).push((name.into(), callback));
    }

    pub fn remove(&mut self, kind: CallbackKind, name: &str) {
        self.set_mut(kind).retain(|(n, _)| n != name);
    }

    pub fn fire(&mut self, kind: CallbackKind) {
        for (_, callback) in self.set_mut(kind).iter_mut() {
            callback();
        }
    }

    pub fn clear(&mut self) {
        self.create_device.clear();
        self.destroy_device.clear();
        self.create_swapchain.clear();
        self.destroy_swapchain.clear();
    }
}

/// Root object for the Vulkan device core.
pub struct VulkanCore {
    instance: VulkanInstance,
    surface_loader: SurfaceLoader,
    surface: vk::SurfaceKHR,

    available_physical_devices: Vec<vk::PhysicalDevice>,
    cached_queue_families: Vec<QueueFamilyTriple>,
    physical: Option<PhysicalDeviceInfo>,

    device_extensions: Vec<CString>,
    device: Option<LogicalDevice>,

    available_surface_formats: Vec<vk::SurfaceFormatKHR>,
    swapchain: Option<SwapchainState>,
    /// Accumulates swapchain settings (notably the surface format) chosen
    /// before and across swapchain creation.
    desc: SwapchainDesc,
    vsync: bool,

    current_image_index: u32,
    pub callbacks: CallbackRegistry,
}

impl VulkanCore {
    /// Phase 1: creates the instance (and, in debug builds, the messenger).
    pub fn new(layers: &[CString], extensions: &[CString]) -> Result<Self> {
        let instance = VulkanInstance::new(layers, extensions)?;
        let surface_loader = SurfaceLoader::new(instance.entry(), instance.raw());
        Ok(VulkanCore {
            instance,
            surface_loader,
            surface: vk::SurfaceKHR::null(),
            available_physical_devices: Vec::new(),
            cached_queue_families: Vec::new(),
            physical: None,
            device_extensions: Vec::new(),
            device: None,
            available_surface_formats: Vec::new(),
            swapchain: None,
            desc: SwapchainDesc::default(),
            vsync: true,
            current_image_index: u32::MAX,
            callbacks: CallbackRegistry::default(),
        })
    }

    /// Phase 2: creates the window surface from the host's raw handles.
    pub fn create_surface(
        &mut self,
        display: RawDisplayHandle,
        window: RawWindowHandle,
    ) -> Result<()> {
        let surface = unsafe {
            ash_window::create_surface(
                self.instance.entry(),
                self.instance.raw(),
                display,
                window,
                None,
            )
        }
        .map_err(RenderError::from)?;
        self.set_surface(surface);
        Ok(())
    }

    /// Adopts an externally created surface. The core owns it from here on.
    pub fn set_surface(&mut self, surface: vk::SurfaceKHR) {
        self.surface = surface;
        info!("Surface set.");
    }

    /// Requests an additional device extension for the next device creation.
    pub fn add_device_extension(&mut self, name: CString) {
        if !self.device_extensions.contains(&name) {
            self.device_extensions.push(name);
        }
    }

    pub fn set_device_extensions(&mut self, names: Vec<CString>) {
        self.device_extensions = names;
    }

    /// Phase 3/4: selects the adapter at `index` and creates the logical
    /// device, then fires the create-device callbacks.
    pub fn create_device(&mut self, index: usize, demand: QueueDemand) -> Result<()> {
        if self.available_physical_devices.is_empty() {
            self.available_physical_devices = enumerate_physical_devices(self.instance.raw())?;
            self.cached_queue_families =
                vec![QueueFamilyTriple::default(); self.available_physical_devices.len()];
        }
        if index >= self.available_physical_devices.len() {
            return Err(RenderError::Initialization(format!(
                "physical device index {index} out of range ({} available)",
                self.available_physical_devices.len()
            )));
        }

        let demand = QueueDemand {
            present: demand.present && self.surface != vk::SurfaceKHR::null(),
            ..demand
        };
        let families = self.determine_queue_families(index, demand)?;

        let handle = self.available_physical_devices[index];
        let physical = PhysicalDeviceInfo::query(self.instance.raw(), handle);

        // The swapchain extension is implied by having a surface.
        if self.surface != vk::SurfaceKHR::null() {
            self.add_device_extension(CString::new(SwapchainLoader::name().to_bytes()).unwrap());
        }
        self.check_device_extensions(handle)?;

        let device = LogicalDevice::new(&self.instance, &physical, families, &self.device_extensions)?;
        self.physical = Some(physical);
        self.device = Some(device);

        self.callbacks.fire(CallbackKind::CreateDevice);
        Ok(())
    }

    /// Tears down the swapchain and device (firing the destroy sets) and
    /// builds the device anew on the adapter at `index`.
    pub fn recreate_device(&mut self, index: usize, demand: QueueDemand) -> Result<()> {
        self.wait_idle()?;

        if let Some(mut swapchain) = self.swapchain.take() {
            self.callbacks.fire(CallbackKind::DestroySwapchain);
            let device = self.device.as_ref().expect("device outlives swapchain");
            swapchain.destroy(&device.raw);
            self.desc = SwapchainDesc::default();
        }

        self.callbacks.fire(CallbackKind::DestroyDevice);
        if let Some(mut device) = self.device.take() {
            device.destroy();
        }
        self.physical = None;

        self.create_device(index, demand)
    }

    fn determine_queue_families(
        &mut self,
        index: usize,
        demand: QueueDemand,
    ) -> Result<QueueFamilyTriple> {
        let cached = self.cached_queue_families[index];
        if is_known_unsatisfiable(cached, demand) {
            return Err(RenderError::FeatureNotPresent(
                "device previously failed queue-family selection".to_string(),
            ));
        }

        let resolved = if needs_search(cached, demand) {
            let handle = self.available_physical_devices[index];
            let families = unsafe {
                self.instance
                    .raw()
                    .get_physical_device_queue_family_properties(handle)
            };
            let surface = self.surface;
            let surface_loader = &self.surface_loader;
            let found = select_queue_families(&families, demand, |family_index| {
                unsafe {
                    surface_loader.get_physical_device_surface_support(handle, family_index, surface)
                }
                .map_err(RenderError::from)
            });
            match found {
                Ok(triple) => {
                    let marked = mark_searched(triple, demand);
                    self.cached_queue_families[index] = marked;
                    marked
                }
                Err(e) => {
                    // Remember the failure so the next attempt rejects at once.
                    self.cached_queue_families[index] = mark_searched(cached, demand);
                    return Err(e);
                }
            }
        } else {
            cached
        };

        // Demand filters which cached indices become active.
        Ok(QueueFamilyTriple {
            graphics: if demand.graphics { resolved.graphics } else { vk::QUEUE_FAMILY_IGNORED },
            present: if demand.present { resolved.present } else { vk::QUEUE_FAMILY_IGNORED },
            compute: if demand.compute { resolved.compute } else { vk::QUEUE_FAMILY_IGNORED },
        })
    }

    fn check_device_extensions(&mut self, handle: vk::PhysicalDevice) -> Result<()> {
        let available: Vec<CString> = unsafe {
            self.instance
                .raw()
                .enumerate_device_extension_properties(handle)
        }
        .map_err(RenderError::from)?
        .iter()
        .map(|p| {
            let bytes: Vec<u8> = p
                .extension_name
                .iter()
                .take_while(|&&c| c != 0)
                .map(|&c| c as u8)
                .collect();
            CString::new(bytes).unwrap_or_default()
        })
        .collect();

        let filtered = filter_supported(&self.device_extensions, &available);
        for dropped in self.device_extensions.iter().filter(|e| !filtered.contains(e)) {
            warn!("Device extension not available, dropping: {:?}", dropped);
        }
        self.device_extensions = filtered;
        Ok(())
    }

    /// Phase 5: creates the swapchain, then fires the create-swapchain
    /// callbacks.
    pub fn create_swapchain(
        &mut self,
        extent: vk::Extent2D,
        vsync: bool,
        flags: vk::SwapchainCreateFlagsKHR,
    ) -> Result<()> {
        let physical_handle = self
            .physical
            .as_ref()
            .ok_or_else(|| RenderError::Initialization("no device selected".to_string()))?
            .handle;
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical_handle, self.surface)
        }
        .map_err(RenderError::from)?;

        self.vsync = vsync;
        self.desc.flags = flags;
        self.desc.extent = choose_swap_extent(&capabilities, extent);
        self.desc.min_image_count = choose_image_count(&capabilities);
        self.desc.pre_transform = capabilities.current_transform;
        self.desc.composite_alpha = choose_composite_alpha(capabilities.supported_composite_alpha);
        self.desc.usage = choose_usage(capabilities.supported_usage_flags).map_err(|e| {
            error!("Failed to get supported usage flags.");
            e
        })?;

        if self.available_surface_formats.is_empty() {
            self.obtain_surface_formats()?;
        }
        if self.available_surface_formats.is_empty() {
            return Err(RenderError::FormatNotSupported(
                "surface reports no formats".to_string(),
            ));
        }
        if self.desc.format == vk::Format::UNDEFINED {
            let chosen = pick_default_surface_format(&self.available_surface_formats);
            self.desc.format = chosen.format;
            self.desc.color_space = chosen.color_space;
        }

        let present_modes = unsafe {
            self.surface_loader
                .get_physical_device_surface_present_modes(physical_handle, self.surface)
        }
        .map_err(RenderError::from)?;
        self.desc.present_mode = choose_present_mode(&present_modes, vsync);

        self.create_swapchain_internal(vk::SwapchainKHR::null())?;
        self.callbacks.fire(CallbackKind::CreateSwapchain);
        info!("Swapchain created successfully.");
        Ok(())
    }

    /// Selects a surface format; with a live swapchain this recreates it.
    pub fn set_surface_format(&mut self, requested: vk::SurfaceFormatKHR) -> Result<()> {
        if self.available_surface_formats.is_empty() {
            self.obtain_surface_formats()?;
        }
        let found = pick_surface_format(&self.available_surface_formats, requested)
            .ok_or_else(|| {
                RenderError::FormatNotSupported(format!(
                    "surface format {:?}/{:?} not available",
                    requested.format, requested.color_space
                ))
            })?;
        self.desc.format = found.format;
        self.desc.color_space = found.color_space;

        if self.swapchain.is_some() {
            return self.recreate_swapchain();
        }
        Ok(())
    }

    fn obtain_surface_formats(&mut self) -> Result<()> {
        let physical = self
            .physical
            .as_ref()
            .ok_or_else(|| RenderError::Initialization("no device selected".to_string()))?;
        self.available_surface_formats = unsafe {
            self.surface_loader
                .get_physical_device_surface_formats(physical.handle, self.surface)
        }
        .map_err(RenderError::from)?;
        info!(
            "Surface formats obtained successfully, {} formats found.",
            self.available_surface_formats.len()
        );
        Ok(())
    }

    fn create_swapchain_internal(&mut self, old_swapchain: vk::SwapchainKHR) -> Result<()> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| RenderError::Initialization("no logical device".to_string()))?;
        let loader = SwapchainLoader::new(self.instance.raw(), &device.raw);
        let state =
            SwapchainState::create(&device.raw, loader, self.surface, self.desc, old_swapchain)?;
        self.swapchain = Some(state);
        Ok(())
    }

    /// Recreates the swapchain after a resize or an out-of-date report.
    ///
    /// Waits for the graphics queue (and a distinct present queue) to go
    /// idle, fires the destroy-swapchain callbacks, rebuilds with the old
    /// swapchain chained, then fires the create-swapchain callbacks.
    /// A zero-area surface reports `SwapchainOutOfDate` without rebuilding.
    pub fn recreate_swapchain(&mut self) -> Result<()> {
        let physical = self
            .physical
            .as_ref()
            .ok_or_else(|| RenderError::Initialization("no device selected".to_string()))?;
        let capabilities = unsafe {
            self.surface_loader
                .get_physical_device_surface_capabilities(physical.handle, self.surface)
        }
        .map_err(RenderError::from)?;

        if capabilities.current_extent.width == 0 || capabilities.current_extent.height == 0 {
            return Err(RenderError::SwapchainOutOfDate);
        }
        self.desc.extent = capabilities.current_extent;

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| RenderError::Initialization("no logical device".to_string()))?;
        let queues = device.queues;
        let families = device.families;
        let device_raw = device.raw.clone();

        if let Some(queue) = queues.graphics {
            unsafe { device_raw.queue_wait_idle(queue) }.map_err(RenderError::from)?;
        }
        if families.present != families.graphics {
            if let Some(queue) = queues.present {
                unsafe { device_raw.queue_wait_idle(queue) }.map_err(RenderError::from)?;
            }
        }

        let mut old = self
            .swapchain
            .take()
            .ok_or_else(|| RenderError::Initialization("no swapchain to recreate".to_string()))?;

        self.callbacks.fire(CallbackKind::DestroySwapchain);

        // A swapchain retired by a previous recreation dies now.
        old.destroy_retired();
        old.destroy_views(&device_raw);
        // Ownership of the old handle passes into the new state via
        // `old_swapchain`.
        let old_handle = old.handle;
        old.handle = vk::SwapchainKHR::null();
        drop(old);

        self.create_swapchain_internal(old_handle)?;
        self.callbacks.fire(CallbackKind::CreateSwapchain);
        info!("Swapchain recreated successfully.");
        Ok(())
    }

    /// Acquires the next swapchain image, recreating and retrying on
    /// suboptimal/out-of-date reports. Any other error is returned.
    pub fn swap_image(&mut self, semaphore: vk::Semaphore) -> Result<u32> {
        // A retired swapchain chained by the last recreation can go now.
        if let Some(swapchain) = self.swapchain.as_mut() {
            swapchain.destroy_retired();
        }

        loop {
            let swapchain = self
                .swapchain
                .as_ref()
                .ok_or_else(|| RenderError::Initialization("no swapchain".to_string()))?;
            let acquired = unsafe {
                swapchain.loader.acquire_next_image(
                    swapchain.handle,
                    u64::MAX,
                    semaphore,
                    vk::Fence::null(),
                )
            };
            match acquired {
                Ok((index, false)) => {
                    self.current_image_index = index;
                    return Ok(index);
                }
                Ok((_, true)) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                    self.recreate_swapchain()?;
                }
                Err(e) => {
                    error!("Failed to acquire next image: {:?}.", e);
                    return Err(RenderError::from(e));
                }
            }
        }
    }

    /// Presents the current image, recreating the swapchain on
    /// suboptimal/out-of-date reports.
    pub fn present_image(&mut self, wait_semaphore: vk::Semaphore) -> Result<()> {
        let swapchain = self
            .swapchain
            .as_ref()
            .ok_or_else(|| RenderError::Initialization("no swapchain".to_string()))?;
        let present_queue = self
            .device
            .as_ref()
            .and_then(|d| d.queues.present)
            .ok_or_else(|| RenderError::Initialization("no present queue".to_string()))?;

        let swapchains = [swapchain.handle];
        let indices = [self.current_image_index];
        let wait_semaphores: &[vk::Semaphore] = if wait_semaphore == vk::Semaphore::null() {
            &[]
        } else {
            std::slice::from_ref(&wait_semaphore)
        };
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&indices);

        let result = unsafe { swapchain.loader.queue_present(present_queue, &present_info) };
        match result {
            Ok(false) => Ok(()),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => self.recreate_swapchain(),
            Err(e) => {
                error!("Failed to present image: {:?}.", e);
                Err(RenderError::from(e))
            }
        }
    }

    pub fn wait_idle(&self) -> Result<()> {
        if let Some(device) = &self.device {
            device.wait_idle()?;
        }
        Ok(())
    }

    // Accessors.

    pub fn instance(&self) -> &VulkanInstance {
        &self.instance
    }

    pub fn api_version(&self) -> u32 {
        self.instance.api_version()
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.surface
    }

    pub fn physical_device(&self) -> Option<&PhysicalDeviceInfo> {
        self.physical.as_ref()
    }

    pub fn logical_device(&self) -> Option<&LogicalDevice> {
        self.device.as_ref()
    }

    pub fn device_shared(&self) -> Option<Arc<DeviceShared>> {
        self.device.as_ref().map(|d| d.shared())
    }

    pub fn queues(&self) -> Queues {
        self.device.as_ref().map(|d| d.queues).unwrap_or_default()
    }

    pub fn queue_families(&self) -> QueueFamilyTriple {
        self.device
            .as_ref()
            .map(|d| d.families)
            .unwrap_or_default()
    }

    pub fn available_physical_device_count(&self) -> usize {
        self.available_physical_devices.len()
    }

    pub fn swapchain_desc(&self) -> &SwapchainDesc {
        &self.desc
    }

    pub fn swapchain_image_count(&self) -> usize {
        self.swapchain.as_ref().map_or(0, |s| s.images.len())
    }

    pub fn swapchain_image(&self, index: usize) -> Option<vk::Image> {
        self.swapchain.as_ref().and_then(|s| s.images.get(index)).copied()
    }

    pub fn swapchain_image_view(&self, index: usize) -> Option<vk::ImageView> {
        self.swapchain
            .as_ref()
            .and_then(|s| s.image_views.get(index))
            .copied()
    }

    pub fn current_image_index(&self) -> u32 {
        self.current_image_index
    }
}

impl Drop for VulkanCore {
    fn drop(&mut self) {
        if self.device.is_some() {
            let _ = self.wait_idle();
            if let Some(mut swapchain) = self.swapchain.take() {
                self.callbacks.fire(CallbackKind::DestroySwapchain);
                let device = self.device.as_ref().expect("device outlives swapchain");
                swapchain.destroy(&device.raw);
            }
            self.callbacks.fire(CallbackKind::DestroyDevice);
            if let Some(mut device) = self.device.take() {
                device.destroy();
            }
        }
        if self.surface != vk::SurfaceKHR::null() {
            unsafe {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            info!("Destroyed surface.");
        }
        self.callbacks.clear();
        // The instance (and messenger) drop after this body.
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn callbacks_fire_in_registration_order_for_both_sets() {
        let order = Rc::new(RefCell::new(Vec::new()));
        let mut registry = CallbackRegistry::default();
        for name in ["first", "second", "third"] {
            let order = Rc::clone(&order);
            registry.add(
                CallbackKind::DestroySwapchain,
                name,
                Box::new(move || order.borrow_mut().push(name)),
            );
        }
        registry.fire(CallbackKind::DestroySwapchain);
        assert_eq!(*order.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn removal_is_by_name_and_kind() {
        let hits = Rc::new(RefCell::new(0));
        let mut registry = CallbackRegistry::default();
        let h = Rc::clone(&hits);
        registry.add(CallbackKind::CreateDevice, "a", Box::new(move || *h.borrow_mut() += 1));
        let h = Rc::clone(&hits);
        registry.add(CallbackKind::CreateSwapchain, "a", Box::new(move || *h.borrow_mut() += 10));

        registry.remove(CallbackKind::CreateDevice, "a");
        registry.fire(CallbackKind::CreateDevice);
        registry.fire(CallbackKind::CreateSwapchain);
        assert_eq!(*hits.borrow(), 10);
    }
}
