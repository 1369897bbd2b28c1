//! Physical-device enumeration and queue-family selection.
//!
//! Queue-family indices use two sentinels: [`vk::QUEUE_FAMILY_IGNORED`]
//! means "feature disabled for this device, or not searched yet", and
//! [`NOT_FOUND`] means "search attempted and failed" — a device whose cached
//! triple carries `NOT_FOUND` for a demanded capability is rejected
//! immediately on repeated selection attempts.

use std::collections::HashSet;
use std::ffi::CStr;

use ash::vk;
use log::{debug, info, warn};

use crate::error::{RenderError, Result};

/// Sentinel for "searched and failed". Distinct from
/// `vk::QUEUE_FAMILY_IGNORED` so repeated selection can short-circuit.
/// Masking a found-or-ignored index with `NOT_FOUND` maps `IGNORED` to
/// `NOT_FOUND` and leaves real indices unchanged.
pub const NOT_FOUND: u32 = i32::MAX as u32;

/// Queue-family indices for one physical device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyTriple {
    pub graphics: u32,
    pub present: u32,
    pub compute: u32,
}

impl Default for QueueFamilyTriple {
    fn default() -> Self {
        QueueFamilyTriple {
            graphics: vk::QUEUE_FAMILY_IGNORED,
            present: vk::QUEUE_FAMILY_IGNORED,
            compute: vk::QUEUE_FAMILY_IGNORED,
        }
    }
}

/// Which queue capabilities the caller demands from a device.
///
/// The three supported modes are graphics+present+compute,
/// graphics+compute (headless), and compute-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDemand {
    pub graphics: bool,
    pub present: bool,
    pub compute: bool,
}

impl QueueDemand {
    pub fn graphics_present_compute() -> Self {
        QueueDemand { graphics: true, present: true, compute: true }
    }

    pub fn graphics_compute() -> Self {
        QueueDemand { graphics: true, present: false, compute: true }
    }

    pub fn compute_only() -> Self {
        QueueDemand { graphics: false, present: false, compute: true }
    }
}

/// Cached properties of an enumerated adapter.
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub handle: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub features: vk::PhysicalDeviceFeatures,
}

impl PhysicalDeviceInfo {
    pub fn query(instance: &ash::Instance, handle: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(handle) };
        let memory_properties = unsafe { instance.get_physical_device_memory_properties(handle) };
        let features = unsafe { instance.get_physical_device_features(handle) };
        PhysicalDeviceInfo { handle, properties, memory_properties, features }
    }

    pub fn name(&self) -> String {
        unsafe { CStr::from_ptr(self.properties.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    }
}

/// Enumerates the adapters visible to the instance.
pub fn enumerate_physical_devices(instance: &ash::Instance) -> Result<Vec<vk::PhysicalDevice>> {
    let devices = unsafe { instance.enumerate_physical_devices() }.map_err(RenderError::from)?;
    info!("Enumerated physical devices successfully, {} device(s) found.", devices.len());
    Ok(devices)
}

/// Single-pass queue-family selection.
///
/// Preference order: a family supporting every demanded capability, then a
/// family supporting graphics+compute jointly, then the first family per
/// capability. Fails with `FeatureNotPresent` when a demanded capability is
/// unmet. `supports_present` answers per-family presentation support and is
/// only consulted when presentation is demanded.
pub fn select_queue_families(
    families: &[vk::QueueFamilyProperties],
    demand: QueueDemand,
    mut supports_present: impl FnMut(u32) -> Result<bool>,
) -> Result<QueueFamilyTriple> {
    if families.is_empty() {
        return Err(RenderError::Initialization(
            "failed to get queue family properties".to_string(),
        ));
    }

    let mut triple = QueueFamilyTriple::default();

    for (i, family) in families.iter().enumerate() {
        let index = i as u32;
        let graphics = demand.graphics && family.queue_flags.contains(vk::QueueFlags::GRAPHICS);
        let compute = demand.compute && family.queue_flags.contains(vk::QueueFlags::COMPUTE);
        let present = demand.present && supports_present(index)?;

        if graphics && compute {
            if present {
                triple.graphics = index;
                triple.present = index;
                triple.compute = index;
                break;
            }
            // Keep graphics and compute unified on one family.
            if triple.graphics != triple.compute || triple.graphics == vk::QUEUE_FAMILY_IGNORED {
                triple.graphics = index;
                triple.compute = index;
            }
            if !demand.present {
                break;
            }
        }

        if graphics && triple.graphics == vk::QUEUE_FAMILY_IGNORED {
            triple.graphics = index;
        }
        if present && triple.present == vk::QUEUE_FAMILY_IGNORED {
            triple.present = index;
        }
        if compute && triple.compute == vk::QUEUE_FAMILY_IGNORED {
            triple.compute = index;
        }
    }

    if (triple.graphics == vk::QUEUE_FAMILY_IGNORED && demand.graphics)
        || (triple.present == vk::QUEUE_FAMILY_IGNORED && demand.present)
        || (triple.compute == vk::QUEUE_FAMILY_IGNORED && demand.compute)
    {
        warn!("Failed to obtain queue family indices for demand {:?}.", demand);
        return Err(RenderError::FeatureNotPresent(
            "no queue family satisfies the requested capabilities".to_string(),
        ));
    }

    debug!("Queue family indices obtained successfully: {:?}", triple);
    Ok(triple)
}

/// Marks a freshly searched triple for the cache: demanded capabilities that
/// came back `IGNORED` become [`NOT_FOUND`] so the next attempt on the same
/// device rejects immediately.
pub fn mark_searched(triple: QueueFamilyTriple, demand: QueueDemand) -> QueueFamilyTriple {
    let mask = |index: u32, wanted: bool| -> u32 {
        if wanted {
            index & NOT_FOUND
        } else {
            index
        }
    };
    QueueFamilyTriple {
        graphics: mask(triple.graphics, demand.graphics),
        present: mask(triple.present, demand.present),
        compute: mask(triple.compute, demand.compute),
    }
}

/// Whether a cached triple already proves the device cannot satisfy the
/// demand.
pub fn is_known_unsatisfiable(cached: QueueFamilyTriple, demand: QueueDemand) -> bool {
    (cached.graphics == NOT_FOUND && demand.graphics)
        || (cached.present == NOT_FOUND && demand.present)
        || (cached.compute == NOT_FOUND && demand.compute)
}

/// Whether a cached triple still needs a search for the given demand.
pub fn needs_search(cached: QueueFamilyTriple, demand: QueueDemand) -> bool {
    (cached.graphics == vk::QUEUE_FAMILY_IGNORED && demand.graphics)
        || (cached.present == vk::QUEUE_FAMILY_IGNORED && demand.present)
        || (cached.compute == vk::QUEUE_FAMILY_IGNORED && demand.compute)
}

/// The distinct real family indices of a triple, in first-seen order.
pub fn unique_family_indices(triple: QueueFamilyTriple) -> Vec<u32> {
    let mut seen = HashSet::new();
    let mut unique = Vec::new();
    for index in [triple.graphics, triple.present, triple.compute] {
        if index != vk::QUEUE_FAMILY_IGNORED && index != NOT_FOUND && seen.insert(index) {
            unique.push(index);
        }
    }
    unique
}

/// Finds the first candidate format supporting the requested features for
/// the given tiling.
pub fn find_supported_format(
    instance: &ash::Instance,
    physical_device: vk::PhysicalDevice,
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
) -> Option<vk::Format> {
    for &format in candidates {
        let props = unsafe { instance.get_physical_device_format_properties(physical_device, format) };
        let supported = match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        };
        if supported {
            return Some(format);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    const G: vk::QueueFlags = vk::QueueFlags::GRAPHICS;
    const C: vk::QueueFlags = vk::QueueFlags::COMPUTE;
    const T: vk::QueueFlags = vk::QueueFlags::TRANSFER;

    #[test]
    fn prefers_single_family_for_all_three() {
        let families = [family(T), family(G | C)];
        let triple = select_queue_families(
            &families,
            QueueDemand::graphics_present_compute(),
            |i| Ok(i == 1),
        )
        .unwrap();
        assert_eq!(triple, QueueFamilyTriple { graphics: 1, present: 1, compute: 1 });
    }

    #[test]
    fn unifies_graphics_and_compute_when_present_elsewhere() {
        // Family 0 presents only, family 1 does graphics+compute.
        let families = [family(T), family(G | C)];
        let triple = select_queue_families(
            &families,
            QueueDemand::graphics_present_compute(),
            |i| Ok(i == 0),
        )
        .unwrap();
        assert_eq!(triple.graphics, 1);
        assert_eq!(triple.compute, 1);
        assert_eq!(triple.present, 0);
    }

    #[test]
    fn distributes_across_three_families() {
        let families = [family(G), family(C), family(T)];
        let triple = select_queue_families(
            &families,
            QueueDemand::graphics_present_compute(),
            |i| Ok(i == 2),
        )
        .unwrap();
        assert_eq!(triple, QueueFamilyTriple { graphics: 0, present: 2, compute: 1 });
    }

    #[test]
    fn headless_mode_stops_at_first_joint_family() {
        let families = [family(G | C), family(G | C)];
        let mut asked = 0;
        let triple = select_queue_families(&families, QueueDemand::graphics_compute(), |_| {
            asked += 1;
            Ok(false)
        })
        .unwrap();
        assert_eq!(triple.graphics, 0);
        assert_eq!(triple.compute, 0);
        assert_eq!(triple.present, vk::QUEUE_FAMILY_IGNORED);
        assert_eq!(asked, 0, "present support must not be queried when not demanded");
    }

    #[test]
    fn compute_only_ignores_graphics() {
        let families = [family(G), family(C)];
        let triple =
            select_queue_families(&families, QueueDemand::compute_only(), |_| Ok(false)).unwrap();
        assert_eq!(triple.compute, 1);
        assert_eq!(triple.graphics, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn unmet_demand_is_feature_not_present() {
        let families = [family(T)];
        let err = select_queue_families(
            &families,
            QueueDemand::graphics_present_compute(),
            |_| Ok(true),
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::FeatureNotPresent(_)));
    }

    #[test]
    fn mark_searched_maps_ignored_to_not_found() {
        let searched = mark_searched(QueueFamilyTriple::default(), QueueDemand::graphics_compute());
        assert_eq!(searched.graphics, NOT_FOUND);
        assert_eq!(searched.compute, NOT_FOUND);
        // Present was not demanded, so the sentinel is untouched.
        assert_eq!(searched.present, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn mark_searched_keeps_real_indices() {
        let triple = QueueFamilyTriple { graphics: 0, present: 2, compute: 1 };
        let searched = mark_searched(triple, QueueDemand::graphics_present_compute());
        assert_eq!(searched, triple);
    }

    #[test]
    fn cache_short_circuit_detection() {
        let cached = QueueFamilyTriple {
            graphics: NOT_FOUND,
            present: vk::QUEUE_FAMILY_IGNORED,
            compute: 0,
        };
        assert!(is_known_unsatisfiable(cached, QueueDemand::graphics_compute()));
        assert!(!is_known_unsatisfiable(cached, QueueDemand::compute_only()));
        assert!(needs_search(cached, QueueDemand::graphics_present_compute()));
        assert!(!needs_search(cached, QueueDemand::compute_only()));
    }

    #[test]
    fn unique_indices_skips_sentinels_and_duplicates() {
        let triple = QueueFamilyTriple { graphics: 1, present: 1, compute: NOT_FOUND };
        assert_eq!(unique_family_indices(triple), vec![1]);
        let triple = QueueFamilyTriple { graphics: 0, present: 2, compute: 0 };
        assert_eq!(unique_family_indices(triple), vec![0, 2]);
    }
}
