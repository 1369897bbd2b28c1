//! Wrapper around the VMA pooled allocator.
//!
//! Centralizes every `vk-mem` call so resource bundles and staging buffers
//! talk to one narrow API. Created by the context facade at device
//! creation and shared behind an `Arc`.

use ash::vk;
use log::{debug, info};
use vk_mem::Alloc;

use crate::error::{RenderError, Result};

/// The pooled allocator. Destroying it frees every allocation it made, so
/// the facade drops it only after all pooled resources are gone.
pub struct Allocator {
    raw: vk_mem::Allocator,
}

impl Allocator {
    /// Initializes VMA for the given instance/device pair.
    pub fn new(
        instance: &ash::Instance,
        device: &ash::Device,
        physical_device: vk::PhysicalDevice,
        api_version: u32,
    ) -> Result<Self> {
        let create_info = vk_mem::AllocatorCreateInfo::new(instance, device, physical_device)
            .vulkan_api_version(api_version);
        let raw = vk_mem::Allocator::new(create_info).map_err(RenderError::Allocation)?;
        info!("VMA allocator initialized.");
        Ok(Allocator { raw })
    }

    pub fn create_buffer(
        &self,
        buffer_create_info: &vk::BufferCreateInfo,
        allocation_create_info: &vk_mem::AllocationCreateInfo,
    ) -> Result<(vk::Buffer, vk_mem::Allocation, vk_mem::AllocationInfo)> {
        let (buffer, allocation) =
            unsafe { self.raw.create_buffer(buffer_create_info, allocation_create_info) }
                .map_err(RenderError::Allocation)?;
        let info = self.raw.get_allocation_info(&allocation);
        debug!("Created buffer {:?} via VMA (size {}).", buffer, buffer_create_info.size);
        Ok((buffer, allocation, info))
    }

    pub fn destroy_buffer(&self, buffer: vk::Buffer, allocation: &mut vk_mem::Allocation) {
        unsafe {
            self.raw.destroy_buffer(buffer, allocation);
        }
        debug!("Destroyed buffer {:?} via VMA.", buffer);
    }

    pub fn create_image(
        &self,
        image_create_info: &vk::ImageCreateInfo,
        allocation_create_info: &vk_mem::AllocationCreateInfo,
    ) -> Result<(vk::Image, vk_mem::Allocation, vk_mem::AllocationInfo)> {
        let (image, allocation) =
            unsafe { self.raw.create_image(image_create_info, allocation_create_info) }
                .map_err(RenderError::Allocation)?;
        let info = self.raw.get_allocation_info(&allocation);
        debug!("Created image {:?} via VMA.", image);
        Ok((image, allocation, info))
    }

    pub fn destroy_image(&self, image: vk::Image, allocation: &mut vk_mem::Allocation) {
        unsafe {
            self.raw.destroy_image(image, allocation);
        }
        debug!("Destroyed image {:?} via VMA.", image);
    }

    pub fn map_memory(&self, allocation: &mut vk_mem::Allocation) -> Result<*mut u8> {
        let ptr = unsafe { self.raw.map_memory(allocation) }.map_err(RenderError::Allocation)?;
        Ok(ptr)
    }

    pub fn unmap_memory(&self, allocation: &mut vk_mem::Allocation) {
        unsafe {
            self.raw.unmap_memory(allocation);
        }
    }

    pub fn flush_allocation(
        &self,
        allocation: &vk_mem::Allocation,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<()> {
        self.raw
            .flush_allocation(allocation, offset as usize, size as usize)
            .map_err(RenderError::Allocation)
    }

    pub fn invalidate_allocation(
        &self,
        allocation: &vk_mem::Allocation,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<()> {
        self.raw
            .invalidate_allocation(allocation, offset as usize, size as usize)
            .map_err(RenderError::Allocation)
    }

    /// Property flags of the memory type an allocation landed in.
    pub fn memory_type_properties(&self, memory_type_index: u32) -> vk::MemoryPropertyFlags {
        unsafe { self.raw.get_memory_properties() }
            .memory_types
            .get(memory_type_index as usize)
            .map(|memory_type| memory_type.property_flags)
            .unwrap_or_default()
    }
}
