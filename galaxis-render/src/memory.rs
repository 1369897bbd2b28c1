//! Device memory and resource+memory bundles.
//!
//! Two allocation paths exist side by side: the manual path walks the
//! memory-type table itself and binds a [`DeviceMemory`]; the pooled path
//! delegates to the VMA allocator. A bundle is valid only once its memory
//! is bound, which both constructors do before returning.

use std::sync::Arc;

use ash::vk;
use log::{debug, error};

use crate::allocator::Allocator;
use crate::device::DeviceShared;
use crate::error::{RenderError, Result};
use crate::handles::{Buffer, Image};

/// First memory-type index whose requirement bit is set and whose property
/// flags are a superset of `flags`.
pub fn find_memory_type_index(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    memory_type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        memory_type_bits & (1 << i) != 0
            && memory_properties.memory_types[i as usize]
                .property_flags
                .contains(flags)
    })
}

/// Memory-type search with the lazily-allocated retry: when the request
/// contains `LAZILY_ALLOCATED` and fails, the flag is stripped and the
/// search runs once more.
pub fn find_memory_type_index_with_fallback(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    memory_type_bits: u32,
    flags: vk::MemoryPropertyFlags,
) -> Option<u32> {
    find_memory_type_index(memory_properties, memory_type_bits, flags).or_else(|| {
        if flags.contains(vk::MemoryPropertyFlags::LAZILY_ALLOCATED) {
            find_memory_type_index(
                memory_properties,
                memory_type_bits,
                flags & !vk::MemoryPropertyFlags::LAZILY_ALLOCATED,
            )
        } else {
            None
        }
    })
}

/// Expands `[offset, offset+size)` to non-coherent-atom granularity,
/// clamped to the allocation size. Returns the aligned offset, the aligned
/// size, and the delta from the aligned offset back to the requested one.
pub fn align_non_coherent_range(
    atom_size: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
) -> (vk::DeviceSize, vk::DeviceSize, vk::DeviceSize) {
    let begin = offset / atom_size * atom_size;
    let end = ((offset + size + atom_size - 1) / atom_size * atom_size).min(allocation_size);
    (begin, end - begin, offset - begin)
}

/// Owning wrapper for `vk::DeviceMemory` with mapping state.
///
/// Tracks the two mapped-pointer slots (data for fetches, target for
/// submits) and the persistent-mapping flag. Non-coherent memory is
/// flushed on unmap and invalidated on map-for-fetch, over ranges aligned
/// to `nonCoherentAtomSize`.
pub struct DeviceMemory {
    device: ash::Device,
    handle: vk::DeviceMemory,
    non_coherent_atom_size: vk::DeviceSize,
    allocation_size: vk::DeviceSize,
    property_flags: vk::MemoryPropertyFlags,
    mapped_data: *mut u8,
    mapped_target: *mut u8,
    persistently_mapped: bool,
}

impl DeviceMemory {
    /// Allocates device memory. The memory-type index must come from a
    /// prior search over the same device's table.
    pub fn allocate(
        shared: &DeviceShared,
        allocate_info: &vk::MemoryAllocateInfo,
    ) -> Result<Self> {
        if allocate_info.memory_type_index >= shared.memory_properties.memory_type_count {
            error!("Invalid memory type index: {}.", allocate_info.memory_type_index);
            return Err(RenderError::MemoryMapFailed(format!(
                "invalid memory type index {}",
                allocate_info.memory_type_index
            )));
        }

        let handle = unsafe { shared.device.allocate_memory(allocate_info, None) }.map_err(|e| {
            error!("Failed to allocate memory: {}", e);
            RenderError::from(e)
        })?;
        debug!("Device memory allocated successfully.");

        Ok(DeviceMemory {
            device: shared.device.clone(),
            handle,
            non_coherent_atom_size: shared.properties.limits.non_coherent_atom_size,
            allocation_size: allocate_info.allocation_size,
            property_flags: shared.memory_properties.memory_types
                [allocate_info.memory_type_index as usize]
                .property_flags,
            mapped_data: std::ptr::null_mut(),
            mapped_target: std::ptr::null_mut(),
            persistently_mapped: false,
        })
    }

    pub fn handle(&self) -> vk::DeviceMemory {
        self.handle
    }

    pub fn allocation_size(&self) -> vk::DeviceSize {
        self.allocation_size
    }

    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.property_flags
    }

    pub fn is_persistently_mapped(&self) -> bool {
        self.persistently_mapped
    }

    /// The live submit-side mapping, null when nothing is mapped. Callers
    /// that scatter writes themselves reuse this under persistent mapping
    /// instead of mapping again.
    pub fn mapped_target(&self) -> *mut u8 {
        self.mapped_target
    }

    /// Keep the memory mapped across submits/fetches; unmapped only on
    /// destruction (or when disabled again).
    pub fn enable_persistent_mapping(&mut self) {
        self.persistently_mapped = true;
    }

    pub fn disable_persistent_mapping(&mut self) -> Result<()> {
        self.persistently_mapped = false;
        if !self.mapped_data.is_null() || !self.mapped_target.is_null() {
            self.unmap(0, self.allocation_size)?;
        }
        Ok(())
    }

    fn is_coherent(&self) -> bool {
        self.property_flags.contains(vk::MemoryPropertyFlags::HOST_COHERENT)
    }

    /// Maps `[offset, offset+size)` for writing. The returned pointer
    /// addresses the requested offset even when the underlying map had to
    /// be widened for non-coherent alignment.
    pub fn map_for_submit(
        &mut self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<*mut u8> {
        let (map_offset, map_size, delta) = if self.is_coherent() {
            (offset, size, 0)
        } else {
            align_non_coherent_range(self.non_coherent_atom_size, self.allocation_size, offset, size)
        };

        let ptr = self.map_raw(map_offset, map_size)?;
        let adjusted = unsafe { ptr.add(delta as usize) };
        self.mapped_target = adjusted;
        Ok(adjusted)
    }

    /// Maps `[offset, offset+size)` for reading, invalidating the aligned
    /// range on non-coherent memory so device writes become visible.
    pub fn map_for_fetch(
        &mut self,
        offset: vk::DeviceSize,
        size: vk::DeviceSize,
    ) -> Result<*mut u8> {
        let (map_offset, map_size, delta) = if self.is_coherent() {
            (offset, size, 0)
        } else {
            align_non_coherent_range(self.non_coherent_atom_size, self.allocation_size, offset, size)
        };

        let ptr = self.map_raw(map_offset, map_size)?;
        if !self.is_coherent() {
            let range = vk::MappedMemoryRange::builder()
                .memory(self.handle)
                .offset(map_offset)
                .size(map_size);
            unsafe { self.device.invalidate_mapped_memory_ranges(&[range.build()]) }.map_err(
                |e| {
                    error!("Failed to invalidate mapped memory range: {}", e);
                    RenderError::from(e)
                },
            )?;
        }
        let adjusted = unsafe { ptr.add(delta as usize) };
        self.mapped_data = adjusted;
        Ok(adjusted)
    }

    /// Unmaps, flushing the aligned range first on non-coherent memory so
    /// host writes become visible to the device.
    pub fn unmap(&mut self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<()> {
        if !self.is_coherent() {
            let (map_offset, map_size, _) = align_non_coherent_range(
                self.non_coherent_atom_size,
                self.allocation_size,
                offset,
                size,
            );
            let range = vk::MappedMemoryRange::builder()
                .memory(self.handle)
                .offset(map_offset)
                .size(map_size);
            unsafe { self.device.flush_mapped_memory_ranges(&[range.build()]) }.map_err(|e| {
                error!("Failed to flush mapped memory range: {}", e);
                RenderError::from(e)
            })?;
        }

        unsafe {
            self.device.unmap_memory(self.handle);
        }
        self.mapped_data = std::ptr::null_mut();
        self.mapped_target = std::ptr::null_mut();
        Ok(())
    }

    /// Host-boundary write: map (or reuse the persistent mapping), copy,
    /// unmap unless persistently mapped. Issues no GPU work.
    pub fn submit_data(
        &mut self,
        map_offset: vk::DeviceSize,
        submit_offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<()> {
        let target = if !self.persistently_mapped || self.mapped_target.is_null() {
            let base = if self.persistently_mapped { 0 } else { map_offset };
            self.map_for_submit(base, data.len() as vk::DeviceSize)?
        } else {
            self.mapped_target
        };

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                target.add(submit_offset as usize),
                data.len(),
            );
        }

        if !self.persistently_mapped {
            self.unmap(map_offset, data.len() as vk::DeviceSize)?;
        }
        Ok(())
    }

    /// Host-boundary read: the inverse of [`Self::submit_data`].
    pub fn fetch_data(
        &mut self,
        map_offset: vk::DeviceSize,
        fetch_offset: vk::DeviceSize,
        target: &mut [u8],
    ) -> Result<()> {
        let data = if !self.persistently_mapped || self.mapped_data.is_null() {
            let base = if self.persistently_mapped { 0 } else { map_offset };
            self.map_for_fetch(base, target.len() as vk::DeviceSize)?
        } else {
            self.mapped_data
        };

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.add(fetch_offset as usize),
                target.as_mut_ptr(),
                target.len(),
            );
        }

        if !self.persistently_mapped {
            self.unmap(map_offset, target.len() as vk::DeviceSize)?;
        }
        Ok(())
    }

    fn map_raw(&self, offset: vk::DeviceSize, size: vk::DeviceSize) -> Result<*mut u8> {
        let ptr = unsafe {
            self.device
                .map_memory(self.handle, offset, size, vk::MemoryMapFlags::empty())
        }
        .map_err(|e| {
            error!("Failed to map memory: {}", e);
            RenderError::MemoryMapFailed(e.to_string())
        })?;
        Ok(ptr.cast())
    }
}

impl Drop for DeviceMemory {
    fn drop(&mut self) {
        // Destructor guard: a persistent mapping left open is closed here.
        if self.persistently_mapped && (!self.mapped_data.is_null() || !self.mapped_target.is_null())
        {
            let _ = self.unmap(0, self.allocation_size);
        }
        if self.handle != vk::DeviceMemory::null() {
            unsafe {
                self.device.free_memory(self.handle, None);
            }
            debug!("Device memory freed successfully.");
        }
    }
}

/// The backing allocation of a resource bundle.
pub enum MemoryBacking {
    /// Manually searched and bound device memory.
    Manual(DeviceMemory),
    /// A VMA allocation; the allocator both created and will destroy the
    /// resource together with its memory.
    Pooled {
        allocator: Arc<Allocator>,
        allocation: vk_mem::Allocation,
        property_flags: vk::MemoryPropertyFlags,
        mapped_ptr: *mut u8,
        device_memory: vk::DeviceMemory,
        memory_offset: vk::DeviceSize,
    },
}

impl MemoryBacking {
    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        match self {
            MemoryBacking::Manual(memory) => memory.property_flags(),
            MemoryBacking::Pooled { property_flags, .. } => *property_flags,
        }
    }

    pub fn is_pooled(&self) -> bool {
        matches!(self, MemoryBacking::Pooled { .. })
    }
}

/// A buffer bundled with its backing allocation, bound on construction.
pub struct BufferMemory {
    buffer: Buffer,
    backing: MemoryBacking,
    allocation_size: vk::DeviceSize,
    bound: bool,
}

impl BufferMemory {
    /// Manual path: create the buffer, search the memory-type table for the
    /// requested property flags (with the lazily-allocated retry), allocate
    /// and bind at offset 0.
    pub fn new_manual(
        shared: &DeviceShared,
        create_info: &vk::BufferCreateInfo,
        memory_flags: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let buffer = Buffer::new(&shared.device, create_info)?;
        let requirements =
            unsafe { shared.device.get_buffer_memory_requirements(buffer.handle()) };

        let type_index = find_memory_type_index_with_fallback(
            &shared.memory_properties,
            requirements.memory_type_bits,
            memory_flags,
        )
        .ok_or_else(|| {
            RenderError::FeatureNotPresent(format!(
                "no memory type satisfies {memory_flags:?} for this buffer"
            ))
        })?;

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);
        let memory = DeviceMemory::allocate(shared, &allocate_info)?;

        unsafe {
            shared
                .device
                .bind_buffer_memory(buffer.handle(), memory.handle(), 0)
        }
        .map_err(|e| {
            error!("Failed to bind buffer memory: {}", e);
            RenderError::from(e)
        })?;
        debug!("Buffer memory bound successfully.");

        let allocation_size = memory.allocation_size();
        Ok(BufferMemory {
            buffer,
            backing: MemoryBacking::Manual(memory),
            allocation_size,
            bound: true,
        })
    }

    /// Pooled path: VMA creates, allocates and binds in one step.
    pub fn new_pooled(
        shared: &DeviceShared,
        allocator: &Arc<Allocator>,
        allocation_create_info: &vk_mem::AllocationCreateInfo,
        create_info: &vk::BufferCreateInfo,
    ) -> Result<Self> {
        let (raw_buffer, allocation, info) =
            allocator.create_buffer(create_info, allocation_create_info)?;
        let property_flags = allocator.memory_type_properties(info.memory_type);

        Ok(BufferMemory {
            buffer: Buffer::from_raw(&shared.device, raw_buffer),
            backing: MemoryBacking::Pooled {
                allocator: Arc::clone(allocator),
                allocation,
                property_flags,
                mapped_ptr: info.mapped_data.cast(),
                device_memory: info.device_memory,
                memory_offset: info.offset,
            },
            allocation_size: create_info.size,
            bound: true,
        })
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    pub fn allocation_size(&self) -> vk::DeviceSize {
        self.allocation_size
    }

    pub fn property_flags(&self) -> vk::MemoryPropertyFlags {
        self.backing.property_flags()
    }

    pub fn is_using_vma(&self) -> bool {
        self.backing.is_pooled()
    }

    /// Valid only when the resource exists and its memory was bound.
    pub fn is_valid(&self) -> bool {
        self.bound && self.buffer.is_valid()
    }

    /// The raw device memory backing this buffer plus the offset the buffer
    /// was bound at, for callers that alias other resources over it.
    pub fn device_memory_and_offset(&self) -> (vk::DeviceMemory, vk::DeviceSize) {
        match &self.backing {
            MemoryBacking::Manual(memory) => (memory.handle(), 0),
            MemoryBacking::Pooled { device_memory, memory_offset, .. } => {
                (*device_memory, *memory_offset)
            }
        }
    }

    /// The manual backing, for callers that manage mapping directly.
    pub fn memory_mut(&mut self) -> Option<&mut DeviceMemory> {
        match &mut self.backing {
            MemoryBacking::Manual(memory) => Some(memory),
            MemoryBacking::Pooled { .. } => None,
        }
    }

    pub fn memory(&self) -> Option<&DeviceMemory> {
        match &self.backing {
            MemoryBacking::Manual(memory) => Some(memory),
            MemoryBacking::Pooled { .. } => None,
        }
    }

    /// The persistent mapping of a pooled allocation created with the
    /// MAPPED flag, when present.
    pub fn pooled_mapped_ptr(&self) -> Option<*mut u8> {
        match &self.backing {
            MemoryBacking::Manual(_) => None,
            MemoryBacking::Pooled { mapped_ptr, .. } => {
                (!mapped_ptr.is_null()).then_some(*mapped_ptr)
            }
        }
    }

    pub fn enable_persistent_mapping(&mut self) {
        if let MemoryBacking::Manual(memory) = &mut self.backing {
            memory.enable_persistent_mapping();
        }
        // Pooled staging allocations are created persistently mapped via
        // the MAPPED allocation flag; nothing to do here.
    }

    pub fn disable_persistent_mapping(&mut self) -> Result<()> {
        if let MemoryBacking::Manual(memory) = &mut self.backing {
            memory.disable_persistent_mapping()?;
        }
        Ok(())
    }

    /// Host-boundary write into the buffer.
    pub fn submit_buffer_data(
        &mut self,
        map_offset: vk::DeviceSize,
        submit_offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<()> {
        match &mut self.backing {
            MemoryBacking::Manual(memory) => memory.submit_data(map_offset, submit_offset, data),
            MemoryBacking::Pooled { allocator, allocation, mapped_ptr, .. } => {
                if !mapped_ptr.is_null() {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            data.as_ptr(),
                            mapped_ptr.add((map_offset + submit_offset) as usize),
                            data.len(),
                        );
                    }
                    allocator.flush_allocation(
                        allocation,
                        map_offset + submit_offset,
                        data.len() as vk::DeviceSize,
                    )?;
                } else {
                    let ptr = allocator.map_memory(allocation)?;
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            data.as_ptr(),
                            ptr.add((map_offset + submit_offset) as usize),
                            data.len(),
                        );
                    }
                    allocator.flush_allocation(
                        allocation,
                        map_offset + submit_offset,
                        data.len() as vk::DeviceSize,
                    )?;
                    allocator.unmap_memory(allocation);
                }
                Ok(())
            }
        }
    }

    /// Host-boundary read out of the buffer.
    pub fn fetch_buffer_data(
        &mut self,
        map_offset: vk::DeviceSize,
        fetch_offset: vk::DeviceSize,
        target: &mut [u8],
    ) -> Result<()> {
        match &mut self.backing {
            MemoryBacking::Manual(memory) => memory.fetch_data(map_offset, fetch_offset, target),
            MemoryBacking::Pooled { allocator, allocation, mapped_ptr, .. } => {
                allocator.invalidate_allocation(
                    allocation,
                    map_offset + fetch_offset,
                    target.len() as vk::DeviceSize,
                )?;
                if !mapped_ptr.is_null() {
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            mapped_ptr.add((map_offset + fetch_offset) as usize),
                            target.as_mut_ptr(),
                            target.len(),
                        );
                    }
                } else {
                    let ptr = allocator.map_memory(allocation)?;
                    unsafe {
                        std::ptr::copy_nonoverlapping(
                            ptr.add((map_offset + fetch_offset) as usize),
                            target.as_mut_ptr(),
                            target.len(),
                        );
                    }
                    allocator.unmap_memory(allocation);
                }
                Ok(())
            }
        }
    }
}

impl Drop for BufferMemory {
    fn drop(&mut self) {
        if let MemoryBacking::Pooled { allocator, allocation, .. } = &mut self.backing {
            // VMA frees buffer and allocation together; keep the wrapper
            // from double-destroying the buffer.
            let handle = self.buffer.take();
            if handle != vk::Buffer::null() {
                allocator.destroy_buffer(handle, allocation);
            }
        }
        // Manual path: the Buffer wrapper destroys the buffer, then the
        // DeviceMemory frees the allocation.
    }
}

/// An image bundled with its backing allocation, bound on construction.
pub struct ImageMemory {
    image: Image,
    backing: MemoryBacking,
    allocation_size: vk::DeviceSize,
    bound: bool,
}

impl ImageMemory {
    /// Manual path, with the lazily-allocated retry for transient
    /// attachments.
    pub fn new_manual(
        shared: &DeviceShared,
        create_info: &vk::ImageCreateInfo,
        memory_flags: vk::MemoryPropertyFlags,
    ) -> Result<Self> {
        let image = Image::new(&shared.device, create_info)?;
        let requirements = unsafe { shared.device.get_image_memory_requirements(image.handle()) };

        let type_index = find_memory_type_index_with_fallback(
            &shared.memory_properties,
            requirements.memory_type_bits,
            memory_flags,
        )
        .ok_or_else(|| {
            RenderError::FeatureNotPresent(format!(
                "no memory type satisfies {memory_flags:?} for this image"
            ))
        })?;

        let allocate_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(type_index);
        let memory = DeviceMemory::allocate(shared, &allocate_info)?;

        unsafe {
            shared
                .device
                .bind_image_memory(image.handle(), memory.handle(), 0)
        }
        .map_err(|e| {
            error!("Failed to bind image memory: {}", e);
            RenderError::from(e)
        })?;
        debug!("Image memory bound successfully.");

        let allocation_size = memory.allocation_size();
        Ok(ImageMemory {
            image,
            backing: MemoryBacking::Manual(memory),
            allocation_size,
            bound: true,
        })
    }

    /// Pooled path via VMA.
    pub fn new_pooled(
        shared: &DeviceShared,
        allocator: &Arc<Allocator>,
        allocation_create_info: &vk_mem::AllocationCreateInfo,
        create_info: &vk::ImageCreateInfo,
    ) -> Result<Self> {
        let (raw_image, allocation, info) =
            allocator.create_image(create_info, allocation_create_info)?;
        let property_flags = allocator.memory_type_properties(info.memory_type);

        Ok(ImageMemory {
            image: Image::from_raw(&shared.device, raw_image),
            backing: MemoryBacking::Pooled {
                allocator: Arc::clone(allocator),
                allocation,
                property_flags,
                mapped_ptr: info.mapped_data.cast(),
                device_memory: info.device_memory,
                memory_offset: info.offset,
            },
            allocation_size: 0,
            bound: true,
        })
    }

    pub fn image(&self) -> &Image {
        &self.image
    }

    pub fn allocation_size(&self) -> vk::DeviceSize {
        self.allocation_size
    }

    pub fn is_using_vma(&self) -> bool {
        self.backing.is_pooled()
    }

    pub fn is_valid(&self) -> bool {
        self.bound && self.image.is_valid()
    }
}

impl Drop for ImageMemory {
    fn drop(&mut self) {
        if let MemoryBacking::Pooled { allocator, allocation, .. } = &mut self.backing {
            let handle = self.image.take();
            if handle != vk::Image::null() {
                allocator.destroy_image(handle, allocation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_properties(types: &[(u32, vk::MemoryPropertyFlags)]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, (heap, flags)) in types.iter().enumerate() {
            props.memory_types[i] = vk::MemoryType { property_flags: *flags, heap_index: *heap };
        }
        props
    }

    const DL: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::DEVICE_LOCAL;
    const HV: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::HOST_VISIBLE;

    #[test]
    fn picks_first_superset_type() {
        let props = memory_properties(&[(0, DL), (0, HV), (0, vk::MemoryPropertyFlags::from_raw(DL.as_raw() | HV.as_raw()))]);
        assert_eq!(find_memory_type_index(&props, 0b111, HV), Some(1));
        assert_eq!(
            find_memory_type_index(&props, 0b111, vk::MemoryPropertyFlags::from_raw(DL.as_raw() | HV.as_raw())),
            Some(2)
        );
    }

    #[test]
    fn respects_memory_type_bits() {
        let props = memory_properties(&[(0, HV), (0, HV)]);
        assert_eq!(find_memory_type_index(&props, 0b10, HV), Some(1));
        assert_eq!(find_memory_type_index(&props, 0b00, HV), None);
    }

    #[test]
    fn lazily_allocated_strips_and_retries() {
        let props = memory_properties(&[(0, DL)]);
        let lazy = vk::MemoryPropertyFlags::from_raw(
            DL.as_raw() | vk::MemoryPropertyFlags::LAZILY_ALLOCATED.as_raw(),
        );
        assert_eq!(find_memory_type_index(&props, 0b1, lazy), None);
        assert_eq!(find_memory_type_index_with_fallback(&props, 0b1, lazy), Some(0));
        // Without the lazy flag the fallback does not loosen anything else.
        assert_eq!(find_memory_type_index_with_fallback(&props, 0b1, HV), None);
    }

    #[test]
    fn non_coherent_alignment_expands_both_ends() {
        // The spec's worked example: offset=5, size=3, atom=64.
        let (offset, size, delta) = align_non_coherent_range(64, 1024, 5, 3);
        assert_eq!(offset, 0);
        assert_eq!(size, 64);
        assert_eq!(delta, 5);
    }

    #[test]
    fn non_coherent_alignment_clamps_to_allocation() {
        let (offset, size, delta) = align_non_coherent_range(64, 100, 70, 20);
        assert_eq!(offset, 64);
        assert_eq!(offset + size, 100, "end clamps to the allocation size");
        assert_eq!(delta, 6);
    }

    #[test]
    fn aligned_request_is_unchanged() {
        let (offset, size, delta) = align_non_coherent_range(64, 1024, 128, 64);
        assert_eq!((offset, size, delta), (128, 64, 0));
    }
}
