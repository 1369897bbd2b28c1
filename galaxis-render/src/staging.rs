//! Staging buffers and the thread-safe staging pool.
//!
//! A staging buffer is host-visible scratch space for uploads, optionally
//! with a linear-tiled image aliased over its memory so a format-conversion
//! blit can read it directly. The pool keeps retired buffers alive for
//! reuse: acquisition is first-fit by capacity and allocation method, and
//! the pool never shrinks.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use ash::vk;
use log::debug;

use crate::allocator::Allocator;
use crate::device::DeviceShared;
use crate::error::Result;
use crate::format::format_info;
use crate::handles::Image;
use crate::memory::BufferMemory;

/// The VMA parameters a pooled staging buffer is (re)created with.
#[derive(Debug, Clone, Copy)]
pub struct StagingAllocDesc {
    pub usage: vk_mem::MemoryUsage,
    pub flags: vk_mem::AllocationCreateFlags,
}

impl Default for StagingAllocDesc {
    fn default() -> Self {
        StagingAllocDesc {
            usage: vk_mem::MemoryUsage::CpuToGpu,
            flags: vk_mem::AllocationCreateFlags::MAPPED
                | vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
        }
    }
}

impl StagingAllocDesc {
    fn to_create_info(self) -> vk_mem::AllocationCreateInfo {
        vk_mem::AllocationCreateInfo {
            usage: self.usage,
            flags: self.flags,
            ..Default::default()
        }
    }
}

/// Host-visible upload scratch, with an optional aliased image.
//
// Holds persistent mapped pointers, which only the current lease holder
// dereferences; the pool's mutex serializes everything else.
pub struct StagingBuffer {
    shared: Arc<DeviceShared>,
    allocator: Option<Arc<Allocator>>,
    alloc_desc: Option<StagingAllocDesc>,
    buffer_memory: Option<BufferMemory>,
    aliased_image: Option<Image>,
    persistent: bool,
    id: u64,
}

unsafe impl Send for StagingBuffer {}

impl StagingBuffer {
    /// Manual-path staging buffer of at least `size` bytes.
    pub fn new(shared: Arc<DeviceShared>, size: vk::DeviceSize) -> Result<Self> {
        let mut this = StagingBuffer {
            shared,
            allocator: None,
            alloc_desc: None,
            buffer_memory: None,
            aliased_image: None,
            persistent: false,
            id: 0,
        };
        this.expand(size)?;
        Ok(this)
    }

    /// Pooled-path staging buffer of at least `size` bytes.
    pub fn new_pooled(
        shared: Arc<DeviceShared>,
        allocator: Arc<Allocator>,
        desc: StagingAllocDesc,
        size: vk::DeviceSize,
    ) -> Result<Self> {
        let mut this = StagingBuffer {
            shared,
            allocator: Some(allocator),
            alloc_desc: Some(desc),
            buffer_memory: None,
            aliased_image: None,
            persistent: false,
            id: 0,
        };
        this.expand(size)?;
        Ok(this)
    }

    /// Grows the buffer to hold `size` bytes. A no-op when the current
    /// allocation already suffices; otherwise the buffer is released and
    /// re-created along the construction path originally chosen. Usage is
    /// always transfer-src|dst.
    pub fn expand(&mut self, size: vk::DeviceSize) -> Result<()> {
        // Zero-size acquires still need a live buffer object.
        let size = size.max(1);
        if let Some(memory) = &self.buffer_memory {
            if size <= memory.allocation_size() {
                return Ok(());
            }
        }

        self.release();

        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(vk::BufferUsageFlags::TRANSFER_SRC | vk::BufferUsageFlags::TRANSFER_DST);

        let mut memory = match (&self.allocator, &self.alloc_desc) {
            (Some(allocator), Some(desc)) => BufferMemory::new_pooled(
                &self.shared,
                allocator,
                &desc.to_create_info(),
                &create_info,
            )?,
            _ => BufferMemory::new_manual(
                &self.shared,
                &create_info,
                vk::MemoryPropertyFlags::HOST_VISIBLE,
            )?,
        };
        if self.persistent {
            memory.enable_persistent_mapping();
        }
        self.buffer_memory = Some(memory);
        Ok(())
    }

    /// Drops the buffer, its memory and any aliased image.
    pub fn release(&mut self) {
        self.aliased_image = None;
        self.buffer_memory = None;
    }

    /// Keep the mapping open across submits (pool policy for reused
    /// buffers).
    pub fn set_persistent_mapping(&mut self, persistent: bool) {
        self.persistent = persistent;
        if let Some(memory) = &mut self.buffer_memory {
            if persistent {
                memory.enable_persistent_mapping();
            }
        }
    }

    pub fn capacity(&self) -> vk::DeviceSize {
        self.buffer_memory.as_ref().map_or(0, |m| m.allocation_size())
    }

    pub fn is_using_vma(&self) -> bool {
        self.alloc_desc.is_some()
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer_memory
            .as_ref()
            .map_or(vk::Buffer::null(), |m| m.buffer().handle())
    }

    pub fn aliased_image(&self) -> Option<vk::Image> {
        self.aliased_image.as_ref().map(|image| image.handle())
    }

    /// Maps at least `size` bytes for writing, growing first if needed.
    pub fn map(&mut self, size: vk::DeviceSize) -> Result<*mut u8> {
        self.expand(size)?;
        let memory = self.buffer_memory.as_mut().expect("expand populated the buffer");
        if let Some(ptr) = memory.pooled_mapped_ptr() {
            return Ok(ptr);
        }
        match memory.memory_mut() {
            Some(device_memory) => device_memory.map_for_submit(0, size),
            None => unreachable!("pooled staging buffers are persistently mapped"),
        }
    }

    pub fn unmap(&mut self, size: vk::DeviceSize) -> Result<()> {
        if let Some(memory) = self.buffer_memory.as_mut() {
            if memory.pooled_mapped_ptr().is_some() {
                return Ok(());
            }
            if let Some(device_memory) = memory.memory_mut() {
                if !device_memory.is_persistently_mapped() {
                    device_memory.unmap(0, size)?;
                }
            }
        }
        Ok(())
    }

    /// Writes `data` into the buffer, growing it first if needed.
    pub fn submit_buffer_data(
        &mut self,
        map_offset: vk::DeviceSize,
        submit_offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<()> {
        self.expand(map_offset + submit_offset + data.len() as vk::DeviceSize)?;
        self.buffer_memory
            .as_mut()
            .expect("expand populated the buffer")
            .submit_buffer_data(map_offset, submit_offset, data)
    }

    /// Reads back `target.len()` bytes previously written by the device.
    pub fn fetch_buffer_data(
        &mut self,
        map_offset: vk::DeviceSize,
        fetch_offset: vk::DeviceSize,
        target: &mut [u8],
    ) -> Result<()> {
        match self.buffer_memory.as_mut() {
            Some(memory) => memory.fetch_buffer_data(map_offset, fetch_offset, target),
            None => Ok(()),
        }
    }

    /// Creates a linear-tiled image of `new_format` aliased over this
    /// buffer's memory, for blitting staged pixels of `origin_format` into
    /// an optimal-tiled destination.
    ///
    /// Admission requires: the formats are aliasing-compatible, the target
    /// format supports linear blit-src, the pixel data fits the current
    /// allocation, the device admits a linear transfer-src image of that
    /// extent, and the driver reports no row padding (subresource layout
    /// size equals the computed pixel size). On any failure the staging
    /// buffer is left untouched and `None` is returned.
    pub fn create_aliased_image(
        &mut self,
        origin_format: vk::Format,
        new_format: vk::Format,
        extent: vk::Extent2D,
    ) -> Option<vk::Image> {
        if !crate::format::is_aliasing_compatible(origin_format, new_format) {
            return None;
        }

        let format_properties = self.shared.format_properties(new_format);
        if !format_properties
            .linear_tiling_features
            .contains(vk::FormatFeatureFlags::BLIT_SRC)
        {
            return None;
        }

        let pixel_size = format_info(new_format).pixel_size as vk::DeviceSize;
        let image_data_size =
            vk::DeviceSize::from(extent.width) * vk::DeviceSize::from(extent.height) * pixel_size;
        let memory = self.buffer_memory.as_ref()?;
        if image_data_size > memory.allocation_size() {
            return None;
        }

        let image_format_properties = unsafe {
            self.shared.instance.get_physical_device_image_format_properties(
                self.shared.physical_device,
                new_format,
                vk::ImageType::TYPE_2D,
                vk::ImageTiling::LINEAR,
                vk::ImageUsageFlags::TRANSFER_SRC,
                vk::ImageCreateFlags::empty(),
            )
        }
        .ok()?;
        if extent.width > image_format_properties.max_extent.width
            || extent.height > image_format_properties.max_extent.height
            || image_data_size > image_format_properties.max_resource_size
        {
            return None;
        }

        let create_info = vk::ImageCreateInfo::builder()
            .image_type(vk::ImageType::TYPE_2D)
            .format(new_format)
            .extent(vk::Extent3D { width: extent.width, height: extent.height, depth: 1 })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::LINEAR)
            .usage(vk::ImageUsageFlags::TRANSFER_SRC)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::PREINITIALIZED);
        let image = Image::new(&self.shared.device, &create_info).ok()?;

        let subresource =
            vk::ImageSubresource { aspect_mask: vk::ImageAspectFlags::COLOR, mip_level: 0, array_layer: 0 };
        let layout = unsafe {
            self.shared
                .device
                .get_image_subresource_layout(image.handle(), subresource)
        };
        if layout.size != image_data_size {
            return None;
        }

        let (device_memory, base_offset) = memory.device_memory_and_offset();
        unsafe {
            self.shared
                .device
                .bind_image_memory(image.handle(), device_memory, base_offset)
        }
        .ok()?;

        let handle = image.handle();
        self.aliased_image = Some(image);
        Some(handle)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

/// First-fit selection over `(capacity, is_using_vma)` pairs: big enough
/// and created along the same allocation path.
pub fn find_first_fit(
    buffers: &[(vk::DeviceSize, bool)],
    size: vk::DeviceSize,
    wants_vma: bool,
) -> Option<usize> {
    buffers
        .iter()
        .position(|&(capacity, uses_vma)| capacity >= size && uses_vma == wants_vma)
}

struct PoolInner {
    free: Vec<Box<StagingBuffer>>,
    busy: Vec<u64>,
}

/// Thread-safe staging-buffer pool. One lock guards both lists; the pool
/// never shrinks; newly minted buffers are persistently mapped.
pub struct StagingBufferPool {
    shared: Arc<DeviceShared>,
    allocator: Option<Arc<Allocator>>,
    inner: Mutex<PoolInner>,
    next_id: AtomicU64,
}

impl StagingBufferPool {
    pub fn new(shared: Arc<DeviceShared>, allocator: Option<Arc<Allocator>>) -> Arc<Self> {
        Arc::new(StagingBufferPool {
            shared,
            allocator,
            inner: Mutex::new(PoolInner { free: Vec::new(), busy: Vec::new() }),
            next_id: AtomicU64::new(1),
        })
    }

    /// Acquires a buffer of at least `size` bytes. `alloc_desc` selects the
    /// pooled-allocator path; `None` selects the manual path. A free buffer
    /// is matched first-fit by capacity and allocation method; otherwise a
    /// new persistently-mapped buffer is created.
    pub fn acquire(
        self: &Arc<Self>,
        size: vk::DeviceSize,
        alloc_desc: Option<StagingAllocDesc>,
    ) -> Result<StagingLease> {
        let wants_vma = alloc_desc.is_some();
        let mut inner = self.inner.lock().expect("staging pool mutex poisoned");

        let shape: Vec<(vk::DeviceSize, bool)> = inner
            .free
            .iter()
            .map(|b| (b.capacity(), b.is_using_vma()))
            .collect();
        if let Some(index) = find_first_fit(&shape, size, wants_vma) {
            let buffer = inner.free.remove(index);
            inner.busy.push(buffer.id);
            debug!("Staging pool reusing buffer #{} ({} bytes).", buffer.id, buffer.capacity());
            return Ok(StagingLease { pool: Arc::clone(self), buffer: Some(buffer) });
        }
        drop(inner);

        let mut buffer = match (&self.allocator, alloc_desc) {
            (Some(allocator), Some(desc)) => Box::new(StagingBuffer::new_pooled(
                Arc::clone(&self.shared),
                Arc::clone(allocator),
                desc,
                size,
            )?),
            _ => Box::new(StagingBuffer::new(Arc::clone(&self.shared), size)?),
        };
        buffer.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        buffer.set_persistent_mapping(true);

        let mut inner = self.inner.lock().expect("staging pool mutex poisoned");
        inner.busy.push(buffer.id);
        debug!("Staging pool created buffer #{} ({} bytes).", buffer.id, buffer.capacity());
        Ok(StagingLease { pool: Arc::clone(self), buffer: Some(buffer) })
    }

    fn give_back(&self, buffer: Box<StagingBuffer>) {
        let mut inner = self.inner.lock().expect("staging pool mutex poisoned");
        inner.busy.retain(|&id| id != buffer.id);
        inner.free.push(buffer);
    }

    pub fn free_count(&self) -> usize {
        self.inner.lock().expect("staging pool mutex poisoned").free.len()
    }

    pub fn busy_count(&self) -> usize {
        self.inner.lock().expect("staging pool mutex poisoned").busy.len()
    }
}

/// An acquired staging buffer. Returns itself to the pool on drop; an
/// explicit [`StagingLease::release`] does the same eagerly.
pub struct StagingLease {
    pool: Arc<StagingBufferPool>,
    buffer: Option<Box<StagingBuffer>>,
}

impl StagingLease {
    pub fn release(mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.give_back(buffer);
        }
    }
}

impl Deref for StagingLease {
    type Target = StagingBuffer;

    fn deref(&self) -> &Self::Target {
        self.buffer.as_ref().expect("lease already released")
    }
}

impl DerefMut for StagingLease {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.buffer.as_mut().expect("lease already released")
    }
}

impl Drop for StagingLease {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.give_back(buffer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_matches_capacity_and_method() {
        let buffers = [(64, false), (256, true), (256, false), (1024, false)];
        assert_eq!(find_first_fit(&buffers, 128, false), Some(2));
        assert_eq!(find_first_fit(&buffers, 128, true), Some(1));
        assert_eq!(find_first_fit(&buffers, 2048, false), None);
    }

    #[test]
    fn zero_size_request_matches_anything_of_same_method() {
        let buffers = [(0, false), (64, true)];
        assert_eq!(find_first_fit(&buffers, 0, false), Some(0));
        assert_eq!(find_first_fit(&buffers, 0, true), Some(1));
    }

    #[test]
    fn empty_free_list_yields_none() {
        assert_eq!(find_first_fit(&[], 1, false), None);
    }
}
