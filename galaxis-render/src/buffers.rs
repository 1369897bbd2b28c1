//! Device-local buffers with a host-visible fast path.
//!
//! Creation first attempts the `DEVICE_LOCAL | HOST_VISIBLE` memory type
//! (resizable BAR / UMA); uploads are then direct host copies. Otherwise the
//! buffer is plain device-local and every upload stages through the pool
//! and a transfer submission.

use std::sync::Arc;

use ash::vk;
use bytemuck::Pod;
use log::debug;

use crate::allocator::Allocator;
use crate::context::TransferChannel;
use crate::device::DeviceShared;
use crate::error::{RenderError, Result};
use crate::memory::BufferMemory;
use crate::staging::{StagingAllocDesc, StagingBufferPool};

/// One `BufferCopy` region per element, preserving element-index semantics
/// so AoS and SoA layouts can be repacked in either direction. Regions are
/// deliberately not collapsed when the strides match.
pub fn strided_copy_regions(
    element_index: vk::DeviceSize,
    element_count: vk::DeviceSize,
    element_size: vk::DeviceSize,
    src_stride: vk::DeviceSize,
    dst_stride: vk::DeviceSize,
) -> Vec<vk::BufferCopy> {
    (0..element_count)
        .map(|i| vk::BufferCopy {
            src_offset: src_stride * (i + element_index),
            dst_offset: dst_stride * (i + element_index),
            size: element_size,
        })
        .collect()
}

/// Bytes a strided write touches on the destination side: the end of the
/// last element, `dst_stride·(element_index+element_count-1) + element_size`.
/// The element-index offset is part of the extent because the write
/// positions are absolute, not packed from zero.
pub fn strided_write_extent(
    element_index: vk::DeviceSize,
    element_count: vk::DeviceSize,
    element_size: vk::DeviceSize,
    dst_stride: vk::DeviceSize,
) -> vk::DeviceSize {
    if element_count == 0 {
        return 0;
    }
    dst_stride * (element_index + element_count - 1) + element_size
}

/// Scatters `element_count` elements of `element_size` bytes from `data`
/// (read at `src_stride` spacing) into `target` (written at `dst_stride`
/// spacing), both starting at `element_index`. `target` must span at least
/// [`strided_write_extent`] bytes.
pub fn scatter_strided(
    data: &[u8],
    target: &mut [u8],
    element_index: vk::DeviceSize,
    element_count: vk::DeviceSize,
    element_size: vk::DeviceSize,
    src_stride: vk::DeviceSize,
    dst_stride: vk::DeviceSize,
) {
    let element_size = element_size as usize;
    for i in 0..element_count {
        let src_begin = (src_stride * (i + element_index)) as usize;
        let dst_begin = (dst_stride * (i + element_index)) as usize;
        target[dst_begin..dst_begin + element_size]
            .copy_from_slice(&data[src_begin..src_begin + element_size]);
    }
}

/// Device-local storage with staged or direct upload.
pub struct DeviceLocalBuffer {
    shared: Arc<DeviceShared>,
    buffer_memory: BufferMemory,
    staging_pool: Arc<StagingBufferPool>,
    allocator: Option<Arc<Allocator>>,
    usage: vk::BufferUsageFlags,
}

impl DeviceLocalBuffer {
    /// Manual-path buffer. `TRANSFER_DST` is always added so staged uploads
    /// can reach it.
    pub fn new(
        shared: Arc<DeviceShared>,
        staging_pool: Arc<StagingBufferPool>,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let buffer_memory = Self::create_buffer_memory(&shared, size, usage)?;
        Ok(DeviceLocalBuffer {
            shared,
            buffer_memory,
            staging_pool,
            allocator: None,
            usage,
        })
    }

    /// Pooled-path buffer through the VMA allocator.
    pub fn new_pooled(
        shared: Arc<DeviceShared>,
        staging_pool: Arc<StagingBufferPool>,
        allocator: Arc<Allocator>,
        allocation_create_info: &vk_mem::AllocationCreateInfo,
        create_info: &vk::BufferCreateInfo,
    ) -> Result<Self> {
        let buffer_memory =
            BufferMemory::new_pooled(&shared, &allocator, allocation_create_info, create_info)?;
        let usage = create_info.usage;
        Ok(DeviceLocalBuffer {
            shared,
            buffer_memory,
            staging_pool,
            allocator: Some(allocator),
            usage,
        })
    }

    fn create_buffer_memory(
        shared: &DeviceShared,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
    ) -> Result<BufferMemory> {
        let create_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(usage | vk::BufferUsageFlags::TRANSFER_DST);

        let preferred =
            vk::MemoryPropertyFlags::DEVICE_LOCAL | vk::MemoryPropertyFlags::HOST_VISIBLE;
        match BufferMemory::new_manual(shared, &create_info, preferred) {
            Ok(memory) => {
                debug!("Device-local buffer using the host-visible fast path.");
                Ok(memory)
            }
            Err(_) => {
                BufferMemory::new_manual(shared, &create_info, vk::MemoryPropertyFlags::DEVICE_LOCAL)
            }
        }
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer_memory.buffer().handle()
    }

    pub fn is_valid(&self) -> bool {
        self.buffer_memory.is_valid()
    }

    pub fn is_using_vma(&self) -> bool {
        self.buffer_memory.is_using_vma()
    }

    fn is_host_visible(&self) -> bool {
        self.buffer_memory
            .property_flags()
            .contains(vk::MemoryPropertyFlags::HOST_VISIBLE)
    }

    pub fn enable_persistent_mapping(&mut self) {
        self.buffer_memory.enable_persistent_mapping();
    }

    pub fn disable_persistent_mapping(&mut self) -> Result<()> {
        self.buffer_memory.disable_persistent_mapping()
    }

    /// Copies `data` to `[target_offset, target_offset+len)` of the buffer.
    ///
    /// Host-visible backing: a direct map-and-copy, no GPU work. Otherwise
    /// a staging buffer is acquired, filled, and copied over the transfer
    /// channel (blocking until the copy completes).
    pub fn copy_data(
        &mut self,
        transfer: &TransferChannel,
        map_offset: vk::DeviceSize,
        target_offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<()> {
        if self.is_host_visible() {
            return self.buffer_memory.submit_buffer_data(map_offset, target_offset, data);
        }

        let alloc_desc = self.allocator.as_ref().map(|_| StagingAllocDesc::default());
        let mut staging = self
            .staging_pool
            .acquire(data.len() as vk::DeviceSize, alloc_desc)?;
        staging.submit_buffer_data(map_offset, 0, data)?;

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: target_offset,
            size: data.len() as vk::DeviceSize,
        };
        let src = staging.buffer();
        let dst = self.buffer();
        transfer.record_and_execute(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src, dst, &[region]);
        })?;
        staging.release();
        Ok(())
    }

    /// Strided copy: `element_count` elements of `element_size` bytes, read
    /// at `src_stride` spacing and written at `dst_stride` spacing, both
    /// starting at `element_index`.
    #[allow(clippy::too_many_arguments)]
    pub fn copy_data_strided(
        &mut self,
        transfer: &TransferChannel,
        element_index: vk::DeviceSize,
        element_count: vk::DeviceSize,
        element_size: vk::DeviceSize,
        src_stride: vk::DeviceSize,
        dst_stride: vk::DeviceSize,
        map_offset: vk::DeviceSize,
        data: &[u8],
    ) -> Result<()> {
        if element_count == 0 {
            return Ok(());
        }

        if self.is_host_visible() {
            let memory = self
                .buffer_memory
                .memory_mut()
                .ok_or_else(|| RenderError::MemoryMapFailed("pooled host-visible strided copy unsupported".to_string()))?;

            // The write positions are absolute element offsets, so the
            // mapped range must reach the end of the LAST element, not
            // just element_count strides from zero.
            let span = strided_write_extent(element_index, element_count, element_size, dst_stride);
            let persistent = memory.is_persistently_mapped();
            let target_ptr = if !persistent || memory.mapped_target().is_null() {
                let base = if persistent { 0 } else { map_offset };
                memory.map_for_submit(base, span)?
            } else {
                memory.mapped_target()
            };
            let target = unsafe { std::slice::from_raw_parts_mut(target_ptr, span as usize) };
            scatter_strided(
                data,
                target,
                element_index,
                element_count,
                element_size,
                src_stride,
                dst_stride,
            );
            if !persistent {
                memory.unmap(map_offset, span)?;
            }
            return Ok(());
        }

        let alloc_desc = self.allocator.as_ref().map(|_| StagingAllocDesc::default());
        let mut staging = self.staging_pool.acquire(data.len() as vk::DeviceSize, alloc_desc)?;
        staging.submit_buffer_data(map_offset, 0, data)?;

        let regions =
            strided_copy_regions(element_index, element_count, element_size, src_stride, dst_stride);
        let src = staging.buffer();
        let dst = self.buffer();
        transfer.record_and_execute(|device, command_buffer| unsafe {
            device.cmd_copy_buffer(command_buffer, src, dst, &regions);
        })?;
        staging.release();
        Ok(())
    }

    /// Typed convenience over [`Self::copy_data`].
    pub fn copy_slice<T: Pod>(
        &mut self,
        transfer: &TransferChannel,
        data: &[T],
    ) -> Result<()> {
        self.copy_data(transfer, 0, 0, bytemuck::cast_slice(data))
    }

    /// Records an inline update into the caller's command buffer. Limited
    /// to 64 KiB and 4-byte granularity by the API.
    pub fn update_data(
        &self,
        command_buffer: vk::CommandBuffer,
        offset: vk::DeviceSize,
        data: &[u8],
    ) {
        unsafe {
            self.shared
                .device
                .cmd_update_buffer(command_buffer, self.buffer(), offset, data);
        }
    }

    /// Reads data back from a host-visible buffer.
    pub fn fetch_data(
        &mut self,
        map_offset: vk::DeviceSize,
        fetch_offset: vk::DeviceSize,
        target: &mut [u8],
    ) -> Result<()> {
        if !self.is_host_visible() {
            return Err(RenderError::MemoryMapFailed(
                "buffer is not host-visible; read back through a staging copy".to_string(),
            ));
        }
        self.buffer_memory.fetch_buffer_data(map_offset, fetch_offset, target)
    }

    /// Destroys and re-creates the buffer at a new size. Waits for the
    /// device to go idle first; all previous contents are lost.
    pub fn recreate(&mut self, size: vk::DeviceSize) -> Result<()> {
        unsafe { self.shared.device.device_wait_idle() }.map_err(RenderError::from)?;
        self.buffer_memory = Self::create_buffer_memory(&self.shared, size, self.usage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strided_regions_follow_element_index() {
        let regions = strided_copy_regions(2, 3, 4, 16, 8);
        assert_eq!(regions.len(), 3);
        assert_eq!(regions[0].src_offset, 32);
        assert_eq!(regions[0].dst_offset, 16);
        assert_eq!(regions[2].src_offset, 64);
        assert_eq!(regions[2].dst_offset, 32);
        assert!(regions.iter().all(|r| r.size == 4));
    }

    #[test]
    fn aos_to_soa_unpack_shape() {
        // Interleaved 12-byte vertices to a tight 4-byte attribute stream.
        let regions = strided_copy_regions(0, 4, 4, 12, 4);
        let srcs: Vec<u64> = regions.iter().map(|r| r.src_offset).collect();
        let dsts: Vec<u64> = regions.iter().map(|r| r.dst_offset).collect();
        assert_eq!(srcs, vec![0, 12, 24, 36]);
        assert_eq!(dsts, vec![0, 4, 8, 12]);
    }

    #[test]
    fn zero_elements_yield_no_regions() {
        assert!(strided_copy_regions(5, 0, 4, 8, 8).is_empty());
    }

    #[test]
    fn matching_strides_are_not_collapsed() {
        let regions = strided_copy_regions(0, 3, 8, 8, 8);
        assert_eq!(regions.len(), 3, "element-index semantics are preserved");
    }

    #[test]
    fn write_extent_covers_the_last_element() {
        // With a non-zero element index the furthest write lands well past
        // element_count * dst_stride; the extent must include it.
        assert_eq!(strided_write_extent(2, 3, 4, 8), 8 * 4 + 4);
        assert!(strided_write_extent(2, 3, 4, 8) > 3 * 8);
        assert_eq!(strided_write_extent(0, 4, 4, 12), 12 * 3 + 4);
        assert_eq!(strided_write_extent(5, 0, 4, 8), 0);
    }

    #[test]
    fn write_extent_matches_the_regions_it_mirrors() {
        let (index, count, size, src_stride, dst_stride) = (3u64, 5u64, 4u64, 16u64, 8u64);
        let regions = strided_copy_regions(index, count, size, src_stride, dst_stride);
        let furthest = regions.iter().map(|r| r.dst_offset + r.size).max().unwrap();
        assert_eq!(strided_write_extent(index, count, size, dst_stride), furthest);
    }

    #[test]
    fn scatter_with_element_index_stays_in_bounds() {
        // Interleaved 8-byte source records, 4-byte destination slots,
        // starting at element 2. A destination sized exactly to the write
        // extent proves no write escapes the mapped range.
        let (index, count, size, src_stride, dst_stride) = (2u64, 3u64, 4u64, 8u64, 4u64);
        let data: Vec<u8> = (0..((index + count) * src_stride) as u8).collect();
        let mut target =
            vec![0xAAu8; strided_write_extent(index, count, size, dst_stride) as usize];

        scatter_strided(&data, &mut target, index, count, size, src_stride, dst_stride);

        // Elements land at their absolute slots, leading slots untouched.
        assert_eq!(&target[..8], &[0xAA; 8]);
        assert_eq!(&target[8..12], &data[16..20]);
        assert_eq!(&target[12..16], &data[24..28]);
        assert_eq!(&target[16..20], &data[32..36]);
    }

    #[test]
    fn scatter_unpacks_aos_to_soa() {
        // Four 12-byte vertices; extract the 4-byte attribute at the head
        // of each into a tight stream.
        let mut data = vec![0u8; 48];
        for (vertex, chunk) in data.chunks_mut(12).enumerate() {
            chunk[..4].copy_from_slice(&(vertex as u32).to_le_bytes());
        }
        let mut target = vec![0u8; strided_write_extent(0, 4, 4, 4) as usize];

        scatter_strided(&data, &mut target, 0, 4, 4, 12, 4);

        let unpacked: Vec<u32> = target
            .chunks(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        assert_eq!(unpacked, vec![0, 1, 2, 3]);
    }
}
