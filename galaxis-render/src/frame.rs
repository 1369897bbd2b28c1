//! Frames-in-flight pacing.
//!
//! Each in-flight frame owns a command buffer, an image-available
//! semaphore, a render-finished semaphore and an in-flight fence. The fence
//! starts signaled so the first wait on a fresh slot does not deadlock, and
//! is waited-and-reset before the slot's command buffer is reused.

use ash::vk;

use crate::error::Result;
use crate::handles::{CommandBuffer, CommandPool, Fence, Semaphore};

/// The conventional bound on outstanding GPU work.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Synchronization primitives for one frame in flight.
pub struct FrameSync {
    /// Signaled when the acquired swapchain image is ready to be rendered.
    pub image_available: Semaphore,
    /// Signaled when rendering to the swapchain image completes; presents
    /// wait on it.
    pub render_finished: Semaphore,
    /// Signaled when the frame's GPU work drains; the CPU waits on it
    /// before reusing the slot.
    pub in_flight: Fence,
}

impl FrameSync {
    pub fn new(device: &ash::Device, initially_signaled: bool) -> Result<Self> {
        let flags = if initially_signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        Ok(FrameSync {
            image_available: Semaphore::new(device)?,
            render_finished: Semaphore::new(device)?,
            in_flight: Fence::new(device, flags)?,
        })
    }
}

/// One frame slot: sync primitives plus the command buffer the slot
/// records into.
pub struct FrameResources {
    pub sync: FrameSync,
    pub command_buffer: CommandBuffer,
}

/// The index after `current` in a ring of `count` slots.
pub fn next_frame_index(current: usize, count: usize) -> usize {
    (current + 1) % count
}

/// Cycles frame slots, gating each reuse on the slot's fence.
pub struct FramePacer {
    frames: Vec<FrameResources>,
    current: usize,
}

impl FramePacer {
    /// Allocates `frames_in_flight` slots, their command buffers coming
    /// from `pool`. All fences start signaled.
    pub fn new(device: &ash::Device, pool: &CommandPool, frames_in_flight: usize) -> Result<Self> {
        let mut command_buffers =
            pool.allocate_buffers(vk::CommandBufferLevel::PRIMARY, frames_in_flight as u32)?;
        let mut frames = Vec::with_capacity(frames_in_flight);
        for command_buffer in command_buffers.drain(..) {
            frames.push(FrameResources {
                sync: FrameSync::new(device, true)?,
                command_buffer,
            });
        }
        Ok(FramePacer { frames, current: 0 })
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &FrameResources {
        &self.frames[self.current]
    }

    /// Waits for the current slot's previous use to drain and resets its
    /// fence, making the slot's command buffer safe to re-record.
    pub fn begin_frame(&mut self) -> Result<&FrameResources> {
        let frame = &self.frames[self.current];
        frame.sync.in_flight.wait_and_reset()?;
        Ok(frame)
    }

    /// Advances to the next slot after the frame's submission.
    pub fn end_frame(&mut self) {
        self.current = next_frame_index(self.current, self.frames.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_index_wraps() {
        assert_eq!(next_frame_index(0, 2), 1);
        assert_eq!(next_frame_index(1, 2), 0);
        assert_eq!(next_frame_index(2, 3), 0);
    }

    #[test]
    fn default_bound_is_two() {
        assert_eq!(MAX_FRAMES_IN_FLIGHT, 2);
    }
}
