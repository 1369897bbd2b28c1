//! The context facade.
//!
//! `VulkanContext` ties the device core, the pooled allocator, the staging
//! pool and the per-queue command pools together for the render thread. It
//! owns a long-lived transfer command buffer for blocking uploads and, when
//! the graphics and present families differ under exclusive sharing, a
//! present command pool for queue-family ownership transfers.

use std::sync::Arc;

use ash::vk;
use log::{error, info};

use crate::allocator::Allocator;
use crate::core::{CallbackKind, VulkanCore};
use crate::device::DeviceShared;
use crate::error::{RenderError, Result};
use crate::handles::{CommandBuffer, CommandPool, Fence};
use crate::physical_device::QueueDemand;
use crate::staging::StagingBufferPool;
use crate::texture::UploadContext;

/// Builds a `SubmitInfo` that mentions a wait/signal semaphore only when
/// the handle is non-null.
fn build_submit_info<'a>(
    command_buffer: &'a [vk::CommandBuffer],
    wait_semaphores: &'a [vk::Semaphore],
    wait_stages: &'a [vk::PipelineStageFlags],
    signal_semaphores: &'a [vk::Semaphore],
) -> vk::SubmitInfoBuilder<'a> {
    let mut info = vk::SubmitInfo::builder().command_buffers(command_buffer);
    if !wait_semaphores.is_empty() {
        info = info.wait_semaphores(wait_semaphores).wait_dst_stage_mask(wait_stages);
    }
    if !signal_semaphores.is_empty() {
        info = info.signal_semaphores(signal_semaphores);
    }
    info
}

/// A blocking one-time-submit channel: a persistent command buffer plus the
/// queue it executes on. Used by the transfer services for uploads that
/// must complete before the caller continues.
pub struct TransferChannel {
    device: ash::Device,
    queue: vk::Queue,
    command_buffer: vk::CommandBuffer,
}

impl TransferChannel {
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.command_buffer
    }

    /// Begins the command buffer for one-time submit, lets `record` fill
    /// it, then submits and waits on a local fence.
    pub fn record_and_execute(
        &self,
        record: impl FnOnce(&ash::Device, vk::CommandBuffer),
    ) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { self.device.begin_command_buffer(self.command_buffer, &begin_info) }
            .map_err(RenderError::from)?;

        record(&self.device, self.command_buffer);

        unsafe { self.device.end_command_buffer(self.command_buffer) }.map_err(RenderError::from)?;

        let fence = Fence::new(&self.device, vk::FenceCreateFlags::empty())?;
        let buffers = [self.command_buffer];
        let submit_info = build_submit_info(&buffers, &[], &[], &[]);
        unsafe { self.device.queue_submit(self.queue, &[submit_info.build()], fence.handle()) }
            .map_err(|e| {
                error!("Failed to submit transfer commands: {}", e);
                RenderError::from(e)
            })?;
        fence.wait()
    }
}

/// Coordinator exposing the device core plus the transfer substrate to the
/// render thread.
pub struct VulkanContext {
    core: VulkanCore,
    allocator: Option<Arc<Allocator>>,
    staging_pool: Option<Arc<StagingBufferPool>>,
    graphics_command_pool: Option<CommandPool>,
    compute_command_pool: Option<CommandPool>,
    present_command_pool: Option<CommandPool>,
    transfer_command_buffer: CommandBuffer,
    present_command_buffer: CommandBuffer,
    auto_removed_callbacks: Vec<(CallbackKind, String)>,
}

impl VulkanContext {
    /// Creates the context over a fresh device core (instance only; call
    /// [`Self::create_device`] and [`Self::create_swapchain`] next).
    pub fn new(layers: &[std::ffi::CString], extensions: &[std::ffi::CString]) -> Result<Self> {
        Ok(VulkanContext {
            core: VulkanCore::new(layers, extensions)?,
            allocator: None,
            staging_pool: None,
            graphics_command_pool: None,
            compute_command_pool: None,
            present_command_pool: None,
            transfer_command_buffer: CommandBuffer::default(),
            present_command_buffer: CommandBuffer::default(),
            auto_removed_callbacks: Vec::new(),
        })
    }

    pub fn core(&self) -> &VulkanCore {
        &self.core
    }

    pub fn core_mut(&mut self) -> &mut VulkanCore {
        &mut self.core
    }

    /// Creates the logical device, then the allocator, the staging pool and
    /// the command pools that depend on it.
    pub fn create_device(&mut self, index: usize, demand: QueueDemand) -> Result<()> {
        self.core.create_device(index, demand)?;
        self.init_device_resources()
    }

    /// Rebuilds the device and everything hanging off it.
    pub fn recreate_device(&mut self, index: usize, demand: QueueDemand) -> Result<()> {
        self.drop_device_resources();
        self.core.recreate_device(index, demand)?;
        self.init_device_resources()
    }

    fn init_device_resources(&mut self) -> Result<()> {
        let shared = self
            .core
            .device_shared()
            .ok_or_else(|| RenderError::Initialization("device creation left no device".to_string()))?;
        let families = self.core.queue_families();

        let allocator = Arc::new(Allocator::new(
            &shared.instance,
            &shared.device,
            shared.physical_device,
            self.core.api_version().min(vk::API_VERSION_1_3),
        )?);
        self.staging_pool = Some(StagingBufferPool::new(
            Arc::clone(&shared),
            Some(Arc::clone(&allocator)),
        ));
        self.allocator = Some(allocator);

        if families.graphics != vk::QUEUE_FAMILY_IGNORED {
            let pool = CommandPool::new(
                &shared.device,
                families.graphics,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?;
            self.transfer_command_buffer = pool.allocate_buffer(vk::CommandBufferLevel::PRIMARY)?;
            self.graphics_command_pool = Some(pool);
        }
        if families.compute != vk::QUEUE_FAMILY_IGNORED {
            self.compute_command_pool = Some(CommandPool::new(
                &shared.device,
                families.compute,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?);
        }
        info!("Context command pools initialized.");
        Ok(())
    }

    fn drop_device_resources(&mut self) {
        self.present_command_buffer = CommandBuffer::default();
        self.transfer_command_buffer = CommandBuffer::default();
        self.present_command_pool = None;
        self.compute_command_pool = None;
        self.graphics_command_pool = None;
        self.staging_pool = None;
        self.allocator = None;
    }

    /// Creates the swapchain and, when graphics and present families differ
    /// under exclusive sharing, the present command pool used for ownership
    /// transfers.
    pub fn create_swapchain(
        &mut self,
        extent: vk::Extent2D,
        vsync: bool,
        flags: vk::SwapchainCreateFlagsKHR,
    ) -> Result<()> {
        self.core.create_swapchain(extent, vsync, flags)?;

        let families = self.core.queue_families();
        let exclusive =
            self.core.swapchain_desc().sharing_mode == vk::SharingMode::EXCLUSIVE;
        if families.present != vk::QUEUE_FAMILY_IGNORED
            && families.present != families.graphics
            && exclusive
            && self.present_command_pool.is_none()
        {
            let shared = self
                .core
                .device_shared()
                .ok_or_else(|| RenderError::Initialization("no device".to_string()))?;
            let pool = CommandPool::new(
                &shared.device,
                families.present,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?;
            self.present_command_buffer = pool.allocate_buffer(vk::CommandBufferLevel::PRIMARY)?;
            self.present_command_pool = Some(pool);
            info!("Present command pool created for queue-family ownership transfer.");
        }
        Ok(())
    }

    pub fn recreate_swapchain(&mut self) -> Result<()> {
        self.core.recreate_swapchain()
    }

    pub fn swap_image(&mut self, semaphore: vk::Semaphore) -> Result<u32> {
        self.core.swap_image(semaphore)
    }

    pub fn present_image(&mut self, wait_semaphore: vk::Semaphore) -> Result<()> {
        self.core.present_image(wait_semaphore)
    }

    pub fn wait_idle(&self) -> Result<()> {
        self.core.wait_idle()
    }

    // Callback registry passthrough.

    pub fn add_callback(
        &mut self,
        kind: CallbackKind,
        name: impl Into<String>,
        callback: Box<dyn FnMut()>,
    ) {
        self.core.callbacks.add(kind, name, callback);
    }

    pub fn remove_callback(&mut self, kind: CallbackKind, name: &str) {
        self.core.callbacks.remove(kind, name);
    }

    /// Registers a callback and remembers it, so one
    /// [`Self::remove_registered_callbacks`] call detaches everything this
    /// owner registered.
    pub fn register_auto_removed_callback(
        &mut self,
        kind: CallbackKind,
        name: impl Into<String>,
        callback: Box<dyn FnMut()>,
    ) {
        let name = name.into();
        self.core.callbacks.add(kind, name.clone(), callback);
        self.auto_removed_callbacks.push((kind, name));
    }

    pub fn remove_registered_callbacks(&mut self) {
        for (kind, name) in self.auto_removed_callbacks.drain(..) {
            self.core.callbacks.remove(kind, &name);
        }
    }

    // Submission helpers.

    fn queue_submit(
        &self,
        queue: vk::Queue,
        submit_info: &vk::SubmitInfo,
        fence: vk::Fence,
    ) -> Result<()> {
        let shared = self
            .core
            .device_shared()
            .ok_or_else(|| RenderError::Initialization("no device".to_string()))?;
        unsafe { shared.device.queue_submit(queue, std::slice::from_ref(submit_info), fence) }
            .map_err(|e| {
                error!("Failed to submit command buffer: {}", e);
                RenderError::from(e)
            })
    }

    /// Submits a caller-built `SubmitInfo` to the graphics queue.
    pub fn submit_info_to_graphics(
        &self,
        submit_info: &vk::SubmitInfo,
        fence: vk::Fence,
    ) -> Result<()> {
        let queue = self
            .core
            .queues()
            .graphics
            .ok_or_else(|| RenderError::Initialization("no graphics queue".to_string()))?;
        self.queue_submit(queue, submit_info, fence)
    }

    pub fn submit_to_graphics(&self, buffer: vk::CommandBuffer, fence: vk::Fence) -> Result<()> {
        let buffers = [buffer];
        let info = build_submit_info(&buffers, &[], &[], &[]);
        self.submit_info_to_graphics(&info, fence)
    }

    /// Graphics submission with optional wait/signal semaphores; the wait
    /// stage defaults to color-attachment output.
    pub fn submit_to_graphics_synced(
        &self,
        buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
        wait_stage: vk::PipelineStageFlags,
    ) -> Result<()> {
        let buffers = [buffer];
        let waits = [wait_semaphore];
        let stages = [wait_stage];
        let signals = [signal_semaphore];
        let info = build_submit_info(
            &buffers,
            if wait_semaphore == vk::Semaphore::null() { &[] } else { &waits },
            &stages,
            if signal_semaphore == vk::Semaphore::null() { &[] } else { &signals },
        );
        self.submit_info_to_graphics(&info, fence)
    }

    pub fn submit_info_to_compute(
        &self,
        submit_info: &vk::SubmitInfo,
        fence: vk::Fence,
    ) -> Result<()> {
        let queue = self
            .core
            .queues()
            .compute
            .ok_or_else(|| RenderError::Initialization("no compute queue".to_string()))?;
        self.queue_submit(queue, submit_info, fence)
    }

    pub fn submit_to_compute(&self, buffer: vk::CommandBuffer, fence: vk::Fence) -> Result<()> {
        let buffers = [buffer];
        let info = build_submit_info(&buffers, &[], &[], &[]);
        self.submit_info_to_compute(&info, fence)
    }

    /// Compute submission with optional semaphores; the wait stage defaults
    /// to the compute shader stage.
    pub fn submit_to_compute_synced(
        &self,
        buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
        wait_stage: vk::PipelineStageFlags,
    ) -> Result<()> {
        let buffers = [buffer];
        let waits = [wait_semaphore];
        let stages = [wait_stage];
        let signals = [signal_semaphore];
        let info = build_submit_info(
            &buffers,
            if wait_semaphore == vk::Semaphore::null() { &[] } else { &waits },
            &stages,
            if signal_semaphore == vk::Semaphore::null() { &[] } else { &signals },
        );
        self.submit_info_to_compute(&info, fence)
    }

    /// Present-queue submission; waits at all-commands.
    pub fn submit_to_present(
        &self,
        buffer: vk::CommandBuffer,
        wait_semaphore: vk::Semaphore,
        signal_semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> Result<()> {
        let queue = self
            .core
            .queues()
            .present
            .ok_or_else(|| RenderError::Initialization("no present queue".to_string()))?;
        let buffers = [buffer];
        let waits = [wait_semaphore];
        let stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let signals = [signal_semaphore];
        let info = build_submit_info(
            &buffers,
            if wait_semaphore == vk::Semaphore::null() { &[] } else { &waits },
            &stages,
            if signal_semaphore == vk::Semaphore::null() { &[] } else { &signals },
        );
        self.queue_submit(queue, &info, fence)
    }

    /// Shorthand: submit to graphics and block on a local fence.
    pub fn execute_graphics_commands(&self, buffer: vk::CommandBuffer) -> Result<()> {
        let shared = self
            .core
            .device_shared()
            .ok_or_else(|| RenderError::Initialization("no device".to_string()))?;
        let fence = Fence::new(&shared.device, vk::FenceCreateFlags::empty())?;
        self.submit_to_graphics(buffer, fence.handle())?;
        fence.wait()
    }

    /// Records the graphics→present queue-family ownership release for the
    /// currently acquired swapchain image into the present command buffer:
    /// color-attachment-write to none, color-attachment-output to
    /// bottom-of-pipe, `PRESENT_SRC_KHR` on both sides.
    pub fn transfer_image_ownership_to_present(&self) -> Result<vk::CommandBuffer> {
        let shared = self
            .core
            .device_shared()
            .ok_or_else(|| RenderError::Initialization("no device".to_string()))?;
        let families = self.core.queue_families();
        let image = self
            .core
            .swapchain_image(self.core.current_image_index() as usize)
            .ok_or_else(|| RenderError::Initialization("no acquired swapchain image".to_string()))?;
        let command_buffer = self.present_command_buffer.handle();
        if command_buffer == vk::CommandBuffer::null() {
            return Err(RenderError::Initialization(
                "present command buffer not allocated (families do not differ)".to_string(),
            ));
        }

        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        unsafe { shared.device.begin_command_buffer(command_buffer, &begin_info) }
            .map_err(RenderError::from)?;

        let barrier = vk::ImageMemoryBarrier::builder()
            .src_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .dst_access_mask(vk::AccessFlags::NONE)
            .old_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .new_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .src_queue_family_index(families.graphics)
            .dst_queue_family_index(families.present)
            .image(image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });
        unsafe {
            shared.device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
                vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[barrier.build()],
            );
        }

        unsafe { shared.device.end_command_buffer(command_buffer) }.map_err(RenderError::from)?;
        Ok(command_buffer)
    }

    // Accessors for the transfer substrate.

    pub fn allocator(&self) -> Option<Arc<Allocator>> {
        self.allocator.clone()
    }

    pub fn staging_pool(&self) -> Option<Arc<StagingBufferPool>> {
        self.staging_pool.clone()
    }

    pub fn graphics_command_pool(&self) -> Option<&CommandPool> {
        self.graphics_command_pool.as_ref()
    }

    pub fn compute_command_pool(&self) -> Option<&CommandPool> {
        self.compute_command_pool.as_ref()
    }

    pub fn present_command_pool(&self) -> Option<&CommandPool> {
        self.present_command_pool.as_ref()
    }

    pub fn transfer_command_buffer(&self) -> vk::CommandBuffer {
        self.transfer_command_buffer.handle()
    }

    pub fn device_shared(&self) -> Option<Arc<DeviceShared>> {
        self.core.device_shared()
    }

    /// The blocking transfer channel over the graphics queue.
    pub fn transfer_channel(&self) -> Result<TransferChannel> {
        let shared = self
            .core
            .device_shared()
            .ok_or_else(|| RenderError::Initialization("no device".to_string()))?;
        let queue = self
            .core
            .queues()
            .graphics
            .ok_or_else(|| RenderError::Initialization("no graphics queue".to_string()))?;
        let command_buffer = self.transfer_command_buffer.handle();
        if command_buffer == vk::CommandBuffer::null() {
            return Err(RenderError::Initialization(
                "transfer command buffer not allocated".to_string(),
            ));
        }
        Ok(TransferChannel { device: shared.device.clone(), queue, command_buffer })
    }

    /// Bundles the pieces texture uploads need.
    pub fn upload_context<'a>(&self, channel: &'a TransferChannel) -> Result<UploadContext<'a>> {
        Ok(UploadContext {
            shared: self
                .core
                .device_shared()
                .ok_or_else(|| RenderError::Initialization("no device".to_string()))?,
            channel,
            staging_pool: self
                .staging_pool
                .clone()
                .ok_or_else(|| RenderError::Initialization("no staging pool".to_string()))?,
            allocator: self.allocator.clone(),
        })
    }
}

impl Drop for VulkanContext {
    fn drop(&mut self) {
        let _ = self.wait_idle();
        self.remove_registered_callbacks();
        self.drop_device_resources();
        // The core tears down swapchain, device, surface and instance.
    }
}
