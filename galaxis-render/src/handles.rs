//! Owning wrappers for Vulkan handles.
//!
//! One thin wrapper per object kind. Each holds the native handle plus a
//! clone of the owning `ash::Device` and releases the handle exactly once
//! when dropped, with the per-kind `destroy_*` or `free_*` call. Rust's
//! move semantics give the move-transfers-ownership contract for free; a
//! dropped empty wrapper is a no-op. Pool-owned objects (command buffers,
//! descriptor sets) carry no release of their own and are freed through
//! their pool, which nulls them.

use std::fs::File;

use ash::vk;
use log::debug;

use crate::error::{RenderError, Result};

macro_rules! owning_handle {
    ($(#[$meta:meta])* $name:ident, $vk:ty, $release:ident, $label:literal) => {
        $(#[$meta])*
        pub struct $name {
            device: ash::Device,
            handle: $vk,
        }

        impl $name {
            /// Wraps a raw handle. The wrapper owns it from here on.
            pub fn from_raw(device: &ash::Device, handle: $vk) -> Self {
                Self { device: device.clone(), handle }
            }

            pub fn handle(&self) -> $vk {
                self.handle
            }

            pub fn is_valid(&self) -> bool {
                self.handle != <$vk>::null()
            }

            /// Relinquishes ownership of the handle without releasing it.
            pub fn take(&mut self) -> $vk {
                std::mem::replace(&mut self.handle, <$vk>::null())
            }
        }

        impl Drop for $name {
            fn drop(&mut self) {
                if self.handle != <$vk>::null() {
                    unsafe {
                        self.device.$release(self.handle, None);
                    }
                    debug!(concat!($label, " destroyed successfully."));
                }
            }
        }
    };
}

macro_rules! pool_owned_handle {
    ($(#[$meta:meta])* $name:ident, $vk:ty) => {
        $(#[$meta])*
        #[derive(Debug, Default, Clone, Copy)]
        pub struct $name {
            handle: $vk,
        }

        impl $name {
            pub fn from_raw(handle: $vk) -> Self {
                Self { handle }
            }

            pub fn handle(&self) -> $vk {
                self.handle
            }

            pub fn is_valid(&self) -> bool {
                self.handle != <$vk>::null()
            }

            /// Nulls the wrapper, returning the raw handle for the pool to
            /// free.
            pub fn take(&mut self) -> $vk {
                std::mem::replace(&mut self.handle, <$vk>::null())
            }
        }
    };
}

owning_handle!(
    /// Owning wrapper for `vk::Fence`.
    Fence, vk::Fence, destroy_fence, "Fence");
owning_handle!(
    /// Owning wrapper for `vk::Semaphore`.
    Semaphore, vk::Semaphore, destroy_semaphore, "Semaphore");
owning_handle!(
    /// Owning wrapper for `vk::Sampler`.
    Sampler, vk::Sampler, destroy_sampler, "Sampler");
owning_handle!(
    /// Owning wrapper for `vk::Buffer`. Memory comes separately; see
    /// [`crate::memory::BufferMemory`].
    Buffer, vk::Buffer, destroy_buffer, "Buffer");
owning_handle!(
    /// Owning wrapper for `vk::BufferView`.
    BufferView, vk::BufferView, destroy_buffer_view, "Buffer view");
owning_handle!(
    /// Owning wrapper for `vk::Image`.
    Image, vk::Image, destroy_image, "Image");
owning_handle!(
    /// Owning wrapper for `vk::ImageView`.
    ImageView, vk::ImageView, destroy_image_view, "Image view");
owning_handle!(
    /// Owning wrapper for `vk::ShaderModule`.
    ShaderModule, vk::ShaderModule, destroy_shader_module, "Shader module");
owning_handle!(
    /// Owning wrapper for `vk::Framebuffer`.
    Framebuffer, vk::Framebuffer, destroy_framebuffer, "Framebuffer");
owning_handle!(
    /// Owning wrapper for `vk::RenderPass`.
    RenderPass, vk::RenderPass, destroy_render_pass, "Render pass");
owning_handle!(
    /// Owning wrapper for `vk::DescriptorSetLayout`.
    DescriptorSetLayout, vk::DescriptorSetLayout, destroy_descriptor_set_layout,
    "Descriptor set layout");
owning_handle!(
    /// Owning wrapper for `vk::DescriptorPool`.
    DescriptorPool, vk::DescriptorPool, destroy_descriptor_pool, "Descriptor pool");
owning_handle!(
    /// Owning wrapper for `vk::PipelineLayout`.
    PipelineLayout, vk::PipelineLayout, destroy_pipeline_layout, "Pipeline layout");
owning_handle!(
    /// Owning wrapper for `vk::PipelineCache`.
    PipelineCache, vk::PipelineCache, destroy_pipeline_cache, "Pipeline cache");
owning_handle!(
    /// Owning wrapper for `vk::Pipeline` (graphics or compute).
    Pipeline, vk::Pipeline, destroy_pipeline, "Pipeline");
owning_handle!(
    /// Owning wrapper for `vk::CommandPool`.
    CommandPool, vk::CommandPool, destroy_command_pool, "Command pool");

pool_owned_handle!(
    /// Command buffer allocated from a [`CommandPool`]. Freed through the
    /// pool; dropping the wrapper alone leaks nothing (the pool reclaims
    /// its buffers on destruction).
    CommandBuffer, vk::CommandBuffer);
pool_owned_handle!(
    /// Descriptor set allocated from a [`DescriptorPool`].
    DescriptorSet, vk::DescriptorSet);

impl Fence {
    pub fn new(device: &ash::Device, flags: vk::FenceCreateFlags) -> Result<Self> {
        let create_info = vk::FenceCreateInfo::builder().flags(flags);
        let handle = unsafe { device.create_fence(&create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }

    pub fn wait(&self) -> Result<()> {
        unsafe { self.device.wait_for_fences(&[self.handle], true, u64::MAX) }
            .map_err(RenderError::from)
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.reset_fences(&[self.handle]) }.map_err(RenderError::from)
    }

    pub fn wait_and_reset(&self) -> Result<()> {
        self.wait()?;
        self.reset()
    }

    /// Non-blocking status query: `true` when signaled.
    pub fn status(&self) -> Result<bool> {
        unsafe { self.device.get_fence_status(self.handle) }.map_err(RenderError::from)
    }
}

impl Semaphore {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let create_info = vk::SemaphoreCreateInfo::builder();
        let handle =
            unsafe { device.create_semaphore(&create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl Sampler {
    pub fn new(device: &ash::Device, create_info: &vk::SamplerCreateInfo) -> Result<Self> {
        let handle =
            unsafe { device.create_sampler(create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl Buffer {
    pub fn new(device: &ash::Device, create_info: &vk::BufferCreateInfo) -> Result<Self> {
        let handle =
            unsafe { device.create_buffer(create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl BufferView {
    pub fn new(device: &ash::Device, create_info: &vk::BufferViewCreateInfo) -> Result<Self> {
        let handle =
            unsafe { device.create_buffer_view(create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl Image {
    pub fn new(device: &ash::Device, create_info: &vk::ImageCreateInfo) -> Result<Self> {
        let handle = unsafe { device.create_image(create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl ImageView {
    pub fn new(device: &ash::Device, create_info: &vk::ImageViewCreateInfo) -> Result<Self> {
        let handle =
            unsafe { device.create_image_view(create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }

    /// The common full-subresource view over an image.
    pub fn for_image(
        device: &ash::Device,
        image: vk::Image,
        view_type: vk::ImageViewType,
        format: vk::Format,
        subresource_range: vk::ImageSubresourceRange,
    ) -> Result<Self> {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(view_type)
            .format(format)
            .subresource_range(subresource_range);
        Self::new(device, &create_info)
    }
}

impl ShaderModule {
    /// Creates a shader module from already-aligned SPIR-V words.
    pub fn new(device: &ash::Device, code: &[u32]) -> Result<Self> {
        let create_info = vk::ShaderModuleCreateInfo::builder().code(code);
        let handle =
            unsafe { device.create_shader_module(&create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }

    /// Loads a compiled SPIR-V blob from disk. The reader enforces the
    /// 4-byte alignment the API requires.
    pub fn from_file(device: &ash::Device, path: &std::path::Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let code = ash::util::read_spv(&mut file)
            .map_err(|e| RenderError::ShaderLoading(format!("{}: {e}", path.display())))?;
        Self::new(device, &code)
    }
}

impl Framebuffer {
    pub fn new(device: &ash::Device, create_info: &vk::FramebufferCreateInfo) -> Result<Self> {
        let handle =
            unsafe { device.create_framebuffer(create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl RenderPass {
    pub fn new(device: &ash::Device, create_info: &vk::RenderPassCreateInfo) -> Result<Self> {
        let handle =
            unsafe { device.create_render_pass(create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }

    pub fn begin(
        &self,
        command_buffer: vk::CommandBuffer,
        begin_info: &vk::RenderPassBeginInfo,
        contents: vk::SubpassContents,
    ) {
        unsafe {
            self.device.cmd_begin_render_pass(command_buffer, begin_info, contents);
        }
    }

    pub fn next_subpass(&self, command_buffer: vk::CommandBuffer, contents: vk::SubpassContents) {
        unsafe {
            self.device.cmd_next_subpass(command_buffer, contents);
        }
    }

    pub fn end(&self, command_buffer: vk::CommandBuffer) {
        unsafe {
            self.device.cmd_end_render_pass(command_buffer);
        }
    }
}

impl DescriptorSetLayout {
    pub fn new(
        device: &ash::Device,
        create_info: &vk::DescriptorSetLayoutCreateInfo,
    ) -> Result<Self> {
        let handle = unsafe { device.create_descriptor_set_layout(create_info, None) }
            .map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl DescriptorPool {
    pub fn new(
        device: &ash::Device,
        max_sets: u32,
        pool_sizes: &[vk::DescriptorPoolSize],
        flags: vk::DescriptorPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::DescriptorPoolCreateInfo::builder()
            .flags(flags)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes);
        let handle = unsafe { device.create_descriptor_pool(&create_info, None) }
            .map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }

    pub fn allocate_sets(
        &self,
        layouts: &[vk::DescriptorSetLayout],
    ) -> Result<Vec<DescriptorSet>> {
        let allocate_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(self.handle)
            .set_layouts(layouts);
        let raw = unsafe { self.device.allocate_descriptor_sets(&allocate_info) }
            .map_err(RenderError::from)?;
        Ok(raw.into_iter().map(DescriptorSet::from_raw).collect())
    }

    /// Frees the sets and nulls the callers' wrappers. Requires the pool to
    /// have been created with `FREE_DESCRIPTOR_SET`.
    pub fn free_sets(&self, sets: &mut [DescriptorSet]) -> Result<()> {
        let raw: Vec<vk::DescriptorSet> = sets.iter_mut().map(|s| s.take()).collect();
        unsafe { self.device.free_descriptor_sets(self.handle, &raw) }.map_err(RenderError::from)
    }
}

impl DescriptorSet {
    /// Writes image descriptors at `binding`/`array_element`.
    pub fn write_images(
        &self,
        device: &ash::Device,
        infos: &[vk::DescriptorImageInfo],
        descriptor_type: vk::DescriptorType,
        binding: u32,
        array_element: u32,
    ) {
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.handle)
            .dst_binding(binding)
            .dst_array_element(array_element)
            .descriptor_type(descriptor_type)
            .image_info(infos);
        unsafe {
            device.update_descriptor_sets(&[write.build()], &[]);
        }
    }

    /// Writes buffer descriptors at `binding`/`array_element`.
    pub fn write_buffers(
        &self,
        device: &ash::Device,
        infos: &[vk::DescriptorBufferInfo],
        descriptor_type: vk::DescriptorType,
        binding: u32,
        array_element: u32,
    ) {
        let write = vk::WriteDescriptorSet::builder()
            .dst_set(self.handle)
            .dst_binding(binding)
            .dst_array_element(array_element)
            .descriptor_type(descriptor_type)
            .buffer_info(infos);
        unsafe {
            device.update_descriptor_sets(&[write.build()], &[]);
        }
    }
}

impl PipelineLayout {
    pub fn new(device: &ash::Device, create_info: &vk::PipelineLayoutCreateInfo) -> Result<Self> {
        let handle = unsafe { device.create_pipeline_layout(create_info, None) }
            .map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }
}

impl PipelineCache {
    pub fn new(device: &ash::Device, flags: vk::PipelineCacheCreateFlags) -> Result<Self> {
        Self::with_initial_data(device, flags, &[])
    }

    /// Seeds the cache from an opaque blob saved by a previous run. The
    /// driver validates the blob; a mismatch simply yields an empty cache.
    pub fn with_initial_data(
        device: &ash::Device,
        flags: vk::PipelineCacheCreateFlags,
        initial_data: &[u8],
    ) -> Result<Self> {
        let create_info = vk::PipelineCacheCreateInfo::builder()
            .flags(flags)
            .initial_data(initial_data);
        let handle = unsafe { device.create_pipeline_cache(&create_info, None) }
            .map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }

    /// The opaque blob to persist for the next run on the same driver.
    pub fn data(&self) -> Result<Vec<u8>> {
        unsafe { self.device.get_pipeline_cache_data(self.handle) }.map_err(RenderError::from)
    }
}

impl Pipeline {
    /// Creates a graphics pipeline, optionally through a shared cache.
    pub fn graphics(
        device: &ash::Device,
        create_info: &vk::GraphicsPipelineCreateInfo,
        cache: Option<&PipelineCache>,
    ) -> Result<Self> {
        let cache_handle = cache.map_or(vk::PipelineCache::null(), |c| c.handle());
        let pipelines = unsafe {
            device.create_graphics_pipelines(cache_handle, std::slice::from_ref(create_info), None)
        }
        .map_err(|(_, e)| RenderError::PipelineCreation(format!("graphics pipeline: {e}")))?;
        Ok(Self::from_raw(device, pipelines[0]))
    }

    /// Creates a compute pipeline, optionally through a shared cache.
    pub fn compute(
        device: &ash::Device,
        create_info: &vk::ComputePipelineCreateInfo,
        cache: Option<&PipelineCache>,
    ) -> Result<Self> {
        let cache_handle = cache.map_or(vk::PipelineCache::null(), |c| c.handle());
        let pipelines = unsafe {
            device.create_compute_pipelines(cache_handle, std::slice::from_ref(create_info), None)
        }
        .map_err(|(_, e)| RenderError::PipelineCreation(format!("compute pipeline: {e}")))?;
        Ok(Self::from_raw(device, pipelines[0]))
    }
}

impl CommandPool {
    pub fn new(
        device: &ash::Device,
        queue_family_index: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(queue_family_index)
            .flags(flags);
        let handle =
            unsafe { device.create_command_pool(&create_info, None) }.map_err(RenderError::from)?;
        Ok(Self::from_raw(device, handle))
    }

    pub fn allocate_buffer(&self, level: vk::CommandBufferLevel) -> Result<CommandBuffer> {
        Ok(self.allocate_buffers(level, 1)?.remove(0))
    }

    /// Allocates `count` command buffers, converting the raw vector into
    /// wrappers by moving the handles.
    pub fn allocate_buffers(
        &self,
        level: vk::CommandBufferLevel,
        count: u32,
    ) -> Result<Vec<CommandBuffer>> {
        let allocate_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(level)
            .command_buffer_count(count);
        let raw = unsafe { self.device.allocate_command_buffers(&allocate_info) }
            .map_err(RenderError::from)?;
        Ok(raw.into_iter().map(CommandBuffer::from_raw).collect())
    }

    /// Frees the buffer and nulls the caller's wrapper.
    pub fn free_buffer(&self, buffer: &mut CommandBuffer) {
        self.free_buffers(std::slice::from_mut(buffer));
    }

    /// Frees the buffers and nulls the callers' wrappers.
    pub fn free_buffers(&self, buffers: &mut [CommandBuffer]) {
        let raw: Vec<vk::CommandBuffer> =
            buffers.iter_mut().map(|b| b.take()).filter(|h| *h != vk::CommandBuffer::null()).collect();
        if !raw.is_empty() {
            unsafe {
                self.device.free_command_buffers(self.handle, &raw);
            }
        }
    }
}

impl CommandBuffer {
    /// Begins recording with the given usage flags.
    pub fn begin(&self, device: &ash::Device, flags: vk::CommandBufferUsageFlags) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder().flags(flags);
        unsafe { device.begin_command_buffer(self.handle, &begin_info) }.map_err(RenderError::from)
    }

    /// Begins recording a secondary buffer with inheritance state.
    pub fn begin_secondary(
        &self,
        device: &ash::Device,
        inheritance: &vk::CommandBufferInheritanceInfo,
        flags: vk::CommandBufferUsageFlags,
    ) -> Result<()> {
        let begin_info = vk::CommandBufferBeginInfo::builder()
            .flags(flags)
            .inheritance_info(inheritance);
        unsafe { device.begin_command_buffer(self.handle, &begin_info) }.map_err(RenderError::from)
    }

    pub fn end(&self, device: &ash::Device) -> Result<()> {
        unsafe { device.end_command_buffer(self.handle) }.map_err(RenderError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_owned_wrapper_take_nulls() {
        let mut wrapper = CommandBuffer::from_raw(vk::CommandBuffer::null());
        assert!(!wrapper.is_valid());
        // take() on an already-null wrapper stays null and is harmless.
        assert_eq!(wrapper.take(), vk::CommandBuffer::null());
        assert!(!wrapper.is_valid());
    }

    #[test]
    fn descriptor_set_default_is_invalid() {
        let set = DescriptorSet::default();
        assert!(!set.is_valid());
    }
}
