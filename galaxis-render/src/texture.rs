//! Texture upload orchestration.
//!
//! Uploads run as a multi-step state machine over one transfer submission:
//! buffer→image copy, an optional format-conversion blit (through an
//! aliased staging image when the formats permit, through an intermediate
//! image otherwise), and mip-chain generation by repeated halving blits.
//! Every step's image-layout transition is explicit; the barrier parameter
//! packs let a caller (or an outer step) elide one side and manage the
//! layout itself.

use std::path::Path;
use std::sync::Arc;

use ash::vk;
use log::error;

use crate::allocator::Allocator;
use crate::compressed::{is_compressed_container, load_compressed};
use crate::context::TransferChannel;
use crate::device::DeviceShared;
use crate::error::{RenderError, Result};
use crate::format::{format_info, RawDataType};
use crate::handles::ImageView;
use crate::memory::ImageMemory;
use crate::staging::{StagingAllocDesc, StagingBufferPool, StagingLease};

/// Full mip-chain length for an extent: `⌊log2(max(w,h,d))⌋ + 1`.
pub fn calculate_mip_levels(extent: vk::Extent3D) -> u32 {
    let largest = extent.width.max(extent.height).max(extent.depth).max(1);
    32 - largest.leading_zeros()
}

/// Extent of `extent` at `mip_level`, floored at 1 per axis.
pub fn mipmap_extent(extent: vk::Extent3D, mip_level: u32) -> vk::Offset3D {
    vk::Offset3D {
        x: (extent.width >> mip_level).max(1) as i32,
        y: (extent.height >> mip_level).max(1) as i32,
        z: (extent.depth >> mip_level).max(1) as i32,
    }
}

/// One side of a copy/blit barrier: pipeline stage, access mask and image
/// layout, plus an enable switch. A disabled pack elides the barrier,
/// leaving layout management to the caller.
#[derive(Debug, Clone, Copy)]
pub struct BarrierPack {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
    pub enabled: bool,
}

impl BarrierPack {
    pub const fn new(
        stage: vk::PipelineStageFlags2,
        access: vk::AccessFlags2,
        layout: vk::ImageLayout,
    ) -> Self {
        BarrierPack { stage, access, layout, enabled: true }
    }

    pub const DISABLED: BarrierPack = BarrierPack {
        stage: vk::PipelineStageFlags2::NONE,
        access: vk::AccessFlags2::NONE,
        layout: vk::ImageLayout::UNDEFINED,
        enabled: false,
    };
}

const SHADER_READ_BARRIER: BarrierPack = BarrierPack::new(
    vk::PipelineStageFlags2::FRAGMENT_SHADER,
    vk::AccessFlags2::SHADER_READ,
    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
);

const TRANSFER_DST_BARRIER: BarrierPack = BarrierPack::new(
    vk::PipelineStageFlags2::TRANSFER,
    vk::AccessFlags2::TRANSFER_WRITE,
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
);

const TRANSFER_SRC_BARRIER: BarrierPack = BarrierPack::new(
    vk::PipelineStageFlags2::TRANSFER,
    vk::AccessFlags2::TRANSFER_READ,
    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
);

fn image_barrier2(
    image: vk::Image,
    src_stage: vk::PipelineStageFlags2,
    src_access: vk::AccessFlags2,
    dst_stage: vk::PipelineStageFlags2,
    dst_access: vk::AccessFlags2,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    range: vk::ImageSubresourceRange,
) -> vk::ImageMemoryBarrier2 {
    vk::ImageMemoryBarrier2::builder()
        .src_stage_mask(src_stage)
        .src_access_mask(src_access)
        .dst_stage_mask(dst_stage)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
        .build()
}

fn emit_barriers(device: &ash::Device, cb: vk::CommandBuffer, barriers: &[vk::ImageMemoryBarrier2]) {
    let dependency = vk::DependencyInfo::builder()
        .dependency_flags(vk::DependencyFlags::BY_REGION)
        .image_memory_barriers(barriers);
    unsafe {
        device.cmd_pipeline_barrier2(cb, &dependency);
    }
}

/// Records a buffer→image copy with optional pre/post barriers on the
/// destination's touched subresource.
pub fn copy_buffer_to_image(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    src_buffer: vk::Buffer,
    src_barrier: BarrierPack,
    dst_barrier: BarrierPack,
    region: vk::BufferImageCopy,
    dst_image: vk::Image,
) {
    let range = vk::ImageSubresourceRange {
        aspect_mask: region.image_subresource.aspect_mask,
        base_mip_level: region.image_subresource.mip_level,
        level_count: 1,
        base_array_layer: region.image_subresource.base_array_layer,
        layer_count: region.image_subresource.layer_count,
    };

    if src_barrier.enabled {
        let barrier = image_barrier2(
            dst_image,
            src_barrier.stage,
            src_barrier.access,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            src_barrier.layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            range,
        );
        emit_barriers(device, cb, &[barrier]);
    }

    unsafe {
        device.cmd_copy_buffer_to_image(
            cb,
            src_buffer,
            dst_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );
    }

    if dst_barrier.enabled {
        let barrier = image_barrier2(
            dst_image,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            dst_barrier.stage,
            dst_barrier.access,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            dst_barrier.layout,
            range,
        );
        emit_barriers(device, cb, &[barrier]);
    }
}

/// Records an image blit. An enabled source pack transitions BOTH images
/// into transfer layouts first; an enabled destination pack transitions the
/// destination onward afterwards.
pub fn blit_image(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    src_image: vk::Image,
    src_barrier: BarrierPack,
    dst_barrier: BarrierPack,
    region: vk::ImageBlit,
    filter: vk::Filter,
    dst_image: vk::Image,
) {
    let src_range = vk::ImageSubresourceRange {
        aspect_mask: region.src_subresource.aspect_mask,
        base_mip_level: region.src_subresource.mip_level,
        level_count: 1,
        base_array_layer: region.src_subresource.base_array_layer,
        layer_count: region.src_subresource.layer_count,
    };
    let dst_range = vk::ImageSubresourceRange {
        aspect_mask: region.dst_subresource.aspect_mask,
        base_mip_level: region.dst_subresource.mip_level,
        level_count: 1,
        base_array_layer: region.dst_subresource.base_array_layer,
        layer_count: region.dst_subresource.layer_count,
    };

    if src_barrier.enabled {
        let to_transfer_src = image_barrier2(
            src_image,
            src_barrier.stage,
            src_barrier.access,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
            src_barrier.layout,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            src_range,
        );
        let to_transfer_dst = image_barrier2(
            dst_image,
            src_barrier.stage,
            src_barrier.access,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            src_barrier.layout,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            dst_range,
        );
        emit_barriers(device, cb, &[to_transfer_src, to_transfer_dst]);
    }

    unsafe {
        device.cmd_blit_image(
            cb,
            src_image,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            dst_image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
            filter,
        );
    }

    if dst_barrier.enabled {
        let barrier = image_barrier2(
            dst_image,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_WRITE,
            dst_barrier.stage,
            dst_barrier.access,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            dst_barrier.layout,
            dst_range,
        );
        emit_barriers(device, cb, &[barrier]);
    }
}

/// Records the mip-chain generation for `image`: level `i` is blitted into
/// level `i+1` with halving extents, each level transitioned to
/// transfer-dst before and transfer-src after its blit. The final barrier
/// moves all levels from transfer-src to the requested layout.
///
/// Multi-layer images batch one blit region per layer so the per-level
/// barriers cover all layers at once; single-layer images reuse the general
/// blit helper.
pub fn generate_mipmaps(
    device: &ash::Device,
    cb: vk::CommandBuffer,
    image: vk::Image,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    filter: vk::Filter,
    final_barrier: BarrierPack,
) {
    if array_layers > 1 {
        let initial_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: array_layers,
        };
        let init = image_barrier2(
            image,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::NONE,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::TRANSFER_READ,
            vk::ImageLayout::UNDEFINED,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            initial_range,
        );
        emit_barriers(device, cb, &[init]);

        for mip_level in 1..mip_levels {
            let src_extent = mipmap_extent(extent, mip_level - 1);
            let dst_extent = mipmap_extent(extent, mip_level);
            let current_range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: mip_level,
                level_count: 1,
                base_array_layer: 0,
                layer_count: array_layers,
            };

            let to_dst = image_barrier2(
                image,
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::NONE,
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                current_range,
            );
            emit_barriers(device, cb, &[to_dst]);

            let regions: Vec<vk::ImageBlit> = (0..array_layers)
                .map(|layer| vk::ImageBlit {
                    src_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level: mip_level - 1,
                        base_array_layer: layer,
                        layer_count: 1,
                    },
                    src_offsets: [vk::Offset3D::default(), src_extent],
                    dst_subresource: vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level,
                        base_array_layer: layer,
                        layer_count: 1,
                    },
                    dst_offsets: [vk::Offset3D::default(), dst_extent],
                })
                .collect();

            unsafe {
                device.cmd_blit_image(
                    cb,
                    image,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    image,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    &regions,
                    filter,
                );
            }

            // This level becomes the source of the next iteration.
            let to_src = image_barrier2(
                image,
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                current_range,
            );
            emit_barriers(device, cb, &[to_src]);
        }
    } else {
        let src_barrier = BarrierPack::new(
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::UNDEFINED,
        );
        for mip_level in 1..mip_levels {
            let region = vk::ImageBlit {
                src_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: mip_level - 1,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                src_offsets: [vk::Offset3D::default(), mipmap_extent(extent, mip_level - 1)],
                dst_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level,
                    base_array_layer: 0,
                    layer_count: 1,
                },
                dst_offsets: [vk::Offset3D::default(), mipmap_extent(extent, mip_level)],
            };
            blit_image(device, cb, image, src_barrier, TRANSFER_SRC_BARRIER, region, filter, image);
        }
    }

    if final_barrier.enabled {
        let full_range = vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: 0,
            level_count: mip_levels,
            base_array_layer: 0,
            layer_count: array_layers,
        };
        let transition = image_barrier2(
            image,
            vk::PipelineStageFlags2::TRANSFER,
            vk::AccessFlags2::NONE,
            final_barrier.stage,
            final_barrier.access,
            vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            final_barrier.layout,
            full_range,
        );
        emit_barriers(device, cb, &[transition]);
    }
}

/// Records and executes upload + optional same-memory blit + mipgen in one
/// transfer submission. `dst_image_src_blit` receives the buffer copy; when
/// it differs from `dst_image_dst_blit` a full-extent blit bridges the two.
#[allow(clippy::too_many_arguments)]
fn copy_blit_generate(
    channel: &TransferChannel,
    src_buffer: vk::Buffer,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    filter: vk::Filter,
    dst_image_src_blit: vk::Image,
    dst_image_dst_blit: vk::Image,
    final_barrier: BarrierPack,
) -> Result<()> {
    let generate = mip_levels > 1;
    let need_blit = dst_image_src_blit != dst_image_dst_blit;

    channel.record_and_execute(|device, cb| {
        let subresource = vk::ImageSubresourceLayers {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: array_layers,
        };
        let region = vk::BufferImageCopy {
            image_subresource: subresource,
            image_extent: extent,
            ..Default::default()
        };
        let copy_src_barrier = BarrierPack::new(
            vk::PipelineStageFlags2::TOP_OF_PIPE,
            vk::AccessFlags2::NONE,
            vk::ImageLayout::UNDEFINED,
        );
        let copy_dst_barrier = if generate || need_blit { TRANSFER_DST_BARRIER } else { final_barrier };
        copy_buffer_to_image(
            device,
            cb,
            src_buffer,
            copy_src_barrier,
            copy_dst_barrier,
            region,
            dst_image_src_blit,
        );

        if need_blit {
            let full = vk::ImageBlit {
                src_subresource: subresource,
                src_offsets: [vk::Offset3D::default(), mipmap_extent(extent, 0)],
                dst_subresource: subresource,
                dst_offsets: [vk::Offset3D::default(), mipmap_extent(extent, 0)],
            };
            let blit_src_barrier = BarrierPack::new(
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            );
            let blit_dst_barrier = if generate { TRANSFER_DST_BARRIER } else { final_barrier };
            blit_image(
                device,
                cb,
                dst_image_src_blit,
                blit_src_barrier,
                blit_dst_barrier,
                full,
                filter,
                dst_image_dst_blit,
            );
        }

        if generate {
            generate_mipmaps(
                device,
                cb,
                dst_image_dst_blit,
                extent,
                mip_levels,
                array_layers,
                filter,
                final_barrier,
            );
        }
    })
}

/// Records and executes the aliased-image path: the preinitialized linear
/// source blits into the destination, then the mip chain is generated.
fn blit_generate(
    channel: &TransferChannel,
    src_image: vk::Image,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
    filter: vk::Filter,
    dst_image: vk::Image,
) -> Result<()> {
    let generate = mip_levels > 1;
    let need_blit = src_image != dst_image;
    if !generate && !need_blit {
        return Ok(());
    }

    channel.record_and_execute(|device, cb| {
        if need_blit {
            let layer_range = vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: array_layers,
            };
            // Preinitialized staging pixels become blit source; the
            // destination's base level opens for transfer writes.
            let src_to_transfer = image_barrier2(
                src_image,
                vk::PipelineStageFlags2::TOP_OF_PIPE,
                vk::AccessFlags2::NONE,
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
                vk::ImageLayout::PREINITIALIZED,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                layer_range,
            );
            let dst_to_transfer = image_barrier2(
                dst_image,
                vk::PipelineStageFlags2::TOP_OF_PIPE,
                vk::AccessFlags2::NONE,
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::ImageLayout::UNDEFINED,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                layer_range,
            );
            emit_barriers(device, cb, &[src_to_transfer, dst_to_transfer]);

            let subresource = vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: array_layers,
            };
            let full = vk::ImageBlit {
                src_subresource: subresource,
                src_offsets: [vk::Offset3D::default(), mipmap_extent(extent, 0)],
                dst_subresource: subresource,
                dst_offsets: [vk::Offset3D::default(), mipmap_extent(extent, 0)],
            };
            let dst_barrier = if generate { TRANSFER_DST_BARRIER } else { SHADER_READ_BARRIER };
            blit_image(
                device,
                cb,
                src_image,
                BarrierPack::DISABLED,
                dst_barrier,
                full,
                filter,
                dst_image,
            );
        }

        if generate {
            generate_mipmaps(
                device,
                cb,
                dst_image,
                extent,
                mip_levels,
                array_layers,
                filter,
                SHADER_READ_BARRIER,
            );
        }
    })
}

/// Decoded pixel data plus its extent.
pub struct ImageData {
    pub data: Vec<u8>,
    pub extent: vk::Extent3D,
}

fn decode_dynamic_image(
    decoded: image::DynamicImage,
    format: vk::Format,
    flip_vertically: bool,
) -> Result<ImageData> {
    let decoded = if flip_vertically { decoded.flipv() } else { decoded };
    let (width, height) = (decoded.width(), decoded.height());
    let info = format_info(format);

    let data: Vec<u8> = match (info.raw_data_type, info.component_size, info.component_count) {
        (RawDataType::Integer, 1, 1) => decoded.to_luma8().into_raw(),
        (RawDataType::Integer, 1, 2) => decoded.to_luma_alpha8().into_raw(),
        (RawDataType::Integer, 1, 3) => decoded.to_rgb8().into_raw(),
        (RawDataType::Integer, 1, 4) => decoded.to_rgba8().into_raw(),
        (RawDataType::Integer, 2, 1) => bytemuck::cast_slice(&decoded.to_luma16().into_raw()).to_vec(),
        (RawDataType::Integer, 2, 2) => {
            bytemuck::cast_slice(&decoded.to_luma_alpha16().into_raw()).to_vec()
        }
        (RawDataType::Integer, 2, 3) => bytemuck::cast_slice(&decoded.to_rgb16().into_raw()).to_vec(),
        (RawDataType::Integer, 2, 4) => bytemuck::cast_slice(&decoded.to_rgba16().into_raw()).to_vec(),
        (RawDataType::FloatingPoint, _, 3) => {
            bytemuck::cast_slice(&decoded.to_rgb32f().into_raw()).to_vec()
        }
        (RawDataType::FloatingPoint, _, _) => {
            bytemuck::cast_slice(&decoded.to_rgba32f().into_raw()).to_vec()
        }
        _ => {
            return Err(RenderError::TextureLoading(format!(
                "cannot decode into format {format:?}"
            )))
        }
    };

    Ok(ImageData {
        data,
        extent: vk::Extent3D { width, height, depth: 1 },
    })
}

/// Decodes an image file into tightly packed pixels of `format`'s layout.
/// Arbitrary on-disk channel counts are converted to the format's.
pub fn load_image_file(path: &Path, format: vk::Format, flip_vertically: bool) -> Result<ImageData> {
    if !path.exists() {
        error!("Failed to load image: \"{}\": no such file.", path.display());
        return Err(RenderError::TextureLoading(format!(
            "{}: no such file",
            path.display()
        )));
    }
    let decoded = image::open(path)?;
    decode_dynamic_image(decoded, format, flip_vertically)
}

/// Decodes an in-memory encoded image (PNG, JPG, ...).
pub fn load_image_bytes(bytes: &[u8], format: vk::Format, flip_vertically: bool) -> Result<ImageData> {
    let decoded = image::load_from_memory(bytes)?;
    decode_dynamic_image(decoded, format, flip_vertically)
}

/// Everything an upload needs from the runtime: device state, the blocking
/// transfer channel, the staging pool, and (optionally) the pooled
/// allocator.
#[derive(Clone)]
pub struct UploadContext<'a> {
    pub shared: Arc<DeviceShared>,
    pub channel: &'a TransferChannel,
    pub staging_pool: Arc<StagingBufferPool>,
    pub allocator: Option<Arc<Allocator>>,
}

impl<'a> UploadContext<'a> {
    fn staging_desc(&self) -> Option<StagingAllocDesc> {
        self.allocator.as_ref().map(|_| StagingAllocDesc::default())
    }

    fn create_image_memory(
        &self,
        image_type: vk::ImageType,
        format: vk::Format,
        extent: vk::Extent3D,
        mip_levels: u32,
        array_layers: u32,
        flags: vk::ImageCreateFlags,
    ) -> Result<ImageMemory> {
        // TRANSFER_SRC is required even for sampled-only images: the mip
        // chain is built by blitting the image into itself.
        let create_info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(image_type)
            .format(format)
            .extent(extent)
            .mip_levels(mip_levels)
            .array_layers(array_layers)
            .samples(vk::SampleCountFlags::TYPE_1)
            .usage(
                vk::ImageUsageFlags::TRANSFER_SRC
                    | vk::ImageUsageFlags::TRANSFER_DST
                    | vk::ImageUsageFlags::SAMPLED,
            );

        match &self.allocator {
            Some(allocator) => {
                let allocation_info = vk_mem::AllocationCreateInfo {
                    usage: vk_mem::MemoryUsage::GpuOnly,
                    ..Default::default()
                };
                ImageMemory::new_pooled(&self.shared, allocator, &allocation_info, &create_info)
            }
            None => ImageMemory::new_manual(
                &self.shared,
                &create_info,
                vk::MemoryPropertyFlags::DEVICE_LOCAL,
            ),
        }
    }
}

/// A sampled texture: image, backing memory and the default view over all
/// levels and layers. After construction every subresource is in
/// `SHADER_READ_ONLY_OPTIMAL`.
pub struct Texture {
    image_memory: ImageMemory,
    image_view: ImageView,
    format: vk::Format,
    extent: vk::Extent3D,
    mip_levels: u32,
    array_layers: u32,
}

impl Texture {
    pub fn image(&self) -> vk::Image {
        self.image_memory.image().handle()
    }

    pub fn image_view(&self) -> vk::ImageView {
        self.image_view.handle()
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    pub fn mip_levels(&self) -> u32 {
        self.mip_levels
    }

    pub fn array_layers(&self) -> u32 {
        self.array_layers
    }

    pub fn descriptor_image_info(&self, sampler: vk::Sampler) -> vk::DescriptorImageInfo {
        vk::DescriptorImageInfo {
            sampler,
            image_view: self.image_view.handle(),
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }
    }

    /// The upload state machine shared by all texture kinds.
    ///
    /// Three branches:
    /// (a) same source/target format — copy straight into the destination;
    /// (b) conversion with an aliased image — the staging memory is read as
    ///     a linear image of the source format and blitted across;
    /// (c) conversion without aliasing — a temporary image in the source
    ///     format is filled and mip-chained, then every level is blitted
    ///     into the destination.
    #[allow(clippy::too_many_arguments)]
    fn create_internal(
        upload: &UploadContext,
        staging: &mut StagingLease,
        initial_format: vk::Format,
        final_format: vk::Format,
        image_type: vk::ImageType,
        view_type: vk::ImageViewType,
        extent: vk::Extent3D,
        flags: vk::ImageCreateFlags,
        array_layers: u32,
        generate_mipmaps_flag: bool,
    ) -> Result<Texture> {
        let mip_levels = if generate_mipmaps_flag { calculate_mip_levels(extent) } else { 1 };

        let image_memory = upload.create_image_memory(
            image_type,
            final_format,
            extent,
            mip_levels,
            array_layers,
            flags,
        )?;
        let image_view = ImageView::for_image(
            &upload.shared.device,
            image_memory.image().handle(),
            view_type,
            final_format,
            vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: mip_levels,
                base_array_layer: 0,
                layer_count: array_layers,
            },
        )?;
        let dst_image = image_memory.image().handle();

        if initial_format == final_format {
            copy_blit_generate(
                upload.channel,
                staging.buffer(),
                extent,
                mip_levels,
                array_layers,
                vk::Filter::LINEAR,
                dst_image,
                dst_image,
                SHADER_READ_BARRIER,
            )?;
        } else if let Some(aliased) = staging.create_aliased_image(
            final_format,
            initial_format,
            vk::Extent2D { width: extent.width, height: extent.height },
        ) {
            blit_generate(
                upload.channel,
                aliased,
                extent,
                mip_levels,
                array_layers,
                vk::Filter::LINEAR,
                dst_image,
            )?;
        } else {
            // Intermediate image in the source format: filled and
            // mip-chained like branch (a), but parked in transfer-src so
            // its levels can feed the per-level conversion blits.
            let conversion = upload.create_image_memory(
                image_type,
                initial_format,
                extent,
                mip_levels,
                array_layers,
                flags,
            )?;
            let conversion_image = conversion.image().handle();

            copy_blit_generate(
                upload.channel,
                staging.buffer(),
                extent,
                mip_levels,
                array_layers,
                vk::Filter::LINEAR,
                conversion_image,
                conversion_image,
                TRANSFER_SRC_BARRIER,
            )?;

            upload.channel.record_and_execute(|device, cb| {
                for mip_level in 0..mip_levels {
                    let mip_extent = mipmap_extent(extent, mip_level);
                    let subresource = vk::ImageSubresourceLayers {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        mip_level,
                        base_array_layer: 0,
                        layer_count: array_layers,
                    };
                    let level_range = vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: mip_level,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: array_layers,
                    };

                    let to_dst = image_barrier2(
                        dst_image,
                        vk::PipelineStageFlags2::TOP_OF_PIPE,
                        vk::AccessFlags2::NONE,
                        vk::PipelineStageFlags2::TRANSFER,
                        vk::AccessFlags2::TRANSFER_WRITE,
                        vk::ImageLayout::UNDEFINED,
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                        level_range,
                    );
                    emit_barriers(device, cb, &[to_dst]);

                    let region = vk::ImageBlit {
                        src_subresource: subresource,
                        src_offsets: [vk::Offset3D::default(), mip_extent],
                        dst_subresource: subresource,
                        dst_offsets: [vk::Offset3D::default(), mip_extent],
                    };
                    blit_image(
                        device,
                        cb,
                        conversion_image,
                        BarrierPack::DISABLED,
                        BarrierPack::DISABLED,
                        region,
                        vk::Filter::LINEAR,
                        dst_image,
                    );
                }

                let full_range = vk::ImageSubresourceRange {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: mip_levels,
                    base_array_layer: 0,
                    layer_count: array_layers,
                };
                let final_transition = image_barrier2(
                    dst_image,
                    vk::PipelineStageFlags2::TRANSFER,
                    vk::AccessFlags2::TRANSFER_WRITE,
                    vk::PipelineStageFlags2::FRAGMENT_SHADER,
                    vk::AccessFlags2::SHADER_READ,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    full_range,
                );
                emit_barriers(device, cb, &[final_transition]);
            })?;
        }

        Ok(Texture {
            image_memory,
            image_view,
            format: final_format,
            extent,
            mip_levels,
            array_layers,
        })
    }
}

/// A sampled 2D texture.
pub struct Texture2D {
    texture: Texture,
}

impl std::ops::Deref for Texture2D {
    type Target = Texture;

    fn deref(&self) -> &Texture {
        &self.texture
    }
}

impl Texture2D {
    /// Loads a 2D texture from an image file. Compressed containers pass
    /// through undecoded; everything else decodes into `initial_format`'s
    /// layout and converts to `final_format` on the GPU when they differ.
    pub fn from_file(
        upload: &UploadContext,
        path: &Path,
        initial_format: vk::Format,
        final_format: vk::Format,
        flags: vk::ImageCreateFlags,
        generate_mipmaps: bool,
        flip_vertically: bool,
    ) -> Result<Self> {
        if is_compressed_container(path) {
            let compressed = load_compressed(path)?;
            return Self::from_pixels(
                upload,
                &compressed.data,
                vk::Extent2D {
                    width: compressed.extent.width,
                    height: compressed.extent.height,
                },
                final_format,
                final_format,
                flags,
                false,
            );
        }
        let image_data = load_image_file(path, initial_format, flip_vertically)?;
        Self::from_pixels(
            upload,
            &image_data.data,
            vk::Extent2D { width: image_data.extent.width, height: image_data.extent.height },
            initial_format,
            final_format,
            flags,
            generate_mipmaps,
        )
    }

    /// Uploads raw pixels already laid out in `initial_format`.
    pub fn from_pixels(
        upload: &UploadContext,
        pixels: &[u8],
        extent: vk::Extent2D,
        initial_format: vk::Format,
        final_format: vk::Format,
        flags: vk::ImageCreateFlags,
        generate_mipmaps: bool,
    ) -> Result<Self> {
        let mut staging = upload
            .staging_pool
            .acquire(pixels.len() as vk::DeviceSize, upload.staging_desc())?;
        staging.submit_buffer_data(0, 0, pixels)?;

        let texture = Texture::create_internal(
            upload,
            &mut staging,
            initial_format,
            final_format,
            vk::ImageType::TYPE_2D,
            vk::ImageViewType::TYPE_2D,
            vk::Extent3D { width: extent.width, height: extent.height, depth: 1 },
            flags,
            1,
            generate_mipmaps,
        )?;
        staging.release();
        Ok(Texture2D { texture })
    }
}

/// A sampled cubemap texture (six layers, cube-compatible).
pub struct TextureCube {
    texture: Texture,
}

impl std::ops::Deref for TextureCube {
    type Target = Texture;

    fn deref(&self) -> &Texture {
        &self.texture
    }
}

/// Face order for six-file cubemaps.
pub const CUBE_FACE_NAMES: [&str; 6] = ["PosX", "NegX", "PosY", "NegY", "PosZ", "NegZ"];

impl TextureCube {
    /// Loads six faces from individual files. All faces must share one
    /// extent; they are concatenated into a single staging upload.
    pub fn from_files(
        upload: &UploadContext,
        paths: &[std::path::PathBuf; 6],
        initial_format: vk::Format,
        final_format: vk::Format,
        flags: vk::ImageCreateFlags,
        generate_mipmaps: bool,
        flip_vertically: bool,
    ) -> Result<Self> {
        let mut extent = vk::Extent2D::default();
        let mut pixels = Vec::new();
        for (index, path) in paths.iter().enumerate() {
            let face = load_image_file(path, initial_format, flip_vertically)?;
            if index == 0 {
                extent = vk::Extent2D { width: face.extent.width, height: face.extent.height };
                let face_size = face.data.len();
                pixels.reserve(face_size * 6);
            } else if face.extent.width != extent.width || face.extent.height != extent.height {
                error!("Cubemap faces must have same dimensions. Face {} differs.", index);
                return Err(RenderError::TextureLoading(format!(
                    "cubemap face {index} has mismatched extent"
                )));
            }
            pixels.extend_from_slice(&face.data);
        }

        Self::from_pixels(upload, &pixels, extent, initial_format, final_format, flags, generate_mipmaps)
    }

    /// Loads a cubemap from a single compressed container (all six faces
    /// in one payload, passed through unmodified).
    pub fn from_file(
        upload: &UploadContext,
        path: &Path,
        format: vk::Format,
        flags: vk::ImageCreateFlags,
    ) -> Result<Self> {
        if !is_compressed_container(path) {
            return Err(RenderError::TextureLoading(format!(
                "{}: single-file cubemaps must be .dds/.ktx/.kmg",
                path.display()
            )));
        }
        let compressed = load_compressed(path)?;
        if compressed.faces != 6 {
            return Err(RenderError::TextureLoading(format!(
                "{}: container holds {} faces, expected 6",
                path.display(),
                compressed.faces
            )));
        }
        Self::from_pixels(
            upload,
            &compressed.data,
            vk::Extent2D { width: compressed.extent.width, height: compressed.extent.height },
            format,
            format,
            flags,
            false,
        )
    }

    /// Uploads raw pixels for all six faces, concatenated face-major.
    pub fn from_pixels(
        upload: &UploadContext,
        pixels: &[u8],
        extent: vk::Extent2D,
        initial_format: vk::Format,
        final_format: vk::Format,
        flags: vk::ImageCreateFlags,
        generate_mipmaps: bool,
    ) -> Result<Self> {
        let mut staging = upload
            .staging_pool
            .acquire(pixels.len() as vk::DeviceSize, upload.staging_desc())?;
        staging.submit_buffer_data(0, 0, pixels)?;

        let texture = Texture::create_internal(
            upload,
            &mut staging,
            initial_format,
            final_format,
            vk::ImageType::TYPE_2D,
            vk::ImageViewType::CUBE,
            vk::Extent3D { width: extent.width, height: extent.height, depth: 1 },
            flags | vk::ImageCreateFlags::CUBE_COMPATIBLE,
            6,
            generate_mipmaps,
        )?;
        staging.release();
        Ok(TextureCube { texture })
    }
}

/// The sampler state textures are typically sampled with.
pub fn default_sampler_create_info() -> vk::SamplerCreateInfo {
    vk::SamplerCreateInfo::builder()
        .mag_filter(vk::Filter::LINEAR)
        .min_filter(vk::Filter::LINEAR)
        .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
        .address_mode_u(vk::SamplerAddressMode::REPEAT)
        .address_mode_v(vk::SamplerAddressMode::REPEAT)
        .address_mode_w(vk::SamplerAddressMode::REPEAT)
        .anisotropy_enable(true)
        .max_anisotropy(16.0)
        .max_lod(vk::LOD_CLAMP_NONE)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_levels_for_degenerate_extent_is_one() {
        assert_eq!(calculate_mip_levels(vk::Extent3D { width: 1, height: 1, depth: 1 }), 1);
    }

    #[test]
    fn mip_levels_follow_log2_of_largest_axis() {
        assert_eq!(calculate_mip_levels(vk::Extent3D { width: 4, height: 4, depth: 1 }), 3);
        assert_eq!(calculate_mip_levels(vk::Extent3D { width: 512, height: 512, depth: 1 }), 10);
        assert_eq!(calculate_mip_levels(vk::Extent3D { width: 2048, height: 1, depth: 1 }), 12);
        assert_eq!(calculate_mip_levels(vk::Extent3D { width: 640, height: 480, depth: 1 }), 10);
    }

    #[test]
    fn mip_extent_halves_and_floors_at_one() {
        let extent = vk::Extent3D { width: 8, height: 2, depth: 1 };
        assert_eq!(mipmap_extent(extent, 0), vk::Offset3D { x: 8, y: 2, z: 1 });
        assert_eq!(mipmap_extent(extent, 2), vk::Offset3D { x: 2, y: 1, z: 1 });
        assert_eq!(mipmap_extent(extent, 5), vk::Offset3D { x: 1, y: 1, z: 1 });
    }

    #[test]
    fn disabled_barrier_pack_is_disabled() {
        assert!(!BarrierPack::DISABLED.enabled);
        assert!(SHADER_READ_BARRIER.enabled);
        assert_eq!(
            SHADER_READ_BARRIER.layout,
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL
        );
    }
}
