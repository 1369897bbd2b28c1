//! Format metadata and the aliasing-compatibility predicate.
//!
//! [`format_info`] reports component count, per-component bytes, the pixel
//! size under linear tiling and a coarse numeric class for the formats the
//! engine touches. Compressed block formats report pixel size 0 (their
//! payload is opaque to the linear-tiling math). [`is_aliasing_compatible`]
//! is the pure half of the aliased-staging-image admission check: the
//! device-dependent probes live in [`crate::staging`].

use ash::vk;

/// Coarse numeric class of a format's storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawDataType {
    Other,
    Integer,
    FloatingPoint,
}

/// Per-format layout metadata for linear-tiled data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatInfo {
    /// Number of components.
    pub component_count: u8,
    /// Bytes per component; 0 for packed formats.
    pub component_size: u8,
    /// Bytes per pixel under linear tiling; 0 for block-compressed formats.
    pub pixel_size: u8,
    /// Numeric class of the stored data.
    pub raw_data_type: RawDataType,
}

impl FormatInfo {
    const fn new(
        component_count: u8,
        component_size: u8,
        pixel_size: u8,
        raw_data_type: RawDataType,
    ) -> Self {
        FormatInfo { component_count, component_size, pixel_size, raw_data_type }
    }
}

/// Layout metadata for `format`. Unknown formats report all zeros, like
/// `UNDEFINED`.
pub fn format_info(format: vk::Format) -> FormatInfo {
    use RawDataType::{FloatingPoint, Integer, Other};
    match format {
        vk::Format::UNDEFINED => FormatInfo::new(0, 0, 0, Other),

        vk::Format::R4G4_UNORM_PACK8 => FormatInfo::new(2, 0, 1, Integer),
        vk::Format::R4G4B4A4_UNORM_PACK16
        | vk::Format::B4G4R4A4_UNORM_PACK16
        | vk::Format::R5G5B5A1_UNORM_PACK16
        | vk::Format::B5G5R5A1_UNORM_PACK16
        | vk::Format::A1R5G5B5_UNORM_PACK16 => FormatInfo::new(4, 0, 2, Integer),
        vk::Format::R5G6B5_UNORM_PACK16 | vk::Format::B5G6R5_UNORM_PACK16 => {
            FormatInfo::new(3, 0, 2, Integer)
        }

        vk::Format::R8_UNORM
        | vk::Format::R8_SNORM
        | vk::Format::R8_USCALED
        | vk::Format::R8_SSCALED
        | vk::Format::R8_UINT
        | vk::Format::R8_SINT
        | vk::Format::R8_SRGB => FormatInfo::new(1, 1, 1, Integer),

        vk::Format::R8G8_UNORM
        | vk::Format::R8G8_SNORM
        | vk::Format::R8G8_USCALED
        | vk::Format::R8G8_SSCALED
        | vk::Format::R8G8_UINT
        | vk::Format::R8G8_SINT
        | vk::Format::R8G8_SRGB => FormatInfo::new(2, 1, 2, Integer),

        vk::Format::R8G8B8_UNORM
        | vk::Format::R8G8B8_SNORM
        | vk::Format::R8G8B8_USCALED
        | vk::Format::R8G8B8_SSCALED
        | vk::Format::R8G8B8_UINT
        | vk::Format::R8G8B8_SINT
        | vk::Format::R8G8B8_SRGB
        | vk::Format::B8G8R8_UNORM
        | vk::Format::B8G8R8_SNORM
        | vk::Format::B8G8R8_USCALED
        | vk::Format::B8G8R8_SSCALED
        | vk::Format::B8G8R8_UINT
        | vk::Format::B8G8R8_SINT
        | vk::Format::B8G8R8_SRGB => FormatInfo::new(3, 1, 3, Integer),

        vk::Format::R8G8B8A8_UNORM
        | vk::Format::R8G8B8A8_SNORM
        | vk::Format::R8G8B8A8_USCALED
        | vk::Format::R8G8B8A8_SSCALED
        | vk::Format::R8G8B8A8_UINT
        | vk::Format::R8G8B8A8_SINT
        | vk::Format::R8G8B8A8_SRGB
        | vk::Format::B8G8R8A8_UNORM
        | vk::Format::B8G8R8A8_SNORM
        | vk::Format::B8G8R8A8_USCALED
        | vk::Format::B8G8R8A8_SSCALED
        | vk::Format::B8G8R8A8_UINT
        | vk::Format::B8G8R8A8_SINT
        | vk::Format::B8G8R8A8_SRGB
        | vk::Format::A8B8G8R8_UNORM_PACK32
        | vk::Format::A8B8G8R8_SNORM_PACK32
        | vk::Format::A8B8G8R8_USCALED_PACK32
        | vk::Format::A8B8G8R8_SSCALED_PACK32
        | vk::Format::A8B8G8R8_UINT_PACK32
        | vk::Format::A8B8G8R8_SINT_PACK32
        | vk::Format::A8B8G8R8_SRGB_PACK32 => FormatInfo::new(4, 1, 4, Integer),

        vk::Format::A2R10G10B10_UNORM_PACK32
        | vk::Format::A2R10G10B10_SNORM_PACK32
        | vk::Format::A2R10G10B10_USCALED_PACK32
        | vk::Format::A2R10G10B10_SSCALED_PACK32
        | vk::Format::A2R10G10B10_UINT_PACK32
        | vk::Format::A2R10G10B10_SINT_PACK32
        | vk::Format::A2B10G10R10_UNORM_PACK32
        | vk::Format::A2B10G10R10_SNORM_PACK32
        | vk::Format::A2B10G10R10_USCALED_PACK32
        | vk::Format::A2B10G10R10_SSCALED_PACK32
        | vk::Format::A2B10G10R10_UINT_PACK32
        | vk::Format::A2B10G10R10_SINT_PACK32 => FormatInfo::new(4, 0, 4, Integer),

        vk::Format::R16_UNORM
        | vk::Format::R16_SNORM
        | vk::Format::R16_USCALED
        | vk::Format::R16_SSCALED
        | vk::Format::R16_UINT
        | vk::Format::R16_SINT => FormatInfo::new(1, 2, 2, Integer),
        vk::Format::R16_SFLOAT => FormatInfo::new(1, 2, 2, FloatingPoint),

        vk::Format::R16G16_UNORM
        | vk::Format::R16G16_SNORM
        | vk::Format::R16G16_USCALED
        | vk::Format::R16G16_SSCALED
        | vk::Format::R16G16_UINT
        | vk::Format::R16G16_SINT => FormatInfo::new(2, 2, 4, Integer),
        vk::Format::R16G16_SFLOAT => FormatInfo::new(2, 2, 4, FloatingPoint),

        vk::Format::R16G16B16_UNORM
        | vk::Format::R16G16B16_SNORM
        | vk::Format::R16G16B16_USCALED
        | vk::Format::R16G16B16_SSCALED
        | vk::Format::R16G16B16_UINT
        | vk::Format::R16G16B16_SINT => FormatInfo::new(3, 2, 6, Integer),
        vk::Format::R16G16B16_SFLOAT => FormatInfo::new(3, 2, 6, FloatingPoint),

        vk::Format::R16G16B16A16_UNORM
        | vk::Format::R16G16B16A16_SNORM
        | vk::Format::R16G16B16A16_USCALED
        | vk::Format::R16G16B16A16_SSCALED
        | vk::Format::R16G16B16A16_UINT
        | vk::Format::R16G16B16A16_SINT => FormatInfo::new(4, 2, 8, Integer),
        vk::Format::R16G16B16A16_SFLOAT => FormatInfo::new(4, 2, 8, FloatingPoint),

        vk::Format::R32_UINT | vk::Format::R32_SINT => FormatInfo::new(1, 4, 4, Integer),
        vk::Format::R32_SFLOAT => FormatInfo::new(1, 4, 4, FloatingPoint),
        vk::Format::R32G32_UINT | vk::Format::R32G32_SINT => FormatInfo::new(2, 4, 8, Integer),
        vk::Format::R32G32_SFLOAT => FormatInfo::new(2, 4, 8, FloatingPoint),
        vk::Format::R32G32B32_UINT | vk::Format::R32G32B32_SINT => {
            FormatInfo::new(3, 4, 12, Integer)
        }
        vk::Format::R32G32B32_SFLOAT => FormatInfo::new(3, 4, 12, FloatingPoint),
        vk::Format::R32G32B32A32_UINT | vk::Format::R32G32B32A32_SINT => {
            FormatInfo::new(4, 4, 16, Integer)
        }
        vk::Format::R32G32B32A32_SFLOAT => FormatInfo::new(4, 4, 16, FloatingPoint),

        vk::Format::R64_UINT | vk::Format::R64_SINT => FormatInfo::new(1, 8, 8, Integer),
        vk::Format::R64_SFLOAT => FormatInfo::new(1, 8, 8, FloatingPoint),
        vk::Format::R64G64_UINT | vk::Format::R64G64_SINT => FormatInfo::new(2, 8, 16, Integer),
        vk::Format::R64G64_SFLOAT => FormatInfo::new(2, 8, 16, FloatingPoint),
        vk::Format::R64G64B64_UINT | vk::Format::R64G64B64_SINT => {
            FormatInfo::new(3, 8, 24, Integer)
        }
        vk::Format::R64G64B64_SFLOAT => FormatInfo::new(3, 8, 24, FloatingPoint),
        vk::Format::R64G64B64A64_UINT | vk::Format::R64G64B64A64_SINT => {
            FormatInfo::new(4, 8, 32, Integer)
        }
        vk::Format::R64G64B64A64_SFLOAT => FormatInfo::new(4, 8, 32, FloatingPoint),

        vk::Format::B10G11R11_UFLOAT_PACK32 | vk::Format::E5B9G9R9_UFLOAT_PACK32 => {
            FormatInfo::new(3, 0, 4, FloatingPoint)
        }

        vk::Format::D16_UNORM => FormatInfo::new(1, 2, 2, Integer),
        // 8 of 32 bits unused: one component of 3 bytes.
        vk::Format::X8_D24_UNORM_PACK32 => FormatInfo::new(1, 3, 4, Integer),
        vk::Format::D32_SFLOAT => FormatInfo::new(1, 4, 4, FloatingPoint),
        vk::Format::S8_UINT => FormatInfo::new(1, 1, 1, Integer),
        vk::Format::D16_UNORM_S8_UINT => FormatInfo::new(2, 0, 4, Integer),
        vk::Format::D24_UNORM_S8_UINT => FormatInfo::new(2, 0, 4, Integer),
        // 24 bits of padding under linear tiling.
        vk::Format::D32_SFLOAT_S8_UINT => FormatInfo::new(2, 0, 8, Other),

        vk::Format::BC1_RGB_UNORM_BLOCK
        | vk::Format::BC1_RGB_SRGB_BLOCK
        | vk::Format::ETC2_R8G8B8_UNORM_BLOCK
        | vk::Format::ETC2_R8G8B8_SRGB_BLOCK => FormatInfo::new(3, 0, 0, Integer),
        vk::Format::BC1_RGBA_UNORM_BLOCK
        | vk::Format::BC1_RGBA_SRGB_BLOCK
        | vk::Format::BC2_UNORM_BLOCK
        | vk::Format::BC2_SRGB_BLOCK
        | vk::Format::BC3_UNORM_BLOCK
        | vk::Format::BC3_SRGB_BLOCK
        | vk::Format::BC7_UNORM_BLOCK
        | vk::Format::BC7_SRGB_BLOCK
        | vk::Format::ETC2_R8G8B8A1_UNORM_BLOCK
        | vk::Format::ETC2_R8G8B8A1_SRGB_BLOCK
        | vk::Format::ETC2_R8G8B8A8_UNORM_BLOCK
        | vk::Format::ETC2_R8G8B8A8_SRGB_BLOCK => FormatInfo::new(4, 0, 0, Integer),
        vk::Format::BC4_UNORM_BLOCK
        | vk::Format::BC4_SNORM_BLOCK
        | vk::Format::EAC_R11_UNORM_BLOCK
        | vk::Format::EAC_R11_SNORM_BLOCK => FormatInfo::new(1, 0, 0, Integer),
        vk::Format::BC5_UNORM_BLOCK
        | vk::Format::BC5_SNORM_BLOCK
        | vk::Format::EAC_R11G11_UNORM_BLOCK
        | vk::Format::EAC_R11G11_SNORM_BLOCK => FormatInfo::new(2, 0, 0, Integer),
        vk::Format::BC6H_UFLOAT_BLOCK | vk::Format::BC6H_SFLOAT_BLOCK => {
            FormatInfo::new(3, 0, 0, FloatingPoint)
        }

        _ => FormatInfo::new(0, 0, 0, Other),
    }
}

/// Maps 32-bit float formats to their 16-bit siblings, for render targets
/// that can trade precision for bandwidth. Other formats pass through.
pub fn convert_to_float16(format: vk::Format) -> vk::Format {
    match format {
        vk::Format::R32_SFLOAT => vk::Format::R16_SFLOAT,
        vk::Format::R32G32_SFLOAT => vk::Format::R16G16_SFLOAT,
        vk::Format::R32G32B32_SFLOAT => vk::Format::R16G16B16_SFLOAT,
        vk::Format::R32G32B32A32_SFLOAT => vk::Format::R16G16B16A16_SFLOAT,
        other => other,
    }
}

/// Format family for aliasing decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormatFamily {
    Unknown,
    R8,
    Rg8,
    Rgba8,
    Bgra8,
    Depth16,
    Depth24,
    Depth32,
    Bc1,
}

/// The fields the aliasing predicate compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FormatDescription {
    family: FormatFamily,
    bit_depth: u32,
    srgb: bool,
    compressed: bool,
    depth: bool,
}

fn describe_format(format: vk::Format) -> FormatDescription {
    use FormatFamily::*;
    let d = |family, bit_depth, srgb, compressed, depth| FormatDescription {
        family,
        bit_depth,
        srgb,
        compressed,
        depth,
    };
    match format {
        vk::Format::R8_UNORM => d(R8, 8, false, false, false),
        vk::Format::R8_SRGB => d(R8, 8, true, false, false),
        vk::Format::R8G8_UNORM => d(Rg8, 16, false, false, false),
        vk::Format::R8G8_SRGB => d(Rg8, 16, true, false, false),
        vk::Format::R8G8B8A8_UNORM => d(Rgba8, 32, false, false, false),
        vk::Format::R8G8B8A8_SRGB => d(Rgba8, 32, true, false, false),
        vk::Format::B8G8R8A8_UNORM => d(Bgra8, 32, false, false, false),
        vk::Format::B8G8R8A8_SRGB => d(Bgra8, 32, true, false, false),
        vk::Format::D16_UNORM => d(Depth16, 16, false, false, true),
        vk::Format::D24_UNORM_S8_UINT => d(Depth24, 32, false, false, true),
        vk::Format::D32_SFLOAT => d(Depth32, 32, false, false, true),
        vk::Format::BC1_RGBA_UNORM_BLOCK => d(Bc1, 64, false, true, false),
        vk::Format::BC1_RGBA_SRGB_BLOCK => d(Bc1, 64, true, true, false),
        _ => d(Unknown, 0, false, false, false),
    }
}

/// Whether a linear-tiled image of `src_format` may alias memory holding
/// pixels destined for `dst_format`.
///
/// Both formats must be known, share family, bit depth, compression state
/// and sRGB-ness, and must not be depth formats (depth-on-host-linear
/// aliasing is implementation-defined and deliberately rejected). The
/// predicate is reflexive for known non-depth formats and symmetric.
pub fn is_aliasing_compatible(src_format: vk::Format, dst_format: vk::Format) -> bool {
    let src = describe_format(src_format);
    let dst = describe_format(dst_format);

    if src.family == FormatFamily::Unknown
        || dst.family == FormatFamily::Unknown
        || src.family != dst.family
        || src.bit_depth != dst.bit_depth
        || src.compressed != dst.compressed
        || src.srgb != dst.srgb
        || src.depth
    {
        return false;
    }

    if src.compressed {
        let src_info = format_info(src_format);
        let dst_info = format_info(dst_format);
        if src_info.component_count != dst_info.component_count {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_stencil_special_cases() {
        assert_eq!(format_info(vk::Format::D16_UNORM_S8_UINT).pixel_size, 4);
        assert_eq!(format_info(vk::Format::D32_SFLOAT_S8_UINT).pixel_size, 8);
        assert_eq!(
            format_info(vk::Format::D32_SFLOAT_S8_UINT).raw_data_type,
            RawDataType::Other
        );
    }

    #[test]
    fn undefined_is_all_zero() {
        let info = format_info(vk::Format::UNDEFINED);
        assert_eq!(info, FormatInfo::new(0, 0, 0, RawDataType::Other));
    }

    #[test]
    fn rgba8_layout() {
        let info = format_info(vk::Format::R8G8B8A8_UNORM);
        assert_eq!(info.component_count, 4);
        assert_eq!(info.component_size, 1);
        assert_eq!(info.pixel_size, 4);
        assert_eq!(info.raw_data_type, RawDataType::Integer);
    }

    #[test]
    fn float_formats_are_classified() {
        assert_eq!(
            format_info(vk::Format::R32G32B32A32_SFLOAT).raw_data_type,
            RawDataType::FloatingPoint
        );
        assert_eq!(format_info(vk::Format::R32G32B32A32_SFLOAT).pixel_size, 16);
    }

    #[test]
    fn compressed_formats_have_zero_pixel_size() {
        assert_eq!(format_info(vk::Format::BC1_RGBA_UNORM_BLOCK).pixel_size, 0);
        assert_eq!(format_info(vk::Format::BC7_SRGB_BLOCK).component_count, 4);
    }

    #[test]
    fn float16_conversion() {
        assert_eq!(
            convert_to_float16(vk::Format::R32G32B32A32_SFLOAT),
            vk::Format::R16G16B16A16_SFLOAT
        );
        assert_eq!(convert_to_float16(vk::Format::R8_UNORM), vk::Format::R8_UNORM);
    }

    #[test]
    fn aliasing_is_reflexive_for_known_color_formats() {
        for format in [
            vk::Format::R8_UNORM,
            vk::Format::R8G8B8A8_UNORM,
            vk::Format::B8G8R8A8_SRGB,
            vk::Format::BC1_RGBA_UNORM_BLOCK,
        ] {
            assert!(is_aliasing_compatible(format, format), "{format:?}");
        }
    }

    #[test]
    fn aliasing_is_symmetric() {
        let pairs = [
            (vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM),
            (vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_SRGB),
            (vk::Format::R8_UNORM, vk::Format::R8G8_UNORM),
        ];
        for (a, b) in pairs {
            assert_eq!(is_aliasing_compatible(a, b), is_aliasing_compatible(b, a));
        }
    }

    #[test]
    fn aliasing_rejects_cross_family_srgb_and_depth() {
        // Different family.
        assert!(!is_aliasing_compatible(vk::Format::R8G8B8A8_UNORM, vk::Format::B8G8R8A8_UNORM));
        // sRGB mismatch.
        assert!(!is_aliasing_compatible(vk::Format::R8G8B8A8_UNORM, vk::Format::R8G8B8A8_SRGB));
        // Depth formats never alias, not even with themselves.
        assert!(!is_aliasing_compatible(vk::Format::D32_SFLOAT, vk::Format::D32_SFLOAT));
        // Unknown formats never alias.
        assert!(!is_aliasing_compatible(vk::Format::R64_SFLOAT, vk::Format::R64_SFLOAT));
    }
}
