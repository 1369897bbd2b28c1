//! Passthrough reader for compressed texture containers.
//!
//! `.dds`, `.ktx` and `.kmg` files carry GPU-ready payloads that must reach
//! the device byte-for-byte. Only the header fields needed for the upload
//! (extent, face count, mip count, payload offset) are parsed; the payload
//! itself is never touched.

use std::path::Path;

use ash::vk;

use crate::error::{RenderError, Result};

const DDS_MAGIC: &[u8; 4] = b"DDS ";
const KTX1_MAGIC: [u8; 12] = [0xAB, 0x4B, 0x54, 0x58, 0x20, 0x31, 0x31, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A];
const DDS_CAPS2_CUBEMAP: u32 = 0x200;

/// A compressed container's payload plus the geometry needed to upload it.
pub struct CompressedTexture {
    pub extent: vk::Extent3D,
    pub faces: u32,
    pub array_layers: u32,
    pub mip_levels: u32,
    /// The on-disk payload, unmodified.
    pub data: Vec<u8>,
}

/// Whether the filename names a compressed container (case-insensitive).
pub fn is_compressed_container(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| {
            let e = e.to_ascii_lowercase();
            e == "dds" || e == "ktx" || e == "kmg"
        })
        .unwrap_or(false)
}

/// Loads a compressed container from disk.
pub fn load_compressed(path: &Path) -> Result<CompressedTexture> {
    let bytes = std::fs::read(path)?;
    load_compressed_from_memory(&bytes)
        .map_err(|e| RenderError::TextureLoading(format!("{}: {e}", path.display())))
}

/// Loads a compressed container from memory, detecting the format by magic.
pub fn load_compressed_from_memory(bytes: &[u8]) -> Result<CompressedTexture> {
    if bytes.len() >= 4 && &bytes[0..4] == DDS_MAGIC {
        return parse_dds(bytes);
    }
    if bytes.len() >= 12 && bytes[0..12] == KTX1_MAGIC {
        return parse_ktx1(bytes);
    }
    Err(RenderError::TextureLoading(
        "unrecognized compressed texture container".to_string(),
    ))
}

fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    bytes
        .get(offset..offset + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .ok_or_else(|| RenderError::TextureLoading("truncated container header".to_string()))
}

fn parse_dds(bytes: &[u8]) -> Result<CompressedTexture> {
    // 4-byte magic, then the 124-byte DDS_HEADER.
    let header_size = read_u32(bytes, 4)?;
    if header_size != 124 {
        return Err(RenderError::TextureLoading(format!(
            "unexpected DDS header size {header_size}"
        )));
    }
    let height = read_u32(bytes, 12)?;
    let width = read_u32(bytes, 16)?;
    let depth = read_u32(bytes, 24)?.max(1);
    let mip_levels = read_u32(bytes, 28)?.max(1);
    let four_cc = &bytes
        .get(84..88)
        .ok_or_else(|| RenderError::TextureLoading("truncated DDS header".to_string()))?;
    let caps2 = read_u32(bytes, 112)?;

    let faces = if caps2 & DDS_CAPS2_CUBEMAP != 0 { 6 } else { 1 };
    let mut payload_offset = 4 + 124;
    if *four_cc == b"DX10" {
        // DX10 extension header follows the legacy header.
        payload_offset += 20;
    }
    if bytes.len() < payload_offset {
        return Err(RenderError::TextureLoading("truncated DDS payload".to_string()));
    }

    Ok(CompressedTexture {
        extent: vk::Extent3D { width, height, depth },
        faces,
        array_layers: faces,
        mip_levels,
        data: bytes[payload_offset..].to_vec(),
    })
}

fn parse_ktx1(bytes: &[u8]) -> Result<CompressedTexture> {
    let width = read_u32(bytes, 36)?;
    let height = read_u32(bytes, 40)?.max(1);
    let depth = read_u32(bytes, 44)?.max(1);
    let array_elements = read_u32(bytes, 48)?.max(1);
    let faces = read_u32(bytes, 52)?.max(1);
    let mip_levels = read_u32(bytes, 56)?.max(1);
    let key_value_bytes = read_u32(bytes, 60)? as usize;

    let payload_offset = 64 + key_value_bytes;
    if bytes.len() < payload_offset {
        return Err(RenderError::TextureLoading("truncated KTX payload".to_string()));
    }

    Ok(CompressedTexture {
        extent: vk::Extent3D { width, height, depth },
        faces,
        array_layers: array_elements * faces,
        mip_levels,
        data: bytes[payload_offset..].to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn dds_bytes(width: u32, height: u32, mips: u32, cubemap: bool, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 128];
        bytes[0..4].copy_from_slice(DDS_MAGIC);
        bytes[4..8].copy_from_slice(&124u32.to_le_bytes());
        bytes[12..16].copy_from_slice(&height.to_le_bytes());
        bytes[16..20].copy_from_slice(&width.to_le_bytes());
        bytes[28..32].copy_from_slice(&mips.to_le_bytes());
        if cubemap {
            bytes[112..116].copy_from_slice(&DDS_CAPS2_CUBEMAP.to_le_bytes());
        }
        bytes.extend_from_slice(payload);
        bytes
    }

    fn ktx_bytes(width: u32, height: u32, faces: u32, mips: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[0..12].copy_from_slice(&KTX1_MAGIC);
        bytes[36..40].copy_from_slice(&width.to_le_bytes());
        bytes[40..44].copy_from_slice(&height.to_le_bytes());
        bytes[52..56].copy_from_slice(&faces.to_le_bytes());
        bytes[56..60].copy_from_slice(&mips.to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn extension_detection_is_case_insensitive() {
        assert!(is_compressed_container(&PathBuf::from("sky.DDS")));
        assert!(is_compressed_container(&PathBuf::from("sky.ktx")));
        assert!(is_compressed_container(&PathBuf::from("sky.Kmg")));
        assert!(!is_compressed_container(&PathBuf::from("sky.png")));
        assert!(!is_compressed_container(&PathBuf::from("sky")));
    }

    #[test]
    fn dds_payload_passes_through_unmodified() {
        let payload = [1u8, 2, 3, 4, 5];
        let texture =
            load_compressed_from_memory(&dds_bytes(16, 8, 5, false, &payload)).unwrap();
        assert_eq!(texture.extent, vk::Extent3D { width: 16, height: 8, depth: 1 });
        assert_eq!(texture.mip_levels, 5);
        assert_eq!(texture.faces, 1);
        assert_eq!(texture.data, payload);
    }

    #[test]
    fn dds_cubemap_reports_six_faces() {
        let texture = load_compressed_from_memory(&dds_bytes(512, 512, 10, true, &[0; 8])).unwrap();
        assert_eq!(texture.faces, 6);
        assert_eq!(texture.array_layers, 6);
    }

    #[test]
    fn ktx_header_fields_are_read() {
        let payload = [9u8; 16];
        let texture = load_compressed_from_memory(&ktx_bytes(32, 32, 6, 6, &payload)).unwrap();
        assert_eq!(texture.extent.width, 32);
        assert_eq!(texture.faces, 6);
        assert_eq!(texture.mip_levels, 6);
        assert_eq!(texture.data, payload);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let result = load_compressed_from_memory(&[0u8; 64]);
        assert!(matches!(result, Err(RenderError::TextureLoading(_))));
    }

    #[test]
    fn truncated_header_is_rejected() {
        assert!(load_compressed_from_memory(&DDS_MAGIC[..]).is_err());
    }
}
