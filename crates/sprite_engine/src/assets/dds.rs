//! DDS container header
//!
//! Texture files reach the texture manager as DDS containers: a 128-byte
//! header followed by the top mip level. Transcoded PNGs store the size of
//! the source image (before power-of-two padding) in the header's reserved
//! field, low 16 bits width and high 16 bits height; sprites use it as their
//! bounding box.

use crate::backend::PixelFormat;
use crate::core::{EngineError, EngineResult};

/// Size of the container header in bytes, signature included
pub const DDS_HEADER_SIZE: usize = 128;

const MAGIC: &[u8; 4] = b"DDS ";
const DESC_SIZE: u32 = 124;
const PIXEL_FORMAT_SIZE: u32 = 32;

// Offsets from the start of the file
const OFFSET_DESC_SIZE: usize = 4;
const OFFSET_FLAGS: usize = 8;
const OFFSET_HEIGHT: usize = 12;
const OFFSET_WIDTH: usize = 16;
const OFFSET_PITCH: usize = 20;
const OFFSET_RESERVED: usize = 36;
const OFFSET_PF_SIZE: usize = 76;
const OFFSET_PF_FLAGS: usize = 80;
const OFFSET_PF_FOURCC: usize = 84;
const OFFSET_PF_BITS: usize = 88;
const OFFSET_PF_MASKS: usize = 92;
const OFFSET_CAPS: usize = 108;

const DDSD_CAPS: u32 = 0x1;
const DDSD_HEIGHT: u32 = 0x2;
const DDSD_WIDTH: u32 = 0x4;
const DDSD_PITCH: u32 = 0x8;
const DDSD_PIXELFORMAT: u32 = 0x1000;
const DDSD_LINEARSIZE: u32 = 0x8_0000;
const DDPF_ALPHAPIXELS: u32 = 0x1;
const DDPF_FOURCC: u32 = 0x4;
const DDPF_RGB: u32 = 0x40;
const DDSCAPS_TEXTURE: u32 = 0x1000;

/// Parsed DDS header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdsHeader {
    /// Stored (padded) width
    pub width: u32,
    /// Stored (padded) height
    pub height: u32,
    /// Pixel format of the payload
    pub format: PixelFormat,
    /// Width of the source image
    pub original_width: u32,
    /// Height of the source image
    pub original_height: u32,
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le(bytemuck::pod_read_unaligned(&bytes[offset..offset + 4]))
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

impl DdsHeader {
    /// Header for a payload of the given size and format
    pub fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
            original_width: width,
            original_height: height,
        }
    }

    /// Record the unpadded source size
    pub fn with_original_size(mut self, width: u32, height: u32) -> Self {
        self.original_width = width;
        self.original_height = height;
        self
    }

    /// Parse the header at the start of `bytes`
    pub fn parse(bytes: &[u8]) -> EngineResult<Self> {
        if bytes.len() < DDS_HEADER_SIZE || &bytes[..4] != MAGIC {
            return Err(EngineError::FormatValidation(
                "File is not a valid .dds file: missing DDS signature".to_string(),
            ));
        }
        let height = read_u32(bytes, OFFSET_HEIGHT);
        let width = read_u32(bytes, OFFSET_WIDTH);
        let format = if read_u32(bytes, OFFSET_PF_FLAGS) & DDPF_FOURCC != 0 {
            match &bytes[OFFSET_PF_FOURCC..OFFSET_PF_FOURCC + 4] {
                b"DXT3" => PixelFormat::Dxt3,
                other => {
                    return Err(EngineError::FormatValidation(format!(
                        "Unsupported .dds compression {:?}",
                        String::from_utf8_lossy(other)
                    )))
                }
            }
        } else if read_u32(bytes, OFFSET_PF_FLAGS) & DDPF_ALPHAPIXELS != 0 {
            PixelFormat::Argb8
        } else {
            PixelFormat::Xrgb8
        };

        let reserved = read_u32(bytes, OFFSET_RESERVED);
        // Files not produced by the PNG filter carry no source size
        let (original_width, original_height) = if reserved == 0 {
            (width, height)
        } else {
            (reserved & 0xFFFF, reserved >> 16)
        };

        let header = Self {
            width,
            height,
            format,
            original_width,
            original_height,
        };
        let needed = DDS_HEADER_SIZE + header.payload_size();
        if bytes.len() < needed {
            return Err(EngineError::FormatValidation(format!(
                "Truncated .dds file: {} bytes, expected {needed}",
                bytes.len()
            )));
        }
        Ok(header)
    }

    /// Bytes per row of the payload; a row is a row of 4x4 blocks when compressed
    pub fn row_pitch(&self) -> u32 {
        match self.format {
            PixelFormat::Dxt3 => self.width.div_ceil(4).max(1) * 16,
            PixelFormat::Argb8 | PixelFormat::Xrgb8 => self.width * 4,
        }
    }

    /// Number of payload rows
    pub fn rows(&self) -> u32 {
        match self.format {
            PixelFormat::Dxt3 => self.height.div_ceil(4).max(1),
            PixelFormat::Argb8 | PixelFormat::Xrgb8 => self.height,
        }
    }

    /// Size of the top mip level in bytes
    pub fn payload_size(&self) -> usize {
        (self.row_pitch() * self.rows()) as usize
    }

    /// Payload that follows the header
    pub fn payload<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        &bytes[DDS_HEADER_SIZE..DDS_HEADER_SIZE + self.payload_size()]
    }

    /// Encode the 128-byte header
    pub fn encode(&self) -> [u8; DDS_HEADER_SIZE] {
        let mut out = [0u8; DDS_HEADER_SIZE];
        out[..4].copy_from_slice(MAGIC);
        let compressed = self.format.is_compressed();

        write_u32(&mut out, OFFSET_DESC_SIZE, DESC_SIZE);
        let size_flag = if compressed { DDSD_LINEARSIZE } else { DDSD_PITCH };
        write_u32(
            &mut out,
            OFFSET_FLAGS,
            DDSD_CAPS | DDSD_HEIGHT | DDSD_WIDTH | DDSD_PIXELFORMAT | size_flag,
        );
        write_u32(&mut out, OFFSET_HEIGHT, self.height);
        write_u32(&mut out, OFFSET_WIDTH, self.width);
        let pitch = if compressed { self.payload_size() as u32 } else { self.row_pitch() };
        write_u32(&mut out, OFFSET_PITCH, pitch);
        write_u32(
            &mut out,
            OFFSET_RESERVED,
            (self.original_height << 16) | (self.original_width & 0xFFFF),
        );

        write_u32(&mut out, OFFSET_PF_SIZE, PIXEL_FORMAT_SIZE);
        match self.format {
            PixelFormat::Dxt3 => {
                write_u32(&mut out, OFFSET_PF_FLAGS, DDPF_FOURCC);
                out[OFFSET_PF_FOURCC..OFFSET_PF_FOURCC + 4].copy_from_slice(b"DXT3");
            }
            PixelFormat::Argb8 | PixelFormat::Xrgb8 => {
                let alpha = self.format == PixelFormat::Argb8;
                write_u32(
                    &mut out,
                    OFFSET_PF_FLAGS,
                    DDPF_RGB | if alpha { DDPF_ALPHAPIXELS } else { 0 },
                );
                write_u32(&mut out, OFFSET_PF_BITS, 32);
                let masks = [0x00FF_0000, 0x0000_FF00, 0x0000_00FF, if alpha { 0xFF00_0000 } else { 0 }];
                for (i, mask) in masks.into_iter().enumerate() {
                    write_u32(&mut out, OFFSET_PF_MASKS + i * 4, mask);
                }
            }
        }
        write_u32(&mut out, OFFSET_CAPS, DDSCAPS_TEXTURE);
        out
    }

    /// Header followed by `payload`, as one container
    pub fn to_container(&self, payload: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(DDS_HEADER_SIZE + payload.len());
        out.extend_from_slice(&self.encode());
        out.extend_from_slice(payload);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reserved_field_holds_source_size() {
        let header = DdsHeader::new(128, 64, PixelFormat::Argb8).with_original_size(100, 50);
        let bytes = header.to_container(&vec![0u8; header.payload_size()]);
        assert_eq!(read_u32(&bytes, OFFSET_RESERVED), (50 << 16) | 100);

        let parsed = DdsHeader::parse(&bytes).unwrap();
        assert_eq!(parsed, header);
        assert_eq!(parsed.row_pitch(), 512);
    }

    #[test]
    fn test_compressed_rows_are_block_rows() {
        let header = DdsHeader::new(64, 32, PixelFormat::Dxt3);
        assert_eq!(header.rows(), 8);
        assert_eq!(header.row_pitch(), 256);
        let bytes = header.to_container(&vec![0u8; header.payload_size()]);
        assert_eq!(DdsHeader::parse(&bytes).unwrap().format, PixelFormat::Dxt3);
    }

    #[test]
    fn test_rejects_truncated_or_foreign_data() {
        assert!(DdsHeader::parse(b"PNG not dds").is_err());
        let header = DdsHeader::new(16, 16, PixelFormat::Argb8);
        let bytes = header.to_container(&[0u8; 10]);
        assert!(matches!(DdsHeader::parse(&bytes), Err(EngineError::FormatValidation(_))));
    }
}
