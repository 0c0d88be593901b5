//! File filters
//!
//! A filter transforms file contents between disk and the managers that
//! consume them. PNG images are transcoded into DDS containers (optionally
//! block-compressed) and the result may be persisted next to the source so
//! the next run loads the container directly. WAV files are validated.

use super::dds::DdsHeader;
use super::wav::WavHeader;
use super::LoadHint;
use crate::backend::PixelFormat;
use crate::core::{EngineError, EngineResult};
use crate::foundation::math::next_pow2_at_least;

/// Content transform selected by file extension
pub trait FileFilter {
    /// True if the filter handles `path` (already lower-cased)
    fn matches(&self, path: &str) -> bool;

    /// Location of a persisted transform result, tried before the source
    fn cached_path(&self, _path: &str) -> Option<String> {
        None
    }

    /// Transform file contents
    fn apply(&self, bytes: Vec<u8>, hint: LoadHint) -> EngineResult<Vec<u8>>;
}

fn replace_extension(path: &str, extension: &str) -> String {
    match path.rfind('.') {
        Some(dot) => format!("{}.{extension}", &path[..dot]),
        None => format!("{path}.{extension}"),
    }
}

/// PNG to DDS transcoder
#[derive(Debug, Default, Clone, Copy)]
pub struct PngFilter;

impl FileFilter for PngFilter {
    fn matches(&self, path: &str) -> bool {
        path.ends_with(".png")
    }

    fn cached_path(&self, path: &str) -> Option<String> {
        Some(replace_extension(path, "dds"))
    }

    fn apply(&self, bytes: Vec<u8>, hint: LoadHint) -> EngineResult<Vec<u8>> {
        let image = image::load_from_memory_with_format(&bytes, image::ImageFormat::Png)
            .map_err(|e| EngineError::FormatValidation(format!("Failed to decode PNG: {e}")))?
            .to_rgba8();
        let (width, height) = image.dimensions();
        if width > 0xFFFF || height > 0xFFFF {
            return Err(EngineError::FormatValidation(format!("Image too large: {width}x{height}")));
        }

        let compressed = hint.contains(LoadHint::COMPRESSED_TEXTURE);
        let min_size = if compressed { 4 } else { 1 };
        let padded_w = next_pow2_at_least(width, min_size);
        let padded_h = next_pow2_at_least(height, min_size);

        // Padded BGRA pixels, transparent outside the source rectangle
        let mut bgra = vec![0u8; (padded_w * padded_h * 4) as usize];
        for (x, y, pixel) in image.enumerate_pixels() {
            let [r, g, b, a] = pixel.0;
            let at = ((y * padded_w + x) * 4) as usize;
            bgra[at..at + 4].copy_from_slice(&[b, g, r, a]);
        }

        let format = if compressed { PixelFormat::Dxt3 } else { PixelFormat::Argb8 };
        let header = DdsHeader::new(padded_w, padded_h, format).with_original_size(width, height);
        let payload = if compressed {
            encode_dxt3(&bgra, padded_w, padded_h)
        } else {
            bgra
        };
        log::trace!("Transcoded {width}x{height} PNG into {padded_w}x{padded_h} {format:?}");
        Ok(header.to_container(&payload))
    }
}

/// WAV validator; contents pass through unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct WavFilter;

impl FileFilter for WavFilter {
    fn matches(&self, path: &str) -> bool {
        path.ends_with(".wav")
    }

    fn apply(&self, bytes: Vec<u8>, _hint: LoadHint) -> EngineResult<Vec<u8>> {
        WavHeader::parse(&bytes)?;
        Ok(bytes)
    }
}

fn to_565(r: u8, g: u8, b: u8) -> u16 {
    (u16::from(r >> 3) << 11) | (u16::from(g >> 2) << 5) | u16::from(b >> 3)
}

fn from_565(c: u16) -> [i32; 3] {
    let r = i32::from((c >> 11) & 0x1F);
    let g = i32::from((c >> 5) & 0x3F);
    let b = i32::from(c & 0x1F);
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Block-compress BGRA pixels into DXT3 (explicit 4-bit alpha).
///
/// Colors use a range fit between the darkest and brightest texel of each
/// block. `width` and `height` must be multiples of 4.
pub fn encode_dxt3(bgra: &[u8], width: u32, height: u32) -> Vec<u8> {
    let blocks_w = width / 4;
    let blocks_h = height / 4;
    let mut out = Vec::with_capacity((blocks_w * blocks_h * 16) as usize);

    for by in 0..blocks_h {
        for bx in 0..blocks_w {
            let mut texels = [[0u8; 4]; 16];
            for (i, texel) in texels.iter_mut().enumerate() {
                let x = bx * 4 + (i as u32 % 4);
                let y = by * 4 + (i as u32 / 4);
                let at = ((y * width + x) * 4) as usize;
                texel.copy_from_slice(&bgra[at..at + 4]);
            }

            let mut alpha = [0u8; 8];
            for (i, t) in texels.iter().enumerate() {
                let a4 = t[3] >> 4;
                alpha[i / 2] |= if i % 2 == 0 { a4 } else { a4 << 4 };
            }
            out.extend_from_slice(&alpha);

            let luma = |t: &[u8; 4]| u32::from(t[2]) * 3 + u32::from(t[1]) * 6 + u32::from(t[0]);
            let (mut lo, mut hi) = (texels[0], texels[0]);
            for t in &texels {
                if luma(t) < luma(&lo) {
                    lo = *t;
                }
                if luma(t) > luma(&hi) {
                    hi = *t;
                }
            }
            let c0 = to_565(hi[2], hi[1], hi[0]);
            let c1 = to_565(lo[2], lo[1], lo[0]);
            let p0 = from_565(c0);
            let p1 = from_565(c1);
            let palette = [
                p0,
                p1,
                [(2 * p0[0] + p1[0]) / 3, (2 * p0[1] + p1[1]) / 3, (2 * p0[2] + p1[2]) / 3],
                [(p0[0] + 2 * p1[0]) / 3, (p0[1] + 2 * p1[1]) / 3, (p0[2] + 2 * p1[2]) / 3],
            ];

            let mut indices = 0u32;
            for (i, t) in texels.iter().enumerate() {
                let rgb = [i32::from(t[2]), i32::from(t[1]), i32::from(t[0])];
                let best = (0..4)
                    .min_by_key(|&k| {
                        let p = palette[k];
                        (0..3).map(|c| (p[c] - rgb[c]).pow(2)).sum::<i32>()
                    })
                    .unwrap_or(0) as u32;
                indices |= best << (i * 2);
            }
            out.extend_from_slice(&c0.to_le_bytes());
            out.extend_from_slice(&c1.to_le_bytes());
            out.extend_from_slice(&indices.to_le_bytes());
        }
    }
    out
}
