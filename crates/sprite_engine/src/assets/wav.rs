//! Decoded WAV header
//!
//! Only uncompressed integer PCM is accepted. `hound` walks the RIFF chunks;
//! the header records where the sample data starts so the sound manager can
//! hand the raw samples to the audio backend without walking them again.

use std::io::Cursor;

use crate::core::{EngineError, EngineResult};

/// Minimum number of sample bytes a playable file must carry
pub const MIN_DATA_LEN: u32 = 1000;

/// PCM description and data location of a WAV file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    /// Channel count
    pub channels: u16,
    /// Samples per second
    pub samples_per_sec: u32,
    /// Bytes per second of playback
    pub avg_bytes_per_sec: u32,
    /// Bytes per sample frame
    pub block_align: u16,
    /// Bits per sample
    pub bits_per_sample: u16,
    /// Offset of the first sample byte
    pub data_offset: usize,
    /// Number of sample bytes
    pub data_len: u32,
}

fn invalid(message: impl Into<String>) -> EngineError {
    EngineError::FormatValidation(message.into())
}

fn decode_error(err: hound::Error) -> EngineError {
    match err {
        hound::Error::Unsupported => invalid("Compressed .wav files are not supported"),
        hound::Error::IoError(_) => invalid("File is not a valid .wav file: truncated before the 'data' block"),
        other => invalid(format!("File is not a valid .wav file: {other}")),
    }
}

impl WavHeader {
    /// PCM description with no data attached yet
    pub fn pcm(channels: u16, samples_per_sec: u32, bits_per_sample: u16) -> Self {
        let block_align = channels * bits_per_sample.div_ceil(8);
        Self {
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec * u32::from(block_align),
            block_align,
            bits_per_sample,
            data_offset: 44,
            data_len: 0,
        }
    }

    /// Validate the RIFF structure and locate the `data` chunk
    pub fn parse(bytes: &[u8]) -> EngineResult<Self> {
        let reader = hound::WavReader::new(Cursor::new(bytes)).map_err(decode_error)?;
        let spec = reader.spec();
        if spec.sample_format != hound::SampleFormat::Int {
            return Err(invalid("Compressed .wav files are not supported"));
        }

        let mut header = Self::pcm(spec.channels, spec.sample_rate, spec.bits_per_sample);
        let sample_bytes = u32::from(spec.bits_per_sample.div_ceil(8));
        let data_len = reader.len().saturating_mul(sample_bytes);
        if data_len < MIN_DATA_LEN {
            return Err(invalid(".wav file is too short"));
        }
        header.data_offset = reader.into_inner().position() as usize;
        // Some writers round the chunk size up; clamp to what is present
        header.data_len = data_len.min(bytes.len().saturating_sub(header.data_offset) as u32);
        Ok(header)
    }

    /// Sample bytes of the file this header was parsed from
    pub fn samples<'a>(&self, bytes: &'a [u8]) -> &'a [u8] {
        let end = (self.data_offset + self.data_len as usize).min(bytes.len());
        &bytes[self.data_offset.min(end)..end]
    }

    /// Playback length in seconds
    pub fn duration_secs(&self) -> f32 {
        if self.avg_bytes_per_sec == 0 {
            0.0
        } else {
            self.data_len as f32 / self.avg_bytes_per_sec as f32
        }
    }

    /// Encode `samples`, raw little-endian PCM in this header's layout, as a WAV file
    pub fn to_wav_bytes(&self, samples: &[u8]) -> EngineResult<Vec<u8>> {
        let spec = hound::WavSpec {
            channels: self.channels,
            sample_rate: self.samples_per_sec,
            bits_per_sample: self.bits_per_sample,
            sample_format: hound::SampleFormat::Int,
        };
        let width = usize::from(self.bits_per_sample.div_ceil(8));
        if !(1..=4).contains(&width) {
            return Err(invalid(format!("unsupported sample width: {} bits", self.bits_per_sample)));
        }

        let mut out = Cursor::new(Vec::with_capacity(44 + samples.len()));
        let mut writer = hound::WavWriter::new(&mut out, spec).map_err(decode_error)?;
        for raw in samples.chunks_exact(width) {
            let value = if width == 1 {
                // 8-bit WAV samples are unsigned
                i32::from(raw[0]) - 128
            } else {
                let mut word = [0u8; 4];
                word[4 - width..].copy_from_slice(raw);
                i32::from_le_bytes(word) >> (8 * (4 - width))
            };
            writer.write_sample(value).map_err(decode_error)?;
        }
        writer.finalize().map_err(decode_error)?;
        Ok(out.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(err: EngineError) -> String {
        match err {
            EngineError::FormatValidation(m) => m,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parse_locates_data_after_extra_chunks() {
        let header = WavHeader::pcm(2, 22_050, 16);
        let mut bytes = header.to_wav_bytes(&[7u8; 2000]).unwrap();
        let plain = WavHeader::parse(&bytes).unwrap().data_offset;
        // splice a LIST chunk in front of the data chunk
        let list = [b"LIST".as_slice(), 4u32.to_le_bytes().as_slice(), b"INFO".as_slice()].concat();
        bytes.splice(plain - 8..plain - 8, list);

        let parsed = WavHeader::parse(&bytes).unwrap();
        assert_eq!(parsed.channels, 2);
        assert_eq!(parsed.avg_bytes_per_sec, 88_200);
        assert_eq!(parsed.data_offset, plain + 12);
        assert_eq!(parsed.samples(&bytes).len(), 2000);
        assert!(parsed.samples(&bytes).iter().all(|&b| b == 7));
    }

    #[test]
    fn test_rejects_short_and_malformed_files() {
        let header = WavHeader::pcm(1, 44_100, 16);
        let short = header.to_wav_bytes(&[0u8; 998]).unwrap();
        assert_eq!(message(WavHeader::parse(&short).unwrap_err()), ".wav file is too short");

        let mut compressed = header.to_wav_bytes(&[0u8; 1000]).unwrap();
        compressed[20] = 2;
        assert_eq!(
            message(WavHeader::parse(&compressed).unwrap_err()),
            "Compressed .wav files are not supported"
        );

        let mut no_data = header.to_wav_bytes(&[0u8; 1000]).unwrap();
        no_data.truncate(40);
        assert!(message(WavHeader::parse(&no_data).unwrap_err()).contains("'data' block"));

        assert!(message(WavHeader::parse(b"RIFX").unwrap_err()).contains("RIFF"));
    }
}
