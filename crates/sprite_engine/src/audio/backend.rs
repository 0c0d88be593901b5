//! Audio backend abstraction
//!
//! Platform-independent playback buffer interface. The sound manager only
//! creates, duplicates and steers buffers; mixing is left to the backend.

use crate::assets::WavHeader;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

/// Opaque playback buffer id issued by a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioBuffer(pub u64);

/// Audio backend errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AudioError {
    /// Unknown or released buffer
    #[error("Invalid audio buffer {0:?}")]
    InvalidBuffer(AudioBuffer),

    /// Sample format the backend cannot play
    #[error("Unsupported sound format: {0}")]
    UnsupportedFormat(String),

    /// Any other failed call
    #[error("{call} failed with code {code:#x}")]
    CallFailed {
        /// Name of the failed call
        call: String,
        /// Backend result code
        code: i32,
    },
}

impl AudioError {
    /// Backend-specific result code
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidBuffer(_) => -2_005_401_550,
            Self::UnsupportedFormat(_) => -2_005_401_530,
            Self::CallFailed { code, .. } => *code,
        }
    }
}

/// Audio backend trait for platform abstraction
///
/// Single-threaded like the graphics device; only the frame thread calls it.
pub trait AudioBackend {
    /// Create a buffer holding `samples` in the format described by `header`
    fn create_buffer(&mut self, header: &WavHeader, samples: &[u8]) -> Result<AudioBuffer, AudioError>;

    /// Create a buffer sharing the samples of `buffer`
    fn duplicate_buffer(&mut self, buffer: AudioBuffer) -> Result<AudioBuffer, AudioError>;

    /// Release a buffer
    fn release_buffer(&mut self, buffer: AudioBuffer);

    /// Start or resume playback
    fn play(&mut self, buffer: AudioBuffer, priority: i32, looped: bool) -> Result<(), AudioError>;

    /// Pause playback
    fn stop(&mut self, buffer: AudioBuffer) -> Result<(), AudioError>;

    /// Move the play cursor
    fn set_position(&mut self, buffer: AudioBuffer, bytes: u32) -> Result<(), AudioError>;

    /// Play cursor in bytes
    fn position_bytes(&self, buffer: AudioBuffer) -> Result<u32, AudioError>;

    /// Set volume, `0..=100`
    fn set_volume(&mut self, buffer: AudioBuffer, volume: i32);

    /// Set pan, `-100` (left) to `100` (right)
    fn set_pan(&mut self, buffer: AudioBuffer, pan: i32);

    /// True once after playback passed the end of the buffer
    fn poll_end_of_buffer(&mut self, buffer: AudioBuffer) -> bool;
}

#[derive(Debug, Clone)]
struct NullBuffer {
    size: u32,
    avg_bytes_per_sec: u32,
    position: u32,
    playing: bool,
    looped: bool,
    volume: i32,
    pan: i32,
    end_reached: bool,
}

#[derive(Debug, Default)]
struct NullState {
    next_id: u64,
    buffers: HashMap<u64, NullBuffer>,
}

/// Backend that plays nothing but tracks every buffer's cursor.
///
/// Clones share state, so a test can keep one clone for inspection after
/// boxing another into the sound manager. [`NullAudioBackend::advance`]
/// moves the cursors of playing buffers as if time had passed.
#[derive(Debug, Clone, Default)]
pub struct NullAudioBackend {
    state: Rc<RefCell<NullState>>,
}

impl NullAudioBackend {
    /// Backend with no buffers
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance playback of every playing buffer by `ms` milliseconds
    pub fn advance(&self, ms: u32) {
        for buffer in self.state.borrow_mut().buffers.values_mut() {
            if !buffer.playing || buffer.size == 0 {
                continue;
            }
            let step = (u64::from(buffer.avg_bytes_per_sec) * u64::from(ms) / 1000) as u32;
            let next = buffer.position.saturating_add(step);
            if next >= buffer.size {
                buffer.end_reached = true;
                if buffer.looped {
                    buffer.position = next % buffer.size;
                } else {
                    buffer.position = buffer.size;
                    buffer.playing = false;
                }
            } else {
                buffer.position = next;
            }
        }
    }

    fn with_buffer<R>(&self, buffer: AudioBuffer, f: impl FnOnce(&NullBuffer) -> R) -> Option<R> {
        self.state.borrow().buffers.get(&buffer.0).map(f)
    }

    /// True while the buffer is playing
    pub fn is_playing(&self, buffer: AudioBuffer) -> bool {
        self.with_buffer(buffer, |b| b.playing).unwrap_or(false)
    }

    /// Last volume set on the buffer
    pub fn volume(&self, buffer: AudioBuffer) -> Option<i32> {
        self.with_buffer(buffer, |b| b.volume)
    }

    /// Last pan set on the buffer
    pub fn pan(&self, buffer: AudioBuffer) -> Option<i32> {
        self.with_buffer(buffer, |b| b.pan)
    }

    /// True if the buffer was started in looping mode
    pub fn is_looping(&self, buffer: AudioBuffer) -> bool {
        self.with_buffer(buffer, |b| b.looped).unwrap_or(false)
    }

    /// Number of live buffers
    pub fn buffer_count(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    fn update<R>(&self, buffer: AudioBuffer, f: impl FnOnce(&mut NullBuffer) -> R) -> Result<R, AudioError> {
        self.state
            .borrow_mut()
            .buffers
            .get_mut(&buffer.0)
            .map(f)
            .ok_or(AudioError::InvalidBuffer(buffer))
    }

    fn add(&self, buffer: NullBuffer) -> AudioBuffer {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;
        state.buffers.insert(id, buffer);
        AudioBuffer(id)
    }
}

impl AudioBackend for NullAudioBackend {
    fn create_buffer(&mut self, header: &WavHeader, samples: &[u8]) -> Result<AudioBuffer, AudioError> {
        if header.avg_bytes_per_sec == 0 {
            return Err(AudioError::UnsupportedFormat("zero byte rate".into()));
        }
        Ok(self.add(NullBuffer {
            size: samples.len() as u32,
            avg_bytes_per_sec: header.avg_bytes_per_sec,
            position: 0,
            playing: false,
            looped: false,
            volume: 100,
            pan: 0,
            end_reached: false,
        }))
    }

    fn duplicate_buffer(&mut self, buffer: AudioBuffer) -> Result<AudioBuffer, AudioError> {
        let source = self
            .with_buffer(buffer, NullBuffer::clone)
            .ok_or(AudioError::InvalidBuffer(buffer))?;
        Ok(self.add(NullBuffer {
            position: 0,
            playing: false,
            end_reached: false,
            ..source
        }))
    }

    fn release_buffer(&mut self, buffer: AudioBuffer) {
        self.state.borrow_mut().buffers.remove(&buffer.0);
    }

    fn play(&mut self, buffer: AudioBuffer, _priority: i32, looped: bool) -> Result<(), AudioError> {
        self.update(buffer, |b| {
            b.playing = true;
            b.looped = looped;
        })
    }

    fn stop(&mut self, buffer: AudioBuffer) -> Result<(), AudioError> {
        self.update(buffer, |b| b.playing = false)
    }

    fn set_position(&mut self, buffer: AudioBuffer, bytes: u32) -> Result<(), AudioError> {
        self.update(buffer, |b| b.position = bytes.min(b.size))
    }

    fn position_bytes(&self, buffer: AudioBuffer) -> Result<u32, AudioError> {
        self.with_buffer(buffer, |b| b.position)
            .ok_or(AudioError::InvalidBuffer(buffer))
    }

    fn set_volume(&mut self, buffer: AudioBuffer, volume: i32) {
        let _ = self.update(buffer, |b| b.volume = volume);
    }

    fn set_pan(&mut self, buffer: AudioBuffer, pan: i32) {
        let _ = self.update(buffer, |b| b.pan = pan);
    }

    fn poll_end_of_buffer(&mut self, buffer: AudioBuffer) -> bool {
        self.update(buffer, |b| std::mem::take(&mut b.end_reached))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> WavHeader {
        WavHeader::pcm(1, 1000, 8)
    }

    #[test]
    fn test_advance_stops_at_end_and_signals_once() {
        let mut backend = NullAudioBackend::new();
        let buffer = backend.create_buffer(&header(), &[0; 500]).unwrap();
        backend.play(buffer, 0, false).unwrap();
        backend.advance(400);
        assert_eq!(backend.position_bytes(buffer).unwrap(), 400);
        assert!(!backend.poll_end_of_buffer(buffer));
        backend.advance(400);
        assert!(!backend.is_playing(buffer));
        assert!(backend.poll_end_of_buffer(buffer));
        assert!(!backend.poll_end_of_buffer(buffer));
    }

    #[test]
    fn test_looping_buffer_wraps() {
        let mut backend = NullAudioBackend::new();
        let buffer = backend.create_buffer(&header(), &[0; 500]).unwrap();
        backend.play(buffer, 0, true).unwrap();
        backend.advance(700);
        assert_eq!(backend.position_bytes(buffer).unwrap(), 200);
        assert!(backend.is_playing(buffer));
    }

    #[test]
    fn test_duplicate_starts_at_zero_and_clones_share_state() {
        let mut backend = NullAudioBackend::new();
        let probe = backend.clone();
        let master = backend.create_buffer(&header(), &[0; 100]).unwrap();
        let copy = backend.duplicate_buffer(master).unwrap();
        assert_ne!(master, copy);
        assert_eq!(probe.buffer_count(), 2);
        backend.release_buffer(copy);
        assert_eq!(probe.buffer_count(), 1);
        assert!(matches!(backend.stop(copy), Err(AudioError::InvalidBuffer(_))));
    }
}
