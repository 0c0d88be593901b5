//! # Backend Module
//!
//! The graphics device abstraction the engine core renders through. A device
//! implementation owns the real GPU objects; the core only holds opaque
//! [`DeviceTexture`] / [`DeviceBuffer`] ids and submits draw calls.
//!
//! ## Organization
//!
//! - **GraphicsDevice**: the device trait (textures, vertex buffers, draw calls,
//!   frame presentation, device-loss recovery)
//! - **Guards**: scoped lock objects for vertex buffers and textures
//! - **Headless**: in-memory device that records every call
//!
//! ## Design Principles
//!
//! - **Abstraction**: the core never sees backend-specific handles
//! - **Scoped locking**: lock/unlock pairs are only reachable through guards,
//!   so an early return can never leave a resource locked

pub mod headless;

pub use headless::HeadlessDevice;

use crate::foundation::math::{Mat3, Vec2};
use bytemuck::{Pod, Zeroable};
use thiserror::Error;

/// Opaque texture id issued by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceTexture(pub u64);

/// Opaque vertex buffer id issued by a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceBuffer(pub u64);

/// 32-bit ARGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color(pub u32);

impl Color {
    /// Opaque red, the default outline color
    pub const RED: Self = Self::rgb(255, 0, 0);
    /// Opaque white
    pub const WHITE: Self = Self::rgb(255, 255, 255);
    /// Dark green used for walkability grid nodes
    pub const GRID_NODE: Self = Self(0xFF00_3000);

    /// Opaque color from components
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self::argb(255, r, g, b)
    }

    /// Color from components including alpha
    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Self(((a as u32) << 24) | ((r as u32) << 16) | ((g as u32) << 8) | b as u32)
    }
}

/// Texture pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 32-bit ARGB
    Argb8,
    /// 32-bit RGB with unused alpha
    Xrgb8,
    /// 4x4 block compressed with explicit alpha
    Dxt3,
}

impl PixelFormat {
    /// True for block-compressed formats
    pub fn is_compressed(self) -> bool {
        matches!(self, Self::Dxt3)
    }
}

/// How a texture will be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TextureUsage {
    /// Uploaded once from file data
    Static,
    /// Rewritten frequently through a lock
    Dynamic,
    /// Off-screen surface
    Surface,
    /// Render target
    RenderTarget,
}

/// Texture creation parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format
    pub format: PixelFormat,
    /// Intended usage
    pub usage: TextureUsage,
}

/// Sprite vertex: position plus one texture coordinate set
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Default, Pod, Zeroable)]
pub struct SpriteVertex {
    /// X position
    pub x: f32,
    /// Y position
    pub y: f32,
    /// Z position (always 0 for sprites)
    pub z: f32,
    /// Texture U
    pub u: f32,
    /// Texture V
    pub v: f32,
}

impl SpriteVertex {
    /// Vertex at `(x, y)` with texture coordinates `(u, v)`
    pub const fn new(x: f32, y: f32, u: f32, v: f32) -> Self {
        Self { x, y, z: 0.0, u, v }
    }
}

/// Textured quad draw call (triangle strip)
#[derive(Debug, Clone, PartialEq)]
pub struct SpriteDraw {
    /// Bound texture
    pub texture: DeviceTexture,
    /// Vertex buffer holding the quad
    pub buffer: DeviceBuffer,
    /// First vertex of the strip
    pub start_vertex: u32,
    /// Number of triangles
    pub primitive_count: u32,
    /// World transform
    pub transform: Mat3,
}

/// Untextured colored rectangle
#[derive(Debug, Clone, PartialEq)]
pub struct ColorQuad {
    /// Width
    pub width: f32,
    /// Height
    pub height: f32,
    /// Fill color
    pub color: Color,
    /// World transform
    pub transform: Mat3,
}

/// Polyline in local coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct LineStrip {
    /// Vertices in drawing order
    pub points: Vec<Vec2>,
    /// Line color
    pub color: Color,
    /// World transform
    pub transform: Mat3,
}

/// Point list in local coordinates
#[derive(Debug, Clone, PartialEq)]
pub struct PointList {
    /// Points
    pub points: Vec<Vec2>,
    /// Point color
    pub color: Color,
    /// Point size in pixels
    pub size: f32,
    /// World transform
    pub transform: Mat3,
}

/// Text draw call at a screen position
#[derive(Debug, Clone, PartialEq)]
pub struct TextDraw {
    /// Text to draw
    pub text: String,
    /// Top-left corner in screen space
    pub position: Vec2,
    /// Text color
    pub color: Color,
}

/// Result of a cooperative-level test
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceStatus {
    /// Device is operational
    Ok,
    /// Device is lost and cannot be restored yet
    Lost,
    /// Device can be reset now
    NeedsReset,
}

/// Outcome of presenting a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    /// Frame presented
    Presented,
    /// Device was lost while presenting
    DeviceLost,
}

/// Graphics device errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    /// Not enough video memory for the allocation
    #[error("Out of video memory")]
    OutOfVideoMemory,

    /// Device is lost
    #[error("Device lost")]
    DeviceLost,

    /// Any other failed call
    #[error("{call} failed with code {code:#x}")]
    CallFailed {
        /// Name of the failed call
        call: String,
        /// Backend result code
        code: i32,
    },
}

impl DeviceError {
    /// Backend-specific result code
    pub fn code(&self) -> i32 {
        match self {
            Self::OutOfVideoMemory => -2_005_532_292,
            Self::DeviceLost => -2_005_530_520,
            Self::CallFailed { code, .. } => *code,
        }
    }

    /// Shorthand for [`DeviceError::CallFailed`]
    pub fn call_failed(call: impl Into<String>, code: i32) -> Self {
        Self::CallFailed {
            call: call.into(),
            code,
        }
    }
}

/// Low-level graphics device.
///
/// Implementations are single-threaded; the engine calls them only from the
/// frame thread.
pub trait GraphicsDevice {
    /// Free texture memory reported by the driver, in kilobytes
    fn available_texture_memory_kb(&self) -> u32;

    /// Backbuffer size in pixels
    fn backbuffer_size(&self) -> (u32, u32);

    /// True if textures may have non power-of-two sizes
    fn supports_non_pow2_textures(&self) -> bool;

    /// Create a texture, optionally initialised from encoded container bytes
    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<DeviceTexture, DeviceError>;

    /// Release a texture
    fn release_texture(&mut self, texture: DeviceTexture);

    /// Lock a texture for writing, returning the row pitch in bytes
    fn lock_texture(&mut self, texture: DeviceTexture) -> Result<u32, DeviceError>;

    /// Write rows starting at `first_row` into a locked texture
    fn write_texture_rows(&mut self, texture: DeviceTexture, first_row: u32, data: &[u8]) -> Result<(), DeviceError>;

    /// Unlock a texture
    fn unlock_texture(&mut self, texture: DeviceTexture);

    /// Create a vertex buffer able to hold `capacity` sprite vertices
    fn create_vertex_buffer(&mut self, capacity: u32) -> Result<DeviceBuffer, DeviceError>;

    /// Release a vertex buffer
    fn release_vertex_buffer(&mut self, buffer: DeviceBuffer);

    /// Lock `count` vertices starting at `offset`
    fn lock_vertices(&mut self, buffer: DeviceBuffer, offset: u32, count: u32) -> Result<(), DeviceError>;

    /// Write raw vertex bytes at vertex `offset` of a locked buffer
    fn write_vertices(&mut self, buffer: DeviceBuffer, offset: u32, bytes: &[u8]) -> Result<(), DeviceError>;

    /// Unlock a vertex buffer
    fn unlock_vertices(&mut self, buffer: DeviceBuffer);

    /// Draw a textured sprite
    fn draw_sprite(&mut self, draw: &SpriteDraw) -> Result<(), DeviceError>;

    /// Draw a colored quad
    fn draw_quad(&mut self, quad: &ColorQuad) -> Result<(), DeviceError>;

    /// Draw a polyline
    fn draw_lines(&mut self, lines: &LineStrip) -> Result<(), DeviceError>;

    /// Draw points
    fn draw_points(&mut self, points: &PointList) -> Result<(), DeviceError>;

    /// Draw text
    fn draw_text(&mut self, text: &TextDraw) -> Result<(), DeviceError>;

    /// Begin a frame
    fn begin_scene(&mut self) -> Result<(), DeviceError>;

    /// Clear the backbuffer
    fn clear(&mut self, color: Color) -> Result<(), DeviceError>;

    /// End the frame and present it
    fn end_scene_and_present(&mut self) -> Result<PresentStatus, DeviceError>;

    /// Query whether a lost device can be reset
    fn test_cooperative_level(&mut self) -> DeviceStatus;

    /// Reset a lost device. All device textures must have been released.
    fn reset(&mut self) -> Result<(), DeviceError>;

    /// Access to the concrete device, for tools and tests
    fn as_any_mut(&mut self) -> &mut dyn std::any::Any;
}

/// Scoped vertex buffer lock; unlocks on drop
pub struct VertexBufferLock<'a> {
    device: &'a mut dyn GraphicsDevice,
    buffer: DeviceBuffer,
    offset: u32,
    count: u32,
}

impl<'a> VertexBufferLock<'a> {
    /// Lock `count` vertices at `offset`
    pub fn acquire(
        device: &'a mut dyn GraphicsDevice,
        buffer: DeviceBuffer,
        offset: u32,
        count: u32,
    ) -> Result<Self, DeviceError> {
        device.lock_vertices(buffer, offset, count)?;
        Ok(Self {
            device,
            buffer,
            offset,
            count,
        })
    }

    /// Write vertices into the locked range
    pub fn write(&mut self, vertices: &[SpriteVertex]) -> Result<(), DeviceError> {
        if vertices.len() > self.count as usize {
            return Err(DeviceError::call_failed("VertexBuffer::write (range overflow)", -1));
        }
        self.device
            .write_vertices(self.buffer, self.offset, bytemuck::cast_slice(vertices))
    }
}

impl Drop for VertexBufferLock<'_> {
    fn drop(&mut self) {
        self.device.unlock_vertices(self.buffer);
    }
}

/// Scoped texture lock; unlocks on drop
pub struct TextureLock<'a> {
    device: &'a mut dyn GraphicsDevice,
    texture: DeviceTexture,
    pitch: u32,
}

impl<'a> TextureLock<'a> {
    /// Lock a texture for writing
    pub fn acquire(device: &'a mut dyn GraphicsDevice, texture: DeviceTexture) -> Result<Self, DeviceError> {
        let pitch = device.lock_texture(texture)?;
        Ok(Self { device, texture, pitch })
    }

    /// Row pitch in bytes
    pub fn pitch(&self) -> u32 {
        self.pitch
    }

    /// Write whole rows starting at `first_row`
    pub fn write_rows(&mut self, first_row: u32, data: &[u8]) -> Result<(), DeviceError> {
        self.device.write_texture_rows(self.texture, first_row, data)
    }
}

impl Drop for TextureLock<'_> {
    fn drop(&mut self) {
        self.device.unlock_texture(self.texture);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_lock_unlocks_on_error_path() {
        let mut device = HeadlessDevice::new();
        let buffer = device.create_vertex_buffer(8).unwrap();
        {
            let mut lock = VertexBufferLock::acquire(&mut device, buffer, 0, 4).unwrap();
            let too_many = [SpriteVertex::default(); 5];
            assert!(lock.write(&too_many).is_err());
        }
        assert!(!device.is_buffer_locked(buffer));
    }

    #[test]
    fn test_texture_lock_reports_pitch() {
        let mut device = HeadlessDevice::new();
        let desc = TextureDesc {
            width: 16,
            height: 4,
            format: PixelFormat::Argb8,
            usage: TextureUsage::Dynamic,
        };
        let texture = device.create_texture(&desc, None).unwrap();
        {
            let lock = TextureLock::acquire(&mut device, texture).unwrap();
            assert_eq!(lock.pitch(), 64);
        }
        assert!(!device.is_texture_locked(texture));
    }

    #[test]
    fn test_color_packing() {
        assert_eq!(Color::rgb(255, 0, 0).0, 0xFFFF_0000);
        assert_eq!(Color::argb(0x80, 1, 2, 3).0, 0x8001_0203);
    }
}
