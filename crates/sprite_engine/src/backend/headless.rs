//! Headless graphics device
//!
//! Keeps textures and vertex buffers in memory and records every draw call.
//! Used by tests and by tools that run game logic without a window. It can
//! also simulate a limited video memory budget and device loss.

use super::{
    Color, ColorQuad, DeviceBuffer, DeviceError, DeviceStatus, DeviceTexture, GraphicsDevice, LineStrip,
    PixelFormat, PointList, PresentStatus, SpriteDraw, SpriteVertex, TextDraw, TextureDesc,
};
use std::collections::{HashMap, HashSet};

/// Draw call recorded by [`HeadlessDevice`]
#[derive(Debug, Clone, PartialEq)]
pub enum DrawRecord {
    /// Textured sprite
    Sprite(SpriteDraw),
    /// Colored quad
    Quad(ColorQuad),
    /// Polyline
    Lines(LineStrip),
    /// Points
    Points(PointList),
    /// Text
    Text(TextDraw),
    /// Backbuffer clear
    Clear(Color),
}

#[derive(Debug)]
struct HeadlessTexture {
    desc: TextureDesc,
    pixels: Vec<u8>,
    cost_kb: u32,
}

/// In-memory [`GraphicsDevice`]
#[derive(Debug)]
pub struct HeadlessDevice {
    next_id: u64,
    textures: HashMap<u64, HeadlessTexture>,
    buffers: HashMap<u64, Vec<SpriteVertex>>,
    locked_buffers: HashSet<u64>,
    locked_textures: HashSet<u64>,
    memory_limit_kb: u32,
    used_kb: u32,
    backbuffer: (u32, u32),
    non_pow2: bool,
    status: DeviceStatus,
    in_scene: bool,
    draws: Vec<DrawRecord>,
    frames_presented: u64,
    reset_count: u32,
    lose_on_present: bool,
}

impl Default for HeadlessDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessDevice {
    /// Device with 256 MB of texture memory and a 1024x768 backbuffer
    pub fn new() -> Self {
        Self {
            next_id: 1,
            textures: HashMap::new(),
            buffers: HashMap::new(),
            locked_buffers: HashSet::new(),
            locked_textures: HashSet::new(),
            memory_limit_kb: 256 * 1024,
            used_kb: 0,
            backbuffer: (1024, 768),
            non_pow2: true,
            status: DeviceStatus::Ok,
            in_scene: false,
            draws: Vec::new(),
            frames_presented: 0,
            reset_count: 0,
            lose_on_present: false,
        }
    }

    /// Limit texture memory; allocations beyond it fail with out-of-memory
    pub fn with_memory_limit_kb(mut self, limit: u32) -> Self {
        self.memory_limit_kb = limit;
        self
    }

    /// Set backbuffer size and non power-of-two support
    pub fn with_backbuffer(mut self, width: u32, height: u32, non_pow2: bool) -> Self {
        self.backbuffer = (width, height);
        self.non_pow2 = non_pow2;
        self
    }

    /// Make the next present report device loss
    pub fn lose_device_on_present(&mut self) {
        self.lose_on_present = true;
    }

    /// Force the cooperative-level status
    pub fn set_status(&mut self, status: DeviceStatus) {
        self.status = status;
    }

    /// Recorded draw calls since the last [`HeadlessDevice::take_draws`]
    pub fn draws(&self) -> &[DrawRecord] {
        &self.draws
    }

    /// Drain recorded draw calls
    pub fn take_draws(&mut self) -> Vec<DrawRecord> {
        std::mem::take(&mut self.draws)
    }

    /// Number of live textures
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Texture memory in use
    pub fn used_memory_kb(&self) -> u32 {
        self.used_kb
    }

    /// Pixel bytes of a texture
    pub fn texture_pixels(&self, texture: DeviceTexture) -> Option<&[u8]> {
        self.textures.get(&texture.0).map(|t| t.pixels.as_slice())
    }

    /// Vertices stored in a buffer
    pub fn buffer_vertices(&self, buffer: DeviceBuffer) -> Option<&[SpriteVertex]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }

    /// Number of live vertex buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// True while a buffer is locked
    pub fn is_buffer_locked(&self, buffer: DeviceBuffer) -> bool {
        self.locked_buffers.contains(&buffer.0)
    }

    /// True while a texture is locked
    pub fn is_texture_locked(&self, texture: DeviceTexture) -> bool {
        self.locked_textures.contains(&texture.0)
    }

    /// Frames presented so far
    pub fn frames_presented(&self) -> u64 {
        self.frames_presented
    }

    /// Number of successful resets
    pub fn reset_count(&self) -> u32 {
        self.reset_count
    }

    fn issue_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn ensure_operational(&self, call: &str) -> Result<(), DeviceError> {
        match self.status {
            DeviceStatus::Ok => Ok(()),
            _ => Err(DeviceError::call_failed(call, DeviceError::DeviceLost.code())),
        }
    }

    fn texture_cost_kb(desc: &TextureDesc) -> u32 {
        crate::render::texture_manager::texture_cost_kb(desc.width, desc.height, desc.format.is_compressed())
    }

    fn row_pitch(desc: &TextureDesc) -> u32 {
        match desc.format {
            // 16 bytes per 4x4 block
            PixelFormat::Dxt3 => desc.width.div_ceil(4) * 16,
            PixelFormat::Argb8 | PixelFormat::Xrgb8 => desc.width * 4,
        }
    }

    fn record(&mut self, record: DrawRecord) -> Result<(), DeviceError> {
        if !self.in_scene {
            return Err(DeviceError::call_failed("Draw outside BeginScene/EndScene", -1));
        }
        self.draws.push(record);
        Ok(())
    }
}

impl GraphicsDevice for HeadlessDevice {
    fn available_texture_memory_kb(&self) -> u32 {
        self.memory_limit_kb.saturating_sub(self.used_kb)
    }

    fn backbuffer_size(&self) -> (u32, u32) {
        self.backbuffer
    }

    fn supports_non_pow2_textures(&self) -> bool {
        self.non_pow2
    }

    fn create_texture(&mut self, desc: &TextureDesc, data: Option<&[u8]>) -> Result<DeviceTexture, DeviceError> {
        self.ensure_operational("CreateTexture")?;
        let cost_kb = Self::texture_cost_kb(desc);
        if self.used_kb + cost_kb > self.memory_limit_kb {
            return Err(DeviceError::OutOfVideoMemory);
        }
        let size = (Self::row_pitch(desc) * desc.height) as usize;
        let mut pixels = vec![0xCC; size];
        if let Some(data) = data {
            let n = data.len().min(size);
            pixels[..n].copy_from_slice(&data[..n]);
        }
        let id = self.issue_id();
        self.used_kb += cost_kb;
        self.textures.insert(id, HeadlessTexture { desc: *desc, pixels, cost_kb });
        Ok(DeviceTexture(id))
    }

    fn release_texture(&mut self, texture: DeviceTexture) {
        if let Some(t) = self.textures.remove(&texture.0) {
            self.used_kb -= t.cost_kb;
        }
        self.locked_textures.remove(&texture.0);
    }

    fn lock_texture(&mut self, texture: DeviceTexture) -> Result<u32, DeviceError> {
        let t = self
            .textures
            .get(&texture.0)
            .ok_or_else(|| DeviceError::call_failed("LockRect (unknown texture)", -1))?;
        let pitch = Self::row_pitch(&t.desc);
        if !self.locked_textures.insert(texture.0) {
            return Err(DeviceError::call_failed("LockRect (already locked)", -1));
        }
        Ok(pitch)
    }

    fn write_texture_rows(&mut self, texture: DeviceTexture, first_row: u32, data: &[u8]) -> Result<(), DeviceError> {
        if !self.locked_textures.contains(&texture.0) {
            return Err(DeviceError::call_failed("write to unlocked texture", -1));
        }
        let t = self
            .textures
            .get_mut(&texture.0)
            .ok_or_else(|| DeviceError::call_failed("write (unknown texture)", -1))?;
        let start = (first_row * Self::row_pitch(&t.desc)) as usize;
        let end = start + data.len();
        if end > t.pixels.len() {
            return Err(DeviceError::call_failed("write past end of texture", -1));
        }
        t.pixels[start..end].copy_from_slice(data);
        Ok(())
    }

    fn unlock_texture(&mut self, texture: DeviceTexture) {
        self.locked_textures.remove(&texture.0);
    }

    fn create_vertex_buffer(&mut self, capacity: u32) -> Result<DeviceBuffer, DeviceError> {
        let id = self.issue_id();
        self.buffers.insert(id, vec![SpriteVertex::default(); capacity as usize]);
        Ok(DeviceBuffer(id))
    }

    fn release_vertex_buffer(&mut self, buffer: DeviceBuffer) {
        self.buffers.remove(&buffer.0);
        self.locked_buffers.remove(&buffer.0);
    }

    fn lock_vertices(&mut self, buffer: DeviceBuffer, offset: u32, count: u32) -> Result<(), DeviceError> {
        let vertices = self
            .buffers
            .get(&buffer.0)
            .ok_or_else(|| DeviceError::call_failed("Lock (unknown buffer)", -1))?;
        if (offset + count) as usize > vertices.len() {
            return Err(DeviceError::call_failed("Lock (range out of bounds)", -1));
        }
        if !self.locked_buffers.insert(buffer.0) {
            return Err(DeviceError::call_failed("Lock (already locked)", -1));
        }
        Ok(())
    }

    fn write_vertices(&mut self, buffer: DeviceBuffer, offset: u32, bytes: &[u8]) -> Result<(), DeviceError> {
        if !self.locked_buffers.contains(&buffer.0) {
            return Err(DeviceError::call_failed("write to unlocked buffer", -1));
        }
        let vertices = self
            .buffers
            .get_mut(&buffer.0)
            .ok_or_else(|| DeviceError::call_failed("write (unknown buffer)", -1))?;
        let incoming: &[SpriteVertex] = bytemuck::try_cast_slice(bytes)
            .map_err(|_| DeviceError::call_failed("write (misaligned vertex data)", -1))?;
        let start = offset as usize;
        let end = start + incoming.len();
        if end > vertices.len() {
            return Err(DeviceError::call_failed("write past end of buffer", -1));
        }
        vertices[start..end].copy_from_slice(incoming);
        Ok(())
    }

    fn unlock_vertices(&mut self, buffer: DeviceBuffer) {
        self.locked_buffers.remove(&buffer.0);
    }

    fn draw_sprite(&mut self, draw: &SpriteDraw) -> Result<(), DeviceError> {
        if !self.textures.contains_key(&draw.texture.0) {
            return Err(DeviceError::call_failed("SetTexture (released texture)", -1));
        }
        if !self.buffers.contains_key(&draw.buffer.0) {
            return Err(DeviceError::call_failed("SetStreamSource (released buffer)", -1));
        }
        self.record(DrawRecord::Sprite(draw.clone()))
    }

    fn draw_quad(&mut self, quad: &ColorQuad) -> Result<(), DeviceError> {
        self.record(DrawRecord::Quad(quad.clone()))
    }

    fn draw_lines(&mut self, lines: &LineStrip) -> Result<(), DeviceError> {
        self.record(DrawRecord::Lines(lines.clone()))
    }

    fn draw_points(&mut self, points: &PointList) -> Result<(), DeviceError> {
        self.record(DrawRecord::Points(points.clone()))
    }

    fn draw_text(&mut self, text: &TextDraw) -> Result<(), DeviceError> {
        self.record(DrawRecord::Text(text.clone()))
    }

    fn begin_scene(&mut self) -> Result<(), DeviceError> {
        self.ensure_operational("BeginScene")?;
        self.in_scene = true;
        Ok(())
    }

    fn clear(&mut self, color: Color) -> Result<(), DeviceError> {
        self.record(DrawRecord::Clear(color))
    }

    fn end_scene_and_present(&mut self) -> Result<PresentStatus, DeviceError> {
        self.in_scene = false;
        if self.lose_on_present {
            self.lose_on_present = false;
            self.status = DeviceStatus::Lost;
            return Ok(PresentStatus::DeviceLost);
        }
        self.frames_presented += 1;
        Ok(PresentStatus::Presented)
    }

    fn test_cooperative_level(&mut self) -> DeviceStatus {
        self.status
    }

    fn reset(&mut self) -> Result<(), DeviceError> {
        if !self.textures.is_empty() {
            return Err(DeviceError::call_failed("Reset (textures still allocated)", -1));
        }
        self.status = DeviceStatus::Ok;
        self.reset_count += 1;
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn std::any::Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureUsage;

    fn desc(width: u32, height: u32) -> TextureDesc {
        TextureDesc {
            width,
            height,
            format: PixelFormat::Argb8,
            usage: TextureUsage::Static,
        }
    }

    #[test]
    fn test_memory_limit_reports_out_of_memory() {
        let mut device = HeadlessDevice::new().with_memory_limit_kb(64);
        let a = device.create_texture(&desc(64, 64), None).unwrap();
        assert_eq!(device.used_memory_kb(), 16);
        assert_eq!(device.create_texture(&desc(128, 128), None), Err(DeviceError::OutOfVideoMemory));
        device.release_texture(a);
        assert_eq!(device.used_memory_kb(), 0);
    }

    #[test]
    fn test_draw_requires_scene() {
        let mut device = HeadlessDevice::new();
        assert!(device.clear(Color::WHITE).is_err());
        device.begin_scene().unwrap();
        device.clear(Color::WHITE).unwrap();
        assert_eq!(device.end_scene_and_present(), Ok(PresentStatus::Presented));
        assert_eq!(device.draws().len(), 1);
    }

    #[test]
    fn test_reset_requires_released_textures() {
        let mut device = HeadlessDevice::new();
        let t = device.create_texture(&desc(4, 4), None).unwrap();
        device.set_status(DeviceStatus::NeedsReset);
        assert!(device.reset().is_err());
        device.release_texture(t);
        assert!(device.reset().is_ok());
        assert_eq!(device.test_cooperative_level(), DeviceStatus::Ok);
    }
}
