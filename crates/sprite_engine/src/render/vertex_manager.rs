//! Sprite quad storage
//!
//! Every sprite is drawn as a four-vertex triangle strip. Quads are packed
//! into shared vertex buffers of [`VERTICES_PER_BUFFER`] vertices and shared
//! between all sprites of the same size.

use super::pool::{PoolHandle, ResourcePool};
use crate::backend::{DeviceBuffer, GraphicsDevice, SpriteDraw, SpriteVertex, VertexBufferLock};
use crate::core::{EngineError, EngineResult};
use crate::foundation::collections::SlotAllocator;
use crate::foundation::math::Mat3;
use crate::render::texture_manager::BoundTexture;

/// Vertices held by one device buffer
pub const VERTICES_PER_BUFFER: u32 = 2000;

const VERTICES_PER_QUAD: u32 = 4;
const QUADS_PER_BUFFER: usize = (VERTICES_PER_BUFFER / VERTICES_PER_QUAD) as usize;

/// Location of a quad inside the shared buffers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuadSlot {
    buffer_index: usize,
    slot: usize,
    buffer: DeviceBuffer,
    width: u32,
    height: u32,
}

impl QuadSlot {
    /// Device buffer holding the quad
    pub fn buffer(&self) -> DeviceBuffer {
        self.buffer
    }

    /// First vertex of the strip
    pub fn start_vertex(&self) -> u32 {
        self.slot as u32 * VERTICES_PER_QUAD
    }

    /// Quad size in pixels
    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Counted reference to a quad
pub type QuadHandle = PoolHandle<QuadSlot>;

#[derive(Debug)]
struct QuadBuffer {
    device: DeviceBuffer,
    slots: SlotAllocator,
}

impl QuadBuffer {
    fn has_room(&self) -> bool {
        self.slots.has_room()
    }
}

/// Quad vertices for a `width` x `height` sprite anchored at its top-left corner
pub fn quad_vertices(width: u32, height: u32) -> [SpriteVertex; 4] {
    let (w, h) = (width as f32, height as f32);
    [
        SpriteVertex::new(0.0, 0.0, 0.0, 0.0),
        SpriteVertex::new(w, 0.0, 1.0, 0.0),
        SpriteVertex::new(0.0, h, 0.0, 1.0),
        SpriteVertex::new(w, h, 1.0, 1.0),
    ]
}

/// Quad allocator and sprite draw submission
#[derive(Debug)]
pub struct VertexManager {
    pool: ResourcePool<QuadSlot>,
    buffers: Vec<QuadBuffer>,
    bound_buffer: Option<DeviceBuffer>,
    stream_binds: u64,
}

impl Default for VertexManager {
    fn default() -> Self {
        Self::new()
    }
}

impl VertexManager {
    /// Empty manager; buffers are created on demand
    pub fn new() -> Self {
        Self {
            pool: ResourcePool::new(true),
            buffers: Vec::new(),
            bound_buffer: None,
            stream_binds: 0,
        }
    }

    /// Quad for a `width` x `height` sprite, shared with every other user of
    /// the same size
    pub fn create(&mut self, device: &mut dyn GraphicsDevice, width: u32, height: u32) -> EngineResult<QuadHandle> {
        let cache_key = format!("{width}x{height}");
        if let Some(handle) = self.pool.lookup(&cache_key) {
            return Ok(handle);
        }

        let buffer_index = match self.buffers.iter().position(QuadBuffer::has_room) {
            Some(index) => index,
            None => {
                let device_buffer = device.create_vertex_buffer(VERTICES_PER_BUFFER)?;
                log::debug!("Created vertex buffer #{} ({VERTICES_PER_BUFFER} vertices)", self.buffers.len());
                self.buffers.push(QuadBuffer {
                    device: device_buffer,
                    slots: SlotAllocator::new(QUADS_PER_BUFFER),
                });
                self.buffers.len() - 1
            }
        };

        let buffer = &mut self.buffers[buffer_index];
        let slot = buffer
            .slots
            .acquire()
            .ok_or_else(|| EngineError::invalid_argument("vertex buffer has no free slot"))?;
        let quad = QuadSlot {
            buffer_index,
            slot,
            buffer: buffer.device,
            width,
            height,
        };

        let written = VertexBufferLock::acquire(device, quad.buffer, quad.start_vertex(), VERTICES_PER_QUAD)
            .and_then(|mut lock| lock.write(&quad_vertices(width, height)));
        if let Err(err) = written {
            buffer.slots.release(slot);
            return Err(err.into());
        }

        let handle = self.pool.insert(Some(cache_key), quad, 0);
        self.pool.set_resident(&handle, true);
        Ok(handle)
    }

    /// Slot of a quad
    pub fn quad(&self, handle: &QuadHandle) -> Option<QuadSlot> {
        self.pool.get(handle).copied()
    }

    /// Submit a textured quad
    pub fn draw(
        &mut self,
        device: &mut dyn GraphicsDevice,
        handle: &QuadHandle,
        texture: BoundTexture,
        transform: Mat3,
    ) -> EngineResult<()> {
        let quad = self.pool.get(handle).copied().ok_or(EngineError::InvalidHandle("quad"))?;
        if self.bound_buffer != Some(quad.buffer) {
            self.bound_buffer = Some(quad.buffer);
            self.stream_binds += 1;
        }
        device.draw_sprite(&SpriteDraw {
            texture: texture.texture,
            buffer: quad.buffer,
            start_vertex: quad.start_vertex(),
            primitive_count: 2,
            transform,
        })?;
        Ok(())
    }

    /// Forget the bound stream so the next draw rebinds it; called after a
    /// device reset
    pub fn force_rebind(&mut self) {
        self.bound_buffer = None;
    }

    /// Number of vertex stream changes since creation
    pub fn stream_binds(&self) -> u64 {
        self.stream_binds
    }

    /// Hand slots of quads nobody references back to their buffers
    pub fn collect(&mut self) -> usize {
        let buffers = &mut self.buffers;
        self.pool
            .collect(0, None, |quad| {
                if let Some(buffer) = buffers.get_mut(quad.buffer_index) {
                    buffer.slots.release(quad.slot);
                }
            })
            .erased
    }

    /// Number of live quads
    pub fn quad_count(&self) -> usize {
        self.pool.len()
    }

    /// Number of device buffers
    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Release every buffer; used at shutdown
    pub fn clear(&mut self, device: &mut dyn GraphicsDevice) {
        self.pool.clear(|_| {});
        for buffer in self.buffers.drain(..) {
            device.release_vertex_buffer(buffer.device);
        }
        self.bound_buffer = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{HeadlessDevice, PixelFormat, TextureDesc, TextureUsage};
    use crate::backend::headless::DrawRecord;

    #[test]
    fn test_same_size_shares_quad() {
        let mut device = HeadlessDevice::new();
        let mut vm = VertexManager::new();
        let a = vm.create(&mut device, 64, 32).unwrap();
        let b = vm.create(&mut device, 64, 32).unwrap();
        let c = vm.create(&mut device, 32, 64).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(vm.quad_count(), 2);
        assert_eq!(vm.quad(&c).unwrap().start_vertex(), 4);

        let buffer = vm.quad(&a).unwrap().buffer();
        let vertices = device.buffer_vertices(buffer).unwrap();
        assert_eq!(vertices[3], SpriteVertex::new(64.0, 32.0, 1.0, 1.0));
        assert!(!device.is_buffer_locked(buffer));
    }

    #[test]
    fn test_released_slots_are_reused() {
        let mut device = HeadlessDevice::new();
        let mut vm = VertexManager::new();
        let a = vm.create(&mut device, 8, 8).unwrap();
        let start = vm.quad(&a).unwrap().start_vertex();
        drop(a);
        assert_eq!(vm.collect(), 1);
        let b = vm.create(&mut device, 16, 16).unwrap();
        assert_eq!(vm.quad(&b).unwrap().start_vertex(), start);
    }

    #[test]
    fn test_full_buffer_grows_a_new_one() {
        let mut device = HeadlessDevice::new();
        let mut vm = VertexManager::new();
        let handles: Vec<_> = (0..=QUADS_PER_BUFFER as u32)
            .map(|i| vm.create(&mut device, i + 1, 1).unwrap())
            .collect();
        assert_eq!(vm.buffer_count(), 2);
        assert_eq!(vm.quad(handles.last().unwrap()).unwrap().start_vertex(), 0);
        assert_eq!(device.buffer_count(), 2);
    }

    #[test]
    fn test_draw_counts_stream_changes() {
        let mut device = HeadlessDevice::new();
        let mut vm = VertexManager::new();
        let quad = vm.create(&mut device, 4, 4).unwrap();
        let desc = TextureDesc {
            width: 4,
            height: 4,
            format: PixelFormat::Argb8,
            usage: TextureUsage::Static,
        };
        let texture = BoundTexture {
            texture: device.create_texture(&desc, None).unwrap(),
            reloaded: true,
        };
        device.begin_scene().unwrap();
        vm.draw(&mut device, &quad, texture, Mat3::identity()).unwrap();
        vm.draw(&mut device, &quad, texture, Mat3::identity()).unwrap();
        assert_eq!(vm.stream_binds(), 1);
        vm.force_rebind();
        vm.draw(&mut device, &quad, texture, Mat3::identity()).unwrap();
        assert_eq!(vm.stream_binds(), 2);
        match &device.draws()[0] {
            DrawRecord::Sprite(draw) => assert_eq!(draw.primitive_count, 2),
            other => panic!("unexpected draw: {other:?}"),
        }
    }
}
