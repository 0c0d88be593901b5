//! Texture manager
//!
//! Owns every texture the sequences draw with. File textures are decoded
//! DDS containers shared by path; dynamic, surface and render-target
//! textures are private to their creator. Device allocations are created
//! lazily on first bind and released again under video memory pressure.
//!
//! # Memory accounting
//!
//! Each texture costs `width * height * 4 / 1024` KB, a quarter of that when
//! block-compressed. The budget starts at the configured limit (or what the
//! device reports) and shrinks to the real utilization the first time an
//! allocation fails, so later collections aim below what actually fits.

use super::pool::{CollectStats, PoolHandle, ResourcePool};
use crate::assets::{DdsHeader, FileManager, FileRef, LoadHint};
use crate::backend::{DeviceError, DeviceTexture, GraphicsDevice, PixelFormat, TextureDesc, TextureUsage};
use crate::core::{EngineError, EngineResult, TextureConfig};
use crate::foundation::math::next_pow2_at_least;
use crate::foundation::time::FrameClock;
use std::rc::Rc;

/// Where a texture's contents come from
#[derive(Debug, Clone)]
pub enum TextureSource {
    /// Decoded file, kept so an evicted texture can be recreated
    File {
        /// Asset path
        path: String,
        /// Container bytes
        file: FileRef,
        /// Parsed container header
        header: DdsHeader,
    },
    /// Streamed contents written through a lock every frame
    Dynamic,
    /// Off-screen surface
    Surface {
        /// Usable as a render target
        render_target: bool,
    },
    /// Backbuffer-sized render target
    RenderTarget,
}

/// Pool entry for one texture
#[derive(Debug)]
pub struct TextureEntry {
    source: TextureSource,
    desc: TextureDesc,
    original_size: (u32, u32),
    device: Option<DeviceTexture>,
}

impl TextureEntry {
    /// Contents origin
    pub fn source(&self) -> &TextureSource {
        &self.source
    }

    /// Device texture, when resident
    pub fn device_texture(&self) -> Option<DeviceTexture> {
        self.device
    }
}

/// Counted reference to a managed texture
pub type TextureHandle = PoolHandle<TextureEntry>;

/// Size and format of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    /// Allocated width
    pub width: u32,
    /// Allocated height
    pub height: u32,
    /// Width of the source image before padding
    pub original_width: u32,
    /// Height of the source image before padding
    pub original_height: u32,
    /// Pixel format
    pub format: PixelFormat,
}

impl TextureInfo {
    /// True for block-compressed textures
    pub fn compressed(&self) -> bool {
        self.format.is_compressed()
    }
}

/// Device texture ready for drawing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundTexture {
    /// Device texture id
    pub texture: DeviceTexture,
    /// True if the allocation was (re)created by this bind
    pub reloaded: bool,
}

/// Approximate video memory cost of a texture in KB
pub fn texture_cost_kb(width: u32, height: u32, compressed: bool) -> u32 {
    let mut cost = u64::from(width) * u64::from(height) * 4 / 1024;
    if compressed {
        cost /= 4;
    }
    u32::try_from(cost).unwrap_or(u32::MAX)
}

/// Texture lifecycle manager
#[derive(Debug)]
pub struct TextureManager {
    pool: ResourcePool<TextureEntry>,
    config: TextureConfig,
    available_kb: u32,
    clock: Rc<FrameClock>,
}

impl TextureManager {
    /// Create a manager sized from the config limit or the device's free memory
    pub fn new(device: &dyn GraphicsDevice, config: TextureConfig, caching: bool, clock: Rc<FrameClock>) -> Self {
        let available_kb = if config.video_memory_limit_kb > 0 {
            config.video_memory_limit_kb
        } else {
            device.available_texture_memory_kb()
        };
        log::info!("Available video memory: {}MB", available_kb / 1024);
        Self {
            pool: ResourcePool::new(caching),
            config,
            available_kb,
            clock,
        }
    }

    /// Load a texture from an image file, sharing an already loaded copy
    pub fn load(&mut self, files: &mut FileManager, path: &str, compressed: bool) -> EngineResult<TextureHandle> {
        let cache_key = format!("{path}#{}", u8::from(compressed));
        if let Some(handle) = self.pool.lookup(&cache_key) {
            return Ok(handle);
        }

        let _pause = self.clock.pause();
        let hint = if compressed {
            LoadHint::COMPRESSED_TEXTURE
        } else {
            LoadHint::empty()
        };
        let file = files.load(path, hint)?;
        let header = DdsHeader::parse(&file)?;
        if header.original_width == 0 || header.original_height == 0 {
            return Err(EngineError::FormatValidation(format!("{path}: texture has no source size")));
        }

        let desc = TextureDesc {
            width: header.width,
            height: header.height,
            format: header.format,
            usage: TextureUsage::Static,
        };
        let cost = texture_cost_kb(header.width, header.height, compressed);
        let entry = TextureEntry {
            source: TextureSource::File {
                path: path.to_string(),
                file,
                header,
            },
            desc,
            original_size: (header.original_width, header.original_height),
            device: None,
        };
        log::trace!("Texture {path} registered ({cost} KB)");
        Ok(self.pool.insert(Some(cache_key), entry, cost))
    }

    fn insert_private(&mut self, source: TextureSource, desc: TextureDesc) -> TextureHandle {
        let cost = texture_cost_kb(desc.width, desc.height, desc.format.is_compressed());
        let entry = TextureEntry {
            source,
            desc,
            original_size: (desc.width, desc.height),
            device: None,
        };
        self.pool.insert(None, entry, cost)
    }

    /// Create a texture whose contents are rewritten through a lock
    pub fn create_dynamic(&mut self, width: u32, height: u32, compressed: bool) -> TextureHandle {
        let format = if compressed { PixelFormat::Dxt3 } else { PixelFormat::Argb8 };
        let desc = TextureDesc {
            width,
            height,
            format,
            usage: TextureUsage::Dynamic,
        };
        self.insert_private(TextureSource::Dynamic, desc)
    }

    /// Create an off-screen surface texture
    pub fn create_surface(&mut self, width: u32, height: u32, format: PixelFormat, render_target: bool) -> TextureHandle {
        let usage = if render_target {
            TextureUsage::RenderTarget
        } else {
            TextureUsage::Surface
        };
        let desc = TextureDesc {
            width,
            height,
            format,
            usage,
        };
        self.insert_private(TextureSource::Surface { render_target }, desc)
    }

    /// Create a render target covering the backbuffer.
    ///
    /// Devices restricted to power-of-two textures get a square target of at
    /// least 256 pixels.
    pub fn create_render_target(&mut self, device: &dyn GraphicsDevice) -> TextureHandle {
        let (mut width, mut height) = device.backbuffer_size();
        if !device.supports_non_pow2_textures() {
            width = next_pow2_at_least(width, 256);
            height = width;
        }
        let desc = TextureDesc {
            width,
            height,
            format: PixelFormat::Argb8,
            usage: TextureUsage::RenderTarget,
        };
        self.insert_private(TextureSource::RenderTarget, desc)
    }

    /// Size and format of a texture
    pub fn info(&self, handle: &TextureHandle) -> Option<TextureInfo> {
        self.pool.get(handle).map(|entry| TextureInfo {
            width: entry.desc.width,
            height: entry.desc.height,
            original_width: entry.original_size.0,
            original_height: entry.original_size.1,
            format: entry.desc.format,
        })
    }

    /// Pool entry of a texture
    pub fn entry(&self, handle: &TextureHandle) -> Option<&TextureEntry> {
        self.pool.get(handle)
    }

    /// True while the device allocation exists
    pub fn is_loaded(&self, handle: &TextureHandle) -> bool {
        self.pool.is_resident(handle)
    }

    fn create_device_texture(
        device: &mut dyn GraphicsDevice,
        entry: &TextureEntry,
    ) -> Result<DeviceTexture, DeviceError> {
        let data = match &entry.source {
            TextureSource::File { file, header, .. } => Some(header.payload(file)),
            _ => None,
        };
        device.create_texture(&entry.desc, data)
    }

    /// Create the device allocation if it does not exist.
    ///
    /// Returns true when the allocation was created by this call. Running out
    /// of video memory triggers a full collection and a single retry.
    pub fn ensure_loaded(&mut self, device: &mut dyn GraphicsDevice, handle: &TextureHandle) -> EngineResult<bool> {
        if self.pool.is_resident(handle) {
            return Ok(false);
        }
        let entry = self.pool.get(handle).ok_or(EngineError::InvalidHandle("texture"))?;
        let texture = match Self::create_device_texture(device, entry) {
            Ok(texture) => texture,
            Err(DeviceError::OutOfVideoMemory) => {
                log::debug!("Out of video memory, collecting all textures");
                self.collect_with(device, false, 100);
                let entry = self.pool.get(handle).ok_or(EngineError::InvalidHandle("texture"))?;
                Self::create_device_texture(device, entry)?
            }
            Err(err) => return Err(err.into()),
        };
        if let Some(entry) = self.pool.get_mut(handle) {
            entry.device = Some(texture);
        }
        self.pool.set_resident(handle, true);
        Ok(true)
    }

    /// Make a texture resident and mark it used this frame
    pub fn bind(&mut self, device: &mut dyn GraphicsDevice, handle: &TextureHandle) -> EngineResult<BoundTexture> {
        let reloaded = self.ensure_loaded(device, handle)?;
        self.pool.touch(handle);
        let texture = self
            .pool
            .get(handle)
            .and_then(TextureEntry::device_texture)
            .ok_or(EngineError::InvalidHandle("texture"))?;
        Ok(BoundTexture { texture, reloaded })
    }

    /// Free video memory.
    ///
    /// A low system memory pass drops every unreferenced texture (and with it
    /// the file bytes it retains) and stops there. A video memory pass aims
    /// for `vmem_hyst` percent below the budget, also releasing textures
    /// that have not been drawn recently.
    pub fn collect(&mut self, device: &mut dyn GraphicsDevice, low_sysmem: bool) -> CollectStats {
        self.collect_with(device, low_sysmem, self.config.vmem_hyst)
    }

    fn collect_with(&mut self, device: &mut dyn GraphicsDevice, low_sysmem: bool, percent_to_free: u32) -> CollectStats {
        let utilized = self.pool.utilized_kb();
        if !low_sysmem && utilized < self.available_kb {
            log::debug!(
                "Updating texture gc available memory size: {}MB instead of {}MB",
                utilized / 1024,
                self.available_kb / 1024
            );
            self.available_kb = utilized;
        }
        let target = if low_sysmem {
            0
        } else {
            (u64::from(self.available_kb) * u64::from(100 - percent_to_free.min(100)) / 100) as u32
        };
        let stale = (!low_sysmem).then_some(self.config.collect_age_ms);
        let stats = self.pool.collect(target, stale, |entry| {
            if let Some(texture) = entry.device.take() {
                device.release_texture(texture);
            }
        });
        log::debug!(
            "Texture collection: {utilized} KB -> {} KB (target {target} KB, {stats:?})",
            self.pool.utilized_kb()
        );
        stats
    }

    /// Age textures and drop long-idle unreferenced ones while memory is tight
    pub fn update(&mut self, device: &mut dyn GraphicsDevice, dt_ms: u32) {
        if dt_ms == 0 || self.available_kb == 0 {
            return;
        }
        let usage_percent = u64::from(self.pool.utilized_kb()) * 100 / u64::from(self.available_kb);
        if usage_percent < u64::from(100 - self.config.vmem_hyst.min(100)) {
            return;
        }
        let erased = self.pool.expire_idle(dt_ms, self.config.idle_unload_age_ms, |entry| {
            if let Some(texture) = entry.device.take() {
                device.release_texture(texture);
            }
        });
        if erased > 0 {
            log::trace!("Released {erased} idle textures");
        }
    }

    /// Release every device allocation ahead of a device reset
    pub fn unload_textures(&mut self, device: &mut dyn GraphicsDevice) {
        self.pool.unload_all(|entry| {
            if let Some(texture) = entry.device.take() {
                device.release_texture(texture);
            }
        });
    }

    /// Erase every texture; used at shutdown
    pub fn clear(&mut self, device: &mut dyn GraphicsDevice) {
        self.pool.clear(|entry| {
            if let Some(texture) = entry.device.take() {
                device.release_texture(texture);
            }
        });
    }

    /// Video memory in use by resident textures
    pub fn utilized_kb(&self) -> u32 {
        self.pool.utilized_kb()
    }

    /// Current budget
    pub fn available_kb(&self) -> u32 {
        self.available_kb
    }

    /// Number of managed textures
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// True if no textures are managed
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_support::png_bytes;
    use crate::assets::MemoryLoader;
    use crate::backend::HeadlessDevice;
    use crate::core::FileConfig;

    fn setup(limit_kb: u32, files: &[(&str, u32)]) -> (HeadlessDevice, FileManager, TextureManager) {
        let loader = MemoryLoader::new();
        for (path, size) in files {
            loader.insert(*path, png_bytes(*size, *size, [255, 255, 255, 255]));
        }
        let device = HeadlessDevice::new().with_memory_limit_kb(limit_kb);
        let fm = FileManager::new(Box::new(loader), FileConfig::default());
        let tm = TextureManager::new(&device, TextureConfig::default(), true, Rc::new(FrameClock::new()));
        (device, fm, tm)
    }

    #[test]
    fn test_same_path_is_loaded_once() {
        let (mut device, mut fm, mut tm) = setup(4096, &[("a.png", 64), ("b.png", 64)]);
        let a = tm.load(&mut fm, "a.png", false).unwrap();
        let b = tm.load(&mut fm, "a.png", false).unwrap();
        assert_eq!(a, b);
        tm.bind(&mut device, &a).unwrap();
        tm.bind(&mut device, &b).unwrap();
        assert_eq!(tm.utilized_kb(), 16);
        assert_eq!(device.texture_count(), 1);

        let c = tm.load(&mut fm, "b.png", true).unwrap();
        assert_ne!(a, c);
        assert_eq!(tm.info(&c).unwrap().format, PixelFormat::Dxt3);
        tm.bind(&mut device, &c).unwrap();
        assert_eq!(tm.utilized_kb(), 20);
    }

    #[test]
    fn test_bind_loads_lazily_and_reports_reload() {
        let (mut device, mut fm, mut tm) = setup(4096, &[("a.png", 30)]);
        let a = tm.load(&mut fm, "a.png", false).unwrap();
        assert!(!tm.is_loaded(&a));
        let info = tm.info(&a).unwrap();
        assert_eq!((info.width, info.original_width), (32, 30));
        assert!(tm.bind(&mut device, &a).unwrap().reloaded);
        assert!(!tm.bind(&mut device, &a).unwrap().reloaded);
        tm.unload_textures(&mut device);
        assert_eq!(device.texture_count(), 0);
        assert!(tm.bind(&mut device, &a).unwrap().reloaded);
    }

    #[test]
    fn test_out_of_memory_collects_and_retries() {
        // 64x64 costs 16 KB; two fit in 40 KB
        let (mut device, mut fm, mut tm) = setup(40, &[("a.png", 64), ("b.png", 64), ("c.png", 64)]);
        let a = tm.load(&mut fm, "a.png", false).unwrap();
        tm.bind(&mut device, &a).unwrap();
        drop(a);
        let b = tm.load(&mut fm, "b.png", false).unwrap();
        tm.bind(&mut device, &b).unwrap();
        let c = tm.load(&mut fm, "c.png", false).unwrap();
        tm.bind(&mut device, &c).unwrap();
        assert_eq!(tm.len(), 2);
        assert_eq!(tm.utilized_kb(), 32);
        assert!(tm.is_loaded(&b) && tm.is_loaded(&c));
    }

    #[test]
    fn test_second_out_of_memory_is_an_error() {
        let (mut device, mut fm, mut tm) = setup(20, &[("a.png", 64), ("b.png", 64)]);
        let a = tm.load(&mut fm, "a.png", false).unwrap();
        tm.bind(&mut device, &a).unwrap();
        let b = tm.load(&mut fm, "b.png", false).unwrap();
        let err = tm.bind(&mut device, &b).unwrap_err();
        assert!(matches!(err, EngineError::BackendCallFailure { .. }));
        assert!(tm.is_loaded(&a));
    }

    #[test]
    fn test_low_sysmem_collect_drops_all_unreferenced() {
        let (mut device, mut fm, mut tm) = setup(4096, &[("a.png", 64), ("b.png", 64)]);
        let a = tm.load(&mut fm, "a.png", false).unwrap();
        let b = tm.load(&mut fm, "b.png", false).unwrap();
        tm.bind(&mut device, &a).unwrap();
        tm.bind(&mut device, &b).unwrap();
        drop(b);
        let stats = tm.collect(&mut device, true);
        assert_eq!(stats.erased, 1);
        assert_eq!(tm.len(), 1);
        assert_eq!(fm.purge_unreferenced(), 1);
        assert!(fm.is_cached("a.png"));
    }

    #[test]
    fn test_render_target_rounds_to_pow2_square() {
        let device = HeadlessDevice::new().with_backbuffer(800, 600, false);
        let mut tm = TextureManager::new(&device, TextureConfig::default(), true, Rc::new(FrameClock::new()));
        let rt = tm.create_render_target(&device);
        let info = tm.info(&rt).unwrap();
        assert_eq!((info.width, info.height), (1024, 1024));
        let dynamic = tm.create_dynamic(64, 64, true);
        assert_ne!(dynamic, tm.create_dynamic(64, 64, true));
        assert_eq!(texture_cost_kb(64, 64, true), 4);
    }

    #[test]
    fn test_cost_of_huge_textures_does_not_wrap() {
        assert_eq!(texture_cost_kb(32_768, 32_768, false), 4_194_304);
        assert_eq!(texture_cost_kb(65_536, 65_536, true), 4_194_304);
        assert_eq!(texture_cost_kb(u32::MAX, u32::MAX, false), u32::MAX);
    }

    #[test]
    fn test_update_only_under_pressure() {
        let (mut device, mut fm, mut tm) = setup(4096, &[("a.png", 64)]);
        let a = tm.load(&mut fm, "a.png", false).unwrap();
        tm.bind(&mut device, &a).unwrap();
        drop(a);
        // 16 KB of 4096 KB is far below the threshold
        tm.update(&mut device, 20_000);
        tm.update(&mut device, 20_000);
        assert_eq!(tm.len(), 1);

        // shrink the budget to the current usage
        tm.collect(&mut device, false);
        assert_eq!(tm.len(), 0);
    }
}
