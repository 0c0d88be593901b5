//! Asset loading
//!
//! The [`FileManager`] is the single entry point for file contents. It reads
//! through a [`ResourceLoader`], runs the filter that matches the file
//! extension, and caches results by path so textures and sounds that share a
//! file share its bytes.

pub mod dds;
pub mod filters;
pub mod loaders;
pub mod wav;

pub use dds::{DdsHeader, DDS_HEADER_SIZE};
pub use filters::{FileFilter, PngFilter, WavFilter};
pub use loaders::{DirectoryLoader, MemoryLoader};
pub use wav::WavHeader;

use crate::core::{EngineError, EngineResult, FileConfig};
use std::collections::HashMap;
use std::rc::Rc;

bitflags::bitflags! {
    /// Hints passed along with a load request
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LoadHint: u32 {
        /// Transcode images into a block-compressed format
        const COMPRESSED_TEXTURE = 1;
        /// Do not persist the transcoded container next to the source
        const DONT_SAVE_DDS = 2;
    }
}

/// Shared, immutable file contents
pub type FileRef = Rc<[u8]>;

/// Byte source for engine assets
pub trait ResourceLoader {
    /// Raw contents of `path`; a missing file is [`EngineError::ResourceNotFound`]
    fn read(&self, path: &str) -> EngineResult<Vec<u8>>;

    /// Store a transcoded file for later runs
    fn persist(&self, _path: &str, _bytes: &[u8]) -> EngineResult<()> {
        Ok(())
    }
}

/// Physical memory figures in megabytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryStatus {
    /// Installed memory
    pub total_mb: u32,
    /// Memory currently available
    pub available_mb: u32,
}

/// Source of [`MemoryStatus`] readings
pub trait SystemMemory {
    /// Current memory status
    fn status(&self) -> MemoryStatus;
}

impl<F: Fn() -> MemoryStatus> SystemMemory for F {
    fn status(&self) -> MemoryStatus {
        self()
    }
}

/// Reads `/proc/meminfo`; reports plenty of memory where that file is absent
#[derive(Debug, Default, Clone, Copy)]
pub struct MemInfo;

impl SystemMemory for MemInfo {
    fn status(&self) -> MemoryStatus {
        let plenty = MemoryStatus {
            total_mb: u32::MAX,
            available_mb: u32::MAX,
        };
        let Ok(text) = std::fs::read_to_string("/proc/meminfo") else {
            return plenty;
        };
        let field = |name: &str| {
            text.lines()
                .find(|line| line.starts_with(name))
                .and_then(|line| line.split_whitespace().nth(1))
                .and_then(|kb| kb.parse::<u64>().ok())
                .map(|kb| (kb / 1024) as u32)
        };
        match (field("MemTotal:"), field("MemAvailable:")) {
            (Some(total_mb), Some(available_mb)) => MemoryStatus { total_mb, available_mb },
            _ => plenty,
        }
    }
}

/// Cached, filtered file access
pub struct FileManager {
    loader: Box<dyn ResourceLoader>,
    filters: Vec<Box<dyn FileFilter>>,
    files: HashMap<String, FileRef>,
    config: FileConfig,
    timer_ms: u32,
}

impl FileManager {
    /// File manager with the PNG and WAV filters installed
    pub fn new(loader: Box<dyn ResourceLoader>, config: FileConfig) -> Self {
        log::info!("File manager created: {config:?}");
        Self {
            loader,
            filters: vec![Box::new(PngFilter), Box::new(WavFilter)],
            files: HashMap::new(),
            config,
            timer_ms: 0,
        }
    }

    /// Install an additional filter; earlier filters win on overlap
    pub fn add_filter(&mut self, filter: Box<dyn FileFilter>) {
        self.filters.push(filter);
    }

    /// True when load caching is disabled
    pub fn cache_disabled(&self) -> bool {
        self.config.disable_file_cache
    }

    /// Load a file, reusing a cached copy when caching is enabled.
    ///
    /// Falls back to [`FileManager::direct_load`] when the filtered load
    /// cannot find or convert the file.
    pub fn load(&mut self, path: &str, hint: LoadHint) -> EngineResult<FileRef> {
        if !self.config.disable_file_cache {
            if let Some(file) = self.files.get(path) {
                return Ok(file.clone());
            }
        }

        match self.load_filtered(path, hint) {
            Ok(bytes) => {
                let file: FileRef = bytes.into();
                if !self.config.disable_file_cache {
                    self.files.insert(path.to_string(), file.clone());
                }
                Ok(file)
            }
            Err(EngineError::ResourceNotFound(_)) => {
                log::warn!("Filtered load of {path} failed, loading directly");
                self.direct_load(path)
            }
            Err(err) => Err(err),
        }
    }

    /// Load a file bypassing the cache and any persisted transcode
    pub fn direct_load(&self, path: &str) -> EngineResult<FileRef> {
        let bytes = self.loader.read(path)?;
        let bytes = self.apply_filter(path, bytes, LoadHint::DONT_SAVE_DDS)?;
        Ok(bytes.into())
    }

    /// Write a file through the loader and drop any stale cached copy
    pub fn save(&mut self, path: &str, bytes: &[u8]) -> EngineResult<()> {
        self.loader.persist(path, bytes)?;
        self.files.remove(path);
        log::trace!("Saved {path} ({} bytes)", bytes.len());
        Ok(())
    }

    fn find_filter(&self, path: &str) -> Option<&dyn FileFilter> {
        let lower = path.to_lowercase();
        self.filters.iter().find(|f| f.matches(&lower)).map(|f| f.as_ref())
    }

    fn apply_filter(&self, path: &str, bytes: Vec<u8>, hint: LoadHint) -> EngineResult<Vec<u8>> {
        match self.find_filter(path) {
            Some(filter) => filter.apply(bytes, hint).map_err(|err| {
                log::error!("{err}");
                EngineError::ResourceNotFound(path.to_string())
            }),
            None => Ok(bytes),
        }
    }

    fn load_filtered(&self, path: &str, hint: LoadHint) -> EngineResult<Vec<u8>> {
        let cached_path = self.find_filter(path).and_then(|f| f.cached_path(path));
        if let Some(cached) = &cached_path {
            if let Ok(bytes) = self.loader.read(cached) {
                log::trace!("Loaded {cached} in place of {path}");
                return Ok(bytes);
            }
        }

        let bytes = self.loader.read(path)?;
        let bytes = self.apply_filter(path, bytes, hint)?;
        if let Some(cached) = &cached_path {
            if !hint.contains(LoadHint::DONT_SAVE_DDS) {
                if let Err(err) = self.loader.persist(cached, &bytes) {
                    log::warn!("Saving {cached} failed: {err}");
                }
            }
        }
        log::trace!("Loaded {path} ({} bytes)", bytes.len());
        Ok(bytes)
    }

    /// Advance the memory check timer.
    ///
    /// Returns true every check interval when free system memory is below the
    /// threshold; the caller should then release what it can and call
    /// [`FileManager::purge_unreferenced`].
    pub fn update(&mut self, dt_ms: u32, memory: MemoryStatus) -> bool {
        self.timer_ms = self.timer_ms.saturating_add(dt_ms);
        if self.timer_ms < self.config.check_interval_ms {
            return false;
        }
        self.timer_ms = 0;

        let threshold = if self.config.free_sysmem_threshold_mb > 0 {
            self.config.free_sysmem_threshold_mb
        } else {
            memory.total_mb / 7
        };
        memory.available_mb <= threshold
    }

    /// Drop cached files nobody else holds; returns the number dropped
    pub fn purge_unreferenced(&mut self) -> usize {
        let before = self.files.len();
        self.files.retain(|_, file| Rc::strong_count(file) > 1);
        let freed = before - self.files.len();
        log::debug!("Purged {freed} cached files");
        freed
    }

    /// Number of cached files
    pub fn cached_count(&self) -> usize {
        self.files.len()
    }

    /// True if `path` is cached
    pub fn is_cached(&self, path: &str) -> bool {
        self.files.contains_key(path)
    }
}

impl std::fmt::Debug for FileManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileManager")
            .field("cached", &self.files.len())
            .field("filters", &self.filters.len())
            .field("config", &self.config)
            .finish()
    }
}
