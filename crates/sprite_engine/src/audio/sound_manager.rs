//! Sound manager
//!
//! Loads sound files, hands out [`SoundId`]s for individual playing
//! instances and spatializes them once per frame. Instances of the same file
//! share the decoded data and a master backend buffer; each instance plays
//! through its own duplicate of that buffer.
//!
//! Sounds that keep playing must be rendered every frame. A sound that is
//! playing but has not been rendered for `stale_after_ms` becomes *old*: it
//! is stopped and rewound, unless it is *prolonged*, in which case it only
//! stops looping and finishes naturally.

use super::backend::{AudioBackend, AudioBuffer};
use super::spatial::Listener;
use crate::assets::{FileManager, FileRef, LoadHint, WavHeader};
use crate::core::{EngineError, EngineResult, SoundConfig};
use crate::foundation::collections::{new_key_type, SlotMap};
use crate::foundation::math::{transform_point, translation, Mat3, Vec2};
use crate::foundation::time::FrameClock;
use crate::render::pool::{PoolHandle, ResourcePool};
use crate::render::transform::TransformStack;
use bitflags::bitflags;
use std::rc::Rc;

new_key_type! {
    /// Generation-checked id of a sound instance
    pub struct SoundId;
}

bitflags! {
    /// Playback behaviour flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SoundFlags: u32 {
        /// Restart at the end of the buffer
        const LOOPED = 1;
        /// Keep playing to the end when no longer rendered
        const PROLONGED = 2;
    }
}

/// Play cursor distance from either end of the buffer that counts as "at the end"
const END_TOLERANCE_BYTES: u32 = 20_000;

/// Decoded sound file shared by all its instances
#[derive(Debug)]
pub struct SoundData {
    path: String,
    header: WavHeader,
    _file: FileRef,
    master: Option<AudioBuffer>,
}

impl SoundData {
    /// Source path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Decoded format description
    pub fn header(&self) -> &WavHeader {
        &self.header
    }
}

#[derive(Debug)]
struct SoundInstance {
    data: PoolHandle<SoundData>,
    header: WavHeader,
    buffer: AudioBuffer,
    position: Vec2,
    transform: Mat3,
    flags: SoundFlags,
    is_playing: bool,
    is_over: bool,
    is_music: bool,
    volume: i32,
    pan: i32,
    priority: i32,
    timestamp: u32,
    force_no_loop: bool,
    is_old: bool,
}

impl SoundInstance {
    fn play(&mut self, backend: &mut dyn AudioBackend) -> EngineResult<()> {
        if self.is_playing || self.is_old {
            return Ok(());
        }
        self.is_playing = true;
        backend.play(self.buffer, self.priority, self.flags.contains(SoundFlags::LOOPED))?;
        Ok(())
    }

    fn stop(&mut self, backend: &mut dyn AudioBackend) -> EngineResult<()> {
        if !self.is_playing {
            return Ok(());
        }
        self.is_playing = false;
        backend.stop(self.buffer)?;
        Ok(())
    }

    fn rewind(&mut self, backend: &mut dyn AudioBackend) -> EngineResult<()> {
        self.stop(backend)?;
        backend.set_position(self.buffer, 0)?;
        Ok(())
    }

    fn process_end_of_buffer(&mut self, backend: &mut dyn AudioBackend) -> EngineResult<()> {
        if self.flags.contains(SoundFlags::LOOPED) && !self.force_no_loop {
            self.is_over = true;
            return Ok(());
        }
        let position = backend.position_bytes(self.buffer)?;
        let size = self.header.data_len;
        if position >= size.saturating_sub(END_TOLERANCE_BYTES) || position <= END_TOLERANCE_BYTES {
            self.rewind(backend)?;
            self.force_no_loop = false;
            self.is_over = true;
        }
        Ok(())
    }
}

/// Sound lifecycle and playback manager
pub struct SoundManager {
    backend: Box<dyn AudioBackend>,
    pool: ResourcePool<SoundData>,
    sounds: SlotMap<SoundId, SoundInstance>,
    queue: Vec<SoundId>,
    listener: Listener,
    transforms: TransformStack,
    clock: Rc<FrameClock>,
    config: SoundConfig,
    timestamp: u32,
}

impl std::fmt::Debug for SoundManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundManager")
            .field("sounds", &self.sounds.len())
            .field("files", &self.pool.len())
            .field("queued", &self.queue.len())
            .field("timestamp", &self.timestamp)
            .finish()
    }
}

impl SoundManager {
    /// Create a manager playing through `backend`; sounds are spatialized
    /// around `center`
    pub fn new(
        backend: Box<dyn AudioBackend>,
        config: SoundConfig,
        caching: bool,
        center: Vec2,
        transforms: TransformStack,
        clock: Rc<FrameClock>,
    ) -> Self {
        log::info!("Sound manager created: {config:?}");
        let mut listener = Listener::new(center);
        listener.set_sound_volume(config.sound_volume);
        listener.set_music_volume(config.music_volume);
        Self {
            backend,
            pool: ResourcePool::new(caching),
            sounds: SlotMap::with_key(),
            queue: Vec::new(),
            listener,
            transforms,
            clock,
            config,
            timestamp: 0,
        }
    }

    /// Load a sound effect
    pub fn load(&mut self, files: &mut FileManager, path: &str) -> EngineResult<SoundId> {
        self.load_instance(files, path, false)
    }

    /// Load a music track; music ignores distance attenuation
    pub fn load_music(&mut self, files: &mut FileManager, path: &str) -> EngineResult<SoundId> {
        self.load_instance(files, path, true)
    }

    fn load_instance(&mut self, files: &mut FileManager, path: &str, is_music: bool) -> EngineResult<SoundId> {
        let data = match self.pool.lookup(path) {
            Some(data) => data,
            None => {
                let _pause = self.clock.pause();
                let file = files.load(path, LoadHint::empty())?;
                let header = WavHeader::parse(&file)?;
                let master = self.backend.create_buffer(&header, header.samples(&file))?;
                let cost = header.data_len / 1024;
                let data = self.pool.insert(
                    Some(path.to_string()),
                    SoundData {
                        path: path.to_string(),
                        header,
                        _file: file,
                        master: Some(master),
                    },
                    cost,
                );
                self.pool.set_resident(&data, true);
                log::trace!("Sound {path} loaded ({} bytes)", header.data_len);
                data
            }
        };

        let (master, header) = self
            .pool
            .get(&data)
            .and_then(|d| d.master.map(|m| (m, d.header)))
            .ok_or(EngineError::InvalidHandle("sound data"))?;
        let buffer = self.backend.duplicate_buffer(master)?;
        Ok(self.sounds.insert(SoundInstance {
            data,
            header,
            buffer,
            position: Vec2::zeros(),
            transform: Mat3::identity(),
            flags: SoundFlags::empty(),
            is_playing: false,
            is_over: false,
            is_music,
            volume: 100,
            pan: 0,
            priority: 0,
            timestamp: self.timestamp,
            force_no_loop: false,
            is_old: false,
        }))
    }

    /// Release an instance; the shared data goes when its last instance does
    pub fn release(&mut self, id: SoundId) -> EngineResult<()> {
        let instance = self.sounds.remove(id).ok_or(EngineError::InvalidHandle("sound"))?;
        self.backend.release_buffer(instance.buffer);
        drop(instance);
        self.queue.retain(|queued| *queued != id);

        let backend = &mut self.backend;
        self.pool.collect(0, None, |data| {
            if let Some(master) = data.master.take() {
                backend.release_buffer(master);
            }
        });
        Ok(())
    }

    /// True while `id` refers to a live instance
    pub fn contains(&self, id: SoundId) -> bool {
        self.sounds.contains_key(id)
    }

    fn instance(&self, id: SoundId) -> EngineResult<&SoundInstance> {
        self.sounds.get(id).ok_or(EngineError::InvalidHandle("sound"))
    }

    fn instance_mut(&mut self, id: SoundId) -> EngineResult<&mut SoundInstance> {
        self.sounds.get_mut(id).ok_or(EngineError::InvalidHandle("sound"))
    }

    /// Keep a sound alive for this frame.
    ///
    /// A playing sound captures the active world transform and joins the
    /// render queue. Rendering a stopped sound makes it playable again if it
    /// had gone stale.
    pub fn render(&mut self, id: SoundId, _dt: f32) -> EngineResult<()> {
        let world = self.transforms.top();
        let sound = self.instance_mut(id)?;
        if !sound.is_playing {
            sound.is_old = false;
            return Ok(());
        }
        sound.transform = world * translation(sound.position);
        self.queue.push(id);
        Ok(())
    }

    /// Refresh queued sounds, spatialize every sound and handle stale and
    /// finished ones
    pub fn update(&mut self, dt_ms: u32) -> EngineResult<()> {
        self.timestamp = self.timestamp.wrapping_add(dt_ms);
        let now = self.timestamp;

        for id in self.queue.drain(..) {
            if let Some(sound) = self.sounds.get_mut(id) {
                sound.is_old = false;
                sound.timestamp = now;
            }
        }

        let backend = self.backend.as_mut();
        for (_, sound) in self.sounds.iter_mut() {
            sound.is_over = false;

            let origin = transform_point(&sound.transform, Vec2::zeros());
            backend.set_pan(sound.buffer, self.listener.pan(origin, sound.pan));
            backend.set_volume(sound.buffer, self.listener.volume(origin, sound.volume, sound.is_music));

            let stale_at = sound
                .timestamp
                .wrapping_add(dt_ms)
                .wrapping_add(self.config.stale_after_ms);
            if sound.is_playing && stale_at < now {
                sound.is_old = true;
                if sound.flags.contains(SoundFlags::PROLONGED) {
                    sound.force_no_loop = true;
                } else {
                    log::trace!("Stopping stale sound {}", sound.data_path(&self.pool));
                    sound.rewind(backend)?;
                }
            }

            if backend.poll_end_of_buffer(sound.buffer) {
                sound.process_end_of_buffer(backend)?;
            }
        }
        Ok(())
    }

    /// Drop queued sounds without refreshing them
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Number of sounds rendered since the last update
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Milliseconds of sound time since creation
    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    /// Start or resume playback; ignored for stale sounds
    pub fn play(&mut self, id: SoundId) -> EngineResult<()> {
        let sound = self.sounds.get_mut(id).ok_or(EngineError::InvalidHandle("sound"))?;
        sound.play(self.backend.as_mut())
    }

    /// Pause playback
    pub fn stop(&mut self, id: SoundId) -> EngineResult<()> {
        let sound = self.sounds.get_mut(id).ok_or(EngineError::InvalidHandle("sound"))?;
        sound.stop(self.backend.as_mut())
    }

    /// Stop and move the cursor back to the start
    pub fn rewind(&mut self, id: SoundId) -> EngineResult<()> {
        let sound = self.sounds.get_mut(id).ok_or(EngineError::InvalidHandle("sound"))?;
        sound.rewind(self.backend.as_mut())
    }

    /// Make a sound fresh again and play it from the start
    pub fn restart(&mut self, id: SoundId) -> EngineResult<()> {
        let now = self.timestamp;
        let sound = self.sounds.get_mut(id).ok_or(EngineError::InvalidHandle("sound"))?;
        let backend = self.backend.as_mut();
        sound.is_old = false;
        sound.timestamp = now;
        sound.rewind(backend)?;
        sound.play(backend)
    }

    /// True while playing
    pub fn is_playing(&self, id: SoundId) -> EngineResult<bool> {
        Ok(self.instance(id)?.is_playing)
    }

    /// True during the frame after the sound reached its end
    pub fn is_over(&self, id: SoundId) -> EngineResult<bool> {
        Ok(self.instance(id)?.is_over)
    }

    /// True if the sound went stale
    pub fn is_old(&self, id: SoundId) -> EngineResult<bool> {
        Ok(self.instance(id)?.is_old)
    }

    /// Looping flag
    pub fn looped(&self, id: SoundId) -> EngineResult<bool> {
        Ok(self.instance(id)?.flags.contains(SoundFlags::LOOPED))
    }

    /// Change looping; a playing sound is restarted in the new mode
    pub fn set_looped(&mut self, id: SoundId, looped: bool) -> EngineResult<()> {
        let sound = self.sounds.get_mut(id).ok_or(EngineError::InvalidHandle("sound"))?;
        let backend = self.backend.as_mut();
        let was_playing = sound.is_playing;
        sound.stop(backend)?;
        sound.flags.set(SoundFlags::LOOPED, looped);
        if was_playing {
            sound.play(backend)?;
        }
        Ok(())
    }

    /// Prolonged flag
    pub fn prolonged(&self, id: SoundId) -> EngineResult<bool> {
        Ok(self.instance(id)?.flags.contains(SoundFlags::PROLONGED))
    }

    /// Set the prolonged flag
    pub fn set_prolonged(&mut self, id: SoundId, prolonged: bool) -> EngineResult<()> {
        self.instance_mut(id)?.flags.set(SoundFlags::PROLONGED, prolonged);
        Ok(())
    }

    /// Position relative to the owner
    pub fn position(&self, id: SoundId) -> EngineResult<Vec2> {
        Ok(self.instance(id)?.position)
    }

    /// Set the position relative to the owner
    pub fn set_position(&mut self, id: SoundId, position: Vec2) -> EngineResult<()> {
        self.instance_mut(id)?.position = position;
        Ok(())
    }

    /// Base volume, `0..=100`
    pub fn volume(&self, id: SoundId) -> EngineResult<i32> {
        Ok(self.instance(id)?.volume)
    }

    /// Set the base volume; applied on the next update
    pub fn set_volume(&mut self, id: SoundId, volume: i32) -> EngineResult<()> {
        self.instance_mut(id)?.volume = volume.clamp(0, 100);
        Ok(())
    }

    /// Base pan, `-100..=100`
    pub fn pan(&self, id: SoundId) -> EngineResult<i32> {
        Ok(self.instance(id)?.pan)
    }

    /// Set the base pan; applied on the next update
    pub fn set_pan(&mut self, id: SoundId, pan: i32) -> EngineResult<()> {
        self.instance_mut(id)?.pan = pan.clamp(-100, 100);
        Ok(())
    }

    /// Playback priority
    pub fn priority(&self, id: SoundId) -> EngineResult<i32> {
        Ok(self.instance(id)?.priority)
    }

    /// Set the playback priority used on the next play
    pub fn set_priority(&mut self, id: SoundId, priority: i32) -> EngineResult<()> {
        self.instance_mut(id)?.priority = priority;
        Ok(())
    }

    /// Play cursor in seconds
    pub fn play_position_secs(&self, id: SoundId) -> EngineResult<f32> {
        let sound = self.instance(id)?;
        if sound.header.avg_bytes_per_sec == 0 {
            return Ok(0.0);
        }
        let bytes = self.backend.position_bytes(sound.buffer)?;
        Ok(bytes as f32 / sound.header.avg_bytes_per_sec as f32)
    }

    /// Effects volume scale
    pub fn sound_volume(&self) -> f32 {
        self.listener.sound_volume()
    }

    /// Set the effects volume scale
    pub fn set_sound_volume(&mut self, volume: f32) {
        self.listener.set_sound_volume(volume);
    }

    /// Music volume scale
    pub fn music_volume(&self) -> f32 {
        self.listener.music_volume()
    }

    /// Set the music volume scale
    pub fn set_music_volume(&mut self, volume: f32) {
        self.listener.set_music_volume(volume);
    }

    /// Number of live instances
    pub fn len(&self) -> usize {
        self.sounds.len()
    }

    /// True if no instances are live
    pub fn is_empty(&self) -> bool {
        self.sounds.is_empty()
    }

    /// Number of distinct loaded files
    pub fn file_count(&self) -> usize {
        self.pool.len()
    }

    /// Backend buffer of an instance
    pub fn buffer(&self, id: SoundId) -> EngineResult<AudioBuffer> {
        Ok(self.instance(id)?.buffer)
    }

    /// Release every instance and buffer; used at shutdown
    pub fn clear(&mut self) {
        for (_, sound) in self.sounds.drain() {
            self.backend.release_buffer(sound.buffer);
        }
        self.queue.clear();
        let backend = &mut self.backend;
        self.pool.clear(|data| {
            if let Some(master) = data.master.take() {
                backend.release_buffer(master);
            }
        });
    }
}

impl SoundInstance {
    fn data_path<'a>(&self, pool: &'a ResourcePool<SoundData>) -> &'a str {
        pool.get(&self.data).map_or("<released>", SoundData::path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_support::wav_bytes;
    use crate::assets::MemoryLoader;
    use crate::audio::backend::NullAudioBackend;
    use crate::core::FileConfig;

    fn setup(config: FileConfig) -> (NullAudioBackend, FileManager, SoundManager, TransformStack) {
        let loader = MemoryLoader::new()
            .with_file("boom.wav", wav_bytes(100_000))
            .with_file("theme.wav", wav_bytes(200_000));
        let backend = NullAudioBackend::new();
        let transforms = TransformStack::new();
        let caching = !config.disable_file_cache;
        let fm = FileManager::new(Box::new(loader), config);
        let sm = SoundManager::new(
            Box::new(backend.clone()),
            SoundConfig::default(),
            caching,
            Vec2::new(512.0, 384.0),
            transforms.clone(),
            Rc::new(FrameClock::new()),
        );
        (backend, fm, sm, transforms)
    }

    #[test]
    fn test_same_path_shares_data_but_not_buffers() {
        let (backend, mut fm, mut sm, _) = setup(FileConfig::default());
        let a = sm.load(&mut fm, "boom.wav").unwrap();
        let b = sm.load(&mut fm, "boom.wav").unwrap();
        assert_ne!(a, b);
        assert_eq!(sm.file_count(), 1);
        // master plus one duplicate per instance
        assert_eq!(backend.buffer_count(), 3);

        sm.release(a).unwrap();
        assert_eq!(sm.file_count(), 1);
        sm.release(b).unwrap();
        assert_eq!(sm.file_count(), 0);
        assert_eq!(backend.buffer_count(), 0);
        assert!(matches!(sm.play(a), Err(EngineError::InvalidHandle(_))));
    }

    #[test]
    fn test_cache_disabled_loads_separately() {
        let config = FileConfig {
            disable_file_cache: true,
            ..FileConfig::default()
        };
        let (_, mut fm, mut sm, _) = setup(config);
        sm.load(&mut fm, "boom.wav").unwrap();
        sm.load(&mut fm, "boom.wav").unwrap();
        assert_eq!(sm.file_count(), 2);
    }

    #[test]
    fn test_unrendered_sound_goes_stale_and_rewinds() {
        let (backend, mut fm, mut sm, _) = setup(FileConfig::default());
        let id = sm.load(&mut fm, "boom.wav").unwrap();
        sm.play(id).unwrap();
        sm.render(id, 0.016).unwrap();
        sm.update(16).unwrap();
        assert!(sm.is_playing(id).unwrap());

        for _ in 0..20 {
            sm.update(16).unwrap();
        }
        assert!(!sm.is_playing(id).unwrap());
        assert!(sm.is_old(id).unwrap());
        assert_eq!(backend.position_bytes(sm.buffer(id).unwrap()).unwrap(), 0);

        // stale sounds refuse to play until rendered again
        sm.play(id).unwrap();
        assert!(!sm.is_playing(id).unwrap());
        sm.render(id, 0.016).unwrap();
        sm.play(id).unwrap();
        assert!(sm.is_playing(id).unwrap());
    }

    #[test]
    fn test_prolonged_sound_stops_looping_when_stale() {
        let (backend, mut fm, mut sm, _) = setup(FileConfig::default());
        let id = sm.load(&mut fm, "boom.wav").unwrap();
        sm.set_prolonged(id, true).unwrap();
        sm.set_looped(id, true).unwrap();
        sm.play(id).unwrap();
        for _ in 0..30 {
            sm.update(16).unwrap();
        }
        assert!(sm.is_old(id).unwrap());
        assert!(sm.is_playing(id).unwrap());

        // reaching the end now rewinds instead of looping
        backend.advance(600);
        sm.update(16).unwrap();
        assert!(!sm.is_playing(id).unwrap());
        assert!(sm.is_over(id).unwrap());
        sm.update(16).unwrap();
        assert!(!sm.is_over(id).unwrap());
    }

    #[test]
    fn test_looped_sound_reports_over_and_keeps_playing() {
        let (backend, mut fm, mut sm, _) = setup(FileConfig::default());
        let id = sm.load(&mut fm, "boom.wav").unwrap();
        sm.set_looped(id, true).unwrap();
        sm.play(id).unwrap();
        assert!(backend.is_looping(sm.buffer(id).unwrap()));
        backend.advance(600);
        sm.render(id, 0.016).unwrap();
        sm.update(16).unwrap();
        assert!(sm.is_over(id).unwrap());
        assert!(sm.is_playing(id).unwrap());
    }

    #[test]
    fn test_spatialization_uses_world_transform() {
        let (backend, mut fm, mut sm, transforms) = setup(FileConfig::default());
        let effect = sm.load(&mut fm, "boom.wav").unwrap();
        let music = sm.load_music(&mut fm, "theme.wav").unwrap();
        sm.set_music_volume(0.5);
        sm.set_position(effect, Vec2::new(1024.0, 0.0)).unwrap();
        sm.play(effect).unwrap();
        sm.play(music).unwrap();
        {
            let _guard = transforms.push(&translation(Vec2::new(512.0, 384.0)));
            sm.render(effect, 0.016).unwrap();
            sm.render(music, 0.016).unwrap();
        }
        assert_eq!(sm.queue_len(), 2);
        sm.update(16).unwrap();
        assert_eq!(sm.queue_len(), 0);

        let effect_buffer = sm.buffer(effect).unwrap();
        assert_eq!(backend.pan(effect_buffer), Some(50));
        assert_eq!(backend.volume(effect_buffer), Some(75));
        assert_eq!(backend.volume(sm.buffer(music).unwrap()), Some(50));
    }

    #[test]
    fn test_play_position_in_seconds() {
        let (backend, mut fm, mut sm, _) = setup(FileConfig::default());
        let id = sm.load(&mut fm, "theme.wav").unwrap();
        sm.play(id).unwrap();
        backend.advance(500);
        approx::assert_relative_eq!(sm.play_position_secs(id).unwrap(), 0.5, epsilon = 0.01);
    }
}
