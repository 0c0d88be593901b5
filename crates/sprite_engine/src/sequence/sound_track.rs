//! Sounds bound to animation frames

use crate::audio::{SoundId, SoundManager};
use crate::core::{EngineError, EngineResult};
use rand::rngs::StdRng;
use rand::Rng;

/// Sounds attached to frame indices of an animated sequence.
///
/// When playback moves past frames that carry sounds, one sound of each such
/// frame is picked at random and restarted.
#[derive(Debug, Clone)]
pub struct SoundTrack {
    frames: Vec<(i32, Vec<SoundId>)>,
    rng: StdRng,
}

impl SoundTrack {
    /// Track built from `(frame, sound)` pairs
    pub fn new(sounds: impl IntoIterator<Item = (i32, SoundId)>, rng: StdRng) -> Self {
        let mut track = Self { frames: Vec::new(), rng };
        for (frame, sound) in sounds {
            track.add_sound(frame, sound);
        }
        track
    }

    /// Attach a sound to a frame
    pub fn add_sound(&mut self, frame: i32, sound: SoundId) {
        match self.frames.iter_mut().find(|(f, _)| *f == frame) {
            Some((_, sounds)) => sounds.push(sound),
            None => self.frames.push((frame, vec![sound])),
        }
    }

    /// Detach a sound from a frame
    pub fn del_sound(&mut self, frame: i32, sound: SoundId) -> EngineResult<()> {
        let entry = self
            .frames
            .iter()
            .position(|(f, sounds)| *f == frame && sounds.contains(&sound))
            .ok_or_else(|| EngineError::invalid_argument(format!("no such sound on frame {frame}")))?;
        let sounds = &mut self.frames[entry].1;
        sounds.retain(|s| *s != sound);
        if sounds.is_empty() {
            self.frames.remove(entry);
        }
        Ok(())
    }

    /// Sounds attached to `frame`
    pub fn sounds_at(&self, frame: i32) -> &[SoundId] {
        self.frames
            .iter()
            .find(|(f, _)| *f == frame)
            .map_or(&[], |(_, sounds)| sounds.as_slice())
    }

    /// Every attached sound
    pub fn sounds(&self) -> impl Iterator<Item = SoundId> + '_ {
        self.frames.iter().flat_map(|(_, sounds)| sounds.iter().copied())
    }

    /// Rewind every attached sound that is not prolonged
    pub fn stop(&self, sounds: &mut SoundManager) -> EngineResult<()> {
        for id in self.sounds() {
            if sounds.contains(id) && !sounds.prolonged(id)? {
                sounds.rewind(id)?;
            }
        }
        Ok(())
    }

    /// Restart sounds for the frames playback moved past.
    ///
    /// Forward playback covers `previous..current`; reversed playback covers
    /// the frames from `previous` down to just above `current`. Either range
    /// wraps when the sequence looped around.
    pub fn trigger(
        &mut self,
        sounds: &mut SoundManager,
        previous: i32,
        current: i32,
        reversed: bool,
    ) -> EngineResult<Vec<SoundId>> {
        let mut started = Vec::new();
        if previous == current {
            return Ok(started);
        }
        let passed = |frame: i32| match (reversed, previous < current) {
            (false, true) => previous <= frame && frame < current,
            (false, false) => frame >= previous || frame < current,
            (true, false) => current < frame && frame <= previous,
            (true, true) => frame <= previous || frame > current,
        };
        for (frame, candidates) in &self.frames {
            if !passed(*frame) || candidates.is_empty() {
                continue;
            }
            let sound = candidates[self.rng.gen_range(0..candidates.len())];
            if sounds.contains(sound) {
                sounds.restart(sound)?;
                started.push(sound);
            }
        }
        Ok(started)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_support::wav_bytes;
    use crate::assets::{FileManager, MemoryLoader};
    use crate::audio::NullAudioBackend;
    use crate::core::{FileConfig, SoundConfig};
    use crate::foundation::math::Vec2;
    use crate::foundation::time::FrameClock;
    use crate::render::TransformStack;
    use rand::SeedableRng;
    use std::rc::Rc;

    fn sounds(count: usize) -> (SoundManager, Vec<SoundId>) {
        let loader = MemoryLoader::new().with_file("step.wav", wav_bytes(50_000));
        let mut fm = FileManager::new(Box::new(loader), FileConfig::default());
        let mut sm = SoundManager::new(
            Box::new(NullAudioBackend::new()),
            SoundConfig::default(),
            true,
            Vec2::new(512.0, 384.0),
            TransformStack::new(),
            Rc::new(FrameClock::new()),
        );
        let ids = (0..count).map(|_| sm.load(&mut fm, "step.wav").unwrap()).collect();
        (sm, ids)
    }

    fn track(pairs: &[(i32, SoundId)]) -> SoundTrack {
        SoundTrack::new(pairs.iter().copied(), StdRng::seed_from_u64(7))
    }

    #[test]
    fn test_sounds_group_by_frame() {
        let (_, ids) = sounds(3);
        let mut t = track(&[(2, ids[0]), (5, ids[1]), (2, ids[2])]);
        assert_eq!(t.sounds_at(2), &[ids[0], ids[2]]);
        t.del_sound(5, ids[1]).unwrap();
        assert!(t.sounds_at(5).is_empty());
        assert!(t.del_sound(5, ids[1]).is_err());
        assert_eq!(t.sounds().count(), 2);
    }

    #[test]
    fn test_forward_range_is_half_open() {
        let (mut sm, ids) = sounds(3);
        let mut t = track(&[(1, ids[0]), (3, ids[1]), (4, ids[2])]);
        let started = t.trigger(&mut sm, 1, 3, false).unwrap();
        assert_eq!(started, vec![ids[0]]);
        assert!(sm.is_playing(ids[0]).unwrap());
        assert!(!sm.is_playing(ids[1]).unwrap());
    }

    #[test]
    fn test_forward_wrap_covers_both_ends() {
        let (mut sm, ids) = sounds(3);
        let mut t = track(&[(0, ids[0]), (2, ids[1]), (4, ids[2])]);
        let started = t.trigger(&mut sm, 4, 1, false).unwrap();
        assert_eq!(started, vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_reversed_ranges() {
        let (mut sm, ids) = sounds(3);
        let mut t = track(&[(0, ids[0]), (2, ids[1]), (4, ids[2])]);
        assert_eq!(t.trigger(&mut sm, 4, 2, true).unwrap(), vec![ids[2]]);
        // wrapped from frame 0 back to the last frame
        assert_eq!(t.trigger(&mut sm, 0, 3, true).unwrap(), vec![ids[0], ids[2]]);
    }

    #[test]
    fn test_stop_spares_prolonged_sounds() {
        let (mut sm, ids) = sounds(2);
        let t = track(&[(0, ids[0]), (1, ids[1])]);
        sm.set_prolonged(ids[1], true).unwrap();
        sm.play(ids[0]).unwrap();
        sm.play(ids[1]).unwrap();
        t.stop(&mut sm).unwrap();
        assert!(!sm.is_playing(ids[0]).unwrap());
        assert!(sm.is_playing(ids[1]).unwrap());
    }
}
