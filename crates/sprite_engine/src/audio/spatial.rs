//! Screen-relative sound positioning
//!
//! Sounds are panned by their horizontal offset from the screen centre and
//! effects fade linearly with distance from it. Music ignores distance.

use crate::foundation::math::Vec2;

/// Horizontal offset that moves the pan by a full 100 units
pub const PAN_RANGE: f32 = 2048.0;
/// Distance at which an effect becomes inaudible
pub const FADE_DISTANCE: f32 = 4096.0;

/// Listener placed at the screen centre
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Listener {
    center: Vec2,
    sound_volume: f32,
    music_volume: f32,
}

impl Listener {
    /// Listener at `center` with both volume scales at 1
    pub fn new(center: Vec2) -> Self {
        Self {
            center,
            sound_volume: 1.0,
            music_volume: 1.0,
        }
    }

    /// Screen centre
    pub fn center(&self) -> Vec2 {
        self.center
    }

    /// Effects volume scale
    pub fn sound_volume(&self) -> f32 {
        self.sound_volume
    }

    /// Set the effects volume scale
    pub fn set_sound_volume(&mut self, volume: f32) {
        self.sound_volume = volume;
    }

    /// Music volume scale
    pub fn music_volume(&self) -> f32 {
        self.music_volume
    }

    /// Set the music volume scale
    pub fn set_music_volume(&mut self, volume: f32) {
        self.music_volume = volume;
    }

    /// Pan for a sound at `origin`, in `-100..=100`
    pub fn pan(&self, origin: Vec2, base_pan: i32) -> i32 {
        let dx = (origin.x - self.center.x) as i32;
        (base_pan + dx * 100 / PAN_RANGE as i32).clamp(-100, 100)
    }

    /// Volume for a sound at `origin`, in `0..=100`
    pub fn volume(&self, origin: Vec2, base_volume: i32, is_music: bool) -> i32 {
        let volume = if is_music {
            self.music_volume * base_volume as f32
        } else {
            let distance = (origin - self.center).norm();
            let falloff = (FADE_DISTANCE - distance) as i32;
            self.sound_volume * base_volume as f32 * falloff as f32 / FADE_DISTANCE
        };
        (volume as i32).clamp(0, 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_centered_effect_keeps_volume() {
        let listener = Listener::new(Vec2::new(512.0, 384.0));
        assert_eq!(listener.volume(Vec2::new(512.0, 384.0), 80, false), 80);
        assert_eq!(listener.pan(Vec2::new(512.0, 384.0), 10), 10);
    }

    #[test]
    fn test_pan_follows_horizontal_offset() {
        let listener = Listener::new(Vec2::new(512.0, 384.0));
        assert_eq!(listener.pan(Vec2::new(512.0 + 1024.0, 0.0), 0), 50);
        assert_eq!(listener.pan(Vec2::new(-10_000.0, 0.0), 0), -100);
    }

    #[test]
    fn test_effects_fade_but_music_does_not() {
        let mut listener = Listener::new(Vec2::new(512.0, 384.0));
        listener.set_music_volume(0.5);
        let far = Vec2::new(512.0 + 2048.0, 384.0);
        assert_eq!(listener.volume(far, 100, false), 50);
        assert_eq!(listener.volume(far, 100, true), 50);
        assert_eq!(listener.volume(Vec2::new(9000.0, 384.0), 100, false), 0);
    }
}
