//! Frame playback state machine

use bitflags::bitflags;

bitflags! {
    /// Playback and presentation flags of a sequence
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct SequenceFlags: u32 {
        /// Wrap around instead of stopping at the end
        const LOOPED = 1;
        /// Play from the last frame towards the first
        const REVERSED = 2;
        /// Mirror along the horizontal axis
        const VERTICAL_FLIP = 4;
        /// Mirror along the vertical axis
        const HORIZONTAL_FLIP = 8;
    }
}

/// Frame counter, rate and flags of a sequence.
///
/// [`Playback::advance`] steps one frame at a time until the elapsed time is
/// consumed, so a long frame visits every frame in between. Reaching the end
/// sets `is_over` until the next advance; a non-looped sequence also stops
/// on its boundary frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Playback {
    /// Frames per second
    pub fps: i32,
    /// Current frame index
    pub current_frame: i32,
    /// Number of frames
    pub frame_count: i32,
    /// Playback flags
    pub flags: SequenceFlags,
    /// Advancing frames
    pub is_playing: bool,
    /// Passed the last frame (first when reversed) during the last advance
    pub is_over: bool,
    time_left: f32,
}

impl Playback {
    /// Single-frame sequence that never advances
    pub fn still() -> Self {
        Self {
            fps: 1,
            current_frame: 0,
            frame_count: 1,
            flags: SequenceFlags::empty(),
            is_playing: false,
            is_over: false,
            time_left: 0.0,
        }
    }

    /// Animation of `frame_count` frames, playing from frame 0
    pub fn animated(frame_count: usize) -> Self {
        Self {
            frame_count: frame_count as i32,
            is_playing: true,
            ..Self::still()
        }
    }

    /// Time left on the current frame in seconds
    pub fn time_left(&self) -> f32 {
        self.time_left
    }

    /// Consume `dt` seconds of playback
    pub fn advance(&mut self, dt: f32) {
        self.is_over = false;
        if !self.is_playing || self.frame_count <= 0 || self.fps <= 0 {
            return;
        }
        let frame_time = 1.0 / self.fps as f32;
        let reversed = self.flags.contains(SequenceFlags::REVERSED);
        let looped = self.flags.contains(SequenceFlags::LOOPED);

        self.time_left -= dt;
        while self.time_left < 0.0 {
            let (next, past_end, wrap_to, clamp_to) = if reversed {
                let next = self.current_frame - 1;
                (next, next < 0, self.frame_count - 1, 0)
            } else {
                let next = self.current_frame + 1;
                (next, next >= self.frame_count, 0, self.frame_count - 1)
            };
            self.current_frame = next;
            if past_end {
                self.is_over = true;
                if looped {
                    self.current_frame = wrap_to;
                } else {
                    self.current_frame = clamp_to;
                    self.is_playing = false;
                    self.time_left = 0.0;
                    break;
                }
            }
            self.time_left += frame_time;
        }
    }

    /// Jump to `frame`, counted from the end when reversed, and resume playback
    pub fn set_frame(&mut self, frame: i32) {
        let mut frame = frame.max(0);
        if frame >= self.frame_count {
            frame = self.frame_count - 1;
        }
        if self.flags.contains(SequenceFlags::REVERSED) {
            frame = self.frame_count - (frame + 1);
        }
        self.is_over = false;
        self.is_playing = true;
        self.current_frame = frame;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playback(frames: usize, fps: i32, flags: SequenceFlags) -> Playback {
        let mut p = Playback::animated(frames);
        p.fps = fps;
        p.flags = flags;
        p
    }

    #[test]
    fn test_advances_one_frame_per_period() {
        let mut p = playback(4, 4, SequenceFlags::LOOPED);
        p.advance(0.125);
        assert_eq!(p.current_frame, 1);
        p.advance(0.125);
        assert_eq!(p.current_frame, 1);
        p.advance(0.25);
        assert_eq!(p.current_frame, 2);
    }

    #[test]
    fn test_non_looped_stops_on_last_frame() {
        let mut p = playback(3, 4, SequenceFlags::empty());
        p.advance(1.0);
        assert_eq!(p.current_frame, 2);
        assert!(p.is_over);
        assert!(!p.is_playing);
        p.advance(0.25);
        assert!(!p.is_over);
        assert_eq!(p.current_frame, 2);
    }

    #[test]
    fn test_reversed_looped_wraps_to_last_frame() {
        let mut p = playback(3, 4, SequenceFlags::LOOPED | SequenceFlags::REVERSED);
        p.advance(0.125);
        assert_eq!(p.current_frame, 2);
        assert!(p.is_over);
        assert!(p.is_playing);
    }

    #[test]
    fn test_step_granularity_does_not_change_outcome() {
        for flags in [SequenceFlags::LOOPED, SequenceFlags::empty()] {
            let mut coarse = playback(3, 4, flags);
            coarse.advance(0.625);

            let mut fine = playback(3, 4, flags);
            for _ in 0..5 {
                fine.advance(0.125);
            }
            assert_eq!(coarse.current_frame, fine.current_frame, "{flags:?}");
            assert_eq!(coarse.is_over, fine.is_over, "{flags:?}");
            assert_eq!(coarse.is_playing, fine.is_playing, "{flags:?}");
        }
    }

    #[test]
    fn test_set_frame_clamps_and_mirrors() {
        let mut p = playback(5, 10, SequenceFlags::empty());
        p.is_playing = false;
        p.set_frame(9);
        assert_eq!(p.current_frame, 4);
        assert!(p.is_playing);
        p.set_frame(-3);
        assert_eq!(p.current_frame, 0);

        p.flags = SequenceFlags::REVERSED;
        p.set_frame(1);
        assert_eq!(p.current_frame, 3);
    }

    #[test]
    fn test_zero_fps_never_advances() {
        let mut p = playback(3, 0, SequenceFlags::LOOPED);
        p.advance(10.0);
        assert_eq!(p.current_frame, 0);
    }
}
