//! Frame timing

use std::cell::Cell;
use std::time::Instant;

/// Frame clock measuring milliseconds between ticks.
///
/// Slow operations (texture and sound loads) wrap themselves in a
/// [`PauseGuard`]; the time spent inside the bracket is not reported by the
/// next [`FrameClock::tick`], so animation and movement do not jump after a
/// long load. Interior mutability lets managers share the clock through an
/// `Rc` while the frame driver keeps ticking it.
#[derive(Debug)]
pub struct FrameClock {
    last_tick: Cell<Instant>,
    pause_depth: Cell<u32>,
    total_ms: Cell<u64>,
    frame_count: Cell<u64>,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Create a new clock starting now
    pub fn new() -> Self {
        Self {
            last_tick: Cell::new(Instant::now()),
            pause_depth: Cell::new(0),
            total_ms: Cell::new(0),
            frame_count: Cell::new(0),
        }
    }

    /// Milliseconds elapsed since the previous tick (zero while paused)
    pub fn tick(&self) -> u32 {
        if self.is_paused() {
            return 0;
        }
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_tick.get());
        self.last_tick.set(now);
        let ms = u32::try_from(elapsed.as_millis()).unwrap_or(u32::MAX);
        self.total_ms.set(self.total_ms.get() + u64::from(ms));
        self.frame_count.set(self.frame_count.get() + 1);
        ms
    }

    /// Suspend time accounting until the returned guard is dropped.
    ///
    /// Brackets nest; accounting resumes when the outermost guard goes away.
    pub fn pause(&self) -> PauseGuard<'_> {
        self.pause_depth.set(self.pause_depth.get() + 1);
        PauseGuard { clock: self }
    }

    /// True while at least one pause bracket is open
    pub fn is_paused(&self) -> bool {
        self.pause_depth.get() > 0
    }

    /// Restart measurement from the current instant
    pub fn reset(&self) {
        self.last_tick.set(Instant::now());
    }

    /// Total accounted milliseconds since creation
    pub fn total_ms(&self) -> u64 {
        self.total_ms.get()
    }

    /// Number of ticks taken so far
    pub fn frame_count(&self) -> u64 {
        self.frame_count.get()
    }

    fn resume(&self) {
        let depth = self.pause_depth.get().saturating_sub(1);
        self.pause_depth.set(depth);
        if depth == 0 {
            self.reset();
        }
    }
}

/// Scoped pause bracket returned by [`FrameClock::pause`]
#[must_use = "the clock resumes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct PauseGuard<'a> {
    clock: &'a FrameClock,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        self.clock.resume();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_pause_excludes_load_time() {
        let clock = FrameClock::new();
        clock.tick();
        {
            let _outer = clock.pause();
            {
                let _inner = clock.pause();
                thread::sleep(Duration::from_millis(30));
            }
            assert!(clock.is_paused());
            assert_eq!(clock.tick(), 0);
        }
        assert!(!clock.is_paused());
        assert!(clock.tick() < 30);
    }

    #[test]
    fn test_tick_counts_frames() {
        let clock = FrameClock::new();
        clock.tick();
        clock.tick();
        assert_eq!(clock.frame_count(), 2);
    }
}
