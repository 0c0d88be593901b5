//! Path following
//!
//! A [`PathFollower`] moves an attached object along a polyline. Named
//! [`KeyPoint`]s pin target speeds to point indices; speeds in between are
//! interpolated by distance, and each segment is crossed with the constant
//! acceleration that takes the start speed to the end speed over its length.
//!
//! The follower only computes motion. Each call to [`PathFollower::advance`]
//! yields a [`PathMove`] which the owner applies to whatever is attached.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::core::{EngineError, EngineResult};
use crate::foundation::math::{constants, Vec2};

bitflags! {
    /// What a path does to the attached object
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PathFlags: u32 {
        /// Move the object along the path
        const AFFECT_POSITION = 1;
        /// Turn the object to face along the path
        const AFFECT_ROTATION = 1 << 1;
        /// Apply position changes as deltas instead of placing the object
        const RELATIVE_MOVEMENT = 1 << 2;
        /// Apply heading changes as deltas instead of setting the rotation
        const RELATIVE_ROTATION = 1 << 3;
    }
}

impl Default for PathFlags {
    fn default() -> Self {
        Self::all()
    }
}

/// Target speed pinned to a path point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoint {
    /// Index of the path point
    pub index: usize,
    /// Speed in pixels per second when passing the point
    pub speed: f32,
    /// Set while the point has just been passed
    pub reached: bool,
}

impl KeyPoint {
    /// Key point at `index` with target `speed`
    pub fn new(index: usize, speed: f32) -> Self {
        Self {
            index,
            speed,
            reached: false,
        }
    }
}

/// Motion produced by one step, in the path's local coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PathMove {
    /// Position before the step
    pub from: Vec2,
    /// Position after the step
    pub to: Vec2,
    /// Heading in degrees before the step
    pub from_angle: f32,
    /// Heading in degrees after the step
    pub to_angle: f32,
    /// The object reached the end and was detached
    pub finished: bool,
}

impl PathMove {
    /// Position change
    pub fn delta(&self) -> Vec2 {
        self.to - self.from
    }

    /// Heading change in degrees
    pub fn angle_delta(&self) -> f32 {
        self.to_angle - self.from_angle
    }
}

/// Per-point data computed at attach time
#[derive(Debug, Clone, Copy, Default)]
struct PointData {
    /// Speed at the point
    speed: f32,
    /// Length of the segment ending at the point
    dist: f32,
}

/// Heading of the segment `a`-`b` in degrees
fn heading(a: Vec2, b: Vec2) -> f32 {
    (b.y - a.y).atan2(b.x - a.x) * constants::RAD_TO_DEG
}

/// Kinematic state of an object travelling along a polyline
#[derive(Debug, Clone, Default)]
pub struct PathFollower {
    /// Movement flags
    pub flags: PathFlags,
    key_points: BTreeMap<String, KeyPoint>,
    point_data: Vec<PointData>,
    reversed: bool,
    playing: bool,
    attached: bool,
    /// Last point passed in travel order
    passed_index: usize,
    /// Distance travelled from the last passed point
    passed_dist: f32,
    /// Time spent on the current segment
    time_passed: f32,
}

impl PathFollower {
    /// Detached follower with every flag set
    pub fn new() -> Self {
        Self::default()
    }

    /// Named key points
    pub fn key_points(&self) -> &BTreeMap<String, KeyPoint> {
        &self.key_points
    }

    /// Key point by name
    pub fn key_point(&self, name: &str) -> Option<&KeyPoint> {
        self.key_points.get(name)
    }

    /// Add or replace a key point
    pub fn set_key_point(&mut self, name: impl Into<String>, key_point: KeyPoint) {
        self.key_points.insert(name.into(), key_point);
    }

    /// Remove a key point
    pub fn remove_key_point(&mut self, name: &str) -> Option<KeyPoint> {
        self.key_points.remove(name)
    }

    /// True while an object is attached
    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// True while the path drives its object
    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Pause movement
    pub fn stop(&mut self) {
        self.playing = false;
    }

    /// Resume movement
    pub fn play(&mut self) {
        self.playing = true;
    }

    /// True when travelling from the last point to the first
    pub fn reversed(&self) -> bool {
        self.reversed
    }

    /// Change travel direction, keeping the current position
    pub fn set_reversed(&mut self, reversed: bool) {
        if reversed == self.reversed {
            return;
        }
        self.reversed = reversed;
        if !self.attached {
            return;
        }
        let next = if reversed { self.passed_index + 1 } else { self.passed_index - 1 };
        let length = self.segment_length(self.passed_index, next);
        self.passed_index = next;
        self.passed_dist = (length - self.passed_dist).max(0.0);
        self.time_passed = 0.0;
    }

    /// Forget the attached object
    pub fn detach(&mut self) {
        self.attached = false;
    }

    /// Drop the attachment and every key point, used when the points change
    pub fn reset(&mut self) {
        self.attached = false;
        self.key_points.clear();
        self.point_data.clear();
    }

    fn segment_length(&self, a: usize, b: usize) -> f32 {
        self.point_data[a.max(b)].dist
    }

    /// Key points in index order, checked against the point count
    fn ordered_key_points(&self, count: usize) -> EngineResult<Vec<KeyPoint>> {
        let mut ordered: Vec<KeyPoint> = self.key_points.values().copied().collect();
        ordered.sort_by_key(|kp| kp.index);
        for pair in ordered.windows(2) {
            if pair[0].index == pair[1].index {
                return Err(EngineError::invalid_argument(format!(
                    "two key points share path point {}",
                    pair[0].index
                )));
            }
        }
        if let Some(last) = ordered.last() {
            if last.index >= count {
                return Err(EngineError::invalid_argument(format!(
                    "key point index {} out of range 0..{count}",
                    last.index
                )));
            }
        }
        Ok(ordered)
    }

    /// Attach an object at the start of `points`.
    ///
    /// Returns the move that places the object on the start point, or `None`
    /// when the path has no points.
    pub fn attach(&mut self, points: &[Vec2]) -> EngineResult<Option<PathMove>> {
        self.attached = false;
        let count = points.len();
        if count == 0 {
            return Ok(None);
        }
        let ordered = self.ordered_key_points(count)?;

        self.point_data = vec![PointData::default(); count];
        for i in 1..count {
            self.point_data[i].dist = (points[i] - points[i - 1]).norm();
        }

        // Speed ramps linearly by distance between consecutive key points
        let mut start = 0;
        let mut previous_speed = 0.0;
        for kp in &ordered {
            let total: f32 = self.point_data[start + 1..=kp.index.max(start)]
                .iter()
                .map(|d| d.dist)
                .sum();
            let mut travelled = 0.0;
            for i in start..kp.index {
                if i > start {
                    travelled += self.point_data[i].dist;
                }
                let t = if total > 0.001 { travelled / total } else { 0.0 };
                self.point_data[i].speed = kp.speed * t + previous_speed * (1.0 - t);
            }
            previous_speed = kp.speed;
            start = kp.index;
        }
        for data in &mut self.point_data[start..] {
            data.speed = previous_speed;
        }

        let start_index = if self.reversed { count - 1 } else { 0 };
        for kp in self.key_points.values_mut() {
            kp.reached = kp.index == start_index;
        }

        self.passed_index = start_index;
        self.passed_dist = 0.0;
        self.time_passed = 0.0;
        self.playing = true;
        self.attached = count > 1;

        let angle = self.current_heading(points);
        log::trace!("Path attached: {count} points, {} key points", ordered.len());
        Ok(Some(PathMove {
            from: points[0],
            to: points[start_index],
            from_angle: angle,
            to_angle: angle,
            finished: !self.attached,
        }))
    }

    fn next_index(&self) -> usize {
        if self.reversed {
            self.passed_index - 1
        } else {
            self.passed_index + 1
        }
    }

    fn at_end(&self, count: usize) -> bool {
        if self.reversed {
            self.passed_index == 0
        } else {
            self.passed_index + 1 >= count
        }
    }

    fn current_position(&self, points: &[Vec2]) -> Vec2 {
        if self.at_end(points.len()) {
            return points[self.passed_index];
        }
        let next = self.next_index();
        let length = self.segment_length(self.passed_index, next);
        if length <= 0.0 {
            return points[self.passed_index];
        }
        let t = self.passed_dist / length;
        points[self.passed_index] * (1.0 - t) + points[next] * t
    }

    fn current_heading(&self, points: &[Vec2]) -> f32 {
        if points.len() < 2 {
            return 0.0;
        }
        if self.at_end(points.len()) {
            let previous = if self.reversed { 1 } else { points.len() - 2 };
            return heading(points[previous], points[self.passed_index]);
        }
        heading(points[self.passed_index], points[self.next_index()])
    }

    /// Move along `points` by `dt` seconds.
    ///
    /// `points` must be the slice the follower was attached to. Returns `None`
    /// when nothing moved.
    pub fn advance(&mut self, points: &[Vec2], dt: f32) -> Option<PathMove> {
        if self.playing && !self.attached {
            for kp in self.key_points.values_mut() {
                kp.reached = false;
            }
            self.playing = false;
        }
        if !self.playing
            || !self.attached
            || !self.flags.intersects(PathFlags::AFFECT_POSITION | PathFlags::AFFECT_ROTATION)
            || points.len() != self.point_data.len()
        {
            return None;
        }

        // Flags of points left behind are cleared
        let passed = self.passed_index;
        let reversed = self.reversed;
        for kp in self.key_points.values_mut() {
            if (!reversed && kp.index <= passed) || (reversed && kp.index >= passed) {
                kp.reached = false;
            }
        }

        let from = self.current_position(points);
        let from_angle = self.current_heading(points);

        // Constant acceleration on the segment, integrated with RK4
        let next = self.next_index();
        let v0 = self.point_data[self.passed_index].speed;
        let dv = self.point_data[next].speed - v0;
        let length = self.segment_length(self.passed_index, next);
        let a = if length > 0.0 { (2.0 * v0 * dv + dv * dv) / (2.0 * length) } else { 0.0 };
        let speed = |t: f32| v0 + a * t;
        let k1 = speed(self.time_passed) * dt;
        let k2 = speed(self.time_passed + dt / 2.0) * dt;
        let k3 = k2;
        let k4 = speed(self.time_passed + dt) * dt;
        self.passed_dist += (k1 + 2.0 * k2 + 2.0 * k3 + k4) / 6.0;
        self.time_passed += dt;

        // Decelerating to a standstill ends exactly on the next point
        if a < 0.0 && speed(self.time_passed) <= 0.0 {
            self.passed_dist = self.passed_dist.max(length);
        }

        let mut finished = false;
        loop {
            let next = self.next_index();
            let length = self.segment_length(self.passed_index, next);
            if self.passed_dist < length {
                break;
            }
            self.passed_dist -= length;
            self.time_passed = 0.0;
            self.passed_index = next;
            for kp in self.key_points.values_mut() {
                if kp.index == next {
                    kp.reached = true;
                }
            }
            if self.at_end(points.len()) {
                self.passed_dist = 0.0;
                self.attached = false;
                finished = true;
                break;
            }
        }

        Some(PathMove {
            from,
            to: self.current_position(points),
            from_angle,
            to_angle: self.current_heading(points),
            finished,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn line() -> Vec<Vec2> {
        vec![Vec2::new(0.0, 0.0), Vec2::new(100.0, 0.0)]
    }

    fn follower(speeds: &[(&str, usize, f32)]) -> PathFollower {
        let mut f = PathFollower::new();
        for (name, index, speed) in speeds {
            f.set_key_point(*name, KeyPoint::new(*index, *speed));
        }
        f
    }

    #[test]
    fn test_constant_speed_is_linear() {
        let points = line();
        let mut f = follower(&[("start", 0, 10.0)]);
        let start = f.attach(&points).unwrap().unwrap();
        assert_eq!(start.to, Vec2::new(0.0, 0.0));
        assert!(f.is_playing());

        let mut position = start.to;
        for step in 1..=4 {
            let m = f.advance(&points, 0.5).unwrap();
            assert_relative_eq!(m.from.x, position.x, epsilon = 1e-4);
            position = m.to;
            assert_relative_eq!(position.x, 5.0 * step as f32, epsilon = 1e-4);
            assert_relative_eq!(position.y, 0.0);
        }
        // 100 px at 10 px/s takes 10 s in total
        let m = f.advance(&points, 8.0).unwrap();
        assert!(m.finished);
        assert_eq!(m.to, Vec2::new(100.0, 0.0));
        assert!(!f.is_attached());
    }

    #[test]
    fn test_acceleration_reaches_target_speed() {
        // From 0 to 20 px/s over 100 px: a = 2 px/s^2, so 10 s to the end
        let points = line();
        let mut f = follower(&[("a", 0, 0.0), ("b", 1, 20.0)]);
        f.attach(&points).unwrap();
        let m = f.advance(&points, 5.0).unwrap();
        assert_relative_eq!(m.to.x, 25.0, epsilon = 1e-3);
        let m = f.advance(&points, 4.9).unwrap();
        assert!(!m.finished);
        let m = f.advance(&points, 0.2).unwrap();
        assert!(m.finished);
        assert!(f.key_point("b").unwrap().reached);
    }

    #[test]
    fn test_deceleration_stops_on_the_point() {
        let points = line();
        let mut f = follower(&[("a", 0, 20.0), ("b", 1, 0.0)]);
        f.attach(&points).unwrap();
        let m = f.advance(&points, 30.0).unwrap();
        assert!(m.finished);
        assert_eq!(m.to, Vec2::new(100.0, 0.0));
    }

    #[test]
    fn test_speed_interpolates_by_distance() {
        let points = vec![Vec2::new(0.0, 0.0), Vec2::new(30.0, 0.0), Vec2::new(40.0, 0.0)];
        let mut f = follower(&[("a", 0, 10.0), ("b", 2, 50.0)]);
        f.attach(&points).unwrap();
        assert_relative_eq!(f.point_data[0].speed, 10.0);
        assert_relative_eq!(f.point_data[1].speed, 40.0);
        assert_relative_eq!(f.point_data[2].speed, 50.0);
    }

    #[test]
    fn test_key_points_are_flagged_when_passed() {
        let points = vec![Vec2::new(0.0, 0.0), Vec2::new(10.0, 0.0), Vec2::new(10.0, 10.0)];
        let mut f = follower(&[("start", 0, 10.0), ("corner", 1, 10.0)]);
        f.attach(&points).unwrap();
        assert!(f.key_point("start").unwrap().reached);

        let m = f.advance(&points, 1.5).unwrap();
        assert!(f.key_point("corner").unwrap().reached);
        assert!(!f.key_point("start").unwrap().reached);
        assert_relative_eq!(m.to.x, 10.0, epsilon = 1e-4);
        assert_relative_eq!(m.to.y, 5.0, epsilon = 1e-4);
        assert_relative_eq!(m.from_angle, 0.0);
        assert_relative_eq!(m.to_angle, 90.0, epsilon = 1e-4);

        f.advance(&points, 0.1).unwrap();
        assert!(!f.key_point("corner").unwrap().reached);
    }

    #[test]
    fn test_reversed_attach_starts_at_the_end() {
        let points = line();
        let mut f = follower(&[("start", 0, 10.0)]);
        f.set_reversed(true);
        let m = f.attach(&points).unwrap().unwrap();
        assert_eq!(m.delta(), Vec2::new(100.0, 0.0));
        let m = f.advance(&points, 1.0).unwrap();
        assert_relative_eq!(m.to.x, 90.0, epsilon = 1e-4);
        assert_relative_eq!(m.to_angle, 180.0, epsilon = 1e-4);
    }

    #[test]
    fn test_set_reversed_keeps_position() {
        let points = line();
        let mut f = follower(&[("start", 0, 10.0)]);
        f.attach(&points).unwrap();
        f.advance(&points, 3.0).unwrap();
        f.set_reversed(true);
        let m = f.advance(&points, 1.0).unwrap();
        assert_relative_eq!(m.from.x, 30.0, epsilon = 1e-4);
        assert_relative_eq!(m.to.x, 20.0, epsilon = 1e-4);
        // Setting the same value again changes nothing
        f.set_reversed(true);
        let m = f.advance(&points, 1.0).unwrap();
        assert_relative_eq!(m.to.x, 10.0, epsilon = 1e-4);
    }

    #[test]
    fn test_stop_and_flags_suspend_movement() {
        let points = line();
        let mut f = follower(&[("start", 0, 10.0)]);
        f.attach(&points).unwrap();
        f.stop();
        assert!(f.advance(&points, 1.0).is_none());
        f.play();
        f.flags = PathFlags::RELATIVE_MOVEMENT;
        assert!(f.advance(&points, 1.0).is_none());
        f.flags = PathFlags::AFFECT_ROTATION;
        assert!(f.advance(&points, 1.0).is_some());
    }

    #[test]
    fn test_without_key_points_nothing_moves() {
        let points = line();
        let mut f = PathFollower::new();
        f.attach(&points).unwrap();
        let m = f.advance(&points, 5.0).unwrap();
        assert_eq!(m.delta(), Vec2::zeros());
    }

    #[test]
    fn test_invalid_key_points_are_rejected() {
        let points = line();
        let mut f = follower(&[("far", 5, 10.0)]);
        assert!(f.attach(&points).is_err());
        let mut f = follower(&[("a", 1, 10.0), ("b", 1, 20.0)]);
        assert!(f.attach(&points).is_err());
        assert!(!f.is_attached());
    }

    #[test]
    fn test_empty_and_single_point_paths() {
        let mut f = PathFollower::new();
        assert!(f.attach(&[]).unwrap().is_none());
        let m = f.attach(&[Vec2::new(3.0, 4.0)]).unwrap().unwrap();
        assert!(m.finished);
        assert!(!f.is_attached());
        // The follower notices the detachment and stops
        assert!(f.advance(&[Vec2::new(3.0, 4.0)], 1.0).is_none());
        assert!(!f.is_playing());
    }
}
