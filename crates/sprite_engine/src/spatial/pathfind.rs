//! Path finding inside a region
//!
//! [`find_path`] works in the region's local coordinates. The caller supplies
//! the region outline, its walk grid and a `blocked` test that reports whether
//! a local point falls inside any exclusion region.
//!
//! A destination outside the region or inside an exclusion region is first
//! moved to the nearest reachable spot along its column, then its row, then
//! the row of the start point. Both ends are then snapped to a free node close
//! by, the grid is searched, and the node path is reduced to the waypoints
//! that can't be skipped by walking straight.

use crate::foundation::math::Vec2;

use super::grid::{Node, SearchResult, WalkGrid, GRID_SIZE};
use super::region::is_local_point_inside;

/// Snapping considers nodes closer than this Manhattan distance
const SNAP_DISTANCE: i32 = 100;

/// Nodes toward `toward` first: `[-1, 0, 1]` or `[1, 0, -1]`
fn snap_order(toward_positive: bool) -> [i32; 3] {
    if toward_positive {
        [-1, 0, 1]
    } else {
        [1, 0, -1]
    }
}

/// Inputs shared by every step of one search
struct Query<'a, F> {
    outline: &'a [Vec2],
    grid: &'a WalkGrid,
    blocked: &'a F,
}

impl<F: Fn(Vec2) -> bool> Query<'_, F> {
    fn reachable(&self, point: Vec2) -> bool {
        is_local_point_inside(self.outline, point) && !(self.blocked)(point)
    }

    /// Walk from `from` in steps of `step` over `limit` nodes, returning the
    /// first free node whose snapped point is reachable
    fn scan(&self, from: Node, step: Node, limit: i32, point_of: impl Fn(Node) -> Vec2) -> Option<(Node, Vec2)> {
        (0..limit)
            .map(|j| (from.0 + j * step.0, from.1 + j * step.1))
            .filter(|&node| self.grid.is_free(node))
            .map(|node| (node, point_of(node)))
            .find(|&(_, point)| self.reachable(point))
    }

    /// Move a blocked destination to a reachable spot
    fn relocate(&self, start: Node, a: Vec2, b: Vec2) -> Option<(Node, Vec2)> {
        let grid = self.grid;
        let (ax, ay) = start;
        let (bx, by) = grid.node_of(b);

        // Along the destination column, toward the start row
        if 0 <= bx && bx < grid.width() {
            let dy = if by - ay < 0 { 1 } else { -1 };
            let from = by.max(0);
            let limit = if dy > 0 { grid.height() - from } else { from + 1 };
            let found = self.scan((bx, from), (0, dy), limit, |(_, y)| {
                Vec2::new(b.x, (grid.down() + y * GRID_SIZE) as f32)
            });
            if found.is_some() {
                return found;
            }
        }

        // Along the destination row, toward the start column
        let dx = if bx - ax < 0 { 1 } else { -1 };
        let from = bx.max(0);
        let limit = if dx > 0 { grid.width() - from } else { from + 1 };
        if 0 <= by && by < grid.height() {
            let found = self.scan((from, by), (dx, 0), limit, |(x, _)| {
                Vec2::new((grid.left() + x * GRID_SIZE) as f32, b.y)
            });
            if found.is_some() {
                return found;
            }
        }

        // Along the start row
        if 0 <= ay && ay < grid.height() {
            return self.scan((from, ay), (dx, 0), limit, |(x, _)| {
                Vec2::new((grid.left() + x * GRID_SIZE) as f32, a.y)
            });
        }
        None
    }

    /// Closest free nodes around both ends, preferring the side facing the
    /// other end
    fn snap(&self, a: Node, b: Node, va: Vec2, vb: Vec2) -> (Node, Node) {
        let ys = snap_order(va.y > vb.y);
        let xs = snap_order(va.x > vb.x);
        let (mut nearest_a, mut best_a) = (a, SNAP_DISTANCE);
        let (mut nearest_b, mut best_b) = (b, SNAP_DISTANCE);
        for j in ys {
            for i in xs {
                let distance = i.abs() + j.abs();
                let node = (a.0 + i, a.1 + j);
                if self.grid.is_free(node) && distance < best_a {
                    best_a = distance;
                    nearest_a = node;
                }
                let node = (b.0 - i, b.1 - j);
                if self.grid.is_free(node) && distance < best_b {
                    best_b = distance;
                    nearest_b = node;
                }
            }
        }
        (nearest_a, nearest_b)
    }

    /// True if walking straight from `a` to `b` stays inside and unblocked
    fn is_straight(&self, a: (i32, i32), b: (i32, i32)) -> bool {
        let n = (a.0 - b.0).abs().max((a.1 - b.1).abs()) / (GRID_SIZE / 2);
        if n == 0 {
            return true;
        }
        let dx = (b.0 - a.0) / n;
        let dy = (b.1 - a.1) / n;
        (1..n).all(|i| self.reachable(Vec2::new((a.0 + dx * i) as f32, (a.1 + dy * i) as f32)))
    }
}

fn whole(point: Vec2) -> (i32, i32) {
    (point.x as i32, point.y as i32)
}

/// Find a walkable polyline from `from` to `to`.
///
/// All points are in the region's local coordinates. The grid is reclassified
/// against `blocked` before searching. Returns `None` when no path exists.
pub fn find_path(
    grid: &mut WalkGrid,
    outline: &[Vec2],
    blocked: impl Fn(Vec2) -> bool,
    from: Vec2,
    to: Vec2,
) -> Option<Vec<Vec2>> {
    grid.classify(&blocked);
    let grid: &WalkGrid = grid;
    let query = Query {
        outline,
        grid,
        blocked: &blocked,
    };

    let a = from;
    let mut b = to;
    let start = grid.node_of(a);
    let mut goal = grid.node_of(b);

    if !query.reachable(b) {
        match query.relocate(start, a, b) {
            Some((node, point)) => {
                goal = node;
                b = point;
            }
            None => {
                log::warn!("No reachable destination near ({}, {})", to.x, to.y);
                return None;
            }
        }
    }

    let origin = Vec2::new(grid.left() as f32, grid.down() as f32);
    let (start, goal) = query.snap(start, goal, a - origin, b - origin);

    let nodes = match grid.search(start, goal) {
        SearchResult::NoSolution => return None,
        SearchResult::SameCell => return Some(vec![a, b]),
        SearchResult::Path { nodes, .. } => nodes,
    };

    let mut path = vec![a];
    let mut anchor = whole(a);
    if query.is_straight(anchor, whole(b)) {
        path.push(b);
        return Some(path);
    }
    for pair in nodes.windows(2) {
        let next = whole(grid.node_position(pair[1]));
        if query.is_straight(anchor, next) {
            continue;
        }
        let kept = grid.node_position(pair[0]);
        path.push(kept);
        anchor = whole(kept);
    }
    path.push(b);
    Some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square(size: f32) -> Vec<Vec2> {
        vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(size, 0.0),
            Vec2::new(size, size),
            Vec2::new(0.0, size),
        ]
    }

    fn solve(blocked: impl Fn(Vec2) -> bool, from: Vec2, to: Vec2) -> Option<Vec<Vec2>> {
        let outline = square(160.0);
        let mut grid = WalkGrid::build(&outline);
        find_path(&mut grid, &outline, blocked, from, to)
    }

    #[test]
    fn test_open_region_walks_straight() {
        let path = solve(|_| false, Vec2::new(5.0, 5.0), Vec2::new(133.0, 133.0)).unwrap();
        assert_eq!(path, vec![Vec2::new(5.0, 5.0), Vec2::new(133.0, 133.0)]);
    }

    #[test]
    fn test_same_cell_gives_direct_path() {
        let path = solve(|_| false, Vec2::new(5.0, 5.0), Vec2::new(10.0, 12.0)).unwrap();
        assert_eq!(path, vec![Vec2::new(5.0, 5.0), Vec2::new(10.0, 12.0)]);
    }

    #[test]
    fn test_wall_is_walked_around() {
        let wall = |p: Vec2| p.x >= 40.0 && p.x < 88.0 && p.y < 120.0;
        let path = solve(wall, Vec2::new(5.0, 5.0), Vec2::new(133.0, 5.0)).unwrap();
        assert!(path.len() > 2);
        assert_eq!(path[0], Vec2::new(5.0, 5.0));
        assert_eq!(*path.last().unwrap(), Vec2::new(133.0, 5.0));
        assert!(path.iter().all(|p| !wall(*p)));
        assert!(path.iter().any(|p| p.y >= 120.0));
    }

    #[test]
    fn test_blocked_destination_snaps_to_free_cell() {
        let pillar = |p: Vec2| p.x >= 60.0 && p.x < 100.0 && p.y >= 60.0 && p.y < 100.0;
        let path = solve(pillar, Vec2::new(5.0, 5.0), Vec2::new(70.0, 70.0)).unwrap();
        let end = *path.last().unwrap();
        assert_eq!(end, Vec2::new(70.0, 32.0));
        assert!(!pillar(end));
    }

    #[test]
    fn test_destination_outside_region_snaps_inside() {
        let path = solve(|_| false, Vec2::new(5.0, 5.0), Vec2::new(70.0, 300.0)).unwrap();
        let end = *path.last().unwrap();
        assert!(is_local_point_inside(&square(160.0), end));
        assert_eq!(end.x, 70.0);
    }

    #[test]
    fn test_fully_blocked_region_has_no_path() {
        assert!(solve(|_| true, Vec2::new(5.0, 5.0), Vec2::new(133.0, 133.0)).is_none());
    }
}
