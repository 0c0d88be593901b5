//! Walkability grid and shortest path search
//!
//! A region's interior is sampled every [`GRID_SIZE`] pixels. Sampled nodes
//! inside the polygon are walkable unless an exclusion region covers them.
//! Search runs A* over the 8-connected node lattice.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};

use crate::foundation::math::Vec2;

use super::region::{bounds, is_local_point_inside};

/// Distance between grid nodes in pixels
pub const GRID_SIZE: i32 = 32;

/// Cost of a horizontal or vertical step
const AXIS_COST: f32 = 1.0;
/// Cost of a diagonal step
const DIAGONAL_COST: f32 = 1.4;

/// State of a grid node
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Cell {
    /// Outside the region
    Outside = 0,
    /// Inside the region but covered by an exclusion region
    Blocked = 1,
    /// Walkable
    Free = 3,
}

/// Grid coordinates of a node
pub type Node = (i32, i32);

/// Outcome of a search
#[derive(Debug, Clone, PartialEq)]
pub enum SearchResult {
    /// The goal can't be reached
    NoSolution,
    /// Start and goal are the same node
    SameCell,
    /// Nodes from start to goal inclusive, with the total cost
    Path {
        /// Visited nodes
        nodes: Vec<Node>,
        /// Sum of step costs
        cost: f32,
    },
}

/// Open-set entry ordered by lowest estimated total cost
#[derive(Debug, Clone, Copy)]
struct Open {
    estimate: f32,
    cost: f32,
    node: Node,
}

impl PartialEq for Open {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Open {}

impl Ord for Open {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so BinaryHeap pops the cheapest entry
        other
            .estimate
            .total_cmp(&self.estimate)
            .then_with(|| other.node.cmp(&self.node))
    }
}

impl PartialOrd for Open {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Node lattice over a region's bounding box
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WalkGrid {
    left: i32,
    down: i32,
    width: i32,
    height: i32,
    cells: Vec<Cell>,
}

impl WalkGrid {
    /// Grid over the bounding box of `outline`, with every node inside the
    /// polygon marked blocked until [`WalkGrid::classify`] runs
    pub fn build(outline: &[Vec2]) -> Self {
        let Some((left, down, right, up)) = bounds(outline) else {
            return Self::default();
        };
        let width = (right - left) / GRID_SIZE + 1;
        let height = (up - down) / GRID_SIZE + 1;
        let mut grid = Self {
            left,
            down,
            width,
            height,
            cells: Vec::with_capacity((width * height) as usize),
        };
        for y in 0..height {
            for x in 0..width {
                let cell = if is_local_point_inside(outline, grid.node_position((x, y))) {
                    Cell::Blocked
                } else {
                    Cell::Outside
                };
                grid.cells.push(cell);
            }
        }
        log::trace!("Walk grid built: {width}x{height} nodes at ({left}, {down})");
        grid
    }

    /// Grid with explicit cells, rows from `down` upwards
    pub fn from_cells(left: i32, down: i32, width: i32, cells: Vec<Cell>) -> Self {
        let height = if width > 0 { cells.len() as i32 / width } else { 0 };
        Self {
            left,
            down,
            width,
            height,
            cells,
        }
    }

    /// Left edge of the grid in local coordinates
    pub fn left(&self) -> i32 {
        self.left
    }

    /// Bottom edge of the grid in local coordinates
    pub fn down(&self) -> i32 {
        self.down
    }

    /// Nodes per row
    pub fn width(&self) -> i32 {
        self.width
    }

    /// Number of rows
    pub fn height(&self) -> i32 {
        self.height
    }

    /// Mark every node inside the region free unless `blocked` says otherwise.
    /// `blocked` receives the node position in local coordinates.
    pub fn classify(&mut self, mut blocked: impl FnMut(Vec2) -> bool) {
        for y in 0..self.height {
            for x in 0..self.width {
                let index = (y * self.width + x) as usize;
                if self.cells[index] == Cell::Outside {
                    continue;
                }
                let position = self.node_position((x, y));
                self.cells[index] = if blocked(position) { Cell::Blocked } else { Cell::Free };
            }
        }
    }

    /// Local position of a node
    pub fn node_position(&self, (x, y): Node) -> Vec2 {
        Vec2::new((self.left + x * GRID_SIZE) as f32, (self.down + y * GRID_SIZE) as f32)
    }

    /// Node containing a local point
    pub fn node_of(&self, point: Vec2) -> Node {
        (
            (point.x - self.left as f32) as i32 / GRID_SIZE,
            (point.y - self.down as f32) as i32 / GRID_SIZE,
        )
    }

    /// Positions of every node inside the region
    pub fn node_points(&self) -> Vec<Vec2> {
        (0..self.height)
            .flat_map(|y| (0..self.width).map(move |x| (x, y)))
            .filter(|&node| self.cell(node) != Some(Cell::Outside))
            .map(|node| self.node_position(node))
            .collect()
    }

    /// State of a node, `None` outside the grid
    pub fn cell(&self, (x, y): Node) -> Option<Cell> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get((y * self.width + x) as usize).copied()
    }

    /// True if the node exists and is walkable
    pub fn is_free(&self, node: Node) -> bool {
        self.cell(node) == Some(Cell::Free)
    }

    fn neighbours(&self, (x, y): Node) -> impl Iterator<Item = (Node, f32)> + '_ {
        (-1..=1)
            .flat_map(|j| (-1..=1).map(move |i| (i, j)))
            .filter(|&(i, j)| i != 0 || j != 0)
            .filter_map(move |(i, j)| {
                let next = (x + i, y + j);
                if !self.is_free(next) {
                    return None;
                }
                if i != 0 && j != 0 {
                    // No squeezing between two nodes diagonally past a blocked one
                    if !self.is_free((x + i, y)) || !self.is_free((x, y + j)) {
                        return None;
                    }
                    return Some((next, DIAGONAL_COST));
                }
                Some((next, AXIS_COST))
            })
    }

    /// Shortest path from `start` to `goal` over free nodes
    pub fn search(&self, start: Node, goal: Node) -> SearchResult {
        if start == goal {
            return SearchResult::SameCell;
        }
        if !self.is_free(start) || !self.is_free(goal) {
            return SearchResult::NoSolution;
        }

        let estimate = |(x, y): Node| ((goal.0 - x).abs().max((goal.1 - y).abs())) as f32;

        let mut open = BinaryHeap::new();
        let mut best: HashMap<Node, f32> = HashMap::new();
        let mut parent: HashMap<Node, Node> = HashMap::new();

        best.insert(start, 0.0);
        open.push(Open {
            estimate: estimate(start),
            cost: 0.0,
            node: start,
        });

        while let Some(Open { cost, node, .. }) = open.pop() {
            if node == goal {
                let mut nodes = vec![goal];
                let mut current = goal;
                while let Some(&previous) = parent.get(&current) {
                    nodes.push(previous);
                    current = previous;
                }
                nodes.reverse();
                return SearchResult::Path { nodes, cost };
            }
            if best.get(&node).is_some_and(|&known| cost > known) {
                continue;
            }
            for (next, step) in self.neighbours(node) {
                let next_cost = cost + step;
                if best.get(&next).is_some_and(|&known| known <= next_cost) {
                    continue;
                }
                best.insert(next, next_cost);
                parent.insert(next, node);
                open.push(Open {
                    estimate: next_cost + estimate(next),
                    cost: next_cost,
                    node: next,
                });
            }
        }
        SearchResult::NoSolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn open_grid(size: i32) -> WalkGrid {
        WalkGrid::from_cells(0, 0, size, vec![Cell::Free; (size * size) as usize])
    }

    fn path(result: SearchResult) -> (Vec<Node>, f32) {
        match result {
            SearchResult::Path { nodes, cost } => (nodes, cost),
            other => panic!("expected a path, got {other:?}"),
        }
    }

    #[test]
    fn test_open_grid_corner_to_corner_is_diagonal() {
        let grid = open_grid(5);
        let (nodes, cost) = path(grid.search((0, 0), (4, 4)));
        assert_eq!(nodes, vec![(0, 0), (1, 1), (2, 2), (3, 3), (4, 4)]);
        assert_relative_eq!(cost, 4.0 * 1.4, epsilon = 1e-4);
    }

    #[test]
    fn test_wall_forces_detour() {
        let mut grid = open_grid(5);
        for y in 0..4 {
            grid.cells[(y * 5 + 2) as usize] = Cell::Blocked;
        }
        let (nodes, cost) = path(grid.search((0, 0), (4, 0)));
        assert!(nodes.contains(&(2, 4)));
        assert!(cost > 4.0);
        assert_relative_eq!(cost, 10.8, epsilon = 1e-4);
    }

    #[test]
    fn test_diagonal_does_not_cut_corners() {
        // . #
        // . .
        let grid = WalkGrid::from_cells(0, 0, 2, vec![Cell::Free, Cell::Free, Cell::Free, Cell::Blocked]);
        let (nodes, cost) = path(grid.search((0, 0), (1, 0)));
        assert_eq!(nodes, vec![(0, 0), (1, 0)]);
        assert_relative_eq!(cost, 1.0);

        let grid = WalkGrid::from_cells(0, 0, 2, vec![Cell::Free, Cell::Blocked, Cell::Blocked, Cell::Free]);
        assert_eq!(grid.search((0, 0), (1, 1)), SearchResult::NoSolution);
    }

    #[test]
    fn test_same_cell_and_blocked_goal() {
        let mut grid = open_grid(3);
        assert_eq!(grid.search((1, 1), (1, 1)), SearchResult::SameCell);
        grid.cells[8] = Cell::Blocked;
        assert_eq!(grid.search((0, 0), (2, 2)), SearchResult::NoSolution);
        assert_eq!(grid.search((0, 0), (7, 7)), SearchResult::NoSolution);
    }

    #[test]
    fn test_build_and_classify_square() {
        let square = [
            Vec2::new(0.0, 0.0),
            Vec2::new(160.0, 0.0),
            Vec2::new(160.0, 160.0),
            Vec2::new(0.0, 160.0),
        ];
        let mut grid = WalkGrid::build(&square);
        assert_eq!((grid.width(), grid.height()), (6, 6));
        // The last row and column sit on the outline and fall outside
        assert_eq!(grid.cell((5, 0)), Some(Cell::Outside));
        assert_eq!(grid.cell((4, 4)), Some(Cell::Blocked));
        assert_eq!(grid.node_points().len(), 25);

        grid.classify(|p| p.x == 64.0 && p.y == 64.0);
        assert_eq!(grid.cell((2, 2)), Some(Cell::Blocked));
        assert!(grid.is_free((1, 2)));
        assert_eq!(grid.node_of(Vec2::new(70.0, 33.0)), (2, 1));
        assert_eq!(grid.node_position((2, 1)), Vec2::new(64.0, 32.0));
    }

    #[test]
    fn test_empty_outline_gives_empty_grid() {
        let grid = WalkGrid::build(&[]);
        assert_eq!(grid.width(), 0);
        assert!(grid.node_points().is_empty());
        assert_eq!(grid.cell((0, 0)), None);
    }
}
