//! Point-based spatial structures
//!
//! Point containers shared by regions and paths, polygon containment,
//! path-follow kinematics and grid path finding.

pub mod grid;
pub mod path;
pub mod pathfind;
pub mod points;
pub mod region;

pub use grid::{Cell, SearchResult, WalkGrid, GRID_SIZE};
pub use path::{KeyPoint, PathFlags, PathFollower, PathMove};
pub use pathfind::find_path;
pub use points::PointContainer;
pub use region::is_local_point_inside;
