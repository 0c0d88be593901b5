//! Point-based objects: regions, paths and path finding regions
//!
//! All three keep a [`PointContainer`] together with the outline sequence
//! that draws it. Points are edited through
//! [`GameObject::edit_points`](super::GameObject::edit_points) so derived
//! state (outline, follower, walk grid) is rebuilt after every change.

use crate::backend::Color;
use crate::core::EngineResult;
use crate::foundation::math::Vec2;
use crate::sequence::{OutlineMode, SequenceId, SequenceManager};
use crate::spatial::{is_local_point_inside, PathFollower, PathMove, PointContainer, WalkGrid};

use super::object::{ObjectRef, WeakObjectRef};

/// Points plus the sequence drawing them
#[derive(Debug)]
pub struct Outlined {
    points: PointContainer,
    sequence: SequenceId,
    color: Color,
}

impl Outlined {
    fn new(sequences: &mut SequenceManager, mode: OutlineMode) -> Self {
        Self {
            points: PointContainer::new(),
            sequence: sequences.create_outline(Vec::new(), Color::RED, mode),
            color: Color::RED,
        }
    }

    /// Outline points in local coordinates
    pub fn points(&self) -> &PointContainer {
        &self.points
    }

    pub(super) fn points_mut(&mut self) -> &mut PointContainer {
        &mut self.points
    }

    /// Outline sequence
    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }

    /// Line color
    pub fn color(&self) -> Color {
        self.color
    }

    /// Change the line color
    pub fn set_color(&mut self, sequences: &mut SequenceManager, color: Color) -> EngineResult<()> {
        sequences.set_color(self.sequence, color)?;
        self.color = color;
        Ok(())
    }

    /// True if a local point is inside the closed outline
    pub fn is_local_point_inside(&self, point: Vec2) -> bool {
        is_local_point_inside(self.points.as_slice(), point)
    }

    fn sync(&self, sequences: &mut SequenceManager) -> EngineResult<()> {
        sequences.set_outline_points(self.sequence, self.points.as_slice().to_vec())
    }
}

/// Closed polygon
#[derive(Debug)]
pub struct Region {
    outline: Outlined,
}

impl Region {
    pub(super) fn new(sequences: &mut SequenceManager) -> Self {
        Self {
            outline: Outlined::new(sequences, OutlineMode::Region),
        }
    }

    /// Polygon and its outline sequence
    pub fn outline(&self) -> &Outlined {
        &self.outline
    }

    /// Mutable polygon
    pub fn outline_mut(&mut self) -> &mut Outlined {
        &mut self.outline
    }

    pub(super) fn points_changed(&mut self, sequences: &mut SequenceManager) -> EngineResult<()> {
        self.outline.sync(sequences)
    }
}

/// Polyline that moves an attached object
#[derive(Debug)]
pub struct Path {
    outline: Outlined,
    /// Kinematics of the attached object
    pub follower: PathFollower,
    target: Option<WeakObjectRef>,
}

impl Path {
    pub(super) fn new(sequences: &mut SequenceManager) -> Self {
        Self {
            outline: Outlined::new(sequences, OutlineMode::Path),
            follower: PathFollower::new(),
            target: None,
        }
    }

    /// Polyline and its outline sequence
    pub fn outline(&self) -> &Outlined {
        &self.outline
    }

    /// Mutable polyline
    pub fn outline_mut(&mut self) -> &mut Outlined {
        &mut self.outline
    }

    /// Object moved by the path, while it is alive and attached
    pub fn target(&self) -> Option<ObjectRef> {
        if !self.follower.is_attached() {
            return None;
        }
        self.target.as_ref().and_then(WeakObjectRef::upgrade)
    }

    /// Stop moving the attached object
    pub fn detach(&mut self) {
        self.follower.detach();
        self.target = None;
    }

    /// Restart the follower at the first point and remember `target`
    pub(super) fn start(&mut self, target: WeakObjectRef) -> EngineResult<Option<PathMove>> {
        self.target = None;
        let step = self.follower.attach(self.outline.points.as_slice())?;
        if self.follower.is_attached() {
            self.target = Some(target);
        }
        Ok(step)
    }

    /// Advance the follower; the target is forgotten once the end is reached
    pub(super) fn advance(&mut self, dt: f32) -> Option<PathMove> {
        let step = self.follower.advance(self.outline.points.as_slice(), dt);
        if step.is_some_and(|step| step.finished) {
            self.target = None;
        }
        step
    }

    pub(super) fn live_target(&self) -> Option<ObjectRef> {
        self.target.as_ref().and_then(WeakObjectRef::upgrade)
    }

    pub(super) fn points_changed(&mut self, sequences: &mut SequenceManager) -> EngineResult<()> {
        self.outline.sync(sequences)?;
        self.follower.reset();
        self.target = None;
        Ok(())
    }
}

/// Region with a walkability grid and exclusion regions
#[derive(Debug)]
pub struct PathFindRegion {
    outline: Outlined,
    grid: WalkGrid,
    block_regions: Vec<ObjectRef>,
}

impl PathFindRegion {
    pub(super) fn new(sequences: &mut SequenceManager) -> Self {
        Self {
            outline: Outlined::new(sequences, OutlineMode::PathFind { nodes: Vec::new() }),
            grid: WalkGrid::default(),
            block_regions: Vec::new(),
        }
    }

    /// Polygon and its outline sequence
    pub fn outline(&self) -> &Outlined {
        &self.outline
    }

    /// Mutable polygon
    pub fn outline_mut(&mut self) -> &mut Outlined {
        &mut self.outline
    }

    /// Walkability grid built from the current points
    pub fn grid(&self) -> &WalkGrid {
        &self.grid
    }

    /// Exclusion regions
    pub fn block_regions(&self) -> &[ObjectRef] {
        &self.block_regions
    }

    /// Drop every exclusion region
    pub fn clear_block_regions(&mut self) {
        self.block_regions.clear();
    }

    pub(super) fn push_block_region(&mut self, region: ObjectRef) {
        self.block_regions.push(region);
    }

    /// Remove an exclusion region, returning true if it was registered
    pub fn remove_block_region(&mut self, region: &ObjectRef) -> bool {
        let before = self.block_regions.len();
        self.block_regions.retain(|known| !known.ptr_eq(region));
        self.block_regions.len() != before
    }

    pub(super) fn search_parts(&mut self) -> (&mut WalkGrid, &[Vec2]) {
        (&mut self.grid, self.outline.points.as_slice())
    }

    pub(super) fn points_changed(&mut self, sequences: &mut SequenceManager) -> EngineResult<()> {
        self.outline.sync(sequences)?;
        self.grid = WalkGrid::build(self.outline.points.as_slice());
        sequences.set_outline_nodes(self.outline.sequence, self.grid.node_points())
    }
}
