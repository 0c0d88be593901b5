//! Game objects and the per-frame update pass
//!
//! Objects are shared through [`ObjectRef`], a reference-counted cell. The
//! update pass never holds a borrow while it calls into children or script
//! hooks, so a hook may freely edit any object, including the one being
//! updated. Children are visited over a snapshot of the child map taken when
//! the parent's turn starts.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::collections::BTreeMap;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::audio::SoundId;
use crate::backend::Color;
use crate::core::{EngineError, EngineResult};
use crate::engine::EngineContext;
use crate::foundation::math::{self, Mat3, Transform2D, Vec2};
use crate::sequence::SequenceManager;
use crate::spatial::{self, PathFlags, PathMove, PointContainer};

use super::animated::AnimatedObject;
use super::kinds::{Gizmo, Layer, LayerImage, Location, ObjectKind, TextObject};
use super::shapes::{Path, PathFindRegion, Region};

/// Named children of an object, visited in name order
pub type ObjectMap = BTreeMap<String, ObjectRef>;

#[derive(Debug)]
struct ObjectCell {
    object: RefCell<GameObject>,
    updating: Cell<bool>,
}

/// Shared handle to a game object
#[derive(Clone)]
pub struct ObjectRef(Rc<ObjectCell>);

/// Non-owning handle to a game object
#[derive(Clone, Default)]
pub struct WeakObjectRef(Weak<ObjectCell>);

impl WeakObjectRef {
    /// The object, if it is still alive
    pub fn upgrade(&self) -> Option<ObjectRef> {
        self.0.upgrade().map(ObjectRef)
    }
}

impl fmt::Debug for WeakObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WeakObjectRef(alive: {})", self.0.strong_count() > 0)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.object.try_borrow() {
            Ok(object) => f
                .debug_struct("ObjectRef")
                .field("kind", &object.kind.name())
                .field("position", &object.position)
                .field("children", &object.objects.len())
                .finish(),
            Err(_) => f.write_str("ObjectRef(<in use>)"),
        }
    }
}

/// Clears the update mark when the update pass of an object ends
struct UpdateMark<'a>(&'a Cell<bool>);

impl Drop for UpdateMark<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl ObjectRef {
    /// Share `object`
    pub fn new(object: GameObject) -> Self {
        Self(Rc::new(ObjectCell {
            object: RefCell::new(object),
            updating: Cell::new(false),
        }))
    }

    /// Read access; fails while the object is mutably borrowed
    pub fn borrow(&self) -> EngineResult<Ref<'_, GameObject>> {
        self.0.object.try_borrow().map_err(|_| EngineError::ObjectInUse)
    }

    /// Write access; fails while the object is borrowed
    pub fn borrow_mut(&self) -> EngineResult<RefMut<'_, GameObject>> {
        self.0.object.try_borrow_mut().map_err(|_| EngineError::ObjectInUse)
    }

    /// Non-owning handle
    pub fn downgrade(&self) -> WeakObjectRef {
        WeakObjectRef(Rc::downgrade(&self.0))
    }

    /// True if both handles refer to the same object
    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    fn mark_updating(&self) -> EngineResult<UpdateMark<'_>> {
        // An object reachable from its own subtree would recurse forever
        if self.0.updating.replace(true) {
            return Err(EngineError::ObjectInUse);
        }
        Ok(UpdateMark(&self.0.updating))
    }

    /// Update the object and its subtree for one frame.
    ///
    /// The object's local transform is pushed on the shared transform stack,
    /// its own visuals are rendered, children are updated in name order and
    /// attached sounds are refreshed. The transform is popped on every exit
    /// path. A path then moves the object attached to it.
    pub fn update(&self, ctx: &mut EngineContext, dt: f32) -> EngineResult<()> {
        let _mark = self.mark_updating()?;
        let transform = {
            let mut object = self.borrow_mut()?;
            object.parent_world = ctx.transforms.top();
            let local = object.local_transform();
            ctx.transforms.push(&local)
        };

        let zregion = {
            let mut object = self.borrow_mut()?;
            let mut zregion = None;
            if let ObjectKind::Animated(animated) = &mut object.kind {
                if animated.take_zregion() {
                    let sequence = animated.current_sequence()?;
                    zregion = Some(sequence);
                }
            }
            zregion
        };
        match zregion {
            Some(sequence) => {
                if let Some(id) = sequence {
                    ctx.sequences.update_transform(id)?;
                }
                self.update_children(ctx, dt)?;
            }
            None => {
                self.update_visuals(ctx, dt)?;
                self.update_children(ctx, dt)?;
                self.update_sounds(ctx, dt)?;
            }
        }
        drop(transform);

        self.advance_path(dt)
    }

    fn update_visuals(&self, ctx: &mut EngineContext, dt: f32) -> EngineResult<()> {
        let (animated, sequence) = {
            let object = self.borrow()?;
            (matches!(object.kind, ObjectKind::Animated(_)), object.kind.own_sequence())
        };
        if animated {
            return self.update_animation(ctx, dt);
        }
        if let Some(id) = sequence {
            ctx.render_sequence(id, dt)?;
        }
        Ok(())
    }

    fn update_children(&self, ctx: &mut EngineContext, dt: f32) -> EngineResult<()> {
        let children: Vec<(String, ObjectRef)> = self
            .borrow()?
            .objects
            .iter()
            .map(|(name, child)| (name.clone(), child.clone()))
            .collect();
        for (name, child) in children {
            if let Err(err) = child.update(ctx, dt) {
                log::debug!("Update of '{name}' failed: {err}");
                return Err(err);
            }
        }
        Ok(())
    }

    fn update_sounds(&self, ctx: &mut EngineContext, dt: f32) -> EngineResult<()> {
        let sounds: Vec<SoundId> = self.borrow()?.sounds.values().copied().collect();
        for id in sounds {
            ctx.sounds.render(id, dt)?;
        }
        Ok(())
    }

    fn advance_path(&self, dt: f32) -> EngineResult<()> {
        let step = {
            let mut object = self.borrow_mut()?;
            let world = object.world();
            let ObjectKind::Path(path) = &mut object.kind else {
                return Ok(());
            };
            let target = path.live_target();
            if target.is_none() {
                path.detach();
            }
            let flags = path.follower.flags;
            path.advance(dt).zip(target).map(|(step, target)| (step, target, world, flags))
        };
        if let Some((step, target, world, flags)) = step {
            target.borrow_mut()?.follow(&step, &world, flags);
        }
        Ok(())
    }

    /// Put `target` on the start of this path and begin moving it
    pub fn attach(&self, target: &ObjectRef) -> EngineResult<()> {
        if self.ptr_eq(target) {
            return Err(EngineError::invalid_argument("a path can't carry itself"));
        }
        let (step, world, flags) = {
            let mut object = self.borrow_mut()?;
            let world = object.world();
            let path = object.as_path_mut()?;
            let step = path.start(target.downgrade())?;
            (step, world, path.follower.flags)
        };
        if let Some(step) = step {
            target.borrow_mut()?.follow(&step, &world, flags);
        }
        Ok(())
    }

    /// Release every sequence and sound of the object and its subtree.
    ///
    /// Children are dropped from the object; the object itself stays usable
    /// as an empty shell.
    pub fn release(&self, ctx: &mut EngineContext) -> EngineResult<()> {
        let (sequences, sounds, children) = {
            let mut object = self.borrow_mut()?;
            let children: Vec<ObjectRef> = std::mem::take(&mut object.objects).into_values().collect();
            let sounds: Vec<SoundId> = std::mem::take(&mut object.sounds).into_values().collect();
            match &mut object.kind {
                ObjectKind::Path(path) => path.detach(),
                ObjectKind::PathFindRegion(region) => region.clear_block_regions(),
                _ => {}
            }
            (object.kind.take_sequences(), sounds, children)
        };
        for id in sequences {
            if ctx.sequences.contains(id) {
                ctx.sequences.release(id)?;
            }
        }
        for id in sounds {
            if ctx.sounds.contains(id) {
                ctx.sounds.release(id)?;
            }
        }
        for child in children {
            child.release(ctx)?;
        }
        Ok(())
    }
}

fn wrong_kind(expected: &str, found: &ObjectKind) -> EngineError {
    EngineError::invalid_argument(format!("expected a {expected}, found a {}", found.name()))
}

/// Node of the scene graph
#[derive(Debug)]
pub struct GameObject {
    /// Position in parent space
    pub position: Vec2,
    /// Rotation in degrees
    pub rotation: f32,
    /// Non-uniform scale
    pub scale: Vec2,
    objects: ObjectMap,
    sounds: BTreeMap<String, SoundId>,
    parent_world: Mat3,
    kind: ObjectKind,
}

impl GameObject {
    /// Object of the given kind at the origin
    pub fn new(kind: ObjectKind) -> Self {
        Self {
            position: Vec2::zeros(),
            rotation: 0.0,
            scale: Vec2::new(1.0, 1.0),
            objects: ObjectMap::new(),
            sounds: BTreeMap::new(),
            parent_world: Mat3::identity(),
            kind,
        }
    }

    /// Screen-sized location
    pub fn location(name: impl Into<String>) -> Self {
        Self::new(ObjectKind::Location(Location::new(name)))
    }

    /// Grouping layer without parallax
    pub fn layer() -> Self {
        Self::new(ObjectKind::Layer(Layer::default()))
    }

    /// Layer with no image loaded yet
    pub fn layer_image() -> Self {
        Self::new(ObjectKind::LayerImage(LayerImage::default()))
    }

    /// Animated object with no sequences or states
    pub fn animated() -> Self {
        Self::new(ObjectKind::Animated(AnimatedObject::default()))
    }

    /// Debug rectangle
    pub fn gizmo(sequences: &mut SequenceManager, width: f32, height: f32, color: Color) -> Self {
        Self::new(ObjectKind::Gizmo(Gizmo::new(sequences, width, height, color)))
    }

    /// Text label
    pub fn text(sequences: &mut SequenceManager, text: impl Into<String>, color: Color) -> Self {
        Self::new(ObjectKind::Text(TextObject::new(sequences, text.into(), color)))
    }

    /// Empty region
    pub fn region(sequences: &mut SequenceManager) -> Self {
        Self::new(ObjectKind::Region(Region::new(sequences)))
    }

    /// Empty path
    pub fn path(sequences: &mut SequenceManager) -> Self {
        Self::new(ObjectKind::Path(Path::new(sequences)))
    }

    /// Empty path finding region
    pub fn path_find_region(sequences: &mut SequenceManager) -> Self {
        Self::new(ObjectKind::PathFindRegion(PathFindRegion::new(sequences)))
    }

    /// Share the object
    pub fn into_ref(self) -> ObjectRef {
        ObjectRef::new(self)
    }

    /// Variant data
    pub fn kind(&self) -> &ObjectKind {
        &self.kind
    }

    /// Mutable variant data
    pub fn kind_mut(&mut self) -> &mut ObjectKind {
        &mut self.kind
    }

    // Children

    /// Add a child, returning the one previously stored under `name`
    pub fn add_object(&mut self, name: impl Into<String>, object: ObjectRef) -> Option<ObjectRef> {
        self.objects.insert(name.into(), object)
    }

    /// Remove a child
    pub fn remove_object(&mut self, name: &str) -> Option<ObjectRef> {
        self.objects.remove(name)
    }

    /// Child stored under `name`
    pub fn object(&self, name: &str) -> Option<&ObjectRef> {
        self.objects.get(name)
    }

    /// Children in update order
    pub fn objects(&self) -> impl Iterator<Item = (&str, &ObjectRef)> {
        self.objects.iter().map(|(name, object)| (name.as_str(), object))
    }

    // Sounds

    /// Load a sound under `name`, releasing the one it replaces
    pub fn add_sound(&mut self, ctx: &mut EngineContext, name: impl Into<String>, path: &str) -> EngineResult<SoundId> {
        let id = ctx.sounds.load(&mut ctx.files, path)?;
        if let Some(old) = self.sounds.insert(name.into(), id) {
            ctx.sounds.release(old)?;
        }
        Ok(id)
    }

    /// Release the sound stored under `name`
    pub fn remove_sound(&mut self, ctx: &mut EngineContext, name: &str) -> EngineResult<bool> {
        match self.sounds.remove(name) {
            Some(id) => ctx.sounds.release(id).map(|()| true),
            None => Ok(false),
        }
    }

    /// Sound stored under `name`
    pub fn sound(&self, name: &str) -> Option<SoundId> {
        self.sounds.get(name).copied()
    }

    /// Sound names in order
    pub fn sound_names(&self) -> impl Iterator<Item = &str> {
        self.sounds.keys().map(String::as_str)
    }

    // Transforms

    /// Position, rotation and scale as a matrix
    pub fn local_transform(&self) -> Mat3 {
        Transform2D {
            position: self.position,
            rotation: self.rotation,
            scale: self.scale,
        }
        .to_matrix()
    }

    /// World transform under the parent transform seen by the last update
    pub fn world(&self) -> Mat3 {
        self.parent_world * self.local_transform()
    }

    /// Inverse of [`GameObject::world`]
    pub fn world_inverse(&self) -> Mat3 {
        math::inverse_or_identity(&self.world())
    }

    /// Position in world space
    pub fn absolute_position(&self) -> Vec2 {
        math::transform_point(&self.world(), Vec2::zeros())
    }

    /// Rotation in world space, degrees in `[0, 360)`
    pub fn absolute_rotation(&self) -> f32 {
        math::absolute_rotation(&self.world())
    }

    /// Map a world point into the object's local space
    pub fn to_local_coordinates(&self, point: Vec2) -> Vec2 {
        math::transform_point(&self.world_inverse(), point)
    }

    /// Apply one step of a path carrying this object
    fn follow(&mut self, step: &PathMove, path_world: &Mat3, flags: PathFlags) {
        if flags.contains(PathFlags::AFFECT_POSITION) {
            if flags.contains(PathFlags::RELATIVE_MOVEMENT) {
                self.position += step.delta();
            } else {
                let goal = math::transform_point(path_world, step.to);
                self.position = math::transform_point(&math::inverse_or_identity(&self.parent_world), goal);
            }
        }
        if flags.contains(PathFlags::AFFECT_ROTATION) {
            if flags.contains(PathFlags::RELATIVE_ROTATION) {
                self.rotation += step.angle_delta();
            } else {
                let parent = math::absolute_rotation(&self.parent_world);
                self.rotation = math::absolute_rotation(path_world) + step.to_angle - parent;
            }
        }
    }

    // Variant access

    /// Location data
    pub fn as_location(&self) -> EngineResult<&Location> {
        match &self.kind {
            ObjectKind::Location(location) => Ok(location),
            other => Err(wrong_kind("location", other)),
        }
    }

    /// Layer data
    pub fn as_layer_mut(&mut self) -> EngineResult<&mut Layer> {
        match &mut self.kind {
            ObjectKind::Layer(layer) => Ok(layer),
            other => Err(wrong_kind("layer", other)),
        }
    }

    /// Layer image data
    pub fn as_layer_image_mut(&mut self) -> EngineResult<&mut LayerImage> {
        match &mut self.kind {
            ObjectKind::LayerImage(image) => Ok(image),
            other => Err(wrong_kind("layer image", other)),
        }
    }

    /// Animated object data
    pub fn as_animated(&self) -> EngineResult<&AnimatedObject> {
        match &self.kind {
            ObjectKind::Animated(animated) => Ok(animated),
            other => Err(wrong_kind("animated object", other)),
        }
    }

    /// Mutable animated object data
    pub fn as_animated_mut(&mut self) -> EngineResult<&mut AnimatedObject> {
        match &mut self.kind {
            ObjectKind::Animated(animated) => Ok(animated),
            other => Err(wrong_kind("animated object", other)),
        }
    }

    /// Gizmo data
    pub fn as_gizmo_mut(&mut self) -> EngineResult<&mut Gizmo> {
        match &mut self.kind {
            ObjectKind::Gizmo(gizmo) => Ok(gizmo),
            other => Err(wrong_kind("gizmo", other)),
        }
    }

    /// Text object data
    pub fn as_text_mut(&mut self) -> EngineResult<&mut TextObject> {
        match &mut self.kind {
            ObjectKind::Text(text) => Ok(text),
            other => Err(wrong_kind("text object", other)),
        }
    }

    /// Path data
    pub fn as_path(&self) -> EngineResult<&Path> {
        match &self.kind {
            ObjectKind::Path(path) => Ok(path),
            other => Err(wrong_kind("path", other)),
        }
    }

    /// Mutable path data
    pub fn as_path_mut(&mut self) -> EngineResult<&mut Path> {
        match &mut self.kind {
            ObjectKind::Path(path) => Ok(path),
            other => Err(wrong_kind("path", other)),
        }
    }

    /// Path finding region data
    pub fn as_path_find_region(&self) -> EngineResult<&PathFindRegion> {
        match &self.kind {
            ObjectKind::PathFindRegion(region) => Ok(region),
            other => Err(wrong_kind("path find region", other)),
        }
    }

    /// Mutable path finding region data
    pub fn as_path_find_region_mut(&mut self) -> EngineResult<&mut PathFindRegion> {
        match &mut self.kind {
            ObjectKind::PathFindRegion(region) => Ok(region),
            other => Err(wrong_kind("path find region", other)),
        }
    }

    // Points

    /// Points of a region, path or path finding region
    pub fn points(&self) -> EngineResult<&PointContainer> {
        self.kind
            .outline()
            .map(|outline| outline.points())
            .ok_or_else(|| wrong_kind("point based object", &self.kind))
    }

    /// Edit the points and rebuild what depends on them.
    ///
    /// Regions redraw their outline, paths also drop their attachment and key
    /// points, path finding regions rebuild their walk grid. An edit that
    /// fails changes nothing.
    pub fn edit_points<R>(
        &mut self,
        sequences: &mut SequenceManager,
        edit: impl FnOnce(&mut PointContainer) -> EngineResult<R>,
    ) -> EngineResult<R> {
        let points = match &mut self.kind {
            ObjectKind::Region(region) => region.outline_mut().points_mut(),
            ObjectKind::Path(path) => path.outline_mut().points_mut(),
            ObjectKind::PathFindRegion(region) => region.outline_mut().points_mut(),
            other => return Err(wrong_kind("point based object", other)),
        };
        // A rejected edit leaves the points untouched, so nothing is rebuilt
        let value = edit(points)?;
        match &mut self.kind {
            ObjectKind::Region(region) => region.points_changed(sequences)?,
            ObjectKind::Path(path) => path.points_changed(sequences)?,
            ObjectKind::PathFindRegion(region) => region.points_changed(sequences)?,
            _ => {}
        }
        Ok(value)
    }

    /// Append a point
    pub fn push_point(&mut self, sequences: &mut SequenceManager, point: Vec2) -> EngineResult<()> {
        self.edit_points(sequences, |points| {
            points.push(point);
            Ok(())
        })
    }

    /// Insert a point before `index`
    pub fn insert_point(&mut self, sequences: &mut SequenceManager, index: usize, point: Vec2) -> EngineResult<()> {
        self.edit_points(sequences, |points| points.insert(index, point))
    }

    /// Remove the point at `index`
    pub fn erase_point(&mut self, sequences: &mut SequenceManager, index: usize) -> EngineResult<Vec2> {
        self.edit_points(sequences, |points| points.erase(index))
    }

    /// Move the point at `index`
    pub fn set_point(&mut self, sequences: &mut SequenceManager, index: usize, point: Vec2) -> EngineResult<()> {
        self.edit_points(sequences, |points| points.set(index, point))
    }

    /// Remove every point
    pub fn clear_points(&mut self, sequences: &mut SequenceManager) -> EngineResult<()> {
        self.edit_points(sequences, |points| {
            points.clear();
            Ok(())
        })
    }

    /// Replace the points with the contents of a point file
    pub fn load_points(&mut self, ctx: &mut EngineContext, path: &str) -> EngineResult<()> {
        self.points()?;
        let mut loaded = PointContainer::new();
        loaded.load(&mut ctx.files, path)?;
        self.edit_points(&mut ctx.sequences, |points| {
            *points = loaded;
            Ok(())
        })
    }

    /// Write the points to a point file
    pub fn save_points(&self, ctx: &mut EngineContext, path: &str) -> EngineResult<()> {
        self.points()?.save(&mut ctx.files, path)
    }

    // Containment

    /// True if a world point lies inside a region or path finding region
    pub fn is_point_inside(&self, point: Vec2) -> EngineResult<bool> {
        let outline = match &self.kind {
            ObjectKind::Region(region) => region.outline(),
            ObjectKind::PathFindRegion(region) => region.outline(),
            other => return Err(wrong_kind("region", other)),
        };
        Ok(outline.is_local_point_inside(self.to_local_coordinates(point)))
    }

    /// True if the other object's position lies inside this region
    pub fn is_inside(&self, other: &GameObject) -> EngineResult<bool> {
        self.is_point_inside(other.absolute_position())
    }

    // Path finding

    /// Exclude the area of a region from path finding
    pub fn add_block_region(&mut self, region: ObjectRef) -> EngineResult<()> {
        let is_region = matches!(
            region.borrow()?.kind,
            ObjectKind::Region(_) | ObjectKind::PathFindRegion(_)
        );
        if !is_region {
            return Err(EngineError::invalid_argument("block regions must be regions"));
        }
        self.as_path_find_region_mut()?.push_block_region(region);
        Ok(())
    }

    /// Walkable polyline between two world points, in this object's parent
    /// space. `None` when the destination can't be reached.
    pub fn find_path(&mut self, from: Vec2, to: Vec2) -> EngineResult<Option<Vec<Vec2>>> {
        let world = self.world();
        let world_inv = math::inverse_or_identity(&world);
        let local = self.local_transform();

        let region = self.as_path_find_region_mut()?;
        let blocks = region
            .block_regions()
            .iter()
            .map(|block| -> EngineResult<(Mat3, Vec<Vec2>)> {
                let block = block.borrow()?;
                let outline = block.points()?.as_slice().to_vec();
                Ok((block.world_inverse(), outline))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let blocked = |point: Vec2| {
            let point = math::transform_point(&world, point);
            blocks
                .iter()
                .any(|(inverse, outline)| spatial::is_local_point_inside(outline, math::transform_point(inverse, point)))
        };

        let (grid, outline) = region.search_parts();
        let found = spatial::find_path(
            grid,
            outline,
            blocked,
            math::transform_point(&world_inv, from),
            math::transform_point(&world_inv, to),
        );
        Ok(found.map(|points| points.into_iter().map(|p| math::transform_point(&local, p)).collect()))
    }
}
