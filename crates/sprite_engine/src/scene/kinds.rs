//! Object variants
//!
//! Every [`GameObject`](super::GameObject) carries one [`ObjectKind`]. The
//! variants only hold what is specific to them; transforms, children and
//! sounds live on the object itself.

use crate::backend::Color;
use crate::core::EngineResult;
use crate::engine::EngineContext;
use crate::foundation::math::Vec2;
use crate::sequence::{SequenceId, SequenceManager};

use super::animated::AnimatedObject;
use super::shapes::{Outlined, Path, PathFindRegion, Region};

/// Default location width in pixels
pub const LOCATION_WIDTH: u32 = 1024;
/// Default location height in pixels
pub const LOCATION_HEIGHT: u32 = 768;

/// Top-level container of a game scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    /// Location name
    pub name: String,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl Location {
    /// Screen-sized location
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: LOCATION_WIDTH,
            height: LOCATION_HEIGHT,
        }
    }
}

/// Grouping layer
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Layer {
    /// Parallax scroll speed, read by game scripts
    pub parallax: Vec2,
}

/// Layer drawing a single background image
#[derive(Debug, Default)]
pub struct LayerImage {
    sequence: Option<SequenceId>,
}

impl LayerImage {
    /// Sequence of the loaded image
    pub fn sequence(&self) -> Option<SequenceId> {
        self.sequence
    }

    /// Load `path` as the layer image, releasing the previous one
    pub fn load_image(&mut self, ctx: &mut EngineContext, path: &str, compressed: bool) -> EngineResult<()> {
        let (sequences, mut res) = ctx.split();
        let id = sequences.create_static(&mut res, path, compressed)?;
        if let Some(old) = self.sequence.replace(id) {
            sequences.release(old)?;
        }
        log::debug!("Layer image loaded from '{path}'");
        Ok(())
    }

    /// Load `path` without going through the filtered cache first.
    ///
    /// The file manager already falls back to a direct load when a filtered
    /// file is missing, so this behaves like [`LayerImage::load_image`].
    pub fn direct_load_image(&mut self, ctx: &mut EngineContext, path: &str, compressed: bool) -> EngineResult<()> {
        self.load_image(ctx, path, compressed)
    }

    pub(super) fn take_sequence(&mut self) -> Option<SequenceId> {
        self.sequence.take()
    }
}

/// Colored rectangle used as a debug marker
#[derive(Debug)]
pub struct Gizmo {
    sequence: SequenceId,
    width: f32,
    height: f32,
    color: Color,
}

impl Gizmo {
    pub(super) fn new(sequences: &mut SequenceManager, width: f32, height: f32, color: Color) -> Self {
        Self {
            sequence: sequences.create_debug_box(width, height, color),
            width,
            height,
            color,
        }
    }

    /// Box sequence
    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }

    /// Width and height
    pub fn size(&self) -> Vec2 {
        Vec2::new(self.width, self.height)
    }

    /// Resize the box
    pub fn set_size(&mut self, sequences: &mut SequenceManager, width: f32, height: f32) -> EngineResult<()> {
        sequences.set_box_size(self.sequence, width, height)?;
        self.width = width;
        self.height = height;
        Ok(())
    }

    /// Fill color
    pub fn color(&self) -> Color {
        self.color
    }

    /// Change the fill color
    pub fn set_color(&mut self, sequences: &mut SequenceManager, color: Color) -> EngineResult<()> {
        sequences.set_color(self.sequence, color)?;
        self.color = color;
        Ok(())
    }

    /// True if the world point lies inside the box as drawn last frame
    pub fn is_inside(&self, sequences: &SequenceManager, point: Vec2) -> EngineResult<bool> {
        sequences.is_inside(self.sequence, point)
    }
}

/// Text label
#[derive(Debug)]
pub struct TextObject {
    sequence: SequenceId,
    text: String,
    color: Color,
}

impl TextObject {
    pub(super) fn new(sequences: &mut SequenceManager, text: String, color: Color) -> Self {
        Self {
            sequence: sequences.create_debug_text(text.clone(), color),
            text,
            color,
        }
    }

    /// Text sequence
    pub fn sequence(&self) -> SequenceId {
        self.sequence
    }

    /// Displayed text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Replace the displayed text
    pub fn set_text(&mut self, sequences: &mut SequenceManager, text: impl Into<String>) -> EngineResult<()> {
        let text = text.into();
        sequences.set_text(self.sequence, text.clone())?;
        self.text = text;
        Ok(())
    }

    /// Text color
    pub fn color(&self) -> Color {
        self.color
    }

    /// Change the text color
    pub fn set_color(&mut self, sequences: &mut SequenceManager, color: Color) -> EngineResult<()> {
        sequences.set_color(self.sequence, color)?;
        self.color = color;
        Ok(())
    }
}

/// What a game object is
#[derive(Debug)]
pub enum ObjectKind {
    /// Scene container
    Location(Location),
    /// Grouping layer
    Layer(Layer),
    /// Background image
    LayerImage(LayerImage),
    /// Sprite driven by a state machine
    Animated(AnimatedObject),
    /// Debug rectangle
    Gizmo(Gizmo),
    /// Text label
    Text(TextObject),
    /// Closed polygon
    Region(Region),
    /// Polyline carrying another object
    Path(Path),
    /// Polygon with a walkability grid
    PathFindRegion(PathFindRegion),
}

impl ObjectKind {
    /// Variant name for logs and error messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::Location(_) => "location",
            Self::Layer(_) => "layer",
            Self::LayerImage(_) => "layer image",
            Self::Animated(_) => "animated object",
            Self::Gizmo(_) => "gizmo",
            Self::Text(_) => "text object",
            Self::Region(_) => "region",
            Self::Path(_) => "path",
            Self::PathFindRegion(_) => "path find region",
        }
    }

    /// Sequence drawn for the object itself; animated objects pick theirs
    /// from the current state
    pub fn own_sequence(&self) -> Option<SequenceId> {
        match self {
            Self::LayerImage(image) => image.sequence(),
            Self::Gizmo(gizmo) => Some(gizmo.sequence()),
            Self::Text(text) => Some(text.sequence()),
            Self::Region(region) => Some(region.outline().sequence()),
            Self::Path(path) => Some(path.outline().sequence()),
            Self::PathFindRegion(region) => Some(region.outline().sequence()),
            Self::Location(_) | Self::Layer(_) | Self::Animated(_) => None,
        }
    }

    /// Outline of the point-based variants
    pub fn outline(&self) -> Option<&Outlined> {
        match self {
            Self::Region(region) => Some(region.outline()),
            Self::Path(path) => Some(path.outline()),
            Self::PathFindRegion(region) => Some(region.outline()),
            _ => None,
        }
    }

    /// Hand over every sequence the variant owns, leaving it empty
    pub(super) fn take_sequences(&mut self) -> Vec<SequenceId> {
        match self {
            Self::Animated(animated) => animated.take_sequences(),
            Self::LayerImage(image) => image.take_sequence().into_iter().collect(),
            other => other.own_sequence().into_iter().collect(),
        }
    }
}
