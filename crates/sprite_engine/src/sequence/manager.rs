//! Sequence manager
//!
//! Owns every [`Sequence`] and the per-frame render queue. Game objects keep
//! only [`SequenceId`]s; an id stops resolving the moment its sequence is
//! released.
//!
//! A frame has two phases. During the scene update each visible sequence is
//! rendered: it advances its animation, captures the active world transform
//! and joins the queue. After the update [`SequenceManager::flush`] draws the
//! queue in order and empties it.

use super::animation::{Playback, SequenceFlags};
use super::sound_track::SoundTrack;
use crate::assets::{DdsHeader, FileManager, FileRef, LoadHint};
use crate::audio::{SoundId, SoundManager};
use crate::backend::{Color, ColorQuad, GraphicsDevice, LineStrip, PointList, TextDraw, TextureLock};
use crate::core::{EngineError, EngineResult};
use crate::foundation::collections::{new_key_type, SlotMap};
use crate::foundation::math::{scaling, transform_point, translation, Mat3, Vec2};
use crate::render::texture_manager::TextureEntry;
use crate::render::{QuadHandle, TextureHandle, TextureManager, TransformStack, VertexManager};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

new_key_type! {
    /// Generation-checked id of a sequence
    pub struct SequenceId;
}

/// Size of the points drawn for pathfinding grid nodes
const GRID_NODE_SIZE: f32 = 2.0;

/// Managers a sequence needs to load and draw itself
pub struct SequenceResources<'a> {
    /// Graphics device
    pub device: &'a mut dyn GraphicsDevice,
    /// File cache
    pub files: &'a mut FileManager,
    /// Texture manager
    pub textures: &'a mut TextureManager,
    /// Quad geometry manager
    pub vertices: &'a mut VertexManager,
    /// Sound manager, for sequences with sound tracks
    pub sounds: &'a mut SoundManager,
}

/// One drawable frame: a texture and the quad it is mapped on
#[derive(Debug, Clone)]
pub struct SpriteFrame {
    /// Frame texture
    pub texture: TextureHandle,
    /// Quad sized like the texture
    pub quad: QuadHandle,
}

/// Frames that stay resident as separate textures
#[derive(Debug, Clone)]
pub struct FrameAnimation {
    /// Frames in playback order
    pub frames: Vec<SpriteFrame>,
}

/// Frames streamed through a single dynamic texture.
///
/// Only the decoded files stay in memory; the texture is rewritten when the
/// current frame differs from the uploaded one.
#[derive(Debug, Clone)]
pub struct StreamedAnimation {
    frames: Vec<FileRef>,
    header: DdsHeader,
    texture: TextureHandle,
    quad: QuadHandle,
    loaded_frame: Option<i32>,
}

impl StreamedAnimation {
    /// Frame uploaded to the texture, if any
    pub fn loaded_frame(&self) -> Option<i32> {
        self.loaded_frame
    }

    fn fill(&mut self, device: &mut dyn GraphicsDevice, textures: &mut TextureManager, frame: i32) -> EngineResult<()> {
        textures.ensure_loaded(device, &self.texture)?;
        let target = textures
            .entry(&self.texture)
            .and_then(TextureEntry::device_texture)
            .ok_or(EngineError::InvalidHandle("texture"))?;
        let file = usize::try_from(frame)
            .ok()
            .and_then(|index| self.frames.get(index))
            .ok_or_else(|| EngineError::invalid_argument(format!("frame {frame} out of range")))?;

        let row_pitch = self.header.row_pitch() as usize;
        let mut lock = TextureLock::acquire(device, target)?;
        for (row, bytes) in self.header.payload(file).chunks(row_pitch).enumerate() {
            lock.write_rows(row as u32, bytes)?;
        }
        drop(lock);

        self.loaded_frame = Some(frame);
        log::trace!("Streamed frame {frame} uploaded");
        Ok(())
    }
}

/// How an outline is drawn
#[derive(Debug, Clone, PartialEq)]
pub enum OutlineMode {
    /// Closed polygon
    Region,
    /// Open polyline
    Path,
    /// Closed polygon plus the walkable grid nodes
    PathFind {
        /// Centres of walkable cells in local coordinates
        nodes: Vec<Vec2>,
    },
}

/// Debug outline of a point container
#[derive(Debug, Clone, PartialEq)]
pub struct Outline {
    /// Outline vertices in local coordinates
    pub points: Vec<Vec2>,
    /// Line color
    pub color: Color,
    /// Drawing mode
    pub mode: OutlineMode,
}

/// What a sequence draws
#[derive(Debug, Clone)]
pub enum SequenceKind {
    /// Single image
    Static(SpriteFrame),
    /// Frame animation
    Animated(FrameAnimation),
    /// Frame animation with sounds bound to frames
    AnimatedWithSound(FrameAnimation, SoundTrack),
    /// Streamed animation
    LargeAnimated(StreamedAnimation),
    /// Streamed animation with sounds bound to frames
    LargeAnimatedWithSound(StreamedAnimation, SoundTrack),
    /// Region or path outline
    Outline(Outline),
    /// Filled rectangle the size of the bounding box
    DebugBox(Color),
    /// Text drawn at the sequence origin
    DebugText {
        /// Text to draw
        text: String,
        /// Text color
        color: Color,
    },
}

impl SequenceKind {
    /// True for kinds whose frame advances over time
    pub fn is_animated(&self) -> bool {
        matches!(
            self,
            Self::Animated(_) | Self::AnimatedWithSound(..) | Self::LargeAnimated(_) | Self::LargeAnimatedWithSound(..)
        )
    }

    /// Texture the sequence currently draws with
    pub fn texture(&self, frame: i32) -> Option<&TextureHandle> {
        match self {
            Self::Static(sprite) => Some(&sprite.texture),
            Self::Animated(animation) | Self::AnimatedWithSound(animation, _) => usize::try_from(frame)
                .ok()
                .and_then(|index| animation.frames.get(index))
                .map(|sprite| &sprite.texture),
            Self::LargeAnimated(streamed) | Self::LargeAnimatedWithSound(streamed, _) => Some(&streamed.texture),
            Self::Outline(_) | Self::DebugBox(_) | Self::DebugText { .. } => None,
        }
    }

    /// Sound track, if the kind carries one
    pub fn sound_track(&self) -> Option<&SoundTrack> {
        match self {
            Self::AnimatedWithSound(_, track) | Self::LargeAnimatedWithSound(_, track) => Some(track),
            _ => None,
        }
    }

    fn sound_track_mut(&mut self) -> Option<&mut SoundTrack> {
        match self {
            Self::AnimatedWithSound(_, track) | Self::LargeAnimatedWithSound(_, track) => Some(track),
            _ => None,
        }
    }

    fn streamed_mut(&mut self) -> Option<&mut StreamedAnimation> {
        match self {
            Self::LargeAnimated(streamed) | Self::LargeAnimatedWithSound(streamed, _) => Some(streamed),
            _ => None,
        }
    }
}

/// Renderable unit owned by the [`SequenceManager`]
#[derive(Debug, Clone)]
pub struct Sequence {
    position: Vec2,
    bounding_box: Vec2,
    playback: Playback,
    transform: Mat3,
    kind: SequenceKind,
}

impl Sequence {
    fn new(kind: SequenceKind, playback: Playback, bounding_box: Vec2) -> Self {
        Self {
            position: Vec2::zeros(),
            bounding_box,
            playback,
            transform: Mat3::identity(),
            kind,
        }
    }

    /// What the sequence draws
    pub fn kind(&self) -> &SequenceKind {
        &self.kind
    }

    /// Playback state
    pub fn playback(&self) -> &Playback {
        &self.playback
    }

    /// Offset from the owning object
    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Unscaled size of the drawn image
    pub fn bounding_box(&self) -> Vec2 {
        self.bounding_box
    }

    /// World transform captured by the last render
    pub fn transform(&self) -> Mat3 {
        self.transform
    }

    /// Offset by `position`; a flipped axis is mirrored inside the bounding box
    fn local_transform(&self) -> Mat3 {
        let hflip = self.playback.flags.contains(SequenceFlags::HORIZONTAL_FLIP);
        let vflip = self.playback.flags.contains(SequenceFlags::VERTICAL_FLIP);
        if !hflip && !vflip {
            return translation(self.position);
        }
        let offset = Vec2::new(
            self.position.x + if hflip { self.bounding_box.x } else { 0.0 },
            self.position.y + if vflip { self.bounding_box.y } else { 0.0 },
        );
        let mirror = Vec2::new(if hflip { -1.0 } else { 1.0 }, if vflip { -1.0 } else { 1.0 });
        translation(offset) * scaling(mirror)
    }

    fn draw(&mut self, res: &mut SequenceResources<'_>) -> EngineResult<()> {
        let transform = self.transform;
        let frame = self.playback.current_frame;
        match &mut self.kind {
            SequenceKind::Static(sprite) => draw_sprite(res, sprite, transform),
            SequenceKind::Animated(animation) | SequenceKind::AnimatedWithSound(animation, _) => {
                let sprite = usize::try_from(frame)
                    .ok()
                    .and_then(|index| animation.frames.get(index))
                    .ok_or_else(|| EngineError::invalid_argument(format!("frame {frame} out of range")))?;
                draw_sprite(res, sprite, transform)
            }
            SequenceKind::LargeAnimated(streamed) | SequenceKind::LargeAnimatedWithSound(streamed, _) => {
                let bound = res.textures.bind(res.device, &streamed.texture)?;
                // A recreated texture comes back empty
                if bound.reloaded || streamed.loaded_frame != Some(frame) {
                    streamed.fill(res.device, res.textures, frame)?;
                }
                res.vertices.draw(res.device, &streamed.quad, bound, transform)
            }
            SequenceKind::Outline(outline) => {
                if outline.points.len() > 1 {
                    let mut points = outline.points.clone();
                    if outline.mode != OutlineMode::Path && points.len() > 2 {
                        points.push(points[0]);
                    }
                    res.device.draw_lines(&LineStrip {
                        points,
                        color: outline.color,
                        transform,
                    })?;
                }
                if let OutlineMode::PathFind { nodes } = &outline.mode {
                    if !nodes.is_empty() {
                        res.device.draw_points(&PointList {
                            points: nodes.clone(),
                            color: Color::GRID_NODE,
                            size: GRID_NODE_SIZE,
                            transform,
                        })?;
                    }
                }
                Ok(())
            }
            SequenceKind::DebugBox(color) => {
                res.device.draw_quad(&ColorQuad {
                    width: self.bounding_box.x,
                    height: self.bounding_box.y,
                    color: *color,
                    transform,
                })?;
                Ok(())
            }
            SequenceKind::DebugText { text, color } => {
                res.device.draw_text(&TextDraw {
                    text: text.clone(),
                    position: transform_point(&transform, Vec2::zeros()),
                    color: *color,
                })?;
                Ok(())
            }
        }
    }
}

fn draw_sprite(res: &mut SequenceResources<'_>, sprite: &SpriteFrame, transform: Mat3) -> EngineResult<()> {
    let bound = res.textures.bind(res.device, &sprite.texture)?;
    res.vertices.draw(res.device, &sprite.quad, bound, transform)
}

fn frame_path(directory: &str, index: i32) -> String {
    format!("{}/{index}.png", directory.trim_end_matches('/'))
}

fn compression_hint(compressed: bool) -> LoadHint {
    if compressed {
        LoadHint::COMPRESSED_TEXTURE
    } else {
        LoadHint::empty()
    }
}

/// Owner of all sequences and the render queue
pub struct SequenceManager {
    sequences: SlotMap<SequenceId, Sequence>,
    queue: Vec<SequenceId>,
    transforms: TransformStack,
    rng: StdRng,
}

impl std::fmt::Debug for SequenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceManager")
            .field("sequences", &self.sequences.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

impl SequenceManager {
    /// Manager reading world transforms from `transforms`
    pub fn new(transforms: TransformStack) -> Self {
        Self::with_rng(transforms, StdRng::from_entropy())
    }

    /// Manager with a deterministic sound-track generator
    pub fn with_seed(transforms: TransformStack, seed: u64) -> Self {
        Self::with_rng(transforms, StdRng::seed_from_u64(seed))
    }

    fn with_rng(transforms: TransformStack, rng: StdRng) -> Self {
        Self {
            sequences: SlotMap::with_key(),
            queue: Vec::new(),
            transforms,
            rng,
        }
    }

    fn insert(&mut self, sequence: Sequence) -> SequenceId {
        self.sequences.insert(sequence)
    }

    fn track_rng(&mut self) -> StdRng {
        StdRng::seed_from_u64(self.rng.gen())
    }

    fn load_sprite(res: &mut SequenceResources<'_>, path: &str, compressed: bool) -> EngineResult<(SpriteFrame, Vec2)> {
        let texture = res.textures.load(res.files, path, compressed)?;
        let info = res.textures.info(&texture).ok_or(EngineError::InvalidHandle("texture"))?;
        let quad = res.vertices.create(res.device, info.width, info.height)?;
        let size = Vec2::new(info.original_width as f32, info.original_height as f32);
        Ok((SpriteFrame { texture, quad }, size))
    }

    fn load_frames(
        res: &mut SequenceResources<'_>,
        directory: &str,
        indices: &[i32],
        compressed: bool,
    ) -> EngineResult<(FrameAnimation, Vec2)> {
        if indices.is_empty() {
            return Err(EngineError::invalid_argument("animation has no frames"));
        }
        let mut frames = Vec::with_capacity(indices.len());
        let mut size = Vec2::zeros();
        for &index in indices {
            let (sprite, frame_size) = Self::load_sprite(res, &frame_path(directory, index), compressed)?;
            frames.push(sprite);
            size = frame_size;
        }
        Ok((FrameAnimation { frames }, size))
    }

    fn load_streamed(
        res: &mut SequenceResources<'_>,
        directory: &str,
        indices: &[i32],
        compressed: bool,
    ) -> EngineResult<(StreamedAnimation, Vec2)> {
        let mut frames = Vec::with_capacity(indices.len());
        let mut header: Option<DdsHeader> = None;
        for &index in indices {
            let path = frame_path(directory, index);
            let file = res.files.load(&path, compression_hint(compressed))?;
            let frame_header = DdsHeader::parse(&file)?;
            match header {
                Some(first) if (first.width, first.height, first.format) != (frame_header.width, frame_header.height, frame_header.format) => {
                    return Err(EngineError::FormatValidation(format!(
                        "{path}: {}x{} frame in a {}x{} animation",
                        frame_header.width, frame_header.height, first.width, first.height
                    )));
                }
                Some(_) => {}
                None => header = Some(frame_header),
            }
            frames.push(file);
        }
        let header = header.ok_or_else(|| EngineError::invalid_argument("animation has no frames"))?;

        let texture = res
            .textures
            .create_dynamic(header.width, header.height, header.format.is_compressed());
        let quad = res.vertices.create(res.device, header.width, header.height)?;
        let size = Vec2::new(header.original_width as f32, header.original_height as f32);
        Ok((
            StreamedAnimation {
                frames,
                header,
                texture,
                quad,
                loaded_frame: None,
            },
            size,
        ))
    }

    /// Single image sequence
    pub fn create_static(&mut self, res: &mut SequenceResources<'_>, path: &str, compressed: bool) -> EngineResult<SequenceId> {
        let (sprite, size) = Self::load_sprite(res, path, compressed)?;
        Ok(self.insert(Sequence::new(SequenceKind::Static(sprite), Playback::still(), size)))
    }

    /// Animation of `directory/<index>.png` files, each kept as its own texture
    pub fn create_animated(
        &mut self,
        res: &mut SequenceResources<'_>,
        directory: &str,
        indices: &[i32],
        compressed: bool,
    ) -> EngineResult<SequenceId> {
        let (animation, size) = Self::load_frames(res, directory, indices, compressed)?;
        let playback = Playback::animated(animation.frames.len());
        Ok(self.insert(Sequence::new(SequenceKind::Animated(animation), playback, size)))
    }

    /// Animation with sounds started when playback passes their frames
    pub fn create_sound_animated(
        &mut self,
        res: &mut SequenceResources<'_>,
        directory: &str,
        indices: &[i32],
        compressed: bool,
        sounds: Vec<(i32, SoundId)>,
    ) -> EngineResult<SequenceId> {
        let (animation, size) = Self::load_frames(res, directory, indices, compressed)?;
        let playback = Playback::animated(animation.frames.len());
        let track = SoundTrack::new(sounds, self.track_rng());
        Ok(self.insert(Sequence::new(
            SequenceKind::AnimatedWithSound(animation, track),
            playback,
            size,
        )))
    }

    /// Animation streamed through one dynamic texture
    pub fn create_large(
        &mut self,
        res: &mut SequenceResources<'_>,
        directory: &str,
        indices: &[i32],
        compressed: bool,
    ) -> EngineResult<SequenceId> {
        let (streamed, size) = Self::load_streamed(res, directory, indices, compressed)?;
        let playback = Playback::animated(streamed.frames.len());
        Ok(self.insert(Sequence::new(SequenceKind::LargeAnimated(streamed), playback, size)))
    }

    /// Streamed animation with a sound track
    pub fn create_large_sound(
        &mut self,
        res: &mut SequenceResources<'_>,
        directory: &str,
        indices: &[i32],
        compressed: bool,
        sounds: Vec<(i32, SoundId)>,
    ) -> EngineResult<SequenceId> {
        let (streamed, size) = Self::load_streamed(res, directory, indices, compressed)?;
        let playback = Playback::animated(streamed.frames.len());
        let track = SoundTrack::new(sounds, self.track_rng());
        Ok(self.insert(Sequence::new(
            SequenceKind::LargeAnimatedWithSound(streamed, track),
            playback,
            size,
        )))
    }

    /// Outline of a point container
    pub fn create_outline(&mut self, points: Vec<Vec2>, color: Color, mode: OutlineMode) -> SequenceId {
        let outline = Outline { points, color, mode };
        self.insert(Sequence::new(SequenceKind::Outline(outline), Playback::still(), Vec2::zeros()))
    }

    /// Filled `width` x `height` rectangle
    pub fn create_debug_box(&mut self, width: f32, height: f32, color: Color) -> SequenceId {
        self.insert(Sequence::new(
            SequenceKind::DebugBox(color),
            Playback::still(),
            Vec2::new(width, height),
        ))
    }

    /// Text label
    pub fn create_debug_text(&mut self, text: impl Into<String>, color: Color) -> SequenceId {
        let kind = SequenceKind::DebugText {
            text: text.into(),
            color,
        };
        self.insert(Sequence::new(kind, Playback::still(), Vec2::zeros()))
    }

    /// Release a sequence; its id is invalid from now on
    pub fn release(&mut self, id: SequenceId) -> EngineResult<()> {
        self.sequences.remove(id).ok_or(EngineError::InvalidHandle("sequence"))?;
        self.queue.retain(|queued| *queued != id);
        Ok(())
    }

    /// True while `id` refers to a live sequence
    pub fn contains(&self, id: SequenceId) -> bool {
        self.sequences.contains_key(id)
    }

    /// Sequence behind `id`
    pub fn get(&self, id: SequenceId) -> EngineResult<&Sequence> {
        self.sequences.get(id).ok_or(EngineError::InvalidHandle("sequence"))
    }

    fn get_mut(&mut self, id: SequenceId) -> EngineResult<&mut Sequence> {
        self.sequences.get_mut(id).ok_or(EngineError::InvalidHandle("sequence"))
    }

    /// Advance a sequence by `dt` seconds and queue it for drawing under the
    /// active world transform.
    ///
    /// Sounds bound to the frames playback moved past are started, and a
    /// streamed animation uploads its new frame.
    pub fn render(&mut self, id: SequenceId, dt: f32, res: &mut SequenceResources<'_>) -> EngineResult<()> {
        let world = self.transforms.top();
        let sequence = self.sequences.get_mut(id).ok_or(EngineError::InvalidHandle("sequence"))?;

        let previous = sequence.playback.current_frame;
        if sequence.kind.is_animated() {
            sequence.playback.advance(dt);
        }
        let current = sequence.playback.current_frame;
        let reversed = sequence.playback.flags.contains(SequenceFlags::REVERSED);

        if let Some(track) = sequence.kind.sound_track_mut() {
            track.trigger(res.sounds, previous, current, reversed)?;
        }
        if let Some(streamed) = sequence.kind.streamed_mut() {
            if streamed.loaded_frame != Some(current) {
                streamed.fill(res.device, res.textures, current)?;
            }
        }

        let local = sequence.local_transform();
        sequence.transform = world * local;
        self.queue.push(id);
        Ok(())
    }

    /// Recompute the world transform without advancing or queueing
    pub fn update_transform(&mut self, id: SequenceId) -> EngineResult<()> {
        let world = self.transforms.top();
        let sequence = self.get_mut(id)?;
        let local = sequence.local_transform();
        sequence.transform = world * local;
        Ok(())
    }

    /// Draw every queued sequence in queue order
    pub fn draw_queue(&mut self, res: &mut SequenceResources<'_>) -> EngineResult<()> {
        let sequences = &mut self.sequences;
        for id in &self.queue {
            if let Some(sequence) = sequences.get_mut(*id) {
                sequence.draw(res)?;
            }
        }
        Ok(())
    }

    /// Draw the queue and empty it
    pub fn flush(&mut self, res: &mut SequenceResources<'_>) -> EngineResult<()> {
        let result = self.draw_queue(res);
        self.queue.clear();
        result
    }

    /// Drop queued sequences without drawing them
    pub fn clear_queue(&mut self) {
        self.queue.clear();
    }

    /// Number of queued sequences
    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Number of live sequences
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// True if no sequences exist
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Release every sequence
    pub fn clear(&mut self) {
        self.queue.clear();
        self.sequences.clear();
    }

    // Properties

    /// Offset from the owning object
    pub fn position(&self, id: SequenceId) -> EngineResult<Vec2> {
        Ok(self.get(id)?.position)
    }

    /// Set the offset from the owning object
    pub fn set_position(&mut self, id: SequenceId, position: Vec2) -> EngineResult<()> {
        self.get_mut(id)?.position = position;
        Ok(())
    }

    /// Unscaled image size
    pub fn bounding_box(&self, id: SequenceId) -> EngineResult<Vec2> {
        Ok(self.get(id)?.bounding_box)
    }

    /// Frames per second
    pub fn fps(&self, id: SequenceId) -> EngineResult<i32> {
        Ok(self.get(id)?.playback.fps)
    }

    /// Set frames per second
    pub fn set_fps(&mut self, id: SequenceId, fps: i32) -> EngineResult<()> {
        self.get_mut(id)?.playback.fps = fps;
        Ok(())
    }

    /// Current frame
    pub fn frame(&self, id: SequenceId) -> EngineResult<i32> {
        Ok(self.get(id)?.playback.current_frame)
    }

    /// Jump to `frame` and resume playback.
    ///
    /// The frame is clamped to the animation and counted from the end when
    /// reversed. Attached sounds that are not prolonged are rewound.
    pub fn set_frame(&mut self, id: SequenceId, frame: i32, sounds: &mut SoundManager) -> EngineResult<()> {
        let sequence = self.get_mut(id)?;
        sequence.playback.set_frame(frame);
        if let Some(track) = sequence.kind.sound_track() {
            track.stop(sounds)?;
        }
        Ok(())
    }

    /// Number of frames
    pub fn frame_count(&self, id: SequenceId) -> EngineResult<i32> {
        Ok(self.get(id)?.playback.frame_count)
    }

    fn flag(&self, id: SequenceId, flag: SequenceFlags) -> EngineResult<bool> {
        Ok(self.get(id)?.playback.flags.contains(flag))
    }

    fn set_flag(&mut self, id: SequenceId, flag: SequenceFlags, value: bool) -> EngineResult<()> {
        self.get_mut(id)?.playback.flags.set(flag, value);
        Ok(())
    }

    /// Wraps around at the end
    pub fn looped(&self, id: SequenceId) -> EngineResult<bool> {
        self.flag(id, SequenceFlags::LOOPED)
    }

    /// Set looping
    pub fn set_looped(&mut self, id: SequenceId, looped: bool) -> EngineResult<()> {
        self.set_flag(id, SequenceFlags::LOOPED, looped)
    }

    /// Plays backwards
    pub fn reversed(&self, id: SequenceId) -> EngineResult<bool> {
        self.flag(id, SequenceFlags::REVERSED)
    }

    /// Set backwards playback
    pub fn set_reversed(&mut self, id: SequenceId, reversed: bool) -> EngineResult<()> {
        self.set_flag(id, SequenceFlags::REVERSED, reversed)
    }

    /// Mirrored top to bottom
    pub fn vertical_flip(&self, id: SequenceId) -> EngineResult<bool> {
        self.flag(id, SequenceFlags::VERTICAL_FLIP)
    }

    /// Mirror top to bottom
    pub fn set_vertical_flip(&mut self, id: SequenceId, flip: bool) -> EngineResult<()> {
        self.set_flag(id, SequenceFlags::VERTICAL_FLIP, flip)
    }

    /// Mirrored left to right
    pub fn horizontal_flip(&self, id: SequenceId) -> EngineResult<bool> {
        self.flag(id, SequenceFlags::HORIZONTAL_FLIP)
    }

    /// Mirror left to right
    pub fn set_horizontal_flip(&mut self, id: SequenceId, flip: bool) -> EngineResult<()> {
        self.set_flag(id, SequenceFlags::HORIZONTAL_FLIP, flip)
    }

    /// Advancing frames
    pub fn is_playing(&self, id: SequenceId) -> EngineResult<bool> {
        Ok(self.get(id)?.playback.is_playing)
    }

    /// Passed its last frame during the latest render
    pub fn is_over(&self, id: SequenceId) -> EngineResult<bool> {
        Ok(self.get(id)?.playback.is_over)
    }

    /// Resume playback
    pub fn play(&mut self, id: SequenceId) -> EngineResult<()> {
        self.get_mut(id)?.playback.is_playing = true;
        Ok(())
    }

    /// Pause playback and rewind attached sounds that are not prolonged
    pub fn stop(&mut self, id: SequenceId, sounds: &mut SoundManager) -> EngineResult<()> {
        let sequence = self.get_mut(id)?;
        sequence.playback.is_playing = false;
        if let Some(track) = sequence.kind.sound_track() {
            track.stop(sounds)?;
        }
        Ok(())
    }

    /// World transform captured by the last render
    pub fn transform(&self, id: SequenceId) -> EngineResult<Mat3> {
        Ok(self.get(id)?.transform)
    }

    /// True if `point` lies strictly inside the transformed bounding box
    pub fn is_inside(&self, id: SequenceId, point: Vec2) -> EngineResult<bool> {
        let sequence = self.get(id)?;
        let a = transform_point(&sequence.transform, Vec2::zeros());
        let b = transform_point(&sequence.transform, sequence.bounding_box);
        let (min, max) = (a.inf(&b), a.sup(&b));
        Ok(min.x < point.x && point.x < max.x && min.y < point.y && point.y < max.y)
    }

    /// Texture currently drawn
    pub fn texture(&self, id: SequenceId) -> EngineResult<Option<TextureHandle>> {
        let sequence = self.get(id)?;
        Ok(sequence.kind.texture(sequence.playback.current_frame).cloned())
    }

    /// Bind a sound to a frame
    pub fn add_sound(&mut self, id: SequenceId, frame: i32, sound: SoundId) -> EngineResult<()> {
        let track = self
            .get_mut(id)?
            .kind
            .sound_track_mut()
            .ok_or_else(|| EngineError::invalid_argument("sequence has no sound track"))?;
        track.add_sound(frame, sound);
        Ok(())
    }

    /// Unbind a sound from a frame
    pub fn del_sound(&mut self, id: SequenceId, frame: i32, sound: SoundId) -> EngineResult<()> {
        self.get_mut(id)?
            .kind
            .sound_track_mut()
            .ok_or_else(|| EngineError::invalid_argument("sequence has no sound track"))?
            .del_sound(frame, sound)
    }

    fn outline_mut(&mut self, id: SequenceId) -> EngineResult<&mut Outline> {
        match &mut self.get_mut(id)?.kind {
            SequenceKind::Outline(outline) => Ok(outline),
            _ => Err(EngineError::invalid_argument("sequence is not an outline")),
        }
    }

    /// Replace the outline vertices
    pub fn set_outline_points(&mut self, id: SequenceId, points: Vec<Vec2>) -> EngineResult<()> {
        self.outline_mut(id)?.points = points;
        Ok(())
    }

    /// Replace the walkable grid nodes of a pathfinding outline
    pub fn set_outline_nodes(&mut self, id: SequenceId, nodes: Vec<Vec2>) -> EngineResult<()> {
        self.outline_mut(id)?.mode = OutlineMode::PathFind { nodes };
        Ok(())
    }

    /// Set the color of an outline, box or text
    pub fn set_color(&mut self, id: SequenceId, color: Color) -> EngineResult<()> {
        match &mut self.get_mut(id)?.kind {
            SequenceKind::Outline(outline) => outline.color = color,
            SequenceKind::DebugBox(current) | SequenceKind::DebugText { color: current, .. } => *current = color,
            _ => return Err(EngineError::invalid_argument("sequence has no color")),
        }
        Ok(())
    }

    /// Resize a debug box
    pub fn set_box_size(&mut self, id: SequenceId, width: f32, height: f32) -> EngineResult<()> {
        let sequence = self.get_mut(id)?;
        if !matches!(sequence.kind, SequenceKind::DebugBox(_)) {
            return Err(EngineError::invalid_argument("sequence is not a box"));
        }
        sequence.bounding_box = Vec2::new(width, height);
        Ok(())
    }

    /// Replace the text of a label
    pub fn set_text(&mut self, id: SequenceId, text: impl Into<String>) -> EngineResult<()> {
        match &mut self.get_mut(id)?.kind {
            SequenceKind::DebugText { text: current, .. } => {
                *current = text.into();
                Ok(())
            }
            _ => Err(EngineError::invalid_argument("sequence is not a text")),
        }
    }
}
