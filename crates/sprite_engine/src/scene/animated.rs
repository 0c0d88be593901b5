//! Animated objects
//!
//! An animated object owns named sequences and a set of named [`State`]s.
//! Each frame the current state's `link` hook may pick the next state, then
//! `on_update` runs and the state's sequence is rendered.
//!
//! Hooks run while no borrow of the object is held, so they are free to edit
//! the object (or switch its state) through its [`ObjectRef`].

use std::collections::BTreeMap;

use crate::core::{EngineError, EngineResult};
use crate::engine::EngineContext;
use crate::script::{self, Hook, ScriptValue};
use crate::sequence::{SequenceId, SequenceManager};

use super::object::{GameObject, ObjectRef};
use super::state::State;

/// Sequences and states of an animated object
#[derive(Debug, Default)]
pub struct AnimatedObject {
    sequences: BTreeMap<String, SequenceId>,
    states: BTreeMap<String, State>,
    state: Option<String>,
    in_zregion: bool,
}

impl AnimatedObject {
    /// Sequence registered under `name`
    pub fn sequence(&self, name: &str) -> Option<SequenceId> {
        self.sequences.get(name).copied()
    }

    /// Sequence names in order
    pub fn sequence_names(&self) -> impl Iterator<Item = &str> {
        self.sequences.keys().map(String::as_str)
    }

    /// Register a state, returning the one it replaces
    pub fn add_state(&mut self, name: impl Into<String>, state: State) -> Option<State> {
        self.states.insert(name.into(), state)
    }

    /// Remove a state. The current state can't be removed.
    pub fn remove_state(&mut self, name: &str) -> EngineResult<Option<State>> {
        if self.state.as_deref() == Some(name) {
            return Err(EngineError::invalid_argument(format!("state '{name}' is active")));
        }
        Ok(self.states.remove(name))
    }

    /// State registered under `name`
    pub fn state(&self, name: &str) -> Option<&State> {
        self.states.get(name)
    }

    /// Name of the current state
    pub fn state_name(&self) -> Option<&str> {
        self.state.as_deref()
    }

    /// Current state
    pub fn current_state(&self) -> EngineResult<&State> {
        let name = self
            .state
            .as_deref()
            .ok_or_else(|| EngineError::invalid_argument("animated object has no current state"))?;
        self.states
            .get(name)
            .ok_or_else(|| EngineError::invalid_argument(format!("unknown state '{name}'")))
    }

    /// Sequence played by the current state
    pub fn current_sequence(&self) -> EngineResult<Option<SequenceId>> {
        match &self.current_state()?.sequence {
            Some(name) => self
                .sequence(name)
                .map(Some)
                .ok_or_else(|| EngineError::invalid_argument(format!("unknown sequence '{name}'"))),
            None => Ok(None),
        }
    }

    /// True if a z-region claimed the object for this frame
    pub fn is_in_zregion(&self) -> bool {
        self.in_zregion
    }

    /// Set by a z-region that draws the object itself; cleared after the
    /// next update
    pub fn set_in_zregion(&mut self, inside: bool) {
        self.in_zregion = inside;
    }

    pub(super) fn take_zregion(&mut self) -> bool {
        std::mem::take(&mut self.in_zregion)
    }

    fn replace_sequence(&mut self, sequences: &mut SequenceManager, name: &str, id: SequenceId) -> EngineResult<SequenceId> {
        if let Some(old) = self.sequences.insert(name.to_string(), id) {
            sequences.release(old)?;
        }
        Ok(id)
    }

    pub(super) fn take_sequences(&mut self) -> Vec<SequenceId> {
        std::mem::take(&mut self.sequences).into_values().collect()
    }
}

/// How frames are stored
#[derive(Clone, Copy)]
enum Storage {
    /// One texture per frame
    Frames,
    /// Frames streamed through one dynamic texture
    Streamed,
}

impl GameObject {
    /// Load an animation from `directory/<index>.png` under `name`.
    /// A sequence already registered under `name` is released.
    pub fn add_sequence(
        &mut self,
        ctx: &mut EngineContext,
        name: &str,
        directory: &str,
        frames: &[i32],
        compressed: bool,
    ) -> EngineResult<SequenceId> {
        self.load_sequence(ctx, name, directory, frames, compressed, Storage::Frames, None)
    }

    /// Load an animation that starts sounds of this object on given frames.
    /// `sounds` pairs frame indices with names passed to
    /// [`GameObject::add_sound`].
    pub fn add_sound_sequence(
        &mut self,
        ctx: &mut EngineContext,
        name: &str,
        directory: &str,
        frames: &[i32],
        sounds: &[(i32, &str)],
        compressed: bool,
    ) -> EngineResult<SequenceId> {
        self.load_sequence(ctx, name, directory, frames, compressed, Storage::Frames, Some(sounds))
    }

    /// Load an animation streamed through a single texture
    pub fn add_large_sequence(
        &mut self,
        ctx: &mut EngineContext,
        name: &str,
        directory: &str,
        frames: &[i32],
        compressed: bool,
    ) -> EngineResult<SequenceId> {
        self.load_sequence(ctx, name, directory, frames, compressed, Storage::Streamed, None)
    }

    /// Streamed animation with sounds on given frames
    pub fn add_large_sound_sequence(
        &mut self,
        ctx: &mut EngineContext,
        name: &str,
        directory: &str,
        frames: &[i32],
        sounds: &[(i32, &str)],
        compressed: bool,
    ) -> EngineResult<SequenceId> {
        self.load_sequence(ctx, name, directory, frames, compressed, Storage::Streamed, Some(sounds))
    }

    #[allow(clippy::too_many_arguments)]
    fn load_sequence(
        &mut self,
        ctx: &mut EngineContext,
        name: &str,
        directory: &str,
        frames: &[i32],
        compressed: bool,
        storage: Storage,
        sounds: Option<&[(i32, &str)]>,
    ) -> EngineResult<SequenceId> {
        self.as_animated()?;
        let track = sounds
            .map(|sounds| {
                sounds
                    .iter()
                    .map(|&(frame, sound)| {
                        self.sound(sound)
                            .map(|id| (frame, id))
                            .ok_or_else(|| EngineError::invalid_argument(format!("unknown sound '{sound}'")))
                    })
                    .collect::<EngineResult<Vec<_>>>()
            })
            .transpose()?;

        let (sequences, mut res) = ctx.split();
        let id = match (storage, track) {
            (Storage::Frames, None) => sequences.create_animated(&mut res, directory, frames, compressed)?,
            (Storage::Frames, Some(track)) => {
                sequences.create_sound_animated(&mut res, directory, frames, compressed, track)?
            }
            (Storage::Streamed, None) => sequences.create_large(&mut res, directory, frames, compressed)?,
            (Storage::Streamed, Some(track)) => {
                sequences.create_large_sound(&mut res, directory, frames, compressed, track)?
            }
        };
        log::debug!("Sequence '{name}' loaded from '{directory}' ({} frames)", frames.len());
        self.as_animated_mut()?.replace_sequence(sequences, name, id)
    }

    /// Register a state on an animated object
    pub fn add_state(&mut self, name: impl Into<String>, state: State) -> EngineResult<Option<State>> {
        Ok(self.as_animated_mut()?.add_state(name, state))
    }

    /// Name of the current state of an animated object
    pub fn state_name(&self) -> EngineResult<Option<&str>> {
        Ok(self.as_animated()?.state_name())
    }
}

fn hook_context(state: &str, hook: &str) -> String {
    format!("state '{state}' {hook}")
}

impl ObjectRef {
    /// Switch an animated object to state `name`.
    ///
    /// Does nothing for an empty name or the current state. Otherwise the old
    /// state's `on_exit` runs, the object switches, the new state's sequence
    /// is rewound to frame 0 and its `on_enter` runs.
    pub fn set_state(&self, ctx: &mut EngineContext, name: &str) -> EngineResult<()> {
        let old = {
            let object = self.borrow()?;
            let animated = object.as_animated()?;
            if name.is_empty() || animated.state_name() == Some(name) {
                return Ok(());
            }
            if !animated.states.contains_key(name) {
                return Err(EngineError::invalid_argument(format!("unknown state '{name}'")));
            }
            animated
                .state_name()
                .map(|old| (old.to_string(), animated.current_state().ok().and_then(|s| s.on_exit.clone())))
        };
        if let Some((old_name, on_exit)) = old {
            script::invoke(&hook_context(&old_name, "on_exit"), on_exit.as_ref(), &[])?;
        }

        let (sequence, on_enter) = {
            let mut object = self.borrow_mut()?;
            let animated = object.as_animated_mut()?;
            if !animated.states.contains_key(name) {
                return Err(EngineError::invalid_argument(format!("unknown state '{name}'")));
            }
            animated.state = Some(name.to_string());
            let sequence = animated.current_sequence()?;
            let on_enter = animated.current_state()?.on_enter.clone();
            (sequence, on_enter)
        };
        log::trace!("State switched to '{name}'");
        if let Some(id) = sequence {
            ctx.sequences.set_frame(id, 0, &mut ctx.sounds)?;
        }
        script::invoke(&hook_context(name, "on_enter"), on_enter.as_ref(), &[]).map(drop)
    }

    /// Run the state machine for one frame and render the state's sequence
    pub(super) fn update_animation(&self, ctx: &mut EngineContext, dt: f32) -> EngineResult<()> {
        let (name, link) = self.with_animated(|animated| {
            let state = animated.current_state()?;
            Ok((animated.state_name().unwrap_or_default().to_string(), state.link.clone()))
        })?;
        if let Some(next) = call_link(&name, link.as_ref())? {
            self.set_state(ctx, &next)?;
        }

        let (name, on_update) = self.with_animated(|animated| {
            let state = animated.current_state()?;
            Ok((animated.state_name().unwrap_or_default().to_string(), state.on_update.clone()))
        })?;
        script::invoke(&hook_context(&name, "on_update"), on_update.as_ref(), &[dt.into()])?;

        if let Some(id) = self.with_animated(AnimatedObject::current_sequence)? {
            ctx.render_sequence(id, dt)?;
        }
        Ok(())
    }

    fn with_animated<R>(&self, f: impl FnOnce(&AnimatedObject) -> EngineResult<R>) -> EngineResult<R> {
        let object = self.borrow()?;
        let animated = object.as_animated()?;
        f(animated)
    }
}

/// Run a `link` hook; a returned string names the next state
fn call_link(state: &str, link: Option<&Hook>) -> EngineResult<Option<String>> {
    match script::invoke(&hook_context(state, "link"), link, &[])? {
        ScriptValue::None => Ok(None),
        ScriptValue::Str(next) => Ok(Some(next)),
        other => Err(EngineError::invalid_argument(format!(
            "link of state '{state}' returned {other:?} instead of a state name"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_support::png_bytes;
    use crate::assets::MemoryLoader;
    use crate::audio::NullAudioBackend;
    use crate::backend::HeadlessDevice;
    use crate::core::EngineConfig;
    use crate::script::ScriptValue;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn context_with_frames() -> EngineContext {
        let loader = MemoryLoader::new();
        for dir in ["walk", "idle"] {
            for i in 0..3 {
                loader.insert(format!("{dir}/{i}.png"), png_bytes(8, 8, [0, 0, 255, 255]));
            }
        }
        EngineContext::new(
            EngineConfig::default(),
            Box::new(HeadlessDevice::new()),
            Box::new(NullAudioBackend::new()),
            Box::new(loader),
        )
        .unwrap()
    }

    fn recorder(log: &Rc<RefCell<Vec<String>>>, entry: &str, result: ScriptValue) -> Hook {
        let log = log.clone();
        let entry = entry.to_string();
        Hook::new(move |_| {
            log.borrow_mut().push(entry.clone());
            Ok(result.clone())
        })
    }

    fn hero(ctx: &mut EngineContext, log: &Rc<RefCell<Vec<String>>>) -> ObjectRef {
        let mut object = GameObject::animated();
        object.add_sequence(ctx, "walk", "walk", &[0, 1, 2], false).unwrap();
        object.add_sequence(ctx, "idle", "idle", &[0, 1, 2], false).unwrap();
        for name in ["walk", "idle"] {
            let state = State::new(name)
                .with_on_enter(recorder(log, &format!("{name}.enter"), ScriptValue::None))
                .with_on_exit(recorder(log, &format!("{name}.exit"), ScriptValue::None));
            object.add_state(name, state).unwrap();
        }
        object.into_ref()
    }

    #[test]
    fn test_set_state_runs_exit_then_enter() {
        let mut ctx = context_with_frames();
        let log = Rc::new(RefCell::new(Vec::new()));
        let object = hero(&mut ctx, &log);

        object.set_state(&mut ctx, "walk").unwrap();
        object.set_state(&mut ctx, "walk").unwrap();
        object.set_state(&mut ctx, "").unwrap();
        object.set_state(&mut ctx, "idle").unwrap();
        assert_eq!(*log.borrow(), vec!["walk.enter", "walk.exit", "idle.enter"]);
        assert_eq!(object.borrow().unwrap().state_name().unwrap(), Some("idle"));

        let err = object.set_state(&mut ctx, "fly").unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
    }

    #[test]
    fn test_set_state_rewinds_sequence() {
        let mut ctx = context_with_frames();
        let log = Rc::new(RefCell::new(Vec::new()));
        let object = hero(&mut ctx, &log);
        object.set_state(&mut ctx, "walk").unwrap();
        let walk = object.borrow().unwrap().as_animated().unwrap().sequence("walk").unwrap();
        ctx.sequences.set_frame(walk, 2, &mut ctx.sounds).unwrap();

        object.set_state(&mut ctx, "idle").unwrap();
        object.set_state(&mut ctx, "walk").unwrap();
        assert_eq!(ctx.sequences.frame(walk).unwrap(), 0);
    }

    #[test]
    fn test_link_switches_state_before_update() {
        let mut ctx = context_with_frames();
        let log = Rc::new(RefCell::new(Vec::new()));
        let object = hero(&mut ctx, &log);
        {
            let mut borrowed = object.borrow_mut().unwrap();
            let animated = borrowed.as_animated_mut().unwrap();
            let walk = animated.state("walk").cloned().unwrap();
            animated.add_state("walk", walk.with_link(recorder(&log, "walk.link", "idle".into())));
            let idle = animated.state("idle").cloned().unwrap();
            animated.add_state("idle", idle.with_on_update(recorder(&log, "idle.update", ScriptValue::None)));
        }
        object.set_state(&mut ctx, "walk").unwrap();
        log.borrow_mut().clear();

        object.update(&mut ctx, 0.01).unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["walk.link", "walk.exit", "idle.enter", "idle.update"]
        );
        let idle = object.borrow().unwrap().as_animated().unwrap().sequence("idle").unwrap();
        assert_eq!(ctx.sequences.queue_len(), 1);
        assert!(ctx.sequences.transform(idle).is_ok());
    }

    #[test]
    fn test_link_must_return_a_name() {
        let mut ctx = context_with_frames();
        let log = Rc::new(RefCell::new(Vec::new()));
        let object = hero(&mut ctx, &log);
        {
            let mut borrowed = object.borrow_mut().unwrap();
            let animated = borrowed.as_animated_mut().unwrap();
            let walk = animated.state("walk").cloned().unwrap();
            animated.add_state("walk", walk.with_link(recorder(&log, "walk.link", ScriptValue::Int(3))));
        }
        object.set_state(&mut ctx, "walk").unwrap();
        let err = object.update(&mut ctx, 0.01).unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert_eq!(ctx.transforms.depth(), 0);
    }

    #[test]
    fn test_zregion_only_refreshes_transform() {
        let mut ctx = context_with_frames();
        let log = Rc::new(RefCell::new(Vec::new()));
        let object = hero(&mut ctx, &log);
        object.set_state(&mut ctx, "walk").unwrap();
        object.borrow_mut().unwrap().as_animated_mut().unwrap().set_in_zregion(true);
        object.borrow_mut().unwrap().position = crate::foundation::math::Vec2::new(5.0, 0.0);

        object.update(&mut ctx, 0.01).unwrap();
        assert_eq!(ctx.sequences.queue_len(), 0);
        let walk = object.borrow().unwrap().as_animated().unwrap().sequence("walk").unwrap();
        let moved = crate::foundation::math::transform_point(
            &ctx.sequences.transform(walk).unwrap(),
            crate::foundation::math::Vec2::zeros(),
        );
        assert_eq!(moved.x, 5.0);
        assert!(!object.borrow().unwrap().as_animated().unwrap().is_in_zregion());

        object.update(&mut ctx, 0.01).unwrap();
        assert_eq!(ctx.sequences.queue_len(), 1);
    }

    #[test]
    fn test_sound_sequence_needs_known_sounds() {
        let mut ctx = context_with_frames();
        let mut object = GameObject::animated();
        let err = object
            .add_sound_sequence(&mut ctx, "walk", "walk", &[0, 1], &[(1, "step")], false)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidArgument(_)));
        assert!(ctx.sequences.is_empty());
    }

    #[test]
    fn test_replacing_sequence_releases_old_one() {
        let mut ctx = context_with_frames();
        let mut object = GameObject::animated();
        let first = object.add_sequence(&mut ctx, "walk", "walk", &[0, 1], false).unwrap();
        let second = object.add_sequence(&mut ctx, "walk", "idle", &[0, 1], false).unwrap();
        assert!(!ctx.sequences.contains(first));
        assert!(ctx.sequences.contains(second));
        assert_eq!(ctx.sequences.len(), 1);

        let mut layer = GameObject::layer();
        assert!(layer.add_sequence(&mut ctx, "walk", "walk", &[0], false).is_err());
    }
}
