//! Application trait and lifecycle hooks

use crate::core::EngineResult;
use crate::engine::EngineContext;
use crate::foundation::math::Vec2;
use crate::input::{KeyCode, MouseButtons};
use crate::script::{ScriptHooks, ScriptValue};

/// Per-frame input handed to [`Application::on_frame`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInput {
    /// Seconds since the previous frame
    pub dt: f32,
    /// The frame only repaints the window
    pub just_redraw: bool,
    /// Cursor position in screen coordinates
    pub cursor: Vec2,
    /// Mouse buttons held down
    pub buttons: MouseButtons,
}

/// Application lifecycle trait
///
/// Implement this trait to drive a game from the engine. Every hook runs on
/// the frame thread with full access to the engine context; an error returned
/// from a hook aborts the current frame.
pub trait Application {
    /// Called once before the first frame. Load assets and build the scene
    /// here.
    fn on_init(&mut self, _ctx: &mut EngineContext) -> EngineResult<()> {
        Ok(())
    }

    /// Called every frame before the scene is updated
    fn on_frame(&mut self, ctx: &mut EngineContext, frame: &FrameInput) -> EngineResult<()>;

    /// A key went down
    fn on_keypress(&mut self, _ctx: &mut EngineContext, _key: KeyCode) -> EngineResult<()> {
        Ok(())
    }

    /// An arrow key went down. `xdir` is -1 for left and 1 for right, `ydir`
    /// is -1 for up and 1 for down.
    fn on_move_request(&mut self, _ctx: &mut EngineContext, _xdir: i32, _ydir: i32, _shift: bool) -> EngineResult<()> {
        Ok(())
    }

    /// Scripts should be reloaded. The render queues are already empty.
    fn on_reload(&mut self, _ctx: &mut EngineContext) -> EngineResult<()> {
        Ok(())
    }

    /// Called once when the engine shuts down
    fn on_cleanup(&mut self, _ctx: &mut EngineContext) -> EngineResult<()> {
        Ok(())
    }
}

/// Scripted games: every lifecycle event calls the hook of the same name
impl Application for ScriptHooks {
    fn on_init(&mut self, _ctx: &mut EngineContext) -> EngineResult<()> {
        self.invoke("on_init", &[]).map(drop)
    }

    fn on_frame(&mut self, _ctx: &mut EngineContext, frame: &FrameInput) -> EngineResult<()> {
        let args = [
            frame.dt.into(),
            frame.just_redraw.into(),
            frame.cursor.into(),
            ScriptValue::Int(i64::from(frame.buttons.bits())),
        ];
        self.invoke("on_frame", &args).map(drop)
    }

    fn on_keypress(&mut self, _ctx: &mut EngineContext, key: KeyCode) -> EngineResult<()> {
        self.invoke("on_keypress", &[ScriptValue::Int(i64::from(key.0))]).map(drop)
    }

    fn on_move_request(&mut self, _ctx: &mut EngineContext, xdir: i32, ydir: i32, shift: bool) -> EngineResult<()> {
        self.invoke("on_move_request", &[xdir.into(), ydir.into(), shift.into()])
            .map(drop)
    }

    fn on_reload(&mut self, _ctx: &mut EngineContext) -> EngineResult<()> {
        self.invoke("on_reload", &[]).map(drop)
    }

    fn on_cleanup(&mut self, _ctx: &mut EngineContext) -> EngineResult<()> {
        self.invoke("on_cleanup", &[]).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryLoader;
    use crate::audio::NullAudioBackend;
    use crate::backend::HeadlessDevice;
    use crate::core::EngineConfig;
    use crate::script::Hook;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_script_hooks_receive_frame_arguments() {
        let mut ctx = EngineContext::new(
            EngineConfig::default(),
            Box::new(HeadlessDevice::new()),
            Box::new(NullAudioBackend::new()),
            Box::new(MemoryLoader::new()),
        )
        .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let mut hooks = ScriptHooks::new().with(
            "on_frame",
            Hook::new(move |args| {
                sink.borrow_mut().extend_from_slice(args);
                Ok(ScriptValue::None)
            }),
        );

        let frame = FrameInput {
            dt: 0.5,
            just_redraw: true,
            cursor: Vec2::new(3.0, 4.0),
            buttons: MouseButtons::LEFT | MouseButtons::MIDDLE,
        };
        hooks.on_frame(&mut ctx, &frame).unwrap();
        assert_eq!(
            *seen.borrow(),
            vec![
                ScriptValue::Float(0.5),
                ScriptValue::Bool(true),
                ScriptValue::Vec2(Vec2::new(3.0, 4.0)),
                ScriptValue::Int(5),
            ]
        );

        // Hooks a game does not define are skipped
        hooks.on_cleanup(&mut ctx).unwrap();
    }
}
