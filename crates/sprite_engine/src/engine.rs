//! Engine context and frame driver
//!
//! [`EngineContext`] owns the graphics device and every manager. It is handed
//! by reference to the scene graph and to the application, so nothing in the
//! engine lives in a global. [`Engine`] drives frames on top of it.

use crate::application::{Application, FrameInput};
use crate::assets::{FileManager, MemInfo, ResourceLoader, SystemMemory};
use crate::audio::{AudioBackend, SoundManager};
use crate::backend::{Color, DeviceStatus, GraphicsDevice, PresentStatus};
use crate::config::ConfigError;
use crate::core::{EngineConfig, EngineResult};
use crate::foundation::math::Vec2;
use crate::foundation::time::FrameClock;
use crate::input::{InputState, KeyAction, KeyCode};
use crate::render::{TextureManager, TransformStack, VertexManager};
use crate::scene::ObjectRef;
use crate::sequence::{SequenceId, SequenceManager, SequenceResources};
use std::rc::Rc;

/// Device, managers and scene root shared by everything that runs in a frame
pub struct EngineContext {
    /// Graphics device
    pub device: Box<dyn GraphicsDevice>,
    /// File cache
    pub files: FileManager,
    /// Texture pool
    pub textures: TextureManager,
    /// Quad geometry pool
    pub vertices: VertexManager,
    /// Sound pool and playback queue
    pub sounds: SoundManager,
    /// Sequences and their render queue
    pub sequences: SequenceManager,
    /// Active world transform
    pub transforms: TransformStack,
    /// Frame clock shared with the pools for pause brackets
    pub clock: Rc<FrameClock>,
    /// Configuration the context was built from
    pub config: EngineConfig,
    root: Option<ObjectRef>,
    quit_requested: bool,
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("files", &self.files)
            .field("textures", &self.textures.len())
            .field("sounds", &self.sounds)
            .field("sequences", &self.sequences)
            .field("has_root", &self.root.is_some())
            .finish()
    }
}

impl EngineContext {
    /// Build every manager on top of the given collaborators
    pub fn new(
        config: EngineConfig,
        device: Box<dyn GraphicsDevice>,
        audio: Box<dyn AudioBackend>,
        loader: Box<dyn ResourceLoader>,
    ) -> EngineResult<Self> {
        config.validate().map_err(ConfigError::Invalid)?;

        let clock = Rc::new(FrameClock::new());
        let transforms = TransformStack::new();
        let files = FileManager::new(loader, config.file.clone());
        let caching = !files.cache_disabled();
        let textures = TextureManager::new(device.as_ref(), config.texture.clone(), caching, clock.clone());
        let (cx, cy) = config.display.center();
        let sounds = SoundManager::new(
            audio,
            config.sound.clone(),
            caching,
            Vec2::new(cx, cy),
            transforms.clone(),
            clock.clone(),
        );
        let sequences = SequenceManager::new(transforms.clone());

        log::info!(
            "Engine context created: {}x{}, caching {}",
            config.display.width,
            config.display.height,
            if caching { "on" } else { "off" }
        );
        Ok(Self {
            device,
            files,
            textures,
            vertices: VertexManager::new(),
            sounds,
            sequences,
            transforms,
            clock,
            config,
            root: None,
            quit_requested: false,
        })
    }

    /// Sequence manager together with the managers it draws through
    pub fn split(&mut self) -> (&mut SequenceManager, SequenceResources<'_>) {
        (
            &mut self.sequences,
            SequenceResources {
                device: self.device.as_mut(),
                files: &mut self.files,
                textures: &mut self.textures,
                vertices: &mut self.vertices,
                sounds: &mut self.sounds,
            },
        )
    }

    /// Advance a sequence and queue it under the active transform
    pub fn render_sequence(&mut self, id: SequenceId, dt: f32) -> EngineResult<()> {
        let (sequences, mut res) = self.split();
        sequences.render(id, dt, &mut res)
    }

    /// Drop everything queued for drawing or sound refresh this frame
    pub fn clear_render_queues(&mut self) {
        self.sequences.clear_queue();
        self.sounds.clear_queue();
        self.transforms.reset();
    }

    /// Object updated every frame, if any
    pub fn root(&self) -> Option<&ObjectRef> {
        self.root.as_ref()
    }

    /// Replace the scene root, returning the previous one
    pub fn set_root(&mut self, root: Option<ObjectRef>) -> Option<ObjectRef> {
        std::mem::replace(&mut self.root, root)
    }

    /// Concrete device, if it is a `T`
    pub fn device_as<T: 'static>(&mut self) -> Option<&mut T> {
        self.device.as_any_mut().downcast_mut::<T>()
    }

    /// Ask the frame driver to stop after the current frame
    pub fn request_quit(&mut self) {
        self.quit_requested = true;
    }

    /// True once [`EngineContext::request_quit`] was called
    pub fn quit_requested(&self) -> bool {
        self.quit_requested
    }
}

/// Frame driver
#[derive(Debug)]
pub struct Engine {
    ctx: EngineContext,
    input: InputState,
    memory: Box<dyn SystemMemoryDebug>,
    device_lost: bool,
    just_redraw: bool,
}

/// [`SystemMemory`] that can be printed with the engine
trait SystemMemoryDebug: SystemMemory + std::fmt::Debug {}

impl<T: SystemMemory + std::fmt::Debug> SystemMemoryDebug for T {}

impl Engine {
    /// Driver reading system memory from the OS
    pub fn new(ctx: EngineContext) -> Self {
        Self {
            ctx,
            input: InputState::new(),
            memory: Box::new(MemInfo),
            device_lost: false,
            just_redraw: false,
        }
    }

    /// Use another source of system memory figures
    pub fn with_memory(mut self, memory: impl SystemMemory + std::fmt::Debug + 'static) -> Self {
        self.memory = Box::new(memory);
        self
    }

    /// Shared context
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Shared context, mutably
    pub fn context_mut(&mut self) -> &mut EngineContext {
        &mut self.ctx
    }

    /// Keyboard and mouse state
    pub fn input(&self) -> &InputState {
        &self.input
    }

    /// Keyboard and mouse state, mutably
    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// True between a lost present and a successful reset
    pub fn is_device_lost(&self) -> bool {
        self.device_lost
    }

    /// Mark the next frame as a pure redraw, e.g. after the window was exposed
    pub fn request_redraw(&mut self) {
        self.just_redraw = true;
    }

    /// Window regained focus: forget keys and buttons held while away
    pub fn activate(&mut self) {
        self.input.clear();
    }

    /// Run the application's `on_init`
    pub fn init(&mut self, app: &mut dyn Application) -> EngineResult<()> {
        log::info!("Engine starting");
        app.on_init(&mut self.ctx)
    }

    /// Feed a key transition and deliver the resulting requests
    pub fn key_event(&mut self, app: &mut dyn Application, key: KeyCode, pressed: bool) -> EngineResult<()> {
        for action in self.input.key_event(key, pressed) {
            match action {
                KeyAction::Press(key) => app.on_keypress(&mut self.ctx, key)?,
                KeyAction::Reload => {
                    log::info!("Reload requested");
                    self.ctx.clear_render_queues();
                    app.on_reload(&mut self.ctx)?;
                }
                KeyAction::Move { xdir, ydir, shift } => app.on_move_request(&mut self.ctx, xdir, ydir, shift)?,
            }
        }
        Ok(())
    }

    /// Recover from device loss when possible.
    ///
    /// Returns true while the current frame must be skipped: the device is
    /// still lost, or it has just been reset and resources will be restored
    /// lazily from the next frame on.
    pub fn check_lost_device(&mut self) -> EngineResult<bool> {
        if !self.device_lost {
            return Ok(false);
        }
        let ctx = &mut self.ctx;
        match ctx.device.test_cooperative_level() {
            DeviceStatus::Lost => Ok(true),
            DeviceStatus::NeedsReset => {
                ctx.textures.unload_textures(ctx.device.as_mut());
                ctx.vertices.force_rebind();
                ctx.device.reset()?;
                ctx.clear_render_queues();
                self.device_lost = false;
                log::debug!("Device reset");
                Ok(true)
            }
            DeviceStatus::Ok => {
                self.device_lost = false;
                Ok(false)
            }
        }
    }

    /// Run one frame that took `dt_ms` milliseconds.
    ///
    /// Returns false when the frame was skipped because the device is lost.
    /// Errors abort the frame and are logged before being returned.
    pub fn tick(&mut self, app: &mut dyn Application, dt_ms: u32) -> EngineResult<bool> {
        if self.check_lost_device()? {
            return Ok(false);
        }
        match self.frame(app, dt_ms) {
            Ok(()) => Ok(true),
            Err(err) => {
                log::error!("Frame aborted: {err}");
                Err(err)
            }
        }
    }

    /// Run one frame timed by the frame clock
    pub fn step(&mut self, app: &mut dyn Application) -> EngineResult<bool> {
        let dt_ms = self.ctx.clock.tick();
        self.tick(app, dt_ms)
    }

    /// Initialise, run frames until the application asks to quit, then clean up
    pub fn run(&mut self, app: &mut dyn Application) -> EngineResult<()> {
        self.init(app)?;
        self.ctx.clock.reset();
        while !self.ctx.quit_requested() {
            self.step(app)?;
        }
        self.shutdown(app)
    }

    /// Run the application's `on_cleanup`, release the scene and empty every pool
    pub fn shutdown(&mut self, app: &mut dyn Application) -> EngineResult<()> {
        let cleanup = app.on_cleanup(&mut self.ctx);
        if let Some(root) = self.ctx.set_root(None) {
            root.release(&mut self.ctx)?;
        }
        let ctx = &mut self.ctx;
        ctx.clear_render_queues();
        ctx.sequences.clear();
        ctx.sounds.clear();
        ctx.vertices.clear(ctx.device.as_mut());
        ctx.textures.clear(ctx.device.as_mut());
        log::info!("Engine shutdown complete");
        cleanup
    }

    fn frame(&mut self, app: &mut dyn Application, dt_ms: u32) -> EngineResult<()> {
        let ctx = &mut self.ctx;
        ctx.textures.update(ctx.device.as_mut(), dt_ms);
        let freed = ctx.vertices.collect();
        if freed > 0 {
            log::trace!("Returned {freed} quad slots to their buffers");
        }
        if ctx.files.update(dt_ms, self.memory.status()) {
            log::warn!("System memory is low, releasing cached resources");
            ctx.textures.collect(ctx.device.as_mut(), true);
            ctx.files.purge_unreferenced();
        }

        let input = FrameInput {
            dt: dt_ms as f32 / 1000.0,
            just_redraw: std::mem::take(&mut self.just_redraw),
            cursor: self.input.cursor(),
            buttons: self.input.buttons(),
        };
        app.on_frame(ctx, &input)?;

        ctx.transforms.reset();
        if let Some(root) = ctx.root().cloned() {
            root.update(ctx, input.dt)?;
        }

        self.present()?;
        self.ctx.sounds.update(dt_ms)
    }

    fn present(&mut self) -> EngineResult<()> {
        let ctx = &mut self.ctx;
        ctx.device.begin_scene()?;
        let color = Color(ctx.config.display.clear_color);
        let drawn = ctx.device.clear(color).map_err(Into::into).and_then(|()| {
            let (sequences, mut res) = ctx.split();
            sequences.flush(&mut res)
        });
        let status = ctx.device.end_scene_and_present()?;
        drawn?;
        if status == PresentStatus::DeviceLost {
            log::warn!("Device lost while presenting");
            self.device_lost = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::test_support::png_bytes;
    use crate::assets::{MemoryLoader, MemoryStatus};
    use crate::audio::NullAudioBackend;
    use crate::backend::headless::DrawRecord;
    use crate::backend::HeadlessDevice;
    use crate::core::EngineError;
    use crate::scene::GameObject;
    use crate::script::{Hook, ScriptError, ScriptHooks, ScriptValue};
    use std::cell::RefCell;

    fn context(loader: MemoryLoader) -> EngineContext {
        EngineContext::new(
            EngineConfig::default(),
            Box::new(HeadlessDevice::new()),
            Box::new(NullAudioBackend::new()),
            Box::new(loader),
        )
        .unwrap()
    }

    fn engine() -> Engine {
        engine_with(MemoryLoader::new())
    }

    fn engine_with(loader: MemoryLoader) -> Engine {
        Engine::new(context(loader)).with_memory(Plenty(MemoryStatus {
            total_mb: 8192,
            available_mb: 4096,
        }))
    }

    #[derive(Debug)]
    struct Plenty(MemoryStatus);

    impl SystemMemory for Plenty {
        fn status(&self) -> MemoryStatus {
            self.0
        }
    }

    /// Records every call as a string
    fn recording_hooks() -> (ScriptHooks, Rc<RefCell<Vec<String>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        let mut hooks = ScriptHooks::new();
        for name in ["on_init", "on_frame", "on_keypress", "on_reload", "on_move_request", "on_cleanup"] {
            let calls = calls.clone();
            hooks.register(
                name,
                Hook::new(move |args| {
                    calls.borrow_mut().push(format!("{name}{args:?}"));
                    Ok(ScriptValue::None)
                }),
            );
        }
        (hooks, calls)
    }

    fn device(engine: &mut Engine) -> &mut HeadlessDevice {
        engine.context_mut().device_as::<HeadlessDevice>().unwrap()
    }

    #[test]
    fn test_tick_updates_scene_and_presents() {
        let mut engine = engine();
        let (mut hooks, calls) = recording_hooks();
        let ctx = engine.context_mut();
        let root = GameObject::location("hall").into_ref();
        let gizmo = GameObject::gizmo(&mut ctx.sequences, 10.0, 20.0, Color::WHITE);
        root.borrow_mut().unwrap().add_object("box", gizmo.into_ref());
        ctx.set_root(Some(root));

        assert!(engine.tick(&mut hooks, 16).unwrap());
        assert_eq!(device(&mut engine).frames_presented(), 1);
        let draws = device(&mut engine).take_draws();
        assert!(matches!(draws[0], DrawRecord::Clear(_)));
        assert!(draws.iter().any(|d| matches!(d, DrawRecord::Quad(q) if q.width == 10.0 && q.height == 20.0)));
        assert_eq!(engine.context().sequences.queue_len(), 0);
        assert_eq!(engine.context().transforms.depth(), 0);
        assert_eq!(calls.borrow().len(), 1);
        assert!(calls.borrow()[0].starts_with("on_frame[Float(0.016"));
    }

    #[test]
    fn test_lost_device_skips_frames_until_reset() {
        let mut engine = engine();
        let (mut hooks, calls) = recording_hooks();
        device(&mut engine).lose_device_on_present();

        assert!(engine.tick(&mut hooks, 16).unwrap());
        assert!(engine.is_device_lost());

        assert!(!engine.tick(&mut hooks, 16).unwrap());
        assert_eq!(calls.borrow().len(), 1);

        device(&mut engine).set_status(DeviceStatus::NeedsReset);
        assert!(!engine.tick(&mut hooks, 16).unwrap());
        assert!(!engine.is_device_lost());
        assert_eq!(device(&mut engine).reset_count(), 1);

        assert!(engine.tick(&mut hooks, 16).unwrap());
        assert_eq!(device(&mut engine).frames_presented(), 1);
        assert_eq!(calls.borrow().len(), 2);
    }

    #[test]
    fn test_key_events_reach_application() {
        let mut engine = engine();
        let (mut hooks, calls) = recording_hooks();
        engine.key_event(&mut hooks, KeyCode::CONTROL, true).unwrap();
        engine.key_event(&mut hooks, KeyCode::R, true).unwrap();
        engine.key_event(&mut hooks, KeyCode::UP, true).unwrap();
        let calls = calls.borrow();
        assert_eq!(calls[0], "on_keypress[Int(17)]");
        assert_eq!(calls[1], "on_keypress[Int(82)]");
        assert_eq!(calls[2], "on_reload[]");
        assert_eq!(calls[3], "on_keypress[Int(38)]");
        assert_eq!(calls[4], "on_move_request[Int(0), Int(-1), Bool(false)]");
    }

    #[test]
    fn test_script_failure_aborts_frame() {
        let mut engine = engine();
        let mut hooks = ScriptHooks::new().with(
            "on_frame",
            Hook::new(|_| Err(ScriptError::with_traceback("bad frame", "frame.py:1"))),
        );
        let err = engine.tick(&mut hooks, 16).unwrap_err();
        assert!(matches!(err, EngineError::Scripting(_)));
        assert_eq!(device(&mut engine).frames_presented(), 0);
    }

    #[test]
    fn test_run_until_quit_requested() {
        struct Frames(u32);

        impl Application for Frames {
            fn on_frame(&mut self, ctx: &mut EngineContext, _frame: &FrameInput) -> EngineResult<()> {
                self.0 += 1;
                if self.0 == 3 {
                    ctx.request_quit();
                }
                Ok(())
            }
        }

        let mut engine = engine();
        let mut app = Frames(0);
        engine.run(&mut app).unwrap();
        assert_eq!(app.0, 3);
        assert_eq!(device(&mut engine).frames_presented(), 3);
    }

    #[test]
    fn test_released_sequence_returns_its_quad() {
        let loader = MemoryLoader::new().with_file("bg.png", png_bytes(8, 8, [10, 20, 30, 255]));
        let mut engine = engine_with(loader);
        let (mut hooks, _) = recording_hooks();

        let ctx = engine.context_mut();
        let id = {
            let (sequences, mut res) = ctx.split();
            sequences.create_static(&mut res, "bg.png", false).unwrap()
        };
        assert_eq!(ctx.vertices.quad_count(), 1);

        assert!(engine.tick(&mut hooks, 16).unwrap());
        assert_eq!(engine.context().vertices.quad_count(), 1);

        engine.context_mut().sequences.release(id).unwrap();
        assert!(engine.tick(&mut hooks, 16).unwrap());
        assert_eq!(engine.context().vertices.quad_count(), 0);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.display.width = 0;
        let result = EngineContext::new(
            config,
            Box::new(HeadlessDevice::new()),
            Box::new(NullAudioBackend::new()),
            Box::new(MemoryLoader::new()),
        );
        assert!(matches!(result, Err(EngineError::Config(_))));
    }
}
