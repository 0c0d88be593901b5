//! Scripting hook boundary
//!
//! The engine never depends on a scripting runtime's object model. It only
//! needs to call a named function with positional arguments and get back a
//! value or an opaque error. A [`Hook`] is that callable; [`ScriptHooks`] is
//! a table of named hooks that a game (or an embedded interpreter bridge)
//! fills in.

use crate::core::{EngineError, EngineResult};
use crate::foundation::logging::log_script_failure;
use crate::foundation::math::Vec2;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Value passed to or returned from a hook
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScriptValue {
    /// Absence of a value
    #[default]
    None,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    Str(String),
    /// 2D vector
    Vec2(Vec2),
    /// Sequence of values
    List(Vec<ScriptValue>),
}

impl ScriptValue {
    /// True for [`ScriptValue::None`]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Extract a string, if this is one
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Extract a float, widening integers
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Extract a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&str> for ScriptValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<f32> for ScriptValue {
    fn from(value: f32) -> Self {
        Self::Float(f64::from(value))
    }
}

impl From<i32> for ScriptValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<bool> for ScriptValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Vec2> for ScriptValue {
    fn from(value: Vec2) -> Self {
        Self::Vec2(value)
    }
}

/// Opaque error raised by a hook, carrying the interpreter's traceback text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    message: String,
    traceback: String,
}

impl ScriptError {
    /// Error with a message and no traceback
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: String::new(),
        }
    }

    /// Error with a traceback
    pub fn with_traceback(message: impl Into<String>, traceback: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            traceback: traceback.into(),
        }
    }

    /// Error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Traceback text (may be empty)
    pub fn traceback(&self) -> &str {
        &self.traceback
    }
}

/// Result of a hook call
pub type ScriptResult = Result<ScriptValue, ScriptError>;

type HookFn = dyn FnMut(&[ScriptValue]) -> ScriptResult;

/// Shared callable invoked with positional arguments.
///
/// Cloning a hook shares the same underlying closure. A hook that calls
/// itself recursively gets a [`ScriptError`] instead of a panic.
#[derive(Clone)]
pub struct Hook(Rc<RefCell<HookFn>>);

impl Hook {
    /// Wrap a closure
    pub fn new(f: impl FnMut(&[ScriptValue]) -> ScriptResult + 'static) -> Self {
        Self(Rc::new(RefCell::new(f)))
    }

    /// Hook that ignores its arguments and returns `None`
    pub fn noop() -> Self {
        Self::new(|_| Ok(ScriptValue::None))
    }

    /// Call with positional arguments
    pub fn call(&self, args: &[ScriptValue]) -> ScriptResult {
        let mut f = self
            .0
            .try_borrow_mut()
            .map_err(|_| ScriptError::new("hook re-entered while already running"))?;
        f(args)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Hook(..)")
    }
}

/// Call an optional hook; a missing hook yields `None`
pub fn call_optional(hook: Option<&Hook>, args: &[ScriptValue]) -> ScriptResult {
    hook.map_or(Ok(ScriptValue::None), |h| h.call(args))
}

/// Call an optional hook on behalf of `context`.
///
/// A failure is logged with its traceback and handed back as
/// [`EngineError::Scripting`] for the caller to propagate.
pub fn invoke(context: &str, hook: Option<&Hook>, args: &[ScriptValue]) -> EngineResult<ScriptValue> {
    call_optional(hook, args).map_err(|err| {
        log_script_failure(context, err.message(), err.traceback());
        EngineError::Scripting(err)
    })
}

/// Table of named hook functions
#[derive(Debug, Default, Clone)]
pub struct ScriptHooks {
    functions: HashMap<String, Hook>,
}

impl ScriptHooks {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a named hook
    pub fn register(&mut self, name: impl Into<String>, hook: Hook) -> &mut Self {
        self.functions.insert(name.into(), hook);
        self
    }

    /// Builder-style registration
    pub fn with(mut self, name: impl Into<String>, hook: Hook) -> Self {
        self.register(name, hook);
        self
    }

    /// True if a hook with this name exists
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Call a named hook. Missing hooks return `None` so games only define
    /// the callbacks they care about.
    pub fn call(&self, name: &str, args: &[ScriptValue]) -> ScriptResult {
        call_optional(self.functions.get(name), args)
    }

    /// Like [`ScriptHooks::call`], logging a failure before returning it
    pub fn invoke(&self, name: &str, args: &[ScriptValue]) -> EngineResult<ScriptValue> {
        invoke(name, self.functions.get(name), args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_receives_positional_args() {
        let hook = Hook::new(|args| match args {
            [ScriptValue::Int(a), ScriptValue::Int(b)] => Ok(ScriptValue::Int(a + b)),
            _ => Err(ScriptError::new("bad args")),
        });
        assert_eq!(hook.call(&[1.into(), 2.into()]), Ok(ScriptValue::Int(3)));
        assert!(hook.call(&[]).is_err());
    }

    #[test]
    fn test_missing_named_hook_returns_none() {
        let hooks = ScriptHooks::new().with("on_init", Hook::noop());
        assert!(hooks.has_function("on_init"));
        assert_eq!(hooks.call("on_frame", &[]), Ok(ScriptValue::None));
    }

    #[test]
    fn test_invoke_maps_failure_to_engine_error() {
        let hooks = ScriptHooks::new().with(
            "on_frame",
            Hook::new(|_| Err(ScriptError::with_traceback("boom", "line 3"))),
        );
        match hooks.invoke("on_frame", &[]) {
            Err(EngineError::Scripting(err)) => {
                assert_eq!(err.message(), "boom");
                assert_eq!(err.traceback(), "line 3");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(invoke("missing", None, &[]).unwrap().is_none());
    }

    #[test]
    fn test_reentrant_hook_errors() {
        let slot: Rc<RefCell<Option<Hook>>> = Rc::new(RefCell::new(None));
        let inner = slot.clone();
        let hook = Hook::new(move |_| {
            let me = inner.borrow().clone().ok_or_else(|| ScriptError::new("unset"))?;
            me.call(&[])
        });
        *slot.borrow_mut() = Some(hook.clone());
        let err = hook.call(&[]).unwrap_err();
        assert!(err.message().contains("re-entered"));
    }
}
