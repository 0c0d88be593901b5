//! Animation states
//!
//! A state names the sequence an animated object plays while in it and
//! carries optional hooks. `link` runs every frame before `on_update` and may
//! return the name of the next state.

use crate::script::Hook;

/// One state of an animated object
#[derive(Debug, Clone, Default)]
pub struct State {
    /// Name of the sequence played in this state
    pub sequence: Option<String>,
    /// Called after the object switched into this state
    pub on_enter: Option<Hook>,
    /// Called every frame with `dt` in seconds
    pub on_update: Option<Hook>,
    /// Called before the object leaves this state
    pub on_exit: Option<Hook>,
    /// Called every frame; a returned state name triggers a switch
    pub link: Option<Hook>,
}

impl State {
    /// State playing `sequence`
    pub fn new(sequence: impl Into<String>) -> Self {
        Self {
            sequence: Some(sequence.into()),
            ..Self::default()
        }
    }

    /// Set the enter hook
    pub fn with_on_enter(mut self, hook: Hook) -> Self {
        self.on_enter = Some(hook);
        self
    }

    /// Set the update hook
    pub fn with_on_update(mut self, hook: Hook) -> Self {
        self.on_update = Some(hook);
        self
    }

    /// Set the exit hook
    pub fn with_on_exit(mut self, hook: Hook) -> Self {
        self.on_exit = Some(hook);
        self
    }

    /// Set the link hook
    pub fn with_link(mut self, hook: Hook) -> Self {
        self.link = Some(hook);
        self
    }
}
