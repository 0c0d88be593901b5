//! Keyboard and mouse state
//!
//! The platform layer reports raw key transitions and cursor movement;
//! [`InputState`] keeps the pressed state of every key and turns transitions
//! into the [`KeyAction`]s the frame driver hands to the application.

use crate::foundation::math::Vec2;
use bitflags::bitflags;

/// Virtual key code as delivered by the platform layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyCode(pub u8);

impl KeyCode {
    /// Either shift key
    pub const SHIFT: Self = Self(0x10);
    /// Either control key
    pub const CONTROL: Self = Self(0x11);
    /// Left arrow
    pub const LEFT: Self = Self(0x25);
    /// Up arrow
    pub const UP: Self = Self(0x26);
    /// Right arrow
    pub const RIGHT: Self = Self(0x27);
    /// Down arrow
    pub const DOWN: Self = Self(0x28);
    /// R key
    pub const R: Self = Self(b'R');

    /// Code of an ASCII letter or digit key
    pub fn from_char(c: char) -> Option<Self> {
        let c = c.to_ascii_uppercase();
        (c.is_ascii_uppercase() || c.is_ascii_digit()).then(|| Self(c as u8))
    }

    /// Arrow direction as `(xdir, ydir)`, `None` for other keys
    pub fn arrow_direction(self) -> Option<(i32, i32)> {
        match self {
            Self::LEFT => Some((-1, 0)),
            Self::RIGHT => Some((1, 0)),
            Self::UP => Some((0, -1)),
            Self::DOWN => Some((0, 1)),
            _ => None,
        }
    }
}

bitflags! {
    /// Mouse buttons held down
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u32 {
        /// Left button
        const LEFT = 1;
        /// Right button
        const RIGHT = 2;
        /// Middle button
        const MIDDLE = 4;
    }
}

/// Application request raised by a key transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    /// A key went down
    Press(KeyCode),
    /// Control+R is held: reload scripts
    Reload,
    /// An arrow key went down
    Move {
        /// -1 left, 1 right
        xdir: i32,
        /// -1 up, 1 down
        ydir: i32,
        /// Shift is held
        shift: bool,
    },
}

/// Key, cursor and button state
#[derive(Debug, Clone)]
pub struct InputState {
    keys: [bool; 256],
    cursor: Vec2,
    buttons: MouseButtons,
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}

impl InputState {
    /// Nothing pressed, cursor at the origin
    pub fn new() -> Self {
        Self {
            keys: [false; 256],
            cursor: Vec2::zeros(),
            buttons: MouseButtons::empty(),
        }
    }

    /// Record a key transition and return the actions it raises, in the
    /// order they should be delivered
    pub fn key_event(&mut self, key: KeyCode, pressed: bool) -> Vec<KeyAction> {
        let mut actions = Vec::new();
        let index = usize::from(key.0);

        if pressed && !self.keys[index] {
            actions.push(KeyAction::Press(key));
        }
        self.keys[index] = pressed;

        if self.is_down(KeyCode::CONTROL) && self.is_down(KeyCode::R) {
            actions.push(KeyAction::Reload);
        }

        if pressed {
            if let Some((xdir, ydir)) = key.arrow_direction() {
                actions.push(KeyAction::Move {
                    xdir,
                    ydir,
                    shift: self.is_down(KeyCode::SHIFT),
                });
            }
        }
        actions
    }

    /// True while the key is held
    pub fn is_down(&self, key: KeyCode) -> bool {
        self.keys[usize::from(key.0)]
    }

    /// Cursor position in screen coordinates
    pub fn cursor(&self) -> Vec2 {
        self.cursor
    }

    /// Move the cursor
    pub fn set_cursor(&mut self, position: Vec2) {
        self.cursor = position;
    }

    /// Buttons held down
    pub fn buttons(&self) -> MouseButtons {
        self.buttons
    }

    /// Record a button transition
    pub fn set_button(&mut self, button: MouseButtons, pressed: bool) {
        self.buttons.set(button, pressed);
    }

    /// Forget every held key and button, e.g. when the window regains focus
    pub fn clear(&mut self) {
        self.keys = [false; 256];
        self.buttons = MouseButtons::empty();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keypress_fires_on_edge_only() {
        let mut input = InputState::new();
        let a = KeyCode::from_char('a').unwrap();
        assert_eq!(input.key_event(a, true), vec![KeyAction::Press(a)]);
        // Auto-repeat
        assert!(input.key_event(a, true).is_empty());
        assert!(input.key_event(a, false).is_empty());
        assert!(!input.is_down(a));
        assert_eq!(input.key_event(a, true), vec![KeyAction::Press(a)]);
    }

    #[test]
    fn test_control_r_requests_reload() {
        let mut input = InputState::new();
        input.key_event(KeyCode::CONTROL, true);
        let actions = input.key_event(KeyCode::R, true);
        assert_eq!(actions, vec![KeyAction::Press(KeyCode::R), KeyAction::Reload]);
        assert!(input.key_event(KeyCode::R, false).is_empty());
    }

    #[test]
    fn test_arrows_request_moves() {
        let mut input = InputState::new();
        assert_eq!(
            input.key_event(KeyCode::LEFT, true),
            vec![
                KeyAction::Press(KeyCode::LEFT),
                KeyAction::Move { xdir: -1, ydir: 0, shift: false }
            ]
        );
        input.key_event(KeyCode::SHIFT, true);
        let actions = input.key_event(KeyCode::DOWN, true);
        assert_eq!(actions[1], KeyAction::Move { xdir: 0, ydir: 1, shift: true });
        // Held arrow keeps moving
        assert_eq!(
            input.key_event(KeyCode::DOWN, true),
            vec![KeyAction::Move { xdir: 0, ydir: 1, shift: true }]
        );
    }

    #[test]
    fn test_clear_forgets_keys_and_buttons() {
        let mut input = InputState::new();
        input.key_event(KeyCode::SHIFT, true);
        input.set_button(MouseButtons::LEFT, true);
        input.set_cursor(Vec2::new(10.0, 20.0));
        input.clear();
        assert!(!input.is_down(KeyCode::SHIFT));
        assert!(input.buttons().is_empty());
        assert_eq!(input.cursor(), Vec2::new(10.0, 20.0));
    }
}
