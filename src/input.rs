use std::collections::HashMap;

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Identifier for a physical keyboard key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyCode {
    Named(NamedKey),
    Character(char),
    Digit(u8),
    Function(u8),
}

impl KeyCode {
    pub const SPACE: Self = Self::Named(NamedKey::Space);
    pub const UP: Self = Self::Named(NamedKey::Up);
    pub const DOWN: Self = Self::Named(NamedKey::Down);

    pub fn from_name(name: &str) -> Option<Self> {
        if let Some(key) = parse_named_key(name) {
            return Some(key);
        }
        let mut chars = name.chars();
        if let (Some(ch), None) = (chars.next(), chars.next()) {
            if ch.is_ascii_alphabetic() {
                return Some(Self::Character(ch.to_ascii_uppercase()));
            }
            if ch.is_ascii_digit() {
                return Some(Self::Digit(ch as u8 - b'0'));
            }
        }
        if let Some(function) = name.strip_prefix('F').or_else(|| name.strip_prefix('f')) {
            if let Ok(index) = function.parse::<u8>() {
                if (1..=25).contains(&index) {
                    return Some(Self::Function(index));
                }
            }
        }
        None
    }
}

fn parse_named_key(name: &str) -> Option<KeyCode> {
    use NamedKey::*;
    let key = match name {
        "Space" => Space,
        "Enter" | "Return" => Enter,
        "Tab" => Tab,
        "Left" => Left,
        "Right" => Right,
        "Up" => Up,
        "Down" => Down,
        "Escape" | "Esc" => Escape,
        "Backspace" => Backspace,
        "LeftShift" | "LShift" => LeftShift,
        "RightShift" | "RShift" => RightShift,
        "LeftCtrl" | "LControl" => LeftCtrl,
        "RightCtrl" | "RControl" => RightCtrl,
        "LeftAlt" | "LAlt" => LeftAlt,
        "RightAlt" | "RAlt" => RightAlt,
        _ => return None,
    };
    Some(KeyCode::Named(key))
}

/// Friendly names for the non-printable keys the engine reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamedKey {
    Space,
    Enter,
    Tab,
    Left,
    Right,
    Up,
    Down,
    Escape,
    Backspace,
    LeftShift,
    RightShift,
    LeftCtrl,
    RightCtrl,
    LeftAlt,
    RightAlt,
}

/// Identifier for a mouse button (left button is zero).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MouseButton(u8);

impl MouseButton {
    pub const LEFT: Self = Self(0);
    pub const RIGHT: Self = Self(1);
    pub const MIDDLE: Self = Self(2);

    pub fn new(index: u8) -> Self {
        Self(index)
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Parses `Mouse`, `Mouse1`, `mouse3`, ... (one-based suffix).
    pub fn from_name(name: &str) -> Option<Self> {
        let prefix = name.get(..5)?;
        if !prefix.eq_ignore_ascii_case("mouse") {
            return None;
        }
        let suffix = &name[5..];
        if suffix.is_empty() {
            return Some(Self::LEFT);
        }
        let index = suffix.parse::<u8>().ok()?;
        Some(Self::new(index.saturating_sub(1)))
    }
}

/// Button state encoded in two bits: bit 0 is "held", bit 1 is "changed this frame".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ButtonState {
    #[default]
    Up = 0b00,
    Down = 0b01,
    Pressed = 0b11,
    Released = 0b10,
}

impl ButtonState {
    pub fn bits(self) -> u8 {
        self as u8
    }

    pub fn is_down(self) -> bool {
        self.bits() & 0b01 != 0
    }

    /// The state a button settles into once the frame it changed in is over.
    pub fn settled(self) -> Self {
        if self.is_down() {
            Self::Down
        } else {
            Self::Up
        }
    }
}

/// Keyboard and mouse state for the current frame.
#[derive(Debug, Default, Clone)]
pub struct InputState {
    keys: HashMap<KeyCode, ButtonState>,
    mouse_buttons: HashMap<MouseButton, ButtonState>,
    mouse_position: Vec2,
    previous_mouse_position: Vec2,
    scroll_delta: Vec2,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_pressed(&mut self, key: KeyCode) {
        // OS key repeat reports presses for held keys.
        if !self.is_key_down(key) {
            self.keys.insert(key, ButtonState::Pressed);
        }
    }

    pub fn key_released(&mut self, key: KeyCode) {
        self.keys.insert(key, ButtonState::Released);
    }

    pub fn mouse_pressed(&mut self, button: MouseButton) {
        self.mouse_buttons.insert(button, ButtonState::Pressed);
    }

    pub fn mouse_released(&mut self, button: MouseButton) {
        self.mouse_buttons.insert(button, ButtonState::Released);
    }

    pub fn set_mouse_position(&mut self, position: Vec2) {
        self.mouse_position = position;
    }

    pub fn add_scroll(&mut self, delta: Vec2) {
        self.scroll_delta += delta;
    }

    pub fn key_state(&self, key: KeyCode) -> ButtonState {
        self.keys.get(&key).copied().unwrap_or_default()
    }

    pub fn mouse_state(&self, button: MouseButton) -> ButtonState {
        self.mouse_buttons.get(&button).copied().unwrap_or_default()
    }

    pub fn is_key_down(&self, key: KeyCode) -> bool {
        self.key_state(key).is_down()
    }

    pub fn was_key_pressed(&self, key: KeyCode) -> bool {
        self.key_state(key) == ButtonState::Pressed
    }

    pub fn is_mouse_button_down(&self, button: MouseButton) -> bool {
        self.mouse_state(button).is_down()
    }

    pub fn is_down_by_name(&self, name: &str) -> bool {
        if let Some(button) = MouseButton::from_name(name) {
            return self.is_mouse_button_down(button);
        }
        KeyCode::from_name(name).is_some_and(|key| self.is_key_down(key))
    }

    pub fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    pub fn mouse_delta(&self) -> Vec2 {
        self.mouse_position - self.previous_mouse_position
    }

    pub fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }

    /// Collapses pressed/released edges into held/up states.
    pub fn end_frame(&mut self) {
        for state in self.keys.values_mut() {
            *state = state.settled();
        }
        for state in self.mouse_buttons.values_mut() {
            *state = state.settled();
        }
        self.keys.retain(|_, state| *state != ButtonState::Up);
        self.mouse_buttons.retain(|_, state| *state != ButtonState::Up);
        self.previous_mouse_position = self.mouse_position;
        self.scroll_delta = Vec2::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_named_and_character_keys() {
        assert_eq!(KeyCode::from_name("Space"), Some(KeyCode::SPACE));
        assert_eq!(KeyCode::from_name("a"), Some(KeyCode::Character('A')));
        assert_eq!(KeyCode::from_name("1"), Some(KeyCode::Digit(1)));
        assert_eq!(KeyCode::from_name("F12"), Some(KeyCode::Function(12)));
        assert_eq!(KeyCode::from_name("F99"), None);
    }

    #[test]
    fn mouse_names_are_supported() {
        assert_eq!(MouseButton::from_name("Mouse1"), Some(MouseButton::LEFT));
        assert_eq!(MouseButton::from_name("mouse3"), Some(MouseButton::MIDDLE));
        assert_eq!(MouseButton::from_name("Mouse"), Some(MouseButton::LEFT));
        assert_eq!(MouseButton::from_name("Mo"), None);
    }

    #[test]
    fn press_settles_into_down_then_up() {
        let mut input = InputState::new();
        input.key_pressed(KeyCode::SPACE);
        assert_eq!(input.key_state(KeyCode::SPACE), ButtonState::Pressed);
        assert!(input.is_down_by_name("Space"));

        input.end_frame();
        assert_eq!(input.key_state(KeyCode::SPACE), ButtonState::Down);
        assert!(!input.was_key_pressed(KeyCode::SPACE));

        input.key_released(KeyCode::SPACE);
        assert_eq!(input.key_state(KeyCode::SPACE), ButtonState::Released);
        assert!(!input.is_key_down(KeyCode::SPACE));

        input.end_frame();
        assert_eq!(input.key_state(KeyCode::SPACE), ButtonState::Up);
    }

    #[test]
    fn repeated_press_does_not_retrigger_edge() {
        let mut input = InputState::new();
        input.key_pressed(KeyCode::UP);
        input.end_frame();
        input.key_pressed(KeyCode::UP);
        assert_eq!(input.key_state(KeyCode::UP), ButtonState::Down);
    }

    #[test]
    fn mouse_delta_is_relative_to_previous_frame() {
        let mut input = InputState::new();
        input.set_mouse_position(Vec2::new(10.0, 5.0));
        input.end_frame();
        input.set_mouse_position(Vec2::new(14.0, 2.0));
        assert_eq!(input.mouse_delta(), Vec2::new(4.0, -3.0));
        input.add_scroll(Vec2::new(0.0, 1.0));
        input.end_frame();
        assert_eq!(input.scroll_delta(), Vec2::ZERO);
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
    }
}
