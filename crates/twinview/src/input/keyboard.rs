use std::collections::HashSet;

use winit::keyboard::KeyCode;

use super::{ButtonSet, PadButton, RawPadState};
use crate::math::Vec2;

/// Raw keyboard and pointer state collected by the host's event loop.
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    held: HashSet<KeyCode>,
    primary_button_down: bool,
    secondary_button_down: bool,
}

impl KeyboardState {
    pub fn set_key(&mut self, key: KeyCode, is_down: bool) {
        if is_down {
            self.held.insert(key);
        } else {
            self.held.remove(&key);
        }
    }

    pub fn is_held(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    pub fn set_pointer_buttons(&mut self, primary: bool, secondary: bool) {
        self.primary_button_down = primary;
        self.secondary_button_down = secondary;
    }

    pub fn set_primary_button(&mut self, is_down: bool) {
        self.primary_button_down = is_down;
    }

    pub fn set_secondary_button(&mut self, is_down: bool) {
        self.secondary_button_down = is_down;
    }

    /// Focus loss: nothing stays held.
    pub fn release_all(&mut self) {
        self.held.clear();
        self.primary_button_down = false;
        self.secondary_button_down = false;
    }
}

/// Keyboard keys standing in for a virtual controller.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardMapping {
    pub move_up: KeyCode,
    pub move_down: KeyCode,
    pub move_left: KeyCode,
    pub move_right: KeyCode,
    pub look_keys: Option<[KeyCode; 4]>,
    pub buttons: Vec<(KeyCode, PadButton)>,
    /// Pointer buttons drive the triggers (left = right trigger).
    pub pointer_triggers: bool,
}

impl KeyboardMapping {
    /// Player 0: WASD plus pointer.
    pub fn primary() -> Self {
        Self {
            move_up: KeyCode::KeyW,
            move_down: KeyCode::KeyS,
            move_left: KeyCode::KeyA,
            move_right: KeyCode::KeyD,
            look_keys: None,
            buttons: vec![
                (KeyCode::Space, PadButton::South),
                (KeyCode::KeyE, PadButton::West),
                (KeyCode::KeyC, PadButton::East),
                (KeyCode::Tab, PadButton::North),
                (KeyCode::ShiftLeft, PadButton::LeftStick),
                (KeyCode::KeyQ, PadButton::LeftBumper),
                (KeyCode::KeyR, PadButton::RightBumper),
                (KeyCode::KeyM, PadButton::Select),
                (KeyCode::KeyP, PadButton::Start),
                (KeyCode::KeyT, PadButton::DPadUp),
                (KeyCode::KeyZ, PadButton::DPadLeft),
                (KeyCode::KeyX, PadButton::DPadRight),
            ],
            pointer_triggers: true,
        }
    }

    /// Player 1 when no controller is connected: arrows to move, IJKL to
    /// look, right-hand keys for buttons. Disjoint from [`Self::primary`].
    pub fn fallback_second() -> Self {
        Self {
            move_up: KeyCode::ArrowUp,
            move_down: KeyCode::ArrowDown,
            move_left: KeyCode::ArrowLeft,
            move_right: KeyCode::ArrowRight,
            look_keys: Some([KeyCode::KeyI, KeyCode::KeyK, KeyCode::KeyJ, KeyCode::KeyL]),
            buttons: vec![
                (KeyCode::ControlRight, PadButton::South),
                (KeyCode::ShiftRight, PadButton::West),
                (KeyCode::Enter, PadButton::East),
                (KeyCode::Backslash, PadButton::North),
                (KeyCode::Period, PadButton::RightBumper),
                (KeyCode::Comma, PadButton::LeftBumper),
                (KeyCode::Slash, PadButton::LeftStick),
                (KeyCode::Backspace, PadButton::Start),
                (KeyCode::Quote, PadButton::Select),
            ],
            pointer_triggers: false,
        }
    }

    pub fn read(&self, state: &KeyboardState) -> RawPadState {
        let axis = |negative: KeyCode, positive: KeyCode| -> f32 {
            // Opposite keys cancel out.
            match (state.is_held(negative), state.is_held(positive)) {
                (true, false) => -1.0,
                (false, true) => 1.0,
                _ => 0.0,
            }
        };

        let left_stick = Vec2::new(
            axis(self.move_left, self.move_right),
            axis(self.move_down, self.move_up),
        );
        let right_stick = match self.look_keys {
            Some([up, down, left, right]) => Vec2::new(axis(left, right), axis(down, up)),
            None => Vec2::ZERO,
        };

        let mut buttons = ButtonSet::default();
        for (key, button) in &self.buttons {
            if state.is_held(*key) {
                buttons.set(*button, true);
            }
        }

        let (left_trigger, right_trigger) = if self.pointer_triggers {
            (
                if state.secondary_button_down { 1.0 } else { 0.0 },
                if state.primary_button_down { 1.0 } else { 0.0 },
            )
        } else {
            (0.0, 0.0)
        };

        RawPadState {
            left_stick,
            right_stick,
            left_trigger,
            right_trigger,
            buttons,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primary_and_fallback_mappings_share_no_keys() {
        let primary = KeyboardMapping::primary();
        let fallback = KeyboardMapping::fallback_second();
        let primary_keys: HashSet<KeyCode> = primary
            .buttons
            .iter()
            .map(|(key, _)| *key)
            .chain([
                primary.move_up,
                primary.move_down,
                primary.move_left,
                primary.move_right,
            ])
            .collect();
        let mut fallback_keys: Vec<KeyCode> = fallback.buttons.iter().map(|(key, _)| *key).collect();
        fallback_keys.extend([
            fallback.move_up,
            fallback.move_down,
            fallback.move_left,
            fallback.move_right,
        ]);
        fallback_keys.extend(fallback.look_keys.expect("look keys"));
        for key in fallback_keys {
            assert!(!primary_keys.contains(&key), "{key:?} is mapped twice");
        }
    }

    #[test]
    fn opposite_keys_cancel() {
        let mut state = KeyboardState::default();
        state.set_key(KeyCode::KeyA, true);
        state.set_key(KeyCode::KeyD, true);
        state.set_key(KeyCode::KeyW, true);
        let raw = KeyboardMapping::primary().read(&state);
        assert_eq!(raw.left_stick, Vec2::new(0.0, 1.0));
    }

    #[test]
    fn fallback_reads_look_keys_and_buttons() {
        let mut state = KeyboardState::default();
        state.set_key(KeyCode::KeyL, true);
        state.set_key(KeyCode::ControlRight, true);
        let raw = KeyboardMapping::fallback_second().read(&state);
        assert_eq!(raw.right_stick, Vec2::new(1.0, 0.0));
        assert!(raw.buttons.contains(PadButton::South));
    }

    #[test]
    fn pointer_buttons_become_triggers_for_primary_only() {
        let mut state = KeyboardState::default();
        state.set_pointer_buttons(true, false);
        assert_eq!(KeyboardMapping::primary().read(&state).right_trigger, 1.0);
        assert_eq!(
            KeyboardMapping::fallback_second().read(&state).right_trigger,
            0.0
        );
    }

    #[test]
    fn release_all_clears_everything() {
        let mut state = KeyboardState::default();
        state.set_key(KeyCode::Space, true);
        state.set_primary_button(true);
        state.release_all();
        let raw = KeyboardMapping::primary().read(&state);
        assert!(raw.buttons.is_empty());
        assert_eq!(raw.right_trigger, 0.0);
    }
}
