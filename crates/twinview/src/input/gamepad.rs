//! Controller polling through gilrs.

use gilrs::{Axis, Button, EventType, Gamepad, GamepadId, Gilrs};
use tracing::{info, warn};

use super::{ButtonSet, PadButton, RawPadState};
use crate::math::Vec2;

pub struct GamepadPoller {
    /// None if initialization failed; the session then runs keyboard-only.
    gilrs: Option<Gilrs>,
}

impl GamepadPoller {
    pub fn new() -> Self {
        let gilrs = match Gilrs::new() {
            Ok(gilrs) => Some(gilrs),
            Err(error) => {
                warn!(error = %error, "gamepad_init_failed");
                None
            }
        };
        Self { gilrs }
    }

    /// Drain pending events and read every connected pad, in enumeration
    /// (id) order, into `out`.
    pub fn poll(&mut self, out: &mut Vec<RawPadState>) {
        out.clear();
        let Some(gilrs) = self.gilrs.as_mut() else {
            return;
        };

        while let Some(event) = gilrs.next_event() {
            match event.event {
                EventType::Connected => {
                    info!(gamepad = usize::from(event.id), "gamepad_connected");
                }
                EventType::Disconnected => {
                    info!(gamepad = usize::from(event.id), "gamepad_disconnected");
                }
                _ => {}
            }
        }

        let mut connected: Vec<(GamepadId, Gamepad<'_>)> = gilrs
            .gamepads()
            .filter(|(_, gamepad)| gamepad.is_connected())
            .collect();
        connected.sort_by_key(|(id, _)| usize::from(*id));
        out.extend(connected.iter().map(|(_, gamepad)| read_gamepad(gamepad)));
    }
}

impl Default for GamepadPoller {
    fn default() -> Self {
        Self::new()
    }
}

fn read_gamepad(gamepad: &Gamepad<'_>) -> RawPadState {
    let mut buttons = ButtonSet::default();
    for (button, pad_button) in [
        (Button::South, PadButton::South),
        (Button::East, PadButton::East),
        (Button::West, PadButton::West),
        (Button::North, PadButton::North),
        (Button::LeftTrigger, PadButton::LeftBumper),
        (Button::RightTrigger, PadButton::RightBumper),
        (Button::LeftThumb, PadButton::LeftStick),
        (Button::RightThumb, PadButton::RightStick),
        (Button::Start, PadButton::Start),
        (Button::Select, PadButton::Select),
        (Button::DPadUp, PadButton::DPadUp),
        (Button::DPadDown, PadButton::DPadDown),
        (Button::DPadLeft, PadButton::DPadLeft),
        (Button::DPadRight, PadButton::DPadRight),
    ] {
        buttons.set(pad_button, gamepad.is_pressed(button));
    }

    // Triggers report either 0..1 or -1..1 depending on the driver.
    let trigger = |axis: Axis| -> f32 {
        let value = gamepad.value(axis);
        ((value + 1.0) / 2.0).clamp(0.0, 1.0)
    };

    RawPadState {
        left_stick: Vec2::new(gamepad.value(Axis::LeftStickX), gamepad.value(Axis::LeftStickY)),
        right_stick: Vec2::new(
            gamepad.value(Axis::RightStickX),
            gamepad.value(Axis::RightStickY),
        ),
        left_trigger: trigger(Axis::LeftZ),
        right_trigger: trigger(Axis::RightZ),
        buttons,
    }
}
