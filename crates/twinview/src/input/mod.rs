mod deadzone;
mod demux;
mod devices;
#[cfg(feature = "gamepad")]
mod gamepad;
mod keyboard;
mod layout;

pub use deadzone::{apply_radial_deadzone, apply_trigger_deadzone};
pub use demux::{DeviceFrame, InputDemux, LOOK_DEADZONE, MOVE_DEADZONE};
pub use devices::{resolve_devices, DeviceSource, InputMode};
#[cfg(feature = "gamepad")]
pub use gamepad::GamepadPoller;
pub use keyboard::{KeyboardMapping, KeyboardState};
pub use layout::{ControlLayout, MappedInput};

use crate::math::Vec2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PadButton {
    South,
    East,
    West,
    North,
    LeftBumper,
    RightBumper,
    LeftStick,
    RightStick,
    Start,
    Select,
    DPadUp,
    DPadDown,
    DPadLeft,
    DPadRight,
}

impl PadButton {
    pub const ALL: [PadButton; 14] = [
        PadButton::South,
        PadButton::East,
        PadButton::West,
        PadButton::North,
        PadButton::LeftBumper,
        PadButton::RightBumper,
        PadButton::LeftStick,
        PadButton::RightStick,
        PadButton::Start,
        PadButton::Select,
        PadButton::DPadUp,
        PadButton::DPadDown,
        PadButton::DPadLeft,
        PadButton::DPadRight,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonSet(u16);

impl ButtonSet {
    pub fn set(&mut self, button: PadButton, is_down: bool) {
        if is_down {
            self.0 |= button.bit();
        } else {
            self.0 &= !button.bit();
        }
    }

    pub fn with(mut self, button: PadButton) -> Self {
        self.set(button, true);
        self
    }

    pub fn contains(self, button: PadButton) -> bool {
        self.0 & button.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Game-level actions a control layout maps physical buttons onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalAction {
    Jump,
    Use,
    Attack,
    Block,
    Sprint,
    Crouch,
    Inventory,
    Menu,
    Map,
    Emote,
    HotbarNext,
    HotbarPrev,
}

impl LogicalAction {
    pub const ALL: [LogicalAction; 12] = [
        LogicalAction::Jump,
        LogicalAction::Use,
        LogicalAction::Attack,
        LogicalAction::Block,
        LogicalAction::Sprint,
        LogicalAction::Crouch,
        LogicalAction::Inventory,
        LogicalAction::Menu,
        LogicalAction::Map,
        LogicalAction::Emote,
        LogicalAction::HotbarNext,
        LogicalAction::HotbarPrev,
    ];

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionSet(u16);

impl ActionSet {
    pub const EMPTY: ActionSet = ActionSet(0);

    pub fn insert(&mut self, action: LogicalAction) {
        self.0 |= action.bit();
    }

    pub fn with(mut self, action: LogicalAction) -> Self {
        self.insert(action);
        self
    }

    pub fn contains(self, action: LogicalAction) -> bool {
        self.0 & action.bit() != 0
    }

    /// Actions in `self` that are not in `previous`.
    pub fn newly_set_since(self, previous: ActionSet) -> ActionSet {
        ActionSet(self.0 & !previous.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Device-level state before layout mapping and deadzones.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RawPadState {
    pub left_stick: Vec2,
    pub right_stick: Vec2,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub buttons: ButtonSet,
}

/// One logical player's input for one frame. Immutable once produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputSnapshot {
    move_axis: Vec2,
    look_axis: Vec2,
    left_trigger: f32,
    right_trigger: f32,
    held: ActionSet,
    pressed: ActionSet,
    source: DeviceSource,
    needs_controller: bool,
}

impl InputSnapshot {
    pub fn neutral(source: DeviceSource) -> Self {
        Self {
            move_axis: Vec2::ZERO,
            look_axis: Vec2::ZERO,
            left_trigger: 0.0,
            right_trigger: 0.0,
            held: ActionSet::EMPTY,
            pressed: ActionSet::EMPTY,
            source,
            needs_controller: false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        move_axis: Vec2,
        look_axis: Vec2,
        left_trigger: f32,
        right_trigger: f32,
        held: ActionSet,
        pressed: ActionSet,
        source: DeviceSource,
        needs_controller: bool,
    ) -> Self {
        Self {
            move_axis,
            look_axis,
            left_trigger,
            right_trigger,
            held,
            pressed,
            source,
            needs_controller,
        }
    }

    pub fn move_axis(&self) -> Vec2 {
        self.move_axis
    }

    pub fn look_axis(&self) -> Vec2 {
        self.look_axis
    }

    pub fn triggers(&self) -> (f32, f32) {
        (self.left_trigger, self.right_trigger)
    }

    pub fn held(&self, action: LogicalAction) -> bool {
        self.held.contains(action)
    }

    pub fn pressed(&self, action: LogicalAction) -> bool {
        self.pressed.contains(action)
    }

    pub fn held_actions(&self) -> ActionSet {
        self.held
    }

    pub fn source(&self) -> DeviceSource {
        self.source
    }

    /// True while this player is assigned a controller that is not plugged in.
    pub fn needs_controller(&self) -> bool {
        self.needs_controller
    }

    pub fn with_look_suppressed(mut self) -> Self {
        self.look_axis = Vec2::ZERO;
        self
    }
}

impl Default for InputSnapshot {
    fn default() -> Self {
        Self::neutral(DeviceSource::Missing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newly_set_only_reports_rising_edges() {
        let previous = ActionSet::EMPTY.with(LogicalAction::Jump);
        let current = ActionSet::EMPTY
            .with(LogicalAction::Jump)
            .with(LogicalAction::Attack);
        let edges = current.newly_set_since(previous);
        assert!(edges.contains(LogicalAction::Attack));
        assert!(!edges.contains(LogicalAction::Jump));
    }

    #[test]
    fn button_set_clears_on_release() {
        let mut buttons = ButtonSet::default().with(PadButton::DPadRight);
        assert!(buttons.contains(PadButton::DPadRight));
        buttons.set(PadButton::DPadRight, false);
        assert!(buttons.is_empty());
    }

    #[test]
    fn every_action_has_a_distinct_bit() {
        let mut set = ActionSet::EMPTY;
        for action in LogicalAction::ALL {
            assert!(!set.contains(action));
            set.insert(action);
        }
        for action in LogicalAction::ALL {
            assert!(set.contains(action));
        }
    }
}
