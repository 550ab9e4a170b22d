use serde::{Deserialize, Serialize};

use super::{ActionSet, LogicalAction, PadButton, RawPadState};
use crate::math::Vec2;

/// Analog triggers count as a held action past this point.
const TRIGGER_ACTION_THRESHOLD: f32 = 0.5;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlLayout {
    #[default]
    Classic,
    Action,
    Southpaw,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MappedInput {
    pub move_axis: Vec2,
    pub look_axis: Vec2,
    pub left_trigger: f32,
    pub right_trigger: f32,
    pub actions: ActionSet,
}

impl ControlLayout {
    /// Which logical action a physical button drives under this layout.
    pub fn action_for(self, button: PadButton) -> Option<LogicalAction> {
        use LogicalAction as A;
        use PadButton as B;
        match (self, button) {
            (_, B::Start) => Some(A::Menu),
            (_, B::Select) => Some(A::Map),
            (_, B::DPadUp) => Some(A::Emote),
            (_, B::DPadRight) => Some(A::HotbarNext),
            (_, B::DPadLeft) => Some(A::HotbarPrev),
            (_, B::DPadDown) => None,

            (ControlLayout::Classic, B::South) => Some(A::Jump),
            (ControlLayout::Classic, B::West) => Some(A::Use),
            (ControlLayout::Classic, B::East) => Some(A::Crouch),
            (ControlLayout::Classic, B::North) => Some(A::Inventory),
            (ControlLayout::Classic, B::RightBumper) => Some(A::Attack),
            (ControlLayout::Classic, B::LeftBumper) => Some(A::Block),
            (ControlLayout::Classic, B::LeftStick) => Some(A::Sprint),
            (ControlLayout::Classic, B::RightStick) => None,

            (ControlLayout::Action, B::South) => Some(A::Jump),
            (ControlLayout::Action, B::East) => Some(A::Use),
            (ControlLayout::Action, B::West) => Some(A::Attack),
            (ControlLayout::Action, B::North) => Some(A::Inventory),
            (ControlLayout::Action, B::RightBumper) => Some(A::Block),
            (ControlLayout::Action, B::LeftBumper) => Some(A::Sprint),
            (ControlLayout::Action, B::LeftStick) => Some(A::Crouch),
            (ControlLayout::Action, B::RightStick) => None,

            (ControlLayout::Southpaw, B::South) => Some(A::Jump),
            (ControlLayout::Southpaw, B::West) => Some(A::Use),
            (ControlLayout::Southpaw, B::East) => Some(A::Crouch),
            (ControlLayout::Southpaw, B::North) => Some(A::Inventory),
            (ControlLayout::Southpaw, B::LeftBumper) => Some(A::Attack),
            (ControlLayout::Southpaw, B::RightBumper) => Some(A::Block),
            (ControlLayout::Southpaw, B::RightStick) => Some(A::Sprint),
            (ControlLayout::Southpaw, B::LeftStick) => None,
        }
    }

    fn trigger_actions(self) -> (LogicalAction, LogicalAction) {
        match self {
            ControlLayout::Classic | ControlLayout::Action => {
                (LogicalAction::Block, LogicalAction::Attack)
            }
            ControlLayout::Southpaw => (LogicalAction::Attack, LogicalAction::Block),
        }
    }

    /// Pure mapping from raw device state to logical input.
    pub fn map(self, raw: &RawPadState) -> MappedInput {
        let mut actions = ActionSet::EMPTY;
        for button in PadButton::ALL {
            if raw.buttons.contains(button) {
                if let Some(action) = self.action_for(button) {
                    actions.insert(action);
                }
            }
        }

        let (left_trigger_action, right_trigger_action) = self.trigger_actions();
        if raw.left_trigger >= TRIGGER_ACTION_THRESHOLD {
            actions.insert(left_trigger_action);
        }
        if raw.right_trigger >= TRIGGER_ACTION_THRESHOLD {
            actions.insert(right_trigger_action);
        }

        let (move_axis, look_axis) = match self {
            ControlLayout::Southpaw => (raw.right_stick, raw.left_stick),
            ControlLayout::Classic | ControlLayout::Action => (raw.left_stick, raw.right_stick),
        };

        MappedInput {
            move_axis,
            look_axis,
            left_trigger: raw.left_trigger,
            right_trigger: raw.right_trigger,
            actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::ButtonSet;

    fn raw_with(button: PadButton) -> RawPadState {
        RawPadState {
            buttons: ButtonSet::default().with(button),
            ..RawPadState::default()
        }
    }

    #[test]
    fn same_button_means_different_actions_per_layout() {
        let raw = raw_with(PadButton::West);
        assert!(ControlLayout::Classic
            .map(&raw)
            .actions
            .contains(LogicalAction::Use));
        assert!(ControlLayout::Action
            .map(&raw)
            .actions
            .contains(LogicalAction::Attack));
    }

    #[test]
    fn mapping_is_pure() {
        let raw = RawPadState {
            left_stick: Vec2::new(0.5, 0.0),
            right_trigger: 0.9,
            buttons: ButtonSet::default().with(PadButton::South),
            ..RawPadState::default()
        };
        assert_eq!(
            ControlLayout::Action.map(&raw),
            ControlLayout::Action.map(&raw)
        );
    }

    #[test]
    fn southpaw_swaps_sticks_and_triggers() {
        let raw = RawPadState {
            left_stick: Vec2::new(1.0, 0.0),
            right_stick: Vec2::new(0.0, 1.0),
            left_trigger: 1.0,
            ..RawPadState::default()
        };
        let mapped = ControlLayout::Southpaw.map(&raw);
        assert_eq!(mapped.move_axis, Vec2::new(0.0, 1.0));
        assert_eq!(mapped.look_axis, Vec2::new(1.0, 0.0));
        assert!(mapped.actions.contains(LogicalAction::Attack));
        assert!(!mapped.actions.contains(LogicalAction::Block));
    }

    #[test]
    fn soft_trigger_pull_is_not_an_action() {
        let raw = RawPadState {
            right_trigger: 0.3,
            ..RawPadState::default()
        };
        assert!(ControlLayout::Classic.map(&raw).actions.is_empty());
    }
}
