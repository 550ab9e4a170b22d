use tracing::info;

use super::deadzone::{apply_radial_deadzone, apply_trigger_deadzone};
use super::devices::{resolve_devices, DeviceSource, InputMode};
use super::keyboard::{KeyboardMapping, KeyboardState};
use super::layout::ControlLayout;
use super::{ActionSet, InputSnapshot, RawPadState};
use crate::math::Vec2;
use crate::player::PlayerIndex;

pub const MOVE_DEADZONE: f32 = 0.2;
pub const LOOK_DEADZONE: f32 = 0.1;
const TRIGGER_DEADZONE: f32 = 0.1;
/// Pointer pixels per unit of look axis.
const POINTER_PIXELS_PER_LOOK_UNIT: f32 = 12.0;

/// Everything the devices reported this frame.
#[derive(Debug, Clone, Copy)]
pub struct DeviceFrame<'a> {
    pub keyboard: &'a KeyboardState,
    /// Pointer motion since the previous frame, in pixels.
    pub pointer_delta: Vec2,
    /// Connected controllers in enumeration order.
    pub controllers: &'a [RawPadState],
}

/// Routes physical devices to the two logical players and produces one
/// snapshot per player per frame.
#[derive(Debug)]
pub struct InputDemux {
    mode: InputMode,
    layout: ControlLayout,
    look_sensitivity: f32,
    primary_keys: KeyboardMapping,
    fallback_keys: KeyboardMapping,
    previous_held: [ActionSet; 2],
    split_active: bool,
    look_suppressed: [bool; 2],
    last_sources: [Option<DeviceSource>; 2],
}

impl InputDemux {
    pub fn new(mode: InputMode, layout: ControlLayout, look_sensitivity: f32) -> Self {
        Self {
            mode,
            layout,
            look_sensitivity,
            primary_keys: KeyboardMapping::primary(),
            fallback_keys: KeyboardMapping::fallback_second(),
            previous_held: [ActionSet::EMPTY; 2],
            split_active: false,
            look_suppressed: [false; 2],
            last_sources: [None; 2],
        }
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn layout(&self) -> ControlLayout {
        self.layout
    }

    pub fn set_layout(&mut self, layout: ControlLayout) {
        self.layout = layout;
    }

    pub fn is_split_active(&self) -> bool {
        self.split_active
    }

    /// While inactive only player 0 is routed; player 1 reads neutral.
    pub fn set_split_active(&mut self, active: bool) {
        if self.split_active == active {
            return;
        }
        self.split_active = active;
        self.previous_held[PlayerIndex::Second.index()] = ActionSet::EMPTY;
        self.look_suppressed[PlayerIndex::Second.index()] = false;
        self.last_sources[PlayerIndex::Second.index()] = None;
        info!(split_active = active, "input_split_routing");
    }

    /// Zero the look axis for a player whose interface is capturing input.
    pub fn suppress_look(&mut self, player: PlayerIndex, suppressed: bool) {
        self.look_suppressed[player.index()] = suppressed;
    }

    pub fn read_frame(&mut self, frame: &DeviceFrame<'_>) -> [InputSnapshot; 2] {
        let sources = if self.split_active {
            resolve_devices(self.mode, frame.controllers.len())
        } else {
            // Single-player: the host's usual keyboard plus first pad.
            [DeviceSource::KeyboardPointer, DeviceSource::Missing]
        };
        PlayerIndex::ALL.map(|player| self.read_player(player, sources[player.index()], frame))
    }

    fn read_player(
        &mut self,
        player: PlayerIndex,
        source: DeviceSource,
        frame: &DeviceFrame<'_>,
    ) -> InputSnapshot {
        let slot = player.index();
        if self.last_sources[slot] != Some(source) {
            info!(
                player = %player,
                from = ?self.last_sources[slot],
                to = ?source,
                "input_device_assignment_changed"
            );
            self.last_sources[slot] = Some(source);
        }

        let (raw, pointer_look) = match source {
            DeviceSource::KeyboardPointer => {
                let keys = self.primary_keys.read(frame.keyboard);
                let raw = match frame.controllers.first() {
                    // Single-player keeps the host's "pad or keyboard" behaviour.
                    Some(pad) if !self.split_active => merge_pad(keys, *pad),
                    _ => keys,
                };
                (Some(raw), frame.pointer_delta.scale(1.0 / POINTER_PIXELS_PER_LOOK_UNIT))
            }
            DeviceSource::KeyboardFallback => {
                (Some(self.fallback_keys.read(frame.keyboard)), Vec2::ZERO)
            }
            DeviceSource::Controller(index) => (frame.controllers.get(index).copied(), Vec2::ZERO),
            DeviceSource::Missing => (None, Vec2::ZERO),
        };

        let Some(raw) = raw else {
            self.previous_held[slot] = ActionSet::EMPTY;
            return InputSnapshot::new(
                Vec2::ZERO,
                Vec2::ZERO,
                0.0,
                0.0,
                ActionSet::EMPTY,
                ActionSet::EMPTY,
                source,
                self.split_active,
            );
        };

        let mapped = self.layout.map(&raw);
        let move_axis = apply_radial_deadzone(mapped.move_axis, MOVE_DEADZONE);
        let stick_look = apply_radial_deadzone(mapped.look_axis, LOOK_DEADZONE)
            .scale(self.look_sensitivity);
        let look_axis = if self.look_suppressed[slot] {
            Vec2::ZERO
        } else {
            stick_look + pointer_look
        };

        let held = mapped.actions;
        let pressed = held.newly_set_since(self.previous_held[slot]);
        self.previous_held[slot] = held;

        InputSnapshot::new(
            move_axis,
            look_axis,
            apply_trigger_deadzone(mapped.left_trigger, TRIGGER_DEADZONE),
            apply_trigger_deadzone(mapped.right_trigger, TRIGGER_DEADZONE),
            held,
            pressed,
            source,
            false,
        )
    }
}

fn merge_pad(keyboard: RawPadState, pad: RawPadState) -> RawPadState {
    let pick = |a: Vec2, b: Vec2| if a.length() >= b.length() { a } else { b };
    let mut buttons = keyboard.buttons;
    for button in super::PadButton::ALL {
        if pad.buttons.contains(button) {
            buttons.set(button, true);
        }
    }
    RawPadState {
        left_stick: pick(keyboard.left_stick, pad.left_stick),
        right_stick: pick(keyboard.right_stick, pad.right_stick),
        left_trigger: keyboard.left_trigger.max(pad.left_trigger),
        right_trigger: keyboard.right_trigger.max(pad.right_trigger),
        buttons,
    }
}

#[cfg(test)]
mod tests {
    use winit::keyboard::KeyCode;

    use super::*;
    use crate::input::{ButtonSet, LogicalAction, PadButton};

    fn pad_with(button: PadButton) -> RawPadState {
        RawPadState {
            buttons: ButtonSet::default().with(button),
            ..RawPadState::default()
        }
    }

    fn split_demux(mode: InputMode) -> InputDemux {
        let mut demux = InputDemux::new(mode, ControlLayout::Classic, 1.0);
        demux.set_split_active(true);
        demux
    }

    fn read(demux: &mut InputDemux, keyboard: &KeyboardState, pads: &[RawPadState]) -> [InputSnapshot; 2] {
        demux.read_frame(&DeviceFrame {
            keyboard,
            pointer_delta: Vec2::ZERO,
            controllers: pads,
        })
    }

    #[test]
    fn pressed_is_true_only_on_first_held_frame() {
        let mut demux = split_demux(InputMode::DualController);
        let keyboard = KeyboardState::default();
        let jump = [pad_with(PadButton::South), RawPadState::default()];
        let idle = [RawPadState::default(), RawPadState::default()];

        let first = read(&mut demux, &keyboard, &jump)[0];
        let second = read(&mut demux, &keyboard, &jump)[0];
        let released = read(&mut demux, &keyboard, &idle)[0];
        let again = read(&mut demux, &keyboard, &jump)[0];

        assert!(first.held(LogicalAction::Jump) && first.pressed(LogicalAction::Jump));
        assert!(second.held(LogicalAction::Jump) && !second.pressed(LogicalAction::Jump));
        assert!(!released.held(LogicalAction::Jump));
        assert!(again.pressed(LogicalAction::Jump));
    }

    #[test]
    fn edges_are_tracked_per_player() {
        let mut demux = split_demux(InputMode::DualController);
        let keyboard = KeyboardState::default();

        let only_first = [pad_with(PadButton::South), RawPadState::default()];
        let [p0, p1] = read(&mut demux, &keyboard, &only_first);
        assert!(p0.pressed(LogicalAction::Jump));
        assert!(!p1.pressed(LogicalAction::Jump));

        // Same physical action on both pads: player 1 still gets its own edge.
        let both = [pad_with(PadButton::South), pad_with(PadButton::South)];
        let [p0, p1] = read(&mut demux, &keyboard, &both);
        assert!(!p0.pressed(LogicalAction::Jump));
        assert!(p1.pressed(LogicalAction::Jump));
    }

    #[test]
    fn shared_mode_gives_each_player_independent_edges() {
        let mut demux = split_demux(InputMode::SharedController);
        let keyboard = KeyboardState::default();
        let pads = [pad_with(PadButton::RightBumper)];
        let [p0, p1] = read(&mut demux, &keyboard, &pads);
        assert!(p0.pressed(LogicalAction::Attack));
        assert!(p1.pressed(LogicalAction::Attack));
        let [p0, p1] = read(&mut demux, &keyboard, &pads);
        assert!(!p0.pressed(LogicalAction::Attack));
        assert!(!p1.pressed(LogicalAction::Attack));
    }

    #[test]
    fn zero_controllers_keyboard_mode_feeds_both_players_from_keyboard() {
        let mut demux = split_demux(InputMode::KeyboardAndController);
        let mut keyboard = KeyboardState::default();
        keyboard.set_key(KeyCode::KeyW, true);
        keyboard.set_key(KeyCode::ArrowLeft, true);

        let [p0, p1] = read(&mut demux, &keyboard, &[]);
        assert_eq!(p0.source(), DeviceSource::KeyboardPointer);
        assert_eq!(p1.source(), DeviceSource::KeyboardFallback);
        assert!(p0.move_axis().y > 0.9);
        assert_eq!(p0.move_axis().x, 0.0);
        assert!(p1.move_axis().x < -0.9);
        assert!(!p1.needs_controller());
    }

    #[test]
    fn missing_second_controller_is_explicit() {
        let mut demux = split_demux(InputMode::DualController);
        let keyboard = KeyboardState::default();
        let [_, p1] = read(&mut demux, &keyboard, &[pad_with(PadButton::South)]);
        assert!(p1.needs_controller());
        assert_eq!(p1.source(), DeviceSource::Missing);
    }

    #[test]
    fn hot_plug_is_reflected_next_frame() {
        let mut demux = split_demux(InputMode::KeyboardAndController);
        let keyboard = KeyboardState::default();
        let [_, p1] = read(&mut demux, &keyboard, &[]);
        assert_eq!(p1.source(), DeviceSource::KeyboardFallback);
        let [_, p1] = read(&mut demux, &keyboard, &[RawPadState::default()]);
        assert_eq!(p1.source(), DeviceSource::Controller(0));
    }

    #[test]
    fn move_and_look_use_different_deadzones() {
        let mut demux = split_demux(InputMode::DualController);
        let keyboard = KeyboardState::default();
        let wobble = RawPadState {
            left_stick: Vec2::new(0.15, 0.0),
            right_stick: Vec2::new(0.15, 0.0),
            ..RawPadState::default()
        };
        let [p0, _] = read(&mut demux, &keyboard, &[wobble, RawPadState::default()]);
        assert_eq!(p0.move_axis(), Vec2::ZERO);
        assert!(p0.look_axis().x > 0.0);
    }

    #[test]
    fn suppressed_look_reads_zero() {
        let mut demux = split_demux(InputMode::DualController);
        demux.suppress_look(PlayerIndex::Second, true);
        let keyboard = KeyboardState::default();
        let look = RawPadState {
            right_stick: Vec2::new(1.0, 0.0),
            ..RawPadState::default()
        };
        let [p0, p1] = read(&mut demux, &keyboard, &[look, look]);
        assert!(p0.look_axis().x > 0.9);
        assert_eq!(p1.look_axis(), Vec2::ZERO);
    }

    #[test]
    fn inactive_split_leaves_second_player_neutral() {
        let mut demux = InputDemux::new(InputMode::DualController, ControlLayout::Classic, 1.0);
        let keyboard = KeyboardState::default();
        let pads = [pad_with(PadButton::South), pad_with(PadButton::South)];
        let [p0, p1] = read(&mut demux, &keyboard, &pads);
        assert!(p0.pressed(LogicalAction::Jump));
        assert!(!p1.held(LogicalAction::Jump));
        assert!(!p1.needs_controller());
    }

    #[test]
    fn look_sensitivity_scales_stick_look() {
        let mut demux = InputDemux::new(InputMode::DualController, ControlLayout::Classic, 2.0);
        demux.set_split_active(true);
        let keyboard = KeyboardState::default();
        let look = RawPadState {
            right_stick: Vec2::new(1.0, 0.0),
            ..RawPadState::default()
        };
        let [p0, _] = read(&mut demux, &keyboard, &[look, RawPadState::default()]);
        assert!((p0.look_axis().x - 2.0).abs() < 0.0001);
    }
}
