use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Player 0 on keyboard and pointer, player 1 on the first controller
    /// (or the fixed fallback keys when none is connected).
    #[default]
    KeyboardAndController,
    /// Controllers assigned in enumeration order.
    DualController,
    /// Both players read the same controller. Diagnostic use.
    SharedController,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSource {
    KeyboardPointer,
    KeyboardFallback,
    /// Index into the enumeration-ordered list of connected controllers.
    Controller(usize),
    /// Assigned a controller that is not connected.
    Missing,
}

/// Which physical device feeds each logical player this frame. Cheap and
/// recomputed every frame so hot-plugging is picked up immediately.
pub fn resolve_devices(mode: InputMode, connected_controllers: usize) -> [DeviceSource; 2] {
    match mode {
        InputMode::KeyboardAndController => [
            DeviceSource::KeyboardPointer,
            if connected_controllers >= 1 {
                DeviceSource::Controller(0)
            } else {
                DeviceSource::KeyboardFallback
            },
        ],
        InputMode::DualController => [
            if connected_controllers >= 1 {
                DeviceSource::Controller(0)
            } else {
                DeviceSource::KeyboardPointer
            },
            if connected_controllers >= 2 {
                DeviceSource::Controller(1)
            } else {
                DeviceSource::Missing
            },
        ],
        InputMode::SharedController => {
            let shared = if connected_controllers >= 1 {
                DeviceSource::Controller(0)
            } else {
                DeviceSource::KeyboardPointer
            };
            [shared, shared]
        }
    }
}
