mod coordinator;
mod scheduler;
mod world_gate;

pub use coordinator::{SessionCoordinator, WorldEntryDecision};
pub use scheduler::{DeferredAction, Delay, FrameScheduler, StateGuard};
pub use world_gate::WorldEntryGate;

use std::fmt;

use thiserror::Error;

use crate::compositor::CompositorError;
use crate::host::HostError;
use crate::player::PlayerIndex;
use crate::presentation::PresentationError;
use crate::profile::ProfileError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    #[default]
    Disabled,
    MenuSplit,
    AwaitingP2Character,
    Armed,
    Active,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Disabled => "disabled",
            SessionState::MenuSplit => "menu_split",
            SessionState::AwaitingP2Character => "awaiting_p2_character",
            SessionState::Armed => "armed",
            SessionState::Active => "active",
        };
        f.write_str(name)
    }
}

/// Process-lifetime session data. Only the coordinator mutates it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub(crate) state: SessionState,
    pub(crate) split_enabled: bool,
    pub(crate) pending_second_profile: Option<String>,
    pub(crate) active_player_index: PlayerIndex,
}

impl Session {
    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn split_enabled(&self) -> bool {
        self.split_enabled
    }

    pub fn pending_second_profile(&self) -> Option<&str> {
        self.pending_second_profile.as_deref()
    }

    /// Advisory: the player whose callback ran most recently.
    pub fn active_player_index(&self) -> PlayerIndex {
        self.active_player_index
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub from: SessionState,
    pub to: SessionState,
    pub reason: &'static str,
    pub epoch: u64,
}

#[derive(Debug, Error)]
pub enum ActivationError {
    #[error("host has no local player character yet")]
    NoLocalPlayer,
    #[error("no profile chosen for the second player")]
    NoSecondProfile,
    #[error(transparent)]
    Compositor(#[from] CompositorError),
    #[error("second player profile: {0}")]
    Profile(#[from] ProfileError),
    #[error("second player spawn: {0}")]
    Spawn(#[from] HostError),
    #[error(transparent)]
    Presentation(#[from] PresentationError),
}

impl ActivationError {
    /// The host is not ready yet; retry later without leaving `Armed`.
    pub fn is_precondition(&self) -> bool {
        match self {
            ActivationError::NoLocalPlayer => true,
            ActivationError::Compositor(error) => error.is_precondition(),
            _ => false,
        }
    }
}
