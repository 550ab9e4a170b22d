//! Interface the presentation layers (HUD clone, inventory clone, menu
//! split view) are driven through. They live outside the core.

use thiserror::Error;

use crate::host::{CameraId, LayerIndex};
use crate::player::PlayerIndex;

/// Where a collaborator should draw for one player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UiAnchor {
    pub player: PlayerIndex,
    pub ui_camera: CameraId,
    pub layer: LayerIndex,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PresentationError {
    #[error("{collaborator} could not attach: {reason}")]
    AttachFailed {
        collaborator: &'static str,
        reason: String,
    },
}

pub trait PresentationCollaborator {
    fn name(&self) -> &'static str;
    fn attach(&mut self, anchor: &UiAnchor) -> Result<(), PresentationError>;
    fn detach(&mut self);
    /// A modal panel owned by this collaborator is taking the second
    /// player's input, so world look should be held still.
    fn is_capturing_input(&self) -> bool;
}
