//! Seams into the host game. Everything the core needs from the outside
//! world goes through these traits; the host keeps ownership of its own
//! objects and the core only ever holds ids.

use thiserror::Error;

use crate::compositor::CameraState;
use crate::impersonation::PlayerContext;
use crate::math::Vec3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CharacterId(pub u64);

/// Network peer owning a replicated character. Both local players share the
/// same peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerId(pub u32);

/// Identity of one specific "start world" call, used to key the replay bypass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorldEntryId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerIndex(pub u8);

impl LayerIndex {
    pub const MAX: LayerIndex = LayerIndex(31);
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LayerMask(pub u32);

impl LayerMask {
    pub const EMPTY: LayerMask = LayerMask(0);
    pub const ALL: LayerMask = LayerMask(u32::MAX);

    pub fn single(layer: LayerIndex) -> Self {
        Self::EMPTY.with(layer)
    }

    pub fn contains(self, layer: LayerIndex) -> bool {
        layer.0 <= LayerIndex::MAX.0 && self.0 & (1u32 << layer.0) != 0
    }

    pub fn with(self, layer: LayerIndex) -> Self {
        if layer.0 > LayerIndex::MAX.0 {
            return self;
        }
        Self(self.0 | (1u32 << layer.0))
    }

    pub fn without(self, layer: LayerIndex) -> Self {
        if layer.0 > LayerIndex::MAX.0 {
            return self;
        }
        Self(self.0 & !(1u32 << layer.0))
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharacterPose {
    pub position: Vec3,
    pub eye_point: Vec3,
    pub yaw_radians: f32,
    pub on_moving_platform: bool,
    pub platform_up: Vec3,
    pub alive: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpawnRequest {
    pub profile_name: String,
    pub position: Vec3,
    pub owner: PeerId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldEntryRequest {
    pub id: WorldEntryId,
    pub world_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host object is not available: {0}")]
    MissingObject(&'static str),
    #[error("host rejected character spawn: {0}")]
    SpawnRejected(String),
}

pub trait CameraHost {
    fn screen_size(&self) -> (u32, u32);
    /// The camera the host renders its world through, if a world is loaded.
    fn principal_camera(&self) -> Option<CameraId>;
    fn sky_camera(&self) -> Option<CameraId>;
    fn camera(&self, id: CameraId) -> Option<&CameraState>;
    fn camera_mut(&mut self, id: CameraId) -> Option<&mut CameraState>;
    fn create_camera(&mut self, state: CameraState) -> CameraId;
    fn destroy_camera(&mut self, id: CameraId);
    /// Layer the host draws its own interface on.
    fn ui_layer(&self) -> LayerIndex;
    /// Layers already claimed by host content.
    fn used_layers(&self) -> LayerMask;
}

pub trait CharacterHost {
    fn local_player_character(&self) -> Option<CharacterId>;
    fn local_peer(&self) -> PeerId;
    /// Create a character. The host runs its normal "new character takes
    /// control" logic against `context`, which suppresses it for player 2.
    fn spawn_character(
        &mut self,
        request: &SpawnRequest,
        context: &mut PlayerContext,
    ) -> Result<CharacterId, HostError>;
    fn despawn_character(&mut self, id: CharacterId, context: &mut PlayerContext);
    fn character_pose(&self, id: CharacterId) -> Option<CharacterPose>;
    fn is_title_screen(&self) -> bool;
    fn is_world_loaded(&self) -> bool;
    /// Re-issue a start-world call that was previously vetoed.
    fn replay_world_entry(&mut self, request: WorldEntryRequest);
    fn set_lan_hosting(&mut self, enabled: bool);
}

pub trait PhysicsQuery {
    /// Distance along `direction` to the first hit of a swept sphere.
    fn sphere_cast(
        &self,
        origin: Vec3,
        direction: Vec3,
        radius: f32,
        max_distance: f32,
    ) -> Option<f32>;
    /// Water surface height at the given point, if any water is there.
    fn water_height(&self, at: Vec3) -> Option<f32>;
}

pub trait Host: CameraHost + CharacterHost + PhysicsQuery {}

impl<T: CameraHost + CharacterHost + PhysicsQuery + ?Sized> Host for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_mask_ignores_out_of_range_layers() {
        let mask = LayerMask::EMPTY.with(LayerIndex(40));
        assert!(mask.is_empty());
        assert!(!mask.contains(LayerIndex(40)));
    }

    #[test]
    fn layer_mask_with_and_without_round_trip() {
        let mask = LayerMask::single(LayerIndex(31)).with(LayerIndex(0));
        assert!(mask.contains(LayerIndex(31)));
        assert!(mask.contains(LayerIndex(0)));
        let mask = mask.without(LayerIndex(31));
        assert!(!mask.contains(LayerIndex(31)));
        assert_eq!(mask, LayerMask(1));
    }
}
