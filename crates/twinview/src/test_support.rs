//! In-memory host and collaborator doubles shared by the unit tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::compositor::{CameraRole, CameraState, DEFAULT_UI_LAYER};
use crate::host::{
    CameraHost, CameraId, CharacterHost, CharacterId, CharacterPose, HostError, LayerIndex,
    LayerMask, PeerId, PhysicsQuery, SpawnRequest, WorldEntryRequest,
};
use crate::impersonation::{AssignOutcome, PlayerContext};
use crate::math::Vec3;
use crate::presentation::{PresentationCollaborator, PresentationError, UiAnchor};

pub(crate) const LOCAL_PLAYER: CharacterId = CharacterId(1);

#[derive(Debug)]
pub(crate) struct FakeHost {
    pub screen: (u32, u32),
    pub cameras: BTreeMap<CameraId, CameraState>,
    pub principal: Option<CameraId>,
    pub sky: Option<CameraId>,
    pub used: LayerMask,
    /// Cameras created through `create_camera`.
    pub created: usize,
    pub next_id: u64,
    pub sky_vanishes_on_mutate: bool,
    pub title_screen: bool,
    pub world_loaded: bool,
    pub local_player: Option<CharacterId>,
    pub characters: BTreeMap<CharacterId, CharacterPose>,
    pub spawned: Vec<SpawnRequest>,
    pub despawned: Vec<CharacterId>,
    pub takeovers: Vec<AssignOutcome>,
    pub reject_spawns: bool,
    pub replays: Vec<WorldEntryRequest>,
    pub lan_hosting: bool,
}

impl FakeHost {
    pub fn title(width: u32, height: u32) -> Self {
        Self {
            screen: (width, height),
            cameras: BTreeMap::new(),
            principal: None,
            sky: None,
            used: LayerMask::EMPTY,
            created: 0,
            next_id: 100,
            sky_vanishes_on_mutate: false,
            title_screen: true,
            world_loaded: false,
            local_player: None,
            characters: BTreeMap::new(),
            spawned: Vec::new(),
            despawned: Vec::new(),
            takeovers: Vec::new(),
            reject_spawns: false,
            replays: Vec::new(),
            lan_hosting: false,
        }
    }

    /// A loaded world with cameras and a local player, context untouched.
    pub fn in_world(width: u32, height: u32) -> Self {
        let mut host = Self::title(width, height);
        host.load_world_objects();
        host
    }

    /// What the host does when a world finishes loading.
    pub fn enter_world(&mut self, context: &mut PlayerContext) {
        self.load_world_objects();
        context.assign_active(self.local_player);
    }

    pub fn load_world_objects(&mut self) {
        self.title_screen = false;
        self.world_loaded = true;
        self.add_host_cameras();
        self.local_player = Some(LOCAL_PLAYER);
        self.characters
            .insert(LOCAL_PLAYER, Self::pose_at(Vec3::new(0.0, 0.0, 0.0)));
    }

    pub fn add_host_cameras(&mut self) {
        let principal = CameraId(1);
        let sky = CameraId(2);
        self.cameras.insert(principal, CameraState::world());
        self.cameras.insert(
            sky,
            CameraState {
                role: CameraRole::Sky,
                depth: -1,
                ..CameraState::world()
            },
        );
        self.principal = Some(principal);
        self.sky = Some(sky);
    }

    pub fn exit_world(&mut self, context: &mut PlayerContext) {
        self.world_loaded = false;
        self.title_screen = true;
        self.cameras.clear();
        self.principal = None;
        self.sky = None;
        self.local_player = None;
        self.characters.clear();
        context.clear_active();
    }

    pub fn pose_at(position: Vec3) -> CharacterPose {
        CharacterPose {
            position,
            eye_point: position + Vec3::new(0.0, 1.6, 0.0),
            yaw_radians: 0.0,
            on_moving_platform: false,
            platform_up: Vec3::UP,
            alive: true,
        }
    }
}

impl CameraHost for FakeHost {
    fn screen_size(&self) -> (u32, u32) {
        self.screen
    }

    fn principal_camera(&self) -> Option<CameraId> {
        self.principal
    }

    fn sky_camera(&self) -> Option<CameraId> {
        self.sky
    }

    fn camera(&self, id: CameraId) -> Option<&CameraState> {
        self.cameras.get(&id)
    }

    fn camera_mut(&mut self, id: CameraId) -> Option<&mut CameraState> {
        if self.sky_vanishes_on_mutate && Some(id) == self.sky {
            return None;
        }
        self.cameras.get_mut(&id)
    }

    fn create_camera(&mut self, state: CameraState) -> CameraId {
        let id = CameraId(self.next_id);
        self.next_id += 1;
        self.created += 1;
        self.cameras.insert(id, state);
        id
    }

    fn destroy_camera(&mut self, id: CameraId) {
        self.cameras.remove(&id);
    }

    fn ui_layer(&self) -> LayerIndex {
        DEFAULT_UI_LAYER
    }

    fn used_layers(&self) -> LayerMask {
        self.used
    }
}

impl CharacterHost for FakeHost {
    fn local_player_character(&self) -> Option<CharacterId> {
        self.local_player
    }

    fn local_peer(&self) -> PeerId {
        PeerId(7)
    }

    fn spawn_character(
        &mut self,
        request: &SpawnRequest,
        context: &mut PlayerContext,
    ) -> Result<CharacterId, HostError> {
        if self.reject_spawns {
            return Err(HostError::SpawnRejected("spawning disabled".to_string()));
        }
        let id = CharacterId(self.next_id);
        self.next_id += 1;
        self.characters.insert(id, Self::pose_at(request.position));
        self.spawned.push(request.clone());
        // The host's "newest character takes control" behaviour.
        self.takeovers.push(context.assign_active(Some(id)));
        Ok(id)
    }

    fn despawn_character(&mut self, id: CharacterId, _context: &mut PlayerContext) {
        self.characters.remove(&id);
        self.despawned.push(id);
    }

    fn character_pose(&self, id: CharacterId) -> Option<CharacterPose> {
        self.characters.get(&id).copied()
    }

    fn is_title_screen(&self) -> bool {
        self.title_screen
    }

    fn is_world_loaded(&self) -> bool {
        self.world_loaded
    }

    fn replay_world_entry(&mut self, request: WorldEntryRequest) {
        self.replays.push(request);
    }

    fn set_lan_hosting(&mut self, enabled: bool) {
        self.lan_hosting = enabled;
    }
}

impl PhysicsQuery for FakeHost {
    fn sphere_cast(&self, _: Vec3, _: Vec3, _: f32, _: f32) -> Option<f32> {
        None
    }

    fn water_height(&self, _: Vec3) -> Option<f32> {
        None
    }
}

/// Shared view of what a [`FakeCollaborator`] went through.
#[derive(Debug, Default)]
pub(crate) struct CollaboratorProbe {
    pub events: RefCell<Vec<String>>,
    pub capturing: Cell<bool>,
    pub fail_attach: Cell<bool>,
}

pub(crate) struct FakeCollaborator {
    pub probe: Rc<CollaboratorProbe>,
}

impl FakeCollaborator {
    pub fn new() -> (Self, Rc<CollaboratorProbe>) {
        let probe = Rc::new(CollaboratorProbe::default());
        (
            Self {
                probe: Rc::clone(&probe),
            },
            probe,
        )
    }
}

impl PresentationCollaborator for FakeCollaborator {
    fn name(&self) -> &'static str {
        "fake_hud"
    }

    fn attach(&mut self, anchor: &UiAnchor) -> Result<(), PresentationError> {
        if self.probe.fail_attach.get() {
            return Err(PresentationError::AttachFailed {
                collaborator: self.name(),
                reason: "refused".to_string(),
            });
        }
        self.probe
            .events
            .borrow_mut()
            .push(format!("attach {} {}x{}", anchor.player, anchor.width, anchor.height));
        Ok(())
    }

    fn detach(&mut self) {
        self.probe.events.borrow_mut().push("detach".to_string());
    }

    fn is_capturing_input(&self) -> bool {
        self.probe.capturing.get()
    }
}
