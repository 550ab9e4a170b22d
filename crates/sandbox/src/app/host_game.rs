//! The single-player game the split-screen session is retrofitted onto.
//!
//! It knows nothing about a second player: one principal camera follows
//! whichever character the active-player singleton names, a newly spawned
//! character takes control, and characters the local peer does not control
//! are destroyed. All of that runs through the coordinator's
//! [`PlayerContext`].

use std::collections::BTreeMap;
use std::f32::consts::TAU;

use tracing::{debug, info, warn};
use twinview::compositor::{CameraRole, CameraState, CameraTransform, ClearMode, DEFAULT_UI_LAYER};
use twinview::host::{LayerIndex, LayerMask, PeerId};
use twinview::math::direction_from_yaw_pitch;
use twinview::{
    AssignOutcome, CallbackKind, CameraHost, CameraId, CharacterHost, CharacterId, CharacterPose,
    HostError, InputSnapshot, LogicalAction, PhysicsQuery, PlayerContext, SessionCoordinator,
    SpawnRequest, Vec3, WorldEntryDecision, WorldEntryId, WorldEntryRequest,
};

use super::render::{Marker, SceneGeometry};

pub(crate) const WORLD_LAYER: LayerIndex = LayerIndex(0);
const LOCAL_PEER: PeerId = PeerId(1);

const SPAWN_POINT: Vec3 = Vec3::new(0.0, 0.0, -4.0);
const EYE_HEIGHT: f32 = 1.6;
const MOVE_SPEED: f32 = 4.5;
const SPRINT_FACTOR: f32 = 1.8;
const LOOK_SPEED: f32 = 2.2;
const MAX_PITCH: f32 = 1.2;
const GRAVITY: f32 = 18.0;
const JUMP_SPEED: f32 = 7.0;
const CHARACTER_HALF_SIZE: f32 = 0.35;

const POND_MIN: (f32, f32) = (8.0, -6.0);
const POND_MAX: (f32, f32) = (20.0, 6.0);
const POND_FLOOR: f32 = -3.0;
const WATER_LEVEL: f32 = -0.5;
const DROWN_RATE: f32 = 0.4;

const RAFT_PATH_CENTER: Vec3 = Vec3::new(14.0, 0.0, 0.0);
const RAFT_PATH_RADIUS: f32 = 3.0;
const RAFT_ANGULAR_SPEED: f32 = 0.35;
const RAFT_HALF_EXTENT: f32 = 1.5;
const RAFT_THICKNESS: f32 = 0.3;

const CHASE_DISTANCE: f32 = 4.0;
const CHASE_LIFT: f32 = 0.6;

const PILLARS: [(Vec3, Vec3); 4] = [
    (Vec3::new(-6.0, 0.0, 2.0), Vec3::new(-5.0, 4.0, 3.0)),
    (Vec3::new(-2.0, 0.0, 8.0), Vec3::new(-1.0, 6.0, 9.0)),
    (Vec3::new(3.0, 0.0, 5.0), Vec3::new(4.5, 3.0, 6.5)),
    (Vec3::new(-9.0, 0.0, -7.0), Vec3::new(-7.5, 5.0, -5.5)),
];

const GROUND_COLOR: [u8; 4] = [70, 96, 62, 255];
const PILLAR_COLOR: [u8; 4] = [190, 180, 160, 255];
const WATER_COLOR: [u8; 4] = [60, 120, 200, 255];
const RAFT_COLOR: [u8; 4] = [150, 100, 60, 255];
const FIRST_PLAYER_COLOR: [u8; 4] = [250, 210, 60, 255];
const SECOND_PLAYER_COLOR: [u8; 4] = [80, 230, 230, 255];
const DEAD_COLOR: [u8; 4] = [110, 110, 110, 255];

#[derive(Debug, Clone)]
struct Character {
    profile: String,
    position: Vec3,
    velocity_y: f32,
    yaw: f32,
    pitch: f32,
    grounded: bool,
    on_raft: bool,
    health: f32,
    alive: bool,
}

impl Character {
    fn new(profile: impl Into<String>, position: Vec3) -> Self {
        Self {
            profile: profile.into(),
            position,
            velocity_y: 0.0,
            yaw: 0.0,
            pitch: 0.0,
            grounded: false,
            on_raft: false,
            health: 1.0,
            alive: true,
        }
    }

    /// The host's single-player controller: only ever applied to the
    /// character the singleton currently names.
    fn apply_input(&mut self, input: &InputSnapshot, dt_seconds: f32) {
        let look = input.look_axis();
        self.yaw = (self.yaw + look.x * LOOK_SPEED * dt_seconds).rem_euclid(TAU);
        self.pitch = (self.pitch - look.y * LOOK_SPEED * dt_seconds).clamp(-MAX_PITCH, MAX_PITCH);

        let movement = input.move_axis();
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let forward = Vec3::new(sin_yaw, 0.0, cos_yaw);
        let right = Vec3::new(cos_yaw, 0.0, -sin_yaw);
        let speed = if input.held(LogicalAction::Sprint) {
            MOVE_SPEED * SPRINT_FACTOR
        } else {
            MOVE_SPEED
        };
        self.position += (forward * movement.y + right * movement.x) * (speed * dt_seconds);

        if self.grounded && input.pressed(LogicalAction::Jump) {
            self.velocity_y = JUMP_SPEED;
            self.grounded = false;
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Raft {
    center: Vec3,
    tilt: f32,
}

impl Raft {
    fn at_phase(phase: f32) -> Self {
        let (sin, cos) = phase.sin_cos();
        Self {
            center: RAFT_PATH_CENTER + Vec3::new(cos, 0.0, sin) * RAFT_PATH_RADIUS,
            tilt: (phase * 3.0).sin() * 0.08,
        }
    }

    fn covers(&self, position: Vec3) -> bool {
        (position.x - self.center.x).abs() <= RAFT_HALF_EXTENT
            && (position.z - self.center.z).abs() <= RAFT_HALF_EXTENT
    }

    fn up(&self) -> Vec3 {
        Vec3::new(self.tilt, 1.0, 0.0).normalize_or(Vec3::UP)
    }
}

#[derive(Debug, Clone)]
struct LoadedWorld {
    name: String,
}

pub(crate) struct HostGame {
    screen: (u32, u32),
    cameras: BTreeMap<CameraId, CameraState>,
    principal: Option<CameraId>,
    sky: Option<CameraId>,
    next_id: u64,
    next_entry_id: u64,
    world: Option<LoadedWorld>,
    characters: BTreeMap<CharacterId, Character>,
    local_player: Option<CharacterId>,
    replays: Vec<WorldEntryRequest>,
    lan_hosting: bool,
    raft_phase: f32,
}

impl HostGame {
    pub(crate) fn new(screen: (u32, u32)) -> Self {
        Self {
            screen,
            cameras: BTreeMap::new(),
            principal: None,
            sky: None,
            next_id: 1,
            next_entry_id: 1,
            world: None,
            characters: BTreeMap::new(),
            local_player: None,
            replays: Vec::new(),
            lan_hosting: false,
            raft_phase: 0.0,
        }
    }

    pub(crate) fn set_screen_size(&mut self, width: u32, height: u32) {
        self.screen = (width, height);
    }

    pub(crate) fn world_name(&self) -> Option<&str> {
        self.world.as_ref().map(|world| world.name.as_str())
    }

    pub(crate) fn character_health(&self, id: CharacterId) -> Option<f32> {
        self.characters.get(&id).map(|character| character.health)
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// The menu's "start world" button.
    pub(crate) fn request_world_entry(&mut self, coordinator: &mut SessionCoordinator, world_name: &str) {
        let request = WorldEntryRequest {
            id: WorldEntryId(self.next_entry_id),
            world_name: world_name.to_string(),
        };
        self.next_entry_id += 1;
        self.start_world(coordinator, request);
    }

    /// Re-run start-world calls the coordinator asked us to replay.
    pub(crate) fn process_replays(&mut self, coordinator: &mut SessionCoordinator) {
        for request in std::mem::take(&mut self.replays) {
            self.start_world(coordinator, request);
        }
    }

    fn start_world(&mut self, coordinator: &mut SessionCoordinator, request: WorldEntryRequest) {
        if self.world.is_some() {
            debug!(id = ?request.id, "world_entry_ignored_already_loaded");
            return;
        }
        if coordinator.intercept_world_entry(self, &request) == WorldEntryDecision::Blocked {
            info!(id = ?request.id, world = %request.world_name, "world_entry_blocked");
            return;
        }

        let principal_id = CameraId(self.allocate_id());
        let sky_id = CameraId(self.allocate_id());
        let world_camera = CameraState {
            // The sky camera paints the background first.
            clear: ClearMode::DepthOnly,
            culling_mask: LayerMask::single(WORLD_LAYER),
            ..CameraState::world()
        };
        let sky_camera = CameraState {
            role: CameraRole::Sky,
            clear: ClearMode::Sky,
            culling_mask: LayerMask::EMPTY,
            depth: -1,
            ..CameraState::world()
        };
        self.cameras.insert(principal_id, world_camera);
        self.cameras.insert(sky_id, sky_camera);
        self.principal = Some(principal_id);
        self.sky = Some(sky_id);

        let player = CharacterId(self.allocate_id());
        self.characters
            .insert(player, Character::new("local", SPAWN_POINT));
        self.local_player = Some(player);
        coordinator.context_mut().assign_active(Some(player));
        self.world = Some(LoadedWorld {
            name: request.world_name.clone(),
        });
        self.raft_phase = 0.0;
        info!(world = %request.world_name, player = ?player, "world_loaded");

        coordinator.on_world_loaded(self);
        self.update_principal_camera(coordinator.context());
    }

    pub(crate) fn leave_world(&mut self, coordinator: &mut SessionCoordinator) {
        if self.world.is_none() {
            return;
        }
        // The coordinator tears down while the world is still loaded.
        coordinator.on_world_exiting(self);
        let world = self.world.take();

        for id in self.cameras.keys().copied().collect::<Vec<_>>() {
            self.destroy_camera(id);
        }
        self.principal = None;
        self.sky = None;
        self.characters.clear();
        self.local_player = None;
        coordinator.context_mut().clear_active();
        info!(world = ?world.map(|world| world.name), "world_unloaded");
    }

    /// One fixed simulation tick. Every per-character callback goes
    /// through the coordinator's dispatch.
    pub(crate) fn simulate(&mut self, coordinator: &mut SessionCoordinator, dt_seconds: f32) {
        if self.world.is_none() {
            return;
        }
        let previous_raft = Raft::at_phase(self.raft_phase);
        self.raft_phase = (self.raft_phase + RAFT_ANGULAR_SPEED * dt_seconds).rem_euclid(TAU);
        let raft = Raft::at_phase(self.raft_phase);
        let raft_delta = raft.center - previous_raft.center;

        let ids: Vec<CharacterId> = self.characters.keys().copied().collect();
        for &id in &ids {
            let Some(character) = self.characters.get_mut(&id) else {
                continue;
            };
            if !character.alive {
                continue;
            }
            coordinator.dispatch_character_callback(id, CallbackKind::Update, |scope| {
                if scope.active_local_player() == Some(id) {
                    character.apply_input(&scope.input(), dt_seconds);
                }
            });
            coordinator.dispatch_character_callback(id, CallbackKind::FixedUpdate, |_| {
                step_body(character, &raft, raft_delta, dt_seconds);
            });
        }

        let mut died = Vec::new();
        for &id in &ids {
            let Some(character) = self.characters.get_mut(&id) else {
                continue;
            };
            if !character.alive || character.health > 0.0 {
                continue;
            }
            character.alive = false;
            let was_local = coordinator.dispatch_character_callback(id, CallbackKind::Death, |scope| {
                scope.active_local_player() == Some(id)
            });
            info!(character = ?id, profile = %character.profile, was_local, "character_died");
            died.push(id);
        }
        for id in died {
            if coordinator.second_character() == Some(id) {
                coordinator.second_player_died();
            } else if self.local_player == Some(id) {
                self.respawn_local_player();
            }
        }

        self.enforce_ownership(coordinator.context());
        self.update_principal_camera(coordinator.context());
    }

    fn respawn_local_player(&mut self) {
        if let Some(character) = self.local_player.and_then(|id| self.characters.get_mut(&id)) {
            *character = Character::new(character.profile.clone(), SPAWN_POINT);
            info!("local_player_respawned");
        }
    }

    /// Single-player self-preservation: characters owned by this peer that
    /// nobody local controls are stray and get destroyed.
    fn enforce_ownership(&mut self, context: &PlayerContext) {
        let strays: Vec<CharacterId> = self
            .characters
            .keys()
            .copied()
            .filter(|id| !context.is_locally_controlled(*id))
            .collect();
        for id in strays {
            warn!(character = ?id, "uncontrolled_character_destroyed");
            self.characters.remove(&id);
        }
    }

    /// The host's chase camera follows the singleton's character.
    fn update_principal_camera(&mut self, context: &PlayerContext) {
        let Some(character) = context
            .active_local_player()
            .and_then(|id| self.characters.get(&id))
        else {
            return;
        };
        let forward = direction_from_yaw_pitch(character.yaw, character.pitch);
        let eye = character.position + Vec3::new(0.0, EYE_HEIGHT, 0.0);
        let transform = CameraTransform {
            position: eye - forward * CHASE_DISTANCE + Vec3::new(0.0, CHASE_LIFT, 0.0),
            forward,
            up: Vec3::UP,
        };
        for id in [self.principal, self.sky].into_iter().flatten() {
            if let Some(camera) = self.cameras.get_mut(&id) {
                camera.transform = transform;
            }
        }
    }

    /// Enabled cameras in draw order.
    pub(crate) fn cameras_by_depth(&self) -> Vec<CameraState> {
        let mut cameras: Vec<CameraState> = self
            .cameras
            .values()
            .filter(|camera| camera.enabled)
            .cloned()
            .collect();
        cameras.sort_by_key(|camera| camera.depth);
        cameras
    }

    pub(crate) fn build_geometry(&self, second: Option<CharacterId>, out: &mut SceneGeometry) {
        out.clear();
        if self.world.is_none() {
            return;
        }
        for step in -12..=12 {
            let offset = step as f32 * 2.0;
            out.line(
                Vec3::new(-24.0, 0.0, offset),
                Vec3::new(POND_MIN.0, 0.0, offset),
                GROUND_COLOR,
                WORLD_LAYER,
            );
            out.line(
                Vec3::new(offset, 0.0, -24.0),
                Vec3::new(offset, 0.0, POND_MIN.1),
                GROUND_COLOR,
                WORLD_LAYER,
            );
        }
        let water = |x: f32, z: f32| Vec3::new(x, WATER_LEVEL, z);
        out.line(water(POND_MIN.0, POND_MIN.1), water(POND_MAX.0, POND_MIN.1), WATER_COLOR, WORLD_LAYER);
        out.line(water(POND_MAX.0, POND_MIN.1), water(POND_MAX.0, POND_MAX.1), WATER_COLOR, WORLD_LAYER);
        out.line(water(POND_MAX.0, POND_MAX.1), water(POND_MIN.0, POND_MAX.1), WATER_COLOR, WORLD_LAYER);
        out.line(water(POND_MIN.0, POND_MAX.1), water(POND_MIN.0, POND_MIN.1), WATER_COLOR, WORLD_LAYER);

        for (min, max) in PILLARS {
            out.cuboid(min, max, PILLAR_COLOR, WORLD_LAYER);
        }

        let raft = Raft::at_phase(self.raft_phase);
        let half = Vec3::new(RAFT_HALF_EXTENT, 0.0, RAFT_HALF_EXTENT);
        out.cuboid(
            raft.center - half - Vec3::new(0.0, RAFT_THICKNESS, 0.0),
            raft.center + half,
            RAFT_COLOR,
            WORLD_LAYER,
        );

        for (id, character) in &self.characters {
            let color = if !character.alive {
                DEAD_COLOR
            } else if Some(*id) == second {
                SECOND_PLAYER_COLOR
            } else {
                FIRST_PLAYER_COLOR
            };
            out.markers.push(Marker {
                position: character.position + Vec3::new(0.0, 0.9, 0.0),
                half_size: CHARACTER_HALF_SIZE,
                color,
                layer: WORLD_LAYER,
            });
        }
    }
}

fn in_pond(position: Vec3) -> bool {
    position.x >= POND_MIN.0
        && position.x <= POND_MAX.0
        && position.z >= POND_MIN.1
        && position.z <= POND_MAX.1
}

/// Gravity, ground and raft support, drowning.
fn step_body(character: &mut Character, raft: &Raft, raft_delta: Vec3, dt_seconds: f32) {
    if character.on_raft {
        character.position += raft_delta;
    }
    character.velocity_y -= GRAVITY * dt_seconds;
    character.position.y += character.velocity_y * dt_seconds;

    let (support, is_raft) = if !in_pond(character.position) {
        (0.0, false)
    } else if raft.covers(character.position) && character.position.y >= raft.center.y - 0.5 {
        (raft.center.y, true)
    } else {
        (POND_FLOOR, false)
    };

    character.grounded = false;
    character.on_raft = false;
    if character.position.y <= support && character.velocity_y <= 0.0 {
        character.position.y = support;
        character.velocity_y = 0.0;
        character.grounded = true;
        character.on_raft = is_raft;
    }

    if character.position.y + EYE_HEIGHT < WATER_LEVEL {
        character.health = (character.health - DROWN_RATE * dt_seconds).max(0.0);
    }
}

/// Slab test of a ray against a box grown by `radius`.
fn ray_box_distance(origin: Vec3, direction: Vec3, min: Vec3, max: Vec3, radius: f32) -> Option<f32> {
    let mut t_min = 0.0f32;
    let mut t_max = f32::INFINITY;
    for (o, d, lo, hi) in [
        (origin.x, direction.x, min.x - radius, max.x + radius),
        (origin.y, direction.y, min.y - radius, max.y + radius),
        (origin.z, direction.z, min.z - radius, max.z + radius),
    ] {
        if d.abs() < 1.0e-6 {
            if o < lo || o > hi {
                return None;
            }
            continue;
        }
        let (a, b) = ((lo - o) / d, (hi - o) / d);
        let (near, far) = if a <= b { (a, b) } else { (b, a) };
        t_min = t_min.max(near);
        t_max = t_max.min(far);
        if t_min > t_max {
            return None;
        }
    }
    Some(t_min)
}

impl CameraHost for HostGame {
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
        self.cameras.get_mut(&id)
    }

    fn create_camera(&mut self, state: CameraState) -> CameraId {
        let id = CameraId(self.allocate_id());
        debug!(camera = ?id, role = ?state.role, depth = state.depth, "camera_created");
        self.cameras.insert(id, state);
        id
    }

    fn destroy_camera(&mut self, id: CameraId) {
        if self.cameras.remove(&id).is_some() {
            debug!(camera = ?id, "camera_destroyed");
        }
    }

    fn ui_layer(&self) -> LayerIndex {
        DEFAULT_UI_LAYER
    }

    fn used_layers(&self) -> LayerMask {
        LayerMask::single(WORLD_LAYER).with(DEFAULT_UI_LAYER)
    }
}

impl CharacterHost for HostGame {
    fn local_player_character(&self) -> Option<CharacterId> {
        self.local_player
    }

    fn local_peer(&self) -> PeerId {
        LOCAL_PEER
    }

    fn spawn_character(
        &mut self,
        request: &SpawnRequest,
        context: &mut PlayerContext,
    ) -> Result<CharacterId, HostError> {
        if self.world.is_none() {
            return Err(HostError::MissingObject("world"));
        }
        if request.owner != LOCAL_PEER {
            return Err(HostError::SpawnRejected(format!(
                "peer {:?} is not hosted here",
                request.owner
            )));
        }
        let id = CharacterId(self.allocate_id());
        self.characters
            .insert(id, Character::new(request.profile_name.clone(), request.position));
        // A freshly spawned local character takes control.
        if context.assign_active(Some(id)) == AssignOutcome::Suppressed {
            debug!(character = ?id, "spawn_takeover_suppressed");
        }
        info!(character = ?id, profile = %request.profile_name, "character_spawned");
        Ok(id)
    }

    fn despawn_character(&mut self, id: CharacterId, context: &mut PlayerContext) {
        if self.characters.remove(&id).is_some() {
            info!(character = ?id, "character_despawned");
        }
        if context.active_local_player() == Some(id) {
            context.clear_active();
        }
    }

    fn character_pose(&self, id: CharacterId) -> Option<CharacterPose> {
        let character = self.characters.get(&id)?;
        let raft = Raft::at_phase(self.raft_phase);
        Some(CharacterPose {
            position: character.position,
            eye_point: character.position + Vec3::new(0.0, EYE_HEIGHT, 0.0),
            yaw_radians: character.yaw,
            on_moving_platform: character.on_raft,
            platform_up: if character.on_raft { raft.up() } else { Vec3::UP },
            alive: character.alive,
        })
    }

    fn is_title_screen(&self) -> bool {
        self.world.is_none()
    }

    fn is_world_loaded(&self) -> bool {
        self.world.is_some()
    }

    fn replay_world_entry(&mut self, request: WorldEntryRequest) {
        self.replays.push(request);
    }

    fn set_lan_hosting(&mut self, enabled: bool) {
        if self.lan_hosting != enabled {
            self.lan_hosting = enabled;
            info!(enabled, "lan_hosting_changed");
        }
    }
}

impl PhysicsQuery for HostGame {
    fn sphere_cast(&self, origin: Vec3, direction: Vec3, radius: f32, max_distance: f32) -> Option<f32> {
        let direction = direction.normalize_or(Vec3::FORWARD);
        let mut nearest = PILLARS
            .iter()
            .filter_map(|(min, max)| ray_box_distance(origin, direction, *min, *max, radius))
            .fold(None, |best: Option<f32>, hit| Some(best.map_or(hit, |b| b.min(hit))));
        // Ground plane outside the pond.
        if direction.y < -1.0e-6 {
            let t = (radius - origin.y) / direction.y;
            let hit = origin + direction * t;
            if t >= 0.0 && !in_pond(hit) {
                nearest = Some(nearest.map_or(t, |b| b.min(t)));
            }
        }
        nearest.filter(|distance| *distance <= max_distance)
    }

    fn water_height(&self, at: Vec3) -> Option<f32> {
        in_pond(at).then_some(WATER_LEVEL)
    }
}
