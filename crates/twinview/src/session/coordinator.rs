use tracing::{debug, error, info, warn};

use super::scheduler::{DeferredAction, Delay, FrameScheduler, StateGuard};
use super::world_gate::WorldEntryGate;
use super::{ActivationError, Session, SessionEvent, SessionState};
use crate::compositor::{Compositor, ViewportSurface};
use crate::config::{ConfigWarning, SplitConfig};
use crate::host::{CharacterHost, CharacterId, Host, SpawnRequest, WorldEntryRequest};
use crate::impersonation::{CallbackKind, CharacterScope, PlayerContext};
use crate::input::{ControlLayout, DeviceFrame, InputDemux, InputSnapshot};
use crate::math::Vec3;
use crate::player::PlayerIndex;
use crate::presentation::{PresentationCollaborator, UiAnchor};
use crate::profile::{validate_profile_name, Profile, ProfileError, ProfileStore};

const HISTORY_LIMIT: usize = 32;
/// Where player 2 appears relative to player 1 when its profile has no
/// usable position.
const SPAWN_OFFSET: Vec3 = Vec3::new(1.5, 0.0, 0.0);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorldEntryDecision {
    Proceed,
    /// The host must not start the world now; it will be replayed.
    Blocked,
}

/// Which activation steps are live, so teardown undoes exactly those.
#[derive(Debug, Default)]
struct ActivationProgress {
    input: bool,
    rendering: bool,
    character: bool,
    /// Indices into the collaborator list, in attach order.
    attached: Vec<usize>,
}

#[derive(Debug)]
struct SecondPlayer {
    character: CharacterId,
    profile: Profile,
}

/// Top-level orchestrator of a split-screen session. The host calls into
/// it from its own lifecycle hooks and per-frame callbacks.
pub struct SessionCoordinator {
    config: SplitConfig,
    session: Session,
    epoch: u64,
    history: Vec<SessionEvent>,
    demux: InputDemux,
    context: PlayerContext,
    compositor: Compositor,
    scheduler: FrameScheduler,
    gate: WorldEntryGate,
    collaborators: Vec<Box<dyn PresentationCollaborator>>,
    profiles: Box<dyn ProfileStore>,
    progress: ActivationProgress,
    second: Option<SecondPlayer>,
    inputs: [InputSnapshot; 2],
    lan_forced: bool,
    precondition_reported: bool,
}

impl SessionCoordinator {
    pub fn new(config: SplitConfig, profiles: Box<dyn ProfileStore>) -> Self {
        let demux = InputDemux::new(
            config.input_mode,
            config.control_layout,
            config.look_sensitivity,
        );
        let compositor = Compositor::new(config.compositor_settings());
        Self {
            config,
            session: Session::default(),
            epoch: 0,
            history: Vec::new(),
            demux,
            context: PlayerContext::new(),
            compositor,
            scheduler: FrameScheduler::default(),
            gate: WorldEntryGate::default(),
            collaborators: Vec::new(),
            profiles,
            progress: ActivationProgress::default(),
            second: None,
            inputs: [InputSnapshot::default(); 2],
            lan_forced: false,
            precondition_reported: false,
        }
    }

    pub fn add_collaborator(&mut self, collaborator: Box<dyn PresentationCollaborator>) {
        debug!(collaborator = collaborator.name(), "presentation_collaborator_registered");
        self.collaborators.push(collaborator);
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// Most recent transitions, oldest first.
    pub fn history(&self) -> &[SessionEvent] {
        &self.history
    }

    pub fn context(&self) -> &PlayerContext {
        &self.context
    }

    /// The host's singleton lives here; the host assigns through it.
    pub fn context_mut(&mut self) -> &mut PlayerContext {
        &mut self.context
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn surface_mut(&mut self, player: PlayerIndex) -> Option<&mut ViewportSurface> {
        self.compositor.surface_mut(player)
    }

    pub fn second_character(&self) -> Option<CharacterId> {
        self.second.as_ref().map(|second| second.character)
    }

    pub fn set_control_layout(&mut self, layout: ControlLayout) {
        self.config.control_layout = layout;
        self.demux.set_layout(layout);
        info!(layout = ?layout, "control_layout_changed");
    }

    pub fn validate_devices(&self, connected_controllers: usize) -> Vec<ConfigWarning> {
        self.config.validate(connected_controllers)
    }

    /// The user's split toggle.
    pub fn toggle<H: Host + ?Sized>(&mut self, host: &mut H) -> SessionState {
        match self.session.state {
            SessionState::Disabled => {
                if host.is_title_screen() {
                    self.session.split_enabled = true;
                    self.transition(host, SessionState::MenuSplit, "toggle");
                } else {
                    info!("split_toggle_ignored_outside_title");
                }
            }
            SessionState::AwaitingP2Character => {
                self.cancel_selection(host);
            }
            SessionState::MenuSplit | SessionState::Armed | SessionState::Active => {
                self.disable(host, "toggle");
            }
        }
        self.session.state
    }

    /// Player 2 picked a character. The name is validated before any state
    /// changes. From `AwaitingP2Character` the vetoed world entry is
    /// replayed exactly once.
    pub fn select_second_character<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        profile_name: &str,
    ) -> Result<SessionState, ProfileError> {
        validate_profile_name(profile_name)?;
        match self.session.state {
            SessionState::MenuSplit => {
                self.session.pending_second_profile = Some(profile_name.to_string());
                self.transition(host, SessionState::Armed, "second_character_selected");
            }
            SessionState::AwaitingP2Character => {
                self.session.pending_second_profile = Some(profile_name.to_string());
                self.transition(host, SessionState::Armed, "second_character_selected");
                if let Some(request) = self.gate.take_for_replay() {
                    info!(
                        id = ?request.id,
                        world = %request.world_name,
                        "world_entry_replayed"
                    );
                    host.replay_world_entry(request);
                }
            }
            SessionState::Armed if !host.is_world_loaded() => {
                self.session.pending_second_profile = Some(profile_name.to_string());
                info!(profile = profile_name, "second_character_changed");
            }
            other => {
                debug!(state = %other, profile = profile_name, "second_character_selection_ignored");
            }
        }
        Ok(self.session.state)
    }

    /// Player 2 backed out of the chooser while a world entry was held.
    /// The held call is dropped, never replayed.
    pub fn cancel_selection<H: Host + ?Sized>(&mut self, host: &mut H) -> SessionState {
        if self.session.state == SessionState::AwaitingP2Character {
            if let Some(request) = self.gate.drop_deferred() {
                info!(id = ?request.id, world = %request.world_name, "world_entry_cancelled");
            }
            self.transition(host, SessionState::MenuSplit, "selection_cancelled");
        }
        self.session.state
    }

    /// Called from the host's "start world" entry point before it does
    /// anything.
    pub fn intercept_world_entry<H: Host + ?Sized>(
        &mut self,
        host: &mut H,
        request: &WorldEntryRequest,
    ) -> WorldEntryDecision {
        if self.gate.consume_bypass(request.id) {
            debug!(id = ?request.id, "world_entry_bypass_consumed");
            return WorldEntryDecision::Proceed;
        }
        match self.session.state {
            SessionState::MenuSplit if self.session.pending_second_profile.is_some() => {
                self.transition(host, SessionState::Armed, "world_entry");
                WorldEntryDecision::Proceed
            }
            SessionState::MenuSplit => {
                self.gate.defer(request.clone());
                info!(id = ?request.id, world = %request.world_name, "world_entry_deferred");
                self.transition(host, SessionState::AwaitingP2Character, "world_entry_deferred");
                WorldEntryDecision::Blocked
            }
            SessionState::AwaitingP2Character => {
                self.gate.defer(request.clone());
                WorldEntryDecision::Blocked
            }
            _ => WorldEntryDecision::Proceed,
        }
    }

    pub fn on_world_loaded<H: Host + ?Sized>(&mut self, host: &mut H) {
        if self.session.state == SessionState::Armed {
            self.try_activate(host);
        }
    }

    /// Leaving a world keeps player 2's pick when split stays enabled.
    pub fn on_world_exiting<H: Host + ?Sized>(&mut self, host: &mut H) {
        if !matches!(self.session.state, SessionState::Active | SessionState::Armed) {
            return;
        }
        self.tear_down(host);
        if self.session.split_enabled {
            self.transition(host, SessionState::MenuSplit, "world_exited");
        } else {
            self.transition(host, SessionState::Disabled, "world_exited");
        }
    }

    pub fn on_host_shutdown<H: Host + ?Sized>(&mut self, host: &mut H) {
        self.disable(host, "host_shutdown");
    }

    pub fn on_screen_resized<H: Host + ?Sized>(&mut self, host: &mut H) {
        if let Err(error) = self.compositor.resize(host.screen_size()) {
            error!(error = %error, "split_resize_failed");
            self.disable(host, "resize_failed");
        }
    }

    /// Read devices once for the frame. Every character callback this frame
    /// sees these snapshots.
    pub fn begin_frame(&mut self, frame: &DeviceFrame<'_>) -> [InputSnapshot; 2] {
        let capturing = self.session.state == SessionState::Active
            && self
                .progress
                .attached
                .iter()
                .filter_map(|&index| self.collaborators.get(index))
                .any(|collaborator| collaborator.is_capturing_input());
        self.demux.suppress_look(PlayerIndex::Second, capturing);
        self.inputs = self.demux.read_frame(frame);
        self.inputs
    }

    /// Input of whichever player the singleton currently designates.
    pub fn current_input(&self) -> InputSnapshot {
        self.inputs[self.context.input_owner().index()]
    }

    pub fn player_input(&self, player: PlayerIndex) -> InputSnapshot {
        self.inputs[player.index()]
    }

    /// Run one per-character simulation callback under the impersonation
    /// protocol.
    pub fn dispatch_character_callback<R>(
        &mut self,
        receiver: CharacterId,
        kind: CallbackKind,
        f: impl FnOnce(&mut CharacterScope<'_>) -> R,
    ) -> R {
        self.session.active_player_index = if self.context.second_player() == Some(receiver) {
            PlayerIndex::Second
        } else {
            PlayerIndex::First
        };
        self.context.dispatch(&self.inputs, receiver, kind, f)
    }

    /// Runs after every character has simulated this tick. Seconds-based
    /// continuations are advanced before any activation attempt, so work
    /// scheduled by this call never runs in it.
    pub fn late_update<H: Host + ?Sized>(&mut self, host: &mut H, dt_seconds: f32) {
        let due = self.scheduler.tick(dt_seconds, self.guard());
        self.run_due(host, due);

        match self.session.state {
            SessionState::Armed if host.is_world_loaded() => self.try_activate(host),
            SessionState::Active => {
                if let Err(error) = self.compositor.maintain(host) {
                    debug!(error = %error, "compositor_maintenance_skipped");
                }
                let pose = self
                    .second
                    .as_ref()
                    .and_then(|second| host.character_pose(second.character));
                let look = self.inputs[PlayerIndex::Second.index()].look_axis();
                self.compositor.late_update(host, pose, look, dt_seconds);
            }
            _ => {}
        }
    }

    /// The host has put a rendered frame on screen. Frame-counted
    /// continuations, such as attaching player 2's interface, advance
    /// only here.
    pub fn frame_presented<H: Host + ?Sized>(&mut self, host: &mut H) {
        let due = self.scheduler.frame_presented(self.guard());
        self.run_due(host, due);
    }

    pub fn composite(&self, frame: &mut [u8], screen: (u32, u32)) {
        self.compositor.composite(frame, screen);
    }

    pub fn ui_anchor(&self, player: PlayerIndex) -> Option<UiAnchor> {
        self.compositor.ui_anchor(player)
    }

    /// The host reports player 2's character died. Respawn is delayed and
    /// dropped if the session moves on in the meantime.
    pub fn second_player_died(&mut self) {
        if self.session.state != SessionState::Active
            || self.scheduler.is_pending(DeferredAction::RespawnSecondPlayer)
        {
            return;
        }
        let delay = self.config.respawn_delay_seconds;
        info!(delay_seconds = delay, "second_player_respawn_scheduled");
        self.scheduler.schedule(
            DeferredAction::RespawnSecondPlayer,
            Delay::Seconds(delay),
            self.guard(),
        );
    }

    fn guard(&self) -> StateGuard {
        StateGuard {
            state: self.session.state,
            epoch: self.epoch,
        }
    }

    fn transition<H: CharacterHost + ?Sized>(
        &mut self,
        host: &mut H,
        to: SessionState,
        reason: &'static str,
    ) {
        let from = self.session.state;
        if from == to {
            return;
        }
        self.session.state = to;
        self.epoch += 1;
        info!(from = %from, to = %to, reason, epoch = self.epoch, "session_transition");
        if self.history.len() == HISTORY_LIMIT {
            self.history.remove(0);
        }
        self.history.push(SessionEvent {
            from,
            to,
            reason,
            epoch: self.epoch,
        });
        if to == SessionState::Armed {
            self.precondition_reported = false;
        }
        self.sync_lan_hosting(host);
    }

    fn sync_lan_hosting<H: CharacterHost + ?Sized>(&mut self, host: &mut H) {
        let wanted = self.config.force_lan_hosting
            && matches!(self.session.state, SessionState::Armed | SessionState::Active);
        if wanted != self.lan_forced {
            host.set_lan_hosting(wanted);
            self.lan_forced = wanted;
            info!(enabled = wanted, "lan_hosting_forced");
        }
    }

    /// Full return to single-player, from anywhere.
    fn disable<H: Host + ?Sized>(&mut self, host: &mut H, reason: &'static str) {
        self.tear_down(host);
        self.gate.clear();
        self.session.split_enabled = false;
        self.session.pending_second_profile = None;
        self.transition(host, SessionState::Disabled, reason);
    }

    fn try_activate<H: Host + ?Sized>(&mut self, host: &mut H) {
        match self.activate(host) {
            Ok(()) => {}
            Err(error) if error.is_precondition() => {
                self.tear_down(host);
                if !self.precondition_reported {
                    warn!(error = %error, "split_activation_deferred");
                    self.precondition_reported = true;
                }
            }
            Err(error) => self.fail(host, error),
        }
    }

    /// Input, rendering, character. Presentation follows one frame later.
    fn activate<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<(), ActivationError> {
        let local = host
            .local_player_character()
            .ok_or(ActivationError::NoLocalPlayer)?;
        let profile_name = self
            .session
            .pending_second_profile
            .clone()
            .ok_or(ActivationError::NoSecondProfile)?;

        self.demux.set_split_active(true);
        self.progress.input = true;

        self.compositor.activate(host)?;
        self.progress.rendering = true;

        let profile = self.load_second_profile(&profile_name)?;
        let position = profile
            .world_position
            .filter(|position| position.is_finite())
            .unwrap_or_else(|| spawn_beside(&*host, local));
        let request = SpawnRequest {
            profile_name: profile.name.clone(),
            position,
            owner: host.local_peer(),
        };
        let character = self
            .context
            .suppressing_spawn(|context| host.spawn_character(&request, context))?;
        self.context.set_second_player(Some(character));
        self.second = Some(SecondPlayer { character, profile });
        self.progress.character = true;

        self.transition(host, SessionState::Active, "world_loaded");
        self.compositor.reset_follow();
        let guard = self.guard();
        self.scheduler
            .schedule(DeferredAction::AttachPresentation, Delay::Frames(1), guard);
        self.scheduler.schedule(
            DeferredAction::AutosaveProfile,
            Delay::Seconds(self.config.autosave_interval_seconds),
            guard,
        );
        info!(second = ?character, profile = %profile_name, "split_activated");
        Ok(())
    }

    fn fail<H: Host + ?Sized>(&mut self, host: &mut H, error: ActivationError) {
        error!(error = %error, state = %self.session.state, "split_session_failed");
        self.disable(host, "failure");
    }

    /// Undo whatever subset of activation is live, newest step first.
    fn tear_down<H: Host + ?Sized>(&mut self, host: &mut H) {
        for index in self.progress.attached.drain(..).rev() {
            if let Some(collaborator) = self.collaborators.get_mut(index) {
                collaborator.detach();
                debug!(collaborator = collaborator.name(), "presentation_detached");
            }
        }
        self.scheduler.cancel_all();

        if self.progress.character {
            if let Some(mut second) = self.second.take() {
                self.save_second_profile(host, &mut second);
                host.despawn_character(second.character, &mut self.context);
                info!(second = ?second.character, "second_player_despawned");
            }
            self.context.reset_second();
            self.progress.character = false;
        }

        if self.progress.rendering {
            self.compositor.deactivate(host);
            self.progress.rendering = false;
        }

        if self.progress.input {
            self.demux.set_split_active(false);
            self.progress.input = false;
        }
    }

    fn run_due<H: Host + ?Sized>(&mut self, host: &mut H, due: Vec<DeferredAction>) {
        for action in due {
            if self.session.state != SessionState::Active {
                break;
            }
            self.run_deferred(host, action);
        }
    }

    fn run_deferred<H: Host + ?Sized>(&mut self, host: &mut H, action: DeferredAction) {
        let outcome = match action {
            DeferredAction::AttachPresentation => self.attach_presentation(),
            DeferredAction::RespawnSecondPlayer => self.respawn_second(host),
            DeferredAction::AutosaveProfile => {
                if let Some(mut second) = self.second.take() {
                    self.save_second_profile(host, &mut second);
                    self.second = Some(second);
                }
                self.scheduler.schedule(
                    DeferredAction::AutosaveProfile,
                    Delay::Seconds(self.config.autosave_interval_seconds),
                    self.guard(),
                );
                Ok(())
            }
        };
        if let Err(error) = outcome {
            self.fail(host, error);
        }
    }

    fn attach_presentation(&mut self) -> Result<(), ActivationError> {
        let Some(anchor) = self.compositor.ui_anchor(PlayerIndex::Second) else {
            return Ok(());
        };
        for (index, collaborator) in self.collaborators.iter_mut().enumerate() {
            if self.progress.attached.contains(&index) {
                continue;
            }
            collaborator.attach(&anchor)?;
            self.progress.attached.push(index);
            info!(
                collaborator = collaborator.name(),
                layer = anchor.layer.0,
                width = anchor.width,
                height = anchor.height,
                "presentation_attached"
            );
        }
        Ok(())
    }

    fn respawn_second<H: Host + ?Sized>(&mut self, host: &mut H) -> Result<(), ActivationError> {
        let Some(mut second) = self.second.take() else {
            return Ok(());
        };
        if host
            .character_pose(second.character)
            .is_some_and(|pose| pose.alive)
        {
            debug!(second = ?second.character, "second_player_respawn_not_needed");
            self.second = Some(second);
            return Ok(());
        }

        host.despawn_character(second.character, &mut self.context);
        let position = host
            .local_player_character()
            .map(|local| spawn_beside(&*host, local))
            .unwrap_or(Vec3::ZERO);
        let request = SpawnRequest {
            profile_name: second.profile.name.clone(),
            position,
            owner: host.local_peer(),
        };
        match self
            .context
            .suppressing_spawn(|context| host.spawn_character(&request, context))
        {
            Ok(character) => {
                info!(from = ?second.character, to = ?character, "second_player_respawned");
                second.character = character;
                self.context.set_second_player(Some(character));
                self.second = Some(second);
                self.compositor.reset_follow();
                Ok(())
            }
            Err(error) => {
                self.context.set_second_player(None);
                self.save_second_profile(host, &mut second);
                Err(error.into())
            }
        }
    }

    fn load_second_profile(&self, name: &str) -> Result<Profile, ProfileError> {
        match self.profiles.load(name) {
            Ok(profile) => Ok(profile),
            Err(ProfileError::NotFound(_)) => {
                info!(profile = name, "second_profile_created");
                Ok(Profile::new(name))
            }
            Err(error) => Err(error),
        }
    }

    /// Save failures are logged; losing one autosave is not worth ending
    /// the session over.
    fn save_second_profile<H: Host + ?Sized>(&mut self, host: &H, second: &mut SecondPlayer) {
        if let Some(pose) = host.character_pose(second.character) {
            if pose.alive && pose.position.is_finite() {
                second.profile.world_position = Some(pose.position);
            }
        }
        match self.profiles.save(&second.profile) {
            Ok(()) => debug!(profile = %second.profile.name, "second_profile_saved"),
            Err(error) => {
                warn!(profile = %second.profile.name, error = %error, "second_profile_save_failed")
            }
        }
    }
}

fn spawn_beside<H: Host + ?Sized>(host: &H, local: CharacterId) -> Vec3 {
    host.character_pose(local)
        .map(|pose| pose.position + SPAWN_OFFSET)
        .unwrap_or(Vec3::ZERO)
}
