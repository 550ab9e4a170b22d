//! Explicit stand-in for the host's process-wide "active local player".
//!
//! The host funnels input, camera look and its self-preservation checks
//! through one mutable reference. [`PlayerContext`] owns that reference and
//! only lets it change through the save/restore stack below, so the second
//! character can run the host's single-player logic without ever becoming
//! the active player outside its own callbacks.

use tracing::{debug, warn};

use crate::host::CharacterId;
use crate::input::InputSnapshot;
use crate::player::PlayerIndex;

/// Per-character simulation callbacks the host invokes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    Update,
    FixedUpdate,
    LateUpdate,
    Animation,
    Interaction,
    Death,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 6] = [
        CallbackKind::Update,
        CallbackKind::FixedUpdate,
        CallbackKind::LateUpdate,
        CallbackKind::Animation,
        CallbackKind::Interaction,
        CallbackKind::Death,
    ];

    const fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    /// The host tried to hand control to a character that must not take it.
    Suppressed,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ImpersonationFrame {
    previous: Option<CharacterId>,
    impersonated: CharacterId,
}

#[derive(Debug, Default)]
pub struct PlayerContext {
    active: Option<CharacterId>,
    second_player: Option<CharacterId>,
    frames: Vec<ImpersonationFrame>,
    spawn_window: u32,
    dispatch_counts: [u64; CallbackKind::ALL.len()],
    restore_mismatches: u64,
}

impl PlayerContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// What the host's singleton reads right now.
    pub fn active_local_player(&self) -> Option<CharacterId> {
        self.active
    }

    pub fn second_player(&self) -> Option<CharacterId> {
        self.second_player
    }

    pub fn set_second_player(&mut self, character: Option<CharacterId>) {
        if self.second_player != character {
            debug!(from = ?self.second_player, to = ?character, "second_player_registered");
        }
        self.second_player = character;
    }

    /// The host's own singleton assignment. Never lets player 2 take control
    /// outside an impersonation frame, and never lets anything take control
    /// while a spawn is being suppressed.
    pub fn assign_active(&mut self, candidate: Option<CharacterId>) -> AssignOutcome {
        if self.spawn_window > 0 {
            debug!(candidate = ?candidate, "active_assignment_suppressed_during_spawn");
            return AssignOutcome::Suppressed;
        }
        if candidate.is_some() && candidate == self.second_player && self.frames.is_empty() {
            debug!(candidate = ?candidate, "active_assignment_suppressed_for_second_player");
            return AssignOutcome::Suppressed;
        }
        if candidate == self.active {
            return AssignOutcome::Unchanged;
        }
        self.active = candidate;
        AssignOutcome::Assigned
    }

    /// Host teardown path (world unload). Bypasses suppression.
    pub fn clear_active(&mut self) {
        self.frames.clear();
        self.active = None;
    }

    pub fn begin_spawn(&mut self) {
        self.spawn_window += 1;
    }

    pub fn end_spawn(&mut self) {
        self.spawn_window = self.spawn_window.saturating_sub(1);
    }

    pub fn is_spawn_suppressed(&self) -> bool {
        self.spawn_window > 0
    }

    /// Run `f` with singleton assignment suppressed, e.g. around player 2's
    /// spawn so the host's "new character takes control" path is a no-op.
    pub fn suppressing_spawn<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.begin_spawn();
        let result = f(self);
        self.end_spawn();
        result
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_impersonating(&self) -> bool {
        !self.frames.is_empty()
    }

    /// Whose input a read of "the" active player's input should return.
    pub fn input_owner(&self) -> PlayerIndex {
        match (self.active, self.second_player) {
            (Some(active), Some(second)) if active == second => PlayerIndex::Second,
            _ => PlayerIndex::First,
        }
    }

    /// The host's "do I control this character" check. Both local players
    /// count; anything else owned by the local peer is fair game for the
    /// host's cleanup.
    pub fn is_locally_controlled(&self, character: CharacterId) -> bool {
        Some(character) == self.active
            || Some(character) == self.second_player
            || self.frames.iter().any(|frame| frame.previous == Some(character))
    }

    pub fn dispatch_count(&self, kind: CallbackKind) -> u64 {
        self.dispatch_counts[kind.slot()]
    }

    pub fn restore_mismatches(&self) -> u64 {
        self.restore_mismatches
    }

    /// Forget player 2, unwinding any frames still open for it.
    pub fn reset_second(&mut self) {
        while let Some(frame) = self.frames.pop() {
            self.active = frame.previous;
        }
        self.second_player = None;
        self.spawn_window = 0;
    }

    /// Run one per-character callback. Player 2's callbacks run with the
    /// singleton pointing at player 2; a nested callback for the original
    /// player inside that window runs as the original player again. Every
    /// other receiver runs with the singleton untouched.
    pub fn dispatch<R>(
        &mut self,
        inputs: &[InputSnapshot; 2],
        receiver: CharacterId,
        kind: CallbackKind,
        f: impl FnOnce(&mut CharacterScope<'_>) -> R,
    ) -> R {
        self.dispatch_counts[kind.slot()] += 1;
        let pushed = self.needs_frame(receiver);
        if pushed {
            self.push(receiver);
        }
        let result = {
            let mut scope = CharacterScope {
                context: self,
                inputs,
                receiver,
            };
            f(&mut scope)
        };
        if pushed {
            self.pop(kind);
        }
        result
    }

    fn needs_frame(&self, receiver: CharacterId) -> bool {
        if Some(receiver) == self.second_player {
            return true;
        }
        match self.frames.first() {
            Some(outermost) => {
                outermost.previous == Some(receiver) && self.active != Some(receiver)
            }
            None => false,
        }
    }

    fn push(&mut self, impersonated: CharacterId) {
        self.frames.push(ImpersonationFrame {
            previous: self.active,
            impersonated,
        });
        self.active = Some(impersonated);
    }

    fn pop(&mut self, kind: CallbackKind) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        if self.active != Some(frame.impersonated) {
            self.restore_mismatches += 1;
            warn!(
                expected = ?frame.impersonated,
                found = ?self.active,
                restoring = ?frame.previous,
                callback = ?kind,
                depth = self.frames.len(),
                "impersonation_restore_mismatch"
            );
        }
        self.active = frame.previous;
    }
}

/// What a character callback sees while it runs.
pub struct CharacterScope<'a> {
    context: &'a mut PlayerContext,
    inputs: &'a [InputSnapshot; 2],
    receiver: CharacterId,
}

impl<'a> CharacterScope<'a> {
    pub fn receiver(&self) -> CharacterId {
        self.receiver
    }

    pub fn active_local_player(&self) -> Option<CharacterId> {
        self.context.active_local_player()
    }

    pub fn context(&self) -> &PlayerContext {
        self.context
    }

    pub fn context_mut(&mut self) -> &mut PlayerContext {
        self.context
    }

    /// Input for "the" active player, redirected to player 2's snapshot
    /// while impersonating.
    pub fn input(&self) -> InputSnapshot {
        self.inputs[self.context.input_owner().index()]
    }

    pub fn dispatch<R>(
        &mut self,
        receiver: CharacterId,
        kind: CallbackKind,
        f: impl FnOnce(&mut CharacterScope<'_>) -> R,
    ) -> R {
        self.context.dispatch(self.inputs, receiver, kind, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::{ActionSet, DeviceSource, LogicalAction};
    use crate::math::Vec2;

    const P0: CharacterId = CharacterId(1);
    const P1: CharacterId = CharacterId(2);
    const NPC: CharacterId = CharacterId(9);

    fn context() -> PlayerContext {
        let mut context = PlayerContext::new();
        assert_eq!(context.assign_active(Some(P0)), AssignOutcome::Assigned);
        context.set_second_player(Some(P1));
        context
    }

    fn inputs() -> [InputSnapshot; 2] {
        let jumping = InputSnapshot::new(
            Vec2::new(0.0, 1.0),
            Vec2::ZERO,
            0.0,
            0.0,
            ActionSet::EMPTY.with(LogicalAction::Jump),
            ActionSet::EMPTY.with(LogicalAction::Jump),
            DeviceSource::Controller(0),
            false,
        );
        [InputSnapshot::neutral(DeviceSource::KeyboardPointer), jumping]
    }

    #[test]
    fn second_player_callback_sees_itself_as_active() {
        let mut context = context();
        let inputs = inputs();
        let seen = context.dispatch(&inputs, P1, CallbackKind::Update, |scope| {
            scope.active_local_player()
        });
        assert_eq!(seen, Some(P1));
        assert_eq!(context.active_local_player(), Some(P0));
        assert_eq!(context.depth(), 0);
    }

    #[test]
    fn first_player_and_npc_callbacks_do_not_push() {
        let mut context = context();
        let inputs = inputs();
        for receiver in [P0, NPC] {
            let depth = context.dispatch(&inputs, receiver, CallbackKind::FixedUpdate, |scope| {
                scope.context().depth()
            });
            assert_eq!(depth, 0);
        }
        assert_eq!(context.dispatch_count(CallbackKind::FixedUpdate), 2);
    }

    #[test]
    fn nested_impersonation_round_trips_at_any_depth() {
        fn nest(scope: &mut CharacterScope<'_>, remaining: usize) -> usize {
            assert_eq!(scope.active_local_player(), Some(P1));
            if remaining == 0 {
                return scope.context().depth();
            }
            scope.dispatch(P1, CallbackKind::Animation, |inner| nest(inner, remaining - 1))
        }

        for levels in 0..6 {
            let mut context = context();
            let inputs = inputs();
            let before = context.active_local_player();
            let deepest = context.dispatch(&inputs, P1, CallbackKind::Update, |scope| {
                nest(scope, levels)
            });
            assert_eq!(deepest, levels + 1);
            assert_eq!(context.active_local_player(), before);
            assert_eq!(context.restore_mismatches(), 0);
        }
    }

    #[test]
    fn subsystem_reads_inside_the_window_see_second_player() {
        let mut context = context();
        let inputs = inputs();
        context.dispatch(&inputs, P1, CallbackKind::Update, |scope| {
            // An NPC reacting to the player during player 2's update.
            scope.dispatch(NPC, CallbackKind::Interaction, |inner| {
                assert_eq!(inner.active_local_player(), Some(P1));
            });
        });
    }

    #[test]
    fn nested_first_player_callback_runs_as_first_player() {
        let mut context = context();
        let inputs = inputs();
        context.dispatch(&inputs, P1, CallbackKind::Update, |scope| {
            scope.dispatch(P0, CallbackKind::Interaction, |inner| {
                assert_eq!(inner.active_local_player(), Some(P0));
                assert_eq!(inner.context().input_owner(), PlayerIndex::First);
            });
            assert_eq!(scope.active_local_player(), Some(P1));
        });
        assert_eq!(context.active_local_player(), Some(P0));
    }

    #[test]
    fn input_is_redirected_only_while_impersonating() {
        let mut context = context();
        let inputs = inputs();
        let inside = context.dispatch(&inputs, P1, CallbackKind::Update, |scope| scope.input());
        let outside = context.dispatch(&inputs, P0, CallbackKind::Update, |scope| scope.input());
        assert!(inside.held(LogicalAction::Jump));
        assert!(!outside.held(LogicalAction::Jump));
    }

    #[test]
    fn spawn_window_suppresses_assignment() {
        let mut context = PlayerContext::new();
        context.assign_active(Some(P0));
        let outcome = context.suppressing_spawn(|context| context.assign_active(Some(P1)));
        assert_eq!(outcome, AssignOutcome::Suppressed);
        assert_eq!(context.active_local_player(), Some(P0));
        assert!(!context.is_spawn_suppressed());
    }

    #[test]
    fn second_player_never_takes_control_outside_a_frame() {
        let mut context = context();
        assert_eq!(context.assign_active(Some(P1)), AssignOutcome::Suppressed);
        assert_eq!(context.active_local_player(), Some(P0));
        assert_eq!(context.assign_active(Some(P0)), AssignOutcome::Unchanged);
    }

    #[test]
    fn restore_wins_over_a_leaked_assignment() {
        let mut context = context();
        let inputs = inputs();
        context.dispatch(&inputs, P1, CallbackKind::Death, |scope| {
            // Host code inside the window hands control to someone else.
            scope.context_mut().assign_active(Some(NPC));
        });
        assert_eq!(context.active_local_player(), Some(P0));
        assert_eq!(context.restore_mismatches(), 1);
    }

    #[test]
    fn both_local_players_are_locally_controlled() {
        let context = context();
        assert!(context.is_locally_controlled(P0));
        assert!(context.is_locally_controlled(P1));
        assert!(!context.is_locally_controlled(NPC));
    }

    #[test]
    fn original_player_stays_protected_during_impersonation() {
        let mut context = context();
        let inputs = inputs();
        let protected = context.dispatch(&inputs, P1, CallbackKind::Update, |scope| {
            scope.context().is_locally_controlled(P0)
        });
        assert!(protected);
    }

    #[test]
    fn reset_second_unwinds_open_frames() {
        let mut context = context();
        context.push(P1);
        context.push(P1);
        context.reset_second();
        assert_eq!(context.depth(), 0);
        assert_eq!(context.active_local_player(), Some(P0));
        assert_eq!(context.second_player(), None);
    }
}
