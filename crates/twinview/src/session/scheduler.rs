use tracing::debug;

use super::SessionState;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delay {
    /// Run after this many presented frames; `Frames(1)` runs once the
    /// next frame is on screen.
    Frames(u32),
    Seconds(f32),
}

/// The session state a continuation expects to still hold when it fires.
/// `epoch` changes on every transition, so leaving and re-entering a state
/// still invalidates older continuations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateGuard {
    pub state: SessionState,
    pub epoch: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredAction {
    AttachPresentation,
    RespawnSecondPlayer,
    AutosaveProfile,
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    action: DeferredAction,
    guard: StateGuard,
    remaining: Delay,
}

/// Cooperative per-frame scheduler for delayed session work. Nothing here
/// blocks; the coordinator ticks it once per simulation step and again
/// after every presented frame.
#[derive(Debug, Default)]
pub struct FrameScheduler {
    tasks: Vec<Scheduled>,
}

impl FrameScheduler {
    pub fn schedule(&mut self, action: DeferredAction, delay: Delay, guard: StateGuard) {
        debug!(action = ?action, delay = ?delay, state = ?guard.state, epoch = guard.epoch, "deferred_action_scheduled");
        self.tasks.push(Scheduled {
            action,
            guard,
            remaining: delay,
        });
    }

    pub fn is_pending(&self, action: DeferredAction) -> bool {
        self.tasks.iter().any(|task| task.action == action)
    }

    pub fn pending(&self) -> usize {
        self.tasks.len()
    }

    pub fn cancel_all(&mut self) {
        if !self.tasks.is_empty() {
            debug!(cancelled = self.tasks.len(), "deferred_actions_cancelled");
        }
        self.tasks.clear();
    }

    /// Advance `Seconds` delays by one simulation step and return the
    /// tasks now due, in scheduling order. Tasks whose guard no longer
    /// matches `current` are dropped unrun.
    pub fn tick(&mut self, dt_seconds: f32, current: StateGuard) -> Vec<DeferredAction> {
        let dt_seconds = dt_seconds.max(0.0);
        self.advance(current, |remaining| match remaining {
            Delay::Seconds(seconds) => {
                *seconds -= dt_seconds;
                *seconds <= 0.0 || seconds.is_nan()
            }
            Delay::Frames(_) => false,
        })
    }

    /// Advance `Frames` delays after the host has presented a frame.
    /// Simulation ticks never count towards them.
    pub fn frame_presented(&mut self, current: StateGuard) -> Vec<DeferredAction> {
        self.advance(current, |remaining| match remaining {
            Delay::Frames(frames) => {
                *frames = frames.saturating_sub(1);
                *frames == 0
            }
            Delay::Seconds(_) => false,
        })
    }

    fn advance(
        &mut self,
        current: StateGuard,
        mut step: impl FnMut(&mut Delay) -> bool,
    ) -> Vec<DeferredAction> {
        let mut due = Vec::new();
        self.tasks.retain_mut(|task| {
            if task.guard != current {
                debug!(
                    action = ?task.action,
                    expected = ?task.guard.state,
                    found = ?current.state,
                    "deferred_action_dropped_stale"
                );
                return false;
            }
            let fired = step(&mut task.remaining);
            if fired {
                due.push(task.action);
            }
            !fired
        });
        due
    }
}
