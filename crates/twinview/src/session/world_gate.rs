use tracing::debug;

use crate::host::{WorldEntryId, WorldEntryRequest};

/// Holds a vetoed "start world" call and the one-shot bypass for its replay.
#[derive(Debug, Default)]
pub struct WorldEntryGate {
    deferred: Option<WorldEntryRequest>,
    bypass: Option<WorldEntryId>,
}

impl WorldEntryGate {
    /// Keep `request` for a later replay. Only the first vetoed call is
    /// kept; returns false for a duplicate.
    pub fn defer(&mut self, request: WorldEntryRequest) -> bool {
        if self.deferred.is_some() {
            debug!(id = ?request.id, "world_entry_duplicate_blocked");
            return false;
        }
        self.deferred = Some(request);
        true
    }

    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Take the deferred call and arm the bypass for exactly that call.
    pub fn take_for_replay(&mut self) -> Option<WorldEntryRequest> {
        let request = self.deferred.take()?;
        self.bypass = Some(request.id);
        Some(request)
    }

    pub fn drop_deferred(&mut self) -> Option<WorldEntryRequest> {
        self.deferred.take()
    }

    /// True once for the call the bypass was armed for.
    pub fn consume_bypass(&mut self, id: WorldEntryId) -> bool {
        if self.bypass == Some(id) {
            self.bypass = None;
            return true;
        }
        false
    }

    pub fn clear(&mut self) {
        self.deferred = None;
        self.bypass = None;
    }
}
