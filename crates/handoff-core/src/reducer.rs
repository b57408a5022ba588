use crate::domain::{SessionId, SessionState, SessionStatePatch, SessionStatus};
use crate::error::CoreError;
use std::collections::{HashMap, HashSet};

/// Everything needed to undo one optimistic write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    session_id: SessionId,
    previous: Option<SessionState>,
    applied: SessionState,
    generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackOutcome {
    /// The entry is back to exactly what it was before the write.
    Restored,
    /// A later local write touched the entry; only fields it left alone were reverted.
    Partial,
    /// Confirmed server state arrived after the write and was kept.
    Superseded,
}

/// Session id to status map. Confirmed writes (reloads, lookups, change feed) advance a
/// revision counter and stamp the session with it; optimistic writes do not.
#[derive(Debug, Clone, Default)]
pub struct SessionStates {
    entries: HashMap<SessionId, SessionState>,
    generations: HashMap<SessionId, u64>,
    revision: u64,
}

impl SessionStates {
    pub fn get(&self, session_id: &SessionId) -> Option<&SessionState> {
        self.entries.get(session_id)
    }

    pub fn status_of(&self, session_id: &SessionId) -> Option<SessionStatus> {
        self.entries.get(session_id).map(|state| state.status)
    }

    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.entries.contains_key(session_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SessionId, &SessionState)> {
        self.entries.iter()
    }

    /// Latest confirmed write; a fetch started now only knows state up to this point.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Replaces the whole map with freshly fetched rows.
    pub fn hydrate(&mut self, entries: impl IntoIterator<Item = (SessionId, SessionState)>) {
        self.hydrate_since(self.revision, entries);
    }

    /// Like `hydrate`, for rows fetched when the map stood at revision `since`. Sessions
    /// confirmed after that keep their newer state.
    pub fn hydrate_since(
        &mut self,
        since: u64,
        entries: impl IntoIterator<Item = (SessionId, SessionState)>,
    ) {
        let newer: HashSet<SessionId> = self
            .generations
            .iter()
            .filter(|(_, stamp)| **stamp > since)
            .map(|(id, _)| id.clone())
            .collect();
        let stale: Vec<SessionId> = self
            .entries
            .keys()
            .filter(|id| !newer.contains(*id))
            .cloned()
            .collect();
        for id in &stale {
            self.entries.remove(id);
            self.bump(id);
        }
        for (id, state) in entries {
            if newer.contains(&id) {
                tracing::debug!(session = %id, "keeping state confirmed after reload started");
                continue;
            }
            self.bump(&id);
            self.entries.insert(id, state);
        }
    }

    pub fn insert_confirmed(&mut self, session_id: SessionId, state: SessionState) {
        self.bump(&session_id);
        self.entries.insert(session_id, state);
    }

    pub fn apply_optimistic(
        &mut self,
        session_id: &SessionId,
        update: impl FnOnce(&mut SessionState),
    ) -> Snapshot {
        let previous = self.entries.get(session_id).cloned();
        let mut next = previous.clone().unwrap_or_default();
        update(&mut next);
        self.entries.insert(session_id.clone(), next.clone());
        Snapshot {
            session_id: session_id.clone(),
            previous,
            applied: next,
            generation: self.generation(session_id),
        }
    }

    /// The backend accepted the write; the optimistic value stays until the change feed
    /// or a reload replaces it.
    pub fn confirm(&self, snapshot: Snapshot) -> SessionState {
        snapshot.applied
    }

    pub fn rollback(&mut self, snapshot: Snapshot) -> RollbackOutcome {
        let Snapshot {
            session_id,
            previous,
            applied,
            generation,
        } = snapshot;

        if self.generation(&session_id) != generation {
            return RollbackOutcome::Superseded;
        }

        let current = self.entries.get(&session_id).cloned();
        if current.as_ref() == Some(&applied) || current.is_none() {
            match previous {
                Some(state) => {
                    self.entries.insert(session_id, state);
                }
                None => {
                    self.entries.remove(&session_id);
                }
            }
            return RollbackOutcome::Restored;
        }

        let base = previous.unwrap_or_default();
        if let Some(current) = self.entries.get_mut(&session_id) {
            if current.status == applied.status && current.agent_id == applied.agent_id {
                current.status = base.status;
                current.agent_id = base.agent_id;
            }
            if current.is_pinned == applied.is_pinned {
                current.is_pinned = base.is_pinned;
            }
            if current.last_updated == applied.last_updated {
                current.last_updated = base.last_updated;
            }
        }
        RollbackOutcome::Partial
    }

    /// Shallow merge of a change-feed row into the existing or default entry.
    pub fn merge_patch(&mut self, patch: &SessionStatePatch) -> &SessionState {
        self.bump(&patch.session_id);
        let entry = self.entries.entry(patch.session_id.clone()).or_default();
        patch.apply_to(entry);
        if let Err(err) = entry.validate() {
            tracing::warn!(session = %patch.session_id, error = %err, "inconsistent session state pushed");
        }
        entry
    }

    pub fn remove(&mut self, session_id: &SessionId) -> Option<SessionState> {
        self.bump(session_id);
        self.entries.remove(session_id)
    }

    pub fn violations(&self) -> Vec<(SessionId, CoreError)> {
        let mut out: Vec<(SessionId, CoreError)> = self
            .entries
            .iter()
            .filter_map(|(id, state)| state.validate().err().map(|err| (id.clone(), err)))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    fn generation(&self, session_id: &SessionId) -> u64 {
        self.generations.get(session_id).copied().unwrap_or(0)
    }

    fn bump(&mut self, session_id: &SessionId) {
        self.revision += 1;
        self.generations.insert(session_id.clone(), self.revision);
    }
}
