// 🗄️ Persistence collaborator - the boundary this crate consumes
//
// Entities, content blocks, redirects and the audit log live behind
// `EntityStore`. Two implementations ship with the crate:
// - `SqliteStore` (db.rs): durable, rusqlite + WAL
// - `MemoryStore` (memory.rs): Arc<RwLock<..>>, for tests and embedding
//
// Merge and undo are each ONE call (`commit_merge`, `commit_undo`) so the
// store can apply them atomically and re-check preconditions inside the
// same transaction.

use crate::deduplication::PairKey;
use crate::entity::{ContentBlock, EntitySnapshot, EntityType};
use crate::error::{StoreError, StoreResult};
use crate::merge::content_fingerprint;
use crate::redirects::Redirect;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// ============================================================================
// AUDIT EVENT
// ============================================================================

/// Event for audit trail: every merge and undo is recorded
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub data: serde_json::Value,
    pub actor: String,
}

impl Event {
    pub fn new(
        event_type: &str,
        entity_type: &str,
        entity_id: &str,
        data: serde_json::Value,
        actor: &str,
    ) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type: event_type.to_string(),
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub const EVENT_ENTITY_MERGED: &str = "entity_merged";
pub const EVENT_MERGE_UNDONE: &str = "merge_undone";
pub const EVENT_PAIR_DISMISSED: &str = "pair_dismissed";

// ============================================================================
// MERGE COMMIT
// ============================================================================

/// Everything a merge writes, applied by the store as one transaction:
/// archive `redirect.from_id`, replace the blocks of `redirect.to_id`,
/// insert `redirect`, append `event`.
///
/// `source_blocks_seen` / `target_blocks_seen` are fingerprints of the blocks
/// the executor read. When set, the store rejects the commit with
/// `StoreError::Conflict` if either side's blocks changed since.
#[derive(Debug, Clone)]
pub struct MergeCommit {
    pub redirect: Redirect,
    pub target_blocks: Vec<ContentBlock>,
    pub event: Event,
    pub source_blocks_seen: Option<String>,
    pub target_blocks_seen: Option<String>,
}

impl MergeCommit {
    pub fn new(redirect: Redirect, target_blocks: Vec<ContentBlock>, event: Event) -> Self {
        MergeCommit {
            redirect,
            target_blocks,
            event,
            source_blocks_seen: None,
            target_blocks_seen: None,
        }
    }

    /// Require both sides' blocks to be unchanged at commit time
    pub fn expecting(mut self, source_blocks: &[ContentBlock], target_blocks: &[ContentBlock]) -> Self {
        self.source_blocks_seen = Some(content_fingerprint(source_blocks));
        self.target_blocks_seen = Some(content_fingerprint(target_blocks));
        self
    }

    /// Compare the expected fingerprints against the blocks currently stored
    pub(crate) fn check_blocks(&self, current_source: &[ContentBlock], current_target: &[ContentBlock]) -> StoreResult<()> {
        let checks = [
            (&self.source_blocks_seen, current_source, &self.redirect.from_id),
            (&self.target_blocks_seen, current_target, &self.redirect.to_id),
        ];

        for (seen, current, id) in checks {
            if let Some(seen) = seen {
                if *seen != content_fingerprint(current) {
                    return Err(StoreError::Conflict(id.clone()));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// ENTITY STORE
// ============================================================================

pub trait EntityStore: Send + Sync {
    fn list_entities_by_type(&self, entity_type: EntityType) -> StoreResult<Vec<EntitySnapshot>>;

    fn get_entity(&self, id: &str) -> StoreResult<Option<EntitySnapshot>>;

    /// Archive an entity, remembering its status for a later restore
    fn archive_entity(&self, id: &str) -> StoreResult<()>;

    /// Return an archived entity to the status it had before archival
    fn restore_entity(&self, id: &str) -> StoreResult<()>;

    /// Content blocks in display order
    fn content_blocks(&self, id: &str) -> StoreResult<Vec<ContentBlock>>;

    /// Replace an entity's content blocks
    fn apply_content_blocks(&self, id: &str, blocks: &[ContentBlock]) -> StoreResult<()>;

    fn active_redirect_from(&self, from_id: &str) -> StoreResult<Option<Redirect>>;

    fn get_redirect(&self, redirect_id: &str) -> StoreResult<Option<Redirect>>;

    /// All redirects (active and inactive), oldest first
    fn list_redirects(&self, entity_type: Option<EntityType>) -> StoreResult<Vec<Redirect>>;

    /// Redirects where `entity_id` is either end, oldest first
    fn redirects_touching(&self, entity_id: &str) -> StoreResult<Vec<Redirect>>;

    /// Apply a merge atomically
    ///
    /// Preconditions are re-checked inside the transaction, in this order:
    /// - `AlreadyRedirected`: the source already has an active redirect
    /// - `NotFound`: either entity is missing
    /// - `Cycle`: the target's redirect chain reaches the source
    /// - `Archived`: either entity was archived
    /// - `Conflict`: blocks differ from the commit's expected fingerprints
    ///
    /// Nothing is written on failure.
    fn commit_merge(&self, commit: &MergeCommit) -> StoreResult<()>;

    /// Deactivate a redirect and restore its source atomically
    ///
    /// `Ok(None)` when the redirect does not exist or is already inactive.
    fn commit_undo(&self, redirect_id: &str, actor: &str) -> StoreResult<Option<Redirect>>;

    fn record_event(&self, event: &Event) -> StoreResult<()>;

    /// Events for an entity, newest first
    fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>>;

    fn dismiss_pair(&self, key: &PairKey, actor: &str) -> StoreResult<()>;

    fn dismissed_pairs(&self) -> StoreResult<Vec<PairKey>>;
}

/// Walk active redirects from `start` and report whether `needle` is reached
///
/// `next` looks up the target of the active redirect from an id. Stops on a
/// repeated id, so corrupt data cannot loop.
pub(crate) fn chain_reaches<F>(start: &str, needle: &str, mut next: F) -> StoreResult<bool>
where
    F: FnMut(&str) -> StoreResult<Option<String>>,
{
    let mut visited: HashSet<String> = HashSet::from([start.to_string()]);
    let mut current = start.to_string();

    loop {
        if current == needle {
            return Ok(true);
        }
        match next(&current)? {
            Some(to) if visited.insert(to.clone()) => current = to,
            _ => return Ok(false),
        }
    }
}

/// Audit event written by `commit_undo` implementations
pub(crate) fn undo_event(redirect: &Redirect, actor: &str) -> Event {
    Event::new(
        EVENT_MERGE_UNDONE,
        redirect.entity_type.as_str(),
        &redirect.from_id,
        serde_json::json!({
            "redirect_id": redirect.id,
            "from_id": redirect.from_id,
            "to_id": redirect.to_id,
        }),
        actor,
    )
}
