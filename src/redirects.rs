// ↪️ Redirect Resolver - follow merged-away ids to their canonical entity
//
// Redirects are flat `from_id → to_id` records indexed by `from_id`.
// Resolution is a bounded iterative lookup, never pointer-chasing between
// live entity objects. Chains are expected to be short (a handful of
// sequential merges); the hop limit turns a data bug into a truncated answer
// instead of an endless walk.

use crate::config::DEFAULT_MAX_REDIRECT_DEPTH;
use crate::entity::EntityType;
use crate::error::ValidationError;
use crate::store::EntityStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// REDIRECT RECORD
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RedirectStatus {
    Active,

    /// Undone. Kept for audit history, never physically deleted.
    Inactive,
}

impl RedirectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RedirectStatus::Active => "active",
            RedirectStatus::Inactive => "inactive",
        }
    }
}

impl fmt::Display for RedirectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RedirectStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(RedirectStatus::Active),
            "inactive" => Ok(RedirectStatus::Inactive),
            other => Err(ValidationError::UnknownRedirectStatus(other.to_string())),
        }
    }
}

/// Persisted fact: `from_id` was merged into `to_id`
///
/// Serialized shape is stable across restarts:
/// `{ id, entityType, fromId, fromSlug, toId, toSlug, mergedAt, mergedBy, status }`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect {
    pub id: String,
    pub entity_type: EntityType,
    pub from_id: String,
    pub from_slug: String,
    pub to_id: String,
    pub to_slug: String,
    pub merged_at: DateTime<Utc>,
    pub merged_by: String,
    pub status: RedirectStatus,
}

impl Redirect {
    /// New active redirect with a fresh id
    pub fn new(
        entity_type: EntityType,
        from_id: &str,
        from_slug: &str,
        to_id: &str,
        to_slug: &str,
        merged_by: &str,
    ) -> Self {
        Redirect {
            id: uuid::Uuid::new_v4().to_string(),
            entity_type,
            from_id: from_id.to_string(),
            from_slug: from_slug.to_string(),
            to_id: to_id.to_string(),
            to_slug: to_slug.to_string(),
            merged_at: Utc::now(),
            merged_by: merged_by.to_string(),
            status: RedirectStatus::Active,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == RedirectStatus::Active
    }
}

// ============================================================================
// REDIRECT RESOLVER
// ============================================================================

#[derive(Clone)]
pub struct RedirectResolver {
    store: Arc<dyn EntityStore>,
    max_depth: usize,
}

impl RedirectResolver {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        RedirectResolver {
            store,
            max_depth: DEFAULT_MAX_REDIRECT_DEPTH,
        }
    }

    pub fn with_max_depth(store: Arc<dyn EntityStore>, max_depth: usize) -> Self {
        RedirectResolver { store, max_depth }
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Current canonical id for `id`, following at most `max_depth` hops
    pub fn resolve(&self, id: &str) -> String {
        self.resolve_with_depth(id, self.max_depth)
    }

    /// Follow active redirects from `id`. Returns the id reached when no
    /// redirect exists or after `max_depth` hops, whichever comes first.
    pub fn resolve_with_depth(&self, id: &str, max_depth: usize) -> String {
        let hops = self.chain(id, max_depth);
        hops.last().cloned().unwrap_or_else(|| id.to_string())
    }

    /// Every id visited from `id` (inclusive), at most `max_depth` hops
    pub fn chain(&self, id: &str, max_depth: usize) -> Vec<String> {
        let mut hops = vec![id.to_string()];
        let mut current = id.to_string();

        for _ in 0..max_depth {
            match self.next_hop(&current) {
                Some(next) => {
                    hops.push(next.clone());
                    current = next;
                }
                None => return hops,
            }
        }

        if self.next_hop(&current).is_some() {
            tracing::warn!(start = %id, stopped_at = %current, max_depth, "redirect chain truncated");
        }

        hops
    }

    /// Walk the chain to its end with no hop limit, stopping if an id repeats
    ///
    /// Used for cycle checks before a merge, where a truncated walk could hide
    /// the source further down the chain.
    pub fn full_chain(&self, id: &str) -> Vec<String> {
        let mut hops = vec![id.to_string()];
        let mut visited: HashSet<String> = HashSet::from([id.to_string()]);
        let mut current = id.to_string();

        while let Some(next) = self.next_hop(&current) {
            if !visited.insert(next.clone()) {
                tracing::error!(start = %id, repeated = %next, "redirect cycle found in stored data");
                break;
            }
            hops.push(next.clone());
            current = next;
        }

        hops
    }

    /// Target of the active redirect from `id`. Store errors end the walk.
    fn next_hop(&self, id: &str) -> Option<String> {
        match self.store.active_redirect_from(id) {
            Ok(redirect) => redirect.map(|r| r.to_id),
            Err(e) => {
                tracing::warn!(id = %id, error = %e, "redirect lookup failed, stopping resolution");
                None
            }
        }
    }
}
