// 🧠 In-memory store - EntityStore backed by Arc<RwLock<..>>
//
// Every mutating call takes the single write lock for its whole duration,
// so `commit_merge` / `commit_undo` are atomic with respect to each other.

use crate::deduplication::PairKey;
use crate::entity::{ContentBlock, EntitySnapshot, EntityStatus, EntityType};
use crate::error::{StoreError, StoreResult};
use crate::redirects::{Redirect, RedirectStatus};
use crate::store::{chain_reaches, undo_event, EntityStore, Event, MergeCommit, EVENT_PAIR_DISMISSED};
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Debug, Default)]
struct MemoryState {
    /// Insertion order preserved for stable listings
    entities: Vec<EntitySnapshot>,

    /// Status an entity had before it was archived
    status_before_archive: HashMap<String, EntityStatus>,

    blocks: HashMap<String, Vec<ContentBlock>>,

    /// Append-only; undo flips status in place
    redirects: Vec<Redirect>,

    events: Vec<Event>,

    dismissed: HashSet<PairKey>,
}

impl MemoryState {
    fn entity_mut(&mut self, id: &str) -> StoreResult<&mut EntitySnapshot> {
        self.entities
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    fn archive(&mut self, id: &str) -> StoreResult<()> {
        let entity = self.entity_mut(id)?;
        let previous = entity.status;

        entity.status = EntityStatus::Archived;
        entity.updated_at = Utc::now();

        if previous != EntityStatus::Archived {
            self.status_before_archive.insert(id.to_string(), previous);
        }
        Ok(())
    }

    fn restore(&mut self, id: &str) -> StoreResult<()> {
        let previous = self
            .status_before_archive
            .get(id)
            .copied()
            .unwrap_or(EntityStatus::Draft);

        let entity = self.entity_mut(id)?;
        if entity.status == EntityStatus::Archived {
            entity.status = previous;
            entity.updated_at = Utc::now();
        }

        self.status_before_archive.remove(id);
        Ok(())
    }

    fn active_redirect_from(&self, from_id: &str) -> Option<&Redirect> {
        self.redirects
            .iter()
            .find(|r| r.from_id == from_id && r.is_active())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or replace an entity snapshot
    pub fn upsert_entity(&self, entity: EntitySnapshot) -> StoreResult<()> {
        let mut state = self.write()?;
        match state.entities.iter_mut().find(|e| e.id == entity.id) {
            Some(existing) => *existing = entity,
            None => state.entities.push(entity),
        }
        Ok(())
    }

    /// Insert an entity together with its content blocks
    pub fn insert_with_blocks(&self, entity: EntitySnapshot, blocks: Vec<ContentBlock>) -> StoreResult<()> {
        let id = entity.id.clone();
        self.upsert_entity(entity)?;
        self.write()?.blocks.insert(id, blocks);
        Ok(())
    }

    /// Seed a redirect directly, bypassing merge checks (fixtures, imports)
    pub fn insert_redirect(&self, redirect: Redirect) -> StoreResult<()> {
        self.write()?.redirects.push(redirect);
        Ok(())
    }
}

impl EntityStore for MemoryStore {
    fn list_entities_by_type(&self, entity_type: EntityType) -> StoreResult<Vec<EntitySnapshot>> {
        let state = self.read()?;
        Ok(state
            .entities
            .iter()
            .filter(|e| e.entity_type == entity_type)
            .cloned()
            .collect())
    }

    fn get_entity(&self, id: &str) -> StoreResult<Option<EntitySnapshot>> {
        let state = self.read()?;
        Ok(state.entities.iter().find(|e| e.id == id).cloned())
    }

    fn archive_entity(&self, id: &str) -> StoreResult<()> {
        self.write()?.archive(id)
    }

    fn restore_entity(&self, id: &str) -> StoreResult<()> {
        self.write()?.restore(id)
    }

    fn content_blocks(&self, id: &str) -> StoreResult<Vec<ContentBlock>> {
        let state = self.read()?;
        Ok(state.blocks.get(id).cloned().unwrap_or_default())
    }

    fn apply_content_blocks(&self, id: &str, blocks: &[ContentBlock]) -> StoreResult<()> {
        let mut state = self.write()?;
        state.entity_mut(id)?.updated_at = Utc::now();
        state.blocks.insert(id.to_string(), blocks.to_vec());
        Ok(())
    }

    fn active_redirect_from(&self, from_id: &str) -> StoreResult<Option<Redirect>> {
        let state = self.read()?;
        Ok(state.active_redirect_from(from_id).cloned())
    }

    fn get_redirect(&self, redirect_id: &str) -> StoreResult<Option<Redirect>> {
        let state = self.read()?;
        Ok(state.redirects.iter().find(|r| r.id == redirect_id).cloned())
    }

    fn list_redirects(&self, entity_type: Option<EntityType>) -> StoreResult<Vec<Redirect>> {
        let state = self.read()?;
        Ok(state
            .redirects
            .iter()
            .filter(|r| entity_type.map_or(true, |t| r.entity_type == t))
            .cloned()
            .collect())
    }

    fn redirects_touching(&self, entity_id: &str) -> StoreResult<Vec<Redirect>> {
        let state = self.read()?;
        Ok(state
            .redirects
            .iter()
            .filter(|r| r.from_id == entity_id || r.to_id == entity_id)
            .cloned()
            .collect())
    }

    fn commit_merge(&self, commit: &MergeCommit) -> StoreResult<()> {
        let mut state = self.write()?;
        let redirect = &commit.redirect;

        // Preconditions, checked under the same lock as the writes
        if state.active_redirect_from(&redirect.from_id).is_some() {
            return Err(StoreError::AlreadyRedirected(redirect.from_id.clone()));
        }

        let mut archived = None;
        for id in [&redirect.from_id, &redirect.to_id] {
            match state.entities.iter().find(|e| &e.id == id) {
                None => return Err(StoreError::NotFound(id.clone())),
                Some(e) if e.is_archived() && archived.is_none() => archived = Some(id.clone()),
                Some(_) => {}
            }
        }

        let closes_cycle = chain_reaches(&redirect.to_id, &redirect.from_id, |id| {
            Ok(state.active_redirect_from(id).map(|r| r.to_id.clone()))
        })?;
        if closes_cycle {
            return Err(StoreError::Cycle {
                from_id: redirect.from_id.clone(),
                to_id: redirect.to_id.clone(),
            });
        }

        if let Some(id) = archived {
            return Err(StoreError::Archived(id));
        }

        let no_blocks = Vec::new();
        commit.check_blocks(
            state.blocks.get(&redirect.from_id).unwrap_or(&no_blocks),
            state.blocks.get(&redirect.to_id).unwrap_or(&no_blocks),
        )?;

        state.archive(&redirect.from_id)?;
        state.entity_mut(&redirect.to_id)?.updated_at = Utc::now();
        state
            .blocks
            .insert(redirect.to_id.clone(), commit.target_blocks.clone());
        state.redirects.push(redirect.clone());
        state.events.push(commit.event.clone());

        Ok(())
    }

    fn commit_undo(&self, redirect_id: &str, actor: &str) -> StoreResult<Option<Redirect>> {
        let mut state = self.write()?;

        let redirect = match state
            .redirects
            .iter()
            .find(|r| r.id == redirect_id && r.is_active())
        {
            Some(r) => r.clone(),
            None => return Ok(None),
        };

        // Restore first so a missing source leaves the redirect untouched
        state.restore(&redirect.from_id)?;

        let mut updated = redirect.clone();
        updated.status = RedirectStatus::Inactive;
        if let Some(stored) = state.redirects.iter_mut().find(|r| r.id == redirect_id) {
            stored.status = RedirectStatus::Inactive;
        }
        state.events.push(undo_event(&updated, actor));

        Ok(Some(updated))
    }

    fn record_event(&self, event: &Event) -> StoreResult<()> {
        self.write()?.events.push(event.clone());
        Ok(())
    }

    fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>> {
        let state = self.read()?;
        let mut events: Vec<Event> = state
            .events
            .iter()
            .filter(|e| e.entity_type == entity_type && e.entity_id == entity_id)
            .cloned()
            .collect();
        events.reverse();
        Ok(events)
    }

    fn dismiss_pair(&self, key: &PairKey, actor: &str) -> StoreResult<()> {
        let mut state = self.write()?;
        if state.dismissed.insert(key.clone()) {
            state.events.push(Event::new(
                EVENT_PAIR_DISMISSED,
                "pair",
                &format!("{}:{}", key.0, key.1),
                serde_json::json!({ "a": key.0, "b": key.1 }),
                actor,
            ));
        }
        Ok(())
    }

    fn dismissed_pairs(&self) -> StoreResult<Vec<PairKey>> {
        let state = self.read()?;
        let mut keys: Vec<PairKey> = state.dismissed.iter().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}
