// ⏪ Merge History - list past merges and reverse a specific one
//
// Undo deactivates the redirect and restores the source to the status it had
// before the merge. Content written to the target by keep_source or
// merge_content stays as it is; the merge event carries a fingerprint of the
// target's blocks before the merge so an operator can spot the difference.

use crate::entity::EntityType;
use crate::error::MergeError;
use crate::redirects::Redirect;
use crate::store::{EntityStore, Event};
use std::sync::Arc;

#[derive(Clone)]
pub struct MergeHistory {
    store: Arc<dyn EntityStore>,
}

impl MergeHistory {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        MergeHistory { store }
    }

    /// Reverse the merge behind `redirect_id`
    ///
    /// `Ok(false)` when the redirect does not exist or was already undone.
    pub fn undo(&self, redirect_id: &str, actor: &str) -> Result<bool, MergeError> {
        match self.store.commit_undo(redirect_id, actor)? {
            Some(redirect) => {
                tracing::info!(
                    redirect = %redirect_id,
                    source = %redirect.from_id,
                    target = %redirect.to_id,
                    actor = %actor,
                    "merge undone"
                );
                Ok(true)
            }
            None => {
                tracing::debug!(redirect = %redirect_id, "nothing to undo");
                Ok(false)
            }
        }
    }

    /// Every redirect ever written, active and inactive, oldest first
    pub fn list(&self, entity_type: Option<EntityType>) -> Result<Vec<Redirect>, MergeError> {
        Ok(self.store.list_redirects(entity_type)?)
    }

    /// Redirects where the entity was merged away or merged into
    pub fn history_for(&self, entity_id: &str) -> Result<Vec<Redirect>, MergeError> {
        Ok(self.store.redirects_touching(entity_id)?)
    }

    /// Audit events (merges, undos) recorded against an entity, newest first
    pub fn events_for(&self, entity_type: EntityType, entity_id: &str) -> Result<Vec<Event>, MergeError> {
        Ok(self.store.events_for_entity(entity_type.as_str(), entity_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::{EntitySnapshot, EntityStatus};
    use crate::merge::{MergeExecutor, MergeStrategy};
    use crate::memory::MemoryStore;
    use crate::redirects::{RedirectResolver, RedirectStatus};

    fn setup() -> (Arc<MemoryStore>, MergeExecutor, MergeHistory) {
        let store = Arc::new(MemoryStore::new());
        store.upsert_entity(
            EntitySnapshot::new("d-1", EntityType::Destination, "Palm Island").with_status(EntityStatus::Draft),
        ).unwrap();
        store.upsert_entity(EntitySnapshot::new("d-2", EntityType::Destination, "Palm Jumeirah")).unwrap();
        store.upsert_entity(EntitySnapshot::new("d-3", EntityType::Destination, "The Palm")).unwrap();

        (
            store.clone(),
            MergeExecutor::new(store.clone()),
            MergeHistory::new(store),
        )
    }

    #[test]
    fn test_undo_restores_source() {
        let (store, executor, history) = setup();
        let result = executor.merge("d-1", "d-2", MergeStrategy::KeepTarget, "editor").unwrap();

        assert!(history.undo(&result.redirect_id, "reviewer").unwrap());

        let source = store.get_entity("d-1").unwrap().unwrap();
        assert!(!source.is_archived());
        assert_eq!(source.status, EntityStatus::Draft);

        let resolver = RedirectResolver::new(store.clone());
        assert_eq!(resolver.resolve("d-1"), "d-1");
    }

    #[test]
    fn test_second_undo_returns_false() {
        let (_, executor, history) = setup();
        let result = executor.merge("d-1", "d-2", MergeStrategy::KeepTarget, "editor").unwrap();

        assert!(history.undo(&result.redirect_id, "reviewer").unwrap());
        assert!(!history.undo(&result.redirect_id, "reviewer").unwrap());
    }

    #[test]
    fn test_undo_unknown_redirect_returns_false() {
        let (_, _, history) = setup();
        assert!(!history.undo("no-such-redirect", "reviewer").unwrap());
    }

    #[test]
    fn test_undo_keeps_record_for_audit() {
        let (_, executor, history) = setup();
        let result = executor.merge("d-1", "d-2", MergeStrategy::KeepTarget, "editor").unwrap();
        history.undo(&result.redirect_id, "reviewer").unwrap();

        let all = history.list(Some(EntityType::Destination)).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, RedirectStatus::Inactive);

        let events = history.events_for(EntityType::Destination, "d-1").unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["merge_undone", "entity_merged"]);
    }

    #[test]
    fn test_remerge_after_undo() {
        let (_, executor, history) = setup();
        let first = executor.merge("d-1", "d-2", MergeStrategy::KeepTarget, "editor").unwrap();
        history.undo(&first.redirect_id, "reviewer").unwrap();

        let second = executor.merge("d-1", "d-3", MergeStrategy::KeepTarget, "editor").unwrap();
        assert_eq!(second.redirect.to_id, "d-3");

        let touching = history.history_for("d-1").unwrap();
        assert_eq!(touching.len(), 2);
        assert_eq!(touching.iter().filter(|r| r.is_active()).count(), 1);
    }
}
