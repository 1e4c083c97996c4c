// Entity Canonicalization - Core Library
// Exposes all modules for use in CLI, API server, and tests

pub mod aliases;
pub mod config;
pub mod db;
pub mod deduplication;
pub mod entity;
pub mod error;
pub mod history;
pub mod memory;
pub mod merge;
pub mod normalize;
pub mod redirects;
pub mod similarity;
pub mod store;

// Re-export commonly used types
pub use aliases::{AliasGroup, AliasTable};
pub use config::{CanonConfig, DetectorThresholds, DEFAULT_MAX_REDIRECT_DEPTH};
pub use db::{load_entities_csv, setup_database, SqliteStore};
pub use deduplication::{
    Confidence, DetectionSummary, Dismissals, DuplicateDetector, DuplicatePair, MatchType,
    PairKey, SuggestedAction,
};
pub use entity::{slugify, ContentBlock, EntitySnapshot, EntityStatus, EntityType};
pub use error::{MergeError, StoreError, ValidationError};
pub use history::MergeHistory;
pub use memory::MemoryStore;
pub use merge::{apply_strategy, content_fingerprint, MergeExecutor, MergeResult, MergeStrategy};
pub use normalize::normalize;
pub use redirects::{Redirect, RedirectResolver, RedirectStatus};
pub use similarity::{levenshtein_distance, similarity};
pub use store::{EntityStore, Event};

use anyhow::Context;
use std::sync::Arc;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// CANONICALIZER (admin-facing surface)
// ============================================================================

/// Detector, executor, resolver and history wired to one store
#[derive(Clone)]
pub struct Canonicalizer {
    store: Arc<dyn EntityStore>,
    detector: Arc<DuplicateDetector>,
    executor: MergeExecutor,
    resolver: RedirectResolver,
    history: MergeHistory,
}

impl Canonicalizer {
    /// Default thresholds, curated aliases, depth 5
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Canonicalizer::with_parts(
            store,
            DuplicateDetector::new(),
            DEFAULT_MAX_REDIRECT_DEPTH,
        )
    }

    pub fn with_parts(store: Arc<dyn EntityStore>, detector: DuplicateDetector, max_depth: usize) -> Self {
        let resolver = RedirectResolver::with_max_depth(store.clone(), max_depth);

        Canonicalizer {
            executor: MergeExecutor::with_resolver(store.clone(), resolver.clone()),
            history: MergeHistory::new(store.clone()),
            detector: Arc::new(detector),
            resolver,
            store,
        }
    }

    /// Build from configuration, loading the alias file when one is set
    pub fn from_config(store: Arc<dyn EntityStore>, config: &CanonConfig) -> anyhow::Result<Self> {
        let aliases = match &config.alias_file {
            Some(path) => AliasTable::from_json_file(path)
                .with_context(|| format!("Failed to load aliases from {}", path.display()))?,
            None => AliasTable::with_defaults(),
        };
        tracing::debug!(groups = aliases.len(), "alias table loaded");

        let detector = DuplicateDetector::with_config(config.thresholds.clone(), Arc::new(aliases));
        Ok(Canonicalizer::with_parts(store, detector, config.max_redirect_depth))
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn detector(&self) -> &DuplicateDetector {
        &self.detector
    }

    pub fn history(&self) -> &MergeHistory {
        &self.history
    }

    /// Pure detection over caller-supplied snapshots
    pub fn detect(&self, entities: &[EntitySnapshot]) -> Vec<DuplicatePair> {
        self.detector.detect(entities)
    }

    /// Scan every stored entity of one type, skipping archived ones, and mark
    /// dismissed pairs as `Ignore`
    pub fn scan(&self, entity_type: EntityType) -> Result<Vec<DuplicatePair>, StoreError> {
        let entities: Vec<EntitySnapshot> = self
            .store
            .list_entities_by_type(entity_type)?
            .into_iter()
            .filter(|e| !e.is_archived())
            .collect();

        let dismissals = Dismissals::from_keys(self.store.dismissed_pairs()?);
        let pairs = dismissals.annotate(self.detector.detect_parallel(&entities));

        tracing::info!(
            entity_type = %entity_type,
            entities = entities.len(),
            summary = %DetectionSummary::from_pairs(&pairs).summary(),
            "scan complete"
        );

        Ok(pairs)
    }

    pub fn merge(
        &self,
        source_id: &str,
        target_id: &str,
        strategy: MergeStrategy,
        actor: &str,
    ) -> Result<MergeResult, MergeError> {
        self.executor.merge(source_id, target_id, strategy, actor)
    }

    pub fn undo(&self, redirect_id: &str, actor: &str) -> Result<bool, MergeError> {
        self.history.undo(redirect_id, actor)
    }

    pub fn resolve(&self, id: &str) -> String {
        self.resolver.resolve(id)
    }

    pub fn resolve_chain(&self, id: &str) -> Vec<String> {
        self.resolver.chain(id, self.resolver.max_depth())
    }

    /// Record that an operator reviewed a pair and it is not a duplicate
    pub fn dismiss(&self, a: &str, b: &str, actor: &str) -> Result<(), StoreError> {
        self.store.dismiss_pair(&PairKey::new(a, b), actor)?;
        tracing::info!(a = %a, b = %b, actor = %actor, "pair dismissed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seeded() -> (Arc<MemoryStore>, Canonicalizer) {
        let store = Arc::new(MemoryStore::new());
        store.upsert_entity(EntitySnapshot::new("a-1", EntityType::Attraction, "Burj Khalifa")).unwrap();
        store.upsert_entity(
            EntitySnapshot::new("a-2", EntityType::Attraction, "burj khalifa").with_status(EntityStatus::Draft),
        ).unwrap();
        store.upsert_entity(EntitySnapshot::new("a-3", EntityType::Attraction, "Dubai Frame")).unwrap();
        store.upsert_entity(EntitySnapshot::new("h-1", EntityType::Hotel, "Burj Khalifa")).unwrap();

        let canon = Canonicalizer::new(store.clone());
        (store, canon)
    }

    #[test]
    fn test_scan_merge_resolve_undo() {
        let (store, canon) = seeded();

        let pairs = canon.scan(EntityType::Attraction).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].match_type, MatchType::ExactName);
        assert_eq!(pairs[0].suggested_action, SuggestedAction::Merge);

        let result = canon.merge("a-2", "a-1", MergeStrategy::MergeContent, "editor").unwrap();
        assert_eq!(canon.resolve("a-2"), "a-1");
        assert_eq!(canon.resolve_chain("a-2"), vec!["a-2", "a-1"]);

        // Archived entity drops out of the next scan
        assert!(canon.scan(EntityType::Attraction).unwrap().is_empty());

        assert!(canon.undo(&result.redirect_id, "editor").unwrap());
        assert_eq!(canon.resolve("a-2"), "a-2");
        assert_eq!(store.get_entity("a-2").unwrap().unwrap().status, EntityStatus::Draft);
    }

    #[test]
    fn test_scan_merge_resolve_undo_on_sqlite() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        store.upsert_entity(&EntitySnapshot::new("a-1", EntityType::Attraction, "Burj Khalifa")).unwrap();
        store.upsert_entity(
            &EntitySnapshot::new("a-2", EntityType::Attraction, "burj khalifa").with_status(EntityStatus::Draft),
        ).unwrap();
        store.apply_content_blocks("a-1", &[ContentBlock::new("body", "tower")]).unwrap();
        store.apply_content_blocks("a-2", &[ContentBlock::new("body", "views")]).unwrap();

        let canon = Canonicalizer::new(store.clone());

        let pairs = canon.scan(EntityType::Attraction).unwrap();
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].suggested_action, SuggestedAction::Merge);

        let result = canon.merge("a-2", "a-1", MergeStrategy::MergeContent, "editor").unwrap();
        assert_eq!(canon.resolve("a-2"), "a-1");
        let bodies: Vec<String> = store.content_blocks("a-1").unwrap().into_iter().map(|b| b.body).collect();
        assert_eq!(bodies, vec!["tower", "views"]);
        assert!(canon.scan(EntityType::Attraction).unwrap().is_empty());

        assert!(canon.undo(&result.redirect_id, "editor").unwrap());
        assert_eq!(canon.resolve("a-2"), "a-2");
        assert_eq!(store.get_entity("a-2").unwrap().unwrap().status, EntityStatus::Draft);

        let events = canon.history().events_for(EntityType::Attraction, "a-2").unwrap();
        let kinds: Vec<&str> = events.iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(kinds, vec!["merge_undone", "entity_merged"]);
    }

    #[test]
    fn test_scan_marks_dismissed_pairs() {
        let (_, canon) = seeded();

        canon.dismiss("a-2", "a-1", "editor").unwrap();
        let pairs = canon.scan(EntityType::Attraction).unwrap();

        assert_eq!(pairs[0].suggested_action, SuggestedAction::Ignore);
    }

    #[test]
    fn test_respects_configured_depth() {
        let store = Arc::new(MemoryStore::new());
        for i in 1..4 {
            store.insert_redirect(Redirect::new(
                EntityType::Hotel,
                &format!("h-{}", i),
                &format!("h-{}", i),
                &format!("h-{}", i + 1),
                &format!("h-{}", i + 1),
                "t",
            )).unwrap();
        }

        let canon = Canonicalizer::with_parts(store, DuplicateDetector::new(), 2);
        assert_eq!(canon.resolve("h-1"), "h-3");
    }

    #[test]
    fn test_from_config_reports_missing_alias_file() {
        let config = CanonConfig {
            alias_file: Some(std::path::PathBuf::from("/definitely/not/here.json")),
            ..CanonConfig::default()
        };

        let result = Canonicalizer::from_config(Arc::new(MemoryStore::new()), &config);
        assert!(result.is_err());
    }
}
