// 🔀 Merge Executor - fold a duplicate into its canonical entity
//
// A merge picks the surviving content (strategy), archives the source and
// writes a redirect so old links keep working. All writes go to the store
// as ONE `commit_merge` call. The store re-checks the preconditions inside
// its transaction (no active redirect from the source, no cycle, neither
// side archived, blocks unchanged since the read), so two racing merges
// cannot both land on stale state.

use crate::entity::{ContentBlock, EntitySnapshot};
use crate::error::{MergeError, StoreError, ValidationError};
use crate::redirects::{Redirect, RedirectResolver};
use crate::store::{EntityStore, Event, MergeCommit, EVENT_ENTITY_MERGED};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

// ============================================================================
// STRATEGY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Discard source content
    KeepTarget,

    /// Replace target content with source content
    KeepSource,

    /// Target blocks followed by source blocks
    MergeContent,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::KeepTarget => "keep_target",
            MergeStrategy::KeepSource => "keep_source",
            MergeStrategy::MergeContent => "merge_content",
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeStrategy {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "keep_target" => Ok(MergeStrategy::KeepTarget),
            "keep_source" => Ok(MergeStrategy::KeepSource),
            "merge_content" => Ok(MergeStrategy::MergeContent),
            other => Err(ValidationError::UnknownStrategy(other.to_string())),
        }
    }
}

/// Content blocks the target ends up with
pub fn apply_strategy(
    strategy: MergeStrategy,
    source_blocks: &[ContentBlock],
    target_blocks: &[ContentBlock],
) -> Vec<ContentBlock> {
    match strategy {
        MergeStrategy::KeepTarget => target_blocks.to_vec(),
        MergeStrategy::KeepSource => source_blocks.to_vec(),
        MergeStrategy::MergeContent => target_blocks
            .iter()
            .chain(source_blocks.iter())
            .cloned()
            .collect(),
    }
}

/// SHA-256 over block kinds and bodies, in order
///
/// Recorded in the merge event so an operator can tell whether the target's
/// content changed since the merge.
pub fn content_fingerprint(blocks: &[ContentBlock]) -> String {
    let mut hasher = Sha256::new();
    for block in blocks {
        hasher.update(block.kind.as_bytes());
        hasher.update([0u8]);
        hasher.update(block.body.as_bytes());
        hasher.update([0u8]);
    }
    format!("{:x}", hasher.finalize())
}

// ============================================================================
// EXECUTOR
// ============================================================================

/// Merge attempts before a commit that keeps losing races gives up
const MAX_COMMIT_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub redirect_id: String,
    pub redirect: Redirect,

    /// Target as requested by the caller; differs from `target.id` when it
    /// had already been merged away
    pub requested_target_id: String,

    /// Canonical target after the merge
    pub target: EntitySnapshot,

    /// Blocks now on the target
    pub blocks: Vec<ContentBlock>,
}

/// Outcome of one read-check-commit pass
enum Attempt {
    Done(MergeResult),

    /// The store saw state change since the read; re-run from the top
    Retry(StoreError),
}

#[derive(Clone)]
pub struct MergeExecutor {
    store: Arc<dyn EntityStore>,
    resolver: RedirectResolver,
}

impl MergeExecutor {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        let resolver = RedirectResolver::new(store.clone());
        MergeExecutor { store, resolver }
    }

    pub fn with_resolver(store: Arc<dyn EntityStore>, resolver: RedirectResolver) -> Self {
        MergeExecutor { store, resolver }
    }

    /// Merge `source_id` into `target_id`
    ///
    /// If the target was itself merged away, the redirect points at the end
    /// of its chain instead. When a concurrent merge changes either side
    /// between the read and the commit, the merge is re-evaluated against
    /// the new state.
    pub fn merge(
        &self,
        source_id: &str,
        target_id: &str,
        strategy: MergeStrategy,
        actor: &str,
    ) -> Result<MergeResult, MergeError> {
        let mut attempt = 1;
        loop {
            match self.attempt(source_id, target_id, strategy, actor)? {
                Attempt::Done(result) => return Ok(result),
                Attempt::Retry(e) if attempt < MAX_COMMIT_ATTEMPTS => {
                    tracing::debug!(source = %source_id, target = %target_id, attempt, error = %e, "merge raced, retrying");
                    attempt += 1;
                }
                Attempt::Retry(e) => return Err(e.into()),
            }
        }
    }

    fn attempt(
        &self,
        source_id: &str,
        target_id: &str,
        strategy: MergeStrategy,
        actor: &str,
    ) -> Result<Attempt, MergeError> {
        if source_id == target_id {
            return Err(cycle(source_id, target_id));
        }

        // Unbounded walk: a truncated chain could hide the source
        let chain = self.resolver.full_chain(target_id);
        if chain.iter().any(|id| id == source_id) {
            return Err(cycle(source_id, target_id));
        }
        let canonical_id = chain.last().map(String::as_str).unwrap_or(target_id);

        if let Some(existing) = self.store.active_redirect_from(source_id)? {
            return Err(already_merged(source_id, existing.to_id));
        }

        let source = self.live_entity(source_id)?;
        let target = self.live_entity(canonical_id)?;

        if source.entity_type != target.entity_type {
            return Err(MergeError::TypeMismatch {
                source_type: source.entity_type.to_string(),
                target_type: target.entity_type.to_string(),
            });
        }

        let source_blocks = self.store.content_blocks(&source.id)?;
        let target_blocks = self.store.content_blocks(&target.id)?;
        let blocks = apply_strategy(strategy, &source_blocks, &target_blocks);

        let redirect = Redirect::new(
            source.entity_type,
            &source.id,
            &source.slug,
            &target.id,
            &target.slug,
            actor,
        );

        let event = Event::new(
            EVENT_ENTITY_MERGED,
            source.entity_type.as_str(),
            &source.id,
            serde_json::json!({
                "redirect_id": redirect.id,
                "from_id": source.id,
                "to_id": target.id,
                "requested_target_id": target_id,
                "strategy": strategy.as_str(),
                "source_status": source.status.as_str(),
                "target_blocks_before": content_fingerprint(&target_blocks),
                "target_blocks_after": content_fingerprint(&blocks),
            }),
            actor,
        );

        let commit = MergeCommit::new(redirect, blocks, event).expecting(&source_blocks, &target_blocks);

        match self.store.commit_merge(&commit) {
            Ok(()) => {}
            Err(StoreError::AlreadyRedirected(_)) => {
                // Lost a race with another merge of the same source
                let to_id = self
                    .store
                    .active_redirect_from(source_id)?
                    .map(|r| r.to_id)
                    .unwrap_or_default();
                return Err(already_merged(source_id, to_id));
            }
            Err(e @ (StoreError::Conflict(_) | StoreError::Archived(_))) => {
                return Ok(Attempt::Retry(e));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            source = %source.id,
            target = %target.id,
            strategy = %strategy,
            actor = %actor,
            redirect = %commit.redirect.id,
            "entities merged"
        );

        let target = self
            .store
            .get_entity(&target.id)?
            .ok_or_else(|| MergeError::NotFound { id: target.id.clone() })?;

        let MergeCommit {
            redirect,
            target_blocks,
            ..
        } = commit;

        Ok(Attempt::Done(MergeResult {
            redirect_id: redirect.id.clone(),
            redirect,
            requested_target_id: target_id.to_string(),
            target,
            blocks: target_blocks,
        }))
    }

    fn live_entity(&self, id: &str) -> Result<EntitySnapshot, MergeError> {
        let entity = self
            .store
            .get_entity(id)?
            .ok_or_else(|| MergeError::NotFound { id: id.to_string() })?;

        if entity.is_archived() {
            return Err(MergeError::Archived { id: id.to_string() });
        }
        Ok(entity)
    }
}

fn already_merged(source_id: &str, target_id: String) -> MergeError {
    MergeError::AlreadyMerged {
        source_id: source_id.to_string(),
        target_id,
    }
}

fn cycle(source_id: &str, target_id: &str) -> MergeError {
    MergeError::Cycle {
        source_id: source_id.to_string(),
        target_id: target_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deduplication::PairKey;
    use crate::entity::{EntityStatus, EntityType};
    use crate::error::StoreResult;
    use crate::memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn block(body: &str) -> ContentBlock {
        ContentBlock::new("body", body)
    }

    fn bodies(blocks: &[ContentBlock]) -> Vec<&str> {
        blocks.iter().map(|b| b.body.as_str()).collect()
    }

    fn setup() -> (Arc<MemoryStore>, MergeExecutor) {
        let store = Arc::new(MemoryStore::new());
        for (id, name, body) in [
            ("a", "Burj Kalifa", "source text"),
            ("b", "Burj Khalifa", "target text"),
            ("c", "Burj Khalifa Tower", "third text"),
        ] {
            store.insert_with_blocks(
                EntitySnapshot::new(id, EntityType::Attraction, name),
                vec![block(body)],
            ).unwrap();
        }
        let executor = MergeExecutor::new(store.clone());
        (store, executor)
    }

    #[test]
    fn test_apply_strategy() {
        let source = vec![block("S")];
        let target = vec![block("T")];

        assert_eq!(bodies(&apply_strategy(MergeStrategy::MergeContent, &source, &target)), vec!["T", "S"]);
        assert_eq!(bodies(&apply_strategy(MergeStrategy::KeepTarget, &source, &target)), vec!["T"]);
        assert_eq!(bodies(&apply_strategy(MergeStrategy::KeepSource, &source, &target)), vec!["S"]);
    }

    #[test]
    fn test_merge_content_preserves_order() {
        let source = vec![block("S1"), block("S2")];
        let target = vec![block("T1"), block("T2")];

        let merged = apply_strategy(MergeStrategy::MergeContent, &source, &target);
        assert_eq!(bodies(&merged), vec!["T1", "T2", "S1", "S2"]);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("merge_content".parse::<MergeStrategy>().unwrap(), MergeStrategy::MergeContent);
        assert!(matches!(
            "smash".parse::<MergeStrategy>(),
            Err(ValidationError::UnknownStrategy(_))
        ));
    }

    #[test]
    fn test_fingerprint_depends_on_order() {
        let a = block("one");
        let b = block("two");

        assert_eq!(content_fingerprint(&[a.clone(), b.clone()]).len(), 64);
        assert_ne!(content_fingerprint(&[a.clone(), b.clone()]), content_fingerprint(&[b, a]));
    }

    #[test]
    fn test_merge_happy_path() {
        let (store, executor) = setup();

        let result = executor.merge("a", "b", MergeStrategy::MergeContent, "editor").unwrap();

        assert_eq!(result.redirect.from_id, "a");
        assert_eq!(result.redirect.to_id, "b");
        assert_eq!(result.redirect.from_slug, "burj-kalifa");
        assert_eq!(result.redirect.merged_by, "editor");
        assert_eq!(result.redirect_id, result.redirect.id);
        assert_eq!(result.target.id, "b");
        assert_eq!(result.requested_target_id, "b");
        assert_eq!(bodies(&result.blocks), vec!["target text", "source text"]);

        assert!(store.get_entity("a").unwrap().unwrap().is_archived());
        assert_eq!(bodies(&store.content_blocks("b").unwrap()), vec!["target text", "source text"]);

        let events = store.events_for_entity("attraction", "a").unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].data["strategy"], "merge_content");
    }

    #[test]
    fn test_keep_source_overwrites_target() {
        let (store, executor) = setup();

        executor.merge("a", "b", MergeStrategy::KeepSource, "editor").unwrap();
        assert_eq!(bodies(&store.content_blocks("b").unwrap()), vec!["source text"]);
    }

    #[test]
    fn test_keep_target_discards_source() {
        let (store, executor) = setup();

        executor.merge("a", "b", MergeStrategy::KeepTarget, "editor").unwrap();
        assert_eq!(bodies(&store.content_blocks("b").unwrap()), vec!["target text"]);
    }

    #[test]
    fn test_self_merge_is_cycle() {
        let (_, executor) = setup();

        let err = executor.merge("a", "a", MergeStrategy::KeepTarget, "editor").unwrap_err();
        assert!(matches!(err, MergeError::Cycle { .. }));
    }

    #[test]
    fn test_merge_twice_is_already_merged() {
        let (_, executor) = setup();

        executor.merge("a", "b", MergeStrategy::KeepTarget, "editor").unwrap();
        let err = executor.merge("a", "c", MergeStrategy::KeepTarget, "editor").unwrap_err();

        match err {
            MergeError::AlreadyMerged { source_id, target_id } => {
                assert_eq!(source_id, "a");
                assert_eq!(target_id, "b");
            }
            other => panic!("expected AlreadyMerged, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_back_is_cycle() {
        let (_, executor) = setup();

        executor.merge("b", "a", MergeStrategy::KeepTarget, "editor").unwrap();
        let err = executor.merge("a", "b", MergeStrategy::KeepTarget, "editor").unwrap_err();

        assert!(matches!(err, MergeError::Cycle { .. }));
    }

    #[test]
    fn test_transitive_cycle_detected() {
        let (_, executor) = setup();

        // c → b, b → a; merging a into c would close the loop
        executor.merge("c", "b", MergeStrategy::KeepTarget, "editor").unwrap();
        executor.merge("b", "a", MergeStrategy::KeepTarget, "editor").unwrap();

        let err = executor.merge("a", "c", MergeStrategy::KeepTarget, "editor").unwrap_err();
        assert_eq!(err.code(), "cycle");
    }

    #[test]
    fn test_merge_into_redirected_target_uses_canonical() {
        let (store, executor) = setup();

        executor.merge("b", "c", MergeStrategy::MergeContent, "editor").unwrap();
        let result = executor.merge("a", "b", MergeStrategy::MergeContent, "editor").unwrap();

        assert_eq!(result.redirect.to_id, "c");
        assert_eq!(result.requested_target_id, "b");
        assert_eq!(result.target.id, "c");
        assert_eq!(
            bodies(&store.content_blocks("c").unwrap()),
            vec!["third text", "target text", "source text"]
        );
    }

    #[test]
    fn test_missing_entities() {
        let (_, executor) = setup();

        let err = executor.merge("ghost", "b", MergeStrategy::KeepTarget, "editor").unwrap_err();
        assert!(matches!(err, MergeError::NotFound { ref id } if id == "ghost"));

        let err = executor.merge("a", "ghost", MergeStrategy::KeepTarget, "editor").unwrap_err();
        assert!(matches!(err, MergeError::NotFound { ref id } if id == "ghost"));
    }

    #[test]
    fn test_archived_source_rejected() {
        let (store, executor) = setup();
        store.upsert_entity(
            EntitySnapshot::new("old", EntityType::Attraction, "Old Page").with_status(EntityStatus::Archived),
        ).unwrap();

        let err = executor.merge("old", "b", MergeStrategy::KeepTarget, "editor").unwrap_err();
        assert!(matches!(err, MergeError::Archived { ref id } if id == "old"));

        let err = executor.merge("a", "old", MergeStrategy::KeepTarget, "editor").unwrap_err();
        assert!(matches!(err, MergeError::Archived { .. }));
    }

    #[test]
    fn test_cross_type_merge_rejected() {
        let (store, executor) = setup();
        store.upsert_entity(EntitySnapshot::new("h", EntityType::Hotel, "Burj Khalifa")).unwrap();

        let err = executor.merge("h", "b", MergeStrategy::KeepTarget, "editor").unwrap_err();
        assert!(matches!(err, MergeError::TypeMismatch { .. }));
    }

    #[test]
    fn test_failed_merge_writes_nothing() {
        let (store, executor) = setup();

        let _ = executor.merge("a", "ghost", MergeStrategy::KeepSource, "editor");

        assert!(!store.get_entity("a").unwrap().unwrap().is_archived());
        assert!(store.list_redirects(None).unwrap().is_empty());
        assert!(store.events_for_entity("attraction", "a").unwrap().is_empty());
    }

    // ========================================================================
    // CONCURRENT MERGES
    // ========================================================================

    /// Holds the first two commits until both merges have read their state
    struct GatedStore {
        inner: Arc<MemoryStore>,
        gate: Barrier,
        commits: AtomicUsize,
    }

    impl GatedStore {
        fn wrap(inner: Arc<MemoryStore>) -> Arc<Self> {
            Arc::new(GatedStore {
                inner,
                gate: Barrier::new(2),
                commits: AtomicUsize::new(0),
            })
        }
    }

    impl EntityStore for GatedStore {
        fn list_entities_by_type(&self, entity_type: EntityType) -> StoreResult<Vec<EntitySnapshot>> {
            self.inner.list_entities_by_type(entity_type)
        }

        fn get_entity(&self, id: &str) -> StoreResult<Option<EntitySnapshot>> {
            self.inner.get_entity(id)
        }

        fn archive_entity(&self, id: &str) -> StoreResult<()> {
            self.inner.archive_entity(id)
        }

        fn restore_entity(&self, id: &str) -> StoreResult<()> {
            self.inner.restore_entity(id)
        }

        fn content_blocks(&self, id: &str) -> StoreResult<Vec<ContentBlock>> {
            self.inner.content_blocks(id)
        }

        fn apply_content_blocks(&self, id: &str, blocks: &[ContentBlock]) -> StoreResult<()> {
            self.inner.apply_content_blocks(id, blocks)
        }

        fn active_redirect_from(&self, from_id: &str) -> StoreResult<Option<Redirect>> {
            self.inner.active_redirect_from(from_id)
        }

        fn get_redirect(&self, redirect_id: &str) -> StoreResult<Option<Redirect>> {
            self.inner.get_redirect(redirect_id)
        }

        fn list_redirects(&self, entity_type: Option<EntityType>) -> StoreResult<Vec<Redirect>> {
            self.inner.list_redirects(entity_type)
        }

        fn redirects_touching(&self, entity_id: &str) -> StoreResult<Vec<Redirect>> {
            self.inner.redirects_touching(entity_id)
        }

        fn commit_merge(&self, commit: &MergeCommit) -> StoreResult<()> {
            if self.commits.fetch_add(1, Ordering::SeqCst) < 2 {
                self.gate.wait();
            }
            self.inner.commit_merge(commit)
        }

        fn commit_undo(&self, redirect_id: &str, actor: &str) -> StoreResult<Option<Redirect>> {
            self.inner.commit_undo(redirect_id, actor)
        }

        fn record_event(&self, event: &Event) -> StoreResult<()> {
            self.inner.record_event(event)
        }

        fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>> {
            self.inner.events_for_entity(entity_type, entity_id)
        }

        fn dismiss_pair(&self, key: &PairKey, actor: &str) -> StoreResult<()> {
            self.inner.dismiss_pair(key, actor)
        }

        fn dismissed_pairs(&self) -> StoreResult<Vec<PairKey>> {
            self.inner.dismissed_pairs()
        }
    }

    fn race(
        store: Arc<MemoryStore>,
        first: (&'static str, &'static str),
        second: (&'static str, &'static str),
    ) -> Vec<Result<MergeResult, MergeError>> {
        let executor = MergeExecutor::new(GatedStore::wrap(store));

        let handles: Vec<_> = [first, second]
            .into_iter()
            .map(|(from, to)| {
                let executor = executor.clone();
                thread::spawn(move || executor.merge(from, to, MergeStrategy::MergeContent, "editor"))
            })
            .collect();

        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_opposite_merges_cannot_both_land() {
        let (store, _) = setup();

        let results = race(store.clone(), ("a", "b"), ("b", "a"));

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .any(|r| matches!(r, Err(MergeError::Cycle { .. }))));

        let active = store.list_redirects(None).unwrap().into_iter().filter(|r| r.is_active()).count();
        assert_eq!(active, 1);

        let resolver = RedirectResolver::new(store.clone());
        assert_eq!(resolver.resolve("a"), resolver.resolve("b"));
    }

    #[test]
    fn test_chained_merges_keep_all_content() {
        let (store, _) = setup();

        let results = race(store.clone(), ("a", "b"), ("b", "c"));

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(RedirectResolver::new(store.clone()).resolve("a"), "c");
        assert_eq!(
            bodies(&store.content_blocks("c").unwrap()),
            vec!["third text", "target text", "source text"]
        );
        assert!(store.get_entity("b").unwrap().unwrap().is_archived());
    }
}
