// 🔍 Duplicate Detector - find probable duplicate entities of one type
// Five match types, checked in priority order per unordered pair:
// exact name → same slug → alias → same location + similar name → fuzzy name
//
// Detection is pure and read-only. Pairs are ephemeral: recomputed on every
// scan, never persisted. Only operator dismissals (see `Dismissals`) are
// stored, and they are layered on top of detection output.

use crate::aliases::AliasTable;
use crate::config::DetectorThresholds;
use crate::entity::{EntitySnapshot, EntityStatus, EntityType};
use crate::normalize::normalize;
use crate::similarity::normalized_similarity;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

// ============================================================================
// MATCH TYPE / CONFIDENCE / ACTION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Same normalized name
    ExactName,

    /// Names within edit-distance threshold
    FuzzyName,

    /// Identical slug, different names
    SameSlug,

    /// Same location and similar names
    SameLocationName,

    /// Names in the same curated alias group
    AliasMatch,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchType::ExactName => "exact_name",
            MatchType::FuzzyName => "fuzzy_name",
            MatchType::SameSlug => "same_slug",
            MatchType::SameLocationName => "same_location_name",
            MatchType::AliasMatch => "alias_match",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Merge,
    Review,

    /// Only ever set by an operator dismissal, never by detection
    Ignore,
}

// ============================================================================
// DUPLICATE PAIR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicatePair {
    /// Entity with the lexicographically smaller id
    pub entity_a: EntitySnapshot,

    pub entity_b: EntitySnapshot,

    pub match_type: MatchType,

    /// Name similarity (0.0 - 1.0)
    pub similarity: f64,

    pub confidence: Confidence,

    pub suggested_action: SuggestedAction,

    /// Human-readable justifications, match-type reason first
    pub reasons: Vec<String>,
}

impl DuplicatePair {
    /// Unordered key for this pair
    pub fn key(&self) -> PairKey {
        PairKey::new(&self.entity_a.id, &self.entity_b.id)
    }
}

/// Order-independent identity of a pair: always (smaller id, larger id)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PairKey(pub String, pub String);

impl PairKey {
    pub fn new(a: &str, b: &str) -> Self {
        if a <= b {
            PairKey(a.to_string(), b.to_string())
        } else {
            PairKey(b.to_string(), a.to_string())
        }
    }
}

// ============================================================================
// DUPLICATE DETECTOR
// ============================================================================

/// Entity plus its normalized name, computed once per scan
struct Candidate<'a> {
    entity: &'a EntitySnapshot,
    name: String,
    location: Option<String>,
}

pub struct DuplicateDetector {
    thresholds: DetectorThresholds,
    aliases: Arc<AliasTable>,
}

impl DuplicateDetector {
    /// Create detector with default thresholds and the curated alias table
    pub fn new() -> Self {
        DuplicateDetector {
            thresholds: DetectorThresholds::default(),
            aliases: Arc::new(AliasTable::with_defaults()),
        }
    }

    pub fn with_config(thresholds: DetectorThresholds, aliases: Arc<AliasTable>) -> Self {
        DuplicateDetector { thresholds, aliases }
    }

    pub fn thresholds(&self) -> &DetectorThresholds {
        &self.thresholds
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    /// Find all duplicate pairs among entities of one type
    ///
    /// Pairs of different types are skipped, so a mixed list is safe but
    /// never yields cross-type pairs. Output is sorted by (a.id, b.id).
    pub fn detect(&self, entities: &[EntitySnapshot]) -> Vec<DuplicatePair> {
        if entities.len() < 2 {
            return Vec::new();
        }

        let candidates = Self::prepare(entities);
        let mut pairs = Vec::new();

        for i in 0..candidates.len() {
            for j in (i + 1)..candidates.len() {
                if let Some(pair) = self.compare(&candidates[i], &candidates[j]) {
                    pairs.push(pair);
                }
            }
        }

        tracing::debug!(entities = entities.len(), pairs = pairs.len(), "duplicate scan complete");
        pairs
    }

    /// Same result as `detect`, with the outer loop spread over the rayon pool
    pub fn detect_parallel(&self, entities: &[EntitySnapshot]) -> Vec<DuplicatePair> {
        if entities.len() < 2 {
            return Vec::new();
        }

        let prepared = Self::prepare(entities);
        let candidates = &prepared;
        let detector = self;

        let pairs: Vec<DuplicatePair> = (0..candidates.len())
            .into_par_iter()
            .flat_map_iter(move |i| {
                ((i + 1)..candidates.len())
                    .filter_map(move |j| detector.compare(&candidates[i], &candidates[j]))
            })
            .collect();

        tracing::debug!(entities = entities.len(), pairs = pairs.len(), "parallel duplicate scan complete");
        pairs
    }

    /// Partition a mixed list by entity type and scan each type separately
    pub fn detect_all(&self, entities: &[EntitySnapshot]) -> BTreeMap<EntityType, Vec<DuplicatePair>> {
        let mut by_type: BTreeMap<EntityType, Vec<EntitySnapshot>> = BTreeMap::new();
        for entity in entities {
            by_type
                .entry(entity.entity_type)
                .or_default()
                .push(entity.clone());
        }

        by_type
            .into_iter()
            .map(|(entity_type, group)| (entity_type, self.detect(&group)))
            .collect()
    }

    /// Sort by id and drop repeated ids so each unordered pair is visited once
    fn prepare(entities: &[EntitySnapshot]) -> Vec<Candidate<'_>> {
        let mut sorted: Vec<&EntitySnapshot> = entities.iter().collect();
        sorted.sort_by(|a, b| a.id.cmp(&b.id));
        sorted.dedup_by(|a, b| a.id == b.id);

        sorted
            .into_iter()
            .map(|entity| Candidate {
                entity,
                name: normalize(&entity.name),
                location: entity.location().map(normalize).filter(|l| !l.is_empty()),
            })
            .collect()
    }

    /// Classify one pair. `a.id < b.id` is guaranteed by `prepare`.
    fn compare(&self, a: &Candidate<'_>, b: &Candidate<'_>) -> Option<DuplicatePair> {
        if a.entity.entity_type != b.entity.entity_type {
            return None;
        }

        let (match_type, similarity) = self.classify(a, b)?;
        let confidence = self.confidence(match_type, similarity);
        let status_pair = is_draft_published(a.entity.status, b.entity.status);
        let suggested_action = self.suggested_action(match_type, similarity, status_pair);

        let mut reasons = vec![self.match_reason(match_type, similarity, a, b)];
        if status_pair {
            reasons.push(status_reason(a.entity, b.entity));
        }

        Some(DuplicatePair {
            entity_a: a.entity.clone(),
            entity_b: b.entity.clone(),
            match_type,
            similarity,
            confidence,
            suggested_action,
            reasons,
        })
    }

    fn classify(&self, a: &Candidate<'_>, b: &Candidate<'_>) -> Option<(MatchType, f64)> {
        // 1. Exact normalized name
        if a.name == b.name {
            return Some((MatchType::ExactName, 1.0));
        }

        // 2. Same slug
        if a.entity.slug == b.entity.slug {
            return Some((MatchType::SameSlug, 1.0));
        }

        let similarity = normalized_similarity(&a.name, &b.name);

        // 3. Curated alias (similarity is informational only)
        if self.aliases.is_alias_match(&a.name, &b.name) {
            return Some((MatchType::AliasMatch, similarity));
        }

        // 4. Same location + similar name
        if let (Some(loc_a), Some(loc_b)) = (&a.location, &b.location) {
            let same_location = loc_a == loc_b
                || normalized_similarity(loc_a, loc_b) >= self.thresholds.location_match;

            if same_location && similarity >= self.thresholds.location_name {
                return Some((MatchType::SameLocationName, similarity));
            }
        }

        // 5. Fuzzy name
        if similarity >= self.thresholds.fuzzy_name {
            return Some((MatchType::FuzzyName, similarity));
        }

        None
    }

    fn confidence(&self, match_type: MatchType, similarity: f64) -> Confidence {
        match match_type {
            MatchType::ExactName | MatchType::SameSlug | MatchType::AliasMatch => Confidence::High,
            MatchType::SameLocationName => {
                if similarity >= self.thresholds.location_high {
                    Confidence::High
                } else {
                    Confidence::Medium
                }
            }
            MatchType::FuzzyName => {
                if similarity >= self.thresholds.fuzzy_high {
                    Confidence::High
                } else if similarity >= self.thresholds.fuzzy_medium {
                    Confidence::Medium
                } else {
                    Confidence::Low
                }
            }
        }
    }

    /// First matching rule wins
    fn suggested_action(&self, match_type: MatchType, similarity: f64, status_pair: bool) -> SuggestedAction {
        if status_pair {
            return SuggestedAction::Merge;
        }

        let merge = match match_type {
            MatchType::ExactName | MatchType::SameSlug | MatchType::AliasMatch => true,
            MatchType::SameLocationName => similarity >= self.thresholds.location_high,
            MatchType::FuzzyName => similarity >= self.thresholds.fuzzy_high,
        };

        if merge {
            SuggestedAction::Merge
        } else {
            SuggestedAction::Review
        }
    }

    fn match_reason(&self, match_type: MatchType, similarity: f64, a: &Candidate<'_>, b: &Candidate<'_>) -> String {
        match match_type {
            MatchType::ExactName => format!(
                "Exact name match: \"{}\" and \"{}\"",
                a.entity.name, b.entity.name
            ),
            MatchType::SameSlug => format!("Same slug: {}", a.entity.slug),
            MatchType::AliasMatch => format!(
                "Known aliases of \"{}\": \"{}\" and \"{}\"",
                self.aliases.canonical_name(&a.name).unwrap_or(&a.entity.name),
                a.entity.name,
                b.entity.name
            ),
            MatchType::SameLocationName => format!(
                "Same location ({}) with {:.0}% similar names",
                a.entity.location().unwrap_or_default(),
                similarity * 100.0
            ),
            MatchType::FuzzyName => format!(
                "Similar names: \"{}\" ≈ \"{}\" ({:.0}% similar)",
                a.entity.name,
                b.entity.name,
                similarity * 100.0
            ),
        }
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new()
    }
}

fn is_draft_published(a: EntityStatus, b: EntityStatus) -> bool {
    matches!(
        (a, b),
        (EntityStatus::Draft, EntityStatus::Published) | (EntityStatus::Published, EntityStatus::Draft)
    )
}

fn status_reason(a: &EntitySnapshot, b: &EntitySnapshot) -> String {
    let (draft, published) = if a.status == EntityStatus::Draft {
        (a, b)
    } else {
        (b, a)
    };

    format!(
        "Draft \"{}\" duplicates published \"{}\"",
        draft.name, published.name
    )
}

// ============================================================================
// DISMISSALS (operator-set "ignore")
// ============================================================================

/// Pairs an operator has explicitly dismissed
#[derive(Debug, Clone, Default)]
pub struct Dismissals {
    keys: HashSet<PairKey>,
}

impl Dismissals {
    pub fn new() -> Self {
        Dismissals::default()
    }

    pub fn from_keys(keys: impl IntoIterator<Item = PairKey>) -> Self {
        Dismissals {
            keys: keys.into_iter().collect(),
        }
    }

    pub fn dismiss(&mut self, a: &str, b: &str) {
        self.keys.insert(PairKey::new(a, b));
    }

    pub fn is_dismissed(&self, a: &str, b: &str) -> bool {
        self.keys.contains(&PairKey::new(a, b))
    }

    /// Mark dismissed pairs as `Ignore`, leaving everything else untouched
    pub fn annotate(&self, pairs: Vec<DuplicatePair>) -> Vec<DuplicatePair> {
        pairs
            .into_iter()
            .map(|mut pair| {
                if self.keys.contains(&pair.key()) {
                    pair.suggested_action = SuggestedAction::Ignore;
                    pair.reasons.push("Dismissed by an operator".to_string());
                }
                pair
            })
            .collect()
    }
}

// ============================================================================
// DETECTION SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectionSummary {
    pub total_pairs: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub merge: usize,
    pub review: usize,
    pub ignore: usize,
}

impl DetectionSummary {
    pub fn from_pairs(pairs: &[DuplicatePair]) -> Self {
        let mut summary = DetectionSummary {
            total_pairs: pairs.len(),
            ..Default::default()
        };

        for pair in pairs {
            match pair.confidence {
                Confidence::High => summary.high += 1,
                Confidence::Medium => summary.medium += 1,
                Confidence::Low => summary.low += 1,
            }
            match pair.suggested_action {
                SuggestedAction::Merge => summary.merge += 1,
                SuggestedAction::Review => summary.review += 1,
                SuggestedAction::Ignore => summary.ignore += 1,
            }
        }

        summary
    }

    pub fn summary(&self) -> String {
        format!(
            "{} pairs ({} high, {} medium, {} low) → {} merge, {} review, {} ignored",
            self.total_pairs, self.high, self.medium, self.low, self.merge, self.review, self.ignore
        )
    }
}

// ============================================================================
// TESTS
// ============================================================================
