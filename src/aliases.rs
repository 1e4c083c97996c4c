// 🏷️ Alias Matcher - curated spelling variants and nicknames
//
// "The Palm", "Palm Island", "Palm Jumeirah" → one canonical group.
// Alias equivalence is independent of edit distance.
//
// The table is an immutable value injected into the detector. It is built
// once (defaults, JSON file or test fixture) and never edited at runtime.

use crate::normalize::normalize;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

// ============================================================================
// ALIAS GROUP
// ============================================================================

/// One canonical name and its known alternate spellings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasGroup {
    pub canonical: String,
    pub aliases: Vec<String>,
}

impl AliasGroup {
    pub fn new(canonical: &str, aliases: &[&str]) -> Self {
        AliasGroup {
            canonical: canonical.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Canonical name + aliases
    pub fn all_names(&self) -> Vec<String> {
        let mut names = vec![self.canonical.clone()];
        names.extend(self.aliases.clone());
        names
    }
}

// ============================================================================
// ALIAS TABLE
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    groups: Vec<AliasGroup>,

    /// normalized name → index into `groups`
    index: HashMap<String, usize>,
}

impl AliasTable {
    /// Create an empty table (no name ever alias-matches)
    pub fn new() -> Self {
        AliasTable::default()
    }

    /// Build a table from groups. A name listed in two groups keeps the first.
    pub fn from_groups(groups: Vec<AliasGroup>) -> Self {
        let mut index: HashMap<String, usize> = HashMap::new();

        for (group_idx, group) in groups.iter().enumerate() {
            for name in group.all_names() {
                let key = normalize(&name);
                if key.is_empty() {
                    continue;
                }

                match index.get(&key) {
                    Some(&existing) if existing != group_idx => {
                        tracing::warn!(
                            alias = %name,
                            first = %groups[existing].canonical,
                            second = %group.canonical,
                            "alias listed in two groups, keeping first"
                        );
                    }
                    Some(_) => {}
                    None => {
                        index.insert(key, group_idx);
                    }
                }
            }
        }

        AliasTable { groups, index }
    }

    /// Table with the curated travel aliases pre-loaded
    pub fn with_defaults() -> Self {
        AliasTable::from_groups(vec![
            AliasGroup::new(
                "Palm Jumeirah",
                &["The Palm", "Palm Island", "The Palm Jumeirah", "Palm Jumeira"],
            ),
            AliasGroup::new("Burj Khalifa", &["Burj Dubai", "Khalifa Tower"]),
            AliasGroup::new("Dubai Mall", &["The Dubai Mall"]),
            AliasGroup::new(
                "Sheikh Zayed Grand Mosque",
                &["Grand Mosque Abu Dhabi", "Sheikh Zayed Mosque"],
            ),
            AliasGroup::new("Burj Al Arab", &["Burj Al-Arab", "Burj al Arab Jumeirah"]),
            AliasGroup::new("Dubai Marina", &["The Marina", "Marsa Dubai"]),
            AliasGroup::new("Deira", &["Old Dubai"]),
            AliasGroup::new("Abu Dhabi", &["Abu Dabi", "Abudhabi"]),
            AliasGroup::new("Ras Al Khaimah", &["RAK", "Ras al-Khaimah"]),
            AliasGroup::new("Jumeirah Beach Residence", &["JBR", "The Walk JBR"]),
            AliasGroup::new("Downtown Dubai", &["Downtown Burj Khalifa"]),
        ])
    }

    /// Load groups from a JSON object: `{ "Canonical": ["alias", ...], ... }`
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        let raw: BTreeMap<String, Vec<String>> = serde_json::from_str(json)?;

        let groups = raw
            .into_iter()
            .map(|(canonical, aliases)| AliasGroup { canonical, aliases })
            .collect();

        Ok(AliasTable::from_groups(groups))
    }

    /// Load groups from a JSON file (see `from_json_str`)
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        use anyhow::Context;

        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read alias file {}", path.display()))?;
        let table = AliasTable::from_json_str(&json)
            .with_context(|| format!("Failed to parse alias file {}", path.display()))?;

        tracing::info!(groups = table.len(), path = %path.display(), "alias table loaded");
        Ok(table)
    }

    /// Canonical group a name belongs to, if any
    pub fn group_of(&self, name: &str) -> Option<&AliasGroup> {
        self.index
            .get(&normalize(name))
            .map(|&idx| &self.groups[idx])
    }

    /// Canonical name for a (possibly aliased) name
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.group_of(name).map(|g| g.canonical.as_str())
    }

    /// True when both names sit in the same canonical group but are not
    /// literally the same normalized string
    pub fn is_alias_match(&self, name_a: &str, name_b: &str) -> bool {
        let a = normalize(name_a);
        let b = normalize(name_b);

        if a == b {
            return false;
        }

        match (self.index.get(&a), self.index.get(&b)) {
            (Some(ga), Some(gb)) => ga == gb,
            _ => false,
        }
    }

    pub fn groups(&self) -> &[AliasGroup] {
        &self.groups
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palm_aliases_match() {
        let table = AliasTable::with_defaults();

        assert!(table.is_alias_match("The Palm", "Palm Jumeirah"));
        assert!(table.is_alias_match("Palm Jumeirah", "The Palm"));
        assert!(table.is_alias_match("palm island", "THE PALM"));
    }

    #[test]
    fn test_identical_names_are_not_alias_matches() {
        let table = AliasTable::with_defaults();

        assert!(!table.is_alias_match("The Palm", "the palm"));
        assert!(!table.is_alias_match("Palm Jumeirah", "Palm Jumeirah!"));
    }

    #[test]
    fn test_different_groups_do_not_match() {
        let table = AliasTable::with_defaults();

        assert!(!table.is_alias_match("The Palm", "Burj Dubai"));
        assert!(!table.is_alias_match("The Palm", "Louvre"));
        assert!(!table.is_alias_match("Louvre", "Musée du Louvre"));
    }

    #[test]
    fn test_matching_ignores_quotes_and_case() {
        let table = AliasTable::with_defaults();
        assert!(table.is_alias_match("The \u{201C}Marina\u{201D}", "DUBAI MARINA"));
    }

    #[test]
    fn test_canonical_name_lookup() {
        let table = AliasTable::with_defaults();

        assert_eq!(table.canonical_name("burj dubai"), Some("Burj Khalifa"));
        assert_eq!(table.canonical_name("Burj Khalifa"), Some("Burj Khalifa"));
        assert_eq!(table.canonical_name("Eiffel Tower"), None);
    }

    #[test]
    fn test_empty_table_never_matches() {
        let table = AliasTable::new();
        assert!(table.is_empty());
        assert!(!table.is_alias_match("The Palm", "Palm Jumeirah"));
    }

    #[test]
    fn test_substitute_table() {
        let table = AliasTable::from_groups(vec![AliasGroup::new(
            "Eiffel Tower",
            &["La Tour Eiffel"],
        )]);

        assert!(table.is_alias_match("la tour eiffel", "Eiffel Tower"));
        assert!(!table.is_alias_match("The Palm", "Palm Jumeirah"));
    }

    #[test]
    fn test_duplicate_alias_keeps_first_group() {
        let table = AliasTable::from_groups(vec![
            AliasGroup::new("Old Town", &["Centre"]),
            AliasGroup::new("City Centre", &["Centre"]),
        ]);

        assert_eq!(table.canonical_name("centre"), Some("Old Town"));
        assert!(table.is_alias_match("Centre", "Old Town"));
        assert!(!table.is_alias_match("Centre", "City Centre"));
    }

    #[test]
    fn test_from_json_str() {
        let table = AliasTable::from_json_str(
            r#"{ "Colosseum": ["Colosseo", "Flavian Amphitheatre"] }"#,
        )
        .unwrap();

        assert_eq!(table.len(), 1);
        assert!(table.is_alias_match("Colosseo", "Flavian Amphitheatre"));
    }

    #[test]
    fn test_from_json_str_rejects_bad_shape() {
        assert!(AliasTable::from_json_str(r#"["not", "a", "map"]"#).is_err());
    }
}
