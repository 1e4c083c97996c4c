// 🗺️ Entity Model - read-only snapshots of travel content entities
//
// Snapshots are produced by the persistence collaborator and never mutated
// by detection or merging. Identity is the opaque `id`; everything else is
// a value that can change between scans.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ENTITY TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Destination,
    Attraction,
    Hotel,
    Article,
}

impl EntityType {
    pub const ALL: [EntityType; 4] = [
        EntityType::Destination,
        EntityType::Attraction,
        EntityType::Hotel,
        EntityType::Article,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Destination => "destination",
            EntityType::Attraction => "attraction",
            EntityType::Hotel => "hotel",
            EntityType::Article => "article",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "destination" => Ok(EntityType::Destination),
            "attraction" => Ok(EntityType::Attraction),
            "hotel" => Ok(EntityType::Hotel),
            "article" => Ok(EntityType::Article),
            other => Err(ValidationError::UnknownEntityType(other.to_string())),
        }
    }
}

// ============================================================================
// ENTITY STATUS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Draft,
    Published,
    Archived,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Draft => "draft",
            EntityStatus::Published => "published",
            EntityStatus::Archived => "archived",
        }
    }
}

impl fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(EntityStatus::Draft),
            "published" => Ok(EntityStatus::Published),
            "archived" => Ok(EntityStatus::Archived),
            other => Err(ValidationError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// ENTITY SNAPSHOT
// ============================================================================

/// Read-only projection of a content entity used for comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitySnapshot {
    /// Opaque identity - NEVER changes
    pub id: String,

    #[serde(rename = "type")]
    pub entity_type: EntityType,

    pub name: String,
    pub slug: String,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_name: Option<String>,

    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EntitySnapshot {
    /// Create a published snapshot with a slug derived from the name
    pub fn new(id: &str, entity_type: EntityType, name: &str) -> Self {
        let now = Utc::now();

        EntitySnapshot {
            id: id.to_string(),
            entity_type,
            name: name.to_string(),
            slug: slugify(name),
            location_name: None,
            status: EntityStatus::Published,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_slug(mut self, slug: &str) -> Self {
        self.slug = slug.to_string();
        self
    }

    pub fn with_location(mut self, location_name: &str) -> Self {
        self.location_name = Some(location_name.to_string());
        self
    }

    pub fn with_status(mut self, status: EntityStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_archived(&self) -> bool {
        self.status == EntityStatus::Archived
    }

    /// Location name, treating blank strings as absent
    pub fn location(&self) -> Option<&str> {
        self.location_name
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
    }
}

// ============================================================================
// CONTENT BLOCKS
// ============================================================================

/// Opaque unit of entity content. Merging only chooses and orders blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentBlock {
    pub id: String,
    pub kind: String,
    pub body: String,
}

impl ContentBlock {
    pub fn new(kind: &str, body: &str) -> Self {
        ContentBlock {
            id: uuid::Uuid::new_v4().to_string(),
            kind: kind.to_string(),
            body: body.to_string(),
        }
    }
}

/// Derive a URL slug from a display name: "Burj Khalifa" → "burj-khalifa"
pub fn slugify(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_type_round_trip_str() {
        for t in EntityType::ALL {
            assert_eq!(t.as_str().parse::<EntityType>().unwrap(), t);
        }
        assert!("restaurant".parse::<EntityType>().is_err());
        assert_eq!(" Hotel ".parse::<EntityType>().unwrap(), EntityType::Hotel);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!("draft".parse::<EntityStatus>().unwrap(), EntityStatus::Draft);
        assert_eq!(
            "bogus".parse::<EntityStatus>(),
            Err(ValidationError::UnknownStatus("bogus".to_string()))
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Burj Khalifa"), "burj-khalifa");
        assert_eq!(slugify("  The Palm, Jumeirah!  "), "the-palm-jumeirah");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_blank_location_is_absent() {
        let e = EntitySnapshot::new("a", EntityType::Hotel, "Atlantis").with_location("   ");
        assert_eq!(e.location(), None);

        let e = e.with_location(" Dubai ");
        assert_eq!(e.location(), Some("Dubai"));
    }

    #[test]
    fn test_snapshot_serializes_camel_case() {
        let e = EntitySnapshot::new("d-1", EntityType::Destination, "Dubai").with_location("UAE");
        let json = serde_json::to_value(&e).unwrap();

        assert_eq!(json["type"], "destination");
        assert_eq!(json["locationName"], "UAE");
        assert!(json.get("createdAt").is_some());
    }
}
