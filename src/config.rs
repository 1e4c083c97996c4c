// ⚙️ Configuration - detector thresholds, redirect depth, file locations
//
// Library callers use `CanonConfig::default()` and override fields directly.
// Binaries call `CanonConfig::from_env()` which also reads `.env`.

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Default hop limit for redirect resolution
pub const DEFAULT_MAX_REDIRECT_DEPTH: usize = 5;

// ============================================================================
// DETECTOR THRESHOLDS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorThresholds {
    /// Minimum name similarity for a fuzzy_name pair (default: 0.85)
    pub fuzzy_name: f64,

    /// Minimum name similarity for a same_location_name pair (default: 0.80)
    pub location_name: f64,

    /// Minimum location similarity for two locations to count as the same (default: 0.80)
    pub location_match: f64,

    /// Fuzzy pairs at or above this are high confidence and suggested for merge (default: 0.95)
    pub fuzzy_high: f64,

    /// Fuzzy pairs at or above this are medium confidence (default: 0.90)
    pub fuzzy_medium: f64,

    /// Same-location pairs at or above this are high confidence and suggested for merge (default: 0.90)
    pub location_high: f64,
}

impl Default for DetectorThresholds {
    fn default() -> Self {
        DetectorThresholds {
            fuzzy_name: 0.85,
            location_name: 0.8,
            location_match: 0.8,
            fuzzy_high: 0.95,
            fuzzy_medium: 0.9,
            location_high: 0.9,
        }
    }
}

// ============================================================================
// CANON CONFIG
// ============================================================================

#[derive(Debug, Clone)]
pub struct CanonConfig {
    pub thresholds: DetectorThresholds,

    /// Max hops when following redirect chains (default: 5)
    pub max_redirect_depth: usize,

    /// SQLite database file (binaries only)
    pub db_path: PathBuf,

    /// Optional JSON alias file; defaults are used when absent
    pub alias_file: Option<PathBuf>,

    /// Port for the admin server
    pub port: u16,
}

impl Default for CanonConfig {
    fn default() -> Self {
        CanonConfig {
            thresholds: DetectorThresholds::default(),
            max_redirect_depth: DEFAULT_MAX_REDIRECT_DEPTH,
            db_path: PathBuf::from("entity_canon.db"),
            alias_file: None,
            port: 3000,
        }
    }
}

impl CanonConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        let defaults = CanonConfig::default();

        let mut thresholds = defaults.thresholds.clone();
        if let Ok(raw) = env::var("CANON_FUZZY_THRESHOLD") {
            thresholds.fuzzy_name = raw
                .parse()
                .context("CANON_FUZZY_THRESHOLD must be a number")?;
        }

        Ok(CanonConfig {
            thresholds,
            max_redirect_depth: match env::var("CANON_MAX_REDIRECT_DEPTH") {
                Ok(raw) => raw
                    .parse()
                    .context("CANON_MAX_REDIRECT_DEPTH must be a positive integer")?,
                Err(_) => defaults.max_redirect_depth,
            },
            db_path: env::var("CANON_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),
            alias_file: env::var("CANON_ALIAS_FILE").ok().map(PathBuf::from),
            port: env::var("CANON_PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()
                .context("CANON_PORT must be a valid number")?,
        })
    }
}
