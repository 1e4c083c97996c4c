use crate::deduplication::PairKey;
use crate::entity::{slugify, ContentBlock, EntitySnapshot, EntityStatus, EntityType};
use crate::error::{StoreError, StoreResult};
use crate::redirects::{Redirect, RedirectStatus};
use crate::store::{chain_reaches, undo_event, EntityStore, Event, MergeCommit, EVENT_PAIR_DISMISSED};
use anyhow::Context;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use serde::Deserialize;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> rusqlite::Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    // ==========================================================================
    // Entities (snapshot projection owned by the content platform)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entities (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL,
            location_name TEXT,
            status TEXT NOT NULL,
            status_before_archive TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS content_blocks (
            entity_id TEXT NOT NULL REFERENCES entities(id),
            position INTEGER NOT NULL,
            block_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY (entity_id, position)
        )",
        [],
    )?;

    // ==========================================================================
    // Redirects (never deleted; undo flips status)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS redirects (
            id TEXT PRIMARY KEY,
            entity_type TEXT NOT NULL,
            from_id TEXT NOT NULL,
            from_slug TEXT NOT NULL,
            to_id TEXT NOT NULL,
            to_slug TEXT NOT NULL,
            merged_at TEXT NOT NULL,
            merged_by TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    // ==========================================================================
    // Events Table (audit trail)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS dismissed_pairs (
            entity_a TEXT NOT NULL,
            entity_b TEXT NOT NULL,
            dismissed_by TEXT NOT NULL,
            dismissed_at TEXT NOT NULL,
            PRIMARY KEY (entity_a, entity_b)
        )",
        [],
    )?;

    // ==========================================================================
    // Indexes
    // ==========================================================================
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type)",
        [],
    )?;

    // At most one active redirect per source, enforced by the database
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_redirects_active_from
         ON redirects(from_id) WHERE status = 'active'",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_redirects_to ON redirects(to_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// ROW MAPPING
// ============================================================================

const ENTITY_COLUMNS: &str =
    "id, entity_type, name, slug, location_name, status, created_at, updated_at";

const REDIRECT_COLUMNS: &str =
    "id, entity_type, from_id, from_slug, to_id, to_slug, merged_at, merged_by, status";

/// Fixed-width RFC 3339 (microseconds, `Z`) so text order matches time order
pub fn timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_error<E>(idx: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_column<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let raw: String = row.get(idx)?;
    raw.parse().map_err(|e| conversion_error(idx, e))
}

fn time_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(idx, e))
}

fn entity_from_row(row: &Row<'_>) -> rusqlite::Result<EntitySnapshot> {
    Ok(EntitySnapshot {
        id: row.get(0)?,
        entity_type: parse_column(row, 1)?,
        name: row.get(2)?,
        slug: row.get(3)?,
        location_name: row.get(4)?,
        status: parse_column(row, 5)?,
        created_at: time_column(row, 6)?,
        updated_at: time_column(row, 7)?,
    })
}

fn redirect_from_row(row: &Row<'_>) -> rusqlite::Result<Redirect> {
    Ok(Redirect {
        id: row.get(0)?,
        entity_type: parse_column(row, 1)?,
        from_id: row.get(2)?,
        from_slug: row.get(3)?,
        to_id: row.get(4)?,
        to_slug: row.get(5)?,
        merged_at: time_column(row, 6)?,
        merged_by: row.get(7)?,
        status: parse_column(row, 8)?,
    })
}

// ============================================================================
// STATEMENT HELPERS (shared by plain calls and transactions)
// ============================================================================

fn select_entity(conn: &Connection, id: &str) -> rusqlite::Result<Option<EntitySnapshot>> {
    conn.query_row(
        &format!("SELECT {} FROM entities WHERE id = ?1", ENTITY_COLUMNS),
        [id],
        entity_from_row,
    )
    .optional()
}

fn select_active_redirect(conn: &Connection, from_id: &str) -> rusqlite::Result<Option<Redirect>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM redirects WHERE from_id = ?1 AND status = 'active'",
            REDIRECT_COLUMNS
        ),
        [from_id],
        redirect_from_row,
    )
    .optional()
}

fn select_blocks(conn: &Connection, id: &str) -> rusqlite::Result<Vec<ContentBlock>> {
    let mut stmt = conn.prepare(
        "SELECT block_id, kind, body FROM content_blocks
         WHERE entity_id = ?1
         ORDER BY position",
    )?;

    let blocks = stmt
        .query_map([id], |row| {
            Ok(ContentBlock {
                id: row.get(0)?,
                kind: row.get(1)?,
                body: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(blocks)
}

fn archive_in(conn: &Connection, id: &str) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE entities
         SET status_before_archive = CASE WHEN status = 'archived' THEN status_before_archive ELSE status END,
             status = 'archived',
             updated_at = ?2
         WHERE id = ?1",
        params![id, timestamp(&Utc::now())],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}

fn restore_in(conn: &Connection, id: &str) -> StoreResult<()> {
    let changed = conn.execute(
        "UPDATE entities
         SET status = CASE WHEN status = 'archived' THEN COALESCE(status_before_archive, 'draft') ELSE status END,
             status_before_archive = NULL,
             updated_at = ?2
         WHERE id = ?1",
        params![id, timestamp(&Utc::now())],
    )?;

    if changed == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }
    Ok(())
}

fn replace_blocks_in(conn: &Connection, id: &str, blocks: &[ContentBlock]) -> StoreResult<()> {
    let touched = conn.execute(
        "UPDATE entities SET updated_at = ?2 WHERE id = ?1",
        params![id, timestamp(&Utc::now())],
    )?;
    if touched == 0 {
        return Err(StoreError::NotFound(id.to_string()));
    }

    write_blocks_in(conn, id, blocks)
}

fn write_blocks_in(conn: &Connection, id: &str, blocks: &[ContentBlock]) -> StoreResult<()> {
    conn.execute("DELETE FROM content_blocks WHERE entity_id = ?1", [id])?;

    let mut stmt = conn.prepare(
        "INSERT INTO content_blocks (entity_id, position, block_id, kind, body)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (position, block) in blocks.iter().enumerate() {
        stmt.execute(params![id, position as i64, block.id, block.kind, block.body])?;
    }

    Ok(())
}

fn insert_redirect_in(conn: &Connection, redirect: &Redirect) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO redirects (
            id, entity_type, from_id, from_slug, to_id, to_slug, merged_at, merged_by, status
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            redirect.id,
            redirect.entity_type.as_str(),
            redirect.from_id,
            redirect.from_slug,
            redirect.to_id,
            redirect.to_slug,
            timestamp(&redirect.merged_at),
            redirect.merged_by,
            redirect.status.as_str(),
        ],
    )?;
    Ok(())
}

/// Insert event into audit trail
pub fn insert_event(conn: &Connection, event: &Event) -> StoreResult<()> {
    let data_json = serde_json::to_string(&event.data)?;

    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            timestamp(&event.timestamp),
            event.event_type,
            event.entity_type,
            event.entity_id,
            data_json,
            event.actor,
        ],
    )?;

    Ok(())
}

/// Get events for a specific entity, newest first
pub fn get_events_for_entity(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
) -> StoreResult<Vec<Event>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![entity_type, entity_id], |row| {
            let data_json: String = row.get(5)?;

            Ok(Event {
                event_id: row.get(0)?,
                timestamp: time_column(row, 1)?,
                event_type: row.get(2)?,
                entity_type: row.get(3)?,
                entity_id: row.get(4)?,
                data: serde_json::from_str(&data_json).map_err(|e| conversion_error(5, e))?,
                actor: row.get(6)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(events)
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an open connection, creating the schema if needed
    pub fn new(conn: Connection) -> StoreResult<Self> {
        setup_database(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        tracing::info!(path = %path.display(), "database opened");
        SqliteStore::new(conn)
    }

    pub fn open_in_memory() -> StoreResult<Self> {
        SqliteStore::new(Connection::open_in_memory()?)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Insert or replace an entity snapshot
    pub fn upsert_entity(&self, entity: &EntitySnapshot) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO entities (id, entity_type, name, slug, location_name, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                entity_type = excluded.entity_type,
                name = excluded.name,
                slug = excluded.slug,
                location_name = excluded.location_name,
                status = excluded.status,
                updated_at = excluded.updated_at",
            params![
                entity.id,
                entity.entity_type.as_str(),
                entity.name,
                entity.slug,
                entity.location_name,
                entity.status.as_str(),
                timestamp(&entity.created_at),
                timestamp(&entity.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Import entities with their blocks; existing ids are skipped
    pub fn insert_entities(&self, entries: &[(EntitySnapshot, Vec<ContentBlock>)]) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        let mut duplicates = 0;

        for (entity, blocks) in entries {
            let changed = tx.execute(
                "INSERT OR IGNORE INTO entities (id, entity_type, name, slug, location_name, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    entity.id,
                    entity.entity_type.as_str(),
                    entity.name,
                    entity.slug,
                    entity.location_name,
                    entity.status.as_str(),
                    timestamp(&entity.created_at),
                    timestamp(&entity.updated_at),
                ],
            )?;

            if changed == 0 {
                duplicates += 1;
                continue;
            }

            write_blocks_in(&tx, &entity.id, blocks)?;
            inserted += 1;
        }

        tx.commit()?;
        tracing::info!(inserted, duplicates, "entities imported");

        Ok(inserted)
    }

    /// Seed a redirect directly, bypassing merge checks
    pub fn insert_redirect(&self, redirect: &Redirect) -> StoreResult<()> {
        let conn = self.lock()?;
        insert_redirect_in(&conn, redirect)?;
        Ok(())
    }

    pub fn count_entities(&self) -> StoreResult<i64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM entities", [], |row| row.get(0))?;
        Ok(count)
    }
}

impl EntityStore for SqliteStore {
    fn list_entities_by_type(&self, entity_type: EntityType) -> StoreResult<Vec<EntitySnapshot>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM entities WHERE entity_type = ?1 ORDER BY id",
            ENTITY_COLUMNS
        ))?;

        let entities = stmt
            .query_map([entity_type.as_str()], entity_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entities)
    }

    fn get_entity(&self, id: &str) -> StoreResult<Option<EntitySnapshot>> {
        let conn = self.lock()?;
        Ok(select_entity(&conn, id)?)
    }

    fn archive_entity(&self, id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        archive_in(&conn, id)
    }

    fn restore_entity(&self, id: &str) -> StoreResult<()> {
        let conn = self.lock()?;
        restore_in(&conn, id)
    }

    fn content_blocks(&self, id: &str) -> StoreResult<Vec<ContentBlock>> {
        let conn = self.lock()?;
        Ok(select_blocks(&conn, id)?)
    }

    fn apply_content_blocks(&self, id: &str, blocks: &[ContentBlock]) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        replace_blocks_in(&tx, id, blocks)?;
        tx.commit()?;
        Ok(())
    }

    fn active_redirect_from(&self, from_id: &str) -> StoreResult<Option<Redirect>> {
        let conn = self.lock()?;
        Ok(select_active_redirect(&conn, from_id)?)
    }

    fn get_redirect(&self, redirect_id: &str) -> StoreResult<Option<Redirect>> {
        let conn = self.lock()?;
        let redirect = conn
            .query_row(
                &format!("SELECT {} FROM redirects WHERE id = ?1", REDIRECT_COLUMNS),
                [redirect_id],
                redirect_from_row,
            )
            .optional()?;
        Ok(redirect)
    }

    fn list_redirects(&self, entity_type: Option<EntityType>) -> StoreResult<Vec<Redirect>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM redirects
             WHERE ?1 IS NULL OR entity_type = ?1
             ORDER BY merged_at, rowid",
            REDIRECT_COLUMNS
        ))?;

        let redirects = stmt
            .query_map([entity_type.map(|t| t.as_str())], redirect_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(redirects)
    }

    fn redirects_touching(&self, entity_id: &str) -> StoreResult<Vec<Redirect>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM redirects
             WHERE from_id = ?1 OR to_id = ?1
             ORDER BY merged_at, rowid",
            REDIRECT_COLUMNS
        ))?;

        let redirects = stmt
            .query_map([entity_id], redirect_from_row)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(redirects)
    }

    fn commit_merge(&self, commit: &MergeCommit) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let redirect = &commit.redirect;

        if select_active_redirect(&tx, &redirect.from_id)?.is_some() {
            return Err(StoreError::AlreadyRedirected(redirect.from_id.clone()));
        }

        let mut archived = None;
        for id in [&redirect.from_id, &redirect.to_id] {
            match select_entity(&tx, id)? {
                None => return Err(StoreError::NotFound(id.clone())),
                Some(e) if e.is_archived() && archived.is_none() => archived = Some(id.clone()),
                Some(_) => {}
            }
        }

        let closes_cycle = chain_reaches(&redirect.to_id, &redirect.from_id, |id| {
            Ok(select_active_redirect(&tx, id)?.map(|r| r.to_id))
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

        commit.check_blocks(
            &select_blocks(&tx, &redirect.from_id)?,
            &select_blocks(&tx, &redirect.to_id)?,
        )?;

        archive_in(&tx, &redirect.from_id)?;
        replace_blocks_in(&tx, &redirect.to_id, &commit.target_blocks)?;

        match insert_redirect_in(&tx, redirect) {
            Ok(()) => {}
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                return Err(StoreError::AlreadyRedirected(redirect.from_id.clone()));
            }
            Err(e) => return Err(e.into()),
        }

        insert_event(&tx, &commit.event)?;

        // Dropping `tx` on any early return above rolls everything back
        tx.commit()?;
        Ok(())
    }

    fn commit_undo(&self, redirect_id: &str, actor: &str) -> StoreResult<Option<Redirect>> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let redirect = tx
            .query_row(
                &format!(
                    "SELECT {} FROM redirects WHERE id = ?1 AND status = 'active'",
                    REDIRECT_COLUMNS
                ),
                [redirect_id],
                redirect_from_row,
            )
            .optional()?;

        let mut redirect = match redirect {
            Some(r) => r,
            None => return Ok(None),
        };

        tx.execute(
            "UPDATE redirects SET status = ?2 WHERE id = ?1",
            params![redirect_id, RedirectStatus::Inactive.as_str()],
        )?;
        restore_in(&tx, &redirect.from_id)?;

        redirect.status = RedirectStatus::Inactive;
        insert_event(&tx, &undo_event(&redirect, actor))?;

        tx.commit()?;
        Ok(Some(redirect))
    }

    fn record_event(&self, event: &Event) -> StoreResult<()> {
        let conn = self.lock()?;
        insert_event(&conn, event)
    }

    fn events_for_entity(&self, entity_type: &str, entity_id: &str) -> StoreResult<Vec<Event>> {
        let conn = self.lock()?;
        get_events_for_entity(&conn, entity_type, entity_id)
    }

    fn dismiss_pair(&self, key: &PairKey, actor: &str) -> StoreResult<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        let inserted = tx.execute(
            "INSERT OR IGNORE INTO dismissed_pairs (entity_a, entity_b, dismissed_by, dismissed_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![key.0, key.1, actor, timestamp(&Utc::now())],
        )?;

        if inserted > 0 {
            let event = Event::new(
                EVENT_PAIR_DISMISSED,
                "pair",
                &format!("{}:{}", key.0, key.1),
                serde_json::json!({ "a": key.0, "b": key.1 }),
                actor,
            );
            insert_event(&tx, &event)?;
        }

        tx.commit()?;
        Ok(())
    }

    fn dismissed_pairs(&self) -> StoreResult<Vec<PairKey>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT entity_a, entity_b FROM dismissed_pairs ORDER BY entity_a, entity_b",
        )?;

        let keys = stmt
            .query_map([], |row| Ok(PairKey(row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(keys)
    }
}

// ============================================================================
// CSV IMPORT
// ============================================================================

/// One row of an entity export
#[derive(Debug, Deserialize)]
struct EntityRecord {
    id: String,
    #[serde(rename = "type")]
    entity_type: String,
    name: String,
    #[serde(default)]
    slug: Option<String>,
    #[serde(default)]
    location_name: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
    #[serde(default)]
    updated_at: Option<String>,
    /// Optional single body block
    #[serde(default)]
    content: Option<String>,
}

fn parse_optional_time(raw: Option<&str>, fallback: DateTime<Utc>) -> anyhow::Result<DateTime<Utc>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("Invalid timestamp: {}", s))?
            .with_timezone(&Utc)),
        None => Ok(fallback),
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Load entity snapshots (and optional body blocks) from a CSV export
///
/// Columns: id, type, name, slug?, location_name?, status?, created_at?,
/// updated_at?, content?
pub fn load_entities_csv(csv_path: &Path) -> anyhow::Result<Vec<(EntitySnapshot, Vec<ContentBlock>)>> {
    let mut rdr = csv::Reader::from_path(csv_path).context("Failed to open CSV file")?;
    let now = Utc::now();

    let mut entries = Vec::new();

    for (line, result) in rdr.deserialize().enumerate() {
        let record: EntityRecord = result.context("Failed to deserialize entity")?;
        let row = line + 2;

        let entity_type: EntityType = record
            .entity_type
            .parse()
            .with_context(|| format!("Row {}: bad entity type", row))?;
        let status: EntityStatus = match non_empty(record.status) {
            Some(s) => s.parse().with_context(|| format!("Row {}: bad status", row))?,
            None => EntityStatus::Published,
        };
        let created_at = parse_optional_time(record.created_at.as_deref(), now)
            .with_context(|| format!("Row {}: bad created_at", row))?;
        let updated_at = parse_optional_time(record.updated_at.as_deref(), created_at)
            .with_context(|| format!("Row {}: bad updated_at", row))?;

        let entity = EntitySnapshot {
            slug: non_empty(record.slug).unwrap_or_else(|| slugify(&record.name)),
            id: record.id,
            entity_type,
            name: record.name,
            location_name: non_empty(record.location_name),
            status,
            created_at,
            updated_at,
        };

        let blocks = non_empty(record.content)
            .map(|body| vec![ContentBlock::new("body", &body)])
            .unwrap_or_default();

        entries.push((entity, blocks));
    }

    Ok(entries)
}
