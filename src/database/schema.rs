/*!
 * Database schema definitions and migrations.
 *
 * This module contains the SQL schema for all cache-store tables
 * and handles schema migrations for version upgrades.
 */

use anyhow::{Context, Result};
use log::{debug, info};
use rusqlite::Connection;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Initializing cache store schema v{}", SCHEMA_VERSION);
        create_all_tables(conn)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating cache store schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    } else {
        debug!("Cache store schema is up to date (v{})", current_version);
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .context("Failed to check schema_version table existence")?;

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Set the schema version in the database
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO schema_version (id, version, updated_at) VALUES (1, ?1, datetime('now'))",
        [version],
    )?;
    Ok(())
}

/// Create all database tables
fn create_all_tables(conn: &Connection) -> Result<()> {
    // Enable WAL mode for better concurrency and crash recovery
    conn.execute_batch("PRAGMA journal_mode=WAL;")?;

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            version INTEGER NOT NULL,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;

    // Anime identity: one locally generated internal_id per origin
    // external_id, never deleted.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS anime_info (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            internal_id TEXT NOT NULL UNIQUE,
            external_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            episode_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_anime_internal ON anime_info(internal_id);
        CREATE INDEX IF NOT EXISTS idx_anime_external ON anime_info(external_id);
        "#,
    )?;

    // Catalog page-count cache; the episode entries themselves are
    // ephemeral and re-derived by pagination.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS episode_pages (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            external_id TEXT NOT NULL UNIQUE,
            page_count INTEGER,
            episode_total INTEGER
        );
        "#,
    )?;

    // Resolved-link cache, last-write-wins per (internal_id, episode).
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS cached_video_url (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            internal_id TEXT NOT NULL,
            episode INTEGER NOT NULL,
            video_url TEXT NOT NULL,
            size TEXT,
            snapshot TEXT,
            UNIQUE(internal_id, episode)
        );

        CREATE INDEX IF NOT EXISTS idx_cached_lookup ON cached_video_url(internal_id, episode);
        "#,
    )?;

    // One-shot download sessions: created by bulk resolution, consumed
    // exactly once by archive assembly.
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS download_sessions (
            session_id TEXT PRIMARY KEY,
            anime_id TEXT NOT NULL,
            anime_title TEXT NOT NULL,
            links TEXT NOT NULL,
            created_at TEXT NOT NULL
        );
        "#,
    )?;

    info!("Cache store schema created successfully");
    Ok(())
}

/// Migrate the schema from one version to another
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    let current = from_version;

    while current < SCHEMA_VERSION {
        match current {
            // Add migration steps here as schema evolves
            _ => {
                return Err(anyhow::anyhow!(
                    "Unknown schema version: {}. Cannot migrate.",
                    current
                ));
            }
        }
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    info!("Schema migration completed to v{}", SCHEMA_VERSION);
    Ok(())
}
