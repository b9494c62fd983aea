/*!
 * Repository layer for cache-store operations.
 *
 * This module provides a high-level API for all database operations,
 * abstracting away the SQL details and providing type-safe access.
 * Every operation is a single parameterized statement; there are no
 * cross-statement transactions, and concurrent writers to the same
 * (internal_id, episode) race under last-write-wins.
 */

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{params, OptionalExtension};

use super::connection::DatabaseConnection;
use super::models::{AnimeRecord, DownloadSessionRecord, PageCountRecord, ResolvedLinkRecord};

/// Repository for cache-store operations
#[derive(Clone)]
pub struct Repository {
    /// Database connection
    db: DatabaseConnection,
}

impl Repository {
    /// Create a new repository with the given database connection
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a repository with the default database location
    pub fn new_default() -> Result<Self> {
        let db = DatabaseConnection::new_default()?;
        Ok(Self::new(db))
    }

    /// Create a repository with an in-memory database (for testing)
    pub fn new_in_memory() -> Result<Self> {
        let db = DatabaseConnection::new_in_memory()?;
        Ok(Self::new(db))
    }

    /// Get the underlying connection
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    // =========================================================================
    // Anime identity
    // =========================================================================

    /// Insert a new anime record, or refresh title/episode_count if the
    /// external id is already known. The existing internal_id always
    /// survives, so at most one internal id ever exists per external id.
    pub async fn upsert_anime(&self, record: &AnimeRecord) -> Result<()> {
        let record = record.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO anime_info (internal_id, external_id, title, episode_count)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(external_id) DO UPDATE SET
                        title = excluded.title,
                        episode_count = excluded.episode_count
                    "#,
                    params![
                        record.internal_id,
                        record.external_id,
                        record.title,
                        record.episode_count
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Look up an anime by its internal id
    pub async fn get_anime(&self, internal_id: &str) -> Result<Option<AnimeRecord>> {
        let internal_id = internal_id.to_string();

        self.db
            .execute_async(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT internal_id, external_id, title, episode_count
                         FROM anime_info WHERE internal_id = ?1",
                        [&internal_id],
                        |row| {
                            Ok(AnimeRecord {
                                internal_id: row.get(0)?,
                                external_id: row.get(1)?,
                                title: row.get(2)?,
                                episode_count: row.get(3)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(result)
            })
            .await
    }

    /// Look up the internal id previously assigned to an external id
    pub async fn get_internal_id(&self, external_id: &str) -> Result<Option<String>> {
        let external_id = external_id.to_string();

        self.db
            .execute_async(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT internal_id FROM anime_info WHERE external_id = ?1",
                        [&external_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                Ok(result)
            })
            .await
    }

    /// Check whether an internal id is already taken
    pub async fn internal_id_exists(&self, internal_id: &str) -> Result<bool> {
        let internal_id = internal_id.to_string();

        self.db
            .execute_async(move |conn| {
                let count: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM anime_info WHERE internal_id = ?1",
                    [&internal_id],
                    |row| row.get(0),
                )?;
                Ok(count > 0)
            })
            .await
    }

    /// Update the episode count for an anime in place
    pub async fn update_episode_count(&self, internal_id: &str, episode_count: i64) -> Result<()> {
        let internal_id = internal_id.to_string();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "UPDATE anime_info SET episode_count = ?1 WHERE internal_id = ?2",
                    params![episode_count, internal_id],
                )?;
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Catalog page counts
    // =========================================================================

    /// Get the persisted page count for an external id, if probed before
    pub async fn get_page_count(&self, external_id: &str) -> Result<Option<PageCountRecord>> {
        let external_id = external_id.to_string();

        self.db
            .execute_async(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT external_id, page_count, episode_total
                         FROM episode_pages WHERE external_id = ?1 AND page_count IS NOT NULL",
                        [&external_id],
                        |row| {
                            Ok(PageCountRecord {
                                external_id: row.get(0)?,
                                page_count: row.get(1)?,
                                episode_total: row.get(2)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(result)
            })
            .await
    }

    /// Persist a probed page count. Insert-if-absent: a concurrent probe
    /// for the same external id is a harmless no-op.
    pub async fn insert_page_count(&self, record: &PageCountRecord) -> Result<()> {
        let record = record.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "INSERT OR IGNORE INTO episode_pages (external_id, page_count, episode_total)
                     VALUES (?1, ?2, ?3)",
                    params![record.external_id, record.page_count, record.episode_total],
                )?;
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Resolved links
    // =========================================================================

    /// Get a cached resolved link for (internal_id, episode)
    pub async fn get_resolved_link(
        &self,
        internal_id: &str,
        episode: i64,
    ) -> Result<Option<ResolvedLinkRecord>> {
        let internal_id = internal_id.to_string();

        self.db
            .execute_async(move |conn| {
                let result = conn
                    .query_row(
                        "SELECT internal_id, episode, video_url, size, snapshot
                         FROM cached_video_url WHERE internal_id = ?1 AND episode = ?2",
                        params![internal_id, episode],
                        |row| {
                            Ok(ResolvedLinkRecord {
                                internal_id: row.get(0)?,
                                episode: row.get(1)?,
                                direct_link: row.get(2)?,
                                size: row.get(3)?,
                                snapshot: row.get(4)?,
                            })
                        },
                    )
                    .optional()?;
                Ok(result)
            })
            .await
    }

    /// Upsert a resolved link; the last writer wins, no history is kept
    pub async fn upsert_resolved_link(&self, link: &ResolvedLinkRecord) -> Result<()> {
        let link = link.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO cached_video_url
                     (internal_id, episode, video_url, size, snapshot)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        link.internal_id,
                        link.episode,
                        link.direct_link,
                        link.size,
                        link.snapshot
                    ],
                )?;
                Ok(())
            })
            .await
    }

    // =========================================================================
    // Download sessions
    // =========================================================================

    /// Persist a new one-shot download session
    pub async fn create_download_session(&self, session: &DownloadSessionRecord) -> Result<()> {
        let links_json =
            serde_json::to_string(&session.links).context("Failed to serialize session links")?;
        let session = session.clone();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "INSERT INTO download_sessions
                     (session_id, anime_id, anime_title, links, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        session.session_id,
                        session.anime_id,
                        session.anime_title,
                        links_json,
                        session.created_at
                    ],
                )?;
                Ok(())
            })
            .await
    }

    /// Load a download session without consuming it.
    pub async fn get_download_session(
        &self,
        session_id: &str,
    ) -> Result<Option<DownloadSessionRecord>> {
        let session_id = session_id.to_string();

        self.db
            .execute_async(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT session_id, anime_id, anime_title, links, created_at
                         FROM download_sessions WHERE session_id = ?1",
                        [&session_id],
                        |row| {
                            Ok((
                                row.get::<_, String>(0)?,
                                row.get::<_, String>(1)?,
                                row.get::<_, String>(2)?,
                                row.get::<_, String>(3)?,
                                row.get::<_, String>(4)?,
                            ))
                        },
                    )
                    .optional()?;

                let Some((session_id, anime_id, anime_title, links_json, created_at)) = row else {
                    return Ok(None);
                };

                let links: Vec<ResolvedLinkRecord> = serde_json::from_str(&links_json)
                    .context("Failed to deserialize session links")?;

                Ok(Some(DownloadSessionRecord {
                    session_id,
                    anime_id,
                    anime_title,
                    links,
                    created_at,
                }))
            })
            .await
    }

    /// Delete a download session. Sessions are single-use; the caller
    /// deletes once the archive is assembled, immediately before the
    /// first byte streams out.
    pub async fn delete_download_session(&self, session_id: &str) -> Result<()> {
        let session_id = session_id.to_string();

        self.db
            .execute_async(move |conn| {
                conn.execute(
                    "DELETE FROM download_sessions WHERE session_id = ?1",
                    [&session_id],
                )?;
                debug!(
                    "Consumed download session {}",
                    &session_id[..8.min(session_id.len())]
                );
                Ok(())
            })
            .await
    }
}
