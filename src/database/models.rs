/*!
 * Typed records for the cache-store tables.
 */

use chrono::Utc;
use serde::{Deserialize, Serialize};

/// One anime known to the service.
///
/// Created on the first search hit; `episode_count` is refreshed
/// lazily from the origin; records are never deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct AnimeRecord {
    /// Locally generated stable identifier, unique
    pub internal_id: String,
    /// Origin-assigned opaque identifier, unique
    pub external_id: String,
    /// Display title
    pub title: String,
    /// Last known episode count
    pub episode_count: i64,
}

/// Persisted page-count cache for one external id.
///
/// Only the page count survives between runs; the episode entries are
/// re-derived by pagination every time the catalog is needed.
#[derive(Debug, Clone, PartialEq)]
pub struct PageCountRecord {
    /// Origin-assigned anime identifier
    pub external_id: String,
    /// Number of catalog pages reported by the probe
    pub page_count: i64,
    /// Episode total reported by the probe
    pub episode_total: i64,
}

/// A resolved direct media link, unique per (internal_id, episode)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedLinkRecord {
    /// Anime internal id
    pub internal_id: String,
    /// Episode number
    pub episode: i64,
    /// Direct media URL
    pub direct_link: String,
    /// Reported media size, as the player reports it
    pub size: Option<String>,
    /// Thumbnail URL from the catalog entry
    pub snapshot: Option<String>,
}

/// A one-shot download session produced by bulk resolution.
///
/// Consumed exactly once by archive assembly, then deleted.
#[derive(Debug, Clone)]
pub struct DownloadSessionRecord {
    /// Opaque unguessable session id
    pub session_id: String,
    /// Anime internal id
    pub anime_id: String,
    /// Denormalized anime title for archive naming
    pub anime_title: String,
    /// Successfully resolved links, in episode order
    pub links: Vec<ResolvedLinkRecord>,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
}

impl DownloadSessionRecord {
    /// Create a new session record stamped with the current time
    pub fn new(
        session_id: String,
        anime_id: String,
        anime_title: String,
        links: Vec<ResolvedLinkRecord>,
    ) -> Self {
        Self {
            session_id,
            anime_id,
            anime_title,
            links,
            created_at: Utc::now().to_rfc3339(),
        }
    }
}
