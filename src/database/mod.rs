/*!
 * Cache store for anime identity, page counts, resolved links, and
 * one-shot download sessions.
 *
 * The store is SQLite behind a thread-safe connection wrapper. Access
 * is single-statement only: every commit is one parameterized
 * execute, and concurrent writers to the same key race under
 * last-write-wins.
 */

pub mod connection;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::{DatabaseConnection, DatabaseStats};
pub use models::{AnimeRecord, DownloadSessionRecord, PageCountRecord, ResolvedLinkRecord};
pub use repository::Repository;
