/*!
 * ZIP archive assembly from a download session.
 *
 * Two staging strategies cover the memory/quality trade-off:
 *
 * - disk-staged: payloads land as files in a temporary directory, the
 *   archive is built store-only (the payloads are already compressed
 *   video), and the finished file is streamed in fixed chunks. The
 *   staging directory lives exactly as long as the stream.
 * - memory-staged: payloads are deflated into an in-memory archive as
 *   they arrive and the buffer is streamed once complete.
 *
 * Payloads are fetched sequentially in episode order; an unreachable
 * or implausibly small payload (an upstream error page rather than
 * media) is skipped, and assembly fails only when nothing was staged.
 */

use anyhow::Context;
use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use log::{debug, info, warn};
use reqwest::header::{HeaderMap, HeaderValue, REFERER, USER_AGENT};
use reqwest::Client;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::time::Duration;
use tempfile::TempDir;
use tokio::io::AsyncReadExt;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::app_config::BulkConfig;
use crate::database::models::{DownloadSessionRecord, ResolvedLinkRecord};
use crate::errors::{ServiceError, ServiceResult};

/// Boxed chunk stream handed to the outer surface
pub type ArchiveByteStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Where archive contents are staged before streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStrategy {
    /// Stage payloads on disk, archive store-only
    DiskStaged,
    /// Stage the whole archive in memory, deflate-compressed
    MemoryStaged,
}

/// A finished archive ready to stream
pub struct ArchiveStream {
    /// Suggested download filename
    pub filename: String,
    /// Total archive size, when known up front
    pub total_bytes: Option<u64>,
    /// The archive bytes, in fixed-size chunks
    pub stream: ArchiveByteStream,
}

impl std::fmt::Debug for ArchiveStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveStream")
            .field("filename", &self.filename)
            .field("total_bytes", &self.total_bytes)
            .finish_non_exhaustive()
    }
}

/// Builds streamable ZIP archives from resolved links
pub struct ArchiveAssembler {
    client: Client,
    min_media_bytes: u64,
    chunk_bytes: usize,
}

impl ArchiveAssembler {
    /// Create an assembler; media requests carry the player referer,
    /// which the file host checks.
    pub fn new(config: &BulkConfig, media_referer: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(crate::origin::USER_AGENT));
        headers.insert(
            REFERER,
            HeaderValue::from_str(media_referer).context("Media referer is not a valid header")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.media_timeout_secs))
            .default_headers(headers)
            .build()
            .context("Failed to build media download client")?;

        Ok(Self {
            client,
            min_media_bytes: config.min_media_bytes,
            chunk_bytes: config.archive_chunk_bytes,
        })
    }

    /// Assemble an archive from a session's links. Consuming the
    /// session is the caller's business, after assembly succeeds.
    pub async fn assemble(
        &self,
        session: &DownloadSessionRecord,
        strategy: ArchiveStrategy,
    ) -> ServiceResult<ArchiveStream> {
        info!(
            "Assembling {:?} archive for '{}' ({} links)",
            strategy,
            session.anime_title,
            session.links.len()
        );

        match strategy {
            ArchiveStrategy::DiskStaged => self.assemble_disk_staged(session).await,
            ArchiveStrategy::MemoryStaged => self.assemble_memory_staged(session).await,
        }
    }

    async fn assemble_disk_staged(
        &self,
        session: &DownloadSessionRecord,
    ) -> ServiceResult<ArchiveStream> {
        let staging = TempDir::new().context("Failed to create staging directory")?;

        let mut staged: Vec<(String, PathBuf)> = Vec::new();
        for link in &session.links {
            let Some(payload) = self.fetch_payload(link).await else {
                continue;
            };

            let name = entry_name(&session.anime_title, link.episode);
            let path = staging.path().join(&name);
            tokio::fs::write(&path, &payload)
                .await
                .with_context(|| format!("Failed to stage {}", name))?;
            debug!("Staged {} ({} bytes)", name, payload.len());
            staged.push((name, path));
        }

        if staged.is_empty() {
            return Err(no_payloads_error());
        }

        let filename = archive_name(&session.anime_title, &session.links);
        let zip_path = staging.path().join(&filename);

        let build_path = zip_path.clone();
        let total_bytes = tokio::task::spawn_blocking(move || {
            build_stored_archive(&staged, &build_path)
        })
        .await
        .context("Archive build task panicked")??;

        let file = tokio::fs::File::open(&zip_path)
            .await
            .context("Failed to reopen finished archive")?;

        Ok(ArchiveStream {
            filename,
            total_bytes: Some(total_bytes),
            stream: stream_staged_file(file, staging, self.chunk_bytes),
        })
    }

    async fn assemble_memory_staged(
        &self,
        session: &DownloadSessionRecord,
    ) -> ServiceResult<ArchiveStream> {
        let mut builder = MemoryArchiveBuilder::new();

        for link in &session.links {
            let Some(payload) = self.fetch_payload(link).await else {
                continue;
            };

            let name = entry_name(&session.anime_title, link.episode);
            debug!("Compressing {} ({} bytes)", name, payload.len());

            // Deflate is CPU-bound; keep it off the async threads.
            builder = tokio::task::spawn_blocking(move || {
                builder.add(&name, &payload)?;
                Ok::<_, anyhow::Error>(builder)
            })
            .await
            .context("Archive compression task panicked")??;
        }

        if builder.is_empty() {
            return Err(no_payloads_error());
        }

        let buffer = builder.finish()?;
        let filename = archive_name(&session.anime_title, &session.links);
        let total = buffer.len() as u64;

        Ok(ArchiveStream {
            filename,
            total_bytes: Some(total),
            stream: stream_buffer(buffer, self.chunk_bytes),
        })
    }

    /// Fetch one media payload, or None when it should be skipped.
    async fn fetch_payload(&self, link: &ResolvedLinkRecord) -> Option<Bytes> {
        let response = match self.client.get(&link.direct_link).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("Episode {} skipped, request failed: {}", link.episode, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!(
                "Episode {} skipped, media host returned {}",
                link.episode,
                response.status()
            );
            return None;
        }

        let payload = match response.bytes().await {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Episode {} skipped, body read failed: {}", link.episode, e);
                return None;
            }
        };

        if (payload.len() as u64) < self.min_media_bytes {
            // Hosts answer 200 with an HTML error page when a link has
            // gone stale; real media is never this small.
            warn!(
                "Episode {} skipped, payload too small ({} bytes)",
                link.episode,
                payload.len()
            );
            return None;
        }

        Some(payload)
    }
}

fn no_payloads_error() -> ServiceError {
    ServiceError::UpstreamUnavailable("No episode payloads could be downloaded".to_string())
}

/// Incremental in-memory ZIP builder, deflate-compressed
struct MemoryArchiveBuilder {
    writer: ZipWriter<Cursor<Vec<u8>>>,
    entries: usize,
}

impl MemoryArchiveBuilder {
    fn new() -> Self {
        Self {
            writer: ZipWriter::new(Cursor::new(Vec::new())),
            entries: 0,
        }
    }

    fn add(&mut self, name: &str, payload: &[u8]) -> anyhow::Result<()> {
        let options = FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(true);
        self.writer
            .start_file(name, options)
            .with_context(|| format!("Failed to open archive entry {}", name))?;
        self.writer
            .write_all(payload)
            .with_context(|| format!("Failed to write archive entry {}", name))?;
        self.entries += 1;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.entries == 0
    }

    fn finish(mut self) -> anyhow::Result<Vec<u8>> {
        let cursor = self.writer.finish().context("Failed to finalize archive")?;
        Ok(cursor.into_inner())
    }
}

/// Build a store-only archive from staged files; returns its size.
fn build_stored_archive(staged: &[(String, PathBuf)], zip_path: &Path) -> anyhow::Result<u64> {
    let file = std::fs::File::create(zip_path)
        .with_context(|| format!("Failed to create archive at {:?}", zip_path))?;
    let mut writer = ZipWriter::new(file);

    // Staged payloads are already-compressed video; deflating them
    // again costs CPU for nothing.
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .large_file(true);

    for (name, path) in staged {
        writer
            .start_file(name, options)
            .with_context(|| format!("Failed to open archive entry {}", name))?;
        let mut source = std::fs::File::open(path)
            .with_context(|| format!("Failed to reopen staged file {:?}", path))?;
        let mut buffer = [0u8; 64 * 1024];
        loop {
            let n = source.read(&mut buffer)?;
            if n == 0 {
                break;
            }
            writer.write_all(&buffer[..n])?;
        }
    }

    writer.finish().context("Failed to finalize archive")?;

    let size = std::fs::metadata(zip_path)
        .context("Failed to stat finished archive")?
        .len();
    Ok(size)
}

/// Stream a staged archive file in fixed chunks.
///
/// The staging directory is owned by the stream state, so it is
/// removed when the stream is dropped, on completion or abandonment
/// alike.
fn stream_staged_file(
    file: tokio::fs::File,
    staging: TempDir,
    chunk_bytes: usize,
) -> ArchiveByteStream {
    struct State {
        file: tokio::fs::File,
        _staging: TempDir,
        chunk_bytes: usize,
        failed: bool,
    }

    let state = State {
        file,
        _staging: staging,
        chunk_bytes,
        failed: false,
    };

    stream::unfold(state, |mut state| async move {
        if state.failed {
            return None;
        }
        let mut buffer = vec![0u8; state.chunk_bytes];
        match state.file.read(&mut buffer).await {
            Ok(0) => None,
            Ok(n) => {
                buffer.truncate(n);
                Some((Ok(Bytes::from(buffer)), state))
            }
            Err(e) => {
                state.failed = true;
                Some((Err(e), state))
            }
        }
    })
    .boxed()
}

/// Stream an in-memory archive buffer in fixed chunks.
fn stream_buffer(buffer: Vec<u8>, chunk_bytes: usize) -> ArchiveByteStream {
    let bytes = Bytes::from(buffer);
    let len = bytes.len();

    stream::iter(
        (0..len)
            .step_by(chunk_bytes.max(1))
            .map(move |start| Ok(bytes.slice(start..(start + chunk_bytes).min(len)))),
    )
    .boxed()
}

fn sanitize_title(title: &str) -> String {
    title
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
}

/// Archive entry name for one episode
pub fn entry_name(title: &str, episode: i64) -> String {
    format!("{}_Episode_{:03}.mp4", sanitize_title(title), episode)
}

/// Archive filename spanning the episodes actually in the session
pub fn archive_name(title: &str, links: &[ResolvedLinkRecord]) -> String {
    let first = links.iter().map(|l| l.episode).min().unwrap_or(0);
    let last = links.iter().map(|l| l.episode).max().unwrap_or(0);
    format!("{}_{}-{}_episodes.zip", sanitize_title(title), first, last)
}
