/*!
 * Bulk resolution and archive assembly.
 *
 * `BulkDownloadOrchestrator` fans a range of episodes out over a
 * bounded resolver pool and persists the successes as a one-shot
 * download session; `ArchiveAssembler` turns a session into a
 * streamable ZIP archive.
 */

pub mod archive;
pub mod orchestrator;

pub use archive::{ArchiveAssembler, ArchiveStrategy, ArchiveStream};
pub use orchestrator::{
    BulkDownloadOrchestrator, BulkResolveOutcome, CachedPipelineResolver, EpisodeLinkResolver,
    EpisodeResolveRequest,
};
