/*!
 * Error types for the pahedl service.
 *
 * This module contains the service-wide error taxonomy, using the
 * thiserror crate for ergonomic error definitions. Every error maps to
 * a stable numeric status so callers always receive a
 * `{status, message}` shape, and internal details are never exposed.
 */

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The stage of the link-resolution pipeline that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    /// Download-options panel lookup on the play page
    EmbedLookup,
    /// Player URL extraction from the embed page
    PlayerExtraction,
    /// Token/session extraction from the obfuscated player script
    TokenExtraction,
    /// External redirect resolution to the direct media URL
    RedirectResolution,
}

impl std::fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EmbedLookup => "embed-lookup",
            Self::PlayerExtraction => "player-extraction",
            Self::TokenExtraction => "token-extraction",
            Self::RedirectResolution => "redirect-resolution",
        };
        write!(f, "{}", name)
    }
}

/// Service error taxonomy
///
/// Partial batch failure is deliberately absent: dropped episodes in a
/// range are not an error as long as at least one succeeds.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Missing or malformed required input; rejected before any network call
    #[error("Invalid request: {0}")]
    Validation(String),

    /// Unknown id, missing origin mapping, or missing session
    #[error("Not found: {0}")]
    NotFound(String),

    /// Requested episode outside the known [1, episode_count] range
    #[error("Episode range invalid: {0}")]
    RangeExceeded(String),

    /// Origin connect failure or timeout; worth retrying later
    #[error("Upstream unavailable: {0}. Try again later")]
    UpstreamUnavailable(String),

    /// A resolution stage returned nothing; the chain short-circuits here
    #[error("Resolution stage {stage} failed: {message}")]
    Stage {
        /// Which stage short-circuited
        stage: ResolveStage,
        /// What the stage reported
        message: String,
    },

    /// Anything unexpected; details are logged, never surfaced
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl ServiceError {
    /// Build a stage failure error
    pub fn stage(stage: ResolveStage, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
        }
    }

    /// Numeric status mirrored onto the protocol status code
    pub fn status(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::NotFound(_) => 404,
            Self::RangeExceeded(_) => 422,
            Self::UpstreamUnavailable(_) => 503,
            Self::Stage { stage, .. } => match stage {
                // The first two stages failing means the episode has no
                // matching variant at the origin; later stages failing is
                // on us or on the player side.
                ResolveStage::EmbedLookup | ResolveStage::PlayerExtraction => 404,
                ResolveStage::TokenExtraction => 500,
                ResolveStage::RedirectResolution => 503,
            },
            Self::Internal(_) => 500,
        }
    }

    /// Convert to the stable wire shape, hiding internal details
    pub fn to_response(&self) -> ErrorResponse {
        let message = match self {
            Self::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        ErrorResponse {
            status: self.status(),
            message,
        }
    }
}

impl From<anyhow::Error> for ServiceError {
    fn from(error: anyhow::Error) -> Self {
        Self::Internal(error)
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() || error.is_connect() {
            Self::UpstreamUnavailable(error.to_string())
        } else {
            Self::Internal(error.into())
        }
    }
}

/// Stable `{status, message}` error shape returned to callers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Numeric status, mirrored onto the protocol status code
    pub status: u16,
    /// Human-readable message
    pub message: String,
}

/// Convenience alias used across the service layer
pub type ServiceResult<T> = Result<T, ServiceError>;
