/*!
 * Redirect resolution through the external resolver service.
 *
 * The final stage trades the player URL, token and session cookie for
 * the direct media URL via a POST to the resolver endpoint. A
 * non-success response or timeout is a retryable upstream failure, not
 * a caller error.
 */

use anyhow::Context;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{ResolveStage, ServiceError, ServiceResult};

/// Request body posted to the resolver
#[derive(Debug, Serialize)]
struct RedirectRequest<'a> {
    kwik_url: &'a str,
    token: &'a str,
    kwik_session: &'a str,
}

/// Resolver response carrying the direct media URL
#[derive(Debug, Deserialize)]
struct RedirectResponse {
    download_link: String,
}

/// Client for the redirect resolver endpoint
pub struct RedirectResolver {
    endpoint: String,
    client: Client,
}

impl RedirectResolver {
    /// Create a resolver against the given endpoint
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build redirect resolver client")?;

        Ok(Self {
            endpoint: endpoint.into(),
            client,
        })
    }

    /// Exchange the player credentials for the direct media URL.
    pub async fn resolve(
        &self,
        player_url: &str,
        token: &str,
        session_cookie: &str,
    ) -> ServiceResult<String> {
        let body = RedirectRequest {
            kwik_url: player_url,
            token,
            kwik_session: session_cookie,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ServiceError::UpstreamUnavailable(format!("Redirect resolver unreachable: {}", e))
                } else {
                    ServiceError::stage(
                        ResolveStage::RedirectResolution,
                        format!("Redirect request failed: {}", e),
                    )
                }
            })?;

        if !response.status().is_success() {
            return Err(ServiceError::stage(
                ResolveStage::RedirectResolution,
                format!("Redirect resolver returned {}", response.status()),
            ));
        }

        let parsed: RedirectResponse = response.json().await.map_err(|e| {
            ServiceError::stage(
                ResolveStage::RedirectResolution,
                format!("Redirect resolver returned an unexpected body: {}", e),
            )
        })?;

        debug!("Redirect resolved to direct media URL");
        Ok(parsed.download_link)
    }
}
