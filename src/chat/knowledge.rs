//! Encyclopedia lookup against the user-data service.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{info, warn};

use crate::fallback::Resolved;

#[derive(Debug, Deserialize)]
struct EncyclopediaBody {
    #[serde(default)]
    encyclopedia: Option<String>,
}

/// Client for `GET {base}/api/users/{id}/encyclopedia`.
#[derive(Clone)]
pub struct KnowledgeClient {
    base_url: String,
    timeout: Duration,
    client: Client,
}

impl KnowledgeClient {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            client: Client::new(),
        }
    }

    /// The user id always occupies exactly one path segment.
    fn url(&self, user_id: &str) -> std::result::Result<String, String> {
        if matches!(user_id, "." | "..") {
            return Err(format!("Invalid user id '{user_id}'"));
        }
        Ok(format!(
            "{}/api/users/{}/encyclopedia",
            self.base_url,
            urlencoding::encode(user_id)
        ))
    }

    /// Fetch the user's encyclopedia text.
    ///
    /// Never fails: any problem yields a `None` fallback carrying the reason.
    /// Whitespace-only text counts as absent.
    pub async fn fetch(&self, user_id: &str) -> Resolved<Option<String>> {
        let outcome = match self.try_fetch(user_id).await {
            Ok(text) => {
                info!("Successfully fetched encyclopedia data for user {}", user_id);
                Resolved::Value(text.filter(|t| !t.trim().is_empty()))
            }
            Err(reason) => Resolved::fallback(None, reason),
        };

        if let Some(reason) = outcome.reason() {
            warn!("Continuing without encyclopedia data for user {}: {}", user_id, reason);
        }
        outcome
    }

    async fn try_fetch(&self, user_id: &str) -> std::result::Result<Option<String>, String> {
        let response = self
            .client
            .get(self.url(user_id)?)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| format!("Error fetching encyclopedia data: {e}"))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response.text().await.unwrap_or_default();
            return Err(format!("Failed to fetch encyclopedia data: {}, {}", status.as_u16(), body));
        }

        let body: EncyclopediaBody = response
            .json()
            .await
            .map_err(|e| format!("Invalid encyclopedia response: {e}"))?;
        Ok(body.encyclopedia)
    }
}
