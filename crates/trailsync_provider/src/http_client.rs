//! HTTP implementation of the [`HealthDataProvider`](crate::HealthDataProvider) trait.
//!
//! Route samples are delivered page by page; the pager runs as a spawned task
//! that forwards each page into the chunk channel until the provider flags the
//! last page.

use crate::retry::RetryPolicy;
use crate::{
    ActivityKind, HealthDataProvider, LocationSample, ProviderError, RouteChunk, RouteChunkStream,
    RouteRef, WorkoutRecord,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;
use tokio::sync::mpsc;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

const DEFAULT_PAGE_SIZE: u32 = 500;

// consecutive failed pages before a route's stream gives up
const MAX_PAGE_FAILURES: u32 = 3;

/// Client for the workout data API using reqwest.
#[derive(Clone, Debug)]
pub struct ReqwestHealthProvider {
    base_url: String,
    user_id: String,
    api_key: SecretString,
    client: reqwest::Client,
    retry: RetryPolicy,
    page_size: u32,
}

impl ReqwestHealthProvider {
    /// Create a new client instance with the default request timeout.
    ///
    /// # Arguments
    /// * `base_url` - The base URL of the provider API
    /// * `user_id` - The user whose workout data is queried
    /// * `api_key` - The API key for authentication
    pub fn new(base_url: &str, user_id: impl Into<String>, api_key: SecretString) -> Self {
        Self::with_timeout(base_url, user_id, api_key, DEFAULT_TIMEOUT)
    }

    /// Create a client whose requests are bounded by `timeout`. An
    /// unresponsive provider then fails the affected call instead of hanging
    /// a sync pass.
    pub fn with_timeout(
        base_url: &str,
        user_id: impl Into<String>,
        api_key: SecretString,
        timeout: Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client build should not fail");
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            user_id: user_id.into(),
            api_key,
            client,
            retry: RetryPolicy::default(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Override the retry policy applied to sample pages.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Override how many samples one page request asks for.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Build an authenticated GET request.
    fn get_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .get(url)
            .basic_auth("API_KEY", Some(self.api_key.expose_secret()))
    }

    /// Build an authenticated POST request.
    fn post_request(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .basic_auth("API_KEY", Some(self.api_key.expose_secret()))
    }

    /// Execute a request and expect a JSON response.
    async fn execute_json<T: serde::de::DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let resp = request.send().await?;
        self.handle_response(resp).await
    }

    /// Execute a request with no expected response body.
    async fn execute_empty(&self, request: reqwest::RequestBuilder) -> Result<(), ProviderError> {
        let resp = request.send().await?;
        if !resp.status().is_success() {
            return Err(self.error_from_response(resp).await);
        }
        Ok(())
    }

    /// Handle a response, converting status codes to appropriate errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, ProviderError> {
        let status = resp.status();
        if !status.is_success() {
            return Err(self.error_from_response(resp).await);
        }
        resp.json::<T>().await.map_err(|e| {
            if e.is_decode() {
                ProviderError::Decode(e.to_string())
            } else {
                ProviderError::Http(e)
            }
        })
    }

    /// Extract error information from a failed response.
    async fn error_from_response(&self, resp: reqwest::Response) -> ProviderError {
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        let body_snippet: String = body.chars().take(256).collect();
        counter!("trailsync_provider_request_errors_total").increment(1);

        match status {
            401 | 403 => ProviderError::Authorization(body_snippet),
            404 => ProviderError::NotFound(body_snippet),
            _ => ProviderError::Query {
                status,
                message: body_snippet,
            },
        }
    }

    /// Fetch one zero-based page of a route's samples.
    async fn fetch_sample_page(
        &self,
        route_id: &str,
        page: u32,
    ) -> Result<SamplePage, ProviderError> {
        let url = format!("{}/api/v1/routes/{}/samples", self.base_url, route_id);
        let pairs = [
            ("page", page.to_string()),
            ("per_page", self.page_size.to_string()),
        ];
        self.execute_json(self.get_request(&url).query(&pairs)).await
    }

    /// Walk a route's sample pages on a spawned task, forwarding each page
    /// as one chunk. The walk ends at the terminal flag, or at an empty
    /// page arriving without it. A page that still fails after retries
    /// produces an `Err` event and pagination moves on to the next page;
    /// the stream only gives up once `MAX_PAGE_FAILURES` pages in a row
    /// have failed.
    fn spawn_sample_pager(&self, route: RouteRef) -> RouteChunkStream {
        let (tx, rx) = mpsc::channel(8);
        let client = self.clone();
        tokio::spawn(async move {
            let mut page = 0u32;
            let mut failed_in_a_row = 0u32;
            loop {
                let fetched = client
                    .retry
                    .retry_async(|| client.fetch_sample_page(&route.id, page))
                    .await;
                match fetched {
                    Ok(batch) => {
                        failed_in_a_row = 0;
                        if batch.samples.is_empty() && !batch.last {
                            tracing::debug!(
                                route = %route.id,
                                page,
                                "empty page without a terminal flag, ending the stream"
                            );
                            return;
                        }
                        let is_last = batch.last;
                        let chunk = RouteChunk {
                            samples: batch.samples,
                            is_last,
                        };
                        if tx.send(Ok(chunk)).await.is_err() {
                            // receiver gone, stop paging
                            return;
                        }
                        if is_last {
                            return;
                        }
                    }
                    Err(e) => {
                        failed_in_a_row += 1;
                        tracing::warn!(
                            route = %route.id,
                            page,
                            error = %e,
                            "route sample page failed, skipping to the next page"
                        );
                        if tx.send(Err(e)).await.is_err() {
                            return;
                        }
                        if failed_in_a_row >= MAX_PAGE_FAILURES {
                            tracing::warn!(
                                route = %route.id,
                                "giving up on route after repeated page failures"
                            );
                            return;
                        }
                    }
                }
                page += 1;
            }
        });
        rx
    }
}

/// One page of route samples as returned by the provider.
#[derive(Debug, serde::Deserialize)]
struct SamplePage {
    samples: Vec<LocationSample>,
    #[serde(default)]
    last: bool,
}

#[async_trait]
impl HealthDataProvider for ReqwestHealthProvider {
    async fn authorize(&self, kinds: &[ActivityKind]) -> Result<(), ProviderError> {
        let url = format!("{}/api/v1/users/{}/authorize", self.base_url, self.user_id);
        let body = serde_json::json!({ "kinds": kinds });
        self.execute_empty(self.post_request(&url).json(&body)).await
    }

    async fn query_workouts(
        &self,
        kind: ActivityKind,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkoutRecord>, ProviderError> {
        let url = format!("{}/api/v1/users/{}/workouts", self.base_url, self.user_id);
        let mut pairs: Vec<(&str, String)> = vec![("kind", kind.as_str().to_string())];
        if let Some(s) = since {
            pairs.push(("since", s.to_rfc3339()));
        }
        let qp: Vec<(&str, &str)> = pairs.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.execute_json(self.get_request(&url).query(&qp)).await
    }

    async fn query_workout_routes(
        &self,
        workout_id: &str,
    ) -> Result<Vec<RouteRef>, ProviderError> {
        let url = format!("{}/api/v1/workouts/{}/routes", self.base_url, workout_id);
        self.execute_json(self.get_request(&url)).await
    }

    async fn query_route_samples(
        &self,
        route: &RouteRef,
    ) -> Result<RouteChunkStream, ProviderError> {
        Ok(self.spawn_sample_pager(route.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_new_and_basic() {
        let client = ReqwestHealthProvider::new(
            "http://localhost",
            "u1",
            SecretString::new("key".into()),
        );
        let _ = client;
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ReqwestHealthProvider::new(
            "http://localhost/",
            "u1",
            SecretString::new("key".into()),
        );
        assert_eq!(client.base_url, "http://localhost");
    }

    #[test]
    fn sample_page_missing_last_defaults_to_false() {
        let payload = serde_json::json!({ "samples": [] });
        let page: SamplePage = serde_json::from_value(payload).expect("deserialize");
        assert!(!page.last);
        assert!(page.samples.is_empty());
    }

    #[test]
    fn page_size_is_clamped_to_at_least_one() {
        let client = ReqwestHealthProvider::new(
            "http://localhost",
            "u1",
            SecretString::new("key".into()),
        )
        .with_page_size(0);
        assert_eq!(client.page_size, 1);
    }
}
