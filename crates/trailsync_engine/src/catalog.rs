//! Workout catalog queries against the provider.

use crate::error::SyncResult;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use trailsync_provider::retry::RetryPolicy;
use trailsync_provider::{ActivityKind, HealthDataProvider, WorkoutRecord};

/// Fetches workout listings for one activity kind at a time and applies the
/// engine-side eligibility rules.
#[derive(Clone)]
pub struct WorkoutCatalog {
    provider: Arc<dyn HealthDataProvider>,
    retry: RetryPolicy,
}

impl WorkoutCatalog {
    pub fn new(provider: Arc<dyn HealthDataProvider>) -> Self {
        Self {
            provider,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// List workouts of `kind` that are eligible for syncing.
    ///
    /// Indoor workouts are excluded since they carry no usable GPS track.
    /// When `since` is given only workouts starting strictly after it are
    /// returned, independent of how the provider interprets its own date
    /// filter.
    pub async fn fetch_workouts(
        &self,
        kind: ActivityKind,
        since: Option<DateTime<Utc>>,
    ) -> SyncResult<Vec<WorkoutRecord>> {
        let records = self
            .retry
            .retry_async(|| self.provider.query_workouts(kind, since))
            .await?;
        let total = records.len();
        let eligible: Vec<WorkoutRecord> = records
            .into_iter()
            .filter(|w| !w.indoor)
            .filter(|w| since.is_none_or(|s| w.started_at > s))
            .collect();
        tracing::debug!(
            kind = kind.as_str(),
            total,
            eligible = eligible.len(),
            "workout catalog fetched"
        );
        Ok(eligible)
    }
}
