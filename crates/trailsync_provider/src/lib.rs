//! `HealthDataProvider` trait and the workout/route value types shared with
//! the sync engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod config;
pub mod http_client;
pub mod retry;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("authorization denied: {0}")]
    Authorization(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unexpected status {status}: {message}")]
    Query { status: u16, message: String },
    #[error("decode error: {0}")]
    Decode(String),
    #[error("configuration error: {0}")]
    Config(String),
}

/// Activity kinds the provider tags workouts with.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Walking,
    Running,
    Cycling,
    #[serde(other)]
    Other,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActivityKind::Walking => "walking",
            ActivityKind::Running => "running",
            ActivityKind::Cycling => "cycling",
            ActivityKind::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "walking" => Some(ActivityKind::Walking),
            "running" => Some(ActivityKind::Running),
            "cycling" => Some(ActivityKind::Cycling),
            "other" => Some(ActivityKind::Other),
            _ => None,
        }
    }
}

/// One workout session as reported by the provider. Immutable once fetched.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct WorkoutRecord {
    pub id: String,
    pub kind: ActivityKind,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub indoor: bool,
}

/// A single GPS fix. Ordering is meaningful only within one route segment.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    pub recorded_at: DateTime<Utc>,
}

/// Reference to one continuous route segment of a workout.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct RouteRef {
    pub id: String,
}

/// One delivery unit of a segment's samples.
#[derive(Clone, Debug)]
pub struct RouteChunk {
    pub samples: Vec<LocationSample>,
    pub is_last: bool,
}

/// Chunk stream for one route segment, terminated by a chunk with `is_last`
/// set or by channel close.
pub type RouteChunkStream = tokio::sync::mpsc::Receiver<Result<RouteChunk, ProviderError>>;

#[async_trait]
pub trait HealthDataProvider: Send + Sync + 'static {
    /// Request read access for the given activity kinds. A denial is a typed
    /// error; callers are expected to treat it as recoverable.
    async fn authorize(&self, kinds: &[ActivityKind]) -> Result<(), ProviderError>;

    async fn query_workouts(
        &self,
        kind: ActivityKind,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<WorkoutRecord>, ProviderError>;

    async fn query_workout_routes(
        &self,
        workout_id: &str,
    ) -> Result<Vec<RouteRef>, ProviderError>;

    /// Open the chunk stream for one route segment.
    ///
    /// Samples arrive in order across chunks. A failed delivery travels as an
    /// `Err` event on the stream; the setup error covers transport problems
    /// that prevent the stream from opening at all.
    async fn query_route_samples(
        &self,
        route: &RouteRef,
    ) -> Result<RouteChunkStream, ProviderError>;
}
