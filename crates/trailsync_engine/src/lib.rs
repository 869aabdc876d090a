//! Workout sync engine.
//!
//! Pulls workout sessions and GPS tracks from a health data provider,
//! reduces each track with a tolerance filter, persists everything behind a
//! sync watermark, and publishes classified route snapshots for consumers.

pub mod catalog;
pub mod classify;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod repository;
pub mod routes;
pub mod simplify;

pub use classify::{ClassifiedRoute, RouteBuckets, classify};
pub use config::EngineConfig;
pub use coordinator::{SyncCoordinator, SyncOutcome, SyncReport, SyncSettings, TRACKED_KINDS};
pub use error::{StoreError, SyncError, SyncResult};
pub use repository::{
    PersistedWorkout, SqliteWatermarkStore, SqliteWorkoutRepository, WatermarkStore,
    WorkoutHandle, WorkoutRepository,
};
pub use routes::{Route, RouteFetcher};
pub use simplify::simplify;
