//! Local persistence for synced workouts.
//!
//! Writes within one sync pass accumulate in a single transaction that the
//! coordinator commits at the end; nothing is durable until [`commit`]
//! succeeds. Re-processing a workout is idempotent: the record is upserted
//! and its route points are rewritten, not duplicated. Each workout's
//! rewrite additionally runs in its own nested scope, so a workout that
//! fails partway backs out whole while the rest of the pass stands.
//!
//! [`commit`]: WorkoutRepository::commit

use crate::error::StoreError;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use trailsync_provider::{LocationSample, WorkoutRecord};

/// Opaque row handle for a persisted workout.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WorkoutHandle(i64);

/// A workout as read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct PersistedWorkout {
    pub provider_id: String,
    pub kind: String,
    pub started_at: DateTime<Utc>,
    pub samples: Vec<LocationSample>,
}

/// Storage interface for workout records and their route points.
pub trait WorkoutRepository: Send {
    fn find_or_create_workout(
        &mut self,
        record: &WorkoutRecord,
    ) -> Result<WorkoutHandle, StoreError>;
    fn append_route_points(
        &mut self,
        workout: &WorkoutHandle,
        samples: &[LocationSample],
    ) -> Result<(), StoreError>;
    /// Open a nested scope for one workout's writes inside the pass
    /// transaction.
    fn begin_rewrite(&mut self) -> Result<(), StoreError>;
    /// Keep the writes of the current scope in the pass transaction.
    fn finish_rewrite(&mut self) -> Result<(), StoreError>;
    /// Back out everything written since the scope opened, leaving the
    /// rest of the pass untouched.
    fn discard_rewrite(&mut self) -> Result<(), StoreError>;
    /// Make everything written since the last commit durable.
    fn commit(&mut self) -> Result<(), StoreError>;
    fn fetch_all_workouts(&self) -> Result<Vec<PersistedWorkout>, StoreError>;
    fn workout_count(&self) -> Result<u64, StoreError>;
}

/// Storage interface for the incremental sync watermark.
pub trait WatermarkStore: Send {
    fn load(&self) -> Result<Option<DateTime<Utc>>, StoreError>;
    fn store(&mut self, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// SQLite-backed [`WorkoutRepository`].
pub struct SqliteWorkoutRepository {
    conn: Connection,
    in_tx: bool,
}

impl SqliteWorkoutRepository {
    /// Open or create the workout database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Internal(format!("create database directory: {e}")))?;
            }
        }
        Self::from_connection(Connection::open(path)?)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS workouts (
                id INTEGER PRIMARY KEY,
                provider_id TEXT NOT NULL UNIQUE,
                kind TEXT NOT NULL,
                started_at_ms INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS route_points (
                id INTEGER PRIMARY KEY,
                workout_id INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
                latitude REAL NOT NULL,
                longitude REAL NOT NULL,
                recorded_at_ms INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_route_points_workout
                ON route_points(workout_id);
        "#,
        )?;
        Ok(Self { conn, in_tx: false })
    }

    fn ensure_tx(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            self.conn.execute_batch("BEGIN IMMEDIATE")?;
            self.in_tx = true;
        }
        Ok(())
    }
}

impl WorkoutRepository for SqliteWorkoutRepository {
    fn find_or_create_workout(
        &mut self,
        record: &WorkoutRecord,
    ) -> Result<WorkoutHandle, StoreError> {
        self.ensure_tx()?;
        self.conn.execute(
            "INSERT INTO workouts (provider_id, kind, started_at_ms) VALUES (?1, ?2, ?3)
             ON CONFLICT(provider_id) DO UPDATE SET
                 kind = excluded.kind,
                 started_at_ms = excluded.started_at_ms",
            params![
                record.id,
                record.kind.as_str(),
                record.started_at.timestamp_millis()
            ],
        )?;
        let id: i64 = self.conn.query_row(
            "SELECT id FROM workouts WHERE provider_id = ?1",
            params![record.id],
            |row| row.get(0),
        )?;
        // a re-synced workout replaces its previous track
        self.conn.execute(
            "DELETE FROM route_points WHERE workout_id = ?1",
            params![id],
        )?;
        Ok(WorkoutHandle(id))
    }

    fn append_route_points(
        &mut self,
        workout: &WorkoutHandle,
        samples: &[LocationSample],
    ) -> Result<(), StoreError> {
        if samples.is_empty() {
            return Ok(());
        }
        self.ensure_tx()?;
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO route_points (workout_id, latitude, longitude, recorded_at_ms)
             VALUES (?1, ?2, ?3, ?4)",
        )?;
        for s in samples {
            stmt.execute(params![
                workout.0,
                s.latitude,
                s.longitude,
                s.recorded_at.timestamp_millis()
            ])?;
        }
        Ok(())
    }

    fn begin_rewrite(&mut self) -> Result<(), StoreError> {
        self.ensure_tx()?;
        self.conn.execute_batch("SAVEPOINT rewrite")?;
        Ok(())
    }

    fn finish_rewrite(&mut self) -> Result<(), StoreError> {
        self.conn.execute_batch("RELEASE SAVEPOINT rewrite")?;
        Ok(())
    }

    fn discard_rewrite(&mut self) -> Result<(), StoreError> {
        self.conn
            .execute_batch("ROLLBACK TO SAVEPOINT rewrite; RELEASE SAVEPOINT rewrite")?;
        Ok(())
    }

    fn commit(&mut self) -> Result<(), StoreError> {
        if !self.in_tx {
            return Ok(());
        }
        self.in_tx = false;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // leave the connection usable for the next pass
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(e.into());
        }
        Ok(())
    }

    fn fetch_all_workouts(&self) -> Result<Vec<PersistedWorkout>, StoreError> {
        let mut header_stmt = self.conn.prepare(
            "SELECT id, provider_id, kind, started_at_ms FROM workouts ORDER BY started_at_ms",
        )?;
        let headers: Vec<(i64, String, String, i64)> = header_stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<_, _>>()?;

        let mut point_stmt = self.conn.prepare_cached(
            "SELECT latitude, longitude, recorded_at_ms FROM route_points
             WHERE workout_id = ?1 ORDER BY id",
        )?;
        let mut out = Vec::with_capacity(headers.len());
        for (id, provider_id, kind, started_ms) in headers {
            let raw: Vec<(f64, f64, i64)> = point_stmt
                .query_map(params![id], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
                })?
                .collect::<Result<_, _>>()?;
            let samples = raw
                .into_iter()
                .map(|(latitude, longitude, ms)| {
                    Ok(LocationSample {
                        latitude,
                        longitude,
                        recorded_at: timestamp_from_ms(ms)?,
                    })
                })
                .collect::<Result<Vec<_>, StoreError>>()?;
            out.push(PersistedWorkout {
                provider_id,
                kind,
                started_at: timestamp_from_ms(started_ms)?,
                samples,
            });
        }
        Ok(out)
    }

    fn workout_count(&self) -> Result<u64, StoreError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM workouts", [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

fn timestamp_from_ms(ms: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StoreError::Internal(format!("timestamp out of range: {ms}")))
}

const WATERMARK_KEY: &str = "last_synced_at";

/// SQLite-backed [`WatermarkStore`], sharing the database file with the
/// workout repository but not its connection or transaction.
pub struct SqliteWatermarkStore {
    conn: Connection,
}

impl SqliteWatermarkStore {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::from_connection(Connection::open(path)?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS sync_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
        "#,
        )?;
        Ok(Self { conn })
    }
}

impl WatermarkStore for SqliteWatermarkStore {
    fn load(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT value FROM sync_state WHERE key = ?1",
                params![WATERMARK_KEY],
                |row| row.get(0),
            )
            .optional()?;
        match raw {
            None => Ok(None),
            Some(s) => {
                let at = DateTime::parse_from_rfc3339(&s)
                    .map_err(|e| StoreError::Internal(format!("malformed watermark {s:?}: {e}")))?;
                Ok(Some(at.with_timezone(&Utc)))
            }
        }
    }

    fn store(&mut self, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO sync_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![WATERMARK_KEY, at.to_rfc3339()],
        )?;
        Ok(())
    }
}
