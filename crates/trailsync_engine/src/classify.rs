//! Projection of the persisted store into per-activity route buckets.

use crate::repository::PersistedWorkout;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use trailsync_provider::{ActivityKind, LocationSample};

/// One workout's route, ready for consumers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ClassifiedRoute {
    pub provider_id: String,
    pub started_at: DateTime<Utc>,
    pub samples: Vec<LocationSample>,
}

/// All persisted routes grouped by activity kind, each bucket ordered by
/// workout start time.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct RouteBuckets {
    pub walking: Vec<ClassifiedRoute>,
    pub running: Vec<ClassifiedRoute>,
    pub cycling: Vec<ClassifiedRoute>,
}

impl RouteBuckets {
    pub fn total_routes(&self) -> usize {
        self.walking.len() + self.running.len() + self.cycling.len()
    }
}

/// Sort each workout's samples by time and group the workouts into buckets.
///
/// Workouts whose stored kind is not one of the tracked kinds are logged
/// and left out.
pub fn classify(workouts: Vec<PersistedWorkout>) -> RouteBuckets {
    let mut buckets = RouteBuckets::default();
    for workout in workouts {
        let bucket = match ActivityKind::parse(&workout.kind) {
            Some(ActivityKind::Walking) => &mut buckets.walking,
            Some(ActivityKind::Running) => &mut buckets.running,
            Some(ActivityKind::Cycling) => &mut buckets.cycling,
            Some(ActivityKind::Other) | None => {
                warn!(
                    workout = %workout.provider_id,
                    kind = %workout.kind,
                    "untracked activity kind, leaving workout out of the snapshot"
                );
                continue;
            }
        };
        let mut samples = workout.samples;
        samples.sort_by_key(|s| s.recorded_at);
        bucket.push(ClassifiedRoute {
            provider_id: workout.provider_id,
            started_at: workout.started_at,
            samples,
        });
    }
    buckets.walking.sort_by_key(|r| r.started_at);
    buckets.running.sort_by_key(|r| r.started_at);
    buckets.cycling.sort_by_key(|r| r.started_at);
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(sec: u32) -> LocationSample {
        LocationSample {
            latitude: 47.0,
            longitude: 8.0,
            recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, sec).unwrap(),
        }
    }

    fn persisted(id: &str, kind: &str, day: u32, samples: Vec<LocationSample>) -> PersistedWorkout {
        PersistedWorkout {
            provider_id: id.into(),
            kind: kind.into(),
            started_at: Utc.with_ymd_and_hms(2026, 3, day, 6, 0, 0).unwrap(),
            samples,
        }
    }

    #[test]
    fn workouts_land_in_their_kind_bucket() {
        let buckets = classify(vec![
            persisted("w1", "walking", 1, vec![sample(0)]),
            persisted("w2", "running", 2, vec![sample(0)]),
            persisted("w3", "cycling", 3, vec![sample(0)]),
        ]);
        assert_eq!(buckets.walking.len(), 1);
        assert_eq!(buckets.running.len(), 1);
        assert_eq!(buckets.cycling.len(), 1);
        assert_eq!(buckets.total_routes(), 3);
    }

    #[test]
    fn unknown_kinds_are_skipped() {
        let buckets = classify(vec![
            persisted("w1", "swimming", 1, vec![sample(0)]),
            persisted("w2", "running", 2, vec![sample(0)]),
        ]);
        assert_eq!(buckets.total_routes(), 1);
        assert_eq!(buckets.running[0].provider_id, "w2");
    }

    #[test]
    fn samples_are_sorted_by_time() {
        let buckets = classify(vec![persisted(
            "w1",
            "running",
            1,
            vec![sample(20), sample(0), sample(10)],
        )]);
        let secs: Vec<u32> = buckets.running[0]
            .samples
            .iter()
            .map(|s| s.recorded_at.timestamp() as u32 % 60)
            .collect();
        assert_eq!(secs, vec![0, 10, 20]);
    }

    #[test]
    fn buckets_are_ordered_by_start_time() {
        let buckets = classify(vec![
            persisted("later", "running", 5, vec![sample(0)]),
            persisted("earlier", "running", 2, vec![sample(0)]),
        ]);
        let ids: Vec<&str> = buckets
            .running
            .iter()
            .map(|r| r.provider_id.as_str())
            .collect();
        assert_eq!(ids, vec!["earlier", "later"]);
    }
}
