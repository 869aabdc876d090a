//! Route segment fetching and chunk reassembly.

use crate::error::SyncResult;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use trailsync_provider::{HealthDataProvider, LocationSample, WorkoutRecord};

/// One completed route segment of a workout.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Route {
    pub samples: Vec<LocationSample>,
}

/// Fetches all route segments of a workout, reassembling each segment from
/// its chunk stream.
#[derive(Clone)]
pub struct RouteFetcher {
    provider: Arc<dyn HealthDataProvider>,
    chunk_timeout: Duration,
}

impl RouteFetcher {
    pub fn new(provider: Arc<dyn HealthDataProvider>, chunk_timeout: Duration) -> Self {
        Self {
            provider,
            chunk_timeout,
        }
    }

    /// Fetch every route segment of `workout`.
    ///
    /// Segments are collected concurrently but the returned list preserves
    /// the provider's segment order. A workout without route segments yields
    /// an empty list.
    pub async fn fetch_routes(&self, workout: &WorkoutRecord) -> SyncResult<Vec<Route>> {
        let refs = self.provider.query_workout_routes(&workout.id).await?;
        if refs.is_empty() {
            return Ok(Vec::new());
        }
        let segments = join_all(refs.into_iter().map(|r| self.collect_segment(r))).await;
        segments.into_iter().collect()
    }

    /// Drain one segment's chunk stream until the terminal chunk, an
    /// unresponsive stream, or channel close.
    ///
    /// A failed chunk only costs its own samples; the segment still
    /// finalizes with everything received around it.
    async fn collect_segment(&self, route: trailsync_provider::RouteRef) -> SyncResult<Route> {
        let mut chunks = self.provider.query_route_samples(&route).await?;
        let mut samples = Vec::new();
        loop {
            match tokio::time::timeout(self.chunk_timeout, chunks.recv()).await {
                Err(_) => {
                    warn!(
                        route = %route.id,
                        "timed out waiting for route chunk, keeping partial segment"
                    );
                    break;
                }
                Ok(Some(Ok(chunk))) => {
                    let is_last = chunk.is_last;
                    samples.extend(chunk.samples);
                    if is_last {
                        break;
                    }
                }
                Ok(Some(Err(e))) => {
                    warn!(route = %route.id, error = %e, "dropping failed route chunk");
                }
                Ok(None) => break,
            }
        }
        Ok(Route { samples })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use std::collections::HashMap;
    use trailsync_provider::{
        ActivityKind, ProviderError, RouteChunk, RouteChunkStream, RouteRef,
    };

    /// What a scripted route stream should emit next.
    #[derive(Clone)]
    enum Emit {
        Chunk(Vec<f64>, bool),
        Fail,
        Stall,
    }

    struct ScriptedProvider {
        routes: Vec<RouteRef>,
        scripts: HashMap<String, Vec<Emit>>,
    }

    fn sample(latitude: f64) -> LocationSample {
        LocationSample {
            latitude,
            longitude: 8.0,
            recorded_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
        }
    }

    #[async_trait]
    impl HealthDataProvider for ScriptedProvider {
        async fn authorize(&self, _kinds: &[ActivityKind]) -> Result<(), ProviderError> {
            Ok(())
        }

        async fn query_workouts(
            &self,
            _kind: ActivityKind,
            _since: Option<DateTime<Utc>>,
        ) -> Result<Vec<WorkoutRecord>, ProviderError> {
            Ok(Vec::new())
        }

        async fn query_workout_routes(
            &self,
            _workout_id: &str,
        ) -> Result<Vec<RouteRef>, ProviderError> {
            Ok(self.routes.clone())
        }

        async fn query_route_samples(
            &self,
            route: &RouteRef,
        ) -> Result<RouteChunkStream, ProviderError> {
            let script = self.scripts.get(&route.id).cloned().unwrap_or_default();
            let (tx, rx) = tokio::sync::mpsc::channel(8);
            tokio::spawn(async move {
                for emit in script {
                    let event = match emit {
                        Emit::Chunk(lats, is_last) => Ok(RouteChunk {
                            samples: lats.into_iter().map(sample).collect(),
                            is_last,
                        }),
                        Emit::Fail => {
                            Err(ProviderError::Config("simulated chunk failure".into()))
                        }
                        Emit::Stall => {
                            tokio::time::sleep(Duration::from_secs(3600)).await;
                            return;
                        }
                    };
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            });
            Ok(rx)
        }
    }

    fn workout() -> WorkoutRecord {
        WorkoutRecord {
            id: "w1".into(),
            kind: ActivityKind::Running,
            started_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
            indoor: false,
        }
    }

    fn fetcher(provider: ScriptedProvider, timeout: Duration) -> RouteFetcher {
        RouteFetcher::new(Arc::new(provider), timeout)
    }

    #[tokio::test]
    async fn segments_preserve_provider_order() {
        let provider = ScriptedProvider {
            routes: vec![RouteRef { id: "r1".into() }, RouteRef { id: "r2".into() }],
            scripts: HashMap::from([
                (
                    "r1".to_string(),
                    vec![
                        Emit::Chunk(vec![1.0, 2.0], false),
                        Emit::Chunk(vec![3.0], true),
                    ],
                ),
                ("r2".to_string(), vec![Emit::Chunk(vec![9.0], true)]),
            ]),
        };
        let routes = fetcher(provider, Duration::from_secs(5))
            .fetch_routes(&workout())
            .await
            .expect("routes");
        assert_eq!(routes.len(), 2);
        let lats: Vec<f64> = routes[0].samples.iter().map(|s| s.latitude).collect();
        assert_eq!(lats, vec![1.0, 2.0, 3.0]);
        assert_eq!(routes[1].samples.len(), 1);
        assert_eq!(routes[1].samples[0].latitude, 9.0);
    }

    #[tokio::test]
    async fn error_event_between_chunks_drops_only_that_chunk() {
        let provider = ScriptedProvider {
            routes: vec![RouteRef { id: "r1".into() }],
            scripts: HashMap::from([(
                "r1".to_string(),
                vec![
                    Emit::Chunk(vec![1.0], false),
                    Emit::Fail,
                    Emit::Chunk(vec![2.0], true),
                ],
            )]),
        };
        let routes = fetcher(provider, Duration::from_secs(5))
            .fetch_routes(&workout())
            .await
            .expect("routes");
        assert_eq!(routes.len(), 1);
        let lats: Vec<f64> = routes[0].samples.iter().map(|s| s.latitude).collect();
        assert_eq!(lats, vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn failed_chunk_keeps_partial_segment() {
        let provider = ScriptedProvider {
            routes: vec![RouteRef { id: "r1".into() }],
            scripts: HashMap::from([(
                "r1".to_string(),
                vec![Emit::Chunk(vec![1.0, 2.0], false), Emit::Fail],
            )]),
        };
        let routes = fetcher(provider, Duration::from_secs(5))
            .fetch_routes(&workout())
            .await
            .expect("routes");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].samples.len(), 2);
    }

    #[tokio::test]
    async fn stalled_stream_finalizes_with_partial_segment() {
        let provider = ScriptedProvider {
            routes: vec![RouteRef { id: "r1".into() }],
            scripts: HashMap::from([(
                "r1".to_string(),
                vec![Emit::Chunk(vec![1.0], false), Emit::Stall],
            )]),
        };
        let routes = fetcher(provider, Duration::from_millis(20))
            .fetch_routes(&workout())
            .await
            .expect("routes");
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].samples.len(), 1);
    }

    #[tokio::test]
    async fn workout_without_segments_yields_empty_list() {
        let provider = ScriptedProvider {
            routes: Vec::new(),
            scripts: HashMap::new(),
        };
        let routes = fetcher(provider, Duration::from_secs(5))
            .fetch_routes(&workout())
            .await
            .expect("routes");
        assert!(routes.is_empty());
    }
}
