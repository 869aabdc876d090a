use chrono::{TimeZone, Utc};
use criterion::{Criterion, criterion_group, criterion_main};
use secrecy::SecretString;
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Builder;
use trailsync_engine::routes::RouteFetcher;
use trailsync_engine::simplify::simplify;
use trailsync_provider::http_client::ReqwestHealthProvider;
use trailsync_provider::{ActivityKind, LocationSample, WorkoutRecord};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn synthetic_track(len: usize) -> Vec<LocationSample> {
    let base = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
    (0..len)
        .map(|i| LocationSample {
            latitude: 47.0 + (i as f64) * 0.00004 + ((i % 7) as f64) * 0.00001,
            longitude: 8.0 + ((i % 13) as f64) * 0.00002,
            recorded_at: base + chrono::Duration::seconds(i as i64),
        })
        .collect()
}

fn bench_simplify_track(c: &mut Criterion) {
    let track = synthetic_track(10_000);
    c.bench_function("simplify_10k_points", |b| {
        b.iter(|| simplify(black_box(&track), black_box(10.0)))
    });
}

fn bench_fetch_route(c: &mut Criterion) {
    let rt = Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("tokio runtime");

    let server = rt.block_on(async {
        let server = MockServer::start().await;
        let samples: Vec<serde_json::Value> = (0..500)
            .map(|i| {
                serde_json::json!({
                    "latitude": 47.0 + (i as f64) * 0.0001,
                    "longitude": 8.0,
                    "recorded_at": "2026-03-01T06:00:00Z"
                })
            })
            .collect();
        Mock::given(method("GET"))
            .and(path("/api/v1/workouts/w1/routes"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!([{"id": "r1"}])),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/v1/routes/r1/samples"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "samples": samples,
                "last": true
            })))
            .mount(&server)
            .await;
        server
    });

    let provider = ReqwestHealthProvider::new(
        &server.uri(),
        "u1",
        SecretString::new("tok".into()),
    );
    let fetcher = RouteFetcher::new(Arc::new(provider), Duration::from_secs(5));
    let workout = WorkoutRecord {
        id: "w1".into(),
        kind: ActivityKind::Running,
        started_at: Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap(),
        indoor: false,
    };

    c.bench_function("fetch_route_500_samples", |b| {
        b.to_async(&rt).iter(|| {
            let fetcher = fetcher.clone();
            let workout = workout.clone();
            async move {
                let routes = fetcher.fetch_routes(&workout).await.expect("routes");
                assert_eq!(routes[0].samples.len(), 500);
            }
        })
    });
}

criterion_group!(benches, bench_simplify_track, bench_fetch_route);
criterion_main!(benches);
