use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    middleware,
    routing::get,
};
use metrics_util::debugging::{DebuggingRecorder, Snapshotter};
use portfolio::cache::{CacheConfig, CacheKey, CacheOptions, ServerCache};
use portfolio::client::{ClientCache, stale_while_revalidate};
use portfolio::infra::http::{RateLimiter, RatePolicy, RequestGate, RouteRateLimits};
use serial_test::serial;
use tower::ServiceExt;

fn snapshotter() -> &'static Snapshotter {
    static SNAPSHOTTER: OnceLock<Snapshotter> = OnceLock::new();
    SNAPSHOTTER.get_or_init(|| {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        recorder
            .install()
            .expect("debug metrics recorder should install in this test process");
        snapshotter
    })
}

fn recorded_names() -> HashSet<String> {
    snapshotter()
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect()
}

#[tokio::test]
#[serial]
async fn server_cache_paths_emit_expected_metric_keys() {
    snapshotter();

    let cache = ServerCache::new(CacheConfig {
        max_entries: 1,
        ..Default::default()
    });
    let options = CacheOptions::new(Duration::from_secs(60)).tag("projects");

    for key in [
        CacheKey::list("projects"),
        CacheKey::list("projects"),
        CacheKey::list("skills"),
    ] {
        let value: u32 = cache
            .get_cached(&key, options.clone(), || async { Ok::<_, String>(1) })
            .await
            .expect("producer succeeds");
        assert_eq!(value, 1);
    }

    let names = recorded_names();
    for metric in [
        "portfolio_cache_hit_total",
        "portfolio_cache_miss_total",
        "portfolio_cache_evict_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}

#[tokio::test]
#[serial]
async fn gate_and_client_paths_emit_expected_metric_keys() {
    snapshotter();

    let gate = RequestGate::new(
        Arc::new(RateLimiter::new()),
        RouteRateLimits::new(RatePolicy::per_seconds(1, 60)),
    );
    let app = Router::new()
        .route("/api/skills", get(|| async { StatusCode::OK }))
        .layer(middleware::from_fn_with_state(
            gate,
            portfolio::infra::http::rate_limit,
        ));

    let mut statuses = Vec::new();
    for _ in 0..2 {
        let request = Request::builder()
            .method(Method::GET)
            .uri("/api/skills")
            .header("x-forwarded-for", "192.0.2.44")
            .body(Body::empty())
            .expect("request should build");
        let response = app
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond");
        statuses.push(response.status());
    }
    assert_eq!(statuses, [StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]);

    let client_cache = Arc::new(ClientCache::new());
    client_cache.set("skills", &1u32, Duration::from_secs(60));
    let read = stale_while_revalidate(&client_cache, "skills", Duration::from_secs(60), || async {
        Ok::<_, String>(2u32)
    })
    .await
    .expect("cached read");
    assert_eq!(read.settled().await, 2);

    let names = recorded_names();
    for metric in [
        "portfolio_rate_limit_rejected_total",
        "portfolio_client_cache_revalidated_total",
    ] {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
