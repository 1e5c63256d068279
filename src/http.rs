use crate::collectors::HostProbe;
use crate::health::{HealthSnapshot, StatsError, StatsOptions};
use crate::metrics::Metrics;
use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header::CONTENT_TYPE, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

pub struct HttpAppState<P> {
    pub metrics: Arc<Metrics>,
    pub snapshot: HealthSnapshot<P>,
}

impl<P> Clone for HttpAppState<P> {
    fn clone(&self) -> Self {
        Self {
            metrics: self.metrics.clone(),
            snapshot: self.snapshot.clone(),
        }
    }
}

#[derive(Debug, serde::Serialize)]
struct ApiError {
    error: String,
}

pub fn build_router<P: HostProbe + 'static>(
    metrics: Arc<Metrics>,
    snapshot: HealthSnapshot<P>,
) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/health", get(health_handler::<P>))
        .route("/api/stats", get(stats_handler::<P>))
        .route("/metrics", get(metrics_handler::<P>))
        .with_state(HttpAppState { metrics, snapshot })
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn stats_handler<P: HostProbe + 'static>(
    State(state): State<HttpAppState<P>>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let options = match parse_options(&params) {
        Ok(options) => options,
        Err(err) => return failure(&state.metrics, err),
    };
    match state.snapshot.get_stats(Some(&options)).await {
        Ok(snapshot) => Json(snapshot).into_response(),
        Err(err) => failure(&state.metrics, err),
    }
}

async fn health_handler<P: HostProbe + 'static>(State(state): State<HttpAppState<P>>) -> Response {
    match state.snapshot.get_stats(None).await {
        Ok(snapshot) => {
            let status = if snapshot.is_healthy {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(snapshot)).into_response()
        }
        Err(err) => failure(&state.metrics, err),
    }
}

async fn metrics_handler<P: HostProbe + 'static>(
    State(state): State<HttpAppState<P>>,
) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("ошибка кодирования метрик: {err}"),
        )
            .into_response(),
    }
}

/// Builds overrides from raw query parameters. Empty values count as absent;
/// values that do not parse are reported as `OperationFailed`.
fn parse_options(params: &HashMap<String, String>) -> Result<StatsOptions, StatsError> {
    Ok(StatsOptions {
        cpu_utilization: parse_param(params, "cpuUtilization")?,
        available_memory: parse_param(params, "availableMemory")?,
        disk_space: parse_param(params, "diskSpace")?,
        interval: parse_param::<u32>(params, "interval").map_err(|_| {
            StatsError::OperationFailed(format!(
                "недопустимый интервал {}: ожидается 1, 5 или 15",
                params.get("interval").map(String::as_str).unwrap_or_default()
            ))
        })?,
        alias: params
            .get("alias")
            .filter(|alias| !alias.is_empty())
            .cloned(),
    })
}

fn parse_param<T: FromStr>(
    params: &HashMap<String, String>,
    key: &str,
) -> Result<Option<T>, StatsError> {
    match params.get(key).map(|raw| raw.trim()) {
        None | Some("") => Ok(None),
        Some(raw) => raw.parse().map(Some).map_err(|_| {
            StatsError::OperationFailed(format!("недопустимое значение {key}: {raw}"))
        }),
    }
}

fn failure(metrics: &Metrics, err: StatsError) -> Response {
    warn!(error = %err, "запрос состояния хоста завершился ошибкой");
    metrics.inc_sample_error("http");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError {
            error: err.to_string(),
        }),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::{NetInterface, ProbeError};
    use crate::config::Thresholds;
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::path::Path;
    use tower::ServiceExt;

    struct StaticProbe {
        load: f64,
    }

    impl HostProbe for StaticProbe {
        fn load_average(&self) -> Result<[f64; 3], ProbeError> {
            Ok([self.load; 3])
        }

        fn logical_cores(&self) -> Result<usize, ProbeError> {
            Ok(2)
        }

        fn available_memory_bytes(&self) -> Result<u64, ProbeError> {
            Ok(4_000_000_000)
        }

        fn interfaces(&self) -> Result<Vec<NetInterface>, ProbeError> {
            Ok(Vec::new())
        }

        fn free_disk_bytes(&self, _path: &Path) -> Result<u64, ProbeError> {
            Ok(10_000_000_000)
        }
    }

    fn app(load: f64) -> (Router, Arc<Metrics>) {
        let metrics = Metrics::new().expect("инициализация метрик");
        let snapshot = HealthSnapshot::new(StaticProbe { load }, Thresholds::default(), "/");
        (build_router(metrics.clone(), snapshot), metrics)
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(bytes.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn healthz_returns_ok() {
        let (app, _) = app(0.5);
        let (status, body) = get_body(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "ok");
    }

    #[tokio::test]
    async fn stats_applies_query_overrides() {
        let (app, _) = app(0.5);
        let (status, body) = get_body(
            app,
            "/api/stats?availableMemory=256&interval=15&alias=web-1&unknown=x",
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["cpuUtilization"], 0.25);
        assert_eq!(json["availableMemory"], 4.0);
        assert_eq!(json["diskSpace"], 10.0);
        assert_eq!(json["interval"], 15);
        assert_eq!(json["alias"], "web-1");
        assert_eq!(json["isHealthy"], false);
    }

    #[tokio::test]
    async fn stats_with_bad_interval_is_an_error() {
        let (app, metrics) = app(0.5);
        let (status, body) = get_body(app, "/api/stats?interval=7").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("\"error\""));
        assert_eq!(
            metrics
                .agent_sample_errors_total
                .with_label_values(&["http"])
                .get(),
            1.0
        );
    }

    #[tokio::test]
    async fn stats_with_non_numeric_interval_is_an_error() {
        for uri in ["/api/stats?interval=A", "/api/stats?interval=1.25"] {
            let (app, metrics) = app(0.5);
            let (status, body) = get_body(app, uri).await;

            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR, "{uri}");
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            let message = json["error"].as_str().unwrap();
            assert!(message.contains("недопустимый интервал"), "{message}");
            assert_eq!(
                metrics
                    .agent_sample_errors_total
                    .with_label_values(&["http"])
                    .get(),
                1.0
            );
        }
    }

    #[tokio::test]
    async fn stats_ignores_empty_overrides() {
        let (app, _) = app(0.5);
        let (status, body) =
            get_body(app, "/api/stats?cpuUtilization=&interval=&alias=").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["interval"], 1);
        assert_eq!(json["isHealthy"], true);
        assert!(json.get("alias").is_none());
    }

    #[tokio::test]
    async fn stats_with_non_numeric_threshold_is_an_error() {
        let (app, _) = app(0.5);
        let (status, body) = get_body(app, "/api/stats?diskSpace=lots").await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.contains("diskSpace"));
    }

    #[tokio::test]
    async fn health_reports_service_unavailable_when_overloaded() {
        let (healthy, _) = app(0.5);
        let (status, _) = get_body(healthy, "/health").await;
        assert_eq!(status, StatusCode::OK);

        let (overloaded, _) = app(4.0);
        let (status, body) = get_body(overloaded, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("\"isHealthy\":false"));
    }

    #[tokio::test]
    async fn metrics_contains_uptime() {
        let (app, metrics) = app(0.5);
        let (status, body) = get_body(app, "/metrics").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("agent_uptime_seconds"));
        assert_eq!(metrics.agent_scrape_count_total.get(), 1.0);
    }
}
