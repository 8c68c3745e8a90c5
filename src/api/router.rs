use std::time::{Duration, Instant};

use axum::extract::{MatchedPath, Request};
use axum::http::header::{HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderName, Method};
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::normalize_path::NormalizePathLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

use crate::api::{attempts, handlers};
use crate::core::{config::CorsSettings, state::AppState};

const REQUEST_ID: &str = "x-request-id";

pub(crate) fn router(state: AppState) -> Router {
    let settings = state.settings();

    let mut app = Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz).head(handlers::healthz))
        .nest(&settings.api().api_v1_str, api_routes());
    if settings.telemetry().prometheus_enabled {
        app = app.route("/metrics", get(handlers::metrics));
    }

    let app = app.route_layer(middleware::from_fn(track_requests));
    with_middleware(app, settings.cors()).with_state(state)
}

fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/attempts", attempts::router())
        .nest("/attempt-answers", attempts::answers_router())
}

fn with_middleware(app: Router<AppState>, cors: &CorsSettings) -> Router<AppState> {
    let request_id = HeaderName::from_static(REQUEST_ID);

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request| {
        let request_id = request
            .headers()
            .get(REQUEST_ID)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "http",
            method = %request.method(),
            path = %request.uri().path(),
            request_id = %request_id,
        )
    });

    app.layer(NormalizePathLayer::trim_trailing_slash())
        .layer(PropagateRequestIdLayer::new(request_id.clone()))
        .layer(trace)
        .layer(SetRequestIdLayer::new(request_id, MakeRequestUuid))
        .layer(cors_layer(cors))
}

/// Counts requests per route template so ids do not explode label cardinality.
async fn track_requests(request: Request, next: Next) -> Response {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());
    let method = request.method().to_string();
    let started = Instant::now();

    let response = next.run(request).await;

    let labels = [
        ("method", method),
        ("route", route),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels[..]).increment(1);
    metrics::histogram!("http_request_duration_seconds", &labels[..])
        .record(started.elapsed().as_secs_f64());

    response
}

fn cors_layer(cors: &CorsSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> =
        cors.origins.iter().filter_map(|origin| origin.parse().ok()).collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE, ACCEPT, HeaderName::from_static(REQUEST_ID)])
        .expose_headers([HeaderName::from_static(REQUEST_ID)])
        .max_age(Duration::from_secs(600))
}
