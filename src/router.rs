use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Request},
    middleware, Router,
};
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tower::{Layer, ServiceBuilder};
use tower_http::{
    normalize_path::NormalizePathLayer,
    request_id::{MakeRequestId, RequestId},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
    timeout::TimeoutLayer,
    trace::{DefaultOnFailure, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    LatencyUnit, ServiceBuilderExt,
};
use tracing::Level;

use crate::{
    auth::{self, sessions_middleware, unconfirmed_middleware},
    carpool,
    state::AppState,
    website::error_404,
};

pub fn get_router(state: AppState) -> Router {
    let sensitive_headers: Arc<[_]> = vec![axum::http::header::COOKIE].into();
    let middleware = ServiceBuilder::new()
        .layer(SetSensitiveRequestHeadersLayer::from_shared(
            sensitive_headers.clone(),
        ))
        .set_x_request_id(CounterRequestId::default())
        .layer(
            TraceLayer::new_for_http()
                .on_request(DefaultOnRequest::new())
                .on_response(
                    DefaultOnResponse::new()
                        .level(Level::INFO)
                        .latency_unit(LatencyUnit::Micros),
                )
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
        .sensitive_response_headers(sensitive_headers)
        .layer(TimeoutLayer::new(Duration::from_secs(10)))
        .compression()
        .propagate_x_request_id()
        .insert_response_header_if_not_present(
            CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );

    Router::new()
        .merge(carpool::routes())
        .merge(auth::routes())
        .fallback(error_404)
        .layer(middleware::from_fn(unconfirmed_middleware))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            sessions_middleware,
        ))
        .layer(middleware)
        .with_state(state)
}

/// Wraps the router so trailing slashes are trimmed before routing.
pub fn get_app(state: AppState) -> NormalizedApp {
    NormalizePathLayer::trim_trailing_slash().layer(get_router(state))
}

pub type NormalizedApp = tower_http::normalize_path::NormalizePath<Router>;

#[derive(Clone, Default)]
struct CounterRequestId {
    counter: Arc<AtomicU64>,
}

impl MakeRequestId for CounterRequestId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        self.counter
            .fetch_add(1, Ordering::SeqCst)
            .to_string()
            .parse()
            .ok()
            .map(RequestId::new)
    }
}
