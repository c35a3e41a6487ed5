//! Demo SSE stream server built on `sse-session`

pub mod config;
pub mod demo_sources;

use axum::{routing::get, Router};
use sse_session::{BearerTokenGate, StreamEndpoint};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::demo_sources::{large_random_source, paced_source, BuildSource, UnfoldSource};

/// Build the router with every stream endpoint
pub fn app(config: &AppConfig) -> Router {
    let stream = &config.stream;
    let gate: BearerTokenGate = config
        .auth
        .tokens
        .iter()
        .map(|(token, subject)| (token.clone(), subject.clone()))
        .collect();

    if gate.is_empty() {
        tracing::warn!("No auth tokens configured - authenticated stream will reject every request");
    } else {
        tracing::info!(tokens = gate.len(), "Authentication enabled for build stream");
    }

    let auth_complex = StreamEndpoint::new(BuildSource::new(stream))
        .auth(gate)
        .config(stream.session_config("Build complete!"));
    let large_random =
        StreamEndpoint::new(large_random_source(stream)).config(stream.session_config("Done!"));
    let res_write =
        StreamEndpoint::new(paced_source(stream)).config(stream.session_config("Done!"));
    let transform =
        StreamEndpoint::new(UnfoldSource::new(stream)).config(stream.session_config("Done!"));

    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ready", get(|| async { "READY" }))
        .route("/api/test-stream-auth-complex", auth_complex.into_route())
        .route("/api/test-stream-large-random", large_random.into_route())
        .route("/api/test-stream-res-write", res_write.into_route())
        .route("/api/test-stream-transform", transform.into_route())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
