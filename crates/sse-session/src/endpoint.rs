//! Axum wiring: turn a request into an authenticated SSE session

use std::future::Future;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::OriginalUri,
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, MethodRouter},
    Router,
};
use tokio::net::TcpListener;

use crate::auth::{self, AuthGate, AuthRequest};
use crate::session::{Session, SessionConfig, SessionOutcome};
use crate::sink::{ChannelSink, FrameBody};
use crate::source::EventSource;

/// An SSE endpoint: one event source, an optional auth gate, session settings
#[derive(Clone)]
pub struct StreamEndpoint {
    source: Arc<dyn EventSource>,
    auth: Option<Arc<dyn AuthGate>>,
    config: SessionConfig,
}

impl StreamEndpoint {
    /// Create an unauthenticated endpoint streaming from `source`
    pub fn new(source: impl EventSource) -> Self {
        Self {
            source: Arc::new(source),
            auth: None,
            config: SessionConfig::default(),
        }
    }

    /// Require the auth gate to accept every request
    pub fn auth(mut self, gate: impl AuthGate) -> Self {
        self.auth = Some(Arc::new(gate));
        self
    }

    /// Replace the session settings
    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle one request
    ///
    /// Rejected requests get a `401` JSON body and never see stream headers.
    /// Accepted requests get the stream response at once; the session runs
    /// on its own task.
    pub async fn handle(&self, request: AuthRequest) -> Response {
        let (sink, body) = ChannelSink::new(self.config.channel_capacity);
        let mut session = Session::new(sink, self.config.clone());

        if session
            .authenticate(self.auth.as_deref(), &request)
            .await
            .is_err()
        {
            return auth::unauthorized();
        }

        if let Err(e) = session.open().await {
            tracing::error!(session_id = %session.id(), error = %e, "Failed to open stream");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Failed to open stream").into_response();
        }

        let events = self.source.produce(session.identity());
        let source = self.source.name();
        tracing::info!(
            session_id = %session.id(),
            path = request.path(),
            client_ip = ?request.client_ip,
            source,
            "New SSE stream"
        );

        tokio::spawn(async move {
            let session_id = session.id().to_string();
            match session.run(events).await {
                SessionOutcome::Failed { events, message } => {
                    tracing::warn!(session_id = %session_id, events, error = %message, "Stream failed");
                }
                outcome => {
                    tracing::debug!(session_id = %session_id, ?outcome, "Stream closed");
                }
            }
        });

        stream_response(body)
    }

    /// A `GET` route serving this endpoint
    pub fn into_route<S>(self) -> MethodRouter<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let endpoint = Arc::new(self);
        get(
            move |method: Method, OriginalUri(uri): OriginalUri, headers: HeaderMap| {
                let endpoint = endpoint.clone();
                async move { endpoint.handle(AuthRequest::new(method, uri, headers)).await }
            },
        )
    }
}

/// Build the `200` streaming response around a frame body
///
/// Hyper frames the unsized body with chunked transfer encoding.
pub fn stream_response(body: FrameBody) -> Response {
    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = StatusCode::OK;
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/event-stream; charset=utf-8"),
    );
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, no-transform, must-revalidate"),
    );
    headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    headers.insert("x-accel-buffering", HeaderValue::from_static("no"));
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("identity"));
    response
}

/// Serve `app` with low-latency sockets until `shutdown` resolves
///
/// Accepted connections get `TCP_NODELAY` so small frames are not held back
/// by Nagle's algorithm. No idle timeout is applied.
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> crate::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    use axum::serve::ListenerExt;

    let listener = listener.tap_io(|tcp| {
        if let Err(e) = tcp.set_nodelay(true) {
            tracing::warn!(error = %e, "Failed to set TCP_NODELAY");
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}
