//! # SSE Session
//!
//! Push a finite sequence of events to a single client over one long-lived
//! Server-Sent Events response.
//!
//! ## Features
//!
//! - **Auth Gate**: Implement `AuthGate` (or use `BearerTokenGate`) to check a request before any header is sent
//! - **Pluggable Event Sources**: Implement `EventSource` to produce the events and the delays between them
//! - **Heartbeats**: Comment frames keep proxies from timing out during long gaps
//! - **Clean Teardown**: Exactly one terminal frame, and the heartbeat never outlives the session
//! - **Pluggable Transport**: Implement `FrameSink` to stream into anything; `Flushable` is an optional capability
//! - **Built-in Endpoint**: Axum route with low-latency streaming headers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use sse_session::{DelayPolicy, GeneratedSource, StreamEndpoint, StreamEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let source = GeneratedSource::new(5, |n, _| {
//!         StreamEvent::progress(format!("step_{n}"), format!("Processing step {n}"))
//!     })
//!     .with_delay(DelayPolicy::Fixed(Duration::from_secs(1)));
//!
//!     let app = axum::Router::new().route("/stream", StreamEndpoint::new(source).into_route());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//!     sse_session::serve(listener, app, std::future::pending()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## With Authentication
//!
//! ```rust,ignore
//! use sse_session::{BearerTokenGate, StreamEndpoint};
//!
//! let gate = BearerTokenGate::new().with_token("secret", "dev@example.com");
//! let route = StreamEndpoint::new(source).auth(gate).into_route();
//! ```
//!
//! ## Driving a Session Directly
//!
//! ```rust,ignore
//! use sse_session::{MemorySink, ScriptedSource, Session, SessionConfig, EventSource};
//!
//! let sink = MemorySink::new();
//! let session = Session::new(sink.clone(), SessionConfig::default());
//! let outcome = session.run(ScriptedSource::default().produce(None)).await;
//! println!("{}", sink.text());
//! ```

pub mod auth;
mod error;
mod event;
pub mod frame;
mod heartbeat;
mod session;
pub mod sink;
pub mod source;
mod endpoint;

// Re-exports
pub use auth::{auth_fn, AuthGate, AuthRequest, BearerTokenGate, Identity, Rejected};
pub use error::{EmissionError, Error, Result};
pub use event::{EventKind, StreamEvent};
pub use heartbeat::{HeartbeatHandle, HeartbeatStopper, HeartbeatTicker, DEFAULT_HEARTBEAT_INTERVAL};
pub use session::{Session, SessionConfig, SessionOutcome, SessionState};
pub use sink::{ChannelSink, FrameBody, FrameSink, Flushable, MemorySink, SinkOp};
pub use source::{DelayPolicy, EventSource, EventStream, GeneratedSource, ScriptedSource, SourceItem};
pub use endpoint::{serve, stream_response, StreamEndpoint};

// Re-export commonly used types from dependencies
pub use async_trait::async_trait;
pub use tokio_util::sync::CancellationToken;
