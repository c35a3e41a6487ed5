//! Unit tests for sse-session

use axum::http::{HeaderMap, Method, StatusCode, Uri};
use futures::StreamExt;
use sse_session::{
    auth::{auth_fn, unauthorized, AuthGate, AuthRequest, BearerTokenGate, Identity, Rejected},
    frame, ChannelSink, DelayPolicy, EmissionError, Error, EventKind, EventSource, FrameSink, Flushable,
    GeneratedSource, HeartbeatTicker, MemorySink, ScriptedSource, SessionConfig, SinkOp,
    SourceItem, StreamEvent,
};
use std::sync::Arc;
use std::time::Duration;

fn request(uri: &str, headers: HeaderMap) -> AuthRequest {
    AuthRequest::new(Method::GET, uri.parse::<Uri>().unwrap(), headers)
}

// ============== StreamEvent Tests ==============

#[test]
fn test_stream_event_progress() {
    let event = StreamEvent::progress("step_1", "Processing step 1");
    assert_eq!(event.kind, EventKind::Progress);
    assert_eq!(event.step, "step_1");
    assert!(event.data.is_none());
    assert!(!event.is_terminal());
}

#[test]
fn test_stream_event_terminal_kinds() {
    let complete = StreamEvent::complete("Build complete!");
    assert_eq!(complete.kind, EventKind::Complete);
    assert_eq!(complete.step, "complete");
    assert!(complete.is_terminal());

    let error = StreamEvent::error("boom");
    assert_eq!(error.kind, EventKind::Error);
    assert_eq!(error.step, "error");
    assert_eq!(error.message, "boom");
    assert!(error.is_terminal());
}

#[test]
fn test_stream_event_serialization_omits_kind_and_empty_data() {
    let json = serde_json::to_value(StreamEvent::progress("s", "m")).unwrap();
    assert_eq!(json, serde_json::json!({"step": "s", "message": "m"}));

    let json = serde_json::to_value(
        StreamEvent::progress("s", "m").with_data(serde_json::json!({"n": 1})),
    )
    .unwrap();
    assert_eq!(json["data"]["n"], 1);
    assert!(json.get("kind").is_none());
}

// ============== Frame Encoder Tests ==============

#[test]
fn test_encode_data_frame() {
    let bytes = frame::encode(&StreamEvent::progress("step_1", "hi"));
    assert_eq!(&bytes[..], b"data: {\"step\":\"step_1\",\"message\":\"hi\"}\n\n");
}

#[test]
fn test_encode_keeps_payload_on_one_line() {
    let event = StreamEvent::progress("code", "line1\nline2")
        .with_data(serde_json::json!({"code": "fn main() {\n    run();\n}"}));
    let text = String::from_utf8(frame::encode(&event).to_vec()).unwrap();

    assert!(text.starts_with("data: "));
    assert!(text.ends_with("\n\n"));
    assert_eq!(text.matches('\n').count(), 2);

    let parsed = frame::parse_data_lines(&text);
    assert_eq!(parsed.len(), 1);
    assert_eq!(parsed[0]["message"], "line1\nline2");
}

#[test]
fn test_comment_frame() {
    assert_eq!(&frame::comment("heartbeat")[..], b": heartbeat\n\n");
    assert_eq!(&frame::comment("a\nb\rc")[..], b": a b c\n\n");
}

#[test]
fn test_parse_data_lines_ignores_comments() {
    let text = ": stream-start\n\n\
                data: {\"step\":\"step_1\",\"message\":\"a\"}\n\n\
                : heartbeat\n\n\
                data: {\"step\":\"complete\",\"message\":\"done\"}\n\n";

    let data = frame::parse_data_lines(text);
    assert_eq!(data.len(), 2);
    assert_eq!(data[0]["step"], "step_1");
    assert_eq!(data[1]["step"], "complete");
    assert_eq!(frame::count_comments(text, "heartbeat"), 1);
    assert_eq!(frame::count_comments(text, "stream-start"), 1);
}

// ============== AuthRequest Tests ==============

#[test]
fn test_auth_request_bearer_token() {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer my-secret-token".parse().unwrap());

    let req = request("/api/test-stream-auth-complex", headers);
    assert_eq!(req.bearer_token(), Some("my-secret-token"));
}

#[test]
fn test_auth_request_header_and_query() {
    let mut headers = HeaderMap::new();
    headers.insert("x-custom", "value123".parse().unwrap());
    headers.insert("x-forwarded-for", "1.2.3.4, 10.0.0.1".parse().unwrap());

    let req = request("/api/stream?token=abc&foo=bar", headers);

    assert_eq!(req.header("x-custom"), Some("value123"));
    assert_eq!(req.header("non-existent"), None);
    assert_eq!(req.path(), "/api/stream");
    assert_eq!(req.query_param("foo"), Some("bar"));
    assert_eq!(req.query_param("token"), Some("abc"));
    assert_eq!(req.client_ip.as_deref(), Some("1.2.3.4"));
}

#[test]
fn test_auth_request_cookie() {
    let mut headers = HeaderMap::new();
    headers.insert("cookie", "theme=dark; session=s3cr3t".parse().unwrap());

    let req = request("/", headers);
    assert_eq!(req.cookie("session"), Some("s3cr3t"));
    assert_eq!(req.cookie("theme"), Some("dark"));
    assert_eq!(req.cookie("missing"), None);
}

// ============== AuthGate Tests ==============

#[tokio::test]
async fn test_bearer_gate_accepts_known_token() {
    let gate = BearerTokenGate::new().with_token("t1", "dev@example.com");
    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer t1".parse().unwrap());

    let identity = gate.authenticate(&request("/", headers)).await.unwrap();
    assert_eq!(identity, Identity::new("dev@example.com"));
}

#[tokio::test]
async fn test_bearer_gate_accepts_query_token() {
    let gate: BearerTokenGate = [("t2", "ops@example.com")].into_iter().collect();
    let identity = gate
        .authenticate(&request("/?token=t2", HeaderMap::new()))
        .await
        .unwrap();
    assert_eq!(identity.subject, "ops@example.com");
}

#[tokio::test]
async fn test_bearer_gate_rejects_missing_and_unknown() {
    let gate = BearerTokenGate::new().with_token("t1", "dev@example.com");

    let missing = gate.authenticate(&request("/", HeaderMap::new())).await;
    assert_eq!(missing, Err(Rejected::new("missing token")));

    let unknown = gate.authenticate(&request("/?token=nope", HeaderMap::new())).await;
    assert_eq!(unknown, Err(Rejected::new("unknown token")));
}

#[tokio::test]
async fn test_bearer_gate_from_pairs() {
    let gate: BearerTokenGate = vec![("t1", "a@example.com"), ("t2", "b@example.com")]
        .into_iter()
        .collect();
    assert_eq!(gate.len(), 2);

    let mut headers = HeaderMap::new();
    headers.insert("authorization", "Bearer t2".parse().unwrap());
    let identity = gate.authenticate(&request("/", headers)).await.unwrap();
    assert_eq!(identity.subject, "b@example.com");
}

#[tokio::test]
async fn test_auth_fn_gate() {
    let gate = auth_fn(|req: AuthRequest| async move {
        req.header("x-user")
            .map(Identity::new)
            .ok_or_else(|| Rejected::new("no user"))
    });

    let mut headers = HeaderMap::new();
    headers.insert("x-user", "alice@example.com".parse().unwrap());
    assert!(gate.authenticate(&request("/", headers)).await.is_ok());
    assert!(gate.authenticate(&request("/", HeaderMap::new())).await.is_err());
}

#[tokio::test]
async fn test_unauthorized_response() {
    let response = unauthorized();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, serde_json::json!({"error": "Unauthorized"}));
}

// ============== EventSource Tests ==============

#[tokio::test]
async fn test_scripted_source_yields_in_order() {
    let source = ScriptedSource::new(vec![
        SourceItem::new(StreamEvent::progress("a", "1")),
        SourceItem::new(StreamEvent::progress("b", "2")).with_delay(Duration::from_millis(5)),
    ]);

    let items: Vec<_> = source.produce(None).collect().await;
    assert_eq!(items.len(), 2);
    let first = items[0].as_ref().unwrap();
    let second = items[1].as_ref().unwrap();
    assert_eq!(first.event.step, "a");
    assert_eq!(first.delay, None);
    assert_eq!(second.delay, Some(Duration::from_millis(5)));
}

#[tokio::test]
async fn test_scripted_source_fail_after() {
    let events = (1..=5).map(|i| StreamEvent::progress(format!("step_{i}"), "x"));
    let source = ScriptedSource::from_events(events, DelayPolicy::None).fail_after(2, "upstream down");

    let items: Vec<_> = source.produce(None).collect().await;
    assert_eq!(items.len(), 3);
    assert!(items[0].is_ok());
    assert!(items[1].is_ok());
    assert_eq!(items[2].as_ref().unwrap_err().to_string(), "upstream down");
}

#[tokio::test]
async fn test_scripted_source_is_fresh_per_session() {
    let source = ScriptedSource::from_events([StreamEvent::progress("a", "1")], DelayPolicy::None);
    assert_eq!(source.produce(None).count().await, 1);
    assert_eq!(source.produce(None).count().await, 1);
}

#[tokio::test]
async fn test_generated_source_reports_delay() {
    let source = GeneratedSource::new(3, |n, delay| {
        let ms = delay.map_or(0, |d| d.as_millis());
        StreamEvent::progress(format!("step_{n}"), format!("Processing step {n} (delay: {ms}ms)"))
    })
    .with_delay(DelayPolicy::Fixed(Duration::from_millis(250)));

    let items: Vec<_> = source.produce(None).collect().await;
    assert_eq!(items.len(), 3);
    let last = items[2].as_ref().unwrap();
    assert_eq!(last.event.step, "step_3");
    assert_eq!(last.event.message, "Processing step 3 (delay: 250ms)");
    assert_eq!(last.delay, Some(Duration::from_millis(250)));
}

#[tokio::test]
async fn test_scripted_source_samples_delay_per_session() {
    let events = (1..=4).map(|i| StreamEvent::progress(format!("step_{i}"), "x"));
    let source = ScriptedSource::from_events(events, DelayPolicy::RandomUpTo(Duration::from_secs(3600)));

    let delays = |items: Vec<anyhow::Result<SourceItem>>| -> Vec<Option<Duration>> {
        items.into_iter().map(|item| item.unwrap().delay).collect()
    };
    let first = delays(source.produce(None).collect().await);
    let second = delays(source.produce(None).collect().await);

    assert!(first.iter().chain(&second).all(|d| d.is_some_and(|d| d < Duration::from_secs(3600))));
    assert_ne!(first, second);
}

#[tokio::test]
async fn test_scripted_source_fixed_delay() {
    let events = (1..=2).map(|i| StreamEvent::progress(format!("step_{i}"), "x"));
    let source = ScriptedSource::from_events(events, DelayPolicy::Fixed(Duration::from_millis(40)));

    let items: Vec<_> = source.produce(None).collect().await;
    for item in items {
        assert_eq!(item.unwrap().delay, Some(Duration::from_millis(40)));
    }
}

// ============== SessionConfig Tests ==============

#[test]
fn test_session_config_validation() {
    assert!(SessionConfig::default().validate().is_ok());

    let no_heartbeat = SessionConfig {
        heartbeat_interval: Duration::ZERO,
        ..SessionConfig::default()
    };
    let err = no_heartbeat.validate().unwrap_err();
    assert!(matches!(err, Error::Config(_)));
    assert_eq!(err.to_string(), "Configuration error: heartbeat interval must be positive");

    let no_buffer = SessionConfig {
        channel_capacity: 0,
        ..SessionConfig::default()
    };
    assert!(matches!(no_buffer.validate(), Err(Error::Config(_))));
}

#[test]
fn test_io_error_conversion() {
    let err: Error = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy").into();
    assert!(matches!(err, Error::Io(_)));
    assert_eq!(err.to_string(), "IO error: busy");
}

#[test]
fn test_delay_policy() {
    assert_eq!(DelayPolicy::None.next_delay(), None);
    assert_eq!(
        DelayPolicy::Fixed(Duration::from_secs(1)).next_delay(),
        Some(Duration::from_secs(1))
    );
    for _ in 0..100 {
        let d = DelayPolicy::RandomUpTo(Duration::from_millis(30)).next_delay().unwrap();
        assert!(d < Duration::from_millis(30));
    }
    assert_eq!(
        DelayPolicy::RandomUpTo(Duration::ZERO).next_delay(),
        Some(Duration::ZERO)
    );
}

// ============== FrameSink Tests ==============

#[tokio::test]
async fn test_memory_sink_records_operations() {
    let sink = MemorySink::new();
    sink.write_frame(frame::comment("x")).await.unwrap();
    sink.close().await;
    sink.close().await;

    assert_eq!(sink.journal().len(), 2);
    assert_eq!(sink.journal()[1], SinkOp::Close);
    assert_eq!(
        sink.write_frame(frame::comment("y")).await,
        Err(EmissionError::SinkClosed)
    );
    assert_eq!(sink.attempts_after_close(), 1);
}

#[tokio::test]
async fn test_memory_sink_disconnect() {
    let sink = MemorySink::new();
    sink.disconnect();
    assert!(sink.is_closed());
    sink.closed().await;
    assert_eq!(
        sink.write_frame(frame::comment("x")).await,
        Err(EmissionError::PeerClosed)
    );
    assert_eq!(sink.attempts_after_disconnect(), 1);
}

#[tokio::test]
async fn test_channel_sink_delivers_whole_frames() {
    let (sink, mut body) = ChannelSink::new(4);
    sink.write_frame(frame::comment("stream-start")).await.unwrap();
    sink.write_frame(frame::encode(&StreamEvent::progress("a", "b"))).await.unwrap();
    sink.close().await;

    let first = body.next().await.unwrap().unwrap();
    assert_eq!(&first[..], b": stream-start\n\n");
    let second = body.next().await.unwrap().unwrap();
    assert!(second.ends_with(b"\n\n"));
    assert!(body.next().await.is_none());
    assert!(!sink.is_closed());
}

#[tokio::test]
async fn test_channel_sink_detects_dropped_body() {
    let (sink, body) = ChannelSink::new(4);
    assert!(!sink.is_closed());
    drop(body);
    assert!(sink.is_closed());
    sink.closed().await;
    assert_eq!(
        sink.write_frame(frame::comment("x")).await,
        Err(EmissionError::PeerClosed)
    );
}

#[tokio::test]
async fn test_channel_sink_not_flushable() {
    let (sink, _body) = ChannelSink::new(1);
    assert!(sink.into_flushable().is_none());
    assert!(MemorySink::new().into_flushable().is_some());
}

// ============== Heartbeat Tests ==============

#[tokio::test(start_paused = true)]
async fn test_heartbeat_fires_every_period() {
    let sink = MemorySink::new();
    let handle = HeartbeatTicker::start(Duration::from_secs(15), "heartbeat", sink.clone(), None);

    tokio::time::sleep(Duration::from_secs(50)).await;
    assert_eq!(handle.beats(), 3);
    assert_eq!(frame::count_comments(&sink.text(), "heartbeat"), 3);
    assert!(frame::parse_data_lines(&sink.text()).is_empty());
    assert!(handle.is_running());

    handle.stop();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_no_immediate_tick() {
    let sink = MemorySink::new();
    let handle = HeartbeatTicker::start(Duration::from_secs(15), "heartbeat", sink.clone(), None);

    tokio::time::sleep(Duration::from_secs(14)).await;
    assert_eq!(handle.beats(), 0);
    assert!(sink.frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_stop_is_idempotent() {
    let sink = MemorySink::new();
    let handle = HeartbeatTicker::start(Duration::from_secs(1), "heartbeat", sink.clone(), None);
    let stopper = handle.stopper();

    handle.stop();
    stopper.stop();
    handle.stop();

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(!handle.is_running());
    assert!(sink.frames().is_empty());

    handle.shutdown().await;
    stopper.stop();
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_self_cancels_on_write_failure() {
    let sink = MemorySink::new();
    sink.fail_writes_after(1);
    let handle = HeartbeatTicker::start(Duration::from_secs(1), "heartbeat", sink.clone(), None);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(handle.beats(), 1);
    assert!(!handle.is_running());
    assert_eq!(sink.frames().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_stops_when_handle_dropped() {
    let sink = MemorySink::new();
    let handle = HeartbeatTicker::start(Duration::from_secs(1), "heartbeat", sink.clone(), None);
    drop(handle);

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(sink.frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_flushes_when_flushable() {
    let sink = MemorySink::new();
    let flusher = sink.clone().into_flushable();
    let handle = HeartbeatTicker::start(Duration::from_secs(1), "heartbeat", sink.clone(), flusher);

    tokio::time::sleep(Duration::from_millis(2500)).await;
    handle.shutdown().await;
    assert_eq!(sink.flush_count(), 2);
}

struct BrokenFlush;

#[sse_session::async_trait]
impl Flushable for BrokenFlush {
    async fn flush(&self) -> Result<(), EmissionError> {
        Err(EmissionError::Failed("flush refused".to_string()))
    }
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_survives_flush_failure() {
    let sink = MemorySink::new();
    let flusher: Arc<dyn Flushable> = Arc::new(BrokenFlush);
    let handle = HeartbeatTicker::start(Duration::from_secs(1), "heartbeat", sink.clone(), Some(flusher));

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(handle.beats(), 3);
    assert!(handle.is_running());
    handle.shutdown().await;
    assert_eq!(frame::count_comments(&sink.text(), "heartbeat"), 3);
}

#[tokio::test]
async fn test_heartbeat_zero_period_disabled() {
    let sink = MemorySink::new();
    let handle = HeartbeatTicker::start(Duration::ZERO, "heartbeat", sink, None);
    assert!(!handle.is_running());
    handle.stop();
}
