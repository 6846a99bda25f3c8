mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::RecordingTransport;
use fluent_log_forwarder::{FluentSink, SinkError, TransportError};

#[tokio::test]
async fn write_decodes_and_posts_under_tag() {
    let transport = RecordingTransport::new();
    let sink = FluentSink::new(transport.clone(), "billing.audit");

    let line = br#"{"message":"charged","severity":"info","amount":12}"#;
    let written = sink.write(line).await.unwrap();
    assert_eq!(written, line.len());

    let posts = transport.posts();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].tag, "billing.audit");
    assert_eq!(posts[0].record["message"], "charged");
    assert_eq!(posts[0].record["amount"], 12);
}

#[tokio::test]
async fn trailing_newline_is_accepted() {
    let transport = RecordingTransport::new();
    let sink = FluentSink::new(transport.clone(), "t");

    sink.write(b"{\"message\":\"x\"}\n").await.unwrap();
    assert_eq!(transport.messages(), vec!["x"]);
}

#[tokio::test]
async fn invalid_json_is_a_decode_error() {
    let transport = RecordingTransport::new();
    let sink = FluentSink::new(transport.clone(), "t");

    let err = sink.write(b"not json").await.unwrap_err();
    assert!(matches!(err, SinkError::Decode(_)));

    let err = sink.write(b"[1,2,3]").await.unwrap_err();
    assert!(matches!(err, SinkError::Decode(_)));
    assert!(transport.posts().is_empty());
}

#[tokio::test]
async fn transport_failure_is_reported() {
    let sink = FluentSink::new(RecordingTransport::failing(), "t");

    let err = sink.write(br#"{"message":"lost"}"#).await.unwrap_err();
    assert!(matches!(err, SinkError::Delivery(TransportError::Closed)));
    assert!(!sink.is_closed());
}

#[tokio::test]
async fn writes_fail_after_close() {
    let transport = RecordingTransport::new();
    let sink = FluentSink::new(transport.clone(), "t");

    sink.flush_and_close(Duration::from_secs(1)).await.unwrap();
    assert!(sink.is_closed());

    let err = sink.write(br#"{"message":"late"}"#).await.unwrap_err();
    assert!(matches!(err, SinkError::Closed));
    assert!(transport.posts().is_empty());
}

#[tokio::test]
async fn close_runs_transport_close_once() {
    let transport = RecordingTransport::new();
    let sink = FluentSink::new(transport.clone(), "t");

    sink.flush_and_close(Duration::from_secs(1)).await.unwrap();
    sink.flush_and_close(Duration::from_secs(1)).await.unwrap();

    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn close_error_is_propagated() {
    let transport = RecordingTransport::new();
    transport.set_fail_close(true);
    let sink = FluentSink::new(transport.clone(), "t");

    let err = sink.flush_and_close(Duration::from_secs(1)).await.unwrap_err();
    assert!(matches!(err, SinkError::Delivery(TransportError::Io(_))));
    assert!(sink.is_closed());
}

#[tokio::test]
async fn hanging_close_times_out() {
    let transport = RecordingTransport::hanging();
    let sink = FluentSink::new(transport.clone(), "t");

    let started = Instant::now();
    let err = sink
        .flush_and_close(Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(matches!(err, SinkError::FlushTimeout(d) if d == Duration::from_millis(50)));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn slow_close_within_deadline_succeeds() {
    let transport = RecordingTransport::new();
    transport.set_close_delay(Duration::from_millis(20));
    let sink = Arc::new(FluentSink::new(transport.clone(), "t"));

    sink.flush_and_close(Duration::from_secs(2)).await.unwrap();
    assert_eq!(transport.closes(), 1);
}

#[tokio::test]
async fn timed_out_close_keeps_running_until_done() {
    let transport = RecordingTransport::new();
    transport.set_close_delay(Duration::from_millis(200));
    let sink = FluentSink::new(transport.clone(), "t");

    let started = Instant::now();
    let err = sink
        .flush_and_close(Duration::from_millis(50))
        .await
        .unwrap_err();
    assert!(matches!(err, SinkError::FlushTimeout(_)));
    assert!(started.elapsed() < Duration::from_millis(180));
    assert!(!transport.close_finished());

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(transport.close_finished());
    assert_eq!(transport.closes(), 1);
}
