use chrono::{Duration, Utc};
use std::sync::Arc;
use vigil_core::{
    Clock, Dsn, Envelope, ManualClock, ReplayConfig, SdkInfo, SystemClock, TransportConfig,
};
use vigil_replay::{
    DecodedSegment, Document, HttpTransport, MemoryTransport, NodeId, Replay, ReplayContainer,
    ReplayMetadata, Transport, TransportError, UiEvent,
};
use wiremock::matchers::{header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Demo page whose button ends up with node id 9
fn page() -> (Document, NodeId) {
    let mut doc = Document::new(Some("http://localhost:3000/index.html".to_string()));
    let html = doc.append_element(doc.root(), "html", &[]).unwrap();
    let head = doc.append_element(html, "head", &[]).unwrap();
    let title = doc.append_element(head, "title", &[]).unwrap();
    doc.append_text(title, "Replay demo").unwrap();
    let body = doc.append_element(html, "body", &[]).unwrap();
    let main = doc.append_element(body, "main", &[]).unwrap();
    doc.append_element(main, "h1", &[]).unwrap();
    let button = doc
        .append_element(main, "button", &[("id", "button1")])
        .unwrap();
    (doc, button)
}

fn config(idle_ms: u64, flush_ms: u64) -> ReplayConfig {
    ReplayConfig {
        idle_timeout: std::time::Duration::from_millis(idle_ms),
        flush_delay: std::time::Duration::from_millis(flush_ms),
        ..Default::default()
    }
}

async fn envelope_server(status: u16) -> MockServer {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/1/envelope/"))
        .and(header_exists("X-Sentry-Auth"))
        .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({"id": "ok"})))
        .mount(&mock_server)
        .await;
    mock_server
}

fn http_transport(mock_server: &MockServer) -> Arc<HttpTransport> {
    let dsn = Dsn::parse(&format!("http://public@{}/1", mock_server.address())).unwrap();
    Arc::new(HttpTransport::new(&dsn, &TransportConfig::default(), SdkInfo::default()).unwrap())
}

async fn received_segments(mock_server: &MockServer) -> Vec<DecodedSegment> {
    mock_server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|request| {
            let envelope = Envelope::from_slice(&request.body).unwrap();
            DecodedSegment::from_envelope(&envelope).unwrap()
        })
        .collect()
}

fn click(target: NodeId) -> UiEvent {
    UiEvent::Click {
        target,
        x: 12,
        y: 30,
    }
}

#[tokio::test]
async fn test_session_expiry_end_to_end() {
    let mock_server = envelope_server(200).await;
    let transport = http_transport(&mock_server);
    let (document, button) = page();

    let replay = Replay::start(
        &config(300, 5_000),
        ReplayMetadata {
            compress: true,
            ..Default::default()
        },
        document,
        transport,
        Arc::new(SystemClock),
    );
    assert!(replay.is_timer_running().await);
    let first_session = replay.session_id().await;

    assert_eq!(replay.record(click(button)).await.unwrap(), 4);

    // Let the expiry timer rotate the idle session
    tokio::time::sleep(std::time::Duration::from_millis(700)).await;
    let second_session = replay.session_id().await;
    assert_ne!(first_session, second_session);

    replay.record(click(button)).await.unwrap();
    replay
        .stop(std::time::Duration::from_secs(5))
        .await
        .unwrap();

    let segments = received_segments(&mock_server).await;
    assert_eq!(segments.len(), 3);

    let (first, second, third) = (&segments[0], &segments[1], &segments[2]);

    assert_eq!(first.event.replay_id, first_session);
    assert_eq!(first.segment_id, 0);
    assert_eq!(first.full_snapshots(), 1);
    assert_eq!(
        first.event.urls,
        vec!["http://localhost:3000/index.html".to_string()]
    );
    assert!(first.event.replay_start_timestamp.is_some());

    assert_eq!(second.event.replay_id, first_session);
    assert_eq!(second.segment_id, 1);
    assert_eq!(second.full_snapshots(), 0);
    assert!(second.incremental_snapshots() >= 4);
    assert!(second.event.urls.is_empty());
    assert!(second.event.replay_start_timestamp.is_none());
    assert_eq!(second.snapshots[0]["data"]["source"], 1);
    assert_eq!(second.snapshots[0]["data"]["positions"][0]["id"], 9);
    assert_eq!(second.snapshots[0]["data"]["positions"][0]["x"], 12);

    assert_ne!(third.event.replay_id, first_session);
    assert_eq!(third.segment_id, 0);
    assert_eq!(third.full_snapshots(), 1);
    assert_eq!(third.snapshots[0]["type"], 2);
}

#[tokio::test]
async fn test_no_rotation_below_idle_timeout() {
    let transport = MemoryTransport::new();
    let clock = ManualClock::new(Utc::now());
    let (document, button) = page();

    let container = ReplayContainer::new(
        &config(2_000, 500),
        ReplayMetadata::default(),
        document,
        Arc::new(transport.clone()),
        clock.now(),
    );
    let replay = Replay::new(container, Arc::new(clock.clone()));
    let session = replay.session_id().await;

    for step in 0..5 {
        clock.advance(Duration::milliseconds(1_999));
        replay
            .record(UiEvent::MouseMove {
                target: button,
                x: step,
                y: step,
            })
            .await
            .unwrap();
        replay.flush().await.unwrap();
        assert!(!replay.tick().await.unwrap());
    }

    let state = replay.state().await;
    assert_eq!(state.session_id, session);
    assert_eq!(state.rotations, 0);

    let ids: Vec<u32> = transport
        .envelopes()
        .iter()
        .map(|e| DecodedSegment::from_envelope(e).unwrap().segment_id)
        .collect();
    assert_eq!(ids, (0..ids.len() as u32).collect::<Vec<_>>());
    assert_eq!(ids.len(), 6);
}

#[tokio::test]
async fn test_rotation_at_idle_timeout() {
    let transport = MemoryTransport::new();
    let clock = ManualClock::new(Utc::now());
    let (document, button) = page();

    let container = ReplayContainer::new(
        &config(2_000, 500),
        ReplayMetadata::default(),
        document,
        Arc::new(transport.clone()),
        clock.now(),
    );
    let replay = Replay::new(container, Arc::new(clock.clone()));
    let session = replay.session_id().await;

    for idle_ms in [2_000, 2_001, 10_000] {
        let before = replay.session_id().await;
        replay.record(click(button)).await.unwrap();
        clock.advance(Duration::milliseconds(idle_ms));

        assert!(replay.tick().await.unwrap());
        // A second check at the same instant does nothing
        assert!(!replay.tick().await.unwrap());
        assert_ne!(replay.session_id().await, before);
    }
    replay.record(click(button)).await.unwrap();

    let state = replay.state().await;
    assert_ne!(state.session_id, session);
    assert_eq!(state.rotations, 3);

    // Segments of each session arrive contiguous and in order, sessions never interleave
    let segments: Vec<DecodedSegment> = transport
        .envelopes()
        .iter()
        .map(|e| DecodedSegment::from_envelope(e).unwrap())
        .collect();
    let mut expected_next = 0;
    let mut current = segments[0].event.replay_id.clone();
    let mut sessions_seen = vec![current.clone()];
    for segment in &segments {
        if segment.event.replay_id != current {
            assert!(!sessions_seen.contains(&segment.event.replay_id));
            current = segment.event.replay_id.clone();
            sessions_seen.push(current.clone());
            expected_next = 0;
        }
        assert_eq!(segment.segment_id, expected_next);
        if segment.segment_id == 0 {
            assert_eq!(segment.full_snapshots(), 1);
            assert_eq!(segment.snapshots[0]["type"], 2);
        }
        expected_next += 1;
    }
    assert_eq!(sessions_seen.len(), 4);
}

#[tokio::test]
async fn test_delivery_failures_are_reported() {
    let mock_server = envelope_server(500).await;
    let transport = http_transport(&mock_server);
    let mut reports = transport.subscribe();
    let (document, button) = page();

    let container = ReplayContainer::new(
        &config(60_000, 60_000),
        ReplayMetadata::default(),
        document,
        transport.clone(),
        Utc::now(),
    );
    let replay = Replay::new(container, Arc::new(SystemClock));
    replay.record(click(button)).await.unwrap();

    // The packager handed the segment off; the endpoint rejecting it does not
    // stop later segments
    assert_eq!(replay.flush().await.unwrap(), Some(1));

    for _ in 0..2 {
        let report = tokio::time::timeout(std::time::Duration::from_secs(5), reports.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(!report.is_success());
    }

    replay
        .stop(std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(received_segments(&mock_server).await.len(), 2);
    assert!(replay.record(UiEvent::Idle).await.is_err());
}

#[tokio::test]
async fn test_stop_ends_expiry_timer() {
    let (document, _) = page();
    let replay = Replay::start(
        &config(40, 40),
        ReplayMetadata::default(),
        document,
        Arc::new(MemoryTransport::new()),
        Arc::new(SystemClock),
    );
    assert!(replay.is_timer_running().await);

    replay
        .stop(std::time::Duration::from_secs(1))
        .await
        .unwrap();
    assert!(!replay.is_timer_running().await);
}

#[tokio::test]
async fn test_dropping_replay_releases_recording() {
    let transport = Arc::new(MemoryTransport::new());
    let (document, _) = page();
    let replay = Replay::start(
        &config(40, 40),
        ReplayMetadata::default(),
        document,
        transport.clone(),
        Arc::new(SystemClock),
    );
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    drop(replay);
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;

    // Only our handle is left once the timer task has exited
    assert_eq!(Arc::strong_count(&transport), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_records_racing_stop_are_delivered_or_rejected() {
    let transport = MemoryTransport::new();
    let (document, button) = page();
    let container = ReplayContainer::new(
        &config(60_000, 60_000),
        ReplayMetadata::default(),
        document,
        Arc::new(transport.clone()),
        Utc::now(),
    );
    let replay = Arc::new(Replay::new(container, Arc::new(SystemClock)));

    let mut tasks = Vec::new();
    for step in 0..64 {
        let replay = replay.clone();
        tasks.push(tokio::spawn(async move {
            replay
                .record(UiEvent::MouseMove {
                    target: button,
                    x: step,
                    y: step,
                })
                .await
        }));
    }
    replay
        .stop(std::time::Duration::from_secs(1))
        .await
        .unwrap();

    let mut accepted = 0;
    for task in tasks {
        if let Ok(recorded) = task.await.unwrap() {
            accepted += recorded;
        }
    }

    let delivered: usize = transport
        .envelopes()
        .iter()
        .map(|e| DecodedSegment::from_envelope(e).unwrap().incremental_snapshots())
        .sum();
    assert_eq!(delivered, accepted);
}

#[tokio::test]
async fn test_full_queue_refuses_envelopes() {
    let mock_server = envelope_server(200).await;
    let dsn = Dsn::parse(&format!("http://public@{}/1", mock_server.address())).unwrap();
    let transport = HttpTransport::new(
        &dsn,
        &TransportConfig {
            max_queued_envelopes: 1,
            ..Default::default()
        },
        SdkInfo::default(),
    )
    .unwrap();

    // The worker has not run yet on this single-threaded runtime
    transport.send(Envelope::new(Default::default())).unwrap();
    assert!(matches!(
        transport.send(Envelope::new(Default::default())),
        Err(TransportError::QueueFull(1))
    ));
    assert_eq!(transport.pending(), 1);

    transport
        .shutdown(std::time::Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        mock_server.received_requests().await.unwrap_or_default().len(),
        1
    );
}
