mod common;

use std::time::Duration;

use common::{MockConnector, MockSink, Script, ScriptedTranscoder, SinkCall, fast_settings};
use pmosession::{
    AudioSource, FfmpegTranscoder, SessionConfig, SessionOrchestrator, SessionOutcome, SinkError,
    TranscoderSettings,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn stream_config() -> SessionConfig {
    SessionConfig::new("living-room")
        .with_title("Radio Paradise")
        .with_album("Main Mix")
        .with_source(AudioSource::Url("http://stream.example/live".into()))
}

fn orchestrator(connector: MockConnector, script: Script) -> SessionOrchestrator {
    SessionOrchestrator::new(connector, ScriptedTranscoder::new(script), fast_settings()).unwrap()
}

fn is_close(call: &SinkCall) -> bool {
    matches!(call, SinkCall::Close)
}

#[tokio::test(start_paused = true)]
async fn stalled_stream_times_out() {
    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Stall);

    let config = stream_config().with_stall_timeout(Duration::from_secs(5));
    let started = tokio::time::Instant::now();
    let outcome = engine.run(&config, CancellationToken::new()).await;

    assert_eq!(outcome, SessionOutcome::TimedOut);
    assert_eq!(outcome.exit_code(), 1);
    // First watchdog check past 5s of silence, at a 2s cadence
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(6) && elapsed < Duration::from_secs(7));
    assert_eq!(sink.count(is_close), 1);
    assert_eq!(sink.calls().last(), Some(&SinkCall::Close));
}

#[tokio::test]
async fn stream_runs_to_completion() {
    let sink = MockSink::new();
    let data = b"ID3 fake mp3 frames".to_vec();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Bytes(data.clone()));

    let outcome = engine
        .run(&stream_config().with_volume(35), CancellationToken::new())
        .await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(sink.received(), data);
    assert_eq!(
        sink.calls(),
        vec![
            SinkCall::SetVolume(35),
            SinkCall::StreamBytes {
                title: "Radio Paradise".into(),
                has_artwork: false
            },
            SinkCall::Close,
        ]
    );
}

#[tokio::test]
async fn transient_stream_errors_resume_remaining_bytes() {
    let sink = MockSink::new();
    sink.fail_streams([
        SinkError::Connection("reset".into()),
        SinkError::Protocol("bad reply".into()),
    ]);
    let data = b"0123456789ab".to_vec();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Bytes(data.clone()));

    let outcome = engine.run(&stream_config(), CancellationToken::new()).await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(sink.count(|c| matches!(c, SinkCall::StreamBytes { .. })), 3);
    assert_eq!(sink.received(), data);
}

#[tokio::test]
async fn exhausted_stream_retries_fail_the_session() {
    let sink = MockSink::new();
    sink.fail_streams((0..3).map(|_| SinkError::Connection("reset".into())));
    let engine = orchestrator(
        MockConnector::new(sink.clone()),
        Script::Bytes(vec![0u8; 64]),
    );

    let outcome = engine.run(&stream_config(), CancellationToken::new()).await;

    assert!(matches!(outcome, SessionOutcome::Failed(_)));
    assert_eq!(sink.count(|c| matches!(c, SinkCall::StreamBytes { .. })), 3);
    assert_eq!(sink.count(is_close), 1);
}

#[tokio::test]
async fn teardown_is_not_retried() {
    let sink = MockSink::new();
    sink.fail_streams([SinkError::Teardown("receiver switched input".into())]);
    let engine = orchestrator(
        MockConnector::new(sink.clone()),
        Script::Bytes(vec![0u8; 64]),
    );

    let outcome = engine.run(&stream_config(), CancellationToken::new()).await;

    match outcome {
        SessionOutcome::Failed(reason) => assert!(reason.contains("torn down")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(sink.count(|c| matches!(c, SinkCall::StreamBytes { .. })), 1);
    assert_eq!(sink.count(is_close), 1);
}

#[tokio::test]
async fn crashed_transcoder_fails_the_session() {
    let sink = MockSink::new();
    let engine = orchestrator(
        MockConnector::new(sink.clone()),
        Script::Fail(b"ID3".to_vec(), "ffmpeg exited with exit status: 1".into()),
    );

    let outcome = engine.run(&stream_config(), CancellationToken::new()).await;

    match &outcome {
        SessionOutcome::Failed(reason) => assert!(reason.contains("exit status: 1")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(outcome.exit_code(), 1);
    // A dead source is not retried against the receiver
    assert_eq!(sink.count(|c| matches!(c, SinkCall::StreamBytes { .. })), 1);
    assert_eq!(sink.count(is_close), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn ffmpeg_exiting_with_error_fails_the_session() {
    let sink = MockSink::new();
    let transcoder = FfmpegTranscoder::new(TranscoderSettings {
        ffmpeg_path: "false".to_string(),
        ..Default::default()
    });
    let engine =
        SessionOrchestrator::new(MockConnector::new(sink.clone()), transcoder, fast_settings())
            .unwrap();

    let outcome = engine.run(&stream_config(), CancellationToken::new()).await;

    assert!(matches!(outcome, SessionOutcome::Failed(_)), "got {outcome:?}");
    assert_eq!(outcome.exit_code(), 1);
    assert!(sink.received().is_empty());
    assert_eq!(sink.calls().last(), Some(&SinkCall::Close));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_the_session() {
    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Stall);
    let shutdown = CancellationToken::new();

    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        trigger.cancel();
    });

    let config = stream_config().with_stall_timeout(Duration::from_secs(60));
    let outcome = engine.run(&config, shutdown).await;

    assert_eq!(outcome, SessionOutcome::Canceled);
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(sink.count(is_close), 1);
}

#[tokio::test]
async fn volume_only_session() {
    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Stall);

    let config = SessionConfig::new("kitchen").with_volume(40);
    let outcome = engine.run(&config, CancellationToken::new()).await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(sink.calls(), vec![SinkCall::SetVolume(40), SinkCall::Close]);
}

#[tokio::test]
async fn volume_failure_is_not_fatal() {
    let sink = MockSink::new();
    sink.fail_volume((0..3).map(|_| SinkError::Connection("timeout".into())));
    let engine = orchestrator(
        MockConnector::new(sink.clone()),
        Script::Bytes(b"abc".to_vec()),
    );

    let outcome = engine
        .run(&stream_config().with_volume(80), CancellationToken::new())
        .await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(sink.count(|c| matches!(c, SinkCall::SetVolume(80))), 3);
}

#[tokio::test]
async fn nothing_to_do_without_source_or_volume() {
    let sink = MockSink::new();
    let connector = MockConnector::new(sink.clone());
    let connects = connector.connects.clone();
    let engine = orchestrator(connector, Script::Stall);

    let outcome = engine
        .run(&SessionConfig::new("kitchen"), CancellationToken::new())
        .await;

    assert!(matches!(outcome, SessionOutcome::Failed(_)));
    assert_eq!(connects.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn unknown_device_fails_without_close() {
    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::unreachable(sink.clone()), Script::Stall);

    let outcome = engine.run(&stream_config(), CancellationToken::new()).await;

    match outcome {
        SessionOutcome::Failed(reason) => assert!(reason.contains("Device not found")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(sink.calls().is_empty());
}

#[tokio::test]
async fn unreachable_metadata_source_still_completes() {
    let sink = MockSink::new();
    let engine = orchestrator(
        MockConnector::new(sink.clone()),
        Script::Bytes(vec![7u8; 256]),
    );

    // Port 9 (discard) is closed on test machines: connection refused
    let config = stream_config().with_metadata_url("http://127.0.0.1:9/now.json");
    let outcome = engine.run(&config, CancellationToken::new()).await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert!(sink.metadata_pushes().is_empty());
    assert_eq!(sink.count(is_close), 1);
}

#[tokio::test]
async fn playlist_streams_each_file_in_order() {
    let dir = tempfile::tempdir().unwrap();
    tokio::fs::write(dir.path().join("song.mp3"), b"first").await.unwrap();
    tokio::fs::write(dir.path().join("another.mp3"), b"second").await.unwrap();
    let playlist = dir.path().join("set.m3u");
    tokio::fs::write(
        &playlist,
        "#EXTM3U\nsong.mp3\n  \nhttp://x/y.mp3\nC:\\music\\a.mp3\nanother.mp3\n",
    )
    .await
    .unwrap();

    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Stall);
    let config = SessionConfig::new("den")
        .with_album("Local")
        .with_source(AudioSource::from_path(&playlist));

    let outcome = engine.run(&config, CancellationToken::new()).await;

    assert_eq!(outcome, SessionOutcome::Completed);
    assert_eq!(
        sink.calls(),
        vec![
            SinkCall::StreamFile {
                path: dir.path().join("song.mp3"),
                title: "song".into()
            },
            SinkCall::StreamFile {
                path: dir.path().join("another.mp3"),
                title: "another".into()
            },
            SinkCall::Close,
        ]
    );
    assert_eq!(sink.received(), b"firstsecond".to_vec());
}

#[tokio::test]
async fn empty_playlist_fails_after_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let playlist = dir.path().join("empty.m3u8");
    tokio::fs::write(&playlist, "#EXTM3U\n# nothing here\n").await.unwrap();

    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Stall);
    let config = SessionConfig::new("den").with_source(AudioSource::from_path(&playlist));

    let outcome = engine.run(&config, CancellationToken::new()).await;

    match outcome {
        SessionOutcome::Failed(reason) => assert!(reason.contains("Nothing to do")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert_eq!(sink.calls(), vec![SinkCall::Close]);
}

#[tokio::test]
async fn missing_file_fails_after_retries() {
    let dir = tempfile::tempdir().unwrap();
    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Stall);
    let config =
        SessionConfig::new("den").with_source(AudioSource::from_path(dir.path().join("gone.mp3")));

    let outcome = engine.run(&config, CancellationToken::new()).await;

    assert!(matches!(outcome, SessionOutcome::Failed(_)));
    assert_eq!(sink.count(|c| matches!(c, SinkCall::StreamFile { .. })), 3);
    assert_eq!(sink.count(is_close), 1);
}

#[tokio::test]
async fn shutdown_interrupts_slow_artwork_download() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cover.jpg"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(vec![0xffu8, 0xd8])
                .set_delay(Duration::from_secs(30)),
        )
        .mount(&server)
        .await;

    let sink = MockSink::new();
    let engine = orchestrator(MockConnector::new(sink.clone()), Script::Bytes(vec![1u8; 16]));
    let config = stream_config().with_artwork_url(format!("{}/cover.jpg", server.uri()));

    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = engine.run(&config, shutdown).await;

    assert_eq!(outcome, SessionOutcome::Canceled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(sink.count(|c| matches!(c, SinkCall::StreamBytes { .. })), 0);
    assert_eq!(sink.count(is_close), 1);
}
