//! Playback queue ordering and cancellation

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::RecordingSink;
use parley::voice::{AudioChunk, PlaybackSession, POLL_INTERVAL};

fn chunk(label: &str, sequence: u64) -> AudioChunk {
    AudioChunk {
        pcm: label.as_bytes().to_vec(),
        sample_rate: 24000,
        sequence,
    }
}

#[tokio::test]
async fn plays_in_fifo_order_under_slow_device() {
    let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(20)));
    let mut session = PlaybackSession::new(sink.clone());
    session.start();

    for (i, label) in ["first", "second", "third"].iter().enumerate() {
        session.enqueue(chunk(label, i as u64 + 1)).unwrap();
    }

    session.wait_idle(Duration::from_secs(5)).await;
    session.stop().await;

    assert_eq!(sink.played_texts(), vec!["first", "second", "third"]);
}

#[tokio::test]
async fn stop_discards_unplayed_chunks() {
    // Each chunk takes 200ms to play; stop after the first should leave
    // the rest unplayed.
    let sink = Arc::new(RecordingSink::with_delay(Duration::from_millis(200)));
    let mut session = PlaybackSession::new(sink.clone());
    session.start();

    for i in 0..10 {
        session.enqueue(chunk(&format!("c{i}"), i)).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(250)).await;
    session.stop().await;

    let played = sink.played_texts();
    assert!(!played.is_empty(), "first chunk should have played");
    assert!(played.len() < 10, "stop should discard queued chunks");
    assert_eq!(session.pending_chunks(), 0);
}

#[tokio::test]
async fn stop_on_idle_queue_returns_promptly() {
    let sink = Arc::new(RecordingSink::new());
    let mut session = PlaybackSession::new(sink);
    session.start();

    let start = tokio::time::Instant::now();
    session.stop().await;

    // The worker notices cancellation within a couple of poll intervals
    assert!(start.elapsed() < POLL_INTERVAL * 4);
}

#[tokio::test]
async fn enqueue_after_stop_is_an_error() {
    let sink = Arc::new(RecordingSink::new());
    let mut session = PlaybackSession::new(sink);
    session.start();
    session.stop().await;

    assert!(session.enqueue(chunk("late", 1)).is_err());
    assert!(!session.is_active());
}

#[tokio::test]
async fn sink_failure_aborts_remaining_queue() {
    let sink = Arc::new(RecordingSink::failing());
    let mut session = PlaybackSession::new(sink);
    session.start();

    for i in 0..5 {
        session.enqueue(chunk(&format!("c{i}"), i)).unwrap();
    }

    session.wait_idle(Duration::from_secs(2)).await;
    session.stop().await;

    assert_eq!(session.pending_chunks(), 0);
}

#[tokio::test]
async fn restart_after_stop_works() {
    let sink = Arc::new(RecordingSink::new());
    let mut session = PlaybackSession::new(sink.clone());

    session.start();
    session.enqueue(chunk("before", 1)).unwrap();
    session.wait_idle(Duration::from_secs(2)).await;
    session.stop().await;

    session.start();
    session.enqueue(chunk("after", 2)).unwrap();
    session.wait_idle(Duration::from_secs(2)).await;
    session.stop().await;

    assert_eq!(sink.played_texts(), vec!["before", "after"]);
}
