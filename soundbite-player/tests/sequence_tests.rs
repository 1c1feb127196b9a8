//! Integration tests for SequencePlayer
//!
//! Timed tests pause the tokio clock; the fake device ends each segment
//! after its catalog duration.

mod helpers;

use helpers::*;
use soundbite_common::PlaybackEvent;
use soundbite_player::playback::{Completion, SequenceExit, SequencePlayer};
use soundbite_player::FileFilter;
use std::time::Duration;

const SINGLE: &str = r#"{ "Alice": [ { "file": "a.mp3", "start": 2.0, "duration": 3.0 } ] }"#;

const PAUSE: Duration = Duration::from_millis(100);

fn started_clips(events: &[PlaybackEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            PlaybackEvent::Started { clip } => Some(clip.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_single_name_pool_loops_until_stop() {
    tokio::time::pause();
    let mut h = Harness::new(SINGLE, FakeDevice::new().with_auto_complete());
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    let run = player.spawn(h.filter.clone());
    tokio::time::sleep(Duration::from_secs(10)).await;

    let events = h.drain_events();
    let started = started_clips(&events);
    assert!(started.len() >= 3, "only {} clips started", started.len());
    assert!(started.iter().all(|clip| clip == "Alice"));
    assert!(events.contains(&ended("Alice")));
    assert!(player.is_running());

    player.stop();
    assert_eq!(run.await.unwrap(), SequenceExit::Stopped);
    assert!(!player.is_running());
    assert_eq!(h.drain_events(), vec![PlaybackEvent::Stopped]);

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(h.drain_events().is_empty());
    assert_eq!(h.device.overlaps(), 0);
}

#[tokio::test]
async fn test_pause_between_clips() {
    tokio::time::pause();
    let mut h = Harness::new(SINGLE, FakeDevice::new().with_auto_complete());
    let player = SequencePlayer::new(h.controller.clone(), Duration::from_secs(1));

    let run = player.spawn(h.filter.clone());

    // First clip ends at 3s; the next may not start before 4s
    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(started_clips(&h.drain_events()).len(), 1);
    assert!(!h.controller.is_playing());

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(started_clips(&h.drain_events()).len(), 1);
    assert!(h.controller.is_playing());

    player.stop();
    assert_eq!(run.await.unwrap(), SequenceExit::Stopped);
}

#[tokio::test]
async fn test_empty_pool_exits() {
    let h = default_harness();
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    let exit = player
        .run(|| FileFilter::File("nothing.mp3".to_string()))
        .await;

    assert_eq!(exit, SequenceExit::PoolEmpty);
    assert!(!player.is_running());
    assert!(h.device.calls().is_empty());
}

#[tokio::test]
async fn test_second_run_returns_immediately() {
    let h = default_harness();
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    let run = player.spawn(h.filter.clone());
    let device = h.device.clone();
    wait_until(|| device.live().len() == 1).await;

    assert_eq!(player.run(h.filter.clone()).await, SequenceExit::AlreadyRunning);
    assert!(player.is_running());

    player.stop();
    assert_eq!(run.await.unwrap(), SequenceExit::Stopped);
}

#[tokio::test]
async fn test_pool_follows_filter_provider() {
    tokio::time::pause();
    let mut h = Harness::new(CATALOG, FakeDevice::new().with_auto_complete());
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    let run = player.spawn(|| FileFilter::File("b.mp3".to_string()));
    tokio::time::sleep(Duration::from_secs(10)).await;
    player.stop();
    run.await.unwrap();

    let started = started_clips(&h.drain_events());
    assert!(!started.is_empty());
    assert!(started.iter().all(|clip| clip == "Bob" || clip == "Carol"));
    assert_eq!(h.fetcher.fetch_count("a.mp3"), 0);
}

#[tokio::test]
async fn test_direct_play_stops_sequence() {
    let mut h = default_harness();
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    let run = player.spawn(|| FileFilter::File("a.mp3".to_string()));
    let device = h.device.clone();
    wait_until(|| device.live().len() == 1).await;

    h.controller.play("Bob").await;

    assert_eq!(run.await.unwrap(), SequenceExit::Stopped);
    assert!(!h.controller.is_sequence_running());
    assert_eq!(h.controller.current_clip().as_deref(), Some("Bob"));
    assert_eq!(h.device.overlaps(), 0);

    let events = h.drain_events();
    assert_eq!(events.last(), Some(&started("Bob")));
}

// ============================================================================
// play_one_and_wait
// ============================================================================

#[tokio::test]
async fn test_play_one_and_wait_finishes() {
    tokio::time::pause();
    let mut h = Harness::new(SINGLE, FakeDevice::new().with_auto_complete());
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    assert_eq!(player.play_one_and_wait("Alice").await, Completion::Finished);
    assert_eq!(h.drain_events(), vec![started("Alice"), ended("Alice")]);
    assert!(!player.is_running());
}

#[tokio::test]
async fn test_play_one_and_wait_interrupted_by_stop() {
    let h = default_harness();
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    let waiting = {
        let player = player.clone();
        tokio::spawn(async move { player.play_one_and_wait("Alice").await })
    };
    let device = h.device.clone();
    wait_until(|| device.live().len() == 1).await;

    // A one-off wait is not a sequence run
    assert!(!player.is_running());
    assert!(!h.controller.is_sequence_running());

    player.stop();
    assert_eq!(waiting.await.unwrap(), Completion::Interrupted);
    assert!(!h.controller.is_playing());
}

#[tokio::test]
async fn test_newer_one_off_wait_interrupts_older() {
    let mut h = default_harness();
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);
    h.fetcher.hold("a.mp3");

    let older = {
        let player = player.clone();
        tokio::spawn(async move { player.play_one_and_wait("Alice").await })
    };
    let fetcher = h.fetcher.clone();
    wait_until(|| fetcher.fetch_count("a.mp3") == 1).await;

    let newer = {
        let player = player.clone();
        tokio::spawn(async move { player.play_one_and_wait("Bob").await })
    };
    let device = h.device.clone();
    wait_until(|| device.live().len() == 1).await;

    h.fetcher.open("a.mp3");
    assert_eq!(older.await.unwrap(), Completion::Interrupted);

    assert!(h.device.complete_live());
    assert_eq!(newer.await.unwrap(), Completion::Finished);
    assert_eq!(h.drain_events(), vec![started("Bob"), ended("Bob")]);
    assert_eq!(h.device.overlaps(), 0);
}

#[tokio::test]
async fn test_play_one_and_wait_skips_unplayable() {
    let h = default_harness();
    let player = SequencePlayer::new(h.controller.clone(), PAUSE);

    assert_eq!(player.play_one_and_wait("Zed").await, Completion::Skipped);

    h.fetcher.set_missing("b.mp3", true);
    assert_eq!(player.play_one_and_wait("Bob").await, Completion::Skipped);
    assert!(!player.is_running());
}
