//! Session lifecycle tests against in-memory resolver and voice fakes

mod helpers;

use helpers::{test_settings, user_in, wait_until, Harness};
use jukebot_common::events::{PlaybackStatus, SessionEvent};
use jukebot_player::output::{Notice, EMPTY_QUEUE, NO_CURRENT_SONG};
use jukebot_player::playback::player_worker::QUEUE_EMPTY;
use jukebot_player::playback::session::{INACTIVITY_MESSAGE, STOPPED_MESSAGE};
use jukebot_player::playback::SkipOutcome;
use jukebot_player::track::RequestPriority;
use jukebot_player::voice::{VoiceConnection, VoiceContext};
use jukebot_player::Error;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

async fn wait_now_playing(h: &Harness, title: &str) {
    let session = h.session.clone();
    let title = title.to_string();
    let reached = wait_until(WAIT, || {
        let session = session.clone();
        let title = title.clone();
        async move { session.queue_view().await.now_playing == title }
    })
    .await;
    assert!(reached, "timed out waiting for '{}' to play", title);
}

async fn wait_ready(h: &Harness, count: usize) {
    let session = h.session.clone();
    let reached = wait_until(WAIT, || {
        let session = session.clone();
        async move { session.snapshot().await.ready >= count }
    })
    .await;
    assert!(reached, "timed out waiting for {} ready tracks", count);
}

#[tokio::test]
async fn plays_in_enqueue_order_and_displays_queue() {
    let h = Harness::new();
    h.play("A").await;
    h.play("B").await;
    h.play("C").await;

    wait_now_playing(&h, "A").await;
    assert_eq!(h.upcoming().await, vec!["1. B", "2. C"]);
    let view = h.session.queue_view().await;
    assert_eq!(Notice::Queue { view }.to_string(), "Now Playing: A\n1. B\n2. C");

    h.finish_current().await;
    wait_now_playing(&h, "B").await;
    h.finish_current().await;
    wait_now_playing(&h, "C").await;
    assert_eq!(h.upcoming().await, vec![EMPTY_QUEUE]);
    h.finish_current().await;

    let sink = h.sink.clone();
    assert!(
        wait_until(WAIT, || {
            let sink = sink.clone();
            async move { sink.texts().iter().any(|t| t == QUEUE_EMPTY) }
        })
        .await
    );
    assert_eq!(h.sink.now_playing(), vec!["A", "B", "C"]);

    let connection = h.connection();
    assert_eq!(connection.bind_count(), 3);
    assert_eq!(connection.overlapping_binds(), 0);
    assert_eq!(connection.missing_files(), 0);
    assert!(h.scratch_files().await.is_empty());

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.song_counter, 3);
    assert_eq!(snapshot.status, PlaybackStatus::Idle);
    assert_eq!(h.session.queue_view().await.now_playing, NO_CURRENT_SONG);
}

#[tokio::test]
async fn playlist_expands_in_order() {
    let h = Harness::new();
    let summary = h.play("playlist:one,two,three").await;
    assert_eq!(summary.added, 3);
    assert_eq!(summary.first_position, Some(1));
    assert_eq!(summary.titles, vec!["one", "two", "three"]);

    wait_now_playing(&h, "one").await;
    assert_eq!(h.upcoming().await, vec!["1. two", "2. three"]);
}

#[tokio::test]
async fn play_next_jumps_ahead_of_waiting_tracks() {
    let h = Harness::new();
    h.play("A").await;
    h.play("B").await;
    wait_now_playing(&h, "A").await;

    let summary = h.play_next("X").await;
    assert_eq!(summary.first_position, Some(1));
    assert_eq!(h.upcoming().await, vec!["1. X", "2. B"]);
    assert!(h.connection().has_track(), "A keeps playing");

    h.finish_current().await;
    wait_now_playing(&h, "X").await;
    h.finish_current().await;
    wait_now_playing(&h, "B").await;
    assert_eq!(h.sink.now_playing(), vec!["A", "X", "B"]);
}

#[tokio::test]
async fn play_next_waits_for_its_own_download() {
    let h = Harness::new();
    h.resolver.set_delay("X", Duration::from_millis(300));
    h.play("A").await;
    h.play("B").await;
    wait_now_playing(&h, "A").await;
    wait_ready(&h, 1).await;

    h.play_next("X").await;
    h.finish_current().await;

    // B is ready first but X heads the queue
    wait_now_playing(&h, "X").await;
    assert_eq!(h.sink.now_playing(), vec!["A", "X"]);
}

#[tokio::test]
async fn skip_to_position_drops_earlier_entries() {
    let h = Harness::new();
    for reference in ["A", "B", "C", "D"] {
        h.play(reference).await;
    }
    wait_now_playing(&h, "A").await;
    wait_ready(&h, 3).await;
    assert_eq!(h.upcoming().await, vec!["1. B", "2. C", "3. D"]);

    let message = h.session.skip_to_position(2).await.unwrap();
    assert_eq!(message, "Skipped to position 2 in the queue.");

    wait_now_playing(&h, "C").await;
    assert_eq!(h.upcoming().await, vec!["1. D"]);
    assert_eq!(h.sink.now_playing(), vec!["A", "C"]);

    // Only C and D still hold files
    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move { session.scratch().files().await.len() == 2 }
        })
        .await
    );
}

#[tokio::test]
async fn skip_to_first_position_plays_next_entry() {
    let h = Harness::new();
    for reference in ["A", "B", "C"] {
        h.play(reference).await;
    }
    wait_now_playing(&h, "A").await;
    wait_ready(&h, 2).await;

    // The playing track is not listed, so B is position 1
    h.session.skip_to_position(1).await.unwrap();
    wait_now_playing(&h, "B").await;
    assert_eq!(h.upcoming().await, vec!["1. C"]);
    assert_eq!(h.sink.now_playing(), vec!["A", "B"]);
}

#[tokio::test]
async fn invalid_skip_position_changes_nothing() {
    let h = Harness::new();
    for reference in ["A", "B", "C"] {
        h.play(reference).await;
    }
    wait_now_playing(&h, "A").await;

    for position in [0, 3, 10] {
        let result = h.session.skip_to_position(position).await;
        assert!(
            matches!(result, Err(Error::InvalidPosition(p)) if p == position),
            "position {} should be rejected",
            position
        );
    }
    assert_eq!(h.upcoming().await, vec!["1. B", "2. C"]);
    assert!(h.connection().has_track());
    assert_eq!(h.connection().bind_count(), 1);
}

#[tokio::test]
async fn clear_upcoming_keeps_current_track() {
    let h = Harness::new();
    for reference in ["A", "B", "C"] {
        h.play(reference).await;
    }
    wait_now_playing(&h, "A").await;
    wait_ready(&h, 2).await;

    assert_eq!(h.session.clear_upcoming().await, 2);
    assert_eq!(h.upcoming().await, vec![EMPTY_QUEUE]);

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.upcoming, 0);
    assert_eq!(snapshot.ready, 0);
    assert_eq!(snapshot.remaining, 1);
    assert_eq!(snapshot.status, PlaybackStatus::Playing);
    assert!(h.connection().has_track(), "A continues");
    assert_eq!(h.scratch_files().await.len(), 1);

    h.finish_current().await;
    let sink = h.sink.clone();
    assert!(
        wait_until(WAIT, || {
            let sink = sink.clone();
            async move { sink.texts().iter().any(|t| t == QUEUE_EMPTY) }
        })
        .await
    );
    assert_eq!(h.connection().bind_count(), 1);
}

#[tokio::test]
async fn clear_upcoming_cancels_in_flight_download() {
    let h = Harness::new();
    h.resolver.set_delay("slow", Duration::from_secs(30));
    h.play("A").await;
    h.play("slow").await;
    wait_now_playing(&h, "A").await;

    let resolver = h.resolver.clone();
    assert!(
        wait_until(WAIT, || {
            let resolver = resolver.clone();
            async move { resolver.fetched().contains(&"slow".to_string()) }
        })
        .await
    );

    h.session.clear_upcoming().await;
    assert!(
        wait_until(WAIT, || {
            let resolver = resolver.clone();
            async move { resolver.cancelled() == 1 }
        })
        .await
    );
    assert_eq!(h.scratch_files().await.len(), 1, "only A's file remains");
}

#[tokio::test]
async fn stop_removes_every_file_and_resets() {
    let h = Harness::new();
    h.resolver.set_delay("C", Duration::from_secs(30));
    for reference in ["A", "B", "C"] {
        h.play(reference).await;
    }
    wait_now_playing(&h, "A").await;
    wait_ready(&h, 1).await;

    let mut events = h.events.subscribe();
    h.session.stop().await;

    assert!(h.scratch_files().await.is_empty());
    let snapshot = h.session.snapshot().await;
    assert!(snapshot.terminated);
    assert_eq!(snapshot.status, PlaybackStatus::Idle);
    assert!(snapshot.current.is_none());
    assert!(snapshot.channel.is_none());
    assert_eq!(snapshot.upcoming, 0);
    assert_eq!(snapshot.ready, 0);
    assert!(!snapshot.download_worker_running);
    assert!(!snapshot.player_worker_running);
    assert!(!h.connection().is_connected());

    let mut saw_stopped = false;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::SessionStopped { .. }) {
            saw_stopped = true;
        }
    }
    assert!(saw_stopped);
}

#[tokio::test]
async fn stop_cancels_download_in_progress() {
    let h = Harness::new();
    h.resolver.set_delay("slow", Duration::from_secs(30));
    h.play("slow").await;

    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move {
                session
                    .scratch()
                    .files()
                    .await
                    .iter()
                    .any(|p| p.extension().is_some_and(|e| e == "part"))
            }
        })
        .await,
        "partial file never appeared"
    );

    let started = Instant::now();
    h.session.stop().await;
    assert!(started.elapsed() < Duration::from_millis(900));
    assert_eq!(h.resolver.cancelled(), 1);
    assert!(h.scratch_files().await.is_empty());
}

#[tokio::test]
async fn enqueue_after_stop_is_ignored_until_restart() {
    let h = Harness::new();
    h.session.connect(&h.context()).await.unwrap();
    h.session.start().await.unwrap();
    h.session.stop().await;

    let summary = h
        .session
        .enqueue("A", RequestPriority::Append)
        .await
        .unwrap();
    assert!(summary.is_empty());
    assert!(matches!(
        h.session.skip_to_position(1).await,
        Err(Error::Terminated)
    ));

    // play reconnects and restarts
    h.play("B").await;
    wait_now_playing(&h, "B").await;
    assert!(!h.session.snapshot().await.terminated);
}

#[tokio::test]
async fn start_is_idempotent() {
    let h = Harness::new();
    h.session.connect(&h.context()).await.unwrap();
    h.session.start().await.unwrap();
    h.session.start().await.unwrap();

    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.download_worker_launches, 1);
    assert_eq!(snapshot.player_worker_launches, 1);
    assert!(snapshot.download_worker_running);
    assert!(snapshot.player_worker_running);
}

#[tokio::test]
async fn failed_download_is_reported_and_skipped() {
    let h = Harness::new();
    h.resolver.fail("bad");
    h.play("A").await;
    h.play("bad").await;
    h.play("C").await;
    wait_now_playing(&h, "A").await;

    let sink = h.sink.clone();
    assert!(
        wait_until(WAIT, || {
            let sink = sink.clone();
            async move { !sink.errors().is_empty() }
        })
        .await
    );
    assert_eq!(
        h.sink.errors(),
        vec!["Error downloading bad: video unavailable"]
    );
    wait_ready(&h, 1).await;
    assert_eq!(h.upcoming().await, vec!["1. C"]);

    h.finish_current().await;
    wait_now_playing(&h, "C").await;
    assert_eq!(h.sink.now_playing(), vec!["A", "C"]);
}

#[tokio::test]
async fn interrupted_download_does_not_stall_the_queue() {
    let h = Harness::new();
    h.resolver.interrupt("X");
    h.play("A").await;
    h.play("X").await;
    h.play("C").await;
    wait_now_playing(&h, "A").await;

    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move { session.snapshot().await.upcoming == 1 }
        })
        .await,
        "interrupted entry still queued"
    );
    assert_eq!(h.upcoming().await, vec!["1. C"]);

    h.finish_current().await;
    wait_now_playing(&h, "C").await;
    assert_eq!(h.sink.now_playing(), vec!["A", "C"]);
    assert!(h.sink.errors().is_empty());
}

#[tokio::test]
async fn stream_error_moves_to_next_track() {
    let h = Harness::new();
    h.play("A").await;
    h.play("B").await;
    wait_now_playing(&h, "A").await;

    let connection = h.connection();
    assert!(connection.fail_stream());
    wait_now_playing(&h, "B").await;
}

#[tokio::test]
async fn skip_current_reports_what_happened() {
    let h = Harness::new();
    assert_eq!(h.session.skip_current().await, SkipOutcome::NothingPlaying);

    h.play("A").await;
    h.play("B").await;
    wait_now_playing(&h, "A").await;
    assert_eq!(h.session.skip_current().await, SkipOutcome::Skipped);

    wait_now_playing(&h, "B").await;
    assert_eq!(h.session.skip_current().await, SkipOutcome::SkippedLast);
}

#[tokio::test]
async fn pause_and_resume_toggle() {
    let h = Harness::new();
    assert!(!h.session.pause().await, "nothing to pause");

    h.play("A").await;
    wait_now_playing(&h, "A").await;

    assert_eq!(h.session.toggle_pause().await, PlaybackStatus::Paused);
    assert!(h.connection().is_paused());
    assert!(!h.session.pause().await, "already paused");

    assert_eq!(h.session.toggle_pause().await, PlaybackStatus::Playing);
    assert!(!h.connection().is_paused());
    assert!(!h.session.resume().await, "not paused");
}

#[tokio::test]
async fn connect_requires_a_voice_channel() {
    let h = Harness::new();
    let context = VoiceContext {
        user: "tester".to_string(),
        channel: None,
    };
    assert!(matches!(
        h.session.connect(&context).await,
        Err(Error::NotInVoice)
    ));
    assert!(h.gateway.connections().is_empty());
}

#[tokio::test]
async fn failed_connect_keeps_existing_connection() {
    let h = Harness::new();
    h.session.connect(&h.context()).await.unwrap();
    h.gateway.refuse("locked");

    let result = h.session.connect(&user_in("locked")).await;
    assert!(matches!(result, Err(Error::Connection(_))));
    let snapshot = h.session.snapshot().await;
    assert_eq!(snapshot.channel.map(|c| c.0), Some("general".to_string()));
}

#[tokio::test]
async fn connect_reuses_or_migrates() {
    let h = Harness::new();
    h.session.connect(&h.context()).await.unwrap();
    h.session.connect(&h.context()).await.unwrap();
    assert_eq!(h.gateway.connections().len(), 1);

    h.session.connect(&user_in("music")).await.unwrap();
    let connections = h.gateway.connections();
    assert_eq!(connections.len(), 2);
    assert!(!connections[0].is_connected());
    assert!(connections[1].is_connected());
}

#[tokio::test]
async fn inactivity_disconnects_idle_session() {
    let mut settings = test_settings();
    settings.inactivity_timeout_secs = 1;
    let h = Harness::with_settings(settings);
    h.gateway.set_auto_finish(Some(Duration::from_millis(50)));

    h.play("A").await;
    let sink = h.sink.clone();
    assert!(
        wait_until(WAIT, || {
            let sink = sink.clone();
            async move { sink.texts().iter().any(|t| t == INACTIVITY_MESSAGE) }
        })
        .await,
        "inactivity notice never sent"
    );

    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move { session.snapshot().await.terminated }
        })
        .await
    );
    let snapshot = h.session.snapshot().await;
    assert!(snapshot.channel.is_none());
    assert_eq!(snapshot.song_counter, 0);
    assert!(!snapshot.inactivity_armed);
    assert!(h.sink.texts().iter().any(|t| t == STOPPED_MESSAGE));
    assert!(!h.connection().is_connected());
}

#[tokio::test]
async fn new_request_cancels_inactivity() {
    let h = Harness::new();
    h.play("A").await;
    wait_now_playing(&h, "A").await;
    h.finish_current().await;

    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move { session.snapshot().await.inactivity_armed }
        })
        .await
    );

    h.play("B").await;
    wait_now_playing(&h, "B").await;
    assert!(!h.session.snapshot().await.inactivity_armed);
}

async fn play_and_drain(h: &Harness) {
    h.play("A").await;
    wait_now_playing(h, "A").await;
    h.finish_current().await;

    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move { session.snapshot().await.inactivity_armed }
        })
        .await,
        "timer not armed after the queue drained"
    );
}

#[tokio::test]
async fn failed_download_on_idle_session_rearms_inactivity() {
    let h = Harness::new();
    play_and_drain(&h).await;

    h.resolver.fail("bad");
    h.play("bad").await;
    let sink = h.sink.clone();
    assert!(
        wait_until(WAIT, || {
            let sink = sink.clone();
            async move { !sink.errors().is_empty() }
        })
        .await
    );

    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move { session.snapshot().await.inactivity_armed }
        })
        .await,
        "queue drained with nothing incoming but timer disarmed"
    );
    let snapshot = h.session.snapshot().await;
    assert_eq!((snapshot.upcoming, snapshot.ready), (0, 0));
    assert!(snapshot.player_worker_running);
    // The empty-queue notice is not repeated
    let empty_notices = h.sink.texts().iter().filter(|t| *t == QUEUE_EMPTY).count();
    assert_eq!(empty_notices, 1);
}

#[tokio::test]
async fn failed_inspect_on_idle_session_rearms_inactivity() {
    let h = Harness::new();
    play_and_drain(&h).await;

    h.resolver.fail_inspect("nope");
    let result = h.session.enqueue("nope", RequestPriority::Append).await;
    assert!(matches!(result, Err(Error::Resolve { .. })));
    assert!(h.session.snapshot().await.inactivity_armed);
}

#[tokio::test]
async fn events_follow_the_track_lifecycle() {
    let h = Harness::new();
    h.resolver.set_delay("A", Duration::from_millis(50));
    let mut events = h.events.subscribe();
    h.play("A").await;
    wait_now_playing(&h, "A").await;
    h.finish_current().await;

    let session = h.session.clone();
    assert!(
        wait_until(WAIT, || {
            let session = session.clone();
            async move { session.snapshot().await.status == PlaybackStatus::Idle }
        })
        .await
    );

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event.event_type());
    }
    let position = |name: &str| seen.iter().position(|t| *t == name);
    let queued = position("TrackQueued").expect("queued");
    let ready = position("TrackReady").expect("ready");
    let started = position("TrackStarted").expect("started");
    let finished = position("TrackFinished").expect("finished");
    assert!(queued < ready && ready < started && started < finished);
}
