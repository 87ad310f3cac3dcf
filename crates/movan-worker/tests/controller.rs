//! Job controller tests against the synthetic backend.

mod common;

use common::{Fixture, Recipe, SyntheticBackend, LOCK_TIMEOUT};
use movan_models::{JobStatus, ZoneCode};
use movan_worker::{JobOutcome, SessionLock};

#[tokio::test]
async fn test_blinking_recording_completes() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::blinking(300, 15)).await;
    let controller = fx.controller(SyntheticBackend::new());

    let outcome = controller.run(&name).await;
    assert_eq!(outcome, JobOutcome::Completed { frames: 300 });

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.total_frames, 300);
    assert_eq!(job.processed_frames, 300);
    assert!(job.error.is_none());

    let paths = fx.store.paths(&name);
    assert!(paths.heatmap.exists());
    assert!(!paths.heatmap_partial.exists());
    assert!(!paths.lock.exists());
    let heatmap = tokio::fs::read_to_string(&paths.heatmap).await.unwrap();
    assert_eq!(heatmap.lines().count(), 300);

    let analytics = fx.store.read_analytics(&name).await.unwrap().unwrap();
    assert_eq!(analytics.total_frames, 300);
    assert_eq!(analytics.duration_seconds, 10.0);
    assert_eq!(analytics.fps, 30.0);
    assert_eq!(analytics.hot_zones.len(), 9);
    assert_eq!(analytics.hot_zones[&ZoneCode::Tl], 100.0);
    for zone in ZoneCode::ALL.iter().filter(|z| **z != ZoneCode::Tl) {
        assert_eq!(analytics.hot_zones[zone], 0.0, "zone {}", zone.as_str());
    }
    assert_eq!(analytics.dominant_zone(), Some(ZoneCode::Tl));
    assert!(analytics.repetition.dominant_frequency_hz.is_some());
    assert_eq!(analytics.repetition.cycle_count, 19);
    assert!(analytics.intensity.peak > 0.0);

    let times: Vec<f64> = analytics.timeline.iter().map(|p| p.time).collect();
    assert_eq!(times[0], 0.0);
    assert!(times.windows(2).all(|w| w[1] > w[0]));
    let last = *times.last().unwrap();
    assert!(analytics.duration_seconds - last <= 1.0 / 30.0 + 1e-9);

    for point in &analytics.zone_timeline {
        let max = point.zones.values().copied().fold(0.0, f64::max);
        assert!(max == 0.0 || max == 100.0);
        assert!(point.zones.values().all(|v| (0.0..=100.0).contains(v)));
    }
}

#[tokio::test]
async fn test_cycle_count_with_period_off_the_sampling_grid() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::blinking(301, 16)).await;
    let controller = fx.controller(SyntheticBackend::new());

    assert_eq!(
        controller.run(&name).await,
        JobOutcome::Completed { frames: 301 }
    );

    let analytics = fx.store.read_analytics(&name).await.unwrap().unwrap();
    assert_eq!(analytics.repetition.cycle_count, 18);
    assert_eq!(analytics.intensity.peak_time, 0.53);
    assert!(analytics.intensity.average > 0.0);
}

#[tokio::test]
async fn test_still_recording_has_no_movement() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::still(120)).await;
    let controller = fx.controller(SyntheticBackend::new());

    assert_eq!(
        controller.run(&name).await,
        JobOutcome::Completed { frames: 120 }
    );

    let analytics = fx.store.read_analytics(&name).await.unwrap().unwrap();
    assert_eq!(analytics.intensity.average, 0.0);
    assert_eq!(analytics.intensity.peak, 0.0);
    assert_eq!(analytics.active_area_percent, 0.0);
    assert_eq!(analytics.repetition.cycle_count, 0);
    assert_eq!(analytics.repetition.dominant_frequency_hz, None);
    assert_eq!(analytics.dominant_zone(), None);
    assert!(analytics.hot_zones.values().all(|v| *v == 0.0));
}

#[tokio::test]
async fn test_unreadable_recording_fails_without_outputs() {
    let fx = Fixture::new();
    let name = fx.session_with_bytes(b"\x1a\x45\xdf\xa3 truncated").await;
    let controller = fx.controller(SyntheticBackend::new());

    let outcome = controller.run(&name).await;
    assert!(matches!(outcome, JobOutcome::Failed { .. }));

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().starts_with("Decode error"));

    let paths = fx.store.paths(&name);
    assert!(!paths.heatmap.exists());
    assert!(!paths.heatmap_partial.exists());
    assert!(!paths.analytics.exists());
    assert!(fx.store.read_analytics(&name).await.unwrap().is_none());
}

#[tokio::test]
async fn test_decode_failure_mid_stream_discards_partial_heatmap() {
    let fx = Fixture::new();
    let recipe = Recipe {
        fail_decode_at: Some(50),
        ..Recipe::blinking(300, 15)
    };
    let name = fx.session(&recipe).await;
    let controller = fx.controller(SyntheticBackend::new());

    assert!(matches!(
        controller.run(&name).await,
        JobOutcome::Failed { .. }
    ));

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.processed_frames <= 50);
    let paths = fx.store.paths(&name);
    assert!(!paths.heatmap_partial.exists());
    assert!(!paths.heatmap.exists());
    assert!(!paths.analytics.exists());
}

#[tokio::test]
async fn test_encode_failure_is_recorded() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::blinking(90, 15)).await;
    let controller = fx.controller(SyntheticBackend::new().failing_encode_at(20));

    assert!(matches!(
        controller.run(&name).await,
        JobOutcome::Failed { .. }
    ));

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert!(job.error.as_deref().unwrap().starts_with("Encode error"));
    assert!(!fx.store.paths(&name).heatmap_partial.exists());
}

#[tokio::test]
async fn test_progress_is_monotonic() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::blinking(200, 10)).await;
    let backend = SyntheticBackend::new();
    let controller = fx.controller(backend.clone());

    controller.run(&name).await;

    let observed = backend.observed_jobs();
    assert!(observed.len() > 1);
    for job in &observed {
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.total_frames, 200);
        assert!(job.processed_frames <= job.total_frames);
    }
    for pair in observed.windows(2) {
        assert!(pair[1].processed_frames >= pair[0].processed_frames);
    }
    // throttled to roughly one write per 10 frames
    assert!(observed.last().unwrap().processed_frames >= 190);

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(job.processed_frames, 200);
}

#[tokio::test]
async fn test_deleted_session_cancels_processing() {
    let fx = Fixture::new();
    let recipe = Recipe {
        delete_session_at: Some(40),
        ..Recipe::blinking(300, 15)
    };
    let name = fx.session(&recipe).await;
    let controller = fx.controller(SyntheticBackend::new());

    assert_eq!(controller.run(&name).await, JobOutcome::Cancelled);
    assert!(!fx.store.paths(&name).dir.exists());
    assert!(!fx.store.exists(&name).await);
}

#[tokio::test]
async fn test_analytics_are_deterministic() {
    let fx = Fixture::new();
    let recipe = Recipe::blinking(150, 12);
    let first = fx.session(&recipe).await;
    let second = fx.session(&recipe).await;
    assert_ne!(first, second);

    let controller = fx.controller(SyntheticBackend::new());
    controller.run(&first).await;
    controller.run(&second).await;

    let a = tokio::fs::read(fx.store.paths(&first).analytics).await.unwrap();
    let b = tokio::fs::read(fx.store.paths(&second).analytics).await.unwrap();
    assert_eq!(a, b);
}

#[tokio::test]
async fn test_locked_session_is_skipped() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::still(30)).await;
    let paths = fx.store.paths(&name);
    let _held = SessionLock::acquire(&paths.lock, "other-worker", LOCK_TIMEOUT).unwrap();

    let controller = fx.controller(SyntheticBackend::new());
    assert_eq!(controller.run(&name).await, JobOutcome::Skipped);

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert!(paths.lock.exists());
}

#[tokio::test]
async fn test_finished_session_is_not_reprocessed() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::still(30)).await;
    let controller = fx.controller(SyntheticBackend::new());

    assert!(matches!(
        controller.run(&name).await,
        JobOutcome::Completed { .. }
    ));
    assert_eq!(controller.run(&name).await, JobOutcome::Skipped);
}

#[tokio::test]
async fn test_rerun_resets_and_reprocesses() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::blinking(90, 15)).await;
    let controller = fx.controller(SyntheticBackend::new());
    controller.run(&name).await;
    let created_at = fx.store.read_job(&name).await.unwrap().created_at;

    let job = fx.store.rerun(&name, LOCK_TIMEOUT).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.created_at, created_at);
    let paths = fx.store.paths(&name);
    assert!(!paths.heatmap.exists());
    assert!(!paths.analytics.exists());

    assert_eq!(
        controller.run(&name).await,
        JobOutcome::Completed { frames: 90 }
    );
    assert_eq!(
        fx.store.read_job(&name).await.unwrap().created_at,
        created_at
    );
}

#[tokio::test]
async fn test_interrupted_session_is_marked_failed() {
    let fx = Fixture::new();
    let name = fx.session(&Recipe::still(30)).await;
    let mut job = fx.store.read_job(&name).await.unwrap();
    job.start(30).unwrap();
    job.record_progress(12).unwrap();
    fx.store.write_job(&name, &job).await.unwrap();
    let paths = fx.store.paths(&name);
    tokio::fs::write(&paths.heatmap_partial, b"frame 0\n")
        .await
        .unwrap();

    let interrupted = fx.store.find_interrupted(LOCK_TIMEOUT).await.unwrap();
    assert_eq!(interrupted, vec![name.clone()]);

    let controller = fx.controller(SyntheticBackend::new());
    assert!(controller.fail_interrupted(&name).await.unwrap());

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.as_deref(), Some("Processing interrupted"));
    assert!(!paths.heatmap_partial.exists());
    assert!(!controller.fail_interrupted(&name).await.unwrap());
}

#[tokio::test]
async fn test_lock_taken_over_mid_run_leaves_session_alone() {
    let fx = Fixture::new();
    let recipe = Recipe {
        take_over_at: Some(40),
        ..Recipe::blinking(300, 15)
    };
    let name = fx.session(&recipe).await;
    let controller = fx.controller(SyntheticBackend::new());

    assert_eq!(controller.run(&name).await, JobOutcome::Skipped);

    let job = fx.store.read_job(&name).await.unwrap();
    assert_eq!(job.status, JobStatus::Error);
    assert_eq!(job.error.as_deref(), Some("Processing interrupted"));
    assert!(job.processed_frames <= 40);

    let paths = fx.store.paths(&name);
    assert!(!paths.heatmap_partial.exists());
    assert!(!paths.heatmap.exists());
    assert!(!paths.analytics.exists());
    let lock = tokio::fs::read_to_string(&paths.lock).await.unwrap();
    assert!(lock.contains("worker-other"));
}

#[tokio::test(flavor = "current_thread")]
async fn test_runtime_stays_responsive_during_analysis() {
    let fx = Fixture::new();
    let recipe = Recipe {
        width: 320,
        height: 240,
        ..Recipe::blinking(120, 15)
    };
    let name = fx.session(&recipe).await;
    let controller = fx.controller(SyntheticBackend::new());

    let job = tokio::spawn(async move { controller.run(&name).await });
    let mut ticks = 0u32;
    while !job.is_finished() {
        tokio::time::sleep(std::time::Duration::from_millis(1)).await;
        ticks += 1;
    }

    assert_eq!(job.await.unwrap(), JobOutcome::Completed { frames: 120 });
    assert!(ticks > 0);
}
