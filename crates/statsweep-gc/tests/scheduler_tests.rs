//! Scheduler timing, gating and mutual exclusion, on a paused clock.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use statsweep_gc::store::StatsTableKind;
use statsweep_gc::{CycleOutcome, SkipReason, SweepPolicy};

use common::{World, live_row, policy, row};

#[tokio::test(start_paused = true)]
async fn loop_runs_on_interval_until_shutdown() {
    let world = World::new();
    let scheduler = Arc::new(world.scheduler(SweepPolicy {
        interval_secs: 60,
        ..policy(100, 100)
    }));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&scheduler).run(rx));

    // Cycles start at t=0, t=60 and t=120.
    tokio::time::sleep(Duration::from_secs(150)).await;
    let status = scheduler.status();
    assert_eq!(status.cycles_started, 3);
    assert_eq!(status.completed, 3);
    assert!(!status.running);

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .expect("loop did not stop")
        .unwrap();
    assert_eq!(scheduler.status().cycles_started, 3);
}

#[tokio::test(start_paused = true)]
async fn loop_skips_cycles_on_a_follower() {
    let world = World::new();
    world.leader.set_leader(false);
    let scheduler = Arc::new(world.scheduler(policy(100, 100)));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(Arc::clone(&scheduler).run(rx));

    tokio::time::sleep(Duration::from_secs(130)).await;
    let status = scheduler.status();
    assert_eq!(status.cycles_started, 0);
    assert_eq!(status.skipped, 3);
    assert!(scheduler.is_healthy(1));

    drop(tx);
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn page_pause_throttles_the_scan() {
    let world = World::new();
    world.store.insert_rows(
        StatsTableKind::ColumnLevel,
        (0..6).map(|i| live_row(&format!("r{i}"))),
    );
    let scheduler = world.scheduler(SweepPolicy {
        fetch_interval_ms: 500,
        ..policy(2, 100)
    });

    let start = Instant::now();
    let outcome = scheduler.run_cycle().await;
    assert_eq!(outcome.label(), "completed");

    assert_eq!(world.store.pages_fetched(), 3);
    assert!(start.elapsed() >= Duration::from_millis(1_500));
}

#[tokio::test(start_paused = true)]
async fn second_trigger_is_rejected_while_running() {
    let world = World::new();
    world.store.insert_rows(
        StatsTableKind::ColumnLevel,
        [row("a", 0, 99, 500, -1, "c", None), live_row("b")],
    );
    let scheduler = Arc::new(world.scheduler(SweepPolicy {
        fetch_interval_ms: 1_000,
        ..policy(1, 100)
    }));

    let first = scheduler.trigger().unwrap();
    assert!(scheduler.is_running());
    assert_eq!(
        scheduler.trigger().unwrap_err(),
        SkipReason::AlreadyRunning
    );
    assert!(matches!(
        scheduler.run_cycle().await,
        CycleOutcome::Skipped {
            reason: SkipReason::AlreadyRunning
        }
    ));

    let outcome = first.await.unwrap();
    assert_eq!(outcome.label(), "completed");
    assert!(!scheduler.is_running());

    let status = scheduler.status();
    assert_eq!(status.cycles_started, 1);
    assert_eq!(status.skipped, 2);
    assert_eq!(world.store.rows(StatsTableKind::ColumnLevel), vec![live_row("b")]);
}

#[tokio::test]
async fn leadership_is_checked_at_cycle_start() {
    let world = World::new();
    let scheduler = Arc::new(world.scheduler(policy(100, 100)));

    world.leader.set_leader(false);
    assert_eq!(scheduler.trigger().unwrap_err(), SkipReason::NotLeader);
    assert!(matches!(
        scheduler.run_cycle().await,
        CycleOutcome::Skipped {
            reason: SkipReason::NotLeader
        }
    ));
    assert!(!scheduler.status().leader);

    world.leader.set_leader(true);
    let outcome = scheduler.trigger().unwrap().await.unwrap();
    assert_eq!(outcome.label(), "completed");
    assert_eq!(outcome.report().unwrap().cycle, 1);
    assert!(scheduler.status().leader);
}
