//! Service-level tests against a throwaway SQLite file. Elapsed wall-clock
//! is simulated by inserting entries whose `check_in` / `last_paused`
//! timestamps are back-dated through the store.

use std::{env, fs, path::PathBuf, sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use workclock::{
    db::Database,
    error::TrackerError,
    models::TimeEntry,
    tracking::{Principal, ProjectCompanyCache, StaticProjectRegistry, TimeTrackingService},
};

fn setup_test_db(name: &str) -> PathBuf {
    let mut path = env::temp_dir();
    path.push(format!("{name}_workclock.sqlite"));

    for suffix in ["", "-wal", "-shm"] {
        let mut stale = path.clone();
        stale.set_file_name(format!(
            "{}{suffix}",
            path.file_name().unwrap().to_string_lossy()
        ));
        let _ = fs::remove_file(stale);
    }

    path
}

struct Harness {
    service: TimeTrackingService,
    db: Database,
}

fn harness(name: &str) -> Harness {
    let db = Database::new(setup_test_db(name)).expect("database init");

    let registry = Arc::new(StaticProjectRegistry::new());
    registry.register("p1", "c1", "Alpha");
    registry.register("p2", "c1", "Beta");

    let cache = Arc::new(ProjectCompanyCache::new(
        registry,
        StdDuration::from_secs(300),
    ));

    Harness {
        service: TimeTrackingService::new(db.clone(), cache),
        db,
    }
}

fn principal() -> Principal {
    Principal {
        user_id: "u1".to_string(),
        company_id: "c1".to_string(),
    }
}

fn running_entry(project_id: &str, check_in: DateTime<Utc>, paused_secs: i64) -> TimeEntry {
    TimeEntry {
        id: Uuid::new_v4().to_string(),
        user_id: "u1".to_string(),
        project_id: project_id.to_string(),
        company_id: "c1".to_string(),
        sub_task_id: None,
        date: Utc::now().date_naive(),
        check_in,
        check_out: None,
        is_running: true,
        last_paused: None,
        paused_secs,
        effective_secs: 0,
        total_secs: None,
        is_checked_out: false,
        created_at: check_in,
        updated_at: check_in,
    }
}

fn paused_entry(
    project_id: &str,
    check_in: DateTime<Utc>,
    last_paused: Option<DateTime<Utc>>,
    paused_secs: i64,
    effective_secs: i64,
) -> TimeEntry {
    let mut entry = running_entry(project_id, check_in, paused_secs);
    entry.is_running = false;
    entry.last_paused = last_paused;
    entry.effective_secs = effective_secs;
    entry
}

#[tokio::test]
async fn check_in_starts_a_running_timer() {
    let h = harness("check_in_starts");
    let entry = h.service.check_in(&principal(), "p1", None).await.unwrap();

    assert!(entry.is_running);
    assert!(!entry.is_checked_out);
    assert_eq!(entry.paused_secs, 0);
    assert_eq!(entry.effective_secs, 0);

    let snapshot = h.service.get_elapsed_time(&principal(), "p1").await.unwrap();
    assert!(snapshot.is_running);
    assert!(snapshot.elapsed_time <= 1);
}

#[tokio::test]
async fn elapsed_time_counts_wall_clock_minus_pauses() {
    let h = harness("elapsed_counts");
    let now = Utc::now();

    // Checked in 65s ago, never paused.
    h.db.insert_entry(&running_entry("p1", now - Duration::seconds(65), 0))
        .await
        .unwrap();

    let snapshot = h.service.get_elapsed_time(&principal(), "p1").await.unwrap();
    assert!(snapshot.is_running);
    assert!(
        (65..=66).contains(&snapshot.elapsed_time),
        "expected 65..=66, got {}",
        snapshot.elapsed_time
    );
}

#[tokio::test]
async fn elapsed_time_without_entry_is_a_zeroed_snapshot() {
    let h = harness("elapsed_idle");
    let snapshot = h.service.get_elapsed_time(&principal(), "p1").await.unwrap();

    assert!(!snapshot.is_running);
    assert!(!snapshot.is_checked_out);
    assert_eq!(snapshot.elapsed_time, 0);
    assert_eq!(snapshot.paused_duration, 0);
    assert!(snapshot.check_in_time.is_none());
}

#[tokio::test]
async fn pause_freezes_effective_time() {
    let h = harness("pause_freezes");
    let now = Utc::now();
    h.db.insert_entry(&running_entry("p1", now - Duration::seconds(30), 0))
        .await
        .unwrap();

    let outcome = h.service.pause_or_resume(&principal(), "p1").await.unwrap();
    assert!(!outcome.is_running);
    assert!((30..=31).contains(&outcome.elapsed_time));

    // Frozen while paused, no matter how much later we look.
    let snapshot = h.service.get_elapsed_time(&principal(), "p1").await.unwrap();
    assert_eq!(snapshot.elapsed_time, outcome.elapsed_time);
}

#[tokio::test]
async fn resume_folds_pause_window_into_paused_duration() {
    let h = harness("resume_folds");
    let now = Utc::now();

    // Checked in 90s ago, paused 60s ago at 30s of work.
    h.db.insert_entry(&paused_entry(
        "p1",
        now - Duration::seconds(90),
        Some(now - Duration::seconds(60)),
        0,
        30,
    ))
    .await
    .unwrap();

    let outcome = h.service.pause_or_resume(&principal(), "p1").await.unwrap();
    assert!(outcome.is_running);
    assert!((60..=61).contains(&outcome.paused_duration));
    assert!((29..=31).contains(&outcome.elapsed_time));
}

#[tokio::test]
async fn resume_without_paused_state_is_a_conflict() {
    let h = harness("resume_without_pause");
    let now = Utc::now();
    h.db.insert_entry(&paused_entry(
        "p1",
        now - Duration::seconds(10),
        None,
        0,
        5,
    ))
    .await
    .unwrap();

    let err = h
        .service
        .pause_or_resume(&principal(), "p1")
        .await
        .unwrap_err();
    match err {
        TrackerError::Conflict(message) => {
            assert!(message.contains("Cannot resume without a paused state"))
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn check_out_while_paused_is_rejected() {
    let h = harness("checkout_paused");
    let now = Utc::now();
    h.db.insert_entry(&paused_entry(
        "p1",
        now - Duration::seconds(120),
        Some(now - Duration::seconds(20)),
        0,
        100,
    ))
    .await
    .unwrap();

    let err = h.service.check_out(&principal(), "p1").await.unwrap_err();
    match err {
        TrackerError::Conflict(message) => {
            assert!(message.contains("Cannot check out while paused"))
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn double_check_in_same_project_is_rejected() {
    let h = harness("double_checkin");
    h.service.check_in(&principal(), "p1", None).await.unwrap();

    let err = h
        .service
        .check_in(&principal(), "p1", None)
        .await
        .unwrap_err();
    match err {
        TrackerError::Conflict(message) => {
            assert!(message.contains("already checked in"))
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn check_in_with_running_timer_elsewhere_is_rejected() {
    let h = harness("exclusive_checkin");
    h.service.check_in(&principal(), "p1", None).await.unwrap();

    let err = h
        .service
        .check_in(&principal(), "p2", None)
        .await
        .unwrap_err();
    match err {
        TrackerError::Conflict(message) => {
            assert!(message.contains("active timer running for another project"))
        }
        other => panic!("expected conflict, got {other:?}"),
    }
}

#[tokio::test]
async fn check_out_seals_the_entry_and_is_terminal() {
    let h = harness("checkout_terminal");
    let now = Utc::now();
    h.db.insert_entry(&running_entry("p1", now - Duration::seconds(100), 0))
        .await
        .unwrap();

    let summary = h.service.check_out(&principal(), "p1").await.unwrap();
    assert!((100..=101).contains(&summary.total_duration));
    assert!(summary.formatted_time.contains("1m"));

    // A second attempt fails and never mutates the stored total.
    let err = h.service.check_out(&principal(), "p1").await.unwrap_err();
    match err {
        TrackerError::Conflict(message) => {
            assert!(message.contains("already checked out"))
        }
        other => panic!("expected conflict, got {other:?}"),
    }

    let sealed = h
        .db
        .find_latest_entry("u1", "p1", "c1", now.date_naive())
        .await
        .unwrap()
        .unwrap();
    assert!(sealed.is_checked_out);
    assert_eq!(sealed.total_secs, Some(summary.total_duration));
}

#[tokio::test]
async fn pause_cas_loses_against_a_stale_discriminant() {
    let h = harness("cas_pause");
    let now = Utc::now();
    let entry = running_entry("p1", now - Duration::seconds(40), 0);
    h.db.insert_entry(&entry).await.unwrap();

    // First writer pauses; the second one is working from a stale read and
    // must not double-apply.
    assert!(h.db.pause_entry(&entry.id, 40, now).await.unwrap());
    assert!(!h.db.pause_entry(&entry.id, 40, now).await.unwrap());

    let stored = h
        .db
        .find_latest_entry("u1", "p1", "c1", now.date_naive())
        .await
        .unwrap()
        .unwrap();
    assert!(!stored.is_running);
    assert_eq!(stored.effective_secs, 40);
}

#[tokio::test]
async fn store_rejects_a_second_running_timer_per_user() {
    let h = harness("one_running");
    let now = Utc::now();
    h.db.insert_entry(&running_entry("p1", now, 0)).await.unwrap();

    let second = running_entry("p2", now, 0);
    assert!(h.db.insert_entry(&second).await.is_err());
}

#[tokio::test]
async fn resume_with_running_timer_elsewhere_is_a_conflict() {
    let h = harness("resume_exclusive");
    let now = Utc::now();

    // p1 paused, p2 running: resuming p1 would give the user two active
    // timers, which the store's uniqueness guarantee forbids.
    h.db.insert_entry(&paused_entry(
        "p1",
        now - Duration::seconds(300),
        Some(now - Duration::seconds(100)),
        0,
        200,
    ))
    .await
    .unwrap();
    h.db.insert_entry(&running_entry("p2", now - Duration::seconds(50), 0))
        .await
        .unwrap();

    let err = h
        .service
        .pause_or_resume(&principal(), "p1")
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Conflict(_)));
}

#[tokio::test]
async fn unknown_project_is_an_authorization_error() {
    let h = harness("unknown_project");
    let err = h
        .service
        .check_in(&principal(), "ghost", None)
        .await
        .unwrap_err();
    assert!(matches!(err, TrackerError::Authorization(_)));
}

#[tokio::test]
async fn malformed_project_id_is_a_validation_error() {
    let h = harness("bad_project_id");
    for bad in ["", "has space", "semi;colon", &"x".repeat(65)] {
        let err = h
            .service
            .check_in(&principal(), bad, None)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::Validation(_)), "id: {bad:?}");
    }
}

#[tokio::test]
async fn user_time_report_sums_the_day() {
    let h = harness("user_report");
    let now = Utc::now();

    let mut sealed = running_entry("p1", now - Duration::seconds(4000), 0);
    sealed.is_running = false;
    sealed.is_checked_out = true;
    sealed.total_secs = Some(3600);
    sealed.check_out = Some(now - Duration::seconds(400));
    h.db.insert_entry(&sealed).await.unwrap();

    let mut open = running_entry("p1", now - Duration::seconds(200), 0);
    open.effective_secs = 120;
    open.is_running = false;
    open.last_paused = Some(now - Duration::seconds(10));
    h.db.insert_entry(&open).await.unwrap();

    let report = h
        .service
        .user_time_project(&principal(), "p1", None)
        .await
        .unwrap();
    assert_eq!(report.entries.len(), 2);
    assert_eq!(report.total_time, 3720);
    assert_eq!(report.formatted_total_time, "1h 2m 0s");
}

#[tokio::test]
async fn users_aggregate_covers_only_checked_out_entries() {
    let h = harness("users_aggregate");
    let now = Utc::now();

    for (user, total) in [("u1", 3600), ("u2", 1800)] {
        let mut entry = running_entry("p1", now - Duration::seconds(7200), 0);
        entry.user_id = user.to_string();
        entry.is_running = false;
        entry.is_checked_out = true;
        entry.total_secs = Some(total);
        entry.check_out = Some(now);
        h.db.insert_entry(&entry).await.unwrap();
    }
    // Open entry must not leak into the aggregate.
    let mut open = running_entry("p1", now, 0);
    open.user_id = "u3".to_string();
    h.db.insert_entry(&open).await.unwrap();

    let aggregates = h
        .service
        .users_time_project(&principal(), "p1", None)
        .await
        .unwrap();

    assert_eq!(aggregates.len(), 2);
    assert_eq!(aggregates[0].user_id, "u1");
    assert_eq!(aggregates[0].total_duration, 3600);
    assert_eq!(aggregates[1].user_id, "u2");
    assert_eq!(aggregates[1].formatted_total_time, "0h 30m 0s");
}

#[tokio::test]
async fn company_dashboard_reports_active_timers_and_stats() {
    let h = harness("dashboard");
    let now = Utc::now();

    h.db.insert_entry(&running_entry("p1", now - Duration::seconds(60), 0))
        .await
        .unwrap();

    let mut sealed = running_entry("p2", now - Duration::seconds(4000), 0);
    sealed.user_id = "u2".to_string();
    sealed.is_running = false;
    sealed.is_checked_out = true;
    sealed.total_secs = Some(2400);
    sealed.check_out = Some(now);
    h.db.insert_entry(&sealed).await.unwrap();

    let dashboard = h
        .service
        .company_dashboard(&principal(), None)
        .await
        .unwrap();

    assert_eq!(dashboard.active_timers, 1);
    assert_eq!(dashboard.active_timer_details[0].project_id, "p1");
    assert_eq!(dashboard.project_stats.len(), 1);
    assert_eq!(dashboard.project_stats[0].project_id, "p2");
    assert_eq!(dashboard.project_stats[0].total_time, 2400);
    assert_eq!(dashboard.today_activity.len(), 2);
}
