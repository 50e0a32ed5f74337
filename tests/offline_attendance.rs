mod common;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use common::mocks::{RecordingRemote, RemoteCall, SlowStore};
use common::{build_coordinator, draft, eventually, setup, setup_with_config, test_config};
use shepherd_lib::domain::entities::{AttendanceRecord, AttendanceUpdate};
use shepherd_lib::domain::value_objects::{EventId, SyncState};
use shepherd_lib::shared::AppError;
use shepherd_lib::RecordOutcome;

const CACHE_KEY: &str = "test:attendance_cache";

#[tokio::test]
async fn offline_record_is_queued_without_touching_cache() {
    let ctx = setup(SyncState::Online);
    ctx.coordinator
        .record_attendance(draft("m0", "e1", "2024-04-28", true))
        .await
        .expect("online record");
    ctx.coordinator.fetch_attendance(None).await;
    let cache_before = ctx.store.entries().await.get(CACHE_KEY).cloned();
    assert!(cache_before.is_some());

    ctx.coordinator.handle_connectivity_change(false).await;
    let before = ctx.coordinator.pending_count().await;
    let outcome = ctx
        .coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect("offline record");

    assert_eq!(outcome, RecordOutcome::Queued);
    let entries = ctx.coordinator.pending_entries().await;
    assert_eq!(entries.len(), before + 1);
    let expected =
        AttendanceRecord::try_from(draft("m1", "e1", "2024-05-01", true)).expect("record");
    assert_eq!(entries.last().map(|e| &e.record), Some(&expected));
    assert_eq!(ctx.store.entries().await.get(CACHE_KEY).cloned(), cache_before);
}

#[tokio::test]
async fn drain_sends_queue_in_fifo_order() {
    let ctx = setup(SyncState::Offline);
    for member in ["r1", "r2", "r3"] {
        ctx.coordinator
            .record_attendance(draft(member, "e1", "2024-05-01", true))
            .await
            .expect("queue");
    }

    let report = ctx
        .coordinator
        .handle_connectivity_change(true)
        .await
        .expect("drain report");

    assert_eq!(ctx.remote.inserted_members(), vec!["r1", "r2", "r3"]);
    assert_eq!(report.delivered, 3);
    assert_eq!(report.passes, 1);
}

#[tokio::test]
async fn queue_is_empty_after_drain_even_with_failures() {
    let ctx = setup(SyncState::Offline);
    for member in ["r1", "r2", "r3"] {
        ctx.coordinator
            .record_attendance(draft(member, "e1", "2024-05-01", true))
            .await
            .expect("queue");
    }
    ctx.remote.fail_member("r2");

    let report = ctx
        .coordinator
        .handle_connectivity_change(true)
        .await
        .expect("drain report");

    assert_eq!(ctx.coordinator.pending_count().await, 0);
    assert_eq!(ctx.remote.inserted_members(), vec!["r1", "r2", "r3"]);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.abandoned.len(), 1);
    assert_eq!(report.abandoned[0].record.member_id.as_str(), "r2");
    assert!(report
        .failure_summary()
        .expect("summary")
        .contains("could not be delivered"));
    assert_eq!(ctx.coordinator.state().await, SyncState::Online);
}

#[tokio::test]
async fn failed_online_read_returns_previous_snapshot() {
    let ctx = setup(SyncState::Online);
    ctx.coordinator
        .record_attendance_batch(vec![
            draft("m1", "e1", "2024-05-01", true),
            draft("m2", "e1", "2024-05-01", false),
        ])
        .await
        .expect("batch");
    let snapshot = ctx.coordinator.fetch_attendance(None).await;
    assert_eq!(snapshot.len(), 2);

    ctx.remote.set_fail_select(true);
    let fallback = ctx.coordinator.fetch_attendance(None).await;

    assert_eq!(fallback, snapshot);
}

#[tokio::test]
async fn invalid_record_is_rejected_before_any_io() {
    for state in [SyncState::Online, SyncState::Offline] {
        let ctx = setup(state);

        let err = ctx
            .coordinator
            .record_attendance(draft("", "e1", "2024-01-01", true))
            .await
            .expect_err("validation");

        assert!(
            matches!(err, AppError::ValidationError(ref msg) if msg == "Member ID is required")
        );
        assert!(ctx.remote.calls().is_empty());
        assert!(ctx.store.is_empty().await);
    }
}

#[tokio::test]
async fn offline_then_reconnect_scenario() {
    let ctx = setup(SyncState::Offline);

    ctx.coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect("queue");
    let queued = ctx.coordinator.pending_entries().await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].record.member_id.as_str(), "m1");
    assert_eq!(queued[0].record.event_id.as_str(), "e1");
    assert_eq!(
        queued[0].record.attendance_date,
        NaiveDate::from_ymd_opt(2024, 5, 1).expect("date")
    );
    assert!(queued[0].record.present);
    assert_eq!(queued[0].record.notes, None);

    ctx.coordinator.handle_connectivity_change(true).await;

    let calls = ctx.remote.calls();
    assert_eq!(calls.len(), 2);
    assert!(matches!(&calls[0], RemoteCall::Insert { record, .. } if record == &queued[0].record));
    assert_eq!(calls[1], RemoteCall::Select);
    assert_eq!(ctx.coordinator.pending_count().await, 0);

    let cached = ctx
        .coordinator
        .cache_snapshot()
        .await
        .expect("cache refreshed");
    assert_eq!(cached.records.len(), 1);
}

#[tokio::test]
async fn online_mass_submit_is_one_upsert() {
    let ctx = setup(SyncState::Online);

    let outcome = ctx
        .coordinator
        .record_attendance_batch(vec![
            draft("m1", "e2", "2024-05-02", true),
            draft("m2", "e2", "2024-05-02", true),
            draft("m3", "e2", "2024-05-02", false),
        ])
        .await
        .expect("batch");

    assert_eq!(outcome, RecordOutcome::Delivered);
    let upserts: Vec<_> = ctx
        .remote
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            RemoteCall::Upsert(records) => Some(records),
            _ => None,
        })
        .collect();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].len(), 3);
    let e2 = EventId::new("e2".into()).expect("event id");
    assert!(upserts[0].iter().all(|r| r.event_id == e2
        && r.attendance_date == NaiveDate::from_ymd_opt(2024, 5, 2).expect("date")));
    assert_eq!(ctx.remote.count(|c| matches!(c, RemoteCall::Insert { .. })), 0);
}

#[tokio::test]
async fn offline_mass_submit_is_queued_atomically() {
    let ctx = setup(SyncState::Offline);

    ctx.coordinator
        .record_attendance_batch(vec![
            draft("m1", "e2", "2024-05-02", true),
            draft("m2", "e2", "2024-05-02", true),
        ])
        .await
        .expect("batch");

    assert_eq!(ctx.coordinator.pending_count().await, 2);
    assert!(ctx.remote.calls().is_empty());
}

#[tokio::test]
async fn queued_entry_ids_are_sent_as_idempotency_keys() {
    let ctx = setup(SyncState::Offline);
    for member in ["m1", "m2"] {
        ctx.coordinator
            .record_attendance(draft(member, "e1", "2024-05-01", true))
            .await
            .expect("queue");
    }
    let ids: Vec<Option<String>> = ctx
        .coordinator
        .pending_entries()
        .await
        .into_iter()
        .map(|entry| Some(entry.entry_id.to_string()))
        .collect();

    ctx.coordinator.handle_connectivity_change(true).await;

    assert_eq!(ctx.remote.insert_keys(), ids);
}

#[tokio::test]
async fn records_enqueued_during_drain_are_not_lost() {
    let ctx = setup(SyncState::Offline);
    for member in ["m1", "m2"] {
        ctx.coordinator
            .record_attendance(draft(member, "e1", "2024-05-01", true))
            .await
            .expect("queue");
    }
    ctx.remote.set_insert_delay(Duration::from_millis(100));

    let coordinator = ctx.coordinator.clone();
    let drain = tokio::spawn(async move { coordinator.handle_connectivity_change(true).await });

    let remote = ctx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { !remote.calls().is_empty() }
        })
        .await
    );
    assert_eq!(ctx.coordinator.state().await, SyncState::Draining);

    let outcome = ctx
        .coordinator
        .record_attendance(draft("late", "e1", "2024-05-01", true))
        .await
        .expect("queue during drain");
    assert_eq!(outcome, RecordOutcome::Queued);

    let report = drain.await.expect("join").expect("drain report");

    assert_eq!(report.passes, 2);
    assert_eq!(report.delivered, 3);
    assert_eq!(ctx.remote.inserted_members(), vec!["m1", "m2", "late"]);
    assert_eq!(ctx.coordinator.pending_count().await, 0);
    assert_eq!(ctx.coordinator.state().await, SyncState::Online);
}

#[tokio::test]
async fn only_one_drain_runs_at_a_time() {
    let ctx = setup(SyncState::Offline);
    ctx.coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect("queue");
    ctx.remote.set_insert_delay(Duration::from_millis(100));

    let coordinator = ctx.coordinator.clone();
    let first = tokio::spawn(async move { coordinator.handle_connectivity_change(true).await });

    let remote = ctx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { !remote.calls().is_empty() }
        })
        .await
    );

    assert!(ctx.coordinator.drain().await.is_none());
    assert!(ctx.coordinator.handle_connectivity_change(true).await.is_none());

    let report = first.await.expect("join").expect("drain report");
    assert_eq!(report.delivered, 1);
    assert_eq!(ctx.remote.inserted_members(), vec!["m1"]);
}

#[tokio::test]
async fn connectivity_loss_interrupts_drain() {
    let ctx = setup(SyncState::Offline);
    for member in ["m1", "m2", "m3"] {
        ctx.coordinator
            .record_attendance(draft(member, "e1", "2024-05-01", true))
            .await
            .expect("queue");
    }
    ctx.remote.set_insert_delay(Duration::from_millis(100));

    let coordinator = ctx.coordinator.clone();
    let drain = tokio::spawn(async move { coordinator.handle_connectivity_change(true).await });

    let remote = ctx.remote.clone();
    assert!(
        eventually(|| {
            let remote = remote.clone();
            async move { !remote.calls().is_empty() }
        })
        .await
    );
    ctx.coordinator.handle_connectivity_change(false).await;

    let report = drain.await.expect("join").expect("drain report");

    assert!(report.interrupted);
    assert_eq!(report.attempted, 1);
    assert_eq!(report.remaining, 2);
    assert_eq!(ctx.coordinator.state().await, SyncState::Offline);
    assert_eq!(ctx.remote.select_count(), 0);
    let left = ctx.coordinator.pending_entries().await;
    assert!(left.iter().all(|entry| entry.attempts == 0));
}

#[tokio::test]
async fn reconnect_while_interrupted_drain_finishes_still_delivers_queue() {
    let remote = Arc::new(RecordingRemote::new());
    let coordinator = build_coordinator(
        Arc::new(SlowStore::new(Duration::from_millis(50))),
        remote.clone(),
        test_config("test"),
        SyncState::Offline,
    );
    for member in ["m1", "m2", "m3"] {
        coordinator
            .record_attendance(draft(member, "e1", "2024-05-01", true))
            .await
            .expect("queue");
    }
    remote.set_insert_delay(Duration::from_millis(100));

    let first_coordinator = coordinator.clone();
    let first =
        tokio::spawn(async move { first_coordinator.handle_connectivity_change(true).await });

    let watched = remote.clone();
    assert!(
        eventually(|| {
            let remote = watched.clone();
            async move { !remote.calls().is_empty() }
        })
        .await
    );
    coordinator.handle_connectivity_change(false).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    coordinator.handle_connectivity_change(true).await;

    first.await.expect("join");

    assert_eq!(coordinator.pending_count().await, 0);
    assert_eq!(coordinator.state().await, SyncState::Online);
    assert_eq!(remote.inserted_members(), vec!["m1", "m2", "m3"]);
    let metrics = coordinator.metrics();
    assert!(metrics.total_drains >= 2);
    assert_eq!(metrics.last_interrupted, Some(false));
}

#[tokio::test]
async fn slow_remote_write_times_out() {
    let mut config = test_config("timeout");
    config.sync.remote_timeout_ms = 50;
    let ctx = setup_with_config(SyncState::Online, config);
    ctx.remote.set_insert_delay(Duration::from_millis(300));

    let err = ctx
        .coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect_err("timeout");

    assert!(matches!(err, AppError::Timeout(_)));
    assert!(err.is_transient());
    assert_eq!(ctx.coordinator.pending_count().await, 0);
}

#[tokio::test]
async fn slow_remote_read_falls_back_to_cache() {
    let mut config = test_config("timeout");
    config.sync.remote_timeout_ms = 50;
    let ctx = setup_with_config(SyncState::Online, config);
    ctx.coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect("record");
    let cached = ctx.coordinator.fetch_attendance(None).await;
    assert_eq!(cached.len(), 1);

    ctx.remote.set_select_delay(Duration::from_millis(300));
    let fallback = ctx.coordinator.fetch_attendance(None).await;

    assert_eq!(fallback, cached);
}

#[tokio::test]
async fn failed_entries_are_retried_until_max_attempts() {
    let mut config = test_config("retry");
    config.sync.max_drain_attempts = 2;
    let ctx = setup_with_config(SyncState::Offline, config);
    for member in ["m1", "m2"] {
        ctx.coordinator
            .record_attendance(draft(member, "e1", "2024-05-01", true))
            .await
            .expect("queue");
    }
    ctx.remote.fail_member("m1");

    let first = ctx
        .coordinator
        .handle_connectivity_change(true)
        .await
        .expect("first drain");
    assert_eq!(first.delivered, 1);
    assert_eq!(first.retained, 1);
    assert_eq!(first.remaining, 1);
    let left = ctx.coordinator.pending_entries().await;
    assert_eq!(left[0].attempts, 1);
    assert!(left[0].last_error.as_deref().unwrap_or_default().contains("connection reset"));

    ctx.coordinator.handle_connectivity_change(false).await;
    let second = ctx
        .coordinator
        .handle_connectivity_change(true)
        .await
        .expect("second drain");
    assert_eq!(second.abandoned.len(), 1);
    assert_eq!(second.abandoned[0].attempts, 2);
    assert_eq!(ctx.coordinator.pending_count().await, 0);

    let metrics = ctx.coordinator.metrics();
    assert_eq!(metrics.total_drains, 2);
    assert_eq!(metrics.total_delivered, 1);
    assert_eq!(metrics.total_abandoned, 1);
    assert_eq!(metrics.consecutive_failure, 2);
}

#[tokio::test]
async fn retained_entry_is_delivered_after_recovery() {
    let mut config = test_config("retry");
    config.sync.max_drain_attempts = 3;
    let ctx = setup_with_config(SyncState::Offline, config);
    ctx.coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect("queue");
    ctx.remote.fail_member("m1");
    ctx.coordinator.handle_connectivity_change(true).await;
    assert_eq!(ctx.coordinator.pending_count().await, 1);

    ctx.remote.heal_member("m1");
    ctx.coordinator.handle_connectivity_change(false).await;
    let report = ctx
        .coordinator
        .handle_connectivity_change(true)
        .await
        .expect("drain");

    assert_eq!(report.delivered, 1);
    assert!(!report.has_failures());
    assert_eq!(ctx.coordinator.metrics().consecutive_failure, 0);
    let keys = ctx.remote.insert_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
}

#[tokio::test]
async fn failed_online_write_can_be_queued_for_retry() {
    let mut config = test_config("fallback");
    config.sync.queue_failed_online_writes = true;
    let ctx = setup_with_config(SyncState::Online, config);
    ctx.remote.set_fail_all_writes(true);

    let outcome = ctx
        .coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect("queued");
    assert_eq!(outcome, RecordOutcome::Queued);

    ctx.remote.set_fail_all_writes(false);
    let report = ctx.coordinator.drain().await.expect("drain");

    assert_eq!(report.delivered, 1);
    let keys = ctx.remote.insert_keys();
    assert_eq!(keys.len(), 2);
    assert_eq!(keys[0], keys[1]);
    assert_eq!(ctx.remote.rows().len(), 1);
}

#[tokio::test]
async fn edit_and_delete_refresh_the_cache() {
    let ctx = setup(SyncState::Online);
    ctx.coordinator
        .record_attendance(draft("m1", "e1", "2024-05-01", true))
        .await
        .expect("record");
    let rows = ctx.coordinator.fetch_attendance(None).await;
    let id = rows[0].id.clone().expect("server id");

    ctx.coordinator
        .update_attendance(
            &id,
            AttendanceUpdate {
                present: Some(false),
                notes: Some("left early".into()),
            },
        )
        .await
        .expect("update");
    let cached = ctx.coordinator.cache_snapshot().await.expect("cache");
    assert!(!cached.records[0].record.present);
    assert_eq!(cached.records[0].record.notes.as_deref(), Some("left early"));

    ctx.coordinator.delete_attendance(&id).await.expect("delete");
    let cached = ctx.coordinator.cache_snapshot().await.expect("cache");
    assert!(cached.records.is_empty());
}
