// Integration tests for the session-tracking engine.
//
// These run against the in-memory store so every transition and emitted
// completed-session row can be inspected directly.

use anyhow::Result;
use chrono::{Duration, Utc};
use std::sync::Arc;
use voicetrack::{
    CompletedSession, MemorySessionStore, PresenceEvent, SessionStore, SessionTracker,
    TrackerError,
};

fn tracker_with_store() -> (Arc<SessionTracker>, Arc<MemorySessionStore>) {
    let store = Arc::new(MemorySessionStore::new());
    let tracker = Arc::new(SessionTracker::new(store.clone()));
    (tracker, store)
}

#[tokio::test]
async fn test_join_then_leave_records_floored_duration() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();

    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
            t0,
        ))
        .await?;

    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            None,
            t0 + Duration::seconds(125),
        ))
        .await?;

    let completed = store.completed_sessions("guild-1").await;
    assert_eq!(completed.len(), 1, "Should record exactly one session");
    assert_eq!(completed[0].channel_id, "channel-1");
    assert_eq!(
        completed[0].duration_minutes, 2,
        "125 seconds should floor to 2 minutes"
    );
    assert_eq!(
        store.open_session_count("guild-1").await,
        0,
        "Leave should close the open session"
    );

    Ok(())
}

#[tokio::test]
async fn test_sub_minute_session_is_clamped_to_one_minute() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();

    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
            t0,
        ))
        .await?;
    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            None,
            t0 + Duration::seconds(10),
        ))
        .await?;

    let completed = store.completed_sessions("guild-1").await;
    assert_eq!(completed.len(), 1);
    assert_eq!(
        completed[0].duration_minutes, 1,
        "Sub-minute sessions must record as 1 minute, never 0"
    );

    Ok(())
}

#[tokio::test]
async fn test_switch_emits_one_row_per_leg() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();

    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
            t0,
        ))
        .await?;
    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-2".to_string()),
            t0 + Duration::seconds(30),
        ))
        .await?;
    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            None,
            t0 + Duration::seconds(90),
        ))
        .await?;

    let completed = store.completed_sessions("guild-1").await;
    assert_eq!(completed.len(), 2, "Each leg should record its own row");
    assert_eq!(completed[0].channel_id, "channel-1");
    assert_eq!(completed[0].duration_minutes, 1);
    assert_eq!(completed[1].channel_id, "channel-2");
    assert_eq!(completed[1].duration_minutes, 1);

    Ok(())
}

#[tokio::test]
async fn test_switch_keeps_member_present_with_no_gap() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();
    let t1 = t0 + Duration::seconds(45);

    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-a".to_string()),
            t0,
        ))
        .await?;
    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-b".to_string()),
            t1,
        ))
        .await?;

    let open = store
        .get_open_session("guild-1", "member-1")
        .await?
        .expect("Member should still be present after a switch");
    assert_eq!(open.channel_id, "channel-b");
    assert_eq!(
        open.started_at, t1,
        "New leg should start exactly at the switch event time"
    );
    assert_eq!(store.open_session_count("guild-1").await, 1);

    Ok(())
}

#[tokio::test]
async fn test_duplicate_present_event_is_a_noop() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();

    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
            t0,
        ))
        .await?;
    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
            t0 + Duration::seconds(30),
        ))
        .await?;

    let open = store
        .get_open_session("guild-1", "member-1")
        .await?
        .expect("Open session should survive a duplicate event");
    assert_eq!(
        open.started_at, t0,
        "Duplicate event must not restart the session clock"
    );
    assert!(
        store.completed_sessions("guild-1").await.is_empty(),
        "Duplicate event must not emit a completed session"
    );

    Ok(())
}

#[tokio::test]
async fn test_leave_without_open_session_is_state_inconsistency() -> Result<()> {
    let (tracker, store) = tracker_with_store();

    let result = tracker
        .handle_presence_event(&PresenceEvent::now("guild-1", "member-1", None))
        .await;

    match result {
        Err(TrackerError::StateInconsistency {
            guild_id,
            member_id,
        }) => {
            assert_eq!(guild_id, "guild-1");
            assert_eq!(member_id, "member-1");
        }
        other => panic!("Expected StateInconsistency, got {:?}", other),
    }
    assert!(
        store.completed_sessions("guild-1").await.is_empty(),
        "No row may be fabricated without a start time"
    );

    // Engine stays usable: the member joins fresh afterwards
    tracker
        .handle_presence_event(&PresenceEvent::now(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
        ))
        .await?;
    assert_eq!(store.open_session_count("guild-1").await, 1);

    Ok(())
}

#[tokio::test]
async fn test_empty_member_id_is_rejected() {
    let (tracker, _store) = tracker_with_store();

    let result = tracker
        .handle_presence_event(&PresenceEvent::now("guild-1", "", None))
        .await;

    assert!(
        matches!(result, Err(TrackerError::InvalidTransition { .. })),
        "Unclassifiable event should be rejected, got {:?}",
        result
    );
}

#[tokio::test]
async fn test_init_guild_clears_leftover_open_sessions() -> Result<()> {
    let (tracker, store) = tracker_with_store();

    // Simulate a stale row surviving from a crashed prior run
    tracker
        .handle_presence_event(&PresenceEvent::now(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
        ))
        .await?;
    assert_eq!(store.open_session_count("guild-1").await, 1);

    tracker.init_guild("guild-1").await?;

    assert_eq!(
        store.open_session_count("guild-1").await,
        0,
        "Residual open sessions must not be carried forward"
    );
    assert!(
        store.completed_sessions("guild-1").await.is_empty(),
        "Clearing stale rows must not fabricate completed sessions"
    );

    Ok(())
}

#[tokio::test]
async fn test_at_most_one_open_session_over_event_sequence() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();

    // Arbitrary mix of joins, duplicates, switches and leaves for one member
    let channels = [
        Some("a"),
        Some("a"),
        Some("b"),
        None,
        Some("c"),
        Some("d"),
        Some("d"),
        None,
    ];

    for (i, channel) in channels.iter().enumerate() {
        let event = PresenceEvent::observed(
            "guild-1",
            "member-1",
            channel.map(str::to_string),
            t0 + Duration::seconds(30 * i as i64),
        );
        // Leaves while idle surface an error but must not break the invariant
        let _ = tracker.handle_presence_event(&event).await;

        assert!(
            store.open_session_count("guild-1").await <= 1,
            "At most one open session may exist after event {}",
            i
        );
    }

    Ok(())
}

#[tokio::test]
async fn test_concurrent_duplicate_joins_yield_single_session() -> Result<()> {
    let (tracker, store) = tracker_with_store();

    let mut handles = Vec::new();
    for _ in 0..16 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(async move {
            tracker
                .handle_presence_event(&PresenceEvent::now(
                    "guild-1",
                    "member-1",
                    Some("channel-1".to_string()),
                ))
                .await
        }));
    }
    for handle in handles {
        handle.await??;
    }

    assert_eq!(
        store.open_session_count("guild-1").await,
        1,
        "Concurrent deliveries must not mint a second open session"
    );
    assert!(
        store.completed_sessions("guild-1").await.is_empty(),
        "Duplicate joins must not emit completed sessions"
    );

    Ok(())
}

#[tokio::test]
async fn test_guilds_are_tracked_independently() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();

    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            Some("channel-1".to_string()),
            t0,
        ))
        .await?;
    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-2",
            "member-1",
            Some("channel-9".to_string()),
            t0,
        ))
        .await?;

    // Ending the session in one guild leaves the other untouched
    tracker
        .handle_presence_event(&PresenceEvent::observed(
            "guild-1",
            "member-1",
            None,
            t0 + Duration::seconds(70),
        ))
        .await?;

    assert_eq!(store.open_session_count("guild-1").await, 0);
    assert_eq!(store.open_session_count("guild-2").await, 1);
    assert_eq!(store.completed_sessions("guild-1").await.len(), 1);
    assert!(store.completed_sessions("guild-2").await.is_empty());

    Ok(())
}

#[tokio::test]
async fn test_voice_totals_aggregate_per_member() -> Result<()> {
    let (tracker, store) = tracker_with_store();
    let t0 = Utc::now();

    // member-1: 2 + 1 minutes across two sessions, member-2: 5 minutes
    let script: [(&str, Option<&str>, i64); 6] = [
        ("member-1", Some("channel-1"), 0),
        ("member-1", None, 125),
        ("member-1", Some("channel-2"), 200),
        ("member-1", None, 230),
        ("member-2", Some("channel-1"), 0),
        ("member-2", None, 300),
    ];
    for (member, channel, offset) in script {
        tracker
            .handle_presence_event(&PresenceEvent::observed(
                "guild-1",
                member,
                channel.map(str::to_string),
                t0 + Duration::seconds(offset),
            ))
            .await?;
    }

    let totals = store.voice_totals("guild-1").await?;
    assert_eq!(totals.len(), 2);
    assert_eq!(totals[0].member_id, "member-2", "Totals sort descending");
    assert_eq!(totals[0].total_minutes, 5);
    assert_eq!(totals[1].member_id, "member-1");
    assert_eq!(totals[1].total_minutes, 3);

    Ok(())
}

#[tokio::test]
async fn test_presence_feed_survives_bad_events() -> Result<()> {
    use tokio::sync::mpsc;
    use voicetrack::PresenceFeed;

    let (tracker, store) = tracker_with_store();
    let feed = PresenceFeed::new(Arc::clone(&tracker));

    let (tx, rx) = mpsc::channel(16);
    feed.start(rx).await;

    let t0 = Utc::now();
    // A leave for an idle member is logged and skipped, not fatal
    tx.send(PresenceEvent::observed("guild-1", "member-1", None, t0))
        .await?;
    tx.send(PresenceEvent::observed(
        "guild-1",
        "member-1",
        Some("channel-1".to_string()),
        t0,
    ))
    .await?;
    tx.send(PresenceEvent::observed(
        "guild-1",
        "member-1",
        None,
        t0 + Duration::seconds(90),
    ))
    .await?;

    drop(tx);
    feed.stop().await;

    let completed = store.completed_sessions("guild-1").await;
    assert_eq!(
        completed.len(),
        1,
        "Feed should process events after an inconsistent one"
    );
    assert_eq!(completed[0].duration_minutes, 1);

    Ok(())
}

#[tokio::test]
async fn test_completed_append_is_replay_safe() -> Result<()> {
    let store = MemorySessionStore::new();
    let row = CompletedSession {
        guild_id: "guild-1".to_string(),
        member_id: "member-1".to_string(),
        channel_id: "channel-1".to_string(),
        started_at: Utc::now(),
        duration_minutes: 3,
    };

    store.append_completed_session(&row).await?;
    store.append_completed_session(&row).await?;

    assert_eq!(
        store.completed_sessions("guild-1").await.len(),
        1,
        "Redelivered append must not duplicate the row"
    );

    Ok(())
}
