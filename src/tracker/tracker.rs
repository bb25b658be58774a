use super::error::TrackerError;
use super::event::PresenceEvent;
use crate::store::{CompletedSession, OpenSession, SessionStore};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// The voice-session tracking engine
///
/// Consumes raw presence events and converts them into open-session state
/// transitions plus completed-session rows. The store is the single
/// authority on which sessions are open; classification works by looking
/// the member up there and comparing channels, so the engine carries no
/// session cache that could drift from it.
///
/// Event processing is serialized per (guild_id, member_id): the keyed lock
/// is held across the whole lookup-classify-persist sequence, so concurrent
/// deliveries for one member cannot interleave and mint two open sessions.
/// Distinct members and distinct guilds proceed in parallel.
pub struct SessionTracker {
    store: Arc<dyn SessionStore>,
    member_locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl SessionTracker {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self {
            store,
            member_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Prepare a guild for event processing
    ///
    /// Clears residual open sessions left by a previous run: their start
    /// times are stale, so carrying them forward would eventually record a
    /// meaningless duration. Idempotent; called once per guild (per active
    /// storage partition) at startup, never per event.
    pub async fn init_guild(&self, guild_id: &str) -> Result<(), TrackerError> {
        info!("Initializing session tracking for guild {}", guild_id);
        self.store
            .clear_open_sessions(guild_id)
            .await
            .map_err(TrackerError::PersistenceFailure)
    }

    /// Apply one presence event
    ///
    /// Emits at most one completed session (the ending leg of an end or
    /// switch). On error nothing is committed: the caller may redeliver the
    /// event, and completed-session writes are replay-keyed so redelivery
    /// cannot duplicate rows.
    pub async fn handle_presence_event(&self, event: &PresenceEvent) -> Result<(), TrackerError> {
        if event.guild_id.is_empty() || event.member_id.is_empty() {
            return Err(TrackerError::InvalidTransition {
                guild_id: event.guild_id.clone(),
                member_id: event.member_id.clone(),
            });
        }

        let lock = self.member_lock(&event.guild_id, &event.member_id).await;
        let _guard = lock.lock().await;

        let open = self
            .store
            .get_open_session(&event.guild_id, &event.member_id)
            .await
            .map_err(TrackerError::PersistenceFailure)?;

        match (open, &event.channel_id) {
            // Join: no open session, member entered a channel
            (None, Some(channel_id)) => self.start_session(event, channel_id).await,

            // Same channel as the open session: duplicate notification
            (Some(open), Some(channel_id)) if open.channel_id == *channel_id => {
                debug!(
                    "Member {} already present in channel {}, ignoring",
                    event.member_id, channel_id
                );
                Ok(())
            }

            // Move: close the old leg, start the new one back-to-back
            (Some(open), Some(channel_id)) => self.switch_session(event, open, channel_id).await,

            // Leave: close the session
            (Some(open), None) => self.end_session(event, open).await,

            // Leave without an open session: the open row was lost (unclean
            // restart) or the gateway is ahead of us. Nothing to measure, so
            // nothing is written; the member starts fresh on their next join.
            (None, None) => Err(TrackerError::StateInconsistency {
                guild_id: event.guild_id.clone(),
                member_id: event.member_id.clone(),
            }),
        }
    }

    async fn start_session(
        &self,
        event: &PresenceEvent,
        channel_id: &str,
    ) -> Result<(), TrackerError> {
        let session = OpenSession {
            guild_id: event.guild_id.clone(),
            member_id: event.member_id.clone(),
            channel_id: channel_id.to_string(),
            started_at: event.observed_at,
        };

        self.store
            .put_open_session(&session)
            .await
            .map_err(TrackerError::PersistenceFailure)?;

        info!(
            "Member {} joined channel {} in guild {}",
            event.member_id, channel_id, event.guild_id
        );
        Ok(())
    }

    async fn switch_session(
        &self,
        event: &PresenceEvent,
        open: OpenSession,
        channel_id: &str,
    ) -> Result<(), TrackerError> {
        let old_channel = open.channel_id.clone();
        self.close_leg(open, event.observed_at).await?;

        // The overwrite replaces the open row in one step: no reader ever
        // sees the member without an open session mid-switch.
        let session = OpenSession {
            guild_id: event.guild_id.clone(),
            member_id: event.member_id.clone(),
            channel_id: channel_id.to_string(),
            started_at: event.observed_at,
        };
        self.store
            .put_open_session(&session)
            .await
            .map_err(TrackerError::PersistenceFailure)?;

        info!(
            "Member {} moved from channel {} to {} in guild {}",
            event.member_id, old_channel, channel_id, event.guild_id
        );
        Ok(())
    }

    async fn end_session(
        &self,
        event: &PresenceEvent,
        open: OpenSession,
    ) -> Result<(), TrackerError> {
        let channel_id = open.channel_id.clone();
        let minutes = self.close_leg(open, event.observed_at).await?;

        self.store
            .delete_open_session(&event.guild_id, &event.member_id)
            .await
            .map_err(TrackerError::PersistenceFailure)?;

        info!(
            "Member {} left channel {} in guild {} after {} minutes",
            event.member_id, channel_id, event.guild_id, minutes
        );
        Ok(())
    }

    /// Record the completed row for an ending session leg
    ///
    /// Runs before the open-row mutation: if the process dies in between,
    /// redelivering the event re-appends (deduplicated by the replay key)
    /// and then finishes the mutation.
    async fn close_leg(
        &self,
        open: OpenSession,
        ended_at: DateTime<Utc>,
    ) -> Result<i64, TrackerError> {
        let minutes = session_minutes(open.started_at, ended_at);
        let completed = CompletedSession {
            guild_id: open.guild_id,
            member_id: open.member_id,
            channel_id: open.channel_id,
            started_at: open.started_at,
            duration_minutes: minutes,
        };

        self.store
            .append_completed_session(&completed)
            .await
            .map_err(TrackerError::PersistenceFailure)?;
        Ok(minutes)
    }

    async fn member_lock(&self, guild_id: &str, member_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.member_locks.lock().await;
        locks
            .entry((guild_id.to_string(), member_id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Whole minutes between start and end, floored, never below 1
///
/// A session shorter than the minute clock can measure (or one whose clock
/// skewed negative) is an artifact of the granularity, not a zero-length
/// event: it is recorded as 1 minute rather than discarded or written as 0.
fn session_minutes(started_at: DateTime<Utc>, ended_at: DateTime<Utc>) -> i64 {
    let minutes = ended_at.signed_duration_since(started_at).num_minutes();
    minutes.max(1)
}
