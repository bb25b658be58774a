use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A member currently present in a voice channel
///
/// At most one open session exists per (guild_id, member_id) at any time.
/// The store is the canonical record of this set; the tracker queries it
/// rather than caching, so a restart cannot desync the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenSession {
    /// Guild the session belongs to
    pub guild_id: String,

    /// Member occupying the channel
    pub member_id: String,

    /// Channel currently occupied
    pub channel_id: String,

    /// When the member entered this channel
    pub started_at: DateTime<Utc>,
}

/// A closed session recorded with its total duration
///
/// Append-only: never mutated or deleted once written. `started_at` doubles
/// as an idempotency key — redelivering the event that produced this row
/// must not create a second row for the same (member_id, started_at).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedSession {
    /// Guild the session belonged to
    pub guild_id: String,

    /// Member whose presence was tracked
    pub member_id: String,

    /// Channel the member occupied for this session
    pub channel_id: String,

    /// When the session started (replay key)
    pub started_at: DateTime<Utc>,

    /// Session length in whole minutes, floored, never below 1
    pub duration_minutes: i64,
}

/// Per-member aggregate over completed sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceTotal {
    pub member_id: String,
    pub total_minutes: i64,
}

/// Persistence surface consulted and mutated by the session tracker
///
/// Implementations:
/// - SQLite: one database file per guild per calendar month (production)
/// - Memory: HashMap-backed (tests, embedding)
#[async_trait::async_trait]
pub trait SessionStore: Send + Sync {
    /// Look up the open session for a member, if any
    async fn get_open_session(
        &self,
        guild_id: &str,
        member_id: &str,
    ) -> Result<Option<OpenSession>>;

    /// Create or overwrite the open session for a member
    ///
    /// Overwrite semantics matter for channel switches: the row is replaced
    /// in one step, so no reader ever observes the member without an open
    /// session mid-switch.
    async fn put_open_session(&self, session: &OpenSession) -> Result<()>;

    /// Remove the open session for a member, if present
    async fn delete_open_session(&self, guild_id: &str, member_id: &str) -> Result<()>;

    /// Append a completed session row
    ///
    /// Idempotent on (member_id, started_at): a redelivered append is
    /// silently ignored rather than duplicated.
    async fn append_completed_session(&self, session: &CompletedSession) -> Result<()>;

    /// Drop every open session for a guild
    ///
    /// Used at guild initialization to discard residual rows from a prior
    /// run, whose start times are stale.
    async fn clear_open_sessions(&self, guild_id: &str) -> Result<()>;

    /// Total recorded voice minutes per member for a guild
    async fn voice_totals(&self, guild_id: &str) -> Result<Vec<VoiceTotal>>;
}
