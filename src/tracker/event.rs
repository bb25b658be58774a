use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw presence-change notification from the gateway
///
/// Carries no semantic label: the gateway only reports "member X is now in
/// channel Y" or "member X is now in no channel". Whether that means a
/// session start, a channel switch, or a session end is inferred by the
/// tracker against the current open-session state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceEvent {
    /// Guild the event belongs to
    pub guild_id: String,

    /// Member whose presence changed
    pub member_id: String,

    /// Channel now occupied, or `None` for "not in any voice channel"
    pub channel_id: Option<String>,

    /// When the change was observed (delivery time)
    pub observed_at: DateTime<Utc>,
}

impl PresenceEvent {
    /// Event observed right now, the normal gateway-delivery case
    pub fn now(
        guild_id: impl Into<String>,
        member_id: impl Into<String>,
        channel_id: Option<String>,
    ) -> Self {
        Self::observed(guild_id, member_id, channel_id, Utc::now())
    }

    /// Event with an explicit observation time
    pub fn observed(
        guild_id: impl Into<String>,
        member_id: impl Into<String>,
        channel_id: Option<String>,
        observed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            member_id: member_id.into(),
            channel_id,
            observed_at,
        }
    }
}
