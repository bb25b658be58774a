use thiserror::Error;

/// Errors surfaced by the session tracker
///
/// None of these tear down the engine: a failed event leaves the tracker
/// usable for every other member and for the same member's later events.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// The store held no open session where one was expected (e.g. a leave
    /// event after an unclean restart dropped the open row). Recoverable:
    /// the member is treated as freshly joining on their next present event.
    #[error("no open session for member {member_id} in guild {guild_id}")]
    StateInconsistency { guild_id: String, member_id: String },

    /// A store read or write failed. The transition is not committed; the
    /// caller decides between redelivery and accepting the loss.
    #[error("session store operation failed")]
    PersistenceFailure(#[source] anyhow::Error),

    /// The event could not be matched to any transition. The classification
    /// table is exhaustive over well-formed events, so this signals a bug
    /// upstream (empty identifiers and the like).
    #[error("unclassifiable presence event for member {member_id:?} in guild {guild_id:?}")]
    InvalidTransition { guild_id: String, member_id: String },
}
