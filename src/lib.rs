pub mod config;
pub mod store;
pub mod tracker;

pub use config::Config;
pub use store::{
    CompletedSession, MemorySessionStore, OpenSession, SessionStore, SqliteSessionStore,
    VoiceTotal,
};
pub use tracker::{PresenceEvent, PresenceFeed, SessionTracker, TrackerError};
