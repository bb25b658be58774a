//! Voice-session tracking engine
//!
//! This module provides the `SessionTracker` abstraction that manages:
//! - Classification of raw presence events into start/switch/end transitions
//! - The open-session set (at most one per member, store-backed)
//! - Duration computation (floored minutes, clamped to a 1-minute minimum)
//! - Per-member serialization of the lookup-classify-persist sequence
//! - Channel-driven ingest via `PresenceFeed`

mod error;
mod event;
mod feed;
mod tracker;

pub use error::TrackerError;
pub use event::PresenceEvent;
pub use feed::PresenceFeed;
pub use tracker::SessionTracker;
