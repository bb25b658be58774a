//! Session persistence
//!
//! The tracker talks to storage through the `SessionStore` trait: a keyed
//! table of open sessions (crash recovery and classification lookups) and
//! an append-only table of completed sessions. Two backends:
//! - `SqliteSessionStore`: one database file per guild per calendar month
//! - `MemorySessionStore`: HashMap-backed, for tests and embedding

mod backend;
mod memory;
mod sqlite;

pub use backend::{CompletedSession, OpenSession, SessionStore, VoiceTotal};
pub use memory::MemorySessionStore;
pub use sqlite::SqliteSessionStore;
