use super::backend::{CompletedSession, OpenSession, SessionStore, VoiceTotal};
use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory session store
///
/// Backs tests and single-process embedding. Keyed the same way as the
/// SQLite store: open sessions by (guild_id, member_id), completed sessions
/// append-only with the (member_id, started_at) replay key honored.
#[derive(Default)]
pub struct MemorySessionStore {
    open: RwLock<HashMap<(String, String), OpenSession>>,
    completed: RwLock<Vec<CompletedSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all completed rows for a guild, in append order
    pub async fn completed_sessions(&self, guild_id: &str) -> Vec<CompletedSession> {
        let completed = self.completed.read().await;
        completed
            .iter()
            .filter(|s| s.guild_id == guild_id)
            .cloned()
            .collect()
    }

    /// Number of open sessions currently held for a guild
    pub async fn open_session_count(&self, guild_id: &str) -> usize {
        let open = self.open.read().await;
        open.keys().filter(|(g, _)| g == guild_id).count()
    }
}

#[async_trait::async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_open_session(
        &self,
        guild_id: &str,
        member_id: &str,
    ) -> Result<Option<OpenSession>> {
        let open = self.open.read().await;
        Ok(open
            .get(&(guild_id.to_string(), member_id.to_string()))
            .cloned())
    }

    async fn put_open_session(&self, session: &OpenSession) -> Result<()> {
        let mut open = self.open.write().await;
        open.insert(
            (session.guild_id.clone(), session.member_id.clone()),
            session.clone(),
        );
        Ok(())
    }

    async fn delete_open_session(&self, guild_id: &str, member_id: &str) -> Result<()> {
        let mut open = self.open.write().await;
        open.remove(&(guild_id.to_string(), member_id.to_string()));
        Ok(())
    }

    async fn append_completed_session(&self, session: &CompletedSession) -> Result<()> {
        let mut completed = self.completed.write().await;

        // Replay key: ignore a redelivered append for the same session
        let duplicate = completed.iter().any(|s| {
            s.guild_id == session.guild_id
                && s.member_id == session.member_id
                && s.started_at == session.started_at
        });
        if !duplicate {
            completed.push(session.clone());
        }
        Ok(())
    }

    async fn clear_open_sessions(&self, guild_id: &str) -> Result<()> {
        let mut open = self.open.write().await;
        open.retain(|(g, _), _| g != guild_id);
        Ok(())
    }

    async fn voice_totals(&self, guild_id: &str) -> Result<Vec<VoiceTotal>> {
        let completed = self.completed.read().await;

        let mut totals: HashMap<String, i64> = HashMap::new();
        for session in completed.iter().filter(|s| s.guild_id == guild_id) {
            *totals.entry(session.member_id.clone()).or_default() += session.duration_minutes;
        }

        let mut totals: Vec<VoiceTotal> = totals
            .into_iter()
            .map(|(member_id, total_minutes)| VoiceTotal {
                member_id,
                total_minutes,
            })
            .collect();
        totals.sort_by(|a, b| b.total_minutes.cmp(&a.total_minutes));
        Ok(totals)
    }
}
