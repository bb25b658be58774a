use super::backend::{CompletedSession, OpenSession, SessionStore, VoiceTotal};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

/// SQLite-backed session store
///
/// Storage is partitioned one database file per guild per calendar month
/// (`<guild>-<YYYY-MM>.db`), so each month's statistics live in their own
/// unit and old partitions can be archived wholesale. Schema is created on
/// first touch of a partition; connections are opened per operation.
pub struct SqliteSessionStore {
    data_dir: PathBuf,
}

impl SqliteSessionStore {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;
        Ok(Self { data_dir })
    }

    /// Database file for a guild in the partition covering `date`
    pub fn partition_path(&self, guild_id: &str, date: DateTime<Utc>) -> PathBuf {
        self.data_dir
            .join(format!("{}-{:04}-{:02}.db", guild_id, date.year(), date.month()))
    }

    fn with_connection<T>(
        &self,
        guild_id: &str,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let path = self.partition_path(guild_id, Utc::now());
        let conn = Connection::open(&path)
            .with_context(|| format!("Failed to open session database {}", path.display()))?;
        init_schema(&conn)?;
        f(&conn)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS voice_open (
             member_id TEXT PRIMARY KEY,
             channel_id TEXT NOT NULL,
             started_at TEXT NOT NULL
         );
         CREATE TABLE IF NOT EXISTS voice_completed (
             id INTEGER PRIMARY KEY,
             member_id TEXT NOT NULL,
             channel_id TEXT NOT NULL,
             started_at TEXT NOT NULL,
             duration_minutes INTEGER NOT NULL,
             UNIQUE (member_id, started_at)
         );",
    )
    .context("Failed to create session tables")?;
    Ok(())
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let parsed = DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid stored timestamp: {}", raw))?;
    Ok(parsed.with_timezone(&Utc))
}

#[async_trait::async_trait]
impl SessionStore for SqliteSessionStore {
    async fn get_open_session(
        &self,
        guild_id: &str,
        member_id: &str,
    ) -> Result<Option<OpenSession>> {
        self.with_connection(guild_id, |conn| {
            let row = conn
                .query_row(
                    "SELECT channel_id, started_at FROM voice_open WHERE member_id = ?1",
                    params![member_id],
                    |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()
                .context("Failed to query open session")?;

            match row {
                Some((channel_id, started_at)) => Ok(Some(OpenSession {
                    guild_id: guild_id.to_string(),
                    member_id: member_id.to_string(),
                    channel_id,
                    started_at: parse_timestamp(&started_at)?,
                })),
                None => Ok(None),
            }
        })
    }

    async fn put_open_session(&self, session: &OpenSession) -> Result<()> {
        self.with_connection(&session.guild_id, |conn| {
            conn.execute(
                "INSERT INTO voice_open (member_id, channel_id, started_at) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT (member_id) DO UPDATE \
                 SET channel_id = excluded.channel_id, started_at = excluded.started_at",
                params![
                    session.member_id,
                    session.channel_id,
                    session.started_at.to_rfc3339()
                ],
            )
            .context("Failed to write open session")?;
            Ok(())
        })
    }

    async fn delete_open_session(&self, guild_id: &str, member_id: &str) -> Result<()> {
        self.with_connection(guild_id, |conn| {
            conn.execute(
                "DELETE FROM voice_open WHERE member_id = ?1",
                params![member_id],
            )
            .context("Failed to delete open session")?;
            Ok(())
        })
    }

    async fn append_completed_session(&self, session: &CompletedSession) -> Result<()> {
        self.with_connection(&session.guild_id, |conn| {
            conn.execute(
                "INSERT INTO voice_completed \
                     (member_id, channel_id, started_at, duration_minutes) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT (member_id, started_at) DO NOTHING",
                params![
                    session.member_id,
                    session.channel_id,
                    session.started_at.to_rfc3339(),
                    session.duration_minutes
                ],
            )
            .context("Failed to append completed session")?;
            Ok(())
        })
    }

    async fn clear_open_sessions(&self, guild_id: &str) -> Result<()> {
        self.with_connection(guild_id, |conn| {
            conn.execute("DELETE FROM voice_open", [])
                .context("Failed to clear open sessions")?;
            Ok(())
        })
    }

    async fn voice_totals(&self, guild_id: &str) -> Result<Vec<VoiceTotal>> {
        self.with_connection(guild_id, |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT member_id, SUM(duration_minutes) AS total \
                     FROM voice_completed \
                     GROUP BY member_id \
                     ORDER BY total DESC",
                )
                .context("Failed to prepare totals query")?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(VoiceTotal {
                        member_id: row.get(0)?,
                        total_minutes: row.get(1)?,
                    })
                })
                .context("Failed to query voice totals")?;

            let mut totals = Vec::new();
            for row in rows {
                totals.push(row.context("Failed to decode voice total row")?);
            }
            Ok(totals)
        })
    }
}
