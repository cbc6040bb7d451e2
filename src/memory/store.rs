// src/memory/store.rs — SQLite operations

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::game::evaluation::EvaluationReport;
use crate::game::session::{Phase, SessionState};
use crate::game::stats::UserStats;
use crate::infra::errors::GoodQuestionError;
use crate::provider::{Message, Role};

const STATS_KEY: &str = "singleton";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Active,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "completed" => Self::Completed,
            "abandoned" => Self::Abandoned,
            _ => Self::Active,
        }
    }
}

/// One row of the session archive listing.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub id: String,
    pub industry: String,
    pub theme: String,
    pub difficulty: String,
    pub status: SessionStatus,
    pub total_score: Option<u32>,
    pub help_count: u32,
    pub updated_at: String,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // -- Stats --

    /// Get-or-default. An unreadable document is logged and treated as absent.
    pub fn load_stats(&self) -> Result<UserStats, GoodQuestionError> {
        let data: Option<String> = self
            .conn
            .query_row(
                "SELECT data FROM user_stats WHERE key = ?1",
                params![STATS_KEY],
                |r| r.get(0),
            )
            .optional()?;

        Ok(match data {
            None => UserStats::default(),
            Some(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
                tracing::warn!("Stored stats unreadable, starting fresh: {}", e);
                UserStats::default()
            }),
        })
    }

    pub fn save_stats(&self, stats: &UserStats) -> Result<(), GoodQuestionError> {
        let data = serde_json::to_string(stats)?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO user_stats (key, data, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at",
            params![STATS_KEY, data, now],
        )?;
        Ok(())
    }

    // -- Sessions --

    pub fn save_session_state(&self, state: &SessionState) -> Result<(), GoodQuestionError> {
        let json = serde_json::to_string(state)?;
        let status = match state.phase {
            Phase::Result => SessionStatus::Completed,
            _ => SessionStatus::Active,
        };
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO game_sessions
                 (id, industry, theme, difficulty, status, help_count, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(id) DO UPDATE SET
                 theme = excluded.theme,
                 status = excluded.status,
                 help_count = excluded.help_count,
                 state = excluded.state,
                 updated_at = excluded.updated_at",
            params![
                state.id,
                state.scenario.industry,
                state.scenario.theme,
                state.scenario.difficulty,
                status.as_str(),
                state.help_count,
                json,
                state.created_at.to_rfc3339(),
                now,
            ],
        )?;
        Ok(())
    }

    pub fn load_session_state(&self, id: &str) -> Result<Option<SessionState>, GoodQuestionError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM game_sessions WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(GoodQuestionError::from))
            .transpose()
    }

    /// Most recently touched session still in play.
    pub fn latest_active_session(&self) -> Result<Option<SessionState>, GoodQuestionError> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT state FROM game_sessions WHERE status = 'active'
                 ORDER BY updated_at DESC, rowid DESC LIMIT 1",
                [],
                |r| r.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(GoodQuestionError::from))
            .transpose()
    }

    /// Mark every other active session abandoned, so resume only ever finds the newest.
    pub fn abandon_active_sessions(&self, except: &str) -> Result<usize, GoodQuestionError> {
        let n = self.conn.execute(
            "UPDATE game_sessions SET status = 'abandoned', updated_at = ?1
             WHERE status = 'active' AND id != ?2",
            params![Utc::now().to_rfc3339(), except],
        )?;
        Ok(n)
    }

    pub fn complete_session(&self, report: &EvaluationReport) -> Result<(), GoodQuestionError> {
        let json = serde_json::to_string(report)?;
        self.conn.execute(
            "UPDATE game_sessions SET status = 'completed', total_score = ?1,
             help_count = ?2, final_evaluation = ?3, updated_at = ?4
             WHERE id = ?5",
            params![
                report.total_score,
                report.help_count,
                json,
                Utc::now().to_rfc3339(),
                report.session_id,
            ],
        )?;
        Ok(())
    }

    pub fn final_evaluation(
        &self,
        id: &str,
    ) -> Result<Option<EvaluationReport>, GoodQuestionError> {
        let json: Option<Option<String>> = self
            .conn
            .query_row(
                "SELECT final_evaluation FROM game_sessions WHERE id = ?1",
                params![id],
                |r| r.get(0),
            )
            .optional()?;
        json.flatten()
            .map(|j| serde_json::from_str(&j).map_err(GoodQuestionError::from))
            .transpose()
    }

    pub fn list_sessions(&self, limit: usize) -> Result<Vec<SessionSummary>, GoodQuestionError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, industry, theme, difficulty, status, total_score, help_count, updated_at
             FROM game_sessions ORDER BY updated_at DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(SessionSummary {
                    id: row.get(0)?,
                    industry: row.get(1)?,
                    theme: row.get(2)?,
                    difficulty: row.get(3)?,
                    status: SessionStatus::parse(&row.get::<_, String>(4)?),
                    total_score: row.get(5)?,
                    help_count: row.get(6)?,
                    updated_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- Chat messages --

    pub fn append_chat_message(
        &self,
        session_id: &str,
        message: &Message,
        reachability: Option<u32>,
    ) -> Result<i64, GoodQuestionError> {
        self.conn.execute(
            "INSERT INTO chat_messages (session_id, role, content, reachability, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                session_id,
                message.role.as_str(),
                message.content,
                reachability,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn chat_history(&self, session_id: &str) -> Result<Vec<Message>, GoodQuestionError> {
        let mut stmt = self.conn.prepare(
            "SELECT role, content FROM chat_messages WHERE session_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![session_id], |row| {
                let role: String = row.get(0)?;
                let content: String = row.get(1)?;
                Ok((role, content))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|(role, content)| {
                Role::parse(&role).map(|role| Message { role, content })
            })
            .collect())
    }

    // -- Maintenance --

    /// Wipe stats and every archived session.
    pub fn reset(&self) -> Result<(), GoodQuestionError> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute_batch(
            "DELETE FROM chat_messages;
             DELETE FROM game_sessions;
             DELETE FROM user_stats;",
        )?;
        tx.commit()?;
        Ok(())
    }
}
