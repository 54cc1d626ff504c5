//! Best-effort audit mirror of accepted moves and final outcomes.
//!
//! Actors hand entries to the log on a spawned task and never wait for
//! it. A failed write is logged and otherwise ignored; it never rolls back
//! a committed move.

use std::collections::HashSet;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rookery_protocol::{Evaluation, GameStatus, Outcome, SessionId};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::StoreError;

/// Who produced a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayedBy {
    Human,
    Engine,
}

/// One accepted move, keyed by `(session_id, move_number)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveEntry {
    pub session_id: SessionId,
    pub move_number: u32,
    pub compact: String,
    pub human: String,
    pub position_after: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_time_ms: Option<u64>,
    pub played_by: PlayedBy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_difficulty: Option<u32>,
    pub recorded_at: DateTime<Utc>,
}

/// How a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutcomeEntry {
    pub session_id: SessionId,
    pub status: GameStatus,
    pub outcome: Outcome,
    pub ended_at: DateTime<Utc>,
}

/// Append-only secondary record of play.
///
/// `record_outcome` is idempotent per session: recording a second outcome
/// for the same session is a no-op.
pub trait AuditLog: Send + Sync + 'static {
    fn record_move(&self, entry: MoveEntry) -> impl Future<Output = Result<(), StoreError>> + Send;

    fn record_outcome(
        &self,
        entry: OutcomeEntry,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[derive(Debug, Default)]
struct Entries {
    moves: Vec<MoveEntry>,
    outcomes: Vec<OutcomeEntry>,
}

/// Keeps entries in memory. Cloning shares them.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditLog {
    entries: Arc<Mutex<Entries>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded moves, in recording order.
    pub async fn moves(&self) -> Vec<MoveEntry> {
        self.entries.lock().await.moves.clone()
    }

    pub async fn outcomes(&self) -> Vec<OutcomeEntry> {
        self.entries.lock().await.outcomes.clone()
    }
}

impl AuditLog for MemoryAuditLog {
    async fn record_move(&self, entry: MoveEntry) -> Result<(), StoreError> {
        self.entries.lock().await.moves.push(entry);
        Ok(())
    }

    async fn record_outcome(&self, entry: OutcomeEntry) -> Result<(), StoreError> {
        let mut entries = self.entries.lock().await;
        if !entries
            .outcomes
            .iter()
            .any(|o| o.session_id == entry.session_id)
        {
            entries.outcomes.push(entry);
        }
        Ok(())
    }
}

/// Appends JSON lines to `moves.jsonl` and `outcomes.jsonl` in a
/// directory.
#[derive(Debug, Clone)]
pub struct JsonlAuditLog {
    dir: PathBuf,
    /// Serializes appends and remembers which sessions already have an
    /// outcome line (this process only).
    ended: Arc<Mutex<HashSet<SessionId>>>,
}

impl JsonlAuditLog {
    pub const MOVES_FILE: &'static str = "moves.jsonl";
    pub const OUTCOMES_FILE: &'static str = "outcomes.jsonl";

    /// Opens (creating if needed) an audit directory.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            dir,
            ended: Arc::new(Mutex::new(HashSet::new())),
        })
    }

    async fn append<T: Serialize>(&self, file: &str, entry: &T) -> Result<(), StoreError> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');
        let mut f = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(file))
            .await?;
        f.write_all(&line).await?;
        f.flush().await?;
        Ok(())
    }
}

impl AuditLog for JsonlAuditLog {
    async fn record_move(&self, entry: MoveEntry) -> Result<(), StoreError> {
        let _guard = self.ended.lock().await;
        self.append(Self::MOVES_FILE, &entry).await
    }

    async fn record_outcome(&self, entry: OutcomeEntry) -> Result<(), StoreError> {
        let mut ended = self.ended.lock().await;
        if ended.contains(&entry.session_id) {
            return Ok(());
        }
        self.append(Self::OUTCOMES_FILE, &entry).await?;
        ended.insert(entry.session_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rookery_protocol::Side;

    use super::*;

    fn outcome(id: &str, winner: Side) -> OutcomeEntry {
        OutcomeEntry {
            session_id: SessionId::new(id).unwrap(),
            status: GameStatus::Resigned,
            outcome: Outcome::Decisive { winner },
            ended_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_memory_audit_record_outcome_is_idempotent() {
        let log = MemoryAuditLog::new();
        log.record_outcome(outcome("g1", Side::White)).await.unwrap();
        log.record_outcome(outcome("g1", Side::Black)).await.unwrap();
        log.record_outcome(outcome("g2", Side::Black)).await.unwrap();

        let outcomes = log.outcomes().await;
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].outcome.winner(), Some(Side::White));
    }

    #[test]
    fn test_move_entry_json_shape() {
        let entry = MoveEntry {
            session_id: SessionId::new("g1").unwrap(),
            move_number: 2,
            compact: "e7e5".into(),
            human: "e5".into(),
            position_after: "fen".into(),
            evaluation: Some(Evaluation::Centipawns(15)),
            thinking_time_ms: Some(120),
            played_by: PlayedBy::Engine,
            engine_difficulty: Some(1500),
            recorded_at: Utc::now(),
        };
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["moveNumber"], 2);
        assert_eq!(json["playedBy"], "engine");
        assert_eq!(json["positionAfter"], "fen");
        assert_eq!(json["thinkingTimeMs"], 120);
        assert_eq!(json["engineDifficulty"], 1500);
    }
}
