//! File-backed snapshot store and JSONL audit log.

use chrono::Utc;
use rookery_protocol::{GameMode, GameStatus, Outcome, SessionId, Side};
use rookery_rules::{CandidateMove, ChessRules, START_POSITION};
use rookery_session::{
    AuditLog, FileStore, JsonlAuditLog, MemoryAuditLog, MoveEntry, NewSession, OutcomeEntry,
    PlayedBy, Session, SessionConfig, SessionDirectory, SnapshotStore,
};

fn sid(s: &str) -> SessionId {
    SessionId::new(s).unwrap()
}

fn session(id: &str) -> Session {
    Session::new(
        sid(id),
        GameMode::TwoPlayer,
        Side::White,
        "tok".into(),
        START_POSITION.into(),
        Some(1200),
    )
}

#[tokio::test]
async fn test_file_store_save_then_load_returns_equal_snapshot() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    let s = session("g1");

    store.save(&s).await.unwrap();
    assert_eq!(store.load(&s.session_id).await.unwrap(), Some(s.clone()));
    assert!(dir.path().join("g1.json").exists());
    assert!(!dir.path().join("g1.json.tmp").exists());
}

#[tokio::test]
async fn test_file_store_load_missing_is_none() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path().join("nested")).await.unwrap();
    assert!(store.load(&sid("nope")).await.unwrap().is_none());
}

#[tokio::test]
async fn test_file_store_corrupt_snapshot_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::open(dir.path()).await.unwrap();
    std::fs::write(dir.path().join("bad.json"), b"{not json").unwrap();
    assert!(store.load(&sid("bad")).await.is_err());
}

#[tokio::test]
async fn test_session_survives_directory_restart_with_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let id = sid("persist");

    {
        let directory = SessionDirectory::new(
            ChessRules,
            FileStore::open(dir.path()).await.unwrap(),
            MemoryAuditLog::new(),
            SessionConfig::default(),
        );
        directory
            .create(
                NewSession::new(GameMode::SinglePlayerVsEngine, Side::White)
                    .with_session_id(id.clone()),
            )
            .await
            .unwrap();
        directory
            .submit_move(&id, CandidateMove::new("e2", "e4", None), None, None)
            .await
            .unwrap();
    }

    let restarted = SessionDirectory::new(
        ChessRules,
        FileStore::open(dir.path()).await.unwrap(),
        MemoryAuditLog::new(),
        SessionConfig::default(),
    );
    let state = restarted.state(&id).await.unwrap();
    assert_eq!(state.move_log.len(), 1);
    assert_eq!(state.move_log[0].human, "e4");
    assert_eq!(state.side_to_move, Side::Black);
}

fn move_entry(n: u32) -> MoveEntry {
    MoveEntry {
        session_id: sid("g1"),
        move_number: n,
        compact: "e2e4".into(),
        human: "e4".into(),
        position_after: "fen".into(),
        evaluation: None,
        thinking_time_ms: None,
        played_by: PlayedBy::Human,
        engine_difficulty: None,
        recorded_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_jsonl_audit_appends_one_line_per_move() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlAuditLog::open(dir.path()).await.unwrap();
    log.record_move(move_entry(1)).await.unwrap();
    log.record_move(move_entry(2)).await.unwrap();

    let text = std::fs::read_to_string(dir.path().join(JsonlAuditLog::MOVES_FILE)).unwrap();
    let rows: Vec<MoveEntry> = text
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].move_number, 2);
}

#[tokio::test]
async fn test_jsonl_audit_outcome_written_once_per_session() {
    let dir = tempfile::tempdir().unwrap();
    let log = JsonlAuditLog::open(dir.path()).await.unwrap();
    let entry = OutcomeEntry {
        session_id: sid("g1"),
        status: GameStatus::Draw,
        outcome: Outcome::Draw,
        ended_at: Utc::now(),
    };
    log.record_outcome(entry.clone()).await.unwrap();
    log.record_outcome(entry).await.unwrap();

    let text = std::fs::read_to_string(dir.path().join(JsonlAuditLog::OUTCOMES_FILE)).unwrap();
    assert_eq!(text.lines().count(), 1);
}
