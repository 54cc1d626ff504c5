//! Durable snapshot storage.
//!
//! One snapshot per session id, overwritten on every accepted mutation.
//! An actor writes here before it replies or broadcasts, so a successful
//! response always describes state that survives eviction.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rookery_protocol::SessionId;
use tokio::sync::Mutex;

use crate::{Session, StoreError};

/// Storage for session snapshots.
///
/// `load` after `save` with no intervening `save` returns an equal value.
pub trait SnapshotStore: Send + Sync + 'static {
    /// Overwrites the snapshot for `session.session_id`.
    fn save(&self, session: &Session) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Returns the snapshot for `id`, or `None` if none was ever saved.
    fn load(
        &self,
        id: &SessionId,
    ) -> impl Future<Output = Result<Option<Session>, StoreError>> + Send;
}

/// In-process store. Snapshots outlive the actors that wrote them, which
/// is what rehydration needs, but not the process.
///
/// Cloning shares the underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    snapshots: Arc<Mutex<HashMap<SessionId, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots.
    pub async fn len(&self) -> usize {
        self.snapshots.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.snapshots.lock().await.is_empty()
    }
}

impl SnapshotStore for MemoryStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let json = serde_json::to_string(session)?;
        self.snapshots
            .lock()
            .await
            .insert(session.session_id.clone(), json);
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let guard = self.snapshots.lock().await;
        match guard.get(id) {
            Some(json) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }
}

/// One `<id>.json` file per session under a directory.
///
/// Writes go to a temporary file that is then renamed over the snapshot,
/// so a crash mid-write leaves the previous snapshot intact.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    /// Opens (creating if needed) a store rooted at `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &SessionId) -> PathBuf {
        // Session ids are restricted to [A-Za-z0-9_-], so they are safe
        // file names.
        self.dir.join(format!("{id}.json"))
    }
}

impl SnapshotStore for FileStore {
    async fn save(&self, session: &Session) -> Result<(), StoreError> {
        let path = self.path_for(&session.session_id);
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(session)?;
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        match tokio::fs::read(self.path_for(id)).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use rookery_protocol::{GameMode, Side};
    use rookery_rules::START_POSITION;

    use super::*;

    fn session(id: &str) -> Session {
        Session::new(
            SessionId::new(id).unwrap(),
            GameMode::TwoPlayer,
            Side::White,
            "tok".into(),
            START_POSITION.into(),
            None,
        )
    }

    #[tokio::test]
    async fn test_memory_store_load_missing_is_none() {
        let store = MemoryStore::new();
        let id = SessionId::new("nope").unwrap();
        assert!(store.load(&id).await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_save_overwrites() {
        let store = MemoryStore::new();
        let mut s = session("g1");
        store.save(&s).await.unwrap();

        s.seats.bind(Side::Black, "second".into());
        store.save(&s).await.unwrap();

        assert_eq!(store.len().await, 1);
        assert_eq!(store.load(&s.session_id).await.unwrap(), Some(s));
    }

    #[tokio::test]
    async fn test_memory_store_clones_share_snapshots() {
        let store = MemoryStore::new();
        let other = store.clone();
        let s = session("g1");
        store.save(&s).await.unwrap();
        assert_eq!(other.load(&s.session_id).await.unwrap(), Some(s));
    }
}
