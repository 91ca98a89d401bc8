use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use dopple_memory_data::ConversationSnapshot;
use parking_lot::RwLock;
use tokio::fs;

/// Durable storage of conversation snapshots.
#[async_trait]
pub trait PersistenceLayer: Send + Sync {
    /// Snapshot of a conversation, if one was saved.
    async fn load(
        &self,
        dopple_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>>;

    /// Stores or replaces a snapshot.
    async fn save(&self, snapshot: &ConversationSnapshot) -> Result<()>;
}

/// Process-local persistence.
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    snapshots: RwLock<HashMap<(String, String), ConversationSnapshot>>,
}

impl InMemoryPersistence {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.snapshots.read().len()
    }

    /// True when nothing was saved.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshots.read().is_empty()
    }
}

#[async_trait]
impl PersistenceLayer for InMemoryPersistence {
    async fn load(
        &self,
        dopple_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>> {
        let key = (dopple_id.to_string(), conversation_id.to_string());
        Ok(self.snapshots.read().get(&key).cloned())
    }

    async fn save(&self, snapshot: &ConversationSnapshot) -> Result<()> {
        let key = (
            snapshot.dopple_id.clone(),
            snapshot.conversation_id.clone(),
        );
        self.snapshots.write().insert(key, snapshot.clone());
        Ok(())
    }
}

/// One pretty-printed JSON file per conversation under
/// `<root>/<dopple_id>/<conversation_id>.json`, both ids percent-encoded so
/// distinct ids never share a file.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    root: PathBuf,
}

impl FilePersistence {
    /// Uses `root` as the storage directory; it is created on first save.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Storage directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File holding a conversation.
    #[must_use]
    pub fn path_for(&self, dopple_id: &str, conversation_id: &str) -> PathBuf {
        self.root
            .join(path_component(dopple_id))
            .join(format!("{}.json", path_component(conversation_id)))
    }
}

/// Injective file-name encoding of an id. Dots are escaped too so `.` and
/// `..` stay plain names; the empty id maps to a lone `%`, which no
/// encoded id can produce.
fn path_component(raw: &str) -> String {
    if raw.is_empty() {
        return "%".to_string();
    }
    urlencoding::encode(raw).replace('.', "%2E")
}

#[async_trait]
impl PersistenceLayer for FilePersistence {
    async fn load(
        &self,
        dopple_id: &str,
        conversation_id: &str,
    ) -> Result<Option<ConversationSnapshot>> {
        let path = self.path_for(dopple_id, conversation_id);
        let raw = match fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(err).with_context(|| format!("reading snapshot {}", path.display()))
            }
        };
        let snapshot: ConversationSnapshot = serde_json::from_str(&raw)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        if snapshot.dopple_id != dopple_id || snapshot.conversation_id != conversation_id {
            bail!(
                "snapshot {} belongs to {}/{}, not {dopple_id}/{conversation_id}",
                path.display(),
                snapshot.dopple_id,
                snapshot.conversation_id
            );
        }
        Ok(Some(snapshot))
    }

    async fn save(&self, snapshot: &ConversationSnapshot) -> Result<()> {
        let path = self.path_for(&snapshot.dopple_id, &snapshot.conversation_id);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating {}", parent.display()))?;
        }
        let body = serde_json::to_vec_pretty(snapshot)?;
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, body)
            .await
            .with_context(|| format!("writing {}", staging.display()))?;
        fs::rename(&staging, &path)
            .await
            .with_context(|| format!("replacing {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dopple_connectome::Connectome;
    use dopple_memory_data::{ConversationState, InformationTracker};
    use indexmap::IndexMap;
    use tempfile::tempdir;

    fn snapshot(conversation_id: &str) -> ConversationSnapshot {
        ConversationSnapshot {
            dopple_id: "dopple/1".into(),
            conversation_id: conversation_id.into(),
            state: ConversationState::Active,
            entries: Vec::new(),
            connectome: Connectome::default(),
            messages_since_last_compaction: 3,
            user_message_count: 2,
            introduced_entities: IndexMap::new(),
            information: InformationTracker::default(),
        }
    }

    #[tokio::test]
    async fn in_memory_round_trip() {
        let store = InMemoryPersistence::new();
        assert!(store.load("dopple/1", "a").await.unwrap().is_none());
        store.save(&snapshot("a")).await.unwrap();
        store.save(&snapshot("a")).await.unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.load("dopple/1", "a").await.unwrap(), Some(snapshot("a")));
    }

    #[tokio::test]
    async fn file_round_trip_with_encoded_names() {
        let dir = tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        assert!(store.load("dopple/1", "a").await.unwrap().is_none());
        store.save(&snapshot("a")).await.unwrap();
        let path = store.path_for("dopple/1", "a");
        assert_eq!(path, dir.path().join("dopple%2F1").join("a.json"));
        assert!(path.exists());
        assert_eq!(store.load("dopple/1", "a").await.unwrap(), Some(snapshot("a")));
    }

    #[tokio::test]
    async fn similar_ids_get_separate_files() {
        let dir = tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        let ids = ["conv_1", "conv/1", "conv 1", "conv.1", "..", ".", ""];
        let paths: std::collections::HashSet<_> =
            ids.iter().map(|id| store.path_for("dopple/1", id)).collect();
        assert_eq!(paths.len(), ids.len());
        for path in &paths {
            assert!(path.starts_with(dir.path().join("dopple%2F1")));
            assert_eq!(path.parent().unwrap(), dir.path().join("dopple%2F1"));
        }

        store.save(&snapshot("conv_1")).await.unwrap();
        assert!(store.load("dopple/1", "conv/1").await.unwrap().is_none());
        store.save(&snapshot("conv/1")).await.unwrap();
        let first = store.load("dopple/1", "conv_1").await.unwrap().unwrap();
        assert_eq!(first.conversation_id, "conv_1");
    }

    #[tokio::test]
    async fn snapshot_under_the_wrong_ids_is_rejected() {
        let dir = tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        let path = store.path_for("dopple/1", "b");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, serde_json::to_vec(&snapshot("a")).unwrap()).unwrap();
        let err = store.load("dopple/1", "b").await.unwrap_err();
        assert!(err.to_string().contains("belongs to dopple/1/a"));
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        let path = store.path_for("d", "c");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();
        assert!(store.load("d", "c").await.is_err());
    }
}
