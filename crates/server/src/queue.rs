//! Shared performance queue.
//!
//! One ordered queue per venue, written to by every phone and tablet that
//! requests songs and drained by the playback terminal. All mutations run
//! under a single write lock together with the renumbering they trigger, so
//! positions are always `1..=N` and readers never see a half-renumbered queue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Error type for queue operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The singer name is empty after trimming.
    #[error("singer name is required")]
    MissingSinger,

    /// The song reference is absent.
    #[error("song reference is required")]
    MissingSong,

    /// No entry carries the given id.
    #[error("queue entry not found: {0}")]
    NotFound(String),

    /// An index does not address a live entry.
    #[error("index {index} out of range for queue of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// One pending performance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueueEntry {
    /// Process-unique identifier.
    pub id: String,
    /// Song payload as sent by the client; never interpreted here.
    pub song: Value,
    /// Trimmed, non-empty singer name.
    pub singer: String,
    /// 1-based position in the queue.
    pub queue_position: u32,
    /// When the entry was enqueued.
    pub created_at: DateTime<Utc>,
}

/// Generates a fresh entry id.
fn new_entry_id() -> String {
    format!("q_{}", Uuid::new_v4().simple())
}

/// Whether a song payload counts as missing.
///
/// Mirrors what the web clients consider "no song": null, false, zero and the
/// empty string.
pub fn is_missing_song(song: &Value) -> bool {
    match song {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::Array(_) | Value::Object(_) => false,
    }
}

/// Sorts by `(queue_position, created_at)` and rewrites positions densely.
fn normalize(entries: &mut [QueueEntry]) {
    entries.sort_by(|a, b| {
        a.queue_position
            .cmp(&b.queue_position)
            .then_with(|| a.created_at.cmp(&b.created_at))
    });
    renumber(entries);
}

/// Rewrites positions to match slice order.
fn renumber(entries: &mut [QueueEntry]) {
    for (index, entry) in entries.iter_mut().enumerate() {
        entry.queue_position = index as u32 + 1;
    }
}

/// The process-wide queue. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct QueueStore {
    entries: Arc<RwLock<Vec<QueueEntry>>>,
}

impl QueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the queue in order, normalizing positions first.
    pub async fn list(&self) -> Vec<QueueEntry> {
        let mut entries = self.entries.write().await;
        normalize(&mut entries);
        entries.clone()
    }

    /// Number of live entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Appends a performance at the end of the queue.
    ///
    /// # Arguments
    /// * `song` - Opaque song payload; must not be missing
    /// * `singer` - Singer name; trimmed and must be non-empty
    ///
    /// # Returns
    /// The created entry
    pub async fn enqueue(&self, song: Value, singer: &str) -> Result<QueueEntry, QueueError> {
        if is_missing_song(&song) {
            return Err(QueueError::MissingSong);
        }
        let singer = singer.trim();
        if singer.is_empty() {
            return Err(QueueError::MissingSinger);
        }

        let mut entries = self.entries.write().await;
        let next_position = entries
            .iter()
            .map(|e| e.queue_position)
            .max()
            .unwrap_or(0)
            + 1;

        let entry = QueueEntry {
            id: new_entry_id(),
            song,
            singer: singer.to_string(),
            queue_position: next_position,
            created_at: Utc::now(),
        };
        entries.push(entry.clone());

        tracing::info!(
            id = %entry.id,
            singer = %entry.singer,
            position = entry.queue_position,
            "entry enqueued"
        );
        Ok(entry)
    }

    /// Removes the entry with `id` and closes the gap it leaves.
    pub async fn remove_by_id(&self, id: &str) -> Result<QueueEntry, QueueError> {
        let mut entries = self.entries.write().await;
        normalize(&mut entries);

        let index = entries
            .iter()
            .position(|e| e.id == id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        let removed = entries.remove(index);
        renumber(&mut entries);

        tracing::info!(id = %removed.id, remaining = entries.len(), "entry removed");
        Ok(removed)
    }

    /// Removes the entry at a 0-based index of the normalized order.
    ///
    /// The playback terminal calls this with index 0 when a performance starts.
    pub async fn remove_by_index(&self, index: usize) -> Result<QueueEntry, QueueError> {
        let mut entries = self.entries.write().await;
        normalize(&mut entries);

        if index >= entries.len() {
            return Err(QueueError::IndexOutOfRange {
                index,
                len: entries.len(),
            });
        }
        let removed = entries.remove(index);
        renumber(&mut entries);

        tracing::info!(id = %removed.id, index, remaining = entries.len(), "entry dequeued");
        Ok(removed)
    }

    /// Moves the entry at `from` so that it ends up at `to`.
    ///
    /// Returns false and leaves the queue untouched when either index is out
    /// of range.
    pub async fn move_entry(&self, from: usize, to: usize) -> bool {
        let mut entries = self.entries.write().await;
        normalize(&mut entries);

        let len = entries.len();
        if from >= len || to >= len {
            tracing::debug!(from, to, len, "move rejected");
            return false;
        }

        let moved = entries.remove(from);
        entries.insert(to, moved);
        renumber(&mut entries);

        tracing::info!(from, to, "entry moved");
        true
    }

    /// Drops every entry, returning how many were removed.
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.write().await;
        let removed = entries.len();
        entries.clear();
        tracing::info!(removed, "queue cleared");
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashSet;

    fn song(number: &str) -> Value {
        json!({ "number": number, "title": format!("Song {}", number) })
    }

    fn numbers(entries: &[QueueEntry]) -> Vec<(&str, u32)> {
        entries
            .iter()
            .map(|e| (e.song["number"].as_str().unwrap(), e.queue_position))
            .collect()
    }

    fn assert_dense(entries: &[QueueEntry]) {
        let positions: Vec<u32> = entries.iter().map(|e| e.queue_position).collect();
        let expected: Vec<u32> = (1..=entries.len() as u32).collect();
        assert_eq!(positions, expected);
    }

    async fn abc() -> (QueueStore, Vec<QueueEntry>) {
        let store = QueueStore::new();
        let a = store.enqueue(song("A"), "Ana").await.unwrap();
        let b = store.enqueue(song("B"), "Bruno").await.unwrap();
        let c = store.enqueue(song("C"), "Carla").await.unwrap();
        (store, vec![a, b, c])
    }

    #[tokio::test]
    async fn test_enqueue_preserves_order() {
        let (store, _) = abc().await;
        let list = store.list().await;
        assert_eq!(
            numbers(&list),
            vec![("A", 1), ("B", 2), ("C", 3)]
        );
        assert_eq!(list[1].singer, "Bruno");
    }

    #[tokio::test]
    async fn test_remove_by_id_renumbers() {
        let (store, created) = abc().await;
        let removed = store.remove_by_id(&created[1].id).await.unwrap();
        assert_eq!(removed.singer, "Bruno");

        let list = store.list().await;
        assert_eq!(numbers(&list), vec![("A", 1), ("C", 2)]);
    }

    #[tokio::test]
    async fn test_remove_unknown_id() {
        let (store, _) = abc().await;
        let err = store.remove_by_id("q_missing").await.unwrap_err();
        assert_eq!(err, QueueError::NotFound("q_missing".to_string()));
        assert_eq!(store.len().await, 3);
    }

    #[tokio::test]
    async fn test_remove_by_index_dequeues_head() {
        let (store, _) = abc().await;
        let head = store.remove_by_index(0).await.unwrap();
        assert_eq!(head.singer, "Ana");

        let list = store.list().await;
        assert_eq!(numbers(&list), vec![("B", 1), ("C", 2)]);

        let err = store.remove_by_index(2).await.unwrap_err();
        assert_eq!(err, QueueError::IndexOutOfRange { index: 2, len: 2 });
    }

    #[tokio::test]
    async fn test_move_entry() {
        let (store, _) = abc().await;
        assert!(store.move_entry(2, 0).await);
        let list = store.list().await;
        assert_eq!(
            numbers(&list),
            vec![("C", 1), ("A", 2), ("B", 3)]
        );

        assert!(store.move_entry(0, 2).await);
        let list = store.list().await;
        assert_eq!(
            numbers(&list),
            vec![("A", 1), ("B", 2), ("C", 3)]
        );
    }

    #[tokio::test]
    async fn test_move_out_of_range_is_a_no_op() {
        let (store, _) = abc().await;
        let before = store.list().await;
        assert!(!store.move_entry(0, 3).await);
        assert!(!store.move_entry(7, 0).await);
        assert_eq!(store.list().await, before);
    }

    #[tokio::test]
    async fn test_enqueue_validation() {
        let store = QueueStore::new();
        assert_eq!(
            store.enqueue(song("A"), "   ").await.unwrap_err(),
            QueueError::MissingSinger
        );
        assert_eq!(
            store.enqueue(Value::Null, "Ana").await.unwrap_err(),
            QueueError::MissingSong
        );
        assert_eq!(
            store.enqueue(json!(""), "Ana").await.unwrap_err(),
            QueueError::MissingSong
        );
        assert!(store.is_empty().await);

        let entry = store.enqueue(json!("20001"), "  Ana  ").await.unwrap();
        assert_eq!(entry.singer, "Ana");
        assert_eq!(entry.queue_position, 1);
        assert!(entry.id.starts_with("q_"));
    }

    #[tokio::test]
    async fn test_list_is_idempotent() {
        let (store, _) = abc().await;
        let first = store.list().await;
        let second = store.list().await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_list_heals_inconsistent_positions() {
        let (store, _) = abc().await;
        {
            let mut entries = store.entries.write().await;
            entries[0].queue_position = 9;
            entries[1].queue_position = 4;
            entries[2].queue_position = 4;
        }

        let list = store.list().await;
        assert_dense(&list);
        // B and C tie on position 4 and are ordered by creation time
        assert_eq!(
            numbers(&list),
            vec![("B", 1), ("C", 2), ("A", 3)]
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, _) = abc().await;
        assert_eq!(store.clear().await, 3);
        assert!(store.list().await.is_empty());

        let entry = store.enqueue(song("D"), "Dani").await.unwrap();
        assert_eq!(entry.queue_position, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_enqueue_is_safe() {
        let store = QueueStore::new();

        let handles: Vec<_> = (0..64)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .enqueue(song(&i.to_string()), &format!("Singer {}", i))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut created = Vec::new();
        for handle in handles {
            created.push(handle.await.unwrap());
        }

        let ids: HashSet<_> = created.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids.len(), 64);

        let positions: HashSet<_> = created.iter().map(|e| e.queue_position).collect();
        assert_eq!(positions, (1..=64).collect::<HashSet<u32>>());

        let list = store.list().await;
        assert_eq!(list.len(), 64);
        assert_dense(&list);
    }

    #[test]
    fn test_missing_song_values() {
        assert!(is_missing_song(&Value::Null));
        assert!(is_missing_song(&json!(false)));
        assert!(is_missing_song(&json!(0)));
        assert!(is_missing_song(&json!("")));
        assert!(!is_missing_song(&json!("20001")));
        assert!(!is_missing_song(&json!(20001)));
        assert!(!is_missing_song(&json!({})));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Enqueue,
        RemoveAt(usize),
        RemoveId(usize),
        Move(usize, usize),
        List,
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            3 => Just(Op::Enqueue),
            1 => (0usize..12).prop_map(Op::RemoveAt),
            1 => (0usize..12).prop_map(Op::RemoveId),
            2 => (0usize..12, 0usize..12).prop_map(|(f, t)| Op::Move(f, t)),
            1 => Just(Op::List),
        ]
    }

    // For any sequence of operations, listing yields positions 1..=N exactly
    // once each and the order matches a plain Vec model of the same operations.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_positions_stay_dense(ops in proptest::collection::vec(op_strategy(), 0..40)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let store = QueueStore::new();
                let mut model: Vec<String> = Vec::new();
                let mut counter = 0;

                for op in ops {
                    match op {
                        Op::Enqueue => {
                            counter += 1;
                            let entry = store
                                .enqueue(song(&counter.to_string()), "Singer")
                                .await
                                .unwrap();
                            model.push(entry.id);
                        }
                        Op::RemoveAt(i) => {
                            let result = store.remove_by_index(i).await;
                            if i < model.len() {
                                assert_eq!(result.unwrap().id, model.remove(i));
                            } else {
                                assert!(result.is_err());
                            }
                        }
                        Op::RemoveId(i) => {
                            if let Some(id) = model.get(i).cloned() {
                                store.remove_by_id(&id).await.unwrap();
                                model.remove(i);
                            }
                        }
                        Op::Move(from, to) => {
                            let moved = store.move_entry(from, to).await;
                            if from < model.len() && to < model.len() {
                                assert!(moved);
                                let id = model.remove(from);
                                model.insert(to, id);
                            } else {
                                assert!(!moved);
                            }
                        }
                        Op::List => {}
                    }

                    let list = store.list().await;
                    assert_dense(&list);
                    let ids: Vec<String> = list.iter().map(|e| e.id.clone()).collect();
                    assert_eq!(ids, model);
                }
            });
        }
    }
}
