use crate::model::Target;
use crate::stats::TargetStats;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store i/o failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("store serialization failure: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Interface to the storage engine. The scheduler and web layer only see
/// this trait; the engine never touches files directly.
#[async_trait]
pub trait StoreGateway: Send + Sync {
    async fn list_active(&self) -> Result<Vec<Target>, StoreError>;
    async fn list_all(&self) -> Result<Vec<Target>, StoreError>;
    async fn get(&self, id: &str) -> Result<Option<(Target, TargetStats)>, StoreError>;
    async fn save(&self, id: &str, stats: &TargetStats) -> Result<(), StoreError>;
    async fn insert(&self, target: Target) -> Result<(), StoreError>;
    /// Replaces the definition of an existing target, keeping its stats.
    /// Returns false when the id is unknown.
    async fn update(&self, target: Target) -> Result<bool, StoreError>;
    async fn remove(&self, id: &str) -> Result<bool, StoreError>;
    /// Prunes history entries older than the cutoff across all targets.
    /// Returns the number of entries removed.
    async fn delete_older_history(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
    async fn flush(&self) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    target: Target,
    #[serde(default)]
    stats: TargetStats,
}

/// JSON-file-backed store. The working copy lives in memory; the file is
/// rewritten atomically (temp file + rename). Stats saves are batched:
/// only every `flush_every`-th save rewrites the file, structural changes
/// and explicit `flush` always do.
pub struct FileStore {
    path: PathBuf,
    entries: DashMap<String, StoredEntry>,
    flush_every: u32,
    // Saves since the last flush; also serializes file writes.
    pending: Mutex<u32>,
}

impl FileStore {
    pub fn open(path: impl AsRef<Path>, flush_every: u32) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let entries = DashMap::new();

        if path.exists() {
            let content = fs::read_to_string(&path)?;
            let stored: Vec<StoredEntry> = serde_json::from_str(&content)?;
            for entry in stored {
                entries.insert(entry.target.id.clone(), entry);
            }
            tracing::info!("Loaded {} targets from {}", entries.len(), path.display());
        } else {
            tracing::info!("Store file {} not found, starting empty", path.display());
        }

        Ok(Self {
            path,
            entries,
            flush_every: flush_every.max(1),
            pending: Mutex::new(0),
        })
    }

    fn sorted_targets(&self, filter_active: bool) -> Vec<Target> {
        let mut targets: Vec<Target> = self
            .entries
            .iter()
            .filter(|e| !filter_active || e.value().target.active)
            .map(|e| e.value().target.clone())
            .collect();
        targets.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        targets
    }

    fn write_file(&self) -> Result<(), StoreError> {
        let mut stored: Vec<StoredEntry> = self.entries.iter().map(|e| e.value().clone()).collect();
        stored.sort_by(|a, b| {
            a.target
                .created_at
                .cmp(&b.target.created_at)
                .then_with(|| a.target.id.cmp(&b.target.id))
        });

        let content = serde_json::to_string_pretty(&stored)?;
        let tmp_file = self.path.with_extension("tmp");
        fs::write(&tmp_file, content)?;
        fs::rename(&tmp_file, &self.path)?;
        Ok(())
    }

    fn flush_now(&self) -> Result<(), StoreError> {
        let mut pending = self.pending.lock().expect("store lock poisoned");
        self.write_file()?;
        *pending = 0;
        Ok(())
    }
}

#[async_trait]
impl StoreGateway for FileStore {
    async fn list_active(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self.sorted_targets(true))
    }

    async fn list_all(&self) -> Result<Vec<Target>, StoreError> {
        Ok(self.sorted_targets(false))
    }

    async fn get(&self, id: &str) -> Result<Option<(Target, TargetStats)>, StoreError> {
        Ok(self
            .entries
            .get(id)
            .map(|e| (e.value().target.clone(), e.value().stats.clone())))
    }

    async fn save(&self, id: &str, stats: &TargetStats) -> Result<(), StoreError> {
        match self.entries.get_mut(id) {
            Some(mut entry) => entry.value_mut().stats = stats.clone(),
            // The target was removed while its probe was in flight; the
            // stale write is dropped.
            None => return Ok(()),
        }

        let mut pending = self.pending.lock().expect("store lock poisoned");
        *pending += 1;
        if *pending >= self.flush_every {
            self.write_file()?;
            *pending = 0;
        }
        Ok(())
    }

    async fn insert(&self, target: Target) -> Result<(), StoreError> {
        let id = target.id.clone();
        self.entries.insert(
            id,
            StoredEntry {
                target,
                stats: TargetStats::default(),
            },
        );
        self.flush_now()
    }

    async fn update(&self, target: Target) -> Result<bool, StoreError> {
        match self.entries.get_mut(&target.id) {
            Some(mut entry) => entry.value_mut().target = target,
            None => return Ok(false),
        }
        self.flush_now()?;
        Ok(true)
    }

    async fn remove(&self, id: &str) -> Result<bool, StoreError> {
        if self.entries.remove(id).is_none() {
            return Ok(false);
        }
        self.flush_now()?;
        Ok(true)
    }

    async fn delete_older_history(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut removed = 0;
        for mut entry in self.entries.iter_mut() {
            removed += entry.value_mut().stats.prune_history_before(cutoff);
        }
        if removed > 0 {
            self.flush_now()?;
        }
        Ok(removed)
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.flush_now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProbeKind, ProbeResult, ProbeStatus};

    fn target(name: &str) -> Target {
        Target::new("owner-1", name, &format!("{}.example.com", name), ProbeKind::Https, 5)
    }

    fn up_result() -> ProbeResult {
        ProbeResult {
            status: ProbeStatus::Up,
            latency_ms: 120,
            status_code: Some(200),
            reason: None,
            checked_at: Utc::now(),
        }
    }

    fn store_path(dir: &tempfile::TempDir) -> PathBuf {
        dir.path().join("targets.json")
    }

    #[tokio::test]
    async fn list_active_excludes_deactivated_targets() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(store_path(&dir), 1).unwrap();

        let mut paused = target("paused");
        paused.active = false;
        store.insert(target("live")).await.unwrap();
        store.insert(paused).await.unwrap();

        let active = store.list_active().await.unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "live");
        assert_eq!(store.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let t = target("durable");
        let id = t.id.clone();

        {
            let store = FileStore::open(&path, 1).unwrap();
            store.insert(t).await.unwrap();
            let (_, mut stats) = store.get(&id).await.unwrap().unwrap();
            stats.record(&up_result(), 288);
            store.save(&id, &stats).await.unwrap();
        }

        let reopened = FileStore::open(&path, 1).unwrap();
        let (loaded, stats) = reopened.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "durable");
        assert_eq!(stats.total_checks, 1);
        assert_eq!(stats.history.len(), 1);
    }

    #[tokio::test]
    async fn saves_are_flushed_in_batches() {
        let dir = tempfile::tempdir().unwrap();
        let path = store_path(&dir);
        let store = FileStore::open(&path, 3).unwrap();
        let t = target("batched");
        let id = t.id.clone();
        store.insert(t).await.unwrap();

        let mut stats = TargetStats::default();
        for expected_on_disk in [0u64, 0, 3] {
            stats.record(&up_result(), 288);
            store.save(&id, &stats).await.unwrap();

            let on_disk: Vec<StoredEntry> =
                serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
            assert_eq!(on_disk[0].stats.total_checks, expected_on_disk);
        }

        // Explicit flush writes whatever is pending.
        stats.record(&up_result(), 288);
        store.save(&id, &stats).await.unwrap();
        store.flush().await.unwrap();
        let on_disk: Vec<StoredEntry> =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(on_disk[0].stats.total_checks, 4);
    }

    #[tokio::test]
    async fn save_for_removed_target_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(store_path(&dir), 1).unwrap();
        let mut stats = TargetStats::default();
        stats.record(&up_result(), 288);

        store.save("ghost", &stats).await.unwrap();
        assert!(store.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_and_remove_report_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(store_path(&dir), 1).unwrap();

        assert!(!store.update(target("missing")).await.unwrap());
        assert!(!store.remove("missing").await.unwrap());

        let t = target("known");
        let id = t.id.clone();
        store.insert(t.clone()).await.unwrap();

        let mut renamed = t;
        renamed.name = "renamed".to_string();
        assert!(store.update(renamed).await.unwrap());
        let (loaded, _) = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.name, "renamed");

        assert!(store.remove(&id).await.unwrap());
        assert!(store.get(&id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn retention_prunes_history_across_targets() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(store_path(&dir), 1).unwrap();
        let now = Utc::now();

        for name in ["a", "b"] {
            let t = target(name);
            let id = t.id.clone();
            store.insert(t).await.unwrap();
            let mut stats = TargetStats::default();
            for days_ago in [45, 2] {
                let mut r = up_result();
                r.checked_at = now - chrono::Duration::days(days_ago);
                stats.record(&r, 288);
            }
            store.save(&id, &stats).await.unwrap();
        }

        let removed = store
            .delete_older_history(now - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(removed, 2);
        for t in store.list_all().await.unwrap() {
            let (_, stats) = store.get(&t.id).await.unwrap().unwrap();
            assert_eq!(stats.history.len(), 1);
        }
    }
}
