//! Thread-safe checkpoint store: in-memory map mirrored to one JSON file
//! per step id (spec §4.7, §6).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use tokio::sync::RwLock;
use tracing::warn;

use crate::domain::error::{VigilError, VigilResult};
use crate::domain::models::checkpoint::{
    Checkpoint, PostRecord, PreRecord, ReconcileRecord, SuperviseRecord,
};
use crate::domain::models::ids::StepId;

/// In-memory map `stepId -> Checkpoint`, guarded by a read-write lock
/// (readers -- decision-trail export -- do not block each other but block
/// writers, spec §5).
pub struct CheckpointStore {
    checkpoints: RwLock<HashMap<StepId, Checkpoint>>,
    directory: Option<PathBuf>,
}

impl CheckpointStore {
    /// In-memory only; nothing is mirrored to disk.
    pub fn in_memory() -> Self {
        Self { checkpoints: RwLock::new(HashMap::new()), directory: None }
    }

    /// Mirrors every save to `directory` as `<stepId>.json`.
    pub fn with_directory(directory: impl Into<PathBuf>) -> Self {
        Self { checkpoints: RwLock::new(HashMap::new()), directory: Some(directory.into()) }
    }

    async fn save(&self, step_id: &StepId, mutate: impl FnOnce(&mut Checkpoint)) -> VigilResult<()> {
        let mut checkpoints = self.checkpoints.write().await;
        let checkpoint = checkpoints.entry(*step_id).or_default();
        mutate(checkpoint);
        let snapshot = checkpoint.clone();
        drop(checkpoints);
        self.mirror_to_disk(step_id, &snapshot).await
    }

    async fn mirror_to_disk(&self, step_id: &StepId, checkpoint: &Checkpoint) -> VigilResult<()> {
        let Some(dir) = &self.directory else { return Ok(()) };
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| VigilError::Configuration(format!("checkpoint dir: {e}")))?;
        let path = dir.join(format!("{step_id}.json"));
        let json = serde_json::to_vec_pretty(checkpoint)
            .map_err(|e| VigilError::Configuration(format!("checkpoint serialize: {e}")))?;
        tokio::fs::write(&path, json)
            .await
            .map_err(|e| VigilError::Configuration(format!("checkpoint write {path:?}: {e}")))?;
        Ok(())
    }

    pub async fn save_pre(&self, step_id: &StepId, pre: PreRecord) -> VigilResult<()> {
        self.save(step_id, |c| c.pre = Some(pre)).await
    }

    pub async fn save_post(&self, step_id: &StepId, post: PostRecord) -> VigilResult<()> {
        self.save(step_id, |c| c.post = Some(post)).await
    }

    pub async fn save_reconcile(&self, step_id: &StepId, reconcile: ReconcileRecord) -> VigilResult<()> {
        self.save(step_id, |c| c.reconcile = Some(reconcile)).await
    }

    pub async fn save_supervise(&self, step_id: &StepId, supervise: SuperviseRecord) -> VigilResult<()> {
        self.save(step_id, |c| c.supervise = Some(supervise)).await
    }

    pub async fn get(&self, step_id: &StepId) -> Option<Checkpoint> {
        self.checkpoints.read().await.get(step_id).cloned()
    }

    /// All checkpoints currently held, in unspecified order (spec §4.7,
    /// §9 open question: callers needing chronology should consult the
    /// event log instead).
    pub async fn get_decision_trail(&self) -> Vec<(StepId, Checkpoint)> {
        self.checkpoints
            .read()
            .await
            .iter()
            .map(|(k, v)| (*k, v.clone()))
            .collect()
    }

    /// Read every `*.json` in `dir`, keyed by filename stem. Unreadable,
    /// malformed, or non-uuid-named files are skipped (best-effort, spec
    /// §4.7).
    pub async fn load(dir: impl AsRef<Path>) -> VigilResult<Self> {
        let dir = dir.as_ref();
        let mut map = HashMap::new();
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| VigilError::Configuration(format!("checkpoint dir {dir:?}: {e}")))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };
            let Ok(step_id) = stem.parse::<StepId>() else {
                warn!(?path, "skipping checkpoint file with non-uuid name");
                continue;
            };
            match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<Checkpoint>(&bytes) {
                    Ok(checkpoint) => {
                        map.insert(step_id, checkpoint);
                    }
                    Err(e) => warn!(?path, error = %e, "skipping malformed checkpoint file"),
                },
                Err(e) => warn!(?path, error = %e, "skipping unreadable checkpoint file"),
            }
        }
        Ok(Self { checkpoints: RwLock::new(map), directory: Some(dir.to_path_buf()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_post() -> PostRecord {
        PostRecord {
            actual_output: "done".into(),
            tools_used: vec![],
            met_commitment: true,
            deviations: vec![],
            concerns: vec![],
            unexpected: vec![],
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn records_are_additive() {
        let store = CheckpointStore::in_memory();
        let step_id = StepId::from_name("step-1");
        store.save_post(&step_id, sample_post()).await.unwrap();
        store
            .save_reconcile(
                &step_id,
                ReconcileRecord { triggers: vec![], supervise: false, timestamp: Utc::now() },
            )
            .await
            .unwrap();
        let checkpoint = store.get(&step_id).await.unwrap();
        assert!(checkpoint.post.is_some());
        assert!(checkpoint.reconcile.is_some());
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::with_directory(dir.path());
        let step_id = StepId::from_name("step-1");
        store.save_post(&step_id, sample_post()).await.unwrap();

        let reloaded = CheckpointStore::load(dir.path()).await.unwrap();
        let checkpoint = reloaded.get(&step_id).await.unwrap();
        assert_eq!(checkpoint.post.unwrap().actual_output, "done");
    }

    #[tokio::test]
    async fn load_skips_non_uuid_files() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("bad.json"), b"not json").await.unwrap();
        let store = CheckpointStore::load(dir.path()).await.unwrap();
        assert!(store.get(&StepId::from_name("bad")).await.is_none());
    }
}
