//! Persists partial batch results so an interrupted run can be recovered.

use crate::error::Result;
use crate::models::{EmailRecord, RecoveredData};
use std::fs;
use std::path::PathBuf;

/// Storage collaborator the batch orchestrator saves into after every task.
/// The orchestrator never implements storage itself; callers decide where the
/// checkpoint lives.
pub(crate) trait CheckpointStore {
    /// Persists the accumulated emails for the given (profession, state),
    /// replacing any previous checkpoint.
    fn save(&self, profession: &str, state: &str, emails: &[EmailRecord]) -> Result<()>;

    /// Loads the most recent checkpoint, if one exists.
    fn load(&self) -> Result<Option<RecoveredData>>;

    /// Removes the checkpoint after a run completes cleanly.
    fn clear(&self) -> Result<()>;
}

/// File-backed checkpoint store holding one JSON `RecoveredData` document.
#[derive(Debug, Clone)]
pub(crate) struct JsonCheckpointStore {
    path: PathBuf,
}

impl JsonCheckpointStore {
    pub(crate) fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn save(&self, profession: &str, state: &str, emails: &[EmailRecord]) -> Result<()> {
        let data = RecoveredData {
            profession: profession.to_string(),
            state: state.to_string(),
            emails: emails.to_vec(),
            date: chrono::Utc::now().to_rfc3339(),
            auto_save: true,
        };
        let json = serde_json::to_string_pretty(&data)?;
        fs::write(&self.path, json)?;
        tracing::debug!(
            target: "checkpoint_task",
            "Saved {} emails for recovery ({}, {})",
            emails.len(),
            profession,
            state
        );
        Ok(())
    }

    fn load(&self) -> Result<Option<RecoveredData>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        let data: RecoveredData = serde_json::from_str(&content)?;
        Ok(Some(data))
    }

    fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
