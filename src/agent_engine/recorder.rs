use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::agent_engine::graph::NodeId;
use crate::agent_engine::state::CycleState;
use crate::errors::{CycleError, CycleResult};

/// One record per node invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub timestamp: chrono::DateTime<chrono::Local>,
    pub node: NodeId,
    pub step_idx: usize,
    pub payload: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_before: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_after: Option<String>,
}

impl RunRecord {
    pub fn new(node: NodeId, state: &CycleState, payload: serde_json::Value) -> Self {
        Self {
            timestamp: chrono::Local::now(),
            node,
            step_idx: state.step_idx,
            payload,
            img_before: state.img_before.as_ref().map(|s| s.to_string()),
            img_after: state.img_after.as_ref().map(|s| s.to_string()),
        }
    }
}

/// Append-only sink for node records and state snapshots of one run.
pub trait RunRecorder: Send + Sync {
    fn record(&self, record: &RunRecord) -> CycleResult<()>;

    /// Replace the persisted snapshot with `state`.
    fn snapshot(&self, state: &CycleState) -> CycleResult<()>;
}

/// `YYYYMMDD-HHMMSS` in local time.
pub fn new_run_id() -> String {
    chrono::Local::now().format("%Y%m%d-%H%M%S").to_string()
}

/// Writes `<run_id>_agentlog.jsonl` and `<run_id>.json` under the runs directory.
pub struct FileRecorder {
    pub run_id: String,
    log_path: PathBuf,
    snapshot_path: PathBuf,
}

impl FileRecorder {
    pub fn new(runs_dir: &Path, run_id: &str) -> CycleResult<Self> {
        std::fs::create_dir_all(runs_dir)?;
        Ok(Self {
            run_id: run_id.to_string(),
            log_path: runs_dir.join(format!("{run_id}_agentlog.jsonl")),
            snapshot_path: runs_dir.join(format!("{run_id}.json")),
        })
    }

    pub fn log_path(&self) -> &Path {
        &self.log_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }
}

impl RunRecorder for FileRecorder {
    fn record(&self, record: &RunRecord) -> CycleResult<()> {
        let line = serde_json::to_string(record)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        writeln!(file, "{}", line)?;
        file.flush()?;
        tracing::debug!(
            path = %self.log_path.display(),
            node = %record.node,
            "run record appended"
        );
        Ok(())
    }

    fn snapshot(&self, state: &CycleState) -> CycleResult<()> {
        let content = serde_json::to_string_pretty(state)?;
        // Write-then-rename so a crash never leaves a truncated snapshot.
        let tmp = self.snapshot_path.with_extension("json.tmp");
        std::fs::write(&tmp, content)?;
        std::fs::rename(&tmp, &self.snapshot_path)?;
        tracing::debug!(path = %self.snapshot_path.display(), status = %state.status, "state snapshot written");
        Ok(())
    }
}

pub fn load_snapshot(path: &Path) -> CycleResult<CycleState> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| CycleError::Recorder(format!("cannot read snapshot {}: {e}", path.display())))?;
    Ok(serde_json::from_str(&content)?)
}
