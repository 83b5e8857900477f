//! Destinations for finished benchmark runs.

use async_trait::async_trait;
use bt_types::{BtResult, RunResult, Task};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::process::Command;
use tracing::debug;
use uuid::Uuid;

/// Receives `(task, run result)` pairs as runs complete.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, task: &Task, result: &RunResult) -> BtResult<()>;
}

/// Keeps every recorded run in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(Task, RunResult)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Task, RunResult)> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

#[async_trait]
impl ResultSink for MemorySink {
    async fn record(&self, task: &Task, result: &RunResult) -> BtResult<()> {
        self.records.lock().push((*task, result.clone()));
        Ok(())
    }
}

/// One line of a [`JsonLinesSink`] file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub task: Task,
    pub recorded_at: DateTime<Utc>,
    /// Revision of the benchmarked sources, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub result: RunResult,
}

/// Appends one JSON object per run to a file.
#[derive(Debug)]
pub struct JsonLinesSink {
    writer: tokio::sync::Mutex<BufWriter<File>>,
    commit: Option<String>,
}

impl JsonLinesSink {
    pub async fn open(path: impl AsRef<Path>) -> BtResult<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())
            .await?;
        Ok(Self {
            writer: tokio::sync::Mutex::new(BufWriter::new(file)),
            commit: None,
        })
    }

    /// Stamp every record with the given source revision.
    pub fn with_commit(mut self, commit: Option<String>) -> Self {
        self.commit = commit;
        self
    }
}

#[async_trait]
impl ResultSink for JsonLinesSink {
    async fn record(&self, task: &Task, result: &RunResult) -> BtResult<()> {
        let record = RunRecord {
            run_id: Uuid::new_v4(),
            task: *task,
            recorded_at: Utc::now(),
            commit: self.commit.clone(),
            result: result.clone(),
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut writer = self.writer.lock().await;
        writer.write_all(&line).await?;
        writer.flush().await?;
        Ok(())
    }
}

/// The `HEAD` commit of the git checkout containing `dir`, if any.
pub async fn source_commit(dir: &Path) -> Option<String> {
    let output = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stderr(Stdio::null())
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        debug!(dir = %dir.display(), "no git revision for sources");
        return None;
    }
    let commit = String::from_utf8_lossy(&output.stdout).trim().to_string();
    (!commit.is_empty()).then_some(commit)
}
