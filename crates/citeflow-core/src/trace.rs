use std::fmt::Write as _;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One stage finishing, with the summary line it appended to the state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub task_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered stage events of a single run, carried in the session context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunTrace {
    events: Vec<TraceEvent>,
}

impl RunTrace {
    pub fn record(&mut self, task_id: impl Into<String>, message: impl Into<String>) {
        self.events.push(TraceEvent {
            task_id: task_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// One numbered line per stage, with the offset from the first event.
    pub fn render_log(&self) -> String {
        let Some(first) = self.events.first() else {
            return "No stages recorded.\n".to_string();
        };

        let mut out = String::new();
        for (idx, event) in self.events.iter().enumerate() {
            let offset = (event.timestamp - first.timestamp).num_milliseconds().max(0);
            let _ = writeln!(
                out,
                "{}. [{} +{}ms] {}",
                idx + 1,
                event.task_id,
                offset,
                event.message
            );
        }
        out
    }
}

/// Write the trace of one run to `<dir>/<session_id>.json`.
pub fn persist_trace<P: AsRef<Path>>(
    dir: P,
    session_id: &str,
    trace: &RunTrace,
) -> Result<PathBuf> {
    let dir = dir.as_ref();
    create_dir_all(dir)
        .with_context(|| format!("failed to create trace directory {}", dir.display()))?;
    let path = dir.join(format!("{session_id}.json"));
    let payload = serde_json::to_vec_pretty(trace)?;
    let mut file = File::create(&path)
        .with_context(|| format!("failed to create trace file {}", path.display()))?;
    file.write_all(&payload)
        .with_context(|| format!("failed to write trace file {}", path.display()))?;
    Ok(path)
}
