//! Per-run event log: one JSON line per significant event, appended to
//! `logs/<YYYYMMDD>.log`. Each line carries the run id so interleaved or
//! restarted runs in the same day-file stay separable. This file is the
//! diagnostic surface for a run; `tracing` output remains on stdout.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

pub struct RunLog {
    run_id: String,
    path: PathBuf,
    file: Option<File>,
    seq: u32,
}

#[derive(Serialize)]
struct LoggedEvent<'a> {
    run_id: &'a str,
    seq: u32,
    ts: DateTime<Utc>,
    #[serde(flatten)]
    kind: &'a EventKind,
}

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    RunStarted,
    CollectorFinished {
        source: String,
        count: usize,
    },
    CollectorFailed {
        source: String,
        error: String,
    },
    DedupApplied {
        in_run: usize,
        already_stored: usize,
        remaining: usize,
    },
    StageSummary {
        stage: String,
        input: usize,
        output: usize,
        errors: u32,
    },
    PriorityFiltered {
        dropped_low: usize,
    },
    SaveComplete {
        primary: usize,
        fallback: usize,
        skipped_existing: usize,
        backfilled: usize,
    },
    NotifyComplete {
        cards: usize,
        suppressed: usize,
        recorded: usize,
    },
    RunFinished {
        summary: String,
    },
}

impl RunLog {
    /// Open (append) today's log file under `log_dir` with a fresh run id.
    pub fn open(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)?;
        let path = log_dir.join(format!("{}.log", Utc::now().format("%Y%m%d")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            run_id: Uuid::new_v4().to_string(),
            path,
            file: Some(file),
            seq: 0,
        })
    }

    /// A log that discards events (tests).
    pub fn sink() -> Self {
        Self {
            run_id: Uuid::new_v4().to_string(),
            path: PathBuf::new(),
            file: None,
            seq: 0,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event line. Log-file write failures must never take the
    /// pipeline down; they degrade to a tracing warning.
    pub fn log(&mut self, kind: EventKind) {
        let event = LoggedEvent {
            run_id: &self.run_id,
            seq: self.seq,
            ts: Utc::now(),
            kind: &kind,
        };
        self.seq += 1;

        let Some(ref mut file) = self.file else {
            return;
        };
        match serde_json::to_string(&event) {
            Ok(line) => {
                if let Err(e) = writeln!(file, "{line}") {
                    warn!(error = %e, "run log write failed");
                }
            }
            Err(e) => warn!(error = %e, "run log event unserializable"),
        }
    }
}
