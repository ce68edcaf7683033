use crate::constants::REPORTS_DIR;
use crate::error::Result;
use crate::types::QuarterReference;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Discovery,
    Acquisition,
    Extraction,
    Mapping,
    Consolidation,
    Aggregation,
}

/// What went wrong with an item that the run carried on past
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    /// Unreachable host, timeout, bad status or unreadable listing
    TransientRemote,
    /// File lacks a required column role, or is not a table at all
    UnrecognizedFile,
    /// Value that had to be coerced
    MalformedValue,
    /// Local I/O or archive corruption
    LocalFailure,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Diagnostic {
    pub stage: Stage,
    pub kind: DiagnosticKind,
    pub quarter: Option<QuarterReference>,
    pub file: Option<String>,
    pub reason: String,
}

impl Diagnostic {
    pub fn new(stage: Stage, kind: DiagnosticKind, reason: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            quarter: None,
            file: None,
            reason: reason.into(),
        }
    }

    pub fn with_quarter(mut self, quarter: QuarterReference) -> Self {
        self.quarter = Some(quarter);
        self
    }

    pub fn with_file(mut self, file: impl AsRef<Path>) -> Self {
        self.file = Some(file.as_ref().display().to_string());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}]", self.stage)?;
        if let Some(q) = &self.quarter {
            write!(f, " {q}")?;
        }
        if let Some(file) = &self.file {
            write!(f, " {file}")?;
        }
        write!(f, ": {}", self.reason)
    }
}

/// Everything a pipeline run did, including the items it gave up on.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub pipeline: &'static str,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub succeeded: bool,
    /// Why the stage failed, when it did
    pub failure: Option<String>,
    pub counts: BTreeMap<&'static str, u64>,
    pub diagnostics: Vec<Diagnostic>,
    pub artifact: Option<PathBuf>,
}

impl RunReport {
    pub fn new(pipeline: &'static str) -> Self {
        Self {
            pipeline,
            started_at: Utc::now(),
            finished_at: None,
            succeeded: false,
            failure: None,
            counts: BTreeMap::new(),
            diagnostics: Vec::new(),
            artifact: None,
        }
    }

    pub fn incr(&mut self, key: &'static str, by: u64) {
        *self.counts.entry(key).or_insert(0) += by;
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn diagnostics_of(&self, kind: DiagnosticKind) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(move |d| d.kind == kind)
    }

    pub fn finish(&mut self, succeeded: bool) {
        self.succeeded = succeeded;
        self.finished_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.failure = Some(reason.into());
        self.finish(false);
    }

    /// Writes the report as pretty JSON under `<processed_dir>/reports/`.
    /// Never overwrites an earlier report, even one started in the same
    /// millisecond.
    pub fn persist(&self, processed_dir: &Path) -> Result<PathBuf> {
        let dir = processed_dir.join(REPORTS_DIR);
        fs::create_dir_all(&dir)?;

        let json = serde_json::to_string_pretty(self)?;
        let stem = format!("{}_{}", self.pipeline, self.started_at.format("%Y%m%d_%H%M%S_%3f"));
        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => format!("{stem}.json"),
                n => format!("{stem}-{n}.json"),
            };
            let path = dir.join(name);
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(json.as_bytes())?;
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}
