//! The two batch entry points.
//!
//! Pipeline A (`run_consolidation`) goes from quarter discovery to the
//! canonical artifact. Pipeline B (`run_aggregation`) only reads that
//! artifact, so it can be re-run offline. Both are sequential and hold the
//! run lock on the processed directory while they work.

pub mod ingestion;
pub mod processing;
pub mod report;
pub mod run_lock;

use crate::app::ports::HttpClientPort;
use crate::config::Config;
use crate::error::Result;
use crate::types::{DownloadedArchive, NormalizedTable};
use ingestion::{acquire_quarter, discover_quarters, DiscoverySource};
use metrics::{counter, histogram};
use processing::{aggregate, consolidate, map_file, FileOutcome};
use report::{Diagnostic, DiagnosticKind, RunReport, Stage};
use run_lock::RunLock;
use std::fs;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

pub struct Pipeline;

impl Pipeline {
    /// Discover, acquire, extract, map and consolidate.
    ///
    /// Remote, file and value problems are recorded in the report and the run
    /// carries on. Returns `Err` only when the run cannot start (lock held,
    /// unusable directories); a run that produced no table returns a report
    /// with `succeeded == false`.
    #[instrument(skip_all)]
    pub async fn run_consolidation(config: &Config, http: &dyn HttpClientPort) -> Result<RunReport> {
        let _lock = RunLock::acquire(&config.processed_dir)?;
        fs::create_dir_all(&config.raw_dir)?;
        let started = Instant::now();
        let mut report = RunReport::new("consolidation");

        // Step 1: discover quarters
        info!("📡 Discovering quarters under {}", config.base_url);
        let discovery = discover_quarters(http, &config.base_url, config.years_to_scan, config.quarters_to_take).await;
        if let DiscoverySource::Fallback { reason } = &discovery.source {
            report.push(Diagnostic::new(
                Stage::Discovery,
                DiagnosticKind::TransientRemote,
                format!("fallback quarter list used: {reason}"),
            ));
            report.incr("discovery_fallback", 1);
        }
        report.incr("quarters", discovery.quarters.len() as u64);

        // Step 2-4: acquire, extract and map, one quarter at a time
        let mut tables = Vec::new();
        for quarter in &discovery.quarters {
            info!("📥 Acquiring archives for {}", quarter);
            let acquisition = acquire_quarter(http, &config.base_url, *quarter, &config.raw_dir).await;
            report.incr("archives", acquisition.archives.len() as u64);
            report.extend(acquisition.diagnostics);

            for archive in &acquisition.archives {
                Self::process_archive(config, archive, &mut tables, &mut report);
                if !config.retain_archives {
                    if let Err(e) = fs::remove_file(&archive.path) {
                        warn!("could not delete {}: {}", archive.path.display(), e);
                    }
                }
            }
        }

        // Step 5: consolidate
        info!("💾 Consolidating {} tables", tables.len());
        match consolidate(&tables, &config.consolidated_path()) {
            Ok(summary) => {
                report.incr("rows", summary.rows as u64);
                report.artifact = Some(summary.path);
                report.finish(true);
            }
            Err(e) => {
                error!("Consolidation failed: {}", e);
                report.fail(e.to_string());
            }
        }

        histogram!("ans_consolidation_duration_seconds").record(started.elapsed().as_secs_f64());
        Self::persist_report(config, &report);
        Ok(report)
    }

    /// Load the canonical artifact, validate, group and aggregate.
    ///
    /// A missing canonical artifact fails the run and writes no aggregate.
    #[instrument(skip_all)]
    pub fn run_aggregation(config: &Config) -> Result<RunReport> {
        let _lock = RunLock::acquire(&config.processed_dir)?;
        let mut report = RunReport::new("aggregation");

        info!("🔧 Aggregating {}", config.consolidated_path().display());
        match aggregate(&config.consolidated_path(), &config.aggregated_path()) {
            Ok(summary) => {
                report.incr("rows", summary.rows_read);
                report.incr("buckets", summary.buckets as u64);
                report.incr("invalid_identifiers", summary.invalid_identifiers);
                report.incr("coerced_values", summary.coerced_values);
                report.incr("clamped_values", summary.clamped_values);
                report.incr("ungrouped_rows", summary.ungrouped_rows);
                report.incr("irregular_rows", summary.irregular_rows);
                if summary.irregular_rows > 0 {
                    report.push(
                        Diagnostic::new(
                            Stage::Aggregation,
                            DiagnosticKind::MalformedValue,
                            format!(
                                "{} rows had missing fields or non-UTF-8 text and were read as far as possible",
                                summary.irregular_rows
                            ),
                        )
                        .with_file(config.consolidated_path()),
                    );
                }
                if summary.coerced_values > 0 {
                    report.push(
                        Diagnostic::new(
                            Stage::Aggregation,
                            DiagnosticKind::MalformedValue,
                            format!("{} values were missing or unparseable and counted as 0", summary.coerced_values),
                        )
                        .with_file(config.consolidated_path()),
                    );
                }
                counter!("ans_rows_aggregated_total").increment(summary.rows_read);
                report.artifact = Some(summary.path);
                report.finish(true);
            }
            Err(e) => {
                error!("Aggregation failed: {}", e);
                report.fail(e.to_string());
            }
        }

        Self::persist_report(config, &report);
        Ok(report)
    }

    /// Extracts one archive and maps each tabular file in it. The extraction
    /// directory is gone when this returns.
    #[instrument(skip_all, fields(archive = %archive.path.display()))]
    fn process_archive(
        config: &Config,
        archive: &DownloadedArchive,
        tables: &mut Vec<NormalizedTable>,
        report: &mut RunReport,
    ) {
        let archive_name = archive
            .path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| archive.path.clone());

        let extracted = match ingestion::extract(archive, &config.raw_dir, config.max_extracted_bytes) {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!("extraction failed: {}", e);
                report.push(
                    Diagnostic::new(Stage::Extraction, DiagnosticKind::LocalFailure, e.to_string())
                        .with_quarter(archive.quarter)
                        .with_file(&archive.path),
                );
                return;
            }
        };

        for file in &extracted.files {
            report.incr("files_seen", 1);
            let entry = archive_name.join(file.path.strip_prefix(extracted.dir()).unwrap_or(&file.path));
            let diagnostic = |kind, reason: String| {
                Diagnostic::new(Stage::Mapping, kind, reason)
                    .with_quarter(archive.quarter)
                    .with_file(&entry)
            };

            match map_file(file, archive.quarter) {
                FileOutcome::Mapped(mapped) => {
                    counter!("ans_files_accepted_total").increment(1);
                    report.incr("files_accepted", 1);
                    if let Some(first) = mapped.malformed.first() {
                        report.push(diagnostic(
                            DiagnosticKind::MalformedValue,
                            format!(
                                "{} values could not be parsed (first at row {}: '{}')",
                                mapped.malformed.len(),
                                first.row + 1,
                                first.raw
                            ),
                        ));
                    }
                    tables.push(mapped.table);
                }
                FileOutcome::Skipped(reason) => {
                    counter!("ans_files_skipped_total").increment(1);
                    report.incr("files_skipped", 1);
                    report.push(diagnostic(DiagnosticKind::UnrecognizedFile, reason.to_string()));
                }
                FileOutcome::Failed(e) => {
                    counter!("ans_files_failed_total").increment(1);
                    report.incr("files_failed", 1);
                    report.push(diagnostic(DiagnosticKind::UnrecognizedFile, e.to_string()));
                }
            }
        }
    }

    fn persist_report(config: &Config, report: &RunReport) {
        match report.persist(&config.processed_dir) {
            Ok(path) => info!("📝 Run report written to {}", path.display()),
            Err(e) => warn!("Failed to write run report: {}", e),
        }
    }
}
