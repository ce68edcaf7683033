//! Per-provider statistics over the canonical table.
//!
//! The canonical CSV is streamed row by row; only one running accumulator
//! per (RazaoSocial, Ano, Trimestre) key is kept in memory.

use super::artifact::write_csv_atomic;
use super::cnpj;
use crate::constants::{AGGREGATED_HEADER, CONSOLIDATED_HEADER};
use crate::error::{PipelineError, Result};
use crate::types::AggregateBucket;
use csv::ByteRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Canonical row as read back from disk, before cleaning
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalRow {
    pub cnpj: String,
    pub valor_despesas: String,
    pub razao_social: String,
    pub trimestre: String,
    pub ano: String,
}

/// Positions of the canonical columns in the file being read, found by
/// header name. A column the file lacks reads as empty on every row.
#[derive(Debug, Clone)]
pub struct CanonicalColumns {
    positions: [Option<usize>; 5],
    width: usize,
}

impl CanonicalColumns {
    pub fn locate(headers: &ByteRecord) -> Self {
        let names: Vec<String> = headers
            .iter()
            .map(|h| String::from_utf8_lossy(h).trim().to_string())
            .collect();
        Self {
            positions: CONSOLIDATED_HEADER.map(|column| names.iter().position(|n| n == column)),
            width: names.len(),
        }
    }
}

impl CanonicalRow {
    /// Reads one record leniently. The flag is set when the record had the
    /// wrong number of fields or text that was not UTF-8; missing fields read
    /// as empty and invalid bytes are replaced.
    pub fn from_record(record: &ByteRecord, columns: &CanonicalColumns) -> (Self, bool) {
        let mut irregular = record.len() != columns.width;
        let mut field = |i: usize| match columns.positions[i].and_then(|p| record.get(p)) {
            Some(bytes) => match std::str::from_utf8(bytes) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    irregular = true;
                    String::from_utf8_lossy(bytes).into_owned()
                }
            },
            None => String::new(),
        };
        let row = Self {
            cnpj: field(0),
            valor_despesas: field(1),
            razao_social: field(2),
            trimestre: field(3),
            ano: field(4),
        };
        (row, irregular)
    }
}

/// A canonical row after cleaning, with its identifier check result.
/// Invalid identifiers are flagged, never dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRecord {
    pub cnpj: String,
    pub cnpj_valido: bool,
    pub valor_despesas: f64,
    pub razao_social: String,
    pub trimestre: String,
    pub ano: String,
    /// Value was missing or unparseable and became 0
    pub coerced: bool,
    /// Value was negative and became 0
    pub clamped: bool,
}

impl ValidatedRecord {
    pub fn from_row(row: CanonicalRow) -> Self {
        let cnpj = cnpj::clean(&row.cnpj);
        let cnpj_valido = cnpj::is_valid(&cnpj);

        let (mut valor_despesas, coerced) = match row.valor_despesas.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => (v, false),
            _ => (0.0, true),
        };
        let clamped = valor_despesas < 0.0;
        if clamped {
            valor_despesas = 0.0;
        }

        Self {
            cnpj,
            cnpj_valido,
            valor_despesas,
            razao_social: row.razao_social,
            trimestre: row.trimestre,
            ano: row.ano,
            coerced,
            clamped,
        }
    }

    fn group_key(&self) -> Option<GroupKey> {
        if self.razao_social.is_empty() || self.ano.is_empty() || self.trimestre.is_empty() {
            return None;
        }
        Some((self.razao_social.clone(), self.ano.clone(), self.trimestre.clone()))
    }
}

/// (RazaoSocial, Ano, Trimestre)
type GroupKey = (String, String, String);

/// Single-pass sum, mean and variance (Welford)
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RunningStats {
    count: u64,
    sum: f64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    pub fn push(&mut self, x: f64) {
        self.count += 1;
        self.sum += x;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum / self.count as f64
    }

    /// Sample standard deviation (N-1); undefined below two observations
    pub fn sample_std_dev(&self) -> Option<f64> {
        if self.count < 2 {
            return None;
        }
        Some((self.m2 / (self.count - 1) as f64).sqrt())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AggregationSummary {
    pub path: PathBuf,
    pub rows_read: u64,
    pub buckets: usize,
    pub invalid_identifiers: u64,
    pub coerced_values: u64,
    pub clamped_values: u64,
    /// Rows with an empty name, year or quarter, left out of every group
    pub ungrouped_rows: u64,
    /// Rows with a wrong field count or non-UTF-8 text, read leniently
    pub irregular_rows: u64,
}

/// Folds validated records into sorted buckets
#[derive(Debug, Default)]
pub struct Aggregator {
    groups: BTreeMap<GroupKey, RunningStats>,
    summary: AggregationSummary,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: &ValidatedRecord) {
        self.summary.rows_read += 1;
        if !record.cnpj_valido {
            self.summary.invalid_identifiers += 1;
        }
        if record.coerced {
            self.summary.coerced_values += 1;
        }
        if record.clamped {
            self.summary.clamped_values += 1;
        }
        match record.group_key() {
            Some(key) => self.groups.entry(key).or_default().push(record.valor_despesas),
            None => self.summary.ungrouped_rows += 1,
        }
    }

    pub fn finish(self) -> (Vec<AggregateBucket>, AggregationSummary) {
        let buckets: Vec<AggregateBucket> = self
            .groups
            .into_iter()
            .map(|((razao_social, ano, trimestre), stats)| AggregateBucket {
                razao_social,
                ano,
                trimestre,
                total: stats.sum(),
                media: stats.mean(),
                desvio_padrao: stats.sample_std_dev(),
                qtd: stats.count(),
            })
            .collect();
        let mut summary = self.summary;
        summary.buckets = buckets.len();
        (buckets, summary)
    }
}

/// Reads the canonical artifact at `input`, writes the aggregate table to
/// `output`.
///
/// A missing `input` is the only hard failure; nothing is written then.
/// Ragged or badly encoded rows are read as far as they go and counted.
#[instrument(skip_all, fields(input = %input.display(), output = %output.display()))]
pub fn aggregate(input: &Path, output: &Path) -> Result<AggregationSummary> {
    if !input.is_file() {
        return Err(PipelineError::MissingArtifact(input.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(input)?;
    let columns = CanonicalColumns::locate(reader.byte_headers()?);
    let mut aggregator = Aggregator::new();
    let mut irregular_rows = 0;
    for record in reader.byte_records() {
        let record = match record {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e.into()),
            Err(e) => {
                warn!("unreadable canonical row skipped: {}", e);
                irregular_rows += 1;
                continue;
            }
        };
        let (row, irregular) = CanonicalRow::from_record(&record, &columns);
        if irregular {
            irregular_rows += 1;
        }
        aggregator.push(&ValidatedRecord::from_row(row));
    }
    let (buckets, mut summary) = aggregator.finish();
    summary.irregular_rows = irregular_rows;
    debug!("{} rows grouped into {} buckets", summary.rows_read, buckets.len());

    write_csv_atomic(output, &AGGREGATED_HEADER, &buckets)?;
    summary.path = output.to_path_buf();

    info!(
        rows = summary.rows_read,
        buckets = summary.buckets,
        invalid_identifiers = summary.invalid_identifiers,
        irregular_rows = summary.irregular_rows,
        "aggregate table written"
    );
    Ok(summary)
}
