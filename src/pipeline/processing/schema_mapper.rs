//! Maps heterogeneous tabular files onto the canonical expense schema.
//!
//! Column roles are bound by [`MAPPING_RULES`]: each canonical field has an
//! ordered list of substrings tested against the upper-cased header. The
//! first pattern in that list that matches any column wins, and among the
//! columns matching that pattern the leftmost one is taken. So for the name
//! role a `RAZAO_SOCIAL` column beats a `NOME_FANTASIA` column wherever the
//! two sit in the file. Roles are bound independently of one another.

use crate::constants::MISSING_NAME;
use crate::error::MappingError;
use crate::types::{NormalizedExpenseRecord, NormalizedTable, QuarterReference, RawTabularFile, TabularFormat};
use calamine::{open_workbook, Data, Reader, Xlsx};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::fs;
use std::path::Path;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    Identifier,
    Name,
    Value,
}

#[derive(Debug, Clone, Copy)]
pub struct MappingRule {
    pub role: ColumnRole,
    /// Substrings in priority order
    pub patterns: &'static [&'static str],
}

pub const MAPPING_RULES: [MappingRule; 3] = [
    MappingRule {
        role: ColumnRole::Identifier,
        patterns: &["CNPJ"],
    },
    MappingRule {
        role: ColumnRole::Name,
        patterns: &["RAZAO", "NOME"],
    },
    MappingRule {
        role: ColumnRole::Value,
        patterns: &["VALOR", "DESPESA"],
    },
];

/// Column indexes chosen for each canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnBinding {
    pub identifier: usize,
    pub name: Option<usize>,
    pub value: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    EmptyFile,
    MissingIdentifierColumn,
    MissingValueColumn,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyFile => f.write_str("file has no header row"),
            SkipReason::MissingIdentifierColumn => f.write_str("no column matches the CNPJ rule"),
            SkipReason::MissingValueColumn => f.write_str("no column matches the VALOR/DESPESA rule"),
        }
    }
}

/// A value cell that could not be read as a number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedValue {
    /// Zero-based data row, header excluded
    pub row: usize,
    pub raw: String,
}

#[derive(Debug)]
pub struct MappedFile {
    pub table: NormalizedTable,
    pub binding: ColumnBinding,
    pub malformed: Vec<MalformedValue>,
}

/// Result of mapping one file: a table, a skip, or a decode failure
#[derive(Debug)]
pub enum FileOutcome {
    Mapped(MappedFile),
    Skipped(SkipReason),
    Failed(MappingError),
}

/// Decoded header and rows, cells as text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

/// Maps one extracted file into zero or one normalized tables tagged with `quarter`.
#[instrument(skip(file), fields(file = %file.path.display(), quarter = %quarter))]
pub fn map_file(file: &RawTabularFile, quarter: QuarterReference) -> FileOutcome {
    let table = match read_table(file) {
        Ok(t) => t,
        Err(e) => return FileOutcome::Failed(e),
    };
    match map_table(&table, &file.path, quarter) {
        Ok(mapped) => {
            info!(
                "mapped {} rows ({} malformed values)",
                mapped.table.records.len(),
                mapped.malformed.len()
            );
            FileOutcome::Mapped(mapped)
        }
        Err(reason) => {
            debug!("skipping file: {}", reason);
            FileOutcome::Skipped(reason)
        }
    }
}

pub fn map_table(table: &Table, source: &Path, quarter: QuarterReference) -> Result<MappedFile, SkipReason> {
    if table.headers.is_empty() {
        return Err(SkipReason::EmptyFile);
    }
    let headers: Vec<String> = table.headers.iter().map(|h| h.trim().to_uppercase()).collect();
    let binding = bind_columns(&headers)?;

    let ano = quarter.year_str();
    let trimestre = quarter.quarter.as_str().to_string();
    let mut records = Vec::with_capacity(table.rows.len());
    let mut malformed = Vec::new();

    for (i, row) in table.rows.iter().enumerate() {
        let cell = |idx: usize| row.get(idx).map(|c| c.trim()).unwrap_or("");

        let raw_value = cell(binding.value);
        let valor_despesas = parse_amount(raw_value);
        if valor_despesas.is_none() {
            malformed.push(MalformedValue {
                row: i,
                raw: raw_value.to_string(),
            });
        }

        records.push(NormalizedExpenseRecord {
            cnpj: cell(binding.identifier).to_string(),
            valor_despesas,
            razao_social: match binding.name {
                Some(idx) => cell(idx).to_string(),
                None => MISSING_NAME.to_string(),
            },
            trimestre: trimestre.clone(),
            ano: ano.clone(),
        });
    }

    Ok(MappedFile {
        table: NormalizedTable {
            source: source.to_path_buf(),
            quarter,
            records,
        },
        binding,
        malformed,
    })
}

/// Binds each role per [`MAPPING_RULES`]. Headers must already be upper-cased.
pub fn bind_columns(headers: &[String]) -> Result<ColumnBinding, SkipReason> {
    let find = |role: ColumnRole| {
        MAPPING_RULES
            .iter()
            .filter(|rule| rule.role == role)
            .flat_map(|rule| rule.patterns.iter())
            .find_map(|pattern| headers.iter().position(|h| h.contains(pattern)))
    };

    let identifier = find(ColumnRole::Identifier).ok_or(SkipReason::MissingIdentifierColumn)?;
    let value = find(ColumnRole::Value).ok_or(SkipReason::MissingValueColumn)?;
    Ok(ColumnBinding {
        identifier,
        name: find(ColumnRole::Name),
        value,
    })
}

/// `1.234,56`: dots group thousands, a single comma marks the decimals
static GROUPED_DECIMAL_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[+-]?\d{1,3}(\.\d{3})+,\d+$").unwrap());

/// Parses `1234.56`, `1234,56` and `1.234,56`. Any other shape, including
/// `1,234.56`, is `None`, as is empty or non-finite input.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let normalized = match (raw.contains('.'), raw.contains(',')) {
        (true, true) if GROUPED_DECIMAL_COMMA.is_match(raw) => raw.replace('.', "").replace(',', "."),
        (true, true) => return None,
        (false, true) => raw.replace(',', "."),
        _ => raw.to_string(),
    };
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn read_table(file: &RawTabularFile) -> Result<Table, MappingError> {
    match file.format {
        TabularFormat::Csv => read_csv(&file.path),
        TabularFormat::Xlsx => read_xlsx(&file.path),
    }
}

/// Reads a `;`-delimited ISO-8859-1 text table
pub fn read_csv(path: &Path) -> Result<Table, MappingError> {
    let bytes = fs::read(path)?;
    parse_csv(&decode_latin1(&bytes))
}

fn parse_csv(text: &str) -> Result<Table, MappingError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .flexible(true)
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table { headers, rows })
}

/// ISO-8859-1 maps every byte straight onto the first 256 code points
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

/// Reads the first worksheet, first row as header
pub fn read_xlsx(path: &Path) -> Result<Table, MappingError> {
    let mut workbook: Xlsx<_> = open_workbook(path)?;
    let range = workbook.worksheet_range_at(0).ok_or(MappingError::NoWorksheet)??;

    let mut rows = range
        .rows()
        .map(|r| r.iter().map(cell_text).collect::<Vec<_>>())
        .filter(|r| r.iter().any(|c| !c.is_empty()));
    let headers = rows.next().unwrap_or_default();
    Ok(Table {
        headers,
        rows: rows.collect(),
    })
}

fn cell_text(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        other => other.to_string(),
    }
}
