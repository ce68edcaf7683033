use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Quarter code as published by the regulator ("1T".."4T")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum QuarterCode {
    #[serde(rename = "1T")]
    Q1,
    #[serde(rename = "2T")]
    Q2,
    #[serde(rename = "3T")]
    Q3,
    #[serde(rename = "4T")]
    Q4,
}

impl QuarterCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuarterCode::Q1 => "1T",
            QuarterCode::Q2 => "2T",
            QuarterCode::Q3 => "3T",
            QuarterCode::Q4 => "4T",
        }
    }
}

impl FromStr for QuarterCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1T" => Ok(QuarterCode::Q1),
            "2T" => Ok(QuarterCode::Q2),
            "3T" => Ok(QuarterCode::Q3),
            "4T" => Ok(QuarterCode::Q4),
            other => Err(format!("unknown quarter code '{other}'")),
        }
    }
}

impl fmt::Display for QuarterCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reporting period. Ordering is (year, quarter) ascending; sort with
/// `Reverse` or `.rev()` for most-recent-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QuarterReference {
    pub year: u16,
    pub quarter: QuarterCode,
}

impl QuarterReference {
    pub fn new(year: u16, quarter: QuarterCode) -> Self {
        Self { year, quarter }
    }

    /// Four-digit year as it appears in listings and artifacts
    pub fn year_str(&self) -> String {
        format!("{:04}", self.year)
    }
}

impl fmt::Display for QuarterReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}/{}", self.year, self.quarter)
    }
}

/// An archive saved to raw storage for one quarter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedArchive {
    pub path: PathBuf,
    pub quarter: QuarterReference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TabularFormat {
    Csv,
    Xlsx,
}

impl TabularFormat {
    /// Recognizes a tabular file by its extension, case-insensitively
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(TabularFormat::Csv),
            "xlsx" => Some(TabularFormat::Xlsx),
            _ => None,
        }
    }
}

/// A file pulled out of an archive, alive only while its extraction dir is
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTabularFile {
    pub path: PathBuf,
    pub format: TabularFormat,
}

/// One row of the canonical table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedExpenseRecord {
    #[serde(rename = "CNPJ")]
    pub cnpj: String,
    /// `None` when the source value could not be read as a number
    #[serde(rename = "ValorDespesas")]
    pub valor_despesas: Option<f64>,
    #[serde(rename = "RazaoSocial")]
    pub razao_social: String,
    #[serde(rename = "Trimestre")]
    pub trimestre: String,
    #[serde(rename = "Ano")]
    pub ano: String,
}

/// All rows mapped from one accepted source file
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub source: PathBuf,
    pub quarter: QuarterReference,
    pub records: Vec<NormalizedExpenseRecord>,
}

/// Statistics for one (RazaoSocial, Ano, Trimestre) group
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateBucket {
    #[serde(rename = "RazaoSocial")]
    pub razao_social: String,
    #[serde(rename = "Ano")]
    pub ano: String,
    #[serde(rename = "Trimestre")]
    pub trimestre: String,
    #[serde(rename = "Total")]
    pub total: f64,
    #[serde(rename = "Media")]
    pub media: f64,
    /// Sample standard deviation; undefined for a group of one row
    #[serde(rename = "DesvioPadrao")]
    pub desvio_padrao: Option<f64>,
    #[serde(rename = "Qtd")]
    pub qtd: u64,
}
