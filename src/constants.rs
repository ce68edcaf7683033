//! Constants shared across the ingestion and aggregation stages

use crate::types::{QuarterCode, QuarterReference};

/// Root of the regulator's open-data file repository
pub const DEFAULT_BASE_URL: &str = "https://dadosabertos.ans.gov.br/FTP/PDA/";

pub const DEFAULT_RAW_DIR: &str = "data/raw";
pub const DEFAULT_PROCESSED_DIR: &str = "data/processed";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_CONFIG_FILE: &str = "ans_ingest.toml";

pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_YEARS_TO_SCAN: usize = 2;
pub const DEFAULT_QUARTERS_TO_TAKE: usize = 3;
pub const DEFAULT_MAX_EXTRACTED_BYTES: u64 = 4 * 1024 * 1024 * 1024;

// Artifact file names inside the processed directory
pub const CONSOLIDATED_FILE: &str = "consolidado_despesas.csv";
pub const AGGREGATED_FILE: &str = "despesas_agregadas.csv";
pub const LOCK_FILE: &str = ".ans_ingest.lock";
pub const REPORTS_DIR: &str = "reports";

/// Placeholder provider name for files without a name column
pub const MISSING_NAME: &str = "N/A";

/// Canonical table header, in column order
pub const CONSOLIDATED_HEADER: [&str; 5] = ["CNPJ", "ValorDespesas", "RazaoSocial", "Trimestre", "Ano"];

/// Aggregate table header, in column order
pub const AGGREGATED_HEADER: [&str; 7] = [
    "RazaoSocial",
    "Ano",
    "Trimestre",
    "Total",
    "Media",
    "DesvioPadrao",
    "Qtd",
];

/// Quarters processed when live discovery is unavailable
pub fn fallback_quarters() -> Vec<QuarterReference> {
    vec![
        QuarterReference::new(2024, QuarterCode::Q3),
        QuarterReference::new(2024, QuarterCode::Q2),
        QuarterReference::new(2024, QuarterCode::Q1),
    ]
}
