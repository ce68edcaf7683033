use super::artifact::write_csv_atomic;
use crate::constants::CONSOLIDATED_HEADER;
use crate::error::{PipelineError, Result};
use crate::types::NormalizedTable;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsolidationSummary {
    pub path: PathBuf,
    pub tables: usize,
    pub rows: usize,
}

/// Concatenates the per-file tables, in the order given, into the canonical
/// artifact at `output`.
///
/// With no tables at all nothing is written and `NothingToConsolidate` is
/// returned; a previous artifact at `output` is left untouched.
#[instrument(skip(tables), fields(tables = tables.len()))]
pub fn consolidate(tables: &[NormalizedTable], output: &Path) -> Result<ConsolidationSummary> {
    if tables.is_empty() {
        return Err(PipelineError::NothingToConsolidate);
    }

    let records = tables.iter().flat_map(|t| t.records.iter());
    let rows = write_csv_atomic(output, &CONSOLIDATED_HEADER, records)?;

    info!("wrote {} rows from {} tables to {}", rows, tables.len(), output.display());
    Ok(ConsolidationSummary {
        path: output.to_path_buf(),
        tables: tables.len(),
        rows,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NormalizedExpenseRecord, QuarterCode, QuarterReference};
    use std::fs;
    use tempfile::tempdir;

    fn table(name: &str, rows: &[(&str, Option<f64>, &str)]) -> NormalizedTable {
        NormalizedTable {
            source: PathBuf::from(name),
            quarter: QuarterReference::new(2024, QuarterCode::Q1),
            records: rows
                .iter()
                .map(|(cnpj, valor, nome)| NormalizedExpenseRecord {
                    cnpj: cnpj.to_string(),
                    valor_despesas: *valor,
                    razao_social: nome.to_string(),
                    trimestre: "1T".to_string(),
                    ano: "2024".to_string(),
                })
                .collect(),
        }
    }

    fn sorted_lines(path: &Path) -> Vec<String> {
        let mut lines: Vec<String> = fs::read_to_string(path).unwrap().lines().skip(1).map(String::from).collect();
        lines.sort();
        lines
    }

    #[test]
    fn test_no_tables_writes_nothing() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("consolidado_despesas.csv");
        let result = consolidate(&[], &output);
        assert!(matches!(result, Err(PipelineError::NothingToConsolidate)));
        assert!(!output.exists());
    }

    #[test]
    fn test_writes_canonical_columns() {
        let dir = tempdir().unwrap();
        let output = dir.path().join("out.csv");
        let tables = vec![
            table("a.csv", &[("11222333000181", Some(10.5), "Operadora A")]),
            table("b.csv", &[("123", None, "N/A")]),
        ];

        let summary = consolidate(&tables, &output).unwrap();
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.tables, 2);
        let content = fs::read_to_string(&output).unwrap();
        assert_eq!(
            content,
            "CNPJ,ValorDespesas,RazaoSocial,Trimestre,Ano\n\
             11222333000181,10.5,Operadora A,1T,2024\n\
             123,,N/A,1T,2024\n"
        );
    }

    #[test]
    fn test_same_rows_regardless_of_table_order() {
        let dir = tempdir().unwrap();
        let a = table("a.csv", &[("1", Some(1.0), "A"), ("2", Some(2.0), "B")]);
        let b = table("b.csv", &[("3", Some(3.0), "C")]);

        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        consolidate(&[a.clone(), b.clone()], &first).unwrap();
        consolidate(&[b, a], &second).unwrap();
        assert_eq!(sorted_lines(&first), sorted_lines(&second));
    }
}
