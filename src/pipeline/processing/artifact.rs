use crate::error::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Writes `header` and `rows` as UTF-8 CSV to a sibling temp file, then
/// renames it over `path`. Readers see the old artifact or the new one,
/// never a truncated file.
pub fn write_csv_atomic<T, I>(path: &Path, header: &[&str], rows: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = temp_path(path);
    let result = write_rows(&tmp, header, rows).and_then(|count| {
        fs::rename(&tmp, path)?;
        Ok(count)
    });
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn write_rows<T, I>(path: &Path, header: &[&str], rows: I) -> Result<usize>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(header)?;
    let mut count = 0;
    for row in rows {
        writer.serialize(row)?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[derive(Serialize)]
    struct Row {
        name: &'static str,
        value: Option<f64>,
    }

    #[test]
    fn test_writes_header_even_without_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let count = write_csv_atomic(&path, &["name", "value"], Vec::<Row>::new()).unwrap();
        assert_eq!(count, 0);
        assert_eq!(fs::read_to_string(&path).unwrap(), "name,value\n");
    }

    #[test]
    fn test_replaces_existing_artifact_and_cleans_temp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        fs::write(&path, "stale").unwrap();

        let rows = vec![Row { name: "a", value: Some(1.5) }, Row { name: "b", value: None }];
        write_csv_atomic(&path, &["name", "value"], rows).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "name,value\na,1.5\nb,\n");
        assert!(!temp_path(&path).exists());
    }
}
