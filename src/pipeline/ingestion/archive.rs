use crate::error::ExtractError;
use crate::types::{DownloadedArchive, RawTabularFile, TabularFormat};
use std::fs::{self, File};
use std::io;
use std::path::Path;
use tempfile::TempDir;
use tracing::{debug, info, instrument, warn};

/// Files unpacked from one archive.
///
/// Owns the extraction directory: dropping this value removes every
/// extracted file, whichever way the caller leaves its scope.
#[derive(Debug)]
pub struct ExtractedArchive {
    dir: TempDir,
    pub files: Vec<RawTabularFile>,
    /// Entries left out because of their extension or an unsafe path
    pub ignored_entries: Vec<String>,
}

impl ExtractedArchive {
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }
}

/// Unpacks `archive` into a fresh directory under `work_root` and returns
/// the entries recognized as tabular files.
///
/// Fails before writing anything if the archive's declared uncompressed
/// size exceeds `max_bytes`.
#[instrument(skip(archive, work_root), fields(archive = %archive.path.display(), quarter = %archive.quarter))]
pub fn extract(archive: &DownloadedArchive, work_root: &Path, max_bytes: u64) -> Result<ExtractedArchive, ExtractError> {
    let mut zip = zip::ZipArchive::new(File::open(&archive.path)?)?;

    let mut declared: u64 = 0;
    for i in 0..zip.len() {
        declared = declared.saturating_add(zip.by_index(i)?.size());
    }
    if declared > max_bytes {
        return Err(ExtractError::TooLarge {
            declared,
            limit: max_bytes,
        });
    }

    fs::create_dir_all(work_root)?;
    let dir = tempfile::Builder::new().prefix("extract-").tempdir_in(work_root)?;

    let mut files = Vec::new();
    let mut ignored_entries = Vec::new();
    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let Some(relative) = entry.enclosed_name().map(Path::to_path_buf) else {
            warn!("ignoring entry with unsafe path: {}", entry.name());
            ignored_entries.push(entry.name().to_string());
            continue;
        };
        let Some(format) = TabularFormat::from_path(&relative) else {
            debug!("ignoring non-tabular entry {}", relative.display());
            ignored_entries.push(entry.name().to_string());
            continue;
        };

        let target = dir.path().join(&relative);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
        files.push(RawTabularFile { path: target, format });
    }

    info!("extracted {} tabular files ({} entries ignored)", files.len(), ignored_entries.len());
    Ok(ExtractedArchive {
        dir,
        files,
        ignored_entries,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::types::{QuarterCode, QuarterReference};
    use std::io::{Cursor, Write};
    use tempfile::tempdir;
    use zip::write::FileOptions;

    /// Builds an in-memory zip from (entry name, contents) pairs
    pub(crate) fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, contents) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(contents.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    fn archive_at(path: &Path) -> DownloadedArchive {
        DownloadedArchive {
            path: path.to_path_buf(),
            quarter: QuarterReference::new(2024, QuarterCode::Q1),
        }
    }

    #[test]
    fn test_extracts_only_tabular_entries() {
        let root = tempdir().unwrap();
        let zip_path = root.path().join("a.zip");
        fs::write(
            &zip_path,
            zip_bytes(&[
                ("despesas.csv", "CNPJ;VALOR\n"),
                ("nested/planilha.XLSX", "xx"),
                ("leiame.txt", "hello"),
            ]),
        )
        .unwrap();

        let extracted = extract(&archive_at(&zip_path), root.path(), u64::MAX).unwrap();
        assert_eq!(extracted.files.len(), 2);
        assert_eq!(extracted.files[0].format, TabularFormat::Csv);
        assert_eq!(extracted.files[1].format, TabularFormat::Xlsx);
        assert!(extracted.files[1].path.ends_with("nested/planilha.XLSX"));
        assert_eq!(extracted.ignored_entries, vec!["leiame.txt".to_string()]);
        assert!(extracted.files.iter().all(|f| f.path.exists()));
    }

    #[test]
    fn test_extraction_dir_removed_on_drop() {
        let root = tempdir().unwrap();
        let zip_path = root.path().join("a.zip");
        fs::write(&zip_path, zip_bytes(&[("x.csv", "1")])).unwrap();

        let extracted = extract(&archive_at(&zip_path), root.path(), u64::MAX).unwrap();
        let dir = extracted.dir().to_path_buf();
        assert!(dir.exists());
        drop(extracted);
        assert!(!dir.exists());
    }

    #[test]
    fn test_each_archive_gets_its_own_dir() {
        let root = tempdir().unwrap();
        let a = root.path().join("a.zip");
        let b = root.path().join("b.zip");
        fs::write(&a, zip_bytes(&[("same.csv", "a")])).unwrap();
        fs::write(&b, zip_bytes(&[("same.csv", "b")])).unwrap();

        let first = extract(&archive_at(&a), root.path(), u64::MAX).unwrap();
        let second = extract(&archive_at(&b), root.path(), u64::MAX).unwrap();
        assert_ne!(first.dir(), second.dir());
        assert_eq!(fs::read(&first.files[0].path).unwrap(), b"a");
        assert_eq!(fs::read(&second.files[0].path).unwrap(), b"b");
    }

    #[test]
    fn test_oversized_archive_rejected() {
        let root = tempdir().unwrap();
        let zip_path = root.path().join("big.zip");
        let zeros = "0".repeat(1024);
        fs::write(&zip_path, zip_bytes(&[("x.csv", zeros.as_str())])).unwrap();

        let err = extract(&archive_at(&zip_path), root.path(), 100).unwrap_err();
        assert!(matches!(err, ExtractError::TooLarge { declared: 1024, limit: 100 }));
    }

    #[test]
    fn test_corrupt_archive_is_an_error() {
        let root = tempdir().unwrap();
        let zip_path = root.path().join("bad.zip");
        fs::write(&zip_path, b"<html>not found</html>").unwrap();
        assert!(matches!(
            extract(&archive_at(&zip_path), root.path(), u64::MAX),
            Err(ExtractError::Zip(_))
        ));
    }
}
