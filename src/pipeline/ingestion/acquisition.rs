use super::listing;
use crate::app::ports::HttpClientPort;
use crate::error::FetchError;
use crate::pipeline::report::{Diagnostic, DiagnosticKind, Stage};
use crate::types::{DownloadedArchive, QuarterReference};
use metrics::counter;
use reqwest::Url;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument, warn};

/// Archives fetched for one quarter and, if the quarter stopped early, why
#[derive(Debug, Default)]
pub struct AcquisitionOutcome {
    pub archives: Vec<DownloadedArchive>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Remote directory holding one quarter's archives
pub fn quarter_url(base_url: &str, quarter: &QuarterReference) -> String {
    format!("{base_url}{}/{}/", quarter.year_str(), quarter.quarter)
}

/// Deterministic local name, so a re-run overwrites instead of duplicating
pub fn local_archive_name(quarter: &QuarterReference, remote_name: &str) -> String {
    format!("{}_{}_{}", quarter.year_str(), quarter.quarter, remote_name)
}

/// Downloads every `.zip` listed for `quarter` into `raw_dir`.
///
/// Stops at the first failure (listing or download) and returns the archives
/// already saved, together with a diagnostic for the failure. No retries.
#[instrument(skip(http, raw_dir), fields(quarter = %quarter))]
pub async fn acquire_quarter(
    http: &dyn HttpClientPort,
    base_url: &str,
    quarter: QuarterReference,
    raw_dir: &Path,
) -> AcquisitionOutcome {
    let mut outcome = AcquisitionOutcome::default();
    let url = quarter_url(base_url, &quarter);

    let links = match list_archives(http, &url).await {
        Ok(links) => links,
        Err(e) => {
            warn!("failed to list {}: {}", url, e);
            outcome.diagnostics.push(
                Diagnostic::new(Stage::Acquisition, DiagnosticKind::TransientRemote, e.to_string())
                    .with_quarter(quarter),
            );
            return outcome;
        }
    };
    info!("{} archives listed", links.len());

    for href in links {
        match download_archive(http, &url, &href, &quarter, raw_dir).await {
            Ok(path) => {
                counter!("ans_archives_downloaded_total").increment(1);
                outcome.archives.push(DownloadedArchive { path, quarter });
            }
            Err(diagnostic) => {
                warn!("{}", diagnostic);
                counter!("ans_archive_download_failures_total").increment(1);
                outcome.diagnostics.push(diagnostic.with_quarter(quarter));
                break;
            }
        }
    }
    outcome
}

async fn list_archives(http: &dyn HttpClientPort, url: &str) -> Result<Vec<String>, FetchError> {
    let page = http.get(url).await?.error_for_status(url)?;
    Ok(listing::zip_links(&page.text()))
}

async fn download_archive(
    http: &dyn HttpClientPort,
    quarter_url: &str,
    href: &str,
    quarter: &QuarterReference,
    raw_dir: &Path,
) -> Result<PathBuf, Diagnostic> {
    let remote = |e: FetchError| Diagnostic::new(Stage::Acquisition, DiagnosticKind::TransientRemote, e.to_string());
    let local = |e: std::io::Error| Diagnostic::new(Stage::Acquisition, DiagnosticKind::LocalFailure, e.to_string());

    let url = Url::parse(quarter_url)
        .and_then(|base| base.join(href))
        .map_err(|_| remote(FetchError::Url(href.to_string())))?;
    // Saved under the decoded name, `Despesas%20T1.zip` as `Despesas T1.zip`
    let remote_name = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(|segment| urlencoding::decode(segment).ok())
        .map(|name| name.into_owned())
        .filter(|name| !name.is_empty() && name != ".." && !name.contains(|c: char| c == '/' || c == '\\'))
        .ok_or_else(|| remote(FetchError::Url(url.to_string())))?;

    let response = http
        .download(url.as_str())
        .await
        .and_then(|r| r.error_for_status(url.as_str()))
        .map_err(remote)?;

    fs::create_dir_all(raw_dir).map_err(local)?;
    let target = raw_dir.join(local_archive_name(quarter, &remote_name));
    let partial = target.with_extension("zip.part");
    if let Err(e) = fs::write(&partial, &response.bytes).and_then(|_| fs::rename(&partial, &target)) {
        let _ = fs::remove_file(&partial);
        return Err(local(e).with_file(&target));
    }

    info!("saved {} ({} bytes)", target.display(), response.bytes.len());
    Ok(target)
}
