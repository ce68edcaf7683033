use super::listing;
use crate::app::ports::HttpClientPort;
use crate::constants::fallback_quarters;
use crate::error::FetchError;
use crate::types::QuarterReference;
use metrics::counter;
use serde::Serialize;
use tracing::{info, instrument, warn};

/// Where the discovered quarter list came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DiscoverySource {
    Live,
    /// Live discovery failed; `reason` says why
    Fallback { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryOutcome {
    /// Never empty, most recent first
    pub quarters: Vec<QuarterReference>,
    pub source: DiscoverySource,
}

impl DiscoveryOutcome {
    pub fn is_fallback(&self) -> bool {
        matches!(self.source, DiscoverySource::Fallback { .. })
    }
}

/// Enumerates the most recently published quarters under `base_url`.
///
/// Scans the `years_to_scan` newest year directories and returns the
/// `quarters_to_take` newest quarters among them. Any failure, or a listing
/// with no quarters at all, yields the fixed fallback list instead, marked
/// as such.
#[instrument(skip(http))]
pub async fn discover_quarters(
    http: &dyn HttpClientPort,
    base_url: &str,
    years_to_scan: usize,
    quarters_to_take: usize,
) -> DiscoveryOutcome {
    let reason = match list_quarters(http, base_url, years_to_scan).await {
        Ok(mut quarters) if !quarters.is_empty() => {
            quarters.truncate(quarters_to_take);
            info!("discovered {} quarters: {:?}", quarters.len(), quarters);
            return DiscoveryOutcome {
                quarters,
                source: DiscoverySource::Live,
            };
        }
        Ok(_) => "no quarters published in the scanned years".to_string(),
        Err(e) => e.to_string(),
    };

    warn!("quarter discovery failed, using fallback list: {}", reason);
    counter!("ans_discovery_fallback_total").increment(1);
    DiscoveryOutcome {
        quarters: fallback_quarters(),
        source: DiscoverySource::Fallback { reason },
    }
}

/// All quarters of the newest years, sorted most recent first
async fn list_quarters(
    http: &dyn HttpClientPort,
    base_url: &str,
    years_to_scan: usize,
) -> Result<Vec<QuarterReference>, FetchError> {
    let root = http.get(base_url).await?.error_for_status(base_url)?;
    let mut years = listing::year_links(&root.text());
    years.sort_unstable_by(|a, b| b.cmp(a));
    years.dedup();

    let mut quarters = Vec::new();
    for year in years.into_iter().take(years_to_scan) {
        let url = format!("{base_url}{year:04}/");
        let page = http.get(&url).await?.error_for_status(&url)?;
        quarters.extend(
            listing::quarter_links(&page.text())
                .into_iter()
                .map(|q| QuarterReference::new(year, q)),
        );
    }

    quarters.sort_unstable_by(|a, b| b.cmp(a));
    quarters.dedup();
    Ok(quarters)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::ingestion::tests::FakeHttp;
    use crate::types::QuarterCode;

    const BASE: &str = "http://ans.test/PDA/";

    fn q(year: u16, quarter: QuarterCode) -> QuarterReference {
        QuarterReference::new(year, quarter)
    }

    #[tokio::test]
    async fn test_takes_three_newest_from_two_newest_years() {
        let http = FakeHttp::new()
            .page(BASE, r#"<a href="2022/">x</a><a href="2024/">x</a><a href="2023/">x</a>"#)
            .page(&format!("{BASE}2024/"), r#"<a href="1T/">1T</a><a href="2T/">2T</a>"#)
            .page(
                &format!("{BASE}2023/"),
                r#"<a href="3T/">3T</a><a href="4T/">4T</a><a href="2T/">2T</a>"#,
            );

        let outcome = discover_quarters(&http, BASE, 2, 3).await;
        assert_eq!(outcome.source, DiscoverySource::Live);
        assert_eq!(
            outcome.quarters,
            vec![q(2024, QuarterCode::Q2), q(2024, QuarterCode::Q1), q(2023, QuarterCode::Q4)]
        );
        assert!(!http.requested(&format!("{BASE}2022/")));
    }

    #[tokio::test]
    async fn test_unreachable_host_uses_fallback() {
        let http = FakeHttp::new();
        let outcome = discover_quarters(&http, BASE, 2, 3).await;
        assert!(outcome.is_fallback());
        assert_eq!(outcome.quarters, fallback_quarters());
        assert_eq!(outcome.quarters.len(), 3);
    }

    #[tokio::test]
    async fn test_failed_year_listing_uses_fallback() {
        let http = FakeHttp::new()
            .page(BASE, r#"<a href="2024/">x</a>"#)
            .status(&format!("{BASE}2024/"), 503);
        let outcome = discover_quarters(&http, BASE, 2, 3).await;
        match outcome.source {
            DiscoverySource::Fallback { reason } => assert!(reason.contains("503")),
            DiscoverySource::Live => panic!("expected fallback"),
        }
    }

    #[tokio::test]
    async fn test_listing_without_quarters_uses_fallback() {
        let http = FakeHttp::new().page(BASE, "<html><body>maintenance</body></html>");
        let outcome = discover_quarters(&http, BASE, 2, 3).await;
        assert!(outcome.is_fallback());
        assert!(!outcome.quarters.is_empty());
    }
}
