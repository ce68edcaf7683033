//! Parsing of the repository's HTML directory listings.

use crate::types::QuarterCode;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

static ANCHOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static YEAR_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})/?$").unwrap());
static QUARTER_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([1-4]T)/?$").unwrap());

/// Every anchor target in the document, in document order
pub fn hrefs(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    document
        .select(&ANCHOR)
        .filter_map(|a| a.value().attr("href"))
        .map(|h| h.trim().to_string())
        .collect()
}

/// Years linked as bare `YYYY/` subdirectories
pub fn year_links(html: &str) -> Vec<u16> {
    hrefs(html)
        .iter()
        .filter_map(|h| YEAR_HREF.captures(h))
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Quarters linked as `1T/`..`4T/` subdirectories
pub fn quarter_links(html: &str) -> Vec<QuarterCode> {
    hrefs(html)
        .iter()
        .filter_map(|h| QUARTER_HREF.captures(h))
        .filter_map(|c| c[1].parse().ok())
        .collect()
}

/// Anchor targets naming a `.zip` file, case-insensitively
pub fn zip_links(html: &str) -> Vec<String> {
    hrefs(html)
        .into_iter()
        .filter(|h| h.to_ascii_lowercase().ends_with(".zip"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ROOT: &str = r#"<html><body><pre>
        <a href="../">Parent Directory</a>
        <a href="2023/">2023/</a>
        <a href="2024/">2024/</a>
        <a href="20245/">20245/</a>
        <a href="demonstracoes_contabeis/">demonstracoes_contabeis/</a>
        <a href="2022">2022</a>
        <a>no target</a>
    </pre></body></html>"#;

    #[test]
    fn test_year_links_only_bare_years() {
        assert_eq!(year_links(ROOT), vec![2023, 2024, 2022]);
    }

    #[test]
    fn test_quarter_links_reject_unknown_codes() {
        let html = r#"<a href="1T/">1T</a><a href="4T/">4T</a><a href="5T/">5T</a><a href="1T.zip">x</a>"#;
        assert_eq!(quarter_links(html), vec![QuarterCode::Q1, QuarterCode::Q4]);
    }

    #[test]
    fn test_zip_links() {
        let html = r#"<a href="../">up</a><a href="1T2024.zip">a</a><a href="LEIAME.ZIP">b</a><a href="x.csv">c</a>"#;
        assert_eq!(zip_links(html), vec!["1T2024.zip".to_string(), "LEIAME.ZIP".to_string()]);
    }

    #[test]
    fn test_malformed_html_yields_nothing() {
        assert!(year_links("<<<not html").is_empty());
        assert!(zip_links("").is_empty());
    }
}
