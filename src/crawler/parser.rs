//! HTML field extraction for search result listings
//!
//! This module turns a listing page into candidate records:
//! - Result containers and their title, link, author line and snippet
//! - Citation counts, PDF links and DOIs
//! - The locator of the next listing page
//!
//! Extraction is best effort. A result that lacks a title is skipped; every
//! other missing field is left empty and validation happens later in
//! [`Record::from_candidate`](crate::state::Record::from_candidate).

use crate::state::CandidateRecord;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::sync::LazyLock;
use url::Url;

#[allow(clippy::expect_used)]
static TITLE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(?:PDF|HTML|CITATION|BOOK|B|C)\]").expect("title marker regex is valid")
});

#[allow(clippy::expect_used)]
static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("year regex is valid"));

#[allow(clippy::expect_used)]
static CITED_BY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Cited by (\d+)").expect("citation regex is valid"));

#[allow(clippy::expect_used)]
static DOI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"10\.\d{4,}/[^\s]+").expect("DOI regex is valid"));

/// Everything an extractor found on one page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedPage {
    /// Result items in page order, not yet validated
    pub candidates: Vec<CandidateRecord>,

    /// Absolute URL of the next listing page, if the page links to one
    pub next_page: Option<String>,
}

/// Turns listing page bodies into candidate records
pub trait FieldExtractor: Send + Sync {
    /// Extracts candidates and the next-page locator from a page body
    ///
    /// # Arguments
    ///
    /// * `body` - The page body as text
    /// * `page_url` - URL the body was fetched from, for resolving relative links
    fn extract(&self, body: &str, page_url: &str) -> ExtractedPage;

    /// Names the page after `page_url` without fetching it
    ///
    /// Used to skip past a page that could not be fetched. The default cannot
    /// predict successors.
    fn successor(&self, _page_url: &str) -> Option<String> {
        None
    }
}

/// Extractor for Google Scholar style result listings
#[derive(Debug, Clone)]
pub struct ScholarExtractor {
    page_size: u32,
}

impl Default for ScholarExtractor {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

impl ScholarExtractor {
    /// Creates an extractor for listings with `page_size` results per page
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }
}

impl FieldExtractor for ScholarExtractor {
    fn extract(&self, body: &str, page_url: &str) -> ExtractedPage {
        let document = Html::parse_document(body);
        let base = Url::parse(page_url).ok();

        let mut containers = select_all(&document, "div.gs_ri");
        if containers.is_empty() {
            containers = select_all(&document, "div.gs_r");
        }
        tracing::debug!("Found {} result containers on {}", containers.len(), page_url);

        let candidates = containers
            .into_iter()
            .filter_map(|result| extract_result(result, base.as_ref()))
            .collect();

        ExtractedPage {
            candidates,
            next_page: base.as_ref().and_then(|b| find_next_page(&document, b)),
        }
    }

    fn successor(&self, page_url: &str) -> Option<String> {
        let url = Url::parse(page_url).ok()?;
        let start = start_offset(&url);
        Some(with_start(&url, start + u64::from(self.page_size)).to_string())
    }
}

/// Builds the first listing URL for a keyword query
///
/// # Arguments
///
/// * `base_url` - Site root, e.g. `https://scholar.google.com`
/// * `query` - Search terms
/// * `year_from` / `year_to` - Optional publication year bounds
///
/// # Returns
///
/// * `Ok(String)` - The seed URL
/// * `Err(url::ParseError)` - `base_url` is not a valid URL
pub fn build_search_url(
    base_url: &str,
    query: &str,
    year_from: Option<u16>,
    year_to: Option<u16>,
) -> Result<String, url::ParseError> {
    let mut url = Url::parse(base_url)?.join("/scholar")?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("q", query);
        pairs.append_pair("hl", "en");
        pairs.append_pair("as_sdt", "0,5");
        if let Some(year) = year_from {
            pairs.append_pair("as_ylo", &year.to_string());
        }
        if let Some(year) = year_to {
            pairs.append_pair("as_yhi", &year.to_string());
        }
    }
    Ok(url.to_string())
}

fn select_all<'a>(document: &'a Html, css: &str) -> Vec<ElementRef<'a>> {
    match Selector::parse(css) {
        Ok(selector) => document.select(&selector).collect(),
        Err(_) => Vec::new(),
    }
}

fn select_first<'a>(element: ElementRef<'a>, css: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(css).ok()?;
    element.select(&selector).next()
}

fn text_of(element: ElementRef<'_>) -> String {
    let raw: String = element.text().collect();
    collapse_whitespace(&raw.replace('\u{a0}', " "))
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve(href: &str, base: Option<&Url>) -> String {
    match base.and_then(|b| b.join(href).ok()) {
        Some(url) => url.to_string(),
        None => href.to_string(),
    }
}

/// The wider result block around a `gs_ri` container, where side links live
fn outer_container(result: ElementRef<'_>) -> Option<ElementRef<'_>> {
    result
        .parent()
        .and_then(ElementRef::wrap)
        .filter(|parent| parent.value().classes().any(|c| c == "gs_r"))
}

fn extract_result(result: ElementRef<'_>, base: Option<&Url>) -> Option<CandidateRecord> {
    let heading = select_first(result, "h3.gs_rt")?;
    let title = collapse_whitespace(&TITLE_MARKER.replace_all(&text_of(heading), ""));
    if title.is_empty() {
        tracing::debug!("Skipping result without a title");
        return None;
    }

    let title_link = select_first(heading, "a").and_then(|a| a.value().attr("href"));
    let url = title_link.map(|href| resolve(href, base)).unwrap_or_default();

    let (authors, venue, year) = select_first(result, "div.gs_a")
        .map(|meta| parse_author_line(&text_of(meta)))
        .unwrap_or_default();

    let abstract_text = select_first(result, "div.gs_rs")
        .map(text_of)
        .unwrap_or_default();

    let outer = outer_container(result);
    let citations = citation_count(result)
        .or_else(|| outer.and_then(citation_count))
        .unwrap_or(0);

    let pdf_url = pdf_link(result, base)
        .or_else(|| outer.and_then(|o| pdf_link(o, base)))
        .or_else(|| {
            title_link
                .filter(|href| href.to_lowercase().contains(".pdf"))
                .map(|href| resolve(href, base))
        });

    let doi = find_doi(&url).or_else(|| find_doi(&abstract_text));

    Some(CandidateRecord {
        title,
        authors,
        year,
        venue,
        abstract_text,
        citations,
        url,
        pdf_url,
        doi,
        bibtex: None,
    })
}

/// Splits an author line of the form `Authors - Venue, Year - Publisher`
fn parse_author_line(line: &str) -> (Vec<String>, String, Option<i32>) {
    let mut parts = line.split(" - ");

    let authors = parts
        .next()
        .map(|names| {
            names
                .split(',')
                .flat_map(|chunk| chunk.split(" and "))
                .map(str::trim)
                .filter(|a| !a.is_empty() && *a != "…" && *a != "...")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let (venue, year) = match parts.next() {
        Some(venue_year) => match YEAR.find(venue_year) {
            Some(m) => {
                let venue = venue_year
                    .replacen(m.as_str(), "", 1)
                    .trim_matches(|c: char| c == ',' || c.is_whitespace())
                    .to_string();
                (venue, m.as_str().parse().ok())
            }
            None => (venue_year.trim().to_string(), None),
        },
        None => (String::new(), None),
    };

    (authors, venue, year)
}

fn citation_count(container: ElementRef<'_>) -> Option<u32> {
    let selector = Selector::parse("a").ok()?;
    container.select(&selector).find_map(|a| {
        let text = text_of(a);
        CITED_BY
            .captures(&text)
            .and_then(|caps| caps.get(1))
            .and_then(|n| n.as_str().parse().ok())
    })
}

fn pdf_link(container: ElementRef<'_>, base: Option<&Url>) -> Option<String> {
    let link = select_first(container, "div.gs_or_ggsm a")
        .or_else(|| select_first(container, "div.gs_ggsd a"))?;
    let href = link.value().attr("href")?;

    let label = text_of(link);
    if href.to_lowercase().contains(".pdf") || label.starts_with("[PDF]") {
        Some(resolve(href, base))
    } else {
        None
    }
}

fn find_doi(text: &str) -> Option<String> {
    DOI.find(text).map(|m| m.as_str().to_string())
}

fn start_offset(url: &Url) -> u64 {
    url.query_pairs()
        .find(|(k, _)| k == "start")
        .and_then(|(_, v)| v.parse().ok())
        .unwrap_or(0)
}

fn with_start(url: &Url, start: u64) -> Url {
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != "start")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut next = url.clone();
    {
        let mut query = next.query_pairs_mut();
        query.clear();
        for (k, v) in &pairs {
            query.append_pair(k, v);
        }
        query.append_pair("start", &start.to_string());
    }
    next
}

/// Finds the next listing page
///
/// Prefers a navigation anchor labelled "Next". Otherwise the last anchor of
/// the navigation bar is used, but only if it moves forward in the listing.
fn find_next_page(document: &Html, page_url: &Url) -> Option<String> {
    let nav_links = select_all(document, "#gs_n a, #gs_nm a");

    let labelled = nav_links
        .iter()
        .find(|a| text_of(**a).contains("Next"))
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| page_url.join(href).ok());

    let next = labelled.or_else(|| {
        select_all(document, "#gs_n a")
            .last()
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| page_url.join(href).ok())
            .filter(|candidate| start_offset(candidate) > start_offset(page_url))
    })?;

    if next == *page_url {
        return None;
    }
    Some(next.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE_URL: &str = "https://scholar.example.com/scholar?q=graphs&hl=en";

    fn listing(results: &str, nav: &str) -> String {
        format!(
            r#"<html><body><div id="gs_res_ccl_mid">{}</div><div id="gs_n">{}</div></body></html>"#,
            results, nav
        )
    }

    const FULL_RESULT: &str = r#"
        <div class="gs_r gs_or gs_scl">
          <div class="gs_ggs gs_fl"><div class="gs_ggsd"><div class="gs_or_ggsm">
            <a href="https://files.example.org/graphs.pdf"><span class="gs_ctg2">[PDF]</span> example.org</a>
          </div></div></div>
          <div class="gs_ri">
            <h3 class="gs_rt"><span class="gs_ctu">[HTML]</span>
              <a href="https://doi.example.org/10.1145/3292500.3330701">Deep   learning on graphs</a></h3>
            <div class="gs_a">J Smith, A Jones, … - Journal of Graphs, 2019 - publisher.com</div>
            <div class="gs_rs">We survey methods for learning on graphs.</div>
            <div class="gs_fl"><a href="/scholar?cites=1">Cited by 42</a><a href="/related">Related articles</a></div>
          </div>
        </div>"#;

    #[test]
    fn test_extracts_full_result() {
        let page = ScholarExtractor::default().extract(&listing(FULL_RESULT, ""), PAGE_URL);
        assert_eq!(page.candidates.len(), 1);

        let c = &page.candidates[0];
        assert_eq!(c.title, "Deep learning on graphs");
        assert_eq!(c.authors, vec!["J Smith", "A Jones"]);
        assert_eq!(c.venue, "Journal of Graphs");
        assert_eq!(c.year, Some(2019));
        assert_eq!(c.abstract_text, "We survey methods for learning on graphs.");
        assert_eq!(c.citations, 42);
        assert_eq!(c.url, "https://doi.example.org/10.1145/3292500.3330701");
        assert_eq!(c.pdf_url.as_deref(), Some("https://files.example.org/graphs.pdf"));
        assert_eq!(c.doi.as_deref(), Some("10.1145/3292500.3330701"));
    }

    #[test]
    fn test_minimal_result() {
        let html = listing(
            r#"<div class="gs_ri"><h3 class="gs_rt">[CITATION] A citation only entry</h3></div>"#,
            "",
        );
        let page = ScholarExtractor::default().extract(&html, PAGE_URL);

        let c = &page.candidates[0];
        assert_eq!(c.title, "A citation only entry");
        assert!(c.url.is_empty());
        assert!(c.pdf_url.is_none());
        assert_eq!(c.citations, 0);
        assert_eq!(c.year, None);
    }

    #[test]
    fn test_skips_results_without_title() {
        let html = listing(
            r#"<div class="gs_ri"><div class="gs_a">Nobody - Nowhere, 2001</div></div>"#,
            "",
        );
        assert!(ScholarExtractor::default()
            .extract(&html, PAGE_URL)
            .candidates
            .is_empty());
    }

    #[test]
    fn test_pdf_title_link() {
        let html = listing(
            r#"<div class="gs_ri"><h3 class="gs_rt"><a href="/papers/x.PDF">X</a></h3></div>"#,
            "",
        );
        let page = ScholarExtractor::default().extract(&html, PAGE_URL);
        assert_eq!(
            page.candidates[0].pdf_url.as_deref(),
            Some("https://scholar.example.com/papers/x.PDF")
        );
    }

    #[test]
    fn test_next_link_by_label() {
        let html = listing(
            FULL_RESULT,
            r#"<a href="/scholar?start=0&q=graphs">1</a><a href="/scholar?start=10&q=graphs"><b>Next</b></a>"#,
        );
        let page = ScholarExtractor::default().extract(&html, PAGE_URL);
        assert_eq!(
            page.next_page.as_deref(),
            Some("https://scholar.example.com/scholar?start=10&q=graphs")
        );
    }

    #[test]
    fn test_last_nav_link_must_move_forward() {
        let current = "https://scholar.example.com/scholar?q=graphs&start=20";
        let html = listing(
            FULL_RESULT,
            r#"<a href="/scholar?q=graphs&start=0">1</a><a href="/scholar?q=graphs&start=10">2</a>"#,
        );
        let page = ScholarExtractor::default().extract(&html, current);
        assert!(page.next_page.is_none());
    }

    #[test]
    fn test_no_navigation_means_last_page() {
        let page = ScholarExtractor::default().extract(&listing(FULL_RESULT, ""), PAGE_URL);
        assert!(page.next_page.is_none());
    }

    #[test]
    fn test_successor_increments_start() {
        let extractor = ScholarExtractor::new(10);
        let first = extractor.successor(PAGE_URL).unwrap();
        assert!(first.contains("start=10"));
        assert!(first.contains("q=graphs"));

        let second = extractor.successor(&first).unwrap();
        assert!(second.contains("start=20"));
        assert!(!second.contains("start=10"));
    }

    #[test]
    fn test_parse_author_line_without_year() {
        let (authors, venue, year) = parse_author_line("A Author and B Writer - Some Venue");
        assert_eq!(authors, vec!["A Author", "B Writer"]);
        assert_eq!(venue, "Some Venue");
        assert_eq!(year, None);
    }

    #[test]
    fn test_build_search_url() {
        let url = build_search_url(
            "https://scholar.google.com",
            "graph neural networks",
            Some(2018),
            Some(2020),
        )
        .unwrap();
        assert!(url.starts_with("https://scholar.google.com/scholar?q=graph+neural+networks"));
        assert!(url.contains("hl=en"));
        assert!(url.contains("as_ylo=2018"));
        assert!(url.contains("as_yhi=2020"));
    }

    #[test]
    fn test_build_search_url_rejects_bad_base() {
        assert!(build_search_url("not a url", "x", None, None).is_err());
    }
}
