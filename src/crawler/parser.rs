//! HTML extraction into structured page records
//!
//! This module turns fetched HTML into a [`PageRecord`]:
//! - Page title
//! - Paragraph text
//! - Headings by level
//! - Same-host links, images and tables

use crate::state::{ImageRef, PageRecord};
use chrono::Utc;
use scraper::{ElementRef, Html, Selector};
use std::collections::{BTreeMap, HashSet};
use url::Url;

/// Turns HTML into a structured record
///
/// Returning `None` means the page held nothing usable; the worker reports
/// that as a validation failure.
pub trait Extractor: Send + Sync {
    fn extract(&self, html: &str, url: &Url) -> Option<PageRecord>;
}

/// `Extractor` built on CSS selectors
///
/// # Example
///
/// ```
/// use scrapeflow::crawler::{Extractor, HtmlExtractor};
/// use url::Url;
///
/// let html = r#"<html><head><title>Test</title></head><body><p>Hello</p></body></html>"#;
/// let url = Url::parse("https://example.com/").unwrap();
/// let record = HtmlExtractor.extract(html, &url).unwrap();
/// assert_eq!(record.title, "Test");
/// assert_eq!(record.text_content, "Hello");
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlExtractor;

impl HtmlExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl Extractor for HtmlExtractor {
    fn extract(&self, html: &str, url: &Url) -> Option<PageRecord> {
        let document = Html::parse_document(html);

        let record = PageRecord {
            url: url.to_string(),
            keyword: None,
            title: extract_title(&document).unwrap_or_default(),
            text_content: extract_paragraphs(&document),
            headings: extract_headings(&document),
            internal_links: extract_internal_links(&document, url),
            images: extract_images(&document, url),
            tables: extract_tables(&document),
            fetched_at: Utc::now(),
        };

        record.is_valid().then_some(record)
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn element_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Extracts the page title from the HTML document
fn extract_title(document: &Html) -> Option<String> {
    let title_selector = selector("title")?;

    document
        .select(&title_selector)
        .next()
        .map(element_text)
        .filter(|s| !s.is_empty())
}

fn extract_paragraphs(document: &Html) -> String {
    let Some(p) = selector("p") else {
        return String::new();
    };

    document
        .select(&p)
        .map(element_text)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn extract_headings(document: &Html) -> BTreeMap<String, Vec<String>> {
    let mut headings = BTreeMap::new();

    for level in 1..=6 {
        let tag = format!("h{level}");
        let Some(heading) = selector(&tag) else {
            continue;
        };
        let texts: Vec<String> = document
            .select(&heading)
            .map(element_text)
            .filter(|text| !text.is_empty())
            .collect();
        if !texts.is_empty() {
            headings.insert(tag, texts);
        }
    }

    headings
}

/// Links on the same host as the page, de-duplicated in document order
fn extract_internal_links(document: &Html, base_url: &Url) -> Vec<String> {
    let host = base_url.host_str();
    let mut seen = HashSet::new();

    extract_links(document, base_url)
        .into_iter()
        .filter(|link| {
            Url::parse(link)
                .map(|url| url.host_str() == host)
                .unwrap_or(false)
        })
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

fn extract_images(document: &Html, base_url: &Url) -> Vec<ImageRef> {
    let Some(img) = selector("img[src]") else {
        return Vec::new();
    };

    document
        .select(&img)
        .filter_map(|element| {
            let src = element.value().attr("src")?;
            let src = base_url.join(src.trim()).ok()?;
            Some(ImageRef {
                src: src.to_string(),
                alt: element.value().attr("alt").unwrap_or("").trim().to_string(),
            })
        })
        .collect()
}

fn extract_tables(document: &Html) -> Vec<Vec<String>> {
    let (Some(table), Some(row), Some(cell)) =
        (selector("table"), selector("tr"), selector("th, td"))
    else {
        return Vec::new();
    };

    document
        .select(&table)
        .map(|table| {
            table
                .select(&row)
                .map(|row| {
                    row.select(&cell)
                        .map(element_text)
                        .collect::<Vec<_>>()
                        .join(" | ")
                })
                .filter(|row| !row.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|rows| !rows.is_empty())
        .collect()
}

/// Extracts every followable http(s) link in the document, in order
///
/// # Link Extraction Rules
///
/// **Include:** `<a href="...">` tags, resolved against the page URL
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` links and data URIs
/// - Fragment-only links to the same page
pub fn extract_links(document: &Html, base_url: &Url) -> Vec<String> {
    let Some(a_selector) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&a_selector)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| element.value().attr("href"))
        .filter_map(|href| resolve_link(href, base_url))
        .collect()
}

/// Convenience wrapper around [`extract_links`] for raw HTML
pub fn extract_links_from_html(html: &str, base_url: &Url) -> Vec<String> {
    extract_links(&Html::parse_document(html), base_url)
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lower.starts_with(scheme))
    {
        return None;
    }

    let mut absolute_url = base_url.join(href).ok()?;
    if absolute_url.scheme() != "http" && absolute_url.scheme() != "https" {
        return None;
    }
    absolute_url.set_fragment(None);
    Some(absolute_url.to_string())
}
