//! The thirteen-stage per-URL pipeline: dedup check, robots check, fetch,
//! dedup-by-final-URL check, redirect robots re-check, parse, robots-meta
//! check, language gate, then metadata extraction (spec §4.4).
//!
//! Ported from `CrawlerThread._crawl_single_url` and its helpers. `scraper`
//! (the teacher's HTML crate) has no DOM mutation, so the `<style>`/`<script>`
//! removal stage runs as a regex pass over the raw text before parsing
//! instead of `Tag.decompose()`.

use std::collections::{BTreeMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};

use crate::config::CrawlerConfig;
use crate::error::ExtractError;
use crate::fetcher::{AllowedContentType, Fetcher};
use crate::page::PageRecord;
use crate::robots::{allowed_by_robots_meta_tag, RobotsCache};
use crate::url_wrapper::UrlWrapper;

/// `(quality, tag names)` pairs tried in order until one yields non-empty
/// text. Mirrors `CrawlerThread._CONTENT_SNIPPET_TRIES`.
const CONTENT_SNIPPET_TRIES: &[(f64, &[&str])] = &[
    (1.0, &["p"]),
    (0.75, &["b", "strong", "em"]),
    (0.4, &["i", "u", "big"]),
    (0.15, &["table"]),
    (0.1, &["span", "div"]),
    (0.05, &["body"]),
];

static STYLE_SCRIPT_TAGS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(style|script)\b[^>]*>.*?</\1>").expect("static regex is valid")
});

pub struct ExtractionOutcome {
    pub record: PageRecord,
    /// Links discovered on the page, already admitted through the
    /// per-webpage cap and (optionally) the robots cache-only precheck.
    pub links: Vec<String>,
}

/// Runs the full admission pipeline for one URL already popped off a crawl
/// queue. `crawled_urls` is the batch-start snapshot of canonical URLs
/// already on record (spec §5's open race is intentional: two workers may
/// both pass this check for the same URL within one batch).
#[allow(clippy::too_many_arguments)]
pub fn extract_page(
    original_url: &UrlWrapper,
    crawled_urls: &HashSet<String>,
    robots: &RobotsCache,
    fetcher: &Fetcher,
    config: &CrawlerConfig,
    crawl_timestamp: i64,
) -> Result<ExtractionOutcome, ExtractError> {
    if crawled_urls.contains(&original_url.canonical_url) {
        return Err(ExtractError::AlreadyCrawled);
    }

    check_robots_file(original_url, robots, fetcher, config)?;

    let fetched = fetcher.fetch(
        original_url,
        AllowedContentType::One("text/html"),
        config.max_page_fetch_size,
        config,
    )?;

    if original_url.url.as_str() != fetched.original_url.url.as_str() {
        return Err(ExtractError::FetchIntegrityMismatch);
    }

    if crawled_urls.contains(&fetched.final_url.canonical_url) {
        return Err(ExtractError::AlreadyCrawledFinal);
    }

    let original_netloc = (fetched.original_url.url.host_str(), fetched.original_url.url.port());
    let final_netloc = (fetched.final_url.url.host_str(), fetched.final_url.url.port());
    if original_netloc != final_netloc {
        check_robots_file(&fetched.final_url, robots, fetcher, config)?;
    }

    let stripped = STYLE_SCRIPT_TAGS.replace_all(&fetched.body, "");
    let document = Html::parse_document(&stripped);

    let robots_meta = meta_tag_contents(&document, "robots");
    if !allowed_by_robots_meta_tag(&robots_meta) {
        return Err(ExtractError::RobotsMetaDenied);
    }

    let language = check_and_get_page_language(&document, config)?;
    let title = get_page_title(&document);
    let headings = get_html_headings(&document, config);
    let description = meta_tag_contents(&document, "description");
    let keywords = meta_tag_contents(&document, "keywords");
    let author = meta_tag_contents(&document, "author");
    let (content_snippet, content_snippet_quality) =
        get_content_snippet(&document, config.page_content_snippet_max_length);
    let image_alts = get_image_alts(&document, config.page_image_alts_max_length);
    let (total_links_count, links, link_texts) =
        get_links(&document, &fetched.final_url, robots, fetcher, config);

    let record = PageRecord::new(
        fetched.original_url,
        fetched.final_url,
        crawl_timestamp,
        language,
        title,
        headings,
        description,
        keywords,
        author,
        content_snippet,
        content_snippet_quality,
        image_alts,
        link_texts,
        total_links_count,
        config,
    )?;

    Ok(ExtractionOutcome { record, links })
}

fn check_robots_file(
    url: &UrlWrapper,
    robots: &RobotsCache,
    fetcher: &Fetcher,
    config: &CrawlerConfig,
) -> Result<(), ExtractError> {
    if robots.allowed(url, false, config, fetcher) {
        Ok(())
    } else {
        Err(ExtractError::RobotsDenied)
    }
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn meta_tag_contents(document: &Html, name: &str) -> String {
    let sel = selector(&format!(r#"meta[name="{name}"]"#));
    document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

fn check_and_get_page_language(
    document: &Html,
    config: &CrawlerConfig,
) -> Result<String, ExtractError> {
    let sel = selector("html");
    let lang = document
        .select(&sel)
        .next()
        .and_then(|el| el.value().attr("lang"))
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    if lang.is_empty() {
        return Ok(lang);
    }

    if let Some(allowed) = &config.allowed_languages {
        let lowercase_lang = lang.to_ascii_lowercase();
        let matches = allowed
            .iter()
            .any(|checked| lowercase_lang.contains(&checked.to_ascii_lowercase()));
        if !matches {
            return Err(ExtractError::LanguageNotAllowed(lang));
        }
    }

    Ok(lang)
}

fn get_page_title(document: &Html) -> String {
    let sel = selector("title");
    document
        .select(&sel)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .unwrap_or_default()
}

fn get_html_headings(document: &Html, config: &CrawlerConfig) -> BTreeMap<String, Vec<String>> {
    let mut headings = BTreeMap::new();

    for level in 1..=config.page_html_heading_max_level {
        let level_name = format!("h{level}");
        let sel = selector(&level_name);

        let items: Vec<String> = document
            .select(&sel)
            .take(config.page_max_html_headings_per_level)
            .filter_map(|el| {
                let text = el.text().collect::<String>();
                let trimmed = text.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            })
            .collect();

        headings.insert(level_name, items);
    }

    headings
}

fn get_content_snippet(document: &Html, max_length: usize) -> (String, f64) {
    for (quality, tags) in CONTENT_SNIPPET_TRIES {
        let snippet = content_snippet_from_tags(document, tags, max_length);
        if !snippet.is_empty() {
            return (snippet, *quality);
        }
    }
    (String::new(), 0.0)
}

fn content_snippet_from_tags(document: &Html, tags: &[&str], max_length: usize) -> String {
    let css = tags.join(", ");
    let sel = selector(&css);

    let mut content_snippet = String::new();
    for el in document.select(&sel) {
        if content_snippet.len() >= max_length {
            break;
        }

        let text = el.text().collect::<String>();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }

        content_snippet.push_str(trimmed);
        content_snippet.push(' ');
    }

    content_snippet.trim().to_string()
}

fn get_image_alts(document: &Html, max_length: usize) -> String {
    let sel = selector("img");

    let mut image_alts = String::new();
    for el in document.select(&sel) {
        if image_alts.len() >= max_length {
            break;
        }

        let Some(alt) = el.value().attr("alt") else {
            continue;
        };
        let alt = alt.trim();
        if alt.is_empty() {
            continue;
        }

        image_alts.push_str(alt);
        image_alts.push(' ');
    }

    image_alts.trim().to_string()
}

fn get_links(
    document: &Html,
    current_page_url: &UrlWrapper,
    robots: &RobotsCache,
    fetcher: &Fetcher,
    config: &CrawlerConfig,
) -> (usize, Vec<String>, String) {
    let sel = selector("a[href]");

    let mut total_links_count = 0usize;
    let mut links = Vec::new();
    let mut link_texts = String::new();

    for el in document.select(&sel) {
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let href = href.trim();
        if href.is_empty() {
            continue;
        }

        let Ok(link_wrapper) = UrlWrapper::from_relative(&current_page_url.url, href, config)
        else {
            continue;
        };

        total_links_count += 1;

        if links.len() < config.page_max_crawled_links_per_webpage
            && (!config.precheck_robots_allowance_of_crawled_links
                || robots.allowed(&link_wrapper, true, config, fetcher))
        {
            links.push(link_wrapper.url.to_string());
        }

        if link_texts.len() < config.page_link_texts_max_length {
            let text = el.text().collect::<String>();
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                link_texts.push_str(trimmed);
                link_texts.push(' ');
            }
        }
    }

    (total_links_count, links, link_texts.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrawlerConfig {
        CrawlerConfig::default()
    }

    #[test]
    fn content_snippet_prefers_paragraphs_over_bold_text() {
        let html = "<html><body><p>First paragraph.</p><b>Bold text.</b></body></html>";
        let document = Html::parse_document(html);
        let (snippet, quality) = get_content_snippet(&document, 2250);
        assert_eq!(snippet, "First paragraph.");
        assert_eq!(quality, 1.0);
    }

    #[test]
    fn content_snippet_falls_back_down_the_ladder() {
        let html = "<html><body><table><tr><td>Table text.</td></tr></table></body></html>";
        let document = Html::parse_document(html);
        let (snippet, quality) = get_content_snippet(&document, 2250);
        assert_eq!(snippet, "Table text.");
        assert_eq!(quality, 0.15);
    }

    #[test]
    fn headings_are_capped_per_level_and_by_config_max_level() {
        let html = "<html><body><h1>A</h1><h1>B</h1><h1>C</h1><h5>Ignored</h5></body></html>";
        let document = Html::parse_document(html);
        let mut config = config();
        config.page_max_html_headings_per_level = 2;
        let headings = get_html_headings(&document, &config);
        assert_eq!(headings.get("h1").unwrap(), &vec!["A".to_string(), "B".to_string()]);
        assert!(!headings.contains_key("h5"));
    }

    #[test]
    fn language_outside_allow_list_is_rejected() {
        let html = r#"<html lang="de"><head></head><body></body></html>"#;
        let document = Html::parse_document(html);
        let err = check_and_get_page_language(&document, &config()).unwrap_err();
        assert!(matches!(err, ExtractError::LanguageNotAllowed(_)));
    }

    #[test]
    fn missing_lang_attribute_is_treated_as_unset_not_rejected() {
        let html = "<html><head></head><body></body></html>";
        let document = Html::parse_document(html);
        let lang = check_and_get_page_language(&document, &config()).unwrap();
        assert_eq!(lang, "");
    }

    #[test]
    fn links_are_resolved_against_the_final_url_and_deduped_by_count() {
        let html = r#"<html><body><a href="/a">A</a><a href="/b">B</a></body></html>"#;
        let document = Html::parse_document(html);
        let current = UrlWrapper::new("https://example.com/page", &config()).unwrap();
        let robots = RobotsCache::new();
        let fetcher = Fetcher::new(&config()).unwrap();
        let mut config = config();
        config.precheck_robots_allowance_of_crawled_links = false;

        let (total, links, _texts) = get_links(&document, &current, &robots, &fetcher, &config);
        assert_eq!(total, 2);
        assert_eq!(links.len(), 2);
    }

    #[test]
    fn script_and_style_text_is_excluded_from_extraction() {
        let html = "<html><body><style>.a{color:red}</style><script>evil()</script><p>Real content.</p></body></html>";
        let stripped = STYLE_SCRIPT_TAGS.replace_all(html, "");
        let document = Html::parse_document(&stripped);
        let (snippet, _) = get_content_snippet(&document, 2250);
        assert_eq!(snippet, "Real content.");
    }
}
