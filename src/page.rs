//! The immutable result of extracting one fetched page (spec §3, §4.4 step
//! 13). Ported field-for-field from `CrawledPage.py`: every text field is
//! whitespace-normalized and truncated to its field-specific maximum before
//! the final strip, and construction fails if the result doesn't carry a
//! title and a content snippet.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::CrawlerConfig;
use crate::error::PageRecordError;
use crate::url_wrapper::UrlWrapper;

const LANGUAGE_IDENTIFIER_MAX_LENGTH: usize = 10;

#[derive(Debug, Clone)]
pub struct PageRecord {
    pub original_url: UrlWrapper,
    pub final_url: UrlWrapper,
    pub was_redirected: bool,
    pub crawl_timestamp: i64,

    pub language: String,
    pub title: String,
    pub headings: BTreeMap<String, Vec<String>>,
    pub description: String,
    pub keywords: String,
    pub author: String,
    pub content_snippet: String,
    pub content_snippet_quality: f64,
    pub image_alts: String,
    pub link_texts: String,
    pub total_links_count: usize,
}

/// Row shape appended to `web_index.csv` (spec §6).
#[derive(Debug, Serialize)]
pub struct PageRecordRow {
    pub original_url: String,
    pub final_url: String,
    pub original_canonical_url: String,
    pub final_canonical_url: String,
    pub crawl_timestamp: i64,
    pub language: String,
    pub title: String,
    pub headings: BTreeMap<String, Vec<String>>,
    pub description: String,
    pub keywords: String,
    pub author: String,
    pub content_snippet: String,
    pub content_snippet_quality: f64,
    pub image_alts: String,
    pub link_texts: String,
    pub total_links_count: usize,
}

#[allow(clippy::too_many_arguments)]
impl PageRecord {
    pub fn new(
        original_url: UrlWrapper,
        final_url: UrlWrapper,
        crawl_timestamp: i64,
        language: String,
        title: String,
        headings: BTreeMap<String, Vec<String>>,
        description: String,
        keywords: String,
        author: String,
        content_snippet: String,
        content_snippet_quality: f64,
        image_alts: String,
        link_texts: String,
        total_links_count: usize,
        config: &CrawlerConfig,
    ) -> Result<Self, PageRecordError> {
        let was_redirected = original_url.url.as_str() != final_url.url.as_str();

        let language = clean_whitespace(&language);
        let title = unify_whitespace(title.trim())
            .chars()
            .take(config.page_title_max_length)
            .collect::<String>()
            .trim()
            .to_string();
        let headings = shorten_headings(headings, config);
        let description = unify_whitespace(description.trim())
            .chars()
            .take(config.page_description_max_length)
            .collect::<String>()
            .trim()
            .to_string();
        let keywords = unify_whitespace(&keywords)
            .chars()
            .take(config.page_keywords_max_length)
            .collect::<String>();
        let author = unify_whitespace(author.trim())
            .chars()
            .take(config.page_author_max_length)
            .collect::<String>()
            .trim()
            .to_string();
        let content_snippet = unify_whitespace(content_snippet.trim())
            .chars()
            .take(config.page_content_snippet_max_length)
            .collect::<String>()
            .trim()
            .to_string();
        let content_snippet_quality = content_snippet_quality.clamp(0.0, 1.0);
        let image_alts = unify_whitespace(image_alts.trim())
            .chars()
            .take(config.page_image_alts_max_length)
            .collect::<String>()
            .trim()
            .to_string();
        let link_texts = unify_whitespace(link_texts.trim())
            .chars()
            .take(config.page_link_texts_max_length)
            .collect::<String>()
            .trim()
            .to_string();

        let record = Self {
            original_url,
            final_url,
            was_redirected,
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
        };

        record.verify()?;
        Ok(record)
    }

    fn verify(&self) -> Result<(), PageRecordError> {
        if self.title.is_empty() {
            return Err(PageRecordError::EmptyTitle);
        }
        if self.content_snippet.is_empty() {
            return Err(PageRecordError::EmptyContentSnippet);
        }
        if self.language.chars().count() > LANGUAGE_IDENTIFIER_MAX_LENGTH {
            return Err(PageRecordError::LanguageTooLong(self.language.clone()));
        }
        Ok(())
    }

    pub fn to_row(&self) -> PageRecordRow {
        PageRecordRow {
            original_url: self.original_url.url.to_string(),
            final_url: self.final_url.url.to_string(),
            original_canonical_url: self.original_url.canonical_url.clone(),
            final_canonical_url: self.final_url.canonical_url.clone(),
            crawl_timestamp: self.crawl_timestamp,
            language: self.language.clone(),
            title: self.title.clone(),
            headings: self.headings.clone(),
            description: self.description.clone(),
            keywords: self.keywords.clone(),
            author: self.author.clone(),
            content_snippet: self.content_snippet.clone(),
            content_snippet_quality: self.content_snippet_quality,
            image_alts: self.image_alts.clone(),
            link_texts: self.link_texts.clone(),
            total_links_count: self.total_links_count,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.to_row())
    }
}

fn clean_whitespace(s: &str) -> String {
    s.chars().filter(|c| !c.is_whitespace()).collect()
}

fn unify_whitespace(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut prev_was_space = false;
    for c in s.chars() {
        if c.is_whitespace() {
            if !prev_was_space {
                result.push(' ');
            }
            prev_was_space = true;
        } else {
            result.push(c);
            prev_was_space = false;
        }
    }
    result
}

fn shorten_headings(
    headings: BTreeMap<String, Vec<String>>,
    config: &CrawlerConfig,
) -> BTreeMap<String, Vec<String>> {
    headings
        .into_iter()
        .take(config.page_html_heading_max_level)
        .map(|(level, items)| {
            let shortened = items
                .into_iter()
                .take(config.page_max_html_headings_per_level)
                .map(|heading| {
                    unify_whitespace(heading.trim())
                        .chars()
                        .take(config.page_html_heading_max_length)
                        .collect::<String>()
                        .trim()
                        .to_string()
                })
                .collect();
            (level, shortened)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CrawlerConfig {
        CrawlerConfig::default()
    }

    fn url(s: &str) -> UrlWrapper {
        UrlWrapper::new(s, &config()).unwrap()
    }

    #[test]
    fn rejects_empty_title() {
        let err = PageRecord::new(
            url("https://example.com/"),
            url("https://example.com/"),
            0,
            "en".into(),
            "".into(),
            BTreeMap::new(),
            "".into(),
            "".into(),
            "".into(),
            "some content".into(),
            1.0,
            "".into(),
            "".into(),
            0,
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, PageRecordError::EmptyTitle));
    }

    #[test]
    fn rejects_empty_content_snippet() {
        let err = PageRecord::new(
            url("https://example.com/"),
            url("https://example.com/"),
            0,
            "en".into(),
            "Title".into(),
            BTreeMap::new(),
            "".into(),
            "".into(),
            "".into(),
            "".into(),
            0.0,
            "".into(),
            "".into(),
            0,
            &config(),
        )
        .unwrap_err();
        assert!(matches!(err, PageRecordError::EmptyContentSnippet));
    }

    #[test]
    fn title_is_truncated_to_max_length() {
        let mut config = config();
        config.page_title_max_length = 5;
        let record = PageRecord::new(
            url("https://example.com/"),
            url("https://example.com/"),
            0,
            "en".into(),
            "abcdefghij".into(),
            BTreeMap::new(),
            "".into(),
            "".into(),
            "".into(),
            "content".into(),
            1.0,
            "".into(),
            "".into(),
            0,
            &config,
        )
        .unwrap();
        assert!(record.title.chars().count() <= 5);
    }

    #[test]
    fn quality_is_clamped_to_unit_interval() {
        let record = PageRecord::new(
            url("https://example.com/"),
            url("https://example.com/"),
            0,
            "en".into(),
            "Title".into(),
            BTreeMap::new(),
            "".into(),
            "".into(),
            "".into(),
            "content".into(),
            5.0,
            "".into(),
            "".into(),
            0,
            &config(),
        )
        .unwrap();
        assert_eq!(record.content_snippet_quality, 1.0);
    }

    #[test]
    fn was_redirected_compares_full_urls() {
        let record = PageRecord::new(
            url("https://example.com/a"),
            url("https://example.com/b"),
            0,
            "en".into(),
            "Title".into(),
            BTreeMap::new(),
            "".into(),
            "".into(),
            "".into(),
            "content".into(),
            1.0,
            "".into(),
            "".into(),
            0,
            &config(),
        )
        .unwrap();
        assert!(record.was_redirected);
    }

    #[test]
    fn json_round_trips_without_field_loss() {
        let record = PageRecord::new(
            url("https://example.com/"),
            url("https://example.com/"),
            42,
            "en".into(),
            "Title".into(),
            BTreeMap::from([("h1".to_string(), vec!["Heading".to_string()])]),
            "desc".into(),
            "kw".into(),
            "author".into(),
            "content".into(),
            0.75,
            "alt text".into(),
            "link text".into(),
            3,
            &config(),
        )
        .unwrap();

        let json = record.to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["title"], "Title");
        assert_eq!(parsed["total_links_count"], 3);
        assert_eq!(parsed["content_snippet_quality"], 0.75);
    }
}
