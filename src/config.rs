//! Crawler configuration — the settings table of spec.md §6, loadable from
//! an optional TOML file and otherwise defaulting to the values
//! `vitlabuda/spideriment`'s `Settings.py` ships with.

use std::collections::HashSet;
use std::path::Path;

use regex::Regex;
use serde::Deserialize;

use crate::url_wrapper::UrlWrapper;

/// Raw, serde-deserializable view of the settings a TOML file may override.
/// Every field is optional so a config file only needs to mention what it
/// changes from [`CrawlerConfig::default`].
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub crawler_threads: Option<usize>,
    pub crawl_thread_batch_size: Option<usize>,
    pub max_crawl_queue_size: Option<usize>,
    pub max_page_fetch_size: Option<usize>,
    pub max_robots_fetch_size: Option<usize>,
    pub max_robots_cache_entries: Option<usize>,
    pub http_request_timeout_secs: Option<u64>,
    pub hostname_filter: Option<String>,
    pub path_filter: Option<String>,
    pub filtered_file_extensions: Option<Vec<String>>,
    pub crawl_mobile_pages: Option<bool>,
    pub allowed_languages: Option<Vec<String>>,
    pub allowed_wikipedia_languages: Option<Vec<String>>,
    pub robots_txt_always_allow_urls: Option<Vec<String>>,
    pub precheck_robots_allowance_of_crawled_links: Option<bool>,
    pub user_agent: Option<String>,
    pub robots_txt_user_agent: Option<String>,
    pub start_urls: Option<Vec<String>>,
    pub url_max_length: Option<usize>,
    pub page_title_max_length: Option<usize>,
    pub page_html_heading_max_length: Option<usize>,
    pub page_html_heading_max_level: Option<usize>,
    pub page_max_html_headings_per_level: Option<usize>,
    pub page_description_max_length: Option<usize>,
    pub page_keywords_max_length: Option<usize>,
    pub page_author_max_length: Option<usize>,
    pub page_content_snippet_max_length: Option<usize>,
    pub page_image_alts_max_length: Option<usize>,
    pub page_link_texts_max_length: Option<usize>,
    pub page_max_crawled_links_per_webpage: Option<usize>,
    pub crawler_start_timeout_secs: Option<u64>,
    pub logger_socket_host: Option<String>,
    pub logger_socket_port: Option<u16>,
    pub crawled_urls_file: Option<String>,
    pub crawl_queue_file: Option<String>,
    pub web_index_file: Option<String>,
}

/// Fully resolved crawler configuration. Everything here is read-only once
/// the crawler starts; there is no runtime reconfiguration.
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    pub crawler_threads: usize,
    pub crawl_thread_batch_size: usize,
    pub max_crawl_queue_size: usize,
    pub max_page_fetch_size: usize,
    pub max_robots_fetch_size: usize,
    pub max_robots_cache_entries: usize,
    pub http_request_timeout_secs: u64,

    pub hostname_filter: Option<Regex>,
    pub path_filter: Option<Regex>,
    pub filtered_file_extensions: HashSet<String>,
    pub crawl_mobile_pages: bool,
    pub allowed_languages: Option<Vec<String>>,
    pub allowed_wikipedia_languages: Option<Vec<String>>,
    pub robots_txt_always_allow_urls: Vec<UrlWrapper>,
    pub precheck_robots_allowance_of_crawled_links: bool,

    pub user_agent: String,
    pub robots_txt_user_agent: String,
    pub start_urls: Vec<String>,

    pub url_max_length: usize,
    pub page_title_max_length: usize,
    pub page_html_heading_max_length: usize,
    pub page_html_heading_max_level: usize,
    pub page_max_html_headings_per_level: usize,
    pub page_description_max_length: usize,
    pub page_keywords_max_length: usize,
    pub page_author_max_length: usize,
    pub page_content_snippet_max_length: usize,
    pub page_image_alts_max_length: usize,
    pub page_link_texts_max_length: usize,
    pub page_max_crawled_links_per_webpage: usize,

    pub crawler_start_timeout_secs: u64,
    pub logger_socket_host: String,
    pub logger_socket_port: u16,

    pub crawled_urls_file: String,
    pub crawl_queue_file: String,
    pub web_index_file: String,
}

const APP_VERSION: &str = "1.0";

fn default_filtered_extensions() -> HashSet<String> {
    [
        "jpg", "jpeg", "bmp", "gif", "png", "tif", "tiff", "svg", "heic", "heif", "ico", "raw",
        "xcf", "psd", "zps", "cdr", "mp3", "wav", "wma", "flac", "ogg", "aac", "m4a", "mp4", "avi",
        "wmv", "flv", "webm", "mkv", "3gp", "m4v", "mov", "zip", "rar", "7z", "tar", "gz", "bz2",
        "xz", "z", "tgz", "tbz2", "txz", "tz", "ggb", "pdf", "tex", "doc", "docx", "docm", "rtf",
        "odt", "xls", "xlsx", "xlsm", "txt", "ods", "ppt", "pptx", "pptm", "odp", "sql", "log",
        "csv", "tsv", "json", "iso", "img", "vmdk", "qcow", "qcow2", "scr", "bin", "exe", "vbs",
        "app", "msi", "msu", "cab", "dmg", "rpm", "deb", "pkg", "appimage", "apk", "bat", "cmd",
        "sh", "bash", "dll", "so", "ko", "ini", "cfg", "cnf", "conf", "cur", "ani", "lnk", "sys",
        "drv", "pak", "tmp", "bak", "dmp",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            crawler_threads: 15,
            crawl_thread_batch_size: 250,
            max_crawl_queue_size: 25_000,
            max_page_fetch_size: 1_000_000,
            max_robots_fetch_size: 60_000,
            max_robots_cache_entries: 60_000,
            http_request_timeout_secs: 10,

            hostname_filter: Some(
                Regex::new(r"(?i)\.onion$|\.mil$|\.gov$|gov\.[a-z]+$|archive\.org$|ozmovies\.com\.au$|patents\.google\.com$")
                    .expect("built-in hostname filter regex is valid"),
            ),
            path_filter: None,
            filtered_file_extensions: default_filtered_extensions(),
            crawl_mobile_pages: false,
            allowed_languages: Some(
                ["en", "US", "GB", "cs", "CZ"]
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            allowed_wikipedia_languages: Some(vec!["en".to_string(), "cs".to_string()]),
            robots_txt_always_allow_urls: Vec::new(),
            precheck_robots_allowance_of_crawled_links: true,

            user_agent: format!(
                "Mozilla/5.0 (X11; Linux x86_64) Crawlet/{APP_VERSION} (web spider; respects robots.txt disallows)"
            ),
            robots_txt_user_agent: "Crawlet".to_string(),
            start_urls: vec![
                "https://cs.wikipedia.org/wiki/Hlavn%C3%AD_strana".to_string(),
                "https://en.wikipedia.org/wiki/Main_Page".to_string(),
                "https://www.seznam.cz/".to_string(),
                "https://www.idnes.cz/".to_string(),
                "https://www.root.cz/".to_string(),
            ],

            url_max_length: 1000,
            page_title_max_length: 250,
            page_html_heading_max_length: 75,
            page_html_heading_max_level: 4,
            page_max_html_headings_per_level: 5,
            page_description_max_length: 300,
            page_keywords_max_length: 100,
            page_author_max_length: 50,
            page_content_snippet_max_length: 2250,
            page_image_alts_max_length: 125,
            page_link_texts_max_length: 225,
            page_max_crawled_links_per_webpage: 100,

            crawler_start_timeout_secs: 5,
            logger_socket_host: "127.0.0.1".to_string(),
            logger_socket_port: 5566,

            crawled_urls_file: "savedata/crawled_urls.csv".to_string(),
            crawl_queue_file: "savedata/crawl_queue.csv".to_string(),
            web_index_file: "savedata/web_index.csv".to_string(),
        }
    }
}

impl CrawlerConfig {
    /// Loads a config file if `path` exists, merging its fields over the
    /// defaults; otherwise returns the defaults unchanged. Mirrors
    /// `Settings.initialize_settings`'s one-time normalization of
    /// `ROBOTS_TXT_ALWAYS_ALLOW_URLS` into parsed URLs.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let mut config = Self::default();

        if path.exists() {
            let text = std::fs::read_to_string(path)?;
            let file: ConfigFile = toml::from_str(&text)?;
            config.merge(file)?;
        }

        Ok(config)
    }

    fn merge(&mut self, file: ConfigFile) -> anyhow::Result<()> {
        macro_rules! set {
            ($field:ident) => {
                if let Some(v) = file.$field {
                    self.$field = v;
                }
            };
        }

        set!(crawler_threads);
        set!(crawl_thread_batch_size);
        set!(max_crawl_queue_size);
        set!(max_page_fetch_size);
        set!(max_robots_fetch_size);
        set!(max_robots_cache_entries);
        set!(http_request_timeout_secs);
        set!(crawl_mobile_pages);
        set!(precheck_robots_allowance_of_crawled_links);
        set!(user_agent);
        set!(robots_txt_user_agent);
        set!(start_urls);
        set!(url_max_length);
        set!(page_title_max_length);
        set!(page_html_heading_max_length);
        set!(page_html_heading_max_level);
        set!(page_max_html_headings_per_level);
        set!(page_description_max_length);
        set!(page_keywords_max_length);
        set!(page_author_max_length);
        set!(page_content_snippet_max_length);
        set!(page_image_alts_max_length);
        set!(page_link_texts_max_length);
        set!(page_max_crawled_links_per_webpage);
        set!(crawler_start_timeout_secs);
        set!(logger_socket_host);
        set!(logger_socket_port);
        set!(crawled_urls_file);
        set!(crawl_queue_file);
        set!(web_index_file);

        if let Some(pattern) = file.hostname_filter {
            self.hostname_filter = Some(Regex::new(&pattern)?);
        }
        if let Some(pattern) = file.path_filter {
            self.path_filter = Some(Regex::new(&pattern)?);
        }
        if let Some(extensions) = file.filtered_file_extensions {
            self.filtered_file_extensions = extensions.into_iter().collect();
        }
        if let Some(langs) = file.allowed_languages {
            self.allowed_languages = Some(langs);
        }
        if let Some(langs) = file.allowed_wikipedia_languages {
            self.allowed_wikipedia_languages = Some(langs);
        }
        if let Some(urls) = file.robots_txt_always_allow_urls {
            self.robots_txt_always_allow_urls = urls
                .iter()
                .map(|u| UrlWrapper::new(u, self))
                .collect::<Result<Vec<_>, _>>()?;
        }

        Ok(())
    }
}
