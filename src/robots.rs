//! Per-host robots.txt cache with capacity-bounded, last-writer-wins inserts
//! (spec §4.2, §5). Keyed by host (netloc); mutex covers only the map, never
//! network I/O, matching `crawly`'s `RwLock<IndexMap<String, RobotsCache>>`
//! shape (downgraded to a plain `Mutex` since entries are written on miss,
//! not just read).

use std::sync::Mutex;

use indexmap::IndexMap;
use robotstxt::DefaultMatcher;
use tracing::debug;

use crate::config::CrawlerConfig;
use crate::fetcher::Fetcher;
use crate::url_wrapper::UrlWrapper;

/// A cached per-host robots.txt outcome: either the minified text of a
/// fetched `robots.txt`, or a negative marker recorded when the fetch
/// failed (a missing robots.txt means permissive, per spec §4.2).
enum RobotsEntry {
    Policy(String),
    Negative,
}

pub struct RobotsCache {
    entries: Mutex<IndexMap<String, RobotsEntry>>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
        }
    }

    /// Returns whether `url` may be fetched under the robots.txt policy of
    /// its host. Always-allow URLs bypass the check entirely. With
    /// `cache_only = true`, a cache miss is treated as permissive without
    /// fetching (used for the link-admission precheck, spec §4.4 step 11).
    pub fn allowed(&self, url: &UrlWrapper, cache_only: bool, config: &CrawlerConfig, fetcher: &Fetcher) -> bool {
        if Self::is_always_allowed(url, config) {
            return true;
        }

        let host = url.url.host_str().unwrap_or("").to_string();

        if let Some(policy) = self.lookup(&host) {
            return Self::decide(policy.as_deref(), url, config);
        }

        if cache_only {
            return true;
        }

        let policy = self.fetch_and_insert(&host, url, config, fetcher);
        Self::decide(policy.as_deref(), url, config)
    }

    /// Mirrors `RobotsWrapper._is_url_in_always_allow_list`: exact
    /// canonical-URL equality, never a substring/suffix match.
    fn is_always_allowed(url: &UrlWrapper, config: &CrawlerConfig) -> bool {
        config
            .robots_txt_always_allow_urls
            .iter()
            .any(|allowed| allowed.canonical_url == url.canonical_url)
    }

    /// Returns `Some(None)` for a cached negative marker, `Some(Some(text))`
    /// for a cached policy, or `None` on a cache miss.
    fn lookup(&self, host: &str) -> Option<Option<String>> {
        let entries = self.entries.lock().expect("robots cache mutex poisoned");
        entries.get(host).map(|entry| match entry {
            RobotsEntry::Policy(text) => Some(text.clone()),
            RobotsEntry::Negative => None,
        })
    }

    fn fetch_and_insert(
        &self,
        host: &str,
        url: &UrlWrapper,
        config: &CrawlerConfig,
        fetcher: &Fetcher,
    ) -> Option<String> {
        let robots_url = format!("{}://{}/robots.txt", url.url.scheme(), host);

        match fetcher.fetch_text_only(&robots_url, "text/plain", config.max_robots_fetch_size, config) {
            Ok(text) => {
                let minified = minify_robots_text(&text);
                self.insert_bounded(host, RobotsEntry::Policy(minified.clone()), config.max_robots_cache_entries);
                Some(minified)
            }
            Err(err) => {
                debug!(host, error = %err, "failed to fetch robots.txt, assuming permissive");
                self.insert_bounded(host, RobotsEntry::Negative, config.max_robots_cache_entries);
                None
            }
        }
    }

    /// Inserts only if the cache has room; insertion failures are silent
    /// (the host is simply re-fetched next time, spec §4.2). `max_entries`
    /// comes from `CrawlerConfig::max_robots_cache_entries`.
    fn insert_bounded(&self, host: &str, entry: RobotsEntry, max_entries: usize) {
        let mut entries = self.entries.lock().expect("robots cache mutex poisoned");
        if entries.len() < max_entries {
            entries.insert(host.to_string(), entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("robots cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn decide(policy: Option<&str>, url: &UrlWrapper, config: &CrawlerConfig) -> bool {
        match policy {
            None => true,
            Some(text) => DefaultMatcher::default().one_agent_allowed_by_robots(
                text,
                &config.robots_txt_user_agent,
                url.url.as_str(),
            ),
        }
    }
}

impl Default for RobotsCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips comment and blank lines from a fetched robots.txt before caching
/// it. Mirrors `RobotsWrapper._minify_robots_file_and_split_it_to_lines`.
fn minify_robots_text(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Free function giving the robots-meta-tag decision for a `<meta
/// name="robots">` tag's `content` attribute (spec §4.2). Not standards
/// compliant, but deliberately simple and never over-permissive.
pub fn allowed_by_robots_meta_tag(contents: &str) -> bool {
    let lower = contents.to_ascii_lowercase();
    !lower.contains("noindex") && !lower.contains("nofollow")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_tag_denies_noindex() {
        assert!(!allowed_by_robots_meta_tag("NOINDEX, nofollow"));
        assert!(!allowed_by_robots_meta_tag("noindex"));
        assert!(allowed_by_robots_meta_tag("index, follow"));
        assert!(allowed_by_robots_meta_tag(""));
    }

    #[test]
    fn minify_strips_comments_and_blanks() {
        let text = "# a comment\n\nUser-agent: *\n  \nDisallow: /admin\n";
        assert_eq!(minify_robots_text(text), "User-agent: *\nDisallow: /admin");
    }

    #[test]
    fn cache_starts_empty() {
        let cache = RobotsCache::new();
        assert!(cache.is_empty());
    }

    #[test]
    fn always_allow_requires_exact_canonical_match_not_a_suffix() {
        let mut config = CrawlerConfig::default();
        config.robots_txt_always_allow_urls =
            vec![UrlWrapper::new("https://example.com/path", &config).unwrap()];

        let allowed = UrlWrapper::new("https://example.com/path", &config).unwrap();
        assert!(RobotsCache::is_always_allowed(&allowed, &config));

        // "evil-example.com/path" ends with "example.com/path" as a raw
        // string, but must not be treated as the same canonical URL.
        let spoofed = UrlWrapper::new("https://evil-example.com/path", &config).unwrap();
        assert!(!RobotsCache::is_always_allowed(&spoofed, &config));
    }
}
