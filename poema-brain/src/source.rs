//! Seed text from the web, with a mandatory fallback
//!
//! The archive grows from passages fetched through a proxy URL template
//! (`{url}` is replaced by the percent-encoded source). Every failure mode
//! (offline mode, connection error, timeout, HTTP error, page without usable
//! text) degrades to a line from the static content table. Callers always
//! get text back.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use scraper::{Html, Selector};
use serde::Serialize;
use tracing::{debug, info, warn};

use poema_core::config::ContentConfig;
use poema_core::error::{PoemaError, PoemaResult};
use poema_core::{ContentCategory, RandomContentTable, RandomSource};

/// Passages shorter or longer than this are ignored
const MIN_PASSAGE_CHARS: usize = 30;
const MAX_PASSAGE_CHARS: usize = 400;

/// Counters for the health route
#[derive(Debug, Clone, Default, Serialize)]
pub struct SourceStats {
    pub fetched: u64,
    pub fallbacks: u64,
    pub offline: bool,
}

/// Best-effort fetcher of seed passages
pub struct ContentSource {
    config: ContentConfig,
    client: reqwest::Client,
    fallback: RandomContentTable,
    rng: Mutex<Box<dyn RandomSource>>,
    cursor: AtomicUsize,
    fetched: AtomicU64,
    fallbacks: AtomicU64,
}

impl ContentSource {
    pub fn new(config: ContentConfig, rng: Box<dyn RandomSource>) -> PoemaResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms.max(1)))
            .user_agent("Mozilla/5.0 (compatible; POEMA/0.1; seed reader)")
            .build()
            .map_err(|e| PoemaError::network(e.to_string()))?;

        Ok(Self {
            config,
            client,
            fallback: RandomContentTable::builtin(),
            rng: Mutex::new(rng),
            cursor: AtomicUsize::new(0),
            fetched: AtomicU64::new(0),
            fallbacks: AtomicU64::new(0),
        })
    }

    /// One seed passage; never empty, never an error
    pub async fn fetch_seed_text(&self) -> String {
        let mut passages = self.fetch_seed_passages().await;
        let pick = self.rng.lock().index(passages.len());
        if pick < passages.len() {
            passages.swap_remove(pick)
        } else {
            self.fallback_line()
        }
    }

    /// Every usable passage of the next source, or one fallback line
    pub async fn fetch_seed_passages(&self) -> Vec<String> {
        if self.config.offline {
            self.fallbacks.fetch_add(1, Ordering::Relaxed);
            return vec![self.fallback_line()];
        }

        match self.fetch_passages().await {
            Ok(passages) => {
                self.fetched.fetch_add(1, Ordering::Relaxed);
                passages
            }
            Err(e) => {
                warn!("❌ Seed fetch failed, using static text: {}", e);
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                vec![self.fallback_line()]
            }
        }
    }

    /// Fetch and extract the next source in rotation
    pub async fn fetch_passages(&self) -> PoemaResult<Vec<String>> {
        let url = self.next_url()?;
        let limit = Duration::from_millis(self.config.timeout_ms.max(1));

        let html = tokio::time::timeout(limit, self.fetch_html(&url))
            .await
            .map_err(|_| PoemaError::network(format!("{} timed out after {:?}", url, limit)))??;

        let passages = extract_passages(&html, self.config.max_passages);
        if passages.is_empty() {
            return Err(PoemaError::network(format!("no usable text at {}", url)));
        }

        info!("📖 Read {} passages from {}", passages.len(), url);
        Ok(passages)
    }

    async fn fetch_html(&self, url: &str) -> PoemaResult<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| PoemaError::network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(PoemaError::network(format!("{} answered {}", url, response.status())));
        }
        response.text().await.map_err(|e| PoemaError::network(e.to_string()))
    }

    pub fn stats(&self) -> SourceStats {
        SourceStats {
            fetched: self.fetched.load(Ordering::Relaxed),
            fallbacks: self.fallbacks.load(Ordering::Relaxed),
            offline: self.config.offline,
        }
    }

    fn next_url(&self) -> PoemaResult<String> {
        if self.config.sources.is_empty() {
            return Err(PoemaError::config("no content sources configured"));
        }
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.config.sources.len();
        let source = &self.config.sources[i];
        Ok(proxied(&self.config.proxy_template, source))
    }

    fn fallback_line(&self) -> String {
        let mut rng = self.rng.lock();
        self.fallback.pick(ContentCategory::Seed, rng.as_mut()).to_string()
    }
}

/// Apply the proxy template
///
/// An empty template fetches the source directly; a template without
/// `{url}` is used as-is.
fn proxied(template: &str, source: &str) -> String {
    if template.is_empty() {
        source.to_string()
    } else if template.contains("{url}") {
        template.replace("{url}", &urlencoding::encode(source))
    } else {
        template.to_string()
    }
}

/// Content sentences from an HTML page
///
/// Keeps text from paragraph-like elements, splits it into sentences and
/// drops boilerplate (licences, navigation, CSS fragments).
pub fn extract_passages(html: &str, max: usize) -> Vec<String> {
    let Ok(selector) = Selector::parse("p, li, blockquote, dd") else {
        return Vec::new();
    };
    let document = Html::parse_document(html);

    let mut passages = Vec::new();
    for element in document.select(&selector) {
        let text = element.text().collect::<Vec<_>>().join(" ");
        for sentence in text.split(|c| c == '.' || c == '!' || c == '?') {
            let clean = sentence.split_whitespace().collect::<Vec<_>>().join(" ");
            let chars = clean.chars().count();
            if !(MIN_PASSAGE_CHARS..=MAX_PASSAGE_CHARS).contains(&chars) || is_boilerplate(&clean) {
                continue;
            }
            passages.push(clean);
            if passages.len() >= max {
                return passages;
            }
        }
    }

    debug!("📖 Extracted {} passages from {} bytes", passages.len(), html.len());
    passages
}

fn is_boilerplate(text: &str) -> bool {
    let lower = text.to_lowercase();
    const MARKERS: &[&str] = &[
        "wikipedia", "wikimedia", "creative commons", "privacy policy", "terms of use",
        "cookie", "javascript", "last edited", "retrieved from", "edit this page",
    ];
    text.contains('{')
        || text.contains('}')
        || MARKERS.iter().any(|m| lower.contains(m))
        || text.chars().filter(|c| c.is_alphabetic()).count() < 20
}

#[cfg(test)]
mod tests {
    use super::*;
    use poema_core::SeededRandom;

    fn source(config: ContentConfig) -> ContentSource {
        ContentSource::new(config, Box::new(SeededRandom::from_seed(4))).unwrap()
    }

    #[test]
    fn test_extract_passages() {
        let html = "<html><body>\
            <p>The river carries every name it has ever heard down to the sea. Short.</p>\
            <script>var quiet = true;</script>\
            <li>Text of this page is available under the Creative Commons licence, mostly</li>\
            </body></html>";
        let passages = extract_passages(html, 8);
        assert_eq!(passages, vec!["The river carries every name it has ever heard down to the sea"]);
    }

    #[test]
    fn test_proxy_template() {
        let url = proxied("https://proxy.example/raw?url={url}", "https://a.org/wiki/X Y");
        assert_eq!(url, "https://proxy.example/raw?url=https%3A%2F%2Fa.org%2Fwiki%2FX%20Y");
        assert_eq!(proxied("http://direct/", "ignored"), "http://direct/");
        assert_eq!(proxied("", "http://a.org/x"), "http://a.org/x");
    }

    #[tokio::test]
    async fn test_offline_uses_static_text() {
        let config = ContentConfig { offline: true, ..ContentConfig::default() };
        let source = source(config);
        let text = source.fetch_seed_text().await;
        assert!(!text.is_empty());
        assert_eq!(source.stats().fallbacks, 1);
    }

    #[tokio::test]
    async fn test_network_failure_falls_back_in_time() {
        let config = ContentConfig {
            proxy_template: String::new(),
            sources: vec!["http://127.0.0.1:9/".to_string()],
            timeout_ms: 500,
            ..ContentConfig::default()
        };
        let source = source(config);

        let started = std::time::Instant::now();
        let text = source.fetch_seed_text().await;

        assert!(!text.is_empty());
        assert!(started.elapsed() < Duration::from_secs(3));
        assert_eq!(source.stats().fallbacks, 1);
        assert_eq!(source.stats().fetched, 0);
    }

    #[tokio::test]
    async fn test_stalled_server_times_out_to_fallback() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let silent = tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = ContentConfig {
            proxy_template: String::new(),
            sources: vec![format!("http://{}/", addr)],
            timeout_ms: 300,
            ..ContentConfig::default()
        };
        let source = source(config);

        let started = std::time::Instant::now();
        let text = source.fetch_seed_text().await;
        let elapsed = started.elapsed();

        assert!(!text.is_empty());
        assert!(elapsed >= Duration::from_millis(250));
        assert!(elapsed < Duration::from_secs(2));
        assert_eq!(source.stats().fallbacks, 1);
        assert_eq!(source.stats().fetched, 0);
        silent.abort();
    }

    #[tokio::test]
    async fn test_no_sources_still_returns_text() {
        let config = ContentConfig { sources: Vec::new(), ..ContentConfig::default() };
        let text = source(config).fetch_seed_text().await;
        assert!(!text.is_empty());
    }
}
