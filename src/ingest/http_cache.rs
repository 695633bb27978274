/// Caching, retrying HTTP GET boundary for the weather provider.
///
/// Successful response bodies are stored on disk, keyed by the SHA-256 of
/// the full request URL. With no TTL configured an entry never expires, so a
/// re-run against the same request replays the same data; operators delete
/// the cache directory to force a refresh.

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::{self, Component};
use crate::retry::{RetryFailure, RetryPolicy};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum HttpError {
    /// Connection, timeout, or body read failure.
    Transport(String),
    /// Non-2xx response.
    Status { code: u16, body: String },
}

impl HttpError {
    /// Transport failures and throttling / gateway statuses are worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            HttpError::Transport(_) => true,
            HttpError::Status { code, .. } => {
                matches!(code, 408 | 429 | 500 | 502 | 503 | 504)
            }
        }
    }

    /// The HTTP status, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            HttpError::Transport(_) => None,
            HttpError::Status { code, .. } => Some(*code),
        }
    }
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HttpError::Transport(msg) => write!(f, "Request failed: {}", msg),
            HttpError::Status { code, body } => {
                write!(f, "HTTP {}", code)?;
                if !body.is_empty() {
                    let snippet: String = body.chars().take(200).collect();
                    write!(f, ": {}", snippet)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for HttpError {}

// ============================================================================
// Response cache
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    url: String,
    stored_at: DateTime<Utc>,
    body: String,
}

/// On-disk store of response bodies. Each entry is a separate file, so
/// concurrent readers are safe.
#[derive(Debug, Clone)]
pub struct ResponseCache {
    dir: PathBuf,
    ttl: Option<Duration>,
}

/// Request signature used as the cache file name.
pub fn cache_key(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

impl ResponseCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Option<Duration>) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, url: &str) -> PathBuf {
        self.dir.join(format!("{}.json", cache_key(url)))
    }

    /// Cached body for `url`, if present and not expired.
    pub fn get(&self, url: &str) -> Option<String> {
        self.get_at(url, Utc::now())
    }

    /// `get` evaluated at `now`. Unreadable or corrupt entries count as misses.
    pub fn get_at(&self, url: &str, now: DateTime<Utc>) -> Option<String> {
        let text = fs::read_to_string(self.entry_path(url)).ok()?;
        let entry: CacheEntry = serde_json::from_str(&text).ok()?;

        // Hash collisions are not a practical concern, but a mismatched URL
        // means the file was not written by us.
        if entry.url != url {
            return None;
        }

        // A negative age (clock moved backwards) counts as fresh.
        if let Some(ttl) = self.ttl {
            if let Ok(age) = now.signed_duration_since(entry.stored_at).to_std() {
                if age > ttl {
                    return None;
                }
            }
        }

        Some(entry.body)
    }

    pub fn put(&self, url: &str, body: &str) -> std::io::Result<()> {
        self.put_at(url, body, Utc::now())
    }

    pub fn put_at(&self, url: &str, body: &str, now: DateTime<Utc>) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let entry = CacheEntry {
            url: url.to_string(),
            stored_at: now,
            body: body.to_string(),
        };
        let text = serde_json::to_string(&entry)?;

        // Write then rename so a reader never sees a half-written entry.
        let final_path = self.entry_path(url);
        let tmp_path = final_path.with_extension("json.tmp");
        fs::write(&tmp_path, text)?;
        fs::rename(&tmp_path, &final_path)
    }
}

// ============================================================================
// Cached client
// ============================================================================

/// Blocking GET client with a response cache in front and retries behind.
pub struct CachedHttpClient {
    client: reqwest::blocking::Client,
    cache: ResponseCache,
    retry: RetryPolicy,
}

impl CachedHttpClient {
    pub fn new(
        timeout: Duration,
        cache: ResponseCache,
        retry: RetryPolicy,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("floodrisk_service/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            cache,
            retry,
        })
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    /// GET `url` as text, serving from the cache when possible.
    pub fn get_text(&self, url: &Url) -> Result<String, RetryFailure<HttpError>> {
        let key = url.as_str();
        if let Some(body) = self.cache.get(key) {
            logging::debug(Component::Weather, None, &format!("Cache hit: {}", key));
            return Ok(body);
        }

        let body = self.retry.run(HttpError::is_transient, |attempt| {
            if attempt > 1 {
                logging::debug(
                    Component::Weather,
                    None,
                    &format!("Retry {} for {}", attempt - 1, key),
                );
            }
            self.fetch_once(url)
        })?;

        if let Err(e) = self.cache.put(key, &body) {
            logging::warn(
                Component::Weather,
                None,
                &format!("Failed to write cache entry in {}: {}", self.cache.dir().display(), e),
            );
        }

        Ok(body)
    }

    fn fetch_once(&self, url: &Url) -> Result<String, HttpError> {
        let response = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| HttpError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(HttpError::Status {
                code: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const URL: &str = "https://api.open-meteo.com/v1/forecast?latitude=-26.9&longitude=-49.07";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 13, 0, 0).unwrap()
    }

    #[test]
    fn test_cache_key_is_stable_hex_sha256() {
        let key = cache_key(URL);
        assert_eq!(key.len(), 64);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(key, cache_key(URL));
        assert_ne!(key, cache_key("https://api.open-meteo.com/v1/forecast?latitude=0"));
    }

    #[test]
    fn test_cache_miss_when_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ResponseCache::new(dir.path(), None);
        assert_eq!(cache.get(URL), None);
    }

    #[test]
    fn test_cache_without_ttl_never_expires() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ResponseCache::new(dir.path(), None);
        cache.put_at(URL, "{\"hourly\":{}}", fixed_now()).expect("write");

        let much_later = fixed_now() + chrono::Duration::days(3650);
        assert_eq!(cache.get_at(URL, much_later).as_deref(), Some("{\"hourly\":{}}"));
    }

    #[test]
    fn test_cache_with_ttl_expires_old_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ResponseCache::new(dir.path(), Some(Duration::from_secs(3600)));
        cache.put_at(URL, "body", fixed_now()).expect("write");

        let fresh = fixed_now() + chrono::Duration::minutes(59);
        let stale = fixed_now() + chrono::Duration::minutes(61);
        assert_eq!(cache.get_at(URL, fresh).as_deref(), Some("body"));
        assert_eq!(cache.get_at(URL, stale), None);
    }

    #[test]
    fn test_corrupt_cache_entry_is_a_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ResponseCache::new(dir.path(), None);
        fs::write(dir.path().join(format!("{}.json", cache_key(URL))), "not json")
            .expect("write");
        assert_eq!(cache.get(URL), None);
    }

    #[test]
    fn test_cache_creates_missing_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let nested = dir.path().join("a").join("b");
        let cache = ResponseCache::new(&nested, None);
        cache.put(URL, "body").expect("write into new directory");
        assert_eq!(cache.get(URL).as_deref(), Some("body"));
    }

    #[test]
    fn test_transient_status_classification() {
        for code in [408, 429, 500, 502, 503, 504] {
            let err = HttpError::Status {
                code,
                body: String::new(),
            };
            assert!(err.is_transient(), "HTTP {} should be retried", code);
        }
        for code in [400, 401, 403, 404] {
            let err = HttpError::Status {
                code,
                body: String::new(),
            };
            assert!(!err.is_transient(), "HTTP {} should not be retried", code);
        }
        assert!(HttpError::Transport("timed out".to_string()).is_transient());
    }

    #[test]
    fn test_status_is_exposed_only_for_answered_requests() {
        let not_found = HttpError::Status {
            code: 404,
            body: "not found".to_string(),
        };
        assert_eq!(not_found.status(), Some(404));
        assert_eq!(HttpError::Transport("connection reset".to_string()).status(), None);
    }

    #[test]
    fn test_cached_client_serves_hit_without_network() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cache = ResponseCache::new(dir.path(), None);
        // Unroutable host: if the cache were bypassed this would fail.
        let url = Url::parse("http://127.0.0.1:9/v1/forecast?latitude=1").expect("url");
        cache.put(url.as_str(), "cached body").expect("write");

        let client = CachedHttpClient::new(Duration::from_secs(1), cache, RetryPolicy::none())
            .expect("client");
        assert_eq!(client.get_text(&url).expect("hit"), "cached body");
    }
}
