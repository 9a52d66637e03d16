use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::DefaultDirectRateLimiter;
use parking_lot::Mutex;
use reqwest::Client;
use reqwest::StatusCode;
use reqwest::header::{
    ETAG, HeaderMap, HeaderName, IF_MODIFIED_SINCE, IF_NONE_MATCH, LAST_MODIFIED, RETRY_AFTER,
};
use tracing::{debug, info, warn};

use crate::error::ProviderError;

/// Query parameters that never take part in a request signature.
const SECRET_PARAMS: &[&str] = &["apiKey", "api_key", "key"];

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub body: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CacheLookup {
    Fresh(String),
    Expired(CacheEntry),
    Miss,
}

/// In-process response cache keyed by request signature.
#[derive(Debug)]
pub struct ResponseCache {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn lookup(&self, key: &str, now: DateTime<Utc>) -> CacheLookup {
        let guard = self.entries.lock();
        let Some(entry) = guard.get(key) else {
            return CacheLookup::Miss;
        };
        let age = now
            .signed_duration_since(entry.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO);
        if age < self.ttl {
            CacheLookup::Fresh(entry.body.clone())
        } else {
            CacheLookup::Expired(entry.clone())
        }
    }

    pub fn insert(&self, key: &str, entry: CacheEntry) {
        self.entries.lock().insert(key.to_string(), entry);
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    /// Drops every entry. Returns how many were evicted.
    pub fn clear(&self) -> usize {
        let mut guard = self.entries.lock();
        let n = guard.len();
        guard.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Stable cache key for an upstream request: endpoint plus sorted
/// parameters, credentials excluded.
pub fn request_signature(endpoint: &str, params: &[(&str, String)]) -> String {
    let mut kept: Vec<(&str, &str)> = params
        .iter()
        .filter(|(k, _)| !SECRET_PARAMS.contains(k))
        .map(|(k, v)| (*k, v.as_str()))
        .collect();
    kept.sort();
    let query = kept
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    if query.is_empty() {
        endpoint.to_string()
    } else {
        format!("{endpoint}?{query}")
    }
}

/// GET `url` through the cache. Fresh hits never touch the network; misses
/// wait on the pacing limiter, revalidate with the stored validators when an
/// expired entry exists, and record the new payload on success.
pub async fn fetch_json_cached(
    client: &Client,
    limiter: &DefaultDirectRateLimiter,
    cache: &ResponseCache,
    url: &str,
    params: &[(&str, String)],
) -> Result<String, ProviderError> {
    let key = request_signature(url, params);
    let expired = match cache.lookup(&key, Utc::now()) {
        CacheLookup::Fresh(body) => {
            debug!(%key, "response cache hit");
            return Ok(body);
        }
        CacheLookup::Expired(entry) => Some(entry),
        CacheLookup::Miss => None,
    };

    limiter.until_ready().await;

    let mut req = client
        .get(url)
        .query(params)
        .header("Accept", "application/json");
    if let Some(entry) = expired.as_ref() {
        if let Some(etag) = entry.etag.as_ref() {
            req = req.header(IF_NONE_MATCH, etag);
        }
        if let Some(last_modified) = entry.last_modified.as_ref() {
            req = req.header(IF_MODIFIED_SINCE, last_modified);
        }
    }

    let resp = req.send().await?;
    let status = resp.status();
    let headers = resp.headers().clone();
    log_quota(&headers);

    if status == StatusCode::NOT_MODIFIED {
        let Some(mut entry) = expired else {
            return Err(ProviderError::MalformedResponse(
                "received 304 without a cached body".to_string(),
            ));
        };
        entry.fetched_at = Utc::now();
        let body = entry.body.clone();
        cache.insert(&key, entry);
        return Ok(body);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = headers
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown");
        warn!(%key, retry_after, "provider rate limit hit");
        return Err(ProviderError::RateLimited(format!(
            "http 429, retry after {retry_after}"
        )));
    }

    let body = resp.text().await?;
    if !status.is_success() {
        let snippet = body
            .trim()
            .replace(['\n', '\r'], " ")
            .chars()
            .take(220)
            .collect::<String>();
        return Err(ProviderError::Unreachable(format!("http {status}: {snippet}")));
    }

    let header_str = |name: HeaderName| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
    };
    cache.insert(
        &key,
        CacheEntry {
            body: body.clone(),
            etag: header_str(ETAG),
            last_modified: header_str(LAST_MODIFIED),
            fetched_at: Utc::now(),
        },
    );
    Ok(body)
}

fn log_quota(headers: &HeaderMap) {
    let remaining = headers
        .get("x-requests-remaining")
        .and_then(|v| v.to_str().ok());
    let used = headers.get("x-requests-used").and_then(|v| v.to_str().ok());
    if let Some(remaining) = remaining {
        info!(remaining, used = used.unwrap_or("?"), "provider quota");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn entry(at: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            body: "[]".to_string(),
            etag: Some("\"v1\"".to_string()),
            last_modified: None,
            fetched_at: at,
        }
    }

    #[test]
    fn signature_ignores_credentials_and_param_order() {
        let a = request_signature(
            "https://x/v4/sports/soccer_epl/odds",
            &[("regions", "uk".to_string()), ("apiKey", "secret".to_string())],
        );
        let b = request_signature(
            "https://x/v4/sports/soccer_epl/odds",
            &[("apiKey", "other".to_string()), ("regions", "uk".to_string())],
        );
        assert_eq!(a, b);
        assert!(!a.contains("secret"));
    }

    #[test]
    fn lookup_respects_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        cache.insert("k", entry(t0));

        assert_eq!(
            cache.lookup("k", t0 + chrono::Duration::seconds(30)),
            CacheLookup::Fresh("[]".to_string())
        );
        assert!(matches!(
            cache.lookup("k", t0 + chrono::Duration::seconds(60)),
            CacheLookup::Expired(_)
        ));
        assert_eq!(cache.lookup("other", t0), CacheLookup::Miss);
    }

    #[test]
    fn clear_evicts_everything() {
        let cache = ResponseCache::new(Duration::from_secs(60));
        let t0 = Utc::now();
        cache.insert("a", entry(t0));
        cache.insert("b", entry(t0));
        assert_eq!(cache.clear(), 2);
        assert!(cache.is_empty());
        assert_eq!(cache.lookup("a", t0), CacheLookup::Miss);
    }
}
