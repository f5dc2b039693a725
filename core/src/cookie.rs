//! Cookie capability threaded through a request chain.
//!
//! The driver asks the store for a `Cookie` header before each request and
//! hands every `Set-Cookie` value back after each response. A store is
//! attached to a client explicitly and may be shared between chains, so
//! implementations must be `Send + Sync`.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use log::{debug, warn};
use url::Url;

/// Storage backend for cookies seen during request chains.
pub trait CookieStore: Send + Sync {
    /// `Cookie` header value for a request to `url`, if any cookie applies.
    fn cookie_header(&self, url: &str) -> Option<String>;

    /// Ingest one raw `Set-Cookie` value received from `url`.
    fn store_set_cookie(&self, raw: &str, url: &str);
}

/// Process-local jar keyed by host. Paths, domains and expiry dates are not
/// tracked; `Max-Age=0` (or negative) removes a cookie.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    hosts: Mutex<HashMap<String, BTreeMap<String, String>>>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of cookies stored for `host`.
    pub fn names(&self, host: &str) -> Vec<String> {
        let hosts = self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        hosts
            .get(host)
            .map(|cookies| cookies.keys().cloned().collect())
            .unwrap_or_default()
    }
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_ascii_lowercase)
}

/// Split a `Set-Cookie` value into name, value and whether it deletes the cookie.
fn parse_set_cookie(raw: &str) -> Option<(String, String, bool)> {
    let mut parts = raw.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let expired = parts.any(|attr| {
        attr.split_once('=').is_some_and(|(key, val)| {
            key.trim().eq_ignore_ascii_case("max-age")
                && val.trim().parse::<i64>().is_ok_and(|age| age <= 0)
        })
    });
    Some((name.to_string(), value.trim().to_string(), expired))
}

impl CookieStore for MemoryCookieJar {
    fn cookie_header(&self, url: &str) -> Option<String> {
        let host = host_of(url)?;
        let hosts = self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let cookies = hosts.get(&host).filter(|cookies| !cookies.is_empty())?;
        let header = cookies
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("; ");
        Some(header)
    }

    fn store_set_cookie(&self, raw: &str, url: &str) {
        let Some(host) = host_of(url) else {
            warn!("ignoring cookie from unparseable url {url}");
            return;
        };
        let Some((name, value, expired)) = parse_set_cookie(raw) else {
            warn!("ignoring malformed Set-Cookie from {host}");
            return;
        };

        let mut hosts = self.hosts.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let cookies = hosts.entry(host).or_default();
        if expired {
            debug!("removing cookie {name}");
            cookies.remove(&name);
        } else {
            debug!("storing cookie {name}");
            cookies.insert(name, value);
        }
    }
}
