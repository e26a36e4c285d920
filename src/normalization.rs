//! Address normalization.
//!
//! Every list lookup compares addresses through [`normalize_address`], so the
//! functions here must stay pure: the same input always yields the same key.

use url::Url;

/// Scheme assumed when a submitted address carries none.
const ASSUMED_SCHEME: &str = "http://";

/// Ports that never show up in a normalized key.
const DEFAULT_PORTS: [u16; 2] = [80, 443];

/// Components of an address parsed leniently (missing scheme tolerated).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub scheme: String,
    pub host: String,
    pub port: Option<u16>,
    pub path: String,
    pub query: Option<String>,
}

impl ParsedAddress {
    /// Parse an address, prefixing `http://` when no http(s) scheme is present.
    ///
    /// Returns `None` when the address cannot be parsed or has no host.
    pub fn parse_lenient(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }

        let candidate = if has_web_scheme(trimmed) {
            trimmed.to_string()
        } else {
            format!("{ASSUMED_SCHEME}{trimmed}")
        };

        let parsed = Url::parse(&candidate).ok()?;
        Self::from_url(&parsed)
    }

    fn from_url(url: &Url) -> Option<Self> {
        let host = url.host_str()?.to_lowercase();
        if host.is_empty() {
            return None;
        }

        Some(Self {
            scheme: url.scheme().to_string(),
            host,
            port: url.port(),
            path: url.path().to_string(),
            query: url.query().map(str::to_string),
        })
    }

    /// `host` or `host:port` when the explicit port is not 80/443.
    pub fn host_key(&self) -> String {
        match self.port {
            Some(port) if !DEFAULT_PORTS.contains(&port) => format!("{}:{}", self.host, port),
            _ => self.host.clone(),
        }
    }
}

fn has_web_scheme(address: &str) -> bool {
    let lower = address.to_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Canonical comparison key for a submitted address.
///
/// Empty input maps to the empty string. Unparseable input falls back to the
/// trimmed, lower-cased original.
pub fn normalize_address(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match ParsedAddress::parse_lenient(trimmed) {
        Some(parsed) => parsed.host_key(),
        None => trimmed.to_lowercase(),
    }
}

/// Key form of an entry as it sits in a curated collection.
///
/// Entries stored with a scheme are reduced to their host key; bare entries
/// are taken to be domains already and are only lower-cased.
pub fn normalize_stored_entry(entry: &str) -> String {
    let trimmed = entry.trim();
    if trimmed.is_empty() || !has_web_scheme(trimmed) {
        return trimmed.to_lowercase();
    }

    Url::parse(trimmed)
        .ok()
        .and_then(|url| ParsedAddress::from_url(&url))
        .map(|parsed| parsed.host_key())
        .unwrap_or_else(|| trimmed.to_lowercase())
}
