//! Heuristics computed from the address alone.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ExtractionContext, HeuristicResult, BENIGN, BORDERLINE, SUSPICIOUS};

static IPV4_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"((25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)\.){3}(25[0-5]|2[0-4][0-9]|[01]?[0-9][0-9]?)")
        .unwrap()
});

/// Known URL-shortening services, matched against the host and its parents.
pub const SHORTENERS: &[&str] = &[
    "bit.ly", "goo.gl", "shorte.st", "go2l.ink", "x.co", "ow.ly", "t.co", "tr.im", "is.gd",
    "cli.gs", "yfrog.com", "migre.me", "ff.im", "tiny.cc", "url4.eu", "twit.ac", "su.pr",
    "twurl.nl", "snipurl.com", "short.to", "budurl.com", "ping.fm", "post.ly", "just.as",
    "bkite.com", "snipr.com", "fic.kr", "loopt.us", "doiop.com", "short.ie", "kl.am", "wp.me",
    "rubyurl.com", "om.ly", "to.ly", "bit.do", "lnkd.in", "db.tt", "qr.ae", "adf.ly",
    "bitly.com", "cur.lv", "tinyurl.com", "ity.im", "q.gs", "po.st", "bc.vc", "twitthis.com",
    "u.to", "j.mp", "buzurl.com", "cutt.us", "u.bb", "yourls.org", "prettylinkpro.com",
    "scrnch.me", "filoops.info", "vzturl.com", "qr.net", "1url.com", "tweez.me", "v.gd",
    "link.zip.net",
];

pub fn is_shortener_host(host: &str) -> bool {
    let host = host.to_lowercase();
    // tinyurl runs several TLDs
    host.contains("tinyurl")
        || SHORTENERS
            .iter()
            .any(|s| host == *s || host.ends_with(&format!(".{s}")))
}

pub fn using_ip(ctx: &ExtractionContext) -> HeuristicResult {
    if !ctx.domain.is_empty() && IPV4_PATTERN.is_match(&ctx.domain) {
        Ok(SUSPICIOUS)
    } else {
        Ok(BENIGN)
    }
}

pub fn long_url(ctx: &ExtractionContext) -> HeuristicResult {
    let length = ctx.url.chars().count();
    Ok(match length {
        0..=53 => BENIGN,
        54..=75 => BORDERLINE,
        _ => SUSPICIOUS,
    })
}

pub fn short_url(ctx: &ExtractionContext) -> HeuristicResult {
    let host = ctx.host.as_deref().ok_or(super::HeuristicError::Unparsed)?;
    if is_shortener_host(host) {
        Ok(SUSPICIOUS)
    } else {
        Ok(BENIGN)
    }
}

pub fn symbol(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(if ctx.url.contains('@') { SUSPICIOUS } else { BENIGN })
}

/// A `//` past the scheme separator hints at an embedded redirect.
pub fn redirecting(ctx: &ExtractionContext) -> HeuristicResult {
    let position = ctx
        .url
        .rfind("//")
        .map(|byte_idx| ctx.url[..byte_idx].chars().count());
    Ok(match position {
        Some(p) if p > 6 => SUSPICIOUS,
        _ => BENIGN,
    })
}

pub fn prefix_suffix(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(if ctx.domain.contains('-') { SUSPICIOUS } else { BENIGN })
}

pub fn sub_domains(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(match ctx.url.matches('.').count() {
        1 => BENIGN,
        2 => BORDERLINE,
        _ => SUSPICIOUS,
    })
}

pub fn https(ctx: &ExtractionContext) -> HeuristicResult {
    let parsed = ctx.parsed()?;
    Ok(if parsed.scheme().contains("https") { BENIGN } else { SUSPICIOUS })
}

pub fn non_std_port(ctx: &ExtractionContext) -> HeuristicResult {
    let parsed = ctx.parsed()?;
    Ok(match parsed.port() {
        Some(port) if port != 80 && port != 443 => SUSPICIOUS,
        _ => BENIGN,
    })
}

pub fn https_domain_url(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(if ctx.domain.contains("https") { SUSPICIOUS } else { BENIGN })
}
