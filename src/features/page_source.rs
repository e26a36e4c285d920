//! Heuristics over the raw page source and redirect history.
//!
//! StatusBarCust, DisableRightClick, UsingPopupWindow and IframeRedirection
//! report `1` when their pattern is present. That is the encoding the
//! classifier was trained on, so it stays even though presence is the
//! suspicious case.

use once_cell::sync::Lazy;
use regex::Regex;

use super::{ExtractionContext, HeuristicResult, BENIGN, BORDERLINE, SUSPICIOUS};

static MAIL_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)mail\(\)|mailto:?").unwrap());

static STATUS_BAR_SCRIPT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<script>.+onmouseover.+</script>").unwrap());

static RIGHT_CLICK_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"event.button ?== ?2").unwrap());

static POPUP_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"alert\(").unwrap());

static IFRAME_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<iframe|frameborder").unwrap());

fn present_as_benign(pattern: &Regex, body: &str) -> i8 {
    if pattern.is_match(body) {
        BENIGN
    } else {
        SUSPICIOUS
    }
}

pub fn info_email(ctx: &ExtractionContext) -> HeuristicResult {
    let body = ctx.document()?.body();
    Ok(if MAIL_TOKEN.is_match(body) { SUSPICIOUS } else { BENIGN })
}

pub fn website_forwarding(ctx: &ExtractionContext) -> HeuristicResult {
    let hops = ctx.document()?.history().len();
    Ok(match hops {
        0..=1 => BENIGN,
        2..=4 => BORDERLINE,
        _ => SUSPICIOUS,
    })
}

pub fn status_bar_cust(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(present_as_benign(&STATUS_BAR_SCRIPT, ctx.document()?.body()))
}

pub fn disable_right_click(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(present_as_benign(&RIGHT_CLICK_BLOCK, ctx.document()?.body()))
}

pub fn using_popup_window(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(present_as_benign(&POPUP_CALL, ctx.document()?.body()))
}

pub fn iframe_redirection(ctx: &ExtractionContext) -> HeuristicResult {
    Ok(present_as_benign(&IFRAME_TOKEN, ctx.document()?.body()))
}

pub fn links_pointing_to_page(ctx: &ExtractionContext) -> HeuristicResult {
    let count = ctx.document()?.body().matches("<a href=").count();
    Ok(match count {
        0 => BENIGN,
        1..=2 => BORDERLINE,
        _ => SUSPICIOUS,
    })
}
