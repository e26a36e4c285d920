//! Heuristics over the parsed element tree of the fetched page.

use once_cell::sync::Lazy;
use scraper::{ElementRef, Selector};

use super::{tier, ExtractionContext, HeuristicResult, BENIGN, BORDERLINE, SUSPICIOUS};

static HEAD_LINK_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("head link[href]").unwrap());

static EMBEDDED_RESOURCE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("img[src], audio[src], embed[src], iframe[src]").unwrap()
});

static ANCHOR_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());

static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("link[href]").unwrap());

static SCRIPT_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());

static FORM_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("form[action]").unwrap());

fn attr<'a>(element: &ElementRef<'a>, name: &str) -> &'a str {
    element.value().attr(name).unwrap_or_default()
}

/// Self-referential resource: names the site, or is a relative path with a
/// single dot such as `favicon.ico`.
fn is_local_resource(ctx: &ExtractionContext, reference: &str) -> bool {
    ctx.references_site(reference) || reference.matches('.').count() == 1
}

/// Share of `references` that are not local, as a percentage. `None` when empty.
fn external_percentage<'a>(
    ctx: &ExtractionContext,
    references: impl Iterator<Item = &'a str>,
) -> Option<f64> {
    let (mut total, mut external) = (0usize, 0usize);
    for reference in references {
        total += 1;
        if !is_local_resource(ctx, reference) {
            external += 1;
        }
    }
    (total > 0).then(|| external as f64 / total as f64 * 100.0)
}

pub fn favicon(ctx: &ExtractionContext) -> HeuristicResult {
    let tree = ctx.document()?.tree();
    let local = tree
        .select(&HEAD_LINK_SELECTOR)
        .any(|link| is_local_resource(ctx, attr(&link, "href")));
    Ok(if local { BENIGN } else { SUSPICIOUS })
}

pub fn request_url(ctx: &ExtractionContext) -> HeuristicResult {
    let tree = ctx.document()?.tree();
    let sources = tree
        .select(&EMBEDDED_RESOURCE_SELECTOR)
        .map(|element| attr(&element, "src"));

    Ok(match external_percentage(ctx, sources) {
        Some(percentage) => tier(percentage, 22.0, 61.0),
        None => BORDERLINE,
    })
}

pub fn anchor_url(ctx: &ExtractionContext) -> HeuristicResult {
    let tree = ctx.document()?.tree();
    let (mut total, mut unsafe_count) = (0usize, 0usize);

    for anchor in tree.select(&ANCHOR_SELECTOR) {
        let href = attr(&anchor, "href");
        let lower = href.to_lowercase();
        total += 1;
        if href.contains('#')
            || lower.contains("javascript")
            || lower.contains("mailto")
            || !ctx.references_site(href)
        {
            unsafe_count += 1;
        }
    }

    if total == 0 {
        return Ok(SUSPICIOUS);
    }
    Ok(tier(unsafe_count as f64 / total as f64 * 100.0, 31.0, 67.0))
}

pub fn links_in_script_tags(ctx: &ExtractionContext) -> HeuristicResult {
    let tree = ctx.document()?.tree();
    let links = tree.select(&LINK_SELECTOR).map(|link| attr(&link, "href"));
    let scripts = tree
        .select(&SCRIPT_SELECTOR)
        .map(|script| attr(&script, "src"));

    Ok(match external_percentage(ctx, links.chain(scripts)) {
        Some(percentage) => tier(percentage, 17.0, 81.0),
        None => BORDERLINE,
    })
}

pub fn server_form_handler(ctx: &ExtractionContext) -> HeuristicResult {
    let tree = ctx.document()?.tree();
    let actions: Vec<&str> = tree
        .select(&FORM_SELECTOR)
        .map(|form| attr(&form, "action"))
        .collect();

    if actions.is_empty() {
        return Ok(BENIGN);
    }
    if actions
        .iter()
        .any(|action| action.is_empty() || *action == "about:blank")
    {
        return Ok(SUSPICIOUS);
    }
    if actions.iter().any(|action| !ctx.references_site(action)) {
        return Ok(BORDERLINE);
    }
    Ok(BENIGN)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::FetchedDocument;
    use crate::features::tests::response;

    const SITE: &str = "https://shop.example.com/login";

    fn ctx_with(body: &str) -> ExtractionContext<'static> {
        ExtractionContext::new(SITE, Some(FetchedDocument::from_response(response(body))))
    }

    #[test]
    fn test_favicon() {
        let local = ctx_with("<html><head><link rel=\"icon\" href=\"favicon.ico\"></head></html>");
        assert_eq!(favicon(&local).unwrap(), BENIGN);

        let same_site = ctx_with(
            "<html><head><link href=\"https://shop.example.com/static/icon.v2.png\"></head></html>",
        );
        assert_eq!(favicon(&same_site).unwrap(), BENIGN);

        let foreign = ctx_with(
            "<html><head><link href=\"https://cdn.other.net/icon.v2.png\"></head></html>",
        );
        assert_eq!(favicon(&foreign).unwrap(), SUSPICIOUS);

        let none = ExtractionContext::new(SITE, None);
        assert!(favicon(&none).is_err());
    }

    #[test]
    fn test_request_url_tiers() {
        let all_local = ctx_with(
            "<img src=\"https://shop.example.com/a.b.png\"><img src=\"logo.png\">",
        );
        assert_eq!(request_url(&all_local).unwrap(), BENIGN);

        let half = ctx_with(
            "<img src=\"logo.png\"><iframe src=\"https://ads.tracker.net/x.y\"></iframe>",
        );
        assert_eq!(request_url(&half).unwrap(), BORDERLINE);

        let external = ctx_with(
            "<img src=\"https://cdn.evil.net/a.b.png\"><audio src=\"https://x.y.z/a.mp3\"></audio>",
        );
        assert_eq!(request_url(&external).unwrap(), SUSPICIOUS);

        let empty = ctx_with("<html><body>text</body></html>");
        assert_eq!(request_url(&empty).unwrap(), BORDERLINE);
    }

    #[test]
    fn test_anchor_url() {
        let safe = ctx_with(
            "<a href=\"https://shop.example.com/a\">a</a><a href=\"https://shop.example.com/b\">b</a>",
        );
        assert_eq!(anchor_url(&safe).unwrap(), BENIGN);

        let mixed = ctx_with(
            "<a href=\"https://shop.example.com/a\">a</a><a href=\"#top\">top</a>",
        );
        assert_eq!(anchor_url(&mixed).unwrap(), BORDERLINE);

        let scripted = ctx_with(
            "<a href=\"javascript:void(0)\">a</a><a href=\"mailto:x@y.z\">b</a>",
        );
        assert_eq!(anchor_url(&scripted).unwrap(), SUSPICIOUS);

        let none = ctx_with("<p>no anchors</p>");
        assert_eq!(anchor_url(&none).unwrap(), SUSPICIOUS);
    }

    #[test]
    fn test_links_in_script_tags() {
        let local = ctx_with("<link href=\"style.css\"><script src=\"app.js\"></script>");
        assert_eq!(links_in_script_tags(&local).unwrap(), BENIGN);

        let mixed = ctx_with(
            "<link href=\"style.css\"><script src=\"https://cdn.example.org/lib.min.js\"></script>",
        );
        assert_eq!(links_in_script_tags(&mixed).unwrap(), BORDERLINE);

        let external = ctx_with(
            "<script src=\"https://cdn.example.org/lib.min.js\"></script>",
        );
        assert_eq!(links_in_script_tags(&external).unwrap(), SUSPICIOUS);

        let none = ctx_with("<p>plain</p>");
        assert_eq!(links_in_script_tags(&none).unwrap(), BORDERLINE);
    }

    #[test]
    fn test_server_form_handler() {
        assert_eq!(server_form_handler(&ctx_with("<p>no form</p>")).unwrap(), BENIGN);
        assert_eq!(
            server_form_handler(&ctx_with("<form action=\"\"></form>")).unwrap(),
            SUSPICIOUS
        );
        assert_eq!(
            server_form_handler(&ctx_with("<form action=\"about:blank\"></form>")).unwrap(),
            SUSPICIOUS
        );
        assert_eq!(
            server_form_handler(&ctx_with(
                "<form action=\"https://collector.evil.net/post\"></form>"
            ))
            .unwrap(),
            BORDERLINE
        );
        assert_eq!(
            server_form_handler(&ctx_with(
                "<form action=\"https://shop.example.com/session\"></form>"
            ))
            .unwrap(),
            BENIGN
        );
        // one blank action outweighs a legitimate one
        assert_eq!(
            server_form_handler(&ctx_with(
                "<form action=\"https://shop.example.com/a\"></form><form action=\"\"></form>"
            ))
            .unwrap(),
            SUSPICIOUS
        );
    }
}
