//! URL feature extraction.
//!
//! Twenty-two heuristics run in a fixed order over the submitted address and,
//! when one could be fetched, the page behind it. The order and names below are
//! the column layout the classifier was fit against.

pub mod address_bar;
pub mod page_source;
pub mod page_structure;

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::document::FetchedDocument;
use crate::fetcher::{DocumentFetcher, FetchedResponse};
use crate::normalization::ParsedAddress;

pub const FEATURE_COUNT: usize = 22;

pub const SUSPICIOUS: i8 = -1;
pub const BORDERLINE: i8 = 0;
pub const BENIGN: i8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Heuristic {
    UsingIp,
    LongUrl,
    ShortUrl,
    Symbol,
    Redirecting,
    PrefixSuffix,
    SubDomains,
    Https,
    Favicon,
    NonStdPort,
    HttpsDomainUrl,
    RequestUrl,
    AnchorUrl,
    LinksInScriptTags,
    ServerFormHandler,
    InfoEmail,
    WebsiteForwarding,
    StatusBarCust,
    DisableRightClick,
    UsingPopupWindow,
    IframeRedirection,
    LinksPointingToPage,
}

const BINARY: &[i8] = &[SUSPICIOUS, BENIGN];
const TERNARY: &[i8] = &[SUSPICIOUS, BORDERLINE, BENIGN];

impl Heuristic {
    pub const ALL: [Heuristic; FEATURE_COUNT] = [
        Heuristic::UsingIp,
        Heuristic::LongUrl,
        Heuristic::ShortUrl,
        Heuristic::Symbol,
        Heuristic::Redirecting,
        Heuristic::PrefixSuffix,
        Heuristic::SubDomains,
        Heuristic::Https,
        Heuristic::Favicon,
        Heuristic::NonStdPort,
        Heuristic::HttpsDomainUrl,
        Heuristic::RequestUrl,
        Heuristic::AnchorUrl,
        Heuristic::LinksInScriptTags,
        Heuristic::ServerFormHandler,
        Heuristic::InfoEmail,
        Heuristic::WebsiteForwarding,
        Heuristic::StatusBarCust,
        Heuristic::DisableRightClick,
        Heuristic::UsingPopupWindow,
        Heuristic::IframeRedirection,
        Heuristic::LinksPointingToPage,
    ];

    /// Column name used in checkpoint tables.
    pub fn name(self) -> &'static str {
        match self {
            Heuristic::UsingIp => "UsingIp",
            Heuristic::LongUrl => "LongUrl",
            Heuristic::ShortUrl => "ShortUrl",
            Heuristic::Symbol => "Symbol",
            Heuristic::Redirecting => "Redirecting",
            Heuristic::PrefixSuffix => "PrefixSuffix",
            Heuristic::SubDomains => "SubDomains",
            Heuristic::Https => "Https",
            Heuristic::Favicon => "Favicon",
            Heuristic::NonStdPort => "NonStdPort",
            Heuristic::HttpsDomainUrl => "HTTPSDomainURL",
            Heuristic::RequestUrl => "RequestURL",
            Heuristic::AnchorUrl => "AnchorURL",
            Heuristic::LinksInScriptTags => "LinksInScriptTags",
            Heuristic::ServerFormHandler => "ServerFormHandler",
            Heuristic::InfoEmail => "InfoEmail",
            Heuristic::WebsiteForwarding => "WebsiteForwarding",
            Heuristic::StatusBarCust => "StatusBarCust",
            Heuristic::DisableRightClick => "DisableRightClick",
            Heuristic::UsingPopupWindow => "UsingPopupWindow",
            Heuristic::IframeRedirection => "IframeRedirection",
            Heuristic::LinksPointingToPage => "LinksPointingToPage",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    /// Value written when the heuristic cannot be computed, including when it
    /// needs a document and none was fetched.
    pub fn default_value(self) -> i8 {
        match self {
            Heuristic::UsingIp
            | Heuristic::ShortUrl
            | Heuristic::Symbol
            | Heuristic::Redirecting
            | Heuristic::PrefixSuffix
            | Heuristic::NonStdPort
            | Heuristic::HttpsDomainUrl => BENIGN,
            Heuristic::LongUrl | Heuristic::SubDomains | Heuristic::Favicon => BORDERLINE,
            _ => SUSPICIOUS,
        }
    }

    pub fn allowed_values(self) -> &'static [i8] {
        match self {
            Heuristic::UsingIp
            | Heuristic::ShortUrl
            | Heuristic::Symbol
            | Heuristic::Redirecting
            | Heuristic::PrefixSuffix
            | Heuristic::Https
            | Heuristic::NonStdPort
            | Heuristic::HttpsDomainUrl
            | Heuristic::InfoEmail
            | Heuristic::StatusBarCust
            | Heuristic::DisableRightClick
            | Heuristic::UsingPopupWindow
            | Heuristic::IframeRedirection => BINARY,
            _ => TERNARY,
        }
    }

    pub fn needs_document(self) -> bool {
        matches!(
            self,
            Heuristic::Favicon
                | Heuristic::RequestUrl
                | Heuristic::AnchorUrl
                | Heuristic::LinksInScriptTags
                | Heuristic::ServerFormHandler
                | Heuristic::InfoEmail
                | Heuristic::WebsiteForwarding
                | Heuristic::StatusBarCust
                | Heuristic::DisableRightClick
                | Heuristic::UsingPopupWindow
                | Heuristic::IframeRedirection
                | Heuristic::LinksPointingToPage
        )
    }

    fn evaluate(self, ctx: &ExtractionContext) -> HeuristicResult {
        match self {
            Heuristic::UsingIp => address_bar::using_ip(ctx),
            Heuristic::LongUrl => address_bar::long_url(ctx),
            Heuristic::ShortUrl => address_bar::short_url(ctx),
            Heuristic::Symbol => address_bar::symbol(ctx),
            Heuristic::Redirecting => address_bar::redirecting(ctx),
            Heuristic::PrefixSuffix => address_bar::prefix_suffix(ctx),
            Heuristic::SubDomains => address_bar::sub_domains(ctx),
            Heuristic::Https => address_bar::https(ctx),
            Heuristic::Favicon => page_structure::favicon(ctx),
            Heuristic::NonStdPort => address_bar::non_std_port(ctx),
            Heuristic::HttpsDomainUrl => address_bar::https_domain_url(ctx),
            Heuristic::RequestUrl => page_structure::request_url(ctx),
            Heuristic::AnchorUrl => page_structure::anchor_url(ctx),
            Heuristic::LinksInScriptTags => page_structure::links_in_script_tags(ctx),
            Heuristic::ServerFormHandler => page_structure::server_form_handler(ctx),
            Heuristic::InfoEmail => page_source::info_email(ctx),
            Heuristic::WebsiteForwarding => page_source::website_forwarding(ctx),
            Heuristic::StatusBarCust => page_source::status_bar_cust(ctx),
            Heuristic::DisableRightClick => page_source::disable_right_click(ctx),
            Heuristic::UsingPopupWindow => page_source::using_popup_window(ctx),
            Heuristic::IframeRedirection => page_source::iframe_redirection(ctx),
            Heuristic::LinksPointingToPage => page_source::links_pointing_to_page(ctx),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum HeuristicError {
    #[error("no document available")]
    NoDocument,
    #[error("address could not be parsed")]
    Unparsed,
}

pub type HeuristicResult = Result<i8, HeuristicError>;

/// Everything a heuristic may look at.
pub struct ExtractionContext<'a> {
    /// The address exactly as submitted.
    pub url: &'a str,
    /// Strict parse; `None` when the address has no usable scheme.
    pub parsed: Option<Url>,
    /// Authority of the strict parse (userinfo, host and port), empty if unparsed.
    pub domain: String,
    /// Host from the lenient parse, used where a scheme-less address still has a host.
    pub host: Option<String>,
    pub document: Option<FetchedDocument>,
}

impl<'a> ExtractionContext<'a> {
    pub fn new(url: &'a str, document: Option<FetchedDocument>) -> Self {
        let parsed = Url::parse(url).ok();
        let domain = parsed
            .as_ref()
            .map(|u| u[url::Position::BeforeUsername..url::Position::AfterPort].to_string())
            .unwrap_or_default();
        let host = ParsedAddress::parse_lenient(url).map(|p| p.host);

        Self {
            url,
            parsed,
            domain,
            host,
            document,
        }
    }

    pub fn document(&self) -> Result<&FetchedDocument, HeuristicError> {
        self.document.as_ref().ok_or(HeuristicError::NoDocument)
    }

    pub fn parsed(&self) -> Result<&Url, HeuristicError> {
        self.parsed.as_ref().ok_or(HeuristicError::Unparsed)
    }

    /// True when `value` names this site: it contains the full URL or the authority.
    pub fn references_site(&self, value: &str) -> bool {
        value.contains(self.url) || (!self.domain.is_empty() && value.contains(&self.domain))
    }
}

/// Fixed-order heuristic outputs fed to the classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureVector([i8; FEATURE_COUNT]);

impl FeatureVector {
    pub fn new(values: [i8; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn get(&self, heuristic: Heuristic) -> i8 {
        self.0[heuristic.index()]
    }

    pub fn as_slice(&self) -> &[i8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn named(&self) -> Vec<(&'static str, i8)> {
        Heuristic::ALL
            .iter()
            .map(|h| (h.name(), self.get(*h)))
            .collect()
    }

    pub fn to_f64(&self) -> [f64; FEATURE_COUNT] {
        self.0.map(f64::from)
    }
}

/// Vector plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Extraction {
    pub vector: FeatureVector,
    pub document_available: bool,
    /// Heuristics that fell back to their default value.
    pub fallbacks: Vec<Heuristic>,
}

#[derive(Debug, Default, Clone)]
pub struct FeatureEngine;

impl FeatureEngine {
    pub fn new() -> Self {
        Self
    }

    /// Run every heuristic over the address and an optional fetched response.
    pub fn extract(&self, url: &str, response: Option<FetchedResponse>) -> Extraction {
        let document = response.map(FetchedDocument::from_response);
        let document_available = document.is_some();
        let ctx = ExtractionContext::new(url, document);

        let mut values = [BORDERLINE; FEATURE_COUNT];
        let mut fallbacks = Vec::new();

        for heuristic in Heuristic::ALL {
            values[heuristic.index()] = match heuristic.evaluate(&ctx) {
                Ok(value) => value,
                Err(e) => {
                    log::debug!(
                        "{} fell back to {} for {}: {}",
                        heuristic.name(),
                        heuristic.default_value(),
                        url,
                        e
                    );
                    fallbacks.push(heuristic);
                    heuristic.default_value()
                }
            };
        }

        Extraction {
            vector: FeatureVector::new(values),
            document_available,
            fallbacks,
        }
    }

    /// Fetch the page (one bounded attempt) and extract. A failed fetch leaves
    /// the document-based heuristics on their defaults.
    pub async fn extract_live(
        &self,
        fetcher: &dyn DocumentFetcher,
        url: &str,
        timeout: Duration,
    ) -> Extraction {
        let response = match fetcher.fetch(url, timeout).await {
            Ok(response) => Some(response),
            Err(e) => {
                log::debug!("Cannot fetch content for {url}: {e}");
                None
            }
        };
        self.extract(url, response)
    }
}

/// Three-way split of a percentage: below `low` is benign, below `high` borderline.
pub(crate) fn tier(percentage: f64, low: f64, high: f64) -> i8 {
    if percentage < low {
        BENIGN
    } else if percentage < high {
        BORDERLINE
    } else {
        SUSPICIOUS
    }
}
