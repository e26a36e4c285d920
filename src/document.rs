use scraper::Html;

use crate::fetcher::FetchedResponse;

/// Only this many characters of the body go into the element tree.
pub const TREE_PREFIX_CHARS: usize = 10_000;

/// A fetched page owned by a single extraction call.
pub struct FetchedDocument {
    response: FetchedResponse,
    tree: Html,
}

impl FetchedDocument {
    pub fn from_response(response: FetchedResponse) -> Self {
        let prefix_end = response
            .body
            .char_indices()
            .nth(TREE_PREFIX_CHARS)
            .map(|(idx, _)| idx)
            .unwrap_or(response.body.len());
        let tree = Html::parse_document(&response.body[..prefix_end]);

        Self { response, tree }
    }

    pub fn body(&self) -> &str {
        &self.response.body
    }

    pub fn tree(&self) -> &Html {
        &self.tree
    }

    pub fn history(&self) -> &[String] {
        &self.response.history
    }

    pub fn status(&self) -> u16 {
        self.response.status
    }

    pub fn final_url(&self) -> &str {
        &self.response.final_url
    }
}

impl std::fmt::Debug for FetchedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchedDocument")
            .field("final_url", &self.response.final_url)
            .field("status", &self.response.status)
            .field("redirects", &self.response.history.len())
            .field("body_len", &self.response.body.len())
            .finish()
    }
}
