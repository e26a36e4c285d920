use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::config::DatasetKeyShape;
use crate::store::{Collection, ListEntry, ListQuery, ListStore, StoreError};

/// Label carried by a dataset entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetLabel {
    Phishing,
    Legitimate,
}

impl DatasetLabel {
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "phishing" => Some(DatasetLabel::Phishing),
            "legitimate" => Some(DatasetLabel::Legitimate),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListCategory {
    Blacklisted,
    Whitelisted,
}

/// Membership of one key in the curated collections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListResolution {
    pub in_blacklist: bool,
    pub in_whitelist: bool,
}

impl ListResolution {
    /// Blacklist membership outranks whitelist membership.
    pub fn category(&self) -> Option<ListCategory> {
        if self.in_blacklist {
            Some(ListCategory::Blacklisted)
        } else if self.in_whitelist {
            Some(ListCategory::Whitelisted)
        } else {
            None
        }
    }
}

pub struct ListMatcher<'a> {
    store: &'a dyn ListStore,
}

impl<'a> ListMatcher<'a> {
    pub fn new(store: &'a dyn ListStore) -> Self {
        Self { store }
    }

    /// Queries treating `key` and `http(s)://key[/anything]` as the same entry.
    pub fn equivalence_queries(key: &str) -> Vec<ListQuery> {
        let mut queries = vec![ListQuery::Exact(key.to_string())];
        let pattern = format!(r"(?i)^https?://{}(/.*)?$", regex::escape(key));
        match Regex::new(&pattern) {
            Ok(regex) => queries.push(ListQuery::Pattern(regex)),
            Err(e) => log::debug!("Skipping pattern lookup for {key}: {e}"),
        }
        queries
    }

    pub fn lookup(
        &self,
        collection: Collection,
        key: &str,
    ) -> Result<Option<ListEntry>, StoreError> {
        if key.is_empty() {
            return Ok(None);
        }
        self.store
            .find_one(collection, &Self::equivalence_queries(key))
    }

    /// Check both curated lists for a normalized key.
    pub fn resolve(&self, key: &str) -> Result<ListResolution, StoreError> {
        let in_blacklist = self.lookup(Collection::Blacklist, key)?.is_some();
        let in_whitelist = self.lookup(Collection::Whitelist, key)?.is_some();

        if in_blacklist || in_whitelist {
            log::info!(
                "List hit for {}: blacklist={}, whitelist={}",
                key,
                in_blacklist,
                in_whitelist
            );
        }

        Ok(ListResolution {
            in_blacklist,
            in_whitelist,
        })
    }

    /// Label of the address in the labelled dataset, if any.
    ///
    /// `address` is the submitted string and `key` its normalized form; which
    /// one is compared depends on how the dataset stores its entries.
    pub fn lookup_dataset(
        &self,
        address: &str,
        key: &str,
        shape: DatasetKeyShape,
    ) -> Result<Option<DatasetLabel>, StoreError> {
        let entry = match shape {
            DatasetKeyShape::LiteralUrl => self.lookup_literal(address)?,
            DatasetKeyShape::Domain => self.lookup(Collection::Dataset, key)?,
            DatasetKeyShape::Either => match self.lookup_literal(address)? {
                Some(entry) => Some(entry),
                None => self.lookup(Collection::Dataset, key)?,
            },
        };

        Ok(entry.and_then(|entry| {
            let label = entry.label.as_deref().and_then(DatasetLabel::parse);
            if label.is_none() {
                log::debug!("Dataset entry {} has no usable label", entry.url);
            }
            label
        }))
    }

    fn lookup_literal(&self, address: &str) -> Result<Option<ListEntry>, StoreError> {
        let address = address.trim();
        if address.is_empty() {
            return Ok(None);
        }
        self.store.find_one(
            Collection::Dataset,
            &[ListQuery::Exact(address.to_string())],
        )
    }
}
