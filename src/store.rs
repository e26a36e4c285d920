//! Curated list storage.
//!
//! The decision path only ever reads from the store, through [`ListStore`].
//! [`MemoryListStore`] keeps every collection in memory, loaded from a YAML
//! file and, optionally, the labelled dataset CSV.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Collection {
    Blacklist,
    Whitelist,
    Dataset,
}

impl Collection {
    pub fn name(self) -> &'static str {
        match self {
            Collection::Blacklist => "blacklist",
            Collection::Whitelist => "whitelist",
            Collection::Dataset => "dataset",
        }
    }
}

/// One condition of a lookup. A lookup matches when any of its queries does.
#[derive(Debug, Clone)]
pub enum ListQuery {
    /// Case-insensitive equality with the stored entry.
    Exact(String),
    /// Stored entry matched against a regex (callers build it case-insensitive).
    Pattern(Regex),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub url: String,
    #[serde(default, rename = "type")]
    pub label: Option<String>,
}

impl ListEntry {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: None,
        }
    }

    pub fn labelled(url: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            label: Some(label.into()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("cannot read store file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid store file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("invalid dataset csv: {0}")]
    Csv(#[from] csv::Error),
}

pub trait ListStore: Send + Sync {
    /// First entry of `collection` matching any of `queries`.
    fn find_one(
        &self,
        collection: Collection,
        queries: &[ListQuery],
    ) -> Result<Option<ListEntry>, StoreError>;

    /// Liveness check run once at startup.
    fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Row of the labelled dataset CSV (`url,domain,type`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRecord {
    pub url: String,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(rename = "type")]
    pub label: String,
}

pub fn read_dataset_csv(path: &Path) -> Result<Vec<DatasetRecord>, csv::Error> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        let mut record: DatasetRecord = record?;
        record.label = record.label.trim().to_lowercase();
        records.push(record);
    }
    Ok(records)
}

#[derive(Debug, Default, Deserialize)]
struct StoreFile {
    #[serde(default)]
    blacklist: Vec<String>,
    #[serde(default)]
    whitelist: Vec<String>,
    #[serde(default)]
    dataset: Vec<ListEntry>,
}

#[derive(Debug, Default)]
struct CollectionData {
    entries: Vec<ListEntry>,
    /// Lower-cased entry -> position of its first occurrence.
    exact_index: HashMap<String, usize>,
}

impl CollectionData {
    fn insert(&mut self, entry: ListEntry) {
        let key = entry.url.trim().to_lowercase();
        self.exact_index.entry(key).or_insert(self.entries.len());
        self.entries.push(entry);
    }

    fn find(&self, queries: &[ListQuery]) -> Option<&ListEntry> {
        // earliest stored entry wins, whichever query matched it
        queries
            .iter()
            .filter_map(|query| match query {
                ListQuery::Exact(key) => self.exact_index.get(&key.trim().to_lowercase()).copied(),
                ListQuery::Pattern(pattern) => self
                    .entries
                    .iter()
                    .position(|entry| pattern.is_match(entry.url.trim())),
            })
            .min()
            .map(|position| &self.entries[position])
    }
}

#[derive(Debug, Default)]
pub struct MemoryListStore {
    collections: HashMap<Collection, CollectionData>,
}

impl MemoryListStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file(path: &str) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_string(),
            source,
        })?;
        let file: StoreFile = serde_yaml::from_str(&content).map_err(|source| StoreError::Parse {
            path: path.to_string(),
            source,
        })?;

        let mut store = Self::new();
        for url in file.blacklist {
            store.insert(Collection::Blacklist, ListEntry::new(url));
        }
        for url in file.whitelist {
            store.insert(Collection::Whitelist, ListEntry::new(url));
        }
        for entry in file.dataset {
            store.insert(Collection::Dataset, entry);
        }

        log::info!(
            "Loaded list store from {}: {} blacklist, {} whitelist, {} dataset entries",
            path,
            store.len(Collection::Blacklist),
            store.len(Collection::Whitelist),
            store.len(Collection::Dataset)
        );
        Ok(store)
    }

    /// Append every row of a labelled dataset CSV to the dataset collection.
    pub fn import_dataset_csv(&mut self, path: &Path) -> Result<usize, StoreError> {
        let records = read_dataset_csv(path)?;
        let count = records.len();
        for record in records {
            self.insert(
                Collection::Dataset,
                ListEntry::labelled(record.url, record.label),
            );
        }
        log::info!("Imported {} dataset rows from {}", count, path.display());
        Ok(count)
    }

    pub fn insert(&mut self, collection: Collection, entry: ListEntry) {
        self.collections.entry(collection).or_default().insert(entry);
    }

    pub fn with_entry(mut self, collection: Collection, entry: ListEntry) -> Self {
        self.insert(collection, entry);
        self
    }

    pub fn len(&self, collection: Collection) -> usize {
        self.collections
            .get(&collection)
            .map(|data| data.entries.len())
            .unwrap_or(0)
    }
}

impl ListStore for MemoryListStore {
    fn find_one(
        &self,
        collection: Collection,
        queries: &[ListQuery],
    ) -> Result<Option<ListEntry>, StoreError> {
        Ok(self
            .collections
            .get(&collection)
            .and_then(|data| data.find(queries))
            .cloned())
    }
}
