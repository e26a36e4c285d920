use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// YAML file holding the blacklist, whitelist and labelled dataset.
    pub store_path: String,
    /// Optional CSV (`url,domain,type`) merged into the dataset collection.
    pub dataset_csv_path: Option<String>,
    /// JSON-serialized linear model. Without it the model stage yields `unknown`.
    pub model_path: Option<String>,
    /// Classifier label that means "legitimate"; any other label is phishing.
    pub legitimate_label: i8,
    pub dataset_key_shape: DatasetKeyShape,
    /// Treat a failed fetch as an unusable feature vector.
    pub require_document: bool,
    pub fetch: FetchConfig,
    pub batch: BatchConfig,
}

/// How the labelled dataset keys its entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetKeyShape {
    /// Entries are full URLs matched against the submitted address verbatim.
    LiteralUrl,
    /// Entries are domains matched against the normalized key.
    Domain,
    /// Literal match first, then domain match.
    Either,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_seconds: u64,
    pub max_redirects: usize,
    pub max_body_bytes: usize,
    pub user_agent: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub dataset_path: String,
    pub output_dir: String,
    pub samples_per_class: usize,
    pub seed: u64,
    pub batch_size: usize,
    pub item_delay_ms: u64,
    pub batch_pause_ms: u64,
    pub timeout_seconds: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            store_path: "/etc/phish-guard/lists.yaml".to_string(),
            dataset_csv_path: None,
            model_path: None,
            legitimate_label: 1,
            dataset_key_shape: DatasetKeyShape::Either,
            require_document: true,
            fetch: FetchConfig::default(),
            batch: BatchConfig::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        FetchConfig {
            timeout_seconds: 10,
            max_redirects: 10,
            max_body_bytes: 1024 * 1024,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36"
                .to_string(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            dataset_path: "DataFiles/dataset_with_domain.csv".to_string(),
            output_dir: ".".to_string(),
            samples_per_class: 5000,
            seed: 42,
            batch_size: 50,
            item_delay_ms: 200,
            batch_pause_ms: 1000,
            timeout_seconds: 5,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl BatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn output_dir(&self) -> PathBuf {
        PathBuf::from(&self.output_dir)
    }
}

impl Config {
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_file(&self, path: &str) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.batch.batch_size == 0 {
            anyhow::bail!("batch.batch_size must be at least 1");
        }
        if self.fetch.timeout_seconds == 0 || self.batch.timeout_seconds == 0 {
            anyhow::bail!("fetch timeouts must be at least one second");
        }
        if ![-1, 1].contains(&self.legitimate_label) {
            anyhow::bail!(
                "legitimate_label must be 1 or -1, got {}",
                self.legitimate_label
            );
        }
        Ok(())
    }
}
