use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::checkpoint::{self, LabelCounts, LabelledRow};
use super::sampler::{balanced_sample, SampleItem};
use crate::config::BatchConfig;
use crate::features::{FeatureEngine, FeatureVector};
use crate::fetcher::DocumentFetcher;
use crate::store::read_dataset_csv;

/// Slack on top of the fetch timeout before an item is given up on.
const ITEM_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct BatchSummary {
    pub processed: usize,
    pub failed: usize,
    pub output: PathBuf,
    pub labels: LabelCounts,
}

struct ChunkRows {
    rows: Vec<LabelledRow>,
    failed: usize,
}

#[derive(Debug, thiserror::Error)]
enum ItemError {
    #[error("empty address")]
    EmptyAddress,
    #[error("extraction did not finish within {0:?}")]
    Deadline(Duration),
}

/// Sequential, resumable feature extraction over a labelled sample.
pub struct BatchRunner<'a> {
    config: &'a BatchConfig,
    engine: &'a FeatureEngine,
    fetcher: &'a dyn DocumentFetcher,
}

impl<'a> BatchRunner<'a> {
    pub fn new(
        config: &'a BatchConfig,
        engine: &'a FeatureEngine,
        fetcher: &'a dyn DocumentFetcher,
    ) -> Self {
        Self {
            config,
            engine,
            fetcher,
        }
    }

    /// Load the dataset CSV and draw the configured balanced sample.
    pub fn load_sample(&self) -> anyhow::Result<Vec<SampleItem>> {
        let path = Path::new(&self.config.dataset_path);
        let records = read_dataset_csv(path)
            .with_context(|| format!("Failed to read dataset {}", path.display()))?;
        log::info!("Loaded {} dataset records from {}", records.len(), path.display());

        let sample = balanced_sample(&records, self.config.samples_per_class, self.config.seed);
        log::info!("Sampled {} records", sample.len());
        Ok(sample)
    }

    /// Rows of `checkpoint_features_<start>.csv`, or a fresh start when that
    /// checkpoint cannot be used.
    fn resume_rows(&self, start: usize) -> (usize, Vec<LabelledRow>) {
        if start == 0 {
            return (0, Vec::new());
        }
        let path = checkpoint::checkpoint_path(&self.config.output_dir(), start);
        match checkpoint::read_rows(&path) {
            Ok(rows) if rows.len() == start => {
                log::info!("Loaded {} rows from {}", rows.len(), path.display());
                (start, rows)
            }
            Ok(rows) => {
                log::warn!(
                    "{} holds {} rows, expected {}; starting over",
                    path.display(),
                    rows.len(),
                    start
                );
                (0, Vec::new())
            }
            Err(e) => {
                log::warn!("Cannot load checkpoint {}: {:#}; starting over", path.display(), e);
                (0, Vec::new())
            }
        }
    }

    pub async fn run(&self, items: &[SampleItem], start: usize) -> anyhow::Result<BatchSummary> {
        let output_dir = self.config.output_dir();
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Failed to create {}", output_dir.display()))?;

        let (start, mut rows) = self.resume_rows(start);
        let total = items.len();
        let batch_size = self.config.batch_size.max(1);
        let mut failed = 0;

        log::info!("Starting at item {start}/{total}");

        let mut batch_start = start;
        while batch_start < total {
            let batch_end = (batch_start + batch_size).min(total);
            log::info!("Processing items {}-{}", batch_start, batch_end - 1);

            let mut chunk = self.process_chunk(items, batch_start, batch_end).await;
            failed += chunk.failed;
            rows.append(&mut chunk.rows);
            // release the chunk's buffers before checkpointing and pausing
            drop(chunk);

            let path = checkpoint::checkpoint_path(&output_dir, batch_end);
            checkpoint::write_rows(&path, &rows)?;
            log::info!("Saved checkpoint {} with {} rows", path.display(), rows.len());

            batch_start = batch_end;
            pause(self.config.batch_pause_ms).await;
        }

        let output = output_dir.join(checkpoint::FINAL_FILE);
        checkpoint::write_rows(&output, &rows)?;
        let labels = LabelCounts::of(&rows);
        log::info!(
            "Finished: {} rows ({} legitimate, {} phishing, {} failed) in {}",
            rows.len(),
            labels.legitimate,
            labels.phishing,
            failed,
            output.display()
        );

        Ok(BatchSummary {
            processed: rows.len(),
            failed,
            output,
            labels,
        })
    }

    /// Extract `items[start..end]`. Every fetched document is dropped as soon
    /// as its vector is computed; only the rows outlive the chunk.
    async fn process_chunk(&self, items: &[SampleItem], start: usize, end: usize) -> ChunkRows {
        let mut chunk = ChunkRows {
            rows: Vec::with_capacity(end.saturating_sub(start)),
            failed: 0,
        };

        for (index, item) in items.iter().enumerate().take(end).skip(start) {
            log::debug!("[{}/{}] {}", index, items.len(), truncate(&item.url, 80));
            let row = match self.process_item(item).await {
                Ok(vector) => LabelledRow {
                    vector,
                    label: item.label,
                },
                Err(e) => {
                    log::warn!("Item {index} ({}) failed: {e}", item.url);
                    chunk.failed += 1;
                    LabelledRow::placeholder(item.label)
                }
            };
            chunk.rows.push(row);
            pause(self.config.item_delay_ms).await;
        }
        chunk
    }

    async fn process_item(&self, item: &SampleItem) -> Result<FeatureVector, ItemError> {
        if item.url.trim().is_empty() {
            return Err(ItemError::EmptyAddress);
        }
        let deadline = self.config.timeout() + ITEM_GRACE;
        let extraction = tokio::time::timeout(
            deadline,
            self.engine
                .extract_live(self.fetcher, &item.url, self.config.timeout()),
        )
        .await
        .map_err(|_| ItemError::Deadline(deadline))?;
        Ok(extraction.vector)
    }
}

async fn pause(millis: u64) {
    if millis > 0 {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }
}

fn truncate(value: &str, max_chars: usize) -> &str {
    match value.char_indices().nth(max_chars) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::checkpoint::{checkpoint_path, discover, read_rows, FINAL_FILE};
    use crate::features::{Heuristic, SUSPICIOUS};
    use crate::fetcher::OfflineFetcher;

    fn config(dir: &Path) -> BatchConfig {
        BatchConfig {
            output_dir: dir.to_string_lossy().to_string(),
            batch_size: 2,
            item_delay_ms: 0,
            batch_pause_ms: 0,
            timeout_seconds: 1,
            ..BatchConfig::default()
        }
    }

    fn items() -> Vec<SampleItem> {
        vec![
            SampleItem {
                url: "http://bit.ly/test".into(),
                label: -1,
            },
            SampleItem {
                url: "https://example.com/".into(),
                label: 1,
            },
            SampleItem {
                url: "  ".into(),
                label: 1,
            },
            SampleItem {
                url: "http://192.168.0.1/login".into(),
                label: -1,
            },
            SampleItem {
                url: "https://example.org/".into(),
                label: 1,
            },
        ]
    }

    #[tokio::test]
    async fn test_run_writes_checkpoints_and_final() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let engine = FeatureEngine::new();
        let runner = BatchRunner::new(&config, &engine, &OfflineFetcher);

        let summary = runner.run(&items(), 0).await.unwrap();
        assert_eq!(summary.processed, 5);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.labels.legitimate, 3);

        let counts: Vec<usize> = discover(dir.path()).unwrap().iter().map(|f| f.count).collect();
        assert_eq!(counts, vec![2, 4, 5]);

        let rows = read_rows(&dir.path().join(FINAL_FILE)).unwrap();
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].vector.get(Heuristic::ShortUrl), SUSPICIOUS);
        assert_eq!(rows[2], LabelledRow::placeholder(1));
        assert_eq!(rows[3].vector.get(Heuristic::UsingIp), SUSPICIOUS);
    }

    #[tokio::test]
    async fn test_resume_continues_after_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let engine = FeatureEngine::new();
        let runner = BatchRunner::new(&config, &engine, &OfflineFetcher);

        let seeded = vec![LabelledRow::placeholder(-1), LabelledRow::placeholder(1)];
        checkpoint::write_rows(&checkpoint_path(dir.path(), 2), &seeded).unwrap();

        let summary = runner.run(&items(), 2).await.unwrap();
        assert_eq!(summary.processed, 5);

        let rows = read_rows(&dir.path().join(FINAL_FILE)).unwrap();
        // the first two rows come from the checkpoint, not from re-extraction
        assert_eq!(rows[0], LabelledRow::placeholder(-1));
        assert_eq!(rows[1], LabelledRow::placeholder(1));
    }

    #[tokio::test]
    async fn test_unreadable_checkpoint_restarts_from_zero() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let engine = FeatureEngine::new();
        let runner = BatchRunner::new(&config, &engine, &OfflineFetcher);

        let summary = runner.run(&items(), 4).await.unwrap();
        assert_eq!(summary.processed, 5);
        let rows = read_rows(&dir.path().join(FINAL_FILE)).unwrap();
        assert_eq!(rows[0].vector.get(Heuristic::ShortUrl), SUSPICIOUS);
    }

    #[tokio::test]
    async fn test_resume_skips_truncated_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let engine = FeatureEngine::new();
        let runner = BatchRunner::new(&config, &engine, &OfflineFetcher);

        let seeded = vec![LabelledRow::placeholder(-1), LabelledRow::placeholder(1)];
        checkpoint::write_rows(&checkpoint_path(dir.path(), 2), &seeded).unwrap();
        std::fs::write(
            checkpoint_path(dir.path(), 4),
            format!("{}\n{}\n", checkpoint::header().join(","), vec!["1"; 23].join(",")),
        )
        .unwrap();

        let start = checkpoint::last_processed_index(dir.path()).unwrap();
        assert_eq!(start, 2);

        let summary = runner.run(&items(), start).await.unwrap();
        assert_eq!(summary.processed, 5);
        let rows = read_rows(&dir.path().join(FINAL_FILE)).unwrap();
        assert_eq!(rows[0], LabelledRow::placeholder(-1));
        assert_eq!(rows[1], LabelledRow::placeholder(1));

        // the rerun overwrote the truncated file with a complete one
        assert_eq!(checkpoint::last_processed_index(dir.path()).unwrap(), 5);
        assert_eq!(read_rows(&checkpoint_path(dir.path(), 4)).unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_chunk_holds_only_its_own_rows() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let engine = FeatureEngine::new();
        let runner = BatchRunner::new(&config, &engine, &OfflineFetcher);

        let chunk = runner.process_chunk(&items(), 2, 4).await;
        assert_eq!(chunk.rows.len(), 2);
        assert_eq!(chunk.failed, 1);
        assert_eq!(chunk.rows[0], LabelledRow::placeholder(1));
        assert_eq!(chunk.rows[1].vector.get(Heuristic::UsingIp), SUSPICIOUS);
    }

    #[test]
    fn test_load_sample_from_csv() {
        let dir = tempfile::tempdir().unwrap();
        let dataset = dir.path().join("dataset.csv");
        std::fs::write(
            &dataset,
            "url,domain,type\nhttps://a.example/,a.example,legitimate\n\
             http://b.test/,b.test,phishing\nhttp://c.test/,c.test,phishing\n",
        )
        .unwrap();

        let mut config = config(dir.path());
        config.dataset_path = dataset.to_string_lossy().to_string();
        config.samples_per_class = 1;
        let engine = FeatureEngine::new();
        let runner = BatchRunner::new(&config, &engine, &OfflineFetcher);

        let sample = runner.load_sample().unwrap();
        assert_eq!(sample.len(), 2);
        assert_eq!(sample.iter().filter(|s| s.label == -1).count(), 1);
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("ünïcödé", 3), "ünï");
        assert_eq!(truncate("short", 80), "short");
    }
}
