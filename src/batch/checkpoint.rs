//! Checkpoint tables.
//!
//! A checkpoint is a CSV of every labelled vector computed so far, named
//! `checkpoint_features_<count>.csv` where `<count>` is the number of rows.

use anyhow::Context;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::features::{FeatureVector, Heuristic, FEATURE_COUNT};

pub const LABEL_COLUMN: &str = "Label";
pub const FINAL_FILE: &str = "extracted_features_final.csv";
pub const RECOVERED_FILE: &str = "recovered_features_final.csv";

static CHECKPOINT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^checkpoint_features_(\d+)\.csv$").unwrap());

/// One row of a checkpoint: the vector plus its trailing label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelledRow {
    pub vector: FeatureVector,
    /// `1` legitimate, `-1` phishing.
    pub label: i8,
}

impl LabelledRow {
    /// Row written when an item could not be processed at all.
    pub fn placeholder(label: i8) -> Self {
        Self {
            vector: FeatureVector::new([0; FEATURE_COUNT]),
            label,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFile {
    pub path: PathBuf,
    pub count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LabelCounts {
    pub legitimate: usize,
    pub phishing: usize,
}

impl LabelCounts {
    pub fn of(rows: &[LabelledRow]) -> Self {
        rows.iter().fold(Self::default(), |mut counts, row| {
            if row.label == 1 {
                counts.legitimate += 1;
            } else {
                counts.phishing += 1;
            }
            counts
        })
    }
}

pub fn header() -> Vec<&'static str> {
    Heuristic::ALL
        .iter()
        .map(|h| h.name())
        .chain(std::iter::once(LABEL_COLUMN))
        .collect()
}

pub fn checkpoint_path(dir: &Path, count: usize) -> PathBuf {
    dir.join(format!("checkpoint_features_{count}.csv"))
}

/// Sibling file a table is written to before being renamed into place.
fn staging_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write a table, replacing `path` only once every row is on disk. An
/// interrupted write leaves `path` untouched.
pub fn write_rows(path: &Path, rows: &[LabelledRow]) -> anyhow::Result<()> {
    let staging = staging_path(path);
    let mut writer = csv::Writer::from_path(&staging)
        .with_context(|| format!("Failed to create {}", staging.display()))?;
    writer.write_record(header())?;
    for row in rows {
        let record: Vec<String> = row
            .vector
            .as_slice()
            .iter()
            .chain(std::iter::once(&row.label))
            .map(|value| value.to_string())
            .collect();
        writer.write_record(&record)?;
    }
    let file = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush {}: {}", staging.display(), e.error()))?;
    file.sync_all()
        .with_context(|| format!("Failed to sync {}", staging.display()))?;
    drop(file);

    std::fs::rename(&staging, path).with_context(|| {
        format!("Failed to move {} to {}", staging.display(), path.display())
    })?;
    Ok(())
}

pub fn read_rows(path: &Path) -> anyhow::Result<Vec<LabelledRow>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let columns = reader.headers()?.len();
    if columns != FEATURE_COUNT + 1 {
        anyhow::bail!(
            "{} has {} columns, expected {}",
            path.display(),
            columns,
            FEATURE_COUNT + 1
        );
    }

    let mut rows = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let mut values = [0i8; FEATURE_COUNT + 1];
        for (slot, field) in values.iter_mut().zip(record.iter()) {
            *slot = field.trim().parse().with_context(|| {
                format!("{} row {}: bad value {:?}", path.display(), line + 1, field)
            })?;
        }
        let mut features = [0i8; FEATURE_COUNT];
        features.copy_from_slice(&values[..FEATURE_COUNT]);
        rows.push(LabelledRow {
            vector: FeatureVector::new(features),
            label: values[FEATURE_COUNT],
        });
    }
    Ok(rows)
}

/// Checkpoints in `dir`, ordered by their embedded count.
pub fn discover(dir: &Path) -> anyhow::Result<Vec<CheckpointFile>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?;

    let mut found = Vec::new();
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(captures) = CHECKPOINT_NAME.captures(name) else {
            continue;
        };
        match captures[1].parse::<usize>() {
            Ok(count) => found.push(CheckpointFile {
                path: entry.path(),
                count,
            }),
            Err(e) => log::warn!("Ignoring checkpoint {name}: {e}"),
        }
    }
    found.sort_by_key(|file| file.count);
    Ok(found)
}

/// Largest checkpoint in `dir` that passes [`validate`]. Checkpoints that do
/// not, such as one cut short by a crash, are skipped.
pub fn latest(dir: &Path) -> anyhow::Result<Option<CheckpointFile>> {
    for file in discover(dir)?.into_iter().rev() {
        let validation = validate(&file);
        if validation.is_valid() {
            return Ok(Some(file));
        }
        log::warn!(
            "Skipping checkpoint {}: {}",
            file.path.display(),
            validation.problems.join("; ")
        );
    }
    Ok(None)
}

/// Number of items already processed according to the checkpoints in `dir`.
pub fn last_processed_index(dir: &Path) -> anyhow::Result<usize> {
    Ok(latest(dir)?.map(|file| file.count).unwrap_or(0))
}

#[derive(Debug, Clone)]
pub struct Validation {
    pub file: CheckpointFile,
    pub rows: usize,
    pub problems: Vec<String>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

pub fn validate(file: &CheckpointFile) -> Validation {
    let mut problems = Vec::new();
    let rows = match read_rows(&file.path) {
        Ok(rows) => rows,
        Err(e) => {
            return Validation {
                file: file.clone(),
                rows: 0,
                problems: vec![format!("{e:#}")],
            }
        }
    };

    if rows.len() != file.count {
        problems.push(format!(
            "holds {} rows but is named for {}",
            rows.len(),
            file.count
        ));
    }
    for (index, row) in rows.iter().enumerate() {
        if row.vector.as_slice().iter().any(|v| !(-1..=1).contains(v)) {
            problems.push(format!("row {} has a feature outside -1..=1", index + 1));
        }
        if row.label != 1 && row.label != -1 {
            problems.push(format!("row {} has label {}", index + 1, row.label));
        }
    }

    Validation {
        file: file.clone(),
        rows: rows.len(),
        problems,
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub source: CheckpointFile,
    pub output: PathBuf,
    pub rows: usize,
    pub labels: LabelCounts,
}

/// Copy the largest valid checkpoint in `dir` to `recovered_features_final.csv`.
pub fn recover(dir: &Path) -> anyhow::Result<Option<RecoveryReport>> {
    let Some(source) = latest(dir)? else {
        log::warn!("No usable checkpoint files found in {}", dir.display());
        return Ok(None);
    };

    let rows = read_rows(&source.path)?;
    let output = dir.join(RECOVERED_FILE);
    write_rows(&output, &rows)?;

    let report = RecoveryReport {
        labels: LabelCounts::of(&rows),
        rows: rows.len(),
        output,
        source,
    };
    log::info!(
        "Recovered {} rows from {} into {}",
        report.rows,
        report.source.path.display(),
        report.output.display()
    );
    Ok(Some(report))
}
