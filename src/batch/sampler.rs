use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::store::DatasetRecord;

/// One address of the balanced sample with its checkpoint label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleItem {
    pub url: String,
    /// `1` legitimate, `-1` phishing.
    pub label: i8,
}

/// Draw up to `per_class` legitimate and phishing records, then shuffle.
///
/// The same seed drives each class draw and the final shuffle, so a given
/// dataset and seed always produce the same order. Records of any other type
/// are ignored.
pub fn balanced_sample(records: &[DatasetRecord], per_class: usize, seed: u64) -> Vec<SampleItem> {
    let draw = |wanted: &str, label: i8| -> Vec<SampleItem> {
        let pool: Vec<&DatasetRecord> = records.iter().filter(|r| r.label == wanted).collect();
        if pool.len() < per_class {
            log::warn!(
                "Only {} {} records available, wanted {}",
                pool.len(),
                wanted,
                per_class
            );
        }
        let mut rng = StdRng::seed_from_u64(seed);
        pool.choose_multiple(&mut rng, per_class)
            .map(|record| SampleItem {
                url: record.url.clone(),
                label,
            })
            .collect()
    };

    let mut sample = draw("legitimate", 1);
    sample.extend(draw("phishing", -1));

    let mut rng = StdRng::seed_from_u64(seed);
    sample.shuffle(&mut rng);
    sample
}
