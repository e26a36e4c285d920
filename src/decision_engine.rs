//! Decision policy
//!
//! Resolves a submitted address to a verdict. Sources are consulted in a fixed
//! order and the first one that has an answer decides:
//! blacklist, whitelist, labelled dataset, then the classifier over a freshly
//! extracted feature vector.

use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use crate::classifier::Classifier;
use crate::context::AppContext;
use crate::features::{Extraction, FeatureVector};
use crate::list_matcher::{DatasetLabel, ListCategory, ListMatcher, ListResolution};
use crate::normalization::normalize_address;
use crate::store::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Phishing,
    Legitimate,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Blacklist,
    Whitelist,
    Dataset,
    Model,
    Error,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub url: String,
    pub normalized: String,
    pub decision: Decision,
    pub source: Source,
    /// Only set when the classifier produced the decision.
    pub confidence: Option<f64>,
    pub elapsed_ms: f64,
    pub in_blacklist: bool,
    pub in_whitelist: bool,
}

impl Verdict {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Outcome of the model stage before it is stamped into a verdict.
struct ModelOutcome {
    decision: Decision,
    source: Source,
    confidence: Option<f64>,
}

impl ModelOutcome {
    fn error() -> Self {
        Self {
            decision: Decision::Unknown,
            source: Source::Error,
            confidence: None,
        }
    }
}

/// Run a classifier call, turning a panic inside the model into `None`.
fn guarded<T>(classifier: &dyn Classifier, url: &str, call: impl FnOnce() -> T) -> Option<T> {
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(value) => Some(value),
        Err(_) => {
            log::error!("Classifier {} panicked on {}", classifier.name(), url);
            None
        }
    }
}

pub struct DecisionEngine<'a> {
    ctx: &'a AppContext,
}

impl<'a> DecisionEngine<'a> {
    pub fn new(ctx: &'a AppContext) -> Self {
        Self { ctx }
    }

    /// Classify one address. Only store failures are returned as errors; every
    /// fetch, extraction or model problem ends in an `unknown`/`error` verdict.
    pub async fn evaluate(&self, url: &str) -> Result<Verdict, StoreError> {
        let start = Instant::now();
        let normalized = normalize_address(url);

        let finish = |decision: Decision,
                      source: Source,
                      confidence: Option<f64>,
                      lists: ListResolution| {
            let elapsed = start.elapsed().as_secs_f64() * 1000.0;
            Verdict {
                url: url.to_string(),
                normalized: normalized.clone(),
                decision,
                source,
                confidence,
                elapsed_ms: (elapsed * 100.0).round() / 100.0,
                in_blacklist: lists.in_blacklist,
                in_whitelist: lists.in_whitelist,
            }
        };

        if normalized.is_empty() {
            return Ok(finish(
                Decision::Unknown,
                Source::None,
                None,
                ListResolution::default(),
            ));
        }

        let matcher = ListMatcher::new(self.ctx.store.as_ref());
        let lists = matcher.resolve(&normalized).map_err(|e| {
            log::error!("List lookup failed for {normalized}: {e}");
            e
        })?;

        match lists.category() {
            Some(ListCategory::Blacklisted) => {
                return Ok(finish(Decision::Phishing, Source::Blacklist, None, lists));
            }
            Some(ListCategory::Whitelisted) => {
                return Ok(finish(Decision::Legitimate, Source::Whitelist, None, lists));
            }
            None => {}
        }

        let label = matcher
            .lookup_dataset(url, &normalized, self.ctx.config.dataset_key_shape)
            .map_err(|e| {
                log::error!("Dataset lookup failed for {normalized}: {e}");
                e
            })?;
        if let Some(label) = label {
            log::info!("Dataset hit for {normalized}: {label:?}");
            let decision = match label {
                DatasetLabel::Phishing => Decision::Phishing,
                DatasetLabel::Legitimate => Decision::Legitimate,
            };
            return Ok(finish(decision, Source::Dataset, None, lists));
        }

        let outcome = self.model_stage(url).await;
        Ok(finish(
            outcome.decision,
            outcome.source,
            outcome.confidence,
            lists,
        ))
    }

    async fn model_stage(&self, url: &str) -> ModelOutcome {
        let extraction = self
            .ctx
            .engine
            .extract_live(
                self.ctx.fetcher.as_ref(),
                url,
                self.ctx.config.fetch.timeout(),
            )
            .await;

        let Some(vector) = self.usable_vector(url, &extraction) else {
            return ModelOutcome::error();
        };

        let Some(classifier) = self.ctx.classifier.as_deref() else {
            log::debug!("No classifier loaded, cannot decide {url}");
            return ModelOutcome::error();
        };

        let Some(prediction) = guarded(classifier, url, || classifier.predict(&vector)) else {
            return ModelOutcome::error();
        };
        let label = match prediction {
            Ok(label) => label,
            Err(e) => {
                log::warn!("Classifier {} failed on {}: {}", classifier.name(), url, e);
                return ModelOutcome::error();
            }
        };

        let decision = if label == self.ctx.config.legitimate_label {
            Decision::Legitimate
        } else {
            Decision::Phishing
        };

        let Some(probabilities) =
            guarded(classifier, url, || classifier.predict_proba(&vector))
        else {
            return ModelOutcome::error();
        };
        let confidence = match probabilities {
            Some(Ok(probabilities)) => probabilities
                .iter()
                .find(|(candidate, _)| *candidate == label)
                .map(|(_, probability)| *probability),
            Some(Err(e)) => {
                log::debug!("Classifier {} gave no probability: {}", classifier.name(), e);
                None
            }
            None => None,
        };

        log::debug!(
            "Model decided {:?} for {} (label {}, confidence {:?})",
            decision,
            url,
            label,
            confidence
        );

        ModelOutcome {
            decision,
            source: Source::Model,
            confidence,
        }
    }

    fn usable_vector(&self, url: &str, extraction: &Extraction) -> Option<FeatureVector> {
        if self.ctx.config.require_document && !extraction.document_available {
            log::debug!("No document for {url}; feature vector not usable");
            return None;
        }
        Some(extraction.vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::features::tests::response;
    use crate::fetcher::{DocumentFetcher, FetchError, FetchedResponse, OfflineFetcher};
    use crate::store::{Collection, ListEntry, ListQuery, ListStore, MemoryListStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    struct StaticFetcher(FetchedResponse);

    #[async_trait]
    impl DocumentFetcher for StaticFetcher {
        async fn fetch(&self, _url: &str, _timeout: Duration) -> Result<FetchedResponse, FetchError> {
            Ok(self.0.clone())
        }
    }

    struct CountingClassifier {
        calls: Arc<AtomicUsize>,
        label: i8,
        probability: Option<f64>,
    }

    impl Classifier for CountingClassifier {
        fn predict(&self, _vector: &FeatureVector) -> anyhow::Result<i8> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.label)
        }

        fn predict_proba(&self, _vector: &FeatureVector) -> Option<anyhow::Result<Vec<(i8, f64)>>> {
            self.probability
                .map(|p| Ok(vec![(self.label, p), (-self.label, 1.0 - p)]))
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn predict(&self, _vector: &FeatureVector) -> anyhow::Result<i8> {
            anyhow::bail!("model exploded")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct PanickingClassifier;

    impl Classifier for PanickingClassifier {
        fn predict(&self, _vector: &FeatureVector) -> anyhow::Result<i8> {
            panic!("index out of range in model weights")
        }

        fn name(&self) -> &str {
            "panicking"
        }
    }

    struct PanickingProbabilities;

    impl Classifier for PanickingProbabilities {
        fn predict(&self, _vector: &FeatureVector) -> anyhow::Result<i8> {
            Ok(-1)
        }

        fn predict_proba(&self, _vector: &FeatureVector) -> Option<anyhow::Result<Vec<(i8, f64)>>> {
            panic!("probability head not trained")
        }

        fn name(&self) -> &str {
            "half-trained"
        }
    }

    struct UnavailableStore;

    impl ListStore for UnavailableStore {
        fn find_one(
            &self,
            _collection: Collection,
            _queries: &[ListQuery],
        ) -> Result<Option<ListEntry>, StoreError> {
            Err(StoreError::Unavailable("connection refused".into()))
        }
    }

    fn lists() -> MemoryListStore {
        MemoryListStore::new()
            .with_entry(Collection::Blacklist, ListEntry::new("evil.com"))
            .with_entry(Collection::Whitelist, ListEntry::new("https://good.org/"))
            .with_entry(Collection::Whitelist, ListEntry::new("evil.com"))
            .with_entry(
                Collection::Dataset,
                ListEntry::labelled("http://shady.biz/pay", "phishing"),
            )
    }

    fn counting(label: i8, probability: Option<f64>) -> (Arc<AtomicUsize>, Box<dyn Classifier>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let classifier = CountingClassifier {
            calls: Arc::clone(&calls),
            label,
            probability,
        };
        (calls, Box::new(classifier))
    }

    fn context(
        config: Config,
        fetcher: Box<dyn DocumentFetcher>,
        classifier: Option<Box<dyn Classifier>>,
    ) -> AppContext {
        AppContext::new(config, Box::new(lists()), fetcher, classifier)
    }

    #[tokio::test]
    async fn test_blacklist_wins_without_classifier_call() {
        let (calls, classifier) = counting(1, Some(0.9));
        let ctx = context(Config::default(), Box::new(OfflineFetcher), Some(classifier));

        let verdict = ctx
            .decision_engine()
            .evaluate("https://EVIL.com/login")
            .await
            .unwrap();

        assert_eq!(verdict.decision, Decision::Phishing);
        assert_eq!(verdict.source, Source::Blacklist);
        assert_eq!(verdict.normalized, "evil.com");
        assert!(verdict.in_blacklist && verdict.in_whitelist);
        assert_eq!(verdict.confidence, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_whitelist_hit_is_legitimate_without_confidence() {
        let (calls, classifier) = counting(-1, Some(0.9));
        let ctx = context(Config::default(), Box::new(OfflineFetcher), Some(classifier));

        let verdict = ctx.decision_engine().evaluate("good.org").await.unwrap();

        assert_eq!(verdict.decision, Decision::Legitimate);
        assert_eq!(verdict.source, Source::Whitelist);
        assert_eq!(verdict.confidence, None);
        assert!(!verdict.in_blacklist);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_dataset_label_decides() {
        let ctx = context(Config::default(), Box::new(OfflineFetcher), None);

        let verdict = ctx
            .decision_engine()
            .evaluate("http://shady.biz/pay")
            .await
            .unwrap();

        assert_eq!(verdict.decision, Decision::Phishing);
        assert_eq!(verdict.source, Source::Dataset);
    }

    #[tokio::test]
    async fn test_unknown_address_with_failed_fetch_is_error() {
        let (calls, classifier) = counting(1, Some(0.8));
        let ctx = context(Config::default(), Box::new(OfflineFetcher), Some(classifier));

        let verdict = ctx
            .decision_engine()
            .evaluate("https://nowhere.example/")
            .await
            .unwrap();

        assert_eq!(verdict.decision, Decision::Unknown);
        assert_eq!(verdict.source, Source::Error);
        assert_eq!(verdict.confidence, None);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_model_decides_with_confidence() {
        let (calls, classifier) = counting(-1, Some(0.87));
        let fetcher = StaticFetcher(response("<html><body><p>hi</p></body></html>"));
        let ctx = context(Config::default(), Box::new(fetcher), Some(classifier));

        let verdict = ctx
            .decision_engine()
            .evaluate("https://nowhere.example/")
            .await
            .unwrap();

        assert_eq!(verdict.decision, Decision::Phishing);
        assert_eq!(verdict.source, Source::Model);
        assert_eq!(verdict.confidence, Some(0.87));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_model_without_probabilities_has_null_confidence() {
        let (_, classifier) = counting(1, None);
        let mut config = Config::default();
        config.require_document = false;
        let ctx = context(config, Box::new(OfflineFetcher), Some(classifier));

        let verdict = ctx
            .decision_engine()
            .evaluate("https://nowhere.example/")
            .await
            .unwrap();

        assert_eq!(verdict.decision, Decision::Legitimate);
        assert_eq!(verdict.source, Source::Model);
        assert_eq!(verdict.confidence, None);
    }

    #[tokio::test]
    async fn test_classifier_failure_is_unknown_error() {
        let fetcher = StaticFetcher(response("<html></html>"));
        let ctx = context(
            Config::default(),
            Box::new(fetcher),
            Some(Box::new(FailingClassifier)),
        );

        let verdict = ctx
            .decision_engine()
            .evaluate("https://nowhere.example/")
            .await
            .unwrap();
        assert_eq!(verdict.decision, Decision::Unknown);
        assert_eq!(verdict.source, Source::Error);
    }

    #[tokio::test]
    async fn test_classifier_panic_is_unknown_error() {
        let fetcher = StaticFetcher(response("<html></html>"));
        let ctx = context(
            Config::default(),
            Box::new(fetcher),
            Some(Box::new(PanickingClassifier)),
        );

        let verdict = ctx
            .decision_engine()
            .evaluate("https://nowhere.example/")
            .await
            .unwrap();
        assert_eq!(verdict.decision, Decision::Unknown);
        assert_eq!(verdict.source, Source::Error);
        assert_eq!(verdict.confidence, None);
    }

    #[tokio::test]
    async fn test_probability_panic_is_unknown_error() {
        let fetcher = StaticFetcher(response("<html></html>"));
        let ctx = context(
            Config::default(),
            Box::new(fetcher),
            Some(Box::new(PanickingProbabilities)),
        );

        let verdict = ctx
            .decision_engine()
            .evaluate("https://nowhere.example/")
            .await
            .unwrap();
        assert_eq!(verdict.decision, Decision::Unknown);
        assert_eq!(verdict.source, Source::Error);
    }

    #[tokio::test]
    async fn test_empty_address_short_circuits() {
        let (calls, classifier) = counting(1, Some(0.5));
        let ctx = AppContext::new(
            Config::default(),
            Box::new(UnavailableStore),
            Box::new(OfflineFetcher),
            Some(classifier),
        );

        let verdict = ctx.decision_engine().evaluate("   ").await.unwrap();
        assert_eq!(verdict.decision, Decision::Unknown);
        assert_eq!(verdict.source, Source::None);
        assert_eq!(verdict.normalized, "");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_store_failure_is_surfaced() {
        let ctx = AppContext::new(
            Config::default(),
            Box::new(UnavailableStore),
            Box::new(OfflineFetcher),
            None,
        );

        let result = ctx.decision_engine().evaluate("example.com").await;
        assert!(matches!(result, Err(StoreError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_verdict_json_shape() {
        let ctx = context(Config::default(), Box::new(OfflineFetcher), None);
        let verdict = ctx.decision_engine().evaluate("evil.com").await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&verdict.to_json().unwrap()).unwrap();
        assert_eq!(json["decision"], "phishing");
        assert_eq!(json["source"], "blacklist");
        assert_eq!(json["confidence"], serde_json::Value::Null);
        assert_eq!(json["in_blacklist"], true);
    }
}
