pub mod batch;
pub mod classifier;
pub mod config;
pub mod context;
pub mod decision_engine;
pub mod document;
pub mod features;
pub mod fetcher;
pub mod list_matcher;
pub mod normalization;
pub mod store;

pub use classifier::{Classifier, LinearModel};
pub use config::Config;
pub use context::AppContext;
pub use decision_engine::{Decision, DecisionEngine, Source, Verdict};
pub use features::{FeatureEngine, FeatureVector, Heuristic};
pub use normalization::normalize_address;
