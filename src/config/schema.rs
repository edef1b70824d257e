use crate::filter::FilterConfig;
use crate::smoothing::{ConstantDirichlet, ExponentialDirichlet, SmoothingConfig};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use validator::Validate;

/// Which smoothing prior a config file selects; kept untagged like the
/// teacher's `SelectorConfig` so a plain string name ("constant") or a
/// fully-spelled-out table both parse.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SmoothingChoice {
    Named(String),
    Explicit(SmoothingConfig),
}

impl Default for SmoothingChoice {
    fn default() -> Self {
        SmoothingChoice::Named("constant".to_string())
    }
}

impl SmoothingChoice {
    pub fn resolve(&self) -> SmoothingConfig {
        match self {
            SmoothingChoice::Explicit(cfg) => cfg.clone(),
            SmoothingChoice::Named(name) => match name.as_str() {
                "exponential" => SmoothingConfig::ExponentialDirichlet(ExponentialDirichlet::default()),
                _ => SmoothingConfig::ConstantDirichlet(ConstantDirichlet::default()),
            },
        }
    }
}

/// A per-class tweak to an otherwise shared forest configuration — e.g. a
/// stricter class needs a higher confidence threshold than its siblings
/// without every class carrying its own full config block.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClassOverride {
    #[serde(default)]
    pub confidence_threshold: Option<f64>,

    #[serde(default)]
    pub min_urls_prediction: Option<u64>,

    #[serde(default)]
    pub smoothing: Option<SmoothingChoice>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct ForestConfig {
    #[serde(default)]
    #[validate(length(min = 1))]
    pub name: String,

    #[serde(default)]
    #[validate(length(min = 1))]
    pub classes: Vec<String>,

    #[serde(default = "default_prune_delay")]
    pub prune_delay: u64,

    #[serde(default = "default_true")]
    pub reverse: bool,

    #[serde(default = "default_min_urls_prune")]
    pub min_urls_prune: u64,

    #[serde(default = "default_min_children")]
    pub min_children: usize,

    #[serde(default = "default_min_rate")]
    #[validate(range(min = 0.0, max = 1.0))]
    pub min_rate: f64,

    #[serde(default = "default_confidence_threshold")]
    #[validate(range(exclusive_min = 0.0, max = 1.0))]
    pub confidence_threshold: f64,

    #[serde(default = "default_min_urls_prediction")]
    pub min_urls_prediction: u64,

    #[serde(default)]
    pub use_frequentist_gate: bool,

    #[serde(default)]
    pub smoothing: SmoothingChoice,

    #[serde(default)]
    pub dataset_path: Option<String>,

    /// Optional path to a parent configuration file to inherit from.
    #[serde(default)]
    pub extends: Option<String>,

    /// Per-class tweaks, keyed by a name that must also appear in `classes`.
    #[serde(default)]
    pub class_overrides: HashMap<String, ClassOverride>,
}

impl ForestConfig {
    pub fn filter_config(&self) -> FilterConfig {
        FilterConfig {
            prune_delay: self.prune_delay,
            reverse: self.reverse,
            min_urls_prune: self.min_urls_prune,
            min_children: self.min_children,
            min_rate: self.min_rate,
            confidence_threshold: self.confidence_threshold,
            min_urls_prediction: self.min_urls_prediction,
            smoothing: self.smoothing.resolve(),
            use_frequentist_gate: self.use_frequentist_gate,
        }
    }

    /// The filter config a given class should actually run with: the
    /// forest's shared defaults, with that class's override (if any)
    /// applied field by field.
    pub fn filter_config_for(&self, class: &str) -> FilterConfig {
        let mut config = self.filter_config();
        if let Some(over) = self.class_overrides.get(class) {
            if let Some(threshold) = over.confidence_threshold {
                config.confidence_threshold = threshold;
            }
            if let Some(min_urls) = over.min_urls_prediction {
                config.min_urls_prediction = min_urls;
            }
            if let Some(smoothing) = &over.smoothing {
                config.smoothing = smoothing.resolve();
            }
        }
        config
    }
}

fn default_prune_delay() -> u64 {
    20
}
fn default_true() -> bool {
    true
}
fn default_min_urls_prune() -> u64 {
    10
}
fn default_min_children() -> usize {
    2
}
fn default_min_rate() -> f64 {
    0.9
}
fn default_confidence_threshold() -> f64 {
    0.9
}
fn default_min_urls_prediction() -> u64 {
    10
}
