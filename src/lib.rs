pub mod classifier;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod forest;
pub mod smoothing;
pub mod token;
pub mod tokenizer;
pub mod tree;

pub use classifier::{ClassifierFacade, ExternalClassifier, Fetcher, NoExternalClassifier};
pub use dataset::{DatasetRecord, DatasetStore, FileDatasetStore};
pub use error::{CoreError, CoreResult};
pub use filter::{FilterConfig, Prediction, URLFilter};
pub use forest::{ClassId, URLForest};
pub use token::{Token, TokenSequence};
pub use tree::{PrefTree, PruneRule};
