//! The classifier façade: decides whether a URL's outcome can be predicted
//! from history, or whether it must actually be fetched, and records
//! whatever it learns back into the dataset and the forest.
//!
//! Grounded on `accesspredict/spider.py`'s `Spider.predict`: dataset cache
//! check, `predict_before_filter` hook, forest lookup, `predict_before_fetch`
//! hook, fetch with redirect following (cycle/`len(history) > 15` abort),
//! `predict_after_fetch`, then `_update_history_classification` recording
//! the outcome against every URL in the redirect chain.

use crate::dataset::{DatasetRecord, DatasetStore};
use crate::error::{CoreError, CoreResult};
use crate::filter::Prediction;
use crate::forest::{ClassId, URLForest};
use crate::smoothing::confidence;
use crate::tokenizer::tokenize;
use chrono::Utc;

const MAX_REDIRECTS: usize = 15;

/// The response to one fetch, stripped to what the façade's bookkeeping
/// needs — actual HTTP mechanics live behind [`Fetcher`].
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub final_url: String,
    pub status: u16,
    pub redirect_location: Option<String>,
    pub body_sniff: Vec<u8>,
}

/// An external collaborator hooked into the façade at three points, the
/// way `URLCategoryPredictor` is in the original: before the filter is
/// consulted, before a fetch is issued, and after a fetch completes.
pub trait ExternalClassifier {
    fn predict_before_filter(&self, url: &str, min_confidence: f64) -> Option<f64>;
    fn predict_before_fetch(&self, url: &str, min_confidence: f64) -> Option<f64>;
    fn predict_after_fetch(&self, response: &FetchedResponse, min_confidence: f64) -> f64;

    fn stream_mode(&self) -> bool {
        true
    }
    fn head_mode(&self) -> bool {
        false
    }
}

/// A classifier with no external collaborator: every hook defers straight
/// to the forest/fetch path.
pub struct NoExternalClassifier;

impl ExternalClassifier for NoExternalClassifier {
    fn predict_before_filter(&self, _url: &str, _min_confidence: f64) -> Option<f64> {
        None
    }
    fn predict_before_fetch(&self, _url: &str, _min_confidence: f64) -> Option<f64> {
        None
    }
    fn predict_after_fetch(&self, response: &FetchedResponse, _min_confidence: f64) -> f64 {
        if (200..300).contains(&response.status) {
            1.0
        } else {
            0.0
        }
    }
}

/// Performs the actual network fetch. Implemented by [`crate::fetch::HttpFetcher`]
/// for real use, and by an in-memory fixture in tests.
pub trait Fetcher {
    fn fetch(
        &self,
        url: &str,
        referer: Option<&str>,
        head: bool,
    ) -> impl std::future::Future<Output = CoreResult<FetchedResponse>> + Send;
}

pub struct ClassifierFacade<F, C, D> {
    forest: URLForest,
    dataset: D,
    classifier: C,
    fetcher: F,
}

impl<F, C, D> ClassifierFacade<F, C, D>
where
    F: Fetcher,
    C: ExternalClassifier,
    D: DatasetStore,
{
    pub fn new(forest: URLForest, dataset: D, classifier: C, fetcher: F) -> Self {
        ClassifierFacade {
            forest,
            dataset,
            classifier,
            fetcher,
        }
    }

    pub fn forest(&self) -> &URLForest {
        &self.forest
    }

    /// Predicts whether `url` will succeed for `class_id`, fetching it (and
    /// following redirects) only when neither the dataset cache, an
    /// external classifier hook, nor the forest can answer confidently.
    pub async fn predict(
        &self,
        class_id: &ClassId,
        url: &str,
        min_confidence: f64,
    ) -> CoreResult<Prediction> {
        if min_confidence <= 0.0 {
            return Err(CoreError::usage("min_confidence must be positive"));
        }

        if let Some(record) = self.dataset.get_if_recent(class_id, url, Utc::now()) {
            if confidence(record.probability) > min_confidence {
                tracing::debug!(%url, probability = record.probability, "dataset cache hit");
                return Ok(probability_to_prediction(record.probability));
            }
        }

        if let Some(p) = self.classifier.predict_before_filter(url, min_confidence) {
            tracing::debug!(%url, p, "pre-filter hook answered");
            self.record(class_id, url, p).await?;
            return Ok(probability_to_prediction(p));
        }

        match self.forest.predict_success(class_id, url)? {
            Prediction::Success => {
                tracing::debug!(%url, "forest predicts success");
                return Ok(Prediction::Success);
            }
            Prediction::Failure => {
                tracing::debug!(%url, "forest predicts failure");
                return Ok(Prediction::Failure);
            }
            Prediction::Unknown => {}
        }

        if let Some(p) = self.classifier.predict_before_fetch(url, min_confidence) {
            tracing::debug!(%url, p, "pre-fetch hook answered");
            self.record(class_id, url, p).await?;
            return Ok(probability_to_prediction(p));
        }

        let (probability, history) = self.fetch_and_classify(url, min_confidence).await;

        for visited in &history {
            self.record(class_id, visited, probability).await?;
        }

        Ok(probability_to_prediction(probability))
    }

    /// Fetches `url`, following redirects up to [`MAX_REDIRECTS`] hops while
    /// accumulating the visited history. A fetch failure, a redirect cycle,
    /// or an overflowing chain is swallowed here rather than propagated —
    /// per the façade's error-handling contract these all downgrade to a
    /// failed prediction (probability 0) recorded against whatever history
    /// was actually visited before the failure, not just the original URL.
    async fn fetch_and_classify(&self, url: &str, min_confidence: f64) -> (f64, Vec<String>) {
        let mut history = vec![url.to_string()];
        let mut current = url.to_string();
        let mut referer: Option<String> = None;

        loop {
            if history.len() > MAX_REDIRECTS {
                let err = CoreError::RedirectAbuse(format!(
                    "redirect chain exceeded {MAX_REDIRECTS} hops starting at {url}"
                ));
                tracing::warn!(%url, %err, "recording failure against visited history");
                return (0.0, history);
            }

            let fetched = self
                .fetcher
                .fetch(&current, referer.as_deref(), self.classifier.head_mode())
                .await;
            let response = match fetched {
                Ok(response) => response,
                Err(e) => {
                    let err = CoreError::External(e.to_string());
                    tracing::warn!(%url, %err, "recording failure against visited history");
                    return (0.0, history);
                }
            };

            match &response.redirect_location {
                Some(next) if *next != current => {
                    if history.contains(next) {
                        let err = CoreError::RedirectAbuse(format!("redirect cycle detected at {next}"));
                        tracing::warn!(%url, %err, "recording failure against visited history");
                        return (0.0, history);
                    }
                    referer = Some(current.clone());
                    current = next.clone();
                    history.push(current.clone());
                }
                _ => {
                    let probability = self.classifier.predict_after_fetch(&response, min_confidence);
                    return (probability, history);
                }
            }
        }
    }

    async fn record(&self, class_id: &ClassId, url: &str, probability: f64) -> CoreResult<()> {
        let success = probability >= 0.5;
        self.forest.add_url(class_id, url, success)?;
        self.dataset.set(DatasetRecord {
            datestamp: Utc::now().date_naive(),
            class_id: class_id.clone(),
            probability,
            url: url.to_string(),
        })
    }
}

fn probability_to_prediction(p: f64) -> Prediction {
    if p >= 0.5 {
        Prediction::Success
    } else {
        Prediction::Failure
    }
}

/// Tokenizes a URL purely to validate it before handing it to the forest;
/// the façade itself never keys anything off the token sequence directly.
/// A null/empty/unparseable URL tokenizes to nothing, which is rejected
/// here rather than silently accepted into the tree.
pub fn validate_url(url: &str) -> CoreResult<()> {
    if tokenize(url).is_empty() {
        return Err(CoreError::usage(format!("invalid or empty url: {url}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::FileDatasetStore;
    use crate::filter::FilterConfig;
    use std::sync::Mutex;
    use tempfile::NamedTempFile;

    struct ScriptedFetcher {
        responses: Mutex<std::collections::VecDeque<FetchedResponse>>,
    }

    impl Fetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str, _referer: Option<&str>, _head: bool) -> CoreResult<FetchedResponse> {
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| CoreError::External("no scripted response left".into()))
        }
    }

    fn facade_with(
        responses: Vec<FetchedResponse>,
    ) -> ClassifierFacade<ScriptedFetcher, NoExternalClassifier, FileDatasetStore> {
        let mut forest = URLForest::new(FilterConfig {
            min_urls_prediction: 1,
            prune_delay: 0,
            ..FilterConfig::default()
        });
        forest.add_class(ClassId::new("pdf").unwrap(), None);
        let dataset = FileDatasetStore::open(NamedTempFile::new().unwrap().path()).unwrap();
        ClassifierFacade::new(
            forest,
            dataset,
            NoExternalClassifier,
            ScriptedFetcher {
                responses: Mutex::new(responses.into()),
            },
        )
    }

    fn ok_response(url: &str) -> FetchedResponse {
        FetchedResponse {
            final_url: url.to_string(),
            status: 200,
            redirect_location: None,
            body_sniff: Vec::new(),
        }
    }

    #[tokio::test]
    async fn fetches_and_records_when_forest_is_unknown() {
        let facade = facade_with(vec![ok_response("http://example.com/a.pdf")]);
        let class = ClassId::new("pdf").unwrap();
        let prediction = facade
            .predict(&class, "http://example.com/a.pdf", 0.9)
            .await
            .unwrap();
        assert_eq!(prediction, Prediction::Success);
    }

    #[tokio::test]
    async fn redirect_chain_past_limit_is_downgraded_to_failure() {
        let mut responses = Vec::new();
        for i in 0..(MAX_REDIRECTS + 2) {
            responses.push(FetchedResponse {
                final_url: format!("http://example.com/{i}"),
                status: 302,
                redirect_location: Some(format!("http://example.com/{}", i + 1)),
                body_sniff: Vec::new(),
            });
        }
        let facade = facade_with(responses);
        let class = ClassId::new("pdf").unwrap();
        let prediction = facade
            .predict(&class, "http://example.com/0", 0.9)
            .await
            .unwrap();
        assert_eq!(prediction, Prediction::Failure);
    }

    #[tokio::test]
    async fn rejects_non_positive_min_confidence() {
        let facade = facade_with(vec![]);
        let class = ClassId::new("pdf").unwrap();
        assert!(facade.predict(&class, "http://example.com", 0.0).await.is_err());
    }
}
