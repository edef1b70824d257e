//! A concurrent collection of [`URLFilter`]s, one per class.
//!
//! Grounded on `accesspredict/forest.py`'s `URLForest`: one lock per class
//! (a `gevent.Semaphore` there, a [`std::sync::Mutex`] here — both binary
//! semaphores), acquired by looking the class up first so two callers
//! working on different classes never block each other, and a `clear()`
//! that refuses to run while any class's lock is held.

use crate::error::{CoreError, CoreResult};
use crate::filter::{FilterConfig, Prediction, URLFilter};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, TryLockError};

/// Identifies one class's filter inside a [`URLForest`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassId(pub String);

impl ClassId {
    pub fn new(id: impl Into<String>) -> CoreResult<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(CoreError::usage("class id must not be empty"));
        }
        if id.contains('\t') {
            return Err(CoreError::usage("class id must not contain a tab"));
        }
        Ok(ClassId(id))
    }
}

impl std::fmt::Display for ClassId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

pub struct URLForest {
    filters: HashMap<ClassId, Mutex<URLFilter>>,
    default_config: FilterConfig,
}

impl URLForest {
    pub fn new(default_config: FilterConfig) -> Self {
        URLForest {
            filters: HashMap::new(),
            default_config,
        }
    }

    /// Registers a class with its own filter, overriding the forest's
    /// default configuration if `config` is given.
    pub fn add_class(&mut self, class_id: ClassId, config: Option<FilterConfig>) {
        let filter = URLFilter::new(config.unwrap_or_else(|| self.default_config.clone()));
        self.filters.insert(class_id, Mutex::new(filter));
    }

    fn lock(&self, class_id: &ClassId) -> CoreResult<std::sync::MutexGuard<'_, URLFilter>> {
        let mutex = self
            .filters
            .get(class_id)
            .ok_or_else(|| CoreError::usage(format!("unknown class {class_id}")))?;
        mutex
            .lock()
            .map_err(|_| CoreError::structural(format!("filter lock poisoned for class {class_id}")))
    }

    pub fn add_url(&self, class_id: &ClassId, url: &str, success: bool) -> CoreResult<()> {
        self.lock(class_id)?.add_url(url, success)
    }

    pub fn force_prune(&self, class_id: &ClassId) -> CoreResult<()> {
        self.lock(class_id)?.force_prune()
    }

    pub fn generate_regex(&self, class_id: &ClassId) -> CoreResult<String> {
        Ok(self.lock(class_id)?.generate_regex())
    }

    pub fn predict_success(&self, class_id: &ClassId, url: &str) -> CoreResult<Prediction> {
        Ok(self.lock(class_id)?.predict_success(url))
    }

    /// Feeds a batch of `(url, success)` pairs to one class while holding
    /// that class's lock exactly once, instead of once per URL.
    pub fn warm<I>(&self, class_id: &ClassId, records: I) -> CoreResult<()>
    where
        I: IntoIterator<Item = (String, bool)>,
    {
        let mut filter = self.lock(class_id)?;
        for (url, success) in records {
            filter.add_url(&url, success)?;
        }
        Ok(())
    }

    /// Resets every class's filter. Fails if any class's lock is currently
    /// held by another caller, mirroring the original's refusal to clear
    /// concurrently with in-flight work.
    pub fn clear(&self) -> CoreResult<()> {
        let mut guards = Vec::with_capacity(self.filters.len());
        for (class_id, mutex) in &self.filters {
            match mutex.try_lock() {
                Ok(guard) => guards.push(guard),
                Err(TryLockError::WouldBlock) => {
                    return Err(CoreError::usage(format!(
                        "cannot clear forest while class {class_id} is in use"
                    )))
                }
                Err(TryLockError::Poisoned(_)) => {
                    return Err(CoreError::structural(format!(
                        "filter lock poisoned for class {class_id}"
                    )))
                }
            }
        }
        for mut guard in guards {
            guard.clear();
        }
        Ok(())
    }

    pub fn classes(&self) -> impl Iterator<Item = &ClassId> {
        self.filters.keys()
    }

    pub fn save(&self) -> CoreResult<String> {
        let mut snapshot = HashMap::new();
        for (class_id, mutex) in &self.filters {
            let filter = self
                .lock(class_id)
                .map_err(|_| CoreError::structural("failed to lock filter for save"))?;
            snapshot.insert(class_id.clone(), filter.clone());
        }
        serde_json::to_string(&ForestSnapshot { snapshot })
            .map_err(|e| CoreError::structural(format!("failed to serialize forest: {e}")))
    }

    pub fn load(data: &str, default_config: FilterConfig) -> CoreResult<Self> {
        let ForestSnapshot { snapshot } = serde_json::from_str(data)
            .map_err(|e| CoreError::structural(format!("failed to deserialize forest: {e}")))?;
        let filters = snapshot
            .into_iter()
            .map(|(class_id, filter)| (class_id, Mutex::new(filter)))
            .collect();
        Ok(URLForest {
            filters,
            default_config,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct ForestSnapshot {
    snapshot: HashMap<ClassId, URLFilter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn forest_with_classes(ids: &[&str]) -> URLForest {
        let mut forest = URLForest::new(FilterConfig {
            min_urls_prediction: 1,
            prune_delay: 0,
            ..FilterConfig::default()
        });
        for id in ids {
            forest.add_class(ClassId::new(*id).unwrap(), None);
        }
        forest
    }

    #[test]
    fn unknown_class_is_usage_error() {
        let forest = forest_with_classes(&["pdf"]);
        let missing = ClassId::new("missing").unwrap();
        assert!(forest.predict_success(&missing, "http://example.com").is_err());
    }

    #[test]
    fn add_and_predict_roundtrip() {
        let forest = forest_with_classes(&["pdf"]);
        let class = ClassId::new("pdf").unwrap();
        for i in 0..10 {
            forest
                .add_url(&class, &format!("http://example.com/{i}.pdf"), true)
                .unwrap();
        }
        assert_eq!(
            forest.predict_success(&class, "http://example.com/999.pdf").unwrap(),
            Prediction::Success
        );
    }

    #[test]
    fn concurrent_access_to_distinct_classes_does_not_block() {
        let forest = Arc::new(forest_with_classes(&["a", "b"]));
        let a = ClassId::new("a").unwrap();
        let b = ClassId::new("b").unwrap();

        let forest_a = forest.clone();
        let handle = thread::spawn(move || {
            for i in 0..100 {
                forest_a
                    .add_url(&a, &format!("http://example.com/{i}"), true)
                    .unwrap();
            }
        });

        for i in 0..100 {
            forest
                .add_url(&b, &format!("http://example.org/{i}"), false)
                .unwrap();
        }
        handle.join().unwrap();
    }

    #[test]
    fn clear_fails_while_lock_held() {
        let forest = forest_with_classes(&["pdf"]);
        let class = ClassId::new("pdf").unwrap();
        let _guard = forest.lock(&class).unwrap();
        assert!(forest.clear().is_err());
    }
}
