//! Persisted outcome history: one tab-separated record per observed URL.
//!
//! Grounded on `accesspredict/urldataset.py`'s `URLDataset` (`get`,
//! `get_if_recent` with its six-month freshness window, `set`, and a flat
//! `datestamp\tclass_id\tprobability\turl` file format, where `datestamp`
//! is `date.today().isoformat()` — a calendar date, not a timestamp) and
//! on `features/cache.rs`'s `RwLock<HashSet<_>>` pattern for the in-memory
//! layer sitting in front of the file.

use crate::error::{CoreError, CoreResult};
use crate::forest::ClassId;
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::RwLock;

pub fn default_freshness() -> chrono::Duration {
    chrono::Duration::days(183)
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatasetRecord {
    pub datestamp: NaiveDate,
    pub class_id: ClassId,
    pub probability: f64,
    pub url: String,
}

impl DatasetRecord {
    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.datestamp.format("%Y-%m-%d"),
            self.class_id,
            self.probability,
            self.url
        )
    }

    fn from_line(line: &str) -> CoreResult<Self> {
        let mut parts = line.splitn(4, '\t');
        let datestamp = parts
            .next()
            .ok_or_else(|| CoreError::usage("dataset line missing datestamp"))?;
        let class_id = parts
            .next()
            .ok_or_else(|| CoreError::usage("dataset line missing class_id"))?;
        let probability = parts
            .next()
            .ok_or_else(|| CoreError::usage("dataset line missing probability"))?;
        let url = parts
            .next()
            .ok_or_else(|| CoreError::usage("dataset line missing url"))?;

        Ok(DatasetRecord {
            datestamp: NaiveDate::parse_from_str(datestamp, "%Y-%m-%d")
                .map_err(|e| CoreError::usage(format!("bad datestamp {datestamp}: {e}")))?,
            class_id: ClassId::new(class_id.to_string())?,
            probability: probability
                .parse()
                .map_err(|e| CoreError::usage(format!("bad probability {probability}: {e}")))?,
            url: url.to_string(),
        })
    }
}

/// The façade's view of a persisted outcome history: recent-enough lookups
/// short-circuit a fetch, everything else is an append. `now` is a full
/// timestamp for caller convenience; freshness is judged on calendar days.
pub trait DatasetStore {
    fn get_if_recent(&self, class_id: &ClassId, url: &str, now: DateTime<Utc>) -> Option<DatasetRecord>;
    fn set(&self, record: DatasetRecord) -> CoreResult<()>;
    fn iter_class(&self, class_id: &ClassId) -> Vec<DatasetRecord>;
    fn iter_classes(&self) -> Vec<ClassId>;
}

/// A flat tab-separated dataset file, kept mirrored in an in-memory index
/// so repeated lookups don't re-scan the file.
pub struct FileDatasetStore {
    path: std::path::PathBuf,
    freshness: chrono::Duration,
    index: RwLock<HashMap<(ClassId, String), DatasetRecord>>,
}

impl FileDatasetStore {
    pub fn open(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let mut index = HashMap::new();
        if path.exists() {
            let contents = fs::read_to_string(&path)
                .map_err(|e| CoreError::usage(format!("cannot read dataset {}: {e}", path.display())))?;
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                let record = DatasetRecord::from_line(line)?;
                index.insert((record.class_id.clone(), record.url.clone()), record);
            }
        }
        Ok(FileDatasetStore {
            path,
            freshness: default_freshness(),
            index: RwLock::new(index),
        })
    }

    pub fn with_freshness(mut self, freshness: chrono::Duration) -> Self {
        self.freshness = freshness;
        self
    }

    fn flush(&self, index: &HashMap<(ClassId, String), DatasetRecord>) -> CoreResult<()> {
        let mut contents = String::new();
        for record in index.values() {
            contents.push_str(&record.to_line());
            contents.push('\n');
        }
        fs::write(&self.path, contents)
            .map_err(|e| CoreError::usage(format!("cannot write dataset {}: {e}", self.path.display())))
    }
}

impl DatasetStore for FileDatasetStore {
    fn get_if_recent(&self, class_id: &ClassId, url: &str, now: DateTime<Utc>) -> Option<DatasetRecord> {
        let index = self.index.read().ok()?;
        let record = index.get(&(class_id.clone(), url.to_string()))?;
        if now.date_naive().signed_duration_since(record.datestamp) <= self.freshness {
            Some(record.clone())
        } else {
            None
        }
    }

    fn set(&self, record: DatasetRecord) -> CoreResult<()> {
        let mut index = self
            .index
            .write()
            .map_err(|_| CoreError::structural("dataset index lock poisoned"))?;
        index.insert((record.class_id.clone(), record.url.clone()), record);
        self.flush(&index)
    }

    fn iter_class(&self, class_id: &ClassId) -> Vec<DatasetRecord> {
        self.index
            .read()
            .map(|index| {
                index
                    .values()
                    .filter(|r| &r.class_id == class_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn iter_classes(&self) -> Vec<ClassId> {
        self.index
            .read()
            .map(|index| {
                let mut ids: Vec<ClassId> = index.keys().map(|(c, _)| c.clone()).collect();
                ids.sort();
                ids.dedup();
                ids
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn record(url: &str, datestamp: NaiveDate) -> DatasetRecord {
        DatasetRecord {
            datestamp,
            class_id: ClassId::new("pdf").unwrap(),
            probability: 1.0,
            url: url.to_string(),
        }
    }

    #[test]
    fn round_trips_through_file() {
        let tmp = NamedTempFile::new().unwrap();
        let store = FileDatasetStore::open(tmp.path()).unwrap();
        store.set(record("http://example.com/a", Utc::now().date_naive())).unwrap();

        let reopened = FileDatasetStore::open(tmp.path()).unwrap();
        assert_eq!(reopened.iter_class(&ClassId::new("pdf").unwrap()).len(), 1);
    }

    #[test]
    fn get_if_recent_respects_freshness_window() {
        let tmp = NamedTempFile::new().unwrap();
        let store = FileDatasetStore::open(tmp.path())
            .unwrap()
            .with_freshness(chrono::Duration::days(1));
        let class = ClassId::new("pdf").unwrap();
        let stale = Utc::now().date_naive() - chrono::Duration::days(10);
        store.set(record("http://example.com/a", stale)).unwrap();

        assert!(store.get_if_recent(&class, "http://example.com/a", Utc::now()).is_none());
    }
}
