use crate::config::schema::ForestConfig;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use validator::Validate;

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ForestConfig> {
        let path = path.as_ref();
        let mut visited = HashSet::new();
        Self::load_with_inheritance(path, &mut visited, false)
    }

    fn load_with_inheritance(
        path: &Path,
        visited: &mut HashSet<PathBuf>,
        is_parent_load: bool,
    ) -> Result<ForestConfig> {
        let path = fs::canonicalize(path)
            .with_context(|| format!("Failed to canonicalize path: {}", path.display()))?;

        if visited.contains(&path) {
            anyhow::bail!("Circular inheritance detected involving {}", path.display());
        }
        visited.insert(path.clone());

        let config = Self::load_file(&path)?;

        let final_config = if let Some(parent_path_str) = &config.extends {
            let parent_path = path
                .parent()
                .context("Cannot determine parent directory")?
                .join(parent_path_str);

            let parent_config = Self::load_with_inheritance(&parent_path, visited, true)?;
            Self::merge_configs(parent_config, config)
        } else {
            config
        };

        if !is_parent_load {
            final_config.validate()?;
            for class in final_config.class_overrides.keys() {
                if !final_config.classes.iter().any(|c| c == class) {
                    anyhow::bail!(
                        "class_overrides has an entry for \"{class}\" which is not in classes"
                    );
                }
            }
        }

        Ok(final_config)
    }

    fn load_file(path: &Path) -> Result<ForestConfig> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => {
                let config: ForestConfig = serde_json::from_str(&content)?;
                Ok(config)
            }
            Some("yaml") | Some("yml") => {
                let config: ForestConfig = serde_yaml::from_str(&content)?;
                Ok(config)
            }
            Some("toml") => {
                let config: ForestConfig = toml::from_str(&content)?;
                Ok(config)
            }
            _ => anyhow::bail!("Unsupported config file extension: {}", path.display()),
        }
    }

    fn merge_configs(mut parent: ForestConfig, child: ForestConfig) -> ForestConfig {
        if !child.name.is_empty() {
            parent.name = child.name;
        }
        if !child.classes.is_empty() {
            parent.classes = child.classes;
        }
        if child.prune_delay != default_prune_delay() {
            parent.prune_delay = child.prune_delay;
        }
        if child.min_urls_prune != default_min_urls_prune() {
            parent.min_urls_prune = child.min_urls_prune;
        }
        if child.min_children != default_min_children() {
            parent.min_children = child.min_children;
        }
        if child.min_rate != default_min_rate() {
            parent.min_rate = child.min_rate;
        }
        if child.confidence_threshold != default_confidence_threshold() {
            parent.confidence_threshold = child.confidence_threshold;
        }
        if child.min_urls_prediction != default_min_urls_prediction() {
            parent.min_urls_prediction = child.min_urls_prediction;
        }
        if child.use_frequentist_gate {
            parent.use_frequentist_gate = child.use_frequentist_gate;
        }
        if child.dataset_path.is_some() {
            parent.dataset_path = child.dataset_path;
        }
        parent.reverse = child.reverse;
        parent.smoothing = child.smoothing;
        parent.extends = None;
        for (class, over) in child.class_overrides {
            parent.class_overrides.insert(class, over);
        }
        parent
    }
}

fn default_prune_delay() -> u64 {
    20
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(contents: &str, suffix: &str) -> NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn loads_a_standalone_yaml_config() {
        let file = write_config(
            "name: test-forest\nclasses: [\"pdf\"]\n",
            ".yaml",
        );
        let config = ConfigLoader::load(file.path()).unwrap();
        assert_eq!(config.name, "test-forest");
        assert_eq!(config.classes, vec!["pdf".to_string()]);
    }

    #[test]
    fn rejects_unsupported_extension() {
        let file = write_config("name: x\n", ".ini");
        assert!(ConfigLoader::load(file.path()).is_err());
    }

    #[test]
    fn rejects_override_for_unknown_class() {
        let file = write_config(
            "name: test-forest\nclasses: [\"pdf\"]\nclass_overrides:\n  html:\n    confidence_threshold: 0.5\n",
            ".yaml",
        );
        assert!(ConfigLoader::load(file.path()).is_err());
    }

    #[test]
    fn child_override_wins_but_parent_overrides_for_other_classes_survive() {
        let parent = write_config(
            "name: base\nclasses: [\"pdf\", \"html\"]\nclass_overrides:\n  pdf:\n    confidence_threshold: 0.5\n  html:\n    confidence_threshold: 0.6\n",
            ".yaml",
        );
        let child_contents = format!(
            "extends: {}\nclasses: [\"pdf\", \"html\"]\nclass_overrides:\n  pdf:\n    confidence_threshold: 0.95\n",
            parent.path().file_name().unwrap().to_str().unwrap()
        );
        let child = tempfile::Builder::new()
            .suffix(".yaml")
            .tempfile_in(parent.path().parent().unwrap())
            .unwrap();
        std::fs::write(child.path(), child_contents).unwrap();

        let config = ConfigLoader::load(child.path()).unwrap();
        assert_eq!(
            config.class_overrides.get("pdf").unwrap().confidence_threshold,
            Some(0.95)
        );
        assert_eq!(
            config.class_overrides.get("html").unwrap().confidence_threshold,
            Some(0.6)
        );
    }
}
