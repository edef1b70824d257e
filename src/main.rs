use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};
use urltheory::classifier::{ClassifierFacade, NoExternalClassifier};
use urltheory::config::ConfigLoader;
use urltheory::fetch::HttpFetcher;
use urltheory::{ClassId, FileDatasetStore, FilterConfig, Prediction, URLForest};

#[derive(Parser)]
#[command(name = "urltheory")]
#[command(about = "Learns which URLs are worth fetching from observed outcomes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Feed a tab-separated dataset file into a forest and save it.
    Train {
        /// Forest config file (json/yaml/toml)
        config: String,
        /// Dataset file: datestamp<TAB>class_id<TAB>probability<TAB>url
        dataset: String,
        /// Where to write the trained forest
        #[arg(short, long, default_value = "forest.json")]
        out: String,
    },
    /// Predict whether a URL will succeed against a saved forest.
    Classify {
        /// Saved forest file
        forest: String,
        /// Class to predict against
        class: String,
        /// URL to classify
        url: String,
    },
    /// Print the synthesized regex for one class.
    Regex {
        forest: String,
        class: String,
    },
    /// Force a prune pass and report before/after wildcard counts.
    Prune {
        forest: String,
        class: String,
        #[arg(short, long, default_value = "forest.json")]
        out: String,
    },
    /// Predict a URL through the full façade, fetching it if necessary.
    Predict {
        forest: String,
        dataset: String,
        class: String,
        url: String,
        #[arg(short, long, default_value_t = 0.9)]
        min_confidence: f64,
        #[arg(short, long, default_value = "forest.json")]
        out: String,
    },
}

fn init_logging() {
    fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();
}

fn load_forest(path: &str) -> Result<URLForest> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read forest file: {path}"))?;
    URLForest::load(&data, FilterConfig::default())
        .map_err(|e| anyhow::anyhow!("Failed to parse forest file {path}: {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Train { config, dataset, out } => {
            let config = ConfigLoader::load(&config)?;
            tracing::info!(name = %config.name, classes = config.classes.len(), "training forest");

            let mut forest = URLForest::new(config.filter_config());
            for class in &config.classes {
                forest.add_class(
                    ClassId::new(class.clone())?,
                    Some(config.filter_config_for(class)),
                );
            }

            let contents = std::fs::read_to_string(&dataset)
                .with_context(|| format!("Failed to read dataset: {dataset}"))?;
            let mut by_class: std::collections::HashMap<String, Vec<(String, bool)>> =
                std::collections::HashMap::new();
            for line in contents.lines().filter(|l| !l.trim().is_empty()) {
                let mut parts = line.splitn(4, '\t');
                let _datestamp = parts.next();
                let class_id = parts.next().context("dataset line missing class_id")?;
                let probability: f64 = parts
                    .next()
                    .context("dataset line missing probability")?
                    .parse()
                    .context("dataset probability is not a number")?;
                let url = parts.next().context("dataset line missing url")?;
                by_class
                    .entry(class_id.to_string())
                    .or_default()
                    .push((url.to_string(), probability >= 0.5));
            }

            for (class, records) in by_class {
                let class_id = ClassId::new(class)?;
                forest
                    .warm(&class_id, records)
                    .map_err(|e| anyhow::anyhow!("{e}"))?;
                forest.force_prune(&class_id).map_err(|e| anyhow::anyhow!("{e}"))?;
            }

            std::fs::write(&out, forest.save().map_err(|e| anyhow::anyhow!("{e}"))?)?;
            tracing::info!(out, "forest saved");
        }

        Commands::Classify { forest, class, url } => {
            let forest = load_forest(&forest)?;
            let class_id = ClassId::new(class)?;
            let prediction = forest
                .predict_success(&class_id, &url)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            match prediction {
                Prediction::Success => println!("success"),
                Prediction::Failure => println!("failure"),
                Prediction::Unknown => println!("unknown"),
            }
        }

        Commands::Regex { forest, class } => {
            let forest = load_forest(&forest)?;
            let class_id = ClassId::new(class)?;
            let regex = forest
                .generate_regex(&class_id)
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            println!("{regex}");
        }

        Commands::Prune { forest: forest_path, class, out } => {
            let forest = load_forest(&forest_path)?;
            let class_id = ClassId::new(class)?;
            forest.force_prune(&class_id).map_err(|e| anyhow::anyhow!("{e}"))?;
            std::fs::write(&out, forest.save().map_err(|e| anyhow::anyhow!("{e}"))?)?;
            tracing::info!(out, "forest pruned and saved");
        }

        Commands::Predict {
            forest,
            dataset,
            class,
            url,
            min_confidence,
            out,
        } => {
            let forest = load_forest(&forest)?;
            let dataset_store = FileDatasetStore::open(&dataset)
                .map_err(|e| anyhow::anyhow!("Failed to open dataset {dataset}: {e}"))?;
            let class_id = ClassId::new(class)?;
            let facade = ClassifierFacade::new(
                forest,
                dataset_store,
                NoExternalClassifier,
                HttpFetcher::new()?,
            );

            let prediction = facade
                .predict(&class_id, &url, min_confidence)
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            match prediction {
                Prediction::Success => println!("success"),
                Prediction::Failure => println!("failure"),
                Prediction::Unknown => println!("unknown"),
            }

            std::fs::write(&out, facade.forest().save().map_err(|e| anyhow::anyhow!("{e}"))?)?;
        }
    }

    Ok(())
}
