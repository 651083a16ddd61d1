// Activity Weather Enrich v0.1
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod dataset;
mod errors;
mod helpers;
mod services;

use config::AppConfig;
use errors::AppError;
use services::cache::{CachePolicy, GeoWeatherCache};
use services::enrichment::{
    EnrichmentOptions, EnrichmentOutput, EnrichmentPipeline, DEFAULT_ALLOWED_TYPES,
    DEFAULT_PROGRESS_EVERY,
};
use services::meteostat::MeteostatClient;

const DEFAULT_INPUT: &str = "data/activities.csv";
const DEFAULT_OUTPUT: &str = "data/activities_weather.csv";

/// Enrich recorded activities with the historical weather at their start point and hour.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Activity table to read (.csv or .json).
    #[arg(short, long, default_value = DEFAULT_INPUT)]
    input: PathBuf,

    /// Where to write the enriched CSV.
    #[arg(short, long, default_value = DEFAULT_OUTPUT)]
    output: PathBuf,

    /// Column holding the start time. Defaults to start_date, then start_date_local.
    #[arg(long)]
    time_field: Option<String>,

    /// Treat timezone-naive local start times as UTC. When false, such rows are dropped.
    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    assume_naive_utc: bool,

    /// Activity type to keep (repeatable). Defaults to Ride and VirtualRide.
    #[arg(long = "activity-type", value_name = "TYPE")]
    activity_types: Vec<String>,

    /// Keep every activity type.
    #[arg(long, conflicts_with = "activity_types")]
    no_type_filter: bool,

    /// Log progress every N enriched rows (0 disables).
    #[arg(long, default_value_t = DEFAULT_PROGRESS_EVERY)]
    progress_every: usize,

    /// Stop caching new lookups once this many are held.
    #[arg(long)]
    cache_max_entries: Option<usize>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    log_json: bool,
}

impl Cli {
    fn enrichment_options(&self) -> EnrichmentOptions {
        let allowed_types = if self.no_type_filter {
            None
        } else if self.activity_types.is_empty() {
            Some(DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect())
        } else {
            Some(self.activity_types.clone())
        };

        EnrichmentOptions {
            time_field: self.time_field.clone(),
            assume_naive_as_utc: self.assume_naive_utc,
            allowed_types,
            progress_every: self.progress_every,
        }
    }

    fn cache_policy(&self) -> CachePolicy {
        match self.cache_max_entries {
            Some(max) => CachePolicy::MaxEntries(max),
            None => CachePolicy::Unbounded,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    init_tracing(cli.log_json);

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// `RUST_LOG` wins; otherwise `LOG_LEVEL` applies to this crate.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL")
            .map(|l| l.trim().to_ascii_lowercase())
            .unwrap_or_else(|_| "info".to_string());
        format!("activity_weather_enrich={}", level).into()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}

async fn run(cli: &Cli) -> Result<(), AppError> {
    let dataset = dataset::io::load_dataset(&cli.input)?;
    tracing::info!("Loaded {} activities from {}", dataset.len(), cli.input.display());

    let config = AppConfig::from_env()?;
    let client = MeteostatClient::new(&config)?;

    let mut pipeline = EnrichmentPipeline::new(
        &client,
        GeoWeatherCache::new(cli.cache_policy()),
        cli.enrichment_options(),
    );
    let output = pipeline.run(&dataset).await?;

    if !write_output(&cli.output, &output)? {
        return Ok(());
    }

    let summary = serde_json::to_string(&output.summary)?;
    tracing::info!(
        summary = %summary,
        "Saved {} rows -> {} ({} weather misses: {} no data, {} provider failures)",
        output.dataset.len(),
        cli.output.display(),
        output.miss_count,
        output.summary.no_data,
        output.summary.provider_failures
    );
    Ok(())
}

/// Save the enriched rows. Returns false, writing nothing, when no row survived.
fn write_output(path: &Path, output: &EnrichmentOutput) -> Result<bool, AppError> {
    if output.dataset.is_empty() {
        tracing::warn!("No activities left to enrich; {} not written", path.display());
        return Ok(false);
    }
    dataset::io::save_csv(path, &output.dataset)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::models::{EnrichedDataset, EnrichedRecord};
    use serde_json::json;
    use services::enrichment::RunSummary;

    fn output_with(records: Vec<EnrichedRecord>) -> EnrichmentOutput {
        EnrichmentOutput {
            dataset: EnrichedDataset {
                columns: vec!["id".to_string(), "temp_c".to_string()],
                records,
            },
            miss_count: 0,
            summary: RunSummary::default(),
        }
    }

    #[test]
    fn test_empty_output_writes_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("weather.csv");

        let written = write_output(&path, &output_with(Vec::new())).unwrap();
        assert!(!written);
        assert!(!path.exists());
        assert!(!dir.path().join("out").exists());
    }

    #[test]
    fn test_output_written_when_rows_survive() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.csv");
        let output = output_with(vec![EnrichedRecord {
            values: vec![json!("1"), json!(8.2)],
        }]);

        assert!(write_output(&path, &output).unwrap());
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "id,temp_c\n1,8.2\n"
        );
    }

    #[test]
    fn test_summary_serializes_counters() {
        let summary = RunSummary {
            input_rows: 3,
            no_data: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["input_rows"], json!(3));
        assert_eq!(value["no_data"], json!(1));
        assert_eq!(value["provider_calls"], json!(0));
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["activity-weather-enrich"]);
        assert_eq!(cli.input, PathBuf::from(DEFAULT_INPUT));
        assert_eq!(cli.output, PathBuf::from(DEFAULT_OUTPUT));
        assert_eq!(cli.cache_policy(), CachePolicy::Unbounded);

        let options = cli.enrichment_options();
        assert!(options.assume_naive_as_utc);
        assert_eq!(options.time_field, None);
        assert_eq!(
            options.allowed_types,
            Some(vec!["Ride".to_string(), "VirtualRide".to_string()])
        );
        assert_eq!(options.progress_every, DEFAULT_PROGRESS_EVERY);
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "activity-weather-enrich",
            "--input",
            "in.json",
            "--time-field",
            "start_date_local",
            "--assume-naive-utc",
            "false",
            "--activity-type",
            "Run",
            "--activity-type",
            "Hike",
            "--cache-max-entries",
            "500",
        ]);
        assert_eq!(cli.input, PathBuf::from("in.json"));
        assert_eq!(cli.cache_policy(), CachePolicy::MaxEntries(500));

        let options = cli.enrichment_options();
        assert!(!options.assume_naive_as_utc);
        assert_eq!(options.time_field.as_deref(), Some("start_date_local"));
        assert_eq!(
            options.allowed_types,
            Some(vec!["Run".to_string(), "Hike".to_string()])
        );
    }

    #[test]
    fn test_cli_no_type_filter() {
        let cli = Cli::parse_from(["activity-weather-enrich", "--no-type-filter"]);
        assert_eq!(cli.enrichment_options().allowed_types, None);

        let conflict = Cli::try_parse_from([
            "activity-weather-enrich",
            "--no-type-filter",
            "--activity-type",
            "Run",
        ]);
        assert!(conflict.is_err());
    }
}
