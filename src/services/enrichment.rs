//! Enrichment pipeline.
//!
//! Joins each activity's start point and start hour to one hourly weather
//! observation. Rows are processed strictly in input order with one provider
//! request in flight at a time.
//!
//! Steps:
//! 1. Validate the input schema once (coordinate source, time field)
//! 2. Keep only allowed activity types, when a `type` column exists
//! 3. Resolve start coordinates; rows without them are dropped
//! 4. Normalize the start time; rows with invalid times are dropped
//! 5. Look up weather through the per-run cache
//! 6. Overlay weather (or nulls, counted as a miss) onto the row
//!
//! Only schema problems abort a run. Everything else degrades to a dropped row
//! or null weather and is reported in [`RunSummary`].

use serde::Serialize;

use crate::dataset::models::{ActivityRecord, Dataset, EnrichedDataset, EnrichedRecord};
use crate::dataset::schema::ResolvedSchema;
use crate::errors::AppError;
use crate::services::cache::GeoWeatherCache;
use crate::services::coordinates::{self, CoordinatePair};
use crate::services::provider::{Lookup, WeatherProvider};
use crate::services::timestamp::{self, NormalizedInstant};

/// Activity types kept by default (cycling variants).
pub const DEFAULT_ALLOWED_TYPES: [&str; 2] = ["Ride", "VirtualRide"];

/// Rows between two progress log lines.
pub const DEFAULT_PROGRESS_EVERY: usize = 50;

#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    /// Explicit time column. `None` picks `start_date`, then `start_date_local`.
    pub time_field: Option<String>,
    /// Treat timezone-naive values of a non-UTC time field (`start_date_local`
    /// or an explicit override) as UTC wall-clock time.
    ///
    /// This is an assumption, not a conversion: if the source actually holds
    /// local times, weather is looked up for the wrong hour, off by the local
    /// UTC offset. When false, such rows are dropped as invalid instead.
    pub assume_naive_as_utc: bool,
    /// Allowed values of the `type` column. `None` disables the filter.
    pub allowed_types: Option<Vec<String>>,
    pub progress_every: usize,
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self {
            time_field: None,
            assume_naive_as_utc: true,
            allowed_types: Some(DEFAULT_ALLOWED_TYPES.iter().map(|t| t.to_string()).collect()),
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub input_rows: usize,
    pub filtered_by_type: usize,
    pub dropped_coordinates: usize,
    pub dropped_timestamp: usize,
    pub enriched_rows: usize,
    pub no_data: usize,
    pub provider_failures: usize,
    pub cache_entries: usize,
    pub cache_hits: usize,
    pub provider_calls: usize,
}

impl RunSummary {
    /// Rows that ended up with null weather, whatever the reason.
    pub fn miss_count(&self) -> usize {
        self.no_data + self.provider_failures
    }
}

#[derive(Debug, Clone)]
pub struct EnrichmentOutput {
    pub dataset: EnrichedDataset,
    pub miss_count: usize,
    pub summary: RunSummary,
}

/// A row that survived filtering and is ready for lookup.
struct PreparedRow<'d> {
    record: &'d ActivityRecord,
    coords: CoordinatePair,
    at: NormalizedInstant,
}

/// Orchestrates one enrichment run over a materialized dataset.
#[derive(Debug)]
pub struct EnrichmentPipeline<'p> {
    provider: &'p dyn WeatherProvider,
    cache: GeoWeatherCache,
    options: EnrichmentOptions,
}

impl<'p> EnrichmentPipeline<'p> {
    pub fn new(
        provider: &'p dyn WeatherProvider,
        cache: GeoWeatherCache,
        options: EnrichmentOptions,
    ) -> Self {
        Self {
            provider,
            cache,
            options,
        }
    }

    /// Run the pipeline. Only an invalid input schema is returned as an error.
    pub async fn run(&mut self, dataset: &Dataset) -> Result<EnrichmentOutput, AppError> {
        let schema = ResolvedSchema::resolve(
            &dataset.columns,
            self.options.time_field.as_deref(),
            self.options.assume_naive_as_utc,
        )?;
        tracing::info!(
            "Time field '{}' (naive values {})",
            schema.time_field.name,
            if schema.time_field.is_utc {
                "assumed UTC"
            } else {
                "rejected"
            }
        );

        let mut summary = RunSummary {
            input_rows: dataset.len(),
            ..Default::default()
        };
        if dataset.is_empty() {
            tracing::warn!("Input dataset has no rows.");
            return Ok(self.finish(&schema, Vec::new(), summary));
        }

        let typed = self.filter_types(dataset, &schema, &mut summary);

        let located: Vec<(&ActivityRecord, CoordinatePair)> = typed
            .into_iter()
            .filter_map(|record| match coordinates::resolve(record, &schema.coordinates) {
                Some(coords) => Some((record, coords)),
                None => {
                    summary.dropped_coordinates += 1;
                    None
                }
            })
            .collect();
        if summary.dropped_coordinates > 0 {
            tracing::debug!(
                "Dropped {} rows without valid start coordinates",
                summary.dropped_coordinates
            );
        }
        if located.is_empty() {
            tracing::warn!("No activities with valid coordinates.");
            return Ok(self.finish(&schema, Vec::new(), summary));
        }

        let prepared: Vec<PreparedRow> = located
            .into_iter()
            .filter_map(|(record, coords)| {
                let raw = record.get(schema.time_field.index);
                match timestamp::normalize(raw, schema.time_field.is_utc) {
                    Ok(at) => Some(PreparedRow { record, coords, at }),
                    Err(e) => {
                        tracing::debug!(
                            "Dropping row with invalid {}: {}",
                            schema.time_field.name,
                            e
                        );
                        summary.dropped_timestamp += 1;
                        None
                    }
                }
            })
            .collect();
        if prepared.is_empty() {
            tracing::warn!("No activities with a valid start time.");
            return Ok(self.finish(&schema, Vec::new(), summary));
        }

        let total = prepared.len();
        tracing::info!("Starting weather enrichment on {} activities", total);
        tracing::debug!("Weather cache policy: {:?}", self.cache.policy());

        let provider = self.provider;
        let mut records = Vec::with_capacity(total);
        for row in &prepared {
            let lookup = self
                .cache
                .get_or_fetch(row.coords, row.at, move |lat, lon, at| {
                    provider.fetch(lat, lon, at)
                })
                .await;

            match &lookup {
                Lookup::Observation(_) => {}
                Lookup::NoData => {
                    tracing::debug!(
                        "No weather data for lat={}, lon={}, at={}",
                        row.coords.lat,
                        row.coords.lon,
                        row.at
                    );
                    summary.no_data += 1;
                }
                Lookup::ProviderFailure(_) => summary.provider_failures += 1,
            }

            records.push(schema.build_row(row.record, row.coords, lookup.observation()));

            if self.options.progress_every > 0 && records.len() % self.options.progress_every == 0 {
                tracing::debug!("Progress: {}/{}", records.len(), total);
            }
        }

        Ok(self.finish(&schema, records, summary))
    }

    fn filter_types<'d>(
        &self,
        dataset: &'d Dataset,
        schema: &ResolvedSchema,
        summary: &mut RunSummary,
    ) -> Vec<&'d ActivityRecord> {
        let (Some(idx), Some(allowed)) = (schema.type_column, self.options.allowed_types.as_ref())
        else {
            return dataset.rows.iter().collect();
        };

        let kept: Vec<&ActivityRecord> = dataset
            .rows
            .iter()
            .filter(|record| {
                record
                    .get(idx)
                    .as_str()
                    .map(|t| allowed.iter().any(|a| a == t))
                    .unwrap_or(false)
            })
            .collect();

        summary.filtered_by_type = dataset.len() - kept.len();
        tracing::info!("Type filter: {} -> {}", dataset.len(), kept.len());
        kept
    }

    fn finish(
        &self,
        schema: &ResolvedSchema,
        records: Vec<EnrichedRecord>,
        mut summary: RunSummary,
    ) -> EnrichmentOutput {
        summary.enriched_rows = records.len();
        summary.cache_entries = self.cache.len();
        summary.cache_hits = self.cache.hits();
        summary.provider_calls = self.cache.provider_calls();
        if !self.cache.is_empty() {
            tracing::debug!("Weather cache size: {}", summary.cache_entries);
        }

        EnrichmentOutput {
            dataset: EnrichedDataset {
                columns: schema.output_columns().to_vec(),
                records,
            },
            miss_count: summary.miss_count(),
            summary,
        }
    }
}
