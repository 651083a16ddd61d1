//! Meteostat JSON API client.
//!
//! Fetches historical hourly observations for a point from the Meteostat
//! `point/hourly` endpoint (served through RapidAPI).
//! See: https://dev.meteostat.net/api/point/hourly.html

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::config::AppConfig;
use crate::dataset::models::WeatherObservation;
use crate::errors::AppError;
use crate::helpers::truncate_body;
use crate::services::provider::{Lookup, WeatherProvider};
use crate::services::timestamp::NormalizedInstant;

const HOURLY_PATH: &str = "/point/hourly";
/// Format of the `time` field in hourly entries (UTC when `tz=UTC`).
const METEOSTAT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Client for the Meteostat point data API.
#[derive(Debug, Clone)]
pub struct MeteostatClient {
    client: reqwest::Client,
    base_url: String,
}

// --- Meteostat JSON response types ---

#[derive(Debug, Deserialize)]
struct MeteostatResponse {
    #[serde(default)]
    data: Option<Vec<MeteostatHour>>,
}

#[derive(Debug, Deserialize)]
struct MeteostatHour {
    time: String,
    temp: Option<f64>,
    prcp: Option<f64>,
    snow: Option<f64>,
    wdir: Option<f64>,
    wspd: Option<f64>,
    rhum: Option<f64>,
    pres: Option<f64>,
}

impl MeteostatClient {
    /// Build the client. Credentials are checked here, so an unusable key or
    /// host fails the run before any row is read.
    pub fn new(config: &AppConfig) -> Result<Self, AppError> {
        let mut api_key = HeaderValue::from_str(&config.meteostat_api_key)
            .map_err(|e| AppError::Config(format!("Invalid METEOSTAT_API_KEY: {}", e)))?;
        api_key.set_sensitive(true);
        let api_host = HeaderValue::from_str(&config.meteostat_api_host)
            .map_err(|e| AppError::Config(format!("Invalid METEOSTAT_API_HOST: {}", e)))?;

        let mut headers = HeaderMap::new();
        headers.insert("x-rapidapi-key", api_key);
        headers.insert("x-rapidapi-host", api_host);

        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.meteostat_api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch the raw hourly series for one UTC day at a point.
    pub async fn fetch_hourly_day(
        &self,
        lat: f64,
        lon: f64,
        day: NaiveDate,
    ) -> Result<serde_json::Value, AppError> {
        let url = format!("{}{}", self.base_url, HOURLY_PATH);
        let day_str = day.format("%Y-%m-%d").to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("lat", format!("{:.4}", lat)),
                ("lon", format!("{:.4}", lon)),
                ("start", day_str.clone()),
                ("end", day_str),
                ("tz", "UTC".to_string()),
            ])
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("Meteostat request failed: {}", e))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalServiceError(format!(
                "Meteostat returned HTTP {}: {}",
                status,
                truncate_body(&body)
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Meteostat JSON parse error: {}", e))
        })
    }
}

/// Pick the entry for one hour out of a raw hourly series.
///
/// Returns `Ok(None)` when the series is empty or has no entry for that hour.
pub fn extract_observation_at(
    raw_json: &serde_json::Value,
    at: NormalizedInstant,
) -> Result<Option<WeatherObservation>, AppError> {
    let response: MeteostatResponse = serde_json::from_value(raw_json.clone()).map_err(|e| {
        AppError::ExternalServiceError(format!("Meteostat response structure error: {}", e))
    })?;

    let target = at.as_naive();
    let entry = response.data.unwrap_or_default().into_iter().find_map(|hour| {
        NaiveDateTime::parse_from_str(&hour.time, METEOSTAT_TIME_FORMAT)
            .ok()
            .filter(|t| *t == target)
            .map(|t| (t, hour))
    });

    Ok(entry.map(|(time, hour)| WeatherObservation {
        weather_time_utc: Some(time),
        temp_c: hour.temp,
        precip_mm: hour.prcp,
        wind_kmh: hour.wspd,
        wind_dir_deg: hour.wdir,
        rel_humidity: hour.rhum,
        pressure_hpa: hour.pres,
        snow_mm: hour.snow,
    }))
}

#[async_trait]
impl WeatherProvider for MeteostatClient {
    async fn fetch(&self, lat: f64, lon: f64, at: NormalizedInstant) -> Lookup {
        let result = match self.fetch_hourly_day(lat, lon, at.date()).await {
            Ok(raw) => extract_observation_at(&raw, at),
            Err(e) => Err(e),
        };

        match result {
            Ok(Some(observation)) => Lookup::Observation(observation),
            Ok(None) => Lookup::NoData,
            Err(e) => {
                tracing::error!(
                    "Meteostat lookup failed for lat={}, lon={}, at={}: {}",
                    lat,
                    lon,
                    at,
                    e
                );
                Lookup::ProviderFailure(e.to_string())
            }
        }
    }
}
