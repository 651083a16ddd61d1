//! Input-schema validation.
//!
//! The column layout is checked once before any row is touched. The result is
//! a [`ResolvedSchema`] holding column positions for everything the pipeline
//! reads, and the output column order for everything it writes.

use serde_json::Value;

use crate::dataset::models::{ActivityRecord, EnrichedRecord, WeatherObservation, WEATHER_COLUMNS};
use crate::errors::AppError;
use crate::services::coordinates::CoordinatePair;

pub const TYPE_COLUMN: &str = "type";
pub const START_LAT: &str = "start_lat";
pub const START_LNG: &str = "start_lng";
pub const START_LATLNG: &str = "start_latlng";
/// Start time in UTC.
pub const START_DATE: &str = "start_date";
/// Start time in the activity's local wall-clock time.
pub const START_DATE_LOCAL: &str = "start_date_local";

/// Where the start coordinates come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinateSource {
    /// Separate latitude and longitude columns.
    Explicit { lat: usize, lng: usize },
    /// A single `start_latlng` column.
    Combined(usize),
}

/// The column holding the start time, and how to read naive values in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeField {
    pub name: String,
    pub index: usize,
    /// Timezone-naive values in this column are UTC wall-clock times.
    pub is_utc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSchema {
    pub type_column: Option<usize>,
    pub coordinates: CoordinateSource,
    pub time_field: TimeField,
    passthrough: Vec<usize>,
    derive_coordinates: bool,
    output_columns: Vec<String>,
}

impl ResolvedSchema {
    /// Validate the input columns.
    ///
    /// `time_field` overrides the default choice of `start_date`, then
    /// `start_date_local`. `start_date` is always UTC; any other time field
    /// takes `assume_naive_as_utc` for its timezone-naive values.
    pub fn resolve(
        columns: &[String],
        time_field: Option<&str>,
        assume_naive_as_utc: bool,
    ) -> Result<Self, AppError> {
        let find = |name: &str| columns.iter().position(|c| c == name);

        let coordinates = match (find(START_LAT), find(START_LNG), find(START_LATLNG)) {
            (Some(lat), Some(lng), _) => CoordinateSource::Explicit { lat, lng },
            (_, _, Some(idx)) => CoordinateSource::Combined(idx),
            _ => {
                return Err(AppError::Schema(format!(
                    "columns {}/{} or {} are missing",
                    START_LAT, START_LNG, START_LATLNG
                )))
            }
        };

        let time_field = match time_field {
            Some(name) => {
                let index = find(name).ok_or_else(|| {
                    AppError::Schema(format!("requested time column '{}' is missing", name))
                })?;
                TimeField {
                    name: name.to_string(),
                    index,
                    is_utc: name == START_DATE || assume_naive_as_utc,
                }
            }
            None => match (find(START_DATE), find(START_DATE_LOCAL)) {
                (Some(index), _) => TimeField {
                    name: START_DATE.to_string(),
                    index,
                    is_utc: true,
                },
                (None, Some(index)) => TimeField {
                    name: START_DATE_LOCAL.to_string(),
                    index,
                    is_utc: assume_naive_as_utc,
                },
                (None, None) => {
                    return Err(AppError::Schema(format!(
                        "column {} or {} is missing",
                        START_DATE, START_DATE_LOCAL
                    )))
                }
            },
        };

        let derive_coordinates = matches!(coordinates, CoordinateSource::Combined(_));
        let replaced = |name: &str| {
            WEATHER_COLUMNS.contains(&name)
                || (derive_coordinates && (name == START_LAT || name == START_LNG))
        };

        let passthrough: Vec<usize> = columns
            .iter()
            .enumerate()
            .filter(|(_, name)| !replaced(name.as_str()))
            .map(|(idx, _)| idx)
            .collect();

        let mut output_columns: Vec<String> =
            passthrough.iter().map(|&idx| columns[idx].clone()).collect();
        if derive_coordinates {
            output_columns.push(START_LAT.to_string());
            output_columns.push(START_LNG.to_string());
        }
        output_columns.extend(WEATHER_COLUMNS.iter().map(|c| c.to_string()));

        Ok(Self {
            type_column: find(TYPE_COLUMN),
            coordinates,
            time_field,
            passthrough,
            derive_coordinates,
            output_columns,
        })
    }

    pub fn output_columns(&self) -> &[String] {
        &self.output_columns
    }

    /// Overlay weather onto a record. `None` produces all-null weather fields.
    pub fn build_row(
        &self,
        record: &ActivityRecord,
        coords: CoordinatePair,
        weather: Option<&WeatherObservation>,
    ) -> EnrichedRecord {
        let mut values: Vec<Value> = Vec::with_capacity(self.output_columns.len());
        values.extend(self.passthrough.iter().map(|&idx| record.get(idx).clone()));
        if self.derive_coordinates {
            values.push(Value::from(coords.lat));
            values.push(Value::from(coords.lon));
        }
        match weather {
            Some(obs) => values.extend(obs.to_values()),
            None => values.extend(WeatherObservation::null_values()),
        }
        EnrichedRecord { values }
    }
}
