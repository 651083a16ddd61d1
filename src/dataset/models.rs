use chrono::NaiveDateTime;
use serde_json::Value;

/// Weather columns appended to every output row, in output order.
pub const WEATHER_COLUMNS: [&str; 8] = [
    "weather_time_utc",
    "temp_c",
    "precip_mm",
    "wind_kmh",
    "wind_dir_deg",
    "rel_humidity",
    "pressure_hpa",
    "snow_mm",
];

/// One input row. Values are positional and line up with `Dataset::columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityRecord {
    values: Vec<Value>,
}

static NULL: Value = Value::Null;

impl ActivityRecord {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Value at a column position; short rows read as null.
    pub fn get(&self, idx: usize) -> &Value {
        self.values.get(idx).unwrap_or(&NULL)
    }
}

/// A fully materialized input table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<ActivityRecord>,
}

impl Dataset {
    pub fn new(columns: Vec<String>, rows: Vec<ActivityRecord>) -> Self {
        Self { columns, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// One hourly weather reading. All fields are optional because stations
/// routinely omit individual measurements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeatherObservation {
    pub weather_time_utc: Option<NaiveDateTime>,
    pub temp_c: Option<f64>,
    pub precip_mm: Option<f64>,
    pub wind_kmh: Option<f64>,
    pub wind_dir_deg: Option<f64>,
    pub rel_humidity: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub snow_mm: Option<f64>,
}

impl WeatherObservation {
    /// Cell values in `WEATHER_COLUMNS` order.
    pub fn to_values(&self) -> [Value; 8] {
        [
            self.weather_time_utc
                .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S").to_string()))
                .unwrap_or(Value::Null),
            opt_number(self.temp_c),
            opt_number(self.precip_mm),
            opt_number(self.wind_kmh),
            opt_number(self.wind_dir_deg),
            opt_number(self.rel_humidity),
            opt_number(self.pressure_hpa),
            opt_number(self.snow_mm),
        ]
    }

    /// The all-null weather field set used for misses.
    pub fn null_values() -> [Value; 8] {
        Default::default()
    }
}

fn opt_number(v: Option<f64>) -> Value {
    v.and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// An output row: pass-through input fields followed by the weather fields.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedRecord {
    pub values: Vec<Value>,
}

/// The enrichment result table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnrichedDataset {
    pub columns: Vec<String>,
    pub records: Vec<EnrichedRecord>,
}

impl EnrichedDataset {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a cell by row position and column name.
    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.records.get(row)?.values.get(idx)
    }
}
