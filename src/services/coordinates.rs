//! Start-coordinate resolution.
//!
//! Activities expose their start point either as two explicit fields
//! (`start_lat`, `start_lng`) or as one combined field (`start_latlng`) that is
//! a `"[lat, lng]"` string or a two-element array. Anything unparseable or out
//! of range resolves to `None`; a zero coordinate is never invented.

use rust_decimal::Decimal;
use serde_json::Value;

use crate::dataset::models::ActivityRecord;
use crate::dataset::schema::CoordinateSource;
use crate::helpers::round_coord;

/// A validated WGS84 position.
///
/// Construction also fixes the coarsened cache-key form of the position, so
/// every `CoordinatePair` is guaranteed to be keyable.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinatePair {
    pub lat: f64,
    pub lon: f64,
    key: (Decimal, Decimal),
}

impl CoordinatePair {
    /// Returns `None` unless both values are finite and within range.
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        if !valid {
            return None;
        }
        Some(Self {
            lat,
            lon,
            key: (round_coord(lat)?, round_coord(lon)?),
        })
    }

    /// Latitude and longitude rounded for cache keys.
    pub(crate) fn key(&self) -> (Decimal, Decimal) {
        self.key
    }
}

/// Resolve the start point of a record according to the schema's coordinate source.
pub fn resolve(record: &ActivityRecord, source: &CoordinateSource) -> Option<CoordinatePair> {
    match *source {
        CoordinateSource::Explicit { lat, lng } => {
            let lat = parse_coordinate(record.get(lat))?;
            let lon = parse_coordinate(record.get(lng))?;
            CoordinatePair::new(lat, lon)
        }
        CoordinateSource::Combined(idx) => parse_combined(record.get(idx)),
    }
}

/// Read a single coordinate from a number or numeric string.
pub fn parse_coordinate(value: &Value) -> Option<f64> {
    let v = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    v.is_finite().then_some(v)
}

/// Parse a combined `lat,lng` value.
pub fn parse_combined(value: &Value) -> Option<CoordinatePair> {
    match value {
        Value::String(s) => {
            let inner = s.trim().trim_start_matches('[').trim_end_matches(']');
            let mut parts = inner.split(',');
            let lat = parts.next()?.trim().parse::<f64>().ok()?;
            let lon = parts.next()?.trim().parse::<f64>().ok()?;
            if parts.next().is_some() {
                return None;
            }
            CoordinatePair::new(lat, lon)
        }
        Value::Array(items) if items.len() == 2 => {
            CoordinatePair::new(parse_coordinate(&items[0])?, parse_coordinate(&items[1])?)
        }
        _ => None,
    }
}
