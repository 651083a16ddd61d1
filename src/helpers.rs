//! Shared helpers for coordinate coarsening and provider diagnostics.
//!
//! Cache keys need coordinates that hash and compare exactly, which raw f64
//! values cannot guarantee. Coordinates are therefore converted to `Decimal`
//! from their exact binary value and rounded half-to-even to 3 decimal places
//! (roughly 100 m), so two points that round to the same value share a key.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Decimal places kept for cache-key coordinates.
pub(crate) const COORD_KEY_DP: u32 = 3;

/// Maximum number of response body bytes quoted in provider error details.
const MAX_BODY_PREVIEW: usize = 200;

/// Round a coordinate to `COORD_KEY_DP` decimal places.
///
/// Returns `None` for non-finite inputs (NaN, ±Inf).
pub(crate) fn round_coord(v: f64) -> Option<Decimal> {
    if !v.is_finite() {
        tracing::warn!("round_coord received non-finite value {}", v);
        return None;
    }
    Decimal::from_f64_retain(v)
        .or_else(|| Decimal::from_f64(v))
        .map(|d| d.round_dp(COORD_KEY_DP).normalize())
}

/// Shorten a response body so it can be embedded in a log line.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_BODY_PREVIEW {
        return body.to_string();
    }
    let mut end = MAX_BODY_PREVIEW;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_round_coord_three_places() {
        assert_eq!(round_coord(45.1234), Some(Decimal::from_str("45.123").unwrap()));
        assert_eq!(round_coord(5.6789), Some(Decimal::from_str("5.679").unwrap()));
    }

    #[test]
    fn test_round_coord_negative() {
        assert_eq!(round_coord(-79.40049), Some(Decimal::from_str("-79.4").unwrap()));
    }

    #[test]
    fn test_round_coord_nearby_points_collapse() {
        assert_eq!(round_coord(45.12341), round_coord(45.12349));
        assert_ne!(round_coord(45.1234), round_coord(45.1244));
    }

    #[test]
    fn test_round_coord_nan() {
        assert_eq!(round_coord(f64::NAN), None);
    }

    #[test]
    fn test_round_coord_infinity() {
        assert_eq!(round_coord(f64::INFINITY), None);
        assert_eq!(round_coord(f64::NEG_INFINITY), None);
    }

    #[test]
    fn test_truncate_body_short() {
        assert_eq!(truncate_body("bad request"), "bad request");
    }

    #[test]
    fn test_truncate_body_long() {
        let body = "x".repeat(500);
        let out = truncate_body(&body);
        assert_eq!(out.len(), MAX_BODY_PREVIEW + 3);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_body_respects_char_boundary() {
        let body = "é".repeat(150);
        let out = truncate_body(&body);
        assert!(out.ends_with("..."));
    }
}
