//! Weather provider contract.

use async_trait::async_trait;
use std::fmt::Debug;

use crate::dataset::models::WeatherObservation;
use crate::services::timestamp::NormalizedInstant;

/// Outcome of one point-in-time weather lookup.
///
/// `NoData` and `ProviderFailure` both render as null weather fields in the
/// output, but are kept apart so the run summary can tell "confirmed no
/// weather" from "could not determine".
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Observation(WeatherObservation),
    /// The provider answered but has no reading for this point and hour.
    NoData,
    /// Transport, HTTP or parse fault, with a human-readable detail.
    ProviderFailure(String),
}

impl Lookup {
    pub fn observation(&self) -> Option<&WeatherObservation> {
        match self {
            Lookup::Observation(obs) => Some(obs),
            Lookup::NoData | Lookup::ProviderFailure(_) => None,
        }
    }
}

/// A source of historical hourly weather at a point.
///
/// Implementations must not return errors: every fault is caught at this
/// boundary, logged with the coordinates and instant, and reported as
/// [`Lookup::ProviderFailure`].
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn fetch(&self, lat: f64, lon: f64, at: NormalizedInstant) -> Lookup;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_accessor() {
        let obs = WeatherObservation {
            temp_c: Some(1.5),
            ..Default::default()
        };
        assert_eq!(Lookup::Observation(obs.clone()).observation(), Some(&obs));
        assert_eq!(Lookup::NoData.observation(), None);
        assert_eq!(Lookup::ProviderFailure("timeout".into()).observation(), None);
    }
}
