//! Per-run weather lookup cache.
//!
//! Keys are coarsened to 3 decimal places of latitude/longitude plus the
//! normalized hour, so nearby activities started in the same hour share one
//! provider request. The cache lives for one pipeline run: it starts empty,
//! only grows, and is dropped with the pipeline. Nothing is evicted.
//!
//! Observations and confirmed `NoData` answers are stored. Provider failures
//! are returned to the caller but not stored, so a later row with the same key
//! asks the provider again.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;

use crate::services::coordinates::CoordinatePair;
use crate::services::provider::Lookup;
use crate::services::timestamp::NormalizedInstant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    lat: Decimal,
    lon: Decimal,
    at: NormalizedInstant,
}

impl CacheKey {
    pub fn new(coords: &CoordinatePair, at: NormalizedInstant) -> Self {
        let (lat, lon) = coords.key();
        Self { lat, lon, at }
    }
}

/// Size policy, fixed when the cache is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    /// Grow for the whole run.
    Unbounded,
    /// Stop storing new entries once this many are held. Existing entries
    /// are kept and still served.
    MaxEntries(usize),
}

#[derive(Debug)]
pub struct GeoWeatherCache {
    policy: CachePolicy,
    entries: HashMap<CacheKey, Lookup>,
    hits: usize,
    provider_calls: usize,
    full_logged: bool,
}

impl GeoWeatherCache {
    pub fn new(policy: CachePolicy) -> Self {
        Self {
            policy,
            entries: HashMap::new(),
            hits: 0,
            provider_calls: 0,
            full_logged: false,
        }
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Number of times `fetch` was invoked.
    pub fn provider_calls(&self) -> usize {
        self.provider_calls
    }

    /// Return the cached outcome for the coarsened key, or call `fetch` with
    /// the unrounded coordinates and remember its outcome.
    pub async fn get_or_fetch<F, Fut>(
        &mut self,
        coords: CoordinatePair,
        at: NormalizedInstant,
        fetch: F,
    ) -> Lookup
    where
        F: FnOnce(f64, f64, NormalizedInstant) -> Fut,
        Fut: Future<Output = Lookup>,
    {
        let key = CacheKey::new(&coords, at);

        if let Some(cached) = self.entries.get(&key) {
            self.hits += 1;
            return cached.clone();
        }

        self.provider_calls += 1;
        let outcome = fetch(coords.lat, coords.lon, at).await;

        if !matches!(outcome, Lookup::ProviderFailure(_)) && self.has_room() {
            self.entries.insert(key, outcome.clone());
        }

        outcome
    }

    fn has_room(&mut self) -> bool {
        match self.policy {
            CachePolicy::Unbounded => true,
            CachePolicy::MaxEntries(max) if self.entries.len() < max => true,
            CachePolicy::MaxEntries(max) => {
                if !self.full_logged {
                    tracing::warn!(
                        "Weather cache reached {} entries; further lookups will not be cached",
                        max
                    );
                    self.full_logged = true;
                }
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::models::WeatherObservation;
    use crate::services::timestamp::normalize_str;
    use std::cell::Cell;

    fn hour(s: &str) -> NormalizedInstant {
        normalize_str(s, true).unwrap()
    }

    fn pair(lat: f64, lon: f64) -> CoordinatePair {
        CoordinatePair::new(lat, lon).unwrap()
    }

    fn observation(temp: f64) -> Lookup {
        Lookup::Observation(WeatherObservation {
            temp_c: Some(temp),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_hit_skips_fetch() {
        let mut cache = GeoWeatherCache::new(CachePolicy::Unbounded);
        let calls = Cell::new(0);
        let at = hour("2024-03-01T14:07:00Z");

        let first = cache
            .get_or_fetch(pair(45.1234, 5.6789), at, |_, _, _| {
                calls.set(calls.get() + 1);
                async { observation(8.2) }
            })
            .await;
        let second = cache
            .get_or_fetch(pair(45.1231, 5.6793), at, |_, _, _| {
                calls.set(calls.get() + 1);
                async { observation(99.0) }
            })
            .await;

        assert_eq!(calls.get(), 1);
        assert_eq!(first, second);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.provider_calls(), 1);
    }

    #[tokio::test]
    async fn test_distinct_hours_are_distinct_keys() {
        let mut cache = GeoWeatherCache::new(CachePolicy::Unbounded);
        cache
            .get_or_fetch(pair(45.0, 5.0), hour("2024-03-01T14:00:00Z"), |_, _, _| async {
                observation(1.0)
            })
            .await;
        let other = cache
            .get_or_fetch(pair(45.0, 5.0), hour("2024-03-01T15:00:00Z"), |_, _, _| async {
                observation(2.0)
            })
            .await;

        assert_eq!(other, observation(2.0));
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_fetch_receives_raw_coordinates() {
        let mut cache = GeoWeatherCache::new(CachePolicy::Unbounded);
        let at = hour("2024-03-01T14:00:00Z");
        cache
            .get_or_fetch(pair(45.1234, 5.6789), at, |lat, lon, when| async move {
                assert_eq!(lat, 45.1234);
                assert_eq!(lon, 5.6789);
                assert_eq!(when, at);
                Lookup::NoData
            })
            .await;
    }

    #[tokio::test]
    async fn test_no_data_is_cached() {
        let mut cache = GeoWeatherCache::new(CachePolicy::Unbounded);
        let at = hour("2024-03-01T14:00:00Z");
        let calls = Cell::new(0);

        for _ in 0..3 {
            let outcome = cache
                .get_or_fetch(pair(10.0, 20.0), at, |_, _, _| {
                    calls.set(calls.get() + 1);
                    async { Lookup::NoData }
                })
                .await;
            assert_eq!(outcome, Lookup::NoData);
        }

        assert_eq!(calls.get(), 1);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_failure_is_not_cached() {
        let mut cache = GeoWeatherCache::new(CachePolicy::Unbounded);
        let at = hour("2024-03-01T14:00:00Z");

        let failed = cache
            .get_or_fetch(pair(10.0, 20.0), at, |_, _, _| async {
                Lookup::ProviderFailure("HTTP 503".into())
            })
            .await;
        assert!(matches!(failed, Lookup::ProviderFailure(_)));
        assert!(cache.is_empty());

        let retried = cache
            .get_or_fetch(pair(10.0, 20.0), at, |_, _, _| async { observation(3.0) })
            .await;
        assert_eq!(retried, observation(3.0));
        assert_eq!(cache.provider_calls(), 2);
    }

    #[tokio::test]
    async fn test_max_entries_stops_storing() {
        let mut cache = GeoWeatherCache::new(CachePolicy::MaxEntries(1));
        let at = hour("2024-03-01T14:00:00Z");

        cache
            .get_or_fetch(pair(1.0, 1.0), at, |_, _, _| async { observation(1.0) })
            .await;
        cache
            .get_or_fetch(pair(2.0, 2.0), at, |_, _, _| async { observation(2.0) })
            .await;
        assert_eq!(cache.len(), 1);

        let calls = Cell::new(0);
        cache
            .get_or_fetch(pair(1.0, 1.0), at, |_, _, _| {
                calls.set(calls.get() + 1);
                async { observation(5.0) }
            })
            .await;
        assert_eq!(calls.get(), 0, "existing entries are still served");
        assert_eq!(cache.policy(), CachePolicy::MaxEntries(1));
    }

    #[test]
    fn test_cache_key_rounding() {
        let at = hour("2024-03-01T14:00:00Z");
        assert_eq!(
            CacheKey::new(&pair(45.1234, 5.6789), at),
            CacheKey::new(&pair(45.123, 5.679), at)
        );
        assert_ne!(
            CacheKey::new(&pair(45.1234, 5.6789), at),
            CacheKey::new(&pair(45.124, 5.679), at)
        );
        assert_ne!(
            CacheKey::new(&pair(45.1234, 5.6789), at),
            CacheKey::new(&pair(45.1234, 5.6789), hour("2024-03-01T15:00:00Z"))
        );
    }
}
