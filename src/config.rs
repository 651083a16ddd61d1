use std::time::Duration;

use crate::errors::AppError;

const DEFAULT_METEOSTAT_API_URL: &str = "https://meteostat.p.rapidapi.com";
const DEFAULT_METEOSTAT_API_HOST: &str = "meteostat.p.rapidapi.com";
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 20;

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub meteostat_api_key: String,
    /// Base URL of the Meteostat JSON API (overridable for tests and proxies).
    pub meteostat_api_url: String,
    /// Value sent as `x-rapidapi-host`.
    pub meteostat_api_host: String,
    /// Per-request timeout applied by the HTTP client.
    pub http_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let meteostat_api_key = var("METEOSTAT_API_KEY")
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| AppError::Config("METEOSTAT_API_KEY must be set".to_string()))?;

        let http_timeout_secs = match var("HTTP_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                AppError::Config(format!(
                    "HTTP_TIMEOUT_SECS must be a whole number of seconds, got '{}'",
                    raw
                ))
            })?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        Ok(Self {
            meteostat_api_key,
            meteostat_api_url: var("METEOSTAT_API_URL")
                .unwrap_or_else(|| DEFAULT_METEOSTAT_API_URL.to_string()),
            meteostat_api_host: var("METEOSTAT_API_HOST")
                .unwrap_or_else(|| DEFAULT_METEOSTAT_API_HOST.to_string()),
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::from_vars(vars(&[("METEOSTAT_API_KEY", "secret")])).unwrap();

        assert_eq!(config.meteostat_api_key, "secret");
        assert_eq!(config.meteostat_api_url, "https://meteostat.p.rapidapi.com");
        assert_eq!(config.meteostat_api_host, "meteostat.p.rapidapi.com");
        assert_eq!(config.http_timeout, Duration::from_secs(20));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let err = AppConfig::from_vars(vars(&[])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        assert!(err.to_string().contains("METEOSTAT_API_KEY"));
    }

    #[test]
    fn test_blank_api_key_is_rejected() {
        let err = AppConfig::from_vars(vars(&[("METEOSTAT_API_KEY", "  ")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_vars(vars(&[
            ("METEOSTAT_API_KEY", "k"),
            ("METEOSTAT_API_URL", "http://localhost:9000"),
            ("METEOSTAT_API_HOST", "proxy.local"),
            ("HTTP_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();

        assert_eq!(config.meteostat_api_url, "http://localhost:9000");
        assert_eq!(config.meteostat_api_host, "proxy.local");
        assert_eq!(config.http_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_invalid_timeout() {
        let err = AppConfig::from_vars(vars(&[
            ("METEOSTAT_API_KEY", "k"),
            ("HTTP_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("HTTP_TIMEOUT_SECS"));
    }
}
