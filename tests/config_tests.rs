use footfall_analyzer::config::{AnalyzerConfig, ConfigError, API_KEY_ENV, DEFAULT_MAX_ITERATIONS};
use std::time::Duration;
mod common;

#[ctor::ctor]
fn _init() { common::init(); }

#[test]
fn config_defaults() {
    let c = AnalyzerConfig::new();
    assert_eq!(c.model, "gpt-4o-mini");
    assert_eq!(c.temperature, 0.0);
    assert_eq!(c.max_tokens, 2000);
    assert_eq!(c.max_iterations, DEFAULT_MAX_ITERATIONS);
    assert_eq!(c.request_timeout, Duration::from_secs(60));
    assert!(c.run_timeout.is_none());
    assert!(c.api_key.is_none());
}

#[test]
fn missing_credential_is_a_configuration_error() {
    let c = AnalyzerConfig::new();
    assert_eq!(c.resolve_api_key_with(|_| None), Err(ConfigError::MissingCredential));
}

#[test]
fn credential_from_lookup_when_not_explicit() {
    let c = AnalyzerConfig::new();
    let key = c.resolve_api_key_with(|k| (k == API_KEY_ENV).then(|| "sk-env".to_string()));
    assert_eq!(key.unwrap(), "sk-env");
}

#[test]
fn temperature_range_is_enforced() {
    assert!(AnalyzerConfig::new().with_temperature(2.0).validate().is_ok());
    assert_eq!(
        AnalyzerConfig::new().with_temperature(-0.1).validate(),
        Err(ConfigError::InvalidTemperature(-0.1))
    );
}

#[test]
fn zero_iterations_rejected() {
    let err = AnalyzerConfig::new().with_max_iterations(0).validate().unwrap_err();
    assert!(matches!(err, ConfigError::InvalidSetting { .. }));
}
