use resilient_fetch::circuit_breaker::CircuitBreakerConfig;
use resilient_fetch::retry::RetryConfig;
use resilient_fetch::validation::{
    validate_breaker_config, validate_retry_config, validate_url, ConfigError,
};
use std::time::Duration;

#[test]
fn test_default_configs_are_valid() {
    assert!(validate_retry_config(&RetryConfig::default()).is_ok());
    assert!(validate_breaker_config(&CircuitBreakerConfig::default()).is_ok());
}

#[test]
fn test_retry_config_invariants() {
    let equal_delays = RetryConfig::default()
        .with_base_delay(Duration::from_millis(500))
        .with_max_delay(Duration::from_millis(500));
    assert!(validate_retry_config(&equal_delays).is_ok());

    let inverted = RetryConfig::default()
        .with_base_delay(Duration::from_millis(501))
        .with_max_delay(Duration::from_millis(500));
    assert!(matches!(
        validate_retry_config(&inverted),
        Err(ConfigError::DelayCapBelowBase { .. })
    ));

    for jitter in [0.0, 0.5, 1.0] {
        assert!(validate_retry_config(&RetryConfig::default().with_jitter(jitter)).is_ok());
    }
    for jitter in [-0.1, 1.01, f64::NAN] {
        assert!(matches!(
            validate_retry_config(&RetryConfig::default().with_jitter(jitter)),
            Err(ConfigError::JitterOutOfRange(_))
        ));
    }

    let no_budget = RetryConfig::default().with_timeout(Duration::ZERO);
    assert_eq!(validate_retry_config(&no_budget), Err(ConfigError::ZeroTimeout));
}

#[test]
fn test_breaker_config_must_be_positive() {
    let base = CircuitBreakerConfig::default();

    assert_eq!(
        validate_breaker_config(&base.with_failure_threshold(0)),
        Err(ConfigError::NonPositive("failure threshold"))
    );
    assert_eq!(
        validate_breaker_config(&base.with_success_threshold(0)),
        Err(ConfigError::NonPositive("success threshold"))
    );
    assert_eq!(
        validate_breaker_config(&base.with_open_duration(Duration::ZERO)),
        Err(ConfigError::NonPositive("open duration"))
    );
}

#[test]
fn test_valid_urls() {
    assert!(validate_url("https://rickandmortyapi.com/api/character").is_ok());
    assert!(validate_url("https://rickandmortyapi.com/api/episode?page=2").is_ok());
    assert!(validate_url("http://127.0.0.1:8080/api/location/3").is_ok());
}

#[test]
fn test_invalid_urls() {
    for url in [
        "",
        "rickandmortyapi.com/api/character",
        "ftp://rickandmortyapi.com/api/character",
        "file:///etc/hosts",
        "mailto:rick@citadel.example",
    ] {
        let err = validate_url(url).unwrap_err();
        assert!(
            matches!(err, ConfigError::InvalidUrl { .. }),
            "{} should be rejected",
            url
        );
    }
}
