use clap::Parser;
use notification_service::cli::Cli;
use notification_service::config::{Config, ConfigError};
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

/// A helper function to run a test with a temporary config file.
fn with_config_file<F>(toml_content: &str, test_fn: F)
where
    F: FnOnce(PathBuf),
{
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();
    let path = file.path().to_path_buf();
    test_fn(path);
}

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["notification-service"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
#[serial]
fn test_load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        [redis]
        url = "redis://:secret@cache:6379/1"
        channel = "events.custom"
        [database]
        url = "mysql://app:pw@db:3306/app"
        max_connections = 10
        connect_timeout_secs = 3
        callback_query = "SELECT url FROM hooks"
        [delivery]
        max_attempts = 5
        retry_delay_ms = 500
        request_timeout_secs = 4
        user_agent = "Custom/2.0"
        max_concurrent_deliveries = 8
        [metrics]
        enabled = true
        listen_address = "0.0.0.0:9100"
    "#;

    with_config_file(toml_content, |path| {
        let config = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap();

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.redis.url, "redis://:secret@cache:6379/1");
        assert_eq!(config.redis.channel, "events.custom");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.database.callback_query, "SELECT url FROM hooks");
        assert_eq!(config.delivery.max_attempts, 5);
        assert_eq!(config.delivery.retry_delay_ms, 500);
        assert_eq!(config.delivery.request_timeout_secs, 4);
        assert_eq!(config.delivery.user_agent, "Custom/2.0");
        assert_eq!(config.delivery.max_concurrent_deliveries, 8);
        assert!(config.metrics.enabled);
        assert_eq!(config.metrics.listen_address.port(), 9100);
    });
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults() {
    with_config_file("[delivery]\nmax_attempts = 7\n", |path| {
        let config = Config::load(&cli(&["--config", path.to_str().unwrap()])).unwrap();

        assert_eq!(config.delivery.max_attempts, 7);
        assert_eq!(config.delivery.retry_delay_ms, 2000);
        assert_eq!(config.redis.channel, "notifications.subscription.updated");
    });
}

#[test]
#[serial]
fn test_env_overrides_file_and_cli_overrides_env() {
    with_config_file("[delivery]\nmax_attempts = 4\nretry_delay_ms = 100\n", |path| {
        std::env::set_var("NOTIFIER_DELIVERY__MAX_ATTEMPTS", "6");
        std::env::set_var("NOTIFIER_DELIVERY__RETRY_DELAY_MS", "300");

        let result = Config::load(&cli(&[
            "--config",
            path.to_str().unwrap(),
            "--retry-delay-ms",
            "900",
        ]));

        std::env::remove_var("NOTIFIER_DELIVERY__MAX_ATTEMPTS");
        std::env::remove_var("NOTIFIER_DELIVERY__RETRY_DELAY_MS");

        let config = result.unwrap();
        assert_eq!(config.delivery.max_attempts, 6);
        assert_eq!(config.delivery.retry_delay_ms, 900);
    });
}

#[test]
#[serial]
fn test_metrics_listen_flag_enables_metrics() {
    let config = Config::load(&cli(&["--metrics-listen", "127.0.0.1:0"])).unwrap();

    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.listen_address.port(), 0);
}

#[test]
#[serial]
fn test_missing_explicit_config_file_is_an_error() {
    let result = Config::load(&cli(&["--config", "/definitely/not/here.toml"]));

    assert!(matches!(result, Err(ConfigError::Invalid(msg)) if msg.contains("not found")));
}

#[test]
#[serial]
fn test_invalid_values_are_rejected() {
    with_config_file("[delivery]\nmax_attempts = 0\n", |path| {
        let result = Config::load(&cli(&["--config", path.to_str().unwrap()]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    });
}

#[test]
#[serial]
fn test_mistyped_values_fail_extraction() {
    with_config_file("[delivery]\nmax_attempts = \"three\"\n", |path| {
        let result = Config::load(&cli(&["--config", path.to_str().unwrap()]));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    });
}
