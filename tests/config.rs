use bullet::cli::Cli;
use bullet::config::{Config, FanOut};
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_load_full_valid_config() {
    let toml_content = r#"
        log_level = "debug"
        routes_config = "/etc/bullet/routes.yaml"
        timezone = "Europe/Berlin"
        [server]
        host = "127.0.0.1"
        port = 8080
        [delivery]
        timeout_seconds = 10
        fan_out = "concurrent"
        [resend]
        api_key = "re_123"
        from_email = "alerts@example.com"
        [metrics]
        enabled = true
        listen_address = "0.0.0.0:9100"
    "#;

    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{}", toml_content).unwrap();

    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    };

    let config = Config::load(&cli).unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.routes_config, PathBuf::from("/etc/bullet/routes.yaml"));
    assert_eq!(config.timezone, "Europe/Berlin");
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.delivery.timeout_seconds, 10);
    assert_eq!(config.delivery.fan_out, FanOut::Concurrent);
    assert_eq!(config.resend.api_key, "re_123");
    assert_eq!(config.resend.from_email, "alerts@example.com");
    assert_eq!(config.resend.api_url, "https://api.resend.com/emails"); // default
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.listen_address.port(), 9100);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let cli = Cli {
        config: Some(PathBuf::from("/nonexistent/bullet.toml")),
        ..Default::default()
    };
    let config = Config::load(&cli).unwrap();

    assert_eq!(config.log_level, "info");
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 5032);
    assert_eq!(config.routes_config, PathBuf::from("routes.yaml"));
    assert_eq!(config.timezone, "Asia/Shanghai");
    assert_eq!(config.delivery.timeout_seconds, 30);
    assert_eq!(config.delivery.fan_out, FanOut::Sequential);
    assert!(!config.metrics.enabled);
}

#[test]
fn test_cli_overrides_config_file() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
        log_level = "warn"
        [server]
        host = "10.0.0.1"
        port = 8080
    "#
    )
    .unwrap();

    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        routes: Some(PathBuf::from("/tmp/other-routes.yaml")),
        port: Some(9000),
        log_level: Some("trace".to_string()),
        ..Default::default()
    };
    let config = Config::load(&cli).unwrap();

    assert_eq!(config.log_level, "trace");
    assert_eq!(config.server.port, 9000);
    // Not given on the command line, so the file value survives.
    assert_eq!(config.server.host, "10.0.0.1");
    assert_eq!(config.routes_config, PathBuf::from("/tmp/other-routes.yaml"));
}

#[test]
fn test_invalid_config_value_is_an_error() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[delivery]\nfan_out = \"sideways\"\n").unwrap();

    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    assert!(Config::load(&cli).is_err());
}

#[test]
fn test_zero_delivery_timeout_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "[delivery]\ntimeout_seconds = 0\n").unwrap();

    let cli = Cli {
        config: Some(file.path().to_path_buf()),
        ..Default::default()
    };
    let err = Config::load(&cli).unwrap_err();
    assert!(err.to_string().contains("timeout_seconds"));
}
