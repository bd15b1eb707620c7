//! # Configuration
//!
//! Loads the strongly-typed [`Config`] used by every other crate.
//!
//! Sources are layered, later ones winning:
//! 1. Built-in defaults (every section is `#[serde(default)]`).
//! 2. An optional `config.toml`.
//! 3. Environment variables of the form `MARKET_REPORT__SECTION__KEY`.
//! 4. Secrets from the process environment or a `.env` file (`TUSHARE_TOKEN`,
//!    `EMAIL_SENDER`, `EMAIL_PASSWORD`, `SMTP_SERVER`, `SMTP_PORT`), applied only
//!    where the file left the field empty.
//!
//! The recipients list may also come from a small JSON file so it can be edited
//! without touching the main config.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use logging::init_tracing;
pub use settings::{
    AnalysisKind, Config, DataConfig, EmailConfig, FftConfig, FibonacciConfig, FxConfig, GoldConfig,
    HarmonicConfig, HarmonicSeed, LoggingConfig, ProbabilityConfig, ReportConfig, ScheduleConfig,
    SwingConfig, TushareConfig,
};

const ENV_PREFIX: &str = "MARKET_REPORT";

/// Loads the application configuration from `config.toml` in the working directory.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

/// Loads, overlays secrets onto, and validates the configuration at `path`.
///
/// A missing file is not an error; the defaults are used instead.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    // A missing .env is the normal case in production.
    let _ = dotenvy::dotenv();

    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    let mut config = builder.try_deserialize::<Config>()?;

    apply_secrets(&mut config, |key| std::env::var(key).ok());
    load_recipients(&mut config);
    config.validate()?;

    tracing::debug!(path = %path.display(), "Configuration loaded.");
    Ok(config)
}

/// Fills empty credential fields from `lookup`.
fn apply_secrets(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    fn fill(field: &mut String, value: Option<String>) {
        if field.is_empty() {
            if let Some(v) = value.filter(|v| !v.trim().is_empty()) {
                *field = v.trim().to_string();
            }
        }
    }

    fill(&mut config.tushare.token, lookup("TUSHARE_TOKEN"));
    fill(&mut config.email.sender, lookup("EMAIL_SENDER"));
    fill(
        &mut config.email.password,
        lookup("EMAIL_PASSWORD").or_else(|| lookup("NETEASE_EMAIL_PASSWORD")),
    );
    fill(&mut config.email.smtp_server, lookup("SMTP_SERVER"));

    if let Some(port) = lookup("SMTP_PORT") {
        match port.trim().parse::<u16>() {
            Ok(p) => config.email.smtp_port = p,
            Err(_) => tracing::warn!(value = %port, "Ignoring SMTP_PORT that is not a valid port."),
        }
    }
}

#[derive(Deserialize)]
struct RecipientsFile {
    recipients: Vec<String>,
}

/// Merges addresses from `email.recipients_file` into the recipients list.
///
/// An unreadable file is logged and skipped; the rest of the configuration is still usable.
fn load_recipients(config: &mut Config) {
    let Some(path) = config.email.recipients_file.clone() else {
        return;
    };
    if !path.exists() {
        tracing::warn!(path = %path.display(), "Recipients file not found.");
        return;
    }

    match read_recipients_file(&path) {
        Ok(addresses) => {
            for address in addresses {
                let address = address.trim().to_string();
                if !address.is_empty() && !config.email.recipients.contains(&address) {
                    config.email.recipients.push(address);
                }
            }
        }
        Err(e) => tracing::error!(error = %e, "Ignoring recipients file."),
    }
}

fn read_recipients_file(path: &Path) -> Result<Vec<String>, ConfigError> {
    let recipients_err = |reason: String| ConfigError::Recipients {
        path: path.display().to_string(),
        reason,
    };
    let raw = std::fs::read_to_string(path).map_err(|e| recipients_err(e.to_string()))?;
    let file: RecipientsFile = serde_json::from_str(&raw).map_err(|e| recipients_err(e.to_string()))?;
    Ok(file.recipients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn toml_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[probability]
symbols = ["000300.SH"]
first_order_window = 30

[schedule]
daily_at = "16:00"
poll_interval = "5m"

[email]
recipients_file = "does-not-exist.json"
"#
        )
        .unwrap();

        let cfg = load_config_from(&path).unwrap();
        assert_eq!(cfg.probability.symbols, vec!["000300.SH".to_string()]);
        assert_eq!(cfg.probability.first_order_window, 30);
        assert_eq!(cfg.probability.second_order_window, 360);
        assert_eq!(cfg.schedule.poll_interval, std::time::Duration::from_secs(300));
        assert_eq!(cfg.fx.years, 5);
    }

    #[test]
    fn secrets_fill_only_empty_fields() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TUSHARE_TOKEN", "tok"),
            ("EMAIL_SENDER", "bot@example.com"),
            ("NETEASE_EMAIL_PASSWORD", "legacy"),
            ("SMTP_SERVER", "smtp.example.com"),
            ("SMTP_PORT", "587"),
        ]);
        let mut cfg = Config::default();
        cfg.email.sender = "configured@example.com".to_string();

        apply_secrets(&mut cfg, |k| env.get(k).map(|v| v.to_string()));

        assert_eq!(cfg.tushare.token, "tok");
        assert_eq!(cfg.email.sender, "configured@example.com");
        assert_eq!(cfg.email.password, "legacy");
        assert_eq!(cfg.email.smtp_port, 587);
        assert!(cfg.email.is_configured());
    }

    #[test]
    fn bad_smtp_port_keeps_default() {
        let mut cfg = Config::default();
        apply_secrets(&mut cfg, |k| (k == "SMTP_PORT").then(|| "not-a-port".to_string()));
        assert_eq!(cfg.email.smtp_port, 465);
    }

    #[test]
    fn recipients_file_is_merged_without_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipients.json");
        std::fs::write(&path, r#"{"recipients": ["a@example.com", " b@example.com ", ""]}"#).unwrap();

        let mut cfg = Config::default();
        cfg.email.recipients = vec!["a@example.com".to_string()];
        cfg.email.recipients_file = Some(path);
        load_recipients(&mut cfg);

        assert_eq!(cfg.email.recipients, vec!["a@example.com", "b@example.com"]);
    }

    #[test]
    fn malformed_recipients_file_leaves_list_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recipients.json");
        std::fs::write(&path, "[not json").unwrap();

        assert!(matches!(read_recipients_file(&path), Err(ConfigError::Recipients { .. })));

        let mut cfg = Config::default();
        cfg.email.recipients_file = Some(path);
        load_recipients(&mut cfg);
        assert!(cfg.email.recipients.is_empty());
    }
}
