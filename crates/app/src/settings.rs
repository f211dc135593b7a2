use clap::Parser;
use serde::Deserialize;

use crate::{commands::Command, error::Result};

const DEFAULT_CONFIG_PATH: &str = "config/tally.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub base_url: String,
    pub region: String,
    pub timezone: String,
    pub level: String,
    pub auth: AuthSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:3000/api".to_string(),
            region: "my".to_string(),
            timezone: "Asia/Kuala_Lumpur".to_string(),
            level: "info".to_string(),
            auth: AuthSettings::default(),
        }
    }
}

/// Identity provider realm and the tokens of the current session.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub url: String,
    pub realm: String,
    pub client_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8080".to_string(),
            realm: "tally".to_string(),
            client_id: "tally-web".to_string(),
            access_token: None,
            refresh_token: None,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "tally", about = "Personal finance dashboard in the terminal")]
pub struct Cli {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    config: Option<String>,
    /// Override base URL of the API (e.g. http://127.0.0.1:3000/api).
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Regional scope: `my` (MYR) or `in` (INR).
    #[arg(long, global = true)]
    region: Option<String>,
    /// Override timezone (IANA name).
    #[arg(long, global = true)]
    timezone: Option<String>,
    /// Log level.
    #[arg(long, global = true)]
    level: Option<String>,
    #[command(subcommand)]
    pub command: Command,
}

pub fn load(cli: &Cli) -> Result<Settings> {
    let config_path = cli.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut builder = config::Config::builder();
    builder = builder.add_source(config::File::with_name(config_path).required(false));
    builder = builder.add_source(
        config::Environment::with_prefix("TALLY")
            .prefix_separator("_")
            .separator("__"),
    );
    let mut settings: Settings = builder.build()?.try_deserialize()?;

    if let Some(base_url) = &cli.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(region) = &cli.region {
        settings.region = region.clone();
    }
    if let Some(timezone) = &cli.timezone {
        settings.timezone = timezone.clone();
    }
    if let Some(level) = &cli.level {
        settings.level = level.clone();
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "tally",
            "--config",
            "does/not/exist.toml",
            "--region",
            "in",
            "months",
        ]);
        let settings = load(&cli).unwrap();
        assert_eq!(settings.region, "in");
        assert_eq!(settings.auth.realm, "tally");
        assert!(matches!(cli.command, Command::Months));
    }
}
