use std::{path::PathBuf, time::Duration};

use chrono::NaiveDate;
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use serde::Deserialize;

use crate::error::Result;

const DEFAULT_CONFIG_PATH: &str = "config/gastos.toml";
const DEFAULT_STATE_PATH: &str = "config/gastos_state.json";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_url: String,
    /// Public (anon) key of the project, sent as `apikey` on every request.
    pub anon_key: String,
    pub timezone: String,
    pub state_path: String,
    pub stale_time_secs: u64,
    pub level: String,
    pub offline: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321".to_string(),
            anon_key: String::new(),
            timezone: "America/Sao_Paulo".to_string(),
            state_path: DEFAULT_STATE_PATH.to_string(),
            stale_time_secs: engine::DEFAULT_STALE_TIME.as_secs(),
            level: "info".to_string(),
            offline: false,
        }
    }
}

impl AppConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone.parse::<Tz>().map_err(|err| {
            let message = format!("invalid timezone {}: {err}", self.timezone);
            config::ConfigError::Message(message).into()
        })
    }

    pub fn stale_time(&self) -> Duration {
        Duration::from_secs(self.stale_time_secs)
    }
}

#[derive(Debug, Parser)]
#[command(name = "gastos", about = "Controle de gastos", disable_version_flag = true)]
pub struct Args {
    /// Optional config file path (TOML).
    #[arg(long, global = true)]
    config: Option<String>,
    /// Override base URL of the backend.
    #[arg(long, global = true)]
    base_url: Option<String>,
    /// Override timezone (IANA name).
    #[arg(long, global = true)]
    timezone: Option<String>,
    /// Override where the signed-in session is kept.
    #[arg(long, global = true)]
    state_path: Option<String>,
    /// Override log level (error, warn, info, debug, trace).
    #[arg(long, global = true)]
    level: Option<String>,
    /// Use a throwaway in-memory store instead of the backend.
    #[arg(long, global = true)]
    offline: bool,
    #[command(subcommand)]
    pub command: Command,
}

/// One line typed at the `shell` prompt.
#[derive(Debug, Parser)]
#[command(name = "gastos", no_binary_name = true, disable_version_flag = true)]
pub struct ShellLine {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Sign in (password from GASTOS_PASSWORD or stdin, never from a flag).
    Login {
        #[arg(long)]
        email: String,
    },
    Logout,
    /// List expenses, most recent first.
    List,
    Add {
        #[arg(long)]
        description: String,
        #[arg(long)]
        amount: String,
        /// YYYY-MM-DD, defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Edit an expense; omitted fields keep their current value.
    Edit {
        id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    Delete {
        id: String,
    },
    /// Totals per month.
    Chart,
    /// Total of the current month.
    Total,
    /// Write the CSV report.
    Export {
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Read commands from stdin, sharing one cache.
    Shell,
}

pub fn load() -> Result<(AppConfig, Command)> {
    let args = Args::parse();
    let settings = settings(&args)?;
    Ok((settings, args.command))
}

fn settings(args: &Args) -> Result<AppConfig> {
    let config_path = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_PATH);
    let mut builder = config::Config::builder();
    builder = builder.add_source(config::File::with_name(config_path).required(false));
    builder = builder.add_source(config::Environment::with_prefix("GASTOS").try_parsing(true));
    let mut settings: AppConfig = builder.build()?.try_deserialize()?;

    if let Some(base_url) = &args.base_url {
        settings.base_url = base_url.clone();
    }
    if let Some(timezone) = &args.timezone {
        settings.timezone = timezone.clone();
    }
    if let Some(state_path) = &args.state_path {
        settings.state_path = state_path.clone();
    }
    if let Some(level) = &args.level {
        settings.level = level.clone();
    }
    if args.offline {
        settings.offline = true;
    }

    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let settings = AppConfig::default();
        assert_eq!(settings.tz().unwrap(), chrono_tz::America::Sao_Paulo);
        assert_eq!(settings.stale_time(), Duration::from_secs(30));
        assert_eq!(settings.state_path, "config/gastos_state.json");
        assert!(!settings.offline);
    }

    #[test]
    fn flags_override_file_and_env() {
        let args = Args::try_parse_from([
            "gastos",
            "--config",
            "does/not/exist",
            "list",
            "--timezone",
            "Europe/Rome",
            "--offline",
        ])
        .unwrap();
        let settings = settings(&args).unwrap();

        assert_eq!(args.command, Command::List);
        assert_eq!(settings.timezone, "Europe/Rome");
        assert!(settings.offline);
    }

    #[test]
    fn unknown_timezone_is_a_config_error() {
        let settings = AppConfig {
            timezone: "Mars/Olympus".to_string(),
            ..AppConfig::default()
        };
        assert!(settings.tz().is_err());
    }

    #[test]
    fn shell_lines_have_no_binary_name() {
        let line = ShellLine::try_parse_from(["edit", "abc", "--amount", "20"]).unwrap();
        assert_eq!(
            line.command,
            Command::Edit {
                id: "abc".to_string(),
                description: None,
                amount: Some("20".to_string()),
                date: None,
            }
        );

        let line = ShellLine::try_parse_from([
            "add",
            "--description",
            "Mercado",
            "--amount",
            "1",
            "--date",
            "2024-01-05",
        ])
        .unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 5);
        assert!(matches!(line.command, Command::Add { date, .. } if date == expected));
    }
}
