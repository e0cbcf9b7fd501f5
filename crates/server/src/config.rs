//! Runtime configuration: CLI flags, then environment, then defaults.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rand::RngCore;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_HOST: &str = "0.0.0.0";
pub const DEFAULT_TOKEN_EXPIRE_MINUTES: i64 = 60;
pub const DEFAULT_CONTROL_DEVICE: i64 = 1;

/// IoT control panel server.
#[derive(Parser, Debug, Default)]
#[command(name = "iot-panel", version = env!("CARGO_PKG_VERSION"), about = "IoT control panel server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Address to bind (env: IOT_PANEL_HOST).
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind (env: IOT_PANEL_PORT or PORT).
    #[arg(short, long)]
    pub port: Option<u16>,

    /// SQLite database file (env: IOT_PANEL_DB).
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Device that receives login notifications (env: IOT_PANEL_CONTROL_DEVICE).
    #[arg(long)]
    pub control_device: Option<i64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the server (default).
    Serve,

    /// Create the initial administrator account and exit.
    CreateAdmin {
        #[arg(long, default_value = "admin")]
        username: String,

        #[arg(long, default_value = "admin123")]
        password: String,

        #[arg(long, default_value = "admin@example.com")]
        email: String,

        #[arg(long, default_value = "Administrador")]
        name: String,
    },
}

/// Fully resolved settings shared by the app.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// `None` selects the default cache location.
    pub db_path: Option<PathBuf>,
    pub secret_key: String,
    pub token_expire_minutes: i64,
    pub control_device: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            db_path: None,
            secret_key: random_secret(),
            token_expire_minutes: DEFAULT_TOKEN_EXPIRE_MINUTES,
            control_device: DEFAULT_CONTROL_DEVICE,
        }
    }
}

impl Config {
    /// Merge CLI flags over the process environment.
    pub fn resolve(cli: &Cli) -> Self {
        Self::resolve_with(cli, |key| std::env::var(key).ok())
    }

    /// Same as [`Config::resolve`] with an injectable environment lookup.
    pub fn resolve_with(cli: &Cli, env: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Config::default();

        let secret_key = match env("IOT_PANEL_SECRET_KEY").filter(|s| !s.is_empty()) {
            Some(secret) => secret,
            None => {
                tracing::warn!(
                    "IOT_PANEL_SECRET_KEY is not set; tokens will not survive a restart"
                );
                defaults.secret_key
            }
        };

        Self {
            host: cli
                .host
                .clone()
                .or_else(|| env("IOT_PANEL_HOST"))
                .unwrap_or(defaults.host),
            port: cli
                .port
                .or_else(|| env("IOT_PANEL_PORT").and_then(|p| p.parse().ok()))
                .or_else(|| env("PORT").and_then(|p| p.parse().ok()))
                .unwrap_or(defaults.port),
            db_path: cli
                .db_path
                .clone()
                .or_else(|| env("IOT_PANEL_DB").map(PathBuf::from)),
            secret_key,
            token_expire_minutes: env("IOT_PANEL_TOKEN_EXPIRE_MINUTES")
                .and_then(|m| m.parse().ok())
                .filter(|m: &i64| *m > 0)
                .unwrap_or(defaults.token_expire_minutes),
            control_device: cli
                .control_device
                .or_else(|| env("IOT_PANEL_CONTROL_DEVICE").and_then(|d| d.parse().ok()))
                .unwrap_or(defaults.control_device),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// 32 random bytes, hex encoded.
fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve_with(&Cli::default(), env_of(&[]));
        assert_eq!(config.port, 8000);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.token_expire_minutes, 60);
        assert_eq!(config.control_device, 1);
        assert!(config.db_path.is_none());
        assert_eq!(config.secret_key.len(), 64);
    }

    #[test]
    fn test_env_overrides_defaults() {
        let config = Config::resolve_with(
            &Cli::default(),
            env_of(&[
                ("PORT", "9000"),
                ("IOT_PANEL_SECRET_KEY", "s3cret"),
                ("IOT_PANEL_TOKEN_EXPIRE_MINUTES", "15"),
                ("IOT_PANEL_CONTROL_DEVICE", "4"),
                ("IOT_PANEL_DB", "/tmp/panel.db"),
            ]),
        );
        assert_eq!(config.port, 9000);
        assert_eq!(config.secret_key, "s3cret");
        assert_eq!(config.token_expire_minutes, 15);
        assert_eq!(config.control_device, 4);
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/panel.db")));
    }

    #[test]
    fn test_panel_port_beats_generic_port() {
        let config = Config::resolve_with(
            &Cli::default(),
            env_of(&[("IOT_PANEL_PORT", "8100"), ("PORT", "9000")]),
        );
        assert_eq!(config.port, 8100);
    }

    #[test]
    fn test_cli_beats_env() {
        let cli = Cli::parse_from(["iot-panel", "--port", "7000", "--host", "127.0.0.1"]);
        let config = Config::resolve_with(&cli, env_of(&[("IOT_PANEL_PORT", "8100")]));
        assert_eq!(config.port, 7000);
        assert_eq!(config.bind_addr(), "127.0.0.1:7000");
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = Config::resolve_with(
            &Cli::default(),
            env_of(&[
                ("IOT_PANEL_PORT", "not-a-port"),
                ("IOT_PANEL_TOKEN_EXPIRE_MINUTES", "-5"),
            ]),
        );
        assert_eq!(config.port, 8000);
        assert_eq!(config.token_expire_minutes, 60);
    }

    #[test]
    fn test_create_admin_subcommand() {
        let cli = Cli::parse_from(["iot-panel", "create-admin", "--password", "pw"]);
        match cli.command {
            Some(Command::CreateAdmin {
                username,
                password,
                name,
                ..
            }) => {
                assert_eq!(username, "admin");
                assert_eq!(password, "pw");
                assert_eq!(name, "Administrador");
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
