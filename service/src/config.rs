use clap::builder::TypedValueParser as _;
use clap::{ArgAction, Parser};
use dotenvy::dotenv;
use log::{warn, LevelFilter};
use sse::HubConfig;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub enum RustEnv {
    Development,
    Production,
    Staging,
}

#[derive(Debug, PartialEq, Eq)]
pub struct RustEnvParseError;

impl FromStr for RustEnv {
    type Err = RustEnvParseError;
    fn from_str(level: &str) -> Result<RustEnv, Self::Err> {
        match level.to_lowercase().as_str() {
            "development" => Ok(RustEnv::Development),
            "production" => Ok(RustEnv::Production),
            "staging" => Ok(RustEnv::Staging),
            _ => Err(RustEnvParseError),
        }
    }
}

impl fmt::Display for RustEnv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RustEnv::Development => write!(f, "development"),
            RustEnv::Production => write!(f, "production"),
            RustEnv::Staging => write!(f, "staging"),
        }
    }
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// A list of full CORS origin URLs that allowed to receive server responses.
    #[arg(
        long,
        env,
        value_delimiter = ',',
        use_value_delimiter = true,
        default_value = "http://localhost:3000,https://localhost:3000"
    )]
    pub allowed_origins: Vec<String>,

    /// The host interface to listen for incoming connections
    #[arg(short, long, env, default_value = "127.0.0.1")]
    pub interface: Option<String>,

    /// The host TCP port to listen for incoming connections
    #[arg(short, long, env, default_value_t = 4000)]
    pub port: u16,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,

    /// Set the Rust runtime environment to use.
    #[arg(
    short,
    long,
    env,
    default_value_t = RustEnv::Development,
    value_parser = clap::builder::PossibleValuesParser::new([
        "DEVELOPMENT", "PRODUCTION", "STAGING",
        "development", "production", "staging"
    ])
        .map(|s| s.parse::<RustEnv>().unwrap()),
    )]
    pub runtime_env: RustEnv,

    /// Path prefix every module route is mounted under (e.g. "/api"). Empty mounts at the root.
    #[arg(long, env, default_value = "/api")]
    pub route_prefix: String,

    /// Log the mounted module names once mounting succeeds.
    #[arg(long, env, default_value_t = true, action = ArgAction::Set)]
    pub mount_banner: bool,

    /// Static API tokens as `token:user_id` pairs, comma separated.
    #[arg(long, env, value_delimiter = ',', use_value_delimiter = true)]
    auth_tokens: Vec<String>,

    /// Outbound buffer per SSE client, in events. A full buffer drops new events for that client.
    #[arg(long, env, default_value_t = 100)]
    pub sse_buffer_size: usize,

    /// Maximum number of concurrent SSE clients across all users (unlimited when unset)
    #[arg(long, env)]
    pub sse_max_clients: Option<usize>,

    /// Maximum number of concurrent SSE clients per user; the oldest is evicted (unlimited when unset)
    #[arg(long, env)]
    pub sse_max_clients_per_user: Option<usize>,

    /// Seconds between SSE heartbeat events
    #[arg(long, env, default_value_t = 30)]
    pub sse_heartbeat_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn runtime_env(&self) -> RustEnv {
        self.runtime_env.clone()
    }

    pub fn is_production(&self) -> bool {
        self.runtime_env() == RustEnv::Production
    }

    /// `host:port` to bind the HTTP listener to.
    pub fn listen_address(&self) -> String {
        format!(
            "{}:{}",
            self.interface.as_deref().unwrap_or("127.0.0.1"),
            self.port
        )
    }

    /// Parsed `token:user_id` pairs. Malformed entries are skipped with a warning.
    pub fn auth_tokens(&self) -> Vec<(String, String)> {
        self.auth_tokens
            .iter()
            .map(|entry| entry.trim())
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match entry.split_once(':') {
                Some((token, user_id)) if !token.is_empty() && !user_id.is_empty() => {
                    Some((token.to_string(), user_id.to_string()))
                }
                _ => {
                    warn!("Ignoring malformed auth token entry (expected token:user_id)");
                    None
                }
            })
            .collect()
    }

    /// Hub settings derived from the `sse_*` options; queue sizes keep their defaults.
    pub fn sse_hub_config(&self) -> HubConfig {
        HubConfig {
            buffer_size: self.sse_buffer_size.max(1),
            max_clients: self.sse_max_clients,
            max_clients_per_user: self.sse_max_clients_per_user,
            heartbeat_interval: Duration::from_secs(self.sse_heartbeat_interval_secs.max(1)),
            ..HubConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::parse_from(std::iter::once("saas_starter").chain(args.iter().copied()))
    }

    #[test]
    fn test_rust_env_parses_case_insensitively() {
        assert_eq!("PRODUCTION".parse::<RustEnv>(), Ok(RustEnv::Production));
        assert_eq!("staging".parse::<RustEnv>(), Ok(RustEnv::Staging));
        assert_eq!("qa".parse::<RustEnv>(), Err(RustEnvParseError));
    }

    #[test]
    fn test_auth_tokens_skips_malformed_entries() {
        let config = parse(&["--auth-tokens", "abc:alice, def:bob,broken,:nobody"]);

        assert_eq!(
            config.auth_tokens(),
            vec![
                ("abc".to_string(), "alice".to_string()),
                ("def".to_string(), "bob".to_string()),
            ]
        );
    }

    #[test]
    fn test_sse_hub_config_maps_sse_options() {
        let config = parse(&[
            "--sse-buffer-size",
            "8",
            "--sse-max-clients-per-user",
            "2",
            "--sse-heartbeat-interval-secs",
            "5",
        ]);

        let hub = config.sse_hub_config();

        assert_eq!(hub.buffer_size, 8);
        assert_eq!(hub.max_clients_per_user, Some(2));
        assert_eq!(hub.heartbeat_interval, Duration::from_secs(5));
        assert_eq!(hub.broadcast_queue_size, HubConfig::default().broadcast_queue_size);
    }

    #[test]
    fn test_mount_banner_can_be_switched_off() {
        let config = parse(&["--mount-banner", "false", "--port", "8080"]);

        assert!(!config.mount_banner);
        assert_eq!(config.port, 8080);
    }
}
