//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! CLI and env are handled together by clap; the optional TOML file only
//! fills in what neither of them set. The Docker Hub password can come from
//! the CLI or env, never from the TOML file.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use clap::builder::BoolishValueParser;
use dockerhub_client::{AccountSet, LIMITS_ENDPOINT, RegistryEndpoints, TOKEN_ENDPOINT};
use serde::Deserialize;

pub const DEFAULT_SECRETS_DIR: &str = "/opt/secrets";
pub const DEFAULT_PORT: u16 = 8080;
pub const DEFAULT_CHECK_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MAX_CONNECTIONS: usize = 1000;

/// Docker Hub rate limits exporter for Prometheus
#[derive(Debug, Parser)]
#[command(name = "dockerhub-ratelimit-exporter", version, about)]
pub struct Cli {
    /// Optional TOML config file
    #[arg(short, long, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Directory with one file per account: file name is the Docker Hub
    /// username, file content the password [default: /opt/secrets]
    #[arg(short, long, env = "APP_SECRETS_DIR")]
    pub directory: Option<PathBuf>,

    /// Port to listen on [default: 8080]
    #[arg(short, long, env = "APP_PORT")]
    pub port: Option<u16>,

    /// Seconds between rate limit checks [default: 60]
    #[arg(short, long, env = "APP_CHECK_INTERVAL")]
    pub time: Option<u64>,

    /// Put the source IP reported by Docker Hub into the label set [default: false]
    #[arg(
        short,
        long,
        env = "APP_PUT_SOURCE_IP",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = BoolishValueParser::new()
    )]
    pub source: Option<bool>,

    /// Docker Hub username; overrides the secrets directory
    #[arg(long, env = "APP_DOCKERHUB_USERNAME")]
    pub username: Option<String>,

    /// Docker Hub password for --username
    #[arg(long, env = "APP_DOCKERHUB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

/// Optional TOML file layout. Every key may be omitted.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub exporter: ExporterFile,
    pub registry: RegistryFile,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ExporterFile {
    pub secrets_dir: Option<PathBuf>,
    pub port: Option<u16>,
    pub check_interval_secs: Option<u64>,
    pub put_source_ip: Option<bool>,
    pub max_connections: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegistryFile {
    pub token_url: Option<String>,
    pub limits_url: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

/// Fully resolved and validated runtime configuration.
#[derive(Debug)]
pub struct Config {
    pub secrets_dir: PathBuf,
    pub port: u16,
    pub check_interval: Duration,
    pub put_source_ip: bool,
    pub max_connections: usize,
    /// Set when a username/password pair was supplied; the secrets directory
    /// is then not read.
    pub credentials: Option<AccountSet>,
    pub registry: RegistryConfig,
}

#[derive(Debug)]
pub struct RegistryConfig {
    pub endpoints: RegistryEndpoints,
    pub timeout: Duration,
}

impl Config {
    /// Load the config file named by the CLI (if any) and merge.
    pub fn resolve(cli: Cli) -> common::Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::merge(cli, file)
    }

    /// Apply precedence and validate.
    pub fn merge(cli: Cli, file: FileConfig) -> common::Result<Self> {
        let check_interval_secs = cli
            .time
            .or(file.exporter.check_interval_secs)
            .unwrap_or(DEFAULT_CHECK_INTERVAL_SECS);
        if check_interval_secs == 0 {
            return Err(common::Error::Config(
                "check interval must be greater than 0".into(),
            ));
        }

        let timeout_secs = file.registry.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        if timeout_secs == 0 {
            return Err(common::Error::Config(
                "registry.timeout_secs must be greater than 0".into(),
            ));
        }

        let max_connections = file
            .exporter
            .max_connections
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);
        if max_connections == 0 {
            return Err(common::Error::Config(
                "exporter.max_connections must be greater than 0".into(),
            ));
        }

        let token_url = file
            .registry
            .token_url
            .unwrap_or_else(|| TOKEN_ENDPOINT.to_string());
        let limits_url = file
            .registry
            .limits_url
            .unwrap_or_else(|| LIMITS_ENDPOINT.to_string());
        validate_url("registry.token_url", &token_url)?;
        validate_url("registry.limits_url", &limits_url)?;

        let credentials = AccountSet::from_pair(cli.username.as_deref(), cli.password.as_deref())
            .map_err(|e| common::Error::Config(e.to_string()))?;

        Ok(Self {
            secrets_dir: cli
                .directory
                .or(file.exporter.secrets_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SECRETS_DIR)),
            port: cli.port.or(file.exporter.port).unwrap_or(DEFAULT_PORT),
            check_interval: Duration::from_secs(check_interval_secs),
            put_source_ip: cli
                .source
                .or(file.exporter.put_source_ip)
                .unwrap_or(false),
            max_connections,
            credentials,
            registry: RegistryConfig {
                endpoints: RegistryEndpoints {
                    token_url,
                    limits_url,
                },
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }

    /// Listen on all interfaces.
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.port))
    }
}

fn validate_url(key: &str, url: &str) -> common::Result<()> {
    if url.starts_with("http://") || url.starts_with("https://") {
        return Ok(());
    }
    Err(common::Error::Config(format!(
        "{key} must start with http:// or https://, got: {url}"
    )))
}
