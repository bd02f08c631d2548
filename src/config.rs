use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::batch::{BatchGenerator, DEFAULT_VOCABULARY};
use crate::session::{Session, Strategy};
use crate::transport::DEFAULT_PORT;

/// Target run count when none is given.
pub const DEFAULT_TARGET_RUNS: u64 = 10;

/// Which session strategy drives the remote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Alternate `exec sosh` and `exit`.
    #[default]
    Alternating,
    /// Inject random command batches between duplicated launch/exit commands.
    BatchInjection,
}

/// Driver configuration, loaded from TOML and overridden by CLI flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Address to bind the UDP socket on.
    pub bind_ip: IpAddr,
    /// Local UDP port the remote reports to.
    pub port: u16,
    /// Runs after which automated driving stops.
    pub target_runs: u64,
    pub strategy: StrategyKind,
    /// Character the remote prints when ready for the next command.
    pub completion_token: char,
    /// First character of an operator directive line.
    pub directive_marker: char,
    /// Launch shells with `exec sosh &` instead of `exec sosh`.
    pub background_launch: bool,
    pub batch: BatchConfig,
}

/// `[batch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Commands a batch is drawn from.
    pub vocabulary: Vec<String>,
    /// Seed for reproducible batches. Random when unset.
    pub seed: Option<u64>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            target_runs: DEFAULT_TARGET_RUNS,
            strategy: StrategyKind::default(),
            completion_token: '$',
            directive_marker: '/',
            background_launch: false,
            batch: BatchConfig::default(),
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            vocabulary: DEFAULT_VOCABULARY.iter().map(|s| s.to_string()).collect(),
            seed: None,
        }
    }
}

/// Errors that can occur when loading or validating config.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl DriverConfig {
    /// Load config from a TOML file path. Returns None if file doesn't exist.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::ParseFailed {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Some(config))
    }

    /// Check the values a TOML file or CLI flag could have gotten wrong.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_runs == 0 {
            return Err(ConfigError::Invalid("target_runs must be at least 1".into()));
        }
        if !self.completion_token.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "completion_token must be ASCII, got {:?}",
                self.completion_token
            )));
        }
        if !self.directive_marker.is_ascii() {
            return Err(ConfigError::Invalid(format!(
                "directive_marker must be ASCII, got {:?}",
                self.directive_marker
            )));
        }
        if self.batch.vocabulary.is_empty() {
            return Err(ConfigError::Invalid("batch.vocabulary must not be empty".into()));
        }
        if let Some(cmd) = self.batch.vocabulary.iter().find(|c| c.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "batch.vocabulary contains a blank command: {cmd:?}"
            )));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.port)
    }

    /// Build the session this config describes.
    pub fn session(&self) -> Result<Session, ConfigError> {
        self.validate()?;
        let strategy = match self.strategy {
            StrategyKind::Alternating => Strategy::Alternating,
            StrategyKind::BatchInjection => {
                let generator = BatchGenerator::new(self.batch.vocabulary.clone()).ok_or_else(|| {
                    ConfigError::Invalid("batch.vocabulary must not be empty".into())
                })?;
                let rng = match self.batch.seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                Strategy::BatchInjection { generator, rng }
            }
        };
        Ok(Session::new(strategy, self.target_runs)
            .with_background_launch(self.background_launch)
            .with_completion_token(self.completion_token as u8))
    }
}
