//! Command line arguments and the validated server configuration built from them.

use crate::error::ConfigError;
use crate::session::SessionSettings;
use crate::sink::Identity;
use clap::Parser;
use shared::{SizeRange, MAX_TARGET_SIZE, MIN_TARGET_SIZE, TRIAL_LIMIT};
use std::path::PathBuf;
use std::time::Duration;

/// Fitts' law reaction-time experiment server
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Subject identifier, used to name result files
    #[arg(requires = "condition")]
    pub subject: Option<String>,

    /// Condition label, used to name result files
    pub condition: Option<String>,

    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "8080")]
    pub port: u16,

    /// Seconds to wait for each client message (waits forever if unset)
    #[arg(long)]
    pub read_timeout: Option<u64>,

    /// Seconds allowed for each message sent to a client
    #[arg(long)]
    pub write_timeout: Option<u64>,

    /// Targets per session
    #[arg(short, long, default_value_t = TRIAL_LIMIT)]
    pub trials: u32,

    /// Smallest target size in pixels
    #[arg(long, default_value_t = MIN_TARGET_SIZE)]
    pub min_size: u32,

    /// Largest target size in pixels
    #[arg(long, default_value_t = MAX_TARGET_SIZE)]
    pub max_size: u32,

    /// Directory result files are written to
    #[arg(short, long, default_value = "results")]
    pub results_dir: PathBuf,

    /// Seed for target placement (random if unset)
    #[arg(long)]
    pub seed: Option<u64>,

    /// HTML page to serve at / instead of the built-in client
    #[arg(long)]
    pub page: Option<PathBuf>,

    /// Reject click reports that do not echo the target they answer
    #[arg(long)]
    pub strict_echo: bool,
}

/// Everything the server needs once arguments have been checked.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub address: String,
    pub session: SessionSettings,
    /// Labels for sessions that do not bring their own.
    pub identity: Option<Identity>,
    pub results_dir: PathBuf,
    pub seed: Option<u64>,
    pub page: Option<PathBuf>,
}

impl ServerConfig {
    /// Configuration for tests and embedding: `address`, defaults elsewhere.
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            session: SessionSettings::default(),
            identity: None,
            results_dir: PathBuf::from("results"),
            seed: None,
            page: None,
        }
    }
}

impl TryFrom<Args> for ServerConfig {
    type Error = ConfigError;

    fn try_from(args: Args) -> Result<Self, Self::Error> {
        if args.trials == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        let size_range = SizeRange::new(args.min_size, args.max_size)?;

        let identity = match (args.subject, args.condition) {
            (Some(subject), Some(condition)) => Some(Identity::new(subject, condition)?),
            (None, None) => None,
            _ => return Err(ConfigError::IncompleteIdentity),
        };

        Ok(Self {
            address: format!("{}:{}", args.host, args.port),
            session: SessionSettings {
                trial_limit: args.trials,
                size_range,
                read_timeout: args.read_timeout.map(Duration::from_secs),
                write_timeout: args.write_timeout.map(Duration::from_secs),
                strict_echo: args.strict_echo,
            },
            identity,
            results_dir: args.results_dir,
            seed: args.seed,
            page: args.page,
        })
    }
}
