//! Command-line interface for resilient-fetch
//!
//! Every retry and breaker knob is a global flag, so the same binary can be
//! pointed at a flaky dependency with different tolerances without code
//! changes:
//!
//! - `get` fetches one URL and prints the result as JSON
//! - `batch` fetches every URL in a file with bounded parallelism
//!
//! Flag values are validated before any request is made; an invalid
//! combination (e.g. `--max-delay-ms` below `--base-delay-ms`) exits with an
//! error instead of silently misbehaving.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::retry::RetryConfig;
use crate::validation::{validate_breaker_config, validate_retry_config, ConfigError};

/// Main command-line interface structure
///
/// # Examples
///
/// ```
/// use clap::Parser;
/// use resilient_fetch::cli::{Cli, Commands};
///
/// let cli = Cli::try_parse_from([
///     "resilient-fetch",
///     "--retries",
///     "4",
///     "get",
///     "--url",
///     "https://rickandmortyapi.com/api/character/1",
/// ])
/// .unwrap();
///
/// assert_eq!(cli.retry_config().unwrap().max_retries, 4);
/// assert!(matches!(cli.command, Commands::Get { .. }));
/// ```
#[derive(Debug, Parser)]
#[command(
    name = "resilient-fetch",
    about = "Fetch JSON resources with retries, backoff and per-dependency circuit breakers",
    version
)]
pub struct Cli {
    /// Command to execute (single URL or batch file)
    #[command(subcommand)]
    pub command: Commands,

    /// Maximum fetches in flight during batch processing
    #[arg(short = 'c', long, default_value = "8", global = true)]
    pub concurrent_requests: usize,

    /// Retries after the first attempt (attempts = retries + 1)
    #[arg(long, default_value = "2", global = true)]
    pub retries: u32,

    /// Delay before the first retry, doubled on each subsequent one
    #[arg(long, default_value = "250", global = true)]
    pub base_delay_ms: u64,

    /// Cap on any single retry delay
    #[arg(long, default_value = "2500", global = true)]
    pub max_delay_ms: u64,

    /// Jitter fraction in [0, 1] applied to every retry delay
    #[arg(long, default_value = "0.2", global = true)]
    pub jitter: f64,

    /// Time budget for a single attempt; overrunning attempts are cancelled
    #[arg(short = 't', long, default_value = "7000", global = true)]
    pub timeout_ms: u64,

    /// Consecutive failed calls that open a dependency's circuit
    #[arg(long, default_value = "4", global = true)]
    pub failure_threshold: u32,

    /// Consecutive successful probes that close a half-open circuit
    #[arg(long, default_value = "2", global = true)]
    pub success_threshold: u32,

    /// How long an open circuit rejects calls before probing
    #[arg(long, default_value = "10000", global = true)]
    pub open_ms: u64,
}

impl Cli {
    /// Builds and validates the retry policy from the flags
    pub fn retry_config(&self) -> Result<RetryConfig, ConfigError> {
        let config = RetryConfig::default()
            .with_max_retries(self.retries)
            .with_base_delay(Duration::from_millis(self.base_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_jitter(self.jitter)
            .with_timeout(Duration::from_millis(self.timeout_ms));
        validate_retry_config(&config)?;
        Ok(config)
    }

    /// Builds and validates the breaker config shared by all dependencies
    pub fn breaker_config(&self) -> Result<CircuitBreakerConfig, ConfigError> {
        let config = CircuitBreakerConfig::default()
            .with_failure_threshold(self.failure_threshold)
            .with_success_threshold(self.success_threshold)
            .with_open_duration(Duration::from_millis(self.open_ms));
        validate_breaker_config(&config)?;
        Ok(config)
    }
}

/// Available subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Fetch a single URL and print the result as JSON
    Get {
        /// URL to fetch (e.g. https://rickandmortyapi.com/api/character/1)
        #[arg(short, long)]
        url: String,
    },
    /// Fetch every URL listed in a file
    ///
    /// One URL per line; empty lines and lines starting with '#' are
    /// skipped. Results go to the output file as JSON lines, or to stdout.
    Batch {
        /// Input file containing URLs (one per line)
        #[arg(short, long)]
        input_file: PathBuf,

        /// Output file for results (JSON, one result per line)
        #[arg(short, long)]
        output_file: Option<PathBuf>,

        /// URLs read and fetched per chunk
        #[arg(long, default_value = "100")]
        chunk_size: usize,
    },
}
