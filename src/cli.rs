//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::MAX_DELAY_SECONDS;

/// pcats - client for the PCATS causal-inference service
///
/// Submit GP/BART analyses of a CSV data set, wait for them to finish,
/// and print the estimated treatment effects.
///
/// Examples:
///   pcats run request.toml
///   pcats submit request.toml
///   pcats wait 7f0c2e44 && pcats result 7f0c2e44
///   pcats cate --job 7f0c2e44 --x baseline_cJADAS.3 --control-tr 0,0,0 --treat-tr 1,0,0
///   pcats fetch-data example1.csv --dir data
///   pcats init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Path to configuration file
    ///
    /// If not specified, looks for .pcats.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Service API base URL
    #[arg(long, value_name = "URL", env = "PCATS_URL", global = true)]
    pub url: Option<String>,

    /// Bearer token for the service
    #[arg(
        long,
        value_name = "TOKEN",
        env = "PCATS_TOKEN",
        hide_env_values = true,
        global = true
    )]
    pub token: Option<String>,

    /// Seconds between status checks (first delay when backing off)
    #[arg(long, value_name = "SECS", global = true)]
    pub poll_interval: Option<f64>,

    /// Poll at a fixed interval instead of backing off exponentially
    #[arg(long, global = true)]
    pub fixed_interval: bool,

    /// Give up waiting for a job after this many seconds
    ///
    /// The job keeps running on the service; use `pcats wait <ID>` to resume.
    #[arg(long, value_name = "SECS", global = true)]
    pub timeout: Option<u64>,

    /// Output format (text, json)
    #[arg(long, value_name = "FORMAT", global = true)]
    pub format: Option<OutputFormat>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Submit a request file, wait for the job and print its result
    ///
    /// Missing data files listed under [download] are fetched first, and
    /// every [[cate]] follow-up runs once the main job is done.
    Run {
        /// Request file (TOML)
        #[arg(value_name = "REQUEST")]
        request: PathBuf,
    },

    /// Submit a request file and print the job id
    Submit {
        #[arg(value_name = "REQUEST")]
        request: PathBuf,
    },

    /// Run a CATE follow-up on a completed static job
    Cate {
        /// Parent job id
        #[arg(long, value_name = "ID")]
        job: String,

        /// Variable the conditional effect is computed over
        #[arg(long, value_name = "VAR")]
        x: String,

        /// Control treatment values (comma-separated)
        #[arg(long, value_name = "VALUES")]
        control_tr: String,

        /// Treated treatment values (comma-separated)
        #[arg(long, value_name = "VALUES")]
        treat_tr: String,

        /// Values of the x variable to evaluate at (comma-separated)
        #[arg(long, value_name = "VALUES")]
        pr_values: Option<String>,

        /// Print the follow-up job id without waiting for it
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the current status of a job
    Status {
        #[arg(value_name = "ID")]
        job: String,
    },

    /// Wait for a job to finish
    Wait {
        #[arg(value_name = "ID")]
        job: String,
    },

    /// Print the result of a finished job
    Result {
        #[arg(value_name = "ID")]
        job: String,
    },

    /// Download data files (URLs or example data set names)
    FetchData {
        #[arg(value_name = "URL|NAME", required = true)]
        sources: Vec<String>,

        /// Directory to write the files into
        #[arg(long, default_value = ".", value_name = "DIR")]
        dir: PathBuf,
    },

    /// Generate a default .pcats.toml configuration file
    InitConfig {
        /// Also write an example request.toml
        #[arg(long)]
        with_request: bool,
    },
}

/// Output format for reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text (default)
    #[default]
    Text,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref url) = self.url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err("Service URL must start with 'http://' or 'https://'".to_string());
            }
        }

        if let Some(interval) = self.poll_interval {
            if !(interval > 0.0) || !interval.is_finite() || interval > MAX_DELAY_SECONDS {
                return Err(format!(
                    "Poll interval must be a positive number of seconds up to {}",
                    MAX_DELAY_SECONDS
                ));
            }
        }

        // Validate timeout if provided
        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        match self.command {
            Command::Run { ref request } | Command::Submit { ref request } => {
                if !request.is_file() {
                    return Err(format!("Request file does not exist: {}", request.display()));
                }
            }
            Command::FetchData { ref dir, .. } => {
                if dir.exists() && !dir.is_dir() {
                    return Err(format!("Not a directory: {}", dir.display()));
                }
            }
            _ => {}
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
