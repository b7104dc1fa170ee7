use std::path::PathBuf;

use clap::Parser;
use ecobee_remote_common::config::DEFAULT_CONFIG_PATH;

use crate::ecobee::DEFAULT_TOKEN_FILE;

/// Ecobee remote control
#[derive(Debug, Clone, Parser)]
#[command(name = "ecobee-remote")]
#[command(
    version,
    about = "Adjusts an ecobee heat hold from a room sensor and records metrics",
    long_about = None
)]
pub struct Cli {
    /// Compute and log the decision without changing the thermostat
    #[arg(long)]
    pub check_only: bool,

    /// Do not publish metrics to InfluxDB
    #[arg(long)]
    pub no_stats: bool,

    /// Seconds to wait for the thermostat to confirm a new hold
    #[arg(long, default_value_t = 60, value_parser = clap::value_parser!(u32).range(1..))]
    pub max_wait_sec: u32,

    /// INI configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// ecobee API key and token file, rewritten when tokens are refreshed
    #[arg(long, default_value = DEFAULT_TOKEN_FILE)]
    pub ecobee_config: PathBuf,

    /// Print the resolved configuration and exit
    #[arg(long)]
    pub dump_config: bool,
}
