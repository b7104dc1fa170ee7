use std::process::ExitCode;

use clap::Parser;

mod cli;
mod ecobee;
mod error;
mod host;
mod influx;
#[cfg(test)]
mod testing;
mod verify;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    host::run(cli::Cli::parse()).await
}
