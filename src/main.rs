mod auth;
mod client;
mod commands;
mod config;
mod connection;
mod domain;
mod error;
mod logging;
#[cfg(test)]
mod testing;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::info;

use crate::commands::bootstrap::{BootstrapOptions, RunOutcome};
use crate::domain::poll::PollSchedule;
use crate::logging::LogFormat;

/// Connection details come from the environment: ND_IP4 / ND_IP6,
/// ND_IP_PROTOCOL (IP4 or IP6, default IP4), ND_DOMAIN (default local),
/// ND_USERNAME and ND_PASSWORD.
#[derive(Parser)]
#[command(
    name = "nd-bootstrap",
    version,
    about = "Bootstrap a Nexus Dashboard cluster from a YAML topology"
)]
struct Cli {
    /// Path to the YAML cluster topology
    config_file: PathBuf,

    /// Perform all validation steps but skip the final POST
    #[arg(long)]
    dry_run: bool,

    /// Poll install and service status after submitting
    #[arg(long)]
    poll_status: bool,

    /// Install-status polls before giving up
    #[arg(long, default_value_t = 10)]
    retries: u32,

    /// Seconds between install-status polls
    #[arg(long, default_value_t = 10)]
    interval: u64,

    /// Service-health polls before giving up
    #[arg(long, default_value_t = 30)]
    service_retries: u32,

    /// Seconds between service-health polls
    #[arg(long, default_value_t = 20)]
    service_interval: u64,

    /// Settings file (default: ~/.config/nd-bootstrap/settings.yaml)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log level (overridden by RUST_LOG)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn options(&self) -> BootstrapOptions {
        BootstrapOptions {
            config_file: self.config_file.clone(),
            dry_run: self.dry_run,
            poll_status: self.poll_status,
            install: PollSchedule::new(self.retries, self.interval),
            services: PollSchedule::new(self.service_retries, self.service_interval),
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_format);

    match run(&cli) {
        Ok(outcome) => {
            info!(?outcome, "bootstrap finished");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "!!".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> error::Result<RunOutcome> {
    let settings = config::load(cli.settings.as_deref())?;
    commands::bootstrap::run(&cli.options(), &settings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cli_defaults() {
        let cli = Cli::parse_from(["nd-bootstrap", "cluster.yaml"]);
        let options = cli.options();
        assert_eq!(options.config_file, PathBuf::from("cluster.yaml"));
        assert!(!options.dry_run);
        assert!(!options.poll_status);
        assert_eq!(options.install, PollSchedule::new(10, 10));
        assert_eq!(options.services, PollSchedule::new(30, 20));
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn cli_flags() {
        let cli = Cli::parse_from([
            "nd-bootstrap",
            "cluster.yaml",
            "--dry-run",
            "--poll-status",
            "--retries",
            "50",
            "--interval",
            "20",
            "--log-format",
            "json",
        ]);
        let options = cli.options();
        assert!(options.dry_run);
        assert!(options.poll_status);
        assert_eq!(options.install, PollSchedule::new(50, 20));
        assert_eq!(cli.log_format, LogFormat::Json);
    }

    #[test]
    fn config_file_is_required() {
        assert!(Cli::try_parse_from(["nd-bootstrap"]).is_err());
    }
}
