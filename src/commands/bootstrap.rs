use std::path::PathBuf;

use colored::Colorize;
use tracing::{debug, info};

use crate::auth;
use crate::client::Controller;
use crate::config::Settings;
use crate::connection::ConnectionContext;
use crate::domain::discovery;
use crate::domain::install::InstallPoller;
use crate::domain::ntp;
use crate::domain::poll::{PollOutcome, PollSchedule};
use crate::domain::services::ServicePoller;
use crate::domain::submit::{self, SubmitOutcome};
use crate::domain::topology::TopologyDocument;
use crate::error::{BootstrapError, Result};

#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    pub config_file: PathBuf,
    pub dry_run: bool,
    pub poll_status: bool,
    pub install: PollSchedule,
    pub services: PollSchedule,
}

/// Where a successful run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    AlreadyBootstrapped,
    DryRun,
    Submitted,
    Healthy,
}

pub fn run(options: &BootstrapOptions, settings: &Settings) -> Result<RunOutcome> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| BootstrapError::configuration(format!("starting async runtime: {}", e)))?;
    runtime.block_on(run_async(options, settings))
}

async fn run_async(options: &BootstrapOptions, settings: &Settings) -> Result<RunOutcome> {
    println!("{}", "nd-bootstrap".bold());
    println!();

    // Config defects are deterministic; catch them before touching the network.
    println!("{} Loading {}", ">>".blue().bold(), options.config_file.display());
    let mut doc = TopologyDocument::load(&options.config_file)?;
    doc.validate()?;
    println!(
        "{} Cluster '{}' with {} node(s)",
        "ok".green().bold(),
        doc.cluster_name(),
        doc.nodes().count()
    );

    let ctx = ConnectionContext::from_settings(settings)?;
    println!("{} Logging in to {}", ">>".blue().bold(), ctx.base_url());
    let mut session = auth::authenticate(&ctx, settings).await?;
    println!("{} Authenticated as {}", "ok".green().bold(), ctx.username());

    coordinate(&mut session, &ctx, &mut doc, options, settings).await
}

/// Drive one bootstrap attempt against an authenticated controller.
///
/// `controller` may be re-authenticated in place by the pollers, so it is
/// handed to each step afresh rather than captured.
pub async fn coordinate<C: Controller>(
    controller: &mut C,
    ctx: &ConnectionContext,
    doc: &mut TopologyDocument,
    options: &BootstrapOptions,
    settings: &Settings,
) -> Result<RunOutcome> {
    let mut install = InstallPoller::new(settings.timeouts.poll(), settings.reauth.clone());

    if install.poll_once(controller).await? == 100 {
        println!(
            "{} Cluster '{}' is already bootstrapped",
            "ok".green().bold(),
            doc.cluster_name()
        );
        return Ok(RunOutcome::AlreadyBootstrapped);
    }

    println!("{} Reconciling node identities", ">>".blue().bold());
    let replaced = doc.inject_credentials(ctx.username(), ctx.password());
    info!(replaced, "injected node controller credentials");

    let discovered = discovery::fetch_inventory(controller, &settings.timeouts).await?;
    let updated = discovery::reconcile_serial_numbers(doc, &discovered)?;
    println!("{} Resolved serial numbers for {} node(s)", "ok".green().bold(), updated);

    println!("{} Validating NTP servers", ">>".blue().bold());
    ntp::validate(controller, doc, &settings.timeouts).await?;
    println!("{} NTP servers reachable from the controller", "ok".green().bold());

    println!(
        "{} Bootstrapping cluster '{}' on {}",
        ">>".blue().bold(),
        doc.cluster_name(),
        ctx.ip()
    );
    match submit::submit(controller, doc, &settings.timeouts, options.dry_run).await {
        SubmitOutcome::DryRun => {
            println!(
                "{} Dry run: not submitting. Would POST the following configuration \
                 (passwords redacted):",
                "::".blue().bold()
            );
            println!("{}", doc.to_redacted_json());
            return Ok(RunOutcome::DryRun);
        }
        SubmitOutcome::Accepted => {
            println!("{} Cluster bootstrap initiated", "ok".green().bold());
        }
        SubmitOutcome::AlreadySubmitted => {
            println!("{} Bootstrap configuration already submitted", "ok".green().bold());
        }
        SubmitOutcome::Rejected { status, detail } => {
            let status = status.map_or_else(|| "no response".to_string(), |s| s.to_string());
            println!(
                "{} Bootstrap request failed ({}): {}",
                "!!".yellow().bold(),
                status,
                detail
            );
            if !options.poll_status {
                return Err(BootstrapError::submission(format!("{}: {}", status, detail)));
            }
            println!("   Polling install status to see whether the controller started anyway.");
        }
    }

    if !options.poll_status {
        return Ok(RunOutcome::Submitted);
    }

    println!("{} Waiting for installation", ">>".blue().bold());
    let outcome = install.commit(controller, &options.install).await?;
    debug!(phase = ?install.phase(), progress = install.last().overall_progress, "install polling finished");
    if let PollOutcome::Exhausted { attempts } = outcome {
        return Err(BootstrapError::RetriesExhausted {
            what: "install status",
            attempts,
        });
    }
    println!("{} Installation complete", "ok".green().bold());

    println!("{} Waiting for services", ">>".blue().bold());
    let mut services = ServicePoller::new(settings.timeouts.poll(), settings.reauth.clone());
    if let PollOutcome::Exhausted { attempts } = services.commit(controller, &options.services).await? {
        return Err(BootstrapError::RetriesExhausted {
            what: "service health",
            attempts,
        });
    }
    println!("{} Services healthy", "ok".green().bold());

    Ok(RunOutcome::Healthy)
}
