//! Fixed-interval polling shared by the install and service pollers.

use std::time::Duration;

use tracing::{info, warn};

use crate::client::Controller;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    /// Number of probes; every iteration counts, whatever its outcome.
    pub retries: u32,
    pub interval: Duration,
}

impl PollSchedule {
    pub fn new(retries: u32, interval_secs: u64) -> Self {
        Self {
            retries,
            interval: Duration::from_secs(interval_secs),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Converged { attempts: u32 },
    Exhausted { attempts: u32 },
}

/// A single status check that can be repeated until it reports done.
#[allow(async_fn_in_trait)]
pub trait Probe {
    type Observation;

    /// Label used in log lines and errors.
    const WHAT: &'static str;

    /// `Err` only for conditions that must stop the run; transient trouble
    /// is folded into the observation.
    async fn probe<C: Controller>(&mut self, controller: &mut C) -> Result<Self::Observation>;

    fn is_done(&self, observation: &Self::Observation) -> bool;

    fn describe(&self, observation: &Self::Observation) -> String;
}

/// Probe up to `schedule.retries` times, sleeping `schedule.interval`
/// between probes. Running out of retries is an outcome, not an error.
pub async fn poll_until<P: Probe, C: Controller>(
    probe: &mut P,
    controller: &mut C,
    schedule: &PollSchedule,
) -> Result<PollOutcome> {
    info!(
        what = P::WHAT,
        retries = schedule.retries,
        interval_secs = schedule.interval.as_secs(),
        "polling until complete"
    );

    for attempt in 1..=schedule.retries {
        let observation = probe.probe(controller).await?;
        if probe.is_done(&observation) {
            info!(what = P::WHAT, attempt, "{}", probe.describe(&observation));
            return Ok(PollOutcome::Converged { attempts: attempt });
        }

        let remaining = schedule.retries - attempt;
        info!(what = P::WHAT, attempt, remaining, "{}", probe.describe(&observation));
        if remaining > 0 {
            tokio::time::sleep(schedule.interval).await;
        }
    }

    warn!(what = P::WHAT, retries = schedule.retries, "exceeded maximum retries");
    Ok(PollOutcome::Exhausted {
        attempts: schedule.retries,
    })
}
