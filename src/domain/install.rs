//! Install-progress poller for `GET /clusterstatus/install`.
//!
//! Early in bootstrap the controller drops off the network for a couple of
//! minutes, answers 404 before its status service is up, and invalidates
//! sessions. None of that is a failure here: the poller reports the last
//! progress it saw and tries again on the next interval. Only an explicit
//! failure state from the controller ends the run.

use std::time::Duration;

use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth;
use crate::client::{Controller, INSTALL_STATUS};
use crate::config::ReauthPolicy;
use crate::domain::poll::{poll_until, PollOutcome, PollSchedule, Probe};
use crate::error::{BootstrapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallPhase {
    NotStarted,
    Polling,
    Complete,
    Failed,
    Exhausted,
}

/// Last known install status.
#[derive(Debug, Clone, PartialEq)]
pub struct InstallProgress {
    pub overall_progress: u8,
    pub overall_status: String,
    pub state: String,
}

impl Default for InstallProgress {
    fn default() -> Self {
        Self {
            overall_progress: 0,
            overall_status: "Unknown".to_string(),
            state: "Unknown".to_string(),
        }
    }
}

impl InstallProgress {
    fn failed(&self) -> bool {
        [&self.overall_status, &self.state]
            .iter()
            .any(|s| s.to_lowercase().contains("fail"))
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InstallStatusReply {
    #[serde(default)]
    overall_progress: Option<f64>,
    #[serde(default)]
    overall_status: Option<String>,
    #[serde(default)]
    state: Option<String>,
}

pub struct InstallPoller {
    last: InstallProgress,
    phase: InstallPhase,
    timeout: Option<Duration>,
    reauth: ReauthPolicy,
}

impl InstallPoller {
    pub fn new(timeout: Option<Duration>, reauth: ReauthPolicy) -> Self {
        Self {
            last: InstallProgress::default(),
            phase: InstallPhase::NotStarted,
            timeout,
            reauth,
        }
    }

    pub fn phase(&self) -> InstallPhase {
        self.phase
    }

    pub fn last(&self) -> &InstallProgress {
        &self.last
    }

    /// One status check, returning overall progress (0..=100).
    pub async fn poll_once<C: Controller>(&mut self, controller: &mut C) -> Result<u8> {
        if self.phase == InstallPhase::NotStarted {
            self.phase = InstallPhase::Polling;
        }

        let reply = match controller.get(INSTALL_STATUS, self.timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(
                    error = %format!("{:#}", e),
                    progress = self.last.overall_progress,
                    "controller unreachable; expected for about two minutes during bootstrap"
                );
                return Ok(self.last.overall_progress);
            }
        };

        match reply.status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                debug!("install status not yet available");
                return Ok(self.last.overall_progress);
            }
            StatusCode::UNAUTHORIZED => {
                auth::reauthenticate(controller, &self.reauth).await?;
                return Ok(self.last.overall_progress);
            }
            status => {
                warn!(status = status.as_u16(), body = %reply.body, "failed to get install status");
                return Ok(self.last.overall_progress);
            }
        }

        let status: InstallStatusReply = match reply.json() {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "unparseable install status");
                return Ok(self.last.overall_progress);
            }
        };

        // Truncate so only a reported 100 counts as complete.
        if let Some(progress) = status.overall_progress {
            self.last.overall_progress = progress.clamp(0.0, 100.0).floor() as u8;
        }
        if let Some(overall_status) = status.overall_status {
            self.last.overall_status = overall_status;
        }
        if let Some(state) = status.state {
            self.last.state = state;
        }

        if self.last.failed() {
            self.phase = InstallPhase::Failed;
            return Err(BootstrapError::install_failed(format!(
                "overallProgress: {}, overallStatus: {}, state: {}",
                self.last.overall_progress, self.last.overall_status, self.last.state
            )));
        }

        Ok(self.last.overall_progress)
    }

    /// Poll until progress reaches 100 or `schedule` runs out.
    pub async fn commit<C: Controller>(
        &mut self,
        controller: &mut C,
        schedule: &PollSchedule,
    ) -> Result<PollOutcome> {
        let outcome = poll_until(self, controller, schedule).await?;
        self.phase = match outcome {
            PollOutcome::Converged { .. } => InstallPhase::Complete,
            PollOutcome::Exhausted { .. } => InstallPhase::Exhausted,
        };
        Ok(outcome)
    }
}

impl Probe for InstallPoller {
    type Observation = u8;
    const WHAT: &'static str = "install status";

    async fn probe<C: Controller>(&mut self, controller: &mut C) -> Result<u8> {
        self.poll_once(controller).await
    }

    fn is_done(&self, progress: &u8) -> bool {
        *progress == 100
    }

    fn describe(&self, progress: &u8) -> String {
        if *progress == 100 {
            "install complete".to_string()
        } else {
            format!(
                "install in progress: {}% (overallStatus: {}, state: {})",
                progress, self.last.overall_status, self.last.state
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedController;
    use serde_json::json;

    fn new_poller() -> InstallPoller {
        InstallPoller::new(
            None,
            ReauthPolicy {
                attempts: 3,
                delay_secs: 0,
            },
        )
    }

    #[tokio::test]
    async fn transient_failures_keep_last_known_progress() {
        let mut controller = ScriptedController::new()
            .json(200, json!({"overallProgress": 40, "overallStatus": "InProgress", "state": "Installing"}))
            .unreachable()
            .reply(404, "")
            .reply(503, "busy")
            .reply(200, "not json");
        let mut poller = new_poller();
        assert_eq!(poller.phase(), InstallPhase::NotStarted);

        assert_eq!(poller.poll_once(&mut controller).await.unwrap(), 40);
        assert_eq!(poller.phase(), InstallPhase::Polling);
        for _ in 0..4 {
            assert_eq!(poller.poll_once(&mut controller).await.unwrap(), 40);
        }
        assert_eq!(poller.last().state, "Installing");
        assert_eq!(controller.remaining(), 0);
    }

    #[tokio::test]
    async fn unauthorized_reauthenticates_without_failing() {
        let mut controller = ScriptedController::new().reply(401, "");
        let mut poller = new_poller();
        assert_eq!(poller.poll_once(&mut controller).await.unwrap(), 0);
        assert_eq!(controller.logins(), 1);
    }

    #[tokio::test]
    async fn reauthentication_exhaustion_is_fatal() {
        let mut controller = ScriptedController::new().failing_logins(5).reply(401, "");
        let err = new_poller().poll_once(&mut controller).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Authentication(_)));
    }

    #[tokio::test]
    async fn missing_progress_field_keeps_previous_value() {
        let mut controller = ScriptedController::new()
            .json(200, json!({"overallProgress": 70}))
            .json(200, json!({"state": "Installing"}));
        let mut poller = new_poller();
        assert_eq!(poller.poll_once(&mut controller).await.unwrap(), 70);
        assert_eq!(poller.poll_once(&mut controller).await.unwrap(), 70);
    }

    #[tokio::test]
    async fn fractional_progress_never_reads_as_complete() {
        let mut controller = ScriptedController::new()
            .json(200, json!({"overallProgress": 99.6}))
            .json(200, json!({"overallProgress": 100.0}));
        let mut poller = new_poller();

        let outcome = poller
            .commit(&mut controller, &PollSchedule::new(5, 0))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 2 });
        assert_eq!(controller.requests().len(), 2);

        let mut controller = ScriptedController::new().json(200, json!({"overallProgress": 99.6}));
        assert_eq!(new_poller().poll_once(&mut controller).await.unwrap(), 99);
    }

    #[tokio::test]
    async fn failure_state_is_fatal_even_at_full_progress() {
        let mut controller = ScriptedController::new().json(
            200,
            json!({"overallProgress": 100, "overallStatus": "Failed", "state": "Install Failed"}),
        );
        let mut poller = new_poller();
        let err = poller.poll_once(&mut controller).await.unwrap_err();
        assert!(matches!(err, BootstrapError::InstallFailed(_)));
        assert!(err.to_string().contains("state: Install Failed"));
        assert_eq!(poller.phase(), InstallPhase::Failed);

        let mut controller = ScriptedController::new()
            .json(200, json!({"overallProgress": 20, "overallStatus": "FAILURE"}));
        assert!(new_poller().poll_once(&mut controller).await.is_err());
    }

    #[tokio::test]
    async fn commit_rides_through_404_and_401_to_completion() {
        let mut controller = ScriptedController::new()
            .reply(404, "")
            .reply(401, "")
            .json(200, json!({"overallProgress": 50}))
            .json(200, json!({"overallProgress": 100}));
        let mut poller = new_poller();

        let outcome = poller
            .commit(&mut controller, &PollSchedule::new(10, 0))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Converged { attempts: 4 });
        assert_eq!(poller.phase(), InstallPhase::Complete);
        assert_eq!(controller.logins(), 1);
        assert_eq!(controller.requests().len(), 4);
        assert_eq!(controller.remaining(), 0);
    }

    #[tokio::test]
    async fn commit_reports_exhaustion_without_raising() {
        let mut controller = ScriptedController::new()
            .json(200, json!({"overallProgress": 10}))
            .json(200, json!({"overallProgress": 20}));
        let mut poller = new_poller();

        let outcome = poller
            .commit(&mut controller, &PollSchedule::new(2, 0))
            .await
            .unwrap();
        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 2 });
        assert_eq!(poller.phase(), InstallPhase::Exhausted);
        assert_eq!(controller.requests().len(), 2);
        assert_eq!(poller.last().overall_progress, 20);
    }
}
