//! Post-install service health poller for `GET /api/v1/release/servicepackages`.
//!
//! Only the first service package is inspected; the controller reports a
//! single aggregate package once installation has finished.

use std::time::Duration;

use reqwest::StatusCode;
use serde_json::Value;
use tracing::warn;

use crate::auth;
use crate::client::{Controller, SERVICE_PACKAGES};
use crate::config::ReauthPolicy;
use crate::domain::poll::{poll_until, PollOutcome, PollSchedule, Probe};
use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceStatus {
    pub deployment_state: Option<String>,
    pub oper_state: Option<String>,
    pub install_state: Option<String>,
    /// `operState.timeStamp`; `operState.state` is absent until this is set.
    pub timestamp: Option<String>,
    pub is_ready: bool,
}

impl ServiceStatus {
    /// Read the first package out of a service-packages reply.
    pub fn from_reply(body: &Value) -> Option<Self> {
        let status = body.get("items")?.as_array()?.first()?.get("status")?;
        let field = |pointer: &str| status.pointer(pointer).and_then(Value::as_str).map(String::from);

        let timestamp = match status.pointer("/operState/timeStamp") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
        };
        let oper_state = field("/operState/state");
        let deployment_state = field("/deploymentState/state");
        let install_state = field("/installState/state");

        let is_ready = timestamp.is_some()
            && oper_state.as_deref() == Some("Healthy")
            && deployment_state.as_deref() == Some("Enabled")
            && install_state.as_deref() == Some("Installed");

        Some(Self {
            deployment_state,
            oper_state,
            install_state,
            timestamp,
            is_ready,
        })
    }
}

pub struct ServicePoller {
    timeout: Option<Duration>,
    reauth: ReauthPolicy,
}

impl ServicePoller {
    pub fn new(timeout: Option<Duration>, reauth: ReauthPolicy) -> Self {
        Self { timeout, reauth }
    }

    /// One health check. Fetch and parse problems yield a not-ready status;
    /// only a failed re-authentication is returned as an error.
    pub async fn poll_once<C: Controller>(&mut self, controller: &mut C) -> Result<ServiceStatus> {
        let reply = match controller.get(SERVICE_PACKAGES, self.timeout).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(error = %format!("{:#}", e), "failed to reach service packages endpoint");
                return Ok(ServiceStatus::default());
            }
        };

        match reply.status {
            StatusCode::OK => {}
            StatusCode::UNAUTHORIZED => {
                auth::reauthenticate(controller, &self.reauth).await?;
                return Ok(ServiceStatus::default());
            }
            status => {
                warn!(status = status.as_u16(), body = %reply.body, "failed to get services status");
                return Ok(ServiceStatus::default());
            }
        }

        let body: Value = match reply.json() {
            Ok(body) => body,
            Err(e) => {
                warn!(error = %e, "error parsing services status");
                return Ok(ServiceStatus::default());
            }
        };

        Ok(ServiceStatus::from_reply(&body).unwrap_or_else(|| {
            warn!("no service packages found in response");
            ServiceStatus::default()
        }))
    }

    pub async fn commit<C: Controller>(
        &mut self,
        controller: &mut C,
        schedule: &PollSchedule,
    ) -> Result<PollOutcome> {
        poll_until(self, controller, schedule).await
    }
}

impl Probe for ServicePoller {
    type Observation = ServiceStatus;
    const WHAT: &'static str = "service health";

    async fn probe<C: Controller>(&mut self, controller: &mut C) -> Result<ServiceStatus> {
        self.poll_once(controller).await
    }

    fn is_done(&self, status: &ServiceStatus) -> bool {
        status.is_ready
    }

    fn describe(&self, status: &ServiceStatus) -> String {
        let deployment = status.deployment_state.as_deref().unwrap_or("Unknown");
        let oper = status.oper_state.as_deref().unwrap_or("Not available");
        match (&status.timestamp, status.is_ready) {
            (Some(ts), true) => format!(
                "services are healthy: operState {}, deploymentState {}, timestamp {}",
                oper, deployment, ts
            ),
            (None, _) => format!(
                "waiting for operState timestamp: deploymentState {}",
                deployment
            ),
            (Some(_), false) => format!(
                "waiting for services to become healthy: operState {}, deploymentState {}",
                oper, deployment
            ),
        }
    }
}
