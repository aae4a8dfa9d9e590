//! Submit the finished topology to `POST /v2/bootstrap/cluster`.

use reqwest::StatusCode;
use tracing::{info, warn};

use crate::client::{Controller, BOOTSTRAP_CLUSTER};
use crate::config::Timeouts;
use crate::domain::topology::TopologyDocument;

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Nothing was sent; the caller prints the payload.
    DryRun,
    Accepted,
    /// 405: the controller already has a bootstrap request.
    AlreadySubmitted,
    /// Reported but not fatal: the install poller has the final word.
    Rejected { status: Option<u16>, detail: String },
}

pub async fn submit<C: Controller>(
    controller: &C,
    doc: &TopologyDocument,
    timeouts: &Timeouts,
    dry_run: bool,
) -> SubmitOutcome {
    if dry_run {
        info!("dry run: skipping POST {}", BOOTSTRAP_CLUSTER);
        return SubmitOutcome::DryRun;
    }

    info!(cluster = %doc.cluster_name(), "submitting bootstrap configuration");
    let reply = match controller
        .post(BOOTSTRAP_CLUSTER, doc.as_value(), timeouts.submit())
        .await
    {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %format!("{:#}", e), "error sending bootstrap request");
            return SubmitOutcome::Rejected {
                status: None,
                detail: format!("{:#}", e),
            };
        }
    };

    match reply.status {
        StatusCode::OK | StatusCode::CREATED => {
            info!(response = %reply.body, "cluster bootstrap initiated");
            SubmitOutcome::Accepted
        }
        StatusCode::METHOD_NOT_ALLOWED => {
            info!("bootstrap configuration already submitted");
            SubmitOutcome::AlreadySubmitted
        }
        status => {
            warn!(status = status.as_u16(), body = %reply.body, "failed to bootstrap cluster");
            SubmitOutcome::Rejected {
                status: Some(status.as_u16()),
                detail: reply.body,
            }
        }
    }
}
