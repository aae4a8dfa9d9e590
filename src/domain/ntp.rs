//! Controller-side NTP reachability check (`POST /v2/bootstrap/verifyntp`).

use std::collections::BTreeSet;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::client::{Controller, VERIFY_NTP};
use crate::config::Timeouts;
use crate::domain::topology::TopologyDocument;
use crate::error::{BootstrapError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NtpServer {
    pub host: String,
    #[serde(default)]
    pub prefer: bool,
}

/// The controller wants the hosts twice: as a flat list and as structured
/// server entries.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyNtpRequest {
    pub name_servers: Vec<String>,
    pub ntp_config: NtpConfig,
}

#[derive(Debug, Serialize)]
pub struct NtpConfig {
    pub servers: Vec<NtpServer>,
    pub keys: Vec<serde_json::Value>,
}

impl VerifyNtpRequest {
    pub fn new(servers: Vec<NtpServer>) -> Self {
        Self {
            name_servers: servers.iter().map(|s| s.host.clone()).collect(),
            ntp_config: NtpConfig {
                servers,
                keys: Vec::new(),
            },
        }
    }
}

/// One entry of the verification reply.
#[derive(Debug, Default, Deserialize)]
struct NtpVerdict {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    info: Option<String>,
}

/// `(name, error, info)` for a server the controller could not use.
pub type InvalidServer = (String, String, String);

pub fn servers_from(doc: &TopologyDocument) -> Result<Vec<NtpServer>> {
    let servers = doc.ntp_servers();
    if servers.is_empty() {
        return Err(BootstrapError::configuration(
            "at least one NTP server must be specified in clusterConfig.ntpConfig.servers",
        ));
    }
    servers
        .iter()
        .map(|s| {
            serde_json::from_value(s.clone()).map_err(|e| {
                BootstrapError::configuration(format!("invalid NTP server entry {}: {}", s, e))
            })
        })
        .collect()
}

/// A server is invalid when its error is anything but empty/`NONE`, or its
/// info is not exactly `valid`.
pub fn invalid_servers(verdicts_json: &str) -> Result<BTreeSet<InvalidServer>> {
    let verdicts: Vec<NtpVerdict> = serde_json::from_str(verdicts_json).map_err(|e| {
        BootstrapError::ntp_validation(format!("unexpected verification response: {}", e))
    })?;

    Ok(verdicts
        .into_iter()
        .filter_map(|v| {
            let name = v.name.filter(|n| !n.is_empty()).unwrap_or_else(|| "UNKNOWN".into());
            let error = v.error.filter(|e| !e.is_empty()).unwrap_or_else(|| "NONE".into());
            let info = v.info.unwrap_or_default();
            (error != "NONE" || info != "valid").then_some((name, error, info))
        })
        .collect())
}

pub async fn validate<C: Controller>(
    controller: &C,
    doc: &TopologyDocument,
    timeouts: &Timeouts,
) -> Result<()> {
    let servers = servers_from(doc)?;
    let hosts: Vec<String> = servers.iter().map(|s| s.host.clone()).collect();
    let request = VerifyNtpRequest::new(servers);

    let reply = controller
        .post(VERIFY_NTP, &request, timeouts.ntp_verify())
        .await
        .map_err(BootstrapError::from)?;

    if reply.status != StatusCode::OK {
        return Err(BootstrapError::ntp_validation(format!(
            "verification failed with status {} : {}",
            reply.status.as_u16(),
            reply.body
        )));
    }

    let invalid = invalid_servers(&reply.body)?;
    if !invalid.is_empty() {
        return Err(BootstrapError::ntp_validation(format!(
            "invalid NTP servers: {:?}; response: {}",
            invalid, reply.body
        )));
    }

    info!(servers = ?hosts, "NTP servers validated");
    Ok(())
}
