//! Match declared nodes to discovered hardware and stamp in serial numbers.

use std::collections::HashMap;

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::info;

use crate::client::{Controller, BOOTSTRAP_CLUSTER};
use crate::config::Timeouts;
use crate::domain::topology::TopologyDocument;
use crate::error::{BootstrapError, Result};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredNode {
    #[serde(default)]
    pub management_network: Option<ManagementNetwork>,
    #[serde(default)]
    pub serial_number: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementNetwork {
    #[serde(default)]
    pub ip_subnet: Option<String>,
}

impl DiscoveredNode {
    pub fn ip_subnet(&self) -> &str {
        self.management_network
            .as_ref()
            .and_then(|m| m.ip_subnet.as_deref())
            .unwrap_or("")
    }

    pub fn serial_number(&self) -> &str {
        self.serial_number.as_deref().unwrap_or("")
    }
}

#[derive(Debug, Default, Deserialize)]
struct ClusterInventory {
    #[serde(default)]
    nodes: Option<Vec<DiscoveredNode>>,
}

/// `GET /v2/bootstrap/cluster`. Any failure is fatal: without the inventory
/// no node can be identified.
pub async fn fetch_inventory<C: Controller>(
    controller: &C,
    timeouts: &Timeouts,
) -> Result<Vec<DiscoveredNode>> {
    let reply = controller
        .get(BOOTSTRAP_CLUSTER, Some(timeouts.discovery()))
        .await
        .map_err(|e| BootstrapError::discovery(format!("error retrieving cluster inventory: {:#}", e)))?;

    if !matches!(reply.status, StatusCode::OK | StatusCode::CREATED) {
        return Err(BootstrapError::discovery(format!(
            "failed to retrieve cluster inventory: {} : {}",
            reply.status.as_u16(),
            reply.body
        )));
    }

    let inventory: ClusterInventory = reply
        .json()
        .map_err(|e| BootstrapError::discovery(format!("parsing cluster inventory: {}", e)))?;
    Ok(inventory.nodes.unwrap_or_default())
}

/// Write each discovered serial number into the declared node with the same
/// management subnet. Subnets are compared as exact strings, so
/// `10.0.0.11/24` and `10.0.0.11/255.255.255.0` do not match.
pub fn reconcile_serial_numbers(
    doc: &mut TopologyDocument,
    discovered: &[DiscoveredNode],
) -> Result<usize> {
    if discovered.is_empty() {
        return Err(BootstrapError::reconciliation(
            "no nodes found in the discovered inventory",
        ));
    }

    let mut by_subnet: HashMap<&str, &DiscoveredNode> = HashMap::new();
    for node in discovered {
        by_subnet.entry(node.ip_subnet()).or_insert(node);
    }

    let mut updated = 0;
    for node in doc.nodes_mut() {
        let subnet = node
            .get("managementNetwork")
            .and_then(|m| m.get("ipSubnet"))
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        if subnet.is_empty() {
            return Err(BootstrapError::reconciliation(
                "node managementNetwork.ipSubnet is missing or empty",
            ));
        }

        let matched = by_subnet.get(subnet.as_str()).ok_or_else(|| {
            BootstrapError::reconciliation(format!(
                "no discovered node matches managementNetwork.ipSubnet {}",
                subnet
            ))
        })?;

        let serial = matched.serial_number();
        if serial.is_empty() {
            return Err(BootstrapError::reconciliation(format!(
                "discovered node for managementNetwork.ipSubnet {} has no serialNumber",
                subnet
            )));
        }

        node.insert("serialNumber".to_string(), Value::String(serial.to_string()));
        info!(ip_subnet = %subnet, serial_number = %serial, "resolved node serial number");
        updated += 1;
    }

    Ok(updated)
}
