//! Declarative cluster topology, loaded from YAML and submitted verbatim.
//!
//! The document is kept as a generic tree so fields we never look at reach
//! the controller untouched. Only the paths below are interpreted:
//!
//! ```yaml
//! clusterConfig:
//!   name: nd-cluster
//!   ntpConfig:
//!     servers: [{host: 10.1.1.1, prefer: true}]
//! nodes:
//!   - managementNetwork: {ipSubnet: 10.0.0.11/24}
//!     nodeController: {loginUser: ND_USERNAME, loginPassword: ND_PASSWORD}
//! ```

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{BootstrapError, Result};

/// Placeholder replaced by the live username.
pub const USERNAME_SENTINEL: &str = "ND_USERNAME";
/// Placeholder replaced by the live password.
pub const PASSWORD_SENTINEL: &str = "ND_PASSWORD";

#[derive(Debug, Clone, PartialEq)]
pub struct TopologyDocument {
    root: Value,
}

impl TopologyDocument {
    pub fn load(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(BootstrapError::configuration(format!(
                    "configuration file '{}' not found",
                    path.display()
                )))
            }
            Err(e) => {
                return Err(BootstrapError::configuration(format!(
                    "error reading configuration file '{}': {}",
                    path.display(),
                    e
                )))
            }
        };
        Self::parse(&content).map_err(|e| match e {
            BootstrapError::Configuration(msg) => {
                BootstrapError::configuration(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    pub fn parse(yaml: &str) -> Result<Self> {
        let root: Value = serde_yaml::from_str(yaml)
            .map_err(|e| BootstrapError::configuration(format!("malformed YAML: {}", e)))?;
        if !root.is_object() {
            return Err(BootstrapError::configuration(
                "top level of the document must be a mapping",
            ));
        }
        Ok(Self { root })
    }

    #[cfg(test)]
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Checks, in order: `clusterConfig` present, `nodes` non-empty,
    /// `clusterConfig.name` non-empty. Stops at the first violation.
    pub fn validate(&self) -> Result<()> {
        if self.root.get("clusterConfig").is_none() {
            return Err(BootstrapError::configuration(
                "'clusterConfig' not found in config",
            ));
        }
        let has_nodes = self
            .root
            .get("nodes")
            .and_then(Value::as_array)
            .is_some_and(|nodes| !nodes.is_empty());
        if !has_nodes {
            return Err(BootstrapError::configuration("no nodes defined in config"));
        }
        if self.cluster_name().is_empty() {
            return Err(BootstrapError::configuration("'clusterConfig.name' is empty"));
        }
        Ok(())
    }

    pub fn cluster_name(&self) -> &str {
        self.root
            .pointer("/clusterConfig/name")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// `clusterConfig.ntpConfig.servers`, empty when any level is missing.
    pub fn ntp_servers(&self) -> &[Value] {
        self.root
            .pointer("/clusterConfig/ntpConfig/servers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Value> {
        self.root
            .get("nodes")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
    }

    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut Map<String, Value>> {
        self.root
            .get_mut("nodes")
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object_mut)
    }

    /// Swap the credential sentinels under each `nodeController` for the
    /// live credentials. Returns how many values were replaced.
    pub fn inject_credentials(&mut self, username: &str, password: &str) -> usize {
        let mut replaced = 0;
        for node in self.nodes_mut() {
            let Some(controller) = node.get_mut("nodeController").and_then(Value::as_object_mut)
            else {
                continue;
            };
            replaced += replace_sentinel(controller, "loginUser", USERNAME_SENTINEL, username);
            replaced += replace_sentinel(controller, "loginPassword", PASSWORD_SENTINEL, password);
        }
        replaced
    }

    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Pretty JSON with every `nodeController.loginPassword` masked, for
    /// printing the payload a dry run would have sent.
    pub fn to_redacted_json(&self) -> String {
        let mut root = self.root.clone();
        let nodes = root
            .get_mut("nodes")
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten();
        for node in nodes {
            if let Some(password) = node.pointer_mut("/nodeController/loginPassword") {
                *password = Value::String(REDACTED.to_string());
            }
        }
        serde_json::to_string_pretty(&root).unwrap_or_else(|_| root.to_string())
    }
}

const REDACTED: &str = "<redacted>";

fn replace_sentinel(map: &mut Map<String, Value>, key: &str, sentinel: &str, live: &str) -> usize {
    match map.get_mut(key) {
        Some(value) if value.as_str() == Some(sentinel) => {
            *value = Value::String(live.to_string());
            1
        }
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    const SAMPLE: &str = r#"
clusterConfig:
  name: nd-cluster
  ntpConfig:
    servers:
      - host: 10.1.1.1
        prefer: true
nodes:
  - hostName: nd1
    managementNetwork:
      ipSubnet: 10.0.0.11/24
    nodeController:
      loginUser: ND_USERNAME
      loginPassword: ND_PASSWORD
  - hostName: nd2
    managementNetwork:
      ipSubnet: 10.0.0.12/24
    nodeController:
      loginUser: rescue-user
      loginPassword: literal
  - hostName: nd3
    managementNetwork:
      ipSubnet: 10.0.0.13/24
"#;

    #[test]
    fn load_reads_yaml_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let doc = TopologyDocument::load(file.path()).unwrap();
        doc.validate().unwrap();
        assert_eq!(doc.cluster_name(), "nd-cluster");
        assert_eq!(doc.nodes().count(), 3);
        assert_eq!(doc.ntp_servers().len(), 1);
    }

    #[test]
    fn load_fails_for_missing_or_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let err = TopologyDocument::load(&dir.path().join("absent.yaml")).unwrap_err();
        assert!(err.to_string().contains("not found"));

        let path = dir.path().join("broken.yaml");
        std::fs::write(&path, "clusterConfig: [unclosed\n").unwrap();
        let err = TopologyDocument::load(&path).unwrap_err();
        assert!(matches!(err, BootstrapError::Configuration(_)));
        assert!(err.to_string().contains("broken.yaml"));

        let path = dir.path().join("scalar.yaml");
        std::fs::write(&path, "just a string\n").unwrap();
        assert!(TopologyDocument::load(&path).is_err());
    }

    #[test]
    fn validation_reports_the_first_violation_in_order() {
        let no_cluster = TopologyDocument::from_value(json!({"nodes": []}));
        assert!(no_cluster
            .validate()
            .unwrap_err()
            .to_string()
            .contains("'clusterConfig' not found"));

        let no_nodes = TopologyDocument::from_value(json!({"clusterConfig": {"name": ""}}));
        assert!(no_nodes
            .validate()
            .unwrap_err()
            .to_string()
            .contains("no nodes"));

        let empty_nodes =
            TopologyDocument::from_value(json!({"clusterConfig": {"name": ""}, "nodes": []}));
        assert!(empty_nodes
            .validate()
            .unwrap_err()
            .to_string()
            .contains("no nodes"));

        let no_name = TopologyDocument::from_value(json!({"clusterConfig": {}, "nodes": [{}]}));
        assert!(no_name
            .validate()
            .unwrap_err()
            .to_string()
            .contains("'clusterConfig.name' is empty"));
    }

    #[test]
    fn credential_injection_only_touches_sentinels() {
        let mut doc = TopologyDocument::parse(SAMPLE).unwrap();
        let replaced = doc.inject_credentials("admin", "s3cret");
        assert_eq!(replaced, 2);

        let nodes: Vec<&Value> = doc.nodes().collect();
        assert_eq!(nodes[0]["nodeController"]["loginUser"], "admin");
        assert_eq!(nodes[0]["nodeController"]["loginPassword"], "s3cret");
        assert_eq!(nodes[1]["nodeController"]["loginUser"], "rescue-user");
        assert_eq!(nodes[1]["nodeController"]["loginPassword"], "literal");
        assert!(nodes[2].get("nodeController").is_none());
        assert_eq!(nodes[2]["hostName"], "nd3");
    }

    #[test]
    fn credential_injection_ignores_sentinels_outside_node_controller() {
        let mut doc = TopologyDocument::from_value(json!({
            "clusterConfig": {"name": "ND_USERNAME"},
            "nodes": [{"loginUser": "ND_USERNAME", "nodeController": {"loginUser": "nd_username"}}],
        }));
        assert_eq!(doc.inject_credentials("admin", "pw"), 0);
        assert_eq!(doc.cluster_name(), "ND_USERNAME");
        assert_eq!(doc.as_value()["nodes"][0]["loginUser"], "ND_USERNAME");
    }

    #[test]
    fn redacted_json_masks_injected_passwords_only() {
        let mut doc = TopologyDocument::parse(SAMPLE).unwrap();
        doc.inject_credentials("admin", "s3cret");

        let redacted = doc.to_redacted_json();
        assert!(!redacted.contains("s3cret"));
        assert!(!redacted.contains("literal"));
        assert!(redacted.contains("\"loginUser\": \"admin\""));
        assert!(redacted.contains("\"hostName\": \"nd3\""));

        let printed: Value = serde_json::from_str(&redacted).unwrap();
        assert_eq!(printed["nodes"][0]["nodeController"]["loginPassword"], "<redacted>");
        assert!(printed["nodes"][2].get("nodeController").is_none());

        // The document that gets submitted keeps the live password.
        assert_eq!(doc.as_value()["nodes"][0]["nodeController"]["loginPassword"], "s3cret");
    }

    #[test]
    fn unknown_fields_survive_the_round_trip() {
        let doc = TopologyDocument::parse(SAMPLE).unwrap();
        let value = doc.as_value();
        assert_eq!(value["nodes"][0]["hostName"], "nd1");
        assert_eq!(value["clusterConfig"]["ntpConfig"]["servers"][0]["prefer"], true);
        assert!(doc.to_redacted_json().contains("\"hostName\": \"nd1\""));
    }
}
