//! Connection context: which controller address to talk to and as whom.

use std::fmt;
use std::str::FromStr;

use crate::config::Settings;
use crate::error::{BootstrapError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpProtocol {
    V4,
    V6,
}

impl FromStr for IpProtocol {
    type Err = BootstrapError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IP4" => Ok(IpProtocol::V4),
            "IP6" => Ok(IpProtocol::V6),
            other => Err(BootstrapError::configuration(format!(
                "invalid ND_IP_PROTOCOL '{}', must be 'IP4' or 'IP6'",
                other
            ))),
        }
    }
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::V4 => write!(f, "IP4"),
            IpProtocol::V6 => write!(f, "IP6"),
        }
    }
}

/// Pick the address matching `protocol`. An empty string counts as unset.
pub fn resolve_ip<'a>(
    protocol: IpProtocol,
    ip4: Option<&'a str>,
    ip6: Option<&'a str>,
) -> Result<&'a str> {
    let (candidate, var) = match protocol {
        IpProtocol::V4 => (ip4, "ND_IP4"),
        IpProtocol::V6 => (ip6, "ND_IP6"),
    };
    match candidate.map(str::trim).filter(|ip| !ip.is_empty()) {
        Some(ip) => Ok(ip),
        None => Err(BootstrapError::configuration(format!(
            "ND_IP_PROTOCOL is set to {} but {} is not set",
            protocol, var
        ))),
    }
}

/// Immutable for the whole run.
#[derive(Clone)]
pub struct ConnectionContext {
    protocol: IpProtocol,
    ip: String,
    domain: String,
    username: String,
    password: String,
}

impl ConnectionContext {
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let protocol: IpProtocol = settings.ip_protocol.parse()?;
        let ip = resolve_ip(protocol, settings.ip4.as_deref(), settings.ip6.as_deref())?;
        let username = required(settings.username.as_deref(), "ND_USERNAME")?;
        let password = required(settings.password.as_deref(), "ND_PASSWORD")?;

        Ok(Self {
            protocol,
            ip: ip.to_string(),
            domain: settings.domain.clone(),
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    pub fn protocol(&self) -> IpProtocol {
        self.protocol
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    /// `https://<ip>`, with IPv6 literals bracketed.
    pub fn base_url(&self) -> String {
        match self.protocol {
            IpProtocol::V6 if !self.ip.starts_with('[') => format!("https://[{}]", self.ip),
            _ => format!("https://{}", self.ip),
        }
    }
}

impl fmt::Debug for ConnectionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionContext")
            .field("protocol", &self.protocol)
            .field("ip", &self.ip)
            .field("domain", &self.domain)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

fn required<'a>(value: Option<&'a str>, var: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| BootstrapError::configuration(format!("{} environment variable not set", var)))
}
