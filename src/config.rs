//! Runtime settings: built-in defaults, an optional YAML settings file, then
//! `ND_`-prefixed environment variables.
//!
//! Settings are extracted once in `main` and handed down by reference. Nothing
//! else in the crate reads the process environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{BootstrapError, Result};

const ENV_PREFIX: &str = "ND_";

/// Keys read verbatim from the environment. Figment's `Env` provider would
/// otherwise coerce values like `ND_PASSWORD=1234` into numbers.
const VERBATIM_KEYS: &[&str] = &["domain", "ip_protocol", "ip4", "ip6", "username", "password"];

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub domain: String,
    pub ip_protocol: String,
    pub ip4: Option<String>,
    pub ip6: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub verify_tls: bool,
    pub timeouts: Timeouts,
    pub reauth: ReauthPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            domain: "local".to_string(),
            ip_protocol: "IP4".to_string(),
            ip4: None,
            ip6: None,
            username: None,
            password: None,
            verify_tls: false,
            timeouts: Timeouts::default(),
            reauth: ReauthPolicy::default(),
        }
    }
}

/// Per-call-type request timeouts, in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Timeouts {
    pub login_secs: u64,
    pub ntp_verify_secs: u64,
    pub submit_secs: u64,
    pub discovery_secs: u64,
    /// Unset leaves polling GETs on the client default.
    pub poll_secs: Option<u64>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            login_secs: 10,
            ntp_verify_secs: 60,
            submit_secs: 300,
            discovery_secs: 10,
            poll_secs: None,
        }
    }
}

impl Timeouts {
    pub fn login(&self) -> Duration {
        Duration::from_secs(self.login_secs)
    }

    pub fn ntp_verify(&self) -> Duration {
        Duration::from_secs(self.ntp_verify_secs)
    }

    pub fn submit(&self) -> Duration {
        Duration::from_secs(self.submit_secs)
    }

    pub fn discovery(&self) -> Duration {
        Duration::from_secs(self.discovery_secs)
    }

    pub fn poll(&self) -> Option<Duration> {
        self.poll_secs.map(Duration::from_secs)
    }

    /// Submission may take far longer to be accepted than NTP verification,
    /// which in turn is slower than a login.
    pub fn validate(&self) -> Result<()> {
        if !(self.submit_secs > self.ntp_verify_secs && self.ntp_verify_secs > self.login_secs) {
            return Err(BootstrapError::configuration(format!(
                "timeouts must satisfy submit ({}s) > ntp_verify ({}s) > login ({}s)",
                self.submit_secs, self.ntp_verify_secs, self.login_secs
            )));
        }
        Ok(())
    }
}

/// How hard a poller tries to log back in after the controller returns 401.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReauthPolicy {
    pub attempts: u32,
    pub delay_secs: u64,
}

impl Default for ReauthPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay_secs: 10,
        }
    }
}

impl ReauthPolicy {
    pub fn delay(&self) -> Duration {
        Duration::from_secs(self.delay_secs)
    }
}

impl Settings {
    /// Default location of the optional settings file.
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("nd-bootstrap").join("settings.yaml"))
    }

    pub fn from_figment(figment: &Figment) -> Result<Self> {
        let settings: Settings = figment
            .extract()
            .map_err(|e| BootstrapError::configuration(format!("reading settings: {e}")))?;
        settings.timeouts.validate()?;
        Ok(settings)
    }
}

/// Assemble the provider stack. An explicit `settings_file` must exist; the
/// default location is used only when present.
pub fn layered(settings_file: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Settings::default()));

    match settings_file {
        Some(path) => {
            if !path.exists() {
                return Err(BootstrapError::configuration(format!(
                    "settings file '{}' not found",
                    path.display()
                )));
            }
            figment = figment.merge(Yaml::file(path));
        }
        None => {
            if let Some(path) = Settings::path().filter(|p| p.exists()) {
                figment = figment.merge(Yaml::file(path));
            }
        }
    }

    figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__").ignore(VERBATIM_KEYS));
    for key in VERBATIM_KEYS {
        let var = format!("{ENV_PREFIX}{}", key.to_uppercase());
        if let Some(value) = Env::var(&var) {
            figment = figment.merge(Serialized::default(key, value));
        }
    }

    Ok(figment)
}

pub fn load(settings_file: Option<&Path>) -> Result<Settings> {
    Settings::from_figment(&layered(settings_file)?)
}
