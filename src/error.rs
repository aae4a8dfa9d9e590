//! Error types for the bootstrap workflow.
//!
//! Every variant is fatal when it reaches `main`. Transient conditions seen
//! while polling (connection errors, 404s, 401s) never become a
//! `BootstrapError`; the pollers absorb them and keep their last-known state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Settings, environment or topology document problem. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The controller rejected our credentials.
    #[error("authentication error: {0}")]
    Authentication(String),

    /// The discovered inventory could not be fetched.
    #[error("discovery error: {0}")]
    Discovery(String),

    /// A declared node could not be matched to discovered hardware.
    #[error("reconciliation error: {0}")]
    Reconciliation(String),

    /// One or more NTP servers failed controller-side verification.
    #[error("NTP validation error: {0}")]
    NtpValidation(String),

    /// The bootstrap request was refused and no poller followed to
    /// overrule it.
    #[error("bootstrap submission failed: {0}")]
    Submission(String),

    /// The controller reported a failed installation.
    #[error("install failed: {0}")]
    InstallFailed(String),

    /// A poll loop ran out of attempts before converging.
    #[error("{what} did not converge after {attempts} attempts")]
    RetriesExhausted { what: &'static str, attempts: u32 },

    /// A network failure outside the polling loops.
    #[error("transport error: {0:#}")]
    Transport(#[from] anyhow::Error),
}

impl BootstrapError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn authentication(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    pub fn discovery(msg: impl Into<String>) -> Self {
        Self::Discovery(msg.into())
    }

    pub fn reconciliation(msg: impl Into<String>) -> Self {
        Self::Reconciliation(msg.into())
    }

    pub fn ntp_validation(msg: impl Into<String>) -> Self {
        Self::NtpValidation(msg.into())
    }

    pub fn submission(msg: impl Into<String>) -> Self {
        Self::Submission(msg.into())
    }

    pub fn install_failed(msg: impl Into<String>) -> Self {
        Self::InstallFailed(msg.into())
    }
}

pub type Result<T, E = BootstrapError> = std::result::Result<T, E>;
