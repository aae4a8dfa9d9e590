//! Session authentication and poll-driven re-authentication.

use serde::Serialize;
use tracing::{info, warn};

use crate::client::{Controller, Session};
use crate::config::{ReauthPolicy, Settings};
use crate::connection::ConnectionContext;
use crate::error::{BootstrapError, Result};

/// Body of `POST /login`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest<'a> {
    domain: &'a str,
    user_name: &'a str,
    user_passwd: &'a str,
}

impl<'a> LoginRequest<'a> {
    pub fn from_context(ctx: &'a ConnectionContext) -> Self {
        Self {
            domain: ctx.domain(),
            user_name: ctx.username(),
            user_passwd: ctx.password(),
        }
    }
}

/// Log in to the controller at `ctx` and return the authenticated session.
pub async fn authenticate(ctx: &ConnectionContext, settings: &Settings) -> Result<Session> {
    let mut session = Session::new(ctx.clone(), &ctx.base_url(), settings)?;
    session.login().await?;
    info!(
        controller = %session.base_url(),
        protocol = %ctx.protocol(),
        domain = %ctx.domain(),
        "authenticated"
    );
    Ok(session)
}

/// Replace an expired session in place, retrying per `policy`.
///
/// The controller restarts its API several times while installing, so a
/// refused login here is expected for a while.
pub async fn reauthenticate<C: Controller>(controller: &mut C, policy: &ReauthPolicy) -> Result<()> {
    info!("session expired, re-authenticating");
    for attempt in 1..=policy.attempts {
        tokio::time::sleep(policy.delay()).await;
        match controller.login().await {
            Ok(()) => {
                info!(attempt, "re-authentication successful");
                return Ok(());
            }
            Err(e) => {
                warn!(attempt, max_attempts = policy.attempts, error = %e, "re-authentication failed");
            }
        }
    }
    Err(BootstrapError::authentication(format!(
        "exceeded {} login attempts while re-authenticating",
        policy.attempts
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedController;

    fn policy(attempts: u32) -> ReauthPolicy {
        ReauthPolicy {
            attempts,
            delay_secs: 0,
        }
    }

    #[test]
    fn login_request_uses_controller_field_names() {
        let settings = Settings {
            ip4: Some("10.0.0.1".into()),
            domain: "corp".into(),
            username: Some("admin".into()),
            password: Some("hunter2".into()),
            ..Settings::default()
        };
        let ctx = ConnectionContext::from_settings(&settings).unwrap();
        let body = serde_json::to_value(LoginRequest::from_context(&ctx)).unwrap();
        assert_eq!(
            body,
            serde_json::json!({"domain": "corp", "userName": "admin", "userPasswd": "hunter2"})
        );
    }

    #[tokio::test]
    async fn reauthenticate_retries_until_login_succeeds() {
        let mut controller = ScriptedController::new().failing_logins(2);
        reauthenticate(&mut controller, &policy(5)).await.unwrap();
        assert_eq!(controller.login_attempts(), 3);
        assert_eq!(controller.logins(), 1);
    }

    #[tokio::test]
    async fn reauthenticate_gives_up_after_policy_attempts() {
        let mut controller = ScriptedController::new().failing_logins(10);
        let err = reauthenticate(&mut controller, &policy(3)).await.unwrap_err();
        assert!(matches!(err, BootstrapError::Authentication(_)));
        assert_eq!(controller.login_attempts(), 3);
        assert_eq!(controller.logins(), 0);
    }
}
