//! HTTP session against the controller REST API.

use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::auth::LoginRequest;
use crate::config::{Settings, Timeouts};
use crate::connection::ConnectionContext;
use crate::error::BootstrapError;

pub const LOGIN: &str = "/login";
pub const VERIFY_NTP: &str = "/v2/bootstrap/verifyntp";
pub const BOOTSTRAP_CLUSTER: &str = "/v2/bootstrap/cluster";
pub const INSTALL_STATUS: &str = "/clusterstatus/install";
pub const SERVICE_PACKAGES: &str = "/api/v1/release/servicepackages";

/// Status and raw body of a controller response. Callers decide what each
/// status means; nothing here treats non-2xx as an error.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
}

impl Reply {
    pub fn new(status: StatusCode, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }

    async fn read(resp: reqwest::Response) -> Result<Self> {
        let status = resp.status();
        let body = resp.text().await.context("reading response body")?;
        Ok(Self::new(status, body))
    }
}

/// The calls the bootstrap workflow makes. `Err` from `get`/`post` means the
/// request never produced a response (refused, reset, timed out).
#[allow(async_fn_in_trait)]
pub trait Controller {
    async fn get(&self, path: &str, timeout: Option<Duration>) -> Result<Reply>;

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Reply>;

    /// Exchange credentials for a fresh session, replacing the current one.
    async fn login(&mut self) -> Result<(), BootstrapError>;
}

/// Cookie-carrying session bound to one `ConnectionContext`.
pub struct Session {
    ctx: ConnectionContext,
    base_url: String,
    verify_tls: bool,
    timeouts: Timeouts,
    http: Client,
}

impl Session {
    /// Unauthenticated session; call `login` before anything else.
    pub fn new(ctx: ConnectionContext, base_url: &str, settings: &Settings) -> Result<Self> {
        Ok(Self {
            ctx,
            base_url: base_url.trim_end_matches('/').to_string(),
            verify_tls: settings.verify_tls,
            timeouts: settings.timeouts.clone(),
            http: build_client(settings.verify_tls)?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

impl Controller for Session {
    async fn get(&self, path: &str, timeout: Option<Duration>) -> Result<Reply> {
        let url = self.url(path);
        let mut req = self.http.get(&url);
        if let Some(timeout) = timeout {
            req = req.timeout(timeout);
        }
        let resp = req.send().await.with_context(|| format!("GET {}", url))?;
        Reply::read(resp)
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Reply> {
        let url = self.url(path);
        let resp = self
            .http
            .post(&url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        Reply::read(resp)
            .await
            .with_context(|| format!("parsing response from {}", url))
    }

    async fn login(&mut self) -> Result<(), BootstrapError> {
        // A fresh client means a fresh cookie jar; stale cookies never leak
        // into the new session.
        let http = build_client(self.verify_tls)?;
        let url = self.url(LOGIN);
        let resp = http
            .post(&url)
            .json(&LoginRequest::from_context(&self.ctx))
            .timeout(self.timeouts.login())
            .send()
            .await
            .with_context(|| format!("POST {}", url))?;
        let reply = Reply::read(resp).await?;

        if reply.status != StatusCode::OK {
            return Err(BootstrapError::authentication(format!(
                "login to {} failed: {} : {}",
                self.base_url,
                reply.status.as_u16(),
                reply.body
            )));
        }

        self.http = http;
        Ok(())
    }
}

fn build_client(verify_tls: bool) -> Result<Client> {
    Client::builder()
        .cookie_store(true)
        .danger_accept_invalid_certs(!verify_tls)
        .build()
        .context("building HTTP client")
}
