//! In-memory `Controller` that replays queued replies.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Result};
use reqwest::StatusCode;
use serde::Serialize;

use crate::client::{Controller, Reply};
use crate::error::BootstrapError;

enum Step {
    Reply(Reply),
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: &'static str,
    pub path: String,
    pub body: Option<serde_json::Value>,
    pub timeout: Option<Duration>,
}

#[derive(Default)]
pub struct ScriptedController {
    steps: Mutex<VecDeque<Step>>,
    requests: Mutex<Vec<Request>>,
    failing_logins: u32,
    login_attempts: u32,
    logins: u32,
}

impl ScriptedController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `n` login attempts.
    pub fn failing_logins(mut self, n: u32) -> Self {
        self.failing_logins = n;
        self
    }

    pub fn reply(self, status: u16, body: &str) -> Self {
        let status = StatusCode::from_u16(status).expect("valid status code");
        self.steps
            .lock()
            .unwrap()
            .push_back(Step::Reply(Reply::new(status, body)));
        self
    }

    pub fn json(self, status: u16, body: serde_json::Value) -> Self {
        self.reply(status, &body.to_string())
    }

    pub fn unreachable(self) -> Self {
        self.steps.lock().unwrap().push_back(Step::Unreachable);
        self
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn remaining(&self) -> usize {
        self.steps.lock().unwrap().len()
    }

    pub fn login_attempts(&self) -> u32 {
        self.login_attempts
    }

    /// Successful logins only.
    pub fn logins(&self) -> u32 {
        self.logins
    }

    fn next(&self, request: Request) -> Result<Reply> {
        let path = request.path.clone();
        self.requests.lock().unwrap().push(request);
        match self.steps.lock().unwrap().pop_front() {
            Some(Step::Reply(reply)) => Ok(reply),
            Some(Step::Unreachable) => Err(anyhow!("connection refused")),
            None => panic!("unscripted request to {}", path),
        }
    }
}

impl Controller for ScriptedController {
    async fn get(&self, path: &str, timeout: Option<Duration>) -> Result<Reply> {
        self.next(Request {
            method: "GET",
            path: path.to_string(),
            body: None,
            timeout,
        })
    }

    async fn post<B: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
        timeout: Duration,
    ) -> Result<Reply> {
        self.next(Request {
            method: "POST",
            path: path.to_string(),
            body: Some(serde_json::to_value(body)?),
            timeout: Some(timeout),
        })
    }

    async fn login(&mut self) -> Result<(), BootstrapError> {
        self.login_attempts += 1;
        if self.failing_logins > 0 {
            self.failing_logins -= 1;
            return Err(BootstrapError::authentication("login failed: 503 : starting up"));
        }
        self.logins += 1;
        Ok(())
    }
}
