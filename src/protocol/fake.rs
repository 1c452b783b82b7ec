// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Scripted transports for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use super::{LOGIN_PATH, ShellTransport, WebRequest, WebResponse, WebTransport};
use crate::error::TransportError;

/// One scripted answer.
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Respond(WebResponse),
    Timeout,
}

impl Step {
    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self::Respond(WebResponse {
            status,
            location: None,
            session_cookie: None,
            body: body.as_bytes().to_vec(),
        })
    }

    pub(crate) fn redirect(location: &str) -> Self {
        Self::Respond(WebResponse {
            status: 302,
            location: Some(location.to_string()),
            session_cookie: None,
            body: Vec::new(),
        })
    }
}

/// Answers requests per path from a queue; the last step of a queue repeats.
#[derive(Debug, Default)]
pub(crate) struct ScriptedWeb {
    script: Mutex<HashMap<String, VecDeque<Step>>>,
    requests: Mutex<Vec<(WebRequest, Option<String>)>>,
}

impl ScriptedWeb {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, path: &str, steps: impl IntoIterator<Item = Step>) -> Self {
        self.script
            .lock()
            .entry(path.to_string())
            .or_default()
            .extend(steps);
        self
    }

    pub(crate) fn count(&self, path: &str) -> usize {
        self.requests
            .lock()
            .iter()
            .filter(|(request, _)| request.path == path)
            .count()
    }

    pub(crate) fn requests(&self) -> Vec<(WebRequest, Option<String>)> {
        self.requests.lock().clone()
    }
}

impl WebTransport for ScriptedWeb {
    async fn send(
        &self,
        request: &WebRequest,
        session: Option<&str>,
    ) -> Result<WebResponse, TransportError> {
        self.requests
            .lock()
            .push((request.clone(), session.map(ToString::to_string)));
        let step = {
            let mut script = self.script.lock();
            let queue = script.get_mut(&request.path);
            match queue {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };
        match step {
            Some(Step::Respond(response)) => Ok(response),
            Some(Step::Timeout) => Err(TransportError::Timeout(Duration::from_secs(1))),
            None => Ok(WebResponse {
                status: 404,
                location: None,
                session_cookie: None,
                body: Vec::new(),
            }),
        }
    }
}

fn ok_json(body: &str) -> WebResponse {
    WebResponse {
        status: 200,
        location: None,
        session_cookie: None,
        body: body.as_bytes().to_vec(),
    }
}

fn login_redirect() -> WebResponse {
    WebResponse {
        status: 302,
        location: Some("/power".to_string()),
        session_cookie: None,
        body: Vec::new(),
    }
}

/// A device that honours only the token of its most recent login.
///
/// Logins answer at once; every other request yields before the token is
/// checked, so concurrent commands see each other's logins.
#[derive(Debug)]
pub(crate) struct SingleSessionWeb {
    body: String,
    current: Mutex<Option<String>>,
    logins: AtomicUsize,
}

impl SingleSessionWeb {
    pub(crate) fn new(body: &str) -> Self {
        Self {
            body: body.to_string(),
            current: Mutex::new(None),
            logins: AtomicUsize::new(0),
        }
    }

    /// Drops every session, as a device reboot does.
    pub(crate) fn forget_sessions(&self) {
        *self.current.lock() = None;
    }

    pub(crate) fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }
}

impl WebTransport for SingleSessionWeb {
    async fn send(
        &self,
        request: &WebRequest,
        session: Option<&str>,
    ) -> Result<WebResponse, TransportError> {
        if request.path == LOGIN_PATH {
            self.logins.fetch_add(1, Ordering::SeqCst);
            *self.current.lock() = session.map(ToString::to_string);
            return Ok(login_redirect());
        }

        tokio::task::yield_now().await;
        let accepted = session.is_some() && self.current.lock().as_deref() == session;
        if accepted {
            Ok(ok_json(&self.body))
        } else {
            Ok(WebResponse {
                status: 401,
                location: None,
                session_cookie: None,
                body: Vec::new(),
            })
        }
    }
}

/// Counts requests in flight across any number of transports.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl InFlight {
    fn enter(&self) {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }

    pub(crate) fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

/// Accepts any login and answers every other request with `body`; each
/// request takes `delay` and is counted in the shared [`InFlight`] gauge.
#[derive(Debug)]
pub(crate) struct SlowWeb {
    body: String,
    delay: Duration,
    gauge: Arc<InFlight>,
}

impl SlowWeb {
    pub(crate) fn new(body: &str, delay: Duration, gauge: Arc<InFlight>) -> Self {
        Self {
            body: body.to_string(),
            delay,
            gauge,
        }
    }
}

impl WebTransport for SlowWeb {
    async fn send(
        &self,
        request: &WebRequest,
        _session: Option<&str>,
    ) -> Result<WebResponse, TransportError> {
        self.gauge.enter();
        tokio::time::sleep(self.delay).await;
        self.gauge.leave();

        if request.path == LOGIN_PATH {
            Ok(login_redirect())
        } else {
            Ok(ok_json(&self.body))
        }
    }
}

/// Answers shell commands by prefix; unknown commands exit with status 127.
#[derive(Debug, Default)]
pub(crate) struct ScriptedShell {
    outputs: Mutex<Vec<(String, String)>>,
    commands: Mutex<Vec<String>>,
}

impl ScriptedShell {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(self, prefix: &str, output: &str) -> Self {
        self.outputs
            .lock()
            .push((prefix.to_string(), output.to_string()));
        self
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.commands.lock().clone()
    }
}

impl ShellTransport for ScriptedShell {
    async fn run(&self, command: &str) -> Result<String, TransportError> {
        self.commands.lock().push(command.to_string());
        self.outputs
            .lock()
            .iter()
            .find(|(prefix, _)| command.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .ok_or_else(|| TransportError::ExitStatus {
                command: command.to_string(),
                status: 127,
            })
    }

    async fn close(&self) {}
}
