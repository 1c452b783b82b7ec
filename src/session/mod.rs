// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Web session management.
//!
//! The mPower web interface identifies a session by the `AIROS_SESSIONID`
//! cookie. The client picks a random 32-digit id, posts the credentials to
//! `/login.cgi` with that cookie, and the device binds the id to the login.
//! A successful login answers with a redirect away from the login form.
//!
//! One [`SessionManager`] owns the single session of one endpoint.

mod state;

pub use state::{KeepalivePolicy, Session, SessionState};

use std::sync::Arc;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::endpoint::{Credentials, EndpointId};
use crate::error::{AuthError, TransportError};
use crate::protocol::{LOGIN_PATH, LOGOUT_PATH, WebRequest, WebResponse, WebTransport};

const SESSION_ID_LEN: usize = 32;

/// Generates a fresh session id of random decimal digits.
fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SESSION_ID_LEN)
        .map(|_| char::from(rng.gen_range(b'0'..=b'9')))
        .collect()
}

/// Owns the web session of one endpoint.
///
/// Concurrent callers of [`ensure_session`](Self::ensure_session) share a
/// single login: the first performs it, the others wait and reuse the result.
#[derive(Debug)]
pub struct SessionManager<W> {
    endpoint: EndpointId,
    transport: Arc<W>,
    credentials: Credentials,
    keepalive: KeepalivePolicy,
    session: parking_lot::Mutex<Session>,
    login_gate: tokio::sync::Mutex<()>,
}

impl<W: WebTransport> SessionManager<W> {
    /// Creates a manager with no session.
    #[must_use]
    pub fn new(endpoint: EndpointId, transport: Arc<W>, credentials: Credentials) -> Self {
        Self {
            endpoint,
            transport,
            credentials,
            keepalive: KeepalivePolicy::default(),
            session: parking_lot::Mutex::new(Session::unauthenticated()),
            login_gate: tokio::sync::Mutex::new(()),
        }
    }

    /// Replaces the keep-alive policy.
    #[must_use]
    pub fn with_keepalive(mut self, keepalive: KeepalivePolicy) -> Self {
        self.keepalive = keepalive;
        self
    }

    /// Returns a snapshot of the session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.lock().clone()
    }

    /// Returns the session state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.session.lock().state()
    }

    /// Returns the keep-alive policy.
    #[must_use]
    pub fn keepalive_policy(&self) -> &KeepalivePolicy {
        &self.keepalive
    }

    fn active(&self) -> Option<Session> {
        let session = self.session.lock();
        session.is_active().then(|| session.clone())
    }

    /// Returns an active session, logging in if needed.
    ///
    /// An active session is returned without any network traffic.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Rejected` if the device refused the credentials
    /// and `AuthError::Transport` if the login request failed.
    pub async fn ensure_session(&self) -> Result<Session, AuthError> {
        if let Some(session) = self.active() {
            return Ok(session);
        }

        let _gate = self.login_gate.lock().await;
        if let Some(session) = self.active() {
            return Ok(session);
        }

        let previous = {
            let mut session = self.session.lock();
            let previous = session.state();
            session.set_state(SessionState::Authenticating);
            previous
        };

        match self.login().await {
            Ok(token) => {
                let mut session = self.session.lock();
                session.activate(token);
                tracing::debug!(endpoint = %self.endpoint, "Session established");
                Ok(session.clone())
            }
            Err(e) => {
                let state = match &e {
                    AuthError::Rejected(_) => SessionState::Unauthenticated,
                    _ => previous,
                };
                self.session.lock().set_state(state);
                tracing::warn!(endpoint = %self.endpoint, error = %e, "Login failed");
                Err(e)
            }
        }
    }

    async fn login(&self) -> Result<String, AuthError> {
        let token = generate_session_id();
        let request = WebRequest::post_form(
            LOGIN_PATH,
            vec![
                ("username", self.credentials.username().to_string()),
                ("password", self.credentials.password().to_string()),
            ],
        );

        tracing::debug!(endpoint = %self.endpoint, user = %self.credentials.username(), "Logging in");
        let response = self.transport.send(&request, Some(&token)).await?;
        Self::login_outcome(response, token)
    }

    /// Interprets the answer to a login post.
    fn login_outcome(response: WebResponse, token: String) -> Result<String, AuthError> {
        match response.status {
            300..=399 if !response.redirects_to_login() => {
                Ok(response.session_cookie.unwrap_or(token))
            }
            300..=399 | 200..=299 | 401 | 403 => Err(AuthError::Rejected(format!(
                "login answered with HTTP {}",
                response.status
            ))),
            status => Err(AuthError::Transport(TransportError::Status { status })),
        }
    }

    /// Marks the session expired if it still holds `rejected_token`; the next
    /// [`ensure_session`](Self::ensure_session) then logs in again.
    ///
    /// A rejection that arrives after another caller already logged in again
    /// names an older token and leaves the newer session alone.
    pub fn invalidate(&self, rejected_token: &str) {
        let mut session = self.session.lock();
        if session.state() == SessionState::Active && session.token() == Some(rejected_token) {
            tracing::debug!(endpoint = %self.endpoint, "Session invalidated");
            session.set_state(SessionState::Expired);
        }
    }

    /// Records that a command just used the session.
    pub fn touch(&self) {
        self.session.lock().touch();
    }

    /// Pings the device if a command ran within the keep-alive window.
    ///
    /// Returns whether a ping was sent. Pings do not count as activity, so
    /// an idle session is eventually left to expire.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Expired` if the device rejected the session (which
    /// is then marked expired) and `AuthError::Transport` if the ping failed.
    pub async fn keepalive(&self) -> Result<bool, AuthError> {
        let Some(session) = self.active() else {
            return Ok(false);
        };
        if !session.used_within(self.keepalive.window()) {
            return Ok(false);
        }

        tracing::debug!(endpoint = %self.endpoint, "Sending keep-alive");
        let request = WebRequest::get(self.keepalive.path());
        let response = self.transport.send(&request, session.token()).await?;
        match response.into_body() {
            Ok(_) => Ok(true),
            Err(e) if e.is_auth_rejection() => {
                if let Some(token) = session.token() {
                    self.invalidate(token);
                }
                Err(AuthError::Expired)
            }
            Err(e) => Err(AuthError::Transport(e)),
        }
    }

    /// Ends the session on the device, best effort, and forgets it locally.
    pub async fn logout(&self) {
        let _gate = self.login_gate.lock().await;
        let token = self.session.lock().token().map(ToString::to_string);
        if let Some(token) = token {
            let request = WebRequest::get(LOGOUT_PATH);
            if let Err(e) = self.transport.send(&request, Some(&token)).await {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "Logout request failed");
            }
        }
        *self.session.lock() = Session::unauthenticated();
    }
}

impl<W: WebTransport + 'static> SessionManager<W> {
    /// Spawns a task calling [`keepalive`](Self::keepalive) every policy
    /// interval until `cancel` fires.
    pub fn spawn_keepalive(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.keepalive.interval());
            interval.tick().await;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = manager.keepalive().await {
                            tracing::warn!(endpoint = %manager.endpoint, error = %e, "Keep-alive failed");
                        }
                    }
                }
            }
        })
    }
}
