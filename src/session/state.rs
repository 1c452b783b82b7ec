// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Session state and keep-alive settings.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::codec::json::SENSORS_PATH;

/// Lifecycle of a web session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No login has been attempted, or the last one failed.
    Unauthenticated,
    /// A login request is in flight.
    Authenticating,
    /// The device accepted the token.
    Active,
    /// The device stopped accepting the token.
    Expired,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unauthenticated => "unauthenticated",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Expired => "expired",
        };
        f.write_str(name)
    }
}

/// Snapshot of an endpoint's web session.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    token: Option<String>,
    state: SessionState,
    created_at: Option<DateTime<Utc>>,
    last_used: Option<DateTime<Utc>>,
}

impl Session {
    pub(crate) fn unauthenticated() -> Self {
        Self {
            token: None,
            state: SessionState::Unauthenticated,
            created_at: None,
            last_used: None,
        }
    }

    pub(crate) fn activate(&mut self, token: String) {
        let now = Utc::now();
        self.token = Some(token);
        self.state = SessionState::Active;
        self.created_at = Some(now);
        self.last_used = Some(now);
    }

    pub(crate) fn set_state(&mut self, state: SessionState) {
        self.state = state;
    }

    pub(crate) fn touch(&mut self) {
        self.last_used = Some(Utc::now());
    }

    /// Returns the session token, if one was issued.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// Returns the lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns `true` if the session can be used without logging in.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active && self.token.is_some()
    }

    /// Returns when the token was issued.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns when a command last used the session.
    #[must_use]
    pub fn last_used(&self) -> Option<DateTime<Utc>> {
        self.last_used
    }

    /// Returns `true` if a command used the session within `window`.
    #[must_use]
    pub fn used_within(&self, window: Duration) -> bool {
        let Some(last_used) = self.last_used else {
            return false;
        };
        let Ok(window) = chrono::Duration::from_std(window) else {
            return true;
        };
        Utc::now() - last_used <= window
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("state", &self.state)
            .field("created_at", &self.created_at)
            .field("last_used", &self.last_used)
            .finish()
    }
}

/// When and how an idle session is kept alive.
///
/// # Examples
///
/// ```
/// use mpower_lib::session::KeepalivePolicy;
/// use std::time::Duration;
///
/// let policy = KeepalivePolicy::default()
///     .with_interval(Duration::from_secs(60))
///     .with_window(Duration::from_secs(600));
/// assert_eq!(policy.path(), "/mfi/sensors.cgi");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeepalivePolicy {
    interval: Duration,
    window: Duration,
    path: String,
}

const MIN_INTERVAL: Duration = Duration::from_millis(1);

impl KeepalivePolicy {
    /// Default ping interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(120);
    /// Default activity window.
    pub const DEFAULT_WINDOW: Duration = Duration::from_secs(900);

    /// Sets how often the background task pings. Clamped to at least one
    /// millisecond.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval.max(MIN_INTERVAL);
        self
    }

    /// Sets how recently a command must have run for a ping to be sent.
    #[must_use]
    pub fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the path requested by a ping.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Returns the ping interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns the activity window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Returns the ping path.
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Default for KeepalivePolicy {
    fn default() -> Self {
        Self {
            interval: Self::DEFAULT_INTERVAL,
            window: Self::DEFAULT_WINDOW,
            path: SENSORS_PATH.to_string(),
        }
    }
}
