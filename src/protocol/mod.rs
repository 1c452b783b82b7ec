// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Transport adapters for mPower devices.
//!
//! Two transports reach the device:
//!
//! - [`HttpTransport`]: the cgi web interface, guarded by a session cookie
//! - [`SshTransport`]: a shell on the device's Dropbear server
//!
//! Both sit behind small traits ([`WebTransport`], [`ShellTransport`]) so the
//! session manager and dispatcher can be driven by scripted fakes in tests.
//! Adapters only move bytes; they never retry and never interpret payloads.

#[cfg(test)]
pub(crate) mod fake;
mod http;
mod ssh;
mod tls;

pub use http::HttpTransport;
pub use ssh::SshTransport;

use std::future::Future;

use crate::error::TransportError;

/// Name of the session cookie set by the web interface.
pub const SESSION_COOKIE: &str = "AIROS_SESSIONID";

/// Path of the login form.
pub const LOGIN_PATH: &str = "/login.cgi";

/// Path that ends a web session.
pub const LOGOUT_PATH: &str = "/logout.cgi";

/// HTTP method of a [`WebRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebMethod {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
}

/// A request to the web interface, relative to the endpoint's base URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebRequest {
    /// HTTP method.
    pub method: WebMethod,
    /// Absolute path, starting with `/`.
    pub path: String,
    /// Form fields sent as `application/x-www-form-urlencoded`.
    pub form: Vec<(&'static str, String)>,
}

impl WebRequest {
    /// Creates a `GET` request.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: WebMethod::Get,
            path: path.into(),
            form: Vec::new(),
        }
    }

    /// Creates a `POST` request with a form body.
    #[must_use]
    pub fn post_form(path: impl Into<String>, form: Vec<(&'static str, String)>) -> Self {
        Self {
            method: WebMethod::Post,
            path: path.into(),
            form,
        }
    }

    /// Creates a `PUT` request with a form body.
    #[must_use]
    pub fn put_form(path: impl Into<String>, form: Vec<(&'static str, String)>) -> Self {
        Self {
            method: WebMethod::Put,
            path: path.into(),
            form,
        }
    }
}

/// Raw answer of the web interface. Redirects are never followed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebResponse {
    /// HTTP status code.
    pub status: u16,
    /// `Location` header of a redirect.
    pub location: Option<String>,
    /// Value of a session cookie set by this response.
    pub session_cookie: Option<String>,
    /// Response body.
    pub body: Vec<u8>,
}

impl WebResponse {
    /// Returns `true` for a redirect back to the login form.
    #[must_use]
    pub fn redirects_to_login(&self) -> bool {
        (300..400).contains(&self.status)
            && self
                .location
                .as_deref()
                .is_some_and(|location| location.contains(LOGIN_PATH))
    }

    /// Returns the body of a successful data response.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::AuthRejected` for 401, 403 or a redirect to
    /// the login form, and `TransportError::Status` for any other non-2xx
    /// status.
    pub fn into_body(self) -> Result<Vec<u8>, TransportError> {
        match self.status {
            200..=299 => Ok(self.body),
            401 | 403 => Err(TransportError::AuthRejected(self.status)),
            _ if self.redirects_to_login() => Err(TransportError::AuthRejected(self.status)),
            status => Err(TransportError::Status { status }),
        }
    }
}

/// Sends requests to the web interface.
pub trait WebTransport: Send + Sync {
    /// Sends `request`, attaching `session` as the session cookie when given.
    ///
    /// # Errors
    ///
    /// Returns `TransportError` if the request cannot be sent or times out.
    /// Non-2xx answers are returned as a [`WebResponse`], not as errors.
    fn send(
        &self,
        request: &WebRequest,
        session: Option<&str>,
    ) -> impl Future<Output = Result<WebResponse, TransportError>> + Send;
}

/// Runs commands on the device shell.
pub trait ShellTransport: Send + Sync {
    /// Runs `command` and returns its standard output.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ExitStatus` for a non-zero exit status and
    /// other `TransportError` variants for connection problems.
    fn run(&self, command: &str) -> impl Future<Output = Result<String, TransportError>> + Send;

    /// Closes any open connection. The next [`run`](Self::run) reconnects.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Extracts the session cookie value from a `Set-Cookie` header.
pub(crate) fn parse_session_cookie(header: &str) -> Option<String> {
    let pair = header.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    (name.trim() == SESSION_COOKIE && !value.is_empty()).then(|| value.trim().to_string())
}
