// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the mPower client library.
//!
//! Failures are split by concern: value validation, endpoint configuration,
//! transport I/O, session authentication and payload decoding. The
//! [`TransportError`] classification helpers drive the dispatcher's retry
//! decisions.

use thiserror::Error;

/// The main error type for this library.
#[derive(Debug, Error)]
pub enum Error {
    /// Error occurred during value validation.
    #[error("value error: {0}")]
    Value(#[from] ValueError),

    /// The endpoint configuration is unusable.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// Error occurred while talking to the device.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The device refused the session or login could not complete.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    /// The device answered with a payload that could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// A command failed after the retry policy gave up.
    #[error("command failed: {0}")]
    Command(String),

    /// The endpoint has no transport able to run the command.
    #[error("{command} is not supported over {transport}")]
    CapabilityUnsupported {
        /// Name of the rejected command.
        command: &'static str,
        /// Transport(s) configured on the endpoint.
        transport: &'static str,
    },
}

/// Errors related to value validation and constraints.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// A numeric value is outside the allowed range.
    #[error("value {actual} is out of range [{min}, {max}]")]
    OutOfRange {
        /// Minimum allowed value.
        min: u16,
        /// Maximum allowed value.
        max: u16,
        /// The actual value that was provided.
        actual: u16,
    },

    /// An invalid relay state string was provided.
    #[error("invalid relay state: {0}")]
    InvalidRelayState(String),

    /// An unknown LED mode was provided.
    #[error("invalid LED state: {0}")]
    InvalidLedState(String),
}

/// Errors raised while building an endpoint.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The host is empty.
    #[error("host is required")]
    MissingHost,

    /// No credentials were configured.
    #[error("credentials are required")]
    MissingCredentials,

    /// Neither web nor SSH access is enabled.
    #[error("endpoint has no transport enabled")]
    NoTransport,

    /// A certificate fingerprint is not 32 bytes of hex.
    #[error("invalid certificate fingerprint: {0}")]
    InvalidFingerprint(String),

    /// An unknown URL scheme was configured.
    #[error("invalid scheme: {0}")]
    InvalidScheme(String),
}

/// Errors raised by the HTTP and SSH transports.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The HTTP client could not be built or the request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The SSH session failed.
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// The operation did not complete within the configured timeout.
    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The device rejected the session (401, 403 or a redirect to the login page).
    #[error("device rejected the session (HTTP {0})")]
    AuthRejected(u16),

    /// The device answered with an unexpected HTTP status.
    #[error("unexpected HTTP status {status}")]
    Status {
        /// The status code returned by the device.
        status: u16,
    },

    /// SSH credentials were refused.
    #[error("SSH authentication rejected for user {0}")]
    SshAuthRejected(String),

    /// The SSH host key did not match the pinned fingerprint.
    #[error("SSH host key rejected: {0}")]
    HostKeyRejected(String),

    /// A remote shell command exited with a non-zero status.
    #[error("command `{command}` exited with status {status}")]
    ExitStatus {
        /// The command that was run.
        command: String,
        /// The remote exit status.
        status: u32,
    },

    /// A remote shell command was killed by a signal.
    #[error("command `{command}` was killed by signal {signal}")]
    ExitSignal {
        /// The command that was run.
        command: String,
        /// The signal name reported by the server.
        signal: String,
    },

    /// The channel closed before the server reported how the command ended,
    /// so its output may be truncated.
    #[error("command `{command}` ended without an exit status")]
    NoExitStatus {
        /// The command that was run.
        command: String,
    },

    /// The remote output was not valid UTF-8.
    #[error("remote output is not valid UTF-8")]
    InvalidOutput,

    /// The TLS configuration could not be built.
    #[error("TLS setup failed: {0}")]
    Tls(String),

    /// The transport is not configured on this endpoint.
    #[error("{0} transport is not configured")]
    NotConfigured(&'static str),
}

impl TransportError {
    /// Returns `true` if retrying the same request may succeed.
    ///
    /// Timeouts, connection failures, channels closed before an exit status
    /// and unrecognized status codes are transient. Credential and host-key
    /// rejections, failed or killed commands and configuration problems are
    /// not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => !e.is_builder() && !e.is_decode(),
            Self::Ssh(_) | Self::Timeout(_) | Self::Status { .. } | Self::NoExitStatus { .. } => true,
            Self::AuthRejected(_)
            | Self::SshAuthRejected(_)
            | Self::HostKeyRejected(_)
            | Self::ExitStatus { .. }
            | Self::ExitSignal { .. }
            | Self::InvalidOutput
            | Self::Tls(_)
            | Self::NotConfigured(_) => false,
        }
    }

    /// Returns `true` if the device rejected the web session.
    #[must_use]
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::AuthRejected(_))
    }

    /// Returns the HTTP status code attached to this error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::AuthRejected(code) | Self::Status { status: code } => Some(*code),
            Self::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Errors raised while establishing a web session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The device refused the configured credentials.
    #[error("credentials rejected: {0}")]
    Rejected(String),

    /// The device no longer accepts the session token.
    #[error("session expired")]
    Expired,

    /// Login could not complete because of a transport failure.
    #[error("login failed: {0}")]
    Transport(#[from] TransportError),
}

impl AuthError {
    /// Returns `true` if the login may succeed when retried.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Rejected(_) => false,
            Self::Expired => true,
            Self::Transport(e) => e.is_transient(),
        }
    }
}

/// Errors raised while decoding device payloads.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The payload is not valid JSON.
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// A required field is absent.
    #[error("missing field: {0}")]
    MissingField(&'static str),

    /// The device reported a non-success status.
    #[error("device reported status {0:?}")]
    Status(String),

    /// A value could not be parsed.
    #[error("invalid value for {field}: {value:?}")]
    InvalidValue {
        /// The field being decoded.
        field: &'static str,
        /// The raw value that failed to parse.
        value: String,
    },

    /// The shell output had fewer sections than the command produced.
    #[error("expected {expected} output sections, got {actual}")]
    SectionCount {
        /// Number of sections expected.
        expected: usize,
        /// Number of sections found.
        actual: usize,
    },

    /// A decoded value violates its type's constraints.
    #[error("{0}")]
    Value(#[from] ValueError),
}

/// Result type alias using the library's error type.
pub type Result<T> = std::result::Result<T, Error>;
