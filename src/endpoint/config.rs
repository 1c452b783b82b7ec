// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Deserializable endpoint configuration.
//!
//! Lets applications keep their device list in a config file:
//!
//! ```
//! use mpower_lib::endpoint::{Endpoint, EndpointConfig};
//!
//! let config: EndpointConfig = serde_json::from_str(r#"{
//!     "host": "mpower-kitchen.lan",
//!     "username": "ubnt",
//!     "password": "ubnt",
//!     "scheme": "https",
//!     "tls": { "mode": "accept_invalid" },
//!     "ssh": { "port": 22 }
//! }"#).unwrap();
//!
//! let endpoint = Endpoint::try_from(config).unwrap();
//! assert_eq!(endpoint.transports(), "HTTP+SSH");
//! ```

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use super::{Endpoint, EndpointId, HostKeyPolicy, SshSettings, TlsTrust};
use crate::error::ConfigError;

/// Serialized form of an [`Endpoint`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    /// Fixed endpoint id; a random one is generated when absent.
    #[serde(default)]
    pub id: Option<EndpointId>,
    /// Host name or address.
    pub host: String,
    /// Login user.
    pub username: String,
    /// Login password.
    pub password: SecretString,
    /// `"https"` (default), `"http"` or `"none"` to disable the web interface.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    /// Web interface port; defaults to the scheme's port.
    #[serde(default)]
    pub port: Option<u16>,
    /// Certificate trust policy.
    #[serde(default)]
    pub tls: TlsConfig,
    /// SSH settings; SSH is disabled when absent.
    #[serde(default)]
    pub ssh: Option<SshConfig>,
    /// Per-call timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_scheme() -> String {
    "https".to_string()
}

/// Serialized form of [`TlsTrust`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TlsConfig {
    /// See [`TlsTrust::Strict`].
    #[default]
    Strict,
    /// See [`TlsTrust::AcceptInvalid`].
    AcceptInvalid,
    /// See [`TlsTrust::Pinned`].
    Pinned {
        /// Hex SHA-256 digest of the leaf certificate.
        sha256: String,
    },
}

/// Serialized form of [`SshSettings`].
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SshConfig {
    /// TCP port.
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    /// Pinned host key fingerprint.
    #[serde(default)]
    pub host_key_fingerprint: Option<String>,
    /// Offer legacy algorithms for stock firmware.
    #[serde(default = "default_legacy")]
    pub legacy_algorithms: bool,
}

fn default_ssh_port() -> u16 {
    Endpoint::DEFAULT_SSH_PORT
}

fn default_legacy() -> bool {
    true
}

impl TryFrom<TlsConfig> for TlsTrust {
    type Error = ConfigError;

    fn try_from(value: TlsConfig) -> Result<Self, Self::Error> {
        match value {
            TlsConfig::Strict => Ok(Self::Strict),
            TlsConfig::AcceptInvalid => Ok(Self::AcceptInvalid),
            TlsConfig::Pinned { sha256 } => Self::pinned_hex(&sha256),
        }
    }
}

impl From<SshConfig> for SshSettings {
    fn from(value: SshConfig) -> Self {
        Self {
            port: value.port,
            host_key: value
                .host_key_fingerprint
                .map_or(HostKeyPolicy::AcceptAny, HostKeyPolicy::Fingerprint),
            legacy_algorithms: value.legacy_algorithms,
        }
    }
}

impl TryFrom<EndpointConfig> for Endpoint {
    type Error = ConfigError;

    fn try_from(config: EndpointConfig) -> Result<Self, Self::Error> {
        let mut builder = Endpoint::builder(config.host)
            .with_credentials(config.username, config.password.expose_secret());

        match config.scheme.to_ascii_lowercase().as_str() {
            "http" => builder = builder.with_http(),
            "https" => {}
            "none" => builder = builder.without_web(),
            other => return Err(ConfigError::InvalidScheme(other.to_string())),
        }
        if let Some(port) = config.port {
            builder = builder.with_web_port(port);
        }
        builder = builder.with_tls(config.tls.try_into()?);
        if let Some(ssh) = config.ssh {
            builder = builder.with_ssh_settings(ssh.into());
        }
        if let Some(secs) = config.timeout_secs {
            builder = builder.with_timeout(Duration::from_secs(secs));
        }
        if let Some(id) = config.id {
            builder = builder.with_id(id);
        }

        builder.build()
    }
}
