// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device endpoint configuration.
//!
//! An [`Endpoint`] describes one mPower device: where it lives, which
//! transports are enabled, how to authenticate and how far to trust its TLS
//! certificate and SSH host key. Endpoints are immutable once built.
//!
//! # Examples
//!
//! ```
//! use mpower_lib::endpoint::{Endpoint, TlsTrust};
//! use std::time::Duration;
//!
//! let endpoint = Endpoint::builder("192.168.1.20")
//!     .with_credentials("ubnt", "ubnt")
//!     // stock firmware serves a self-signed certificate
//!     .with_tls(TlsTrust::AcceptInvalid)
//!     .with_ssh()
//!     .with_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(endpoint.base_url().as_deref(), Some("https://192.168.1.20"));
//! assert!(endpoint.ssh().is_some());
//! ```

mod config;
mod id;

pub use config::{EndpointConfig, SshConfig, TlsConfig};
pub use id::EndpointId;

use std::fmt;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;

/// Username and password for both the web login and SSH.
#[derive(Clone)]
pub struct Credentials {
    username: String,
    password: SecretString,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }

    /// Returns the username.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Returns the password in clear text.
    #[must_use]
    pub fn password(&self) -> &str {
        self.password.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// URL scheme of the web interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// Plain HTTP.
    Http,
    /// HTTP over TLS.
    Https,
}

impl Scheme {
    /// Returns the scheme name used in URLs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    /// Returns the well-known port for this scheme.
    #[must_use]
    pub const fn default_port(&self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }
}

/// How the HTTPS certificate of the device is verified.
///
/// mPower units ship with a self-signed certificate, so [`TlsTrust::Strict`]
/// only works once a trusted certificate has been installed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TlsTrust {
    /// Verify against the bundled web PKI roots.
    #[default]
    Strict,
    /// Accept any certificate.
    AcceptInvalid,
    /// Accept only a leaf certificate whose SHA-256 digest matches.
    Pinned([u8; 32]),
}

impl TlsTrust {
    /// Parses a pinned SHA-256 fingerprint given as hex.
    ///
    /// Colons and whitespace between byte pairs are ignored, so both
    /// `ab:cd:...` and `abcd...` forms are accepted.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidFingerprint` unless the input is exactly
    /// 32 bytes of hex.
    pub fn pinned_hex(fingerprint: &str) -> Result<Self, ConfigError> {
        let cleaned: String = fingerprint
            .chars()
            .filter(|c| !c.is_whitespace() && *c != ':')
            .collect();
        let bytes = hex::decode(&cleaned)
            .map_err(|_| ConfigError::InvalidFingerprint(fingerprint.to_string()))?;
        let digest: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ConfigError::InvalidFingerprint(fingerprint.to_string()))?;
        Ok(Self::Pinned(digest))
    }
}

/// How the SSH host key of the device is verified.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Accept whatever key the device presents.
    #[default]
    AcceptAny,
    /// Accept only the key with this SHA-256 fingerprint (base64, as printed
    /// by `ssh-keygen -l`, with or without the `SHA256:` prefix).
    Fingerprint(String),
}

impl HostKeyPolicy {
    /// Returns `true` if a key with `fingerprint` is acceptable.
    #[must_use]
    pub fn accepts(&self, fingerprint: &str) -> bool {
        match self {
            Self::AcceptAny => true,
            Self::Fingerprint(expected) => {
                let expected = expected.strip_prefix("SHA256:").unwrap_or(expected);
                let actual = fingerprint.strip_prefix("SHA256:").unwrap_or(fingerprint);
                expected == actual
            }
        }
    }
}

/// Web interface settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebSettings {
    /// URL scheme.
    pub scheme: Scheme,
    /// TCP port.
    pub port: u16,
    /// Certificate trust policy, used with [`Scheme::Https`].
    pub tls: TlsTrust,
}

/// SSH settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshSettings {
    /// TCP port.
    pub port: u16,
    /// Host key verification policy.
    pub host_key: HostKeyPolicy,
    /// Offer the legacy key exchange and cipher required by stock firmware.
    pub legacy_algorithms: bool,
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: Endpoint::DEFAULT_SSH_PORT,
            host_key: HostKeyPolicy::default(),
            legacy_algorithms: true,
        }
    }
}

/// A configured mPower device.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: EndpointId,
    host: String,
    credentials: Credentials,
    web: Option<WebSettings>,
    ssh: Option<SshSettings>,
    timeout: Duration,
}

impl Endpoint {
    /// Default SSH port.
    pub const DEFAULT_SSH_PORT: u16 = 22;
    /// Default per-call timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Starts building an endpoint for `host`.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> EndpointBuilder {
        EndpointBuilder::new(host)
    }

    /// Returns the endpoint identifier.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Returns the host name or address.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Returns the credentials.
    #[must_use]
    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }

    /// Returns the web settings, if the web interface is enabled.
    #[must_use]
    pub fn web(&self) -> Option<&WebSettings> {
        self.web.as_ref()
    }

    /// Returns the SSH settings, if SSH is enabled.
    #[must_use]
    pub fn ssh(&self) -> Option<&SshSettings> {
        self.ssh.as_ref()
    }

    /// Returns the per-call timeout.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Builds the base URL of the web interface.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        let web = self.web.as_ref()?;
        let port_suffix = if web.port == web.scheme.default_port() {
            String::new()
        } else {
            format!(":{}", web.port)
        };
        Some(format!("{}://{}{port_suffix}", web.scheme.as_str(), self.host))
    }

    /// Returns a short description of the enabled transports.
    #[must_use]
    pub fn transports(&self) -> &'static str {
        match (self.web.is_some(), self.ssh.is_some()) {
            (true, true) => "HTTP+SSH",
            (true, false) => "HTTP",
            (false, true) => "SSH",
            (false, false) => "none",
        }
    }
}

/// Builder for [`Endpoint`].
#[derive(Debug, Clone)]
pub struct EndpointBuilder {
    id: Option<EndpointId>,
    host: String,
    credentials: Option<Credentials>,
    web: Option<WebSettings>,
    ssh: Option<SshSettings>,
    timeout: Duration,
}

impl EndpointBuilder {
    fn new(host: impl Into<String>) -> Self {
        Self {
            id: None,
            host: host.into(),
            credentials: None,
            web: Some(WebSettings {
                scheme: Scheme::Https,
                port: Scheme::Https.default_port(),
                tls: TlsTrust::default(),
            }),
            ssh: None,
            timeout: Endpoint::DEFAULT_TIMEOUT,
        }
    }

    /// Uses a fixed identifier instead of a random one.
    #[must_use]
    pub fn with_id(mut self, id: EndpointId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets the login credentials.
    #[must_use]
    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Switches the web interface to HTTPS, the default.
    ///
    /// If the port is still the HTTP default it becomes 443.
    #[must_use]
    pub fn with_https(self) -> Self {
        self.with_scheme(Scheme::Https)
    }

    /// Switches the web interface to plain HTTP. Credentials then cross the
    /// network unencrypted.
    ///
    /// If the port is still the HTTPS default it becomes 80.
    #[must_use]
    pub fn with_http(self) -> Self {
        self.with_scheme(Scheme::Http)
    }

    fn with_scheme(mut self, scheme: Scheme) -> Self {
        let web = self.web.get_or_insert_with(|| WebSettings {
            scheme,
            port: scheme.default_port(),
            tls: TlsTrust::default(),
        });
        if web.scheme != scheme && web.port == web.scheme.default_port() {
            web.port = scheme.default_port();
        }
        web.scheme = scheme;
        self
    }

    /// Sets the web interface port.
    #[must_use]
    pub fn with_web_port(mut self, port: u16) -> Self {
        if let Some(web) = self.web.as_mut() {
            web.port = port;
        }
        self
    }

    /// Sets the TLS trust policy.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsTrust) -> Self {
        if let Some(web) = self.web.as_mut() {
            web.tls = tls;
        }
        self
    }

    /// Disables the web interface, leaving SSH as the only transport.
    #[must_use]
    pub fn without_web(mut self) -> Self {
        self.web = None;
        self
    }

    /// Enables SSH with default settings.
    #[must_use]
    pub fn with_ssh(mut self) -> Self {
        self.ssh.get_or_insert_with(SshSettings::default);
        self
    }

    /// Enables SSH with explicit settings.
    #[must_use]
    pub fn with_ssh_settings(mut self, settings: SshSettings) -> Self {
        self.ssh = Some(settings);
        self
    }

    /// Sets the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builds the endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingHost` for an empty host,
    /// `ConfigError::MissingCredentials` if no credentials were set and
    /// `ConfigError::NoTransport` if both transports are disabled.
    pub fn build(self) -> Result<Endpoint, ConfigError> {
        let host = self.host.trim().to_string();
        if host.is_empty() {
            return Err(ConfigError::MissingHost);
        }
        let credentials = self.credentials.ok_or(ConfigError::MissingCredentials)?;
        if self.web.is_none() && self.ssh.is_none() {
            return Err(ConfigError::NoTransport);
        }

        Ok(Endpoint {
            id: self.id.unwrap_or_default(),
            host,
            credentials,
            web: self.web,
            ssh: self.ssh,
            timeout: self.timeout,
        })
    }
}
