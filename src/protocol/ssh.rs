// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! SSH transport for the mPower shell.
//!
//! Stock firmware runs an old Dropbear that only speaks
//! `diffie-hellman-group1-sha1` and CBC ciphers, so those are appended to the
//! client's preferences when [`SshSettings::legacy_algorithms`] is set.
//!
//! [`SshSettings::legacy_algorithms`]: crate::endpoint::SshSettings::legacy_algorithms

use std::borrow::Cow;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle};
use russh::{ChannelMsg, Disconnect, Preferred};
use russh_keys::key::PublicKey;
use tokio::sync::Mutex;

use super::ShellTransport;
use crate::endpoint::{Credentials, Endpoint, HostKeyPolicy};
use crate::error::TransportError;

/// Verifies the device host key against the configured policy.
struct HostKeyCheck {
    policy: HostKeyPolicy,
    rejected: Arc<parking_lot::Mutex<Option<String>>>,
}

#[async_trait]
impl client::Handler for HostKeyCheck {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        if self.policy.accepts(&fingerprint) {
            tracing::debug!(fingerprint = %fingerprint, "Accepted SSH host key");
            Ok(true)
        } else {
            tracing::warn!(fingerprint = %fingerprint, "SSH host key does not match pinned fingerprint");
            *self.rejected.lock() = Some(fingerprint);
            Ok(false)
        }
    }
}

/// Lazily connected SSH session bound to one endpoint.
///
/// The session is opened on the first [`run`](ShellTransport::run) and reused
/// until it fails, times out or is [closed](ShellTransport::close). Commands
/// on one transport run one at a time.
pub struct SshTransport {
    host: String,
    port: u16,
    credentials: Credentials,
    host_key: HostKeyPolicy,
    legacy_algorithms: bool,
    timeout: Duration,
    session: Mutex<Option<Handle<HostKeyCheck>>>,
}

impl std::fmt::Debug for SshTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.credentials.username())
            .finish_non_exhaustive()
    }
}

impl SshTransport {
    /// Creates a transport for the endpoint's SSH server. No connection is
    /// made until the first command.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::NotConfigured` if SSH is not enabled on the
    /// endpoint.
    pub fn new(endpoint: &Endpoint) -> Result<Self, TransportError> {
        let settings = endpoint.ssh().ok_or(TransportError::NotConfigured("SSH"))?;
        Ok(Self {
            host: endpoint.host().to_string(),
            port: settings.port,
            credentials: endpoint.credentials().clone(),
            host_key: settings.host_key.clone(),
            legacy_algorithms: settings.legacy_algorithms,
            timeout: endpoint.timeout(),
            session: Mutex::new(None),
        })
    }

    fn client_config(&self) -> client::Config {
        let mut preferred = Preferred::default();
        if self.legacy_algorithms {
            let mut kex = preferred.kex.to_vec();
            kex.push(russh::kex::DH_G1_SHA1);
            let mut cipher = preferred.cipher.to_vec();
            cipher.push(russh::cipher::AES_128_CBC);
            preferred.kex = Cow::Owned(kex);
            preferred.cipher = Cow::Owned(cipher);
        }
        client::Config {
            preferred,
            inactivity_timeout: Some(self.timeout * 6),
            ..Default::default()
        }
    }

    async fn connect(&self) -> Result<Handle<HostKeyCheck>, TransportError> {
        let rejected = Arc::new(parking_lot::Mutex::new(None));
        let handler = HostKeyCheck {
            policy: self.host_key.clone(),
            rejected: Arc::clone(&rejected),
        };

        tracing::debug!(host = %self.host, port = self.port, "Opening SSH session");

        let connect = client::connect(
            Arc::new(self.client_config()),
            (self.host.as_str(), self.port),
            handler,
        );
        let mut handle = match tokio::time::timeout(self.timeout, connect).await {
            Err(_) => return Err(TransportError::Timeout(self.timeout)),
            Ok(Err(russh::Error::UnknownKey)) => {
                let fingerprint = rejected.lock().take().unwrap_or_default();
                return Err(TransportError::HostKeyRejected(fingerprint));
            }
            Ok(Err(e)) => return Err(TransportError::Ssh(e)),
            Ok(Ok(handle)) => handle,
        };

        let username = self.credentials.username();
        let authenticated = tokio::time::timeout(
            self.timeout,
            handle.authenticate_password(username, self.credentials.password()),
        )
        .await
        .map_err(|_| TransportError::Timeout(self.timeout))??;

        if !authenticated {
            return Err(TransportError::SshAuthRejected(username.to_string()));
        }

        tracing::debug!(host = %self.host, "SSH session established");
        Ok(handle)
    }

    async fn exec(handle: &Handle<HostKeyCheck>, command: &str) -> Result<(Option<Exit>, Vec<u8>), TransportError> {
        let mut channel = handle.channel_open_session().await?;
        channel.exec(true, command).await?;

        let mut output = Vec::new();
        let mut exit = None;
        while let Some(message) = channel.wait().await {
            match message {
                ChannelMsg::Data { ref data } => output.extend_from_slice(data),
                ChannelMsg::ExitStatus { exit_status } => exit = Some(Exit::Status(exit_status)),
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    exit = Some(Exit::Signal(format!("{signal_name:?}")));
                }
                ChannelMsg::Close => break,
                _ => {}
            }
        }

        Ok((exit, output))
    }
}

/// How a remote command ended.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Exit {
    Status(u32),
    Signal(String),
}

/// Turns a finished command into its standard output. Only a reported exit
/// status of 0 counts as success.
fn command_output(command: &str, exit: Option<Exit>, output: Vec<u8>) -> Result<String, TransportError> {
    match exit {
        Some(Exit::Status(0)) => String::from_utf8(output).map_err(|_| TransportError::InvalidOutput),
        Some(Exit::Status(status)) => Err(TransportError::ExitStatus {
            command: command.to_string(),
            status,
        }),
        Some(Exit::Signal(signal)) => Err(TransportError::ExitSignal {
            command: command.to_string(),
            signal,
        }),
        None => Err(TransportError::NoExitStatus {
            command: command.to_string(),
        }),
    }
}

impl ShellTransport for SshTransport {
    async fn run(&self, command: &str) -> Result<String, TransportError> {
        let mut session = self.session.lock().await;
        let handle = match session.take() {
            Some(handle) if !handle.is_closed() => handle,
            _ => self.connect().await?,
        };

        tracing::debug!(host = %self.host, command = %command, "Running SSH command");

        let (exit, output) =
            match tokio::time::timeout(self.timeout, Self::exec(&handle, command)).await {
                Err(_) => return Err(TransportError::Timeout(self.timeout)),
                Ok(Err(e)) => return Err(e),
                Ok(Ok(result)) => result,
            };

        *session = Some(handle);
        command_output(command, exit, output)
    }

    async fn close(&self) {
        if let Some(handle) = self.session.lock().await.take() {
            tracing::debug!(host = %self.host, "Closing SSH session");
            if let Err(e) = handle
                .disconnect(Disconnect::ByApplication, "", "English")
                .await
            {
                tracing::debug!(error = %e, "SSH disconnect failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(legacy: bool) -> Endpoint {
        Endpoint::builder("10.0.0.7")
            .with_credentials("ubnt", "ubnt")
            .without_web()
            .with_ssh_settings(crate::endpoint::SshSettings {
                port: 2222,
                host_key: HostKeyPolicy::AcceptAny,
                legacy_algorithms: legacy,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn requires_ssh_settings() {
        let endpoint = Endpoint::builder("10.0.0.7")
            .with_credentials("ubnt", "ubnt")
            .build()
            .unwrap();
        assert!(matches!(
            SshTransport::new(&endpoint),
            Err(TransportError::NotConfigured("SSH"))
        ));
    }

    #[test]
    fn legacy_algorithms_are_offered_last() {
        let transport = SshTransport::new(&endpoint(true)).unwrap();
        let config = transport.client_config();
        assert_eq!(config.preferred.kex.last(), Some(&russh::kex::DH_G1_SHA1));
        assert_eq!(config.preferred.cipher.last(), Some(&russh::cipher::AES_128_CBC));
    }

    #[test]
    fn modern_only_when_legacy_disabled() {
        let transport = SshTransport::new(&endpoint(false)).unwrap();
        let config = transport.client_config();
        assert!(!config.preferred.kex.contains(&russh::kex::DH_G1_SHA1));
    }

    #[test]
    fn only_exit_zero_is_success() {
        let output = command_output("cat /proc/power/relay1", Some(Exit::Status(0)), b"1\n".to_vec());
        assert_eq!(output.unwrap(), "1\n");

        let err = command_output("false", Some(Exit::Status(1)), Vec::new()).unwrap_err();
        assert!(matches!(err, TransportError::ExitStatus { status: 1, .. }));
        assert!(!err.is_transient());
    }

    #[test]
    fn killed_command_is_not_success() {
        let err = command_output("sleep 60", Some(Exit::Signal("KILL".into())), b"partial".to_vec())
            .unwrap_err();
        assert!(matches!(err, TransportError::ExitSignal { ref signal, .. } if signal == "KILL"));
        assert!(!err.is_transient());
    }

    #[test]
    fn missing_exit_status_is_not_success() {
        let err = command_output("cat /proc/power/v_rms1", None, b"23".to_vec()).unwrap_err();
        assert!(matches!(err, TransportError::NoExitStatus { .. }));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn close_without_session_is_noop() {
        let transport = SshTransport::new(&endpoint(true)).unwrap();
        transport.close().await;
    }
}
