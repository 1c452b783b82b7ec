// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! High-level API for one power strip.
//!
//! [`Device`] wraps a [`Dispatcher`] and turns every non-`Ok`
//! [`CommandResult`](crate::command::CommandResult) into an [`Error`]. It also
//! keeps the web session alive in the background while the device is in use.
//!
//! ```no_run
//! use mpower_lib::Device;
//! use mpower_lib::endpoint::Endpoint;
//! use mpower_lib::types::PortId;
//!
//! # async fn example() -> mpower_lib::Result<()> {
//! let endpoint = Endpoint::builder("192.168.1.20")
//!     .with_credentials("ubnt", "ubnt")
//!     .with_ssh()
//!     .build()?;
//! let device = Device::connect(endpoint)?;
//!
//! let port = device.toggle(PortId::new(3)?).await?;
//! println!("port 3 is now {}", port.relay);
//!
//! device.close().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::command::{Command, CommandOutput};
use crate::dispatcher::Dispatcher;
use crate::endpoint::{Endpoint, EndpointId};
use crate::error::{Error, Result, ValueError};
use crate::model::{DeviceInfo, Port, Sensor};
use crate::protocol::{HttpTransport, ShellTransport, SshTransport, WebTransport};
use crate::types::{LedState, PortId, RelayState};

/// A connected mPower power strip.
pub struct Device<W = HttpTransport, S = SshTransport> {
    dispatcher: Arc<Dispatcher<W, S>>,
    cancel: CancellationToken,
    keepalive: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl<W, S> std::fmt::Debug for Device<W, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Device {
    /// Creates a device using the real HTTP and SSH transports.
    ///
    /// Must be called within a Tokio runtime, which runs the session
    /// keep-alive task.
    ///
    /// # Errors
    ///
    /// Returns `Error::Transport` if the HTTP client cannot be built.
    pub fn connect(endpoint: Endpoint) -> Result<Self> {
        Ok(Self::new(Arc::new(Dispatcher::connect(endpoint)?)))
    }
}

impl<W, S> Device<W, S>
where
    W: WebTransport + 'static,
    S: ShellTransport,
{
    /// Wraps an existing dispatcher, which may also be shared with a
    /// [`Poller`](crate::poll::Poller).
    ///
    /// Must be called within a Tokio runtime.
    #[must_use]
    pub fn new(dispatcher: Arc<Dispatcher<W, S>>) -> Self {
        let cancel = CancellationToken::new();
        let keepalive = dispatcher.spawn_keepalive(cancel.clone());
        Self {
            dispatcher,
            cancel,
            keepalive: parking_lot::Mutex::new(keepalive),
        }
    }

    /// Returns the underlying dispatcher.
    #[must_use]
    pub fn dispatcher(&self) -> &Arc<Dispatcher<W, S>> {
        &self.dispatcher
    }

    /// Returns the endpoint id.
    #[must_use]
    pub fn id(&self) -> EndpointId {
        self.dispatcher.id()
    }

    async fn execute(&self, command: Command) -> Result<CommandOutput> {
        self.dispatcher.execute(&command).await.into_result()
    }

    // ========================================================================
    // Ports
    // ========================================================================

    /// Reads every port.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn ports(&self) -> Result<Vec<Port>> {
        expect_ports(self.execute(Command::ReadStatus).await?)
    }

    /// Reads the telemetry of every port as individual sensors.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails.
    pub async fn sensors(&self) -> Result<Vec<Sensor>> {
        match self.execute(Command::ReadSensors).await? {
            CommandOutput::Sensors(sensors) => Ok(sensors),
            other => Err(unexpected(&other)),
        }
    }

    /// Reads one port.
    ///
    /// # Errors
    ///
    /// Returns `Error::Value` if the device has no such port, or an error if
    /// the command fails.
    pub async fn port(&self, id: PortId) -> Result<Port> {
        find_port(self.ports().await?, id)
    }

    /// Switches a port on and returns its state read back from the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the port does not exist.
    pub async fn turn_on(&self, id: PortId) -> Result<Port> {
        self.set_state(id, RelayState::On).await
    }

    /// Switches a port off and returns its state read back from the device.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the port does not exist.
    pub async fn turn_off(&self, id: PortId) -> Result<Port> {
        self.set_state(id, RelayState::Off).await
    }

    /// Switches a port to the opposite of its current state.
    ///
    /// # Errors
    ///
    /// Returns an error if either command fails or the port does not exist.
    pub async fn toggle(&self, id: PortId) -> Result<Port> {
        let current = self.port(id).await?;
        self.set_state(id, current.relay.toggled()).await
    }

    /// Switches a port to `state`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the port does not exist.
    pub async fn set_state(&self, id: PortId, state: RelayState) -> Result<Port> {
        let output = self
            .execute(Command::SetPortState { port: id, state })
            .await?;
        find_port(expect_ports(output)?, id)
    }

    /// Locks or unlocks switching of a port.
    ///
    /// # Errors
    ///
    /// Returns an error if the command fails or the port does not exist.
    pub async fn set_lock(&self, id: PortId, locked: bool) -> Result<Port> {
        let output = self
            .execute(Command::SetPortLock { port: id, locked })
            .await?;
        find_port(expect_ports(output)?, id)
    }

    // ========================================================================
    // SSH only
    // ========================================================================

    /// Sets the front panel LED.
    ///
    /// # Errors
    ///
    /// Returns `Error::CapabilityUnsupported` without SSH access, or an error
    /// if the command fails.
    pub async fn set_led(&self, led: LedState) -> Result<()> {
        self.execute(Command::SetLed(led)).await.map(drop)
    }

    /// Reads board, firmware and network information.
    ///
    /// # Errors
    ///
    /// Returns `Error::CapabilityUnsupported` without SSH access, or an error
    /// if the command fails.
    pub async fn device_info(&self) -> Result<DeviceInfo> {
        match self.execute(Command::ReadDeviceInfo).await? {
            CommandOutput::DeviceInfo(info) => Ok(info),
            other => Err(unexpected(&other)),
        }
    }

    /// Runs a shell command on the device and returns its output.
    ///
    /// # Errors
    ///
    /// Returns `Error::CapabilityUnsupported` without SSH access, or an error
    /// if the command fails or exits with a non-zero status.
    pub async fn run(&self, command: impl Into<String>) -> Result<String> {
        match self.execute(Command::RawShellCommand(command.into())).await? {
            CommandOutput::Text(text) => Ok(text),
            other => Err(unexpected(&other)),
        }
    }

    /// Stops the keep-alive task, logs out and closes the SSH connection.
    pub async fn close(&self) {
        self.cancel.cancel();
        let keepalive = self.keepalive.lock().take();
        if let Some(handle) = keepalive
            && let Err(e) = handle.await
        {
            tracing::debug!(endpoint = %self.id(), error = %e, "Keep-alive task ended abnormally");
        }
        self.dispatcher.close().await;
    }
}

impl<W, S> Drop for Device<W, S> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn unexpected(output: &CommandOutput) -> Error {
    Error::Command(format!("unexpected command output: {output:?}"))
}

fn expect_ports(output: CommandOutput) -> Result<Vec<Port>> {
    match output {
        CommandOutput::Ports(ports) => Ok(ports),
        other => Err(unexpected(&other)),
    }
}

fn find_port(ports: Vec<Port>, id: PortId) -> Result<Port> {
    let count = ports.len();
    ports
        .into_iter()
        .find(|port| port.id == id)
        .ok_or_else(|| {
            Error::Value(ValueError::OutOfRange {
                min: 1,
                max: u16::try_from(count).unwrap_or(u16::MAX),
                actual: u16::from(id.value()),
            })
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::json::SENSORS_PATH;
    use crate::codec::shell::RECORD_SEPARATOR;
    use crate::protocol::fake::{ScriptedShell, ScriptedWeb, Step};
    use crate::protocol::{LOGIN_PATH, LOGOUT_PATH};

    const PORT_2_ON: &str = r#"{"sensors":[{"port":1,"output":0},{"port":2,"output":1,"lock":0}],"status":"success"}"#;
    const PORT_2_OFF: &str = r#"{"sensors":[{"port":1,"output":0},{"port":2,"output":0,"lock":0}],"status":"success"}"#;

    fn web_device(web: ScriptedWeb) -> Device<ScriptedWeb, ScriptedShell> {
        let endpoint = Endpoint::builder("10.0.0.3")
            .with_credentials("ubnt", "ubnt")
            .build()
            .unwrap();
        let web = web.on(LOGIN_PATH, [Step::redirect("/power")]);
        Device::new(Arc::new(Dispatcher::with_transports(endpoint, Some(web), None)))
    }

    fn ssh_device(shell: ScriptedShell) -> Device<ScriptedWeb, ScriptedShell> {
        let endpoint = Endpoint::builder("10.0.0.3")
            .with_credentials("ubnt", "ubnt")
            .without_web()
            .with_ssh()
            .build()
            .unwrap();
        Device::new(Arc::new(Dispatcher::with_transports(endpoint, None, Some(shell))))
    }

    #[tokio::test]
    async fn toggle_writes_opposite_of_current_state() {
        let device = web_device(
            ScriptedWeb::new()
                .on(SENSORS_PATH, [Step::json(200, PORT_2_ON), Step::json(200, PORT_2_OFF)])
                .on("/sensors/2", [Step::json(200, "")]),
        );

        let port = device.toggle(PortId::new(2).unwrap()).await.unwrap();
        assert_eq!(port.relay, RelayState::Off);
        assert_eq!(port.id.value(), 2);
    }

    #[tokio::test]
    async fn missing_port_is_value_error() {
        let device = web_device(ScriptedWeb::new().on(SENSORS_PATH, [Step::json(200, PORT_2_ON)]));

        let err = device.port(PortId::new(5).unwrap()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Value(ValueError::OutOfRange { max: 2, actual: 5, .. })
        ));
    }

    #[tokio::test]
    async fn failures_become_errors() {
        let device = web_device(ScriptedWeb::new().on(SENSORS_PATH, [Step::json(200, "not json")]));
        assert!(matches!(device.ports().await, Err(Error::Command(_))));

        let err = device.set_led(LedState::Yellow).await.unwrap_err();
        assert!(matches!(
            err,
            Error::CapabilityUnsupported { command: "SetLed", transport: "HTTP" }
        ));
    }

    #[tokio::test]
    async fn ssh_device_info_and_run() {
        let info = [
            "board.sysid=0xe643\nboard.name=mPower\nboard.hwaddr=002722000001\n",
            "",
            "MF.v2.1.11\n",
            "12345\n",
            "0\n",
            "strip\n",
            "",
        ]
        .join(&RECORD_SEPARATOR.to_string());
        let device = ssh_device(
            ScriptedShell::new()
                .on("cd /tmp && ifconfig", &info)
                .on("cat /proc/uptime", "3600.5 7000.1\n"),
        );

        let info = device.device_info().await.unwrap();
        assert_eq!(info.board.ports, 3);
        assert_eq!(info.status.hostname, "strip");

        assert_eq!(device.run("cat /proc/uptime").await.unwrap(), "3600.5 7000.1\n");
    }

    #[tokio::test]
    async fn close_stops_keepalive_and_logs_out() {
        let device = web_device(
            ScriptedWeb::new()
                .on(SENSORS_PATH, [Step::json(200, PORT_2_ON)])
                .on(LOGOUT_PATH, [Step::json(200, "")]),
        );
        device.ports().await.unwrap();

        device.close().await;
        assert!(device.keepalive.lock().is_none());
        assert!(device.dispatcher().session().unwrap().session().token().is_none());
    }
}
