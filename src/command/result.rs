// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Command outcomes.

use crate::error::Error;
use crate::model::{DeviceInfo, Port, Sensor};

/// Payload of a successful command.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandOutput {
    /// Port states; returned by reads and, re-read from the device, by port
    /// writes.
    Ports(Vec<Port>),
    /// Individual readings.
    Sensors(Vec<Sensor>),
    /// Board and firmware information.
    DeviceInfo(DeviceInfo),
    /// Standard output of a raw shell command.
    Text(String),
    /// The device acknowledged a write that has no readable state.
    Ack,
}

impl CommandOutput {
    /// Returns the ports, if this output carries them.
    #[must_use]
    pub fn into_ports(self) -> Option<Vec<Port>> {
        match self {
            Self::Ports(ports) => Some(ports),
            _ => None,
        }
    }

    /// Returns the readings, if this output carries them.
    #[must_use]
    pub fn into_sensors(self) -> Option<Vec<Sensor>> {
        match self {
            Self::Sensors(sensors) => Some(sensors),
            _ => None,
        }
    }

    /// Returns the device information, if this output carries it.
    #[must_use]
    pub fn into_device_info(self) -> Option<DeviceInfo> {
        match self {
            Self::DeviceInfo(info) => Some(info),
            _ => None,
        }
    }

    /// Returns the shell output, if this output carries it.
    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Outcome of one dispatched command.
///
/// Failures are classified so callers can react without inspecting error
/// text: `AuthFailed` needs new credentials, `Transient` may succeed later,
/// `Fatal` will not succeed as configured.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResult {
    /// The command succeeded.
    Ok(CommandOutput),
    /// The device refused the credentials or the session, even after one
    /// fresh login.
    AuthFailed(String),
    /// The device stayed unreachable or busy for every attempt.
    Transient(String),
    /// The command cannot succeed: an undecodable answer, a rejected host key
    /// or a failing remote command.
    Fatal(String),
    /// No configured transport can run the command.
    CapabilityUnsupported {
        /// Name of the command.
        command: &'static str,
        /// Transports configured on the endpoint.
        transport: &'static str,
    },
}

impl CommandResult {
    /// Returns `true` for [`CommandResult::Ok`].
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok(_))
    }

    /// Returns the output of a successful command.
    #[must_use]
    pub fn output(&self) -> Option<&CommandOutput> {
        match self {
            Self::Ok(output) => Some(output),
            _ => None,
        }
    }

    /// Converts into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the failure as an [`Error`].
    pub fn into_result(self) -> Result<CommandOutput, Error> {
        match self {
            Self::Ok(output) => Ok(output),
            Self::AuthFailed(reason) => Err(Error::Auth(crate::error::AuthError::Rejected(reason))),
            Self::Transient(reason) | Self::Fatal(reason) => Err(Error::Command(reason)),
            Self::CapabilityUnsupported { command, transport } => {
                Err(Error::CapabilityUnsupported { command, transport })
            }
        }
    }
}
