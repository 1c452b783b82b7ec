// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Commands understood by the dispatcher.
//!
//! | Command | Mutating | Transport |
//! |---------|----------|-----------|
//! | [`Command::ReadStatus`] | no | HTTP, else SSH |
//! | [`Command::ReadSensors`] | no | HTTP, else SSH |
//! | [`Command::SetPortState`] | yes | HTTP, else SSH |
//! | [`Command::SetPortLock`] | yes | HTTP, else SSH |
//! | [`Command::SetLed`] | yes | SSH |
//! | [`Command::ReadDeviceInfo`] | no | SSH |
//! | [`Command::RawShellCommand`] | yes | SSH |
//!
//! Raw shell commands may change anything, so they are serialized like
//! writes.
//!
//! # Examples
//!
//! ```
//! use mpower_lib::command::Command;
//! use mpower_lib::types::{PortId, RelayState};
//!
//! let cmd = Command::SetPortState {
//!     port: PortId::new(2).unwrap(),
//!     state: RelayState::On,
//! };
//! assert!(cmd.is_mutating());
//! assert_eq!(cmd.name(), "SetPortState");
//! assert!(!Command::ReadStatus.is_mutating());
//! ```

mod result;

pub use result::{CommandOutput, CommandResult};

use std::fmt;

use crate::types::{LedState, PortId, RelayState};

/// A request to an mPower device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Read relay state, lock flag and telemetry of every port.
    ReadStatus,
    /// Read telemetry of every port as individual sensors.
    ReadSensors,
    /// Switch one port.
    SetPortState {
        /// Target port.
        port: PortId,
        /// Desired relay state.
        state: RelayState,
    },
    /// Lock or unlock switching of one port.
    SetPortLock {
        /// Target port.
        port: PortId,
        /// Whether the port is locked.
        locked: bool,
    },
    /// Set the front panel LED.
    SetLed(LedState),
    /// Read board and firmware information.
    ReadDeviceInfo,
    /// Run an arbitrary shell command and return its output.
    RawShellCommand(String),
}

impl Command {
    /// Returns the command name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::ReadStatus => "ReadStatus",
            Self::ReadSensors => "ReadSensors",
            Self::SetPortState { .. } => "SetPortState",
            Self::SetPortLock { .. } => "SetPortLock",
            Self::SetLed(_) => "SetLed",
            Self::ReadDeviceInfo => "ReadDeviceInfo",
            Self::RawShellCommand(_) => "RawShellCommand",
        }
    }

    /// Returns `true` if the command may change device state.
    #[must_use]
    pub const fn is_mutating(&self) -> bool {
        match self {
            Self::ReadStatus | Self::ReadSensors | Self::ReadDeviceInfo => false,
            Self::SetPortState { .. }
            | Self::SetPortLock { .. }
            | Self::SetLed(_)
            | Self::RawShellCommand(_) => true,
        }
    }

    /// Returns `true` if only the SSH transport can run the command.
    #[must_use]
    pub const fn requires_shell(&self) -> bool {
        matches!(
            self,
            Self::SetLed(_) | Self::ReadDeviceInfo | Self::RawShellCommand(_)
        )
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetPortState { port, state } => write!(f, "SetPortState({port}, {state})"),
            Self::SetPortLock { port, locked } => write!(f, "SetPortLock({port}, {locked})"),
            Self::SetLed(led) => write!(f, "SetLed({led})"),
            other => f.write_str(other.name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        let port = PortId::new(1).unwrap();
        assert!(!Command::ReadSensors.is_mutating());
        assert!(!Command::ReadDeviceInfo.is_mutating());
        assert!(Command::SetPortLock { port, locked: true }.is_mutating());
        assert!(Command::RawShellCommand("uptime".into()).is_mutating());

        assert!(Command::SetLed(LedState::Blue).requires_shell());
        assert!(!Command::SetPortState { port, state: RelayState::Off }.requires_shell());
    }

    #[test]
    fn display() {
        let port = PortId::new(5).unwrap();
        assert_eq!(
            Command::SetPortState { port, state: RelayState::Off }.to_string(),
            "SetPortState(5, off)"
        );
        assert_eq!(Command::SetLed(LedState::Yellow).to_string(), "SetLed(YELLOW)");
        assert_eq!(Command::ReadStatus.to_string(), "ReadStatus");
    }
}
