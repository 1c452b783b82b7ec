// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Front panel LED modes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// Mode of the status LED, as stored in `/proc/led/status`.
///
/// # Examples
///
/// ```
/// use mpower_lib::types::LedState;
///
/// assert_eq!(LedState::Blue.code(), 1);
/// assert_eq!(LedState::from_code(99).unwrap(), LedState::LockedOff);
/// assert!(LedState::from_code(5).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedState {
    /// LED off.
    Off,
    /// Blue LED on.
    Blue,
    /// Yellow LED on.
    Yellow,
    /// Both LEDs on.
    Both,
    /// Alternating blue and yellow.
    Alternate,
    /// Locked off; set [`LedState::Off`] to unlock.
    LockedOff,
}

impl LedState {
    /// Returns the numeric code understood by the device.
    #[must_use]
    pub const fn code(&self) -> u8 {
        match self {
            Self::Off => 0,
            Self::Blue => 1,
            Self::Yellow => 2,
            Self::Both => 3,
            Self::Alternate => 4,
            Self::LockedOff => 99,
        }
    }

    /// Parses a numeric device code.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::InvalidLedState` for unknown codes.
    pub fn from_code(code: u8) -> Result<Self, ValueError> {
        match code {
            0 => Ok(Self::Off),
            1 => Ok(Self::Blue),
            2 => Ok(Self::Yellow),
            3 => Ok(Self::Both),
            4 => Ok(Self::Alternate),
            99 => Ok(Self::LockedOff),
            other => Err(ValueError::InvalidLedState(other.to_string())),
        }
    }
}

impl fmt::Display for LedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Off => "OFF",
            Self::Blue => "BLUE",
            Self::Yellow => "YELLOW",
            Self::Both => "BOTH",
            Self::Alternate => "ALTERNATE",
            Self::LockedOff => "LOCKED_OFF",
        };
        f.write_str(name)
    }
}

impl FromStr for LedState {
    type Err = ValueError;

    /// Accepts the first whitespace separated token of the LED status file.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.split_whitespace().next().unwrap_or_default();
        token
            .parse::<u8>()
            .map_err(|_| ValueError::InvalidLedState(s.to_string()))
            .and_then(Self::from_code)
    }
}
