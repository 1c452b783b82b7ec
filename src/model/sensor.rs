// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::PortId;

/// Kind of measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// Active power.
    Power,
    /// RMS current.
    Current,
    /// RMS voltage.
    Voltage,
    /// Power factor.
    PowerFactor,
    /// Accumulated energy.
    Energy,
    /// Relay output, 1 when on.
    Relay,
    /// Switch lock, 1 when locked.
    Lock,
}

impl SensorKind {
    /// Every kind, in reporting order.
    pub const ALL: [Self; 7] = [
        Self::Power,
        Self::Current,
        Self::Voltage,
        Self::PowerFactor,
        Self::Energy,
        Self::Relay,
        Self::Lock,
    ];

    /// Returns the unit values of this kind are expressed in.
    #[must_use]
    pub const fn unit(&self) -> Unit {
        match self {
            Self::Power => Unit::Watt,
            Self::Current => Unit::Ampere,
            Self::Voltage => Unit::Volt,
            Self::PowerFactor => Unit::Ratio,
            Self::Energy => Unit::WattHour,
            Self::Relay | Self::Lock => Unit::State,
        }
    }
}

/// Measurement unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Unit {
    /// W
    Watt,
    /// A
    Ampere,
    /// V
    Volt,
    /// Dimensionless.
    Ratio,
    /// Wh
    WattHour,
    /// Binary on/off state.
    State,
}

impl Unit {
    /// Returns the unit symbol.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Watt => "W",
            Self::Ampere => "A",
            Self::Volt => "V",
            Self::Ratio | Self::State => "",
            Self::WattHour => "Wh",
        }
    }
}

/// A single reading of one port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    /// Port the reading belongs to.
    pub port: PortId,
    /// What was measured.
    pub kind: SensorKind,
    /// Reading; `None` when the device did not report it.
    pub value: Option<f64>,
    /// Unit of `value`.
    pub unit: Unit,
    /// When the device reported the reading.
    pub observed_at: DateTime<Utc>,
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(value) => write!(
                f,
                "port {} {:?}: {value} {}",
                self.port,
                self.kind,
                self.unit.symbol()
            ),
            None => write!(f, "port {} {:?}: unknown", self.port, self.kind),
        }
    }
}
