// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Outlet state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::sensor::{Sensor, SensorKind};
use crate::types::{PortId, RelayState};

/// Electrical readings of one outlet.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Telemetry {
    /// Active power in watts.
    pub power: Option<f64>,
    /// RMS current in amperes.
    pub current: Option<f64>,
    /// RMS voltage in volts.
    pub voltage: Option<f64>,
    /// Power factor.
    pub power_factor: Option<f64>,
    /// Accumulated energy in watt-hours.
    pub energy: Option<f64>,
}

impl Telemetry {
    /// Returns the reading for `kind`; `None` for the state kinds.
    #[must_use]
    pub fn get(&self, kind: SensorKind) -> Option<f64> {
        match kind {
            SensorKind::Power => self.power,
            SensorKind::Current => self.current,
            SensorKind::Voltage => self.voltage,
            SensorKind::PowerFactor => self.power_factor,
            SensorKind::Energy => self.energy,
            SensorKind::Relay | SensorKind::Lock => None,
        }
    }
}

/// One outlet as last acknowledged by the device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// Outlet index.
    pub id: PortId,
    /// User-assigned label.
    pub label: Option<String>,
    /// Relay output state.
    pub relay: RelayState,
    /// Whether switching is locked, when reported.
    pub locked: Option<bool>,
    /// Electrical readings.
    pub telemetry: Telemetry,
    /// When the device reported this state.
    pub refreshed_at: DateTime<Utc>,
}

impl Port {
    /// Creates a port with no telemetry.
    #[must_use]
    pub fn new(id: PortId, relay: RelayState) -> Self {
        Self {
            id,
            label: None,
            relay,
            locked: None,
            telemetry: Telemetry::default(),
            refreshed_at: Utc::now(),
        }
    }

    /// Returns `true` if the relay is on.
    #[must_use]
    pub fn is_on(&self) -> bool {
        self.relay.is_on()
    }

    /// Returns the reading for `kind`, with relay and lock state as 0 or 1.
    #[must_use]
    pub fn reading(&self, kind: SensorKind) -> Option<f64> {
        match kind {
            SensorKind::Relay => Some(f64::from(self.relay.as_num())),
            SensorKind::Lock => self.locked.map(|locked| f64::from(u8::from(locked))),
            other => self.telemetry.get(other),
        }
    }

    /// Splits the port into one [`Sensor`] per kind.
    #[must_use]
    pub fn sensors(&self) -> Vec<Sensor> {
        SensorKind::ALL
            .iter()
            .map(|&kind| Sensor {
                port: self.id,
                kind,
                value: self.reading(kind),
                unit: kind.unit(),
                observed_at: self.refreshed_at,
            })
            .collect()
    }
}
