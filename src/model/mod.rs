// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed device resources.
//!
//! These are the shapes returned to callers regardless of which transport
//! produced them. Telemetry the device did not report is `None`, never zero.
//!
//! - [`Port`] - one outlet with relay state, lock flag and telemetry
//! - [`Sensor`] - a single measurement of one port
//! - [`DeviceInfo`] - board and firmware information read over SSH

mod device_info;
mod port;
mod sensor;

pub use device_info::{BoardInfo, DeviceInfo, NetworkInterface, StatusInfo};
pub use port::{Port, Telemetry};
pub use sensor::{Sensor, SensorKind, Unit};
