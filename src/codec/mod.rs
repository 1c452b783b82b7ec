// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Wire formats of the mPower device.
//!
//! This is the only place that knows what the device sends and expects:
//!
//! - [`json`] - payloads of the web interface (`/mfi/sensors.cgi`,
//!   `/sensors/{port}`)
//! - [`shell`] - commands run over SSH and the text they print
//!
//! Both decode into the types of [`crate::model`].

pub mod json;
pub mod shell;
