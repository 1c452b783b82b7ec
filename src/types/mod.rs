// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value types for mPower device control.
//!
//! Each type validates its range at construction time.
//!
//! # Types
//!
//! - [`PortId`] - Outlet index (1-8)
//! - [`RelayState`] - On/Off output state
//! - [`LedState`] - Front panel LED mode

mod led;
mod port;
mod relay;

pub use led::LedState;
pub use port::PortId;
pub use relay::RelayState;
