// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `mPower` Lib - A Rust library to control Ubiquiti mFi mPower power strips.
//!
//! The library talks to the device over its web interface (HTTP or HTTPS with
//! an `AIROS_SESSIONID` session cookie) and over SSH.
//!
//! # Supported Features
//!
//! - **Outlet control**: Switch, toggle and lock individual ports
//! - **Telemetry**: Power, current, voltage, power factor and energy per port
//! - **Device information**: Board, firmware and network details (SSH)
//! - **LED control** and raw shell commands (SSH)
//! - **Polling**: Periodic reads of many strips merged into one stream
//!
//! # Transports
//!
//! | Command | HTTP | SSH |
//! |---------|------|-----|
//! | `ReadStatus`, `ReadSensors` | yes | yes |
//! | `SetPortState`, `SetPortLock` | yes | yes |
//! | `SetLed`, `ReadDeviceInfo`, `RawShellCommand` | - | yes |
//!
//! The web interface is used whenever the endpoint has one. It defaults to
//! HTTPS with strict certificate checks. Stock firmware serves a self-signed
//! certificate, so pin its fingerprint or pass [`endpoint::TlsTrust::AcceptInvalid`];
//! plain HTTP needs an explicit `with_http()`.
//!
//! # Quick Start
//!
//! ```no_run
//! use mpower_lib::Device;
//! use mpower_lib::endpoint::{Endpoint, TlsTrust};
//! use mpower_lib::types::PortId;
//!
//! #[tokio::main]
//! async fn main() -> mpower_lib::Result<()> {
//!     let endpoint = Endpoint::builder("192.168.1.20")
//!         .with_credentials("ubnt", "ubnt")
//!         .with_tls(TlsTrust::AcceptInvalid)
//!         .build()?;
//!     let device = Device::connect(endpoint)?;
//!
//!     for port in device.ports().await? {
//!         println!("{}: {} ({:?} W)", port.id, port.relay, port.telemetry.power);
//!     }
//!
//!     device.turn_off(PortId::new(2)?).await?;
//!     device.close().await;
//!     Ok(())
//! }
//! ```
//!
//! # Commands and Results
//!
//! Below the [`Device`] facade, a [`Dispatcher`] runs [`Command`]s and
//! reports a classified [`CommandResult`]:
//!
//! ```no_run
//! use mpower_lib::{Command, CommandResult, Dispatcher};
//! use mpower_lib::endpoint::Endpoint;
//!
//! # async fn example() -> mpower_lib::Result<()> {
//! let endpoint = Endpoint::builder("192.168.1.20")
//!     .with_credentials("ubnt", "ubnt")
//!     .without_web()
//!     .with_ssh()
//!     .build()?;
//! let dispatcher = Dispatcher::connect(endpoint)?;
//!
//! match dispatcher.execute(&Command::ReadDeviceInfo).await {
//!     CommandResult::Ok(output) => println!("{output:?}"),
//!     CommandResult::Transient(reason) => println!("try again later: {reason}"),
//!     other => println!("giving up: {other:?}"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod command;
mod device;
pub mod dispatcher;
pub mod endpoint;
pub mod error;
pub mod model;
pub mod poll;
pub mod protocol;
pub mod session;
pub mod types;

pub use command::{Command, CommandOutput, CommandResult};
pub use device::Device;
pub use dispatcher::{Dispatcher, RetryPolicy};
pub use endpoint::{Credentials, Endpoint, EndpointConfig, EndpointId};
pub use error::{AuthError, ConfigError, DecodeError, Error, Result, TransportError, ValueError};
pub use model::{DeviceInfo, Port, Sensor, SensorKind, Telemetry, Unit};
pub use poll::{PollOptions, PollResult, Poller};
pub use session::{KeepalivePolicy, SessionState};
pub use types::{LedState, PortId, RelayState};
