// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! JSON codec for the web interface.
//!
//! `GET /mfi/sensors.cgi` answers with:
//!
//! ```json
//! {"sensors":[{"port":1,"output":1,"power":4.2,"current":0.03,"voltage":231.0,
//!              "powerfactor":0.6,"energy":12.5,"lock":0,"label":"Lamp"}],
//!  "status":"success"}
//! ```
//!
//! Switching an outlet is `PUT /sensors/{port}` with the form field
//! `output=0|1`; locking it uses `lock=0|1`.

use chrono::Utc;
use serde::Deserialize;

use crate::error::DecodeError;
use crate::model::{Port, Sensor, Telemetry};
use crate::protocol::WebRequest;
use crate::types::{PortId, RelayState};

/// Path of the sensor listing.
pub const SENSORS_PATH: &str = "/mfi/sensors.cgi";

const STATUS_SUCCESS: &str = "success";

#[derive(Debug, Deserialize)]
struct SensorsPayload {
    sensors: Option<Vec<PortPayload>>,
    status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PortPayload {
    port: Option<u8>,
    output: Option<u8>,
    power: Option<f64>,
    current: Option<f64>,
    voltage: Option<f64>,
    powerfactor: Option<f64>,
    energy: Option<f64>,
    lock: Option<u8>,
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AckPayload {
    status: Option<String>,
}

fn check_status(status: Option<String>) -> Result<(), DecodeError> {
    match status {
        Some(status) if status != STATUS_SUCCESS => Err(DecodeError::Status(status)),
        _ => Ok(()),
    }
}

fn flag(field: &'static str, value: u8) -> Result<bool, DecodeError> {
    match value {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(DecodeError::InvalidValue {
            field,
            value: other.to_string(),
        }),
    }
}

impl TryFrom<PortPayload> for Port {
    type Error = DecodeError;

    fn try_from(payload: PortPayload) -> Result<Self, Self::Error> {
        let id = PortId::new(payload.port.ok_or(DecodeError::MissingField("port"))?)?;
        let output = payload.output.ok_or(DecodeError::MissingField("output"))?;
        let relay = RelayState::from(flag("output", output)?);
        let locked = payload.lock.map(|lock| flag("lock", lock)).transpose()?;

        Ok(Self {
            id,
            label: payload.label.filter(|label| !label.is_empty()),
            relay,
            locked,
            telemetry: Telemetry {
                power: payload.power,
                current: payload.current,
                voltage: payload.voltage,
                power_factor: payload.powerfactor,
                energy: payload.energy,
            },
            refreshed_at: Utc::now(),
        })
    }
}

/// Decodes the sensor listing into ports.
///
/// # Errors
///
/// Returns `DecodeError` if the body is not JSON, the `sensors` array or a
/// port's `port`/`output` field is missing, a field has the wrong type, a port
/// id is outside 1-8 or the device reported a non-success status.
pub fn decode_status(bytes: &[u8]) -> Result<Vec<Port>, DecodeError> {
    let payload: SensorsPayload = serde_json::from_slice(bytes)?;
    check_status(payload.status)?;
    let mut ports = payload
        .sensors
        .ok_or(DecodeError::MissingField("sensors"))?
        .into_iter()
        .map(Port::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    ports.sort_by_key(|port| port.id);
    Ok(ports)
}

/// Decodes the sensor listing into individual readings.
///
/// # Errors
///
/// Same as [`decode_status`].
pub fn decode_sensors(bytes: &[u8]) -> Result<Vec<Sensor>, DecodeError> {
    Ok(decode_status(bytes)?
        .iter()
        .flat_map(Port::sensors)
        .collect())
}

/// Checks the acknowledgement of a write.
///
/// An empty body is accepted; firmware 2.x answers writes with nothing.
///
/// # Errors
///
/// Returns `DecodeError` for invalid JSON or a non-success status.
pub fn decode_ack(bytes: &[u8]) -> Result<(), DecodeError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(());
    }
    let payload: AckPayload = serde_json::from_slice(bytes)?;
    check_status(payload.status)
}

/// Builds the request that switches an outlet.
#[must_use]
pub fn encode_set_port(port: PortId, state: RelayState) -> WebRequest {
    WebRequest::put_form(
        format!("/sensors/{port}"),
        vec![("output", state.as_num().to_string())],
    )
}

/// Builds the request that locks or unlocks an outlet.
#[must_use]
pub fn encode_set_lock(port: PortId, locked: bool) -> WebRequest {
    WebRequest::put_form(
        format!("/sensors/{port}"),
        vec![("lock", u8::from(locked).to_string())],
    )
}
