// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Shell codec for the SSH interface.
//!
//! Reads are a single `cat` over several files, each separated by an ASCII
//! record separator (`0x1E`) so the output can be split back per file:
//!
//! ```text
//! cd /tmp && ip route > ip_route && printf '\x1E' > _ && cat /etc/board.info _ ip_route
//! ```
//!
//! The `/proc/power/*` files hold one line per outlet, so a glob such as
//! `/proc/power/output*` yields the values of every port in order.
//! Writes `echo` a value into the matching `/proc` file.

use chrono::Utc;

use crate::error::DecodeError;
use crate::model::{
    BoardInfo, DeviceInfo, NetworkInterface, Port, Sensor, StatusInfo, Telemetry,
};
use crate::types::{LedState, PortId, RelayState};

/// Record separator placed between the files of a `cat` command.
pub const RECORD_SEPARATOR: char = '\x1E';

const POWER_DIR: &str = "/proc/power";
const CONFIG_FILE: &str = "/etc/persistent/cfg/config_file";
const LED_FILE: &str = "/proc/led/status";

const PORT_FILES: [&str; 8] = [
    CONFIG_FILE,
    "/proc/power/energy_sum*",
    "/proc/power/v_rms*",
    "/proc/power/i_rms*",
    "/proc/power/active_pwr*",
    "/proc/power/pf*",
    "/proc/power/output*",
    "/proc/power/lock*",
];

const INFO_SETUP: [&str; 2] = ["ifconfig -a > ifconfig", "ip route > ip_route"];

const INFO_FILES: [&str; 7] = [
    "/etc/board.info",
    "ifconfig",
    "/usr/etc/.version",
    "/usr/etc/.build",
    LED_FILE,
    "/proc/sys/kernel/hostname",
    "ip_route",
];

/// Builds a `cat` command printing `files` separated by [`RECORD_SEPARATOR`].
///
/// `setup` commands run first in `/tmp`, so they can write scratch files
/// that are then listed in `files`.
#[must_use]
pub fn cat_command(setup: &[&str], files: &[&str]) -> String {
    let mut commands = vec!["cd /tmp".to_string()];
    commands.extend(setup.iter().map(ToString::to_string));
    commands.push(r"printf '\x1E' > _".to_string());
    commands.push(format!("cat {}", files.join(" _ ")));
    commands.join(" && ")
}

/// Splits `cat` output into exactly `expected` sections.
///
/// # Errors
///
/// Returns `DecodeError::SectionCount` if the output has another number of
/// sections.
pub fn split_sections(output: &str, expected: usize) -> Result<Vec<&str>, DecodeError> {
    let sections: Vec<&str> = output.split(RECORD_SEPARATOR).collect();
    if sections.len() != expected {
        return Err(DecodeError::SectionCount {
            expected,
            actual: sections.len(),
        });
    }
    Ok(sections)
}

// ============================================================================
// Ports and sensors
// ============================================================================

/// Command reading labels, telemetry, relay and lock state of every port.
#[must_use]
pub fn read_ports_command() -> String {
    cat_command(&[], &PORT_FILES)
}

fn parse_floats(field: &'static str, section: &str) -> Result<Vec<f64>, DecodeError> {
    section
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| {
            line.parse::<f64>().map_err(|_| DecodeError::InvalidValue {
                field,
                value: line.to_string(),
            })
        })
        .collect()
}

fn parse_flags(field: &'static str, section: &str) -> Result<Vec<bool>, DecodeError> {
    section
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match line {
            "0" => Ok(false),
            "1" => Ok(true),
            other => Err(DecodeError::InvalidValue {
                field,
                value: other.to_string(),
            }),
        })
        .collect()
}

/// Extracts `port.N.label=...` entries. `N` is zero-based in the config file.
fn parse_labels(section: &str, count: usize) -> Vec<Option<String>> {
    let mut labels = vec![None; count];
    for line in section.lines() {
        let Some(rest) = line.trim().strip_prefix("port.") else {
            continue;
        };
        let Some((index, label)) = rest.split_once(".label=") else {
            continue;
        };
        if let Ok(index) = index.parse::<usize>()
            && index < count
            && !label.is_empty()
        {
            labels[index] = Some(label.to_string());
        }
    }
    labels
}

/// Decodes the output of [`read_ports_command`].
///
/// The number of ports is the number of lines in the `output*` section.
/// Readings missing for a port decode to `None`.
///
/// # Errors
///
/// Returns `DecodeError` on a wrong section count, an unparseable reading or
/// more than eight outputs.
pub fn decode_ports(output: &str) -> Result<Vec<Port>, DecodeError> {
    let sections = split_sections(output, PORT_FILES.len())?;
    let energy = parse_floats("energy", sections[1])?;
    let voltage = parse_floats("voltage", sections[2])?;
    let current = parse_floats("current", sections[3])?;
    let power = parse_floats("power", sections[4])?;
    let power_factor = parse_floats("powerfactor", sections[5])?;
    let outputs = parse_flags("output", sections[6])?;
    let locks = parse_flags("lock", sections[7])?;
    let labels = parse_labels(sections[0], outputs.len());

    let refreshed_at = Utc::now();
    outputs
        .iter()
        .enumerate()
        .map(|(i, &on)| -> Result<Port, DecodeError> {
            Ok(Port {
                id: PortId::from_index(i)?,
                label: labels[i].clone(),
                relay: RelayState::from(on),
                locked: locks.get(i).copied(),
                telemetry: Telemetry {
                    power: power.get(i).copied(),
                    current: current.get(i).copied(),
                    voltage: voltage.get(i).copied(),
                    power_factor: power_factor.get(i).copied(),
                    energy: energy.get(i).copied(),
                },
                refreshed_at,
            })
        })
        .collect()
}

/// Decodes the output of [`read_ports_command`] into individual readings.
///
/// # Errors
///
/// Same as [`decode_ports`].
pub fn decode_sensors(output: &str) -> Result<Vec<Sensor>, DecodeError> {
    Ok(decode_ports(output)?.iter().flat_map(Port::sensors).collect())
}

/// Command switching one outlet.
#[must_use]
pub fn set_relay_command(port: PortId, state: RelayState) -> String {
    format!("echo {} > {POWER_DIR}/relay{port}", state.as_num())
}

/// Command locking or unlocking one outlet.
#[must_use]
pub fn set_lock_command(port: PortId, locked: bool) -> String {
    format!("echo {} > {POWER_DIR}/lock{port}", u8::from(locked))
}

/// Command setting the LED mode.
#[must_use]
pub fn set_led_command(led: LedState) -> String {
    format!("echo {} > {LED_FILE}", led.code())
}

// ============================================================================
// Device information
// ============================================================================

/// Command reading board, network and firmware information.
#[must_use]
pub fn read_device_info_command() -> String {
    cat_command(&INFO_SETUP, &INFO_FILES)
}

fn format_hwaddr(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains(':') || raw.len() != 12 {
        return raw.to_string();
    }
    raw.as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .collect::<Vec<_>>()
        .join(":")
}

fn parse_board(section: &str) -> Result<BoardInfo, DecodeError> {
    let mut board = BoardInfo::default();
    for line in section.lines() {
        let Some((key, value)) = line
            .trim()
            .strip_prefix("board.")
            .and_then(|rest| rest.split_once('='))
        else {
            continue;
        };
        let value = value.to_string();
        match key {
            "name" => board.name = value,
            "shortname" => board.shortname = value,
            "sysid" => board.sysid = value,
            "revision" => board.revision = value,
            "hwaddr" => board.hwaddr = format_hwaddr(&value),
            _ => {}
        }
    }
    if board.sysid.is_empty() {
        return Err(DecodeError::MissingField("board.sysid"));
    }
    board.ports =
        DeviceInfo::ports_for_sysid(&board.sysid).ok_or_else(|| DecodeError::InvalidValue {
            field: "board.sysid",
            value: board.sysid.clone(),
        })?;
    Ok(board)
}

fn interface_kind(name: &str) -> NetworkInterface {
    if name.starts_with("eth") {
        NetworkInterface::Lan
    } else {
        NetworkInterface::Wlan
    }
}

fn parse_ifconfig(section: &str, board: &mut BoardInfo) {
    for line in section.lines() {
        let Some(name) = line.split_whitespace().next() else {
            continue;
        };
        let Some((_, rest)) = line.split_once("HWaddr ") else {
            continue;
        };
        let Some(mac) = rest.get(..17) else {
            continue;
        };
        match interface_kind(name) {
            NetworkInterface::Lan => board.hwaddr_lan = Some(mac.to_string()),
            NetworkInterface::Wlan => board.hwaddr_wlan = Some(mac.to_string()),
        }
    }
}

fn word_after<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let mut words = line.split_whitespace();
    words.find(|w| *w == keyword)?;
    words.next()
}

fn parse_route(section: &str, status: &mut StatusInfo) {
    let Some(dev) = section
        .lines()
        .filter(|line| line.trim_start().starts_with("default"))
        .find_map(|line| word_after(line, "dev"))
    else {
        return;
    };
    status.iface = Some(interface_kind(dev));
    status.ipaddr = section
        .lines()
        .filter(|line| word_after(line, "dev") == Some(dev))
        .find_map(|line| word_after(line, "src"))
        .map(ToString::to_string);
}

fn first_line(section: &str) -> String {
    section.lines().next().unwrap_or_default().trim().to_string()
}

/// Decodes the output of [`read_device_info_command`].
///
/// # Errors
///
/// Returns `DecodeError` on a wrong section count, a missing or unknown
/// system id or an unreadable LED status.
pub fn decode_device_info(output: &str) -> Result<DeviceInfo, DecodeError> {
    let sections = split_sections(output, INFO_FILES.len())?;

    let mut board = parse_board(sections[0])?;
    parse_ifconfig(sections[1], &mut board);

    let led_line = first_line(sections[4]);
    let led = if led_line.is_empty() {
        None
    } else {
        Some(led_line.parse::<LedState>()?)
    };

    let mut status = StatusInfo {
        firmware_version: first_line(sections[2]),
        firmware_build: first_line(sections[3]),
        led,
        hostname: first_line(sections[5]),
        iface: None,
        ipaddr: None,
    };
    parse_route(sections[6], &mut status);

    Ok(DeviceInfo { board, status })
}
