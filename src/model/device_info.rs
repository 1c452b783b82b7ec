// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Board and firmware information.

use serde::{Deserialize, Serialize};

use crate::types::LedState;

/// Network interface carrying the default route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkInterface {
    /// Wired Ethernet.
    Lan,
    /// Wi-Fi.
    Wlan,
}

/// Static hardware description from `/etc/board.info`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BoardInfo {
    /// Marketing name, e.g. `mPower PRO`.
    pub name: String,
    /// Short model name; a trailing `E` marks EU sockets.
    pub shortname: String,
    /// Hex system id, e.g. `0xe648`.
    pub sysid: String,
    /// Hardware revision.
    pub revision: String,
    /// Number of outlets derived from the system id.
    pub ports: u8,
    /// Board MAC address, colon separated.
    pub hwaddr: String,
    /// Ethernet MAC address.
    pub hwaddr_lan: Option<String>,
    /// Wi-Fi MAC address.
    pub hwaddr_wlan: Option<String>,
}

/// Runtime status of the device.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusInfo {
    /// Firmware version string.
    pub firmware_version: String,
    /// Firmware build number.
    pub firmware_build: String,
    /// Front panel LED mode.
    pub led: Option<LedState>,
    /// Kernel host name.
    pub hostname: String,
    /// Interface of the default route.
    pub iface: Option<NetworkInterface>,
    /// Source address on the default interface.
    pub ipaddr: Option<String>,
}

/// Combined board and status information.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Hardware description.
    pub board: BoardInfo,
    /// Runtime status.
    pub status: StatusInfo,
}

impl DeviceInfo {
    /// Device manufacturer.
    pub const MANUFACTURER: &'static str = "Ubiquiti";

    /// Returns the number of outlets for a system id.
    #[must_use]
    pub fn ports_for_sysid(sysid: &str) -> Option<u8> {
        match sysid.to_ascii_lowercase().as_str() {
            "0xe641" | "0xe651" | "0xe671" | "0xe672" => Some(1),
            "0xe662" => Some(2),
            "0xe643" | "0xe653" => Some(3),
            "0xe656" => Some(6),
            "0xe648" => Some(8),
            _ => None,
        }
    }

    /// Returns `Some(true)` for EU models with type F sockets.
    #[must_use]
    pub fn eu_model(&self) -> Option<bool> {
        let shortname = &self.board.shortname;
        if shortname.len() > 2 && shortname.ends_with('E') {
            Some(true)
        } else if shortname.len() > 1 {
            Some(false)
        } else {
            None
        }
    }

    /// Returns the model name, e.g. `mFi mPower PRO (EU)`.
    #[must_use]
    pub fn model(&self) -> String {
        if self.board.name.is_empty() {
            return String::new();
        }
        let eu_tag = if self.eu_model() == Some(true) {
            " (EU)"
        } else {
            ""
        };
        format!("mFi {}{eu_tag}", self.board.name)
    }

    /// Returns a description derived from the outlet count.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self.board.ports {
            1 => "mFi Power Adapter with Wi-Fi",
            3 => "3-Port mFi Power Strip with Wi-Fi",
            6 => "6-Port mFi Power Strip with Ethernet and Wi-Fi",
            8 => "8-Port mFi Power Strip with Ethernet and Wi-Fi",
            _ => "",
        }
    }

    /// Returns the firmware version including the build number.
    #[must_use]
    pub fn sw_version(&self) -> String {
        format!(
            "{} (build {})",
            self.status.firmware_version, self.status.firmware_build
        )
    }

    /// Returns the MAC address of the active interface.
    #[must_use]
    pub fn hwaddr(&self) -> Option<&str> {
        match self.status.iface? {
            NetworkInterface::Lan => self.board.hwaddr_lan.as_deref(),
            NetworkInterface::Wlan => self.board.hwaddr_wlan.as_deref(),
        }
    }

    /// Returns a stable id built from the LAN and WLAN MAC addresses.
    #[must_use]
    pub fn unique_id(&self) -> String {
        let lan = self.board.hwaddr_lan.as_deref().unwrap_or_default();
        let wlan = self.board.hwaddr_wlan.as_deref().unwrap_or_default();
        format!("{lan}-{wlan}")
    }
}
