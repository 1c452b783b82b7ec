// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Port addressing for mPower strips.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValueError;

/// One-based index of an outlet on an mPower device.
///
/// mPower models ship with 1, 2, 3, 6 or 8 outlets, so valid ids are 1 to 8.
///
/// # Examples
///
/// ```
/// use mpower_lib::types::PortId;
///
/// let port = PortId::new(3).unwrap();
/// assert_eq!(port.value(), 3);
/// assert_eq!(port.index(), 2);
///
/// assert!(PortId::new(0).is_err());
/// assert!(PortId::new(9).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct PortId(u8);

impl PortId {
    /// Lowest valid port id.
    pub const MIN: u8 = 1;
    /// Highest valid port id.
    pub const MAX: u8 = 8;

    /// Creates a new port id.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if `id` is not in `1..=8`.
    pub fn new(id: u8) -> Result<Self, ValueError> {
        if !(Self::MIN..=Self::MAX).contains(&id) {
            return Err(ValueError::OutOfRange {
                min: u16::from(Self::MIN),
                max: u16::from(Self::MAX),
                actual: u16::from(id),
            });
        }
        Ok(Self(id))
    }

    /// Creates a port id from a zero-based position.
    ///
    /// # Errors
    ///
    /// Returns `ValueError::OutOfRange` if the resulting id is not in `1..=8`.
    pub fn from_index(index: usize) -> Result<Self, ValueError> {
        let id = index
            .checked_add(1)
            .and_then(|id| u8::try_from(id).ok())
            .ok_or(ValueError::OutOfRange {
                min: u16::from(Self::MIN),
                max: u16::from(Self::MAX),
                actual: u16::try_from(index).unwrap_or(u16::MAX),
            })?;
        Self::new(id)
    }

    /// Returns the one-based port number.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }

    /// Returns the zero-based position of this port.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.0 as usize - 1
    }

    /// Iterates over the first `count` ports.
    pub fn range(count: u8) -> impl Iterator<Item = Self> {
        (Self::MIN..=count.min(Self::MAX)).map(Self)
    }
}

impl TryFrom<u8> for PortId {
    type Error = ValueError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PortId> for u8 {
    fn from(value: PortId) -> Self {
        value.0
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
