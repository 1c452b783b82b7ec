// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Stable names for endpoints.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Tag carried by an [`Endpoint`](super::Endpoint) and by every
/// [`PollResult`](crate::poll::PollResult) it produces.
///
/// Host names are not unique enough for this: the same strip can be reached
/// through two addresses, or configured twice with different transports.
/// Builders draw a random v4 UUID unless one is supplied, which lets a
/// configuration file keep ids stable across restarts.
///
/// ```
/// use mpower_lib::endpoint::EndpointId;
///
/// let id: EndpointId = "5f0c2a9e-7d41-4c1b-9a55-0e6f3b2d8c11".parse().unwrap();
/// assert_eq!(id.to_string(), "5f0c2a9e-7d41-4c1b-9a55-0e6f3b2d8c11");
/// assert_ne!(EndpointId::new(), EndpointId::new());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EndpointId(Uuid);

impl EndpointId {
    /// Draws a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for EndpointId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for EndpointId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl FromStr for EndpointId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

// Log lines carry the full id; debug output keeps the first group only.
impl fmt::Debug for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = Uuid::encode_buffer();
        let hyphenated = self.0.hyphenated().encode_lower(&mut buf);
        let head = hyphenated.split('-').next().unwrap_or_default();
        write!(f, "EndpointId({head})")
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}
