//! Node addressing
//!
//! Addresses are 4 bytes on the wire and displayed in dotted-quad form.
//! Two values are reserved: [`NodeAddress::ANY`] marks "no previous hop"
//! (a locally originated packet) and [`NodeAddress::BROADCAST`] addresses
//! every one-hop neighbor.

use std::fmt::{self, Display};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AddressError;

/// A 4-byte network address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeAddress(pub u32);

impl NodeAddress {
    /// The unspecified address (0.0.0.0)
    pub const ANY: Self = Self(0);

    /// The limited broadcast address (255.255.255.255)
    pub const BROADCAST: Self = Self(u32::MAX);

    /// Size of an address on the wire
    pub const WIRE_LEN: usize = 4;

    /// Build an address from its four octets
    pub const fn from_octets(a: u8, b: u8, c: u8, d: u8) -> Self {
        Self(u32::from_be_bytes([a, b, c, d]))
    }

    /// The four octets, most significant first
    pub fn octets(&self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Get the raw numeric value
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    pub fn is_any(&self) -> bool {
        *self == Self::ANY
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl From<u32> for NodeAddress {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl Display for NodeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.octets();
        write!(f, "{}.{}.{}.{}", a, b, c, d)
    }
}

impl FromStr for NodeAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut octets = [0u8; 4];
        let mut parts = s.split('.');

        for octet in octets.iter_mut() {
            let part = parts
                .next()
                .ok_or_else(|| AddressError::Parse(s.to_string()))?;
            *octet = part
                .parse::<u8>()
                .map_err(|_| AddressError::Parse(s.to_string()))?;
        }

        if parts.next().is_some() {
            return Err(AddressError::Parse(s.to_string()));
        }

        let [a, b, c, d] = octets;
        Ok(Self::from_octets(a, b, c, d))
    }
}
