use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const CANONICAL_SEPARATOR: char = ':';
const BUS_SEPARATOR: char = '-';

#[derive(Error, Debug, PartialEq)]
#[error("invalid device address: {0:?}")]
pub struct InvalidAddress(pub String);

/// Hardware address of one sensor, stored in canonical `AA:BB:CC:DD:EE:FF` form.
///
/// On the bus the `:` separator collides with topic key/value syntax, so the
/// address travels in "bus form" (`AA-BB-CC-DD-EE-FF`). Conversion between the
/// two is a plain character substitution.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceAddress(String);

impl DeviceAddress {
    pub fn from_bus_form(addr: &str) -> Result<DeviceAddress, InvalidAddress> {
        to_canonical_form(addr).parse()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn bus_form(&self) -> String {
        to_bus_form(&self.0)
    }
}

pub fn to_bus_form(addr: &str) -> String {
    addr.replace(CANONICAL_SEPARATOR, &BUS_SEPARATOR.to_string())
}

pub fn to_canonical_form(addr: &str) -> String {
    addr.replace(BUS_SEPARATOR, &CANONICAL_SEPARATOR.to_string())
}

impl FromStr for DeviceAddress {
    type Err = InvalidAddress;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<&str> = s.split(CANONICAL_SEPARATOR).collect();
        let valid = octets.len() == 6
            && octets
                .iter()
                .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));

        if valid {
            Ok(DeviceAddress(s.to_string()))
        } else {
            Err(InvalidAddress(s.to_string()))
        }
    }
}

impl TryFrom<String> for DeviceAddress {
    type Error = InvalidAddress;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DeviceAddress> for String {
    fn from(addr: DeviceAddress) -> Self {
        addr.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
