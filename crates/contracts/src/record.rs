//! Record - one timestamped parameter reading
//!
//! Produced by the controller on every observed value change and consumed by
//! every registered sink independently.

use std::fmt;
use std::net::SocketAddr;

use serde::Serialize;

use crate::ContractError;

/// Parameter address (IEC object id)
pub type Address = u32;

/// Identity of a connected broadcast client: its remote (host, port)
pub type ClientKey = SocketAddr;

/// Immutable parameter reading
///
/// The value is kept in its lower-cased string form, exactly as it travels on
/// the wire. Values must not contain `{` or `}`: frames are delimited by braces
/// and a brace inside the payload would end the frame early.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Record {
    address: Address,
    value: String,
    timestamp: i64,
}

impl Record {
    /// Create a record, lower-casing the value
    ///
    /// # Errors
    /// Returns `InvalidValue` when the value contains a brace character.
    pub fn new(
        address: Address,
        value: impl AsRef<str>,
        timestamp: i64,
    ) -> Result<Self, ContractError> {
        let value = value.as_ref();
        if value.contains(['{', '}']) {
            return Err(ContractError::invalid_value(
                value,
                "brace characters are reserved as frame delimiters",
            ));
        }

        Ok(Self {
            address,
            value: value.to_lowercase(),
            timestamp,
        })
    }

    /// Create a record stamped with the current epoch second
    pub fn now(address: Address, value: impl AsRef<str>) -> Result<Self, ContractError> {
        Self::new(address, value, chrono::Utc::now().timestamp())
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "iec={} value={} ts={}", self.address, self.value, self.timestamp)
    }
}
