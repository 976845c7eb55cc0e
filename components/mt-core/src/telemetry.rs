use heapless::{CapacityError, String};

pub const KEY_SIZE: usize = 32;
pub const VALUE_SIZE: usize = 32;
pub const PAYLOAD_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TelemetryError {
    FormatError,
    CapacityError,
}

impl From<core::fmt::Error> for TelemetryError {
    fn from(_: core::fmt::Error) -> Self {
        TelemetryError::FormatError
    }
}

impl From<CapacityError> for TelemetryError {
    fn from(_: CapacityError) -> Self {
        TelemetryError::CapacityError
    }
}

/// One outbound key/value pair for the IoT hub.
#[derive(Debug, Clone, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TelemetryEvent {
    key: String<KEY_SIZE>,
    value: String<VALUE_SIZE>,
}

impl TelemetryEvent {
    pub fn new(key: &str, value: &str) -> Result<Self, TelemetryError> {
        Ok(Self {
            key: String::try_from(key)?,
            value: String::try_from(value)?,
        })
    }

    /// Boolean-style event, rendered as the strings the hub side expects.
    pub fn flag(key: &str, set: bool) -> Result<Self, TelemetryError> {
        Self::new(key, if set { "True" } else { "False" })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The two-field JSON object the hub consumes. The exact template,
    /// inner spaces included, is part of the wire contract.
    pub fn payload(&self) -> Result<String<PAYLOAD_SIZE>, TelemetryError> {
        let payload = heapless::format!("{{ \"{}\": \"{}\" }}", self.key, self.value)?;
        Ok(payload)
    }
}
