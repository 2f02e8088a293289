//! Station name: the printable, up-to-63-byte, case-sensitive-on-the-wire
//! identifier used to address a PROFINET device.

use std::fmt;

/// Maximum length of a station name in bytes.
pub const MAX_STATION_NAME_LEN: usize = 63;

/// A validated PROFINET station name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StationName(String);

/// Error returned when a candidate station name fails validation.
#[derive(Debug, thiserror::Error)]
pub enum StationNameError {
    /// Station name exceeds [`MAX_STATION_NAME_LEN`] bytes.
    #[error("station name '{0}' exceeds {MAX_STATION_NAME_LEN} bytes")]
    TooLong(String),
    /// Station name contains a non-printable byte.
    #[error("station name '{0}' contains non-printable characters")]
    NotPrintable(String),
    /// Station name is empty.
    #[error("station name is empty")]
    Empty,
}

impl StationName {
    /// Validate and wrap a candidate station name.
    pub fn new(name: impl Into<String>) -> Result<Self, StationNameError> {
        let name = name.into();
        if name.is_empty() {
            return Err(StationNameError::Empty);
        }
        if name.len() > MAX_STATION_NAME_LEN {
            return Err(StationNameError::TooLong(name));
        }
        if !name.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
            return Err(StationNameError::NotPrintable(name));
        }
        Ok(Self(name))
    }

    /// The name as configured (exact case).
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The `LOWERCASE` name-variation strategy.
    pub fn to_lowercase(&self) -> StationName {
        StationName(self.0.to_lowercase())
    }

    /// The `UPPERCASE` name-variation strategy.
    pub fn to_uppercase(&self) -> StationName {
        StationName(self.0.to_uppercase())
    }

    /// The `NO_DASH` name-variation strategy: dashes removed.
    pub fn without_dashes(&self) -> StationName {
        StationName(self.0.chars().filter(|&c| c != '-').collect())
    }
}

impl TryFrom<String> for StationName {
    type Error = StationNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        StationName::new(value)
    }
}

impl From<StationName> for String {
    fn from(value: StationName) -> Self {
        value.0
    }
}

impl fmt::Display for StationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_variations() {
        let name = StationName::new("RTU-Tank-1").unwrap();
        assert_eq!(name.to_lowercase().as_str(), "rtu-tank-1");
        assert_eq!(name.to_uppercase().as_str(), "RTU-TANK-1");
        assert_eq!(name.without_dashes().as_str(), "RTUTank1");
    }

    #[test]
    fn rejects_too_long() {
        let long = "a".repeat(64);
        assert!(matches!(
            StationName::new(long),
            Err(StationNameError::TooLong(_))
        ));
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(StationName::new(""), Err(StationNameError::Empty)));
    }
}
