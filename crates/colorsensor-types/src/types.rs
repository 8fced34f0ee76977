//! Core types for color sensor data.

use core::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// A single color reading as pushed by the sensor.
///
/// The payload is exactly three bytes in R, G, B order. A `ColorValue` can only
/// be built from a payload of that size, so every instance is well formed.
///
/// # Examples
///
/// ```
/// use colorsensor_types::ColorValue;
///
/// let value = ColorValue::decode(&[0x00, 0xFF, 0x10]).unwrap();
/// assert_eq!(value.rgb(), 0x00FF10);
/// assert_eq!(value.hex_string(), "00FF10");
///
/// assert!(ColorValue::decode(&[0x01, 0x02]).is_none());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "Vec<u8>", into = "Vec<u8>"))]
pub struct ColorValue {
    bytes: [u8; ColorValue::SIZE],
}

impl ColorValue {
    /// Size of the reading payload in bytes.
    pub const SIZE: usize = 3;

    /// Build a value from its three channels.
    #[must_use]
    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self {
            bytes: [red, green, blue],
        }
    }

    /// Parse a reading from raw characteristic bytes.
    ///
    /// Fails unless `data` is exactly [`ColorValue::SIZE`] bytes long.
    pub fn from_bytes(data: &[u8]) -> ParseResult<Self> {
        let bytes: [u8; Self::SIZE] = data.try_into().map_err(|_| ParseError::InvalidLength {
            expected: Self::SIZE,
            actual: data.len(),
        })?;
        Ok(Self { bytes })
    }

    /// Decode a reading, returning `None` for malformed payloads.
    #[must_use]
    pub fn decode(data: &[u8]) -> Option<Self> {
        Self::from_bytes(data).ok()
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.bytes
    }

    #[must_use]
    pub fn red(&self) -> u8 {
        self.bytes[0]
    }

    #[must_use]
    pub fn green(&self) -> u8 {
        self.bytes[1]
    }

    #[must_use]
    pub fn blue(&self) -> u8 {
        self.bytes[2]
    }

    /// Packed `0xRRGGBB` integer.
    #[must_use]
    pub fn rgb(&self) -> u32 {
        (u32::from(self.red()) << 16) | (u32::from(self.green()) << 8) | u32::from(self.blue())
    }

    /// Six uppercase hex digits, without any prefix.
    ///
    /// Adding a `#` or other decoration is left to the presentation layer.
    #[must_use]
    pub fn hex_string(&self) -> String {
        format!("{:06X}", self.rgb())
    }
}

impl fmt::Display for ColorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06X}", self.rgb())
    }
}

impl<'a> TryFrom<&'a [u8]> for ColorValue {
    type Error = ParseError;

    fn try_from(data: &'a [u8]) -> ParseResult<Self> {
        Self::from_bytes(data)
    }
}

impl TryFrom<Vec<u8>> for ColorValue {
    type Error = ParseError;

    fn try_from(data: Vec<u8>) -> ParseResult<Self> {
        Self::from_bytes(&data)
    }
}

impl From<ColorValue> for Vec<u8> {
    fn from(value: ColorValue) -> Self {
        value.bytes.to_vec()
    }
}

impl From<[u8; ColorValue::SIZE]> for ColorValue {
    fn from(bytes: [u8; ColorValue::SIZE]) -> Self {
        Self { bytes }
    }
}
