//! Status values reported by the bootloader.

use std::fmt;

/// Raw status byte read from the target.
///
/// Only two values carry meaning during an upload; anything else is a
/// protocol violation wherever a specific status is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct StatusByte(pub u8);

impl StatusByte {
    /// The target is validating the frame it just received.
    pub const CHECKING_CRC: Self = Self(0x02);

    /// The last frame passed its checksum and was committed.
    pub const CRC_OK: Self = Self(0x04);

    /// Raw value.
    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    /// Human-readable name for recognised values.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        match self {
            Self::CHECKING_CRC => Some("checking crc"),
            Self::CRC_OK => Some("crc ok"),
            _ => None,
        }
    }
}

impl From<u8> for StatusByte {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl fmt::Display for StatusByte {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "0x{:02X}: {name}", self.0),
            None => write!(f, "0x{:02X}", self.0),
        }
    }
}

/// Extended status block read once after entering the bootloader.
///
/// Diagnostic only; nothing in the upload depends on these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ExtendedStatus {
    /// Bootloader status.
    pub status: StatusByte,
    /// Bootloader/device identifier.
    pub id: u8,
    /// Bootloader version.
    pub version: u8,
}

impl From<[u8; 3]> for ExtendedStatus {
    fn from(bytes: [u8; 3]) -> Self {
        Self {
            status: StatusByte(bytes[0]),
            id: bytes[1],
            version: bytes[2],
        }
    }
}

impl fmt::Display for ExtendedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "status = {:02x}, id = {:02x}, version = {:02x}",
            self.status.0, self.id, self.version
        )
    }
}
