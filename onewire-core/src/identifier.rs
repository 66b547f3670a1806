use crate::OneWireCrc;
use core::fmt::{self, Display, Formatter, LowerHex};

/// The 64-bit ROM code of a 1-Wire device.
///
/// | Bit | Description |
/// |-----|-------------|
/// | 0-7 | Family code (e.g., 0x28 for DS18B20) |
/// | 8-55 | Serial number, least significant byte first |
/// | 56-63 | CRC-8 of bits 0-55 |
///
/// The byte order matches the order in which bytes travel on the bus, so
/// [`to_le_bytes`](DeviceIdentifier::to_le_bytes) yields the sequence written after a Match ROM command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct DeviceIdentifier(u64);

/// Reasons a raw ROM code is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierError {
    /// The checksum byte does not match the CRC-8 of the lower 56 bits.
    InvalidCrc {
        /// CRC-8 computed over the lower 56 bits.
        expected: u8,
        /// Checksum byte found in the ROM code.
        found: u8,
    },
    /// All bits are zero, which is what a bus stuck low reads back.
    Zero,
}

impl Display for IdentifierError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCrc { expected, found } => {
                write!(f, "identifier CRC {found:#04x} does not match computed {expected:#04x}")
            }
            Self::Zero => f.write_str("identifier is all zeros"),
        }
    }
}

impl core::error::Error for IdentifierError {}

impl DeviceIdentifier {
    /// The length of a device identifier in bits.
    pub const BITS: u8 = 64;

    /// Wrap a raw ROM code without checking its CRC.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Build an identifier from a family code and serial number, computing the CRC byte.
    pub fn from_parts(family: u8, serial: [u8; 6]) -> Self {
        let mut bytes = [0; 8];
        bytes[0] = family;
        bytes[1..7].copy_from_slice(&serial);
        bytes[7] = OneWireCrc::checksum(&bytes[..7]);
        Self::from_le_bytes(bytes)
    }

    /// Build an identifier from the bytes in bus order.
    pub const fn from_le_bytes(bytes: [u8; 8]) -> Self {
        Self(u64::from_le_bytes(bytes))
    }

    /// Bytes in bus order: family code first, CRC last.
    pub const fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// The raw 64-bit value.
    pub const fn raw(self) -> u64 {
        self.0
    }

    /// Family code, the device type.
    pub const fn family_code(self) -> u8 {
        self.0 as u8
    }

    /// 48-bit serial number, least significant byte first.
    pub fn serial(self) -> [u8; 6] {
        let bytes = self.to_le_bytes();
        let mut serial = [0; 6];
        serial.copy_from_slice(&bytes[1..7]);
        serial
    }

    /// The CRC byte stored in the identifier.
    pub const fn checksum(self) -> u8 {
        (self.0 >> 56) as u8
    }

    /// Value of bit `n` (0 = least significant bit of the family code). `n` wraps modulo 64.
    pub const fn bit(self, n: u8) -> bool {
        self.0 >> (n & 63) & 1 == 1
    }

    /// Check the CRC byte and reject the all-zero code.
    pub fn validate(self) -> Result<Self, IdentifierError> {
        if self.0 == 0 {
            return Err(IdentifierError::Zero);
        }
        let expected = OneWireCrc::checksum(&self.to_le_bytes()[..7]);
        if expected != self.checksum() {
            return Err(IdentifierError::InvalidCrc {
                expected,
                found: self.checksum(),
            });
        }
        Ok(self)
    }

    /// Whether [`validate`](DeviceIdentifier::validate) accepts this identifier.
    pub fn is_valid(self) -> bool {
        self.validate().is_ok()
    }
}

impl TryFrom<u64> for DeviceIdentifier {
    type Error = IdentifierError;

    fn try_from(raw: u64) -> Result<Self, Self::Error> {
        Self(raw).validate()
    }
}

impl From<DeviceIdentifier> for u64 {
    fn from(id: DeviceIdentifier) -> u64 {
        id.0
    }
}

/// Formats as `ff-ssssssssssss`, the family code followed by the serial number
/// most significant byte first.
impl Display for DeviceIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}-", self.family_code())?;
        for b in self.serial().iter().rev() {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl LowerHex for DeviceIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        LowerHex::fmt(&self.0, f)
    }
}
