use core::fmt::{self, Debug, Display};

/// One wire communication error type.
#[derive(Debug)]
pub enum OneWireError<E> {
    /// Encapsulates the error type from the underlying hardware.
    Other(E),
    /// Indicates that no device answered the reset pulse when one was required.
    NoDevicePresent,
    /// Indicates that a short circuit was detected on the bus.
    ShortCircuit,
    /// The bus master has not been configured since its last reset.
    BusUninitialized,
    /// Indicates that the operation is not implemented, such as reading a triplet when not supported.
    Unimplemented,
    /// Data read back from a device failed its CRC-8 check.
    InvalidCrc,
}

impl<E> From<E> for OneWireError<E> {
    fn from(other: E) -> Self {
        Self::Other(other)
    }
}

impl<E: Debug> Display for OneWireError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(e) => write!(f, "bus master error: {e:?}"),
            Self::NoDevicePresent => f.write_str("no device present on the 1-Wire bus"),
            Self::ShortCircuit => f.write_str("short circuit detected on the 1-Wire bus"),
            Self::BusUninitialized => f.write_str("bus master not configured"),
            Self::Unimplemented => f.write_str("operation not implemented by the bus master"),
            Self::InvalidCrc => f.write_str("CRC-8 mismatch"),
        }
    }
}

impl<E: Debug> core::error::Error for OneWireError<E> {}
