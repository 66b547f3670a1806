use crate::DeviceIdentifier;
use core::{any::Any, fmt::Debug};

/// A device found on a 1-Wire bus, wrapped in a type that knows how to talk to it.
pub trait OneWireDevice: Any + Debug + Send {
    /// ROM code of the device.
    fn identifier(&self) -> DeviceIdentifier;

    /// Upcast used to recover the concrete wrapper type.
    fn as_any(&self) -> &dyn Any;
}

/// A device wrapper bound to one family code.
pub trait FamilyDevice: OneWireDevice + Sized {
    /// Device family code
    const FAMILY_CODE: u8;

    /// Wrap an identifier known to carry [`FAMILY_CODE`](FamilyDevice::FAMILY_CODE).
    fn from_identifier(id: DeviceIdentifier) -> Self;

    /// Wrap an identifier, refusing other families.
    fn try_from_identifier(id: DeviceIdentifier) -> Option<Self> {
        (id.family_code() == Self::FAMILY_CODE).then(|| Self::from_identifier(id))
    }
}

/// Handle for a device whose family code has no registered wrapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownDevice {
    id: DeviceIdentifier,
}

impl UnknownDevice {
    /// Wrap a raw identifier.
    pub fn new(id: DeviceIdentifier) -> Self {
        Self { id }
    }

    /// Family code of the unrecognised device.
    pub fn family_code(&self) -> u8 {
        self.id.family_code()
    }
}

impl OneWireDevice for UnknownDevice {
    fn identifier(&self) -> DeviceIdentifier {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
