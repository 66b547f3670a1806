#![cfg_attr(not(test), no_std)]
//! Wrappers for the DS18S20 (family 0x10) and DS18B20 (family 0x28) 1-Wire thermometers.
//!
//! Both wrappers only hold the device identifier; every operation takes the bus it should
//! run on, so they work over any [`OneWire`] implementation.

mod ds18b20;
mod ds18s20;

pub use ds18b20::{Ds18b20, ReadoutResolution};
pub use ds18s20::Ds18s20;

use onewire_core::{DeviceIdentifier, OneWire, OneWireCrc, OneWireError, OneWireResult};

/// Temperature in degrees Celsius, 1/16 °C resolution.
pub type Temperature = fixed::types::I12F4;

pub(crate) const CONVERT_T: u8 = 0x44;
pub(crate) const WRITE_SCRATCH: u8 = 0x4e;
pub(crate) const READ_SCRATCH: u8 = 0xbe;
pub(crate) const COPY_SCRATCH: u8 = 0x48;
pub(crate) const RECALL_EEPROM: u8 = 0xb8;
pub(crate) const READ_POWER_SUPPLY: u8 = 0xb4;

/// Reads the 9-byte scratchpad of `id` and checks its CRC.
pub(crate) fn read_scratchpad<O: OneWire>(
    bus: &mut O,
    id: DeviceIdentifier,
) -> OneWireResult<[u8; 9], O::BusError> {
    bus.match_rom(id)?;
    bus.write_byte(READ_SCRATCH)?;
    let mut buf = [0; 9];
    for b in buf.iter_mut() {
        *b = bus.read_byte()?;
    }
    if OneWireCrc::validate(&buf) {
        Ok(buf)
    } else {
        Err(OneWireError::InvalidCrc)
    }
}

/// Parasite-powered devices pull the read slot low after Read Power Supply.
pub(crate) fn is_parasite_powered<O: OneWire>(
    bus: &mut O,
    id: DeviceIdentifier,
) -> OneWireResult<bool, O::BusError> {
    bus.match_rom(id)?;
    bus.write_byte(READ_POWER_SUPPLY)?;
    Ok(!bus.read_bit()?)
}
