use crate::{CONVERT_T, Temperature, is_parasite_powered, read_scratchpad};
use core::any::Any;
use embedded_hal::delay::DelayNs;
use onewire_core::{DeviceIdentifier, FamilyDevice, OneWire, OneWireDevice, OneWireResult};

const CONVERSION_US: u32 = 750000;

/// DS18S20 high-precision digital thermometer (and the DS1820 it replaces).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds18s20 {
    id: DeviceIdentifier,
}

impl Ds18s20 {
    /// Start a temperature conversion on this device.
    ///
    /// Parasite-powered devices need the strong pullup enabled before this call.
    pub fn start_conversion<O: OneWire>(&self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.match_rom(self.id)?;
        bus.write_byte(CONVERT_T)
    }

    /// Read the last converted temperature, using the count registers to
    /// go below the native 0.5 °C step.
    pub fn read_temperature<O: OneWire>(
        &self,
        bus: &mut O,
    ) -> OneWireResult<Temperature, O::BusError> {
        let buf = read_scratchpad(bus, self.id)?;
        Ok(extended_temperature(
            i16::from_le_bytes([buf[0], buf[1]]),
            buf[6],
            buf[7],
        ))
    }

    /// Convert, wait the 750 ms conversion time, then read.
    pub fn convert_and_read<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
    ) -> OneWireResult<Temperature, O::BusError> {
        self.start_conversion(bus)?;
        delay.delay_us(CONVERSION_US);
        self.read_temperature(bus)
    }

    /// Whether the device draws power from the data line.
    pub fn is_parasite_powered<O: OneWire>(
        &self,
        bus: &mut O,
    ) -> OneWireResult<bool, O::BusError> {
        is_parasite_powered(bus, self.id)
    }
}

// TEMP_READ - 0.25 + (COUNT_PER_C - COUNT_REMAIN) / COUNT_PER_C, in 1/16 °C
fn extended_temperature(raw: i16, count_remain: u8, count_per_c: u8) -> Temperature {
    if count_per_c == 0 || count_remain > count_per_c {
        return Temperature::from_bits(raw.saturating_mul(8));
    }
    let whole = (i32::from(raw) >> 1) * 16;
    let frac = (i32::from(count_per_c) - i32::from(count_remain)) * 16 / i32::from(count_per_c);
    let bits = (whole - 4 + frac).clamp(i32::from(i16::MIN), i32::from(i16::MAX));
    Temperature::from_bits(bits as i16)
}

impl OneWireDevice for Ds18s20 {
    fn identifier(&self) -> DeviceIdentifier {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FamilyDevice for Ds18s20 {
    const FAMILY_CODE: u8 = 0x10;

    fn from_identifier(id: DeviceIdentifier) -> Self {
        Self { id }
    }
}
