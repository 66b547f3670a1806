use crate::{
    CONVERT_T, COPY_SCRATCH, RECALL_EEPROM, Temperature, WRITE_SCRATCH, is_parasite_powered,
    read_scratchpad,
};
use core::any::Any;
use embedded_hal::delay::DelayNs;
use onewire_core::{DeviceIdentifier, FamilyDevice, OneWire, OneWireDevice, OneWireResult};

/// DS18B20 programmable-resolution digital thermometer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ds18b20 {
    id: DeviceIdentifier,
    resolution: ReadoutResolution,
}

impl Ds18b20 {
    /// Resolution assumed for conversion timing.
    pub fn resolution(&self) -> ReadoutResolution {
        self.resolution
    }

    /// Start a temperature conversion on this device.
    ///
    /// Parasite-powered devices need the strong pullup enabled before this call.
    pub fn start_conversion<O: OneWire>(&self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.match_rom(self.id)?;
        bus.write_byte(CONVERT_T)
    }

    /// Read the last converted temperature.
    pub fn read_temperature<O: OneWire>(
        &self,
        bus: &mut O,
    ) -> OneWireResult<Temperature, O::BusError> {
        let buf = read_scratchpad(bus, self.id)?;
        Ok(Temperature::from_le_bytes([buf[0], buf[1]]))
    }

    /// Convert, wait the conversion time for the current resolution, then read.
    pub fn convert_and_read<O: OneWire, D: DelayNs>(
        &self,
        bus: &mut O,
        delay: &mut D,
    ) -> OneWireResult<Temperature, O::BusError> {
        self.start_conversion(bus)?;
        delay.delay_us(self.resolution.delay_us());
        self.read_temperature(bus)
    }

    /// Write the alarm thresholds and resolution to the scratchpad.
    pub fn configure<O: OneWire>(
        &mut self,
        bus: &mut O,
        t_high: i8,
        t_low: i8,
        resolution: ReadoutResolution,
    ) -> OneWireResult<(), O::BusError> {
        bus.match_rom(self.id)?;
        bus.write_byte(WRITE_SCRATCH)?;
        bus.write_bytes(&[t_high as u8, t_low as u8, resolution as u8])?;
        self.resolution = resolution;
        Ok(())
    }

    /// Copy the scratchpad configuration to EEPROM.
    pub fn persist<O: OneWire>(&self, bus: &mut O) -> OneWireResult<(), O::BusError> {
        bus.match_rom(self.id)?;
        bus.write_byte(COPY_SCRATCH)
    }

    /// Reload thresholds and resolution from EEPROM, returning the stored resolution.
    pub fn recall<O: OneWire>(
        &mut self,
        bus: &mut O,
    ) -> OneWireResult<ReadoutResolution, O::BusError> {
        bus.match_rom(self.id)?;
        bus.write_byte(RECALL_EEPROM)?;
        let buf = read_scratchpad(bus, self.id)?;
        if let Ok(res) = ReadoutResolution::try_from(buf[4]) {
            self.resolution = res;
        }
        Ok(self.resolution)
    }

    /// Whether the device draws power from the data line.
    pub fn is_parasite_powered<O: OneWire>(
        &self,
        bus: &mut O,
    ) -> OneWireResult<bool, O::BusError> {
        is_parasite_powered(bus, self.id)
    }
}

impl OneWireDevice for Ds18b20 {
    fn identifier(&self) -> DeviceIdentifier {
        self.id
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl FamilyDevice for Ds18b20 {
    const FAMILY_CODE: u8 = 0x28;

    fn from_identifier(id: DeviceIdentifier) -> Self {
        Self {
            id,
            resolution: ReadoutResolution::default(),
        }
    }
}

#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
/// Conversion resolution, encoded as the configuration register value.
pub enum ReadoutResolution {
    /// 0.5 °C
    Resolution9bit = 0x1f,
    /// 0.25 °C
    Resolution10bit = 0x3f,
    /// 0.125 °C
    Resolution11bit = 0x5f,
    /// 0.0625 °C
    #[default]
    Resolution12bit = 0x7f,
}

impl ReadoutResolution {
    /// Maximum conversion time in microseconds.
    pub fn delay_us(&self) -> u32 {
        use ReadoutResolution::*;
        match self {
            Resolution9bit => 93750,
            Resolution10bit => 187500,
            Resolution11bit => 375000,
            Resolution12bit => 750000,
        }
    }
}

impl TryFrom<u8> for ReadoutResolution {
    type Error = &'static str;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use ReadoutResolution::*;
        match value {
            0x1f => Ok(Resolution9bit),
            0x3f => Ok(Resolution10bit),
            0x5f => Ok(Resolution11bit),
            0x7f => Ok(Resolution12bit),
            _ => Err("Invalid readout resolution"),
        }
    }
}
