use crate::{
    Ds2482, Ds2482Error,
    registers::{DeviceStatus, READ_DATA_PTR, READ_PTR_CMD},
};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use onewire_core::{OneWire, OneWireError, OneWireResult};

pub(crate) const ONEWIRE_RESET_CMD: u8 = 0xb4;
pub(crate) const ONEWIRE_WRITE_BYTE: u8 = 0xa5;
pub(crate) const ONEWIRE_READ_BYTE: u8 = 0x96;
pub(crate) const ONEWIRE_SINGLE_BIT: u8 = 0x87;
#[cfg(feature = "triplet-read")]
pub(crate) const ONEWIRE_TRIPLET: u8 = 0x78;

/// 1-Wire operations on whichever channel is currently selected.
impl<I2C: I2c<SevenBitAddress>, D: DelayNs> OneWire for Ds2482<I2C, D> {
    type Status = DeviceStatus;

    type BusError = Ds2482Error<I2C::Error>;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        if !self.configured {
            return Err(OneWireError::BusUninitialized);
        }
        self.onewire_wait()?;
        self.i2c
            .write(self.addr, &[ONEWIRE_RESET_CMD])
            .map_err(Ds2482Error::from)?;
        Ok(self.onewire_wait()?)
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        if !self.configured {
            return Err(OneWireError::BusUninitialized);
        }
        self.onewire_wait()?;
        self.i2c
            .write(self.addr, &[ONEWIRE_WRITE_BYTE, byte])
            .map_err(Ds2482Error::from)?;
        Ok(())
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        if !self.configured {
            return Err(OneWireError::BusUninitialized);
        }
        self.onewire_wait()?;
        self.i2c
            .write(self.addr, &[ONEWIRE_READ_BYTE])
            .map_err(Ds2482Error::from)?;
        self.onewire_wait()?;
        let mut val = [0; 1];
        self.i2c
            .write_read(self.addr, &[READ_PTR_CMD, READ_DATA_PTR], &mut val)
            .map_err(Ds2482Error::from)?;
        Ok(val[0])
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        if !self.configured {
            return Err(OneWireError::BusUninitialized);
        }
        self.onewire_wait()?;
        self.i2c
            .write(
                self.addr,
                &[ONEWIRE_SINGLE_BIT, { if bit { 0x80 } else { 0x0 } }],
            )
            .map_err(Ds2482Error::from)?;
        Ok(())
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        // a read slot is a write-one slot sampled by the master
        self.write_bit(true)?;
        Ok(self.onewire_wait()?.single_bit_result())
    }

    #[cfg(feature = "triplet-read")]
    fn read_triplet(
        &mut self,
        direction: bool,
    ) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        if !self.configured {
            return Err(OneWireError::BusUninitialized);
        }
        self.onewire_wait()?;
        self.i2c
            .write(
                self.addr,
                &[ONEWIRE_TRIPLET, { if direction { 0x80 } else { 0x0 } }],
            )
            .map_err(Ds2482Error::from)?;
        let status = self.onewire_wait()?;
        Ok((
            status.single_bit_result(),
            status.triplet_second_bit(),
            status.branch_dir_taken(),
        ))
    }
}
