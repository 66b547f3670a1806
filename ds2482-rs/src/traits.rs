use crate::{Ds2482, Ds2482Result};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};

/// Addresses of registers in the DS2482.
pub trait Addressing {
    /// Command byte that writes the register.
    const WRITE_CMD: u8;
    /// Read pointer code that selects the register for reading.
    const READ_PTR: u8;
}

/// Trait for interacting with the DS2482 registers.
pub trait Interact: Addressing {
    /// Read the register value from the DS2482.
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error>;
    /// Write the register value to the DS2482.
    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error>;
}
