use crate::{
    DeviceIdentifier, ONEWIRE_MATCH_ROM_CMD, ONEWIRE_SKIP_ROM_CMD, OneWireError, OneWireResult,
};

/// Outcome of a reset/presence-detect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BusResetStatus {
    /// At least one device answered with a presence pulse.
    DevicesPresent,
    /// Nobody answered.
    NoDevicesPresent,
    /// The line was held low; the bus is shorted.
    ShortCircuit,
}

impl BusResetStatus {
    /// Whether at least one device answered the reset.
    pub fn has_devices(self) -> bool {
        self == Self::DevicesPresent
    }
}

/// Status reported by a bus master after a reset.
pub trait OneWireStatus {
    /// A presence pulse was detected.
    fn presence(&self) -> bool;

    /// A short circuit was detected.
    fn shortcircuit(&self) -> bool;

    /// Current logic level of the line, if the master can sample it.
    fn logic_level(&self) -> Option<bool> {
        None
    }

    /// Direction taken by the last search triplet, if the master reports it.
    fn direction(&self) -> Option<bool> {
        None
    }

    /// Fold presence and short detection into a [`BusResetStatus`].
    fn reset_status(&self) -> BusResetStatus {
        if self.shortcircuit() {
            BusResetStatus::ShortCircuit
        } else if self.presence() {
            BusResetStatus::DevicesPresent
        } else {
            BusResetStatus::NoDevicesPresent
        }
    }
}

/// Trait for 1-Wire communication.
/// This trait defines the basic operations required for 1-Wire communication, such as resetting the bus,
/// writing and reading bytes, and writing and reading bits.
pub trait OneWire {
    /// The status type returned by the reset operation.
    /// This type must implement the [OneWireStatus] trait.
    type Status: OneWireStatus;
    /// The error type returned by the operations of this trait.
    /// This type is used to indicate errors in the underlying hardware or communication.
    type BusError;

    /// Resets the 1-Wire bus and returns the status of the bus.
    ///
    /// An absent presence pulse or a short is reported through the status, not as an error.
    ///
    /// # Errors
    /// This method returns an error if the reset operation fails.
    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError>;

    /// Writes a byte to the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError>;

    /// Reads a byte from the 1-Wire bus.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError>;

    /// Generates a single write time slot.
    ///
    /// # Errors
    /// This method returns an error if the write operation fails.
    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError>;

    /// Generates a read time slot and returns the sampled bit.
    ///
    /// # Errors
    /// This method returns an error if the read operation fails.
    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError>;

    /// ## This method is internally used by the [search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html).
    ///
    /// Generates three time slots: two read time slots and one write time slot. If both read
    /// slots return 0 the written bit is `direction`; otherwise it is the id bit that was read
    /// (a write-one follows two ones).
    ///
    /// # Returns
    /// `(id_bit, complement_bit, direction_taken)`.
    ///
    /// # Errors
    /// [`OneWireError::Unimplemented`] if the master has no triplet primitive; the search then
    /// falls back to [`read_bit`](OneWire::read_bit) and [`write_bit`](OneWire::write_bit).
    fn read_triplet(
        &mut self,
        direction: bool,
    ) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        let _ = direction;
        Err(OneWireError::Unimplemented)
    }

    /// Writes a sequence of bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> OneWireResult<(), Self::BusError> {
        for &b in bytes {
            self.write_byte(b)?;
        }
        Ok(())
    }

    /// Resets the bus and addresses a single device with the Match ROM command.
    ///
    /// # Errors
    /// [`OneWireError::NoDevicePresent`] or [`OneWireError::ShortCircuit`] if the reset
    /// did not find a healthy populated bus.
    fn match_rom(&mut self, id: DeviceIdentifier) -> OneWireResult<(), Self::BusError> {
        self.reset_checked()?;
        self.write_byte(ONEWIRE_MATCH_ROM_CMD)?;
        self.write_bytes(&id.to_le_bytes())
    }

    /// Resets the bus and addresses every device with the Skip ROM command.
    fn skip_rom(&mut self) -> OneWireResult<(), Self::BusError> {
        self.reset_checked()?;
        self.write_byte(ONEWIRE_SKIP_ROM_CMD)
    }

    /// Resets the bus, turning an empty or shorted bus into an error.
    fn reset_checked(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        let status = self.reset()?;
        match status.reset_status() {
            BusResetStatus::DevicesPresent => Ok(status),
            BusResetStatus::NoDevicesPresent => Err(OneWireError::NoDevicePresent),
            BusResetStatus::ShortCircuit => Err(OneWireError::ShortCircuit),
        }
    }
}
