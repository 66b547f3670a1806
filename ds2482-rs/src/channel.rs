use crate::{Ds2482, Ds2482Error};
use core::fmt::{self, Display};
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use onewire_core::{
    BusResetStatus, OneWire, OneWireResult, OneWireSearch, OneWireSearchKind, OneWireStatus,
};

const SELECT_CODES: [u8; 8] = [0xf0, 0xe1, 0xd2, 0xc3, 0xb4, 0xa5, 0x96, 0x87];
const READBACK_CODES: [u8; 8] = [0xb8, 0xb1, 0xaa, 0xa3, 0x9c, 0x95, 0x8e, 0x87];

/// One of the 1-Wire ports (IO0 to IO7) of the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChannelId {
    /// IO0, the only port of the DS2482-100.
    Ch0,
    /// IO1
    Ch1,
    /// IO2
    Ch2,
    /// IO3
    Ch3,
    /// IO4
    Ch4,
    /// IO5
    Ch5,
    /// IO6
    Ch6,
    /// IO7
    Ch7,
}

impl ChannelId {
    /// All channels in port order.
    pub const ALL: [ChannelId; 8] = [
        Self::Ch0,
        Self::Ch1,
        Self::Ch2,
        Self::Ch3,
        Self::Ch4,
        Self::Ch5,
        Self::Ch6,
        Self::Ch7,
    ];

    /// Port number.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Channel for a port number.
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parameter byte of the Channel Select command.
    pub fn select_code(self) -> u8 {
        SELECT_CODES[self.index()]
    }

    /// Value of the channel selection register once this channel is selected.
    pub fn readback_code(self) -> u8 {
        READBACK_CODES[self.index()]
    }

    /// Channel reported by a channel selection register value.
    pub fn from_readback_code(code: u8) -> Option<Self> {
        READBACK_CODES
            .iter()
            .position(|&c| c == code)
            .and_then(Self::from_index)
    }
}

impl Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IO{}", self.index())
    }
}

/// A 1-Wire segment registered for discovery, with the outcome of its last reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Channel {
    id: ChannelId,
    last_reset: Option<BusResetStatus>,
}

impl Channel {
    /// A channel that has not been reset yet.
    pub fn new(id: ChannelId) -> Self {
        Self {
            id,
            last_reset: None,
        }
    }

    /// Port of the channel.
    pub fn id(&self) -> ChannelId {
        self.id
    }

    /// Status of the last successful reset, if any.
    pub fn last_reset(&self) -> Option<BusResetStatus> {
        self.last_reset
    }

    pub(crate) fn record_reset(&mut self, status: BusResetStatus) {
        self.last_reset = Some(status);
    }
}

/// A [`OneWire`] bus on one selected channel of the bridge.
///
/// Obtained from [`Ds2482::channel`], which selects the channel and checks the selection.
pub struct ChannelBus<'a, I, D> {
    bridge: &'a mut Ds2482<I, D>,
    channel: ChannelId,
}

impl<'a, I, D> ChannelBus<'a, I, D> {
    pub(crate) fn new(bridge: &'a mut Ds2482<I, D>, channel: ChannelId) -> Self {
        Self { bridge, channel }
    }

    /// Channel this bus talks on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> ChannelBus<'_, I, D> {
    /// Issue a reset pulse on this channel.
    pub fn reset_bus(&mut self) -> OneWireResult<BusResetStatus, Ds2482Error<I::Error>> {
        Ok(self.reset()?.reset_status())
    }

    /// Start a new ROM search on this channel.
    pub fn search(&mut self, kind: OneWireSearchKind) -> OneWireSearch<'_, Self> {
        OneWireSearch::new(self, kind)
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> OneWire for ChannelBus<'_, I, D> {
    type Status = <Ds2482<I, D> as OneWire>::Status;

    type BusError = <Ds2482<I, D> as OneWire>::BusError;

    fn reset(&mut self) -> OneWireResult<Self::Status, Self::BusError> {
        self.bridge.reset()
    }

    fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Self::BusError> {
        self.bridge.write_byte(byte)
    }

    fn read_byte(&mut self) -> OneWireResult<u8, Self::BusError> {
        self.bridge.read_byte()
    }

    fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Self::BusError> {
        self.bridge.write_bit(bit)
    }

    fn read_bit(&mut self) -> OneWireResult<bool, Self::BusError> {
        self.bridge.read_bit()
    }

    fn read_triplet(
        &mut self,
        direction: bool,
    ) -> OneWireResult<(bool, bool, bool), Self::BusError> {
        self.bridge.read_triplet(direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        for ch in ChannelId::ALL {
            assert_eq!(ChannelId::from_readback_code(ch.readback_code()), Some(ch));
        }
        assert_eq!(ChannelId::Ch3.select_code(), 0xc3);
        assert_eq!(ChannelId::Ch7.readback_code(), 0x87);
        assert_eq!(ChannelId::from_readback_code(0x00), None);
        assert_eq!(ChannelId::Ch5.to_string(), "IO5");
    }
}
