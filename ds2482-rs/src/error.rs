use crate::ChannelId;
use core::fmt::{self, Debug, Display};

#[derive(Debug)]
/// DS2482 Hardware Errors
pub enum Ds2482Error<E> {
    /// I2C transport errors.
    Transport(E),
    /// Busy wait retries exceeded.
    BusTimeout,
    /// The bridge model has no such 1-Wire channel.
    UnsupportedChannel(ChannelId),
    /// The channel selection register did not read back the requested channel.
    ChannelNotSelected(ChannelId),
}

impl<E> From<E> for Ds2482Error<E> {
    fn from(value: E) -> Self {
        Self::Transport(value)
    }
}

impl<E: Debug> Display for Ds2482Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "I2C transport error: {e:?}"),
            Self::BusTimeout => f.write_str("1-Wire busy wait retries exceeded"),
            Self::UnsupportedChannel(ch) => write!(f, "channel {ch} not available on this bridge"),
            Self::ChannelNotSelected(ch) => write!(f, "channel {ch} selection did not read back"),
        }
    }
}

impl<E: Debug> core::error::Error for Ds2482Error<E> {}
