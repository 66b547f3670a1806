#![cfg_attr(not(test), no_std)]
#![deny(missing_docs)]
//! # onewire-core
//! A no-std vocabulary for talking to devices on a 1-Wire bus.
//!
//! The [OneWire] trait defines the time-slot level operations a bus master has to provide
//! (reset, bit and byte transfers, and optionally the search triplet). On top of it the crate
//! provides:
//! - [DeviceIdentifier], the 64-bit ROM code carried by every 1-Wire slave,
//! - [OneWireCrc], the Dallas/Maxim CRC-8 that guards identifiers and scratchpads,
//! - [OneWireSearch], the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html)
//!   enumerating every identifier on a shared bus,
//! - [OneWireDevice] and [FamilyDevice], the contract typed device wrappers implement.

mod crc;
mod device;
mod error;
mod identifier;
mod search;
mod traits;

pub use crc::OneWireCrc;
pub use device::{FamilyDevice, OneWireDevice, UnknownDevice};
pub use error::OneWireError;
pub use identifier::{DeviceIdentifier, IdentifierError};
pub use search::{DEFAULT_CORRUPT_RETRIES, OneWireSearch, OneWireSearchKind};
pub use traits::{BusResetStatus, OneWire, OneWireStatus};

/// Error type for 1-Wire operations.
pub type OneWireResult<T, E> = Result<T, OneWireError<E>>;

/// Command to match a specific ROM address in 1-Wire communication (non-overdrive mode)
pub const ONEWIRE_MATCH_ROM_CMD: u8 = 0x55;

/// Command to skip ROM address in 1-Wire communication (non-overdrive mode)
pub const ONEWIRE_SKIP_ROM_CMD: u8 = 0xcc;

/// Command to read the ROM of the single device on the bus
pub const ONEWIRE_READ_ROM_CMD: u8 = 0x33;

/// Command to search for devices on the 1-Wire bus
pub const ONEWIRE_SEARCH_CMD: u8 = 0xf0;

/// Command to search for devices in alarm state on the 1-Wire bus
pub const ONEWIRE_CONDITIONAL_SEARCH_CMD: u8 = 0xec;
