#![deny(missing_docs)]

/*! # DS2482
 *
 * Driver for the DS2482-100 and DS2482-800 I2C to 1-Wire bridges.
 *
 * [`Ds2482`] speaks the bridge's command set over any [`embedded_hal::i2c::I2c`] bus and
 * implements [`OneWire`] on whichever channel is selected. [`Ds2482::channel`] selects a channel
 * and hands out a [`ChannelBus`] that runs the ROM search. [`BusMaster`] discovers the devices on
 * all registered channels, wraps each one through a [`DeviceRegistry`] keyed by family code, and
 * caches the result until [`BusMaster::reset_bus`].
 *
 * The bridge owns the I2C bus it is built with. Build it from `&mut i2c` to keep using the bus
 * afterwards, or take it back with [`Ds2482::release`] / [`BusMaster::release`].
 *
 * ```no_run
 * use ds2482::{BusMaster, DeviceRegistry, Ds2482Builder, Ds2482Model, Ds18b20};
 * # fn run<I: embedded_hal::i2c::I2c, D: embedded_hal::delay::DelayNs>(i2c: I, delay: D) {
 * let bridge = Ds2482Builder::default()
 *     .with_model(Ds2482Model::EightChannel)
 *     .build(i2c, delay)
 *     .unwrap();
 * let mut master = BusMaster::with_all_channels(bridge, DeviceRegistry::with_defaults());
 * for sensor in master.devices_of_type::<Ds18b20>() {
 *     println!("{sensor:?}");
 * }
 * # }
 * ```
 */

pub use ds18x20::{Ds18b20, Ds18s20, ReadoutResolution, Temperature};
pub use onewire_core::{
    BusResetStatus, DeviceIdentifier, FamilyDevice, OneWire, OneWireDevice, OneWireError,
    OneWireResult, OneWireSearch, OneWireSearchKind, OneWireStatus, UnknownDevice,
};

mod channel;
mod error;
mod master;
mod onewire;
mod registers;
mod registry;
mod shared;
mod traits;

pub use channel::{Channel, ChannelBus, ChannelId};
pub use error::Ds2482Error;
pub use master::{
    BusMaster, ChannelError, ChannelReport, ChannelSummary, DiscoveredDevice, MasterError,
    ResetReport,
};
pub use registers::{
    ChannelSelection, DEFAULT_ADDRESS, DeviceConfiguration, DeviceStatus, Ds2482, Ds2482Builder,
    Ds2482Model,
};
pub use registry::{DeviceFactory, DeviceRegistry, RegistryError};
pub use shared::SharedBusMaster;
pub use traits::{Addressing, Interact};

/// Results of DS2482-specific function calls.
pub type Ds2482Result<T, E> = Result<T, Ds2482Error<E>>;
