use crate::{
    Channel, ChannelBus, ChannelId, DeviceRegistry, Ds2482, Ds2482Error, Ds2482Model,
    Ds2482Result, RegistryError,
};
use embedded_hal::{
    delay::DelayNs,
    i2c::{ErrorType, I2c, SevenBitAddress},
};
use log::{debug, info, warn};
use onewire_core::{
    BusResetStatus, DeviceIdentifier, FamilyDevice, OneWireDevice, OneWireError,
    OneWireSearchKind,
};
use thiserror::Error;

/// Error that aborted one channel's contribution to discovery or reset.
pub type ChannelError<E> = OneWireError<Ds2482Error<E>>;

/// Channel configuration failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum MasterError {
    /// The bridge model has no such port.
    #[error("channel {channel} is not available on {model:?}")]
    UnsupportedChannel {
        /// Rejected channel.
        channel: ChannelId,
        /// Model of the bridge.
        model: Ds2482Model,
    },
    /// The channel was already added.
    #[error("channel {0} is already registered")]
    DuplicateChannel(ChannelId),
}

/// Outcome of a successful channel discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSummary {
    /// Status of the reset preceding the search.
    pub reset: BusResetStatus,
    /// Devices contributed to the cache.
    pub devices: usize,
    /// Search passes discarded for a bad CRC.
    pub corrupt_passes: usize,
    /// The search ended early on repeated corrupt passes or a silent line; devices may be
    /// missing.
    pub truncated: bool,
}

/// Discovery outcome of one channel.
#[derive(Debug)]
pub struct ChannelReport<E> {
    /// Channel the report is about.
    pub channel: ChannelId,
    /// Summary, or the error that aborted the channel.
    pub outcome: Result<ChannelSummary, ChannelError<E>>,
}

/// Per-channel result of [`BusMaster::reset_bus`].
#[derive(Debug)]
pub struct ResetReport<E> {
    entries: Vec<(ChannelId, Result<BusResetStatus, ChannelError<E>>)>,
}

impl<E> ResetReport<E> {
    /// At least one channel answered with a presence pulse.
    pub fn any_channel_has_devices(&self) -> bool {
        self.entries
            .iter()
            .any(|(_, res)| matches!(res, Ok(status) if status.has_devices()))
    }

    /// Every channel was reset and answered with a presence pulse.
    ///
    /// False when no channel is registered.
    pub fn all_channels_have_devices(&self) -> bool {
        !self.entries.is_empty()
            && self
                .entries
                .iter()
                .all(|(_, res)| matches!(res, Ok(status) if status.has_devices()))
    }

    /// Result for `channel`, if it is registered.
    pub fn status(&self, channel: ChannelId) -> Option<&Result<BusResetStatus, ChannelError<E>>> {
        self.entries
            .iter()
            .find(|(ch, _)| *ch == channel)
            .map(|(_, res)| res)
    }

    /// Results in channel registration order.
    pub fn iter(
        &self,
    ) -> impl Iterator<Item = (ChannelId, &Result<BusResetStatus, ChannelError<E>>)> {
        self.entries.iter().map(|(ch, res)| (*ch, res))
    }
}

/// A device found during discovery, wrapped by the registry.
#[derive(Debug)]
pub struct DiscoveredDevice {
    identifier: DeviceIdentifier,
    channel: ChannelId,
    device: Box<dyn OneWireDevice>,
}

impl DiscoveredDevice {
    /// ROM code of the device.
    pub fn identifier(&self) -> DeviceIdentifier {
        self.identifier
    }

    /// Channel the device was found on.
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// The typed wrapper.
    pub fn device(&self) -> &dyn OneWireDevice {
        self.device.as_ref()
    }

    /// The wrapper as `T`, if it is one.
    pub fn downcast_ref<T: OneWireDevice>(&self) -> Option<&T> {
        self.device.as_any().downcast_ref::<T>()
    }

    /// Whether a registered factory built the wrapper.
    pub fn is_known(&self) -> bool {
        !self.device.as_any().is::<onewire_core::UnknownDevice>()
    }
}

enum DeviceCache<E> {
    Uninitialized,
    Populated {
        devices: Vec<DiscoveredDevice>,
        reports: Vec<ChannelReport<E>>,
    },
}

/// Discovers and caches the devices on the channels of a DS2482.
///
/// Channels are searched in the order they were added. The result is cached until
/// [`reset_bus`](BusMaster::reset_bus) is called; channels added or device types registered
/// after discovery take effect on the next discovery after a reset.
///
/// A channel whose reset or search fails is skipped, with the error kept in its
/// [`ChannelReport`]; the other channels are still discovered. A bus timeout resets the
/// bridge before the next channel is tried.
pub struct BusMaster<I: ErrorType, D> {
    bridge: Ds2482<I, D>,
    registry: DeviceRegistry,
    channels: Vec<Channel>,
    cache: DeviceCache<I::Error>,
}

impl<I: ErrorType, D> BusMaster<I, D> {
    /// A master with no channels yet.
    pub fn new(bridge: Ds2482<I, D>, registry: DeviceRegistry) -> Self {
        Self {
            bridge,
            registry,
            channels: Vec::new(),
            cache: DeviceCache::Uninitialized,
        }
    }

    /// A master searching every channel of the bridge model.
    pub fn with_all_channels(bridge: Ds2482<I, D>, registry: DeviceRegistry) -> Self {
        let channels = bridge.model().channels().iter().copied().map(Channel::new);
        let mut master = Self::new(bridge, registry);
        master.channels.extend(channels);
        master
    }

    /// Register a channel for discovery.
    pub fn add_channel(&mut self, channel: ChannelId) -> Result<(), MasterError> {
        let model = self.bridge.model();
        if !model.supports(channel) {
            return Err(MasterError::UnsupportedChannel { channel, model });
        }
        if self.channels.iter().any(|ch| ch.id() == channel) {
            return Err(MasterError::DuplicateChannel(channel));
        }
        self.channels.push(Channel::new(channel));
        Ok(())
    }

    /// Registered channels with their last reset status.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// Register a wrapper type under its family code.
    pub fn register_device_type<T: FamilyDevice>(&mut self) -> Result<(), RegistryError> {
        self.registry.register_type::<T>()
    }

    /// Register a factory for `family`.
    pub fn register<F>(&mut self, family: u8, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(DeviceIdentifier, ChannelId) -> Box<dyn OneWireDevice> + Send + Sync + 'static,
    {
        self.registry.register(family, factory)
    }

    /// The registry resolving discovered identifiers.
    pub fn registry(&self) -> &DeviceRegistry {
        &self.registry
    }

    /// Whether the cache holds a discovery result.
    pub fn is_initialized(&self) -> bool {
        matches!(self.cache, DeviceCache::Populated { .. })
    }

    /// Per-channel outcome of the cached discovery.
    pub fn channel_reports(&self) -> Option<&[ChannelReport<I::Error>]> {
        match &self.cache {
            DeviceCache::Uninitialized => None,
            DeviceCache::Populated { reports, .. } => Some(reports),
        }
    }

    /// The underlying bridge.
    pub fn bridge(&self) -> &Ds2482<I, D> {
        &self.bridge
    }

    /// Tear the master down, handing back the I2C bus and the timer.
    pub fn release(self) -> (I, D) {
        self.bridge.release()
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> BusMaster<I, D> {
    /// Devices on all channels, in channel order and then search order.
    ///
    /// Searches the bus only when the cache is empty.
    pub fn discover_all(&mut self) -> &[DiscoveredDevice] {
        if !self.is_initialized() {
            let mut devices = Vec::new();
            let mut reports = Vec::with_capacity(self.channels.len());
            for channel in self.channels.iter_mut() {
                let outcome =
                    discover_channel(&mut self.bridge, &self.registry, channel, &mut devices);
                match &outcome {
                    Ok(summary) => info!(
                        "{}: {} device(s), {} corrupt pass(es)",
                        channel.id(),
                        summary.devices,
                        summary.corrupt_passes
                    ),
                    Err(e) => warn!("{}: discovery failed: {e}", channel.id()),
                }
                recover_if_stuck(&mut self.bridge, channel.id(), &outcome);
                reports.push(ChannelReport {
                    channel: channel.id(),
                    outcome,
                });
            }
            self.cache = DeviceCache::Populated { devices, reports };
        }
        match &self.cache {
            DeviceCache::Populated { devices, .. } => devices,
            DeviceCache::Uninitialized => &[],
        }
    }

    /// Discovered devices whose wrapper is a `T`.
    pub fn devices_of_type<T: OneWireDevice>(&mut self) -> Vec<&T> {
        self.discover_all()
            .iter()
            .filter_map(DiscoveredDevice::downcast_ref::<T>)
            .collect()
    }

    /// Drop the cache and issue a 1-Wire reset on every registered channel.
    pub fn reset_bus(&mut self) -> ResetReport<I::Error> {
        self.cache = DeviceCache::Uninitialized;
        let mut entries = Vec::with_capacity(self.channels.len());
        for channel in self.channels.iter_mut() {
            let res = self
                .bridge
                .channel(channel.id())
                .map_err(OneWireError::from)
                .and_then(|mut bus| bus.reset_bus());
            match &res {
                Ok(status) => {
                    debug!("{}: reset {status:?}", channel.id());
                    channel.record_reset(*status);
                }
                Err(e) => warn!("{}: reset failed: {e}", channel.id()),
            }
            recover_if_stuck(&mut self.bridge, channel.id(), &res);
            entries.push((channel.id(), res));
        }
        ResetReport { entries }
    }

    /// Arm the strong pullup on the selected channel.
    pub fn enable_strong_pullup(&mut self) -> Ds2482Result<(), I::Error> {
        self.bridge.enable_strong_pullup()
    }

    /// Select `channel` and hand out its 1-Wire bus, for talking to discovered devices.
    pub fn channel_bus(
        &mut self,
        channel: ChannelId,
    ) -> Ds2482Result<ChannelBus<'_, I, D>, I::Error> {
        self.bridge.channel(channel)
    }
}

// A line stuck busy blocks every channel until the chip is reset.
fn recover_if_stuck<I: I2c<SevenBitAddress>, D: DelayNs, T>(
    bridge: &mut Ds2482<I, D>,
    id: ChannelId,
    res: &Result<T, ChannelError<I::Error>>,
) {
    if !matches!(res, Err(OneWireError::Other(Ds2482Error::BusTimeout))) {
        return;
    }
    match bridge.recover() {
        Ok(_) => info!("{id}: bridge reset after bus timeout"),
        Err(e) => warn!("{id}: bridge recovery failed: {e}"),
    }
}

fn discover_channel<I: I2c<SevenBitAddress>, D: DelayNs>(
    bridge: &mut Ds2482<I, D>,
    registry: &DeviceRegistry,
    channel: &mut Channel,
    out: &mut Vec<DiscoveredDevice>,
) -> Result<ChannelSummary, ChannelError<I::Error>> {
    let id = channel.id();
    let mut bus = bridge.channel(id)?;
    let reset = bus.reset_bus()?;
    channel.record_reset(reset);
    let mut summary = ChannelSummary {
        reset,
        devices: 0,
        corrupt_passes: 0,
        truncated: false,
    };
    match reset {
        BusResetStatus::ShortCircuit => return Err(OneWireError::ShortCircuit),
        BusResetStatus::NoDevicesPresent => return Ok(summary),
        BusResetStatus::DevicesPresent => {}
    }
    let mut found = Vec::new();
    let mut search = bus.search(OneWireSearchKind::Normal);
    while let Some(identifier) = search.next()? {
        if found.iter().any(|d: &DiscoveredDevice| d.identifier == identifier) {
            debug!("{id}: {identifier} reported twice");
            continue;
        }
        debug!("{id}: found {identifier}");
        found.push(DiscoveredDevice {
            identifier,
            channel: id,
            device: registry.resolve(identifier, id),
        });
    }
    summary.corrupt_passes = search.corrupt_passes();
    summary.truncated = search.is_truncated();
    if summary.truncated {
        warn!("{id}: search truncated, devices may be missing");
    }
    summary.devices = found.len();
    out.append(&mut found);
    Ok(summary)
}
