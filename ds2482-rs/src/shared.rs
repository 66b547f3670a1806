use crate::{BusMaster, ChannelId, Ds2482Result, ResetReport};
use embedded_hal::{
    delay::DelayNs,
    i2c::{ErrorType, I2c, SevenBitAddress},
};
use onewire_core::DeviceIdentifier;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A [`BusMaster`] shared between threads.
///
/// Every operation holds one lock for its whole duration, so a search never interleaves with
/// another and readers never see a cache being rebuilt.
pub struct SharedBusMaster<I: ErrorType, D> {
    inner: Arc<Mutex<BusMaster<I, D>>>,
}

impl<I: ErrorType, D> Clone for SharedBusMaster<I, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I: ErrorType, D> SharedBusMaster<I, D> {
    /// Share `master`.
    pub fn new(master: BusMaster<I, D>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(master)),
        }
    }

    /// Lock the master.
    ///
    /// A panic in another holder does not poison the master: the cache is only ever replaced
    /// whole, so it stays consistent.
    pub fn lock(&self) -> MutexGuard<'_, BusMaster<I, D>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the master locked.
    pub fn with<R>(&self, f: impl FnOnce(&mut BusMaster<I, D>) -> R) -> R {
        f(&mut self.lock())
    }

    /// The master, if this is the last handle.
    pub fn into_inner(self) -> Option<BusMaster<I, D>> {
        Arc::into_inner(self.inner).map(|m| m.into_inner().unwrap_or_else(PoisonError::into_inner))
    }
}

impl<I: I2c<SevenBitAddress>, D: DelayNs> SharedBusMaster<I, D> {
    /// Identifiers of all devices with their channel, discovering them if needed.
    pub fn identifiers(&self) -> Vec<(ChannelId, DeviceIdentifier)> {
        self.with(|master| {
            master
                .discover_all()
                .iter()
                .map(|dev| (dev.channel(), dev.identifier()))
                .collect()
        })
    }

    /// See [`BusMaster::reset_bus`].
    pub fn reset_bus(&self) -> ResetReport<I::Error> {
        self.lock().reset_bus()
    }

    /// See [`BusMaster::enable_strong_pullup`].
    pub fn enable_strong_pullup(&self) -> Ds2482Result<(), I::Error> {
        self.lock().enable_strong_pullup()
    }
}
