use crate::ChannelId;
use ds18x20::{Ds18b20, Ds18s20};
use onewire_core::{DeviceIdentifier, FamilyDevice, OneWireDevice, UnknownDevice};
use std::{collections::BTreeMap, fmt};
use thiserror::Error;

/// Builds a typed device wrapper for an identifier found on a channel.
pub type DeviceFactory =
    Box<dyn Fn(DeviceIdentifier, ChannelId) -> Box<dyn OneWireDevice> + Send + Sync>;

/// Registration failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RegistryError {
    /// A factory is already registered for this family code.
    #[error("family code {0:#04x} is already registered")]
    DuplicateFamilyCode(u8),
}

/// Maps family codes to device wrapper factories.
///
/// Each family code maps to exactly one factory; registering a family twice is refused.
/// Identifiers of unregistered families resolve to [`UnknownDevice`].
#[derive(Default)]
pub struct DeviceRegistry {
    factories: BTreeMap<u8, DeviceFactory>,
}

fn factory_for<T: FamilyDevice>() -> DeviceFactory {
    Box::new(|id, _| Box::new(T::from_identifier(id)))
}

impl DeviceRegistry {
    /// An empty registry; every device resolves to [`UnknownDevice`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry knowing the DS18S20 (0x10) and DS18B20 (0x28) thermometers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .factories
            .insert(Ds18s20::FAMILY_CODE, factory_for::<Ds18s20>());
        registry
            .factories
            .insert(Ds18b20::FAMILY_CODE, factory_for::<Ds18b20>());
        registry
    }

    /// Build a registry from `(family code, factory)` pairs.
    pub fn from_entries<E>(entries: E) -> Result<Self, RegistryError>
    where
        E: IntoIterator<Item = (u8, DeviceFactory)>,
    {
        let mut registry = Self::new();
        for (family, factory) in entries {
            registry.insert(family, factory)?;
        }
        Ok(registry)
    }

    /// Register a factory for `family`.
    pub fn register<F>(&mut self, family: u8, factory: F) -> Result<(), RegistryError>
    where
        F: Fn(DeviceIdentifier, ChannelId) -> Box<dyn OneWireDevice> + Send + Sync + 'static,
    {
        self.insert(family, Box::new(factory))
    }

    /// Register a wrapper type under its own family code.
    pub fn register_type<T: FamilyDevice>(&mut self) -> Result<(), RegistryError> {
        self.insert(T::FAMILY_CODE, factory_for::<T>())
    }

    fn insert(&mut self, family: u8, factory: DeviceFactory) -> Result<(), RegistryError> {
        if self.factories.contains_key(&family) {
            return Err(RegistryError::DuplicateFamilyCode(family));
        }
        self.factories.insert(family, factory);
        Ok(())
    }

    /// Whether a factory is registered for `family`.
    pub fn contains(&self, family: u8) -> bool {
        self.factories.contains_key(&family)
    }

    /// Registered family codes in ascending order.
    pub fn families(&self) -> impl Iterator<Item = u8> + '_ {
        self.factories.keys().copied()
    }

    /// Wrap `id`, falling back to [`UnknownDevice`] for unregistered families.
    pub fn resolve(&self, id: DeviceIdentifier, channel: ChannelId) -> Box<dyn OneWireDevice> {
        match self.factories.get(&id.family_code()) {
            Some(factory) => factory(id, channel),
            None => Box::new(UnknownDevice::new(id)),
        }
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set()
            .entries(self.factories.keys().map(|k| format!("{k:#04x}")))
            .finish()
    }
}
