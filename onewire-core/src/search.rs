use crate::{
    BusResetStatus, DeviceIdentifier, ONEWIRE_CONDITIONAL_SEARCH_CMD, ONEWIRE_SEARCH_CMD,
    OneWire, OneWireError, OneWireResult, OneWireStatus,
};
use log::{debug, warn};

/// Consecutive corrupt passes tolerated before a search gives up.
pub const DEFAULT_CORRUPT_RETRIES: u8 = 3;

/// A structure for searching devices on a 1-Wire bus.
/// This structure implements the search algorithm for discovering devices on the 1-Wire bus.
/// It maintains the state of the search.
pub struct OneWireSearch<'a, T> {
    onewire: &'a mut T,
    cmd: u8,
    family: Option<u8>,
    last_device: bool,
    last_discrepancy: u8,
    last_family_discrepancy: u8,
    rom: [u8; 8],
    use_triplet: bool,
    corrupt_retries: u8,
    corrupt_streak: u8,
    corrupt_passes: usize,
    truncated: bool,
}

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Type of search performed using [`OneWireSearch`].
pub enum OneWireSearchKind {
    /// Normal search
    Normal = ONEWIRE_SEARCH_CMD,
    /// Search only for devices with alarm
    Alarmed = ONEWIRE_CONDITIONAL_SEARCH_CMD,
}

enum Pass {
    Found(DeviceIdentifier),
    Corrupt(DeviceIdentifier),
    Exhausted,
    // every device went silent after answering the first bit
    Lost(u8),
}

impl<'a, T> OneWireSearch<'a, T> {
    /// Creates a new [`OneWireSearch`] instance.
    ///
    /// # Arguments
    /// * `onewire` - A mutable reference to a type that implements the `OneWire` trait.
    /// * `kind` - Normal search (`0xf0`) or search for devices in alarm state (`0xec`).
    pub fn new(onewire: &'a mut T, kind: OneWireSearchKind) -> Self {
        Self {
            onewire,
            cmd: kind as _,
            family: None,
            last_device: false,
            last_discrepancy: 0,
            last_family_discrepancy: 0,
            rom: [0; 8],
            use_triplet: true,
            corrupt_retries: DEFAULT_CORRUPT_RETRIES,
            corrupt_streak: 0,
            corrupt_passes: 0,
            truncated: false,
        }
    }

    /// Creates a new [`OneWireSearch`] that only returns devices of one family.
    ///
    /// The search starts at the first identifier carrying `family` and stops at the first
    /// identifier of another family.
    pub fn with_family(onewire: &'a mut T, kind: OneWireSearchKind, family: u8) -> Self {
        let mut search = Self::new(onewire, kind);
        search.family = Some(family);
        search.restart();
        search
    }

    /// Number of consecutive corrupt passes retried before the search is abandoned.
    pub fn with_corrupt_retries(mut self, retries: u8) -> Self {
        self.corrupt_retries = retries;
        self
    }

    /// Discards all progress; the next call to [next](OneWireSearch::next) starts from the
    /// beginning of the identifier space.
    pub fn restart(&mut self) {
        self.last_device = false;
        self.last_family_discrepancy = 0;
        self.corrupt_streak = 0;
        self.corrupt_passes = 0;
        self.truncated = false;
        match self.family {
            Some(family) => {
                self.rom = [family, 0, 0, 0, 0, 0, 0, 0];
                self.last_discrepancy = DeviceIdentifier::BITS;
            }
            None => {
                self.rom = [0; 8];
                self.last_discrepancy = 0;
            }
        }
    }

    /// Bit position (1-based) of the last branch where the zero path was taken; 0 once every
    /// branch has been explored.
    pub fn last_discrepancy(&self) -> u8 {
        self.last_discrepancy
    }

    /// Last discrepancy within the family code byte.
    pub fn last_family_discrepancy(&self) -> u8 {
        self.last_family_discrepancy
    }

    /// Passes discarded because the identifier failed its CRC.
    pub fn corrupt_passes(&self) -> usize {
        self.corrupt_passes
    }

    /// The search ended early, because corrupt passes kept repeating or because every device
    /// stopped answering part way through an identifier. Devices may have been missed.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// No further identifiers will be returned.
    pub fn is_exhausted(&self) -> bool {
        self.last_device
    }
}

impl<T: OneWire> OneWireSearch<'_, T> {
    /// Searches for devices on the 1-Wire bus.
    /// This method implements the [1-Wire search algorithm](https://www.analog.com/en/resources/app-notes/1wire-search-algorithm.html) to discover devices connected to the bus.
    /// The [next](OneWireSearch::next) method can be called repeatedly to find all devices on the bus.
    /// At the end of the search, calling this method will return `None` to indicate that no more devices are present.
    ///
    /// A pass whose identifier fails the CRC check is discarded and replayed from the same
    /// branch state; it is never returned. A pass that loses every device after the first bit
    /// ends the search and marks it [truncated](OneWireSearch::is_truncated).
    ///
    /// # Errors
    /// Bus master errors and [`OneWireError::ShortCircuit`] abort the search.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> OneWireResult<Option<DeviceIdentifier>, T::BusError> {
        loop {
            if self.last_device {
                return Ok(None);
            }
            let saved = (self.rom, self.last_discrepancy, self.last_family_discrepancy);
            match self.pass()? {
                Pass::Found(id) => {
                    self.corrupt_streak = 0;
                    if let Some(family) = self.family {
                        if id.family_code() != family {
                            self.last_device = true;
                            return Ok(None);
                        }
                    }
                    debug!("search found {id}, last discrepancy {}", self.last_discrepancy);
                    return Ok(Some(id));
                }
                Pass::Exhausted => {
                    self.last_device = true;
                    return Ok(None);
                }
                Pass::Lost(bit) => {
                    warn!("no device answered bit {bit}, abandoning search");
                    self.truncated = true;
                    self.last_device = true;
                    return Ok(None);
                }
                Pass::Corrupt(id) => {
                    self.corrupt_passes += 1;
                    (self.rom, self.last_discrepancy, self.last_family_discrepancy) = saved;
                    if self.corrupt_streak >= self.corrupt_retries {
                        warn!(
                            "abandoning search after {} corrupt passes",
                            self.corrupt_passes
                        );
                        self.truncated = true;
                        self.last_device = true;
                        return Ok(None);
                    }
                    self.corrupt_streak += 1;
                    warn!("discarding corrupt identifier {id:016x}");
                }
            }
        }
    }

    /// Verifies if the device with the given ROM code is present on the 1-Wire bus.
    ///
    /// This functions resets the search state, and calling [next](OneWireSearch::next) after this call will start a new search.
    pub fn verify(&mut self, id: DeviceIdentifier) -> OneWireResult<bool, T::BusError> {
        self.restart();
        self.rom = id.to_le_bytes();
        self.last_discrepancy = DeviceIdentifier::BITS;
        let res = self.pass();
        self.restart();
        Ok(matches!(res?, Pass::Found(found) if found == id))
    }

    fn pass(&mut self) -> OneWireResult<Pass, T::BusError> {
        match self.onewire.reset()?.reset_status() {
            BusResetStatus::ShortCircuit => return Err(OneWireError::ShortCircuit),
            BusResetStatus::NoDevicesPresent => return Ok(Pass::Exhausted),
            BusResetStatus::DevicesPresent => {}
        }
        self.onewire.write_byte(self.cmd)?;
        let mut last_zero = 0;
        for id_bit_num in 1..=DeviceIdentifier::BITS {
            let idx = usize::from((id_bit_num - 1) / 8);
            let rom_mask = 1u8 << ((id_bit_num - 1) % 8);
            // Direction to take should devices disagree at this bit
            let preferred = if id_bit_num < self.last_discrepancy {
                self.rom[idx] & rom_mask != 0
            } else {
                id_bit_num == self.last_discrepancy
            };
            let (id_bit, complement_bit, dir) = self.triplet(preferred)?;
            if id_bit && complement_bit {
                // nobody taking part in the search, e.g. no device in alarm
                if id_bit_num == 1 {
                    debug!("no device joined the search");
                    return Ok(Pass::Exhausted);
                }
                return Ok(Pass::Lost(id_bit_num));
            }
            if !id_bit && !complement_bit && !dir {
                last_zero = id_bit_num;
                if last_zero < 9 {
                    self.last_family_discrepancy = last_zero;
                }
            }
            if dir {
                self.rom[idx] |= rom_mask;
            } else {
                self.rom[idx] &= !rom_mask;
            }
        }
        let id = DeviceIdentifier::from_le_bytes(self.rom);
        if !id.is_valid() {
            return Ok(Pass::Corrupt(id));
        }
        self.last_discrepancy = last_zero;
        self.last_device = last_zero == 0;
        Ok(Pass::Found(id))
    }

    // Read the id_bit and the complement_bit using triplet if available,
    // else read both bits and write the direction.
    fn triplet(&mut self, direction: bool) -> OneWireResult<(bool, bool, bool), T::BusError> {
        if self.use_triplet {
            match self.onewire.read_triplet(direction) {
                Err(OneWireError::Unimplemented) => self.use_triplet = false,
                res => return res,
            }
        }
        let id_bit = self.onewire.read_bit()?;
        let complement_bit = self.onewire.read_bit()?;
        if id_bit && complement_bit {
            return Ok((true, true, true));
        }
        let dir = if id_bit != complement_bit {
            id_bit
        } else {
            direction
        };
        self.onewire.write_bit(dir)?;
        Ok((id_bit, complement_bit, dir))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::convert::Infallible;
    use rand::{Rng, seq::SliceRandom};
    use std::collections::BTreeSet;

    const NOISE_BIT: u8 = 40;

    struct SimStatus {
        presence: bool,
        short: bool,
    }

    impl OneWireStatus for SimStatus {
        fn presence(&self) -> bool {
            self.presence
        }

        fn shortcircuit(&self) -> bool {
            self.short
        }
    }

    #[derive(PartialEq)]
    enum SimState {
        Idle,
        Command,
        Search { bit: u8, slot: u8 },
    }

    /// Open-drain bus model: every selected device drives each read slot,
    /// and a zero from anyone wins.
    struct SimBus {
        devices: Vec<DeviceIdentifier>,
        active: Vec<bool>,
        state: SimState,
        triplet: bool,
        shuffle: bool,
        short: bool,
        noisy_passes: usize,
        noisy: bool,
        /// Every device stops driving the bus from this bit on.
        dropout: Option<u8>,
        /// Directions written during each pass.
        writes: Vec<Vec<bool>>,
    }

    impl SimBus {
        fn new(devices: &[DeviceIdentifier]) -> Self {
            Self {
                devices: devices.to_vec(),
                active: vec![true; devices.len()],
                state: SimState::Idle,
                triplet: false,
                shuffle: false,
                short: false,
                noisy_passes: 0,
                noisy: false,
                dropout: None,
                writes: Vec::new(),
            }
        }

        fn with_triplet(mut self) -> Self {
            self.triplet = true;
            self
        }

        fn wired_and(&self, bit: u8, complement: bool) -> bool {
            self.devices
                .iter()
                .zip(&self.active)
                .filter(|(_, active)| **active)
                .all(|(id, _)| id.bit(bit) != complement)
        }
    }

    impl OneWire for SimBus {
        type Status = SimStatus;
        type BusError = Infallible;

        fn reset(&mut self) -> OneWireResult<SimStatus, Infallible> {
            if self.shuffle {
                self.devices.shuffle(&mut rand::rng());
            }
            self.active.iter_mut().for_each(|a| *a = true);
            self.state = SimState::Command;
            self.noisy = self.noisy_passes > 0;
            self.noisy_passes = self.noisy_passes.saturating_sub(1);
            self.writes.push(Vec::new());
            Ok(SimStatus {
                presence: !self.devices.is_empty(),
                short: self.short,
            })
        }

        fn write_byte(&mut self, byte: u8) -> OneWireResult<(), Infallible> {
            self.state = if self.state == SimState::Command && byte == ONEWIRE_SEARCH_CMD {
                SimState::Search { bit: 0, slot: 0 }
            } else {
                SimState::Idle
            };
            Ok(())
        }

        fn read_byte(&mut self) -> OneWireResult<u8, Infallible> {
            Ok(0xff)
        }

        fn write_bit(&mut self, bit: bool) -> OneWireResult<(), Infallible> {
            if let SimState::Search { bit: pos, slot: 2 } = self.state {
                if !(self.noisy && pos == NOISE_BIT) {
                    for (id, active) in self.devices.iter().zip(self.active.iter_mut()) {
                        *active &= id.bit(pos) == bit;
                    }
                }
                if let Some(pass) = self.writes.last_mut() {
                    pass.push(bit);
                }
                self.state = if pos == 63 {
                    SimState::Idle
                } else {
                    SimState::Search { bit: pos + 1, slot: 0 }
                };
            }
            Ok(())
        }

        fn read_bit(&mut self) -> OneWireResult<bool, Infallible> {
            let SimState::Search { bit, slot } = self.state else {
                return Ok(true);
            };
            if slot > 1 || self.dropout.is_some_and(|d| bit >= d) {
                return Ok(true);
            }
            let mut value = self.wired_and(bit, slot == 1);
            if self.noisy && bit == NOISE_BIT {
                value = !value;
            }
            self.state = SimState::Search { bit, slot: slot + 1 };
            Ok(value)
        }

        fn read_triplet(
            &mut self,
            direction: bool,
        ) -> OneWireResult<(bool, bool, bool), Infallible> {
            if !self.triplet {
                return Err(OneWireError::Unimplemented);
            }
            let id = self.read_bit()?;
            let cmp = self.read_bit()?;
            let dir = if id == cmp { id || direction } else { id };
            self.write_bit(dir)?;
            Ok((id, cmp, dir))
        }
    }

    fn collect(search: &mut OneWireSearch<'_, SimBus>) -> Vec<DeviceIdentifier> {
        let mut found = Vec::new();
        while let Some(id) = search.next().unwrap() {
            found.push(id);
        }
        found
    }

    fn sorted(ids: &[DeviceIdentifier]) -> Vec<DeviceIdentifier> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids
    }

    fn id(family: u8, serial: [u8; 6]) -> DeviceIdentifier {
        DeviceIdentifier::from_parts(family, serial)
    }

    #[test]
    fn finds_two_devices_once_each_in_any_responder_order() {
        let a = id(0x10, [0x11, 0x22, 0x33, 0x44, 0x55, 0x66]);
        let b = id(0x28, [0x9a, 0xbc, 0xde, 0x01, 0x02, 0x03]);
        for triplet in [false, true] {
            for _ in 0..16 {
                let mut bus = SimBus::new(&[a, b]);
                bus.shuffle = true;
                bus.triplet = triplet;
                let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
                let mut found = collect(&mut search);
                assert!(search.is_exhausted());
                assert_eq!(search.last_discrepancy(), 0);
                found.sort();
                assert_eq!(found, sorted(&[a, b]));
            }
        }
    }

    #[test]
    fn empty_bus_yields_nothing() {
        let mut bus = SimBus::new(&[]);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        assert_eq!(search.next().unwrap(), None);
        assert_eq!(search.last_discrepancy(), 0);
        assert!(search.is_exhausted());
        assert_eq!(search.next().unwrap(), None);
    }

    #[test]
    fn explores_one_branch_at_last_discrepancy() {
        // identical up to bit 9 (serial byte 0, bit 0)
        let zero = id(0x28, [0, 0, 0, 0, 0, 0]);
        let one = id(0x28, [1, 0, 0, 0, 0, 0]);
        let mut bus = SimBus::new(&[one, zero]);
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        assert_eq!(search.next().unwrap(), Some(zero));
        assert_eq!(search.last_discrepancy(), 9);
        assert_eq!(search.next().unwrap(), Some(one));
        assert_eq!(search.last_discrepancy(), 0);
        assert_eq!(search.next().unwrap(), None);
        drop(search);
        assert_eq!(bus.writes.len(), 2);
        assert!(!bus.writes[0][8]);
        assert!(bus.writes[1][8]);
        assert_eq!(bus.writes[0][..8], bus.writes[1][..8]);
    }

    #[test]
    fn many_devices_without_duplicates() {
        let mut rng = rand::rng();
        let devices: BTreeSet<_> = (0..24)
            .map(|i| id(if i % 3 == 0 { 0x10 } else { 0x28 }, rng.random()))
            .collect();
        let devices: Vec<_> = devices.into_iter().collect();
        let mut bus = SimBus::new(&devices).with_triplet();
        bus.shuffle = true;
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        let found = collect(&mut search);
        assert_eq!(found.len(), devices.len());
        let unique: BTreeSet<_> = found.iter().copied().collect();
        assert_eq!(unique.into_iter().collect::<Vec<_>>(), devices);
    }

    #[test]
    fn corrupt_pass_is_retried_not_returned() {
        // both agree on bit 40 (serial byte 4) so the noise only flips a forced bit
        let a = id(0x28, [0x01, 0x00, 0x00, 0x00, 0x5a, 0x00]);
        let b = id(0x28, [0x02, 0x00, 0x00, 0x00, 0x5a, 0x00]);
        let mut bus = SimBus::new(&[a, b]);
        bus.noisy_passes = 1;
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        let mut found = collect(&mut search);
        found.sort();
        assert_eq!(found, sorted(&[a, b]));
        assert_eq!(search.corrupt_passes(), 1);
        assert!(!search.is_truncated());
    }

    #[test]
    fn persistent_corruption_truncates_search() {
        let a = id(0x10, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let mut bus = SimBus::new(&[a]).with_triplet();
        bus.noisy_passes = usize::MAX;
        let mut search =
            OneWireSearch::new(&mut bus, OneWireSearchKind::Normal).with_corrupt_retries(2);
        assert_eq!(search.next().unwrap(), None);
        assert!(search.is_truncated());
        assert_eq!(search.corrupt_passes(), 3);
    }

    #[test]
    fn unbounded_retries_still_terminate() {
        let a = id(0x10, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let mut bus = SimBus::new(&[a]).with_triplet();
        bus.noisy_passes = usize::MAX;
        let mut search =
            OneWireSearch::new(&mut bus, OneWireSearchKind::Normal).with_corrupt_retries(u8::MAX);
        assert_eq!(search.next().unwrap(), None);
        assert!(search.is_truncated());
        assert_eq!(search.corrupt_passes(), 256);
    }

    #[test]
    fn devices_vanishing_mid_pass_truncate() {
        let a = id(0x28, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let b = id(0x28, [0x81, 0x02, 0x03, 0x04, 0x05, 0x06]);
        for triplet in [false, true] {
            let mut bus = SimBus::new(&[a, b]);
            bus.triplet = triplet;
            bus.dropout = Some(20);
            let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
            assert_eq!(search.next().unwrap(), None);
            assert!(search.is_truncated());
            assert!(search.is_exhausted());
            assert_eq!(search.corrupt_passes(), 0);
            assert!(!search.verify(a).unwrap());
        }
    }

    #[test]
    fn alarm_search_without_alarms_is_complete() {
        let a = id(0x28, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let mut bus = SimBus::new(&[a]).with_triplet();
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Alarmed);
        assert_eq!(search.next().unwrap(), None);
        assert!(search.is_exhausted());
        assert!(!search.is_truncated());
    }

    #[test]
    fn family_search_skips_other_families() {
        let ds18s20 = id(0x10, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let first = id(0x28, [0x10, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let second = id(0x28, [0x20, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let other = id(0x3b, [0x07, 0x00, 0x00, 0x00, 0x00, 0x00]);
        let mut bus = SimBus::new(&[other, second, ds18s20, first]);
        let mut search = OneWireSearch::with_family(&mut bus, OneWireSearchKind::Normal, 0x28);
        let mut found = collect(&mut search);
        found.sort();
        assert_eq!(found, sorted(&[first, second]));
    }

    #[test]
    fn verify_checks_presence() {
        let a = id(0x28, [0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let b = id(0x28, [0x81, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let absent = id(0x28, [0x41, 0x02, 0x03, 0x04, 0x05, 0x06]);
        let mut bus = SimBus::new(&[a, b]).with_triplet();
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        assert!(search.verify(a).unwrap());
        assert!(search.verify(b).unwrap());
        assert!(!search.verify(absent).unwrap());
        // verification leaves a fresh search behind
        assert_eq!(collect(&mut search).len(), 2);
    }

    #[test]
    fn short_circuit_aborts() {
        let mut bus = SimBus::new(&[id(0x10, [1, 2, 3, 4, 5, 6])]);
        bus.short = true;
        let mut search = OneWireSearch::new(&mut bus, OneWireSearchKind::Normal);
        assert!(matches!(search.next(), Err(OneWireError::ShortCircuit)));
    }
}
