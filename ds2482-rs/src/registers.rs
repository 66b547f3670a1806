use crate::{ChannelId, Ds2482Error, Ds2482Result, traits::Addressing, traits::Interact};
use bitfield_struct::bitfield;
use embedded_hal::{
    delay::DelayNs,
    i2c::{I2c, SevenBitAddress},
};
use log::warn;
use onewire_core::OneWireStatus;

pub(crate) const DEVICE_RST_CMD: u8 = 0xf0; // Reset the device
pub(crate) const READ_PTR_CMD: u8 = 0xe1; // Set the read pointer
pub(crate) const WRITE_CONFIG_CMD: u8 = 0xd2; // Write the device configuration
pub(crate) const CHANNEL_SELECT_CMD: u8 = 0xc3; // Select the active 1-Wire channel (-800 only)
pub(crate) const DEVICE_STATUS_PTR: u8 = 0xf0; // Device status register
pub(crate) const READ_DATA_PTR: u8 = 0xe1; // Read data register
pub(crate) const DEVICE_CONFIG_PTR: u8 = 0xc3; // Device configuration register
pub(crate) const CHANNEL_SELECTION_PTR: u8 = 0xd2; // Channel selection register

/// I2C address with all address pins tied low.
pub const DEFAULT_ADDRESS: u8 = 0x18;

/// DS2482 variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Ds2482Model {
    /// DS2482-100, a single 1-Wire port.
    #[default]
    OneChannel,
    /// DS2482-800, eight 1-Wire ports behind a channel selector.
    EightChannel,
}

impl Ds2482Model {
    /// Channels this model provides.
    pub fn channels(self) -> &'static [ChannelId] {
        match self {
            Self::OneChannel => &ChannelId::ALL[..1],
            Self::EightChannel => &ChannelId::ALL,
        }
    }

    /// Whether `channel` exists on this model.
    pub fn supports(self, channel: ChannelId) -> bool {
        self.channels().contains(&channel)
    }
}

/// A DS2482 I2C to 1-Wire bridge device.
///
/// Takes ownership of an I2C bus (implementing [`I2c`](embedded_hal::i2c::I2c) trait)
/// and a timer object implementing the [`DelayNs`](embedded_hal::delay::DelayNs) trait.
/// Pass `&mut bus` instead of `bus` to keep ownership of the I2C bus; otherwise it is
/// dropped with the bridge or handed back by [`release`](Ds2482::release).
pub struct Ds2482<I, D> {
    pub(crate) i2c: I,
    pub(crate) addr: u8,
    pub(crate) delay: D,
    pub(crate) retries: u8,
    pub(crate) poll_interval_us: u32,
    pub(crate) model: Ds2482Model,
    pub(crate) configured: bool, // Cleared by a device reset until the configuration is written
    pub(crate) config: DeviceConfiguration, // Last configuration written, restored by `recover`
}

/// Builder for creating a [`Ds2482`] instance with custom configuration.
pub struct Ds2482Builder {
    pub(crate) model: Ds2482Model,
    pub(crate) addr: u8,
    pub(crate) retries: u8,
    pub(crate) poll_interval_us: u32,
    pub(crate) config: DeviceConfiguration,
}

impl Default for Ds2482Builder {
    fn default() -> Self {
        Ds2482Builder {
            model: Ds2482Model::default(),
            addr: DEFAULT_ADDRESS,
            retries: 100,
            poll_interval_us: 100,
            config: DeviceConfiguration::new().with_active_pullup(true),
        }
    }
}

impl Ds2482Builder {
    /// Sets the bridge variant.
    pub fn with_model(mut self, model: Ds2482Model) -> Self {
        self.model = model;
        self
    }

    /// Sets the 7-bit I2C address (0x18 to 0x1f depending on the address pins).
    pub fn with_address(mut self, addr: u8) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the retry count for the device.
    ///
    /// The retry count is used to determine how long
    /// the host waits before operations on the 1-Wire
    /// or I2C bus time out.
    pub fn with_retries(mut self, retries: u8) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the pause between two busy polls of the status register.
    pub fn with_poll_interval_us(mut self, interval: u32) -> Self {
        self.poll_interval_us = interval;
        self
    }

    /// Sets the device configuration.
    pub fn with_config(mut self, config: DeviceConfiguration) -> Self {
        self.config = config;
        self
    }

    /// Builds a new `Ds2482` instance: resets the chip and writes the configuration.
    pub fn build<I: I2c<SevenBitAddress>, D: DelayNs>(
        self,
        i2c: I,
        delay: D,
    ) -> Ds2482Result<Ds2482<I, D>, I::Error> {
        let mut dev = Ds2482 {
            i2c,
            addr: self.addr,
            delay,
            retries: self.retries,
            poll_interval_us: self.poll_interval_us,
            model: self.model,
            configured: false,
            config: self.config,
        };
        dev.device_reset()?;
        dev.write_configuration(self.config)?;
        Ok(dev)
    }
}

impl<I, D> Ds2482<I, D> {
    /// Bridge variant.
    pub fn model(&self) -> Ds2482Model {
        self.model
    }

    /// I2C address of the bridge.
    pub fn address(&self) -> u8 {
        self.addr
    }

    /// Tear the driver down, handing back the I2C bus and the timer.
    pub fn release(self) -> (I, D) {
        (self.i2c, self.delay)
    }
}

impl<I2C: I2c<SevenBitAddress>, D: DelayNs> Ds2482<I2C, D> {
    /// Reset the device.
    ///
    /// Performs a global reset of device state machine logic. Terminates any ongoing 1-Wire
    /// communication. 1-Wire operations are refused until the configuration is written again.
    pub fn device_reset(&mut self) -> Ds2482Result<DeviceStatus, I2C::Error> {
        self.i2c.write(self.addr, &[DEVICE_RST_CMD])?;
        self.configured = false;
        let mut tries = 0;
        // the read pointer sits on the status register after a device reset
        loop {
            let status = self.read_status_byte()?;
            if status.device_reset() {
                return Ok(status);
            }
            if tries >= self.retries {
                return Err(Ds2482Error::BusTimeout);
            }
            tries += 1;
            self.delay.delay_us(self.poll_interval_us);
        }
    }

    /// Get the status of the device.
    pub fn status(&mut self) -> Ds2482Result<DeviceStatus, I2C::Error> {
        let mut stat = DeviceStatus::default();
        stat.read(self)?;
        Ok(stat)
    }

    /// Read the configuration register.
    pub fn configuration(&mut self) -> Ds2482Result<DeviceConfiguration, I2C::Error> {
        let mut cfg = DeviceConfiguration::default();
        cfg.read(self)?;
        Ok(cfg)
    }

    /// Write the configuration register, returning what the chip reads back.
    pub fn write_configuration(
        &mut self,
        config: DeviceConfiguration,
    ) -> Ds2482Result<DeviceConfiguration, I2C::Error> {
        self.config = config;
        let mut readback = config;
        readback.write(self)?;
        Ok(readback)
    }

    /// Reset the chip and write back the last configuration.
    ///
    /// Clears a 1-Wire line that stays busy, which otherwise blocks every channel.
    pub fn recover(&mut self) -> Ds2482Result<DeviceConfiguration, I2C::Error> {
        self.device_reset()?;
        self.write_configuration(self.config)
    }

    /// Arm the strong pullup for the next 1-Wire byte or bit.
    ///
    /// Writes the fixed configuration byte `0xb4` (SPU with its complement nibble).
    /// The chip does not acknowledge the mode switch; read [`configuration`](Ds2482::configuration)
    /// to confirm it.
    pub fn enable_strong_pullup(&mut self) -> Ds2482Result<(), I2C::Error> {
        self.onewire_wait()?;
        let config = DeviceConfiguration::new().with_strong_pullup(true);
        self.i2c.write(self.addr, &[WRITE_CONFIG_CMD, config.to_wire()])?;
        self.configured = true;
        Ok(())
    }

    /// Connect `channel` to the 1-Wire master.
    ///
    /// A no-op on the single-channel model. Repeating the selection is harmless.
    pub fn select_channel(&mut self, channel: ChannelId) -> Ds2482Result<(), I2C::Error> {
        if !self.model.supports(channel) {
            return Err(Ds2482Error::UnsupportedChannel(channel));
        }
        match self.model {
            Ds2482Model::OneChannel => Ok(()),
            Ds2482Model::EightChannel => ChannelSelection::for_channel(channel).write(self),
        }
    }

    /// Read the channel selection register back and compare it with `channel`.
    pub fn is_channel_selected(&mut self, channel: ChannelId) -> Ds2482Result<bool, I2C::Error> {
        match self.model {
            Ds2482Model::OneChannel => Ok(self.model.supports(channel)),
            Ds2482Model::EightChannel => {
                let mut sel = ChannelSelection::default();
                sel.read(self)?;
                Ok(sel.channel() == Some(channel))
            }
        }
    }

    /// Select `channel` and hand out a 1-Wire bus bound to it.
    ///
    /// # Errors
    /// [`Ds2482Error::ChannelNotSelected`] if the selection does not read back, which happens
    /// when the command was corrupted on the I2C bus.
    pub fn channel(
        &mut self,
        channel: ChannelId,
    ) -> Ds2482Result<crate::ChannelBus<'_, I2C, D>, I2C::Error> {
        self.select_channel(channel)?;
        if !self.is_channel_selected(channel)? {
            warn!("channel {channel} selection did not read back");
            return Err(Ds2482Error::ChannelNotSelected(channel));
        }
        Ok(crate::ChannelBus::new(self, channel))
    }

    pub(crate) fn read_status_byte(&mut self) -> Ds2482Result<DeviceStatus, I2C::Error> {
        let mut buf = [0; 1];
        self.i2c.read(self.addr, &mut buf)?;
        Ok(DeviceStatus::from_bits(buf[0]))
    }

    /// Poll the status register until the 1-Wire line is idle.
    pub(crate) fn onewire_wait(&mut self) -> Ds2482Result<DeviceStatus, I2C::Error> {
        let mut tries = 0;
        self.i2c.write(self.addr, &[READ_PTR_CMD, DEVICE_STATUS_PTR])?;
        loop {
            let status = self.read_status_byte()?;
            if !status.onewire_busy() {
                return Ok(status);
            }
            if tries >= self.retries {
                return Err(Ds2482Error::BusTimeout);
            }
            tries += 1;
            self.delay.delay_us(self.poll_interval_us);
        }
    }
}

/// Status register for DS2482
/// The read-only Status register is the general means for
/// the DS2482 to report bit-type data from the 1-Wire side,
/// 1-Wire busy status, and its own reset status to the host
/// processor. All 1-Wire communication commands and the Device
/// Reset command position the read pointer at the Status register.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceStatus {
    /// 1WB: a 1-Wire command is in progress.
    pub onewire_busy: bool,
    /// PPD: a presence pulse was seen during the last 1-Wire reset.
    pub presence_pulse_detect: bool,
    /// SD: the line was low at the short-detect sample of the last 1-Wire reset.
    pub short_detect: bool,
    /// LL: logic level of the selected 1-Wire line, sampled on every status read.
    pub logic_level: bool,
    /// RST: the chip has performed an internal reset; cleared by a configuration write.
    pub device_reset: bool,
    /// SBR: line state sampled during a single bit command or the first triplet bit.
    pub single_bit_result: bool,
    /// TSB: line state sampled during the second triplet bit.
    pub triplet_second_bit: bool,
    /// DIR: direction written by the last triplet.
    pub branch_dir_taken: bool,
}

impl OneWireStatus for DeviceStatus {
    fn presence(&self) -> bool {
        self.presence_pulse_detect()
    }

    fn shortcircuit(&self) -> bool {
        self.short_detect()
    }

    fn logic_level(&self) -> Option<bool> {
        Some(DeviceStatus::logic_level(self))
    }

    fn direction(&self) -> Option<bool> {
        Some(self.branch_dir_taken())
    }
}

impl Addressing for DeviceStatus {
    const WRITE_CMD: u8 = 0x0;
    const READ_PTR: u8 = DEVICE_STATUS_PTR;
}

impl Interact for DeviceStatus {
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        let mut buf = [0; 1];
        dev.i2c.write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        *self = Self::from_bits(buf[0]);
        Ok(())
    }

    // read-only register
    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        _dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        Ok(())
    }
}

/// # Device configuration register
///
/// The DS2482 supports four 1-Wire features that are
/// enabled or selected through the Device Configuration
/// register. On the wire the upper nibble carries the
/// one's complement of these four bits; reads return the
/// lower nibble only.
///
/// After a device reset the register reads 00h.
#[bitfield(u8)]
#[derive(PartialEq, Eq)]
pub struct DeviceConfiguration {
    /// APU: drive low-to-high transitions with the active pullup instead of the resistor.
    pub active_pullup: bool,
    /// PPM: mask presence pulses (early DS2482-100 revisions only).
    pub presence_pulse_masking: bool,
    /// SPU: drive the line high after the next byte or bit, to power parasitic devices.
    /// Returns to 0 once the strong pullup ends.
    pub strong_pullup: bool,
    /// 1WS: overdrive timing.
    pub onewire_speed: bool,
    #[bits(4)]
    __: u8,
}

impl DeviceConfiguration {
    /// Byte sent with the Write Configuration command.
    pub fn to_wire(self) -> u8 {
        let cfg = self.into_bits() & 0x0f;
        cfg | ((!cfg & 0x0f) << 4)
    }
}

impl Addressing for DeviceConfiguration {
    const WRITE_CMD: u8 = WRITE_CONFIG_CMD;
    const READ_PTR: u8 = DEVICE_CONFIG_PTR;
}

impl Interact for DeviceConfiguration {
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        let mut buf = [0; 1];
        dev.i2c.write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        *self = Self::from_bits(buf[0] & 0x0f);
        Ok(())
    }

    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        dev.onewire_wait()?;
        let mut buf = [0; 1];
        dev.i2c
            .write_read(dev.addr, &[Self::WRITE_CMD, self.to_wire()], &mut buf)?;
        *self = Self::from_bits(buf[0] & 0x0f);
        dev.configured = true;
        Ok(())
    }
}

/// Channel selection register of the DS2482-800.
///
/// Holds the read-back code of the channel connected to the 1-Wire master.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSelection(u8);

impl ChannelSelection {
    /// Register content once `channel` is selected.
    pub fn for_channel(channel: ChannelId) -> Self {
        Self(channel.readback_code())
    }

    /// Selected channel, if the register holds a valid code.
    pub fn channel(&self) -> Option<ChannelId> {
        ChannelId::from_readback_code(self.0)
    }
}

impl Addressing for ChannelSelection {
    const WRITE_CMD: u8 = CHANNEL_SELECT_CMD;
    const READ_PTR: u8 = CHANNEL_SELECTION_PTR;
}

impl Interact for ChannelSelection {
    fn read<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        let mut buf = [0; 1];
        dev.i2c.write_read(dev.addr, &[READ_PTR_CMD, Self::READ_PTR], &mut buf)?;
        self.0 = buf[0];
        Ok(())
    }

    fn write<I: I2c<SevenBitAddress>, D: DelayNs>(
        &mut self,
        dev: &mut Ds2482<I, D>,
    ) -> Ds2482Result<(), I::Error> {
        let Some(channel) = self.channel() else {
            return Ok(());
        };
        dev.onewire_wait()?;
        dev.i2c.write(dev.addr, &[Self::WRITE_CMD, channel.select_code()])?;
        Ok(())
    }
}
