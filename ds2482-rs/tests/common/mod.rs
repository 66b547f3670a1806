//! A simulated DS2482-800 with 1-Wire devices hanging off its channels.
#![allow(dead_code)]

use ds2482::{BusMaster, ChannelId, DeviceIdentifier, DeviceRegistry, Ds2482Builder, Ds2482Model};
use embedded_hal::i2c::{self, ErrorKind, ErrorType, I2c, Operation, SevenBitAddress};
use embedded_hal_mock::eh1::delay::NoopDelay;
use std::sync::{Arc, Mutex};

const STATUS_1WB: u8 = 1 << 0;
const STATUS_RST: u8 = 1 << 4;
const STATUS_PPD: u8 = 1 << 1;
const STATUS_SD: u8 = 1 << 2;
const STATUS_SBR: u8 = 1 << 5;
const STATUS_TSB: u8 = 1 << 6;
const STATUS_DIR: u8 = 1 << 7;

const SELECT_CODES: [u8; 8] = [0xf0, 0xe1, 0xd2, 0xc3, 0xb4, 0xa5, 0x96, 0x87];
const READBACK_CODES: [u8; 8] = [0xb8, 0xb1, 0xaa, 0xa3, 0x9c, 0x95, 0x8e, 0x87];
// the `id` helper leaves this bit clear on every device
const NOISE_BIT: u8 = 40;

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn id(family: u8, serial: u8) -> DeviceIdentifier {
    DeviceIdentifier::from_parts(family, [serial, 0x5a, 0x01, 0x00, 0x00, 0x00])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimError;

impl i2c::Error for SimError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Other
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pointer {
    Status,
    Data,
    Config,
    Channel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SearchPhase {
    IdBit,
    Complement,
    Direction,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Line {
    Idle,
    AwaitRom,
    Search {
        bit: u8,
        active: Vec<DeviceIdentifier>,
        phase: SearchPhase,
        noisy: bool,
    },
}

#[derive(Debug, Default, Clone)]
struct Segment {
    devices: Vec<DeviceIdentifier>,
    shorted: bool,
    failing: bool,
    /// Holds the line busy after any 1-Wire command, until a device reset.
    stuck: bool,
    /// Search passes that read `NOISE_BIT` inverted.
    noisy_passes: usize,
}

#[derive(Debug)]
struct State {
    pointer: Pointer,
    status: u8,
    config: u8,
    channel: usize,
    segments: [Segment; 8],
    line: Line,
    busy: bool,
    device_resets: usize,
    search_commands: usize,
    onewire_resets: usize,
    config_writes: Vec<u8>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            pointer: Pointer::Status,
            status: STATUS_RST,
            config: 0,
            channel: 0,
            segments: Default::default(),
            line: Line::Idle,
            busy: false,
            device_resets: 0,
            search_commands: 0,
            onewire_resets: 0,
            config_writes: Vec::new(),
        }
    }
}

impl State {
    fn register(&self) -> u8 {
        match self.pointer {
            Pointer::Status if self.busy => self.status | STATUS_1WB,
            Pointer::Status => self.status,
            Pointer::Data => 0xff,
            Pointer::Config => self.config,
            Pointer::Channel => READBACK_CODES[self.channel],
        }
    }

    fn segment(&self) -> &Segment {
        &self.segments[self.channel]
    }

    fn set_sbr(&mut self, bit: bool) {
        self.status &= !STATUS_SBR;
        if bit {
            self.status |= STATUS_SBR;
        }
    }

    fn onewire_command(&mut self, cmd: &[u8]) -> Result<(), SimError> {
        if self.segment().failing {
            return Err(SimError);
        }
        self.pointer = Pointer::Status;
        if self.busy {
            return Ok(());
        }
        if self.segment().stuck {
            self.busy = true;
            return Ok(());
        }
        match cmd {
            [0xb4] => {
                self.onewire_resets += 1;
                let seg = self.segment();
                let mut status = self.status & !(STATUS_PPD | STATUS_SD);
                if seg.shorted {
                    status |= STATUS_SD;
                } else if !seg.devices.is_empty() {
                    status |= STATUS_PPD;
                }
                self.status = status;
                self.line = Line::AwaitRom;
            }
            [0xa5, byte] => {
                self.line = match (&self.line, *byte) {
                    (Line::AwaitRom, 0xf0) => {
                        self.search_commands += 1;
                        let seg = &mut self.segments[self.channel];
                        let noisy = seg.noisy_passes > 0;
                        seg.noisy_passes = seg.noisy_passes.saturating_sub(1);
                        Line::Search {
                            bit: 0,
                            active: seg.devices.clone(),
                            phase: SearchPhase::IdBit,
                            noisy,
                        }
                    }
                    _ => Line::Idle,
                };
            }
            [0x96] => self.pointer = Pointer::Data,
            [0x78, dir] => self.triplet(*dir & 0x80 != 0),
            [0x87, bit] => self.single_bit(*bit & 0x80 != 0),
            _ => {}
        }
        Ok(())
    }

    fn triplet(&mut self, direction: bool) {
        let Line::Search {
            bit, active, noisy, ..
        } = &mut self.line
        else {
            self.status |= STATUS_SBR | STATUS_TSB | STATUS_DIR;
            return;
        };
        let mut id_bit = active.iter().all(|d| d.bit(*bit));
        let mut complement = active.iter().all(|d| !d.bit(*bit));
        let mut dir = match (id_bit, complement) {
            (false, false) => direction,
            (id, _) => id,
        };
        active.retain(|d| d.bit(*bit) == dir);
        if *noisy && *bit == NOISE_BIT {
            (id_bit, complement, dir) = (complement, id_bit, !dir);
        }
        *bit += 1;
        let mut status = self.status & !(STATUS_SBR | STATUS_TSB | STATUS_DIR);
        if id_bit {
            status |= STATUS_SBR;
        }
        if complement {
            status |= STATUS_TSB;
        }
        if dir {
            status |= STATUS_DIR;
        }
        self.status = status;
    }

    fn single_bit(&mut self, value: bool) {
        let Line::Search {
            bit,
            active,
            phase,
            noisy,
        } = &mut self.line
        else {
            self.set_sbr(value);
            return;
        };
        let flip = *noisy && *bit == NOISE_BIT;
        let sampled = match phase {
            SearchPhase::IdBit => {
                *phase = SearchPhase::Complement;
                value && (active.iter().all(|d| d.bit(*bit)) != flip)
            }
            SearchPhase::Complement => {
                *phase = SearchPhase::Direction;
                value && (active.iter().all(|d| !d.bit(*bit)) != flip)
            }
            SearchPhase::Direction => {
                if !flip {
                    active.retain(|d| d.bit(*bit) == value);
                }
                *bit += 1;
                *phase = SearchPhase::IdBit;
                value
            }
        };
        self.set_sbr(sampled);
    }

    fn write(&mut self, bytes: &[u8]) -> Result<(), SimError> {
        match bytes {
            [0xf0] => {
                let segments = std::mem::take(&mut self.segments);
                let config_writes = std::mem::take(&mut self.config_writes);
                *self = Self {
                    segments,
                    config_writes,
                    device_resets: self.device_resets + 1,
                    search_commands: self.search_commands,
                    onewire_resets: self.onewire_resets,
                    ..Self::default()
                };
            }
            [0xe1, ptr] => {
                self.pointer = match ptr {
                    0xf0 => Pointer::Status,
                    0xe1 => Pointer::Data,
                    0xc3 => Pointer::Config,
                    0xd2 => Pointer::Channel,
                    _ => return Err(SimError),
                };
            }
            [0xd2, cfg] => {
                if (cfg >> 4) != (!cfg & 0x0f) {
                    return Err(SimError);
                }
                self.config_writes.push(*cfg);
                self.config = cfg & 0x0f;
                self.status &= !STATUS_RST;
                self.pointer = Pointer::Config;
            }
            [0xc3, code] => {
                self.channel = SELECT_CODES
                    .iter()
                    .position(|c| c == code)
                    .ok_or(SimError)?;
                self.line = Line::Idle;
                self.pointer = Pointer::Channel;
            }
            cmd => self.onewire_command(cmd)?,
        }
        Ok(())
    }
}

/// Handle on the simulated bridge; clones share the same chip.
#[derive(Debug, Clone, Default)]
pub struct SimulatedDs2482 {
    state: Arc<Mutex<State>>,
}

impl SimulatedDs2482 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, channel: ChannelId, devices: &[DeviceIdentifier]) {
        let mut state = self.state.lock().unwrap();
        state.segments[channel.index()]
            .devices
            .extend_from_slice(devices);
    }

    pub fn detach_all(&self, channel: ChannelId) {
        self.state.lock().unwrap().segments[channel.index()]
            .devices
            .clear();
    }

    pub fn short(&self, channel: ChannelId) {
        self.state.lock().unwrap().segments[channel.index()].shorted = true;
    }

    pub fn fail(&self, channel: ChannelId) {
        self.state.lock().unwrap().segments[channel.index()].failing = true;
    }

    pub fn stick(&self, channel: ChannelId) {
        self.state.lock().unwrap().segments[channel.index()].stuck = true;
    }

    pub fn add_noise(&self, channel: ChannelId, passes: usize) {
        self.state.lock().unwrap().segments[channel.index()].noisy_passes = passes;
    }

    pub fn device_resets(&self) -> usize {
        self.state.lock().unwrap().device_resets
    }

    pub fn search_commands(&self) -> usize {
        self.state.lock().unwrap().search_commands
    }

    pub fn onewire_resets(&self) -> usize {
        self.state.lock().unwrap().onewire_resets
    }

    pub fn config_writes(&self) -> Vec<u8> {
        self.state.lock().unwrap().config_writes.clone()
    }
}

impl ErrorType for SimulatedDs2482 {
    type Error = SimError;
}

impl I2c<SevenBitAddress> for SimulatedDs2482 {
    fn transaction(
        &mut self,
        address: SevenBitAddress,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        if address != ds2482::DEFAULT_ADDRESS {
            return Err(SimError);
        }
        let mut state = self.state.lock().unwrap();
        for op in operations {
            match op {
                Operation::Write(bytes) => state.write(bytes)?,
                Operation::Read(buf) => buf.fill(state.register()),
            }
        }
        Ok(())
    }
}

pub type SimMaster = BusMaster<SimulatedDs2482, NoopDelay>;

pub fn eight_channel(sim: &SimulatedDs2482) -> SimMaster {
    let bridge = Ds2482Builder::default()
        .with_model(Ds2482Model::EightChannel)
        .build(sim.clone(), NoopDelay::new())
        .unwrap();
    BusMaster::new(bridge, DeviceRegistry::with_defaults())
}
