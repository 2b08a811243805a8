//! SPI, Kinetis DSPI

/*
Three instances, SPI0 to SPI2
Master and slave mode
Frames of 4 to 16 bits, MSB or LSB first
Programmable clock polarity and phase
4-entry TX and RX FIFOs, can be disabled
Up to 6 peripheral chip selects
Baud rate = sysclk x (1 + DBR) / (PBR x BR)
*/

use embedded_hal::spi::{Mode, Phase, Polarity, MODE_0};
use fugit::HertzU32 as Hertz;

use crate::gpio::{Direction, Mux, PinMux, Port, PINS_PER_PORT};
use crate::rcc::{ClockGate, Clocks, Gate};
use crate::regs::{dspi, Bus, Ctar, CtarSlave, Mcr, Pushr};

pub mod baud;

pub use baud::BaudRate;

/// Number of DSPI instances.
pub const CHANNEL_COUNT: usize = 3;
/// Number of peripheral chip select lines per instance.
pub const CHIP_SELECTS: u8 = 6;

pub const MIN_FRAME_SIZE: u8 = 4;
pub const MAX_FRAME_SIZE: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConfigError {
    /// Channel index outside `0..CHANNEL_COUNT`
    InvalidChannel,
    /// Frame size outside 4 to 16 bits
    InvalidFrameSize,
    /// Chip select outside `0..CHIP_SELECTS`
    InvalidChipSelect,
    /// Pin number beyond the end of the port
    InvalidPin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferError {
    /// Data written while the channel is not transferring
    NotActive,
    /// Start or stop on a channel that was never configured
    NotConfigured,
    InvalidChannel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    LsbFirst,
    MsbFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Role {
    Slave,
    Master,
}

/// TX and RX FIFOs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Fifo {
    Disabled,
    Enabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransferState {
    Uninitialized,
    Configured,
    TransferActive,
    TransferHalted,
}

/// Clock and data-out pins, both on the same port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SpiPins {
    pub port: Port,
    pub sck: u8,
    pub sout: u8,
    /// Alternative function routing SPI to these pins
    pub mux: Mux,
}

impl Default for SpiPins {
    /// SPI0 on PTD1 (SCK) and PTD2 (SOUT)
    fn default() -> Self {
        Self {
            port: Port::D,
            sck: 1,
            sout: 2,
            mux: Mux::Alt2,
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Instance index, 0 for SPI0
    pub channel: u8,
    pub role: Role,
    pub fifo: Fifo,
    pub mode: Mode,
    /// Master only, a slave shifts MSB first
    pub bit_order: BitOrder,
    /// Bits per frame, 4 to 16
    pub frame_size: u8,
    /// Requested SCK. The closest rate not above it is used. Master only.
    pub frequency: Hertz,
    /// Peripheral chip select asserted for every frame
    pub chip_select: Option<u8>,
    pub pins: SpiPins,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: 0,
            role: Role::Master,
            fifo: Fifo::Enabled,
            mode: MODE_0,
            bit_order: BitOrder::MsbFirst,
            frame_size: 8,
            frequency: Hertz::from_raw(1_000_000),
            chip_select: None,
            pins: SpiPins::default(),
        }
    }
}

impl Config {
    // CPHA
    fn raw_phase(&self) -> bool {
        match self.mode.phase {
            Phase::CaptureOnSecondTransition => true,
            Phase::CaptureOnFirstTransition => false,
        }
    }

    // CPOL
    fn raw_polarity(&self) -> bool {
        match self.mode.polarity {
            Polarity::IdleLow => false,
            Polarity::IdleHigh => true,
        }
    }

    fn lsb_first(&self) -> bool {
        match self.bit_order {
            BitOrder::LsbFirst => true,
            BitOrder::MsbFirst => false,
        }
    }

    fn validate(&self) -> Result<Channel, ConfigError> {
        let channel = Channel::try_from(self.channel)?;

        if !(MIN_FRAME_SIZE..=MAX_FRAME_SIZE).contains(&self.frame_size) {
            return Err(ConfigError::InvalidFrameSize);
        }
        if self.chip_select.map_or(false, |cs| cs >= CHIP_SELECTS) {
            return Err(ConfigError::InvalidChipSelect);
        }
        if self.pins.sck >= PINS_PER_PORT || self.pins.sout >= PINS_PER_PORT {
            return Err(ConfigError::InvalidPin);
        }

        Ok(channel)
    }
}

/// What the registers of a channel currently encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Settings {
    pub role: Role,
    pub fifo: Fifo,
    pub mode: Mode,
    pub bit_order: BitOrder,
    pub frame_size: u8,
    /// `None` for a slave, the master drives SCK
    pub baud: Option<BaudRate>,
    /// SCK produced by `baud`
    pub frequency: Option<Hertz>,
}

/// A DSPI instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Channel {
    Spi0 = 0,
    Spi1 = 1,
    Spi2 = 2,
}

impl Channel {
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    #[inline]
    pub const fn base(self) -> u32 {
        dspi::BASES[self as usize]
    }

    pub const fn gate(self) -> Gate {
        match self {
            Channel::Spi0 => Gate::Spi0,
            Channel::Spi1 => Gate::Spi1,
            Channel::Spi2 => Gate::Spi2,
        }
    }

    #[inline]
    fn mcr(self) -> u32 {
        self.base() + dspi::MCR
    }

    #[inline]
    fn ctar(self) -> u32 {
        self.base() + dspi::CTAR0
    }

    #[inline]
    fn pushr(self) -> u32 {
        self.base() + dspi::PUSHR
    }
}

impl TryFrom<u8> for Channel {
    type Error = ConfigError;

    fn try_from(index: u8) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(Channel::Spi0),
            1 => Ok(Channel::Spi1),
            2 => Ok(Channel::Spi2),
            _ => Err(ConfigError::InvalidChannel),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ChannelState {
    state: TransferState,
    frame_size: u8,
    chip_select: Option<u8>,
}

impl ChannelState {
    const RESET: ChannelState = ChannelState {
        state: TransferState::Uninitialized,
        frame_size: MAX_FRAME_SIZE,
        chip_select: None,
    };
}

/// DSPI driver for all three instances.
///
/// Owns the register bus, the pin binding and the clock gates it needs, and
/// tracks the transfer state of each channel. Whoever holds the `Dspi` is the
/// only one driving these channels; nothing in here locks.
pub struct Dspi<B: Bus, P: PinMux, G: ClockGate> {
    bus: B,
    pins: P,
    gates: G,
    clocks: Clocks,
    channels: [ChannelState; CHANNEL_COUNT],
}

impl<B: Bus, P: PinMux, G: ClockGate> Dspi<B, P, G> {
    pub fn new(bus: B, pins: P, gates: G, clocks: Clocks) -> Self {
        Self {
            bus,
            pins,
            gates,
            clocks,
            channels: [ChannelState::RESET; CHANNEL_COUNT],
        }
    }

    /// Program a channel from `config`.
    ///
    /// Every field is checked before anything is written, so a rejected config
    /// leaves the hardware as it was. The channel ends up halted in
    /// [`TransferState::Configured`], also when it was transferring before.
    pub fn apply(&mut self, config: &Config) -> Result<(), ConfigError> {
        let ch = config.validate()?;

        self.gates.enable(ch.gate());
        self.gates.enable(config.pins.port.gate());

        let SpiPins { port, sck, sout, mux } = config.pins;
        self.pins.configure_pin_function(port, sck, mux);
        self.pins.set_direction(port, sck, Direction::Output);
        self.pins.configure_pin_function(port, sout, mux);
        self.pins.set_direction(port, sout, Direction::Output);

        // clocks on, stop transfers while CTAR changes
        self.modify_mcr(ch, |w| {
            w.set_mdis(false);
            w.set_halt(true);
            w.set_pcsis(config.chip_select.map_or(0, |cs| 1 << cs));
        });

        self.modify_mcr(ch, |w| w.set_mstr(config.role == Role::Master));
        self.modify_mcr(ch, |w| {
            let disabled = config.fifo == Fifo::Disabled;
            w.set_dis_txf(disabled);
            w.set_dis_rxf(disabled);
        });

        match config.role {
            Role::Master => self.apply_master_ctar(ch, config),
            Role::Slave => self.apply_slave_ctar(ch, config),
        }

        self.channels[ch.index()] = ChannelState {
            state: TransferState::Configured,
            frame_size: config.frame_size,
            chip_select: config.chip_select,
        };

        Ok(())
    }

    /// Clear HALT and let the module clock out queued frames.
    pub fn start_transfer(&mut self, channel: u8) -> Result<(), TransferError> {
        let ch = self.configured(channel)?;

        self.modify_mcr(ch, |w| w.set_halt(false));
        self.channels[ch.index()].state = TransferState::TransferActive;
        trace!("SPI{}: started", channel);

        Ok(())
    }

    /// Set HALT; the frame in flight completes, nothing new starts.
    pub fn stop_transfer(&mut self, channel: u8) -> Result<(), TransferError> {
        let ch = self.configured(channel)?;

        self.modify_mcr(ch, |w| w.set_halt(true));
        self.channels[ch.index()].state = TransferState::TransferHalted;
        trace!("SPI{}: halted", channel);

        Ok(())
    }

    /// Push one frame carrying `data`.
    ///
    /// Bits above the configured frame size are dropped. The word goes straight
    /// into PUSHR; neither FIFO space nor completion is checked.
    pub fn send_byte(&mut self, channel: u8, data: u8) -> Result<(), TransferError> {
        let ch = Channel::try_from(channel).map_err(|_| TransferError::InvalidChannel)?;
        let state = self.channels[ch.index()];
        if state.state != TransferState::TransferActive {
            return Err(TransferError::NotActive);
        }

        let mask = (1u32 << state.frame_size) - 1;
        let mut w = Pushr::from(0);
        w.set_ctas(0);
        if let Some(cs) = state.chip_select {
            w.set_pcs(1 << cs);
        }
        w.set_txdata(data as u32 & mask);
        self.bus.write(ch.pushr(), w.into());

        Ok(())
    }

    /// [`send_byte`](Self::send_byte) for each byte, stopping at the first error.
    pub fn write(&mut self, channel: u8, data: &[u8]) -> Result<(), TransferError> {
        for &b in data {
            self.send_byte(channel, b)?;
        }
        Ok(())
    }

    /// Out-of-range channels report `Uninitialized`.
    pub fn state(&self, channel: u8) -> TransferState {
        match Channel::try_from(channel) {
            Ok(ch) => self.channels[ch.index()].state,
            Err(_) => TransferState::Uninitialized,
        }
    }

    /// Decode the channel registers.
    ///
    /// CTAR is read with the layout MCR.MSTR selects. A slave has no baud rate
    /// and always shifts MSB first.
    pub fn settings(&self, channel: u8) -> Result<Settings, ConfigError> {
        let ch = Channel::try_from(channel)?;
        let mcr = Mcr::from(self.bus.read(ch.mcr()));
        let bits = self.bus.read(ch.ctar());

        let fifo = if mcr.dis_txf() && mcr.dis_rxf() {
            Fifo::Disabled
        } else {
            Fifo::Enabled
        };

        if !mcr.mstr() {
            let ctar = CtarSlave::from(bits);
            return Ok(Settings {
                role: Role::Slave,
                fifo,
                mode: decode_mode(ctar.cpol(), ctar.cpha()),
                bit_order: BitOrder::MsbFirst,
                frame_size: ctar.fmsz() as u8 + 1,
                baud: None,
                frequency: None,
            });
        }

        let ctar = Ctar::from(bits);
        let baud = BaudRate {
            pbr: ctar.pbr() as u8,
            br: ctar.br() as u8,
            dbr: ctar.dbr(),
        };

        Ok(Settings {
            role: Role::Master,
            fifo,
            mode: decode_mode(ctar.cpol(), ctar.cpha()),
            bit_order: if ctar.lsbfe() {
                BitOrder::LsbFirst
            } else {
                BitOrder::MsbFirst
            },
            frame_size: ctar.fmsz() as u8 + 1,
            baud: Some(baud),
            frequency: Some(baud.frequency(self.clocks.sysclk)),
        })
    }

    pub fn clocks(&self) -> &Clocks {
        &self.clocks
    }

    /// Give back the bus, pin binding and clock gates.
    pub fn release(self) -> (B, P, G) {
        (self.bus, self.pins, self.gates)
    }

    fn configured(&self, channel: u8) -> Result<Channel, TransferError> {
        let ch = Channel::try_from(channel).map_err(|_| TransferError::InvalidChannel)?;
        match self.channels[ch.index()].state {
            TransferState::Uninitialized => Err(TransferError::NotConfigured),
            _ => Ok(ch),
        }
    }

    fn modify_mcr(&self, ch: Channel, f: impl FnOnce(&mut Mcr)) {
        self.bus.modify(ch.mcr(), |bits| {
            let mut w = Mcr::from(bits);
            f(&mut w);
            w.into()
        });
    }

    // polarity, phase, frame size, bit order, baud: one write each
    fn apply_master_ctar(&self, ch: Channel, config: &Config) {
        let baud = baud::search(self.clocks.sysclk, config.frequency);

        self.modify_ctar(ch, |w| w.set_cpol(config.raw_polarity()));
        self.modify_ctar(ch, |w| w.set_cpha(config.raw_phase()));
        self.modify_ctar(ch, |w| w.set_fmsz((config.frame_size - 1) as u32));
        self.modify_ctar(ch, |w| w.set_lsbfe(config.lsb_first()));
        self.modify_ctar(ch, |w| {
            w.set_pbr(baud.pbr as u32);
            w.set_br(baud.br as u32);
            w.set_dbr(baud.dbr);
        });

        debug!(
            "SPI{}: master, {} Hz requested, {} Hz set, {}-bit frames",
            ch.index(),
            config.frequency.to_Hz(),
            baud.frequency(self.clocks.sysclk).to_Hz(),
            config.frame_size
        );
    }

    // The slave layout has a 5-bit FMSZ reaching into the master DBR bit, and no
    // bit order or baud fields.
    fn apply_slave_ctar(&self, ch: Channel, config: &Config) {
        self.modify_ctar_slave(ch, |w| w.set_cpol(config.raw_polarity()));
        self.modify_ctar_slave(ch, |w| w.set_cpha(config.raw_phase()));
        self.modify_ctar_slave(ch, |w| w.set_fmsz((config.frame_size - 1) as u32));
        // drop whatever a previous master configuration left in the reserved bits
        self.modify_ctar_slave(ch, |w| w.set_reserved(0));

        if config.bit_order == BitOrder::LsbFirst {
            warn!("SPI{}: slave frames are MSB first, bit order ignored", ch.index());
        }
        debug!("SPI{}: slave, {}-bit frames", ch.index(), config.frame_size);
    }

    fn modify_ctar(&self, ch: Channel, f: impl FnOnce(&mut Ctar)) {
        self.bus.modify(ch.ctar(), |bits| {
            let mut w = Ctar::from(bits);
            f(&mut w);
            w.into()
        });
    }

    fn modify_ctar_slave(&self, ch: Channel, f: impl FnOnce(&mut CtarSlave)) {
        self.bus.modify(ch.ctar(), |bits| {
            let mut w = CtarSlave::from(bits);
            f(&mut w);
            w.into()
        });
    }
}

fn decode_mode(cpol: bool, cpha: bool) -> Mode {
    Mode {
        polarity: if cpol {
            Polarity::IdleHigh
        } else {
            Polarity::IdleLow
        },
        phase: if cpha {
            Phase::CaptureOnSecondTransition
        } else {
            Phase::CaptureOnFirstTransition
        },
    }
}

impl embedded_hal::spi::Error for TransferError {
    fn kind(&self) -> embedded_hal::spi::ErrorKind {
        embedded_hal::spi::ErrorKind::Other
    }
}
