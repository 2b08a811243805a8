//! Clocks and peripheral clock gating (SIM)

use fugit::HertzU32 as Hertz;

use crate::regs::{sim, Bus};

// Power on default: FEI mode, FLL at 640 x 32.768 kHz
const DEFAULT_FREQUENCY: Hertz = Hertz::from_raw(21_000_000);

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub struct Clocks {
    /// Core and bus clock, feeds the DSPI baud rate generator
    pub sysclk: Hertz,
}

impl Default for Clocks {
    fn default() -> Self {
        Self {
            sysclk: DEFAULT_FREQUENCY,
        }
    }
}

/// Clock gate of one peripheral.
#[derive(Copy, Clone, Eq, PartialEq, Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Gate {
    Spi0,
    Spi1,
    Spi2,
    PortA,
    PortB,
    PortC,
    PortD,
    PortE,
}

impl Gate {
    /// SCGC register address and the enable bit in it.
    pub const fn location(self) -> (u32, u32) {
        match self {
            Gate::Spi0 => (sim::SCGC6, 1 << 12),
            Gate::Spi1 => (sim::SCGC6, 1 << 13),
            Gate::Spi2 => (sim::SCGC3, 1 << 12),
            Gate::PortA => (sim::SCGC5, 1 << 9),
            Gate::PortB => (sim::SCGC5, 1 << 10),
            Gate::PortC => (sim::SCGC5, 1 << 11),
            Gate::PortD => (sim::SCGC5, 1 << 12),
            Gate::PortE => (sim::SCGC5, 1 << 13),
        }
    }
}

/// Turns peripheral clocks on. Enabling an already running clock is a no-op.
pub trait ClockGate {
    fn enable(&mut self, gate: Gate);
}

/// SIM clock gating registers.
pub struct Sim<B: Bus> {
    bus: B,
}

impl<B: Bus> Sim<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn is_enabled(&self, gate: Gate) -> bool {
        let (addr, mask) = gate.location();
        self.bus.read(addr) & mask != 0
    }
}

impl<B: Bus> ClockGate for Sim<B> {
    fn enable(&mut self, gate: Gate) {
        let (addr, mask) = gate.location();

        // SCGCx is shared by unrelated peripherals
        critical_section::with(|_| {
            self.bus.modify(addr, |w| w | mask);
        });
        trace!("clock gate {:?} on", gate);
    }
}
