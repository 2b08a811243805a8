//! GPIO
//!
//! Pin multiplexing (PORTx_PCRn) and data direction (GPIOx_PDDR). Drivers that
//! need pins only see the [`PinMux`] trait.

use crate::rcc::Gate;
use crate::regs::{port, Bus, Pcr};

/// Pins per port
pub const PINS_PER_PORT: u8 = 32;

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Port {
    A,
    B,
    C,
    D,
    E,
}

impl Port {
    #[inline]
    const fn index(self) -> u32 {
        self as u32
    }

    /// PORTx block, holds the pin control registers.
    #[inline]
    pub const fn control_base(self) -> u32 {
        port::PORTA + self.index() * port::PORT_STRIDE
    }

    /// GPIOx block, holds data and direction registers.
    #[inline]
    pub const fn gpio_base(self) -> u32 {
        port::GPIOA + self.index() * port::GPIO_STRIDE
    }

    #[inline]
    pub const fn pcr(self, pin: u8) -> u32 {
        self.control_base() + 4 * pin as u32
    }

    pub const fn gate(self) -> Gate {
        match self {
            Port::A => Gate::PortA,
            Port::B => Gate::PortB,
            Port::C => Gate::PortC,
            Port::D => Gate::PortD,
            Port::E => Gate::PortE,
        }
    }
}

/// PCR.MUX selection. Alternative functions are chip specific, see the signal
/// multiplexing table.
#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Mux {
    /// Analog / disabled
    Disabled = 0,
    Gpio = 1,
    Alt2 = 2,
    Alt3 = 3,
    Alt4 = 4,
    Alt5 = 5,
    Alt6 = 6,
    Alt7 = 7,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    Input,
    Output,
}

/// The pin operations peripheral drivers depend on.
pub trait PinMux {
    fn configure_pin_function(&mut self, port: Port, pin: u8, mux: Mux);

    fn set_direction(&mut self, port: Port, pin: u8, direction: Direction);
}

/// PORT and GPIO registers of all five ports.
///
/// The port clock must be running before a pin is touched.
pub struct Pins<B: Bus> {
    bus: B,
}

impl<B: Bus> Pins<B> {
    pub fn new(bus: B) -> Self {
        Self { bus }
    }

    pub fn function(&self, port: Port, pin: u8) -> u32 {
        Pcr::from(self.bus.read(port.pcr(pin))).mux()
    }

    pub fn direction(&self, port: Port, pin: u8) -> Direction {
        if self.bus.read(port.gpio_base() + port::PDDR) & (1 << pin) != 0 {
            Direction::Output
        } else {
            Direction::Input
        }
    }
}

impl<B: Bus> PinMux for Pins<B> {
    fn configure_pin_function(&mut self, port: Port, pin: u8, mux: Mux) {
        debug_assert!(pin < PINS_PER_PORT);

        // one PCR per pin, nothing else lives in it
        self.bus.modify(port.pcr(pin), |w| {
            let mut pcr = Pcr::from(w);
            pcr.set_isf(false); // write-1-to-clear
            pcr.set_mux(mux as u32);
            pcr.into()
        });
        trace!("P{:?}{} mux {:?}", port, pin, mux);
    }

    fn set_direction(&mut self, port: Port, pin: u8, direction: Direction) {
        debug_assert!(pin < PINS_PER_PORT);

        let pddr = port.gpio_base() + port::PDDR;
        let bit = 1 << pin;

        // PDDR is shared by the whole port
        critical_section::with(|_| {
            self.bus.modify(pddr, |w| match direction {
                Direction::Output => w | bit,
                Direction::Input => w & !bit,
            });
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regs::SimBus;

    #[test]
    fn register_addresses() {
        assert_eq!(Port::A.pcr(0), 0x4004_9000);
        assert_eq!(Port::D.pcr(1), 0x4004_C004);
        assert_eq!(Port::C.gpio_base() + port::PDDR, 0x400F_F094);
    }

    #[test]
    fn mux_only_touches_mux_field() {
        let bus = SimBus::new();
        // pull-up enabled, drive strength high
        bus.write(Port::D.pcr(2), 0x0000_0043);
        let mut pins = Pins::new(&bus);

        pins.configure_pin_function(Port::D, 2, Mux::Alt2);

        assert_eq!(bus.read(Port::D.pcr(2)), 0x0000_0243);
        assert_eq!(pins.function(Port::D, 2), 2);
    }

    #[test]
    fn direction_bits_are_independent() {
        let bus = SimBus::new();
        let mut pins = Pins::new(&bus);

        pins.set_direction(Port::B, 3, Direction::Output);
        pins.set_direction(Port::B, 21, Direction::Output);
        pins.set_direction(Port::B, 3, Direction::Input);

        assert_eq!(pins.direction(Port::B, 3), Direction::Input);
        assert_eq!(pins.direction(Port::B, 21), Direction::Output);
        assert_eq!(bus.read(Port::B.gpio_base() + port::PDDR), 1 << 21);
    }
}
