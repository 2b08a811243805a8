#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
pub(crate) mod fmt;

pub mod gpio;
pub mod rcc;
pub mod regs;
pub mod spi;

#[cfg(feature = "critical-section-impl")]
use cortex_m as _;

pub use fugit::HertzU32 as Hertz;

pub mod prelude {
    pub use fugit::RateExtU32 as _;

    pub use crate::gpio::PinMux as _;
    pub use crate::rcc::ClockGate as _;
    pub use crate::regs::Bus as _;
}
