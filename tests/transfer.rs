use embedded_hal::spi::MODE_1;
use k64_hal::gpio::{Direction, Pins, Port};
use k64_hal::prelude::*;
use k64_hal::rcc::{Clocks, Gate, Sim};
use k64_hal::regs::{dspi, port, sim, Bus, Pushr, SimBus};
use k64_hal::spi::{Config, Dspi, TransferError, TransferState};

fn controller(bus: &SimBus) -> Dspi<&SimBus, Pins<&SimBus>, Sim<&SimBus>> {
    Dspi::new(bus, Pins::new(bus), Sim::new(bus), Clocks::default())
}

#[test]
fn bring_up_and_send() {
    let bus = SimBus::new();
    let mut spi = controller(&bus);

    let mut config = Config::default();
    config.frequency = 1.MHz();
    config.chip_select = Some(0);
    spi.apply(&config).unwrap();

    let writes = bus.writes();
    let position = |addr: u32| writes.iter().position(|&(a, _)| a == addr).unwrap();
    let mcr = dspi::BASES[0] + dspi::MCR;

    // clocks first, then pins, then the module
    assert!(position(sim::SCGC6) < position(sim::SCGC5));
    assert!(position(sim::SCGC5) < position(Port::D.pcr(1)));
    assert!(position(Port::D.pcr(1)) < position(Port::D.pcr(2)));
    assert!(position(Port::D.pcr(2)) < position(mcr));

    let (_, pins, gates) = spi.release();
    assert!(gates.is_enabled(Gate::Spi0));
    assert!(gates.is_enabled(Gate::PortD));
    assert!(!gates.is_enabled(Gate::Spi1));
    assert_eq!(pins.function(Port::D, 1), 2);
    assert_eq!(pins.function(Port::D, 2), 2);
    assert_eq!(pins.direction(Port::D, 1), Direction::Output);
    assert_eq!(bus.read(Port::D.gpio_base() + port::PDDR), 0b110);

    let mut spi = controller(&bus);
    spi.apply(&config).unwrap();
    spi.start_transfer(0).unwrap();
    bus.clear_log();

    spi.write(0, b"hi").unwrap();

    let pushr = dspi::BASES[0] + dspi::PUSHR;
    let sent: heapless::Vec<Pushr, 4> = bus
        .writes()
        .iter()
        .filter(|&&(a, _)| a == pushr)
        .map(|&(_, v)| Pushr::from(v))
        .collect();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].txdata(), b'h' as u32);
    assert_eq!(sent[1].txdata(), b'i' as u32);
    assert!(sent.iter().all(|w| w.pcs() == 1 && w.ctas() == 0));
}

#[test]
fn settings_reflect_hardware() {
    let bus = SimBus::new();
    let mut spi = controller(&bus);

    let mut config = Config::default();
    config.channel = 2;
    config.mode = MODE_1;
    config.frame_size = 10;
    config.frequency = 4.MHz();
    spi.apply(&config).unwrap();

    let s = spi.settings(2).unwrap();
    assert_eq!(s.mode, MODE_1);
    assert_eq!(s.frame_size, 10);
    // 21 MHz / (3 * 2); the doubled 42 MHz / (3 * 4) only ties
    assert_eq!(s.frequency.map(|f| f.to_Hz()), Some(3_500_000));
    assert!(bus.read(sim::SCGC3) & (1 << 12) != 0);
}

#[test]
fn lifecycle() {
    let bus = SimBus::new();
    let mut spi = controller(&bus);

    assert_eq!(spi.state(1), TransferState::Uninitialized);
    assert_eq!(spi.start_transfer(1), Err(TransferError::NotConfigured));

    let mut config = Config::default();
    config.channel = 1;
    spi.apply(&config).unwrap();
    assert_eq!(spi.state(1), TransferState::Configured);

    spi.start_transfer(1).unwrap();
    assert_eq!(spi.state(1), TransferState::TransferActive);
    spi.send_byte(1, 0x42).unwrap();

    spi.stop_transfer(1).unwrap();
    assert_eq!(spi.state(1), TransferState::TransferHalted);
    assert_eq!(spi.send_byte(1, 0x42), Err(TransferError::NotActive));
}
