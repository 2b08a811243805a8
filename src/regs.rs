//! Register model
//!
//! Register addresses, reset values and bit layouts for the blocks this crate
//! touches, plus the [`Bus`] used to reach them. Drivers never dereference raw
//! addresses themselves; they go through a `Bus`, which is either the real
//! memory-mapped one ([`Mmio`]) or the in-memory [`SimBus`].

use core::cell::RefCell;
use core::ptr;

use bitfield::bitfield;
use heapless::{FnvIndexMap, Vec};

/// DSPI register offsets, relative to a channel base address.
pub mod dspi {
    /// Module Configuration Register
    pub const MCR: u32 = 0x00;
    /// Transfer Count Register
    pub const TCR: u32 = 0x08;
    /// Clock and Transfer Attributes Register 0
    pub const CTAR0: u32 = 0x0C;
    /// Status Register
    pub const SR: u32 = 0x2C;
    /// PUSH TX FIFO Register
    pub const PUSHR: u32 = 0x34;

    /// MDIS and HALT set: module stopped, clocks off.
    pub const MCR_RESET: u32 = 0x0000_4001;
    /// FMSZ = 15 (16-bit frames), everything else zero.
    pub const CTAR_RESET: u32 = 0x7800_0000;
    pub const SR_RESET: u32 = 0x0200_0000;

    /// SPI0, SPI1, SPI2
    pub const BASES: [u32; 3] = [0x4002_C000, 0x4002_D000, 0x400A_C000];
}

/// System Integration Module, clock gating.
pub mod sim {
    pub const SCGC3: u32 = 0x4004_8030;
    pub const SCGC5: u32 = 0x4004_8038;
    pub const SCGC6: u32 = 0x4004_803C;
}

/// PORT (pin control) and GPIO blocks.
pub mod port {
    pub const PORTA: u32 = 0x4004_9000;
    /// Distance between two PORTx blocks
    pub const PORT_STRIDE: u32 = 0x1000;

    pub const GPIOA: u32 = 0x400F_F000;
    /// Distance between two GPIOx blocks
    pub const GPIO_STRIDE: u32 = 0x40;

    /// Port Data Direction Register, relative to a GPIOx block.
    pub const PDDR: u32 = 0x14;
}

bitfield! {
    /// DSPI Module Configuration Register
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Mcr(u32);
    impl Debug;
    u32;
    /// Master mode
    pub mstr, set_mstr: 31;
    pub cont_scke, set_cont_scke: 30;
    pub dconf, set_dconf: 29, 28;
    pub frz, set_frz: 27;
    pub mtfe, set_mtfe: 26;
    pub rooe, set_rooe: 24;
    /// Peripheral chip select inactive state, one bit per PCS line
    pub pcsis, set_pcsis: 21, 16;
    pub doze, set_doze: 15;
    /// Module disable
    pub mdis, set_mdis: 14;
    pub dis_txf, set_dis_txf: 13;
    pub dis_rxf, set_dis_rxf: 12;
    pub clr_txf, set_clr_txf: 11;
    pub clr_rxf, set_clr_rxf: 10;
    pub smpl_pt, set_smpl_pt: 9, 8;
    /// Stops transfers when set
    pub halt, set_halt: 0;
}

bitfield! {
    /// DSPI Clock and Transfer Attributes Register (master layout)
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Ctar(u32);
    impl Debug;
    u32;
    /// Double baud rate
    pub dbr, set_dbr: 31;
    /// Frame size minus one
    pub fmsz, set_fmsz: 30, 27;
    pub cpol, set_cpol: 26;
    pub cpha, set_cpha: 25;
    pub lsbfe, set_lsbfe: 24;
    pub pcssck, set_pcssck: 23, 22;
    pub pasc, set_pasc: 21, 20;
    pub pdt, set_pdt: 19, 18;
    /// Baud rate prescaler code
    pub pbr, set_pbr: 17, 16;
    pub cssck, set_cssck: 15, 12;
    pub asc, set_asc: 11, 8;
    pub dt, set_dt: 7, 4;
    /// Baud rate scaler code
    pub br, set_br: 3, 0;
}

bitfield! {
    /// DSPI Clock and Transfer Attributes Register (slave layout)
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct CtarSlave(u32);
    impl Debug;
    u32;
    /// Frame size minus one, one bit wider than in master mode
    pub fmsz, set_fmsz: 31, 27;
    pub cpol, set_cpol: 26;
    pub cpha, set_cpha: 25;
    /// Bits only the master layout defines, reserved here
    pub reserved, set_reserved: 24, 0;
}

bitfield! {
    /// DSPI PUSH TX FIFO Register, master command + data word
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Pushr(u32);
    impl Debug;
    u32;
    pub cont, set_cont: 31;
    /// Which CTAR applies to this frame
    pub ctas, set_ctas: 30, 28;
    pub eoq, set_eoq: 27;
    pub ctcnt, set_ctcnt: 26;
    /// Chip selects asserted for this frame
    pub pcs, set_pcs: 21, 16;
    pub txdata, set_txdata: 15, 0;
}

bitfield! {
    /// PORTx Pin Control Register
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Pcr(u32);
    impl Debug;
    u32;
    pub isf, set_isf: 24;
    pub irqc, set_irqc: 19, 16;
    pub lk, set_lk: 15;
    /// Pin mux control
    pub mux, set_mux: 10, 8;
    pub dse, set_dse: 6;
    pub ode, set_ode: 5;
    pub pfe, set_pfe: 4;
    pub sre, set_sre: 2;
    pub pe, set_pe: 1;
    pub ps, set_ps: 0;
}

macro_rules! impl_raw {
    ($($reg:ident),* $(,)?) => {
        $(
            impl From<u32> for $reg {
                #[inline]
                fn from(bits: u32) -> Self {
                    Self(bits)
                }
            }

            impl From<$reg> for u32 {
                #[inline]
                fn from(reg: $reg) -> u32 {
                    reg.0
                }
            }
        )*
    };
}

impl_raw!(Mcr, Ctar, CtarSlave, Pushr, Pcr);

/// 32-bit register access.
///
/// `modify` is a plain read followed by a write. It is not atomic; callers that
/// share a register with other contexts wrap it in a critical section.
pub trait Bus {
    fn read(&self, addr: u32) -> u32;

    fn write(&self, addr: u32, value: u32);

    #[inline]
    fn modify<F: FnOnce(u32) -> u32>(&self, addr: u32, f: F) {
        let value = self.read(addr);
        self.write(addr, f(value));
    }
}

impl<T: Bus> Bus for &T {
    #[inline]
    fn read(&self, addr: u32) -> u32 {
        (**self).read(addr)
    }

    #[inline]
    fn write(&self, addr: u32, value: u32) {
        (**self).write(addr, value)
    }
}

/// The memory-mapped peripheral space of the running chip.
#[derive(Debug)]
pub struct Mmio {
    _private: (),
}

impl Mmio {
    /// # Safety
    ///
    /// Only valid on a K64 target. Every `Mmio` aliases the same hardware, so the
    /// caller keeps to one owner per peripheral.
    #[inline]
    pub unsafe fn steal() -> Self {
        Self { _private: () }
    }
}

impl Bus for Mmio {
    #[inline]
    fn read(&self, addr: u32) -> u32 {
        unsafe { ptr::read_volatile(addr as usize as *const u32) }
    }

    #[inline]
    fn write(&self, addr: u32, value: u32) {
        unsafe { ptr::write_volatile(addr as usize as *mut u32, value) }
    }
}

/// Number of distinct addresses a [`SimBus`] can hold.
pub const SIM_REGISTERS: usize = 64;
/// Number of writes a [`SimBus`] remembers before it stops logging.
pub const SIM_LOG_LEN: usize = 128;

/// Register file held in RAM.
///
/// Starts from the K64 reset values of the DSPI registers; any other address
/// reads as zero until written. Every write is appended to a log so the order
/// of register programming can be inspected.
pub struct SimBus {
    regs: RefCell<FnvIndexMap<u32, u32, SIM_REGISTERS>>,
    log: RefCell<Vec<(u32, u32), SIM_LOG_LEN>>,
}

impl SimBus {
    pub fn new() -> Self {
        let mut regs = FnvIndexMap::new();
        for base in dspi::BASES {
            // 12 entries into an empty 64-slot map, cannot fail
            let _ = regs.insert(base + dspi::MCR, dspi::MCR_RESET);
            let _ = regs.insert(base + dspi::CTAR0, dspi::CTAR_RESET);
            let _ = regs.insert(base + dspi::SR, dspi::SR_RESET);
            let _ = regs.insert(base + dspi::TCR, 0);
        }

        Self {
            regs: RefCell::new(regs),
            log: RefCell::new(Vec::new()),
        }
    }

    /// Writes seen so far, oldest first, as `(address, value)`.
    pub fn writes(&self) -> Vec<(u32, u32), SIM_LOG_LEN> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }
}

impl Default for SimBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimBus {
    fn read(&self, addr: u32) -> u32 {
        self.regs.borrow().get(&addr).copied().unwrap_or(0)
    }

    fn write(&self, addr: u32, value: u32) {
        if self.regs.borrow_mut().insert(addr, value).is_err() {
            warn!("sim bus full, dropped write to {:#x}", addr);
        }
        let _ = self.log.borrow_mut().push((addr, value));
    }
}
