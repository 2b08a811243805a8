//! DSPI baud rate generator
//!
//! SCK = sysclk x (1 + DBR) / (PBR prescaler x BR scaler)
//!
//! DBR doubles SCK, as the K64 reference manual specifies. It does not divide
//! by `(1 + DBR)`: a set DBR halves the effective division.
//!
//! The search only uses power-of-two scalers; the 6x entry exists in hardware
//! and is decoded, but never selected.

use fugit::HertzU32 as Hertz;

/// CTAR.PBR code and prescaler value, ascending.
pub const PRESCALERS: [(u8, u32); 4] = [(0b00, 2), (0b01, 3), (0b10, 5), (0b11, 7)];

/// CTAR.BR code and scaler value, ascending.
pub const SCALERS: [(u8, u32); 16] = [
    (0x0, 2),
    (0x1, 4),
    (0x2, 6),
    (0x3, 8),
    (0x4, 16),
    (0x5, 32),
    (0x6, 64),
    (0x7, 128),
    (0x8, 256),
    (0x9, 512),
    (0xA, 1024),
    (0xB, 2048),
    (0xC, 4096),
    (0xD, 8192),
    (0xE, 16384),
    (0xF, 32768),
];

/// Encoded baud rate, ready for CTAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BaudRate {
    /// Prescaler code
    pub pbr: u8,
    /// Scaler code
    pub br: u8,
    /// Double baud rate
    pub dbr: bool,
}

impl BaudRate {
    /// Largest total division the hardware offers.
    pub const SLOWEST: BaudRate = BaudRate {
        pbr: 0b11,
        br: 0xF,
        dbr: false,
    };

    pub fn prescaler(&self) -> u32 {
        lookup(&PRESCALERS, self.pbr)
    }

    pub fn scaler(&self) -> u32 {
        lookup(&SCALERS, self.br)
    }

    /// SCK frequency this setting produces, rounded down.
    pub fn frequency(&self, sysclk: Hertz) -> Hertz {
        let (num, den) = ratio(sysclk.to_Hz(), self.prescaler(), self.scaler(), self.dbr);
        Hertz::from_raw((num / den) as u32)
    }
}

// Codes are masked register fields, so every code has an entry.
fn lookup(table: &[(u8, u32)], code: u8) -> u32 {
    table
        .iter()
        .find(|&&(c, _)| c == code)
        .map_or(0, |&(_, value)| value)
}

/// SCK as an exact fraction, (numerator, denominator).
#[inline]
fn ratio(sysclk: u32, prescaler: u32, scaler: u32, dbr: bool) -> (u64, u64) {
    let num = sysclk as u64 * if dbr { 2 } else { 1 };
    (num, prescaler as u64 * scaler as u64)
}

/// Every setting the search considers, in preference order: undoubled before
/// doubled, then ascending prescaler, then ascending scaler.
pub fn candidates() -> impl Iterator<Item = BaudRate> {
    [false, true].into_iter().flat_map(|dbr| {
        PRESCALERS.into_iter().flat_map(move |(pbr, _)| {
            SCALERS
                .into_iter()
                .filter(|&(_, scaler)| scaler.is_power_of_two())
                .map(move |(br, _)| BaudRate { pbr, br, dbr })
        })
    })
}

/// Fastest setting whose SCK does not exceed `target`.
///
/// Later candidates only win when strictly faster, so DBR is used only when it
/// gains something. A target below the slowest setting gets [`BaudRate::SLOWEST`].
pub fn search(sysclk: Hertz, target: Hertz) -> BaudRate {
    let clk = sysclk.to_Hz();
    let target = target.to_Hz() as u64;

    let mut best: Option<(BaudRate, u64, u64)> = None;
    for c in candidates() {
        let (num, den) = ratio(clk, c.prescaler(), c.scaler(), c.dbr);
        if num > target * den {
            continue;
        }
        // num/den > best_num/best_den
        let faster = match best {
            Some((_, best_num, best_den)) => num * best_den > best_num * den,
            None => true,
        };
        if faster {
            best = Some((c, num, den));
        }
    }

    match best {
        Some((rate, _, _)) => rate,
        None => {
            warn!(
                "SPI: {} Hz is below the slowest SCK, using {} Hz",
                target,
                BaudRate::SLOWEST.frequency(sysclk).to_Hz()
            );
            BaudRate::SLOWEST
        }
    }
}
