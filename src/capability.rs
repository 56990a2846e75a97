//! Device generation classification.
//!
//! FTDI chips report their silicon generation in the major part of
//! `bcdDevice`. The baud-rate encoder only cares about three independent
//! properties derived from it, so they are kept as separate flags rather
//! than an enum: a device can be both "modern" and "MPSSE-capable".

/// Capability flags steering the baud-rate encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DeviceCapabilities {
    /// Original AM-class silicon with restricted fractional divisors.
    pub legacy: bool,
    /// Hi-speed silicon able to run the UART from a 12 MHz reference.
    pub modern: bool,
    /// Chips with an MPSSE engine; their `index` field carries the port.
    pub mpsse: bool,
}

impl DeviceCapabilities {
    /// Classify a device from its reported major version.
    pub fn from_version_major(major: u8) -> Self {
        Self {
            legacy: is_legacy(major),
            modern: is_modern(major),
            mpsse: has_mpsse(major),
        }
    }
}

/// Devices older than version 2 use the AM divisor rules.
#[inline]
pub fn is_legacy(major: u8) -> bool {
    major < 2
}

/// FT2232H, FT4232H and FT232H.
#[inline]
pub fn is_modern(major: u8) -> bool {
    matches!(major, 7..=9)
}

/// FT2232C/D and the H family.
#[inline]
pub fn has_mpsse(major: u8) -> bool {
    matches!(major, 5 | 7..=9)
}

/// Decode the major version out of a BCD `bcdDevice` value.
///
/// `0x0600` decodes to 6, `0x1000` to 10.
pub fn version_major_from_bcd(bcd: u16) -> u8 {
    let tens = ((bcd >> 12) & 0xF) as u8;
    let ones = ((bcd >> 8) & 0xF) as u8;
    tens * 10 + ones
}

/// FTDI chip families, as far as they can be told apart by version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipType {
    /// Original FTDI chip (FT8U232AM).
    Am,
    /// B-type chip (FT232BM, FT245BM).
    Bm,
    /// Dual-port chip (FT2232C/D/L).
    Ft2232C,
    /// FT232R / FT245R.
    Ft232R,
    /// Dual hi-speed chip (FT2232H).
    Ft2232H,
    /// Quad-port chip (FT4232H).
    Ft4232H,
    /// Single hi-speed chip (FT232H).
    Ft232H,
    /// FT230X / FT231X / FT234XD.
    Ft230X,
    /// Anything else reporting an FTDI-compatible layout.
    Unknown,
}

impl ChipType {
    /// Map a major device version onto a chip family.
    ///
    /// AM parts report `bcdDevice` 0x0200 and BM parts 0x0400. The label
    /// does not drive encoding: only versions below 2 take the legacy baud
    /// rate path, so an AM reporting 2 is encoded like a BM.
    pub fn from_version_major(major: u8) -> Self {
        match major {
            0..=2 => Self::Am,
            3 | 4 => Self::Bm,
            5 => Self::Ft2232C,
            6 => Self::Ft232R,
            7 => Self::Ft2232H,
            8 => Self::Ft4232H,
            9 => Self::Ft232H,
            10 => Self::Ft230X,
            _ => Self::Unknown,
        }
    }
}
