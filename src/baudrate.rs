//! Baud rate calculation for FTDI chips.
//!
//! FTDI UARTs derive their bit clock from a 3 MHz reference (12 MHz on
//! hi-speed parts) divided by a fixed-point divisor with 3 fractional bits.
//! Only some fractions exist on the hardware, and AM-class parts support
//! fewer of them, so the requested rate is snapped to the nearest divisor
//! the chip can actually produce.

use crate::capability::DeviceCapabilities;
use crate::constants::{BASE_CLK, HIGH_SPEED_CLK, HIGH_SPEED_INDEX_BIT};
use crate::error::{Error, Result};

/// The result of a baud rate conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BaudDivisor {
    /// The `value` field for the `SIO_SET_BAUDRATE_REQUEST` control transfer.
    pub value: u16,
    /// The `index` field for the `SIO_SET_BAUDRATE_REQUEST` control transfer.
    pub index: u16,
    /// The rate the chip will actually run at.
    pub actual: u32,
}

/// Fractional code lookup table: maps 3-bit sub-divisor to FTDI encoding.
const FRAC_CODE: [u32; 8] = [0, 3, 2, 4, 1, 5, 6, 7];

/// AM-type: round-down adjustments for unsupported fractional values.
const AM_ADJUST_DN: [u32; 8] = [0, 0, 0, 1, 0, 1, 2, 3];
/// AM-type: round-up adjustments for unsupported fractional values.
const AM_ADJUST_UP: [u32; 8] = [0, 0, 0, 1, 0, 3, 2, 1];

/// Largest divisor usable on AM-type chips.
const AM_MAX_DIVISOR: u32 = 0x1FFF8;
/// Largest divisor usable on everything else.
const MAX_DIVISOR: u32 = 0x1FFFF;

/// Lowest rate accepted by the encoder.
pub const MIN_BAUD_RATE: u32 = (2 * BASE_CLK) / (2 * 16384 + 1);

/// Highest rate accepted for the given capability class.
pub fn max_baud_rate(caps: DeviceCapabilities) -> u32 {
    if caps.modern {
        HIGH_SPEED_CLK
    } else {
        BASE_CLK
    }
}

/// Snap a base-clock candidate divisor onto one the chip supports.
fn snap_divisor(candidate: u32, legacy: bool) -> u32 {
    if candidate <= 8 {
        8
    } else if legacy && candidate < 12 {
        12
    } else if candidate < 16 {
        16
    } else if legacy {
        (candidate + AM_ADJUST_UP[(candidate & 7) as usize]).min(AM_MAX_DIVISOR)
    } else {
        candidate.min(MAX_DIVISOR)
    }
}

/// Convert a requested baud rate to FTDI register values.
///
/// `interface_index` is merged into the `index` field of MPSSE-capable
/// chips, which use its low byte to select the port.
pub fn encode(
    baudrate: u32,
    caps: DeviceCapabilities,
    interface_index: u16,
) -> Result<BaudDivisor> {
    let max = max_baud_rate(caps);
    if baudrate < MIN_BAUD_RATE || baudrate > max {
        return Err(Error::UnsupportedBaudRate {
            requested: baudrate,
            min: MIN_BAUD_RATE,
            max,
        });
    }

    let high_speed = baudrate > BASE_CLK;
    let refclk = if high_speed { HIGH_SPEED_CLK } else { BASE_CLK };
    let refclk8 = refclk as u64 * 8;

    let mut divisor = (refclk8 / baudrate as u64) as u32;
    if caps.legacy {
        divisor -= AM_ADJUST_DN[(divisor & 7) as usize];
    }

    let mut best_divisor = 0u32;
    let mut best_baud = 0u32;
    let mut best_baud_diff = 0u32;

    for i in 0..2 {
        let mut try_divisor = divisor + i;
        if !high_speed {
            try_divisor = snap_divisor(try_divisor, caps.legacy);
        }

        let baud_estimate = ((refclk8 + (try_divisor / 2) as u64) / try_divisor as u64) as u32;
        let baud_diff = baud_estimate.abs_diff(baudrate);

        if i == 0 || baud_diff < best_baud_diff {
            best_divisor = try_divisor;
            best_baud = baud_estimate;
            best_baud_diff = baud_diff;
            if baud_diff == 0 {
                break;
            }
        }
    }

    let mut encoded = (best_divisor >> 3) | (FRAC_CODE[(best_divisor & 7) as usize] << 14);

    // Special cases
    if encoded == 1 {
        encoded = 0; // divisor 1: full reference rate
    } else if encoded == 0x4001 {
        encoded = 1; // divisor 1.5
    }

    let value = (encoded & 0xFFFF) as u16;
    let mut index = if caps.mpsse {
        (((encoded >> 8) & 0xFF00) as u16) | interface_index
    } else {
        ((encoded >> 16) & 0xFFFF) as u16
    };
    if high_speed {
        index |= HIGH_SPEED_INDEX_BIT;
    }

    log::trace!(
        "baud {baudrate}: divisor {best_divisor:#x} -> value {value:#06x} index {index:#06x} (actual {best_baud})"
    );

    Ok(BaudDivisor {
        value,
        index,
        actual: best_baud,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: DeviceCapabilities = DeviceCapabilities {
        legacy: true,
        modern: false,
        mpsse: false,
    };
    const PLAIN: DeviceCapabilities = DeviceCapabilities {
        legacy: false,
        modern: false,
        mpsse: false,
    };
    const MODERN_NO_MPSSE: DeviceCapabilities = DeviceCapabilities {
        legacy: false,
        modern: true,
        mpsse: false,
    };
    const HI_SPEED: DeviceCapabilities = DeviceCapabilities {
        legacy: false,
        modern: true,
        mpsse: true,
    };

    #[test]
    fn legacy_9600() {
        // 24_000_000 / 9600 = 2500 = 312 + 4/8, fraction code for 4 is 1
        let r = encode(9600, LEGACY, 0).unwrap();
        assert_eq!(r.value, 0x4138);
        assert_eq!(r.index, 0);
        assert_eq!(r.actual, 9600);
    }

    #[test]
    fn legacy_300() {
        let r = encode(300, LEGACY, 0).unwrap();
        assert_eq!(r.value, 0x2710);
        assert_eq!(r.index, 0);
        assert_eq!(r.actual, 300);
    }

    #[test]
    fn legacy_57600_prefers_second_candidate() {
        // 416 gives 57692, 417 gives 57554: 417 is closer
        let r = encode(57600, LEGACY, 0).unwrap();
        assert_eq!(r.value, 0xC034);
        assert_eq!(r.actual, 57554);
    }

    #[test]
    fn modern_non_mpsse_115200() {
        // 208 gives 115385, 209 gives 114833
        let r = encode(115_200, MODERN_NO_MPSSE, 0).unwrap();
        assert_eq!(r.value, 0x001A);
        assert_eq!(r.index, 0);
        assert_eq!(r.actual, 115_385);
    }

    #[test]
    fn three_mbaud_maps_to_divisor_zero() {
        let r = encode(3_000_000, HI_SPEED, 0).unwrap();
        assert_eq!(r.value, 0);
        assert_eq!(r.index, 0);
        assert_eq!(r.actual, 3_000_000);

        let r = encode(3_000_000, PLAIN, 0).unwrap();
        assert_eq!(r.value, 0);
        assert_eq!(r.index, 0);
    }

    #[test]
    fn high_speed_sets_index_bit() {
        let r = encode(6_000_000, HI_SPEED, 0).unwrap();
        assert_eq!(r.value, 2);
        assert_eq!(r.index, 0x0200);
        assert_eq!(r.actual, 6_000_000);

        let r = encode(12_000_000, HI_SPEED, 0).unwrap();
        assert_eq!(r.value, 0);
        assert_eq!(r.index, 0x0200);
        assert_eq!(r.actual, 12_000_000);
    }

    #[test]
    fn mpsse_index_includes_interface() {
        let r = encode(9600, HI_SPEED, 2).unwrap();
        assert_eq!(r.index & 0xFF, 2);
    }

    #[test]
    fn small_divisors_snap_to_sixteen() {
        // 24_000_000 / 2_000_000 = 12, below 16 on non-legacy silicon
        let r = encode(2_000_000, PLAIN, 0).unwrap();
        assert_eq!(r.value, 2);
        assert_eq!(r.actual, 1_500_000);
    }

    #[test]
    fn legacy_small_divisors_snap_to_twelve() {
        // 24_000_000 / 2_400_000 = 10
        let r = encode(2_400_000, LEGACY, 0).unwrap();
        assert_eq!(r.actual, 2_000_000);
        // divisor 12 = 1 + 4/8 -> 0x4001, remapped to 1
        assert_eq!(r.value, 1);
    }

    #[test]
    fn minimum_rate_clamps_divisor() {
        assert_eq!(MIN_BAUD_RATE, 183);
        let r = encode(183, PLAIN, 0).unwrap();
        // 0x1FFFF = 16383 + 7/8
        assert_eq!(r.value, 0xFFFF);
        assert_eq!(r.index, 0x0001);
        assert_eq!(r.actual, 183);
    }

    #[test]
    fn below_minimum_rejected() {
        assert!(matches!(
            encode(100, PLAIN, 0),
            Err(Error::UnsupportedBaudRate { requested: 100, .. })
        ));
        assert!(encode(0, HI_SPEED, 0).is_err());
    }

    #[test]
    fn high_speed_needs_modern() {
        assert!(matches!(
            encode(13_000_000, PLAIN, 0),
            Err(Error::UnsupportedBaudRate { max: 3_000_000, .. })
        ));
        assert!(encode(6_000_000, LEGACY, 0).is_err());
        assert!(encode(13_000_000, HI_SPEED, 0).is_err());
    }

    #[test]
    fn standard_rates_within_tolerance() {
        for caps in [LEGACY, PLAIN, MODERN_NO_MPSSE, HI_SPEED] {
            for rate in [300u32, 1200, 9600, 19200, 38400, 57600, 115_200] {
                let r = encode(rate, caps, 0).unwrap();
                let err = r.actual.abs_diff(rate) as f64 / rate as f64;
                assert!(err < 0.03, "{caps:?} {rate}: actual {}", r.actual);
            }
        }
    }
}
