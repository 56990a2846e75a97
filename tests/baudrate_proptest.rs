//! Property-based tests for the baud rate encoder.
//!
//! Uses `proptest` to sweep requested rates across every device generation
//! and check the encoder's range, tolerance and `index` layout.

use ftdi_serial::baudrate::{encode, max_baud_rate};
use ftdi_serial::{DeviceCapabilities, Error, MIN_BAUD_RATE};
use proptest::prelude::*;

const HIGH_SPEED_BIT: u16 = 1 << 9;

/// Capabilities of every known device generation.
fn caps_strategy() -> impl Strategy<Value = DeviceCapabilities> {
    (0u8..=10).prop_map(DeviceCapabilities::from_version_major)
}

proptest! {
    /// Every rate inside the range is accepted and produces a sane estimate.
    #[test]
    fn accepts_whole_range(caps in caps_strategy(), seed in any::<u32>()) {
        let max = max_baud_rate(caps);
        let rate = MIN_BAUD_RATE + seed % (max - MIN_BAUD_RATE + 1);

        let divisor = encode(rate, caps, 0).unwrap();
        prop_assert!(divisor.actual > 0);
        prop_assert!(divisor.actual <= max);
    }

    /// Rates outside the range are rejected with the range in the error.
    #[test]
    fn rejects_out_of_range(caps in caps_strategy(), above in 1u32..1_000_000, below in 0u32..MIN_BAUD_RATE) {
        let max = max_baud_rate(caps);

        match encode(max + above, caps, 0) {
            Err(Error::UnsupportedBaudRate { requested, min, max: reported }) => {
                prop_assert_eq!(requested, max + above);
                prop_assert_eq!(min, MIN_BAUD_RATE);
                prop_assert_eq!(reported, max);
            }
            other => prop_assert!(false, "expected rejection, got {:?}", other),
        }

        let rejected = matches!(encode(below, caps, 0), Err(Error::UnsupportedBaudRate { .. }));
        prop_assert!(rejected);
    }

    /// Ordinary serial rates land within 3% on every generation.
    #[test]
    fn common_rates_within_tolerance(caps in caps_strategy(), rate in 300u32..=115_200) {
        let divisor = encode(rate, caps, 0).unwrap();
        let diff = divisor.actual.abs_diff(rate);
        prop_assert!(
            u64::from(diff) * 100 < u64::from(rate) * 3,
            "{} baud encoded as {} baud", rate, divisor.actual
        );
    }

    /// The 12 MHz clock (and its index flag) is used only above 3 Mbaud.
    #[test]
    fn high_speed_flag_tracks_rate(rate in MIN_BAUD_RATE..=12_000_000) {
        let caps = DeviceCapabilities::from_version_major(9);
        let divisor = encode(rate, caps, 0).unwrap();
        prop_assert_eq!(divisor.index & HIGH_SPEED_BIT != 0, rate > 3_000_000);
    }

    /// MPSSE chips carry the interface in the low byte of `index`; others
    /// only ever use bit 0 for the divisor's top bit.
    #[test]
    fn index_layout(caps in caps_strategy(), rate in MIN_BAUD_RATE..=3_000_000, iface in 0u16..4) {
        let divisor = encode(rate, caps, iface).unwrap();
        if caps.mpsse {
            prop_assert_eq!(divisor.index & 0x00FF, iface);
        } else {
            prop_assert!(divisor.index & !HIGH_SPEED_BIT <= 1);
        }
    }
}
