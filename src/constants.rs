//! Protocol constants for FTDI serial communication.
//!
//! These constants define the USB vendor request codes, modem control values,
//! and other wire-level details of the FTDI protocol. Most users should not
//! need to use these directly.

use std::time::Duration;

// ---- FTDI Vendor ID and known Product IDs ----

/// Default FTDI vendor ID.
pub const FTDI_VID: u16 = 0x0403;

/// Known FTDI product IDs.
pub mod pid {
    /// FT232AM, FT232BM, FT232R.
    pub const FT232: u16 = 0x6001;
    /// FT2232C/D/H.
    pub const FT2232: u16 = 0x6010;
    /// FT4232H.
    pub const FT4232: u16 = 0x6011;
    /// FT232H.
    pub const FT232H: u16 = 0x6014;
    /// FT230X.
    pub const FT230X: u16 = 0x6015;
}

// ---- SIO vendor request codes ----

/// Reset the port.
pub(crate) const SIO_RESET_REQUEST: u8 = 0x00;
/// Set the modem control register.
pub(crate) const SIO_SET_MODEM_CTRL_REQUEST: u8 = 0x01;
/// Set baud rate.
pub(crate) const SIO_SET_BAUDRATE_REQUEST: u8 = 0x03;
/// Set data characteristics (bits, parity, stop).
pub(crate) const SIO_SET_DATA_REQUEST: u8 = 0x04;
/// Set bitbang mode.
pub(crate) const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;

/// SIO reset (full device reset).
pub(crate) const SIO_RESET_SIO: u16 = 0;
/// Bitmode value returning the chip to plain UART operation.
pub(crate) const SIO_BITMODE_RESET: u16 = 0;

// ---- Modem control line values ----

/// Set DTR high.
pub const SIO_SET_DTR_HIGH: u16 = 1 | (0x1 << 8);
/// Set DTR low.
pub const SIO_SET_DTR_LOW: u16 = 0x1 << 8;
/// Set RTS high.
pub const SIO_SET_RTS_HIGH: u16 = 2 | (0x2 << 8);
/// Set RTS low.
pub const SIO_SET_RTS_LOW: u16 = 0x2 << 8;

// ---- Clock constants for baud rate calculation ----

/// Base UART reference clock: 3 MHz.
pub(crate) const BASE_CLK: u32 = 3_000_000;
/// High-speed reference clock on modern chips: 12 MHz.
pub(crate) const HIGH_SPEED_CLK: u32 = 12_000_000;
/// Bit set in the `index` field when the 12 MHz clock is selected.
pub(crate) const HIGH_SPEED_INDEX_BIT: u16 = 1 << 9;

// ---- Transfer layout ----

/// Interface claimed by the driver. Multi-port variants are not handled.
pub const INTERFACE_NUMBER: u8 = 0;
/// Length of the modem/line status header prefixed to every inbound packet.
pub const STATUS_HEADER_LEN: usize = 2;
/// Bulk IN transfer length used by the poller.
pub const DEFAULT_IN_TRANSFER_SIZE: usize = 64;
/// Inbound packets buffered for the reader before the poller starts dropping.
pub const DEFAULT_READ_CAPACITY: usize = 64;
/// Default timeout for control transfers on the nusb backend.
pub const DEFAULT_CONTROL_TIMEOUT: Duration = Duration::from_secs(5);
