//! Type definitions for FTDI serial communication.
//!
//! These types model the serial line properties, modem control requests,
//! driver state and tuning knobs.

use crate::constants::{
    DEFAULT_IN_TRANSFER_SIZE, DEFAULT_READ_CAPACITY, SIO_SET_DTR_HIGH, SIO_SET_DTR_LOW,
    SIO_SET_RTS_HIGH, SIO_SET_RTS_LOW, STATUS_HEADER_LEN,
};

/// Parity mode for serial communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Parity {
    /// No parity bit.
    #[default]
    None,
    /// Odd parity.
    Odd,
    /// Even parity.
    Even,
    /// Mark parity (always 1).
    Mark,
    /// Space parity (always 0).
    Space,
}

impl Parity {
    /// Wire encoding for the SIO_SET_DATA request.
    pub(crate) fn wire_value(self) -> u16 {
        match self {
            Self::None => 0x00,
            Self::Odd => 0x01,
            Self::Even => 0x02,
            Self::Mark => 0x03,
            Self::Space => 0x04,
        }
    }
}

/// Number of stop bits for serial communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StopBits {
    /// 1 stop bit.
    #[default]
    One,
    /// 1.5 stop bits.
    OnePointFive,
    /// 2 stop bits.
    Two,
}

impl StopBits {
    /// Wire encoding for the SIO_SET_DATA request.
    pub(crate) fn wire_value(self) -> u16 {
        match self {
            Self::One => 0x00,
            Self::OnePointFive => 0x01,
            Self::Two => 0x02,
        }
    }
}

/// Number of data bits for serial communication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DataBits {
    /// 5 data bits.
    Five,
    /// 6 data bits.
    Six,
    /// 7 data bits.
    Seven,
    /// 8 data bits.
    #[default]
    Eight,
}

impl DataBits {
    /// Wire encoding for the SIO_SET_DATA request.
    pub(crate) fn wire_value(self) -> u16 {
        match self {
            Self::Five => 5,
            Self::Six => 6,
            Self::Seven => 7,
            Self::Eight => 8,
        }
    }
}

impl TryFrom<u8> for DataBits {
    type Error = crate::Error;

    fn try_from(bits: u8) -> crate::Result<Self> {
        match bits {
            5 => Ok(Self::Five),
            6 => Ok(Self::Six),
            7 => Ok(Self::Seven),
            8 => Ok(Self::Eight),
            _ => Err(crate::Error::InvalidArgument("data bits must be between 5 and 8")),
        }
    }
}

/// Complete line configuration of an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineOptions {
    /// Requested baud rate in bits per second.
    pub baud_rate: u32,
    /// Stop bits.
    pub stop_bits: StopBits,
    /// Parity.
    pub parity: Parity,
    /// Data bits.
    pub data_bits: DataBits,
}

impl Default for LineOptions {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            stop_bits: StopBits::One,
            parity: Parity::None,
            data_bits: DataBits::Eight,
        }
    }
}

impl LineOptions {
    /// Apply caller overrides; fields left unset keep their current value.
    pub fn merge(&mut self, overrides: &SerialOptions) {
        if let Some(baud_rate) = overrides.baud_rate {
            self.baud_rate = baud_rate;
        }
        if let Some(stop_bits) = overrides.stop_bits {
            self.stop_bits = stop_bits;
        }
        if let Some(parity) = overrides.parity {
            self.parity = parity;
        }
        if let Some(data_bits) = overrides.data_bits {
            self.data_bits = data_bits;
        }
    }

    /// Value for the SIO_SET_DATA request.
    pub fn config_word(&self) -> u16 {
        (self.data_bits.wire_value() & 0x0F)
            | (self.parity.wire_value() << 8)
            | (self.stop_bits.wire_value() << 11)
    }
}

/// Partial line configuration passed to `open()`.
///
/// # Example
///
/// ```
/// use ftdi_serial::{Parity, SerialOptions};
///
/// let opts = SerialOptions::new().baud_rate(115_200).parity(Parity::Even);
/// assert_eq!(opts.baud_rate, Some(115_200));
/// assert_eq!(opts.stop_bits, None);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SerialOptions {
    /// Baud rate override.
    pub baud_rate: Option<u32>,
    /// Stop bits override.
    pub stop_bits: Option<StopBits>,
    /// Parity override.
    pub parity: Option<Parity>,
    /// Data bits override.
    pub data_bits: Option<DataBits>,
}

impl SerialOptions {
    /// No overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the baud rate.
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = Some(baud_rate);
        self
    }

    /// Override the stop bits.
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.stop_bits = Some(stop_bits);
        self
    }

    /// Override the parity.
    pub fn parity(mut self, parity: Parity) -> Self {
        self.parity = Some(parity);
        self
    }

    /// Override the data bits.
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.data_bits = Some(data_bits);
        self
    }
}

/// Modem control lines to drive. Lines left as `None` are not touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Signals {
    /// Data Terminal Ready.
    pub data_terminal_ready: Option<bool>,
    /// Request To Send.
    pub request_to_send: Option<bool>,
}

impl Signals {
    /// Value for the SIO_SET_MODEM_CTRL request.
    ///
    /// The high byte masks which lines change, so lines that are not
    /// specified contribute no bits at all.
    pub fn control_value(&self) -> u16 {
        let dtr = match self.data_terminal_ready {
            Some(true) => SIO_SET_DTR_HIGH,
            Some(false) => SIO_SET_DTR_LOW,
            None => 0,
        };
        let rts = match self.request_to_send {
            Some(true) => SIO_SET_RTS_HIGH,
            Some(false) => SIO_SET_RTS_LOW,
            None => 0,
        };
        dtr | rts
    }

    /// Whether no line was specified.
    pub fn is_empty(&self) -> bool {
        self.data_terminal_ready.is_none() && self.request_to_send.is_none()
    }
}

/// Lifecycle state of a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DriverState {
    /// No session; the device handle is closed.
    #[default]
    Closed,
    /// The open sequence is running.
    Opening,
    /// Fully initialized; the inbound poller is running.
    Active,
    /// `close()` is waiting for the poller to stop.
    Closing,
}

/// USB identity of the device, as reported by its descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PortInfo {
    /// USB vendor ID.
    pub usb_vendor_id: u16,
    /// USB product ID.
    pub usb_product_id: u16,
}

/// Tuning knobs for a driver instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverConfig {
    /// Inbound packets buffered for the reader.
    pub read_capacity: usize,
    /// Length requested by every bulk IN transfer.
    pub in_transfer_size: usize,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            read_capacity: DEFAULT_READ_CAPACITY,
            in_transfer_size: DEFAULT_IN_TRANSFER_SIZE,
        }
    }
}

impl DriverConfig {
    /// Set the reader buffer depth (at least one packet).
    pub fn read_capacity(mut self, packets: usize) -> Self {
        self.read_capacity = packets.max(1);
        self
    }

    /// Set the bulk IN transfer length (must leave room past the header).
    pub fn in_transfer_size(mut self, bytes: usize) -> Self {
        self.in_transfer_size = bytes.max(STATUS_HEADER_LEN + 1);
        self
    }
}
