//! Userspace driver for FTDI USB-to-serial converters.
//!
//! This crate turns a USB device exposing the FT232-family vendor interface
//! into an asynchronous byte-stream serial port. It uses
//! [nusb](https://crates.io/crates/nusb) as the USB backend, so no C
//! dependencies or `libusb` are required, and [tokio] for the background
//! polling task and the reader/writer channels.
//!
//! # Quick Start
//!
//! ```no_run
//! use ftdi_serial::{pid, FtdiSerial, SerialOptions, Signals, FTDI_VID};
//!
//! # async fn run() -> ftdi_serial::Result<()> {
//! let opts = SerialOptions::new().baud_rate(115_200);
//! let mut port = FtdiSerial::open_device(FTDI_VID, pid::FT232, opts).await?;
//!
//! port.set_signals(Signals {
//!     data_terminal_ready: Some(true),
//!     request_to_send: Some(true),
//! })
//! .await?;
//!
//! if let Some(mut reader) = port.readable() {
//!     if let Some(bytes) = reader.read_chunk().await {
//!         println!("received {bytes:?}");
//!     }
//! }
//!
//! port.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Overview
//!
//! - **Open sequence**: claim interface 0, discover the bulk endpoints, reset
//!   the chip, leave bitbang mode, program baud rate and line properties.
//! - **Baud rates**: [`baudrate::encode`] reproduces the vendor's divisor
//!   rounding for AM, BM/R/X and hi-speed (H) silicon.
//! - **Streams**: inbound packets are stripped of their two status bytes
//!   and delivered to a [`SerialReader`] (`AsyncRead`); a [`SerialWriter`]
//!   (`AsyncWrite`) issues one bulk OUT transfer per write.
//! - **Disconnect**: transfer failures after open are reported once
//!   through a [`DisconnectListener`], never to the reader or writer.
//! - **Transport**: everything USB goes through [`UsbTransport`], with
//!   [`NusbTransport`] as the real implementation.

pub mod baudrate;
pub mod capability;
mod channel;
pub mod constants;
mod driver;
pub mod error;
mod poller;
mod sender;
mod signal;
pub mod transport;
pub mod types;

// ---- Convenience re-exports ----

pub use baudrate::{BaudDivisor, MIN_BAUD_RATE};
pub use capability::{ChipType, DeviceCapabilities};
pub use channel::{ChannelState, SerialReader, SerialWriter};
pub use constants::{pid, FTDI_VID};
pub use driver::{Endpoints, FtdiSerial};
pub use error::{Error, Result, TransportError};
pub use poller::{strip_status_header, strip_status_headers};
pub use signal::DisconnectListener;
pub use transport::{NusbTransport, UsbTransport};
pub use types::*;
