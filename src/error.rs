//! Error types for the ftdi-serial crate.

/// Failure reported by a [`UsbTransport`](crate::transport::UsbTransport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An error from the nusb USB layer.
    #[error("USB error: {0}")]
    Usb(#[from] nusb::Error),

    /// A USB transfer error.
    #[error("USB transfer error: {0}")]
    Transfer(#[from] nusb::transfer::TransferError),

    /// The device or interface has not been opened/claimed.
    #[error("USB device not open")]
    NotOpen,

    /// The device is gone.
    #[error("USB device disconnected")]
    Disconnected,

    /// Any other backend-specific failure.
    #[error("{0}")]
    Other(String),
}

/// The error type for driver operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The open sequence failed: no interface was present or one of the
    /// initialization transfers was rejected.
    #[error("device open failed at {stage}")]
    DeviceOpenFailed {
        /// Which step of the open sequence failed.
        stage: &'static str,
        /// The transport failure behind it, if any.
        #[source]
        source: Option<TransportError>,
    },

    /// The requested baud rate cannot be produced by this device class.
    #[error("unsupported baud rate {requested} (achievable range {min}..={max})")]
    UnsupportedBaudRate {
        /// The requested baud rate.
        requested: u32,
        /// Lowest rate the encoder accepts.
        min: u32,
        /// Highest rate the encoder accepts for the device class.
        max: u32,
    },

    /// A write was attempted without a discovered bulk OUT endpoint, or
    /// after the driver was closed.
    #[error("port not open")]
    PortNotOpen,

    /// `open()` was called on a driver that is not closed.
    #[error("port already open")]
    AlreadyOpen,

    /// Invalid argument(s) were provided.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// A control transfer outside the open sequence failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl Error {
    pub(crate) fn open_failed(stage: &'static str) -> Self {
        Error::DeviceOpenFailed {
            stage,
            source: None,
        }
    }

    pub(crate) fn open_failed_with(stage: &'static str, source: TransportError) -> Self {
        Error::DeviceOpenFailed {
            stage,
            source: Some(source),
        }
    }
}

/// A specialized `Result` type for driver operations.
pub type Result<T> = std::result::Result<T, Error>;
