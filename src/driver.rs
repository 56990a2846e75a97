//! The serial driver: open sequence, session lifecycle and modem control.
//!
//! [`FtdiSerial`] owns one USB transport for its whole lifetime. A session
//! runs from a successful [`open`](FtdiSerial::open) to the matching
//! [`close`](FtdiSerial::close); while it is active a background task polls
//! the bulk IN endpoint and the consumer channels are available through
//! [`readable`](FtdiSerial::readable) and [`writable`](FtdiSerial::writable).

use std::sync::{Arc, Mutex};

use crate::baudrate;
use crate::capability::{ChipType, DeviceCapabilities};
use crate::channel::{
    lock, ChannelSlot, ChannelState, ReadSlot, SerialReader, SerialWriter, SharedReadSlot,
    SharedWriteSlot,
};
use crate::constants::*;
use crate::error::{Error, Result};
use crate::poller::InboundPoller;
use crate::sender::OutboundSender;
use crate::signal::{self, ClosingTrigger, DisconnectListener, DisconnectSignal, StoppedWait};
use crate::transport::{
    ControlSetup, EndpointDescriptor, EndpointDirection, EndpointKind, NusbTransport,
    TransportResult, UsbTransport,
};
use crate::types::{DriverConfig, DriverState, LineOptions, PortInfo, SerialOptions, Signals};

/// Bulk endpoints found on the claimed interface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Endpoints {
    /// Bulk IN endpoint (device to host).
    pub inbound: Option<EndpointDescriptor>,
    /// Bulk OUT endpoint (host to device).
    pub outbound: Option<EndpointDescriptor>,
}

impl Endpoints {
    /// Pick the first bulk endpoint of each direction, in declaration order.
    pub fn discover(endpoints: &[EndpointDescriptor]) -> Self {
        let first_bulk = |direction: EndpointDirection| {
            endpoints
                .iter()
                .find(|ep| ep.kind == EndpointKind::Bulk && ep.direction == direction)
                .copied()
        };
        Self {
            inbound: first_bulk(EndpointDirection::In),
            outbound: first_bulk(EndpointDirection::Out),
        }
    }
}

/// Everything that only exists between `open()` and `close()`.
struct Session<T> {
    closing: ClosingTrigger,
    stopped: StoppedWait,
    reader: SharedReadSlot,
    writer: SharedWriteSlot,
    sender: Arc<OutboundSender<T>>,
}

/// An FTDI USB-to-serial port.
///
/// # Example
///
/// ```no_run
/// use ftdi_serial::{pid, FtdiSerial, SerialOptions, FTDI_VID};
///
/// # async fn run() -> ftdi_serial::Result<()> {
/// let opts = SerialOptions::new().baud_rate(115_200);
/// let mut port = FtdiSerial::open_device(FTDI_VID, pid::FT232, opts).await?;
///
/// if let Some(mut writer) = port.writable() {
///     writer.write(b"hello\r\n").await?;
/// }
/// port.close().await;
/// # Ok(())
/// # }
/// ```
pub struct FtdiSerial<T: UsbTransport> {
    transport: Arc<T>,
    config: DriverConfig,
    options: LineOptions,
    state: DriverState,
    capabilities: DeviceCapabilities,
    chip_type: ChipType,
    interface: Option<u8>,
    endpoints: Endpoints,
    session: Option<Session<T>>,
    disconnect: DisconnectSignal,
}

impl<T: UsbTransport> std::fmt::Debug for FtdiSerial<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtdiSerial")
            .field("chip_type", &self.chip_type)
            .field("state", &self.state)
            .field("options", &self.options)
            .field("interface", &self.interface)
            .field("endpoints", &self.endpoints)
            .finish_non_exhaustive()
    }
}

// ---- Construction ----

impl FtdiSerial<NusbTransport> {
    /// Find the first device with the given IDs and open it.
    pub async fn open_device(vendor: u16, product: u16, options: SerialOptions) -> Result<Self> {
        let transport = NusbTransport::find(vendor, product).await?;
        let mut serial = Self::new(transport);
        serial.open(options).await?;
        Ok(serial)
    }
}

impl<T: UsbTransport> FtdiSerial<T> {
    /// Wrap a transport. The device is not touched until [`open`](Self::open).
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, DriverConfig::default())
    }

    /// Wrap a transport with non-default tuning.
    pub fn with_config(transport: T, config: DriverConfig) -> Self {
        let major = transport.device_info().device_version_major;
        let capabilities = DeviceCapabilities::from_version_major(major);
        let chip_type = ChipType::from_version_major(major);
        log::debug!("device version {major}: {chip_type:?}, {capabilities:?}");

        Self {
            transport: Arc::new(transport),
            config,
            options: LineOptions::default(),
            state: DriverState::Closed,
            capabilities,
            chip_type,
            interface: None,
            endpoints: Endpoints::default(),
            session: None,
            disconnect: DisconnectSignal::new(),
        }
    }

    // ---- Lifecycle ----

    /// Open and configure the device, then start polling for inbound data.
    ///
    /// `options` is merged over the current line options and kept only if
    /// the open succeeds. On failure the device is released again and the
    /// driver stays [`DriverState::Closed`]. Dropping the returned future
    /// part-way leaves the device claimed until the next `open` or `close`,
    /// which release it first.
    ///
    /// # Errors
    ///
    /// * [`Error::AlreadyOpen`] if the driver is not closed.
    /// * [`Error::DeviceOpenFailed`] if the device has no interface, was
    ///   disconnected earlier, or rejects any step of the open sequence.
    /// * [`Error::UnsupportedBaudRate`] if the merged baud rate cannot be
    ///   produced by this device.
    pub async fn open(&mut self, options: SerialOptions) -> Result<()> {
        self.recover_interrupted().await;
        if self.state != DriverState::Closed {
            return Err(Error::AlreadyOpen);
        }
        if self.disconnect.is_fired() {
            return Err(Error::open_failed("device disconnected"));
        }

        let mut line = self.options;
        line.merge(&options);
        self.state = DriverState::Opening;

        if let Err(e) = self.initialize(&line).await {
            log::debug!("open failed: {e}");
            self.teardown().await;
            self.state = DriverState::Closed;
            return Err(e);
        }

        self.options = line;
        self.start_session();
        self.state = DriverState::Active;
        log::info!(
            "{:?} open at {} baud ({:?})",
            self.chip_type,
            self.options.baud_rate,
            self.endpoints
        );
        Ok(())
    }

    /// Roll back an `open` or `close` whose future was dropped before it
    /// finished. Both leave the driver without a session in a transitional
    /// state, possibly with the interface still claimed.
    async fn recover_interrupted(&mut self) {
        if self.session.is_some() || self.state == DriverState::Closed {
            return;
        }
        log::debug!("rolling back interrupted {:?}", self.state);
        self.teardown().await;
        self.state = DriverState::Closed;
    }

    async fn initialize(&mut self, line: &LineOptions) -> Result<()> {
        self.transport
            .open()
            .await
            .map_err(|e| Error::open_failed_with("open device", e))?;

        let interface = self
            .transport
            .configuration()
            .and_then(|config| config.interfaces.into_iter().next())
            .ok_or_else(|| Error::open_failed("find interface"))?;

        self.transport
            .claim_interface(INTERFACE_NUMBER)
            .await
            .map_err(|e| Error::open_failed_with("claim interface", e))?;
        self.interface = Some(INTERFACE_NUMBER);

        self.endpoints = Endpoints::discover(&interface.endpoints);
        log::debug!(
            "claimed interface {INTERFACE_NUMBER}: {:?}",
            self.endpoints
        );

        self.control(SIO_RESET_REQUEST, SIO_RESET_SIO)
            .await
            .map_err(|e| Error::open_failed_with("reset", e))?;

        self.control(SIO_SET_BITMODE_REQUEST, SIO_BITMODE_RESET)
            .await
            .map_err(|e| Error::open_failed_with("reset bitmode", e))?;

        let divisor = baudrate::encode(
            line.baud_rate,
            self.capabilities,
            u16::from(INTERFACE_NUMBER),
        )?;
        log::debug!(
            "baud {} -> value {:#06x} index {:#06x} (actual {})",
            line.baud_rate,
            divisor.value,
            divisor.index,
            divisor.actual
        );
        self.control_indexed(SIO_SET_BAUDRATE_REQUEST, divisor.value, divisor.index)
            .await
            .map_err(|e| Error::open_failed_with("set baud rate", e))?;

        self.control(SIO_SET_DATA_REQUEST, line.config_word())
            .await
            .map_err(|e| Error::open_failed_with("set line properties", e))?;

        Ok(())
    }

    fn start_session(&mut self) {
        let (closing, closing_watch) = signal::closing();
        let (stopped_guard, stopped) = signal::stopped();
        let reader: SharedReadSlot = Arc::new(Mutex::new(ReadSlot::new()));
        let writer: SharedWriteSlot = Arc::new(Mutex::new(ChannelSlot::default()));
        let sender = Arc::new(OutboundSender::new(
            Arc::clone(&self.transport),
            self.endpoints.outbound.map(|ep| ep.address),
            self.disconnect.clone(),
        ));

        match self.endpoints.inbound {
            Some(ep) => InboundPoller::new(
                Arc::clone(&self.transport),
                ep.address,
                self.config.in_transfer_size,
                Arc::clone(&reader),
                closing_watch,
                self.disconnect.clone(),
            )
            .spawn(stopped_guard),
            None => {
                log::warn!("no bulk IN endpoint, inbound data will not be read");
                lock(&reader).producer_stopped();
                drop(stopped_guard);
            }
        }

        self.session = Some(Session {
            closing,
            stopped,
            reader,
            writer,
            sender,
        });
    }

    /// Stop polling, release the interface and close the device.
    ///
    /// Waits for the in-flight bulk IN transfer to complete first. Returns
    /// immediately if the driver was never opened. Teardown failures are
    /// logged, not returned.
    pub async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            self.recover_interrupted().await;
            return;
        };

        self.state = DriverState::Closing;
        lock(&session.reader).seal();
        lock(&session.writer).seal();

        session.closing.fire();
        // An error here means the poller is gone already, which is just as good.
        let _ = session.stopped.await;

        self.teardown().await;
        self.state = DriverState::Closed;
        log::info!("{:?} closed", self.chip_type);
    }

    async fn teardown(&mut self) {
        if let Some(interface) = self.interface.take() {
            if let Err(e) = self.transport.release_interface(interface).await {
                log::warn!("failed to release interface {interface}: {e}");
            }
        }
        if let Err(e) = self.transport.close().await {
            log::warn!("failed to close device: {e}");
        }
        self.endpoints = Endpoints::default();
    }

    // ---- Modem control ----

    /// Drive the DTR and/or RTS lines. Lines left as `None` keep their level.
    ///
    /// # Errors
    ///
    /// [`Error::DeviceOpenFailed`] if no interface is claimed, or
    /// [`Error::Transport`] if the device rejects the request.
    pub async fn set_signals(&self, signals: Signals) -> Result<()> {
        if self.interface.is_none() {
            return Err(Error::open_failed("no interface claimed"));
        }
        if signals.is_empty() {
            return Ok(());
        }

        let value = signals.control_value();
        log::debug!("modem control {value:#06x}");
        self.control(SIO_SET_MODEM_CTRL_REQUEST, value).await?;
        Ok(())
    }

    async fn control(&self, request: u8, value: u16) -> TransportResult<()> {
        self.control_indexed(request, value, u16::from(INTERFACE_NUMBER))
            .await
    }

    async fn control_indexed(
        &self,
        request: u8,
        value: u16,
        index: u16,
    ) -> TransportResult<()> {
        self.transport
            .control_transfer_out(
                ControlSetup {
                    request,
                    value,
                    index,
                },
                &[],
            )
            .await
    }

    // ---- Consumer channels ----

    /// Take the inbound byte stream.
    ///
    /// Returns `None` unless the driver is active and no other reader is
    /// outstanding. After a reader is closed or dropped, the next call hands
    /// out a fresh one.
    pub fn readable(&self) -> Option<SerialReader> {
        if self.state != DriverState::Active {
            return None;
        }
        let session = self.session.as_ref()?;
        let rx = lock(&session.reader).open_reader(self.config.read_capacity)?;
        Some(SerialReader::new(rx, Arc::clone(&session.reader)))
    }

    /// Take the outbound byte sink. Same availability rules as
    /// [`readable`](Self::readable).
    pub fn writable(&self) -> Option<SerialWriter<T>> {
        if self.state != DriverState::Active {
            return None;
        }
        let session = self.session.as_ref()?;
        if !lock(&session.writer).acquire() {
            return None;
        }
        Some(SerialWriter::new(
            Arc::clone(&session.sender),
            Arc::clone(&session.writer),
        ))
    }

    /// State of the inbound channel.
    pub fn readable_state(&self) -> ChannelState {
        self.session
            .as_ref()
            .map_or(ChannelState::Absent, |s| lock(&s.reader).state())
    }

    /// State of the outbound channel.
    pub fn writable_state(&self) -> ChannelState {
        self.session
            .as_ref()
            .map_or(ChannelState::Absent, |s| lock(&s.writer).state())
    }

    // ---- Accessors ----

    /// USB identity of the device.
    pub fn info(&self) -> PortInfo {
        let info = self.transport.device_info();
        PortInfo {
            usb_vendor_id: info.vendor_id,
            usb_product_id: info.product_id,
        }
    }

    /// Subscribe to the disconnect notification.
    pub fn disconnect_listener(&self) -> DisconnectListener {
        self.disconnect.subscribe()
    }

    /// Whether a transport failure has been detected.
    pub fn is_disconnected(&self) -> bool {
        self.disconnect.is_fired()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Line options of the current (or last successful) session.
    pub fn options(&self) -> LineOptions {
        self.options
    }

    /// Chip family guessed from `bcdDevice`.
    pub fn chip_type(&self) -> ChipType {
        self.chip_type
    }

    /// Capability flags steering baud rate encoding.
    pub fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities
    }

    /// Endpoints found by the last successful open; empty while closed.
    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    /// Tuning this driver was built with.
    pub fn config(&self) -> DriverConfig {
        self.config
    }
}
