//! USB transport abstraction.
//!
//! The driver never talks to a USB stack directly. Everything it needs from
//! the device (descriptor fields, interface claim/release, vendor control
//! transfers and bulk transfers) goes through [`UsbTransport`], so the same
//! driver runs on [`NusbTransport`] or on a scripted fake in tests.

use std::future::Future;

use crate::error::TransportError;

mod nusb_backend;

pub use self::nusb_backend::NusbTransport;

/// Result alias for transport operations.
pub type TransportResult<T> = std::result::Result<T, TransportError>;

/// Transfer direction of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointDirection {
    /// Device to host.
    In,
    /// Host to device.
    Out,
}

/// Transfer type of an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointKind {
    /// Control endpoint.
    Control,
    /// Isochronous endpoint.
    Isochronous,
    /// Bulk endpoint.
    Bulk,
    /// Interrupt endpoint.
    Interrupt,
}

/// One endpoint of an alternate setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointDescriptor {
    /// Endpoint address, including the direction bit.
    pub address: u8,
    /// Transfer direction.
    pub direction: EndpointDirection,
    /// Transfer type.
    pub kind: EndpointKind,
}

/// An interface of the active configuration, reduced to its first
/// alternate setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceDescriptor {
    /// `bInterfaceNumber`.
    pub number: u8,
    /// Endpoints of the alternate setting, in declaration order.
    pub endpoints: Vec<EndpointDescriptor>,
}

/// The active configuration of a device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Configuration {
    /// Interfaces in declaration order.
    pub interfaces: Vec<InterfaceDescriptor>,
}

/// Device descriptor fields the driver needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UsbDeviceInfo {
    /// `idVendor`.
    pub vendor_id: u16,
    /// `idProduct`.
    pub product_id: u16,
    /// Major part of `bcdDevice`.
    pub device_version_major: u8,
}

/// Setup packet of a vendor, device-recipient OUT control transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ControlSetup {
    /// `bRequest`.
    pub request: u8,
    /// `wValue`.
    pub value: u16,
    /// `wIndex`.
    pub index: u16,
}

/// Completion status of a bulk IN transfer that reached the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TransferStatus {
    /// Data (possibly just a header) was received.
    #[default]
    Ok,
    /// The endpoint halted.
    Stall,
    /// The device sent more data than requested.
    Babble,
}

/// Completed bulk IN transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InTransfer {
    /// Completion status.
    pub status: TransferStatus,
    /// Received bytes. Every `packet_size` bytes start with a modem status
    /// header.
    pub data: Vec<u8>,
    /// Max packet size of the endpoint; 0 when `data` is a single packet.
    pub packet_size: usize,
}

/// Capability the driver consumes to reach a USB device.
///
/// Implementations use interior mutability: the driver, the inbound poller
/// and the outbound sender share one transport behind an `Arc`, with the
/// poller and the sender issuing bulk transfers on different endpoints at
/// the same time. An `Err` from any transfer means the device is gone.
pub trait UsbTransport: Send + Sync + 'static {
    /// Identity fields of the device descriptor.
    fn device_info(&self) -> UsbDeviceInfo;

    /// The active configuration, if the device exposes one.
    fn configuration(&self) -> Option<Configuration>;

    /// Open the device.
    fn open(&self) -> impl Future<Output = TransportResult<()>> + Send;

    /// Close the device.
    fn close(&self) -> impl Future<Output = TransportResult<()>> + Send;

    /// Claim interface `number`.
    fn claim_interface(&self, number: u8) -> impl Future<Output = TransportResult<()>> + Send;

    /// Release interface `number`.
    fn release_interface(&self, number: u8)
        -> impl Future<Output = TransportResult<()>> + Send;

    /// Issue a vendor OUT control transfer to the device.
    fn control_transfer_out(
        &self,
        setup: ControlSetup,
        data: &[u8],
    ) -> impl Future<Output = TransportResult<()>> + Send;

    /// Issue a bulk IN transfer of at most `max_len` bytes on the endpoint
    /// with address `endpoint`.
    fn transfer_in(
        &self,
        endpoint: u8,
        max_len: usize,
    ) -> impl Future<Output = TransportResult<InTransfer>> + Send;

    /// Clear a halt condition on the endpoint with address `endpoint`.
    fn clear_halt(&self, endpoint: u8) -> impl Future<Output = TransportResult<()>> + Send;

    /// Issue a bulk OUT transfer on the endpoint with address `endpoint`;
    /// returns the number of bytes sent.
    fn transfer_out(
        &self,
        endpoint: u8,
        data: &[u8],
    ) -> impl Future<Output = TransportResult<usize>> + Send;
}
