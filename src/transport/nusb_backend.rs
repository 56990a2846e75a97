//! [`UsbTransport`] over [`nusb`].

use std::sync::Mutex;
use std::time::Duration;

use nusb::descriptors::TransferType;
use nusb::transfer::{Buffer, Bulk, ControlOut, ControlType, In, Out, Recipient, TransferError};
use nusb::{DeviceInfo, Endpoint};

use super::{
    Configuration, ControlSetup, EndpointDescriptor, EndpointDirection, EndpointKind,
    InTransfer, InterfaceDescriptor, TransferStatus, TransportResult, UsbDeviceInfo,
    UsbTransport,
};
use crate::capability::version_major_from_bcd;
use crate::channel::lock;
use crate::constants::DEFAULT_CONTROL_TIMEOUT;
use crate::error::TransportError;

/// A USB device reached through nusb.
///
/// The device is opened by [`UsbTransport::open`], not at construction, so a
/// `NusbTransport` can be handed to the driver straight out of enumeration.
pub struct NusbTransport {
    info: DeviceInfo,
    control_timeout: Duration,
    device: Mutex<Option<nusb::Device>>,
    interface: Mutex<Option<nusb::Interface>>,
    // Bulk endpoints are exclusive in nusb, so each is opened once and kept.
    bulk_in: tokio::sync::Mutex<Option<Endpoint<Bulk, In>>>,
    bulk_out: tokio::sync::Mutex<Option<Endpoint<Bulk, Out>>>,
}

impl std::fmt::Debug for NusbTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NusbTransport")
            .field("vendor_id", &self.info.vendor_id())
            .field("product_id", &self.info.product_id())
            .field("control_timeout", &self.control_timeout)
            .finish_non_exhaustive()
    }
}

impl NusbTransport {
    /// Wrap an already-discovered device.
    pub fn new(info: DeviceInfo) -> Self {
        Self {
            info,
            control_timeout: DEFAULT_CONTROL_TIMEOUT,
            device: Mutex::new(None),
            interface: Mutex::new(None),
            bulk_in: tokio::sync::Mutex::new(None),
            bulk_out: tokio::sync::Mutex::new(None),
        }
    }

    /// Set the timeout applied to control transfers.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = timeout;
        self
    }

    /// Find the first connected device with the given IDs.
    pub async fn find(vendor: u16, product: u16) -> TransportResult<Self> {
        let info = nusb::list_devices()
            .await?
            .find(|d| d.vendor_id() == vendor && d.product_id() == product)
            .ok_or_else(|| {
                TransportError::Other(format!("no device {vendor:04x}:{product:04x}"))
            })?;
        Ok(Self::new(info))
    }

    fn device(&self) -> TransportResult<nusb::Device> {
        lock(&self.device).clone().ok_or(TransportError::NotOpen)
    }

    fn interface(&self) -> TransportResult<nusb::Interface> {
        lock(&self.interface).clone().ok_or(TransportError::NotOpen)
    }
}

/// Round `len` up to a whole number of packets.
fn whole_packets(len: usize, max_packet_size: usize) -> usize {
    if max_packet_size == 0 {
        return len;
    }
    len.div_ceil(max_packet_size).max(1) * max_packet_size
}

fn endpoint_kind(transfer_type: TransferType) -> EndpointKind {
    match transfer_type {
        TransferType::Control => EndpointKind::Control,
        TransferType::Isochronous => EndpointKind::Isochronous,
        TransferType::Bulk => EndpointKind::Bulk,
        TransferType::Interrupt => EndpointKind::Interrupt,
    }
}

impl UsbTransport for NusbTransport {
    fn device_info(&self) -> UsbDeviceInfo {
        UsbDeviceInfo {
            vendor_id: self.info.vendor_id(),
            product_id: self.info.product_id(),
            device_version_major: version_major_from_bcd(self.info.device_version()),
        }
    }

    fn configuration(&self) -> Option<Configuration> {
        let device = self.device().ok()?;
        let config = device.active_configuration().ok()?;

        let interfaces = config
            .interfaces()
            .filter_map(|group| {
                let alt = group.alt_settings().next()?;
                let endpoints = alt
                    .endpoints()
                    .map(|ep| EndpointDescriptor {
                        address: ep.address(),
                        direction: if ep.address() & 0x80 != 0 {
                            EndpointDirection::In
                        } else {
                            EndpointDirection::Out
                        },
                        kind: endpoint_kind(ep.transfer_type()),
                    })
                    .collect();
                Some(InterfaceDescriptor {
                    number: group.interface_number(),
                    endpoints,
                })
            })
            .collect();

        Some(Configuration { interfaces })
    }

    async fn open(&self) -> TransportResult<()> {
        let device = self.info.open().await?;
        *lock(&self.device) = Some(device);
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        // Dropping the last handle closes the device.
        lock(&self.device).take();
        Ok(())
    }

    async fn claim_interface(&self, number: u8) -> TransportResult<()> {
        let device = self.device()?;
        let interface = device.detach_and_claim_interface(number).await?;
        *lock(&self.interface) = Some(interface);
        Ok(())
    }

    async fn release_interface(&self, _number: u8) -> TransportResult<()> {
        self.bulk_in.lock().await.take();
        self.bulk_out.lock().await.take();
        lock(&self.interface).take();
        Ok(())
    }

    async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8]) -> TransportResult<()> {
        let interface = self.interface()?;
        interface
            .control_out(
                ControlOut {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request: setup.request,
                    value: setup.value,
                    index: setup.index,
                    data,
                },
                self.control_timeout,
            )
            .await?;
        Ok(())
    }

    async fn transfer_in(&self, endpoint: u8, max_len: usize) -> TransportResult<InTransfer> {
        let mut guard = self.bulk_in.lock().await;
        if guard.is_none() {
            *guard = Some(self.interface()?.endpoint::<Bulk, In>(endpoint)?);
        }
        let Some(ep) = guard.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        let packet_size = ep.max_packet_size();
        let len = whole_packets(max_len, packet_size);
        ep.submit(Buffer::new(len));
        let completion = ep.next_complete().await;

        match completion.status {
            Ok(()) => {
                let mut data = completion.buffer.into_vec();
                data.truncate(completion.actual_len);
                Ok(InTransfer {
                    status: TransferStatus::Ok,
                    data,
                    packet_size,
                })
            }
            Err(TransferError::Stall) => Ok(InTransfer {
                status: TransferStatus::Stall,
                data: Vec::new(),
                packet_size,
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn clear_halt(&self, endpoint: u8) -> TransportResult<()> {
        if endpoint & 0x80 != 0 {
            let mut guard = self.bulk_in.lock().await;
            let Some(ep) = guard.as_mut() else {
                return Err(TransportError::NotOpen);
            };
            ep.clear_halt().await?;
        } else {
            let mut guard = self.bulk_out.lock().await;
            let Some(ep) = guard.as_mut() else {
                return Err(TransportError::NotOpen);
            };
            ep.clear_halt().await?;
        }
        Ok(())
    }

    async fn transfer_out(&self, endpoint: u8, data: &[u8]) -> TransportResult<usize> {
        let mut guard = self.bulk_out.lock().await;
        if guard.is_none() {
            *guard = Some(self.interface()?.endpoint::<Bulk, Out>(endpoint)?);
        }
        let Some(ep) = guard.as_mut() else {
            return Err(TransportError::NotOpen);
        };

        let mut buf = Buffer::new(data.len());
        buf.extend_from_slice(data);
        ep.submit(buf);
        let completion = ep.next_complete().await;
        completion.status?;
        Ok(completion.actual_len)
    }
}
