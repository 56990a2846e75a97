//! Continuous inbound polling.
//!
//! The poller keeps one bulk IN transfer outstanding at a time. FTDI chips
//! answer every transfer (at the latest when their latency timer expires)
//! with one or more packets, each starting with two bytes of modem and line
//! status; the rest is serial payload, which is handed to the current reader.

use std::sync::Arc;

use crate::channel::{lock, SharedReadSlot};
use crate::constants::STATUS_HEADER_LEN;
use crate::signal::{ClosingWatch, DisconnectSignal, StoppedGuard};
use crate::transport::{InTransfer, TransferStatus, UsbTransport};

/// Strip the modem status header from an inbound packet.
///
/// Returns `None` when the packet carries no payload byte.
pub fn strip_status_header(packet: &[u8]) -> Option<&[u8]> {
    if packet.len() > STATUS_HEADER_LEN {
        Some(&packet[STATUS_HEADER_LEN..])
    } else {
        None
    }
}

/// Strip the status header of every packet in a bulk IN transfer and join
/// the payloads.
///
/// `packet_size` is the endpoint's max packet size; 0 treats `data` as a
/// single packet.
pub fn strip_status_headers(data: &[u8], packet_size: usize) -> Vec<u8> {
    if packet_size == 0 {
        return strip_status_header(data).map(<[u8]>::to_vec).unwrap_or_default();
    }
    data.chunks(packet_size)
        .filter_map(strip_status_header)
        .flatten()
        .copied()
        .collect()
}

pub(crate) struct InboundPoller<T> {
    transport: Arc<T>,
    endpoint: u8,
    transfer_size: usize,
    slot: SharedReadSlot,
    closing: ClosingWatch,
    disconnect: DisconnectSignal,
}

impl<T: UsbTransport> InboundPoller<T> {
    pub(crate) fn new(
        transport: Arc<T>,
        endpoint: u8,
        transfer_size: usize,
        slot: SharedReadSlot,
        closing: ClosingWatch,
        disconnect: DisconnectSignal,
    ) -> Self {
        Self {
            transport,
            endpoint,
            transfer_size: transfer_size.max(STATUS_HEADER_LEN + 1),
            slot,
            closing,
            disconnect,
        }
    }

    /// Run the poller as a detached background task. `stopped` fires when
    /// it ends.
    pub(crate) fn spawn(self, stopped: StoppedGuard) {
        tokio::spawn(async move {
            let _stopped = stopped;
            self.run().await;
        });
    }

    async fn run(mut self) {
        log::debug!("inbound poller started on endpoint {:#04x}", self.endpoint);

        // Closing is only checked between transfers; an in-flight transfer
        // always runs to completion.
        while !self.closing.is_requested() {
            match self
                .transport
                .transfer_in(self.endpoint, self.transfer_size)
                .await
            {
                Ok(InTransfer {
                    status: TransferStatus::Ok,
                    data,
                    packet_size,
                }) => {
                    let payload = strip_status_headers(&data, packet_size);
                    if !payload.is_empty() {
                        self.forward(payload);
                    }
                }
                Ok(InTransfer {
                    status: TransferStatus::Stall,
                    ..
                }) => {
                    log::debug!("bulk IN {:#04x} stalled, clearing halt", self.endpoint);
                    if let Err(e) = self.transport.clear_halt(self.endpoint).await {
                        log::debug!("clear halt on {:#04x} failed: {e}", self.endpoint);
                        self.disconnect.fire();
                        break;
                    }
                }
                Ok(InTransfer { status, .. }) => {
                    log::debug!("bulk IN {:#04x} completed with {status:?}", self.endpoint);
                    tokio::task::yield_now().await;
                }
                Err(e) => {
                    log::debug!("bulk IN {:#04x} failed: {e}", self.endpoint);
                    self.disconnect.fire();
                    break;
                }
            }
        }

        lock(&self.slot).producer_stopped();
        log::debug!("inbound poller stopped");
    }

    fn forward(&self, payload: Vec<u8>) {
        let len = payload.len();
        // Delivery is best effort: a missing, slow or closed reader loses
        // the packet and nothing is reported to the USB side.
        if let Err(reason) = lock(&self.slot).deliver(payload) {
            log::trace!("dropped {len} inbound bytes: {reason:?}");
        }
    }
}
