//! Outbound bulk transfers.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::signal::DisconnectSignal;
use crate::transport::UsbTransport;

/// Forwards writes to the bulk OUT endpoint.
pub(crate) struct OutboundSender<T> {
    transport: Arc<T>,
    endpoint: Option<u8>,
    disconnect: DisconnectSignal,
}

impl<T: UsbTransport> OutboundSender<T> {
    pub(crate) fn new(transport: Arc<T>, endpoint: Option<u8>, disconnect: DisconnectSignal) -> Self {
        Self {
            transport,
            endpoint,
            disconnect,
        }
    }

    /// Issue one bulk OUT transfer carrying `data`.
    ///
    /// A transfer failure is reported through the disconnect notification
    /// and the call still returns `Ok`: the writer is never told.
    pub(crate) async fn send(&self, data: &[u8]) -> Result<()> {
        let endpoint = self.endpoint.ok_or(Error::PortNotOpen)?;

        match self.transport.transfer_out(endpoint, data).await {
            Ok(sent) => {
                log::trace!("bulk OUT {endpoint:#04x}: {sent} of {} bytes", data.len());
            }
            Err(e) => {
                log::debug!("bulk OUT {endpoint:#04x} failed: {e}");
                self.disconnect.fire();
            }
        }
        Ok(())
    }
}
