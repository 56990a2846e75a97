//! Scripted USB transport shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use ftdi_serial::transport::{
    Configuration, ControlSetup, EndpointDescriptor, EndpointDirection, EndpointKind, InTransfer,
    InterfaceDescriptor, TransferStatus, TransportResult, UsbDeviceInfo, UsbTransport,
};
use ftdi_serial::TransportError;

pub const BULK_IN: u8 = 0x81;
pub const BULK_OUT: u8 = 0x02;

/// Modem status bytes an idle FT232R reports.
pub const IDLE_STATUS: [u8; 2] = [0x01, 0x60];

/// What the next bulk IN transfer returns.
#[derive(Debug, Clone)]
pub enum Inbound {
    Packet(Vec<u8>),
    Stall,
    Fail,
}

#[derive(Debug, Default)]
pub struct MockState {
    pub events: Vec<String>,
    pub controls: Vec<ControlSetup>,
    pub inbound: VecDeque<Inbound>,
    pub in_endpoints: Vec<u8>,
    pub in_without_interface: usize,
    pub outbound: Vec<(u8, Vec<u8>)>,
    pub claimed: bool,
    pub fail_open: bool,
    pub fail_control: Option<u8>,
    pub fail_out: bool,
    pub fail_clear_halt: bool,
    /// Every control transfer takes this long.
    pub control_delay: Option<Duration>,
}

/// Clones share their state, so a test keeps one clone to inspect what the
/// driver did with the other.
#[derive(Debug, Clone)]
pub struct MockTransport {
    info: UsbDeviceInfo,
    configuration: Option<Configuration>,
    packet_size: usize,
    state: Arc<Mutex<MockState>>,
}

pub fn endpoint(address: u8, kind: EndpointKind) -> EndpointDescriptor {
    EndpointDescriptor {
        address,
        direction: if address & 0x80 != 0 {
            EndpointDirection::In
        } else {
            EndpointDirection::Out
        },
        kind,
    }
}

pub fn single_interface(endpoints: Vec<EndpointDescriptor>) -> Configuration {
    Configuration {
        interfaces: vec![InterfaceDescriptor {
            number: 0,
            endpoints,
        }],
    }
}

impl MockTransport {
    /// A device with the given major version and the usual FT232 endpoints.
    pub fn with_version(major: u8) -> Self {
        Self {
            info: UsbDeviceInfo {
                vendor_id: 0x0403,
                product_id: 0x6001,
                device_version_major: major,
            },
            configuration: Some(single_interface(vec![
                endpoint(BULK_IN, EndpointKind::Bulk),
                endpoint(BULK_OUT, EndpointKind::Bulk),
            ])),
            packet_size: 64,
            state: Arc::default(),
        }
    }

    /// An FT232R (version 6).
    pub fn ft232r() -> Self {
        Self::with_version(6)
    }

    pub fn configuration(mut self, configuration: Option<Configuration>) -> Self {
        self.configuration = configuration;
        self
    }

    /// Max packet size reported with every bulk IN transfer.
    pub fn packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn push_inbound(&self, inbound: Inbound) {
        self.state().inbound.push_back(inbound);
    }

    pub fn push_packet(&self, payload: &[u8]) {
        let mut packet = IDLE_STATUS.to_vec();
        packet.extend_from_slice(payload);
        self.push_inbound(Inbound::Packet(packet));
    }

    /// `(request, value, index)` of every control transfer so far.
    pub fn controls(&self) -> Vec<(u8, u16, u16)> {
        self.state()
            .controls
            .iter()
            .map(|c| (c.request, c.value, c.index))
            .collect()
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    fn record(&self, event: impl Into<String>) {
        self.state().events.push(event.into());
    }
}

impl UsbTransport for MockTransport {
    fn device_info(&self) -> UsbDeviceInfo {
        self.info
    }

    fn configuration(&self) -> Option<Configuration> {
        self.configuration.clone()
    }

    async fn open(&self) -> TransportResult<()> {
        self.record("open");
        if self.state().fail_open {
            return Err(TransportError::Other("open refused".into()));
        }
        Ok(())
    }

    async fn close(&self) -> TransportResult<()> {
        self.record("close");
        Ok(())
    }

    async fn claim_interface(&self, number: u8) -> TransportResult<()> {
        self.record(format!("claim {number}"));
        self.state().claimed = true;
        Ok(())
    }

    async fn release_interface(&self, number: u8) -> TransportResult<()> {
        self.record(format!("release {number}"));
        self.state().claimed = false;
        Ok(())
    }

    async fn control_transfer_out(&self, setup: ControlSetup, data: &[u8]) -> TransportResult<()> {
        assert!(data.is_empty(), "FTDI vendor requests carry no data stage");
        let delay = self.state().control_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state();
        state.controls.push(setup);
        if state.fail_control == Some(setup.request) {
            return Err(TransportError::Other(format!(
                "request {:#04x} stalled",
                setup.request
            )));
        }
        Ok(())
    }

    async fn transfer_in(&self, endpoint: u8, max_len: usize) -> TransportResult<InTransfer> {
        let next = {
            let mut state = self.state();
            state.in_endpoints.push(endpoint);
            if !state.claimed {
                state.in_without_interface += 1;
            }
            state.inbound.pop_front()
        };

        match next {
            Some(Inbound::Packet(mut data)) => {
                data.truncate(max_len);
                Ok(InTransfer {
                    status: TransferStatus::Ok,
                    data,
                    packet_size: self.packet_size,
                })
            }
            Some(Inbound::Stall) => Ok(InTransfer {
                status: TransferStatus::Stall,
                data: Vec::new(),
                packet_size: self.packet_size,
            }),
            Some(Inbound::Fail) => Err(TransportError::Disconnected),
            None => {
                // The chip answers with a bare status header once its
                // latency timer expires.
                tokio::time::sleep(Duration::from_millis(1)).await;
                Ok(InTransfer {
                    status: TransferStatus::Ok,
                    data: IDLE_STATUS.to_vec(),
                    packet_size: self.packet_size,
                })
            }
        }
    }

    async fn clear_halt(&self, endpoint: u8) -> TransportResult<()> {
        self.record(format!("clear halt {endpoint:#04x}"));
        if self.state().fail_clear_halt {
            return Err(TransportError::Disconnected);
        }
        Ok(())
    }

    async fn transfer_out(&self, endpoint: u8, data: &[u8]) -> TransportResult<usize> {
        let mut state = self.state();
        if state.fail_out {
            return Err(TransportError::Disconnected);
        }
        state.outbound.push((endpoint, data.to_vec()));
        Ok(data.len())
    }
}
