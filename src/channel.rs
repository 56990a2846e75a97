//! Consumer-facing byte channels.
//!
//! A session exposes at most one [`SerialReader`] and one [`SerialWriter`]
//! at a time. Each is guarded by a small state machine:
//!
//! ```text
//! Absent --acquire--> Active --consumer close--> ConsumerClosed --acquire--> Active
//! ```
//!
//! Closing the driver seals both slots: they fall back to `Absent` and can no
//! longer be acquired.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::sender::OutboundSender;
use crate::transport::UsbTransport;

/// Lock a std mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Lifecycle of one consumer channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelState {
    /// No consumer holds the channel.
    #[default]
    Absent,
    /// A consumer holds the channel.
    Active,
    /// The consumer closed it; the next access recreates it.
    ConsumerClosed,
}

#[derive(Debug, Default)]
pub(crate) struct ChannelSlot {
    state: ChannelState,
    sealed: bool,
}

impl ChannelSlot {
    /// Hand the channel to a new consumer, if allowed.
    pub(crate) fn acquire(&mut self) -> bool {
        if self.sealed {
            return false;
        }
        if self.state == ChannelState::ConsumerClosed {
            self.state = ChannelState::Absent;
        }
        match self.state {
            ChannelState::Absent => {
                self.state = ChannelState::Active;
                true
            }
            _ => false,
        }
    }

    pub(crate) fn release(&mut self) {
        if self.state == ChannelState::Active {
            self.state = ChannelState::ConsumerClosed;
        }
    }

    pub(crate) fn seal(&mut self) {
        self.sealed = true;
        self.state = ChannelState::Absent;
    }

    pub(crate) fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.state
    }
}

/// Why an inbound payload did not reach a reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Undelivered {
    /// No reader holds the channel.
    NoReader,
    /// The reader is not keeping up.
    Full,
    /// The reader went away.
    Closed,
}

/// Read side of a session: the slot plus the sink the poller feeds.
#[derive(Debug)]
pub(crate) struct ReadSlot {
    slot: ChannelSlot,
    sink: Option<mpsc::Sender<Vec<u8>>>,
    producer_alive: bool,
}

pub(crate) type SharedReadSlot = Arc<Mutex<ReadSlot>>;
pub(crate) type SharedWriteSlot = Arc<Mutex<ChannelSlot>>;

impl ReadSlot {
    pub(crate) fn new() -> Self {
        Self {
            slot: ChannelSlot::default(),
            sink: None,
            producer_alive: true,
        }
    }

    /// Create the receiving end for a new reader.
    ///
    /// Once the poller has stopped the sender is dropped right away, so the
    /// reader sees end-of-stream on its first read. A `capacity` of 0 buffers
    /// one payload.
    pub(crate) fn open_reader(&mut self, capacity: usize) -> Option<mpsc::Receiver<Vec<u8>>> {
        if !self.slot.acquire() {
            return None;
        }
        let (tx, rx) = mpsc::channel(capacity.max(1));
        if self.producer_alive {
            self.sink = Some(tx);
        }
        Some(rx)
    }

    /// Hand a payload to the current reader without waiting.
    pub(crate) fn deliver(&self, payload: Vec<u8>) -> std::result::Result<(), Undelivered> {
        let sink = self.sink.as_ref().ok_or(Undelivered::NoReader)?;
        sink.try_send(payload).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => Undelivered::Full,
            mpsc::error::TrySendError::Closed(_) => Undelivered::Closed,
        })
    }

    pub(crate) fn release(&mut self) {
        self.slot.release();
        self.sink = None;
    }

    pub(crate) fn producer_stopped(&mut self) {
        self.producer_alive = false;
        self.sink = None;
    }

    pub(crate) fn seal(&mut self) {
        self.slot.seal();
        self.sink = None;
    }

    pub(crate) fn state(&self) -> ChannelState {
        self.slot.state()
    }
}

/// Byte stream received from the device.
///
/// Yields payload bytes with the per-packet status header already removed.
/// Ends once the driver is closed or the device disconnects. Dropping the
/// reader (or calling [`close`](Self::close)) lets the driver hand out a
/// fresh one while the session is still active.
#[derive(Debug)]
pub struct SerialReader {
    rx: mpsc::Receiver<Vec<u8>>,
    slot: SharedReadSlot,
    leftover: Vec<u8>,
    offset: usize,
}

impl SerialReader {
    pub(crate) fn new(rx: mpsc::Receiver<Vec<u8>>, slot: SharedReadSlot) -> Self {
        Self {
            rx,
            slot,
            leftover: Vec::new(),
            offset: 0,
        }
    }

    /// Receive the next chunk of bytes, or `None` at end of stream.
    pub async fn read_chunk(&mut self) -> Option<Vec<u8>> {
        if self.offset < self.leftover.len() {
            let rest = self.leftover.split_off(self.offset);
            self.leftover.clear();
            self.offset = 0;
            return Some(rest);
        }
        self.rx.recv().await
    }

    /// Give the channel back to the driver.
    pub fn close(self) {}
}

impl Drop for SerialReader {
    fn drop(&mut self) {
        lock(&self.slot).release();
    }
}

impl AsyncRead for SerialReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();

        if this.offset >= this.leftover.len() {
            match ready!(this.rx.poll_recv(cx)) {
                Some(chunk) => {
                    this.leftover = chunk;
                    this.offset = 0;
                }
                // End of stream.
                None => return Poll::Ready(Ok(())),
            }
        }

        let available = &this.leftover[this.offset..];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.offset += n;
        Poll::Ready(Ok(()))
    }
}

type PendingWrite = Pin<Box<dyn Future<Output = Result<usize>> + Send>>;

/// Byte sink towards the device.
///
/// Every [`write`](Self::write) becomes one bulk OUT transfer. Transfer
/// failures are not reported here; they raise the driver's disconnect
/// notification instead.
pub struct SerialWriter<T: UsbTransport> {
    sender: Arc<OutboundSender<T>>,
    slot: SharedWriteSlot,
    pending: Option<PendingWrite>,
}

impl<T: UsbTransport> std::fmt::Debug for SerialWriter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialWriter")
            .field("pending", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: UsbTransport> SerialWriter<T> {
    pub(crate) fn new(sender: Arc<OutboundSender<T>>, slot: SharedWriteSlot) -> Self {
        Self {
            sender,
            slot,
            pending: None,
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if lock(&self.slot).is_sealed() {
            Err(Error::PortNotOpen)
        } else {
            Ok(())
        }
    }

    /// Send `data` to the device.
    ///
    /// Fails with [`Error::PortNotOpen`] once the driver has been closed or
    /// when the device has no bulk OUT endpoint.
    pub async fn write(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_open()?;
        self.sender.send(data).await
    }

    /// Give the channel back to the driver.
    pub fn close(self) {}
}

impl<T: UsbTransport> Drop for SerialWriter<T> {
    fn drop(&mut self) {
        lock(&self.slot).release();
    }
}

impl<T: UsbTransport> AsyncWrite for SerialWriter<T> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();

        if this.pending.is_none() {
            if let Err(e) = this.ensure_open() {
                return Poll::Ready(Err(io::Error::other(e)));
            }
            let sender = Arc::clone(&this.sender);
            let data = buf.to_vec();
            this.pending = Some(Box::pin(async move {
                sender.send(&data).await.map(|()| data.len())
            }));
        }

        let Some(fut) = this.pending.as_mut() else {
            return Poll::Ready(Ok(0));
        };
        let res = ready!(fut.as_mut().poll(cx));
        this.pending = None;
        Poll::Ready(res.map_err(io::Error::other))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if let Some(fut) = this.pending.as_mut() {
            let res = ready!(fut.as_mut().poll(cx));
            this.pending = None;
            res.map_err(io::Error::other)?;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.poll_flush(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_recreated_after_consumer_close() {
        let mut slot = ChannelSlot::default();
        assert!(slot.acquire());
        assert_eq!(slot.state(), ChannelState::Active);
        assert!(!slot.acquire(), "single consumer at a time");

        slot.release();
        assert_eq!(slot.state(), ChannelState::ConsumerClosed);
        assert!(slot.acquire());
        assert_eq!(slot.state(), ChannelState::Active);
    }

    #[test]
    fn sealed_slot_stays_absent() {
        let mut slot = ChannelSlot::default();
        assert!(slot.acquire());
        slot.seal();
        assert_eq!(slot.state(), ChannelState::Absent);
        assert!(!slot.acquire());
        slot.release();
        assert_eq!(slot.state(), ChannelState::Absent);
    }

    #[test]
    fn delivery_is_best_effort() {
        let mut slot = ReadSlot::new();
        assert_eq!(slot.deliver(vec![1]), Err(Undelivered::NoReader));

        let mut rx = slot.open_reader(1).unwrap();
        assert_eq!(slot.deliver(vec![1]), Ok(()));
        assert_eq!(slot.deliver(vec![2]), Err(Undelivered::Full));
        assert_eq!(rx.try_recv().unwrap(), vec![1]);

        drop(rx);
        assert_eq!(slot.deliver(vec![3]), Err(Undelivered::Closed));
    }

    #[test]
    fn zero_capacity_buffers_one_payload() {
        let mut slot = ReadSlot::new();
        let mut rx = slot.open_reader(0).unwrap();
        assert_eq!(slot.deliver(vec![1]), Ok(()));
        assert_eq!(slot.deliver(vec![2]), Err(Undelivered::Full));
        assert_eq!(rx.try_recv().unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn reader_ends_after_producer_stops() {
        let slot: SharedReadSlot = Arc::new(Mutex::new(ReadSlot::new()));
        let rx = lock(&slot).open_reader(4).unwrap();
        let mut reader = SerialReader::new(rx, Arc::clone(&slot));

        lock(&slot).deliver(b"abc".to_vec()).unwrap();
        lock(&slot).producer_stopped();

        assert_eq!(reader.read_chunk().await, Some(b"abc".to_vec()));
        assert_eq!(reader.read_chunk().await, None);

        drop(reader);
        assert_eq!(lock(&slot).state(), ChannelState::ConsumerClosed);

        // A reader created after the poller stopped ends immediately.
        let rx = lock(&slot).open_reader(4).unwrap();
        let mut late = SerialReader::new(rx, Arc::clone(&slot));
        assert_eq!(late.read_chunk().await, None);
    }

    #[tokio::test]
    async fn async_read_splits_chunks() {
        use tokio::io::AsyncReadExt;

        let slot: SharedReadSlot = Arc::new(Mutex::new(ReadSlot::new()));
        let rx = lock(&slot).open_reader(4).unwrap();
        let mut reader = SerialReader::new(rx, Arc::clone(&slot));

        lock(&slot).deliver(b"hello".to_vec()).unwrap();
        lock(&slot).producer_stopped();

        let mut two = [0u8; 2];
        reader.read_exact(&mut two).await.unwrap();
        assert_eq!(&two, b"he");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"llo");
    }
}
