//! Single-fire notifications between the driver and its poller task.
//!
//! Each notification fires at most once per session, and the types make that
//! hard to get wrong: the closing trigger and the stopped guard are consumed
//! when they fire, and the disconnect latch can only flip from `false` to
//! `true`.

use tokio::sync::{oneshot, watch};

/// Driver side of the `closing` notification.
#[derive(Debug)]
pub(crate) struct ClosingTrigger(oneshot::Sender<()>);

/// Poller side of the `closing` notification.
#[derive(Debug)]
pub(crate) struct ClosingWatch(oneshot::Receiver<()>);

/// Create a connected `closing` pair.
pub(crate) fn closing() -> (ClosingTrigger, ClosingWatch) {
    let (tx, rx) = oneshot::channel();
    (ClosingTrigger(tx), ClosingWatch(rx))
}

impl ClosingTrigger {
    /// Ask the poller to stop after its current transfer.
    pub(crate) fn fire(self) {
        // The poller may already be gone (disconnect); nothing to tell then.
        let _ = self.0.send(());
    }
}

impl ClosingWatch {
    /// Whether closing was requested. A dropped trigger counts as a request.
    pub(crate) fn is_requested(&mut self) -> bool {
        match self.0.try_recv() {
            Ok(()) => true,
            Err(oneshot::error::TryRecvError::Empty) => false,
            Err(oneshot::error::TryRecvError::Closed) => true,
        }
    }
}

/// Sends `stopped` when dropped, so the notification fires exactly once
/// however the poller task ends.
#[derive(Debug)]
pub(crate) struct StoppedGuard(Option<oneshot::Sender<()>>);

/// Driver side of the `stopped` notification.
pub(crate) type StoppedWait = oneshot::Receiver<()>;

/// Create a connected `stopped` pair.
pub(crate) fn stopped() -> (StoppedGuard, StoppedWait) {
    let (tx, rx) = oneshot::channel();
    (StoppedGuard(Some(tx)), rx)
}

impl Drop for StoppedGuard {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(());
        }
    }
}

/// Latch raised when the transport fails after open.
#[derive(Debug, Clone)]
pub(crate) struct DisconnectSignal(watch::Sender<bool>);

impl DisconnectSignal {
    pub(crate) fn new() -> Self {
        Self(watch::Sender::new(false))
    }

    /// Raise the latch. Returns `true` only for the call that raised it.
    pub(crate) fn fire(&self) -> bool {
        let fired = self.0.send_if_modified(|disconnected| {
            if *disconnected {
                false
            } else {
                *disconnected = true;
                true
            }
        });
        if fired {
            log::warn!("USB device disconnected");
        }
        fired
    }

    pub(crate) fn is_fired(&self) -> bool {
        *self.0.borrow()
    }

    pub(crate) fn subscribe(&self) -> DisconnectListener {
        DisconnectListener(self.0.subscribe())
    }
}

/// Public handle on the `disconnect` notification.
///
/// Receiving it is terminal: the device is gone and the driver should be
/// closed.
#[derive(Debug, Clone)]
pub struct DisconnectListener(watch::Receiver<bool>);

impl DisconnectListener {
    /// Whether the device has been reported disconnected.
    pub fn is_disconnected(&self) -> bool {
        *self.0.borrow()
    }

    /// Wait until the device is reported disconnected.
    ///
    /// Returns immediately if that already happened. Never resolves for a
    /// device that stays connected, even after the driver is dropped.
    pub async fn wait(&mut self) {
        if self.0.wait_for(|disconnected| *disconnected).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
