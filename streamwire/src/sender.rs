//! The async sender co-process: a second task paired with each transport that owns
//! outbound writes, so socket write latency never blocks the actor's packet-dispatch loop, and
//! so FIFO send order survives a `swap` (queued sends drain before the old task notices `stop`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::SendFunction;

enum Message {
    Send(Bytes),
    Stop(oneshot::Sender<()>),
}

/// Handle to a running sender task. Dropping it leaves the task to drain its queue and exit on
/// its own; use [`SenderHandle::stop`] to request a clean shutdown and wait for the ack.
#[derive(Debug)]
pub(crate) struct SenderHandle {
    tx: mpsc::UnboundedSender<Message>,
}

impl SenderHandle {
    /// Spawns a sender closing over `send_fn`. Write errors are reported on `errors`, one string
    /// per failed `send`; a write failure is non-fatal to the sender itself, and the task keeps
    /// running afterward. If the task itself ends without ever having been asked to `stop` -- a
    /// panic inside `send_fn`, or its mailbox being dropped out from under it -- `exited` is
    /// notified once, so the engine can treat that distinctly from an ordinary reported write
    /// error and terminate the instance.
    pub fn spawn(
        send_fn: Arc<dyn SendFunction>,
        errors: mpsc::UnboundedSender<String>,
        exited: mpsc::UnboundedSender<()>,
    ) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let stopped_by_task = stopped.clone();

        let task = tokio::spawn(async move {
            while let Some(msg) = rx.recv().await {
                match msg {
                    Message::Send(data) => {
                        if let Err(err) = send_fn.call(data).await {
                            tracing::debug!(%err, "sender: write failed");
                            let _ = errors.send(err.to_string());
                        }
                    }
                    Message::Stop(ack) => {
                        stopped_by_task.store(true, Ordering::Release);
                        let _ = ack.send(());
                        break;
                    }
                }
            }
        });

        tokio::spawn(async move {
            let _ = task.await;
            if !stopped.load(Ordering::Acquire) {
                let _ = exited.send(());
            }
        });

        Self { tx }
    }

    /// Enqueues a write. The mailbox is unbounded and fire-and-forget; there is no backpressure
    /// signal back to the handler.
    pub fn enqueue(&self, data: Bytes) {
        let _ = self.tx.send(Message::Send(data));
    }

    /// Signals the sender to drain its queue and stop, returning a receiver that resolves once
    /// it has. The caller is expected to apply its own grace-period timeout.
    pub fn stop(&self) -> oneshot::Receiver<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        let _ = self.tx.send(Message::Stop(ack_tx));
        ack_rx
    }

    /// Stops this sender without waiting for the ack, used when `{send_fn, fun}` replaces a
    /// sender that is about to be superseded rather than torn down for good.
    pub fn retire(self) {
        let _ = self.stop();
    }
}
