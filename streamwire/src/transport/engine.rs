//! The stream transport actor: a single-threaded cooperative task that owns the socket,
//! the frame buffer, the timer table, the async sender, and the currently installed handler.
//!
//! Structurally this mirrors `fe2o3-amqp`'s `ConnectionEngine::event_loop` -- one `tokio::select!`
//! over {socket, control channel, timers, sender errors}, dispatching into small `on_*` methods
//! that return either "keep going" or an exit reason -- generalized so the thing riding on top
//! of the socket is an arbitrary swappable [`Handler`] instead of a fixed AMQP connection state
//! machine.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use streamwire_codec::packet;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, instrument, trace, warn};

use crate::registry::{self, AddrInfo, InstanceId};
use crate::sender::SenderHandle;
use crate::timer::{self, TimerTable};
use crate::{
    Action, ActiveMode, CallerToken, DialError, ExitReason, Handler, HandlerResult, Info, Kind,
    Multiaddr, PacketSpec, SendFunction,
};

use super::{Control, SocketSource, StreamError, TransportOpts};

const TIMER_CHANNEL_CAPACITY: usize = 32;

struct Engine {
    id: InstanceId,
    kind: Kind,
    handler: Box<dyn Handler>,
    packet_spec: Option<PacketSpec>,
    active: ActiveMode,
    buffer: BytesMut,
    timers: TimerTable,
    timer_tx: mpsc::Sender<timer::Timeout>,
    sender: Option<SenderHandle>,
    sender_err_tx: mpsc::UnboundedSender<String>,
    sender_exit_tx: mpsc::UnboundedSender<()>,
    read_half: tokio::net::tcp::OwnedReadHalf,
    sender_stop_grace: std::time::Duration,
}

/// Entry point spawned by [`super::start`]. Owns the instance end to end: connection
/// establishment, the handler's `init`, the event loop, and shutdown.
#[instrument(name = "transport", skip_all, fields(kind = ?kind))]
pub(crate) async fn run(
    kind: Kind,
    opts: TransportOpts,
    id: InstanceId,
    mut control_rx: mpsc::UnboundedReceiver<Control>,
) -> ExitReason {
    let TransportOpts { handler, socket, stream_handler, connect_timeout, sender_stop_grace } =
        opts;

    let stream = match socket {
        SocketSource::Listener(stream) => stream,
        SocketSource::Dialer(addr) => {
            match dial(addr, connect_timeout).await {
                Ok(stream) => stream,
                Err(error) => {
                    if let Some((sink, tag)) = stream_handler {
                        let _ = sink.send(StreamError { tag, error: error.clone() });
                    }
                    registry::close(id);
                    return ExitReason::Custom(format!("dial failed: {error}"));
                }
            }
        }
    };

    let local = stream.local_addr().ok();
    let peer = stream.peer_addr().ok();
    if let (Some(local), Some(peer)) = (local, peer) {
        registry::set_addr_info(id, AddrInfo::from_socket_addrs(local, peer));
    }

    let (read_half, write_half) = stream.into_split();
    let (timer_tx, timer_rx) = mpsc::channel(TIMER_CHANNEL_CAPACITY);
    let (sender_err_tx, sender_err_rx) = mpsc::unbounded_channel();
    let (sender_exit_tx, sender_exit_rx) = mpsc::unbounded_channel();

    let default_send_fn = default_sender(write_half);
    let sender = SenderHandle::spawn(default_send_fn, sender_err_tx.clone(), sender_exit_tx.clone());

    let mut engine = Engine {
        id,
        kind,
        handler,
        packet_spec: None,
        active: ActiveMode::False,
        buffer: BytesMut::new(),
        timers: TimerTable::default(),
        timer_tx,
        sender: Some(sender),
        sender_err_tx,
        sender_exit_tx,
        read_half,
        sender_stop_grace,
    };

    registry::push_stack(engine.id, engine.handler.module_id(), engine.kind);

    let reason = match engine.handler.init(engine.kind) {
        crate::InitResult::Ok(actions) => match engine.apply_actions(actions) {
            Some(reason) => reason,
            None => engine.run_loop(timer_rx, control_rx, sender_err_rx, sender_exit_rx).await,
        },
        crate::InitResult::Stop(reason, actions) => {
            engine.apply_actions(actions);
            reason
        }
    };

    engine.shutdown(&reason).await;
    reason
}

async fn dial(addr: String, connect_timeout: std::time::Duration) -> Result<TcpStream, DialError> {
    let addr: Multiaddr = addr.parse().map_err(|err: streamwire_types::InvalidAddress| {
        DialError::InvalidAddress(err.0)
    })?;
    let target: SocketAddr = addr.socket_addr();
    match tokio::time::timeout(connect_timeout, TcpStream::connect(target)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(io_err)) => Err(DialError::from(io_err)),
        Err(_elapsed) => Err(DialError::Timeout),
    }
}

fn default_sender(write_half: tokio::net::tcp::OwnedWriteHalf) -> Arc<dyn SendFunction> {
    use tokio::io::AsyncWriteExt;

    let write_half = Arc::new(tokio::sync::Mutex::new(write_half));
    Arc::new(move |data: Bytes| {
        let write_half = write_half.clone();
        async move {
            let mut guard = write_half.lock().await;
            guard.write_all(&data).await
        }
    })
}

impl Engine {
    #[instrument(name = "event_loop", skip_all)]
    async fn run_loop(
        &mut self,
        mut timer_rx: mpsc::Receiver<timer::Timeout>,
        mut control_rx: mpsc::UnboundedReceiver<Control>,
        mut sender_err_rx: mpsc::UnboundedReceiver<String>,
        mut sender_exit_rx: mpsc::UnboundedReceiver<()>,
    ) -> ExitReason {
        loop {
            let outcome = tokio::select! {
                read = self.read_half.read_buf(&mut self.buffer), if self.active.is_active() => {
                    self.on_socket_read(read)
                }
                Some(timeout) = timer_rx.recv() => {
                    self.on_timeout(timeout)
                }
                Some(err) = sender_err_rx.recv() => {
                    self.on_send_error(err)
                }
                Some(()) = sender_exit_rx.recv() => {
                    self.on_sender_exit()
                }
                Some(ctrl) = control_rx.recv() => {
                    self.on_control(ctrl)
                }
                else => Some(ExitReason::Normal),
            };

            if let Some(reason) = outcome {
                return reason;
            }
        }
    }

    fn on_socket_read(&mut self, read: std::io::Result<usize>) -> Option<ExitReason> {
        match read {
            Ok(0) => Some(ExitReason::Normal),
            Ok(_n) => self.dispatch_loop(),
            Err(err) => {
                warn!(%err, "socket read failed");
                Some(ExitReason::Custom(format!("io error: {err}")))
            }
        }
    }

    /// Drains `self.buffer` against `self.packet_spec`, dispatching one `handle_packet` call per
    /// complete frame. Also re-entered directly after a `packet_spec` change -- re-framing the
    /// existing buffer under the new spec happens inline, no self-message needed.
    fn dispatch_loop(&mut self) -> Option<ExitReason> {
        loop {
            if !self.active.is_active() {
                return None;
            }
            let Some(spec) = self.packet_spec.clone() else {
                return None;
            };

            match packet::decode(&spec, &mut self.buffer) {
                Ok(Some((header, payload))) => {
                    if matches!(self.active, ActiveMode::Once) {
                        self.active = ActiveMode::False;
                    }
                    let result = self.handler.handle_packet(self.kind, &header, payload);
                    if let Some(reason) = self.apply_handler_result(result) {
                        return Some(reason);
                    }
                }
                Ok(None) => return None,
                Err(err) => {
                    warn!(%err, "frame decode failed");
                    return Some(ExitReason::Custom(format!("codec error: {err}")));
                }
            }
        }
    }

    fn on_timeout(&mut self, timeout: timer::Timeout) -> Option<ExitReason> {
        if !self.timers.accept(&timeout) {
            trace!(key = %timeout.key, "suppressing cancelled/superseded timeout");
            return None;
        }
        let result = self.handler.handle_info(self.kind, Info::Timeout(timeout.key));
        self.apply_handler_result(result)
    }

    fn on_send_error(&mut self, err: String) -> Option<ExitReason> {
        let result = self.handler.handle_info(self.kind, Info::SendError(err));
        self.apply_handler_result(result)
    }

    /// The async sender's task ended without ever having been told to `stop` -- a panic inside
    /// the write closure, or something external dropping its mailbox. Unlike a reported write
    /// error (non-fatal, routed to the handler via `Info::SendError`), there is no longer any
    /// sender to resume through: the instance can't make outbound progress, so it terminates.
    fn on_sender_exit(&mut self) -> Option<ExitReason> {
        warn!("async sender exited without being stopped");
        self.sender = None;
        Some(ExitReason::Custom("sender exited".to_string()))
    }

    fn on_control(&mut self, ctrl: Control) -> Option<ExitReason> {
        match ctrl {
            Control::Command(cmd, reply_tx) => {
                let token = CallerToken::new(reply_tx);
                let result = self.handler.handle_command(self.kind, cmd, token);
                self.apply_handler_result(result)
            }
            Control::Kill => {
                debug!("killed by owner");
                Some(ExitReason::Custom("killed".to_string()))
            }
        }
    }

    fn apply_handler_result(&mut self, result: HandlerResult) -> Option<ExitReason> {
        match result {
            HandlerResult::NoReply(actions) => self.apply_actions(actions),
            HandlerResult::Stop(reason, actions) => {
                self.apply_actions(actions);
                Some(reason)
            }
        }
    }

    /// The action interpreter. `swap`'s new-handler `init` actions are spliced in ahead of
    /// whatever in the original list followed the `swap`, so they run before the engine returns
    /// to the outer message loop but after everything the swapping handler itself queued.
    fn apply_actions(&mut self, actions: Vec<Action>) -> Option<ExitReason> {
        let mut queue: VecDeque<Action> = actions.into();

        while let Some(action) = queue.pop_front() {
            match action {
                Action::Send(data) => {
                    if let Some(sender) = &self.sender {
                        sender.enqueue(data);
                    } else {
                        warn!("send with no sender installed, dropping");
                    }
                }
                Action::Swap { module: _, opts: _, handler } => {
                    self.handler = handler;
                    registry::push_stack(self.id, self.handler.module_id(), self.kind);
                    match self.handler.init(self.kind) {
                        crate::InitResult::Ok(init_actions) => {
                            for action in init_actions.into_iter().rev() {
                                queue.push_front(action);
                            }
                        }
                        crate::InitResult::Stop(reason, init_actions) => {
                            self.apply_actions(init_actions);
                            return Some(reason);
                        }
                    }
                }
                Action::PacketSpec(spec) => {
                    if self.packet_spec.as_ref() != Some(&spec) {
                        self.packet_spec = Some(spec);
                        if let Some(reason) = self.dispatch_loop() {
                            return Some(reason);
                        }
                    }
                }
                Action::Active(mode) => {
                    if self.active != mode {
                        self.active = mode;
                        if let Some(reason) = self.dispatch_loop() {
                            return Some(reason);
                        }
                    }
                }
                Action::Reply { token, value } => {
                    let _ = token.release(value);
                }
                Action::Timer { key, millis } => {
                    self.timers.arm(key, millis, self.timer_tx.clone());
                }
                Action::CancelTimer(key) => {
                    self.timers.cancel(&key);
                }
                Action::SendFn(send_fn) => {
                    if let Some(old) = self.sender.take() {
                        old.retire();
                    }
                    self.sender = Some(SenderHandle::spawn(
                        send_fn,
                        self.sender_err_tx.clone(),
                        self.sender_exit_tx.clone(),
                    ));
                }
                Action::SwapKind => {
                    self.kind = self.kind.flipped();
                    registry::flip_latest_kind(self.id, self.kind);
                }
            }
        }

        None
    }

    async fn shutdown(&mut self, reason: &ExitReason) {
        debug!(%reason, "shutting down");

        if let Some(sender) = self.sender.take() {
            let ack = sender.stop();
            if tokio::time::timeout(self.sender_stop_grace, ack).await.is_err() {
                warn!("sender did not acknowledge stop within grace period");
            }
        }

        self.handler.terminate(self.kind, reason);
        self.timers.clear();
        registry::close(self.id);
    }
}
