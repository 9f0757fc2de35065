//! The transport API facade: typed entry points over the actor in [`engine`].
//!
//! No behavior lives here beyond argument assembly and delegation -- `start` spawns the engine
//! task and hands back a [`TransportHandle`]; everything else is a thin call across the handle's
//! control channel.

mod engine;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::registry::{self, AddrInfo, AddrInfoError, InstanceId};
use crate::{CommandValue, DialError, Error, ExitReason, Handler, Kind};

/// Default bound on how long `start` waits for a TCP connect to complete before surfacing
/// [`DialError::Timeout`].
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default grace period the transport waits for the async sender to acknowledge `stop` before
/// giving up and closing the socket anyway.
pub const DEFAULT_SENDER_STOP_GRACE: Duration = Duration::from_millis(500);

/// Where the socket for a new instance comes from.
pub(crate) enum SocketSource {
    /// Listener path: adopt an already-accepted, already-connected socket.
    Listener(TcpStream),
    /// Dialer path: parse `addr` as a [`crate::Multiaddr`] and attempt a TCP connect. Parsing
    /// happens once the instance is actually running, not at `dialer` construction time, so a
    /// malformed address surfaces as a [`DialError::InvalidAddress`] through `stream_handler`
    /// exactly like a refused or timed-out connect.
    Dialer(String),
}

/// Delivered to a dialer's `stream_handler` endpoint when the connect attempt fails.
#[derive(Debug, Clone)]
pub struct StreamError {
    pub tag: Arc<str>,
    pub error: DialError,
}

/// Construction arguments for [`start`].
///
/// A handler module reference is, in Rust, just the already constructed `Box<dyn Handler>`:
/// there is no dynamic module registry to look a name up in, so the caller builds their handler
/// and hands over ownership here.
pub struct TransportOpts {
    pub(crate) handler: Box<dyn Handler>,
    pub(crate) socket: SocketSource,
    pub(crate) stream_handler: Option<(mpsc::UnboundedSender<StreamError>, Arc<str>)>,
    pub(crate) connect_timeout: Duration,
    pub(crate) sender_stop_grace: Duration,
}

impl TransportOpts {
    /// Listener path: `opts` adopts ownership of an already-connected socket.
    pub fn listener(socket: TcpStream, handler: Box<dyn Handler>) -> Self {
        Self {
            handler,
            socket: SocketSource::Listener(socket),
            stream_handler: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sender_stop_grace: DEFAULT_SENDER_STOP_GRACE,
        }
    }

    /// Dialer path: resolves `addr` (a `/ip4/.../tcp/...` multiaddr string) and attempts a TCP
    /// connect once the instance is started. `addr` is taken as a raw string rather than a
    /// pre-parsed [`crate::Multiaddr`] so that a malformed address is a dial failure reported
    /// through `stream_handler`, not a panic or an error the caller has to handle before the
    /// instance even exists.
    pub fn dialer(addr: impl Into<String>, handler: Box<dyn Handler>) -> Self {
        Self {
            handler,
            socket: SocketSource::Dialer(addr.into()),
            stream_handler: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            sender_stop_grace: DEFAULT_SENDER_STOP_GRACE,
        }
    }

    /// Registers `(sink, tag)` as the dialer failure endpoint.
    pub fn with_stream_handler(
        mut self,
        sink: mpsc::UnboundedSender<StreamError>,
        tag: impl Into<Arc<str>>,
    ) -> Self {
        self.stream_handler = Some((sink, tag.into()));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_sender_stop_grace(mut self, grace: Duration) -> Self {
        self.sender_stop_grace = grace;
        self
    }
}

pub(crate) enum Control {
    Command(CommandValue, oneshot::Sender<CommandValue>),
    /// Owner-initiated kill: the event loop returns immediately without consulting the handler,
    /// but shutdown still runs (sender stop, `terminate`, `registry::close`) exactly as it would
    /// for any other termination cause.
    Kill,
}

/// Handle to a running (or already-terminated) transport instance.
pub struct TransportHandle {
    id: InstanceId,
    control: mpsc::UnboundedSender<Control>,
    join: JoinHandle<ExitReason>,
}

impl TransportHandle {
    pub fn id(&self) -> InstanceId {
        self.id
    }

    /// Synchronous call with infinite wait, delegating to the handler's `handle_command`.
    /// Resolves once the handler replies (immediately or via a later `{reply, token, value}`
    /// action) or errors if the instance terminates first.
    pub async fn command(&self, cmd: CommandValue) -> Result<CommandValue, Error> {
        let (tx, rx) = oneshot::channel();
        self.control.send(Control::Command(cmd, tx)).map_err(|_| Error::Terminated)?;
        rx.await.map_err(|_| Error::Terminated)
    }

    pub fn addr_info(&self) -> Result<AddrInfo, AddrInfoError> {
        registry::addr_info(self.id)
    }

    /// Terminates the instance from the outside, as distinct from a handler-initiated `stop`.
    /// Unlike a raw task abort, this still runs the instance's shutdown sequence -- the sender is
    /// signaled `stop` and given its grace period, `handler.terminate` runs, and the registry
    /// entry is closed -- by signaling the event loop rather than tearing down the task out from
    /// under it. A send failure here means the instance has already exited on its own.
    pub fn kill(&self) {
        let _ = self.control.send(Control::Kill);
    }

    /// Awaits the instance's exit reason.
    pub async fn join(self) -> Result<ExitReason, Error> {
        Ok(self.join.await?)
    }
}

/// Spawns a transport instance and returns immediately.
///
/// For the dialer path, the TCP connect happens inside the spawned task; on failure the
/// instance notifies `opts.stream_handler` (if any) with a [`StreamError`] and terminates
/// without ever calling the handler's `init`.
pub fn start(kind: Kind, opts: TransportOpts) -> TransportHandle {
    let id = registry::register();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    let join = tokio::spawn(engine::run(kind, opts, id, control_rx));

    TransportHandle { id, control: control_tx, join }
}
