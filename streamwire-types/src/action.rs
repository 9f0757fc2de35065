use std::any::Any;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::active::ActiveMode;
use crate::handler::Handler;
use crate::packet_spec::PacketSpec;

/// Identifies a handler module that can be plugged into a transport via [`Action::Swap`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleId(pub Arc<str>);

impl ModuleId {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options passed to a handler's `init`, and to a fresh handler on `swap`.
///
/// `path` is the one field the multistream negotiator needs to inject generically (the
/// remainder of a matched protocol line); everything else is handler-specific and carried
/// behind `extra`, downcast by the handler that knows its own concrete type.
pub struct Opts {
    pub path: Option<String>,
    pub extra: Box<dyn Any + Send>,
}

impl Opts {
    pub fn new(extra: impl Any + Send) -> Self {
        Self { path: None, extra: Box::new(extra) }
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn downcast<T: Any>(self) -> Result<T, Self> {
        if self.extra.is::<T>() {
            // SAFETY-free: `is::<T>()` just checked, but we still need to consume `self.extra`.
            let path = self.path;
            match self.extra.downcast::<T>() {
                Ok(boxed) => Ok(*boxed),
                Err(extra) => Err(Self { path, extra }),
            }
        } else {
            Err(self)
        }
    }
}

impl fmt::Debug for Opts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Opts").field("path", &self.path).finish_non_exhaustive()
    }
}

/// Value flowing back through a [`CallerToken`] or out of a `command_result::Reply`.
pub type CommandValue = Box<dyn Any + Send>;

/// An opaque handle releasing a caller parked on a `noreply` command result.
///
/// Carries whatever is needed to wake the waiter -- here, the sending half of the oneshot
/// channel `command` is blocked on. At most one is stored per caller; consuming it (via
/// `Action::Reply`) is the only way to release it.
pub struct CallerToken(pub(crate) oneshot::Sender<CommandValue>);

impl fmt::Debug for CallerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CallerToken(..)")
    }
}

impl CallerToken {
    /// Wraps the sending half of the oneshot channel a `command` caller is blocked on.
    pub fn new(tx: oneshot::Sender<CommandValue>) -> Self {
        Self(tx)
    }

    /// Delivers `value` to the parked caller. Errs (returning `value` back) if the caller has
    /// already given up, e.g. by dropping its future.
    pub fn release(self, value: CommandValue) -> Result<(), CommandValue> {
        self.0.send(value)
    }
}

/// Why a transport instance terminated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitReason {
    Normal,
    HandshakeMismatch(String),
    HandshakeTimeout,
    NoHandlers,
    UnexpectedServerResponse(String),
    MissingHandlers,
    Custom(String),
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::Normal => write!(f, "normal"),
            ExitReason::HandshakeMismatch(line) => write!(f, "handshake_mismatch({line:?})"),
            ExitReason::HandshakeTimeout => write!(f, "handshake_timeout"),
            ExitReason::NoHandlers => write!(f, "no_handlers"),
            ExitReason::UnexpectedServerResponse(line) => {
                write!(f, "unexpected_server_response({line:?})")
            }
            ExitReason::MissingHandlers => write!(f, "missing_handlers"),
            ExitReason::Custom(reason) => write!(f, "{reason}"),
        }
    }
}

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// A replacement write function installed by [`Action::SendFn`].
pub trait SendFunction: Send + Sync {
    fn call(&self, data: Bytes) -> BoxFuture<std::io::Result<()>>;
}

impl<F, Fut> SendFunction for F
where
    F: Fn(Bytes) -> Fut + Send + Sync,
    Fut: Future<Output = std::io::Result<()>> + Send + 'static,
{
    fn call(&self, data: Bytes) -> BoxFuture<std::io::Result<()>> {
        Box::pin((self)(data))
    }
}

/// Declarative instruction returned by a handler callback, interpreted by the transport's
/// action interpreter in list order.
pub enum Action {
    Send(Bytes),
    Swap { module: ModuleId, opts: Opts, handler: Box<dyn Handler> },
    PacketSpec(PacketSpec),
    Active(ActiveMode),
    Reply { token: CallerToken, value: CommandValue },
    Timer { key: Arc<str>, millis: u64 },
    CancelTimer(Arc<str>),
    SendFn(Arc<dyn SendFunction>),
    SwapKind,
}

impl fmt::Debug for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Send(b) => f.debug_tuple("Send").field(&b.len()).finish(),
            Action::Swap { module, opts, .. } => {
                f.debug_struct("Swap").field("module", module).field("opts", opts).finish_non_exhaustive()
            }
            Action::PacketSpec(s) => f.debug_tuple("PacketSpec").field(s).finish(),
            Action::Active(a) => f.debug_tuple("Active").field(a).finish(),
            Action::Reply { .. } => f.write_str("Reply(..)"),
            Action::Timer { key, millis } => {
                f.debug_struct("Timer").field("key", key).field("millis", millis).finish()
            }
            Action::CancelTimer(key) => f.debug_tuple("CancelTimer").field(key).finish(),
            Action::SendFn(_) => f.write_str("SendFn(..)"),
            Action::SwapKind => f.write_str("SwapKind"),
        }
    }
}
