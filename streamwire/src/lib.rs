//! A protocol-agnostic stream transport actor with a multistream-select negotiator.
//!
//! [`transport`] owns a single connection: socket I/O, packet framing, timers, and a
//! hot-swappable [`Handler`](streamwire_types::Handler) module. [`multistream`] is one such
//! handler, implementing libp2p's `/multistream/1.0.0` protocol-selection handshake and handing
//! the connection off to the negotiated protocol by swapping itself out in place.
//!
//! The packet/line wire format lives in [`streamwire_codec`]; the shared data model (`Action`,
//! `Kind`, `Handler`, ...) lives in [`streamwire_types`], re-exported here for convenience.

mod error;
mod registry;
mod sender;
mod timer;

pub mod multistream;
pub mod transport;

pub use error::Error;
pub use registry::{AddrInfo, InstanceId};
pub use streamwire_types::{
    Action, ActiveMode, CallerToken, CodecError, CommandValue, DialError, ExitReason, Handler,
    HandlerResult, Info, InitResult, Kind, LengthField, Multiaddr, ModuleId, Opts, PacketSpec,
    SendFunction,
};
pub use transport::{TransportHandle, TransportOpts};
