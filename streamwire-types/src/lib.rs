//! Data model for the streamwire stream runtime.
//!
//! This crate holds the types that cross the boundary between the packet/line codec
//! (`streamwire-codec`) and the transport actor (`streamwire`): the connection [`Kind`], the
//! [`ActiveMode`] flow-control tri-state, the [`PacketSpec`] framing description, the
//! [`Action`] variants a handler callback can return, and the shared error taxonomy.

mod action;
mod active;
mod error;
mod handler;
mod kind;
mod multiaddr;
mod packet_spec;

pub use action::{Action, CallerToken, CommandValue, ExitReason, ModuleId, Opts, SendFunction};
pub use active::ActiveMode;
pub use error::{CodecError, DialError};
pub use handler::{Handler, HandlerResult, Info, InitResult};
pub use kind::Kind;
pub use multiaddr::{InvalidAddress, Multiaddr};
pub use packet_spec::{LengthField, PacketSpec};
