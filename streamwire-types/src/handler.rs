use bytes::Bytes;

use crate::action::{Action, CallerToken, CommandValue, ExitReason};
use crate::kind::Kind;

/// Result of a handler's `init`.
///
/// `Stop` still carries `actions` so a handler can flush a final `send` before the transport
/// tears down (an init that decides to stop immediately but wants one last write out first).
pub enum InitResult {
    Ok(Vec<Action>),
    Stop(ExitReason, Vec<Action>),
}

/// Result of `handle_packet` / `handle_info`.
pub enum HandlerResult {
    NoReply(Vec<Action>),
    Stop(ExitReason, Vec<Action>),
}

/// A message delivered to `handle_info` that did not come from the socket: a timer firing, or
/// a notification from the async sender.
pub enum Info {
    Timeout(std::sync::Arc<str>),
    SendError(String),
}

/// User-supplied protocol module conforming to the stream ABI.
///
/// `init`/`handle_packet` are required; `handle_info`/`handle_command`/`terminate` have
/// identity defaults (warn-and-drop for unsolicited info/commands, no-op for `terminate`) so a
/// handler that never receives timers or commands need not implement them.
///
/// A handler's state lives in `self`; `Action::Swap` replaces the whole trait object, which is
/// how the transport erases one concrete handler's state type in favor of another's without
/// reallocating itself.
pub trait Handler: Send {
    fn module_id(&self) -> crate::action::ModuleId;

    fn init(&mut self, kind: Kind) -> InitResult;

    fn handle_packet(&mut self, kind: Kind, header: &[u64], payload: Bytes) -> HandlerResult;

    fn handle_info(&mut self, _kind: Kind, info: Info) -> HandlerResult {
        match info {
            Info::Timeout(key) => {
                tracing::warn!(%key, "unhandled timeout, dropping");
            }
            Info::SendError(err) => {
                tracing::warn!(%err, "unhandled send error, dropping");
            }
        }
        HandlerResult::NoReply(Vec::new())
    }

    /// `token` is the caller's release handle: reply inline with
    /// `Action::Reply { token, value }` among the returned actions, or stash it in `self` and
    /// release it from a later `handle_packet`/`handle_info`/`handle_command` call instead.
    fn handle_command(
        &mut self,
        _kind: Kind,
        _cmd: CommandValue,
        token: CallerToken,
    ) -> HandlerResult {
        tracing::warn!("unhandled command, dropping");
        drop(token);
        HandlerResult::NoReply(Vec::new())
    }

    fn terminate(&mut self, _kind: Kind, _reason: &ExitReason) {}
}
