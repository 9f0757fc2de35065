//! A small non-typestate builder for [`super::Multistream`]'s handler table, in the spirit of
//! `fe2o3-amqp`'s `Connection::builder()` ergonomics without reproducing its typestate machinery
//! (that machinery exists there to thread required AMQP-specific parameters through several
//! mandatory steps; the negotiator's handler table has no such sequencing constraint).

use std::sync::Arc;

use crate::{Handler, ModuleId};

use super::{
    HandlerEntry, HandlerFactory, Multistream, DEFAULT_HANDSHAKE_TIMEOUT_MAX_MS,
    DEFAULT_HANDSHAKE_TIMEOUT_MIN_MS, DEFAULT_NEGOTIATE_TIMEOUT_MS,
};

/// Builds a [`Multistream`] negotiator's ordered `(prefix, (module, factory))` handler table.
///
/// `listener()` and `dialer()` are identical in what they build -- the FSM reads its role off
/// the `Kind` the transport passes into `init`, not off which constructor built it -- but naming
/// both separately keeps call sites reading the way `TransportOpts::listener`/`::dialer` already
/// do.
pub struct MultistreamBuilder {
    handlers: Vec<HandlerEntry>,
    handshake_timeout_jitter: (u64, u64),
    negotiate_timeout_ms: u64,
}

impl MultistreamBuilder {
    pub fn listener() -> Self {
        Self::new()
    }

    pub fn dialer() -> Self {
        Self::new()
    }

    fn new() -> Self {
        Self {
            handlers: Vec::new(),
            handshake_timeout_jitter: (DEFAULT_HANDSHAKE_TIMEOUT_MIN_MS, DEFAULT_HANDSHAKE_TIMEOUT_MAX_MS),
            negotiate_timeout_ms: DEFAULT_NEGOTIATE_TIMEOUT_MS,
        }
    }

    /// Registers a protocol prefix in priority order. `factory` builds the concrete handler once
    /// this prefix is selected; it receives the path remainder a server matched past the prefix
    /// (always `None` on the client side).
    pub fn with_handler(
        mut self,
        prefix: impl Into<Arc<str>>,
        module: ModuleId,
        factory: impl Fn(Option<String>) -> Box<dyn Handler> + Send + Sync + 'static,
    ) -> Self {
        self.handlers.push(HandlerEntry { prefix: prefix.into(), module, factory: Arc::new(factory) as HandlerFactory });
        self
    }

    /// Overrides the client-side handshake timeout jitter window (default: 15000-35000 ms).
    pub fn with_handshake_timeout_jitter(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.handshake_timeout_jitter = (min_ms, max_ms);
        self
    }

    /// Overrides the server-side negotiate timeout (default: 30000 ms).
    pub fn with_negotiate_timeout_ms(mut self, ms: u64) -> Self {
        self.negotiate_timeout_ms = ms;
        self
    }

    /// Builds the negotiator. Does not itself validate that at least one handler was registered
    /// -- that check happens at `init` time, where a `missing_handlers` failure is meant to
    /// surface.
    pub fn build(self) -> Box<dyn Handler> {
        Box::new(Multistream::new(self.handlers, self.handshake_timeout_jitter, self.negotiate_timeout_ms))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExitReason, InitResult, Kind};

    #[test]
    fn build_without_handlers_fails_at_init_not_build() {
        let mut handler = MultistreamBuilder::listener().build();
        match handler.init(Kind::Server) {
            InitResult::Stop(ExitReason::MissingHandlers, _) => {}
            _ => panic!("expected MissingHandlers"),
        }
    }
}
