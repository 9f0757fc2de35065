//! The multistream-select negotiator: a two-state handshake/negotiate FSM riding on top
//! of the transport as an ordinary [`Handler`], that ultimately swaps itself out for whichever
//! protocol handler it negotiates.
//!
//! Structurally this is the transport's `Handler` ABI used the way `fe2o3-amqp`'s SASL layer
//! uses `Transport`'s frame codec: a small state machine driven entirely by `handle_packet` and
//! `handle_info`, expressed as actions rather than direct socket access.

mod builder;

use std::sync::Arc;

use bytes::Bytes;
use streamwire_codec::line;

use crate::{
    Action, ActiveMode, ExitReason, Handler, HandlerResult, Info, InitResult, Kind, LengthField,
    ModuleId, Opts, PacketSpec,
};

pub use builder::MultistreamBuilder;

/// The only protocol-id line a peer's handshake message may carry.
pub const MULTISTREAM_PROTOCOL: &str = "/multistream/1.0.0";

/// Default client-side handshake timeout window: randomized 15000-35000 ms.
pub const DEFAULT_HANDSHAKE_TIMEOUT_MIN_MS: u64 = 15_000;
pub const DEFAULT_HANDSHAKE_TIMEOUT_MAX_MS: u64 = 35_000;

/// Default server-side negotiate timeout.
pub const DEFAULT_NEGOTIATE_TIMEOUT_MS: u64 = 30_000;

fn handshake_timer_key() -> Arc<str> {
    Arc::from("handshake_timeout")
}

fn negotiate_timer_key() -> Arc<str> {
    Arc::from("negotiate_timeout")
}

/// Produces a protocol handler for a configured prefix, given the path remainder the server
/// matched past that prefix (`None` for the client side, which never has a remainder).
///
/// A `ModuleId` identifies a *kind* of handler; since there is no dynamic module registry to
/// resolve a name against, the factory stands in for it: it is the thing that actually knows
/// how to construct a fresh `Box<dyn Handler>` when this prefix is selected.
pub type HandlerFactory = Arc<dyn Fn(Option<String>) -> Box<dyn Handler> + Send + Sync>;

pub(crate) struct HandlerEntry {
    pub(crate) prefix: Arc<str>,
    pub(crate) module: ModuleId,
    pub(crate) factory: HandlerFactory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FsmState {
    Handshake,
    Negotiate,
}

/// The `/multistream/1.0.0` negotiator.
///
/// Built via [`MultistreamBuilder`], then handed to [`crate::transport::TransportOpts`] as an
/// ordinary `Box<dyn Handler>` -- the transport does not know or care that this particular
/// handler's only job is to replace itself.
pub struct Multistream {
    state: FsmState,
    handlers: Vec<HandlerEntry>,
    /// Cursor into `handlers`, advanced on each `na` response (client role only).
    selected_index: usize,
    handshake_timeout_jitter: (u64, u64),
    negotiate_timeout_ms: u64,
}

impl Multistream {
    pub(crate) fn new(
        handlers: Vec<HandlerEntry>,
        handshake_timeout_jitter: (u64, u64),
        negotiate_timeout_ms: u64,
    ) -> Self {
        Self {
            state: FsmState::Handshake,
            handlers,
            selected_index: 0,
            handshake_timeout_jitter,
            negotiate_timeout_ms,
        }
    }

    fn handshake_line(&self) -> HandlerResult {
        match line::encode_line(MULTISTREAM_PROTOCOL.as_bytes()) {
            Ok(encoded) => HandlerResult::NoReply(vec![Action::Send(encoded)]),
            Err(err) => protocol_error(err),
        }
    }

    fn on_handshake(&mut self, kind: Kind, payload: Bytes) -> HandlerResult {
        let line = match line::strip_newline(payload) {
            Ok(line) => line,
            Err(err) => return protocol_error(err),
        };

        if &line[..] != MULTISTREAM_PROTOCOL.as_bytes() {
            let received = String::from_utf8_lossy(&line).into_owned();
            return HandlerResult::Stop(ExitReason::HandshakeMismatch(received), Vec::new());
        }

        self.state = FsmState::Negotiate;
        match kind {
            Kind::Client => {
                self.selected_index = 0;
                let prefix = self.handlers[self.selected_index].prefix.clone();
                let mut actions = vec![Action::CancelTimer(handshake_timer_key())];
                match line::encode_line(prefix.as_bytes()) {
                    Ok(encoded) => actions.push(Action::Send(encoded)),
                    Err(err) => return protocol_error(err),
                }
                actions.push(Action::Active(ActiveMode::Once));
                HandlerResult::NoReply(actions)
            }
            Kind::Server => HandlerResult::NoReply(vec![Action::Active(ActiveMode::Once)]),
        }
    }

    fn on_negotiate(&mut self, kind: Kind, payload: Bytes) -> HandlerResult {
        let line = match line::strip_newline(payload) {
            Ok(line) => line,
            Err(err) => return protocol_error(err),
        };

        match kind {
            Kind::Client => self.on_negotiate_client(line),
            Kind::Server => self.on_negotiate_server(line),
        }
    }

    fn on_negotiate_client(&mut self, line: Bytes) -> HandlerResult {
        if &line[..] == b"na" {
            self.selected_index += 1;
            if self.selected_index >= self.handlers.len() {
                return HandlerResult::Stop(ExitReason::NoHandlers, Vec::new());
            }
            let prefix = self.handlers[self.selected_index].prefix.clone();
            return match line::encode_line(prefix.as_bytes()) {
                Ok(encoded) => {
                    HandlerResult::NoReply(vec![Action::Send(encoded), Action::Active(ActiveMode::Once)])
                }
                Err(err) => protocol_error(err),
            };
        }

        let entry = &self.handlers[self.selected_index];
        if &line[..] == entry.prefix.as_bytes() {
            let module = entry.module.clone();
            let handler = (entry.factory)(None);
            return HandlerResult::NoReply(vec![Action::Swap {
                module,
                opts: Opts::new(()),
                handler,
            }]);
        }

        let received = String::from_utf8_lossy(&line).into_owned();
        HandlerResult::Stop(ExitReason::UnexpectedServerResponse(received), Vec::new())
    }

    fn on_negotiate_server(&mut self, line: Bytes) -> HandlerResult {
        if &line[..] == b"ls" {
            let prefixes: Vec<&str> = self.handlers.iter().map(|h| h.prefix.as_ref()).collect();
            return match line::encode_lines(&prefixes) {
                Ok(encoded) => {
                    HandlerResult::NoReply(vec![Action::Send(encoded), Action::Active(ActiveMode::Once)])
                }
                Err(err) => protocol_error(err),
            };
        }

        let Ok(text) = std::str::from_utf8(&line) else {
            return match line::encode_line(b"na") {
                Ok(encoded) => {
                    HandlerResult::NoReply(vec![Action::Send(encoded), Action::Active(ActiveMode::Once)])
                }
                Err(err) => protocol_error(err),
            };
        };

        let matched = self.handlers.iter().find(|h| text.starts_with(h.prefix.as_ref()));
        match matched {
            None => match line::encode_line(b"na") {
                Ok(encoded) => {
                    HandlerResult::NoReply(vec![Action::Send(encoded), Action::Active(ActiveMode::Once)])
                }
                Err(err) => protocol_error(err),
            },
            Some(entry) => {
                let remainder = text[entry.prefix.len()..].to_string();
                let echo = match line::encode_line(text.as_bytes()) {
                    Ok(encoded) => encoded,
                    Err(err) => return protocol_error(err),
                };
                let module = entry.module.clone();
                let path = if remainder.is_empty() { None } else { Some(remainder.clone()) };
                let handler = (entry.factory)(path);
                let mut opts = Opts::new(());
                if !remainder.is_empty() {
                    opts = opts.with_path(remainder);
                }
                HandlerResult::NoReply(vec![
                    Action::Send(echo),
                    Action::CancelTimer(negotiate_timer_key()),
                    Action::Swap { module, opts, handler },
                ])
            }
        }
    }
}

fn protocol_error(err: streamwire_types::CodecError) -> HandlerResult {
    HandlerResult::Stop(ExitReason::Custom(format!("multistream codec error: {err}")), Vec::new())
}

impl Handler for Multistream {
    fn module_id(&self) -> ModuleId {
        ModuleId::new("multistream")
    }

    fn init(&mut self, kind: Kind) -> InitResult {
        if self.handlers.is_empty() {
            return InitResult::Stop(ExitReason::MissingHandlers, Vec::new());
        }

        let HandlerResult::NoReply(mut actions) = self.handshake_line() else {
            // `handshake_line` never returns `Stop` except for an overlong protocol id literal,
            // which never happens -- `MULTISTREAM_PROTOCOL` is a fixed, short constant.
            return InitResult::Stop(ExitReason::Custom("failed to encode handshake".into()), Vec::new());
        };
        actions.insert(0, Action::PacketSpec(PacketSpec::new(vec![LengthField::Varint])));
        actions.insert(1, Action::Active(ActiveMode::Once));

        let timer = match kind {
            Kind::Client => {
                let (min, max) = self.handshake_timeout_jitter;
                let jitter = min + rand::random::<u64>() % (max - min + 1);
                Action::Timer { key: handshake_timer_key(), millis: jitter }
            }
            Kind::Server => {
                Action::Timer { key: negotiate_timer_key(), millis: self.negotiate_timeout_ms }
            }
        };
        actions.push(timer);

        InitResult::Ok(actions)
    }

    fn handle_packet(&mut self, kind: Kind, _header: &[u64], payload: Bytes) -> HandlerResult {
        match self.state {
            FsmState::Handshake => self.on_handshake(kind, payload),
            FsmState::Negotiate => self.on_negotiate(kind, payload),
        }
    }

    fn handle_info(&mut self, _kind: Kind, info: Info) -> HandlerResult {
        match info {
            Info::Timeout(key) if &*key == "handshake_timeout" => {
                HandlerResult::Stop(ExitReason::HandshakeTimeout, Vec::new())
            }
            // A negotiate_timeout firing terminates the FSM normally; unlike handshake_timeout
            // it has no dedicated `ExitReason` variant, so it maps to `Normal` (see DESIGN.md).
            Info::Timeout(key) if &*key == "negotiate_timeout" => {
                HandlerResult::Stop(ExitReason::Normal, Vec::new())
            }
            Info::Timeout(key) => {
                tracing::warn!(%key, "multistream: unexpected timer, ignoring");
                HandlerResult::NoReply(Vec::new())
            }
            Info::SendError(err) => {
                tracing::warn!(%err, "multistream: send error");
                HandlerResult::NoReply(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExitReason;
    use bytes::Bytes;

    fn echo_factory() -> HandlerFactory {
        Arc::new(|_path| -> Box<dyn Handler> { panic!("echo_factory handler is never init'd in these tests") })
    }

    fn handlers() -> Vec<HandlerEntry> {
        vec![
            HandlerEntry { prefix: Arc::from("/foo"), module: ModuleId::new("foo"), factory: echo_factory() },
            HandlerEntry { prefix: Arc::from("/bar"), module: ModuleId::new("bar"), factory: echo_factory() },
        ]
    }

    fn line_payload(s: &str) -> Bytes {
        let mut v = s.as_bytes().to_vec();
        v.push(b'\n');
        Bytes::from(v)
    }

    #[test]
    fn init_fails_without_handlers() {
        let mut fsm = Multistream::new(Vec::new(), (15_000, 35_000), 30_000);
        match fsm.init(Kind::Server) {
            InitResult::Stop(ExitReason::MissingHandlers, _) => {}
            _ => panic!("expected MissingHandlers"),
        }
    }

    #[test]
    fn init_arms_handshake_timer_for_client() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        let InitResult::Ok(actions) = fsm.init(Kind::Client) else { panic!("expected Ok") };
        assert!(actions.iter().any(|a| matches!(a, Action::PacketSpec(_))));
        assert!(actions.iter().any(|a| matches!(a, Action::Timer { key, .. } if &**key == "handshake_timeout")));
    }

    #[test]
    fn server_handshake_mismatch_stops_with_reason() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Server);
        let result = fsm.handle_packet(Kind::Server, &[], line_payload("garbage"));
        match result {
            HandlerResult::Stop(ExitReason::HandshakeMismatch(line), _) => assert_eq!(line, "garbage"),
            _ => panic!("expected HandshakeMismatch"),
        }
    }

    #[test]
    fn server_ls_lists_prefixes() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Server);
        fsm.handle_packet(Kind::Server, &[], line_payload(MULTISTREAM_PROTOCOL));
        let result = fsm.handle_packet(Kind::Server, &[], line_payload("ls"));
        let HandlerResult::NoReply(actions) = result else { panic!("expected NoReply") };
        let Action::Send(bytes) = &actions[0] else { panic!("expected Send first") };
        let mut buf = bytes::BytesMut::from(&bytes[..]);
        let lines = streamwire_codec::line::decode_lines(&mut buf).unwrap().unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(&lines[0][..], b"/foo");
        assert_eq!(&lines[1][..], b"/bar");
    }

    #[test]
    fn server_matches_prefix_with_path_remainder() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Server);
        fsm.handle_packet(Kind::Server, &[], line_payload(MULTISTREAM_PROTOCOL));
        let result = fsm.handle_packet(Kind::Server, &[], line_payload("/bar/extra"));
        let HandlerResult::NoReply(actions) = result else { panic!("expected NoReply") };
        let swap = actions.iter().find_map(|a| match a {
            Action::Swap { module, opts, .. } => Some((module.clone(), opts.path.clone())),
            _ => None,
        });
        let (module, path) = swap.expect("expected a Swap action");
        assert_eq!(module, ModuleId::new("bar"));
        assert_eq!(path.as_deref(), Some("/extra"));
    }

    #[test]
    fn server_no_match_replies_na() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Server);
        fsm.handle_packet(Kind::Server, &[], line_payload(MULTISTREAM_PROTOCOL));
        let result = fsm.handle_packet(Kind::Server, &[], line_payload("/baz"));
        let HandlerResult::NoReply(actions) = result else { panic!("expected NoReply") };
        let Action::Send(bytes) = &actions[0] else { panic!("expected Send first") };
        let mut buf = bytes::BytesMut::from(&bytes[..]);
        let line = streamwire_codec::line::decode_line(&mut buf).unwrap().unwrap();
        assert_eq!(&line[..], b"na");
    }

    #[test]
    fn client_advances_past_na() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Client);
        fsm.handle_packet(Kind::Client, &[], line_payload(MULTISTREAM_PROTOCOL));
        assert_eq!(fsm.selected_index, 0);
        let result = fsm.handle_packet(Kind::Client, &[], line_payload("na"));
        assert_eq!(fsm.selected_index, 1);
        let HandlerResult::NoReply(actions) = result else { panic!("expected NoReply") };
        assert!(matches!(&actions[0], Action::Send(_)));
    }

    #[test]
    fn client_runs_out_of_handlers() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Client);
        fsm.handle_packet(Kind::Client, &[], line_payload(MULTISTREAM_PROTOCOL));
        fsm.handle_packet(Kind::Client, &[], line_payload("na"));
        let result = fsm.handle_packet(Kind::Client, &[], line_payload("na"));
        assert!(matches!(result, HandlerResult::Stop(ExitReason::NoHandlers, _)));
    }

    #[test]
    fn client_matches_selected_prefix_and_swaps() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Client);
        fsm.handle_packet(Kind::Client, &[], line_payload(MULTISTREAM_PROTOCOL));
        let result = fsm.handle_packet(Kind::Client, &[], line_payload("/foo"));
        let HandlerResult::NoReply(actions) = result else { panic!("expected NoReply") };
        assert!(matches!(&actions[0], Action::Swap { module, .. } if *module == ModuleId::new("foo")));
    }

    #[test]
    fn client_unexpected_response_stops() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        fsm.init(Kind::Client);
        fsm.handle_packet(Kind::Client, &[], line_payload(MULTISTREAM_PROTOCOL));
        let result = fsm.handle_packet(Kind::Client, &[], line_payload("/quux"));
        assert!(matches!(result, HandlerResult::Stop(ExitReason::UnexpectedServerResponse(_), _)));
    }

    #[test]
    fn handshake_timeout_stops_with_reason() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        let result = fsm.handle_info(Kind::Client, Info::Timeout(handshake_timer_key()));
        assert!(matches!(result, HandlerResult::Stop(ExitReason::HandshakeTimeout, _)));
    }

    #[test]
    fn negotiate_timeout_stops_normally() {
        let mut fsm = Multistream::new(handlers(), (15_000, 35_000), 30_000);
        let result = fsm.handle_info(Kind::Server, Info::Timeout(negotiate_timer_key()));
        assert!(matches!(result, HandlerResult::Stop(ExitReason::Normal, _)));
    }
}
