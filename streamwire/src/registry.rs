//! Process-wide metadata registry: a lock-free-for-readers map from transport instance to
//! introspection data, keyed the way `fe2o3-amqp`'s `connection::Connection` keys sessions by
//! `Slab` index -- a slot per instance, written only by its owning task, read by anyone holding
//! the id.

use std::net::SocketAddr;
use std::sync::OnceLock;

use parking_lot::RwLock;
use slab::Slab;

use crate::{Kind, Multiaddr, ModuleId};

/// Opaque handle into the metadata registry, returned by [`crate::transport::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(usize);

/// `(local, peer)` multiaddr pair recorded once when a transport adopts or opens a socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddrInfo {
    pub local: Multiaddr,
    pub peer: Multiaddr,
}

impl AddrInfo {
    pub fn from_socket_addrs(local: SocketAddr, peer: SocketAddr) -> Self {
        Self { local: Multiaddr::from_socket_addr(local), peer: Multiaddr::from_socket_addr(peer) }
    }
}

#[derive(Debug, Default)]
struct Entry {
    stack: Vec<(ModuleId, Kind)>,
    addr_info: Option<AddrInfo>,
    closed: bool,
}

fn registry() -> &'static RwLock<Slab<Entry>> {
    static REGISTRY: OnceLock<RwLock<Slab<Entry>>> = OnceLock::new();
    REGISTRY.get_or_init(|| RwLock::new(Slab::new()))
}

pub(crate) fn register() -> InstanceId {
    InstanceId(registry().write().insert(Entry::default()))
}

pub(crate) fn set_addr_info(id: InstanceId, info: AddrInfo) {
    if let Some(entry) = registry().write().get_mut(id.0) {
        entry.addr_info = Some(info);
    }
}

/// Appends `(module, kind)` to the protocol stack, as a fresh `swap` does.
pub(crate) fn push_stack(id: InstanceId, module: ModuleId, kind: Kind) {
    if let Some(entry) = registry().write().get_mut(id.0) {
        entry.stack.push((module, kind));
    }
}

/// Rewrites the `kind` half of the most recently pushed stack entry, as `swap_kind` does.
///
/// Targets the latest entry rather than all of them: `stack` records the negotiation history,
/// and only the currently-active module's role actually flips.
pub(crate) fn flip_latest_kind(id: InstanceId, kind: Kind) {
    if let Some(entry) = registry().write().get_mut(id.0) {
        if let Some(last) = entry.stack.last_mut() {
            last.1 = kind;
        }
    }
}

pub(crate) fn close(id: InstanceId) {
    if let Some(entry) = registry().write().get_mut(id.0) {
        entry.closed = true;
    }
}

pub(crate) fn deregister(id: InstanceId) {
    let mut guard = registry().write();
    if guard.contains(id.0) {
        guard.remove(id.0);
    }
}

/// Error returned by [`addr_info`].
#[derive(Debug, Clone, Copy, thiserror::Error, PartialEq, Eq)]
pub enum AddrInfoError {
    #[error("transport has closed")]
    Closed,
    #[error("not a live transport instance")]
    Invalid,
}

/// Returns `(local, peer)` while connected, [`AddrInfoError::Closed`] after termination,
/// [`AddrInfoError::Invalid`] if `id` was never registered (or has been fully reaped).
pub fn addr_info(id: InstanceId) -> Result<AddrInfo, AddrInfoError> {
    let guard = registry().read();
    let entry = guard.get(id.0).ok_or(AddrInfoError::Invalid)?;
    if entry.closed {
        return Err(AddrInfoError::Closed);
    }
    entry.addr_info.ok_or(AddrInfoError::Invalid)
}

/// Snapshot of the ordered `(module_id, kind)` stack recorded for `id`, empty if unknown.
pub fn protocol_stack(id: InstanceId) -> Vec<(ModuleId, Kind)> {
    registry().read().get(id.0).map(|e| e.stack.clone()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_and_reads_addr_info() {
        let id = register();
        assert_eq!(addr_info(id), Err(AddrInfoError::Invalid));

        let local: SocketAddr = "127.0.0.1:4001".parse().unwrap();
        let peer: SocketAddr = "127.0.0.1:4002".parse().unwrap();
        set_addr_info(id, AddrInfo::from_socket_addrs(local, peer));

        let info = addr_info(id).unwrap();
        assert_eq!(info.local.socket_addr(), local);
        assert_eq!(info.peer.socket_addr(), peer);

        close(id);
        assert_eq!(addr_info(id), Err(AddrInfoError::Closed));
        deregister(id);
    }

    #[test]
    fn swap_kind_flips_only_latest_stack_entry() {
        let id = register();
        push_stack(id, ModuleId::new("multistream"), Kind::Server);
        push_stack(id, ModuleId::new("echo"), Kind::Server);
        flip_latest_kind(id, Kind::Client);

        let stack = protocol_stack(id);
        assert_eq!(stack[0].1, Kind::Server);
        assert_eq!(stack[1].1, Kind::Client);
        deregister(id);
    }
}
