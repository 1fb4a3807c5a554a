//! Pending-pair lookup by request id (and, server-side, by peer).
//!
//! A flat `Vec` of key/value pairs, scanned linearly on lookup. This beats
//! a `HashMap` for the handful of entries a worker typically has in flight
//! at once (spec.md §4.7: "Acceptable because n is bounded by in-flight
//! concurrency per thread").

use crate::pool::Handle;
use crate::protocol::{HostTuple, RequestId};

/// Pending client pairs, keyed by request id alone.
///
/// spec.md §4.6 / §9.1 documents this exactly: the real lookup key is
/// `(rid, local_host)`, but `local_host` is this worker's own fixed
/// identity, so in practice it never discriminates between two pending
/// requests — the peer's address plays no part in matching a response to
/// its pair. That is preserved here deliberately, not fixed: a response
/// datagram is matched to a `ClientPair` by `rid` alone, regardless of
/// which peer it came from.
#[derive(Default)]
pub struct ClientRegistry {
    pending: Vec<(RequestId, Handle)>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rid: RequestId, handle: Handle) {
        self.pending.push((rid, handle));
    }

    pub fn lookup(&self, rid: RequestId) -> Option<Handle> {
        self.pending
            .iter()
            .find(|(k, _)| *k == rid)
            .map(|(_, h)| *h)
    }

    pub fn remove(&mut self, rid: RequestId) -> Option<Handle> {
        let pos = self.pending.iter().position(|(k, _)| *k == rid)?;
        Some(self.pending.remove(pos).1)
    }

    pub fn remove_handle(&mut self, handle: Handle) {
        self.pending.retain(|(_, h)| *h != handle);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// Pending server pairs, keyed by `(req_id, sender)`.
///
/// Unlike the client side, invariant 3 of spec.md §3 requires the full
/// fingerprint: no two pending `ServerPair`s may share the same
/// `(req_id, sender_tuple)`.
#[derive(Default)]
pub struct ServerRegistry {
    pending: Vec<((RequestId, HostTuple), Handle)>,
}

impl ServerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, rid: RequestId, sender: HostTuple, handle: Handle) {
        self.pending.push(((rid, sender), handle));
    }

    pub fn lookup(&self, rid: RequestId, sender: HostTuple) -> Option<Handle> {
        self.pending
            .iter()
            .find(|(k, _)| *k == (rid, sender))
            .map(|(_, h)| *h)
    }

    pub fn remove(&mut self, rid: RequestId, sender: HostTuple) -> Option<Handle> {
        let pos = self.pending.iter().position(|(k, _)| *k == (rid, sender))?;
        Some(self.pending.remove(pos).1)
    }

    pub fn remove_handle(&mut self, handle: Handle) {
        self.pending.retain(|(_, h)| *h != handle);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use std::net::Ipv4Addr;

    #[test]
    fn client_lookup_ignores_peer_by_design() {
        let mut pool: Pool<()> = Pool::with_capacity(4);
        let h = pool.insert(()).unwrap();
        let mut reg = ClientRegistry::new();
        reg.insert(RequestId(42), h);

        // A response from any peer with the right rid resolves to the pair.
        assert_eq!(reg.lookup(RequestId(42)), Some(h));
        assert_eq!(reg.lookup(RequestId(99)), None);
    }

    #[test]
    fn server_lookup_requires_matching_sender() {
        let mut pool: Pool<()> = Pool::with_capacity(4);
        let h = pool.insert(()).unwrap();
        let mut reg = ServerRegistry::new();
        let peer_a = HostTuple::new(Ipv4Addr::new(10, 0, 0, 1), 1000);
        let peer_b = HostTuple::new(Ipv4Addr::new(10, 0, 0, 2), 1000);
        reg.insert(RequestId(1), peer_a, h);

        assert_eq!(reg.lookup(RequestId(1), peer_a), Some(h));
        assert_eq!(reg.lookup(RequestId(1), peer_b), None);
    }
}
