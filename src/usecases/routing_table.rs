//! Routing Table - Identifier to Connection Map
//!
//! Concurrent map from routing identifier to live connection, shared by
//! the control task (inserts on accept) and drain workers (removals on
//! disconnect, lookups from the protocol layer).
//!
//! Every operation is atomic with respect to the others: inserts use
//! the map's entry API so a candidate identifier is checked and claimed
//! under the same shard lock, and no reader observes a half-inserted
//! entry. Roles are never stored; they are derived from the
//! connection's local port on every lookup.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::trace;

use crate::domain::{CLIENT_ID_SPACE, ClientId, ClientRole, Connection, RoutedConnection, RouterError};

/// Concurrent routing table.
pub struct RoutingTable<C: RoutedConnection = Connection> {
    entries: DashMap<ClientId, Arc<C>>,
    /// Port whose connections classify as brokers.
    broker_port: u16,
    /// Identifiers are drawn from `0..id_space`.
    id_space: u32,
}

impl<C: RoutedConnection> RoutingTable<C> {
    /// Create an empty table drawing from the full identifier space.
    pub fn new(broker_port: u16) -> Self {
        Self::with_id_space(broker_port, CLIENT_ID_SPACE)
    }

    /// Create an empty table drawing identifiers from `0..id_space`.
    ///
    /// `id_space` is clamped to `1..=CLIENT_ID_SPACE`.
    pub fn with_id_space(broker_port: u16, id_space: u32) -> Self {
        Self {
            entries: DashMap::new(),
            broker_port,
            id_space: id_space.clamp(1, CLIENT_ID_SPACE),
        }
    }

    pub const fn broker_port(&self) -> u16 {
        self.broker_port
    }

    /// Register a connection under a fresh identifier.
    ///
    /// Draws random candidates until one is not live. Concurrent callers
    /// racing on the same candidate are serialized by the shard lock, and
    /// the loser simply draws again.
    ///
    /// # Errors
    /// `IdSpaceExhausted` when every identifier is already live.
    pub fn add_client(&self, connection: Arc<C>) -> Result<ClientId, RouterError> {
        let mut rng = rand::thread_rng();
        loop {
            let live = self.entries.len();
            if live >= self.id_space as usize {
                return Err(RouterError::IdSpaceExhausted(live));
            }

            let candidate = ClientId::random_below(&mut rng, self.id_space);
            match self.entries.entry(candidate.clone()) {
                Entry::Vacant(slot) => {
                    slot.insert(connection);
                    return Ok(candidate);
                }
                Entry::Occupied(_) => trace!(candidate = %candidate, "routing id collision, retrying"),
            }
        }
    }

    /// Remove an entry. Absent identifiers are a no-op.
    pub fn remove_client(&self, id: &ClientId) -> Option<Arc<C>> {
        self.entries.remove(id).map(|(_, connection)| connection)
    }

    /// Connection registered under `id`.
    ///
    /// # Errors
    /// `EntryNotFound` if `id` is not live.
    pub fn get_client(&self, id: &ClientId) -> Result<Arc<C>, RouterError> {
        self.entries
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RouterError::not_found(id))
    }

    /// Reverse lookup by connection.
    ///
    /// Linear scan over the live entries; cost grows with the number of
    /// concurrent connections.
    pub fn get_client_id(&self, connection: &C) -> Option<ClientId> {
        let serial = connection.serial();
        self.entries
            .iter()
            .find(|entry| entry.value().serial() == serial)
            .map(|entry| entry.key().clone())
    }

    /// Role of the client registered under `id`.
    ///
    /// # Errors
    /// `EntryNotFound` if `id` is not live.
    pub fn get_client_type(&self, id: &ClientId) -> Result<ClientRole, RouterError> {
        self.entries
            .get(id)
            .map(|entry| ClientRole::from_port(entry.value().local_port(), self.broker_port))
            .ok_or_else(|| RouterError::not_found(id))
    }

    pub fn contains_client(&self, id: &ClientId) -> bool {
        self.entries.contains_key(id)
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Sorted `(id, role)` listing of the live entries.
    pub fn snapshot(&self) -> Vec<(ClientId, ClientRole)> {
        let mut rows: Vec<_> = self
            .entries
            .iter()
            .map(|entry| {
                let role = ClientRole::from_port(entry.value().local_port(), self.broker_port);
                (entry.key().clone(), role)
            })
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        rows
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use tokio_test::{assert_err, assert_ok};

    use super::*;

    const BROKER: u16 = 5000;
    const MARKET: u16 = 5001;

    #[derive(Debug)]
    struct FakeConn {
        serial: u64,
        port: u16,
    }

    impl RoutedConnection for FakeConn {
        fn serial(&self) -> u64 {
            self.serial
        }

        fn local_port(&self) -> u16 {
            self.port
        }
    }

    fn conn(serial: u64, port: u16) -> Arc<FakeConn> {
        Arc::new(FakeConn { serial, port })
    }

    #[test]
    fn test_add_then_lookup_role() {
        let table = RoutingTable::new(BROKER);
        let broker = assert_ok!(table.add_client(conn(1, BROKER)));
        let market = assert_ok!(table.add_client(conn(2, MARKET)));

        assert_eq!(broker.as_str().len(), 6);
        assert_eq!(assert_ok!(table.get_client_type(&broker)), ClientRole::Broker);
        assert_eq!(assert_ok!(table.get_client_type(&market)), ClientRole::Market);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_missing_entry_is_not_found() {
        let table: RoutingTable<FakeConn> = RoutingTable::new(BROKER);
        let err = assert_err!(table.get_client_type(&ClientId::from_number(42)));
        assert!(err.is_not_found());
        assert!(table.get_client(&ClientId::from_number(42)).is_err());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let table = RoutingTable::new(BROKER);
        let id = table.add_client(conn(1, BROKER)).unwrap();

        assert!(table.remove_client(&id).is_some());
        assert!(table.remove_client(&id).is_none());
        assert!(!table.contains_client(&id));
        assert!(table.is_empty());
    }

    #[test]
    fn test_removed_id_is_reused() {
        let table = RoutingTable::with_id_space(BROKER, 1);
        let first = table.add_client(conn(1, BROKER)).unwrap();
        assert_eq!(first.as_str(), "000000");

        table.remove_client(&first);
        let second = table.add_client(conn(2, MARKET)).unwrap();
        assert_eq!(second, first);
        assert_eq!(table.get_client_type(&second).unwrap(), ClientRole::Market);
    }

    #[test]
    fn test_full_space_is_reported() {
        let table = RoutingTable::with_id_space(BROKER, 2);
        table.add_client(conn(1, BROKER)).unwrap();
        table.add_client(conn(2, BROKER)).unwrap();

        let err = table.add_client(conn(3, BROKER)).unwrap_err();
        assert!(matches!(err, RouterError::IdSpaceExhausted(2)));
    }

    #[test]
    fn test_reverse_lookup_by_serial() {
        let table = RoutingTable::new(BROKER);
        let a = conn(10, BROKER);
        let b = conn(11, MARKET);
        let id_a = table.add_client(Arc::clone(&a)).unwrap();
        let id_b = table.add_client(Arc::clone(&b)).unwrap();

        assert_eq!(table.get_client_id(&a), Some(id_a));
        assert_eq!(table.get_client_id(&b), Some(id_b.clone()));
        table.remove_client(&id_b);
        assert_eq!(table.get_client_id(&b), None);
    }

    #[test]
    fn test_clear_and_snapshot() {
        let table = RoutingTable::new(BROKER);
        for serial in 0..5 {
            let port = if serial % 2 == 0 { BROKER } else { MARKET };
            table.add_client(conn(serial, port)).unwrap();
        }

        let rows = table.snapshot();
        assert_eq!(rows.len(), 5);
        assert!(rows.windows(2).all(|w| w[0].0 < w[1].0));
        assert_eq!(rows.iter().filter(|(_, r)| *r == ClientRole::Broker).count(), 3);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_concurrent_adds_are_unique() {
        // Small space forces collisions between threads.
        let table = RoutingTable::with_id_space(BROKER, 5_000);
        let threads: u64 = 8;
        let per_thread: u64 = 500;

        let ids: Vec<ClientId> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..threads)
                .map(|t| {
                    let table = &table;
                    s.spawn(move || {
                        (0..per_thread)
                            .map(|i| table.add_client(conn(t * per_thread + i, BROKER)).unwrap())
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles.into_iter().flat_map(|h| h.join().unwrap()).collect()
        });

        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        assert_eq!(table.len(), (threads * per_thread) as usize);
    }
}
