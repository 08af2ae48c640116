//! Property-Based Tests — Routing Table Invariants
//!
//! Uses `proptest` to drive the routing table through random
//! add/remove sequences and check it against a simple model.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use proptest::prelude::*;

use fixme_router::domain::{ClientId, ClientRole, RoutedConnection};
use fixme_router::usecases::RoutingTable;

const BROKER_PORT: u16 = 5000;
const MARKET_PORT: u16 = 5001;

#[derive(Debug)]
struct Endpoint {
    serial: u64,
    port: u16,
}

impl RoutedConnection for Endpoint {
    fn serial(&self) -> u64 {
        self.serial
    }

    fn local_port(&self) -> u16 {
        self.port
    }
}

#[derive(Debug, Clone)]
enum Op {
    /// Add a client; `true` connects on the broker port.
    Add(bool),
    /// Remove the n-th live client (modulo live count).
    Remove(usize),
    /// Remove an identifier that may or may not be live.
    RemoveRaw(u32),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => any::<bool>().prop_map(Op::Add),
        2 => any::<usize>().prop_map(Op::Remove),
        1 => (0u32..64).prop_map(Op::RemoveRaw),
    ]
}

proptest! {
    /// Live identifiers stay unique, roles follow ports, and removed
    /// identifiers are never reachable.
    #[test]
    fn table_matches_model(ops in prop::collection::vec(op(), 1..200)) {
        // Small space so collisions and reuse actually happen.
        let table = RoutingTable::with_id_space(BROKER_PORT, 64);
        let mut model: HashMap<ClientId, ClientRole> = HashMap::new();
        let mut serial = 0u64;

        for op in ops {
            match op {
                Op::Add(broker) => {
                    let port = if broker { BROKER_PORT } else { MARKET_PORT };
                    serial += 1;
                    match table.add_client(Arc::new(Endpoint { serial, port })) {
                        Ok(id) => {
                            prop_assert!(!model.contains_key(&id), "duplicate live id {}", id);
                            let role = if broker { ClientRole::Broker } else { ClientRole::Market };
                            model.insert(id, role);
                        }
                        Err(_) => prop_assert_eq!(model.len(), 64),
                    }
                }
                Op::Remove(n) => {
                    if model.is_empty() {
                        continue;
                    }
                    let mut live: Vec<_> = model.keys().cloned().collect();
                    live.sort();
                    let id = live[n % live.len()].clone();
                    prop_assert!(table.remove_client(&id).is_some());
                    model.remove(&id);
                    prop_assert!(table.get_client_type(&id).unwrap_err().is_not_found());
                }
                Op::RemoveRaw(raw) => {
                    let id = ClientId::from_number(raw);
                    let was_live = model.remove(&id).is_some();
                    prop_assert_eq!(table.remove_client(&id).is_some(), was_live);
                    // Removal is idempotent.
                    prop_assert!(table.remove_client(&id).is_none());
                }
            }

            prop_assert_eq!(table.len(), model.len());
        }

        for (id, role) in &model {
            prop_assert_eq!(table.get_client_type(id).unwrap(), *role);
        }
        let listed: HashSet<_> = table.snapshot().into_iter().map(|(id, _)| id).collect();
        prop_assert_eq!(listed.len(), model.len());
    }

    /// Identifiers are always six zero-padded digits.
    #[test]
    fn generated_ids_are_six_digits(count in 1usize..50) {
        let table = RoutingTable::new(BROKER_PORT);
        for serial in 0..count {
            let id = table
                .add_client(Arc::new(Endpoint { serial: serial as u64, port: MARKET_PORT }))
                .unwrap();
            prop_assert_eq!(id.as_str().len(), 6);
            prop_assert!(id.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }
}
