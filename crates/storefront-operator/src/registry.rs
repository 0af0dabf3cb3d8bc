//! In-memory Store Registry
//!
//! The registry is the only shared mutable state in the operator. Every read
//! and write goes through one mutex; the lock is never held across an
//! `.await`, so callers on any task can use it freely.
//!
//! Capacity is claimed in two steps. [`StoreRegistry::reserve`] takes a slot
//! and the name before the expensive install runs, and
//! [`StoreRegistry::commit`] turns the reservation into a live record. A
//! reservation that is dropped without being committed releases its slot.

use crate::error::{OperatorError, Result};
use crate::store::{normalize_name, Store, StoreName, StoreStatus};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a status update
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The store moved to the new status
    Applied,
    /// The store already reached a terminal status
    AlreadyTerminal(StoreStatus),
    /// No store with that id exists (it was deleted)
    NotFound,
}

#[derive(Default)]
struct RegistryState {
    /// Live stores in insertion order
    stores: Vec<Store>,
    /// Pending reservations: name -> reservation id
    reserved: HashMap<String, u64>,
    next_reservation: u64,
}

impl RegistryState {
    fn occupied(&self) -> usize {
        self.stores.len() + self.reserved.len()
    }

    fn has_live(&self, name: &str) -> bool {
        self.stores.iter().any(|s| s.name == name)
    }
}

/// Authoritative collection of live stores
pub struct StoreRegistry {
    state: Mutex<RegistryState>,
    max_stores: usize,
}

impl StoreRegistry {
    pub fn new(max_stores: usize) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            max_stores,
        }
    }

    pub fn max_stores(&self) -> usize {
        self.max_stores
    }

    /// Snapshot of all live stores in insertion order
    pub fn list(&self) -> Vec<Store> {
        self.state.lock().stores.clone()
    }

    /// Look up a live store by (raw) name
    pub fn get(&self, name: &str) -> Option<Store> {
        let name = normalize_name(name);
        self.state
            .lock()
            .stores
            .iter()
            .find(|s| s.name == name)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.state.lock().stores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Claim a capacity slot and the name ahead of installation
    pub fn reserve(self: &Arc<Self>, name: &StoreName) -> Result<Reservation> {
        let mut state = self.state.lock();
        let key = name.as_str().to_string();

        if state.has_live(&key) || state.reserved.contains_key(&key) {
            return Err(OperatorError::AlreadyExists(key));
        }
        if state.occupied() >= self.max_stores {
            return Err(OperatorError::CapacityExceeded {
                limit: self.max_stores,
            });
        }

        state.next_reservation += 1;
        let id = state.next_reservation;
        state.reserved.insert(key.clone(), id);
        debug!(store = %key, reservation = id, "Reserved store slot");

        Ok(Reservation {
            registry: Arc::clone(self),
            name: key,
            id,
            committed: false,
        })
    }

    /// Insert a store without a prior reservation
    pub fn create(&self, candidate: Store) -> Result<Store> {
        let mut state = self.state.lock();
        let name = normalize_name(&candidate.name);

        if state.has_live(&name) || state.reserved.contains_key(&name) {
            return Err(OperatorError::AlreadyExists(name));
        }
        if state.occupied() >= self.max_stores {
            return Err(OperatorError::CapacityExceeded {
                limit: self.max_stores,
            });
        }

        let store = Store { name, ..candidate };
        state.stores.push(store.clone());
        record_live(state.stores.len());
        Ok(store)
    }

    /// Turn a reservation into a live record
    ///
    /// Fails with [`OperatorError::Conflict`] when the reservation was revoked
    /// by a concurrent [`remove`](Self::remove).
    pub fn commit(&self, mut reservation: Reservation, candidate: Store) -> Result<Store> {
        reservation.committed = true;
        let mut state = self.state.lock();

        if state.reserved.get(&reservation.name) != Some(&reservation.id) {
            return Err(OperatorError::Conflict(format!(
                "store '{}' was deleted while it was being provisioned",
                reservation.name
            )));
        }
        state.reserved.remove(&reservation.name);

        if state.has_live(&reservation.name) {
            return Err(OperatorError::AlreadyExists(reservation.name.clone()));
        }
        if state.occupied() >= self.max_stores {
            return Err(OperatorError::CapacityExceeded {
                limit: self.max_stores,
            });
        }

        let store = Store {
            name: reservation.name.clone(),
            ..candidate
        };
        state.stores.push(store.clone());
        record_live(state.stores.len());
        Ok(store)
    }

    /// Remove every live store with this name and revoke a pending
    /// reservation for it. Returns whether a live record was removed.
    pub fn remove(&self, name: &str) -> bool {
        let name = normalize_name(name);
        let mut state = self.state.lock();

        if state.reserved.remove(&name).is_some() {
            debug!(store = %name, "Revoked pending reservation");
        }

        let before = state.stores.len();
        state.stores.retain(|s| s.name != name);
        let removed = state.stores.len() != before;
        if removed {
            record_live(state.stores.len());
        }
        removed
    }

    /// Move a `Provisioning` store to a terminal status
    pub fn set_status(&self, id: &str, status: StoreStatus) -> StatusUpdate {
        let mut state = self.state.lock();
        match state.stores.iter_mut().find(|s| s.id == id) {
            None => StatusUpdate::NotFound,
            Some(store) if store.status.is_terminal() => {
                StatusUpdate::AlreadyTerminal(store.status)
            }
            Some(store) => {
                store.status = status;
                StatusUpdate::Applied
            }
        }
    }

    fn release(&self, name: &str, id: u64) {
        let mut state = self.state.lock();
        if state.reserved.get(name) == Some(&id) {
            state.reserved.remove(name);
            debug!(store = %name, reservation = id, "Released store slot");
        }
    }
}

fn record_live(count: usize) {
    metrics::gauge!("storefront_live_stores").set(count as f64);
}

/// A claimed capacity slot; released on drop unless committed
pub struct Reservation {
    registry: Arc<StoreRegistry>,
    name: String,
    id: u64,
    committed: bool,
}

impl std::fmt::Debug for Reservation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reservation")
            .field("name", &self.name)
            .field("id", &self.id)
            .finish()
    }
}

impl Drop for Reservation {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.release(&self.name, self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::StoreTemplate;

    fn store(name: &str) -> Store {
        let name = StoreName::parse(name).unwrap();
        Store::new(&name, StoreTemplate::WooCommerce, "localhost")
    }

    #[test]
    fn test_create_and_list_in_order() {
        let registry = StoreRegistry::new(5);
        registry.create(store("b")).unwrap();
        registry.create(store("a")).unwrap();

        let names: Vec<_> = registry.list().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn test_capacity_limit() {
        let registry = StoreRegistry::new(5);
        for i in 0..5 {
            registry.create(store(&format!("s{i}"))).unwrap();
        }
        let err = registry.create(store("s5")).unwrap_err();
        assert!(matches!(err, OperatorError::CapacityExceeded { limit: 5 }));
        assert_eq!(registry.len(), 5);
    }

    #[test]
    fn test_duplicate_name_case_insensitive() {
        let registry = StoreRegistry::new(5);
        registry.create(store("shop")).unwrap();

        let mut dup = store("shop");
        dup.name = " SHOP ".to_string();
        assert!(matches!(
            registry.create(dup),
            Err(OperatorError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_deleted_name_can_be_reused() {
        let registry = StoreRegistry::new(5);
        registry.create(store("shop")).unwrap();
        assert!(registry.remove("Shop"));
        assert!(!registry.remove("shop"));
        registry.create(store("shop")).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_reservation_counts_toward_capacity() {
        let registry = Arc::new(StoreRegistry::new(2));
        let _a = registry.reserve(&StoreName::parse("a").unwrap()).unwrap();
        let _b = registry.reserve(&StoreName::parse("b").unwrap()).unwrap();

        let err = registry
            .reserve(&StoreName::parse("c").unwrap())
            .unwrap_err();
        assert!(matches!(err, OperatorError::CapacityExceeded { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dropped_reservation_releases_slot() {
        let registry = Arc::new(StoreRegistry::new(1));
        let name = StoreName::parse("a").unwrap();
        {
            let _r = registry.reserve(&name).unwrap();
            assert!(registry.reserve(&name).is_err());
        }
        assert!(registry.reserve(&name).is_ok());
    }

    #[test]
    fn test_commit_reservation() {
        let registry = Arc::new(StoreRegistry::new(1));
        let name = StoreName::parse("a").unwrap();
        let reservation = registry.reserve(&name).unwrap();

        let committed = registry.commit(reservation, store("a")).unwrap();
        assert_eq!(committed.name, "a");
        assert_eq!(registry.len(), 1);
        assert!(matches!(
            registry.reserve(&StoreName::parse("b").unwrap()),
            Err(OperatorError::CapacityExceeded { .. })
        ));
    }

    #[test]
    fn test_remove_revokes_reservation() {
        let registry = Arc::new(StoreRegistry::new(5));
        let name = StoreName::parse("a").unwrap();
        let reservation = registry.reserve(&name).unwrap();

        assert!(!registry.remove("a"));
        let err = registry.commit(reservation, store("a")).unwrap_err();
        assert!(matches!(err, OperatorError::Conflict(_)));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_stale_reservation_drop_keeps_new_one() {
        let registry = Arc::new(StoreRegistry::new(5));
        let name = StoreName::parse("a").unwrap();
        let stale = registry.reserve(&name).unwrap();
        registry.remove("a");
        let fresh = registry.reserve(&name).unwrap();

        drop(stale);
        registry.commit(fresh, store("a")).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_status_is_monotonic() {
        let registry = StoreRegistry::new(5);
        let created = registry.create(store("a")).unwrap();

        assert_eq!(
            registry.set_status(&created.id, StoreStatus::Ready),
            StatusUpdate::Applied
        );
        assert_eq!(
            registry.set_status(&created.id, StoreStatus::Failed),
            StatusUpdate::AlreadyTerminal(StoreStatus::Ready)
        );
        assert_eq!(registry.get("a").unwrap().status, StoreStatus::Ready);
        assert_eq!(
            registry.set_status("missing", StoreStatus::Ready),
            StatusUpdate::NotFound
        );
    }

    #[test]
    fn test_concurrent_reservations_respect_capacity() {
        let registry = Arc::new(StoreRegistry::new(5));
        let handles: Vec<_> = (0..20)
            .map(|i| {
                let registry = Arc::clone(&registry);
                std::thread::spawn(move || {
                    let name = StoreName::parse(&format!("s{i}")).unwrap();
                    let reservation = registry.reserve(&name).ok()?;
                    let candidate = store(&format!("s{i}"));
                    registry.commit(reservation, candidate).ok()
                })
            })
            .collect();

        let created = handles
            .into_iter()
            .filter_map(|h| h.join().unwrap())
            .count();
        assert_eq!(created, 5);
        assert_eq!(registry.len(), 5);
    }
}
