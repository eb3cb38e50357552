//! Mock IP store for unit testing
//!
//! Keeps records in memory with the same (address, network) uniqueness as the
//! SQLite store, and can inject the conflicts concurrent workers would cause.

use crate::error::StoreError;
use crate::models::{IpAddressRecord, IpAddressUpdate, NewIpAddress};
use crate::store_trait::IpStoreTrait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

type RecordKey = (IpAddr, String);

/// Task id written by the simulated competing worker
pub const PHANTOM_TASK_ID: &str = "phantom-writer";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory IP store
#[derive(Debug, Clone, Default)]
pub struct MockIpStore {
    records: Arc<Mutex<HashMap<RecordKey, IpAddressRecord>>>,
    // Addresses a phantom writer claims right before our insert
    contended: Arc<Mutex<HashSet<IpAddr>>>,
    // Remaining conflicts to report without inserting anything
    failing_creates: Arc<Mutex<HashMap<IpAddr, usize>>>,
    // Addresses whose records vanish right before an update
    vanishing: Arc<Mutex<HashSet<IpAddr>>>,
    create_attempts: Arc<Mutex<Vec<IpAddr>>>,
    next_id: Arc<Mutex<i64>>,
}

impl MockIpStore {
    /// Create an empty mock store
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record (for test setup)
    pub fn add_ip_address(&self, record: IpAddressRecord) {
        lock(&self.records).insert((record.address, record.network_name.clone()), record);
    }

    /// Seed a record from its parts (for test setup)
    pub fn seed(
        &self,
        address: IpAddr,
        network_name: &str,
        static_ip: bool,
        instance_id: Option<Uuid>,
    ) -> IpAddressRecord {
        let record = IpAddressRecord {
            id: self.next_id(),
            address,
            network_name: network_name.to_string(),
            static_ip,
            instance_id,
            task_id: "seed".to_string(),
            created_at: Utc::now(),
        };
        self.add_ip_address(record.clone());
        record
    }

    /// On the first create of each address, another writer wins the race
    ///
    /// The competing record is stored before the conflict is reported, as a
    /// real concurrent insert would be.
    pub fn simulate_contention(&self, addresses: &[IpAddr]) {
        lock(&self.contended).extend(addresses.iter().copied());
    }

    /// Report `times` conflicts for the address without storing anything
    pub fn fail_creates(&self, address: IpAddr, times: usize) {
        lock(&self.failing_creates).insert(address, times);
    }

    /// Delete the address's records right before the next update touches them
    pub fn vanish_before_update(&self, address: IpAddr) {
        lock(&self.vanishing).insert(address);
    }

    /// Snapshot of all records, oldest first
    pub fn records(&self) -> Vec<IpAddressRecord> {
        let mut records: Vec<IpAddressRecord> = lock(&self.records).values().cloned().collect();
        records.sort_by_key(|record| record.id);
        records
    }

    /// Number of stored records
    pub fn count(&self) -> usize {
        lock(&self.records).len()
    }

    /// Addresses passed to `create_ip_address`, in call order
    pub fn create_attempts(&self) -> Vec<IpAddr> {
        lock(&self.create_attempts).clone()
    }

    fn next_id(&self) -> i64 {
        let mut id = lock(&self.next_id);
        *id += 1;
        *id
    }
}

#[async_trait::async_trait]
impl IpStoreTrait for MockIpStore {
    fn backend_name(&self) -> &'static str {
        "mock"
    }

    async fn find_by_address(&self, address: IpAddr) -> Result<Vec<IpAddressRecord>, StoreError> {
        let mut found: Vec<IpAddressRecord> = lock(&self.records)
            .values()
            .filter(|record| record.address == address)
            .cloned()
            .collect();
        found.sort_by_key(|record| record.id);
        Ok(found)
    }

    async fn list_ip_addresses(&self, network_name: Option<&str>) -> Result<Vec<IpAddressRecord>, StoreError> {
        Ok(self
            .records()
            .into_iter()
            .filter(|record| network_name.is_none_or(|name| record.network_name == name))
            .collect())
    }

    async fn create_ip_address(&self, new: NewIpAddress) -> Result<IpAddressRecord, StoreError> {
        lock(&self.create_attempts).push(new.address);
        let conflict = StoreError::UniqueViolation {
            address: new.address,
            network_name: new.network_name.clone(),
        };

        if let Some(remaining) = lock(&self.failing_creates).get_mut(&new.address) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(conflict);
            }
        }

        if lock(&self.contended).remove(&new.address) {
            let phantom = IpAddressRecord {
                id: self.next_id(),
                address: new.address,
                network_name: new.network_name.clone(),
                static_ip: false,
                instance_id: Some(Uuid::new_v4()),
                task_id: PHANTOM_TASK_ID.to_string(),
                created_at: Utc::now(),
            };
            lock(&self.records).insert((new.address, new.network_name.clone()), phantom);
            return Err(conflict);
        }

        let key = (new.address, new.network_name.clone());
        let id = self.next_id();
        let mut records = lock(&self.records);
        if records.contains_key(&key) {
            return Err(conflict);
        }
        let record = IpAddressRecord {
            id,
            address: new.address,
            network_name: new.network_name,
            static_ip: new.static_ip,
            instance_id: Some(new.instance_id),
            task_id: new.task_id,
            created_at: Utc::now(),
        };
        records.insert(key, record.clone());
        Ok(record)
    }

    async fn update_ip_address(
        &self,
        address: IpAddr,
        network_name: &str,
        update: IpAddressUpdate,
    ) -> Result<IpAddressRecord, StoreError> {
        if lock(&self.vanishing).remove(&address) {
            lock(&self.records).retain(|(stored, _), _| *stored != address);
        }

        let mut records = lock(&self.records);
        let old_key = (address, network_name.to_string());
        let new_key = (address, update.network_name.clone());
        if old_key != new_key && records.contains_key(&new_key) {
            return Err(StoreError::UniqueViolation {
                address,
                network_name: update.network_name,
            });
        }
        let mut record = records.remove(&old_key).ok_or_else(|| StoreError::NotFound {
            address,
            network_name: network_name.to_string(),
        })?;
        record.network_name = update.network_name;
        record.static_ip = update.static_ip;
        records.insert(new_key, record.clone());
        Ok(record)
    }

    async fn delete_ip_address(&self, address: IpAddr) -> Result<u64, StoreError> {
        let mut records = lock(&self.records);
        let before = records.len();
        records.retain(|(stored, _), _| *stored != address);
        Ok((before - records.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_ip(address: &str, network: &str) -> NewIpAddress {
        NewIpAddress {
            address: address.parse().expect("test address"),
            network_name: network.to_string(),
            static_ip: false,
            instance_id: Uuid::new_v4(),
            task_id: "task-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_enforces_unique_key() {
        let store = MockIpStore::new();
        store.create_ip_address(new_ip("10.0.0.2", "a")).await.expect("first create");

        let err = store
            .create_ip_address(new_ip("10.0.0.2", "a"))
            .await
            .expect_err("duplicate create");
        assert!(err.is_unique_violation());

        store
            .create_ip_address(new_ip("10.0.0.2", "b"))
            .await
            .expect("same address on another network");
        assert_eq!(store.count(), 2);
    }

    #[tokio::test]
    async fn test_simulated_contention_stores_phantom_record() {
        let store = MockIpStore::new();
        let address: IpAddr = "10.0.0.2".parse().expect("ip");
        store.simulate_contention(&[address]);

        let err = store.create_ip_address(new_ip("10.0.0.2", "a")).await.expect_err("contended");
        assert!(err.is_unique_violation());
        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].task_id, PHANTOM_TASK_ID);
    }

    #[tokio::test]
    async fn test_update_of_vanished_record() {
        let store = MockIpStore::new();
        let address: IpAddr = "10.0.0.2".parse().expect("ip");
        store.seed(address, "a", false, Some(Uuid::new_v4()));
        store.vanish_before_update(address);

        let update = IpAddressUpdate {
            network_name: "a".to_string(),
            static_ip: true,
        };
        let err = store.update_ip_address(address, "a", update).await.expect_err("vanished");
        assert!(err.is_not_found());
    }
}
