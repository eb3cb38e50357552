//! Storage seam for IP address records
//!
//! The repository layer only talks to this trait. `SqliteIpStore` is the
//! durable implementation; tests use `MockIpStore`.

use crate::error::StoreError;
use crate::models::{IpAddressRecord, IpAddressUpdate, NewIpAddress};
use std::net::IpAddr;

/// Trait for IP address record storage
///
/// (address, network name) is unique. Writers never lock: a conflicting
/// create or update fails with [`StoreError::UniqueViolation`].
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait IpStoreTrait: Send + Sync {
    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;

    /// Records of an address on any network, oldest first
    async fn find_by_address(&self, address: IpAddr) -> Result<Vec<IpAddressRecord>, StoreError>;

    /// Records of one network, or of all networks
    async fn list_ip_addresses(&self, network_name: Option<&str>) -> Result<Vec<IpAddressRecord>, StoreError>;

    /// Create-or-fail claim
    async fn create_ip_address(&self, new: NewIpAddress) -> Result<IpAddressRecord, StoreError>;

    /// Update the record of `address` on `network_name` in place
    async fn update_ip_address(
        &self,
        address: IpAddr,
        network_name: &str,
        update: IpAddressUpdate,
    ) -> Result<IpAddressRecord, StoreError>;

    /// Delete every record of the address, returning how many were removed
    async fn delete_ip_address(&self, address: IpAddr) -> Result<u64, StoreError>;
}
