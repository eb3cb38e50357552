//! Address repository
//!
//! The only component that writes IP records. Claims are conditional creates
//! against the (address, network) key; a conflict means another worker won
//! and is retried here, never surfaced to callers.

use crate::error::ReservationError;
use ip_store::{IpAddressUpdate, IpStoreTrait, NewIpAddress, StoreError};
use network_model::{AddressSet, ManualSubnet, Reservation, VipSubnet};
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Persistence boundary for IP reservations
#[derive(Clone)]
pub struct IpRepo {
    store: Arc<dyn IpStoreTrait>,
    task_id: String,
}

impl std::fmt::Debug for IpRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpRepo")
            .field("store", &self.store.backend_name())
            .field("task_id", &self.task_id)
            .finish()
    }
}

impl IpRepo {
    /// Create a repository writing records tagged with `task_id`
    pub fn new(store: Arc<dyn IpStoreTrait>, task_id: impl Into<String>) -> Self {
        Self {
            store,
            task_id: task_id.into(),
        }
    }

    /// Persist the reservation's address on its network
    ///
    /// An existing record of the same instance is updated in place when the
    /// static flag or network differ. A record of another instance, or an
    /// orphaned one, fails with `AlreadyInUse`. Write conflicts retry the
    /// whole add until they resolve.
    pub async fn add(&self, reservation: &Reservation) -> Result<(), ReservationError> {
        let ip = reservation.ip().ok_or(ReservationError::IpMissing)?;
        let mut attempt: u64 = 0;

        loop {
            attempt += 1;
            match self.try_add(reservation, ip).await {
                Err(ReservationError::Store(err)) if err.is_unique_violation() || err.is_not_found() => {
                    debug!(
                        "Conflict reserving IP {} for instance {} (attempt {}), retrying: {}",
                        ip,
                        reservation.instance(),
                        attempt,
                        err
                    );
                }
                result => return result,
            }
        }
    }

    async fn try_add(&self, reservation: &Reservation, ip: IpAddr) -> Result<(), ReservationError> {
        let network_name = reservation.network().name();
        let static_ip = reservation.is_static();
        let instance = reservation.instance();

        let records = self.store.find_by_address(ip).await?;
        let existing = records
            .iter()
            .find(|record| record.network_name == network_name)
            .or_else(|| records.first());

        let Some(record) = existing else {
            self.store
                .create_ip_address(NewIpAddress {
                    address: ip,
                    network_name: network_name.to_string(),
                    static_ip,
                    instance_id: instance.id,
                    task_id: self.task_id.clone(),
                })
                .await?;
            info!(
                "Reserved {} IP {} on network {} for instance {}",
                if static_ip { "static" } else { "dynamic" },
                ip,
                network_name,
                instance
            );
            return Ok(());
        };

        if record.instance_id != Some(instance.id) {
            return Err(ReservationError::AlreadyInUse {
                ip,
                instance: instance.to_string(),
                owner: record
                    .instance_id
                    .map_or_else(|| "(orphaned)".to_string(), |id| id.to_string()),
                network: record.network_name.clone(),
            });
        }

        if record.static_ip != static_ip || record.network_name != network_name {
            self.store
                .update_ip_address(
                    ip,
                    &record.network_name,
                    IpAddressUpdate {
                        network_name: network_name.to_string(),
                        static_ip,
                    },
                )
                .await?;
            info!(
                "Updated IP {} of instance {}: network {} -> {}, static {} -> {}",
                ip, instance, record.network_name, network_name, record.static_ip, static_ip
            );
        } else {
            debug!("IP {} is already reserved by instance {}", ip, instance);
        }
        Ok(())
    }

    /// Claim the lowest free address of the subnet's dynamic pool
    ///
    /// Addresses held on any network are skipped. A conflicting claim moves
    /// on to the next candidate without rescanning. `None` when exhausted.
    pub async fn allocate_dynamic_ip(
        &self,
        reservation: &Reservation,
        subnet: &ManualSubnet,
    ) -> Result<Option<IpAddr>, ReservationError> {
        let taken = self.claimed_addresses().await?;

        for candidate in subnet.dynamic_candidates(&taken) {
            match self.claim(reservation, candidate, subnet.network_name(), false).await {
                Ok(()) => {
                    info!(
                        "Allocated dynamic IP {} on network {} for instance {}",
                        candidate,
                        subnet.network_name(),
                        reservation.instance()
                    );
                    return Ok(Some(candidate));
                }
                Err(err) if err.is_unique_violation() => {
                    debug!("IP {} was claimed concurrently, trying next candidate", candidate);
                }
                Err(err) => return Err(err.into()),
            }
        }

        debug!("No dynamic IP left in subnet {} of network {}", subnet.range(), subnet.network_name());
        Ok(None)
    }

    /// Claim the lowest free address of a vip pool as a static address
    ///
    /// A conflicting claim rescans the pool. `None` when exhausted.
    pub async fn allocate_vip_ip(
        &self,
        reservation: &Reservation,
        subnet: &VipSubnet,
    ) -> Result<Option<IpAddr>, ReservationError> {
        let network_name = reservation.network().name();

        loop {
            let taken = self.claimed_addresses().await?;
            let Some(candidate) = subnet.static_candidates(&taken).next() else {
                debug!("No vip left on network {}", network_name);
                return Ok(None);
            };

            match self.claim(reservation, candidate, network_name, true).await {
                Ok(()) => {
                    info!(
                        "Allocated vip {} on network {} for instance {}",
                        candidate,
                        network_name,
                        reservation.instance()
                    );
                    return Ok(Some(candidate));
                }
                Err(err) if err.is_unique_violation() => {
                    debug!("Vip {} was claimed concurrently, rescanning", candidate);
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Remove every record of the address; missing records are fine
    pub async fn delete(&self, ip: IpAddr) -> Result<(), ReservationError> {
        let removed = self.store.delete_ip_address(ip).await?;
        if removed == 0 {
            debug!("IP {} had no reservation to release", ip);
        } else {
            info!("Released IP {}", ip);
        }
        Ok(())
    }

    async fn claim(
        &self,
        reservation: &Reservation,
        ip: IpAddr,
        network_name: &str,
        static_ip: bool,
    ) -> Result<(), StoreError> {
        self.store
            .create_ip_address(NewIpAddress {
                address: ip,
                network_name: network_name.to_string(),
                static_ip,
                instance_id: reservation.instance().id,
                task_id: self.task_id.clone(),
            })
            .await
            .map(|_| ())
    }

    async fn claimed_addresses(&self) -> Result<AddressSet, StoreError> {
        Ok(self
            .store
            .list_ip_addresses(None)
            .await?
            .into_iter()
            .map(|record| record.address)
            .collect())
    }
}
