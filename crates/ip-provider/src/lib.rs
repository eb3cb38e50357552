//! IP reservation for director deployments
//!
//! [`IpProvider`] resolves which network and subnet own a reservation and
//! validates it; [`IpRepo`] persists claims through an [`ip_store::IpStoreTrait`]
//! using optimistic concurrency instead of locks.
//!
//! # Example
//!
//! ```no_run
//! use ip_provider::{IpProvider, IpRepo};
//! use ip_store::SqliteIpStore;
//! use network_model::{CloudConfig, InstanceRef, Network, Reservation, SubnetOptions};
//! use std::sync::Arc;
//!
//! # async fn example(yaml: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let networks = Network::parse_all(&CloudConfig::from_yaml(yaml)?, &SubnetOptions::default())?;
//! let store = Arc::new(SqliteIpStore::connect("sqlite://director-ips.db").await?);
//! let provider = IpProvider::new(IpRepo::new(store, "task-1"), networks.clone());
//!
//! let instance = InstanceRef::new(uuid::Uuid::new_v4(), "web/0", None);
//! let mut reservation = Reservation::new_dynamic(instance, Arc::clone(&networks[0]));
//! provider.reserve(&mut reservation).await?;
//! println!("reserved {:?}", reservation.ip());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod provider;
pub mod repo;
#[cfg(test)]
mod test_utils;

pub use error::ReservationError;
pub use provider::IpProvider;
pub use repo::IpRepo;
