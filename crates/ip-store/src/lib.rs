//! Persistent IP address records
//!
//! Durable record of which address is claimed on which network, by which
//! instance and task. (address, network name) is unique; a conflicting
//! write surfaces as [`StoreError::UniqueViolation`] and nothing is locked.
//!
//! # Example
//!
//! ```no_run
//! use ip_store::{IpStoreTrait, NewIpAddress, SqliteIpStore};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteIpStore::connect("sqlite://director-ips.db").await?;
//! let _record = store
//!     .create_ip_address(NewIpAddress {
//!         address: "10.0.0.2".parse()?,
//!         network_name: "default".to_string(),
//!         static_ip: false,
//!         instance_id: uuid::Uuid::new_v4(),
//!         task_id: "task-1".to_string(),
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod models;
pub mod sqlite;
#[path = "trait.rs"]
pub mod store_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use error::StoreError;
pub use models::{IpAddressRecord, IpAddressUpdate, NewIpAddress};
pub use sqlite::SqliteIpStore;
pub use store_trait::IpStoreTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockIpStore;
