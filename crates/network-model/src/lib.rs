//! Network model for director IP allocation
//!
//! Parses declared networks into an immutable model of manual, dynamic and
//! vip networks, and defines the reservation value object shared by the
//! repository and provider layers.
//!
//! # Example
//!
//! ```no_run
//! use network_model::{CloudConfig, Network, SubnetOptions};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CloudConfig::from_yaml(
//!     "networks:\n  - name: default\n    subnets:\n      - range: 10.0.0.0/24\n        gateway: 10.0.0.1\n",
//! )?;
//! let networks = Network::parse_all(&config, &SubnetOptions::default())?;
//! let subnet = &networks[0].manual_subnets()[0];
//! assert_eq!(subnet.dynamic_pool_size(), 253);
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod ip;
pub mod network;
pub mod reservation;
pub mod spec;
pub mod subnet;

#[cfg(test)]
mod network_test;
#[cfg(test)]
mod subnet_test;

pub use error::NetworkError;
pub use ip::{AddressSet, IpFamily, IpIntervalSet, IpRange};
pub use network::{
    default_network_properties, DynamicNetwork, ManualNetwork, Network, NetworkSettings, VipNetwork,
    DEFAULT_NETWORK_PROPERTIES,
};
pub use reservation::{ExistingNetworkType, InstanceRef, Reservation, ReservationState, ReservationType};
pub use spec::{AddressList, AvailabilityZoneSpec, CloudConfig, CloudProperties, NetworkSpec, NetworkType, SubnetSpec};
pub use subnet::{DynamicSubnet, ManualSubnet, SubnetOptions, VipSubnet};
