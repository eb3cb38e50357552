//! Reservation error types

use ip_store::StoreError;
use network_model::NetworkError;
use std::net::IpAddr;
use thiserror::Error;

/// Errors returned by the repository and provider
#[derive(Debug, Error)]
pub enum ReservationError {
    /// No configured subnet contains the address
    #[error("Failed to reserve IP '{ip}' for network '{network}': IP does not belong to any subnet")]
    OutsideSubnet { ip: IpAddr, network: String },

    /// Address is held by another (or no longer existing) instance
    #[error(
        "Failed to reserve IP '{ip}' for instance '{instance}': already reserved by instance '{owner}' from network '{network}'"
    )]
    AlreadyInUse {
        ip: IpAddr,
        instance: String,
        owner: String,
        network: String,
    },

    /// Address is in the subnet's reserved range
    #[error("Failed to reserve IP '{ip}' for network '{network}': IP belongs to reserved range")]
    IpReserved { ip: IpAddr, network: String },

    /// Address is in the other pool than the reservation type asks for
    #[error("IP '{ip}' on network '{network}' does not belong to {pool} pool")]
    WrongType { ip: IpAddr, network: String, pool: String },

    /// Every candidate is taken
    #[error("Failed to reserve IP for '{instance}' for {network_type} network '{network}': no more available")]
    NotEnoughCapacity {
        instance: String,
        network_type: String,
        network: String,
    },

    /// Release of a reservation that never got an address
    #[error("Can't release reservation without an IP")]
    IpMissing,

    /// Reservation kind the network variant cannot hold
    #[error("Invalid reservation on network '{network}': {reason}")]
    InvalidType { network: String, reason: String },

    /// Network model error
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Storage error other than a resolved write conflict
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
