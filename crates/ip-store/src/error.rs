//! IP store error types

use std::net::IpAddr;
use thiserror::Error;

/// Errors that can occur when reading or writing IP address records
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Another writer already holds (address, network)
    #[error("IP '{address}' is already recorded on network '{network_name}'")]
    UniqueViolation { address: IpAddr, network_name: String },

    /// Record to update does not exist (anymore)
    #[error("No record for IP '{address}' on network '{network_name}'")]
    NotFound { address: IpAddr, network_name: String },

    /// Stored row could not be decoded
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
}

impl StoreError {
    /// Whether this is the typed signal of a concurrent claim
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { .. })
    }

    /// Whether the record vanished underneath an update
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}
