//! IP address record models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

/// Persisted claim of one address on one network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpAddressRecord {
    pub id: i64,
    pub address: IpAddr,
    pub network_name: String,
    #[serde(rename = "static")]
    pub static_ip: bool,
    /// `None` for orphaned records whose instance is gone
    pub instance_id: Option<Uuid>,
    pub task_id: String,
    pub created_at: DateTime<Utc>,
}

/// New claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIpAddress {
    pub address: IpAddr,
    pub network_name: String,
    pub static_ip: bool,
    pub instance_id: Uuid,
    pub task_id: String,
}

/// In-place change of an existing claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddressUpdate {
    pub network_name: String,
    pub static_ip: bool,
}
