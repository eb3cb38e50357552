//! Network reservations
//!
//! A reservation binds one instance to one network and, once resolved, to an
//! address. It moves `New -> Resolved -> Reserved`, or ends `Rejected`.

use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

/// Instance owning a reservation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceRef {
    pub id: Uuid,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
}

impl InstanceRef {
    pub fn new(id: Uuid, name: impl Into<String>, availability_zone: Option<String>) -> Self {
        Self {
            id,
            name: name.into(),
            availability_zone,
        }
    }
}

impl fmt::Display for InstanceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.id)
    }
}

/// Whether the address comes from the static or the dynamic pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationType {
    Static,
    Dynamic,
}

impl fmt::Display for ReservationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReservationType::Static => write!(f, "static"),
            ReservationType::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Network type stored with a reservation from a previous deploy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExistingNetworkType {
    Manual,
    Dynamic,
    Vip,
}

impl FromStr for ExistingNetworkType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "manual" => Ok(ExistingNetworkType::Manual),
            "dynamic" => Ok(ExistingNetworkType::Dynamic),
            "vip" => Ok(ExistingNetworkType::Vip),
            other => Err(format!("Unknown network type '{other}'")),
        }
    }
}

impl fmt::Display for ExistingNetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExistingNetworkType::Manual => write!(f, "manual"),
            ExistingNetworkType::Dynamic => write!(f, "dynamic"),
            ExistingNetworkType::Vip => write!(f, "vip"),
        }
    }
}

/// Lifecycle state of a reservation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    /// No address yet
    New,
    /// Address known, not yet persisted
    Resolved,
    /// Address persisted (or nothing to persist on dynamic networks)
    Reserved,
    /// Reservation failed; see [`Reservation::error`]
    Rejected,
}

/// Binding of an instance to a network and, once resolved, an address
#[derive(Debug, Clone)]
pub struct Reservation {
    instance: InstanceRef,
    network: Arc<Network>,
    ip: Option<IpAddr>,
    reservation_type: Option<ReservationType>,
    existing_type: Option<ExistingNetworkType>,
    state: ReservationState,
    error: Option<String>,
}

impl Reservation {
    /// Dynamic reservation; the address is chosen at reserve time
    pub fn new_dynamic(instance: InstanceRef, network: Arc<Network>) -> Self {
        Self {
            instance,
            network,
            ip: None,
            reservation_type: Some(ReservationType::Dynamic),
            existing_type: None,
            state: ReservationState::New,
            error: None,
        }
    }

    /// Static reservation of a specific address
    pub fn new_static(instance: InstanceRef, network: Arc<Network>, ip: IpAddr) -> Self {
        Self {
            instance,
            network,
            ip: Some(ip),
            reservation_type: Some(ReservationType::Static),
            existing_type: None,
            state: ReservationState::Resolved,
            error: None,
        }
    }

    /// Reservation recovered from a previous deploy; its type is decided on re-reserve
    pub fn existing(
        instance: InstanceRef,
        network: Arc<Network>,
        ip: IpAddr,
        existing_type: ExistingNetworkType,
    ) -> Self {
        Self {
            instance,
            network,
            ip: Some(ip),
            reservation_type: None,
            existing_type: Some(existing_type),
            state: ReservationState::Resolved,
            error: None,
        }
    }

    pub fn instance(&self) -> &InstanceRef {
        &self.instance
    }

    pub fn network(&self) -> &Arc<Network> {
        &self.network
    }

    pub fn ip(&self) -> Option<IpAddr> {
        self.ip
    }

    /// Resolved type, `None` for an existing reservation not yet reclassified
    pub fn reservation_type(&self) -> Option<ReservationType> {
        self.reservation_type
    }

    /// Network type stored by a previous deploy
    pub fn existing_type(&self) -> Option<ExistingNetworkType> {
        self.existing_type
    }

    pub fn state(&self) -> ReservationState {
        self.state
    }

    /// Failure reason once rejected
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Availability zone of the owning instance
    pub fn availability_zone(&self) -> Option<&str> {
        self.instance.availability_zone.as_deref()
    }

    pub fn is_static(&self) -> bool {
        self.reservation_type == Some(ReservationType::Static)
    }

    pub fn is_dynamic(&self) -> bool {
        self.reservation_type == Some(ReservationType::Dynamic)
    }

    pub fn is_existing(&self) -> bool {
        self.existing_type.is_some()
    }

    pub fn is_reserved(&self) -> bool {
        self.state == ReservationState::Reserved
    }

    /// Rebind to the network that actually owns the address
    pub fn set_network(&mut self, network: Arc<Network>) {
        self.network = network;
    }

    /// Record the chosen address
    pub fn resolve_ip(&mut self, ip: IpAddr) {
        self.ip = Some(ip);
        if self.state == ReservationState::New {
            self.state = ReservationState::Resolved;
        }
    }

    /// Record the pool the address was found in
    pub fn resolve_type(&mut self, reservation_type: ReservationType) {
        self.reservation_type = Some(reservation_type);
    }

    pub fn mark_reserved(&mut self) {
        self.state = ReservationState::Reserved;
        self.error = None;
    }

    pub fn reject(&mut self, reason: impl Into<String>) {
        self.state = ReservationState::Rejected;
        self.error = Some(reason.into());
    }
}

impl fmt::Display for Reservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match (self.reservation_type, self.existing_type) {
            (Some(reservation_type), _) => reservation_type.to_string(),
            (None, Some(existing)) => format!("existing {existing}"),
            (None, None) => "unresolved".to_string(),
        };
        write!(f, "{{type={kind}, ")?;
        if let Some(ip) = self.ip {
            write!(f, "ip={ip}, ")?;
        }
        write!(f, "network={}, instance={}}}", self.network.name(), self.instance)
    }
}
