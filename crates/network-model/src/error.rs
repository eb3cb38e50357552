//! Network model errors
//!
//! Raised while turning declared network configuration into the in-memory
//! network/subnet model, and while rendering network settings.

use thiserror::Error;

/// Errors that can occur when parsing or querying the network model
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NetworkError {
    /// Address string could not be parsed
    #[error("Invalid IP address '{0}'")]
    InvalidIp(String),

    /// Range string is neither a single address, `a - b`, nor a CIDR block
    #[error("Invalid IP range format '{0}'")]
    InvalidIpRangeFormat(String),

    /// Subnet range is unusable
    #[error("Network '{network}' has invalid range '{range}': {reason}")]
    InvalidRange {
        network: String,
        range: String,
        reason: String,
    },

    /// Gateway is not a usable host address of the range
    #[error("Invalid gateway for network '{network}': {reason}")]
    InvalidGateway { network: String, reason: String },

    /// DNS server entry is not an address
    #[error("Invalid DNS for network '{network}': {reason}")]
    InvalidDns { network: String, reason: String },

    /// Static address lies outside the subnet range
    #[error("Static IP '{ip}' is out of network '{network}' range")]
    StaticIpOutOfRange { ip: String, network: String },

    /// Static address is also declared as reserved
    #[error("Static IP '{ip}' is in network '{network}' reserved range")]
    StaticIpInReservedRange { ip: String, network: String },

    /// Static address collides with gateway, network id, broadcast or another static entry
    #[error("Static IP '{ip}' on network '{network}' is not available: {reason}")]
    StaticIpUnavailable {
        ip: String,
        network: String,
        reason: String,
    },

    /// Reserved address lies outside the subnet range
    #[error("Reserved IP '{ip}' is out of network '{network}' range")]
    ReservedIpOutOfRange { ip: String, network: String },

    /// Two subnets of the same network overlap
    #[error("Network '{0}' has overlapping subnets")]
    OverlappingSubnets(String),

    /// Two networks share a name
    #[error("Duplicate network name '{0}'")]
    DuplicateNetwork(String),

    /// Property is present where it is not allowed, or is malformed
    #[error("{0}")]
    InvalidProperty(String),

    /// Subnet refers to an availability zone that is not declared
    #[error("Network '{network}' refers to an unknown availability zone '{az}'")]
    UnknownAvailabilityZone { network: String, az: String },

    /// Required property is missing
    #[error("Required property '{field}' was not specified in network '{network}'")]
    MissingField { network: String, field: String },

    /// Property has the wrong shape
    #[error("Property '{field}' in network '{network}' has invalid type: expected {expected}")]
    InvalidType {
        network: String,
        field: String,
        expected: String,
    },

    /// Reservation address is not inside any subnet of the network
    #[error("IP '{ip}' does not belong to any subnet of network '{network}'")]
    IpOutsideNetwork { ip: String, network: String },

    /// No subnet of the network serves the requested availability zone
    #[error("Network '{network}' has no matching subnet for availability zone '{az}'")]
    NoSubnetInAvailabilityZone { network: String, az: String },

    /// Reservation cannot be rendered for this network variant
    #[error("Can't provide network settings on network '{network}': {reason}")]
    UnsupportedReservation { network: String, reason: String },
}
