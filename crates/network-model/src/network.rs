//! Networks
//!
//! A closed set of network variants. Manual networks own address-bearing
//! subnets, dynamic networks leave addressing to the IaaS, and vip networks
//! hand out floating addresses from a flat static pool.

use crate::error::NetworkError;
use crate::reservation::Reservation;
use crate::spec::{cloud_properties_map, CloudConfig, CloudProperties, NetworkSpec, NetworkType};
use crate::subnet::{parse_dns, DynamicSubnet, ManualSubnet, SubnetOptions, VipSubnet};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use tracing::{debug, info};

/// Default network properties applied when a deployment does not pick its own
pub const DEFAULT_NETWORK_PROPERTIES: [&str; 2] = ["dns", "gateway"];

/// [`DEFAULT_NETWORK_PROPERTIES`] as owned strings
pub fn default_network_properties() -> Vec<String> {
    DEFAULT_NETWORK_PROPERTIES.iter().map(ToString::to_string).collect()
}

/// Network variants
#[derive(Debug, Clone)]
pub enum Network {
    Manual(ManualNetwork),
    Dynamic(DynamicNetwork),
    Vip(VipNetwork),
}

/// Subnet-backed network with static and dynamic pools
#[derive(Debug, Clone)]
pub struct ManualNetwork {
    /// Unique network name
    pub name: String,
    /// Subnets in declaration order; their ranges never overlap
    pub subnets: Vec<ManualSubnet>,
}

/// IaaS-addressed network
#[derive(Debug, Clone)]
pub struct DynamicNetwork {
    /// Unique network name
    pub name: String,
    /// Subnets the IaaS assigns addresses on
    pub subnets: Vec<DynamicSubnet>,
}

/// Floating address network
#[derive(Debug, Clone)]
pub struct VipNetwork {
    /// Unique network name
    pub name: String,
    /// Properties passed through to the IaaS unchanged
    pub cloud_properties: CloudProperties,
    /// Subnets with their static vip pools
    pub subnets: Vec<VipSubnet>,
}

/// Agent-facing settings for one reservation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkSettings {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub network_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub netmask: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
    #[serde(default)]
    pub cloud_properties: CloudProperties,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Vec<String>>,
}

fn reject_network_level_az(spec: &NetworkSpec) -> Result<(), NetworkError> {
    if spec.az.is_some() {
        return Err(NetworkError::InvalidProperty(format!(
            "Network '{}' must not specify 'az'.",
            spec.name
        )));
    }
    if spec.azs.is_some() {
        return Err(NetworkError::InvalidProperty(format!(
            "Network '{}' must not specify 'azs'.",
            spec.name
        )));
    }
    Ok(())
}

fn sorted_defaults(default_properties: &[String]) -> Vec<String> {
    let mut defaults = default_properties.to_vec();
    defaults.sort();
    defaults
}

impl Network {
    /// Parse and validate one network declaration
    pub fn parse(spec: &NetworkSpec, declared_azs: &[String], options: &SubnetOptions) -> Result<Self, NetworkError> {
        reject_network_level_az(spec)?;
        let name = spec.name.as_str();

        let network = match spec.network_type {
            NetworkType::Manual => {
                let subnet_specs = spec.subnets.as_ref().ok_or_else(|| NetworkError::MissingField {
                    network: name.to_string(),
                    field: "subnets".to_string(),
                })?;
                let subnets = subnet_specs
                    .iter()
                    .map(|subnet| ManualSubnet::parse(name, subnet, declared_azs, options))
                    .collect::<Result<Vec<_>, _>>()?;

                for (idx, subnet) in subnets.iter().enumerate() {
                    if subnets[idx + 1..].iter().any(|other| subnet.overlaps(other)) {
                        return Err(NetworkError::OverlappingSubnets(name.to_string()));
                    }
                }
                Network::Manual(ManualNetwork {
                    name: name.to_string(),
                    subnets,
                })
            }
            NetworkType::Dynamic => {
                let subnets = match &spec.subnets {
                    Some(subnet_specs) => {
                        for (field, present) in [("dns", spec.dns.is_some()), ("cloud_properties", spec.cloud_properties.is_some())] {
                            if present {
                                return Err(NetworkError::InvalidProperty(format!(
                                    "Network '{name}' must not specify '{field}' when also specifying 'subnets'. \
                                     Instead, '{field}' should be specified on subnet entries."
                                )));
                            }
                        }
                        subnet_specs
                            .iter()
                            .map(|subnet| DynamicSubnet::parse(name, subnet, declared_azs))
                            .collect::<Result<Vec<_>, _>>()?
                    }
                    None => vec![DynamicSubnet::new(
                        parse_dns(name, spec.dns.as_ref())?,
                        cloud_properties_map(name, spec.cloud_properties.as_ref())?,
                        None,
                    )],
                };
                Network::Dynamic(DynamicNetwork {
                    name: name.to_string(),
                    subnets,
                })
            }
            NetworkType::Vip => {
                let subnets = spec
                    .subnets
                    .iter()
                    .flatten()
                    .map(|subnet| VipSubnet::parse(name, subnet))
                    .collect::<Result<Vec<_>, _>>()?;
                Network::Vip(VipNetwork {
                    name: name.to_string(),
                    cloud_properties: cloud_properties_map(name, spec.cloud_properties.as_ref())?,
                    subnets,
                })
            }
        };

        debug!("Parsed {} network {}", network.network_type(), network.name());
        Ok(network)
    }

    /// Parse every network of a cloud config, rejecting duplicate names
    pub fn parse_all(config: &CloudConfig, options: &SubnetOptions) -> Result<Vec<Arc<Network>>, NetworkError> {
        let declared_azs = config.availability_zone_names();
        let mut seen = HashSet::new();
        let mut networks = Vec::with_capacity(config.networks.len());

        for spec in &config.networks {
            if !seen.insert(spec.name.as_str()) {
                return Err(NetworkError::DuplicateNetwork(spec.name.clone()));
            }
            networks.push(Arc::new(Network::parse(spec, &declared_azs, options)?));
        }

        info!("Loaded {} networks", networks.len());
        Ok(networks)
    }

    pub fn name(&self) -> &str {
        match self {
            Network::Manual(network) => &network.name,
            Network::Dynamic(network) => &network.name,
            Network::Vip(network) => &network.name,
        }
    }

    pub fn network_type(&self) -> NetworkType {
        match self {
            Network::Manual(_) => NetworkType::Manual,
            Network::Dynamic(_) => NetworkType::Dynamic,
            Network::Vip(_) => NetworkType::Vip,
        }
    }

    /// Address-bearing subnets; empty for dynamic and vip networks
    pub fn manual_subnets(&self) -> &[ManualSubnet] {
        match self {
            Network::Manual(network) => &network.subnets,
            Network::Dynamic(_) | Network::Vip(_) => &[],
        }
    }

    /// Manual subnet whose range holds the address
    pub fn subnet_containing(&self, ip: &IpAddr) -> Option<&ManualSubnet> {
        self.manual_subnets().iter().find(|subnet| subnet.contains(ip))
    }

    /// Whether every named zone is served by some subnet
    ///
    /// `None` (an instance group without zones) is only accepted when no
    /// subnet names a zone. Vip networks ignore zones.
    pub fn has_azs(&self, az_names: Option<&[String]>) -> bool {
        let subnet_azs: Vec<Option<&[String]>> = match self {
            Network::Manual(network) => network.subnets.iter().map(ManualSubnet::availability_zone_names).collect(),
            Network::Dynamic(network) => network.subnets.iter().map(DynamicSubnet::availability_zone_names).collect(),
            Network::Vip(_) => return true,
        };

        match az_names {
            None => subnet_azs.iter().all(Option::is_none),
            Some(names) => names.iter().all(|name| {
                subnet_azs
                    .iter()
                    .flatten()
                    .any(|azs| azs.iter().any(|az| az == name))
            }),
        }
    }

    /// Render the agent-facing settings for a reservation on this network
    pub fn network_settings(
        &self,
        reservation: &Reservation,
        default_properties: &[String],
        az: Option<&str>,
    ) -> Result<NetworkSettings, NetworkError> {
        match self {
            Network::Manual(network) => {
                let ip = reservation.ip().ok_or_else(|| NetworkError::UnsupportedReservation {
                    network: network.name.clone(),
                    reason: "reservation has no IP".to_string(),
                })?;
                let subnet = self.subnet_containing(&ip).ok_or_else(|| NetworkError::IpOutsideNetwork {
                    ip: ip.to_string(),
                    network: network.name.clone(),
                })?;
                Ok(NetworkSettings {
                    ip: Some(ip.to_string()),
                    netmask: Some(subnet.netmask().to_string()),
                    gateway: subnet.gateway().map(|gateway| gateway.to_string()),
                    dns: subnet.dns().map(|dns| dns.iter().map(ToString::to_string).collect()),
                    cloud_properties: subnet.cloud_properties().clone(),
                    default: (!default_properties.is_empty()).then(|| sorted_defaults(default_properties)),
                    ..Default::default()
                })
            }
            Network::Dynamic(network) => {
                if reservation.is_static() {
                    return Err(NetworkError::UnsupportedReservation {
                        network: network.name.clone(),
                        reason: "static reservations are not supported on dynamic networks".to_string(),
                    });
                }
                let subnet = match az {
                    // Zone-less (legacy) subnets serve every zone
                    Some(az) => network
                        .subnets
                        .iter()
                        .find(|subnet| subnet.serves_az(Some(az)))
                        .or_else(|| {
                            network
                                .subnets
                                .iter()
                                .all(|subnet| subnet.availability_zone_names().is_none())
                                .then(|| network.subnets.first())
                                .flatten()
                        })
                        .ok_or_else(|| NetworkError::NoSubnetInAvailabilityZone {
                            network: network.name.clone(),
                            az: az.to_string(),
                        })?,
                    None => network.subnets.first().ok_or_else(|| NetworkError::UnsupportedReservation {
                        network: network.name.clone(),
                        reason: "network has no subnets".to_string(),
                    })?,
                };
                Ok(NetworkSettings {
                    network_type: Some(NetworkType::Dynamic.to_string()),
                    dns: subnet.dns().map(|dns| dns.iter().map(ToString::to_string).collect()),
                    cloud_properties: subnet.cloud_properties().clone(),
                    default: Some(sorted_defaults(default_properties)),
                    ..Default::default()
                })
            }
            Network::Vip(network) => {
                let ip = reservation.ip().ok_or_else(|| NetworkError::UnsupportedReservation {
                    network: network.name.clone(),
                    reason: "reservation has no IP".to_string(),
                })?;
                let mut cloud_properties = network.cloud_properties.clone();
                if let Some(subnet) = network.subnets.iter().find(|subnet| subnet.contains(&ip)) {
                    cloud_properties.extend(subnet.cloud_properties().clone());
                }
                Ok(NetworkSettings {
                    network_type: Some(NetworkType::Vip.to_string()),
                    ip: Some(ip.to_string()),
                    cloud_properties,
                    ..Default::default()
                })
            }
        }
    }
}
