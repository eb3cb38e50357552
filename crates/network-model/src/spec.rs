//! Declared network configuration
//!
//! Serde types for the cloud-config excerpt that declares availability zones
//! and networks. These are raw declarations; validation happens when they are
//! turned into [`crate::Network`] values.

use crate::error::NetworkError;
use serde::{Deserialize, Serialize};

/// Opaque IaaS properties passed through to the agent untouched
pub type CloudProperties = serde_json::Map<String, serde_json::Value>;

/// Top-level declaration of availability zones and networks
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CloudConfig {
    #[serde(default)]
    pub azs: Vec<AvailabilityZoneSpec>,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
}

impl CloudConfig {
    /// Parse a YAML document
    pub fn from_yaml(document: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(document)
    }

    /// Names of all declared availability zones
    pub fn availability_zone_names(&self) -> Vec<String> {
        self.azs.iter().map(|az| az.name.clone()).collect()
    }
}

/// Availability zone declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AvailabilityZoneSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_properties: Option<serde_json::Value>,
}

/// Network variant tag
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkType {
    /// Subnet-backed network with static and dynamic pools
    #[default]
    Manual,
    /// IaaS assigns the address
    Dynamic,
    /// Floating addresses from an explicit static pool
    Vip,
}

impl std::fmt::Display for NetworkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkType::Manual => write!(f, "manual"),
            NetworkType::Dynamic => write!(f, "dynamic"),
            NetworkType::Vip => write!(f, "vip"),
        }
    }
}

/// Network declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct NetworkSpec {
    pub name: String,
    #[serde(rename = "type", default)]
    pub network_type: NetworkType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subnets: Option<Vec<SubnetSpec>>,
    /// Legacy single-subnet form of dynamic networks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
    /// Legacy single-subnet form of dynamic networks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_properties: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub az: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azs: Option<Vec<String>>,
}

/// Subnet declaration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SubnetSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gateway: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dns: Option<Vec<String>>,
    #[serde(rename = "static", default, skip_serializing_if = "Option::is_none")]
    pub static_ips: Option<AddressList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reserved: Option<AddressList>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub az: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub azs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_properties: Option<serde_json::Value>,
}

/// Address entries given as one string or a list of strings
///
/// Each entry is a single address, an `a - b` range or a CIDR block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AddressList {
    One(String),
    Many(Vec<String>),
}

impl AddressList {
    /// Entries as a slice-like iterator
    pub fn entries(&self) -> impl Iterator<Item = &str> {
        let entries: &[String] = match self {
            AddressList::One(entry) => std::slice::from_ref(entry),
            AddressList::Many(entries) => entries,
        };
        entries.iter().map(String::as_str)
    }
}

/// Validate an optional cloud properties value as a mapping
pub fn cloud_properties_map(
    network: &str,
    value: Option<&serde_json::Value>,
) -> Result<CloudProperties, NetworkError> {
    match value {
        None | Some(serde_json::Value::Null) => Ok(CloudProperties::new()),
        Some(serde_json::Value::Object(map)) => Ok(map.clone()),
        Some(_) => Err(NetworkError::InvalidType {
            network: network.to_string(),
            field: "cloud_properties".to_string(),
            expected: "Hash".to_string(),
        }),
    }
}

/// Resolve `az` / `azs` into a list of names, checking them against the declared zones
///
/// Returns `None` when neither key is present.
pub fn availability_zones(
    network: &str,
    az: Option<&String>,
    azs: Option<&Vec<String>>,
    declared: &[String],
) -> Result<Option<Vec<String>>, NetworkError> {
    let names = match (az, azs) {
        (Some(_), Some(_)) => {
            return Err(NetworkError::InvalidProperty(format!(
                "Network '{network}' contains both 'az' and 'azs'. Choose one."
            )));
        }
        (Some(az), None) => vec![az.clone()],
        (None, Some(azs)) if azs.is_empty() => {
            return Err(NetworkError::InvalidProperty(format!(
                "Network '{network}' refers to an empty 'azs' array"
            )));
        }
        (None, Some(azs)) => azs.clone(),
        (None, None) => return Ok(None),
    };

    if let Some(unknown) = names.iter().find(|name| !declared.contains(name)) {
        return Err(NetworkError::UnknownAvailabilityZone {
            network: network.to_string(),
            az: unknown.clone(),
        });
    }
    Ok(Some(names))
}
