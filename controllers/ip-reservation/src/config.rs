//! Controller configuration.
//!
//! Environment settings plus the two YAML inputs: the network declarations
//! and the claims to run against them.

use crate::error::ControllerError;
use network_model::{CloudConfig, ExistingNetworkType, InstanceRef, ReservationType, SubnetOptions};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default store location when `DATABASE_URL` is unset
pub const DEFAULT_DATABASE_URL: &str = "sqlite://director-ips.db";

/// Default worker pool size when `MAX_WORKERS` is unset
pub const DEFAULT_MAX_WORKERS: usize = 5;

/// Settings read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct ControllerConfig {
    pub network_config: PathBuf,
    pub claims_file: PathBuf,
    pub database_url: String,
    pub task_id: String,
    pub max_workers: usize,
    pub director_ips: Vec<IpAddr>,
    pub ignore_missing_gateway: bool,
}

impl ControllerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from any key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let required = |key: &str| {
            lookup(key)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ControllerError::InvalidConfig(format!("{key} environment variable is required")))
        };

        let network_config = PathBuf::from(required("NETWORK_CONFIG")?);
        let claims_file = PathBuf::from(required("CLAIMS_FILE")?);
        let database_url = lookup("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string());
        let task_id = lookup("TASK_ID").unwrap_or_else(|| Uuid::new_v4().to_string());

        let max_workers = match lookup("MAX_WORKERS") {
            Some(raw) => raw
                .trim()
                .parse::<usize>()
                .ok()
                .filter(|workers| *workers > 0)
                .ok_or_else(|| ControllerError::InvalidConfig(format!("MAX_WORKERS must be a positive integer, got '{raw}'")))?,
            None => DEFAULT_MAX_WORKERS,
        };

        let director_ips = lookup("DIRECTOR_IPS")
            .map(|raw| parse_director_ips(&raw))
            .transpose()?
            .unwrap_or_default();

        let ignore_missing_gateway = match lookup("IGNORE_MISSING_GATEWAY").as_deref().map(str::trim) {
            None | Some("" | "0" | "false") => false,
            Some("1" | "true") => true,
            Some(other) => {
                return Err(ControllerError::InvalidConfig(format!(
                    "IGNORE_MISSING_GATEWAY must be true or false, got '{other}'"
                )));
            }
        };

        Ok(Self {
            network_config,
            claims_file,
            database_url,
            task_id,
            max_workers,
            director_ips,
            ignore_missing_gateway,
        })
    }

    /// Options applied while parsing manual subnets
    pub fn subnet_options(&self) -> SubnetOptions {
        SubnetOptions {
            director_ips: self.director_ips.clone(),
            ignore_missing_gateway: self.ignore_missing_gateway,
        }
    }
}

fn parse_director_ips(raw: &str) -> Result<Vec<IpAddr>, ControllerError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            entry
                .parse()
                .map_err(|_| ControllerError::InvalidConfig(format!("DIRECTOR_IPS entry '{entry}' is not an IP address")))
        })
        .collect()
}

/// What to do with a claim
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimAction {
    #[default]
    Reserve,
    Release,
}

/// One reservation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimSpec {
    pub instance: InstanceRef,
    pub network: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    /// Requested pool; defaults to static with an address and dynamic without
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub reservation_type: Option<ReservationType>,
    /// Network type recorded by a previous deploy; marks the claim as existing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub existing: Option<ExistingNetworkType>,
    #[serde(default)]
    pub action: ClaimAction,
    /// Properties this network provides by default to the instance
    #[serde(rename = "default", default, skip_serializing_if = "Option::is_none")]
    pub default_properties: Option<Vec<String>>,
}

/// Claims input document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsFile {
    #[serde(default)]
    pub claims: Vec<ClaimSpec>,
}

impl ClaimsFile {
    pub fn from_yaml(document: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(document)
    }

    pub fn load(path: &Path) -> Result<Self, ControllerError> {
        let document = read(path)?;
        Self::from_yaml(&document).map_err(|source| ControllerError::Yaml {
            path: path.display().to_string(),
            source,
        })
    }
}

/// Load the network declarations
pub fn load_cloud_config(path: &Path) -> Result<CloudConfig, ControllerError> {
    let document = read(path)?;
    CloudConfig::from_yaml(&document).map_err(|source| ControllerError::Yaml {
        path: path.display().to_string(),
        source,
    })
}

fn read(path: &Path) -> Result<String, ControllerError> {
    std::fs::read_to_string(path).map_err(|source| ControllerError::Io {
        path: path.display().to_string(),
        source,
    })
}
