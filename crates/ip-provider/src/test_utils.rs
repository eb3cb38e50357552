//! Test utilities for repository and provider tests
//!
//! Helpers for building networks, instances and a mock-backed repository.

use crate::provider::IpProvider;
use crate::repo::IpRepo;
use ip_store::MockIpStore;
use network_model::{CloudConfig, InstanceRef, Network, SubnetOptions};
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

/// Task id written by repositories built here
pub const TEST_TASK_ID: &str = "fake-task-id";

/// Parse an address literal
pub fn ip(value: &str) -> IpAddr {
    value.parse().expect("test address")
}

/// Parse every network of a cloud-config YAML document
pub fn networks_from_yaml(yaml: &str) -> Vec<Arc<Network>> {
    let config = CloudConfig::from_yaml(yaml).expect("valid cloud config");
    Network::parse_all(&config, &SubnetOptions::default()).expect("valid networks")
}

/// Look a network up by name
pub fn find_network(networks: &[Arc<Network>], name: &str) -> Arc<Network> {
    networks
        .iter()
        .find(|network| network.name() == name)
        .map(Arc::clone)
        .expect("network is declared")
}

/// Instance with a fresh id
pub fn create_test_instance(name: &str, az: Option<&str>) -> InstanceRef {
    InstanceRef::new(Uuid::new_v4(), name, az.map(ToString::to_string))
}

/// Repository backed by the given mock store
pub fn create_test_repo(store: &MockIpStore) -> IpRepo {
    IpRepo::new(Arc::new(store.clone()), TEST_TASK_ID)
}

/// Provider over the given networks, backed by the given mock store
pub fn create_test_provider(store: &MockIpStore, networks: &[Arc<Network>]) -> IpProvider {
    IpProvider::new(create_test_repo(store), networks.to_vec())
}

/// One manual network with a single /24 and gateway `.1`
pub const SINGLE_SUBNET_CONFIG: &str = r"
networks:
  - name: my-manual-network
    type: manual
    subnets:
      - range: 192.168.1.0/24
        gateway: 192.168.1.1
        static: [192.168.1.5, 192.168.1.100 - 192.168.1.110]
        reserved: [192.168.1.11]
";

/// Two manual networks over the same range plus dynamic and vip networks
pub const OVERLAPPING_CONFIG: &str = r"
azs:
  - name: az-1
  - name: az-2
networks:
  - name: my-manual-network
    type: manual
    subnets:
      - range: 192.168.1.0/24
        gateway: 192.168.1.1
        static: [192.168.1.5]
        reserved: [192.168.1.6]
  - name: my-another-network
    type: manual
    subnets:
      - range: 192.168.1.0/24
        gateway: 192.168.1.1
  - name: zoned-network
    type: manual
    subnets:
      - range: 10.10.1.0/30
        gateway: 10.10.1.1
        az: az-1
      - range: 10.10.2.0/30
        gateway: 10.10.2.1
        az: az-2
      - range: 10.10.3.0/30
        gateway: 10.10.3.1
        azs: [az-2]
  - name: fake-dynamic-network
    type: dynamic
    cloud_properties: {foo: bar}
  - name: my-vip-network
    type: vip
    subnets:
      - static: [1.1.1.1, 2.2.2.2]
      - static: [3.3.3.3]
";
