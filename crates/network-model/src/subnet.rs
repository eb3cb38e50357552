//! Subnet model
//!
//! Subnets are immutable once parsed. A manual subnet never tracks which
//! addresses are in use; it only generates candidates that the repository
//! then tries to claim.

use crate::error::NetworkError;
use crate::ip::{ip_to_u128, parse_ip, u128_to_ip, AddressSet, FreeAddresses, IpFamily, IpIntervalSet, IpRange};
use crate::spec::{availability_zones, cloud_properties_map, AddressList, CloudProperties, SubnetSpec};
use ipnet::IpNet;
use std::net::IpAddr;
use std::str::FromStr;
use tracing::debug;

/// Settings shared by every subnet parse
#[derive(Debug, Clone, Default)]
pub struct SubnetOptions {
    /// Addresses of the director itself, restricted in every manual subnet
    pub director_ips: Vec<IpAddr>,
    /// Accept manual subnets without a gateway
    pub ignore_missing_gateway: bool,
}

/// Subnet of a manual network
#[derive(Debug, Clone)]
pub struct ManualSubnet {
    network_name: String,
    range: IpNet,
    family: IpFamily,
    first: u128,
    last: u128,
    gateway: Option<IpAddr>,
    dns: Option<Vec<IpAddr>>,
    cloud_properties: CloudProperties,
    availability_zone_names: Option<Vec<String>>,
    static_ips: IpIntervalSet,
    restricted_ips: AddressSet,
    excluded: IpIntervalSet,
}

impl ManualSubnet {
    /// Parse and validate a manual subnet declaration
    pub fn parse(
        network_name: &str,
        spec: &SubnetSpec,
        declared_azs: &[String],
        options: &SubnetOptions,
    ) -> Result<Self, NetworkError> {
        let range_str = spec.range.as_deref().ok_or_else(|| NetworkError::MissingField {
            network: network_name.to_string(),
            field: "range".to_string(),
        })?;
        let range = IpNet::from_str(range_str.trim())
            .map_err(|e| NetworkError::InvalidRange {
                network: network_name.to_string(),
                range: range_str.to_string(),
                reason: e.to_string(),
            })?
            .trunc();
        let bounds = IpRange::from_net(&range);
        let family = bounds.family;
        let (first, last) = (bounds.first, bounds.last);
        let network_id = first;
        let broadcast = last;

        let gateway = parse_gateway(network_name, spec.gateway.as_deref(), &bounds, options)?;
        let dns = parse_dns(network_name, spec.dns.as_ref())?;
        let cloud_properties = cloud_properties_map(network_name, spec.cloud_properties.as_ref())?;
        let availability_zone_names =
            availability_zones(network_name, spec.az.as_ref(), spec.azs.as_ref(), declared_azs)?;

        let mut restricted_ips = AddressSet::new();
        for entry in spec.reserved.iter().flat_map(AddressList::entries) {
            let reserved = IpRange::parse(entry)?;
            if reserved.family != family || reserved.first < first || reserved.last > last {
                return Err(NetworkError::ReservedIpOutOfRange {
                    ip: entry.trim().to_string(),
                    network: network_name.to_string(),
                });
            }
            restricted_ips.insert_range(&reserved);
        }
        for director_ip in &options.director_ips {
            restricted_ips.insert(*director_ip);
        }

        let mut static_ips = IpIntervalSet::new();
        for entry in spec.static_ips.iter().flat_map(AddressList::entries) {
            let statics = IpRange::parse(entry)?;
            if statics.family != family || statics.first < first || statics.last > last {
                return Err(NetworkError::StaticIpOutOfRange {
                    ip: entry.trim().to_string(),
                    network: network_name.to_string(),
                });
            }
            if let Some((lo, _)) = restricted_ips
                .for_family(family)
                .first_overlap(statics.first, statics.last)
            {
                return Err(NetworkError::StaticIpInReservedRange {
                    ip: u128_to_ip(lo.max(statics.first), family).to_string(),
                    network: network_name.to_string(),
                });
            }
            if let Some((lo, _)) = static_ips.first_overlap(statics.first, statics.last) {
                return Err(NetworkError::StaticIpUnavailable {
                    ip: u128_to_ip(lo.max(statics.first), family).to_string(),
                    network: network_name.to_string(),
                    reason: "declared more than once".to_string(),
                });
            }
            let mut specials = vec![("network id", network_id), ("broadcast IP", broadcast)];
            if let Some(gateway) = gateway {
                specials.push(("gateway", ip_to_u128(gateway)));
            }
            if let Some((label, value)) = specials
                .into_iter()
                .find(|&(_, value)| value >= statics.first && value <= statics.last)
            {
                return Err(NetworkError::StaticIpUnavailable {
                    ip: u128_to_ip(value, family).to_string(),
                    network: network_name.to_string(),
                    reason: format!("it is the {label}"),
                });
            }
            static_ips.insert(statics.first, statics.last);
        }

        let mut excluded = restricted_ips.for_family(family).clone();
        for (lo, hi) in static_ips.iter() {
            excluded.insert(lo, hi);
        }
        excluded.insert_value(network_id);
        excluded.insert_value(broadcast);
        if let Some(gateway) = gateway {
            excluded.insert_value(ip_to_u128(gateway));
        }

        debug!(
            "Parsed subnet {} of network {}: {} static, {} restricted",
            range,
            network_name,
            static_ips.len(),
            restricted_ips.len()
        );

        Ok(Self {
            network_name: network_name.to_string(),
            range,
            family,
            first,
            last,
            gateway,
            dns,
            cloud_properties,
            availability_zone_names,
            static_ips,
            restricted_ips,
            excluded,
        })
    }

    /// Name of the owning network
    pub fn network_name(&self) -> &str {
        &self.network_name
    }

    /// CIDR block of the subnet
    pub fn range(&self) -> &IpNet {
        &self.range
    }

    /// Address family of the subnet
    pub fn family(&self) -> IpFamily {
        self.family
    }

    /// Netmask in dotted (IPv4) or colon (IPv6) form
    pub fn netmask(&self) -> IpAddr {
        self.range.netmask()
    }

    pub fn gateway(&self) -> Option<IpAddr> {
        self.gateway
    }

    pub fn dns(&self) -> Option<&[IpAddr]> {
        self.dns.as_deref()
    }

    pub fn cloud_properties(&self) -> &CloudProperties {
        &self.cloud_properties
    }

    /// Availability zones served, `None` when the subnet names none
    pub fn availability_zone_names(&self) -> Option<&[String]> {
        self.availability_zone_names.as_deref()
    }

    /// Restricted addresses, director addresses included
    pub fn restricted_ips(&self) -> &AddressSet {
        &self.restricted_ips
    }

    /// Whether the address lies in the subnet range
    pub fn contains(&self, ip: &IpAddr) -> bool {
        IpFamily::of(ip) == self.family && {
            let value = ip_to_u128(*ip);
            value >= self.first && value <= self.last
        }
    }

    /// Whether the address can never be handed out: reserved, a director
    /// address, the gateway, the network id or the broadcast address
    pub fn is_restricted(&self, ip: &IpAddr) -> bool {
        if self.restricted_ips.contains(ip) || self.gateway.as_ref() == Some(ip) {
            return true;
        }
        IpFamily::of(ip) == self.family && {
            let value = ip_to_u128(*ip);
            value == self.first || value == self.last
        }
    }

    /// Whether the address belongs to the static pool
    pub fn is_static(&self, ip: &IpAddr) -> bool {
        IpFamily::of(ip) == self.family && self.static_ips.contains(ip_to_u128(*ip))
    }

    /// Whether the address may be reserved on this subnet at all
    pub fn is_reservable(&self, ip: &IpAddr) -> bool {
        self.contains(ip) && !self.is_restricted(ip)
    }

    /// Whether the subnet serves the availability zone
    ///
    /// An instance without a zone is served by every subnet. A subnet that
    /// names no zones only serves instances without one.
    pub fn serves_az(&self, az: Option<&str>) -> bool {
        match (az, &self.availability_zone_names) {
            (None, _) => true,
            (Some(az), Some(names)) => names.iter().any(|name| name == az),
            (Some(_), None) => false,
        }
    }

    /// Whether two subnets share any address (never across families)
    pub fn overlaps(&self, other: &ManualSubnet) -> bool {
        self.family == other.family && self.first <= other.last && other.first <= self.last
    }

    /// Size of the dynamic pool
    pub fn dynamic_pool_size(&self) -> u128 {
        (self.last - self.first).saturating_add(1).saturating_sub(self.excluded.count_within(self.first, self.last))
    }

    /// Dynamic pool candidates in ascending order, skipping `taken`
    pub fn dynamic_candidates<'a>(&'a self, taken: &'a AddressSet) -> FreeAddresses<'a> {
        FreeAddresses::new(
            self.family,
            self.first,
            self.last,
            vec![&self.excluded, taken.for_family(self.family)],
        )
    }

    /// Lowest dynamic pool address not in `taken`
    pub fn allocate_dynamic_ip(&self, taken: &AddressSet) -> Option<IpAddr> {
        self.dynamic_candidates(taken).next()
    }
}

fn parse_gateway(
    network_name: &str,
    gateway: Option<&str>,
    bounds: &IpRange,
    options: &SubnetOptions,
) -> Result<Option<IpAddr>, NetworkError> {
    let Some(raw) = gateway else {
        if options.ignore_missing_gateway {
            return Ok(None);
        }
        return Err(NetworkError::MissingField {
            network: network_name.to_string(),
            field: "gateway".to_string(),
        });
    };
    let invalid = |reason: &str| NetworkError::InvalidGateway {
        network: network_name.to_string(),
        reason: reason.to_string(),
    };

    let gateway = parse_ip(raw).map_err(|_| invalid("must be a single IP"))?;
    if IpFamily::of(&gateway) != bounds.family {
        return Err(invalid("must be inside the range"));
    }
    let value = ip_to_u128(gateway);
    if value < bounds.first || value > bounds.last {
        return Err(invalid("must be inside the range"));
    }
    if value == bounds.first {
        return Err(invalid("can't be the network id"));
    }
    if value == bounds.last {
        return Err(invalid("can't be the broadcast IP"));
    }
    Ok(Some(gateway))
}

pub(crate) fn parse_dns(network_name: &str, dns: Option<&Vec<String>>) -> Result<Option<Vec<IpAddr>>, NetworkError> {
    dns.map(|servers| {
        servers
            .iter()
            .map(|server| {
                parse_ip(server).map_err(|_| NetworkError::InvalidDns {
                    network: network_name.to_string(),
                    reason: format!("'{server}' is not an IP address"),
                })
            })
            .collect()
    })
    .transpose()
}

/// Address-less subnet of a dynamic network
#[derive(Debug, Clone, Default)]
pub struct DynamicSubnet {
    dns: Option<Vec<IpAddr>>,
    cloud_properties: CloudProperties,
    availability_zone_names: Option<Vec<String>>,
}

impl DynamicSubnet {
    /// Build a dynamic subnet from already validated parts
    pub fn new(
        dns: Option<Vec<IpAddr>>,
        cloud_properties: CloudProperties,
        availability_zone_names: Option<Vec<String>>,
    ) -> Self {
        Self {
            dns,
            cloud_properties,
            availability_zone_names,
        }
    }

    /// Parse one entry of a dynamic network's `subnets` list
    pub fn parse(network_name: &str, spec: &SubnetSpec, declared_azs: &[String]) -> Result<Self, NetworkError> {
        Ok(Self::new(
            parse_dns(network_name, spec.dns.as_ref())?,
            cloud_properties_map(network_name, spec.cloud_properties.as_ref())?,
            availability_zones(network_name, spec.az.as_ref(), spec.azs.as_ref(), declared_azs)?,
        ))
    }

    pub fn dns(&self) -> Option<&[IpAddr]> {
        self.dns.as_deref()
    }

    pub fn cloud_properties(&self) -> &CloudProperties {
        &self.cloud_properties
    }

    pub fn availability_zone_names(&self) -> Option<&[String]> {
        self.availability_zone_names.as_deref()
    }

    /// Whether the subnet serves the zone (a zone-less subnet only serves zone-less instances)
    pub fn serves_az(&self, az: Option<&str>) -> bool {
        match (az, &self.availability_zone_names) {
            (None, _) => true,
            (Some(az), Some(names)) => names.iter().any(|name| name == az),
            (Some(_), None) => false,
        }
    }
}

/// Flat static pool of a vip network; vip networks have no zones
#[derive(Debug, Clone, Default)]
pub struct VipSubnet {
    static_ips: AddressSet,
    cloud_properties: CloudProperties,
}

impl VipSubnet {
    /// Parse one entry of a vip network's `subnets` list
    pub fn parse(network_name: &str, spec: &SubnetSpec) -> Result<Self, NetworkError> {
        let mut static_ips = AddressSet::new();
        for entry in spec.static_ips.iter().flat_map(AddressList::entries) {
            static_ips.insert_range(&IpRange::parse(entry)?);
        }
        Ok(Self {
            static_ips,
            cloud_properties: cloud_properties_map(network_name, spec.cloud_properties.as_ref())?,
        })
    }

    pub fn cloud_properties(&self) -> &CloudProperties {
        &self.cloud_properties
    }

    /// Whether the address belongs to the pool
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.static_ips.contains(ip)
    }

    /// Number of addresses in the pool
    pub fn pool_size(&self) -> u128 {
        self.static_ips.len()
    }

    /// Pool addresses not in `taken`, IPv4 first, ascending
    pub fn static_candidates<'a>(&'a self, taken: &'a AddressSet) -> impl Iterator<Item = IpAddr> + 'a {
        self.static_ips
            .intervals()
            .flat_map(move |(family, lo, hi)| FreeAddresses::new(family, lo, hi, vec![taken.for_family(family)]))
    }
}
