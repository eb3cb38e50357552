//! Address arithmetic
//!
//! Addresses are handled as `u128` integers so IPv4 and IPv6 share one code
//! path. Ordering, range membership and pool scans never compare strings.

use crate::error::NetworkError;
use ipnet::IpNet;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// Address family of an address, range or subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IpFamily {
    V4,
    V6,
}

impl IpFamily {
    /// Family of a concrete address
    pub fn of(ip: &IpAddr) -> Self {
        match ip {
            IpAddr::V4(_) => IpFamily::V4,
            IpAddr::V6(_) => IpFamily::V6,
        }
    }

    /// Highest integer value an address of this family can take
    pub fn max_value(self) -> u128 {
        match self {
            IpFamily::V4 => u128::from(u32::MAX),
            IpFamily::V6 => u128::MAX,
        }
    }
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpFamily::V4 => write!(f, "IPv4"),
            IpFamily::V6 => write!(f, "IPv6"),
        }
    }
}

/// Convert an address to its integer value
pub fn ip_to_u128(ip: IpAddr) -> u128 {
    match ip {
        IpAddr::V4(v4) => u128::from(u32::from(v4)),
        IpAddr::V6(v6) => u128::from(v6),
    }
}

/// Convert an integer value back to an address of the given family
///
/// IPv4 values above `u32::MAX` saturate to `255.255.255.255`.
pub fn u128_to_ip(value: u128, family: IpFamily) -> IpAddr {
    match family {
        IpFamily::V4 => IpAddr::V4(Ipv4Addr::from(u32::try_from(value).unwrap_or(u32::MAX))),
        IpFamily::V6 => IpAddr::V6(Ipv6Addr::from(value)),
    }
}

/// Parse a single address
///
/// Accepts a bare address or a host prefix (`/32` for IPv4, `/128` for IPv6).
pub fn parse_ip(value: &str) -> Result<IpAddr, NetworkError> {
    let trimmed = value.trim();
    if let Ok(ip) = IpAddr::from_str(trimmed) {
        return Ok(ip);
    }
    match IpNet::from_str(trimmed) {
        Ok(net) if net.prefix_len() == net.max_prefix_len() => Ok(net.addr()),
        _ => Err(NetworkError::InvalidIp(trimmed.to_string())),
    }
}

/// Inclusive range of addresses of one family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    pub family: IpFamily,
    pub first: u128,
    pub last: u128,
}

impl IpRange {
    /// Range covering exactly one address
    pub fn single(ip: IpAddr) -> Self {
        let value = ip_to_u128(ip);
        Self {
            family: IpFamily::of(&ip),
            first: value,
            last: value,
        }
    }

    /// Range covering a whole CIDR block, network id and broadcast included
    pub fn from_net(net: &IpNet) -> Self {
        let net = net.trunc();
        Self {
            family: IpFamily::of(&net.network()),
            first: ip_to_u128(net.network()),
            last: ip_to_u128(net.broadcast()),
        }
    }

    /// Parse `a.b.c.d`, `a - b` or a CIDR block
    pub fn parse(value: &str) -> Result<Self, NetworkError> {
        let trimmed = value.trim();

        if trimmed.contains('/') {
            return IpNet::from_str(trimmed)
                .map(|net| Self::from_net(&net))
                .map_err(|_| NetworkError::InvalidIpRangeFormat(trimmed.to_string()));
        }

        if let Some((start, end)) = trimmed.split_once('-') {
            let start = parse_ip(start)
                .map_err(|_| NetworkError::InvalidIpRangeFormat(trimmed.to_string()))?;
            let end = parse_ip(end)
                .map_err(|_| NetworkError::InvalidIpRangeFormat(trimmed.to_string()))?;
            if IpFamily::of(&start) != IpFamily::of(&end) {
                return Err(NetworkError::InvalidIpRangeFormat(trimmed.to_string()));
            }
            let (first, last) = (ip_to_u128(start), ip_to_u128(end));
            if first > last {
                return Err(NetworkError::InvalidIpRangeFormat(trimmed.to_string()));
            }
            return Ok(Self {
                family: IpFamily::of(&start),
                first,
                last,
            });
        }

        parse_ip(trimmed)
            .map(Self::single)
            .map_err(|_| NetworkError::InvalidIpRangeFormat(trimmed.to_string()))
    }

    /// First address of the range
    pub fn first_ip(&self) -> IpAddr {
        u128_to_ip(self.first, self.family)
    }

    /// Last address of the range
    pub fn last_ip(&self) -> IpAddr {
        u128_to_ip(self.last, self.family)
    }
}

impl fmt::Display for IpRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.first == self.last {
            write!(f, "{}", self.first_ip())
        } else {
            write!(f, "{} - {}", self.first_ip(), self.last_ip())
        }
    }
}

/// Sorted, disjoint set of inclusive integer intervals
///
/// Overlapping and adjacent intervals are merged on insert, so a lookup is a
/// binary search and a scan can skip a whole block in one step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpIntervalSet {
    intervals: Vec<(u128, u128)>,
}

impl IpIntervalSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `first..=last`, merging with overlapping or adjacent intervals
    pub fn insert(&mut self, first: u128, last: u128) {
        let (mut first, mut last) = if first <= last { (first, last) } else { (last, first) };

        // Everything ending before `first - 1` stays to the left untouched
        let start = self
            .intervals
            .partition_point(|&(_, end)| end.saturating_add(1) < first);
        let mut end = start;
        while let Some(&(lo, hi)) = self.intervals.get(end) {
            if lo > last.saturating_add(1) {
                break;
            }
            first = first.min(lo);
            last = last.max(hi);
            end += 1;
        }
        self.intervals.splice(start..end, std::iter::once((first, last)));
    }

    /// Insert a single value
    pub fn insert_value(&mut self, value: u128) {
        self.insert(value, value);
    }

    /// Whether `value` lies in any interval
    pub fn contains(&self, value: u128) -> bool {
        self.interval_containing(value).is_some()
    }

    /// The interval holding `value`, if any
    pub fn interval_containing(&self, value: u128) -> Option<(u128, u128)> {
        let idx = self.intervals.partition_point(|&(_, end)| end < value);
        self.intervals
            .get(idx)
            .copied()
            .filter(|&(start, _)| start <= value)
    }

    /// Lowest interval intersecting `first..=last`
    pub fn first_overlap(&self, first: u128, last: u128) -> Option<(u128, u128)> {
        let idx = self.intervals.partition_point(|&(_, end)| end < first);
        self.intervals
            .get(idx)
            .copied()
            .filter(|&(start, _)| start <= last)
    }

    /// Number of values held, saturating at `u128::MAX`
    pub fn len(&self) -> u128 {
        self.intervals.iter().fold(0u128, |acc, &(lo, hi)| {
            acc.saturating_add((hi - lo).saturating_add(1))
        })
    }

    /// Number of values held inside `first..=last`
    pub fn count_within(&self, first: u128, last: u128) -> u128 {
        self.intervals
            .iter()
            .filter(|&&(lo, hi)| hi >= first && lo <= last)
            .fold(0u128, |acc, &(lo, hi)| {
                let lo = lo.max(first);
                let hi = hi.min(last);
                acc.saturating_add((hi - lo).saturating_add(1))
            })
    }

    /// Whether the set holds no values
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Intervals in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (u128, u128)> + '_ {
        self.intervals.iter().copied()
    }
}

/// Set of addresses of both families
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressSet {
    v4: IpIntervalSet,
    v6: IpIntervalSet,
}

impl AddressSet {
    /// Empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single address
    pub fn insert(&mut self, ip: IpAddr) {
        self.insert_range(&IpRange::single(ip));
    }

    /// Insert every address of a range
    pub fn insert_range(&mut self, range: &IpRange) {
        self.family_mut(range.family).insert(range.first, range.last);
    }

    /// Whether the address is held
    pub fn contains(&self, ip: &IpAddr) -> bool {
        self.for_family(IpFamily::of(ip)).contains(ip_to_u128(*ip))
    }

    /// Interval set for one family
    pub fn for_family(&self, family: IpFamily) -> &IpIntervalSet {
        match family {
            IpFamily::V4 => &self.v4,
            IpFamily::V6 => &self.v6,
        }
    }

    fn family_mut(&mut self, family: IpFamily) -> &mut IpIntervalSet {
        match family {
            IpFamily::V4 => &mut self.v4,
            IpFamily::V6 => &mut self.v6,
        }
    }

    /// Whether the set holds no addresses
    pub fn is_empty(&self) -> bool {
        self.v4.is_empty() && self.v6.is_empty()
    }

    /// Number of addresses held, saturating at `u128::MAX`
    pub fn len(&self) -> u128 {
        self.v4.len().saturating_add(self.v6.len())
    }

    /// All intervals, IPv4 first, each family ascending
    pub fn intervals(&self) -> impl Iterator<Item = (IpFamily, u128, u128)> + '_ {
        self.v4
            .iter()
            .map(|(lo, hi)| (IpFamily::V4, lo, hi))
            .chain(self.v6.iter().map(|(lo, hi)| (IpFamily::V6, lo, hi)))
    }
}

impl FromIterator<IpAddr> for AddressSet {
    fn from_iter<T: IntoIterator<Item = IpAddr>>(iter: T) -> Self {
        let mut set = AddressSet::new();
        for ip in iter {
            set.insert(ip);
        }
        set
    }
}

/// Ascending walk over `first..=last` skipping every excluded interval
#[derive(Debug)]
pub struct FreeAddresses<'a> {
    family: IpFamily,
    cursor: Option<u128>,
    last: u128,
    excluded: Vec<&'a IpIntervalSet>,
}

impl<'a> FreeAddresses<'a> {
    /// Walk `first..=last` of `family`, skipping values in any of `excluded`
    pub fn new(family: IpFamily, first: u128, last: u128, excluded: Vec<&'a IpIntervalSet>) -> Self {
        Self {
            family,
            cursor: (first <= last).then_some(first),
            last,
            excluded,
        }
    }

    fn advance_past(&mut self, value: u128) {
        self.cursor = if value >= self.last { None } else { Some(value + 1) };
    }
}

impl Iterator for FreeAddresses<'_> {
    type Item = IpAddr;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let value = self.cursor?;
            let blocked = self
                .excluded
                .iter()
                .filter_map(|set| set.interval_containing(value))
                .map(|(_, end)| end)
                .max();
            match blocked {
                Some(end) => self.advance_past(end),
                None => {
                    self.advance_past(value);
                    return Some(u128_to_ip(value, self.family));
                }
            }
        }
    }
}
