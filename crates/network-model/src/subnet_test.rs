//! Unit tests for subnet parsing and pool candidates

#[cfg(test)]
mod tests {
    use crate::error::NetworkError;
    use crate::ip::AddressSet;
    use crate::spec::{AddressList, SubnetSpec};
    use crate::subnet::{ManualSubnet, SubnetOptions, VipSubnet};
    use std::net::IpAddr;

    fn ip(value: &str) -> IpAddr {
        value.parse().expect("test address")
    }

    fn subnet_spec(range: &str, gateway: &str) -> SubnetSpec {
        SubnetSpec {
            range: Some(range.to_string()),
            gateway: Some(gateway.to_string()),
            cloud_properties: Some(serde_json::json!({"foo": "bar"})),
            ..Default::default()
        }
    }

    fn make_subnet(spec: &SubnetSpec) -> Result<ManualSubnet, NetworkError> {
        ManualSubnet::parse("net_a", spec, &[], &SubnetOptions::default())
    }

    fn many(entries: &[&str]) -> Option<AddressList> {
        Some(AddressList::Many(entries.iter().map(ToString::to_string).collect()))
    }

    #[test]
    fn test_parse_subnet() {
        let subnet = make_subnet(&subnet_spec("192.168.0.0/24", "192.168.0.254")).expect("valid subnet");
        assert_eq!(subnet.range().to_string(), "192.168.0.0/24");
        assert_eq!(subnet.netmask(), ip("255.255.255.0"));
        assert_eq!(subnet.gateway(), Some(ip("192.168.0.254")));
        assert_eq!(subnet.dns(), None);
        assert_eq!(subnet.cloud_properties().get("foo"), Some(&serde_json::json!("bar")));
    }

    #[test]
    fn test_parse_ipv6_subnet() {
        let mut spec = subnet_spec("fdab:d85c:118d:8a46::/64", "fdab:d85c:118d:8a46::1");
        spec.reserved = many(&["fdab:d85c:118d:8a46::10-fdab:d85c:118d:8a46::ff", "fdab:d85c:118d:8a46::101"]);
        spec.static_ips = many(&["fdab:d85c:118d:8a46::210-fdab:d85c:118d:8a46::2ff", "fdab:d85c:118d:8a46::301"]);
        spec.dns = Some(vec!["2001:4860:4860::8888".to_string(), "2001:4860:4860::8844".to_string()]);

        let subnet = make_subnet(&spec).expect("valid IPv6 subnet");
        assert_eq!(subnet.netmask(), ip("ffff:ffff:ffff:ffff::"));
        assert_eq!(subnet.dns().map(<[IpAddr]>::len), Some(2));
        assert!(subnet.is_restricted(&ip("fdab:d85c:118d:8a46::20")));
        assert!(subnet.is_static(&ip("fdab:d85c:118d:8a46::301")));
        assert!(!subnet.is_static(&ip("fdab:d85c:118d:8a46::300")));
    }

    #[test]
    fn test_range_is_required() {
        let spec = SubnetSpec {
            gateway: Some("192.168.0.254".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            make_subnet(&spec),
            Err(NetworkError::MissingField { field, .. }) if field == "range"
        ));
    }

    #[test]
    fn test_gateway_is_required_unless_ignored() {
        let spec = SubnetSpec {
            range: Some("192.168.0.0/24".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            make_subnet(&spec),
            Err(NetworkError::MissingField { field, .. }) if field == "gateway"
        ));

        let options = SubnetOptions {
            ignore_missing_gateway: true,
            ..Default::default()
        };
        let subnet = ManualSubnet::parse("net_a", &spec, &[], &options).expect("gateway optional");
        assert_eq!(subnet.gateway(), None);
        assert_eq!(subnet.dynamic_pool_size(), 254);
    }

    #[test]
    fn test_cloud_properties_must_be_hash() {
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.254");
        spec.cloud_properties = Some(serde_json::json!("not a hash"));
        assert!(matches!(make_subnet(&spec), Err(NetworkError::InvalidType { .. })));

        spec.cloud_properties = None;
        let subnet = make_subnet(&spec).expect("defaults to empty");
        assert!(subnet.cloud_properties().is_empty());
    }

    #[test]
    fn test_gateway_validation() {
        let cases = [
            ("192.168.0.254/30", "must be a single IP"),
            ("190.168.0.254", "must be inside the range"),
            ("192.168.0.0", "can't be the network id"),
            ("192.168.0.255", "can't be the broadcast IP"),
        ];
        for (gateway, expected) in cases {
            let err = make_subnet(&subnet_spec("192.168.0.0/24", gateway)).expect_err("invalid gateway");
            assert!(matches!(err, NetworkError::InvalidGateway { .. }));
            assert!(
                err.to_string().contains(expected),
                "Gateway {gateway} should fail with '{expected}', got '{err}'"
            );
        }
    }

    #[test]
    fn test_reserved_out_of_range() {
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.254");
        spec.reserved = Some(AddressList::One("192.167.0.5 - 192.168.0.10".to_string()));
        let err = make_subnet(&spec).expect_err("reserved outside range");
        assert_eq!(
            err.to_string(),
            "Reserved IP '192.167.0.5 - 192.168.0.10' is out of network 'net_a' range"
        );
    }

    #[test]
    fn test_reserved_may_include_gateway_network_and_broadcast() {
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.1");
        spec.reserved = many(&["192.168.0.0", "192.168.0.1", "192.168.0.255"]);
        let subnet = make_subnet(&spec).expect("reserved specials are allowed");
        assert!(subnet.is_restricted(&ip("192.168.0.1")));
        assert_eq!(subnet.dynamic_pool_size(), 253);
    }

    #[test]
    fn test_static_out_of_range() {
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.254");
        spec.static_ips = Some(AddressList::One("192.167.0.5".to_string()));
        let err = make_subnet(&spec).expect_err("static outside range");
        assert_eq!(err.to_string(), "Static IP '192.167.0.5' is out of network 'net_a' range");
    }

    #[test]
    fn test_static_in_reserved_range() {
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.254");
        spec.reserved = Some(AddressList::One("192.168.0.5 - 192.168.0.10".to_string()));
        spec.static_ips = Some(AddressList::One("192.168.0.5".to_string()));
        let err = make_subnet(&spec).expect_err("static inside reserved");
        assert_eq!(err.to_string(), "Static IP '192.168.0.5' is in network 'net_a' reserved range");
    }

    #[test]
    fn test_static_cannot_be_gateway() {
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.254");
        spec.static_ips = Some(AddressList::One("192.168.0.250 - 192.168.0.254".to_string()));
        assert!(matches!(
            make_subnet(&spec),
            Err(NetworkError::StaticIpUnavailable { ip, .. }) if ip == "192.168.0.254"
        ));
    }

    #[test]
    fn test_director_ips_are_restricted() {
        let options = SubnetOptions {
            director_ips: vec![ip("192.168.1.1"), ip("192.168.1.2")],
            ..Default::default()
        };
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.1");
        spec.reserved = many(&["192.168.0.0", "192.168.0.1", "192.168.0.255"]);

        let subnet = ManualSubnet::parse("net_a", &spec, &[], &options).expect("valid subnet");
        assert!(subnet.restricted_ips().contains(&ip("192.168.1.1")));
        assert!(subnet.restricted_ips().contains(&ip("192.168.1.2")));
    }

    #[test]
    fn test_overlaps() {
        let subnet = make_subnet(&subnet_spec("192.168.0.0/24", "192.168.0.254")).expect("subnet");
        let disjoint = make_subnet(&subnet_spec("192.168.1.0/24", "192.168.1.254")).expect("subnet");
        let nested = make_subnet(&subnet_spec("192.168.0.128/28", "192.168.0.129")).expect("subnet");
        let ipv6 = make_subnet(&subnet_spec("::/64", "::1")).expect("subnet");

        assert!(!subnet.overlaps(&disjoint));
        assert!(subnet.overlaps(&nested));
        assert!(!subnet.overlaps(&ipv6), "IPv4 and IPv6 ranges never overlap");
    }

    #[test]
    fn test_is_reservable() {
        let mut spec = subnet_spec("192.168.0.0/24", "192.168.0.254");
        spec.reserved = Some(AddressList::One("192.168.0.50-192.168.0.60".to_string()));
        let subnet = make_subnet(&spec).expect("subnet");

        assert!(subnet.is_reservable(&ip("192.168.0.10")));
        assert!(!subnet.is_reservable(&ip("192.168.0.55")), "Reserved addresses are not reservable");
        assert!(!subnet.is_reservable(&ip("192.168.1.10")), "Outside the range");
        assert!(!subnet.is_reservable(&ip("::1")), "Wrong family");
    }

    #[test]
    fn test_gateway_network_id_and_broadcast_are_restricted() {
        let subnet = make_subnet(&subnet_spec("192.168.0.0/24", "192.168.0.254")).expect("subnet");

        for special in ["192.168.0.0", "192.168.0.254", "192.168.0.255"] {
            assert!(subnet.is_restricted(&ip(special)), "{special} must never be handed out");
            assert!(!subnet.is_reservable(&ip(special)), "{special} is not reservable");
        }
        assert!(!subnet.is_restricted(&ip("192.168.0.1")));
        assert!(subnet.restricted_ips().is_empty(), "Declared restricted set holds only reserved and director IPs");
    }

    #[test]
    fn test_dynamic_candidates_ascending_ipv4() {
        let subnet = make_subnet(&subnet_spec("192.168.1.0/24", "192.168.1.1")).expect("subnet");
        let mut taken = AddressSet::new();
        assert_eq!(subnet.allocate_dynamic_ip(&taken), Some(ip("192.168.1.2")));

        taken.insert(ip("192.168.1.2"));
        assert_eq!(subnet.allocate_dynamic_ip(&taken), Some(ip("192.168.1.3")));

        taken.insert(ip("192.168.1.3"));
        assert_eq!(subnet.allocate_dynamic_ip(&taken), Some(ip("192.168.1.4")));
    }

    #[test]
    fn test_dynamic_candidates_ipv6_skip_reserved() {
        let mut spec = subnet_spec("fdab:d85c:118d:8a46::/125", "fdab:d85c:118d:8a46::1");
        spec.reserved = many(&["fdab:d85c:118d:8a46::2", "fdab:d85c:118d:8a46::4"]);
        let subnet = make_subnet(&spec).expect("subnet");

        let candidates: Vec<IpAddr> = subnet.dynamic_candidates(&AddressSet::new()).collect();
        assert_eq!(
            candidates,
            vec![
                ip("fdab:d85c:118d:8a46::3"),
                ip("fdab:d85c:118d:8a46::5"),
                ip("fdab:d85c:118d:8a46::6"),
            ]
        );
    }

    #[test]
    fn test_dynamic_pool_excludes_static_block() {
        let mut spec = subnet_spec("10.0.0.0/24", "10.0.0.1");
        spec.static_ips = Some(AddressList::One("10.0.0.2 - 10.0.0.11".to_string()));
        let subnet = make_subnet(&spec).expect("subnet");

        assert_eq!(subnet.dynamic_pool_size(), 243);
        assert_eq!(subnet.allocate_dynamic_ip(&AddressSet::new()), Some(ip("10.0.0.12")));
    }

    #[test]
    fn test_exhausted_pool_returns_none() {
        let subnet = make_subnet(&subnet_spec("10.0.0.0/30", "10.0.0.1")).expect("subnet");
        let taken: AddressSet = [ip("10.0.0.2")].into_iter().collect();
        assert_eq!(subnet.allocate_dynamic_ip(&taken), None);
    }

    #[test]
    fn test_serves_az() {
        let declared = vec!["z1".to_string(), "z2".to_string()];
        let mut spec = subnet_spec("10.0.0.0/24", "10.0.0.1");
        spec.azs = Some(vec!["z1".to_string()]);
        let zoned = ManualSubnet::parse("net_a", &spec, &declared, &SubnetOptions::default()).expect("subnet");

        assert!(zoned.serves_az(None));
        assert!(zoned.serves_az(Some("z1")));
        assert!(!zoned.serves_az(Some("z2")));

        let zoneless = make_subnet(&subnet_spec("10.0.1.0/24", "10.0.1.1")).expect("subnet");
        assert!(!zoneless.serves_az(Some("z1")));
    }

    #[test]
    fn test_vip_static_candidates_skip_taken() {
        let spec = SubnetSpec {
            static_ips: many(&["34.1.1.1 - 34.1.1.3", "2001:db8::10"]),
            ..Default::default()
        };
        let subnet = VipSubnet::parse("vip", &spec).expect("vip subnet");
        assert_eq!(subnet.pool_size(), 4);

        let taken: AddressSet = [ip("34.1.1.1"), ip("34.1.1.3")].into_iter().collect();
        let candidates: Vec<IpAddr> = subnet.static_candidates(&taken).collect();
        assert_eq!(candidates, vec![ip("34.1.1.2"), ip("2001:db8::10")]);
    }
}
