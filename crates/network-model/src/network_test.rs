//! Unit tests for network parsing and network settings

#[cfg(test)]
mod tests {
    use crate::error::NetworkError;
    use crate::network::{default_network_properties, Network};
    use crate::reservation::{InstanceRef, Reservation};
    use crate::spec::{CloudConfig, NetworkSpec, NetworkType};
    use crate::subnet::SubnetOptions;
    use std::sync::Arc;
    use uuid::Uuid;

    const CLOUD_CONFIG: &str = r#"
azs:
  - name: fake-az
  - name: fake-az2
networks:
  - name: default
    type: manual
    subnets:
      - range: 192.168.1.0/24
        gateway: 192.168.1.1
        dns: [8.8.8.8, 1.1.1.1]
        static: [192.168.1.10 - 192.168.1.20]
        az: fake-az
        cloud_properties: {name: net-1}
      - range: 192.168.2.0/24
        gateway: 192.168.2.1
        az: fake-az2
  - name: foo
    type: dynamic
    subnets:
      - az: fake-az
        cloud_properties: {subnet_key: subnet_value}
      - az: fake-az2
        dns: [9.9.9.9]
        cloud_properties: {subnet_key: subnet_value2}
  - name: floating
    type: vip
    cloud_properties: {security_group: public}
    subnets:
      - static: [34.1.1.1 - 34.1.1.5]
"#;

    fn networks() -> Vec<Arc<Network>> {
        let config = CloudConfig::from_yaml(CLOUD_CONFIG).expect("valid config");
        Network::parse_all(&config, &SubnetOptions::default()).expect("valid networks")
    }

    fn instance(az: Option<&str>) -> InstanceRef {
        InstanceRef::new(Uuid::new_v4(), "web/0", az.map(ToString::to_string))
    }

    fn parse_one(yaml: &str, azs: &[&str]) -> Result<Network, NetworkError> {
        let spec: NetworkSpec = serde_yaml::from_str(yaml).expect("valid yaml");
        let azs: Vec<String> = azs.iter().map(ToString::to_string).collect();
        Network::parse(&spec, &azs, &SubnetOptions::default())
    }

    #[test]
    fn test_parse_all_networks() {
        let networks = networks();
        assert_eq!(networks.len(), 3);
        assert_eq!(networks[0].network_type(), NetworkType::Manual);
        assert_eq!(networks[0].manual_subnets().len(), 2);
        assert_eq!(networks[1].network_type(), NetworkType::Dynamic);
        assert!(networks[1].manual_subnets().is_empty());
        assert_eq!(networks[2].network_type(), NetworkType::Vip);
    }

    #[test]
    fn test_duplicate_network_names() {
        let config = CloudConfig {
            networks: vec![
                NetworkSpec {
                    name: "a".to_string(),
                    network_type: NetworkType::Vip,
                    ..Default::default()
                },
                NetworkSpec {
                    name: "a".to_string(),
                    network_type: NetworkType::Dynamic,
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let result = Network::parse_all(&config, &SubnetOptions::default());
        assert_eq!(result.err(), Some(NetworkError::DuplicateNetwork("a".to_string())));
    }

    #[test]
    fn test_manual_network_requires_subnets() {
        let result = parse_one("name: bare\ntype: manual", &[]);
        assert!(matches!(result, Err(NetworkError::MissingField { field, .. }) if field == "subnets"));
    }

    #[test]
    fn test_overlapping_subnets_in_one_network() {
        let yaml = r"
name: overlap
subnets:
  - range: 10.0.0.0/24
    gateway: 10.0.0.1
  - range: 10.0.0.128/25
    gateway: 10.0.0.129
";
        assert_eq!(
            parse_one(yaml, &[]).err(),
            Some(NetworkError::OverlappingSubnets("overlap".to_string()))
        );
    }

    #[test]
    fn test_subnet_containing() {
        let networks = networks();
        let subnet = networks[0]
            .subnet_containing(&"192.168.2.40".parse().expect("ip"))
            .expect("second subnet");
        assert_eq!(subnet.range().to_string(), "192.168.2.0/24");
        assert!(networks[0].subnet_containing(&"10.0.0.1".parse().expect("ip")).is_none());
    }

    #[test]
    fn test_network_level_az_is_rejected() {
        let err = parse_one("name: foo\ntype: dynamic\naz: foo-zone", &["foo-zone"]).expect_err("az");
        assert_eq!(err.to_string(), "Network 'foo' must not specify 'az'.");

        let err = parse_one("name: foo\ntype: dynamic\nazs: [foo-zone]", &["foo-zone"]).expect_err("azs");
        assert_eq!(err.to_string(), "Network 'foo' must not specify 'azs'.");
    }

    #[test]
    fn test_dynamic_top_level_dns_with_subnets() {
        let yaml = "name: foo\ntype: dynamic\ndns: [1.2.3.4]\nsubnets:\n  - dns: [9.8.7.6]\n";
        let err = parse_one(yaml, &[]).expect_err("dns at both levels");
        assert_eq!(
            err.to_string(),
            "Network 'foo' must not specify 'dns' when also specifying 'subnets'. \
             Instead, 'dns' should be specified on subnet entries."
        );
    }

    #[test]
    fn test_dynamic_subnet_unknown_az() {
        let yaml = "name: foo\ntype: dynamic\nsubnets:\n  - azs: [fake-az, say-what]\n";
        let err = parse_one(yaml, &["fake-az"]).expect_err("unknown az");
        assert_eq!(
            err.to_string(),
            "Network 'foo' refers to an unknown availability zone 'say-what'"
        );
    }

    #[test]
    fn test_manual_network_settings() {
        let networks = networks();
        let mut reservation = Reservation::new_dynamic(instance(Some("fake-az")), Arc::clone(&networks[0]));
        reservation.resolve_ip("192.168.1.30".parse().expect("ip"));

        let settings = networks[0]
            .network_settings(&reservation, &["gateway".to_string(), "dns".to_string()], Some("fake-az"))
            .expect("settings");
        assert_eq!(settings.network_type, None);
        assert_eq!(settings.ip.as_deref(), Some("192.168.1.30"));
        assert_eq!(settings.netmask.as_deref(), Some("255.255.255.0"));
        assert_eq!(settings.gateway.as_deref(), Some("192.168.1.1"));
        assert_eq!(settings.dns, Some(vec!["8.8.8.8".to_string(), "1.1.1.1".to_string()]));
        assert_eq!(settings.default, Some(vec!["dns".to_string(), "gateway".to_string()]));
        assert_eq!(settings.cloud_properties.get("name"), Some(&serde_json::json!("net-1")));
    }

    #[test]
    fn test_manual_network_settings_without_defaults() {
        let networks = networks();
        let mut reservation = Reservation::new_dynamic(instance(None), Arc::clone(&networks[0]));
        reservation.resolve_ip("192.168.2.30".parse().expect("ip"));

        let settings = networks[0].network_settings(&reservation, &[], None).expect("settings");
        assert_eq!(settings.default, None);
        assert_eq!(settings.dns, None);

        let json = serde_json::to_value(&settings).expect("serializable");
        assert!(json.get("default").is_none());
        assert_eq!(json["gateway"], "192.168.2.1");
    }

    #[test]
    fn test_manual_network_settings_outside_network() {
        let networks = networks();
        let mut reservation = Reservation::new_dynamic(instance(None), Arc::clone(&networks[0]));
        reservation.resolve_ip("172.16.0.5".parse().expect("ip"));
        assert!(matches!(
            networks[0].network_settings(&reservation, &[], None),
            Err(NetworkError::IpOutsideNetwork { .. })
        ));
    }

    #[test]
    fn test_dynamic_network_settings_defaults() {
        let network = Arc::new(parse_one("name: foo\ntype: dynamic\ncloud_properties: {foz: baz}", &[]).expect("legacy form"));
        let reservation = Reservation::new_dynamic(instance(None), Arc::clone(&network));

        let settings = network
            .network_settings(&reservation, &default_network_properties(), None)
            .expect("settings");
        assert_eq!(settings.network_type.as_deref(), Some("dynamic"));
        assert_eq!(settings.cloud_properties.get("foz"), Some(&serde_json::json!("baz")));
        assert_eq!(settings.default, Some(vec!["dns".to_string(), "gateway".to_string()]));

        let settings = network.network_settings(&reservation, &[], None).expect("settings");
        assert_eq!(settings.default, Some(vec![]), "Dynamic settings always carry defaults");
    }

    #[test]
    fn test_dynamic_network_settings_by_az() {
        let networks = networks();
        let reservation = Reservation::new_dynamic(instance(Some("fake-az2")), Arc::clone(&networks[1]));

        let settings = networks[1]
            .network_settings(&reservation, &[], Some("fake-az2"))
            .expect("settings");
        assert_eq!(settings.cloud_properties.get("subnet_key"), Some(&serde_json::json!("subnet_value2")));
        assert_eq!(settings.dns, Some(vec!["9.9.9.9".to_string()]));

        let settings = networks[1].network_settings(&reservation, &[], None).expect("settings");
        assert_eq!(
            settings.cloud_properties.get("subnet_key"),
            Some(&serde_json::json!("subnet_value")),
            "First subnet is used without an availability zone"
        );
    }

    #[test]
    fn test_dynamic_network_settings_unknown_az() {
        let networks = networks();
        let reservation = Reservation::new_dynamic(instance(None), Arc::clone(&networks[1]));
        let err = networks[1]
            .network_settings(&reservation, &[], Some("fake-unknown-az"))
            .expect_err("no subnet");
        assert_eq!(
            err.to_string(),
            "Network 'foo' has no matching subnet for availability zone 'fake-unknown-az'"
        );
    }

    #[test]
    fn test_dynamic_network_settings_rejects_static() {
        let networks = networks();
        let reservation = Reservation::new_static(instance(None), Arc::clone(&networks[1]), "10.0.0.1".parse().expect("ip"));
        assert!(matches!(
            networks[1].network_settings(&reservation, &[], None),
            Err(NetworkError::UnsupportedReservation { .. })
        ));
    }

    #[test]
    fn test_vip_network_settings() {
        let networks = networks();
        let reservation = Reservation::new_static(instance(None), Arc::clone(&networks[2]), "34.1.1.3".parse().expect("ip"));

        let settings = networks[2]
            .network_settings(&reservation, &default_network_properties(), None)
            .expect("settings");
        assert_eq!(settings.network_type.as_deref(), Some("vip"));
        assert_eq!(settings.ip.as_deref(), Some("34.1.1.3"));
        assert_eq!(settings.cloud_properties.get("security_group"), Some(&serde_json::json!("public")));
        assert_eq!(settings.default, None);
        assert_eq!(settings.netmask, None);
    }

    #[test]
    fn test_has_azs() {
        let networks = networks();
        let dynamic = &networks[1];

        assert!(dynamic.has_azs(Some(&[])));
        assert!(dynamic.has_azs(Some(&["fake-az".to_string()])));
        assert!(dynamic.has_azs(Some(&["fake-az".to_string(), "fake-az2".to_string()])));
        assert!(!dynamic.has_azs(Some(&["fake-az".to_string(), "zone_3".to_string()])));
        assert!(!dynamic.has_azs(None), "Zoned subnets need a zoned instance group");
        assert!(networks[2].has_azs(None), "Vip networks ignore zones");
    }
}
