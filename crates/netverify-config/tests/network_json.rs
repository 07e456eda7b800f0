use netverify_config::{ConfigError, Network, Statement};

type TestResult = Result<(), Box<dyn std::error::Error>>;

const TWO_ROUTERS: &str = r#"{
  "configurations": [
    {
      "hostname": "r2",
      "interfaces": [{"name": "eth0", "address": "10.0.0.2/30"}],
      "bgp": {
        "router_id": "2.2.2.2",
        "neighbors": [{"address": "10.0.0.1/32", "local_as": 65002, "remote_as": 65001,
                       "import_policy": "FROM_R1"}]
      },
      "routing_policies": {
        "FROM_R1": {"name": "FROM_R1", "statements": [
          {"set_local_preference": {"literal": 150}}, "exit_accept"
        ]}
      }
    },
    {
      "hostname": "r1",
      "interfaces": [
        {"name": "eth0", "address": "10.0.0.1/30"},
        {"name": "Loopback0", "address": "1.1.1.1/32"}
      ],
      "bgp": {
        "router_id": "1.1.1.1",
        "neighbors": [{"address": "10.0.0.2/32", "local_as": 65001, "remote_as": 65002}]
      }
    }
  ]
}"#;

#[test]
fn network_loads_and_orders_by_hostname() -> TestResult {
    let network = Network::from_json_str(TWO_ROUTERS)?;
    let names: Vec<&String> = network.configurations().keys().collect();
    assert_eq!(names, vec!["r1", "r2"]);

    let r2 = network.get("r2").ok_or("r2 missing")?;
    let bgp = r2.bgp.as_ref().ok_or("r2 has no bgp")?;
    assert!(!bgp.neighbors[0].is_ibgp());
    let policy = &r2.routing_policies["FROM_R1"];
    assert_eq!(policy.statements.last(), Some(&Statement::ExitAccept));

    let r1 = network.get("r1").ok_or("r1 missing")?;
    assert!(r1.interface("Loopback0").ok_or("no loopback")?.is_loopback());
    Ok(())
}

#[test]
fn network_round_trips_through_json() -> TestResult {
    let network = Network::from_json_str(TWO_ROUTERS)?;
    let text = serde_json::to_string(&network)?;
    assert_eq!(Network::from_json_str(&text)?, network);
    Ok(())
}

#[test]
fn duplicate_hostnames_are_rejected() {
    let text = r#"{"configurations": [{"hostname": "r1"}, {"hostname": "r1"}]}"#;
    match Network::from_json_str(text) {
        Err(ConfigError::Json(e)) => assert!(e.to_string().contains("duplicate")),
        other => panic!("expected duplicate-hostname error, got {other:?}"),
    }
}
