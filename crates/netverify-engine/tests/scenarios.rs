mod common;

use common::*;
use netverify_config::{BgpProcess, HeaderSpace, Network};
use netverify_engine::{
    check_black_holes, check_bounded_length, check_determinism, check_equal_length,
    check_forwarding, check_load_balance, check_local_consistency, check_multipath_consistency,
    check_reachability, check_routing_loop, EncodeError, QueryConfig,
};

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn towards(node: &str, iface: &str, failures: u32) -> QueryConfig {
    QueryConfig {
        failures,
        final_node_regex: node.to_string(),
        final_iface_regex: iface.to_string(),
        ..QueryConfig::default()
    }
}

#[test]
fn connected_peer_is_reachable_without_failures() -> TestResult {
    let network = two_routers()?;
    let result = check_reachability(&network, &towards("b", "to-a", 0))?;
    assert!(result.verified, "unexpected counterexample:\n{result}");
    assert!(result.counterexample.is_none());
    assert_eq!(result.stats.routers, 2);
    Ok(())
}

#[test]
fn one_failure_cuts_the_only_link() -> TestResult {
    let network = two_routers()?;
    let result = check_reachability(&network, &towards("b", "to-a", 1))?;
    assert!(!result.verified);
    let cex = result.counterexample.ok_or("missing counterexample")?;
    assert!(cex.failures.contains("link(a,b)"), "failures: {:?}", cex.failures);
    assert!(cex.packet.contains_key("dstIp"));
    Ok(())
}

fn between(ingress: &str, node: &str, iface: &str) -> QueryConfig {
    QueryConfig {
        ingress_node_regex: ingress.to_string(),
        ..towards(node, iface, 0)
    }
}

#[test]
fn source_without_a_route_cannot_reach_the_lan() -> TestResult {
    let result = check_reachability(&two_routers()?, &between("a", "b", "lan"))?;
    assert!(!result.verified);
    let cex = result.counterexample.ok_or("missing counterexample")?;
    let dst = cex.packet.get("dstIp").ok_or("missing destination")?;
    assert!(dst.starts_with("192.168.0."), "dstIp {dst}");
    assert!(
        !cex.forwarding.iter().any(|f| f.starts_with("a,")),
        "a forwards without a route: {:?}",
        cex.forwarding
    );
    Ok(())
}

#[test]
fn negated_reachability_flips_the_verdict() -> TestResult {
    let query = QueryConfig {
        negate: true,
        ..between("a", "b", "lan")
    };
    let unrouted = check_reachability(&two_routers()?, &query)?;
    assert!(unrouted.verified, "unexpected counterexample:\n{unrouted}");
    let routed = check_reachability(&hub()?, &query)?;
    assert!(!routed.verified);
    Ok(())
}

#[test]
fn static_route_reaches_the_hub_lan() -> TestResult {
    let result = check_reachability(&hub()?, &between("a|c", "b", "lan"))?;
    assert!(result.verified, "unexpected counterexample:\n{result}");
    Ok(())
}

#[test]
fn forwarding_sample_exists_for_an_unrouted_destination() -> TestResult {
    let query = QueryConfig {
        header_space: HeaderSpace {
            dst_ips: vec!["8.8.8.8/32".parse()?],
            ..HeaderSpace::default()
        },
        ..QueryConfig::default()
    };
    let result = check_forwarding(&two_routers()?, &query)?;
    let cex = result.counterexample.ok_or("forwarding always yields a sample")?;
    assert_eq!(cex.packet.get("dstIp").map(String::as_str), Some("8.8.8.8"));
    assert!(cex.forwarding.is_empty(), "forwarding: {:?}", cex.forwarding);
    Ok(())
}

#[test]
fn one_hop_spokes_respect_a_bound_of_one() -> TestResult {
    let network = hub()?;
    let query = between("a|c", "b", "lan");
    let tight = check_bounded_length(&network, &query, 0)?;
    assert!(!tight.verified);
    assert!(tight.counterexample.is_some());
    let loose = check_bounded_length(&network, &query, 1)?;
    assert!(loose.verified, "unexpected counterexample:\n{loose}");
    Ok(())
}

#[test]
fn spokes_are_equally_far_but_the_hub_is_not() -> TestResult {
    let network = hub()?;
    let spokes = check_equal_length(&network, &between("a|c", "b", "lan"))?;
    assert!(spokes.verified, "unexpected counterexample:\n{spokes}");
    let mixed = check_equal_length(&network, &between(".*", "b", "lan"))?;
    assert!(!mixed.verified);
    Ok(())
}

#[test]
fn parallel_links_double_the_load_of_the_sender() -> TestResult {
    let network = parallel_links()?;
    let query = between(".*", "b", "lan");
    let strict = check_load_balance(&network, &query, 0)?;
    assert!(!strict.verified);
    let relaxed = check_load_balance(&network, &query, 1)?;
    assert!(relaxed.verified, "unexpected counterexample:\n{relaxed}");
    Ok(())
}

#[test]
fn undefined_common_export_policy_is_an_error() -> TestResult {
    let mut a = router("a", &[("to-b", "10.0.0.1/30")])?;
    a.bgp = Some(BgpProcess {
        router_id: "10.0.0.1".parse()?,
        neighbors: Vec::new(),
        multipath_ebgp: false,
        multipath_ibgp: false,
        network_list: None,
        common_export_policy: Some("MISSING".into()),
    });
    let b = router("b", &[("to-a", "10.0.0.2/30")])?;
    let result = check_forwarding(&Network::new(vec![a, b])?, &QueryConfig::default());
    assert!(matches!(result, Err(EncodeError::InvalidConfig(_))), "{result:?}");
    Ok(())
}

#[test]
fn forwarding_sample_has_no_failures() -> TestResult {
    let network = two_routers()?;
    let result = check_forwarding(&network, &towards(".*", ".*", 3))?;
    let cex = result.counterexample.ok_or("forwarding always yields a sample")?;
    assert!(cex.failures.is_empty());
    Ok(())
}

#[test]
fn full_model_lists_solver_variables() -> TestResult {
    let network = two_routers()?;
    let query = QueryConfig {
        full_model: true,
        ..QueryConfig::default()
    };
    let cex = check_forwarding(&network, &query)?
        .counterexample
        .ok_or("missing sample")?;
    assert!(!cex.model.is_empty());
    assert!(cex.model.keys().any(|k| k.contains("SLICE-MAIN_")));
    Ok(())
}

#[test]
fn dropped_traffic_in_the_core_is_a_black_hole() -> TestResult {
    let result = check_black_holes(&dead_end()?, &QueryConfig::default())?;
    assert!(!result.verified);
    Ok(())
}

#[test]
fn filtered_parallel_path_breaks_multipath_consistency() -> TestResult {
    let network = parallel_links_one_filtered()?;
    let result = check_multipath_consistency(&network, &towards("b", "lan", 0))?;
    assert!(!result.verified);
    let cex = result.counterexample.ok_or("missing counterexample")?;
    let dst = cex.packet.get("dstIp").ok_or("missing destination")?;
    assert!(dst.starts_with("192.168.0."), "dstIp {dst}");
    Ok(())
}

#[test]
fn multipath_consistency_cannot_be_negated() -> TestResult {
    let query = QueryConfig {
        negate: true,
        ..towards("b", "lan", 0)
    };
    let err = check_multipath_consistency(&parallel_links_one_filtered()?, &query);
    assert!(matches!(err, Err(EncodeError::InvalidConfig(_))));
    Ok(())
}

#[test]
fn static_routes_pointing_at_each_other_loop() -> TestResult {
    let result = check_routing_loop(&static_loop()?, &QueryConfig::default())?;
    assert!(!result.verified);
    let cex = result.counterexample.ok_or("missing counterexample")?;
    let dst = cex.packet.get("dstIp").ok_or("missing destination")?;
    assert!(dst.starts_with("172.16."), "dstIp {dst}");
    Ok(())
}

#[test]
fn static_chain_without_a_loop_is_verified() -> TestResult {
    let result = check_routing_loop(&dead_end()?, &QueryConfig::default())?;
    assert!(result.verified, "unexpected counterexample:\n{result}");
    Ok(())
}

#[test]
fn connected_only_network_is_deterministic() -> TestResult {
    let result = check_determinism(&two_routers()?, &QueryConfig::default())?;
    assert!(result.verified, "unexpected counterexample:\n{result}");
    Ok(())
}

#[test]
fn minimized_counterexample_is_still_a_violation() -> TestResult {
    let query = QueryConfig {
        minimize: true,
        ..towards("b", "to-a", 1)
    };
    let result = check_reachability(&two_routers()?, &query)?;
    assert!(!result.verified);
    assert!(result.counterexample.is_some());
    Ok(())
}

#[test]
fn routers_with_different_static_routes_are_not_locally_consistent() -> TestResult {
    let mut r1 = router("r1", &[("lan", "10.1.0.1/24")])?;
    r1.static_routes.push(static_route("172.16.0.0/16", "lan")?);
    let r2 = router("r2", &[("lan", "10.2.0.1/24")])?;
    let network = Network::new(vec![r1, r2])?;

    let results = check_local_consistency(&network, "r.*", false, &QueryConfig::default())?;
    let pair = results.get("r1<-->r2").ok_or("missing pair")?;
    assert!(!pair.verified);
    Ok(())
}

#[test]
fn strict_local_consistency_compares_best_routes() -> TestResult {
    let mut r1 = router("r1", &[("lan", "10.1.0.1/24")])?;
    r1.static_routes.push(static_route("172.16.0.0/16", "lan")?);
    let r2 = router("r2", &[("lan", "10.2.0.1/24")])?;
    let network = Network::new(vec![r1, r2])?;

    let results = check_local_consistency(&network, "r.*", true, &QueryConfig::default())?;
    let pair = results.get("r1<-->r2").ok_or("missing pair")?;
    assert!(!pair.verified);
    Ok(())
}

#[test]
fn routers_with_different_interfaces_are_skipped() -> TestResult {
    let r1 = router("r1", &[("lan", "10.1.0.1/24")])?;
    let r2 = router("r2", &[("wan", "10.2.0.1/24")])?;
    let network = Network::new(vec![r1, r2])?;

    let results = check_local_consistency(&network, "r.*", true, &QueryConfig::default())?;
    assert!(results.is_empty());
    Ok(())
}
