//! Property checks over a network.
//!
//! Every check builds a graph and one or two encoders over a shared
//! context, instruments the relation it needs, asserts that the property
//! fails somewhere and asks the solver for a witness. An unsatisfiable
//! query means the property holds.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use netverify_config::{Network, Prefix};
use netverify_smt::terms::SmtTerm;
use tracing::{info, warn};

use crate::context::EncodingContext;
use crate::encoder::Encoder;
use crate::error::{EncodeError, EncodeResult};
use crate::graph::{EdgeId, Graph};
use crate::logical_graph::LogicalEdge;
use crate::properties::{all_equal, PropertyAdder};
use crate::protocol::Protocol;
use crate::query::QueryConfig;
use crate::result::VerificationResult;
use crate::slice::EncoderSlice;
use crate::symbolic::SymbolicRecord;

/// Per-source property terms produced by an instrumentation step.
type Instrumented = BTreeMap<String, SmtTerm>;

/// Physical edges whose router and interface match the final-location
/// patterns of the query.
fn destination_edges(graph: &Graph, query: &QueryConfig) -> EncodeResult<BTreeSet<EdgeId>> {
    let nodes = query.final_nodes()?;
    let ifaces = query.final_ifaces()?;
    Ok(graph
        .edges()
        .iter()
        .filter(|e| !e.is_abstract && !e.is_null)
        .filter(|e| nodes.matches(&e.router) && ifaces.matches(&e.start.name))
        .map(|e| e.id)
        .collect())
}

fn source_routers(graph: &Graph, query: &QueryConfig) -> EncodeResult<BTreeSet<String>> {
    let pattern = query.ingress_nodes()?;
    Ok(graph
        .routers()
        .filter(|r| pattern.matches(r))
        .cloned()
        .collect())
}

/// Without explicit destination addresses, restrict the packet to the
/// addresses behind the destination edges. Any external destination
/// leaves the destination unconstrained.
fn infer_destination_header_space(graph: &Graph, dests: &BTreeSet<EdgeId>, query: &QueryConfig) -> QueryConfig {
    let mut hs = query.header_space.clone();
    if !hs.dst_ips.is_empty() {
        return query.clone();
    }
    for &id in dests {
        let ge = graph.edge(id);
        if graph.is_external(ge) {
            hs.dst_ips.clear();
            hs.not_dst_ips.clear();
            break;
        }
        let added = if ge.peer.is_none() {
            ge.start_prefix()
        } else {
            ge.start_ip().map(Prefix::host)
        };
        hs.dst_ips.extend(added);
    }
    query.with_header_space(hs)
}

/// Edges allowed to fail: those running between a router matching the
/// first failure pattern and one matching the second, in either order.
/// Peerless edges match the second pattern against the empty name.
fn fail_link_set(graph: &Graph, query: &QueryConfig) -> EncodeResult<BTreeSet<EdgeId>> {
    let first = query.fail_node1()?;
    let second = query.fail_node2()?;
    Ok(graph
        .edges()
        .iter()
        .filter(|e| !e.is_abstract)
        .filter(|e| {
            let peer = e.peer.as_deref().unwrap_or("");
            (first.matches(&e.router) && second.matches(peer))
                || (second.matches(&e.router) && first.matches(peer))
        })
        .map(|e| e.id)
        .collect())
}

fn fail_node_set(graph: &Graph, query: &QueryConfig) -> EncodeResult<BTreeSet<String>> {
    let pattern = query.fail_nodes_pattern()?;
    Ok(graph
        .routers()
        .filter(|r| pattern.matches(r))
        .cloned()
        .collect())
}

/// Links outside the failure set never fail. A destination edge may only
/// fail for packets it is not responsible for.
fn add_link_failure_constraints(
    ctx: &mut EncodingContext,
    enc: &Encoder,
    dests: &BTreeSet<EdgeId>,
    fail_set: &BTreeSet<EdgeId>,
) {
    let main = enc.main_slice();
    for ge in enc.graph().edges().iter().filter(|e| !e.is_abstract) {
        let failed = enc.failures().failed_variable(ge);
        let not_failed = failed.eq(SmtTerm::int(0));
        if !fail_set.contains(&ge.id) {
            ctx.add(not_failed);
        } else if dests.contains(&ge.id) {
            if let Some(prefix) = ge.start_prefix() {
                ctx.add(main.relevant_for_prefix(&prefix).implies(not_failed));
            }
        }
    }
}

fn add_node_failure_constraints(ctx: &mut EncodingContext, enc: &Encoder, fail_nodes: &BTreeSet<String>) {
    for (router, var) in enc.failures().nodes() {
        if !fail_nodes.contains(router) {
            ctx.add(var.clone().eq(SmtTerm::int(0)));
        }
    }
}

/// Environment announcements of `enc2` mirror those of `enc1`.
fn relate_environments(enc1: &Encoder, enc2: &Encoder) -> EncodeResult<SmtTerm> {
    let (main1, main2) = (enc1.main_slice(), enc2.main_slice());
    let mut related = Vec::new();
    for (key, &id1) in main1.logical_graph().environment_records() {
        let Some(&id2) = main2.logical_graph().environment_records().get(key) else {
            continue;
        };
        let (r1, r2) = (main1.record(id1), main2.record(id2));
        related.push(main1.equal(Protocol::Connected, r1, r2, None, true)?);
        related.push(r1.permitted.clone().eq(r2.permitted.clone()));
    }
    Ok(SmtTerm::and(related))
}

fn relate_failures(enc1: &Encoder, enc2: &Encoder) -> SmtTerm {
    let graph = enc1.graph();
    SmtTerm::and(
        graph
            .edges()
            .iter()
            .filter(|e| !e.is_abstract)
            .map(|ge| {
                enc1.failures()
                    .failed_variable(ge)
                    .eq(enc2.failures().failed_variable(ge))
            })
            .collect(),
    )
}

fn relate_packets(enc1: &Encoder, enc2: &Encoder) -> SmtTerm {
    enc1.main_slice().packet().mk_equal(enc2.main_slice().packet())
}

/// Shared driver of the location-scoped checks.
fn check_property<F>(network: &Network, query: &QueryConfig, instrument: F) -> EncodeResult<VerificationResult>
where
    F: Fn(&mut EncodingContext, &Encoder, &BTreeSet<String>, &BTreeSet<EdgeId>) -> EncodeResult<Instrumented>,
{
    let graph = Arc::new(Graph::new(network)?);
    let dests = destination_edges(&graph, query)?;
    let sources = source_routers(&graph, query)?;
    if dests.is_empty() {
        return Err(EncodeError::InvalidConfig(
            "no interface matches the destination patterns".into(),
        ));
    }
    if sources.is_empty() {
        return Err(EncodeError::InvalidConfig(
            "no router matches the ingress pattern".into(),
        ));
    }

    let query = Arc::new(infer_destination_header_space(&graph, &dests, query));
    let fail_links = fail_link_set(&graph, &query)?;
    let fail_nodes = fail_node_set(&graph, &query)?;

    let mut ctx = EncodingContext::new();
    let enc = Encoder::new(&mut ctx, graph.clone(), query.clone())?;
    enc.compute_encoding(&mut ctx)?;
    let prop = instrument(&mut ctx, &enc, &sources, &dests)?;

    let mut other = None;
    if query.equivalence {
        let baseline = Arc::new(QueryConfig {
            failures: 0,
            ..(*query).clone()
        });
        let enc2 = Encoder::next(&mut ctx, &enc, graph.clone(), baseline)?;
        enc2.compute_encoding(&mut ctx)?;
        let prop2 = instrument(&mut ctx, &enc2, &sources, &dests)?;

        let same: Vec<SmtTerm> = sources
            .iter()
            .filter_map(|s| Some(prop.get(s)?.clone().eq(prop2.get(s)?.clone())))
            .collect();
        ctx.add(relate_environments(&enc, &enc2)?);
        ctx.add(relate_packets(&enc, &enc2));
        ctx.add(SmtTerm::and(same).not());
        other = Some(enc2);
    } else {
        let holds: Vec<SmtTerm> = sources
            .iter()
            .filter_map(|s| prop.get(s))
            .map(|p| if query.negate { p.clone().not() } else { p.clone() })
            .collect();
        ctx.add(SmtTerm::and(holds).not());
    }

    add_link_failure_constraints(&mut ctx, &enc, &dests, &fail_links);
    add_node_failure_constraints(&mut ctx, &enc, &fail_nodes);

    info!(
        sources = sources.len(),
        destinations = dests.len(),
        equivalence = query.equivalence,
        "checking property"
    );
    enc.verify(&ctx, other.as_ref())
}

/// Every source router can deliver packets to some destination
/// interface. In equivalence mode, reachability under failures must
/// match reachability without them.
pub fn check_reachability(network: &Network, query: &QueryConfig) -> EncodeResult<VerificationResult> {
    check_property(network, query, |ctx, enc, _, dests| {
        Ok(PropertyAdder::new(enc.main_slice()).instrument_reachability(ctx, dests))
    })
}

/// Every source reaches a destination in at most `k` hops.
pub fn check_bounded_length(network: &Network, query: &QueryConfig, k: u32) -> EncodeResult<VerificationResult> {
    let bound = SmtTerm::int(i64::from(k));
    check_property(network, query, move |ctx, enc, _, dests| {
        let lens = PropertyAdder::new(enc.main_slice()).instrument_path_length(ctx, dests);
        Ok(lens
            .into_iter()
            .map(|(r, len)| (r, len.le(bound.clone())))
            .collect())
    })
}

/// All sources are the same number of hops away from the destinations.
pub fn check_equal_length(network: &Network, query: &QueryConfig) -> EncodeResult<VerificationResult> {
    check_property(network, query, |ctx, enc, sources, dests| {
        let lens = PropertyAdder::new(enc.main_slice()).instrument_path_length(ctx, dests);
        let source_lens: Vec<SmtTerm> = sources.iter().filter_map(|s| lens.get(s).cloned()).collect();
        let equal = all_equal(&source_lens);
        Ok(sources.iter().map(|s| (s.clone(), equal.clone())).collect())
    })
}

/// The traffic carried by any two sources differs by at most `threshold`.
pub fn check_load_balance(network: &Network, query: &QueryConfig, threshold: u32) -> EncodeResult<VerificationResult> {
    let k = SmtTerm::int(i64::from(threshold));
    check_property(network, query, move |ctx, enc, sources, dests| {
        let loads = PropertyAdder::new(enc.main_slice()).instrument_load(ctx, dests);
        let mut prop = BTreeMap::new();
        for s in sources {
            let Some(mine) = loads.get(s) else {
                continue;
            };
            let within: Vec<SmtTerm> = sources
                .iter()
                .filter(|o| *o != s)
                .filter_map(|o| loads.get(o))
                .map(|theirs| {
                    SmtTerm::and(vec![
                        mine.clone().sub(theirs.clone()).le(k.clone()),
                        theirs.clone().sub(mine.clone()).le(k.clone()),
                    ])
                })
                .collect();
            prop.insert(s.clone(), SmtTerm::and(within));
        }
        Ok(prop)
    })
}

/// A satisfying data plane for the query, printed as a sample.
pub fn check_forwarding(network: &Network, query: &QueryConfig) -> EncodeResult<VerificationResult> {
    let graph = Arc::new(Graph::new(network)?);
    let query = Arc::new(QueryConfig {
        failures: 0,
        ..query.clone()
    });
    let mut ctx = EncodingContext::new();
    let enc = Encoder::new(&mut ctx, graph, query)?;
    enc.compute_encoding(&mut ctx)?;
    enc.verify(&ctx, None)
}

/// No router inside the network receives traffic and then drops it.
/// Routers with an interface to the outside are not checked.
pub fn check_black_holes(network: &Network, query: &QueryConfig) -> EncodeResult<VerificationResult> {
    let graph = Arc::new(Graph::new(network)?);
    let mut ctx = EncodingContext::new();
    let enc = Encoder::new(&mut ctx, graph.clone(), Arc::new(query.clone()))?;
    enc.compute_encoding(&mut ctx)?;
    let decisions = enc.main_slice().decisions();

    let interior = graph
        .routers()
        .filter(|r| graph.edges_of(r).filter(|e| !e.is_abstract).all(|e| e.end.is_some()));
    let mut some_black_hole = Vec::new();
    for router in interior {
        let does_not_forward = SmtTerm::and(
            graph
                .edges_of(router)
                .filter_map(|e| decisions.data_forwarding(e.id))
                .map(|df| df.clone().not())
                .collect(),
        );
        let forwarded_to = SmtTerm::or(
            graph
                .edges()
                .iter()
                .filter(|e| !e.is_abstract && e.peer.as_deref() == Some(router.as_str()))
                .filter_map(|e| decisions.data_forwarding(e.id).cloned())
                .collect(),
        );
        some_black_hole.push(SmtTerm::and(vec![forwarded_to, does_not_forward]));
    }
    ctx.add(SmtTerm::or(some_black_hole));
    enc.verify(&ctx, None)
}

/// A router that can reach the destinations never picks a next hop that
/// drops the packet or cannot reach them itself.
pub fn check_multipath_consistency(network: &Network, query: &QueryConfig) -> EncodeResult<VerificationResult> {
    if query.negate {
        return Err(EncodeError::InvalidConfig(
            "negation is not supported for multipath consistency".into(),
        ));
    }
    let graph = Arc::new(Graph::new(network)?);
    let dests = destination_edges(&graph, query)?;
    let query = Arc::new(infer_destination_header_space(&graph, &dests, query));

    let mut ctx = EncodingContext::new();
    let enc = Encoder::new(&mut ctx, graph.clone(), query)?;
    enc.compute_encoding(&mut ctx)?;
    let slice = enc.main_slice();
    let reach = PropertyAdder::new(slice).instrument_reachability(&mut ctx, &dests);

    let mut inconsistent = Vec::new();
    for router in graph.routers() {
        let Some(reachable) = reach.get(router) else {
            continue;
        };
        let mut all = Vec::new();
        for ge in graph.edges_of(router).filter(|e| !e.is_abstract) {
            let Some(cf) = slice.decisions().control_forwarding(ge.id) else {
                continue;
            };
            let forwards = slice.forwards_across(ge.id).cloned().unwrap_or_else(SmtTerm::ff);
            let peer_reach = match ge.peer.as_deref() {
                Some(peer) => reach.get(peer).cloned().unwrap_or_else(SmtTerm::ff),
                None => SmtTerm::tt(),
            };
            all.push(cf.clone().implies(SmtTerm::and(vec![forwards, peer_reach])));
        }
        inconsistent.push(reachable.clone().implies(SmtTerm::and(all)).not());
    }
    ctx.add(SmtTerm::or(inconsistent));
    enc.verify(&ctx, None)
}

/// No packet towards a statically routed prefix loops through a router
/// that has static routes.
pub fn check_routing_loop(network: &Network, query: &QueryConfig) -> EncodeResult<VerificationResult> {
    let graph = Arc::new(Graph::new(network)?);
    let mut prefixes = BTreeSet::new();
    let mut routers = Vec::new();
    for (name, conf) in graph.configurations() {
        if !conf.static_routes.is_empty() {
            routers.push(name.clone());
        }
        prefixes.extend(conf.static_routes.iter().map(|sr| sr.network));
    }
    let mut hs = query.header_space.clone();
    hs.dst_ips = prefixes.into_iter().collect();
    let query = Arc::new(query.with_header_space(hs));

    let mut ctx = EncodingContext::new();
    let enc = Encoder::new(&mut ctx, graph, query)?;
    enc.compute_encoding(&mut ctx)?;
    let adder = PropertyAdder::new(enc.main_slice());
    let some_loop: Vec<SmtTerm> = routers
        .iter()
        .map(|r| adder.instrument_loop(&mut ctx, r))
        .collect();
    ctx.add(SmtTerm::or(some_loop));
    enc.verify(&ctx, None)
}

/// The network has a single stable data plane: two copies with the same
/// failures, environment and packet always forward identically.
pub fn check_determinism(network: &Network, query: &QueryConfig) -> EncodeResult<VerificationResult> {
    let graph = Arc::new(Graph::new(network)?);
    let query = Arc::new(query.clone());
    let mut ctx = EncodingContext::new();
    let enc1 = Encoder::new(&mut ctx, graph.clone(), query.clone())?;
    let enc2 = Encoder::next(&mut ctx, &enc1, graph.clone(), query)?;
    enc1.compute_encoding(&mut ctx)?;
    enc2.compute_encoding(&mut ctx)?;

    ctx.add(relate_failures(&enc1, &enc2));
    ctx.add(relate_environments(&enc1, &enc2)?);
    ctx.add(relate_packets(&enc1, &enc2));
    let (d1, d2) = (enc1.main_slice().decisions(), enc2.main_slice().decisions());
    let same: Vec<SmtTerm> = graph
        .edges()
        .iter()
        .filter(|e| !e.is_abstract)
        .filter_map(|e| Some(d1.data_forwarding(e.id)?.clone().eq(d2.data_forwarding(e.id)?.clone())))
        .collect();
    ctx.add(SmtTerm::and(same).not());
    enc1.verify(&ctx, Some(&enc2))
}

fn interface_names(graph: &Graph, router: &str) -> BTreeSet<String> {
    graph
        .edges_of(router)
        .filter(|e| !e.is_abstract)
        .map(|e| e.start.name.clone())
        .collect()
}

/// The logical edge of `router` in `slice` over the interface `iface`
/// with the same protocol and direction as `like`.
fn matching_logical_edge<'a>(
    slice: &'a EncoderSlice,
    router: &str,
    iface: &str,
    like: &LogicalEdge,
) -> Option<&'a LogicalEdge> {
    slice
        .logical_graph()
        .edges_of(router, like.key.proto)
        .iter()
        .find(|le| le.key.edge_type == like.key.edge_type && slice.graph().edge(le.key.edge).start.name == iface)
}

/// Packets destined to a prefix the router originates itself differ for
/// local reasons and are not compared.
fn ignored_destinations(slice: &EncoderSlice, router: &str) -> EncodeResult<SmtTerm> {
    let mut valid = Vec::new();
    for &proto in slice.optimizations().protocols(router) {
        for prefix in slice.graph().originated_networks(router, proto)? {
            valid.push(slice.relevant_for_prefix(&prefix).not());
        }
    }
    Ok(SmtTerm::and(valid))
}

/// Communities present in only one of the two records are forced off.
fn unset_unshared_communities(r1: &SymbolicRecord, r2: &SymbolicRecord) -> SmtTerm {
    let only_one = |a: &SymbolicRecord, b: &SymbolicRecord| -> Vec<SmtTerm> {
        a.communities
            .iter()
            .filter(|(c, _)| !b.communities.contains_key(*c))
            .map(|(_, v)| v.clone().not())
            .collect()
    };
    let mut unset = only_one(r1, r2);
    unset.extend(only_one(r2, r1));
    SmtTerm::and(unset)
}

/// Consecutive routers (by name) matching `router_pattern` behave the
/// same when given the same inputs: with equal announcements and packets
/// on each same-named interface they forward identically and export the
/// same routes. With `strict`, at most one announcement is active and the
/// chosen best routes must match.
///
/// Results are keyed `r1<-->r2`. Pairs with differing interface names
/// are skipped.
pub fn check_local_consistency(
    network: &Network,
    router_pattern: &str,
    strict: bool,
    query: &QueryConfig,
) -> EncodeResult<BTreeMap<String, VerificationResult>> {
    let pattern = crate::query::NamePattern::new(router_pattern, "")?;
    let routers: Vec<&String> = network
        .configurations()
        .keys()
        .filter(|r| pattern.matches(r))
        .collect();
    let query = Arc::new(QueryConfig {
        failures: 0,
        no_environment: false,
        ..query.clone()
    });

    let mut results = BTreeMap::new();
    for pair in routers.windows(2) {
        let (r1, r2) = (pair[0].as_str(), pair[1].as_str());
        let g1 = Arc::new(Graph::restricted(network, &BTreeSet::from([r1.to_string()]))?);
        let g2 = Arc::new(Graph::restricted(network, &BTreeSet::from([r2.to_string()]))?);
        if interface_names(&g1, r1) != interface_names(&g2, r2) {
            warn!(r1, r2, "routers have different interfaces; skipping pair");
            continue;
        }

        let mut ctx = EncodingContext::new();
        let e1 = Encoder::new(&mut ctx, g1.clone(), query.clone())?;
        e1.compute_encoding(&mut ctx)?;
        let e2 = Encoder::next(&mut ctx, &e1, g2.clone(), query.clone())?;
        e2.compute_encoding(&mut ctx)?;
        let (s1, s2) = (e1.main_slice(), e2.main_slice());

        let mut equal_envs = Vec::new();
        let mut equal_outputs = Vec::new();
        let mut env_records = Vec::new();
        for &proto in s1.optimizations().protocols(r1) {
            for le1 in s1.logical_graph().edges_of(r1, proto) {
                let iface = &g1.edge(le1.key.edge).start.name;
                let Some(le2) = matching_logical_edge(s2, r2, iface, le1) else {
                    continue;
                };
                if !le1.key.is_import() {
                    equal_outputs.push(s1.equal(proto, s1.record(le1.record), s2.record(le2.record), Some(le1), false)?);
                    continue;
                }

                let acl1 = s1.inbound_acl(le1.key.edge).cloned().unwrap_or_else(SmtTerm::tt);
                let acl2 = s2.inbound_acl(le2.key.edge).cloned().unwrap_or_else(SmtTerm::tt);
                equal_envs.push(acl1.eq(acl2));

                let env1 = s1.logical_graph().environment_records().get(&le1.key);
                let env2 = s2.logical_graph().environment_records().get(&le2.key);
                match (env1, env2) {
                    (Some(&id1), Some(&id2)) => {
                        let (v1, v2) = (s1.record(id1), s2.record(id2));
                        equal_envs.push(v1.permitted.clone().eq(v2.permitted.clone()));
                        equal_envs.push(unset_unshared_communities(v1, v2));
                        equal_envs.push(s1.equal(proto, v1, v2, Some(le1), true)?);
                        env_records.push(v1.permitted.clone());
                    }
                    (None, None) => {}
                    _ => {
                        return Err(EncodeError::InvalidConfig(format!(
                            "only one of {r1} and {r2} peers externally on {iface}"
                        )));
                    }
                }
            }
        }

        if strict {
            for (i, p1) in env_records.iter().enumerate() {
                for p2 in env_records.iter().skip(i + 1) {
                    ctx.add(p1.clone().implies(p2.clone().not()));
                }
            }
        }

        let assumptions = SmtTerm::and(vec![
            SmtTerm::and(equal_envs),
            relate_packets(&e1, &e2),
            ignored_destinations(s1, r1)?,
            ignored_destinations(s2, r2)?,
        ]);

        let required = if strict {
            fn best<'s>(s: &'s EncoderSlice, r: &str) -> Option<&'s SymbolicRecord> {
                s.decisions().best_neighbor(r).map(|id| s.record(id))
            }
            match (best(s1, r1), best(s2, r2)) {
                (Some(b1), Some(b2)) => s2.equal(Protocol::Connected, b1, b2, None, true)?,
                _ => SmtTerm::tt(),
            }
        } else {
            let by_name: BTreeMap<&str, EdgeId> = g2
                .edges_of(r2)
                .filter(|e| !e.is_abstract)
                .map(|e| (e.start.name.as_str(), e.id))
                .collect();
            let mut same = Vec::new();
            for ge1 in g1.edges_of(r1).filter(|e| !e.is_abstract) {
                let Some(&id2) = by_name.get(ge1.start.name.as_str()) else {
                    continue;
                };
                if let (Some(d1), Some(d2)) =
                    (s1.decisions().data_forwarding(ge1.id), s2.decisions().data_forwarding(id2))
                {
                    same.push(d1.clone().eq(d2.clone()));
                }
            }
            same.extend(equal_outputs);
            SmtTerm::and(same)
        };

        ctx.add(assumptions);
        ctx.add(required.not());
        let result = e2.verify(&ctx, Some(&e1))?;
        results.insert(format!("{r1}<-->{r2}"), result);
    }
    Ok(results)
}
