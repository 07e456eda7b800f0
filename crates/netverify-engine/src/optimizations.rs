//! Per-slice optimization advisor.
//!
//! Decides which protocols each router needs in a slice, which record
//! fields can be left out, and where records can be shared. Every decision
//! errs on the side of keeping state: dropping a field is only done when no
//! policy in the network could make it matter.

use std::collections::{BTreeMap, BTreeSet};

use netverify_config::{BooleanExpr, Configuration, GeneratedRoute, HeaderSpace, Prefix, Statement};
use tracing::debug;

use crate::ast::any_policy_statement;
use crate::error::EncodeResult;
use crate::graph::{EdgeId, Graph};
use crate::protocol::Protocol;
use crate::query::QueryConfig;

/// True when `p` may contain a destination address of `hs`.
pub(crate) fn relevant_prefix(hs: &HeaderSpace, p: &Prefix) -> bool {
    hs.dst_ips.is_empty() || hs.dst_ips.iter().any(|d| d.overlaps(p))
}

#[derive(Debug, Clone, Default)]
pub struct Optimizations {
    protocols: BTreeMap<String, Vec<Protocol>>,
    relevant_aggregates: BTreeMap<String, Vec<GeneratedRoute>>,
    suppressed_aggregates: BTreeMap<String, BTreeSet<Prefix>>,
    single_protocol: BTreeSet<String>,
    single_export: BTreeMap<(String, Protocol), bool>,
    combine_import_export: BTreeMap<(String, Protocol), BTreeSet<EdgeId>>,
    need_bgp_internal: BTreeSet<String>,
    need_router_id: BTreeSet<String>,
    keep_local_pref: bool,
    keep_admin_dist: bool,
    keep_med: bool,
    keep_ospf_type: bool,
    need_originator_ids: bool,
    model_igp: bool,
}

impl Optimizations {
    pub fn compute(
        graph: &Graph,
        query: &QueryConfig,
        header_space: &HeaderSpace,
        is_main_slice: bool,
    ) -> EncodeResult<Self> {
        let toggles = query.optimizations;
        let slicing = toggles.slicing;
        let sets_metric_type =
            any_configured(graph, |s| matches!(s, Statement::SetOspfMetricType(_)));

        let mut opt = Optimizations {
            keep_local_pref: !slicing
                || any_configured(graph, |s| matches!(s, Statement::SetLocalPreference(_))),
            keep_admin_dist: !slicing || sets_metric_type,
            keep_med: !slicing,
            keep_ospf_type: !slicing || sets_metric_type || graph.all_area_ids().len() > 1,
            need_originator_ids: graph.has_route_reflectors(),
            model_igp: query.model_igp,
            ..Optimizations::default()
        };

        for (router, conf) in graph.configurations() {
            let mut protos = Vec::new();
            if conf.ospf.is_some() {
                protos.push(Protocol::Ospf);
            }
            if conf.bgp.is_some() && is_main_slice {
                protos.push(Protocol::Bgp);
            }
            if !slicing || has_relevant_origin(graph, header_space, router, Protocol::Connected)? {
                protos.push(Protocol::Connected);
            }
            let model_static = if slicing {
                has_relevant_origin(graph, header_space, router, Protocol::Static)?
            } else {
                !conf.static_routes.is_empty()
            };
            if model_static {
                protos.push(Protocol::Static);
            }
            if protos.len() == 1 {
                opt.single_protocol.insert(router.clone());
            }
            opt.protocols.insert(router.clone(), protos);

            opt.relevant_aggregates.insert(
                router.clone(),
                conf.generated_routes
                    .iter()
                    .filter(|gr| relevant_prefix(header_space, &gr.network))
                    .cloned()
                    .collect(),
            );
            opt.suppressed_aggregates.insert(
                router.clone(),
                conf.generated_routes
                    .iter()
                    .filter(|gr| gr.summary_only)
                    .map(|gr| gr.network)
                    .collect(),
            );
        }

        for edge in graph.edges() {
            if graph.ibgp_neighbor(edge.id).is_some() {
                opt.need_bgp_internal.insert(edge.router.clone());
            }
        }

        opt.compute_router_ids(graph);
        opt.compute_single_export(graph, query);
        opt.compute_combined_import_export(graph, query);

        debug!(
            main = is_main_slice,
            keep_local_pref = opt.keep_local_pref,
            keep_admin_dist = opt.keep_admin_dist,
            keep_ospf_type = opt.keep_ospf_type,
            single_protocol = opt.single_protocol.len(),
            "computed optimizations"
        );
        Ok(opt)
    }

    /// Without multipath, BGP breaks ties on router id.
    fn compute_router_ids(&mut self, graph: &Graph) {
        for (router, conf) in graph.configurations() {
            let uses_ibgp = graph
                .edges_of(router)
                .any(|e| graph.ibgp_neighbor(e.id).is_some());
            let uses_ebgp = self.protocols(router).contains(&Protocol::Bgp);
            let (ibgp_multipath, ebgp_multipath) = conf
                .bgp
                .as_ref()
                .map_or((false, false), |b| (b.multipath_ibgp, b.multipath_ebgp));
            if (uses_ibgp && !ibgp_multipath) || (uses_ebgp && !ebgp_multipath) {
                self.need_router_id.insert(router.clone());
            }
        }
    }

    fn compute_single_export(&mut self, graph: &Graph, query: &QueryConfig) {
        let enabled = query.optimizations.export_merge && query.failures == 0;
        for (router, conf) in graph.configurations() {
            for proto in self.protocols(router).to_vec() {
                let ok = match proto {
                    Protocol::Connected | Protocol::Static => true,
                    Protocol::Ospf => {
                        let all_active = graph
                            .edges_of(router)
                            .filter(|e| graph.is_edge_used(proto, e))
                            .all(|e| Graph::is_interface_active(proto, &e.start));
                        let single_area = graph.area_ids(router).map_or(true, |a| a.len() <= 1);
                        all_active && single_area
                    }
                    Protocol::Bgp => conf.bgp.as_ref().map_or(true, |b| {
                        b.neighbors
                            .iter()
                            .all(|n| !n.is_ibgp() && is_default_bgp_export(conf, n.export_policy.as_deref()))
                    }),
                    Protocol::Best => false,
                };
                self.single_export
                    .insert((router.clone(), proto), enabled && ok);
            }
        }
    }

    fn compute_combined_import_export(&mut self, graph: &Graph, query: &QueryConfig) {
        let enabled = query.optimizations.import_export_merge && query.failures == 0;
        for router in graph.routers() {
            for proto in self.protocols(router).to_vec() {
                let mut edges = BTreeSet::new();
                if enabled && proto.is_bgp() {
                    for e in graph.edges_of(router) {
                        let safe_edge = graph.is_edge_used(proto, e) && !e.is_abstract;
                        let same_internal = e.peer.as_ref().map_or(true, |p| {
                            self.need_bgp_internal.contains(router)
                                == self.need_bgp_internal.contains(p)
                        });
                        let pure = matches!(graph.find_import_policy(router, proto, e), Ok(None));
                        if safe_edge && same_internal && pure && self.has_export_record(graph, e.id, proto) {
                            edges.insert(e.id);
                        }
                    }
                }
                self.combine_import_export
                    .insert((router.clone(), proto), edges);
            }
        }
    }

    /// The peer will allocate an export record for the opposite edge.
    fn has_export_record(&self, graph: &Graph, edge: EdgeId, proto: Protocol) -> bool {
        let e = graph.edge(edge);
        let (Some(peer), Some(_)) = (&e.peer, &e.end) else {
            return false;
        };
        if !self.protocols(peer).contains(&proto) {
            return false;
        }
        graph
            .other_end(edge)
            .is_some_and(|other| graph.is_edge_used(proto, other))
    }

    pub fn protocols(&self, router: &str) -> &[Protocol] {
        self.protocols
            .get(router)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn all_protocols(&self) -> &BTreeMap<String, Vec<Protocol>> {
        &self.protocols
    }

    pub fn has_single_protocol(&self, router: &str) -> bool {
        self.single_protocol.contains(router)
    }

    pub fn can_keep_single_export(&self, router: &str, proto: Protocol) -> bool {
        self.single_export
            .get(&(router.to_string(), proto))
            .copied()
            .unwrap_or(false)
    }

    pub fn can_combine_import_export(&self, router: &str, proto: Protocol, edge: EdgeId) -> bool {
        self.combine_import_export
            .get(&(router.to_string(), proto))
            .is_some_and(|es| es.contains(&edge))
    }

    pub fn relevant_aggregates(&self, router: &str) -> &[GeneratedRoute] {
        self.relevant_aggregates
            .get(router)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn is_suppressed_aggregate(&self, router: &str, p: &Prefix) -> bool {
        self.suppressed_aggregates
            .get(router)
            .is_some_and(|s| s.contains(p))
    }

    pub fn need_bgp_internal(&self, router: &str) -> bool {
        self.need_bgp_internal.contains(router)
    }

    pub fn need_router_id(&self, router: &str) -> bool {
        self.need_router_id.contains(router)
    }

    pub fn keep_local_pref(&self) -> bool {
        self.keep_local_pref
    }

    pub fn keep_admin_dist(&self) -> bool {
        self.keep_admin_dist
    }

    pub fn keep_med(&self) -> bool {
        self.keep_med
    }

    pub fn keep_ospf_type(&self) -> bool {
        self.keep_ospf_type
    }

    pub fn need_originator_ids(&self) -> bool {
        self.need_originator_ids
    }

    /// iBGP delivery depends on reachability in the session's slice.
    pub fn model_igp(&self) -> bool {
        self.model_igp
    }
}

fn any_configured(graph: &Graph, pred: impl Fn(&Statement) -> bool) -> bool {
    graph
        .configurations()
        .values()
        .any(|conf| any_policy_statement(conf, &pred))
}

fn has_relevant_origin(graph: &Graph, hs: &HeaderSpace, router: &str, proto: Protocol) -> EncodeResult<bool> {
    Ok(graph
        .originated_networks(router, proto)?
        .iter()
        .any(|p| relevant_prefix(hs, p)))
}

/// An export policy that only defers to the common export policy:
/// `if call(common) then accept else reject`.
fn is_default_bgp_export(conf: &Configuration, policy: Option<&str>) -> bool {
    let Some(name) = policy else {
        return true;
    };
    let Some(pol) = conf.routing_policies.get(name) else {
        return false;
    };
    let common = conf.bgp.as_ref().and_then(|b| b.common_export_policy.as_deref());
    match pol.statements.as_slice() {
        [Statement::If {
            guard: BooleanExpr::CallExpr(called),
            true_statements,
            false_statements,
        }] => {
            matches!(true_statements.as_slice(), [Statement::ExitAccept])
                && matches!(false_statements.as_slice(), [Statement::ExitReject])
                && common == Some(called.as_str())
        }
        _ => false,
    }
}
