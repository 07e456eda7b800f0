//! Well-formedness and transfer constraints of a slice.

use netverify_config::{
    BooleanExpr, Configuration, Interface, Prefix, RoutingProtocol, Statement,
    DEFAULT_REFERENCE_BANDWIDTH,
};
use netverify_smt::terms::SmtTerm;
use tracing::trace;

use crate::context::EncodingContext;
use crate::error::{EncodeError, EncodeResult};
use crate::graph::{BgpSendType, Graph, GraphEdge};
use crate::logical_graph::LogicalEdge;
use crate::protocol::{EdgeType, OspfType, Protocol};
use crate::symbolic::SymbolicRecord;
use crate::transfer::TransferFunction;

use super::selection::DEFAULT_OSPF_TYPE;
use super::{header_space_term, EncoderSlice, SliceEnv};

const MED_ORIGINATED: i64 = 100;

fn safe_eq(x: Option<&SmtTerm>, value: SmtTerm) -> SmtTerm {
    match x {
        Some(x) => x.clone().eq(value),
        None => SmtTerm::tt(),
    }
}

fn interface_active(iface: &Interface, proto: Protocol) -> SmtTerm {
    SmtTerm::bool(Graph::is_interface_active(proto, iface))
}

/// Hop cost: the interface cost for OSPF, one AS hop for BGP.
fn added_cost(conf: &Configuration, proto: Protocol, ge: &GraphEdge) -> i64 {
    if proto.is_ospf() {
        let reference = conf
            .ospf
            .as_ref()
            .map_or(DEFAULT_REFERENCE_BANDWIDTH, |o| o.reference_bandwidth);
        i64::from(ge.start.effective_ospf_cost(reference))
    } else {
        1
    }
}

fn accept_all() -> Vec<Statement> {
    vec![Statement::ExitAccept]
}

impl EncoderSlice {
    /// Packet fields and record attributes stay within their wire widths.
    pub(super) fn add_bound_constraints(&self, ctx: &mut EncodingContext) {
        let p = &self.packet;
        ctx.add(p.dst_port.clone().in_range(0, 1 << 16));
        ctx.add(p.src_port.clone().in_range(0, 1 << 16));
        ctx.add(p.icmp_type.clone().in_range(0, 1 << 8));
        ctx.add(p.ip_protocol.clone().in_range(0, (1 << 8) + 1));
        ctx.add(p.dst_ip.clone().in_range(0, 1 << 32));
        ctx.add(p.src_ip.clone().in_range(0, 1 << 32));
        ctx.add(p.icmp_code.clone().in_range(0, 1 << 4));

        let zero = || SmtTerm::int(0);
        for r in &self.records {
            if let Some(id) = &r.router_id {
                ctx.add(id.clone().ge(zero()));
            }
            if let Some(ad) = &r.admin_dist {
                ctx.add(ad.clone().in_range(0, 1 << 8));
            }
            if let Some(med) = &r.med {
                ctx.add(med.clone().in_range(0, 1 << 32));
            }
            if let Some(lp) = &r.local_pref {
                ctx.add(lp.clone().in_range(0, 1 << 32));
            }
            let metric_bound = if r.is_env() { 1 << 8 } else { 1 << 16 };
            ctx.add(r.metric.clone().in_range(0, metric_bound));
            if let Some(igp) = &r.igp_metric {
                ctx.add(igp.clone().ge(zero()));
            }
            ctx.add(r.prefix_length.clone().in_range(0, 33));
        }
    }

    /// A regex community holds exactly when one of the exact communities it
    /// matches does.
    pub(super) fn add_community_constraints(&self, ctx: &mut EncodingContext) {
        let table = self.graph.communities();
        for r in &self.records {
            for (c, e) in r.communities.iter().filter(|(c, _)| c.is_regex()) {
                let deps = table
                    .dependencies(c)
                    .iter()
                    .filter_map(|d| r.communities.get(d).cloned())
                    .collect();
                ctx.add(SmtTerm::or(deps).eq(e.clone()));
            }
        }
    }

    /// Relate every import and export record to the record it is computed
    /// from.
    pub(super) fn add_transfer_functions(&self, ctx: &mut EncodingContext, env: &SliceEnv<'_>) -> EncodeResult<()> {
        for (router, conf) in self.graph.configurations() {
            for &proto in self.optimizations.protocols(router) {
                let mut used_export = false;
                let edges = self.logical_graph.edges_of(router, proto);
                for le in edges {
                    let ge = self.graph.edge(le.key.edge);
                    match le.key.edge_type {
                        EdgeType::Import => {
                            let other = self.find_other_vars(&le.key);
                            self.add_import_constraint(ctx, env, le, other, conf, proto, ge)?;
                        }
                        EdgeType::Export => {
                            self.add_export_constraint(ctx, env, le, conf, proto, ge, used_export)?;
                            used_export = true;
                        }
                    }
                }
                if edges.is_empty() {
                    if let Some(best) = self.best_vars(router, proto) {
                        ctx.add(best.permitted.clone().not());
                    }
                }
            }
        }
        Ok(())
    }

    fn originated_values(&self, vars: &SymbolicRecord, len: u8, admin: i64) -> SmtTerm {
        SmtTerm::and(vec![
            vars.permitted.clone(),
            vars.prefix_length.clone().eq(SmtTerm::int(i64::from(len))),
            safe_eq(vars.admin_dist.as_ref(), SmtTerm::int(admin)),
            safe_eq(vars.local_pref.as_ref(), SmtTerm::int(0)),
            vars.metric.clone().eq(SmtTerm::int(0)),
        ])
    }

    /// Whether the BGP session behind `ge` can deliver messages. Internal
    /// sessions depend on IGP reachability of the peer, computed in its
    /// slice; everything else only needs the link up.
    fn receive_message(
        &self,
        env: &SliceEnv<'_>,
        other: &SymbolicRecord,
        proto: Protocol,
        ge: &GraphEdge,
        not_failed: &SmtTerm,
    ) -> SmtTerm {
        let peer_type = self.graph.peer_type(ge);
        let is_non_client = proto.is_bgp() && peer_type != Some(BgpSendType::ToEbgp);
        let is_client = proto.is_bgp() && peer_type == Some(BgpSendType::ToRr);
        let model_igp = self.optimizations.model_igp();
        let router = ge.router.as_str();

        if model_igp && is_client {
            let Some(cid) = &other.client_id else {
                return not_failed.clone();
            };
            let parts = self
                .graph
                .originator_ids()
                .iter()
                .filter(|(r, _)| r.as_str() != router)
                .filter_map(|(r, &id)| {
                    let reach = env.reachability(router, r)?;
                    Some(cid.clone().eq(SmtTerm::int(id)).implies(reach.clone()))
                })
                .collect();
            return SmtTerm::and(parts);
        }
        if model_igp && is_non_client {
            let reach = ge.peer.as_deref().and_then(|peer| env.reachability(router, peer));
            if let Some(reach) = reach {
                return reach.clone();
            }
        }
        not_failed.clone()
    }

    #[allow(clippy::too_many_arguments)]
    fn add_import_constraint(
        &self,
        ctx: &mut EncodingContext,
        env: &SliceEnv<'_>,
        le: &LogicalEdge,
        other: Option<&SymbolicRecord>,
        conf: &Configuration,
        proto: Protocol,
        ge: &GraphEdge,
    ) -> EncodeResult<()> {
        let vars = &self.records[le.record];
        if !vars.is_used {
            return Ok(());
        }
        let router = ge.router.as_str();
        let iface = &ge.start;
        let not_failed = Self::not_failed(env, ge);
        let not_failed_node = env.failures.failed_start_variable(ge).eq(SmtTerm::int(0));
        let active = interface_active(iface, proto);

        match proto {
            Protocol::Connected => {
                let Some(p) = ge.start_prefix() else {
                    ctx.add(vars.permitted.clone().not());
                    return Ok(());
                };
                let relevant = SmtTerm::and(vec![
                    active,
                    self.relevant_for_prefix(&p),
                    not_failed,
                    not_failed_node,
                ]);
                let values = self.originated_values(vars, p.length(), 1);
                ctx.add(SmtTerm::ite(relevant, values, vars.permitted.clone().not()));
            }
            Protocol::Static => {
                let mut acc = vars.permitted.clone().not();
                for sr in self.graph.static_routes(router, &iface.name) {
                    let p = sr.network;
                    let relevant = SmtTerm::and(vec![
                        active.clone(),
                        self.relevant_for_prefix(&p),
                        not_failed.clone(),
                        not_failed_node.clone(),
                    ]);
                    let values = self.originated_values(vars, p.length(), i64::from(sr.administrative_cost));
                    acc = SmtTerm::ite(relevant, values, acc);
                }
                ctx.add(acc);
            }
            Protocol::Ospf | Protocol::Bgp => {
                let absent = vars.permitted.clone().not();
                let Some(other) = other else {
                    ctx.add(absent);
                    return Ok(());
                };
                let receive = self.receive_message(env, other, proto, ge, &not_failed);

                // A peer that forwards through us would form a loop.
                let looped = match (proto.is_bgp(), self.graph.other_end(ge.id)) {
                    (true, Some(opposite)) => self
                        .decisions
                        .control_forwarding(opposite.id)
                        .cloned()
                        .unwrap_or_else(SmtTerm::ff),
                    _ => SmtTerm::ff(),
                };
                let usable = SmtTerm::and(vec![
                    looped.not(),
                    active,
                    other.permitted.clone(),
                    receive,
                    not_failed_node,
                ]);

                let policy = self.graph.find_import_policy(router, proto, ge)?;
                let fallback = accept_all();
                let statements = policy.map_or(fallback.as_slice(), |p| p.statements.as_slice());
                let cost = if proto.is_ospf() {
                    added_cost(conf, proto, ge)
                } else {
                    0
                };
                let f = TransferFunction {
                    slice: self,
                    env,
                    conf,
                    other,
                    current: vars,
                    proto,
                    statements,
                    added_cost: cost,
                    edge: ge,
                    is_export: false,
                };
                let import = f.compute(ctx)?;
                trace!(slice = %self.name, %ge, from = %other.name, "import function");
                ctx.add(SmtTerm::ite(usable, import, absent));
            }
            Protocol::Best => {}
        }
        Ok(())
    }

    /// Exports are computed from the router's best route. OSPF exports the
    /// better of its own best route and the route redistributed into it, and
    /// originates its own networks.
    #[allow(clippy::too_many_arguments)]
    fn add_export_constraint(
        &self,
        ctx: &mut EncodingContext,
        env: &SliceEnv<'_>,
        le: &LogicalEdge,
        conf: &Configuration,
        proto: Protocol,
        ge: &GraphEdge,
        used_export: bool,
    ) -> EncodeResult<()> {
        let router = ge.router.as_str();
        if used_export && self.optimizations.can_keep_single_export(router, proto) {
            return Ok(());
        }
        let vars = &self.records[le.record];
        if matches!(proto, Protocol::Connected | Protocol::Static) {
            ctx.add(vars.permitted.clone().not());
            return Ok(());
        }

        let (other, redistributed, overall_best) = if proto.is_ospf() {
            let redistributed = self.ospf_redistributed(router);
            let best = redistributed.and_then(|_| self.best_overall(router));
            (self.best_vars(router, proto), redistributed, best)
        } else {
            (self.best_overall(router), None, None)
        };
        let other = other.ok_or_else(|| {
            EncodeError::InvalidConfig(format!("router {router} has no best {proto} record"))
        })?;

        let iface = &ge.start;
        let not_failed = Self::not_failed(env, ge);
        let not_failed_node = env
            .failures
            .failed_peer_variable(ge)
            .map_or_else(SmtTerm::tt, |n| n.eq(SmtTerm::int(0)));
        let absent = vars.permitted.clone().not();
        let active = interface_active(iface, proto);

        // Routes learned over iBGP are only passed on to eBGP peers and to
        // route-reflector clients, which do not pay the AS hop.
        let mut cost = if proto.is_bgp() {
            added_cost(conf, proto, ge)
        } else {
            0
        };
        let peer_type = self.graph.peer_type(ge);
        let is_non_client_edge = proto.is_bgp() && peer_type != Some(BgpSendType::ToEbgp);
        let is_client_edge = proto.is_bgp() && peer_type == Some(BgpSendType::ToClient);
        let internal_export = other.is_best() && self.optimizations.need_bgp_internal(router);
        let mut do_export = SmtTerm::tt();
        if internal_export && is_non_client_edge {
            if is_client_edge {
                cost = 0;
            } else if let Some(internal) = self
                .best_vars(router, proto)
                .and_then(|b| b.bgp_internal.clone())
            {
                do_export = internal.not();
                cost = 0;
            }
        }

        let policy = self.graph.find_export_policy(router, proto, ge)?;
        let statements = if proto.is_ospf() {
            let otherwise = policy.map_or_else(|| vec![Statement::ExitReject], |p| p.statements.clone());
            vec![Statement::if_then_else(
                BooleanExpr::MatchProtocol(vec![RoutingProtocol::Ospf]),
                accept_all(),
                otherwise,
            )]
        } else {
            policy.map_or_else(accept_all, |p| p.statements.clone())
        };

        let mut acc = TransferFunction {
            slice: self,
            env,
            conf,
            other,
            current: vars,
            proto,
            statements: &statements,
            added_cost: cost,
            edge: ge,
            is_export: true,
        }
        .compute(ctx)?;
        let usable = SmtTerm::and(vec![
            active.clone(),
            do_export.clone(),
            other.permitted.clone(),
            not_failed.clone(),
            not_failed_node.clone(),
        ]);

        if let (Some(redist), Some(best)) = (redistributed, overall_best) {
            let redist_export = TransferFunction {
                slice: self,
                env,
                conf,
                other: best,
                current: redist,
                proto,
                statements: &statements,
                added_cost: cost,
                edge: ge,
                is_export: true,
            }
            .compute(ctx)?;
            ctx.add(redist_export);
            let usable_redist = SmtTerm::and(vec![
                active.clone(),
                do_export,
                redist.permitted.clone(),
                not_failed,
                not_failed_node,
            ]);
            let geq = self.greater_or_equal(proto, redist, other, Some(le))?;
            let redist_is_better = SmtTerm::and(vec![redist.permitted.clone(), geq]);
            let uses_ospf = SmtTerm::and(vec![other.permitted.clone(), redist_is_better.not()]);
            let copy = SmtTerm::and(vec![
                self.equal(proto, redist, vars, Some(le), false)?,
                redist.permitted.clone().eq(vars.permitted.clone()),
            ]);
            acc = SmtTerm::ite(
                uses_ospf,
                SmtTerm::ite(usable, acc, absent.clone()),
                SmtTerm::ite(usable_redist, copy, absent),
            );
        } else {
            acc = SmtTerm::ite(usable, acc, absent);
        }

        if proto.is_ospf() {
            let origins = self.originated(router, proto).cloned().unwrap_or_default();
            for p in &origins {
                acc = self.originate_ospf(vars, redistributed, iface, p, cost, acc);
            }
        }
        trace!(slice = %self.name, %ge, "export function");
        ctx.add(acc);
        Ok(())
    }

    /// OSPF announces its own networks regardless of the FIB, unless a
    /// redistributed route for the packet is more specific or preferred.
    fn originate_ospf(
        &self,
        vars: &SymbolicRecord,
        redistributed: Option<&SymbolicRecord>,
        iface: &Interface,
        p: &Prefix,
        cost: i64,
        acc: SmtTerm,
    ) -> SmtTerm {
        let len = i64::from(p.length());
        let admin = Protocol::Ospf.default_admin_distance();
        let comms = vars.communities.values().map(|e| e.clone().not()).collect();
        let area = match iface.ospf_area {
            Some(a) => safe_eq(vars.ospf_area.as_ref(), SmtTerm::int(a as i64)),
            None => SmtTerm::tt(),
        };
        let values = SmtTerm::and(vec![
            vars.permitted.clone(),
            safe_eq(vars.local_pref.as_ref(), SmtTerm::int(0)),
            safe_eq(vars.admin_dist.as_ref(), SmtTerm::int(admin)),
            vars.metric.clone().eq(SmtTerm::int(cost)),
            safe_eq(vars.med.as_ref(), SmtTerm::int(MED_ORIGINATED)),
            vars.prefix_length.clone().eq(SmtTerm::int(len)),
            safe_eq(vars.ospf_type.as_ref(), SmtTerm::int(OspfType::O.code())),
            area,
            safe_eq(vars.bgp_internal.as_ref(), SmtTerm::ff()),
            safe_eq(vars.igp_metric.as_ref(), SmtTerm::int(0)),
            SmtTerm::and(comms),
        ]);
        let mut relevant = SmtTerm::and(vec![
            interface_active(iface, Protocol::Ospf),
            self.relevant_for_prefix(p),
        ]);
        if let Some(redist) = redistributed {
            let longer = redist.prefix_length.clone().gt(SmtTerm::int(len));
            let same = redist.prefix_length.clone().eq(SmtTerm::int(len));
            let closer = match &redist.admin_dist {
                Some(ad) => ad.clone().lt(SmtTerm::int(admin)),
                None => SmtTerm::ff(),
            };
            let better = SmtTerm::or(vec![longer, SmtTerm::and(vec![same, closer])]);
            let better_redist = SmtTerm::and(vec![redist.permitted.clone(), better]);
            relevant = SmtTerm::and(vec![relevant, better_redist.not()]);
        }
        SmtTerm::ite(relevant, values, acc)
    }

    /// Absent records carry default values, which prunes the search space.
    pub(super) fn add_unused_default_value_constraints(&self, ctx: &mut EncodingContext) {
        for r in &self.records {
            let absent = r.permitted.clone().not();
            let zero = || SmtTerm::int(0);
            let mut defaults = vec![
                r.prefix_length.clone().eq(zero()),
                r.metric.clone().eq(zero()),
            ];
            let optional = [
                (&r.admin_dist, 0),
                (&r.med, 0),
                (&r.local_pref, 0),
                (&r.ospf_area, 0),
                (&r.ospf_type, DEFAULT_OSPF_TYPE),
                (&r.history, r.history_default),
                (&r.client_id, 0),
                (&r.igp_metric, 0),
                (&r.router_id, 0),
            ];
            for (field, default) in optional {
                if let Some(x) = field {
                    defaults.push(x.clone().eq(SmtTerm::int(default)));
                }
            }
            if let Some(internal) = &r.bgp_internal {
                defaults.push(internal.clone().not());
            }
            defaults.extend(r.communities.values().map(|e| e.clone().not()));
            for d in defaults {
                ctx.add(absent.clone().implies(d));
            }
        }
    }

    pub(super) fn add_header_space_constraint(&self, ctx: &mut EncodingContext) -> EncodeResult<()> {
        ctx.add(header_space_term(&self.header_space, &self.packet)?);
        Ok(())
    }

    /// Routes from external peers are never internal and carry no client id.
    pub(super) fn add_environment_constraints(&self, ctx: &mut EncodingContext) {
        for (key, &id) in self.logical_graph.environment_records() {
            let r = &self.records[id];
            if self.query.no_environment {
                ctx.add(r.permitted.clone().not());
            }
            let sends_communities = self
                .graph
                .ebgp_neighbor(key.edge)
                .is_some_and(|n| n.send_community);
            if !sends_communities {
                for c in r.communities.values() {
                    ctx.add(c.clone().not());
                }
            }
            if let Some(internal) = &r.bgp_internal {
                ctx.add(internal.clone().not());
            }
            if let Some(cid) = &r.client_id {
                ctx.add(cid.clone().eq(SmtTerm::int(0)));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryConfig;
    use crate::slice::MAIN_SLICE_NAME;
    use crate::symbolic::SymbolicFailures;
    use netverify_config::{HeaderSpace, Network};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn slice_with(ctx: &mut EncodingContext, hs: HeaderSpace) -> Result<(EncoderSlice, SymbolicFailures), Box<dyn std::error::Error>> {
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        let mut b = Configuration::new("b");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        let network = Network::new(vec![a, b])?;
        let graph = Arc::new(Graph::new(&network)?);
        let query = Arc::new(QueryConfig::default());
        let slice = EncoderSlice::new(ctx, 0, MAIN_SLICE_NAME, graph.clone(), query, hs, None)?;
        let failures = SymbolicFailures::new(ctx, &graph, 0);
        Ok((slice, failures))
    }

    #[test]
    fn absent_records_take_default_values() -> TestResult {
        let mut ctx = EncodingContext::new();
        let (slice, _) = slice_with(&mut ctx, HeaderSpace::default())?;
        slice.add_unused_default_value_constraints(&mut ctx);
        let best = slice.best_overall("a").ok_or("no best record for a")?;
        let expected = best
            .permitted
            .clone()
            .not()
            .implies(best.metric.clone().eq(SmtTerm::int(0)))
            .simplify();
        assert!(ctx.assertions().contains(&expected));
        Ok(())
    }

    #[test]
    fn connected_import_requires_a_live_link() -> TestResult {
        let mut ctx = EncodingContext::new();
        let (slice, failures) = slice_with(&mut ctx, HeaderSpace::default())?;
        let ibgp = BTreeMap::new();
        let reach = BTreeMap::new();
        let env = SliceEnv {
            failures: &failures,
            ibgp_slices: &ibgp,
            slice_reachability: &reach,
        };
        let before = ctx.assertions().len();
        slice.add_transfer_functions(&mut ctx, &env)?;
        assert!(ctx.assertions().len() > before);
        let le = slice
            .import_edges("a", Protocol::Connected)
            .next()
            .ok_or("no connected import on a")?;
        let failed = failures.failed_variable(slice.graph().edge(le.key.edge));
        let mentions_failure = ctx
            .assertions()
            .iter()
            .any(|t| t.free_vars().iter().any(|v| failed.free_vars().contains(v)));
        assert!(mentions_failure);
        Ok(())
    }

    fn community_router() -> Result<Configuration, Box<dyn std::error::Error>> {
        use netverify_config::{
            BgpProcess, BooleanExpr, CommunityList, CommunityListLine, CommunitySetExpr,
            LineAction, RoutingPolicy, Statement,
        };
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        a.bgp = Some(BgpProcess {
            router_id: "10.0.0.1".parse()?,
            neighbors: Vec::new(),
            multipath_ebgp: false,
            multipath_ibgp: false,
            network_list: None,
            common_export_policy: None,
        });
        a.community_lists.insert(
            "CL".into(),
            CommunityList {
                name: "CL".into(),
                lines: vec![CommunityListLine {
                    action: LineAction::Permit,
                    regex: "^65001:".into(),
                }],
            },
        );
        a.routing_policies.insert(
            "P".into(),
            RoutingPolicy::new(
                "P",
                vec![
                    Statement::AddCommunity(CommunitySetExpr::Inline(vec![
                        "65001:10".into(),
                        "65002:10".into(),
                    ])),
                    Statement::if_then_else(
                        BooleanExpr::MatchCommunitySet(CommunitySetExpr::Named("CL".into())),
                        vec![Statement::ExitAccept],
                        vec![],
                    ),
                ],
            ),
        );
        Ok(a)
    }

    #[test]
    fn regex_community_is_the_disjunction_of_what_it_matches() -> TestResult {
        use crate::symbolic::CommunityVar;
        use netverify_smt::solver::{Model, ModelValue};

        let graph = Arc::new(Graph::new(&Network::new(vec![community_router()?])?)?);
        let query = Arc::new(QueryConfig::default());
        let mut ctx = EncodingContext::new();
        let slice = EncoderSlice::new(&mut ctx, 0, MAIN_SLICE_NAME, graph, query, HeaderSpace::default(), None)?;
        let best = slice.best_overall("a").ok_or("no best record for a")?;

        let var_of = |c: CommunityVar| -> Result<(SmtTerm, String), Box<dyn std::error::Error>> {
            let term = best.communities.get(&c).cloned().ok_or("community not tracked")?;
            let SmtTerm::Var(name) = &term else {
                return Err("community is not a variable".into());
            };
            let name = name.clone();
            Ok((term, name))
        };
        let (regex, regex_name) = var_of(CommunityVar::Regex("^65001:".into()))?;
        let (matched, matched_name) = var_of(CommunityVar::from_text("65001:10"))?;
        let (other, other_name) = var_of(CommunityVar::Other("^65001:".into()))?;
        let (_, unmatched_name) = var_of(CommunityVar::from_text("65002:10"))?;

        let mut fresh = EncodingContext::new();
        slice.add_community_constraints(&mut fresh);
        let expected = SmtTerm::or(vec![matched, other]).eq(regex);
        assert!(fresh.assertions().contains(&expected), "{:?}", fresh.assertions());

        let holds = |on: &[&str]| {
            let mut model = Model::default();
            for name in [&regex_name, &matched_name, &other_name, &unmatched_name] {
                let value = on.contains(&name.as_str());
                model.values.insert(name.clone(), ModelValue::Bool(value));
            }
            model.eval(&expected)
        };
        assert_eq!(holds(&[]), Some(ModelValue::Bool(true)));
        assert_eq!(holds(&[matched_name.as_str()]), Some(ModelValue::Bool(false)));
        assert_eq!(holds(&[matched_name.as_str(), regex_name.as_str()]), Some(ModelValue::Bool(true)));
        assert_eq!(holds(&[other_name.as_str(), regex_name.as_str()]), Some(ModelValue::Bool(true)));
        assert_eq!(holds(&[unmatched_name.as_str()]), Some(ModelValue::Bool(true)));
        assert_eq!(holds(&[unmatched_name.as_str(), regex_name.as_str()]), Some(ModelValue::Bool(false)));
        Ok(())
    }

    #[test]
    fn header_space_restricts_the_packet() -> TestResult {
        let mut ctx = EncodingContext::new();
        let hs = HeaderSpace {
            dst_ips: vec!["10.0.0.0/30".parse()?],
            ..HeaderSpace::default()
        };
        let (slice, _) = slice_with(&mut ctx, hs)?;
        let before = ctx.assertions().len();
        slice.add_header_space_constraint(&mut ctx)?;
        assert_eq!(ctx.assertions().len(), before + 1);
        Ok(())
    }
}
