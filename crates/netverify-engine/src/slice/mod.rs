//! One encoding slice: the full control- and data-plane model of the
//! network for a single class of packets.
//!
//! The main slice models the packets of the query. iBGP slices model the
//! session traffic towards one router so that iBGP message delivery can
//! depend on reachability.

mod acl;
mod constraints;
mod forwarding;
mod selection;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use netverify_config::{HeaderSpace, Prefix, PrefixRange};
use netverify_smt::terms::SmtTerm;
use tracing::debug;

use crate::context::EncodingContext;
use crate::error::{EncodeError, EncodeResult};
use crate::graph::{EdgeId, Graph, GraphEdge};
use crate::logical_graph::{LogicalEdge, LogicalGraph, LogicalKey};
use crate::optimizations::{relevant_prefix, Optimizations};
use crate::protocol::{EdgeType, Protocol};
use crate::query::QueryConfig;
use crate::symbolic::{
    RecordFactory, RecordId, RecordKind, SymbolicDecisions, SymbolicFailures, SymbolicPacket,
    SymbolicRecord,
};

pub(crate) use acl::{acl_term, header_space_term};
pub(crate) use selection::{default_admin_distance, default_med, equal_histories, DEFAULT_LOCAL_PREF};

/// Name of the slice that models the queried packets.
pub const MAIN_SLICE_NAME: &str = "SLICE-MAIN_";

/// Name of the slice that models iBGP session traffic towards `router`.
pub fn ibgp_slice_name(router: &str) -> String {
    format!("SLICE-{router}_")
}

/// Cross-slice state a slice reads while emitting its constraints.
pub struct SliceEnv<'a> {
    pub failures: &'a SymbolicFailures,
    /// iBGP slices keyed by the router whose sessions they model.
    pub ibgp_slices: &'a BTreeMap<String, EncoderSlice>,
    /// `slice_reachability[owner][source]`: in the iBGP slice of `owner`,
    /// packets from `source` reach `owner`.
    pub slice_reachability: &'a BTreeMap<String, BTreeMap<String, SmtTerm>>,
}

impl<'a> SliceEnv<'a> {
    pub fn ibgp_slice(&self, router: &str) -> Option<&'a EncoderSlice> {
        self.ibgp_slices.get(router)
    }

    /// `source` can deliver session traffic to `owner`.
    pub fn reachability(&self, owner: &str, source: &str) -> Option<&'a SmtTerm> {
        self.slice_reachability.get(owner).and_then(|m| m.get(source))
    }
}

#[derive(Debug)]
pub struct EncoderSlice {
    encoder_id: usize,
    name: String,
    graph: Arc<Graph>,
    query: Arc<QueryConfig>,
    header_space: HeaderSpace,
    optimizations: Optimizations,
    logical_graph: LogicalGraph,
    decisions: SymbolicDecisions,
    packet: SymbolicPacket,
    records: Vec<SymbolicRecord>,
    ospf_redistributed: BTreeMap<String, RecordId>,
    originated: BTreeMap<(String, Protocol), BTreeSet<Prefix>>,
    inbound_acls: BTreeMap<EdgeId, SmtTerm>,
    outbound_acls: BTreeMap<EdgeId, SmtTerm>,
    forwards_across: BTreeMap<EdgeId, SmtTerm>,
}

fn push_record(records: &mut Vec<SymbolicRecord>, record: SymbolicRecord) -> RecordId {
    records.push(record);
    records.len() - 1
}

impl EncoderSlice {
    /// Allocate every variable of the slice. `main` is `None` when this is
    /// the main slice; other slices share its environment records.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ctx: &mut EncodingContext,
        encoder_id: usize,
        name: impl Into<String>,
        graph: Arc<Graph>,
        query: Arc<QueryConfig>,
        header_space: HeaderSpace,
        main: Option<&EncoderSlice>,
    ) -> EncodeResult<Self> {
        let name = name.into();
        let optimizations = Optimizations::compute(&graph, &query, &header_space, main.is_none())?;
        let packet = SymbolicPacket::new(ctx, encoder_id, &name);
        let mut slice = EncoderSlice {
            encoder_id,
            name,
            graph,
            query,
            header_space,
            optimizations,
            logical_graph: LogicalGraph::default(),
            decisions: SymbolicDecisions::default(),
            packet,
            records: Vec::new(),
            ospf_redistributed: BTreeMap::new(),
            originated: BTreeMap::new(),
            inbound_acls: BTreeMap::new(),
            outbound_acls: BTreeMap::new(),
            forwards_across: BTreeMap::new(),
        };
        slice.init_originated_prefixes()?;
        slice.init_redistribution_protocols()?;
        slice.add_forwarding_variables(ctx);
        slice.add_best_variables(ctx);
        slice.add_symbolic_records(ctx);
        slice.add_choice_variables(ctx);
        slice.add_environment_variables(ctx, main);
        slice.init_acls(ctx)?;
        slice.init_forwards_across();
        debug!(
            slice = %slice.name,
            records = slice.records.len(),
            variables = ctx.variables().len(),
            "allocated slice variables"
        );
        Ok(slice)
    }

    fn init_originated_prefixes(&mut self) -> EncodeResult<()> {
        for router in self.graph.routers() {
            for &proto in self.optimizations.protocols(router) {
                let prefixes = self.graph.originated_networks(router, proto)?;
                self.originated.insert((router.clone(), proto), prefixes);
            }
        }
        Ok(())
    }

    fn init_redistribution_protocols(&mut self) -> EncodeResult<()> {
        for (router, conf) in self.graph.configurations() {
            let protos = self.optimizations.protocols(router);
            for &proto in protos {
                let mut redistributed = BTreeSet::from([proto]);
                if let Some(pol) = Graph::find_common_policy(conf, proto)? {
                    redistributed.extend(
                        Graph::find_redistributed_protocols(conf, pol, proto)
                            .into_iter()
                            .filter(|p| protos.contains(p)),
                    );
                }
                self.logical_graph
                    .redistributed_protocols
                    .insert((router.clone(), proto), redistributed);
            }
        }
        Ok(())
    }

    fn add_forwarding_variables(&mut self, ctx: &mut EncodingContext) {
        let base = format!("{}_{}", self.encoder_id, self.name);
        for edge in self.graph.edges() {
            let suffix = format!("{}_{}", edge.router, edge.start.name);
            let cf = ctx.declare_bool(format!("{base}CONTROL-FORWARDING_{suffix}"));
            self.decisions.control_forwarding.insert(edge.id, cf);
            if !edge.is_abstract {
                let df = ctx.declare_bool(format!("{base}DATA-FORWARDING_{suffix}"));
                self.decisions.data_forwarding.insert(edge.id, df);
            }
        }
    }

    fn add_best_variables(&mut self, ctx: &mut EncodingContext) {
        let factory = RecordFactory {
            encoder_id: self.encoder_id,
            slice_name: &self.name,
            graph: &self.graph,
            optimizations: &self.optimizations,
        };
        for router in self.graph.routers() {
            let best = factory.create(ctx, router, Protocol::Best, RecordKind::BestOverall, "");
            let id = push_record(&mut self.records, best);
            self.decisions.best_neighbor.insert(router.clone(), id);

            if self.optimizations.has_single_protocol(router) {
                continue;
            }
            for &proto in self.optimizations.protocols(router) {
                let best = factory.create(ctx, router, proto, RecordKind::Best, "");
                let id = push_record(&mut self.records, best);
                self.decisions
                    .best_neighbor_per_protocol
                    .insert((router.clone(), proto), id);
            }
        }
    }

    fn add_symbolic_records(&mut self, ctx: &mut EncodingContext) {
        let factory = RecordFactory {
            encoder_id: self.encoder_id,
            slice_name: &self.name,
            graph: &self.graph,
            optimizations: &self.optimizations,
        };
        let opts = &self.optimizations;

        for router in self.graph.routers() {
            for &proto in opts.protocols(router) {
                let single_export = opts.can_keep_single_export(router, proto);
                let mut shared_export: Option<RecordId> = None;
                let mut has_export = false;

                for edge in self.graph.edges_of(router) {
                    if !self.graph.is_edge_used(proto, edge) {
                        continue;
                    }
                    let iface = edge.start.name.as_str();

                    let export = if matches!(proto, Protocol::Connected | Protocol::Static) {
                        None
                    } else if single_export {
                        let id = match shared_export {
                            Some(id) => id,
                            None => {
                                let rec =
                                    factory.create(ctx, router, proto, RecordKind::SingleExport, "");
                                let id = push_record(&mut self.records, rec);
                                shared_export = Some(id);
                                id
                            }
                        };
                        Some(id)
                    } else {
                        let rec = factory.create(ctx, router, proto, RecordKind::Export, iface);
                        Some(push_record(&mut self.records, rec))
                    };

                    let modeled = proto != Protocol::Connected
                        || edge
                            .start_prefix()
                            .is_some_and(|p| relevant_prefix(&self.header_space, &p));
                    if modeled {
                        let rec = if opts.can_combine_import_export(router, proto, edge.id) {
                            let name = factory.record_name(router, proto, RecordKind::Import, iface);
                            SymbolicRecord::unused(name, router, proto)
                        } else {
                            factory.create(ctx, router, proto, RecordKind::Import, iface)
                        };
                        let id = push_record(&mut self.records, rec);
                        let key = LogicalKey::new(edge.id, proto, EdgeType::Import);
                        self.logical_graph
                            .push(router, LogicalEdge { key, record: id });
                    }
                    if let Some(id) = export {
                        has_export = true;
                        let key = LogicalKey::new(edge.id, proto, EdgeType::Export);
                        self.logical_graph
                            .push(router, LogicalEdge { key, record: id });
                    }
                }

                let redistributes = self
                    .logical_graph
                    .redistributed_protocols(router, proto)
                    .is_some_and(|r| r.len() > 1);
                if proto.is_ospf() && redistributes && has_export {
                    let rec = factory.create(ctx, router, proto, RecordKind::Redistributed, "");
                    let id = push_record(&mut self.records, rec);
                    self.ospf_redistributed.insert(router.clone(), id);
                }
            }
        }

        self.link_opposite_edges();
    }

    /// Pair each logical edge with the peer's edge in the opposite direction
    /// over the opposite topology edge.
    fn link_opposite_edges(&mut self) {
        let mut links = Vec::new();
        for ((_, proto), edges) in self.logical_graph.all_edges() {
            for le in edges {
                let ge = self.graph.edge(le.key.edge);
                let (Some(peer), Some(opposite)) = (&ge.peer, self.graph.other_end(ge.id)) else {
                    continue;
                };
                let wanted = match le.key.edge_type {
                    EdgeType::Import => EdgeType::Export,
                    EdgeType::Export => EdgeType::Import,
                };
                let found = self
                    .logical_graph
                    .edges_of(peer, *proto)
                    .iter()
                    .find(|o| o.key.edge == opposite.id && o.key.edge_type == wanted);
                if let Some(other) = found {
                    links.push((le.key, other.key));
                }
            }
        }
        self.logical_graph.other_end.extend(links);
    }

    fn add_choice_variables(&mut self, ctx: &mut EncodingContext) {
        for (_, edges) in self.logical_graph.all_edges() {
            for le in edges.iter().filter(|le| le.key.is_import()) {
                let name = format!("{}_choice", self.records[le.record].name);
                self.decisions
                    .choice_variables
                    .insert(le.key, ctx.declare_bool(name));
            }
        }
    }

    fn add_environment_variables(&mut self, ctx: &mut EncodingContext, main: Option<&EncoderSlice>) {
        if let Some(main) = main {
            for (key, &id) in main.logical_graph.environment_records() {
                let local = push_record(&mut self.records, main.records[id].clone());
                self.logical_graph.environment_records.insert(*key, local);
            }
            return;
        }

        let factory = RecordFactory {
            encoder_id: self.encoder_id,
            slice_name: &self.name,
            graph: &self.graph,
            optimizations: &self.optimizations,
        };
        let mut external = Vec::new();
        for router in self.graph.routers() {
            for le in self.import_edges(router, Protocol::Bgp) {
                let ge = self.graph.edge(le.key.edge);
                if ge.end.is_some() {
                    continue;
                }
                if let Some(n) = self.graph.ebgp_neighbor(ge.id) {
                    external.push((router.clone(), le.key, n.address.network().to_string()));
                }
            }
        }
        for (router, key, address) in external {
            let rec = factory.create(ctx, &router, Protocol::Bgp, RecordKind::Environment, &address);
            let id = push_record(&mut self.records, rec);
            self.logical_graph.environment_records.insert(key, id);
        }
    }

    fn init_acls(&mut self, ctx: &mut EncodingContext) -> EncodeResult<()> {
        let base = format!("{}_{}", self.encoder_id, self.name);
        for edge in self.graph.edges() {
            let Some(conf) = self.graph.configuration(&edge.router) else {
                continue;
            };
            let iface = &edge.start;
            let filters = [
                ("OUTBOUND", "outbound", iface.outgoing_filter.as_ref()),
                ("INBOUND", "inbound", iface.incoming_filter.as_ref()),
            ];
            for (tag, direction, filter) in filters {
                let Some(acl_name) = filter else {
                    continue;
                };
                let acl = conf.ip_access_lists.get(acl_name).ok_or_else(|| {
                    EncodeError::InvalidConfig(format!(
                        "interface {} of {} references undefined access list {acl_name}",
                        iface.name, edge.router
                    ))
                })?;
                let term = acl_term(acl, &self.packet, &edge.router, &iface.name, direction)?;
                let var = ctx.declare_bool(format!(
                    "{base}_{}_{}_{tag}_{acl_name}",
                    edge.router, iface.name
                ));
                ctx.add(var.clone().eq(term));
                let table = if tag == "OUTBOUND" {
                    &mut self.outbound_acls
                } else {
                    &mut self.inbound_acls
                };
                table.insert(edge.id, var);
            }
        }
        Ok(())
    }

    fn init_forwards_across(&mut self) {
        for (&id, df) in &self.decisions.data_forwarding {
            let edge = self.graph.edge(id);
            let inbound = match (&edge.end, self.graph.other_end(id)) {
                (Some(_), Some(other)) => self.inbound_acls.get(&other.id).cloned(),
                _ => None,
            };
            let term = match inbound {
                Some(acl) => SmtTerm::and(vec![df.clone(), acl]),
                None => df.clone(),
            };
            self.forwards_across.insert(id, term);
        }
    }

    /// Emit every constraint of the slice.
    pub fn compute_encoding(&self, ctx: &mut EncodingContext, env: &SliceEnv<'_>) -> EncodeResult<()> {
        let before = ctx.assertions().len();
        self.add_bound_constraints(ctx);
        self.add_community_constraints(ctx);
        self.add_transfer_functions(ctx, env)?;
        self.add_history_constraints(ctx);
        self.add_best_per_protocol_constraints(ctx)?;
        self.add_choice_per_protocol_constraints(ctx)?;
        self.add_best_overall_constraints(ctx)?;
        self.add_control_forwarding_constraints(ctx)?;
        self.add_data_forwarding_constraints(ctx, env);
        self.add_unused_default_value_constraints(ctx);
        self.add_header_space_constraint(ctx)?;
        if self.is_main() {
            self.add_environment_constraints(ctx);
        }
        debug!(
            slice = %self.name,
            assertions = ctx.assertions().len() - before,
            "encoded slice"
        );
        Ok(())
    }

    pub fn encoder_id(&self) -> usize {
        self.encoder_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_main(&self) -> bool {
        self.name.is_empty() || self.name == MAIN_SLICE_NAME
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn query(&self) -> &QueryConfig {
        &self.query
    }

    pub fn header_space(&self) -> &HeaderSpace {
        &self.header_space
    }

    pub fn optimizations(&self) -> &Optimizations {
        &self.optimizations
    }

    pub fn logical_graph(&self) -> &LogicalGraph {
        &self.logical_graph
    }

    pub fn decisions(&self) -> &SymbolicDecisions {
        &self.decisions
    }

    pub fn packet(&self) -> &SymbolicPacket {
        &self.packet
    }

    pub fn records(&self) -> &[SymbolicRecord] {
        &self.records
    }

    pub fn record(&self, id: RecordId) -> &SymbolicRecord {
        &self.records[id]
    }

    pub fn originated(&self, router: &str, proto: Protocol) -> Option<&BTreeSet<Prefix>> {
        self.originated.get(&(router.to_string(), proto))
    }

    pub fn ospf_redistributed(&self, router: &str) -> Option<&SymbolicRecord> {
        self.ospf_redistributed.get(router).map(|&id| &self.records[id])
    }

    pub fn inbound_acl(&self, edge: EdgeId) -> Option<&SmtTerm> {
        self.inbound_acls.get(&edge)
    }

    pub fn outbound_acl(&self, edge: EdgeId) -> Option<&SmtTerm> {
        self.outbound_acls.get(&edge)
    }

    /// Traffic sent out of `edge` arrives past the peer's inbound filter.
    pub fn forwards_across(&self, edge: EdgeId) -> Option<&SmtTerm> {
        self.forwards_across.get(&edge)
    }

    pub fn best_overall(&self, router: &str) -> Option<&SymbolicRecord> {
        self.decisions.best_neighbor(router).map(|id| &self.records[id])
    }

    /// The best record of `proto`, which is the overall best record when
    /// the router runs a single protocol in this slice.
    pub fn best_vars(&self, router: &str, proto: Protocol) -> Option<&SymbolicRecord> {
        if self.optimizations.has_single_protocol(router) {
            self.best_overall(router)
        } else {
            self.decisions
                .best_neighbor_per_protocol(router, proto)
                .map(|id| &self.records[id])
        }
    }

    /// The record a logical edge really carries: its own, or the peer's
    /// export record when the two were merged.
    pub fn correct_vars(&self, le: &LogicalEdge) -> &SymbolicRecord {
        let own = &self.records[le.record];
        if own.is_used {
            return own;
        }
        self.logical_graph
            .other_end(&le.key)
            .and_then(|k| self.logical_graph.record(&k))
            .map_or(own, |id| &self.records[id])
    }

    /// Record feeding an import edge: the peer's export or the environment.
    pub fn find_other_vars(&self, key: &LogicalKey) -> Option<&SymbolicRecord> {
        self.logical_graph
            .find_other_record(key)
            .map(|id| &self.records[id])
    }

    /// Import logical edges of `router` for `proto`.
    pub(crate) fn import_edges(&self, router: &str, proto: Protocol) -> impl Iterator<Item = &LogicalEdge> {
        self.logical_graph
            .edges_of(router, proto)
            .iter()
            .filter(|le| le.key.is_import())
    }

    /// The packet destination lies in `p`.
    pub fn relevant_for_prefix(&self, p: &Prefix) -> SmtTerm {
        if p.length() == 0 {
            return SmtTerm::tt();
        }
        self.packet
            .dst_ip
            .clone()
            .in_range(p.start(), p.end_exclusive())
    }

    /// A route of length `len` is covered by `range` and applies to the
    /// packet destination.
    pub fn is_relevant_for_range(&self, len: &SmtTerm, range: &PrefixRange) -> SmtTerm {
        let bits = self.relevant_for_prefix(&range.prefix);
        let (lo, hi) = (i64::from(range.min_length), i64::from(range.max_length));
        if lo == hi {
            SmtTerm::and(vec![len.clone().eq(SmtTerm::int(lo)), bits])
        } else {
            SmtTerm::and(vec![
                len.clone().ge(SmtTerm::int(lo)),
                len.clone().le(SmtTerm::int(hi)),
                bits,
            ])
        }
    }

    /// `failed == 0` for the link carrying `edge`.
    pub(crate) fn not_failed(env: &SliceEnv<'_>, edge: &GraphEdge) -> SmtTerm {
        env.failures.failed_variable(edge).eq(SmtTerm::int(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_config::{Configuration, Interface, Network};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn two_routers() -> Result<Network, Box<dyn std::error::Error>> {
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        let mut b = Configuration::new("b");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        b.interfaces
            .push(Interface::new("eth1").with_address("192.168.1.1/24".parse()?));
        Ok(Network::new(vec![a, b])?)
    }

    fn main_slice(ctx: &mut EncodingContext, network: &Network) -> EncodeResult<EncoderSlice> {
        let graph = Arc::new(Graph::new(network)?);
        let query = Arc::new(QueryConfig::default());
        let hs = query.header_space.clone();
        EncoderSlice::new(ctx, 0, MAIN_SLICE_NAME, graph, query, hs, None)
    }

    #[test]
    fn connected_routers_get_import_records_and_forwarding_vars() -> TestResult {
        let network = two_routers()?;
        let mut ctx = EncodingContext::new();
        let slice = main_slice(&mut ctx, &network)?;
        assert!(slice.is_main());

        let imports: Vec<_> = slice.import_edges("b", Protocol::Connected).collect();
        assert_eq!(imports.len(), 2);
        for le in &imports {
            assert!(slice.decisions().choice_variable(&le.key).is_some());
        }
        assert!(ctx
            .sort_of("0_SLICE-MAIN_CONTROL-FORWARDING_b_eth1")
            .is_some());
        assert!(ctx.sort_of("0_SLICE-MAIN_DATA-FORWARDING_a_eth0").is_some());
        assert!(slice.best_overall("a").is_some());
        Ok(())
    }

    #[test]
    fn prefix_relevance_is_an_interval_on_the_destination() -> TestResult {
        let network = two_routers()?;
        let mut ctx = EncodingContext::new();
        let slice = main_slice(&mut ctx, &network)?;

        assert!(slice.relevant_for_prefix(&"0.0.0.0/0".parse()?).is_true());
        let range = PrefixRange::exact("10.0.0.0/8".parse()?);
        let term = slice.is_relevant_for_range(&SmtTerm::var("len"), &range);
        let expected = SmtTerm::and(vec![
            SmtTerm::var("len").eq(SmtTerm::int(8)),
            slice
                .packet()
                .dst_ip
                .clone()
                .in_range(0x0A00_0000, 0x0B00_0000),
        ]);
        assert_eq!(term, expected);
        Ok(())
    }

    #[test]
    fn undefined_access_list_is_rejected() -> TestResult {
        let mut a = Configuration::new("a");
        let mut iface = Interface::new("eth0").with_address("10.0.0.1/24".parse()?);
        iface.outgoing_filter = Some("missing".into());
        a.interfaces.push(iface);
        let network = Network::new(vec![a])?;
        let mut ctx = EncodingContext::new();
        let err = main_slice(&mut ctx, &network).err();
        assert!(matches!(err, Some(EncodeError::InvalidConfig(_))));
        Ok(())
    }
}
