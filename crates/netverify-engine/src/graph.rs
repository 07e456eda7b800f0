//! Topology graph: physical adjacencies inferred from interface subnets,
//! abstract edges for iBGP sessions, static-route bindings, and the
//! per-edge BGP neighbor tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use netverify_config::{
    BgpNeighbor, BooleanExpr, Configuration, Interface, InterfaceAddress, Ip, Network, Prefix,
    PrefixSetExpr, RoutingPolicy, RoutingProtocol, StaticRoute, NULL_INTERFACE_NAME,
};
use serde::Serialize;
use tracing::debug;

use crate::ast::AstVisitor;
use crate::error::{EncodeError, EncodeResult};
use crate::protocol::Protocol;
use crate::symbolic::community::CommunityTable;

/// Index of an edge in [`Graph::edges`].
pub type EdgeId = usize;

/// Name prefix of the synthetic interfaces that stand for iBGP sessions.
pub const IBGP_INTERFACE_PREFIX: &str = "iBGP-";

/// A directed edge leaving `router` through `start`.
///
/// `peer` and `end` are `None` for edges facing hosts or external
/// networks. Abstract edges model iBGP sessions and carry synthetic
/// interfaces.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GraphEdge {
    pub id: EdgeId,
    pub router: String,
    pub start: Interface,
    pub peer: Option<String>,
    pub end: Option<Interface>,
    pub is_abstract: bool,
    pub is_null: bool,
}

impl GraphEdge {
    pub fn start_prefix(&self) -> Option<Prefix> {
        self.start.prefix()
    }

    pub fn start_ip(&self) -> Option<Ip> {
        self.start.address.map(|a| a.ip)
    }

    pub fn end_ip(&self) -> Option<Ip> {
        self.end.as_ref().and_then(|i| i.address).map(|a| a.ip)
    }
}

impl fmt::Display for GraphEdge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.router, self.start.name)?;
        match (&self.peer, &self.end) {
            (Some(peer), Some(end)) => write!(f, " --> {peer},{}", end.name),
            _ => write!(f, " --> _"),
        }
    }
}

/// How a BGP advertisement crosses an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum BgpSendType {
    ToEbgp,
    ToNonClient,
    ToClient,
    ToRr,
}

/// Immutable network topology shared by every encoder of a query.
#[derive(Debug, Clone)]
pub struct Graph {
    configurations: BTreeMap<String, Configuration>,
    edges: Vec<GraphEdge>,
    edge_map: BTreeMap<String, Vec<EdgeId>>,
    other_end: HashMap<EdgeId, EdgeId>,
    static_routes: BTreeMap<String, BTreeMap<String, Vec<StaticRoute>>>,
    ebgp_neighbors: HashMap<EdgeId, BgpNeighbor>,
    ibgp_neighbors: HashMap<EdgeId, BgpNeighbor>,
    route_reflector_parent: BTreeMap<String, String>,
    route_reflector_clients: BTreeMap<String, BTreeSet<String>>,
    originator_ids: BTreeMap<String, i64>,
    area_ids: BTreeMap<String, BTreeSet<u64>>,
    communities: CommunityTable,
}

impl Graph {
    pub fn new(network: &Network) -> EncodeResult<Self> {
        Self::build(network, None)
    }

    /// A graph over a subset of the routers. Adjacencies to routers outside
    /// the subset become peerless edges.
    pub fn restricted(network: &Network, routers: &BTreeSet<String>) -> EncodeResult<Self> {
        Self::build(network, Some(routers))
    }

    fn build(network: &Network, routers: Option<&BTreeSet<String>>) -> EncodeResult<Self> {
        let configurations: BTreeMap<String, Configuration> = network
            .configurations()
            .iter()
            .filter(|(name, _)| routers.map_or(true, |rs| rs.contains(*name)))
            .map(|(name, conf)| (name.clone(), conf.clone()))
            .collect();

        let communities = CommunityTable::build(configurations.values())?;
        let area_ids = configurations
            .iter()
            .map(|(name, conf)| (name.clone(), conf.ospf_areas()))
            .collect();

        let mut graph = Graph {
            configurations,
            edges: Vec::new(),
            edge_map: BTreeMap::new(),
            other_end: HashMap::new(),
            static_routes: BTreeMap::new(),
            ebgp_neighbors: HashMap::new(),
            ibgp_neighbors: HashMap::new(),
            route_reflector_parent: BTreeMap::new(),
            route_reflector_clients: BTreeMap::new(),
            originator_ids: BTreeMap::new(),
            area_ids,
            communities,
        };
        graph.init_topology(network);
        graph.init_static_routes()?;
        graph.init_ebgp_neighbors();
        graph.init_ibgp_neighbors();
        debug!(
            routers = graph.configurations.len(),
            edges = graph.edges.len(),
            ibgp_sessions = graph.ibgp_neighbors.len(),
            "built topology graph"
        );
        Ok(graph)
    }

    fn push_edge(&mut self, mut edge: GraphEdge) -> EdgeId {
        let id = self.edges.len();
        edge.id = id;
        self.edge_map.entry(edge.router.clone()).or_default().push(id);
        self.edges.push(edge);
        id
    }

    /// Pair up interfaces whose subnets match exactly one interface of
    /// another router.
    fn init_topology(&mut self, network: &Network) {
        let mut by_prefix: BTreeMap<Prefix, Vec<(String, Interface)>> = BTreeMap::new();
        for (router, conf) in network.configurations() {
            for iface in &conf.interfaces {
                if let Some(prefix) = iface.prefix() {
                    by_prefix
                        .entry(prefix)
                        .or_default()
                        .push((router.clone(), iface.clone()));
                }
            }
        }

        let routers: Vec<String> = self.configurations.keys().cloned().collect();
        for router in &routers {
            let Some(conf) = self.configurations.get(router) else {
                continue;
            };
            let mut new_edges = Vec::new();
            for iface in &conf.interfaces {
                let Some(address) = iface.address else {
                    continue;
                };
                let candidates: Vec<&(String, Interface)> = by_prefix
                    .get(&address.prefix())
                    .map(|v| {
                        v.iter()
                            .filter(|(r, i)| {
                                r != router && i.address.map(|a| a.ip) != Some(address.ip)
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let (peer, end) = match candidates.as_slice() {
                    [(r, i)] if self.configurations.contains_key(r) => {
                        (Some(r.clone()), Some(i.clone()))
                    }
                    _ => (None, None),
                };
                new_edges.push(GraphEdge {
                    id: 0,
                    router: router.clone(),
                    start: iface.clone(),
                    peer,
                    end,
                    is_abstract: false,
                    is_null: false,
                });
            }
            for e in new_edges {
                self.push_edge(e);
            }
        }

        let mut index: HashMap<(String, String), EdgeId> = HashMap::new();
        for e in &self.edges {
            index.insert((e.router.clone(), e.start.name.clone()), e.id);
        }
        for e in &self.edges {
            if let (Some(peer), Some(end)) = (&e.peer, &e.end) {
                if let Some(&other) = index.get(&(peer.clone(), end.name.clone())) {
                    self.other_end.insert(e.id, other);
                }
            }
        }
    }

    /// Bind each static route to the edge its next hop names. Null routes
    /// share one null edge per router.
    fn init_static_routes(&mut self) -> EncodeResult<()> {
        let routers: Vec<String> = self.configurations.keys().cloned().collect();
        for router in routers {
            let Some(conf) = self.configurations.get(&router) else {
                continue;
            };
            let mut bound: BTreeMap<String, Vec<StaticRoute>> = BTreeMap::new();
            for sr in &conf.static_routes {
                if sr.is_null_routed() {
                    bound
                        .entry(NULL_INTERFACE_NAME.to_string())
                        .or_default()
                        .push(sr.clone());
                    continue;
                }
                let mut found = false;
                for &id in self.edge_map.get(&router).map(Vec::as_slice).unwrap_or(&[]) {
                    let edge = &self.edges[id];
                    let by_name = sr.next_hop_interface.as_deref() == Some(edge.start.name.as_str());
                    let by_ip = match sr.next_hop_ip {
                        Some(nh) => {
                            edge.end_ip() == Some(nh)
                                || (edge.peer.is_none()
                                    && edge.start_prefix().is_some_and(|p| p.contains_ip(nh)))
                        }
                        None => false,
                    };
                    if by_name || by_ip {
                        bound
                            .entry(edge.start.name.clone())
                            .or_default()
                            .push(sr.clone());
                        found = true;
                    }
                }
                if !found {
                    return Err(EncodeError::UnresolvedStaticRoute {
                        router: router.clone(),
                        network: sr.network.to_string(),
                    });
                }
            }
            if bound.contains_key(NULL_INTERFACE_NAME) {
                self.push_edge(GraphEdge {
                    id: 0,
                    router: router.clone(),
                    start: Interface::new(NULL_INTERFACE_NAME),
                    peer: None,
                    end: None,
                    is_abstract: false,
                    is_null: true,
                });
            }
            if !bound.is_empty() {
                self.static_routes.insert(router, bound);
            }
        }
        Ok(())
    }

    /// An edge has an eBGP neighbor when a configured external neighbor
    /// address lies in the edge's subnet.
    fn init_ebgp_neighbors(&mut self) {
        for edge in &self.edges {
            if edge.is_null || edge.is_abstract {
                continue;
            }
            let Some(bgp) = self
                .configurations
                .get(&edge.router)
                .and_then(|c| c.bgp.as_ref())
            else {
                continue;
            };
            let Some(prefix) = edge.start_prefix() else {
                continue;
            };
            if let Some(n) = bgp
                .neighbors
                .iter()
                .find(|n| !n.is_ibgp() && prefix.contains_ip(n.address.network()))
            {
                self.ebgp_neighbors.insert(edge.id, n.clone());
            }
        }
    }

    /// Match iBGP sessions by local address and add one abstract edge per
    /// direction, then derive route-reflector roles and originator ids.
    fn init_ibgp_neighbors(&mut self) {
        let sessions = ibgp_sessions(&self.configurations);

        let mut by_pair: BTreeMap<(String, String), EdgeId> = BTreeMap::new();
        for ((r1, r2), n1) in &sessions {
            let end = sessions
                .get(&(r2.clone(), r1.clone()))
                .map(|n2| ibgp_interface(n2, r1));
            let id = self.push_edge(GraphEdge {
                id: 0,
                router: r1.clone(),
                start: ibgp_interface(n1, r2),
                peer: end.as_ref().map(|_| r2.clone()),
                end,
                is_abstract: true,
                is_null: false,
            });
            self.ibgp_neighbors.insert(id, n1.clone());
            by_pair.insert((r1.clone(), r2.clone()), id);
        }
        for ((r1, r2), &id) in &by_pair {
            if let Some(&other) = by_pair.get(&(r2.clone(), r1.clone())) {
                self.other_end.insert(id, other);
            }
        }

        let mut next_id = 1;
        for ((r1, r2), n) in &sessions {
            if !self.originator_ids.contains_key(r1) {
                self.originator_ids.insert(r1.clone(), next_id);
                next_id += 1;
            }
            let clients = self.route_reflector_clients.entry(r1.clone()).or_default();
            if n.route_reflector_client {
                clients.insert(r2.clone());
                self.route_reflector_parent.insert(r2.clone(), r1.clone());
            }
        }
    }

    pub fn configurations(&self) -> &BTreeMap<String, Configuration> {
        &self.configurations
    }

    pub fn configuration(&self, router: &str) -> Option<&Configuration> {
        self.configurations.get(router)
    }

    pub fn routers(&self) -> impl Iterator<Item = &String> {
        self.configurations.keys()
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn edge(&self, id: EdgeId) -> &GraphEdge {
        &self.edges[id]
    }

    /// Edges leaving `router`, physical ones first.
    pub fn edges_of(&self, router: &str) -> impl Iterator<Item = &GraphEdge> {
        self.edge_map
            .get(router)
            .map(Vec::as_slice)
            .unwrap_or(&[])
            .iter()
            .map(|&id| &self.edges[id])
    }

    pub fn other_end(&self, id: EdgeId) -> Option<&GraphEdge> {
        self.other_end.get(&id).map(|&o| &self.edges[o])
    }

    pub fn static_routes(&self, router: &str, iface: &str) -> &[StaticRoute] {
        self.static_routes
            .get(router)
            .and_then(|m| m.get(iface))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn ebgp_neighbor(&self, id: EdgeId) -> Option<&BgpNeighbor> {
        self.ebgp_neighbors.get(&id)
    }

    pub fn ibgp_neighbor(&self, id: EdgeId) -> Option<&BgpNeighbor> {
        self.ibgp_neighbors.get(&id)
    }

    pub fn find_bgp_neighbor(&self, edge: &GraphEdge) -> Option<&BgpNeighbor> {
        if edge.is_abstract {
            self.ibgp_neighbor(edge.id)
        } else {
            self.ebgp_neighbor(edge.id)
        }
    }

    pub fn route_reflector_parent(&self, router: &str) -> Option<&str> {
        self.route_reflector_parent.get(router).map(String::as_str)
    }

    pub fn has_route_reflectors(&self) -> bool {
        !self.route_reflector_parent.is_empty()
    }

    pub fn originator_ids(&self) -> &BTreeMap<String, i64> {
        &self.originator_ids
    }

    pub fn originator_id(&self, router: &str) -> Option<i64> {
        self.originator_ids.get(router).copied()
    }

    pub fn max_originator_id(&self) -> i64 {
        self.originator_ids.values().copied().max().unwrap_or(0)
    }

    pub fn area_ids(&self, router: &str) -> Option<&BTreeSet<u64>> {
        self.area_ids.get(router)
    }

    pub fn all_area_ids(&self) -> BTreeSet<u64> {
        self.area_ids.values().flatten().copied().collect()
    }

    pub fn communities(&self) -> &CommunityTable {
        &self.communities
    }

    /// A peerless edge with an external BGP neighbor.
    pub fn is_external(&self, edge: &GraphEdge) -> bool {
        edge.peer.is_none() && self.ebgp_neighbor(edge.id).is_some()
    }

    pub fn peer_type(&self, edge: &GraphEdge) -> Option<BgpSendType> {
        if self.ebgp_neighbor(edge.id).is_some() {
            return Some(BgpSendType::ToEbgp);
        }
        self.ibgp_neighbor(edge.id)?;
        let peer = edge.peer.as_deref().or_else(|| {
            edge.start
                .name
                .strip_prefix(IBGP_INTERFACE_PREFIX)
        })?;
        let is_client_of = |parent: &str, child: &str| {
            self.route_reflector_clients
                .get(parent)
                .is_some_and(|cs| cs.contains(child))
        };
        Some(if is_client_of(peer, &edge.router) {
            BgpSendType::ToRr
        } else if is_client_of(&edge.router, peer) {
            BgpSendType::ToClient
        } else {
            BgpSendType::ToNonClient
        })
    }

    pub fn is_interface_active(proto: Protocol, iface: &Interface) -> bool {
        if proto.is_ospf() {
            iface.active && iface.ospf_enabled
        } else {
            iface.active
        }
    }

    /// Whether `proto` can exchange routes over `edge`.
    pub fn is_edge_used(&self, proto: Protocol, edge: &GraphEdge) -> bool {
        if edge.is_null {
            return proto == Protocol::Static;
        }
        if !Self::is_interface_active(proto, &edge.start) {
            return false;
        }
        if edge.is_abstract {
            return proto.is_bgp();
        }
        if edge.start.is_loopback() {
            return proto == Protocol::Connected;
        }
        if edge.peer.is_none() && proto.is_ospf() {
            return false;
        }
        match proto {
            Protocol::Static => !self.static_routes(&edge.router, &edge.start.name).is_empty(),
            Protocol::Bgp => self.find_bgp_neighbor(edge).is_some(),
            _ => true,
        }
    }

    fn named_policy<'a>(
        conf: &'a Configuration,
        name: Option<&String>,
    ) -> EncodeResult<Option<&'a RoutingPolicy>> {
        match name {
            None => Ok(None),
            Some(n) => conf.routing_policies.get(n).map(Some).ok_or_else(|| {
                EncodeError::InvalidConfig(format!(
                    "router {} references undefined routing policy {n}",
                    conf.hostname
                ))
            }),
        }
    }

    /// The policy a protocol applies to everything it redistributes.
    pub fn find_common_policy<'a>(
        conf: &'a Configuration,
        proto: Protocol,
    ) -> EncodeResult<Option<&'a RoutingPolicy>> {
        match proto {
            Protocol::Ospf => {
                Self::named_policy(conf, conf.ospf.as_ref().and_then(|o| o.export_policy.as_ref()))
            }
            Protocol::Bgp => Self::named_policy(
                conf,
                conf.bgp.as_ref().and_then(|b| b.common_export_policy.as_ref()),
            ),
            _ => Ok(None),
        }
    }

    pub fn find_import_policy(
        &self,
        router: &str,
        proto: Protocol,
        edge: &GraphEdge,
    ) -> EncodeResult<Option<&RoutingPolicy>> {
        let Some(conf) = self.configuration(router) else {
            return Ok(None);
        };
        if !proto.is_bgp() {
            return Ok(None);
        }
        let name = self
            .find_bgp_neighbor(edge)
            .and_then(|n| n.import_policy.as_ref());
        Self::named_policy(conf, name)
    }

    pub fn find_export_policy(
        &self,
        router: &str,
        proto: Protocol,
        edge: &GraphEdge,
    ) -> EncodeResult<Option<&RoutingPolicy>> {
        let Some(conf) = self.configuration(router) else {
            return Ok(None);
        };
        match proto {
            Protocol::Ospf => Self::find_common_policy(conf, proto),
            Protocol::Bgp => {
                let name = self
                    .find_bgp_neighbor(edge)
                    .and_then(|n| n.export_policy.as_ref());
                Self::named_policy(conf, name)
            }
            _ => Ok(None),
        }
    }

    /// Prefixes `router` injects into `proto` on its own.
    pub fn originated_networks(&self, router: &str, proto: Protocol) -> EncodeResult<BTreeSet<Prefix>> {
        let mut acc = BTreeSet::new();
        let Some(conf) = self.configuration(router) else {
            return Ok(acc);
        };
        match proto {
            Protocol::Ospf => {
                if conf.ospf.is_some() {
                    acc.extend(
                        conf.interfaces
                            .iter()
                            .filter(|i| i.active && i.ospf_enabled)
                            .filter_map(Interface::prefix),
                    );
                }
            }
            Protocol::Bgp => {
                let Some(bgp) = &conf.bgp else {
                    return Ok(acc);
                };
                if let Some(list) = bgp
                    .network_list
                    .as_ref()
                    .and_then(|n| conf.route_filter_lists.get(n))
                {
                    acc.extend(list.lines.iter().map(|l| l.prefix));
                }
                if let Some(pol) = Self::find_common_policy(conf, Protocol::Bgp)? {
                    AstVisitor::new(conf).visit(&pol.statements, &mut |_| {}, &mut |expr| {
                        acc.extend(network_statement_prefixes(expr));
                    });
                }
            }
            Protocol::Connected => {
                acc.extend(conf.interfaces.iter().filter_map(Interface::prefix));
            }
            Protocol::Static => {
                acc.extend(
                    conf.static_routes
                        .iter()
                        .filter(|sr| !sr.is_null_routed())
                        .map(|sr| sr.network),
                );
            }
            Protocol::Best => {}
        }
        Ok(acc)
    }

    /// Protocols other than `proto` that `policy` may redistribute, judged
    /// by the protocol matches it contains.
    pub fn find_redistributed_protocols(
        conf: &Configuration,
        policy: &RoutingPolicy,
        proto: Protocol,
    ) -> BTreeSet<Protocol> {
        let mut protos = BTreeSet::new();
        AstVisitor::new(conf).visit(&policy.statements, &mut |_| {}, &mut |expr| {
            if let BooleanExpr::MatchProtocol(rps) = expr {
                protos.extend(
                    rps.iter()
                        .filter_map(|&rp| Protocol::from_routing_protocol(rp))
                        .filter(|&p| p != proto),
                );
            }
        });
        protos
    }

    /// Router id of whoever sends routes over `edge` for `proto`.
    pub fn find_router_id(&self, edge: &GraphEdge, proto: Protocol) -> EncodeResult<i64> {
        if !proto.is_bgp() {
            return Ok(0);
        }
        if let Some(other) = self.other_end(edge.id) {
            if let Some(bgp) = self
                .configuration(&other.router)
                .and_then(|c| c.bgp.as_ref())
            {
                return Ok(bgp.router_id.as_i64());
            }
        }
        match self.find_bgp_neighbor(edge) {
            Some(n) => Ok(n.address.network().as_i64()),
            None => Err(EncodeError::InvalidConfig(format!(
                "unable to find a router id for edge {edge}"
            ))),
        }
    }
}

/// `MatchPrefixSet(explicit) AND NOT MatchProtocol(bgp)` is how a BGP
/// `network` statement appears in a common export policy.
fn network_statement_prefixes(expr: &BooleanExpr) -> Vec<Prefix> {
    let BooleanExpr::Conjunction(cs) = expr else {
        return Vec::new();
    };
    match cs.as_slice() {
        [BooleanExpr::MatchPrefixSet(PrefixSetExpr::Explicit(ranges)), BooleanExpr::Not(inner), ..] =>
        {
            match inner.as_ref() {
                BooleanExpr::MatchProtocol(ps) if ps.contains(&RoutingProtocol::Bgp) => {
                    ranges.iter().map(|r| r.prefix).collect()
                }
                _ => Vec::new(),
            }
        }
        _ => Vec::new(),
    }
}

fn ibgp_interface(n: &BgpNeighbor, peer: &str) -> Interface {
    Interface::new(format!("{IBGP_INTERFACE_PREFIX}{peer}")).with_address(InterfaceAddress {
        ip: n.address.network(),
        length: 32,
    })
}

/// Directed iBGP sessions `(local, remote) -> local neighbor config`.
///
/// A neighbor statement reaches `remote` when its address covers one of
/// the local addresses `remote` uses for its own iBGP sessions, or one of
/// its interface addresses when it names none.
fn ibgp_sessions(
    configurations: &BTreeMap<String, Configuration>,
) -> BTreeMap<(String, String), BgpNeighbor> {
    let mut local_ips: BTreeMap<&str, BTreeSet<Ip>> = BTreeMap::new();
    for (name, conf) in configurations {
        let Some(bgp) = &conf.bgp else {
            continue;
        };
        let ips = local_ips.entry(name.as_str()).or_default();
        for n in bgp.neighbors.iter().filter(|n| n.is_ibgp()) {
            match n.local_ip {
                Some(ip) => {
                    ips.insert(ip);
                }
                None => ips.extend(conf.interfaces.iter().filter_map(|i| i.address.map(|a| a.ip))),
            }
        }
    }

    let mut sessions = BTreeMap::new();
    for (local, conf) in configurations {
        let Some(bgp) = &conf.bgp else {
            continue;
        };
        for n in bgp.neighbors.iter().filter(|n| n.is_ibgp()) {
            for (candidate, ips) in &local_ips {
                if *candidate != local.as_str() && ips.iter().any(|ip| n.address.contains_ip(*ip)) {
                    sessions.insert((local.clone(), candidate.to_string()), n.clone());
                }
            }
        }
    }
    sessions
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_config::BgpProcess;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn iface(name: &str, addr: &str) -> Result<Interface, Box<dyn std::error::Error>> {
        Ok(Interface::new(name).with_address(addr.parse()?))
    }

    fn two_routers() -> Result<Network, Box<dyn std::error::Error>> {
        let mut a = Configuration::new("a");
        a.interfaces.push(iface("eth0", "10.0.0.1/30")?);
        a.interfaces.push(iface("eth1", "192.168.1.1/24")?);
        let mut b = Configuration::new("b");
        b.interfaces.push(iface("eth0", "10.0.0.2/30")?);
        Ok(Network::new(vec![a, b])?)
    }

    #[test]
    fn matching_subnets_become_edge_pairs() -> TestResult {
        let g = Graph::new(&two_routers()?)?;
        let a_edges: Vec<&GraphEdge> = g.edges_of("a").collect();
        assert_eq!(a_edges.len(), 2);
        assert_eq!(a_edges[0].peer.as_deref(), Some("b"));
        assert_eq!(a_edges[1].peer, None);
        let other = g.other_end(a_edges[0].id).ok_or("missing other end")?;
        assert_eq!(other.router, "b");
        assert_eq!(g.other_end(other.id).map(|e| e.id), Some(a_edges[0].id));
        Ok(())
    }

    #[test]
    fn restriction_turns_outside_peers_into_peerless_edges() -> TestResult {
        let routers: BTreeSet<String> = ["a".to_string()].into();
        let g = Graph::restricted(&two_routers()?, &routers)?;
        assert!(g.edges_of("a").all(|e| e.peer.is_none()));
        assert_eq!(g.edges_of("b").count(), 0);
        Ok(())
    }

    #[test]
    fn unresolved_static_route_is_fatal() -> TestResult {
        let mut net = two_routers()?;
        let mut confs: Vec<Configuration> = net.configurations().values().cloned().collect();
        confs[0].static_routes.push(StaticRoute {
            network: "8.8.8.0/24".parse()?,
            next_hop_interface: None,
            next_hop_ip: Some("172.16.0.1".parse()?),
            administrative_cost: 1,
        });
        net = Network::new(confs)?;
        assert!(matches!(
            Graph::new(&net),
            Err(EncodeError::UnresolvedStaticRoute { .. })
        ));
        Ok(())
    }

    #[test]
    fn static_routes_bind_by_next_hop_ip_and_null_routes_get_an_edge() -> TestResult {
        let mut confs: Vec<Configuration> =
            two_routers()?.configurations().values().cloned().collect();
        confs[0].static_routes.push(StaticRoute {
            network: "8.8.8.0/24".parse()?,
            next_hop_interface: None,
            next_hop_ip: Some("10.0.0.2".parse()?),
            administrative_cost: 1,
        });
        confs[0].static_routes.push(StaticRoute {
            network: "9.9.9.0/24".parse()?,
            next_hop_interface: Some(NULL_INTERFACE_NAME.into()),
            next_hop_ip: None,
            administrative_cost: 1,
        });
        let g = Graph::new(&Network::new(confs)?)?;
        assert_eq!(g.static_routes("a", "eth0").len(), 1);
        let null_edge = g.edges_of("a").find(|e| e.is_null).ok_or("no null edge")?;
        assert!(g.is_edge_used(Protocol::Static, null_edge));
        assert!(!g.is_edge_used(Protocol::Connected, null_edge));
        Ok(())
    }

    fn bgp(router_id: &str, neighbors: Vec<BgpNeighbor>) -> Result<BgpProcess, Box<dyn std::error::Error>> {
        Ok(BgpProcess {
            router_id: router_id.parse()?,
            neighbors,
            multipath_ebgp: false,
            multipath_ibgp: false,
            network_list: None,
            common_export_policy: None,
        })
    }

    fn neighbor(addr: &str, local: &str, asn: u32, rr_client: bool) -> Result<BgpNeighbor, Box<dyn std::error::Error>> {
        Ok(BgpNeighbor {
            address: addr.parse()?,
            local_as: 1,
            remote_as: asn,
            local_ip: Some(local.parse()?),
            import_policy: None,
            export_policy: None,
            route_reflector_client: rr_client,
            send_community: false,
        })
    }

    #[test]
    fn ibgp_sessions_become_abstract_edges_with_reflector_roles() -> TestResult {
        let mut rr = Configuration::new("rr");
        rr.interfaces.push(iface("lo0", "1.1.1.1/32")?);
        rr.bgp = Some(bgp("1.1.1.1", vec![neighbor("2.2.2.2", "1.1.1.1", 1, true)?])?);
        let mut c = Configuration::new("c");
        c.interfaces.push(iface("lo0", "2.2.2.2/32")?);
        c.interfaces.push(iface("eth0", "10.1.0.1/30")?);
        c.bgp = Some(bgp(
            "2.2.2.2",
            vec![
                neighbor("1.1.1.1", "2.2.2.2", 1, false)?,
                neighbor("10.1.0.2", "10.1.0.1", 2, false)?,
            ],
        )?);
        let g = Graph::new(&Network::new(vec![rr, c])?)?;

        let down = g
            .edges_of("rr")
            .find(|e| e.is_abstract)
            .ok_or("no iBGP edge on rr")?;
        assert_eq!(down.start.name, "iBGP-c");
        assert_eq!(down.peer.as_deref(), Some("c"));
        assert_eq!(g.peer_type(down), Some(BgpSendType::ToClient));
        let up = g.other_end(down.id).ok_or("no reverse session")?;
        assert_eq!(g.peer_type(up), Some(BgpSendType::ToRr));
        assert_eq!(g.route_reflector_parent("c"), Some("rr"));
        assert_eq!(g.originator_id("c"), Some(1));
        assert_eq!(g.originator_id("rr"), Some(2));

        let ext = g
            .edges_of("c")
            .find(|e| e.start.name == "eth0")
            .ok_or("no eth0")?;
        assert!(g.is_external(ext));
        assert_eq!(g.peer_type(ext), Some(BgpSendType::ToEbgp));
        assert_eq!(g.find_router_id(ext, Protocol::Bgp)?, "10.1.0.2".parse::<Ip>()?.as_i64());
        assert_eq!(g.find_router_id(up, Protocol::Bgp)?, "1.1.1.1".parse::<Ip>()?.as_i64());
        Ok(())
    }

    #[test]
    fn undefined_common_export_policy_fails_origin_lookup() -> TestResult {
        let mut confs: Vec<Configuration> =
            two_routers()?.configurations().values().cloned().collect();
        let mut process = bgp("1.1.1.1", Vec::new())?;
        process.common_export_policy = Some("MISSING".into());
        confs[0].bgp = Some(process);
        let g = Graph::new(&Network::new(confs)?)?;

        assert!(matches!(
            g.originated_networks("a", Protocol::Bgp),
            Err(EncodeError::InvalidConfig(_))
        ));
        assert_eq!(g.originated_networks("a", Protocol::Connected)?.len(), 2);
        assert!(g.originated_networks("b", Protocol::Bgp)?.is_empty());
        Ok(())
    }
}
