use std::collections::BTreeMap;

use netverify_smt::terms::SmtTerm;

use crate::context::EncodingContext;
use crate::graph::{EdgeId, Graph, GraphEdge};

/// Link and node failure indicators shared by every slice of an encoder.
///
/// Each indicator is an integer in `{0, 1}`. A physical link and an iBGP
/// session between the same pair of routers share one indicator.
#[derive(Debug, Clone, Default)]
pub struct SymbolicFailures {
    internal_links: BTreeMap<(String, String), SmtTerm>,
    edge_links: BTreeMap<EdgeId, SmtTerm>,
    nodes: BTreeMap<String, SmtTerm>,
}

impl SymbolicFailures {
    pub fn new(ctx: &mut EncodingContext, graph: &Graph, encoder_id: usize) -> Self {
        let mut failures = SymbolicFailures::default();
        for router in graph.routers() {
            let var = ctx.declare_int(format!("{encoder_id}_FAILED-NODE_{router}"));
            failures.nodes.insert(router.clone(), var);
        }
        for edge in graph.edges() {
            if edge.is_null {
                continue;
            }
            match &edge.peer {
                Some(peer) => {
                    let key = ordered(&edge.router, peer);
                    if !failures.internal_links.contains_key(&key) {
                        let var =
                            ctx.declare_int(format!("{encoder_id}_FAILED-EDGE_{}_{}", key.0, key.1));
                        failures.internal_links.insert(key, var);
                    }
                }
                None => {
                    let var = ctx.declare_int(format!(
                        "{encoder_id}_FAILED-EDGE_{}_{}",
                        edge.router, edge.start.name
                    ));
                    failures.edge_links.insert(edge.id, var);
                }
            }
        }
        failures
    }

    /// Indicator for the link carrying `edge`. Null-route edges never fail.
    pub fn failed_variable(&self, edge: &GraphEdge) -> SmtTerm {
        let found = match &edge.peer {
            Some(peer) => self.internal_links.get(&ordered(&edge.router, peer)),
            None => self.edge_links.get(&edge.id),
        };
        found.cloned().unwrap_or_else(|| SmtTerm::int(0))
    }

    pub fn failed_start_variable(&self, edge: &GraphEdge) -> SmtTerm {
        self.node(&edge.router)
    }

    /// Indicator for the far router, or `None` for peerless edges.
    pub fn failed_peer_variable(&self, edge: &GraphEdge) -> Option<SmtTerm> {
        edge.peer.as_deref().map(|p| self.node(p))
    }

    pub fn node(&self, router: &str) -> SmtTerm {
        self.nodes
            .get(router)
            .cloned()
            .unwrap_or_else(|| SmtTerm::int(0))
    }

    pub fn internal_links(&self) -> &BTreeMap<(String, String), SmtTerm> {
        &self.internal_links
    }

    pub fn edge_links(&self) -> &BTreeMap<EdgeId, SmtTerm> {
        &self.edge_links
    }

    pub fn nodes(&self) -> &BTreeMap<String, SmtTerm> {
        &self.nodes
    }

    /// Every link indicator: router pairs first, then peerless edges.
    pub fn link_variables(&self) -> impl Iterator<Item = &SmtTerm> {
        self.internal_links.values().chain(self.edge_links.values())
    }
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_config::{Configuration, Interface, Network};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn one_indicator_per_router_pair_and_peerless_edge() -> TestResult {
        let mut a = Configuration::new("b");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        a.interfaces
            .push(Interface::new("eth1").with_address("172.16.0.1/24".parse()?));
        let mut b = Configuration::new("a");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        let graph = Graph::new(&Network::new(vec![a, b])?)?;

        let mut ctx = EncodingContext::new();
        let f = SymbolicFailures::new(&mut ctx, &graph, 0);
        assert_eq!(f.internal_links().len(), 1);
        assert_eq!(f.edge_links().len(), 1);
        assert_eq!(f.nodes().len(), 2);
        assert!(ctx.sort_of("0_FAILED-EDGE_a_b").is_some());
        assert!(ctx.sort_of("0_FAILED-EDGE_b_eth1").is_some());

        let both: Vec<SmtTerm> = graph
            .edges()
            .iter()
            .filter(|e| e.peer.is_some())
            .map(|e| f.failed_variable(e))
            .collect();
        assert_eq!(both.len(), 2);
        assert_eq!(both[0], both[1]);
        Ok(())
    }
}
