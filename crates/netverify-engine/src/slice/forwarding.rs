//! Control- and data-plane forwarding decisions.

use std::collections::BTreeMap;

use netverify_smt::terms::SmtTerm;

use crate::context::EncodingContext;
use crate::error::EncodeResult;
use crate::graph::{BgpSendType, EdgeId, GraphEdge};
use crate::protocol::Protocol;

use super::{EncoderSlice, SliceEnv};

impl EncoderSlice {
    /// A connected route forwards towards the neighbor only for the
    /// neighbor's own address; on a stub interface it forwards everything
    /// except the router's own address.
    fn connected_will_send(&self, ge: &GraphEdge) -> SmtTerm {
        let dst = &self.packet.dst_ip;
        match self.graph.other_end(ge.id) {
            Some(other) => match other.start_ip() {
                Some(ip) => dst.clone().eq(SmtTerm::int(ip.as_i64())),
                None => SmtTerm::ff(),
            },
            None => match ge.start_ip() {
                Some(ip) => dst.clone().eq(SmtTerm::int(ip.as_i64())).not(),
                None => SmtTerm::tt(),
            },
        }
    }

    /// A router forwards out of an edge exactly when one of the import
    /// edges over it carries the chosen best route.
    pub(super) fn add_control_forwarding_constraints(&self, ctx: &mut EncodingContext) -> EncodeResult<()> {
        for router in self.graph.routers() {
            let Some(best) = self.best_overall(router) else {
                continue;
            };
            let mut sends_by_edge: BTreeMap<EdgeId, Vec<SmtTerm>> = BTreeMap::new();

            for &proto in self.optimizations.protocols(router) {
                for le in self.import_edges(router, proto) {
                    let ge = self.graph.edge(le.key.edge);
                    let vars = self.correct_vars(le);
                    let choice = self
                        .decisions
                        .choice_variable(&le.key)
                        .cloned()
                        .unwrap_or_else(SmtTerm::ff);
                    let is_best = SmtTerm::and(vec![choice, self.equal(proto, best, vars, Some(le), false)?]);
                    let can_send = if proto == Protocol::Connected {
                        self.connected_will_send(ge)
                    } else {
                        SmtTerm::tt()
                    };
                    let sends = SmtTerm::and(vec![can_send, is_best]);
                    if let Some(cf) = self.decisions.control_forwarding(ge.id) {
                        ctx.add(sends.clone().implies(cf.clone()));
                    }
                    sends_by_edge.entry(ge.id).or_default().push(sends);
                }
            }

            for ge in self.graph.edges_of(router) {
                let Some(cf) = self.decisions.control_forwarding(ge.id) else {
                    continue;
                };
                match sends_by_edge.remove(&ge.id) {
                    Some(sends) => ctx.add(SmtTerm::or(sends).not().implies(cf.clone().not())),
                    None => ctx.add(cf.clone().not()),
                }
            }
        }
        Ok(())
    }

    /// Data forwarding out of a physical edge: the control plane picked the
    /// edge, directly or through an iBGP next hop resolved in that next
    /// hop's slice, and the outbound filter lets the packet through.
    pub(super) fn add_data_forwarding_constraints(&self, ctx: &mut EncodingContext, env: &SliceEnv<'_>) {
        for router in self.graph.routers() {
            let edges: Vec<&GraphEdge> = self.graph.edges_of(router).collect();
            for ge in edges.iter().filter(|ge| !ge.is_abstract) {
                let (Some(cf), Some(df)) = (
                    self.decisions.control_forwarding(ge.id),
                    self.decisions.data_forwarding(ge.id),
                ) else {
                    continue;
                };
                let mut fwd = vec![cf.clone()];
                if self.is_main() {
                    for abs in edges.iter().filter(|ge2| ge2.is_abstract) {
                        if let Some(via) = self.forwarding_via_ibgp(env, router, abs, ge) {
                            fwd.push(via);
                        }
                    }
                }
                let acl = self.outbound_acl(ge.id).cloned().unwrap_or_else(SmtTerm::tt);
                ctx.add(SmtTerm::and(vec![SmtTerm::or(fwd), acl]).eq(df.clone()));
            }
        }
    }

    /// `router` uses physical edge `ge` because it selected a route learned
    /// over iBGP edge `abs`, and the next hop's slice forwards out of `ge`.
    fn forwarding_via_ibgp(
        &self,
        env: &SliceEnv<'_>,
        router: &str,
        abs: &GraphEdge,
        ge: &GraphEdge,
    ) -> Option<SmtTerm> {
        let ctrl = self.decisions.control_forwarding(abs.id)?.clone();
        let out_edge = |owner: &str| {
            env.ibgp_slice(owner)
                .and_then(|s| s.decisions.data_forwarding(ge.id))
                .cloned()
        };
        if self.graph.peer_type(abs) == Some(BgpSendType::ToRr) {
            // Behind a reflector the next hop is the route's originator.
            let cid = self.best_overall(router)?.client_id.clone()?;
            let options: Vec<SmtTerm> = self
                .graph
                .originator_ids()
                .iter()
                .filter_map(|(r, &id)| {
                    let out = out_edge(r)?;
                    Some(SmtTerm::and(vec![cid.clone().eq(SmtTerm::int(id)), out]))
                })
                .collect();
            Some(SmtTerm::and(vec![ctrl, SmtTerm::or(options)]))
        } else {
            let peer = abs.peer.as_deref()?;
            Some(SmtTerm::and(vec![ctrl, out_edge(peer)?]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;
    use crate::query::QueryConfig;
    use crate::slice::MAIN_SLICE_NAME;
    use crate::symbolic::SymbolicFailures;
    use netverify_config::{Configuration, Interface, Network};
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn unused_edges_never_forward() -> TestResult {
        let mut a = Configuration::new("a");
        let mut down = Interface::new("eth0").with_address("10.0.0.1/30".parse()?);
        down.active = false;
        a.interfaces.push(down);
        let mut b = Configuration::new("b");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        let network = Network::new(vec![a, b])?;
        let graph = Arc::new(Graph::new(&network)?);
        let query = Arc::new(QueryConfig::default());
        let mut ctx = EncodingContext::new();
        let hs = query.header_space.clone();
        let slice = EncoderSlice::new(&mut ctx, 0, MAIN_SLICE_NAME, graph.clone(), query, hs, None)?;
        let _failures = SymbolicFailures::new(&mut ctx, &graph, 0);
        slice.add_control_forwarding_constraints(&mut ctx)?;

        let edge = graph
            .edges_of("a")
            .next()
            .ok_or("router a has no edge")?;
        let cf = slice
            .decisions()
            .control_forwarding(edge.id)
            .ok_or("no control forwarding variable")?;
        assert!(ctx.assertions().contains(&cf.clone().not()));
        Ok(())
    }
}
