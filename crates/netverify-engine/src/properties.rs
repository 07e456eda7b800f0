//! Relations layered over a slice's forwarding variables: reachability,
//! path length, load and loop membership.
//!
//! Each relation is a recursive definition handed to the solver as is.
//! Reachability ranks routers with integer ids that strictly decrease
//! along the forwarding path, so a forwarding loop can never make its
//! members reachable.

use std::collections::{BTreeMap, BTreeSet};

use netverify_smt::terms::SmtTerm;

use crate::context::EncodingContext;
use crate::graph::{EdgeId, GraphEdge};
use crate::protocol::Protocol;
use crate::slice::EncoderSlice;

/// Adds property relations for one slice.
pub struct PropertyAdder<'a> {
    slice: &'a EncoderSlice,
}

/// Pairwise equality of consecutive terms.
pub fn all_equal(terms: &[SmtTerm]) -> SmtTerm {
    SmtTerm::and(
        terms
            .windows(2)
            .map(|w| w[0].clone().eq(w[1].clone()))
            .collect(),
    )
}

impl<'a> PropertyAdder<'a> {
    pub fn new(slice: &'a EncoderSlice) -> Self {
        PropertyAdder { slice }
    }

    fn var_name(&self, relation: &str, router: &str) -> String {
        format!(
            "{}_{}_{relation}_{router}",
            self.slice.encoder_id(),
            self.slice.name()
        )
    }

    fn forwards(&self, edge: &GraphEdge) -> SmtTerm {
        self.slice
            .forwards_across(edge.id)
            .cloned()
            .unwrap_or_else(SmtTerm::ff)
    }

    /// Physical edges of `router` that lead to another modeled router.
    fn peer_edges(&self, router: &str) -> Vec<(&'a GraphEdge, &'a str)> {
        let graph = self.slice.graph();
        graph
            .edges_of(router)
            .filter(|e| !e.is_abstract)
            .filter_map(|e| e.peer.as_deref().map(|p| (e, p)))
            .collect()
    }

    /// The packet leaves through a destination edge directly, or is
    /// delivered to the address of a destination interface by a
    /// connected route.
    fn arrives_directly(&self, router: &str, dests: &BTreeSet<EdgeId>) -> SmtTerm {
        let connected = self
            .slice
            .optimizations()
            .protocols(router)
            .contains(&Protocol::Connected)
            .then(|| self.slice.best_vars(router, Protocol::Connected))
            .flatten();
        let mut options = Vec::new();
        for ge in self
            .slice
            .graph()
            .edges_of(router)
            .filter(|e| !e.is_abstract && dests.contains(&e.id))
        {
            if ge.peer.is_none() {
                options.push(self.forwards(ge));
            }
            if let (Some(best), Some(ip)) = (connected, ge.start_ip()) {
                options.push(SmtTerm::and(vec![
                    best.permitted.clone(),
                    self.slice
                        .packet()
                        .dst_ip
                        .clone()
                        .eq(SmtTerm::int(ip.as_i64())),
                ]));
            }
        }
        SmtTerm::or(options)
    }

    fn reachability_vars(
        &self,
        ctx: &mut EncodingContext,
    ) -> (BTreeMap<String, SmtTerm>, BTreeMap<String, SmtTerm>) {
        let mut reachable = BTreeMap::new();
        let mut ids = BTreeMap::new();
        for router in self.slice.graph().routers() {
            let id = ctx.declare_int(self.var_name("reachable-id", router));
            let reach = ctx.declare_bool(self.var_name("reachable", router));
            ctx.add(reach.clone().eq(id.clone().gt(SmtTerm::int(0))));
            ctx.add(id.clone().ge(SmtTerm::int(0)));
            ids.insert(router.clone(), id);
            reachable.insert(router.clone(), reach);
        }
        (reachable, ids)
    }

    /// Reachable through a neighbor with a smaller positive id; id 0 when
    /// no such neighbor is forwarded to.
    fn recursive_reachability(&self, router: &str, ids: &BTreeMap<String, SmtTerm>) -> SmtTerm {
        let zero = || SmtTerm::int(0);
        let Some(id) = ids.get(router) else {
            return SmtTerm::tt();
        };
        let mut some_route = Vec::new();
        let mut larger = Vec::new();
        for (edge, peer) in self.peer_edges(router) {
            let Some(peer_id) = ids.get(peer) else {
                continue;
            };
            let sends = SmtTerm::and(vec![self.forwards(edge), peer_id.clone().gt(zero())]);
            larger.push(sends.clone().implies(id.clone().gt(peer_id.clone())));
            some_route.push(sends);
        }
        SmtTerm::ite(
            SmtTerm::or(some_route),
            SmtTerm::and(larger),
            id.clone().eq(zero()),
        )
    }

    /// Per router: some packet path from it leaves the network through one
    /// of `dests`.
    pub fn instrument_reachability(
        &self,
        ctx: &mut EncodingContext,
        dests: &BTreeSet<EdgeId>,
    ) -> BTreeMap<String, SmtTerm> {
        let (reachable, ids) = self.reachability_vars(ctx);
        for router in self.slice.graph().routers() {
            let Some(id) = ids.get(router) else {
                continue;
            };
            let base = self.arrives_directly(router, dests);
            let recursive = self.recursive_reachability(router, &ids);
            ctx.add(SmtTerm::ite(base, id.clone().eq(SmtTerm::int(1)), recursive));
        }
        reachable
    }

    /// Per router: the packet is forwarded hop by hop to `target`.
    pub fn instrument_reachability_to(
        &self,
        ctx: &mut EncodingContext,
        target: &str,
    ) -> BTreeMap<String, SmtTerm> {
        let (reachable, ids) = self.reachability_vars(ctx);
        if let Some(base) = ids.get(target) {
            ctx.add(base.clone().eq(SmtTerm::int(1)));
        }
        for router in self.slice.graph().routers().filter(|r| *r != target) {
            ctx.add(self.recursive_reachability(router, &ids));
        }
        reachable
    }

    /// Per router: hops to a destination edge, or -1 without a path.
    pub fn instrument_path_length(
        &self,
        ctx: &mut EncodingContext,
        dests: &BTreeSet<EdgeId>,
    ) -> BTreeMap<String, SmtTerm> {
        let lens: BTreeMap<String, SmtTerm> = self
            .slice
            .graph()
            .routers()
            .map(|r| (r.clone(), ctx.declare_int(self.var_name("path-length", r))))
            .collect();
        let zero = || SmtTerm::int(0);
        let none = || SmtTerm::int(-1);
        for len in lens.values() {
            ctx.add(len.clone().ge(none()));
        }

        for (router, len) in &lens {
            let base = self.arrives_directly(router, dests);
            let mut acc_none = Vec::new();
            let mut acc_some = Vec::new();
            for (edge, peer) in self.peer_edges(router) {
                let Some(peer_len) = lens.get(peer) else {
                    continue;
                };
                let fwd = self.forwards(edge);
                acc_none.push(SmtTerm::or(vec![peer_len.clone().lt(zero()), fwd.clone().not()]));
                acc_some.push(SmtTerm::and(vec![
                    peer_len.clone().ge(zero()),
                    fwd,
                    len.clone().eq(peer_len.clone().add(SmtTerm::int(1))),
                ]));
            }
            let recursive = SmtTerm::ite(
                SmtTerm::and(acc_none),
                len.clone().eq(none()),
                SmtTerm::or(acc_some),
            );
            ctx.add(SmtTerm::ite(base, len.clone().eq(zero()), recursive));
        }
        lens
    }

    /// Per router: units of traffic it carries towards the destination
    /// edges, each forwarding neighbor adding its own load.
    pub fn instrument_load(
        &self,
        ctx: &mut EncodingContext,
        dests: &BTreeSet<EdgeId>,
    ) -> BTreeMap<String, SmtTerm> {
        let loads: BTreeMap<String, SmtTerm> = self
            .slice
            .graph()
            .routers()
            .map(|r| (r.clone(), ctx.declare_int(self.var_name("load", r))))
            .collect();
        for load in loads.values() {
            ctx.add(load.clone().ge(SmtTerm::int(0)));
        }

        for (router, load) in &loads {
            let base = self.arrives_directly(router, dests);
            let parts: Vec<SmtTerm> = self
                .peer_edges(router)
                .into_iter()
                .filter_map(|(edge, peer)| {
                    let peer_load = loads.get(peer)?;
                    Some(SmtTerm::ite(self.forwards(edge), peer_load.clone(), SmtTerm::int(0)))
                })
                .collect();
            ctx.add(SmtTerm::ite(
                base,
                load.clone().eq(SmtTerm::int(1)),
                load.clone().eq(SmtTerm::sum(parts)),
            ));
        }
        loads
    }

    /// True when packets from `target` can come back to it.
    pub fn instrument_loop(&self, ctx: &mut EncodingContext, target: &str) -> SmtTerm {
        let on_loop: BTreeMap<String, SmtTerm> = self
            .slice
            .graph()
            .routers()
            .map(|r| {
                let name = self.var_name(&format!("on-loop_{target}"), r);
                (r.clone(), ctx.declare_bool(name))
            })
            .collect();

        for (router, var) in &on_loop {
            let mut acc = Vec::new();
            for (edge, peer) in self.peer_edges(router) {
                let fwd = self.forwards(edge);
                if peer == target {
                    acc.push(fwd);
                } else if let Some(peer_on_loop) = on_loop.get(peer) {
                    acc.push(SmtTerm::and(vec![fwd, peer_on_loop.clone()]));
                }
            }
            ctx.add(var.clone().eq(SmtTerm::or(acc)));
        }
        on_loop.get(target).cloned().unwrap_or_else(SmtTerm::ff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryConfig;
    use crate::slice::MAIN_SLICE_NAME;
    use crate::graph::Graph;
    use netverify_config::{Configuration, Interface, Network};
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn line() -> Result<(EncodingContext, EncoderSlice), Box<dyn std::error::Error>> {
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        let mut b = Configuration::new("b");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        b.interfaces
            .push(Interface::new("eth1").with_address("192.168.0.1/24".parse()?));
        let graph = Arc::new(Graph::new(&Network::new(vec![a, b])?)?);
        let query = Arc::new(QueryConfig::default());
        let mut ctx = EncodingContext::new();
        let hs = query.header_space.clone();
        let slice = EncoderSlice::new(&mut ctx, 0, MAIN_SLICE_NAME, graph, query, hs, None)?;
        Ok((ctx, slice))
    }

    #[test]
    fn all_equal_chains_neighbors() {
        let xs = [SmtTerm::var("x"), SmtTerm::var("y"), SmtTerm::var("z")];
        let expected = SmtTerm::and(vec![
            SmtTerm::var("x").eq(SmtTerm::var("y")),
            SmtTerm::var("y").eq(SmtTerm::var("z")),
        ]);
        assert_eq!(all_equal(&xs), expected);
        assert!(all_equal(&xs[..1]).simplify().is_true());
    }

    #[test]
    fn reachability_declares_ids_per_router() -> TestResult {
        let (mut ctx, slice) = line()?;
        let dest: BTreeSet<EdgeId> = slice
            .graph()
            .edges_of("b")
            .filter(|e| e.start.name == "eth1")
            .map(|e| e.id)
            .collect();
        let reach = PropertyAdder::new(&slice).instrument_reachability(&mut ctx, &dest);
        assert_eq!(reach.len(), 2);
        assert!(ctx.sort_of("0_SLICE-MAIN__reachable-id_a").is_some());
        assert_eq!(reach.get("b"), Some(&SmtTerm::var("0_SLICE-MAIN__reachable_b")));
        Ok(())
    }

    #[test]
    fn loop_target_is_its_own_on_loop_variable() -> TestResult {
        let (mut ctx, slice) = line()?;
        let on_loop = PropertyAdder::new(&slice).instrument_loop(&mut ctx, "a");
        assert_eq!(on_loop, SmtTerm::var("0_SLICE-MAIN__on-loop_a_a"));
        assert!(ctx.sort_of("0_SLICE-MAIN__on-loop_a_b").is_some());
        Ok(())
    }
}
