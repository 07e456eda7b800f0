//! Route comparison and best-route selection.
//!
//! Records compared here may omit fields the optimization advisor proved
//! irrelevant. A missing field compares as the protocol default, so two
//! records built under different optimizations still compare correctly.

use netverify_smt::terms::SmtTerm;

use crate::context::EncodingContext;
use crate::error::EncodeResult;
use crate::logical_graph::LogicalEdge;
use crate::protocol::{Protocol, IBGP_ADMIN_DISTANCE};
use crate::query::BgpDecisionVariable;
use crate::symbolic::SymbolicRecord;

use super::EncoderSlice;

pub(crate) const DEFAULT_LOCAL_PREF: i64 = 100;
pub(crate) const DEFAULT_METRIC: i64 = 0;
pub(crate) const DEFAULT_LENGTH: i64 = 0;
pub(crate) const DEFAULT_IGP_METRIC: i64 = 0;
pub(crate) const DEFAULT_ID: i64 = 0;
pub(crate) const DEFAULT_OSPF_TYPE: i64 = 0;

pub(crate) fn default_med(proto: Protocol) -> i64 {
    if proto.is_bgp() {
        100
    } else {
        0
    }
}

/// Admin distance of `rec` when it does not carry one: the protocol
/// default, or the iBGP distance when the record is marked internal.
pub(crate) fn default_admin_distance(proto: Protocol, rec: &SymbolicRecord) -> SmtTerm {
    let def = SmtTerm::int(proto.default_admin_distance());
    match &rec.bgp_internal {
        Some(internal) => SmtTerm::ite(internal.clone(), SmtTerm::int(IBGP_ADMIN_DISTANCE), def),
        None => def,
    }
}

fn equal_helper(best: Option<&SmtTerm>, vars: Option<&SmtTerm>, default: SmtTerm) -> SmtTerm {
    match (best, vars) {
        (Some(b), Some(v)) => b.clone().eq(v.clone()),
        (Some(b), None) => b.clone().eq(default),
        (None, _) => SmtTerm::tt(),
    }
}

/// `best` is strictly better than `vars` on one field.
fn better_helper(best: Option<&SmtTerm>, vars: Option<&SmtTerm>, default: SmtTerm, less: bool) -> SmtTerm {
    let cmp = |b: SmtTerm, v: SmtTerm| if less { b.lt(v) } else { b.gt(v) };
    match (best, vars) {
        (Some(b), Some(v)) => cmp(b.clone(), v.clone()),
        (Some(b), None) => cmp(b.clone(), default),
        (None, _) => SmtTerm::ff(),
    }
}

/// `false < true` for the internal flag: external routes win.
fn better_internal(best: Option<&SmtTerm>, vars: Option<&SmtTerm>) -> SmtTerm {
    match (best, vars) {
        (Some(b), Some(v)) => SmtTerm::and(vec![b.clone().not(), v.clone()]),
        _ => SmtTerm::ff(),
    }
}

fn equal_internal(best: Option<&SmtTerm>, vars: Option<&SmtTerm>) -> SmtTerm {
    match (best, vars) {
        (Some(b), Some(v)) => b.clone().eq(v.clone()),
        (Some(b), None) => b.clone().not(),
        (None, _) => SmtTerm::tt(),
    }
}

/// `best` came from the same protocol as `vars`.
pub(crate) fn equal_histories(best: &SymbolicRecord, vars: &SymbolicRecord) -> SmtTerm {
    match (&best.history, &vars.history) {
        (None, _) => SmtTerm::tt(),
        (Some(b), None) => b.clone().eq(SmtTerm::int(vars.proto.history_code())),
        (Some(b), Some(v)) => b.clone().eq(v.clone()),
    }
}

fn equal_communities(best: &SymbolicRecord, vars: &SymbolicRecord) -> SmtTerm {
    SmtTerm::and(
        best.communities
            .iter()
            .map(|(c, b)| match vars.communities.get(c) {
                Some(v) => b.clone().eq(v.clone()),
                None => b.clone().not(),
            })
            .collect(),
    )
}

impl EncoderSlice {
    fn equal_areas(&self, best: &SymbolicRecord, vars: &SymbolicRecord, e: Option<&LogicalEdge>) -> SmtTerm {
        let (Some(e), Some(b)) = (e, &best.ospf_area) else {
            return SmtTerm::tt();
        };
        match (&vars.ospf_area, self.graph.edge(e.key.edge).start.ospf_area) {
            (Some(v), _) => b.clone().eq(v.clone()),
            (None, Some(area)) => b.clone().eq(SmtTerm::int(area as i64)),
            (None, None) => b.clone().eq(SmtTerm::int(0)),
        }
    }

    fn equal_types(best: &SymbolicRecord, vars: &SymbolicRecord) -> SmtTerm {
        match (&best.ospf_type, &vars.ospf_type) {
            (Some(b), Some(v)) => b.clone().eq(v.clone()),
            (Some(b), None) => b.clone().eq(SmtTerm::int(DEFAULT_OSPF_TYPE)),
            (None, _) => SmtTerm::tt(),
        }
    }

    fn equal_ids(
        &self,
        best: &SymbolicRecord,
        vars: &SymbolicRecord,
        proto: Protocol,
        e: Option<&LogicalEdge>,
    ) -> EncodeResult<SmtTerm> {
        Ok(match (&best.router_id, &vars.router_id, e) {
            (Some(b), Some(v), _) => b.clone().eq(v.clone()),
            (Some(b), None, Some(e)) => {
                let peer_id = self.graph.find_router_id(self.graph.edge(e.key.edge), proto)?;
                b.clone().eq(SmtTerm::int(peer_id))
            }
            _ => SmtTerm::tt(),
        })
    }

    fn equal_client_ids(&self, best: &SymbolicRecord, vars: &SymbolicRecord) -> SmtTerm {
        match (&best.client_id, &vars.client_id) {
            (None, _) => SmtTerm::tt(),
            (Some(b), Some(v)) => b.clone().eq(v.clone()),
            (Some(b), None) => {
                let id = self.graph.originator_id(&best.router).unwrap_or(DEFAULT_ID);
                b.clone().eq(SmtTerm::int(id))
            }
        }
    }

    /// Field-wise equality of `best` and `vars`, with absent fields of
    /// `vars` read as defaults.
    pub fn equal(
        &self,
        proto: Protocol,
        best: &SymbolicRecord,
        vars: &SymbolicRecord,
        e: Option<&LogicalEdge>,
        compare_communities: bool,
    ) -> EncodeResult<SmtTerm> {
        let ids = self.equal_ids(best, vars, proto, e)?;
        Ok(SmtTerm::and(vec![
            best.prefix_length.clone().eq(vars.prefix_length.clone()),
            equal_helper(
                best.admin_dist.as_ref(),
                vars.admin_dist.as_ref(),
                default_admin_distance(proto, vars),
            ),
            equal_helper(
                best.local_pref.as_ref(),
                vars.local_pref.as_ref(),
                SmtTerm::int(DEFAULT_LOCAL_PREF),
            ),
            best.metric.clone().eq(vars.metric.clone()),
            equal_helper(best.med.as_ref(), vars.med.as_ref(), SmtTerm::int(default_med(proto))),
            self.equal_areas(best, vars, e),
            Self::equal_types(best, vars),
            ids,
            equal_histories(best, vars),
            match (&best.bgp_internal, &vars.bgp_internal) {
                (Some(b), Some(v)) => b.clone().eq(v.clone()),
                _ => SmtTerm::tt(),
            },
            self.equal_client_ids(best, vars),
            equal_helper(
                best.igp_metric.as_ref(),
                vars.igp_metric.as_ref(),
                SmtTerm::int(DEFAULT_IGP_METRIC),
            ),
            if compare_communities {
                equal_communities(best, vars)
            } else {
                SmtTerm::tt()
            },
        ]))
    }

    /// `best` is preferred to or tied with `vars`, as a lexicographic
    /// comparison: prefix length, admin distance, the configured BGP
    /// ranking, OSPF type, then the lower router id.
    pub fn greater_or_equal(
        &self,
        proto: Protocol,
        best: &SymbolicRecord,
        vars: &SymbolicRecord,
        e: Option<&LogicalEdge>,
    ) -> EncodeResult<SmtTerm> {
        let default_admin = default_admin_distance(proto, vars);
        let default_med = SmtTerm::int(default_med(proto));
        let len = (Some(&best.prefix_length), Some(&vars.prefix_length));
        let met = (Some(&best.metric), Some(&vars.metric));

        let better_len = better_helper(len.0, len.1, SmtTerm::int(DEFAULT_LENGTH), false);
        let equal_len = equal_helper(len.0, len.1, SmtTerm::int(DEFAULT_LENGTH));
        let ad = (best.admin_dist.as_ref(), vars.admin_dist.as_ref());
        let better_ad = better_helper(ad.0, ad.1, default_admin.clone(), true);
        let equal_ad = equal_helper(ad.0, ad.1, default_admin);
        let ty = (best.ospf_type.as_ref(), vars.ospf_type.as_ref());
        let better_type = better_helper(ty.0, ty.1, SmtTerm::int(DEFAULT_OSPF_TYPE), true);
        let equal_type = equal_helper(ty.0, ty.1, SmtTerm::int(DEFAULT_OSPF_TYPE));

        let tiebreak = match (&best.router_id, &vars.router_id) {
            (Some(b), Some(v)) => b.clone().le(v.clone()),
            (Some(b), None) => match e {
                None => b.clone().le(SmtTerm::int(DEFAULT_ID)),
                Some(e) => {
                    let peer_id = self.graph.find_router_id(self.graph.edge(e.key.edge), proto)?;
                    b.clone().le(SmtTerm::int(peer_id))
                }
            },
            (None, _) => SmtTerm::tt(),
        };

        let ranking = |var: BgpDecisionVariable| -> (SmtTerm, SmtTerm) {
            match var {
                BgpDecisionVariable::LocalPref => {
                    let (b, v) = (best.local_pref.as_ref(), vars.local_pref.as_ref());
                    let def = SmtTerm::int(DEFAULT_LOCAL_PREF);
                    (better_helper(b, v, def.clone(), false), equal_helper(b, v, def))
                }
                BgpDecisionVariable::PathLen => {
                    let def = SmtTerm::int(DEFAULT_METRIC);
                    (
                        better_helper(met.0, met.1, def.clone(), true),
                        equal_helper(met.0, met.1, def),
                    )
                }
                BgpDecisionVariable::Med => {
                    let (b, v) = (best.med.as_ref(), vars.med.as_ref());
                    (
                        better_helper(b, v, default_med.clone(), true),
                        equal_helper(b, v, default_med.clone()),
                    )
                }
                BgpDecisionVariable::EbgpPrefIbgp => {
                    let (b, v) = (best.bgp_internal.as_ref(), vars.bgp_internal.as_ref());
                    (better_internal(b, v), equal_internal(b, v))
                }
                BgpDecisionVariable::IgpCost => {
                    let (b, v) = (best.igp_metric.as_ref(), vars.igp_metric.as_ref());
                    let def = SmtTerm::int(DEFAULT_IGP_METRIC);
                    (better_helper(b, v, def.clone(), true), equal_helper(b, v, def))
                }
            }
        };

        let mut acc = SmtTerm::or(vec![better_type, SmtTerm::and(vec![equal_type, tiebreak])]);
        for &var in self.query.bgp_ranking.iter().rev() {
            let (better, equal) = ranking(var);
            acc = SmtTerm::or(vec![better, SmtTerm::and(vec![equal, acc])]);
        }
        acc = SmtTerm::or(vec![better_ad, SmtTerm::and(vec![equal_ad, acc])]);
        Ok(SmtTerm::or(vec![better_len, SmtTerm::and(vec![equal_len, acc])]))
    }

    /// On single-protocol routers the overall best carries that
    /// protocol's history whenever it is permitted.
    pub(super) fn add_history_constraints(&self, ctx: &mut EncodingContext) {
        for (router, &id) in &self.decisions.best_neighbor {
            if !self.optimizations.has_single_protocol(router) {
                continue;
            }
            let best = &self.records[id];
            let (Some(&proto), Some(h)) = (self.optimizations.protocols(router).first(), &best.history)
            else {
                continue;
            };
            ctx.add(
                best.permitted
                    .clone()
                    .implies(h.clone().eq(SmtTerm::int(proto.history_code()))),
            );
        }
    }

    /// The per-protocol best record is at least as good as every permitted
    /// import and equal to one of them.
    pub(super) fn add_best_per_protocol_constraints(&self, ctx: &mut EncodingContext) -> EncodeResult<()> {
        for router in self.graph.routers() {
            for &proto in self.optimizations.protocols(router) {
                let Some(best) = self.best_vars(router, proto) else {
                    continue;
                };
                let mut some_permitted = Vec::new();
                let mut some_equal = Vec::new();
                for le in self.import_edges(router, proto) {
                    let vars = self.correct_vars(le);
                    some_permitted.push(vars.permitted.clone());
                    some_equal.push(SmtTerm::and(vec![
                        vars.permitted.clone(),
                        self.equal(proto, best, vars, Some(le), true)?,
                    ]));
                    let geq = self.greater_or_equal(proto, best, vars, Some(le))?;
                    ctx.add(vars.permitted.clone().implies(geq));
                }
                if !some_equal.is_empty() {
                    let permitted = SmtTerm::or(some_permitted);
                    ctx.add(permitted.clone().eq(best.permitted.clone()));
                    ctx.add(permitted.implies(SmtTerm::or(some_equal)));
                }
            }
        }
        Ok(())
    }

    /// `choice = import permitted and equal to the protocol best`.
    pub(super) fn add_choice_per_protocol_constraints(&self, ctx: &mut EncodingContext) -> EncodeResult<()> {
        for router in self.graph.routers() {
            for &proto in self.optimizations.protocols(router) {
                let Some(best) = self.best_vars(router, proto) else {
                    continue;
                };
                for le in self.import_edges(router, proto) {
                    let vars = self.correct_vars(le);
                    let Some(choice) = self.decisions.choice_variable(&le.key) else {
                        continue;
                    };
                    let is_best = self.equal(proto, best, vars, Some(le), false)?;
                    ctx.add(
                        choice
                            .clone()
                            .eq(SmtTerm::and(vec![vars.permitted.clone(), is_best])),
                    );
                }
            }
        }
        Ok(())
    }

    /// The overall best record is at least as good as every per-protocol
    /// best and equal to one of them. Single-protocol routers get this
    /// from the per-protocol constraints.
    pub(super) fn add_best_overall_constraints(&self, ctx: &mut EncodingContext) -> EncodeResult<()> {
        for router in self.graph.routers() {
            if self.optimizations.has_single_protocol(router) {
                continue;
            }
            let Some(best) = self.best_overall(router) else {
                continue;
            };
            let protos = self.optimizations.protocols(router);
            if protos.is_empty() {
                ctx.add(best.permitted.clone().not());
                continue;
            }
            let mut some_permitted = Vec::new();
            let mut some_equal = Vec::new();
            for &proto in protos {
                let Some(vars) = self.best_vars(router, proto) else {
                    continue;
                };
                some_permitted.push(vars.permitted.clone());
                some_equal.push(SmtTerm::and(vec![
                    vars.permitted.clone(),
                    self.equal(proto, best, vars, None, true)?,
                ]));
                let geq = self.greater_or_equal(proto, best, vars, None)?;
                ctx.add(vars.permitted.clone().implies(geq));
            }
            let permitted = SmtTerm::or(some_permitted);
            ctx.add(permitted.clone().eq(best.permitted.clone()));
            ctx.add(permitted.implies(SmtTerm::or(some_equal)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Protocol;
    use netverify_smt::solver::{Model, ModelValue};

    fn record(name: &str) -> SymbolicRecord {
        let mut r = SymbolicRecord::unused(name.to_string(), "r1", Protocol::Bgp);
        r.is_used = true;
        r.permitted = SmtTerm::var(format!("{name}_permitted"));
        r.prefix_length = SmtTerm::var(format!("{name}_len"));
        r.metric = SmtTerm::var(format!("{name}_metric"));
        r
    }

    #[test]
    fn missing_admin_distance_defaults_by_internal_flag() {
        let mut r = record("a");
        assert_eq!(default_admin_distance(Protocol::Bgp, &r), SmtTerm::int(20));
        r.bgp_internal = Some(SmtTerm::var("a_internal"));
        let mut model = Model::default();
        model
            .values
            .insert("a_internal".into(), ModelValue::Bool(true));
        assert_eq!(
            model.eval(&default_admin_distance(Protocol::Bgp, &r)),
            Some(ModelValue::Int(IBGP_ADMIN_DISTANCE))
        );
    }

    #[test]
    fn absent_best_field_compares_equal() {
        let best = record("best");
        let vars = record("vars");
        assert!(equal_helper(best.med.as_ref(), vars.med.as_ref(), SmtTerm::int(0)).is_true());
        assert!(better_helper(None, vars.med.as_ref(), SmtTerm::int(0), true).is_false());
    }

    #[test]
    fn history_falls_back_to_the_record_protocol() {
        let mut best = record("best");
        best.history = Some(SmtTerm::var("h"));
        let vars = record("vars");
        assert_eq!(
            equal_histories(&best, &vars),
            SmtTerm::var("h").eq(SmtTerm::int(Protocol::Bgp.history_code()))
        );
    }

    #[test]
    fn lower_router_id_wins_an_otherwise_equal_comparison() -> Result<(), Box<dyn std::error::Error>> {
        use crate::context::EncodingContext;
        use crate::graph::Graph;
        use crate::query::QueryConfig;
        use crate::slice::{EncoderSlice, MAIN_SLICE_NAME};
        use netverify_config::{Configuration, Network};
        use std::sync::Arc;

        let graph = Arc::new(Graph::new(&Network::new(vec![Configuration::new("r1")])?)?);
        let query = Arc::new(QueryConfig::default());
        let mut ctx = EncodingContext::new();
        let hs = query.header_space.clone();
        let slice = EncoderSlice::new(&mut ctx, 0, MAIN_SLICE_NAME, graph, query, hs, None)?;

        let mut low = record("low");
        low.router_id = Some(SmtTerm::var("low_id"));
        let mut high = record("high");
        high.router_id = Some(SmtTerm::var("high_id"));

        let mut model = Model::default();
        for (name, value) in [("low_len", 24), ("high_len", 24), ("low_metric", 3), ("high_metric", 3)] {
            model.values.insert(name.into(), ModelValue::Int(value));
        }
        model.values.insert("low_id".into(), ModelValue::Int(1));
        model.values.insert("high_id".into(), ModelValue::Int(2));

        let low_first = slice.greater_or_equal(Protocol::Bgp, &low, &high, None)?;
        let high_first = slice.greater_or_equal(Protocol::Bgp, &high, &low, None)?;
        assert_eq!(model.eval(&low_first), Some(ModelValue::Bool(true)));
        assert_eq!(model.eval(&high_first), Some(ModelValue::Bool(false)));
        Ok(())
    }
}
