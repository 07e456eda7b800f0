//! Routing policies compiled to a relation between two route records.
//!
//! A policy is an imperative program over one route. The compiler runs it
//! symbolically: every statement rewrites fields of a working copy of the
//! input record, `if` branches are compiled separately and merged with an
//! `ite` per changed field, and the final copy is related to the output
//! record. The result is a single formula with no hidden state.

use std::collections::{BTreeMap, BTreeSet};

use netverify_config::{
    BooleanExpr, CommunitySetExpr, Configuration, LineAction, LongExpr, OspfMetricType,
    PrefixRange, PrefixSetExpr, RouteFilterList, RoutingProtocol, Statement,
};
use netverify_smt::backends::smtlib_printer::to_smtlib;
use netverify_smt::sorts::SmtSort;
use netverify_smt::terms::SmtTerm;
use tracing::{trace, warn};

use crate::context::EncodingContext;
use crate::error::{EncodeError, EncodeResult};
use crate::graph::{BgpSendType, Graph, GraphEdge, IBGP_INTERFACE_PREFIX};
use crate::protocol::{OspfType, Protocol};
use crate::slice::{default_admin_distance, default_med, equal_histories, EncoderSlice, SliceEnv};
use crate::symbolic::community::community_vars_of;
use crate::symbolic::{CommunityVar, SymbolicRecord};

/// Terms whose SMT-LIB rendering is longer than this are bound to a fresh
/// variable instead of being copied into every later use.
const INLINE_THRESHOLD: usize = 3000;

const BGP_MAX_METRIC: i64 = 255;
const OSPF_MAX_METRIC: i64 = 65535;

/// A value the compiler tracks across statements.
///
/// The derived order puts the control-flow signals last so that merging
/// data fields still sees the return state from before the branch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Field {
    PrefixLength,
    LocalPref,
    Metric,
    OspfType,
    Community(CommunityVar),
    Fallthrough,
    Return,
}

impl Field {
    fn ssa_name(&self) -> &'static str {
        match self {
            Field::PrefixLength => "PREFIX-LEN",
            Field::LocalPref => "LOCAL-PREF",
            Field::Metric => "METRIC",
            Field::OspfType => "OSPF-TYPE",
            Field::Community(_) => "COMMUNITY",
            Field::Fallthrough => "FALLTHROUGH",
            Field::Return => "RETURN",
        }
    }

    fn sort(&self) -> SmtSort {
        match self {
            Field::PrefixLength | Field::LocalPref | Field::Metric | Field::OspfType => SmtSort::Int,
            Field::Community(_) | Field::Fallthrough | Field::Return => SmtSort::Bool,
        }
    }

    fn get<'r>(&self, data: &'r SymbolicRecord) -> Option<&'r SmtTerm> {
        match self {
            Field::PrefixLength => Some(&data.prefix_length),
            Field::LocalPref => data.local_pref.as_ref(),
            Field::Metric => Some(&data.metric),
            Field::OspfType => data.ospf_type.as_ref(),
            Field::Community(c) => data.communities.get(c),
            Field::Fallthrough | Field::Return => None,
        }
    }

    fn set(&self, data: &mut SymbolicRecord, value: SmtTerm) {
        match self {
            Field::PrefixLength => data.prefix_length = value,
            Field::LocalPref => data.local_pref = Some(value),
            Field::Metric => data.metric = value,
            Field::OspfType => data.ospf_type = Some(value),
            Field::Community(c) => {
                data.communities.insert(c.clone(), value);
            }
            Field::Fallthrough | Field::Return => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallContext {
    None,
    ExprCall,
    StmtCall,
}

/// Settings inherited by nested statements. Cheap to copy, so entering a
/// branch or a call never disturbs the caller's settings.
#[derive(Debug, Clone, Copy)]
struct Scope<'a> {
    call_context: CallContext,
    default_accept: bool,
    default_accept_local: bool,
    default_policy: Option<&'a str>,
    initial_call: bool,
    depth: usize,
}

impl<'a> Scope<'a> {
    fn initial() -> Self {
        Scope {
            call_context: CallContext::None,
            default_accept: false,
            default_accept_local: false,
            default_policy: None,
            initial_call: true,
            depth: 0,
        }
    }

    fn nested(self) -> Self {
        Scope {
            initial_call: false,
            depth: self.depth + 1,
            ..self
        }
    }
}

/// Outcome of compiling a statement list or an expression.
#[derive(Debug, Clone)]
struct TransferResult {
    return_value: SmtTerm,
    fallthrough_value: SmtTerm,
    return_assigned: SmtTerm,
    changed: BTreeMap<Field, SmtTerm>,
}

impl TransferResult {
    fn initial() -> Self {
        TransferResult {
            return_value: SmtTerm::ff(),
            fallthrough_value: SmtTerm::ff(),
            return_assigned: SmtTerm::ff(),
            changed: BTreeMap::new(),
        }
    }

    fn value(b: SmtTerm) -> Self {
        TransferResult {
            return_value: b,
            ..Self::initial()
        }
    }

    /// A plain match result that counts as a decided return.
    fn from_expr(b: SmtTerm) -> Self {
        TransferResult {
            return_value: b,
            return_assigned: SmtTerm::tt(),
            ..Self::initial()
        }
    }

    fn absorb(&mut self, other: &TransferResult) {
        self.changed
            .extend(other.changed.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    fn is_changed(&self, field: &Field) -> bool {
        self.changed.contains_key(field)
    }
}

/// Either an expression of a chain or the default policy appended to it.
enum ChainItem<'a> {
    Expr(&'a BooleanExpr),
    Call(&'a str),
}

/// One application of a policy between the record `other` and the record
/// `current` across `edge`.
pub(crate) struct TransferFunction<'a> {
    pub slice: &'a EncoderSlice,
    pub env: &'a SliceEnv<'a>,
    pub conf: &'a Configuration,
    pub other: &'a SymbolicRecord,
    pub current: &'a SymbolicRecord,
    pub proto: Protocol,
    pub statements: &'a [Statement],
    pub added_cost: i64,
    pub edge: &'a GraphEdge,
    pub is_export: bool,
}

impl<'a> TransferFunction<'a> {
    /// The formula relating `current` to `other` under the policy.
    pub fn compute(&self, ctx: &mut EncodingContext) -> EncodeResult<SmtTerm> {
        let mut data = self.other.clone();
        self.compute_intermediate_prefix_len(ctx, &mut data);
        self.apply_metric_update(&mut data);
        if data.local_pref.is_none() {
            data.local_pref = Some(SmtTerm::int(crate::slice::DEFAULT_LOCAL_PREF));
        }
        let result = self.compute_statements(
            ctx,
            self.statements,
            Scope::initial(),
            &mut data,
            TransferResult::initial(),
        )?;
        Ok(result.return_value)
    }

    fn router(&self) -> &str {
        &self.edge.router
    }

    fn direction(&self) -> &'static str {
        if self.is_export {
            "export"
        } else {
            "import"
        }
    }

    fn unsupported(&self, detail: impl Into<String>) -> EncodeError {
        EncodeError::unsupported(self.router(), &self.edge.start.name, self.direction(), detail)
    }

    fn bind(&self, ctx: &mut EncodingContext, name: &str, sort: SmtSort, value: SmtTerm) -> SmtTerm {
        let value = value.simplify();
        if to_smtlib(&value).len() <= INLINE_THRESHOLD {
            value
        } else {
            ctx.fresh_ssa(name, sort, value)
        }
    }

    fn bind_field(&self, ctx: &mut EncodingContext, field: &Field, value: SmtTerm) -> SmtTerm {
        self.bind(ctx, field.ssa_name(), field.sort(), value)
    }

    /// Rewrite `field` unless a return already fired, and record the change.
    fn update(
        &self,
        ctx: &mut EncodingContext,
        data: &mut SymbolicRecord,
        result: &mut TransferResult,
        field: Field,
        new_value: SmtTerm,
    ) {
        let Some(old) = field.get(data).cloned() else {
            trace!(field = field.ssa_name(), "record does not carry field");
            return;
        };
        let guarded = SmtTerm::ite(result.return_assigned.clone(), old, new_value);
        let x = self.bind_field(ctx, &field, guarded);
        field.set(data, x.clone());
        result.changed.insert(field, x);
    }

    fn compute_intermediate_prefix_len(&self, ctx: &mut EncodingContext, data: &mut SymbolicRecord) {
        if !(self.is_export && self.proto.is_bgp()) {
            return;
        }
        let opts = self.slice.optimizations();
        let aggregates = opts.relevant_aggregates(self.router());
        if aggregates.is_empty() {
            return;
        }
        let mut prefix_len = data.prefix_length.clone();
        for gr in aggregates {
            let p = gr.network;
            let suppressed = opts.is_suppressed_aggregate(self.router(), &p);
            let len = SmtTerm::int(i64::from(p.length()));
            let relevant = SmtTerm::and(vec![
                self.slice.relevant_for_prefix(&p),
                data.prefix_length.clone().gt(len.clone()),
                SmtTerm::bool(suppressed),
            ]);
            prefix_len = SmtTerm::ite(relevant, len, prefix_len);
        }
        data.prefix_length = self.bind_field(ctx, &Field::PrefixLength, prefix_len);
    }

    /// Add the hop cost: OSPF pays on import, BGP on export. A BGP export
    /// of a route learned from another protocol starts from the cost alone.
    fn apply_metric_update(&self, data: &mut SymbolicRecord) {
        let update_ospf = !self.is_export && self.proto.is_ospf();
        let update_bgp = self.is_export && self.proto.is_bgp();
        if !(update_ospf || update_bgp) {
            return;
        }
        let cost = SmtTerm::int(self.added_cost);
        let sum = data.metric.clone().add(cost.clone());
        data.metric = if self.proto.is_bgp() {
            let is_bgp = match &self.other.history {
                Some(h) => h.clone().eq(SmtTerm::int(Protocol::Bgp.history_code())),
                None => SmtTerm::bool(self.slice.optimizations().has_single_protocol(self.router())),
            };
            SmtTerm::ite(is_bgp, sum, cost)
        } else {
            sum
        };
    }

    fn return_value(&self, ctx: &mut EncodingContext, mut r: TransferResult, accept: bool) -> TransferResult {
        let b = SmtTerm::ite(
            r.return_assigned.clone(),
            r.return_value.clone(),
            SmtTerm::bool(accept),
        );
        let ret = self.bind_field(ctx, &Field::Return, b);
        r.return_value = ret.clone();
        r.return_assigned = SmtTerm::tt();
        r.changed.insert(Field::Return, ret);
        r
    }

    fn fallthrough(&self, ctx: &mut EncodingContext, mut r: TransferResult) -> TransferResult {
        let b = SmtTerm::ite(
            r.return_assigned.clone(),
            r.fallthrough_value.clone(),
            SmtTerm::tt(),
        );
        let ft = self.bind_field(ctx, &Field::Fallthrough, b);
        r.fallthrough_value = ft.clone();
        r.return_assigned = SmtTerm::tt();
        r.changed.insert(Field::Fallthrough, ft);
        r
    }

    /// The phi rule: merge one field changed by either branch of an `if`.
    #[allow(clippy::too_many_arguments)]
    fn join(
        &self,
        ctx: &mut EncodingContext,
        data: &mut SymbolicRecord,
        result: &mut TransferResult,
        guard: &SmtTerm,
        field: Field,
        on_true: Option<&SmtTerm>,
        on_false: Option<&SmtTerm>,
    ) {
        if matches!(field, Field::Return | Field::Fallthrough) {
            let assigned = |branch: Option<&SmtTerm>| match branch {
                Some(_) => SmtTerm::tt(),
                None => result.return_assigned.clone(),
            };
            let new_assigned = SmtTerm::ite(guard.clone(), assigned(on_true), assigned(on_false));
            let new_assigned = self.bind(ctx, "ASSIGNED", SmtSort::Bool, new_assigned);
            let previous = if field == Field::Return {
                result.return_value.clone()
            } else {
                result.fallthrough_value.clone()
            };
            let branch_value = SmtTerm::ite(
                guard.clone(),
                on_true.cloned().unwrap_or_else(SmtTerm::ff),
                on_false.cloned().unwrap_or_else(SmtTerm::ff),
            );
            let merged = SmtTerm::ite(result.return_assigned.clone(), previous, branch_value);
            let value = self.bind_field(ctx, &field, merged);
            if field == Field::Return {
                result.return_value = value.clone();
            } else {
                result.fallthrough_value = value.clone();
            }
            result.return_assigned = new_assigned;
            result.changed.insert(field, value);
            return;
        }

        let Some(old) = field.get(data).cloned() else {
            return;
        };
        let t = on_true.cloned().unwrap_or_else(|| old.clone());
        let f = on_false.cloned().unwrap_or_else(|| old.clone());
        let merged = SmtTerm::ite(
            result.return_assigned.clone(),
            old,
            SmtTerm::ite(guard.clone(), t, f),
        );
        let value = self.bind_field(ctx, &field, merged);
        field.set(data, value.clone());
        result.changed.insert(field, value);
    }

    fn compute_statements(
        &self,
        ctx: &mut EncodingContext,
        statements: &'a [Statement],
        mut scope: Scope<'a>,
        data: &mut SymbolicRecord,
        mut result: TransferResult,
    ) -> EncodeResult<TransferResult> {
        let mut does_return = false;

        for stmt in statements {
            trace!(depth = scope.depth, statement = stmt.kind(), "compile");
            match stmt {
                Statement::ExitAccept | Statement::ReturnTrue | Statement::Unsuppress => {
                    does_return = true;
                    result = self.return_value(ctx, result, true);
                }
                Statement::ExitReject | Statement::ReturnFalse | Statement::Suppress => {
                    does_return = true;
                    result = self.return_value(ctx, result, false);
                }
                Statement::SetDefaultActionAccept => scope.default_accept = true,
                Statement::SetDefaultActionReject => scope.default_accept = false,
                Statement::SetLocalDefaultActionAccept => scope.default_accept_local = true,
                Statement::SetLocalDefaultActionReject => scope.default_accept_local = false,
                Statement::ReturnLocalDefaultAction => {
                    result = self.return_value(ctx, result, scope.default_accept_local);
                }
                Statement::FallThrough => result = self.fallthrough(ctx, result),
                // Treated as the end of the enclosing policy.
                Statement::Return => {}
                Statement::RemovePrivateAs => {
                    warn!(router = self.router(), "RemovePrivateAs is not modeled; ignoring");
                }
                Statement::If {
                    guard,
                    true_statements,
                    false_statements,
                } => {
                    let r = self.compute_expr(ctx, guard, scope, data)?;
                    result.absorb(&r);
                    let guard = r.return_value.simplify();
                    for (field, value) in &r.changed {
                        field.set(data, value.clone());
                    }
                    if guard.is_true() {
                        result = self.compute_statements(ctx, true_statements, scope.nested(), data, result)?;
                    } else if guard.is_false() {
                        result = self.compute_statements(ctx, false_statements, scope.nested(), data, result)?;
                    } else {
                        let mut data_true = data.clone();
                        let mut data_false = data.clone();
                        let on_true = self.compute_statements(
                            ctx,
                            true_statements,
                            scope.nested(),
                            &mut data_true,
                            TransferResult::initial(),
                        )?;
                        let on_false = self.compute_statements(
                            ctx,
                            false_statements,
                            scope.nested(),
                            &mut data_false,
                            TransferResult::initial(),
                        )?;
                        let fields: BTreeSet<Field> = on_true
                            .changed
                            .keys()
                            .chain(on_false.changed.keys())
                            .cloned()
                            .collect();
                        for field in fields {
                            let t = on_true.changed.get(&field);
                            let f = on_false.changed.get(&field);
                            self.join(ctx, data, &mut result, &guard, field, t, f);
                        }
                    }
                }
                Statement::SetDefaultPolicy(name) => scope.default_policy = Some(name),
                Statement::SetMetric(e) => {
                    // BGP has no IGP-style metric to set.
                    if !self.current.proto.is_bgp() {
                        let value = apply_long_expr(data.metric.clone(), *e);
                        self.update(ctx, data, &mut result, Field::Metric, value);
                    }
                }
                Statement::SetOspfMetricType(mt) => {
                    let t = match mt {
                        OspfMetricType::E1 => OspfType::E1,
                        OspfMetricType::E2 => OspfType::E2,
                    };
                    self.update(ctx, data, &mut result, Field::OspfType, SmtTerm::int(t.code()));
                }
                Statement::SetLocalPreference(e) => {
                    if let Some(lp) = data.local_pref.clone() {
                        let value = apply_long_expr(lp, *e);
                        self.update(ctx, data, &mut result, Field::LocalPref, value);
                    }
                }
                Statement::AddCommunity(e) | Statement::SetCommunity(e) => {
                    for c in community_vars_of(self.conf, e) {
                        self.update(ctx, data, &mut result, Field::Community(c), SmtTerm::tt());
                    }
                }
                Statement::DeleteCommunity(e) => {
                    let table = self.slice.graph().communities();
                    let mut to_delete = BTreeSet::new();
                    for c in community_vars_of(self.conf, e) {
                        if c.is_regex() {
                            to_delete.extend(table.dependencies(&c).iter().cloned());
                        } else {
                            to_delete.insert(c);
                        }
                    }
                    for c in to_delete {
                        self.update(ctx, data, &mut result, Field::Community(c), SmtTerm::ff());
                    }
                }
                Statement::RetainCommunity(_) => {
                    trace!("RetainCommunity leaves communities unchanged");
                }
                Statement::PrependAsPath(e) => {
                    let value = data.metric.clone().add(SmtTerm::int(e.prepend_length()));
                    self.update(ctx, data, &mut result, Field::Metric, value);
                }
                Statement::SetOrigin(_) => {
                    warn!(router = self.router(), "SetOrigin is not modeled; ignoring");
                }
                Statement::SetNextHop(_) => {
                    warn!(router = self.router(), "SetNextHop is not modeled; ignoring");
                }
            }
        }

        if scope.initial_call {
            if !does_return {
                result = self.return_value(ctx, result, scope.default_accept);
            }
            let related = self.relate_variables(data, &result)?;
            result.return_value = SmtTerm::ite(
                result.return_value.clone(),
                related,
                self.current.permitted.clone().not(),
            );
        }
        Ok(result)
    }

    fn call_policy(
        &self,
        ctx: &mut EncodingContext,
        name: &'a str,
        scope: Scope<'a>,
        data: &mut SymbolicRecord,
    ) -> EncodeResult<TransferResult> {
        let pol = self.conf.routing_policies.get(name).ok_or_else(|| {
            EncodeError::InvalidConfig(format!(
                "router {} calls undefined routing policy {name}",
                self.router()
            ))
        })?;
        let scope = Scope {
            call_context: CallContext::ExprCall,
            ..scope.nested()
        };
        self.compute_statements(ctx, &pol.statements, scope, data, TransferResult::initial())
    }

    /// Subroutines tried last to first; a subroutine that falls through
    /// defers to the ones after it.
    fn compute_chain(
        &self,
        ctx: &mut EncodingContext,
        items: &'a [BooleanExpr],
        scope: Scope<'a>,
        data: &mut SymbolicRecord,
        first_match: bool,
    ) -> EncodeResult<TransferResult> {
        let mut chain: Vec<ChainItem<'a>> = items.iter().map(ChainItem::Expr).collect();
        if let Some(name) = scope.default_policy {
            chain.push(ChainItem::Call(name));
        }
        if chain.is_empty() {
            if first_match {
                return Err(self.unsupported("first-match chain without a default policy"));
            }
            return Ok(TransferResult::from_expr(SmtTerm::tt()));
        }
        let inner = Scope {
            default_policy: None,
            ..scope
        };
        let mut result = TransferResult::value(SmtTerm::ff());
        let mut acc = SmtTerm::ff();
        for item in chain.iter().rev() {
            let r = match item {
                ChainItem::Expr(e) => self.compute_expr(ctx, e, inner, data)?,
                ChainItem::Call(name) => self.call_policy(ctx, name, inner, data)?,
            };
            result.absorb(&r);
            acc = SmtTerm::ite(r.fallthrough_value, acc, r.return_value);
        }
        result.return_value = acc;
        Ok(result)
    }

    fn compute_expr(
        &self,
        ctx: &mut EncodingContext,
        expr: &'a BooleanExpr,
        scope: Scope<'a>,
        data: &mut SymbolicRecord,
    ) -> EncodeResult<TransferResult> {
        trace!(depth = scope.depth, expr = expr.kind(), "compile");
        match expr {
            BooleanExpr::True | BooleanExpr::MatchIpv4 => Ok(TransferResult::from_expr(SmtTerm::tt())),
            BooleanExpr::False | BooleanExpr::MatchIpv6 | BooleanExpr::MatchPrefix6Set => {
                Ok(TransferResult::from_expr(SmtTerm::ff()))
            }
            BooleanExpr::Conjunction(es) | BooleanExpr::Disjunction(es) => {
                let mut result = TransferResult::value(SmtTerm::ff());
                let mut parts = Vec::with_capacity(es.len());
                for e in es {
                    let r = self.compute_expr(ctx, e, scope.nested(), data)?;
                    result.absorb(&r);
                    parts.push(r.return_value);
                }
                result.return_value = if matches!(expr, BooleanExpr::Conjunction(_)) {
                    SmtTerm::and(parts)
                } else {
                    SmtTerm::or(parts)
                };
                Ok(result)
            }
            BooleanExpr::ConjunctionChain(es) => self.compute_chain(ctx, es, scope, data, false),
            BooleanExpr::FirstMatchChain(es) => self.compute_chain(ctx, es, scope, data, true),
            BooleanExpr::Not(e) => {
                let mut r = self.compute_expr(ctx, e, scope, data)?;
                r.return_value = r.return_value.not();
                Ok(r)
            }
            BooleanExpr::MatchProtocol(rps) => {
                let parts = rps.iter().map(|&rp| self.match_protocol(rp)).collect();
                Ok(TransferResult::from_expr(SmtTerm::or(parts)))
            }
            BooleanExpr::MatchPrefixSet(e) => {
                let mut r = self.match_prefix_set(e, data)?;
                r.return_assigned = SmtTerm::tt();
                Ok(r)
            }
            BooleanExpr::MatchCommunitySet(e) => {
                Ok(TransferResult::from_expr(self.match_community_set(e, data)?))
            }
            BooleanExpr::MatchAsPath(_) => {
                warn!(router = self.router(), "MatchAsPath is not modeled; treating as false");
                Ok(TransferResult::from_expr(SmtTerm::ff()))
            }
            BooleanExpr::CallExpr(name) => self.call_policy(ctx, name, scope, data),
            BooleanExpr::CallExprContext => Ok(TransferResult::from_expr(SmtTerm::bool(
                scope.call_context == CallContext::ExprCall,
            ))),
            BooleanExpr::CallStatementContext => Ok(TransferResult::from_expr(SmtTerm::bool(
                scope.call_context == CallContext::StmtCall,
            ))),
            // Pre- and post-statements of the environment are not modeled.
            BooleanExpr::WithEnvironmentExpr(e) => self.compute_expr(ctx, e, scope, data),
        }
    }

    fn match_protocol(&self, rp: RoutingProtocol) -> SmtTerm {
        let Some(proto) = Protocol::from_routing_protocol(rp) else {
            return SmtTerm::ff();
        };
        match &self.other.history {
            Some(h) => h.clone().eq(SmtTerm::int(proto.history_code())),
            None => SmtTerm::bool(proto == self.proto),
        }
    }

    fn match_filter_list(&self, list: &RouteFilterList, len: &SmtTerm) -> SmtTerm {
        list.lines.iter().rev().fold(SmtTerm::ff(), |acc, line| {
            let matches = self.slice.is_relevant_for_range(len, &line.range());
            SmtTerm::ite(matches, SmtTerm::bool(line.action == LineAction::Permit), acc)
        })
    }

    fn match_prefix_set(&self, e: &PrefixSetExpr, data: &SymbolicRecord) -> EncodeResult<TransferResult> {
        let other_len = &data.prefix_length;
        match e {
            PrefixSetExpr::Explicit(ranges) => {
                if ranges.is_empty() {
                    return Ok(TransferResult::value(SmtTerm::tt()));
                }
                if let [range] = ranges.as_slice() {
                    if let Some(r) = self.match_network_statement(range, other_len) {
                        return Ok(r);
                    }
                }
                let parts = ranges
                    .iter()
                    .map(|r| self.slice.is_relevant_for_range(other_len, r))
                    .collect();
                Ok(TransferResult::value(SmtTerm::or(parts)))
            }
            PrefixSetExpr::Named(name) => {
                let list = self.conf.route_filter_lists.get(name).ok_or_else(|| {
                    EncodeError::InvalidConfig(format!(
                        "router {} references undefined prefix list {name}",
                        self.router()
                    ))
                })?;
                Ok(TransferResult::value(self.match_filter_list(list, other_len)))
            }
        }
    }

    /// An exact match on a prefix this router originates into BGP stands
    /// for a `network` statement. Exporting it depends on a local IGP route
    /// for the prefix, so the match checks that route and fixes the length.
    fn match_network_statement(&self, range: &PrefixRange, other_len: &SmtTerm) -> Option<TransferResult> {
        let pfx = range.prefix;
        if range.min_length != range.max_length || range.min_length != pfx.length() {
            return None;
        }
        let router = self.router();
        let has = |proto| self.slice.originated(router, proto).is_some_and(|o| o.contains(&pfx));
        if !has(Protocol::Bgp) {
            return None;
        }
        let origin_len = SmtTerm::int(i64::from(pfx.length()));
        let relevant = if has(Protocol::Static) || has(Protocol::Connected) {
            self.slice.is_relevant_for_range(&origin_len, range)
        } else {
            let id = self
                .slice
                .decisions()
                .best_neighbor_per_protocol(router, Protocol::Ospf)?;
            let rec = self.slice.record(id);
            self.slice.is_relevant_for_range(&rec.prefix_length, range)
        };
        let new_len = SmtTerm::ite(relevant.clone(), origin_len, other_len.clone());
        let mut r = TransferResult::value(relevant);
        r.changed.insert(Field::PrefixLength, new_len);
        Some(r)
    }

    fn community(&self, data: &SymbolicRecord, c: &CommunityVar) -> EncodeResult<SmtTerm> {
        data.communities
            .get(c)
            .cloned()
            .ok_or_else(|| self.unsupported(format!("community {c} on a {} route", data.proto)))
    }

    fn match_community_set(&self, e: &CommunitySetExpr, data: &SymbolicRecord) -> EncodeResult<SmtTerm> {
        match e {
            CommunitySetExpr::Inline(_) => {
                let parts = community_vars_of(self.conf, e)
                    .iter()
                    .map(|c| self.community(data, c))
                    .collect::<EncodeResult<Vec<_>>>()?;
                Ok(SmtTerm::and(parts))
            }
            CommunitySetExpr::Named(name) => {
                let list = self.conf.community_lists.get(name).ok_or_else(|| {
                    EncodeError::InvalidConfig(format!(
                        "router {} references undefined community list {name}",
                        self.router()
                    ))
                })?;
                let mut acc = SmtTerm::ff();
                for line in list.lines.iter().rev() {
                    let c = self.community(data, &CommunityVar::from_text(&line.regex))?;
                    acc = SmtTerm::ite(c, SmtTerm::bool(line.action == LineAction::Permit), acc);
                }
                Ok(acc)
            }
        }
    }

    fn send_community(&self) -> bool {
        if !self.proto.is_bgp() {
            return false;
        }
        if !self.is_export {
            return true;
        }
        self.slice
            .graph()
            .find_bgp_neighbor(self.edge)
            .is_some_and(|n| n.send_community)
    }

    fn peer_name(&self) -> Option<&str> {
        self.edge
            .peer
            .as_deref()
            .or_else(|| self.edge.start.name.strip_prefix(IBGP_INTERFACE_PREFIX))
    }

    /// IGP distance to the BGP next hop, read from the iBGP slices.
    fn igp_metric_constraint(&self, data: &SymbolicRecord) -> SmtTerm {
        let (true, Some(igp)) = (self.edge.is_abstract, &self.current.igp_metric) else {
            return SmtTerm::tt();
        };
        let graph = self.slice.graph();
        let peer_type = graph.peer_type(self.edge);
        let router = self.router();
        let mut parts = Vec::new();
        if peer_type != Some(BgpSendType::ToEbgp) {
            let best = self
                .peer_name()
                .and_then(|peer| self.env.ibgp_slice(peer))
                .and_then(|s| s.best_overall(router));
            if let Some(best) = best {
                parts.push(igp.clone().eq(best.metric.clone()));
            }
        }
        if peer_type == Some(BgpSendType::ToRr) {
            if let Some(cid) = &data.client_id {
                for (r, &id) in graph.originator_ids() {
                    if r == router {
                        continue;
                    }
                    let best = self.env.ibgp_slice(r).and_then(|s| s.best_overall(r));
                    if let Some(best) = best {
                        parts.push(
                            cid.clone()
                                .eq(SmtTerm::int(id))
                                .implies(igp.clone().eq(best.metric.clone())),
                        );
                    }
                }
            }
        }
        SmtTerm::and(parts)
    }

    fn ospf_type_constraint(&self, data: &SymbolicRecord, result: &TransferResult) -> SmtTerm {
        let cur = &self.current.ospf_type;
        if result.is_changed(&Field::OspfType) {
            return safe_eq(cur.as_ref(), data.ospf_type.as_ref());
        }
        // An intra-area route crossing into another area becomes inter-area.
        if let (Some(t), Some(area), Some(iface_area)) =
            (&data.ospf_type, &data.ospf_area, self.edge.start.ospf_area)
        {
            let internal = t.clone().le(SmtTerm::int(OspfType::OIA.code()));
            let same = area.clone().eq(SmtTerm::int(iface_area as i64));
            let update = SmtTerm::and(vec![internal, same.not()]);
            let to_inter_area = match cur {
                Some(c) => c.clone().eq(SmtTerm::int(OspfType::OIA.code())),
                None => SmtTerm::tt(),
            };
            return SmtTerm::ite(update, to_inter_area, safe_eq(cur.as_ref(), Some(t)));
        }
        safe_eq(cur.as_ref(), data.ospf_type.as_ref())
    }

    fn client_id_constraint(&self, data: &SymbolicRecord) -> SmtTerm {
        let (true, Some(other_cid)) = (self.proto.is_bgp(), &data.client_id) else {
            return SmtTerm::tt();
        };
        let cur = self.current.client_id.as_ref();
        let graph = self.slice.graph();
        if self.is_export {
            if graph.ebgp_neighbor(self.edge.id).is_some() {
                return safe_eq(cur, Some(&SmtTerm::int(0)));
            }
            return safe_eq(cur, Some(other_cid));
        }
        // Routes entering over an internal session from outside are tagged
        // with the originator id of the receiving router.
        let peer_type = graph.peer_type(self.edge);
        let is_non_client = self.edge.is_abstract && peer_type != Some(BgpSendType::ToEbgp);
        let is_client = self.edge.is_abstract && peer_type == Some(BgpSendType::ToRr);
        let from_external = other_cid.clone().eq(SmtTerm::int(0));
        let edge_is_internal = SmtTerm::bool(!is_client && !is_non_client);
        let id = originator_id_or_external(graph, self.router());
        let set_new = safe_eq(cur, Some(&SmtTerm::int(id)));
        let copy_over = safe_eq(cur, Some(other_cid));
        SmtTerm::ite(SmtTerm::and(vec![from_external, edge_is_internal]), set_new, copy_over)
    }

    fn no_overflow(&self, metric: &SmtTerm) -> SmtTerm {
        if !self.slice.query().model_overflow {
            return SmtTerm::tt();
        }
        match self.proto {
            Protocol::Ospf => metric.clone().le(SmtTerm::int(OSPF_MAX_METRIC)),
            Protocol::Bgp => metric.clone().le(SmtTerm::int(BGP_MAX_METRIC)),
            _ => SmtTerm::tt(),
        }
    }

    /// Constrain `current` to equal the rewritten input, or to be absent
    /// when the metric overflows.
    fn relate_variables(&self, data: &SymbolicRecord, result: &TransferResult) -> EncodeResult<SmtTerm> {
        let cur = self.current;
        let is_ibgp = self.edge.is_abstract && self.proto.is_bgp();

        let per = cur.permitted.clone().eq(data.permitted.clone());
        let len = cur.prefix_length.clone().eq(data.prefix_length.clone());
        let id = if self.is_export {
            SmtTerm::tt()
        } else {
            let other_id = data.router_id.clone().unwrap_or_else(|| SmtTerm::int(0));
            safe_eq(cur.router_id.as_ref(), Some(&other_id))
        };
        let area = match (&data.ospf_area, self.edge.start.ospf_area) {
            (Some(_), Some(a)) => safe_eq(cur.ospf_area.as_ref(), Some(&SmtTerm::int(a as i64))),
            _ => SmtTerm::tt(),
        };
        let is_internal = safe_eq(cur.bgp_internal.as_ref(), Some(&SmtTerm::bool(is_ibgp)));

        let send = self.send_community();
        let mut comms = Vec::new();
        for (c, e) in &cur.communities {
            if !send {
                comms.push(e.clone().not());
            } else if !c.is_regex() {
                comms.push(match data.communities.get(c) {
                    Some(o) => e.clone().eq(o.clone()),
                    None => e.clone().not(),
                });
            }
        }

        let other_ad = data
            .admin_dist
            .clone()
            .unwrap_or_else(|| default_admin_distance(self.proto, data));
        let other_med = data
            .med
            .clone()
            .unwrap_or_else(|| SmtTerm::int(default_med(self.proto)));
        let other_lp = data
            .local_pref
            .clone()
            .unwrap_or_else(|| SmtTerm::int(crate::slice::DEFAULT_LOCAL_PREF));
        let other_met = data.metric.clone();

        let updates = SmtTerm::and(vec![
            per,
            len,
            safe_eq(cur.admin_dist.as_ref(), Some(&other_ad)),
            safe_eq(cur.med.as_ref(), Some(&other_med)),
            safe_eq(cur.local_pref.as_ref(), Some(&other_lp)),
            cur.metric.clone().eq(other_met.clone()),
            id,
            self.client_id_constraint(data),
            self.ospf_type_constraint(data, result),
            area,
            SmtTerm::and(comms),
            equal_histories(cur, data),
            is_internal,
            self.igp_metric_constraint(data),
        ]);
        Ok(SmtTerm::ite(
            self.no_overflow(&other_met),
            updates,
            cur.permitted.clone().not(),
        ))
    }
}

/// Equality that holds vacuously when either side is not modeled.
/// Routers outside every reflector cluster fall back to 0, the id of
/// routes learned externally.
fn originator_id_or_external(graph: &Graph, router: &str) -> i64 {
    match graph.originator_id(router) {
        Some(id) => id,
        None => {
            warn!(router, "no originator id assigned, tagging routes as external");
            0
        }
    }
}

fn safe_eq(a: Option<&SmtTerm>, b: Option<&SmtTerm>) -> SmtTerm {
    match (a, b) {
        (Some(a), Some(b)) => a.clone().eq(b.clone()),
        _ => SmtTerm::tt(),
    }
}

fn apply_long_expr(x: SmtTerm, e: LongExpr) -> SmtTerm {
    match e {
        LongExpr::Literal(v) => SmtTerm::int(v),
        LongExpr::IncrementMetric(v) | LongExpr::IncrementLocalPreference(v) => x.add(SmtTerm::int(v)),
        LongExpr::DecrementMetric(v) | LongExpr::DecrementLocalPreference(v) => x.sub(SmtTerm::int(v)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryConfig;
    use crate::slice::{SliceEnv, MAIN_SLICE_NAME};
    use crate::symbolic::SymbolicFailures;
    use netverify_config::{AsPathListExpr, Interface, Network, RoutingPolicy};
    use netverify_smt::solver::{Model, ModelValue};
    use std::sync::Arc;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    struct Fixture {
        ctx: EncodingContext,
        slice: EncoderSlice,
        failures: SymbolicFailures,
    }

    fn fixture(policies: Vec<RoutingPolicy>) -> Result<Fixture, Box<dyn std::error::Error>> {
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        for p in policies {
            a.routing_policies.insert(p.name.clone(), p);
        }
        let mut b = Configuration::new("b");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        let network = Network::new(vec![a, b])?;
        let graph = Arc::new(Graph::new(&network)?);
        let query = Arc::new(QueryConfig::default());
        let mut ctx = EncodingContext::new();
        let hs = query.header_space.clone();
        let slice = EncoderSlice::new(&mut ctx, 0, MAIN_SLICE_NAME, graph.clone(), query, hs, None)?;
        let failures = SymbolicFailures::new(&mut ctx, &graph, 0);
        Ok(Fixture {
            ctx,
            slice,
            failures,
        })
    }

    fn record(name: &str, proto: Protocol) -> SymbolicRecord {
        let mut r = SymbolicRecord::unused(name.to_string(), "a", proto);
        r.is_used = true;
        r.permitted = SmtTerm::var(format!("{name}_permitted"));
        r.prefix_length = SmtTerm::var(format!("{name}_len"));
        r.metric = SmtTerm::var(format!("{name}_metric"));
        r
    }

    fn compile(
        fx: &mut Fixture,
        other: &SymbolicRecord,
        current: &SymbolicRecord,
        proto: Protocol,
        statements: &[Statement],
        is_export: bool,
    ) -> EncodeResult<SmtTerm> {
        let ibgp = BTreeMap::new();
        let reach = BTreeMap::new();
        let env = SliceEnv {
            failures: &fx.failures,
            ibgp_slices: &ibgp,
            slice_reachability: &reach,
        };
        let graph = fx.slice.graph();
        let edge = &graph.edges()[0];
        let conf = graph
            .configuration("a")
            .ok_or_else(|| EncodeError::InvalidConfig("missing a".into()))?;
        let tf = TransferFunction {
            slice: &fx.slice,
            env: &env,
            conf,
            other,
            current,
            proto,
            statements,
            added_cost: 1,
            edge,
            is_export,
        };
        tf.compute(&mut fx.ctx)
    }

    fn model(values: &[(&str, ModelValue)]) -> Model {
        let mut m = Model::default();
        for (k, v) in values {
            m.values.insert((*k).to_string(), *v);
        }
        m
    }

    #[test]
    fn prepending_past_the_bgp_bound_drops_the_route() -> TestResult {
        let mut fx = fixture(Vec::new())?;
        let mut other = record("o", Protocol::Bgp);
        other.permitted = SmtTerm::tt();
        other.metric = SmtTerm::int(0);
        other.prefix_length = SmtTerm::int(24);
        let current = record("c", Protocol::Bgp);
        let stmts = vec![
            Statement::PrependAsPath(AsPathListExpr::MultipliedAs { asn: 65000, count: 300 }),
            Statement::ExitAccept,
        ];
        let term = compile(&mut fx, &other, &current, Protocol::Bgp, &stmts, true)?;
        assert_eq!(term.simplify(), current.permitted.clone().not());
        Ok(())
    }

    #[test]
    fn reject_forces_absent_output() -> TestResult {
        let mut fx = fixture(Vec::new())?;
        let other = record("o", Protocol::Ospf);
        let current = record("c", Protocol::Ospf);
        let term = compile(&mut fx, &other, &current, Protocol::Ospf, &[Statement::ExitReject], false)?;
        assert_eq!(term.simplify(), current.permitted.clone().not());
        Ok(())
    }

    #[test]
    fn branches_merge_per_field() -> TestResult {
        let mut fx = fixture(Vec::new())?;
        let mut other = record("o", Protocol::Ospf);
        other.history = Some(SmtTerm::var("o_history"));
        let current = record("c", Protocol::Ospf);
        let stmts = vec![Statement::if_then_else(
            BooleanExpr::MatchProtocol(vec![RoutingProtocol::Static]),
            vec![Statement::SetMetric(LongExpr::Literal(50)), Statement::ExitAccept],
            vec![Statement::ExitAccept],
        )];
        let term = compile(&mut fx, &other, &current, Protocol::Ospf, &stmts, false)?;

        let base = [
            ("o_permitted", ModelValue::Bool(true)),
            ("o_len", ModelValue::Int(24)),
            ("o_metric", ModelValue::Int(10)),
            ("c_permitted", ModelValue::Bool(true)),
            ("c_len", ModelValue::Int(24)),
        ];
        let eval = |history: i64, metric: i64| {
            let mut values = base.to_vec();
            values.push(("o_history", ModelValue::Int(history)));
            values.push(("c_metric", ModelValue::Int(metric)));
            model(&values).eval(&term)
        };
        let static_code = Protocol::Static.history_code();
        let ospf_code = Protocol::Ospf.history_code();
        assert_eq!(eval(static_code, 50), Some(ModelValue::Bool(true)));
        assert_eq!(eval(static_code, 11), Some(ModelValue::Bool(false)));
        assert_eq!(eval(ospf_code, 11), Some(ModelValue::Bool(true)));
        Ok(())
    }

    #[test]
    fn statements_after_a_return_do_not_apply() -> TestResult {
        let mut fx = fixture(Vec::new())?;
        let mut other = record("o", Protocol::Ospf);
        other.metric = SmtTerm::int(5);
        let current = record("c", Protocol::Ospf);
        let stmts = vec![
            Statement::ExitAccept,
            Statement::SetMetric(LongExpr::Literal(99)),
        ];
        let term = compile(&mut fx, &other, &current, Protocol::Ospf, &stmts, false)?;
        let m = model(&[
            ("o_permitted", ModelValue::Bool(true)),
            ("o_len", ModelValue::Int(8)),
            ("c_permitted", ModelValue::Bool(true)),
            ("c_len", ModelValue::Int(8)),
            ("c_metric", ModelValue::Int(6)),
        ]);
        assert_eq!(m.eval(&term), Some(ModelValue::Bool(true)));
        Ok(())
    }

    #[test]
    fn calling_an_undefined_policy_is_invalid() -> TestResult {
        let mut fx = fixture(Vec::new())?;
        let other = record("o", Protocol::Bgp);
        let current = record("c", Protocol::Bgp);
        let stmts = vec![Statement::if_then_else(
            BooleanExpr::CallExpr("NOPE".into()),
            vec![Statement::ExitAccept],
            vec![],
        )];
        let err = compile(&mut fx, &other, &current, Protocol::Bgp, &stmts, false).err();
        assert!(matches!(err, Some(EncodeError::InvalidConfig(_))));
        Ok(())
    }

    #[test]
    fn called_policy_falls_through_to_the_default() -> TestResult {
        let inner = RoutingPolicy::new("INNER", vec![Statement::FallThrough]);
        let mut fx = fixture(vec![inner])?;
        let mut other = record("o", Protocol::Bgp);
        other.permitted = SmtTerm::tt();
        let current = record("c", Protocol::Bgp);
        let stmts = vec![
            Statement::SetDefaultPolicy("INNER".into()),
            Statement::if_then_else(
                BooleanExpr::ConjunctionChain(vec![BooleanExpr::True]),
                vec![Statement::ExitAccept],
                vec![Statement::ExitReject],
            ),
        ];
        let term = compile(&mut fx, &other, &current, Protocol::Bgp, &stmts, false)?;
        // The chain's own `True` decides before the default policy runs.
        let m = model(&[
            ("o_len", ModelValue::Int(16)),
            ("o_metric", ModelValue::Int(0)),
            ("c_permitted", ModelValue::Bool(true)),
            ("c_len", ModelValue::Int(16)),
            ("c_metric", ModelValue::Int(0)),
        ]);
        assert_eq!(m.eval(&term), Some(ModelValue::Bool(true)));
        Ok(())
    }

    #[test]
    fn routers_outside_reflector_clusters_tag_routes_as_external() -> TestResult {
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        let graph = Graph::new(&Network::new(vec![a])?)?;
        assert_eq!(graph.originator_id("a"), None);
        assert_eq!(originator_id_or_external(&graph, "a"), 0);
        assert_eq!(originator_id_or_external(&graph, "unknown"), 0);
        Ok(())
    }

    #[test]
    fn phi_fields_order_control_signals_last() {
        let mut fields = vec![
            Field::Return,
            Field::Metric,
            Field::Fallthrough,
            Field::Community(CommunityVar::from_text("65000:1")),
            Field::PrefixLength,
        ];
        fields.sort();
        assert_eq!(fields.last(), Some(&Field::Return));
        assert_eq!(fields[fields.len() - 2], Field::Fallthrough);
    }
}
