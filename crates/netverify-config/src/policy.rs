//! Routing-policy AST, community lists and route-filter lists.
//!
//! Policies are closed enums so that every consumer must handle each
//! statement and expression kind explicitly.

use serde::{Deserialize, Serialize};

use crate::ip::{Prefix, PrefixRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineAction {
    Permit,
    Deny,
}

/// A named routing policy (route map).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingPolicy {
    pub name: String,
    #[serde(default)]
    pub statements: Vec<Statement>,
}

impl RoutingPolicy {
    pub fn new(name: impl Into<String>, statements: Vec<Statement>) -> Self {
        RoutingPolicy {
            name: name.into(),
            statements,
        }
    }
}

/// Policy statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Statement {
    ExitAccept,
    ExitReject,
    ReturnTrue,
    ReturnFalse,
    Suppress,
    Unsuppress,
    SetDefaultActionAccept,
    SetDefaultActionReject,
    SetLocalDefaultActionAccept,
    SetLocalDefaultActionReject,
    ReturnLocalDefaultAction,
    FallThrough,
    Return,
    RemovePrivateAs,
    If {
        guard: BooleanExpr,
        #[serde(default)]
        true_statements: Vec<Statement>,
        #[serde(default)]
        false_statements: Vec<Statement>,
    },
    /// Names the policy that chains consult when no subroutine decides.
    SetDefaultPolicy(String),
    SetMetric(LongExpr),
    SetOspfMetricType(OspfMetricType),
    SetLocalPreference(LongExpr),
    AddCommunity(CommunitySetExpr),
    SetCommunity(CommunitySetExpr),
    DeleteCommunity(CommunitySetExpr),
    RetainCommunity(CommunitySetExpr),
    PrependAsPath(AsPathListExpr),
    SetOrigin(String),
    SetNextHop(String),
}

impl Statement {
    pub fn if_then_else(
        guard: BooleanExpr,
        true_statements: Vec<Statement>,
        false_statements: Vec<Statement>,
    ) -> Self {
        Statement::If {
            guard,
            true_statements,
            false_statements,
        }
    }

    /// Short label used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::ExitAccept => "ExitAccept",
            Statement::ExitReject => "ExitReject",
            Statement::ReturnTrue => "ReturnTrue",
            Statement::ReturnFalse => "ReturnFalse",
            Statement::Suppress => "Suppress",
            Statement::Unsuppress => "Unsuppress",
            Statement::SetDefaultActionAccept => "SetDefaultActionAccept",
            Statement::SetDefaultActionReject => "SetDefaultActionReject",
            Statement::SetLocalDefaultActionAccept => "SetLocalDefaultActionAccept",
            Statement::SetLocalDefaultActionReject => "SetLocalDefaultActionReject",
            Statement::ReturnLocalDefaultAction => "ReturnLocalDefaultAction",
            Statement::FallThrough => "FallThrough",
            Statement::Return => "Return",
            Statement::RemovePrivateAs => "RemovePrivateAs",
            Statement::If { .. } => "If",
            Statement::SetDefaultPolicy(_) => "SetDefaultPolicy",
            Statement::SetMetric(_) => "SetMetric",
            Statement::SetOspfMetricType(_) => "SetOspfMetricType",
            Statement::SetLocalPreference(_) => "SetLocalPreference",
            Statement::AddCommunity(_) => "AddCommunity",
            Statement::SetCommunity(_) => "SetCommunity",
            Statement::DeleteCommunity(_) => "DeleteCommunity",
            Statement::RetainCommunity(_) => "RetainCommunity",
            Statement::PrependAsPath(_) => "PrependAsPath",
            Statement::SetOrigin(_) => "SetOrigin",
            Statement::SetNextHop(_) => "SetNextHop",
        }
    }
}

/// Boolean match expressions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BooleanExpr {
    True,
    False,
    MatchIpv4,
    MatchIpv6,
    Conjunction(Vec<BooleanExpr>),
    Disjunction(Vec<BooleanExpr>),
    /// Evaluates subroutines in order; each may fall through to the next.
    ConjunctionChain(Vec<BooleanExpr>),
    /// The first subroutine that does not fall through decides.
    FirstMatchChain(Vec<BooleanExpr>),
    Not(Box<BooleanExpr>),
    MatchProtocol(Vec<RoutingProtocol>),
    MatchPrefixSet(PrefixSetExpr),
    MatchPrefix6Set,
    MatchCommunitySet(CommunitySetExpr),
    MatchAsPath(String),
    /// Invoke a named policy as a predicate.
    CallExpr(String),
    CallExprContext,
    CallStatementContext,
    WithEnvironmentExpr(Box<BooleanExpr>),
}

impl BooleanExpr {
    pub fn kind(&self) -> &'static str {
        match self {
            BooleanExpr::True => "True",
            BooleanExpr::False => "False",
            BooleanExpr::MatchIpv4 => "MatchIpv4",
            BooleanExpr::MatchIpv6 => "MatchIpv6",
            BooleanExpr::Conjunction(_) => "Conjunction",
            BooleanExpr::Disjunction(_) => "Disjunction",
            BooleanExpr::ConjunctionChain(_) => "ConjunctionChain",
            BooleanExpr::FirstMatchChain(_) => "FirstMatchChain",
            BooleanExpr::Not(_) => "Not",
            BooleanExpr::MatchProtocol(_) => "MatchProtocol",
            BooleanExpr::MatchPrefixSet(_) => "MatchPrefixSet",
            BooleanExpr::MatchPrefix6Set => "MatchPrefix6Set",
            BooleanExpr::MatchCommunitySet(_) => "MatchCommunitySet",
            BooleanExpr::MatchAsPath(_) => "MatchAsPath",
            BooleanExpr::CallExpr(_) => "CallExpr",
            BooleanExpr::CallExprContext => "CallExprContext",
            BooleanExpr::CallStatementContext => "CallStatementContext",
            BooleanExpr::WithEnvironmentExpr(_) => "WithEnvironmentExpr",
        }
    }
}

/// Integer updates for metric and local preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LongExpr {
    Literal(i64),
    IncrementMetric(i64),
    DecrementMetric(i64),
    IncrementLocalPreference(i64),
    DecrementLocalPreference(i64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OspfMetricType {
    E1,
    E2,
}

/// AS-path prepend argument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsPathListExpr {
    MultipliedAs { asn: u32, count: u32 },
    LiteralAsList(Vec<u32>),
}

impl AsPathListExpr {
    /// Number of AS hops the prepend adds to the path.
    pub fn prepend_length(&self) -> i64 {
        match self {
            AsPathListExpr::MultipliedAs { count, .. } => i64::from(*count),
            AsPathListExpr::LiteralAsList(list) => list.len() as i64,
        }
    }
}

/// Routing protocols a policy can match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingProtocol {
    Connected,
    Static,
    Ospf,
    OspfIa,
    OspfE1,
    OspfE2,
    Bgp,
    Ibgp,
    Aggregate,
    Rip,
    Isis,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixSetExpr {
    Explicit(Vec<PrefixRange>),
    /// Reference to a route-filter list by name.
    Named(String),
}

/// Community sets used in matches and updates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunitySetExpr {
    /// Literal communities (`"65001:100"`) or regular expressions.
    Inline(Vec<String>),
    /// Reference to a community list by name.
    Named(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityListLine {
    pub action: LineAction,
    /// A literal community `"a:b"` or a regular expression over the
    /// textual community form.
    pub regex: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommunityList {
    pub name: String,
    #[serde(default)]
    pub lines: Vec<CommunityListLine>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFilterLine {
    pub action: LineAction,
    pub prefix: Prefix,
    pub min_length: u8,
    pub max_length: u8,
}

impl RouteFilterLine {
    pub fn range(&self) -> PrefixRange {
        PrefixRange {
            prefix: self.prefix,
            min_length: self.min_length,
            max_length: self.max_length,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteFilterList {
    pub name: String,
    #[serde(default)]
    pub lines: Vec<RouteFilterLine>,
}
