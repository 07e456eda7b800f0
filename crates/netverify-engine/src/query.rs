//! Query configuration: which packets, failures and locations a check
//! ranges over, plus encoding toggles.

use netverify_config::HeaderSpace;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EncodeError, EncodeResult};

/// BGP path-ranking criteria consulted between admin distance and the
/// OSPF type / router-id tiebreak, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BgpDecisionVariable {
    LocalPref,
    PathLen,
    Med,
    EbgpPrefIbgp,
    IgpCost,
}

impl BgpDecisionVariable {
    pub const DEFAULT_RANKING: [BgpDecisionVariable; 5] = [
        BgpDecisionVariable::LocalPref,
        BgpDecisionVariable::PathLen,
        BgpDecisionVariable::Med,
        BgpDecisionVariable::EbgpPrefIbgp,
        BgpDecisionVariable::IgpCost,
    ];
}

/// Switches for the optimization advisor. Every switch is on by default;
/// turning one off yields a larger but simpler encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationToggles {
    /// Restrict each router's protocols to those relevant for the slice.
    pub slicing: bool,
    /// Share one export record per (router, protocol) when safe.
    pub export_merge: bool,
    /// Reuse the peer's export record as the import record when safe.
    pub import_export_merge: bool,
}

impl Default for OptimizationToggles {
    fn default() -> Self {
        OptimizationToggles {
            slicing: true,
            export_merge: true,
            import_export_merge: true,
        }
    }
}

fn default_ranking() -> Vec<BgpDecisionVariable> {
    BgpDecisionVariable::DEFAULT_RANKING.to_vec()
}

/// Everything a single verification call can be parameterized with.
///
/// All fields default, so `{}` is a valid query: every packet, no
/// failures, all routers as sources and every peerless interface as a
/// destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub header_space: HeaderSpace,
    /// Maximum number of simultaneously failed links (and nodes).
    pub failures: u32,
    /// Let router failures count against the failure budget.
    pub fail_nodes: bool,
    /// Shrink counterexamples by blocking environment bits.
    pub minimize: bool,
    /// Report every declared variable in counterexamples.
    pub full_model: bool,
    /// Treat all external BGP input as absent.
    pub no_environment: bool,
    /// Compare reachability with and without failures.
    pub equivalence: bool,
    /// Check the negation of the property instead.
    pub negate: bool,
    /// Deliver iBGP messages only when the session endpoints can reach
    /// each other.
    pub model_igp: bool,
    /// Drop routes whose metric overflows the protocol maximum.
    pub model_overflow: bool,
    /// Give up on a solver call after this many seconds; 0 waits forever.
    pub timeout_secs: u64,
    pub bgp_ranking: Vec<BgpDecisionVariable>,
    pub optimizations: OptimizationToggles,

    pub ingress_node_regex: String,
    pub not_ingress_node_regex: String,
    pub final_node_regex: String,
    pub not_final_node_regex: String,
    pub final_iface_regex: String,
    pub not_final_iface_regex: String,
    pub fail_node1_regex: String,
    pub not_fail_node1_regex: String,
    pub fail_node2_regex: String,
    pub not_fail_node2_regex: String,
    pub fail_node_regex: String,
    pub not_fail_node_regex: String,
}

impl Default for QueryConfig {
    fn default() -> Self {
        QueryConfig {
            header_space: HeaderSpace::default(),
            failures: 0,
            fail_nodes: false,
            minimize: false,
            full_model: false,
            no_environment: false,
            equivalence: false,
            negate: false,
            model_igp: true,
            model_overflow: true,
            timeout_secs: 0,
            bgp_ranking: default_ranking(),
            optimizations: OptimizationToggles::default(),
            ingress_node_regex: ".*".to_string(),
            not_ingress_node_regex: String::new(),
            final_node_regex: ".*".to_string(),
            not_final_node_regex: String::new(),
            final_iface_regex: ".*".to_string(),
            not_final_iface_regex: String::new(),
            fail_node1_regex: ".*".to_string(),
            not_fail_node1_regex: String::new(),
            fail_node2_regex: ".*".to_string(),
            not_fail_node2_regex: String::new(),
            fail_node_regex: ".*".to_string(),
            not_fail_node_regex: String::new(),
        }
    }
}

/// A positive pattern with an optional exclusion. Both are anchored, and
/// an empty exclusion excludes nothing.
#[derive(Debug, Clone)]
pub struct NamePattern {
    include: Regex,
    exclude: Option<Regex>,
}

impl NamePattern {
    pub fn new(include: &str, exclude: &str) -> EncodeResult<Self> {
        let include = anchored(include)?;
        let exclude = if exclude.is_empty() {
            None
        } else {
            Some(anchored(exclude)?)
        };
        Ok(NamePattern { include, exclude })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.include.is_match(name) && !self.exclude.as_ref().is_some_and(|r| r.is_match(name))
    }
}

fn anchored(pattern: &str) -> EncodeResult<Regex> {
    Regex::new(&format!("^(?:{pattern})$"))
        .map_err(|e| EncodeError::InvalidConfig(format!("bad name pattern {pattern:?}: {e}")))
}

impl QueryConfig {
    pub fn ingress_nodes(&self) -> EncodeResult<NamePattern> {
        NamePattern::new(&self.ingress_node_regex, &self.not_ingress_node_regex)
    }

    pub fn final_nodes(&self) -> EncodeResult<NamePattern> {
        NamePattern::new(&self.final_node_regex, &self.not_final_node_regex)
    }

    pub fn final_ifaces(&self) -> EncodeResult<NamePattern> {
        NamePattern::new(&self.final_iface_regex, &self.not_final_iface_regex)
    }

    pub fn fail_node1(&self) -> EncodeResult<NamePattern> {
        NamePattern::new(&self.fail_node1_regex, &self.not_fail_node1_regex)
    }

    pub fn fail_node2(&self) -> EncodeResult<NamePattern> {
        NamePattern::new(&self.fail_node2_regex, &self.not_fail_node2_regex)
    }

    pub fn fail_nodes_pattern(&self) -> EncodeResult<NamePattern> {
        NamePattern::new(&self.fail_node_regex, &self.not_fail_node_regex)
    }

    pub fn with_header_space(&self, header_space: HeaderSpace) -> Self {
        QueryConfig {
            header_space,
            ..self.clone()
        }
    }
}
