//! Community variables and the regex subsumption table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use netverify_config::{BooleanExpr, CommunitySetExpr, Configuration, Statement};
use regex::Regex;
use serde::Serialize;

use crate::ast::AstVisitor;
use crate::error::{EncodeError, EncodeResult};

/// A community atom tracked by the encoding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CommunityVar {
    /// A literal `a:b` community, encoded as `(a << 16) | b`.
    Exact { text: String, value: i64 },
    /// A regular expression over the textual community form.
    Regex(String),
    /// Some community outside the network that matches the regex.
    Other(String),
}

impl CommunityVar {
    /// Classify a community-list entry: literal `a:b` with 16-bit halves
    /// is exact, anything else is a regex.
    pub fn from_text(text: &str) -> Self {
        match parse_literal(text) {
            Some(value) => CommunityVar::Exact {
                text: text.to_string(),
                value,
            },
            None => CommunityVar::Regex(text.to_string()),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            CommunityVar::Exact { text, .. } => text,
            CommunityVar::Regex(r) | CommunityVar::Other(r) => r,
        }
    }

    pub fn is_regex(&self) -> bool {
        matches!(self, CommunityVar::Regex(_))
    }

    /// Suffix used when naming the per-record boolean for this atom.
    pub(crate) fn name_suffix(&self) -> String {
        match self {
            CommunityVar::Other(r) => format!("community_{r}_OTHER"),
            other => format!("community_{}", other.text()),
        }
    }
}

impl fmt::Display for CommunityVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommunityVar::Other(r) => write!(f, "{r} (other)"),
            other => f.write_str(other.text()),
        }
    }
}

fn parse_literal(text: &str) -> Option<i64> {
    let (hi, lo) = text.split_once(':')?;
    if hi.is_empty() || lo.is_empty() {
        return None;
    }
    if !hi.bytes().all(|b| b.is_ascii_digit()) || !lo.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hi: u16 = hi.parse().ok()?;
    let lo: u16 = lo.parse().ok()?;
    Some((i64::from(hi) << 16) | i64::from(lo))
}

/// The atoms a community-set expression refers to, in the context of the
/// configuration that owns any named list.
pub(crate) fn community_vars_of(conf: &Configuration, expr: &CommunitySetExpr) -> Vec<CommunityVar> {
    match expr {
        CommunitySetExpr::Inline(items) => items.iter().map(|t| CommunityVar::from_text(t)).collect(),
        CommunitySetExpr::Named(name) => conf
            .community_lists
            .get(name)
            .map(|cl| {
                cl.lines
                    .iter()
                    .map(|l| CommunityVar::from_text(&l.regex))
                    .collect()
            })
            .unwrap_or_default(),
    }
}

/// Every community atom mentioned by any policy of `conf`.
pub(crate) fn collect_communities(conf: &Configuration) -> BTreeSet<CommunityVar> {
    let mut found = BTreeSet::new();
    for pol in conf.routing_policies.values() {
        let mut exprs: Vec<&CommunitySetExpr> = Vec::new();
        let mut matched: Vec<&CommunitySetExpr> = Vec::new();
        AstVisitor::new(conf).visit(
            &pol.statements,
            &mut |stmt| match stmt {
                Statement::AddCommunity(e)
                | Statement::SetCommunity(e)
                | Statement::DeleteCommunity(e)
                | Statement::RetainCommunity(e) => exprs.push(e),
                _ => {}
            },
            &mut |expr| {
                if let BooleanExpr::MatchCommunitySet(e) = expr {
                    matched.push(e);
                }
            },
        );
        for e in exprs.into_iter().chain(matched) {
            found.extend(community_vars_of(conf, e));
        }
    }
    found
}

/// All community atoms of a network with the regex dependency table.
#[derive(Debug, Clone, Default)]
pub struct CommunityTable {
    all: BTreeSet<CommunityVar>,
    dependencies: BTreeMap<CommunityVar, Vec<CommunityVar>>,
    named: BTreeMap<String, String>,
}

impl CommunityTable {
    pub fn build<'c>(configs: impl IntoIterator<Item = &'c Configuration>) -> EncodeResult<Self> {
        let mut all = BTreeSet::new();
        let mut named = BTreeMap::new();
        for conf in configs {
            all.extend(collect_communities(conf));
            for (name, cl) in &conf.community_lists {
                if let [line] = cl.lines.as_slice() {
                    named.insert(line.regex.clone(), name.clone());
                }
            }
        }
        let others: Vec<CommunityVar> = all
            .iter()
            .filter_map(|c| match c {
                CommunityVar::Regex(r) => Some(CommunityVar::Other(r.clone())),
                _ => None,
            })
            .collect();
        all.extend(others);

        let mut dependencies = BTreeMap::new();
        for c in &all {
            let CommunityVar::Regex(pattern) = c else {
                continue;
            };
            let re = Regex::new(pattern).map_err(|e| {
                EncodeError::InvalidConfig(format!("bad community regex {pattern:?}: {e}"))
            })?;
            let deps: Vec<CommunityVar> = all
                .iter()
                .filter(|d| match d {
                    CommunityVar::Exact { text, .. } => re.is_match(text),
                    CommunityVar::Other(r) => r == pattern,
                    CommunityVar::Regex(_) => false,
                })
                .cloned()
                .collect();
            dependencies.insert(c.clone(), deps);
        }
        Ok(CommunityTable {
            all,
            dependencies,
            named,
        })
    }

    pub fn all(&self) -> &BTreeSet<CommunityVar> {
        &self.all
    }

    /// Exact and other atoms a regex atom subsumes. Empty for non-regex
    /// atoms.
    pub fn dependencies(&self, regex: &CommunityVar) -> &[CommunityVar] {
        self.dependencies
            .get(regex)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Name of the single-line community list whose entry is `text`.
    pub fn list_name(&self, text: &str) -> Option<&str> {
        self.named.get(text).map(String::as_str)
    }
}
