use std::collections::BTreeMap;

use netverify_smt::terms::SmtTerm;

use crate::graph::EdgeId;
use crate::logical_graph::LogicalKey;
use crate::protocol::Protocol;
use crate::symbolic::record::RecordId;

/// Per-router decision state of one slice: the winning routes and the
/// forwarding booleans derived from them.
#[derive(Debug, Clone, Default)]
pub struct SymbolicDecisions {
    pub(crate) best_neighbor: BTreeMap<String, RecordId>,
    pub(crate) best_neighbor_per_protocol: BTreeMap<(String, Protocol), RecordId>,
    pub(crate) choice_variables: BTreeMap<LogicalKey, SmtTerm>,
    pub(crate) control_forwarding: BTreeMap<EdgeId, SmtTerm>,
    pub(crate) data_forwarding: BTreeMap<EdgeId, SmtTerm>,
}

impl SymbolicDecisions {
    pub fn best_neighbor(&self, router: &str) -> Option<RecordId> {
        self.best_neighbor.get(router).copied()
    }

    /// Best record of `proto` at `router`. Single-protocol routers reuse
    /// the overall best record.
    pub fn best_neighbor_per_protocol(&self, router: &str, proto: Protocol) -> Option<RecordId> {
        self.best_neighbor_per_protocol
            .get(&(router.to_string(), proto))
            .copied()
    }

    pub fn choice_variable(&self, key: &LogicalKey) -> Option<&SmtTerm> {
        self.choice_variables.get(key)
    }

    pub fn control_forwarding(&self, edge: EdgeId) -> Option<&SmtTerm> {
        self.control_forwarding.get(&edge)
    }

    pub fn data_forwarding(&self, edge: EdgeId) -> Option<&SmtTerm> {
        self.data_forwarding.get(&edge)
    }

    pub fn data_forwarding_map(&self) -> &BTreeMap<EdgeId, SmtTerm> {
        &self.data_forwarding
    }

    pub fn control_forwarding_map(&self) -> &BTreeMap<EdgeId, SmtTerm> {
        &self.control_forwarding
    }
}
