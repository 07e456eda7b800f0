//! Protocol-level import and export edges layered over the topology.

use std::collections::{BTreeMap, BTreeSet};

use crate::graph::EdgeId;
use crate::protocol::{EdgeType, Protocol};
use crate::symbolic::record::RecordId;

/// Identity of a logical edge: topology edge, protocol and direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LogicalKey {
    pub edge: EdgeId,
    pub proto: Protocol,
    pub edge_type: EdgeType,
}

impl LogicalKey {
    pub fn new(edge: EdgeId, proto: Protocol, edge_type: EdgeType) -> Self {
        LogicalKey {
            edge,
            proto,
            edge_type,
        }
    }

    pub fn is_import(&self) -> bool {
        self.edge_type == EdgeType::Import
    }
}

/// A logical edge and the record carried across it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalEdge {
    pub key: LogicalKey,
    pub record: RecordId,
}

#[derive(Debug, Clone, Default)]
pub struct LogicalGraph {
    pub(crate) logical_edges: BTreeMap<(String, Protocol), Vec<LogicalEdge>>,
    pub(crate) other_end: BTreeMap<LogicalKey, LogicalKey>,
    pub(crate) records: BTreeMap<LogicalKey, RecordId>,
    pub(crate) redistributed_protocols: BTreeMap<(String, Protocol), BTreeSet<Protocol>>,
    pub(crate) environment_records: BTreeMap<LogicalKey, RecordId>,
}

impl LogicalGraph {
    pub(crate) fn push(&mut self, router: &str, edge: LogicalEdge) {
        self.records.insert(edge.key, edge.record);
        self.logical_edges
            .entry((router.to_string(), edge.key.proto))
            .or_default()
            .push(edge);
    }

    /// Logical edges of `router` for `proto`, imports before exports per
    /// topology edge.
    pub fn edges_of(&self, router: &str, proto: Protocol) -> &[LogicalEdge] {
        self.logical_edges
            .get(&(router.to_string(), proto))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn all_edges(&self) -> impl Iterator<Item = (&(String, Protocol), &Vec<LogicalEdge>)> {
        self.logical_edges.iter()
    }

    pub fn record(&self, key: &LogicalKey) -> Option<RecordId> {
        self.records.get(key).copied()
    }

    /// The peer's logical edge in the opposite direction, if any.
    pub fn other_end(&self, key: &LogicalKey) -> Option<LogicalKey> {
        self.other_end.get(key).copied()
    }

    pub fn redistributed_protocols(&self, router: &str, proto: Protocol) -> Option<&BTreeSet<Protocol>> {
        self.redistributed_protocols
            .get(&(router.to_string(), proto))
    }

    pub fn environment_records(&self) -> &BTreeMap<LogicalKey, RecordId> {
        &self.environment_records
    }

    /// The record feeding an import edge: the peer's export record, or the
    /// environment record for a session to the outside.
    pub fn find_other_record(&self, key: &LogicalKey) -> Option<RecordId> {
        match self.other_end(key) {
            Some(other) => self.record(&other),
            None => self.environment_records.get(key).copied(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn import_without_peer_falls_back_to_environment() {
        let mut lg = LogicalGraph::default();
        let imp = LogicalKey::new(0, Protocol::Bgp, EdgeType::Import);
        lg.push("r1", LogicalEdge { key: imp, record: 3 });
        assert_eq!(lg.find_other_record(&imp), None);
        lg.environment_records.insert(imp, 7);
        assert_eq!(lg.find_other_record(&imp), Some(7));

        let exp = LogicalKey::new(1, Protocol::Bgp, EdgeType::Export);
        lg.push("r2", LogicalEdge { key: exp, record: 4 });
        lg.other_end.insert(imp, exp);
        assert_eq!(lg.find_other_record(&imp), Some(4));
        assert_eq!(lg.edges_of("r1", Protocol::Bgp).len(), 1);
        assert!(lg.edges_of("r1", Protocol::Ospf).is_empty());
    }
}
