use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;

/// A satisfying assignment decoded into network terms.
///
/// Every map is ordered so that two runs over the same model print the
/// same report.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Counterexample {
    /// Every declared variable, filled only for full-model queries.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub model: BTreeMap<String, String>,
    /// Packet header fields; zero ports and unset flags are omitted.
    pub packet: BTreeMap<String, String>,
    /// Attributes of every external announcement the model sends, keyed
    /// by `router,interface (BGP)`.
    pub environment: BTreeMap<String, BTreeMap<String, String>>,
    /// Edges with active data-plane forwarding.
    pub forwarding: BTreeSet<String>,
    /// Failed links and routers.
    pub failures: BTreeSet<String>,
}

/// Size and timing of one solver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationStats {
    pub routers: usize,
    /// Physical router-to-router adjacencies, counted once per direction.
    pub edges: usize,
    pub variables: usize,
    pub assertions: usize,
    pub solver_time_ms: u64,
    pub minimization_rounds: usize,
}

/// Outcome of one property check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counterexample: Option<Counterexample>,
    pub stats: VerificationStats,
}

impl VerificationResult {
    pub fn verified(stats: VerificationStats) -> Self {
        VerificationResult {
            verified: true,
            counterexample: None,
            stats,
        }
    }

    pub fn violated(counterexample: Counterexample, stats: VerificationStats) -> Self {
        VerificationResult {
            verified: false,
            counterexample: Some(counterexample),
            stats,
        }
    }
}

impl fmt::Display for VerificationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let Some(cex) = &self.counterexample else {
            return writeln!(f, "Verified");
        };
        writeln!(f, "Counterexample found")?;
        if !cex.packet.is_empty() {
            writeln!(f, "Packet:")?;
            for (field, value) in &cex.packet {
                writeln!(f, "  {field}: {value}")?;
            }
        }
        if !cex.environment.is_empty() {
            writeln!(f, "Environment messages:")?;
            for (edge, attrs) in &cex.environment {
                writeln!(f, "  {edge}")?;
                for (attr, value) in attrs {
                    if value.is_empty() {
                        writeln!(f, "    {attr}")?;
                    } else {
                        writeln!(f, "    {attr}: {value}")?;
                    }
                }
            }
        }
        if !cex.failures.is_empty() {
            writeln!(f, "Failures:")?;
            for failure in &cex.failures {
                writeln!(f, "  {failure}")?;
            }
        }
        if !cex.forwarding.is_empty() {
            writeln!(f, "Forwarding:")?;
            for edge in &cex.forwarding {
                writeln!(f, "  {edge}")?;
            }
        }
        if !cex.model.is_empty() {
            writeln!(f, "Model:")?;
            for (name, value) in &cex.model {
                writeln!(f, "  {name} = {value}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verified_result_prints_one_line() {
        let r = VerificationResult::verified(VerificationStats::default());
        assert_eq!(r.to_string(), "Verified\n");
    }

    #[test]
    fn counterexample_sections_are_skipped_when_empty() {
        let mut cex = Counterexample::default();
        cex.packet.insert("dstIp".into(), "10.0.0.1".into());
        cex.failures.insert("link(a,b)".into());
        let text = VerificationResult::violated(cex, VerificationStats::default()).to_string();
        assert!(text.contains("dstIp: 10.0.0.1"));
        assert!(text.contains("link(a,b)"));
        assert!(!text.contains("Forwarding:"));
        assert!(!text.contains("Environment"));
    }

    #[test]
    fn json_omits_missing_counterexample() -> Result<(), Box<dyn std::error::Error>> {
        let r = VerificationResult::verified(VerificationStats::default());
        let json = serde_json::to_value(&r)?;
        assert_eq!(json["verified"], serde_json::Value::Bool(true));
        assert!(json.get("counterexample").is_none());
        Ok(())
    }
}
