use std::collections::BTreeMap;
use std::path::Path;

use miette::{IntoDiagnostic, WrapErr};
use netverify_config::Network;
use netverify_engine::{
    check_black_holes, check_bounded_length, check_determinism, check_equal_length,
    check_forwarding, check_load_balance, check_local_consistency, check_multipath_consistency,
    check_reachability, check_routing_loop, QueryConfig, VerificationResult,
};
use tracing::info;

use crate::cli::{Cli, Commands};

/// What a command produced: one verdict, or one per compared router pair.
#[derive(Debug)]
pub(crate) enum Outcome {
    Single(VerificationResult),
    PerPair(BTreeMap<String, VerificationResult>),
}

impl Outcome {
    pub(crate) fn all_verified(&self) -> bool {
        match self {
            Outcome::Single(r) => r.verified,
            Outcome::PerPair(rs) => rs.values().all(|r| r.verified),
        }
    }

    pub(crate) fn render(&self, json: bool) -> miette::Result<String> {
        if json {
            let text = match self {
                Outcome::Single(r) => serde_json::to_string_pretty(r),
                Outcome::PerPair(rs) => serde_json::to_string_pretty(rs),
            };
            return text.into_diagnostic().wrap_err("failed to serialize result");
        }
        Ok(match self {
            Outcome::Single(r) => r.to_string(),
            Outcome::PerPair(rs) if rs.is_empty() => "No router pairs compared\n".to_string(),
            Outcome::PerPair(rs) => rs
                .iter()
                .map(|(pair, r)| format!("{pair}: {r}"))
                .collect(),
        })
    }
}

fn load_query_file(path: &Path) -> miette::Result<QueryConfig> {
    let text = std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to read query {}", path.display()))?;
    serde_json::from_str(&text)
        .into_diagnostic()
        .wrap_err_with(|| format!("invalid query {}", path.display()))
}

/// The query file (or defaults) with command-line overrides applied.
pub(crate) fn query_from_cli(cli: &Cli) -> miette::Result<QueryConfig> {
    let mut query = match &cli.query {
        Some(path) => load_query_file(path)?,
        None => QueryConfig::default(),
    };
    if let Some(k) = cli.failures {
        query.failures = k;
    }
    if let Some(secs) = cli.timeout_secs {
        query.timeout_secs = secs;
    }
    query.fail_nodes |= cli.fail_nodes;
    query.minimize |= cli.minimize;
    query.full_model |= cli.full_model;
    query.no_environment |= cli.no_environment;
    query.negate |= cli.negate;
    query.equivalence |= cli.equivalence;
    if let Some(re) = &cli.ingress {
        query.ingress_node_regex = re.clone();
    }
    if let Some(re) = &cli.final_node {
        query.final_node_regex = re.clone();
    }
    if let Some(re) = &cli.final_iface {
        query.final_iface_regex = re.clone();
    }
    Ok(query)
}

pub(crate) fn run(cli: &Cli) -> miette::Result<Outcome> {
    let network = Network::load(&cli.network)
        .into_diagnostic()
        .wrap_err_with(|| format!("failed to load network {}", cli.network.display()))?;
    let query = query_from_cli(cli)?;
    info!(
        routers = network.configurations().len(),
        failures = query.failures,
        command = ?cli.command,
        "running check"
    );

    let single = match &cli.command {
        Commands::Reachability => check_reachability(&network, &query),
        Commands::BlackHoles => check_black_holes(&network, &query),
        Commands::BoundedLength { k } => check_bounded_length(&network, &query, *k),
        Commands::EqualLength => check_equal_length(&network, &query),
        Commands::LoadBalance { threshold } => check_load_balance(&network, &query, *threshold),
        Commands::MultipathConsistency => check_multipath_consistency(&network, &query),
        Commands::RoutingLoop => check_routing_loop(&network, &query),
        Commands::Determinism => check_determinism(&network, &query),
        Commands::Forwarding => check_forwarding(&network, &query),
        Commands::LocalConsistency { routers, strict } => {
            let results = check_local_consistency(&network, routers, *strict, &query)
                .into_diagnostic()
                .wrap_err("local consistency check failed")?;
            return Ok(Outcome::PerPair(results));
        }
    };
    single
        .map(Outcome::Single)
        .into_diagnostic()
        .wrap_err("check failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use netverify_engine::VerificationStats;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn flags_override_the_query_file() -> TestResult {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("query.json");
        std::fs::write(&path, r#"{"failures": 2, "minimize": false, "final_node_regex": "core.*"}"#)?;
        let cli = Cli::try_parse_from([
            "netverify",
            "net.json",
            "reachability",
            "--query",
            path.to_str().ok_or("non-utf8 path")?,
            "--failures",
            "1",
            "--minimize",
        ])?;
        let query = query_from_cli(&cli).map_err(|e| e.to_string())?;
        assert_eq!(query.failures, 1);
        assert!(query.minimize);
        assert_eq!(query.final_node_regex, "core.*");
        Ok(())
    }

    #[test]
    fn defaults_apply_without_a_query_file() -> TestResult {
        let cli = Cli::try_parse_from(["netverify", "net.json", "bounded-length", "3"])?;
        assert_eq!(cli.command, Commands::BoundedLength { k: 3 });
        let query = query_from_cli(&cli).map_err(|e| e.to_string())?;
        assert_eq!(query.failures, 0);
        assert_eq!(query.ingress_node_regex, ".*");
        Ok(())
    }

    #[test]
    fn local_consistency_takes_a_pattern_and_strict_flag() -> TestResult {
        let cli = Cli::try_parse_from(["netverify", "n.json", "local-consistency", "leaf.*", "--strict"])?;
        assert_eq!(
            cli.command,
            Commands::LocalConsistency {
                routers: "leaf.*".into(),
                strict: true
            }
        );
        Ok(())
    }

    #[test]
    fn pair_results_render_one_block_per_pair() -> TestResult {
        let mut rs = BTreeMap::new();
        rs.insert("a<-->b".to_string(), VerificationResult::verified(VerificationStats::default()));
        let outcome = Outcome::PerPair(rs);
        assert!(outcome.all_verified());
        assert_eq!(outcome.render(false).map_err(|e| e.to_string())?, "a<-->b: Verified\n");
        assert!(Outcome::PerPair(BTreeMap::new()).render(false).is_ok());
        Ok(())
    }
}
