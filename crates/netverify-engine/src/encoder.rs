//! One complete encoding of the network: failure variables, the main
//! slice, and one iBGP slice per router that has iBGP sessions.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;

use netverify_config::{HeaderSpace, Ip, Prefix};
use netverify_smt::backends::z3_backend::Z3Solver;
use netverify_smt::solver::{Model, SatResult, SmtSolver};
use netverify_smt::sorts::SmtSort;
use netverify_smt::terms::SmtTerm;
use tracing::{debug, info, warn};

use crate::context::EncodingContext;
use crate::counterexample::{build_counterexample, environment_bit_count, environment_blocking_clause};
use crate::error::{EncodeError, EncodeResult};
use crate::graph::Graph;
use crate::properties::PropertyAdder;
use crate::query::QueryConfig;
use crate::result::{Counterexample, VerificationResult, VerificationStats};
use crate::slice::{ibgp_slice_name, EncoderSlice, SliceEnv, MAIN_SLICE_NAME};
use crate::symbolic::SymbolicFailures;

/// The encoding of one copy of the network.
///
/// Several encoders can share one [`EncodingContext`]; each gets its own
/// id so their variables never collide.
#[derive(Debug)]
pub struct Encoder {
    id: usize,
    graph: Arc<Graph>,
    query: Arc<QueryConfig>,
    failures: SymbolicFailures,
    main: EncoderSlice,
    ibgp_slices: BTreeMap<String, EncoderSlice>,
    slice_reachability: BTreeMap<String, BTreeMap<String, SmtTerm>>,
}

impl Encoder {
    pub fn new(ctx: &mut EncodingContext, graph: Arc<Graph>, query: Arc<QueryConfig>) -> EncodeResult<Self> {
        Self::with_id(ctx, 0, graph, query)
    }

    /// A further encoder in the namespace of `previous`.
    pub fn next(
        ctx: &mut EncodingContext,
        previous: &Encoder,
        graph: Arc<Graph>,
        query: Arc<QueryConfig>,
    ) -> EncodeResult<Self> {
        Self::with_id(ctx, previous.id + 1, graph, query)
    }

    fn with_id(
        ctx: &mut EncodingContext,
        id: usize,
        graph: Arc<Graph>,
        query: Arc<QueryConfig>,
    ) -> EncodeResult<Self> {
        let failures = SymbolicFailures::new(ctx, &graph, id);
        let main = EncoderSlice::new(
            ctx,
            id,
            MAIN_SLICE_NAME,
            graph.clone(),
            query.clone(),
            query.header_space.clone(),
            None,
        )?;

        let mut ibgp_slices = BTreeMap::new();
        let mut slice_reachability = BTreeMap::new();
        if query.model_igp {
            for (router, ips) in ibgp_session_addresses(&graph) {
                let dst = ips.into_iter().map(Prefix::host).collect();
                let slice = EncoderSlice::new(
                    ctx,
                    id,
                    ibgp_slice_name(&router),
                    graph.clone(),
                    query.clone(),
                    HeaderSpace::bgp_session_to(dst),
                    Some(&main),
                )?;
                let reach = PropertyAdder::new(&slice).instrument_reachability_to(ctx, &router);
                slice_reachability.insert(router.clone(), reach);
                ibgp_slices.insert(router, slice);
            }
        }
        info!(
            encoder = id,
            ibgp_slices = ibgp_slices.len(),
            variables = ctx.variables().len(),
            "allocated encoder"
        );

        Ok(Encoder {
            id,
            graph,
            query,
            failures,
            main,
            ibgp_slices,
            slice_reachability,
        })
    }

    /// Emit the failure budget and the constraints of every slice.
    pub fn compute_encoding(&self, ctx: &mut EncodingContext) -> EncodeResult<()> {
        self.add_failure_constraints(ctx);
        let env = SliceEnv {
            failures: &self.failures,
            ibgp_slices: &self.ibgp_slices,
            slice_reachability: &self.slice_reachability,
        };
        self.main.compute_encoding(ctx, &env)?;
        for slice in self.ibgp_slices.values() {
            slice.compute_encoding(ctx, &env)?;
        }
        debug!(
            encoder = self.id,
            assertions = ctx.assertions().len(),
            "computed encoding"
        );
        Ok(())
    }

    /// Every indicator is 0 or 1, and at most `failures` of them are 1.
    /// Node indicators only count when node failures are enabled.
    fn add_failure_constraints(&self, ctx: &mut EncodingContext) {
        let zero = || SmtTerm::int(0);
        let one = || SmtTerm::int(1);
        let mut budget: Vec<SmtTerm> = self.failures.link_variables().cloned().collect();
        for var in self.failures.nodes().values() {
            ctx.add(var.clone().ge(zero()));
            ctx.add(var.clone().le(one()));
            if self.query.fail_nodes {
                budget.push(var.clone());
            } else {
                ctx.add(var.clone().eq(zero()));
            }
        }
        for var in &budget {
            ctx.add(var.clone().ge(zero()));
            ctx.add(var.clone().le(one()));
        }
        if self.query.failures == 0 {
            for var in budget {
                ctx.add(var.eq(zero()));
            }
        } else {
            ctx.add(SmtTerm::sum(budget).le(SmtTerm::int(i64::from(self.query.failures))));
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn shared_graph(&self) -> Arc<Graph> {
        self.graph.clone()
    }

    pub fn query(&self) -> &QueryConfig {
        &self.query
    }

    pub fn failures(&self) -> &SymbolicFailures {
        &self.failures
    }

    pub fn main_slice(&self) -> &EncoderSlice {
        &self.main
    }

    pub fn ibgp_slices(&self) -> &BTreeMap<String, EncoderSlice> {
        &self.ibgp_slices
    }

    /// Check the assertions in `ctx`. Unsat means the property holds; a
    /// model is decoded for this encoder and, if given, for `other`.
    pub fn verify(&self, ctx: &EncodingContext, other: Option<&Encoder>) -> EncodeResult<VerificationResult> {
        let mut stats = VerificationStats {
            routers: self.graph.configurations().len(),
            edges: self
                .graph
                .edges()
                .iter()
                .filter(|e| !e.is_abstract && e.peer.is_some())
                .count(),
            variables: ctx.variables().len(),
            assertions: ctx.assertions().len(),
            ..VerificationStats::default()
        };

        let mut solver = Z3Solver::with_timeout_secs(self.query.timeout_secs);
        ctx.load_into(&mut solver).map_err(solver_error)?;
        let vars: Vec<(&str, &SmtSort)> = ctx
            .variables()
            .iter()
            .map(|(name, sort)| (name.as_str(), sort))
            .collect();

        let start = Instant::now();
        let (status, mut model) = solver.check_sat_with_model(&vars).map_err(solver_error)?;
        stats.solver_time_ms = elapsed_ms(start);
        info!(
            variables = stats.variables,
            assertions = stats.assertions,
            time_ms = stats.solver_time_ms,
            status = ?status,
            "solver finished"
        );

        match status {
            SatResult::Unsat => return Ok(VerificationResult::verified(stats)),
            SatResult::Unknown(reason) => return Err(EncodeError::SolverUnknown(reason)),
            SatResult::Sat => {}
        }

        let cap = environment_bit_count(&self.main) + 1;
        loop {
            let Some(m) = model.take() else {
                return Err(EncodeError::Solver("satisfiable result carried no model".into()));
            };
            let cex = self.decode(&m, ctx, other);
            if !self.query.minimize {
                return Ok(VerificationResult::violated(cex, stats));
            }
            if stats.minimization_rounds >= cap {
                warn!(rounds = stats.minimization_rounds, "minimization stopped at its round limit");
                return Ok(VerificationResult::violated(cex, stats));
            }

            stats.minimization_rounds += 1;
            let blocking = environment_blocking_clause(&m, &self.main).simplify();
            solver.assert(&blocking).map_err(solver_error)?;
            let start = Instant::now();
            let (status, next) = solver.check_sat_with_model(&vars).map_err(solver_error)?;
            stats.solver_time_ms += elapsed_ms(start);
            debug!(round = stats.minimization_rounds, status = ?status, "minimization round");
            match status {
                SatResult::Unsat => return Ok(VerificationResult::violated(cex, stats)),
                SatResult::Unknown(reason) => return Err(EncodeError::SolverUnknown(reason)),
                SatResult::Sat => model = next,
            }
        }
    }

    fn decode(&self, model: &Model, ctx: &EncodingContext, other: Option<&Encoder>) -> Counterexample {
        let mut cex = Counterexample::default();
        build_counterexample(model, ctx, self, &mut cex);
        if let Some(other) = other {
            build_counterexample(model, ctx, other, &mut cex);
        }
        cex
    }
}

fn solver_error(e: impl std::fmt::Display) -> EncodeError {
    EncodeError::Solver(e.to_string())
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Local addresses each router uses for its iBGP sessions. A session
/// without an explicit local address may use any of the router's
/// interface addresses.
fn ibgp_session_addresses(graph: &Graph) -> BTreeMap<String, BTreeSet<Ip>> {
    let mut out: BTreeMap<String, BTreeSet<Ip>> = BTreeMap::new();
    for edge in graph.edges().iter().filter(|e| e.is_abstract) {
        let Some(n) = graph.ibgp_neighbor(edge.id) else {
            continue;
        };
        let ips = out.entry(edge.router.clone()).or_default();
        match n.local_ip {
            Some(ip) => {
                ips.insert(ip);
            }
            None => {
                let addresses = graph
                    .configuration(&edge.router)
                    .into_iter()
                    .flat_map(|c| c.interfaces.iter())
                    .filter_map(|i| i.address.map(|a| a.ip));
                ips.extend(addresses);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use netverify_config::{BgpNeighbor, BgpProcess, Configuration, Interface, Network};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn pair() -> Result<Arc<Graph>, Box<dyn std::error::Error>> {
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        let mut b = Configuration::new("b");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        Ok(Arc::new(Graph::new(&Network::new(vec![a, b])?)?))
    }

    #[test]
    fn zero_budget_pins_every_link() -> TestResult {
        let graph = pair()?;
        let mut ctx = EncodingContext::new();
        let enc = Encoder::new(&mut ctx, graph, Arc::new(QueryConfig::default()))?;
        enc.compute_encoding(&mut ctx)?;
        for var in enc.failures().link_variables() {
            assert!(ctx.assertions().contains(&var.clone().eq(SmtTerm::int(0))));
        }
        Ok(())
    }

    #[test]
    fn budget_bounds_the_sum_of_links() -> TestResult {
        let graph = pair()?;
        let query = QueryConfig {
            failures: 1,
            ..QueryConfig::default()
        };
        let mut ctx = EncodingContext::new();
        let enc = Encoder::new(&mut ctx, graph, Arc::new(query))?;
        enc.compute_encoding(&mut ctx)?;
        let links: Vec<SmtTerm> = enc.failures().link_variables().cloned().collect();
        let bound = SmtTerm::sum(links).le(SmtTerm::int(1)).simplify();
        assert!(ctx.assertions().contains(&bound));
        Ok(())
    }

    #[test]
    fn second_encoder_uses_fresh_names() -> TestResult {
        let graph = pair()?;
        let query = Arc::new(QueryConfig::default());
        let mut ctx = EncodingContext::new();
        let first = Encoder::new(&mut ctx, graph.clone(), query.clone())?;
        let second = Encoder::next(&mut ctx, &first, graph, query)?;
        assert_eq!(second.id(), 1);
        assert_ne!(first.main_slice().packet().dst_ip, second.main_slice().packet().dst_ip);
        Ok(())
    }

    #[test]
    fn ibgp_sessions_get_their_own_slice() -> TestResult {
        let mut a = Configuration::new("a");
        a.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.1/30".parse()?));
        a.bgp = Some(BgpProcess {
            router_id: "1.1.1.1".parse()?,
            neighbors: vec![BgpNeighbor {
                address: "10.0.0.2/32".parse()?,
                local_as: 65000,
                remote_as: 65000,
                local_ip: Some("10.0.0.1".parse()?),
                import_policy: None,
                export_policy: None,
                route_reflector_client: false,
                send_community: false,
            }],
            multipath_ebgp: false,
            multipath_ibgp: false,
            network_list: None,
            common_export_policy: None,
        });
        let mut b = Configuration::new("b");
        b.interfaces
            .push(Interface::new("eth0").with_address("10.0.0.2/30".parse()?));
        b.bgp = Some(BgpProcess {
            router_id: "2.2.2.2".parse()?,
            neighbors: vec![BgpNeighbor {
                address: "10.0.0.1/32".parse()?,
                local_as: 65000,
                remote_as: 65000,
                local_ip: Some("10.0.0.2".parse()?),
                import_policy: None,
                export_policy: None,
                route_reflector_client: false,
                send_community: false,
            }],
            multipath_ebgp: false,
            multipath_ibgp: false,
            network_list: None,
            common_export_policy: None,
        });
        let graph = Arc::new(Graph::new(&Network::new(vec![a, b])?)?);
        let addresses = ibgp_session_addresses(&graph);
        assert_eq!(
            addresses.get("a").map(|s| s.iter().map(Ip::to_string).collect::<Vec<_>>()),
            Some(vec!["10.0.0.1".to_string()])
        );

        let mut ctx = EncodingContext::new();
        let enc = Encoder::new(&mut ctx, graph, Arc::new(QueryConfig::default()))?;
        let names: Vec<&str> = enc.ibgp_slices().values().map(EncoderSlice::name).collect();
        assert_eq!(names, vec!["SLICE-a_", "SLICE-b_"]);
        Ok(())
    }
}
