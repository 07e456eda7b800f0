//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "netverify")]
#[command(about = "Verify forwarding properties of a router network under link failures")]
#[command(version)]
pub(crate) struct Cli {
    /// Network description (JSON)
    pub(crate) network: PathBuf,

    /// Query settings (JSON); flags below override its fields
    #[arg(long, short = 'q', global = true)]
    pub(crate) query: Option<PathBuf>,

    /// Maximum number of simultaneous link failures
    #[arg(long, short = 'k', global = true)]
    pub(crate) failures: Option<u32>,

    /// Let whole routers fail as well as links
    #[arg(long, global = true)]
    pub(crate) fail_nodes: bool,

    /// Shrink the environment of a counterexample before reporting it
    #[arg(long, global = true)]
    pub(crate) minimize: bool,

    /// Include every solver variable in the counterexample
    #[arg(long, global = true)]
    pub(crate) full_model: bool,

    /// Ignore announcements from outside the network
    #[arg(long, global = true)]
    pub(crate) no_environment: bool,

    /// Check the negation of the property
    #[arg(long, global = true)]
    pub(crate) negate: bool,

    /// Compare the network with its failure-free copy instead
    #[arg(long, global = true)]
    pub(crate) equivalence: bool,

    /// Solver timeout in seconds (0 disables)
    #[arg(long, global = true)]
    pub(crate) timeout_secs: Option<u64>,

    /// Routers traffic starts from (regex)
    #[arg(long, global = true)]
    pub(crate) ingress: Option<String>,

    /// Destination routers (regex)
    #[arg(long, global = true)]
    pub(crate) final_node: Option<String>,

    /// Destination interfaces (regex)
    #[arg(long, global = true)]
    pub(crate) final_iface: Option<String>,

    /// Print the result as JSON
    #[arg(long, global = true)]
    pub(crate) json: bool,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub(crate) enum Commands {
    /// Every ingress router reaches the destination interfaces
    Reachability,
    /// No interior router receives traffic and drops it
    BlackHoles,
    /// Every ingress router reaches the destinations within `k` hops
    BoundedLength {
        /// Hop bound
        k: u32,
    },
    /// All ingress routers reach the destinations over paths of one length
    EqualLength,
    /// Traffic from any two ingress routers differs by at most `threshold`
    LoadBalance {
        threshold: u32,
    },
    /// Routers matching a pattern behave identically for identical inputs
    LocalConsistency {
        /// Routers to compare (regex)
        routers: String,
        /// Also require the same chosen routes
        #[arg(long)]
        strict: bool,
    },
    /// A router that reaches the destinations does so over every path it uses
    MultipathConsistency,
    /// No statically routed packet loops
    RoutingLoop,
    /// The network converges to a single data plane
    Determinism,
    /// Print one possible data plane
    Forwarding,
}
