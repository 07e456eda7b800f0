#![doc = include_str!("../README.md")]

//! Control-plane verification engine.
//!
//! A [`Graph`] is built from a [`netverify_config::Network`], an
//! [`Encoder`] turns it into constraints over an [`EncodingContext`], and
//! the functions in [`checker`] assert the negation of a property and
//! decode any model the solver finds into a [`Counterexample`].

mod ast;
pub mod checker;
pub mod context;
pub mod counterexample;
pub mod encoder;
pub mod error;
pub mod graph;
pub mod logical_graph;
pub mod optimizations;
pub mod properties;
pub mod protocol;
pub mod query;
pub mod result;
pub mod slice;
pub mod symbolic;
pub mod transfer;

pub use checker::{
    check_black_holes, check_bounded_length, check_determinism, check_equal_length,
    check_forwarding, check_load_balance, check_local_consistency, check_multipath_consistency,
    check_reachability, check_routing_loop,
};
pub use context::EncodingContext;
pub use encoder::Encoder;
pub use error::{EncodeError, EncodeResult};
pub use graph::Graph;
pub use query::QueryConfig;
pub use result::{Counterexample, VerificationResult, VerificationStats};
