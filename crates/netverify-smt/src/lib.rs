#![doc = include_str!("../README.md")]

//! SMT terms and solver integration for control-plane verification.
//!
//! The engine builds `SmtTerm` values, registers their free variables with a
//! sort, and hands everything to an [`solver::SmtSolver`]. The Z3 backend is
//! the only production backend.

pub mod backends;
pub mod simplify;
pub mod solver;
pub mod sorts;
pub mod terms;
