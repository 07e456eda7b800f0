//! Concrete solver backends and term printers.

pub mod smtlib_printer;
pub mod z3_backend;
