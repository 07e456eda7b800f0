use std::fmt;

/// The two sorts a network encoding needs. Addresses, ports, metrics and
/// prefix lengths are all plain integers with explicit range constraints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SmtSort {
    Bool,
    Int,
}

impl SmtSort {
    /// SMT-LIB name of the sort.
    pub fn smtlib_name(self) -> &'static str {
        match self {
            SmtSort::Bool => "Bool",
            SmtSort::Int => "Int",
        }
    }
}

impl fmt::Display for SmtSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.smtlib_name())
    }
}
