pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Hard errors: any of these aborts the whole query or operation and is
/// returned to the caller as-is. Per-candidate evaluation failures are
/// [`EvalError`] and never escape the evaluator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Table input is not a JSON array of flat, scalar-valued records.
    #[error("invalid table data: {0}")]
    Format(String),

    /// Missing braces, missing `|`, or a condition that does not parse.
    #[error("invalid query: {0}")]
    QueryFormat(String),

    /// A referenced table has no entry in the store.
    #[error("table {name:?} is not defined; available tables: {available}")]
    UnknownTable { name: String, available: String },

    /// The condition contains no `var ∈ TABLE` or `TABLE(var)` binding.
    #[error("no table bindings found in condition; use `var ∈ TABLE` or `TABLE(var)`")]
    NoBinding,

    /// A quantifier does not match `∃ var ( formula )` / `∀ var ( formula )`,
    /// or its body never binds the quantified variable to a table.
    #[error("invalid quantifier: {0}")]
    QuantifierFormat(String),

    /// The cross product of the bound tables exceeds the configured ceiling.
    #[error("query would enumerate {combinations} combinations, limit is {limit}")]
    ResourceLimit { combinations: u128, limit: u64 },
}

/// Soft, per-candidate failures. A candidate whose condition hits one of
/// these is excluded from the result; the query itself continues. The
/// evaluator surfaces the first of them as the verdict's diagnostic so the
/// behavior is observable rather than silently swallowed.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum EvalError {
    #[error("variable {0:?} is not bound")]
    UnboundVariable(String),

    #[error("attribute {attr:?} is not present on {var:?}")]
    MissingAttribute { var: String, attr: String },

    #[error("unknown identifier {0:?}")]
    UnknownIdentifier(String),

    #[error("cannot order {lhs} against {rhs}")]
    Incomparable {
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("arithmetic requires numbers, got {0}")]
    NonNumeric(&'static str),

    #[error("division by zero")]
    DivisionByZero,

    #[error("expression did not evaluate to a boolean")]
    NotBoolean,

    #[error("no tables are available in this context")]
    NoStore,
}
