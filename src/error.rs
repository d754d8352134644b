//! Error taxonomy for the query engine.
//!
//! One variant per failure class named in the engine's error-handling
//! design: plan construction, translation, predicate typing, cancellation,
//! internal invariants, and configured limits. Engine code never swallows
//! an error — every fallible path returns `Result<T>`.

use thiserror::Error;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    /// A logical-plan node references a column or type its input does not supply.
    #[error("plan construction error: {0}")]
    PlanConstruction(String),

    /// The translator encountered a surface-AST construct it cannot lower.
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A predicate constant's type is incompatible with its bound column.
    #[error("predicate type mismatch: {0}")]
    PredicateTypeMismatch(String),

    /// Cooperative cancellation fired mid-execution.
    #[error("query canceled")]
    Canceled,

    /// An invariant that should be impossible to violate was violated.
    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),

    /// The request exceeds a configured limit (e.g. result row cap, decimal overflow in Sum).
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Passthrough for errors surfaced by the column-store boundary.
    #[error(transparent)]
    Arrow(#[from] arrow_schema::ArrowError),
}
