use thiserror::Error;

/// Request-level failures. Any of these aborts a run before the block table
/// is touched.
///
/// A request that finds no block is not an error; see
/// [`AllocationResult::Unsatisfiable`](crate::AllocationResult::Unsatisfiable).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimulationError {
    #[error("No allocation data provided")]
    EmptyInput,

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("request {index} has size 0; sizes must be positive")]
    ZeroSizedRequest { index: usize },

    #[error("invalid block template: {0}")]
    InvalidTemplate(String),
}
