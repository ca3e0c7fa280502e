//! Blockfit Core
//!
//! Fixed-partition memory allocation simulator:
//! - Fixed block table (the template) cloned fresh per run
//! - First-fit, best-fit and worst-fit placement
//! - Per-process outcome with internal fragmentation

pub mod allocator;
pub mod block;
pub mod error;
pub mod strategy;

pub use allocator::{AllocationRequest, AllocationResult, Allocator, Placement, ProcessId, Simulation};
pub use block::{MemoryBlock, BLOCK_TEMPLATE};
pub use error::SimulationError;
pub use strategy::Strategy;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
