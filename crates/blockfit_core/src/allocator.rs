//! Allocation engine
//!
//! A run clones the template, then folds the requests over that private
//! table in input order. Each placement consumes its block for the rest of
//! the run, so request `i` sees every placement made by requests `0..i`.

use crate::block::{MemoryBlock, BLOCK_TEMPLATE};
use crate::error::SimulationError;
use crate::strategy::Strategy;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Process identifier as supplied by the caller, echoed back unchanged.
///
/// Any JSON value is accepted; numbers keep their original form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProcessId {
    Number(serde_json::Number),
    Name(String),
    Other(serde_json::Value),
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessId::Number(n) => write!(f, "{n}"),
            ProcessId::Name(name) => f.write_str(name),
            ProcessId::Other(value) => write!(f, "{value}"),
        }
    }
}

impl From<i64> for ProcessId {
    fn from(value: i64) -> Self {
        ProcessId::Number(value.into())
    }
}

impl From<i32> for ProcessId {
    fn from(value: i32) -> Self {
        ProcessId::Number(value.into())
    }
}

impl From<&str> for ProcessId {
    fn from(value: &str) -> Self {
        ProcessId::Name(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationRequest {
    pub pid: ProcessId,
    pub size: u64,
}

impl AllocationRequest {
    pub fn new(pid: impl Into<ProcessId>, size: u64) -> Self {
        Self {
            pid: pid.into(),
            size,
        }
    }
}

/// A successful placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub pid: ProcessId,
    pub block_index: usize,
    pub used: u64,
    pub total_block: u64,
    pub internal_fragmentation: u64,
}

/// Outcome of one request within a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationResult {
    Placed(Placement),
    /// No free block was large enough when the request was processed.
    Unsatisfiable { pid: ProcessId },
}

impl AllocationResult {
    pub fn pid(&self) -> &ProcessId {
        match self {
            AllocationResult::Placed(placement) => &placement.pid,
            AllocationResult::Unsatisfiable { pid } => pid,
        }
    }

    pub fn placement(&self) -> Option<&Placement> {
        match self {
            AllocationResult::Placed(placement) => Some(placement),
            AllocationResult::Unsatisfiable { .. } => None,
        }
    }
}

/// Final block table and per-request outcomes, in input order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Simulation {
    pub strategy: Strategy,
    pub blocks: Vec<MemoryBlock>,
    pub results: Vec<AllocationResult>,
}

impl Simulation {
    pub fn placed_count(&self) -> usize {
        self.results.iter().filter(|r| r.placement().is_some()).count()
    }

    pub fn unsatisfiable_count(&self) -> usize {
        self.results.len() - self.placed_count()
    }

    pub fn total_internal_fragmentation(&self) -> u64 {
        self.results
            .iter()
            .filter_map(AllocationResult::placement)
            .map(|p| p.internal_fragmentation)
            .sum()
    }
}

/// Owns the read-only template and runs simulations against fresh copies.
///
/// Runs share nothing mutable, so one `Allocator` can serve any number of
/// concurrent callers by reference.
#[derive(Debug, Clone)]
pub struct Allocator {
    template: Vec<MemoryBlock>,
}

impl Allocator {
    /// Allocator over [`BLOCK_TEMPLATE`].
    pub fn new() -> Self {
        Self {
            template: BLOCK_TEMPLATE.to_vec(),
        }
    }

    /// Allocator over a custom table. Every block must be free and non-empty.
    pub fn with_template(template: Vec<MemoryBlock>) -> Result<Self, SimulationError> {
        if template.is_empty() {
            return Err(SimulationError::InvalidTemplate("no blocks".into()));
        }
        if let Some(index) = template.iter().position(|b| b.size == 0) {
            return Err(SimulationError::InvalidTemplate(format!("block {index} has size 0")));
        }
        if let Some(index) = template.iter().position(|b| !b.is_free()) {
            return Err(SimulationError::InvalidTemplate(format!("block {index} is not free")));
        }
        Ok(Self { template })
    }

    pub fn template(&self) -> &[MemoryBlock] {
        &self.template
    }

    /// Run `requests` in order against a fresh copy of the template.
    pub fn simulate(
        &self,
        requests: &[AllocationRequest],
        strategy: Strategy,
    ) -> Result<Simulation, SimulationError> {
        validate(requests)?;

        let mut blocks = self.template.clone();
        let results = requests
            .iter()
            .map(|request| place(&mut blocks, request, strategy))
            .collect();

        Ok(Simulation {
            strategy,
            blocks,
            results,
        })
    }

    /// Like [`simulate`](Self::simulate), resolving an external strategy
    /// name first. An absent name means first-fit.
    pub fn simulate_named(
        &self,
        requests: &[AllocationRequest],
        strategy: Option<&str>,
    ) -> Result<Simulation, SimulationError> {
        let strategy = Strategy::from_name(strategy)?;
        self.simulate(requests, strategy)
    }
}

impl Default for Allocator {
    fn default() -> Self {
        Self::new()
    }
}

fn validate(requests: &[AllocationRequest]) -> Result<(), SimulationError> {
    if requests.is_empty() {
        return Err(SimulationError::EmptyInput);
    }
    if let Some(index) = requests.iter().position(|r| r.size == 0) {
        return Err(SimulationError::ZeroSizedRequest { index });
    }
    Ok(())
}

fn place(blocks: &mut [MemoryBlock], request: &AllocationRequest, strategy: Strategy) -> AllocationResult {
    let Some(index) = strategy.select(blocks, request.size) else {
        tracing::trace!(pid = %request.pid, size = request.size, "no block fits");
        return AllocationResult::Unsatisfiable {
            pid: request.pid.clone(),
        };
    };

    let block = &mut blocks[index];
    block.allocated = Some(request.size);
    tracing::trace!(pid = %request.pid, size = request.size, index, "placed");

    AllocationResult::Placed(Placement {
        pid: request.pid.clone(),
        block_index: index,
        used: request.size,
        total_block: block.size,
        internal_fragmentation: block.slack(request.size),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    fn requests(sizes: &[u64]) -> Vec<AllocationRequest> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, &size)| AllocationRequest::new(i as i64 + 1, size))
            .collect()
    }

    fn placed_indices(sim: &Simulation) -> Vec<Option<usize>> {
        sim.results
            .iter()
            .map(|r| r.placement().map(|p| p.block_index))
            .collect()
    }

    #[test]
    fn first_fit_baseline() {
        let sim = Allocator::new()
            .simulate(&requests(&[150]), Strategy::FirstFit)
            .unwrap();

        let placement = sim.results[0].placement().unwrap();
        assert_eq!(placement.block_index, 1);
        assert_eq!(placement.total_block, 200);
        assert_eq!(placement.used, 150);
        assert_eq!(placement.internal_fragmentation, 50);
        assert_eq!(sim.blocks[1].allocated, Some(150));
    }

    #[test]
    fn earlier_placements_are_visible_to_later_requests() {
        let sim = Allocator::new()
            .simulate(&requests(&[150, 150]), Strategy::FirstFit)
            .unwrap();

        // Block 1 is consumed by the first request, so the second moves on to 300
        assert_eq!(placed_indices(&sim), vec![Some(1), Some(2)]);
    }

    #[test]
    fn worst_fit_takes_largest_block() {
        let sim = Allocator::new()
            .simulate(&requests(&[50]), Strategy::WorstFit)
            .unwrap();

        let placement = sim.results[0].placement().unwrap();
        assert_eq!(placement.block_index, 9);
        assert_eq!(placement.internal_fragmentation, 950);
    }

    #[test]
    fn best_fit_tie_takes_lowest_index() {
        let template = [100, 500, 500, 500].map(MemoryBlock::free).to_vec();
        let sim = Allocator::with_template(template)
            .unwrap()
            .simulate(&requests(&[500, 500]), Strategy::BestFit)
            .unwrap();

        assert_eq!(placed_indices(&sim), vec![Some(1), Some(2)]);
        assert_eq!(sim.total_internal_fragmentation(), 0);
    }

    #[test]
    fn classic_textbook_sequence() {
        let input = requests(&[212, 417, 112, 426]);
        let allocator = Allocator::new();

        let first = allocator.simulate(&input, Strategy::FirstFit).unwrap();
        let best = allocator.simulate(&input, Strategy::BestFit).unwrap();
        let worst = allocator.simulate(&input, Strategy::WorstFit).unwrap();

        assert_eq!(placed_indices(&first), vec![Some(2), Some(4), Some(1), Some(5)]);
        assert_eq!(placed_indices(&best), vec![Some(2), Some(4), Some(1), Some(5)]);
        assert_eq!(placed_indices(&worst), vec![Some(9), Some(8), Some(7), Some(6)]);
    }

    #[test]
    fn unsatisfiable_request_leaves_table_untouched() {
        let allocator = Allocator::new();
        let sim = allocator.simulate(&requests(&[1500]), Strategy::FirstFit).unwrap();

        assert_eq!(
            sim.results,
            vec![AllocationResult::Unsatisfiable { pid: ProcessId::from(1) }]
        );
        assert_eq!(sim.blocks, allocator.template());
    }

    #[test]
    fn unsatisfiable_request_does_not_stop_the_run() {
        let sim = Allocator::new()
            .simulate(&requests(&[1500, 100]), Strategy::BestFit)
            .unwrap();

        assert_eq!(placed_indices(&sim), vec![None, Some(0)]);
        assert_eq!(sim.placed_count(), 1);
        assert_eq!(sim.unsatisfiable_count(), 1);
    }

    #[test]
    fn exhausting_the_table() {
        let sizes: Vec<u64> = std::iter::repeat(1).take(11).collect();
        let sim = Allocator::new()
            .simulate(&requests(&sizes), Strategy::FirstFit)
            .unwrap();

        assert!(sim.blocks.iter().all(|b| !b.is_free()));
        assert_eq!(sim.results[10].placement(), None);
    }

    #[test]
    fn block_indices_are_never_reused_within_a_run() {
        let sizes = [10, 90, 100, 300, 5, 700, 700, 1000, 20, 450, 999, 1];
        for strategy in Strategy::ALL {
            let sim = Allocator::new().simulate(&requests(&sizes), strategy).unwrap();
            let mut seen: Vec<usize> = sim
                .results
                .iter()
                .filter_map(|r| r.placement().map(|p| p.block_index))
                .collect();
            let placed = seen.len();
            seen.sort_unstable();
            seen.dedup();
            assert_eq!(seen.len(), placed, "{strategy} reused a block");
        }
    }

    #[test]
    fn fragmentation_matches_block_minus_used() {
        let sizes = [1, 99, 100, 101, 555, 999, 1000];
        for strategy in Strategy::ALL {
            let sim = Allocator::new().simulate(&requests(&sizes), strategy).unwrap();
            for placement in sim.results.iter().filter_map(AllocationResult::placement) {
                assert!(placement.total_block >= placement.used);
                assert_eq!(
                    placement.internal_fragmentation,
                    placement.total_block - placement.used
                );
                assert_eq!(sim.blocks[placement.block_index].allocated, Some(placement.used));
            }
        }
    }

    #[test]
    fn unknown_strategy_fails_before_run() {
        let allocator = Allocator::new();
        let err = allocator
            .simulate_named(&requests(&[100]), Some("roundRobin"))
            .unwrap_err();

        assert_eq!(err, SimulationError::UnknownAlgorithm("roundRobin".into()));
        assert_eq!(err.to_string(), "Unknown algorithm: roundRobin");
        assert_eq!(allocator.template(), &BLOCK_TEMPLATE[..]);
    }

    #[test]
    fn absent_strategy_name_is_first_fit() {
        let sim = Allocator::new().simulate_named(&requests(&[150]), None).unwrap();
        assert_eq!(sim.strategy, Strategy::FirstFit);
        assert_eq!(placed_indices(&sim), vec![Some(1)]);
    }

    #[test]
    fn empty_and_zero_sized_input_rejected() {
        let allocator = Allocator::new();
        assert_eq!(
            allocator.simulate(&[], Strategy::FirstFit),
            Err(SimulationError::EmptyInput)
        );
        assert_eq!(
            allocator.simulate(&requests(&[100, 0]), Strategy::WorstFit),
            Err(SimulationError::ZeroSizedRequest { index: 1 })
        );
    }

    #[test]
    fn invalid_templates_rejected() {
        assert!(Allocator::with_template(Vec::new()).is_err());
        assert!(Allocator::with_template(vec![MemoryBlock::free(0)]).is_err());
        let used = MemoryBlock {
            size: 10,
            allocated: Some(5),
        };
        assert!(Allocator::with_template(vec![used]).is_err());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let allocator = Allocator::new();
        let input = requests(&[150, 150, 800, 1200, 50]);

        let first = allocator.simulate(&input, Strategy::BestFit).unwrap();
        let second = allocator.simulate(&input, Strategy::BestFit).unwrap();

        assert_eq!(first, second);
        assert_eq!(allocator.template(), &BLOCK_TEMPLATE[..]);
    }

    #[test]
    fn parallel_runs_do_not_share_state() {
        let allocator = Allocator::new();
        let input = requests(&[300, 300, 300, 700]);
        let expected = allocator.simulate(&input, Strategy::FirstFit).unwrap();

        let runs: Vec<Simulation> = (0..64)
            .into_par_iter()
            .map(|_| allocator.simulate(&input, Strategy::FirstFit).unwrap())
            .collect();

        assert!(runs.iter().all(|run| *run == expected));
    }

    #[test]
    fn string_pids_are_echoed() {
        let input = vec![AllocationRequest::new("P1", 100)];
        let sim = Allocator::new().simulate(&input, Strategy::FirstFit).unwrap();
        assert_eq!(sim.results[0].pid(), &ProcessId::Name("P1".into()));
        assert_eq!(sim.results[0].pid().to_string(), "P1");
    }

    #[test]
    fn process_id_deserializes_numbers_and_strings() {
        let parsed: Vec<AllocationRequest> =
            serde_json::from_str(r#"[{"pid":7,"size":10},{"pid":"web","size":20}]"#).unwrap();
        assert_eq!(parsed[0].pid, ProcessId::from(7));
        assert_eq!(parsed[1].pid, ProcessId::Name("web".into()));
    }

    #[test]
    fn process_id_keeps_any_json_value() {
        let parsed: Vec<AllocationRequest> = serde_json::from_str(
            r#"[{"pid":1.5,"size":1},{"pid":null,"size":1},{"pid":18446744073709551615,"size":1},{"pid":[1,"a"],"size":1}]"#,
        )
        .unwrap();

        let echoed: Vec<String> = parsed
            .iter()
            .map(|r| serde_json::to_string(&r.pid).unwrap())
            .collect();
        assert_eq!(echoed, ["1.5", "null", "18446744073709551615", r#"[1,"a"]"#]);
        assert!(matches!(parsed[1].pid, ProcessId::Other(serde_json::Value::Null)));
        assert_eq!(parsed[0].pid.to_string(), "1.5");
    }
}
