//! Placement strategies
//!
//! All three strategies share one left-to-right scan over the free blocks
//! that can hold the request. They differ only in when a later candidate
//! replaces the current pick:
//!
//! | Strategy   | Replaces incumbent when        |
//! |------------|--------------------------------|
//! | `FirstFit` | never                          |
//! | `BestFit`  | candidate slack is smaller     |
//! | `WorstFit` | candidate slack is larger      |
//!
//! Comparisons are strict, so ties always go to the lowest index.

use crate::block::MemoryBlock;
use crate::error::SimulationError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Strategy {
    #[default]
    FirstFit,
    BestFit,
    WorstFit,
}

impl Strategy {
    pub const ALL: [Strategy; 3] = [Strategy::FirstFit, Strategy::BestFit, Strategy::WorstFit];

    /// Name used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Strategy::FirstFit => "firstFit",
            Strategy::BestFit => "bestFit",
            Strategy::WorstFit => "worstFit",
        }
    }

    /// Resolve an optional external name, falling back to first-fit.
    pub fn from_name(name: Option<&str>) -> Result<Self, SimulationError> {
        name.map_or(Ok(Strategy::default()), str::parse)
    }

    /// Pick a block index for `request_size` from the current table.
    pub fn select(self, blocks: &[MemoryBlock], request_size: u64) -> Option<usize> {
        blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.fits(request_size))
            .map(|(index, block)| (index, block.slack(request_size)))
            .fold(None, |best: Option<(usize, u64)>, (index, slack)| match best {
                Some((_, best_slack)) if !self.prefers(slack, best_slack) => best,
                _ => Some((index, slack)),
            })
            .map(|(index, _)| index)
    }

    #[inline]
    fn prefers(self, candidate: u64, incumbent: u64) -> bool {
        match self {
            Strategy::FirstFit => false,
            Strategy::BestFit => candidate < incumbent,
            Strategy::WorstFit => candidate > incumbent,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = SimulationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Strategy::ALL
            .into_iter()
            .find(|strategy| strategy.as_str() == s)
            .ok_or_else(|| SimulationError::UnknownAlgorithm(s.to_string()))
    }
}
