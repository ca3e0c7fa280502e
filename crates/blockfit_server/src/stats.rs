//! Service counters
//!
//! Simulations run outside the lock; only the bookkeeping afterwards takes
//! it, so concurrent runs never wait on each other.

use blockfit_core::{Simulation, Strategy};
use blockfit_metrics::{Counter, RingBuffer};
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

/// Number of recent simulations the latency figures cover.
const LATENCY_WINDOW: usize = 256;

pub struct ServiceStats {
    counter: Counter,
    latency: RingBuffer<Duration>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsSnapshot {
    pub counters: BTreeMap<String, usize>,
    pub recent_simulations: usize,
    pub average_simulation_micros: u128,
    pub max_simulation_micros: u128,
}

impl ServiceStats {
    pub fn new() -> Self {
        Self {
            counter: Counter::new(),
            latency: RingBuffer::new(LATENCY_WINDOW),
        }
    }

    pub fn record_request(&mut self) {
        self.counter.increment("requests", 1);
    }

    pub fn record_rejection(&mut self) {
        self.counter.increment("rejected", 1);
    }

    pub fn record_simulation(&mut self, simulation: &Simulation, elapsed: Duration) {
        self.counter.increment("simulations", 1);
        self.counter.increment(strategy_key(simulation.strategy), 1);
        self.counter.increment("placed", simulation.placed_count());
        self.counter.increment("unsatisfiable", simulation.unsatisfiable_count());
        self.latency.push(elapsed);
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> usize {
        self.counter.get(name)
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            counters: self
                .counter
                .iter()
                .map(|(name, &value)| (name.clone(), value))
                .collect(),
            recent_simulations: self.latency.len(),
            average_simulation_micros: self.latency.average().as_micros(),
            max_simulation_micros: self.latency.max().as_micros(),
        }
    }
}

impl Default for ServiceStats {
    fn default() -> Self {
        Self::new()
    }
}

fn strategy_key(strategy: Strategy) -> &'static str {
    match strategy {
        Strategy::FirstFit => "strategy.firstFit",
        Strategy::BestFit => "strategy.bestFit",
        Strategy::WorstFit => "strategy.worstFit",
    }
}
