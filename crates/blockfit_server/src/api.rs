//! JSON API
//!
//! Routes:
//! - `POST /api/allocate_memory` runs one simulation
//! - `GET /api/blocks` returns the block template
//! - `GET /api/metrics` returns service counters
//!
//! The allocation body is a JSON array of `{pid, size, algorithm?}`. The
//! strategy comes from the first entry's `algorithm`, defaulting to
//! `firstFit`.

use crate::http::{Request, Response};
use crate::stats::ServiceStats;
use blockfit_core::{AllocationRequest, AllocationResult, Allocator, MemoryBlock, ProcessId, Simulation, SimulationError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

pub const ALLOCATE_PATH: &str = "/api/allocate_memory";
pub const BLOCKS_PATH: &str = "/api/blocks";
pub const METRICS_PATH: &str = "/api/metrics";

/// Message attached to requests that found no block.
pub const UNSATISFIABLE_MESSAGE: &str = "No suitable block found for allocation";

/// State shared by every connection task.
pub struct AppState {
    pub allocator: Allocator,
    stats: Mutex<ServiceStats>,
}

impl AppState {
    pub fn new(allocator: Allocator) -> Self {
        Self {
            allocator,
            stats: Mutex::new(ServiceStats::new()),
        }
    }

    pub fn stats(&self) -> MutexGuard<'_, ServiceStats> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(Allocator::new())
    }
}

/// One entry of the allocation payload.
#[derive(Debug, Deserialize)]
struct AllocationEntry {
    pid: ProcessId,
    size: u64,
    #[serde(default)]
    algorithm: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AllocationResponse<'a> {
    memory_blocks: &'a [MemoryBlock],
    allocation_info: Vec<AllocationInfo<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AllocationInfo<'a> {
    #[serde(rename_all = "camelCase")]
    Placed {
        pid: &'a ProcessId,
        block_index: usize,
        used: u64,
        total_block: u64,
        internal_fragmentation: u64,
    },
    Unsatisfiable {
        pid: &'a ProcessId,
        message: &'static str,
    },
}

impl<'a> From<&'a AllocationResult> for AllocationInfo<'a> {
    fn from(result: &'a AllocationResult) -> Self {
        match result {
            AllocationResult::Placed(p) => AllocationInfo::Placed {
                pid: &p.pid,
                block_index: p.block_index,
                used: p.used,
                total_block: p.total_block,
                internal_fragmentation: p.internal_fragmentation,
            },
            AllocationResult::Unsatisfiable { pid } => AllocationInfo::Unsatisfiable {
                pid,
                message: UNSATISFIABLE_MESSAGE,
            },
        }
    }
}

/// Payload-level rejection, always reported as 400.
#[derive(Debug)]
struct Rejection(String);

impl From<SimulationError> for Rejection {
    fn from(err: SimulationError) -> Self {
        Rejection(err.to_string())
    }
}

pub fn handle(state: &AppState, request: &Request) -> Response {
    state.stats().record_request();

    if request.method() == "OPTIONS" {
        return preflight();
    }

    match (request.method(), request.path()) {
        ("POST", ALLOCATE_PATH) => allocate(state, &request.body),
        ("GET", BLOCKS_PATH) => Response::json(200, &state.allocator.template()),
        ("GET", METRICS_PATH) => Response::json(200, &state.stats().snapshot()),
        (_, ALLOCATE_PATH) => method_not_allowed("POST, OPTIONS"),
        (_, BLOCKS_PATH | METRICS_PATH) => method_not_allowed("GET, OPTIONS"),
        (_, path) => Response::error(404, format!("No route for {path}")),
    }
}

fn preflight() -> Response {
    Response::empty(204)
        .with_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
        .with_header("Access-Control-Allow-Headers", "Content-Type")
}

fn method_not_allowed(allow: &'static str) -> Response {
    Response::error(405, "Method not allowed").with_header("Allow", allow)
}

fn allocate(state: &AppState, body: &[u8]) -> Response {
    let (requests, algorithm) = match parse_payload(body) {
        Ok(parsed) => parsed,
        Err(Rejection(message)) => return reject(state, message),
    };

    let start = Instant::now();
    let outcome = state.allocator.simulate_named(&requests, algorithm.as_deref());
    let elapsed = start.elapsed();

    match outcome {
        Ok(simulation) => {
            tracing::debug!(
                strategy = %simulation.strategy,
                requests = requests.len(),
                placed = simulation.placed_count(),
                fragmentation = simulation.total_internal_fragmentation(),
                elapsed_us = elapsed.as_micros() as u64,
                "simulation complete"
            );
            state.stats().record_simulation(&simulation, elapsed);
            Response::json(200, &render(&simulation))
        }
        Err(err) => reject(state, Rejection::from(err).0),
    }
}

fn reject(state: &AppState, message: String) -> Response {
    tracing::warn!("rejected allocation request: {message}");
    state.stats().record_rejection();
    Response::error(400, message)
}

fn render(simulation: &Simulation) -> AllocationResponse<'_> {
    AllocationResponse {
        memory_blocks: &simulation.blocks,
        allocation_info: simulation.results.iter().map(AllocationInfo::from).collect(),
    }
}

/// Falsy JSON values count as "no data".
fn is_empty_payload(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
    }
}

fn parse_payload(body: &[u8]) -> Result<(Vec<AllocationRequest>, Option<String>), Rejection> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(SimulationError::EmptyInput.into());
    }

    let value: Value =
        serde_json::from_slice(body).map_err(|e| Rejection(format!("Invalid JSON payload: {e}")))?;
    if is_empty_payload(&value) {
        return Err(SimulationError::EmptyInput.into());
    }
    if !value.is_array() {
        return Err(Rejection("Allocation data must be a JSON array".into()));
    }

    let entries: Vec<AllocationEntry> = serde_json::from_value(value)
        .map_err(|e| Rejection(format!("Invalid allocation entry: {e}")))?;

    let algorithm = entries.first().and_then(|entry| entry.algorithm.clone());
    let requests = entries
        .into_iter()
        .map(|entry| AllocationRequest {
            pid: entry.pid,
            size: entry.size,
        })
        .collect();
    Ok((requests, algorithm))
}
