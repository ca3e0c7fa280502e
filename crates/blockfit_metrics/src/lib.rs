//! Blockfit Metrics - service instrumentation
//!
//! Event counters and rolling latency figures for the simulation service.
//! Everything here vanishes when the `metrics` feature is off.
//!
//! # Feature Flags
//!
//! - `metrics` - Enable metrics collection (default: disabled)
//!
//! # Usage
//!
//! ```ignore
//! use blockfit_metrics::{Counter, RingBuffer};
//!
//! let mut counter = Counter::new();
//! let mut latency = RingBuffer::new(128);
//!
//! let start = Instant::now();
//! let sim = allocator.simulate(&requests, strategy)?;
//! latency.push(start.elapsed());
//! counter.increment("placed", sim.placed_count());
//! ```

#[cfg(feature = "metrics")]
mod counter;
#[cfg(feature = "metrics")]
mod ring_buffer;

#[cfg(feature = "metrics")]
pub use counter::Counter;
#[cfg(feature = "metrics")]
pub use ring_buffer::RingBuffer;

// ============================================================================
// No-op stubs when metrics disabled
// ============================================================================

#[cfg(not(feature = "metrics"))]
pub struct Counter;

#[cfg(not(feature = "metrics"))]
impl Counter {
    pub fn new() -> Self { Self }
    pub fn increment(&mut self, _name: &str, _value: usize) {}
    pub fn get(&self, _name: &str) -> usize { 0 }
    pub fn reset_all(&mut self) {}
    pub fn iter(&self) -> impl Iterator<Item = (&String, &usize)> { std::iter::empty() }
}

#[cfg(not(feature = "metrics"))]
pub struct RingBuffer<T>(std::marker::PhantomData<T>);

#[cfg(not(feature = "metrics"))]
impl<T> RingBuffer<T> {
    pub fn new(_capacity: usize) -> Self { Self(std::marker::PhantomData) }
    pub fn push(&mut self, _value: T) {}
    pub fn len(&self) -> usize { 0 }
    pub fn is_empty(&self) -> bool { true }
    pub fn average(&self) -> T where T: Default { T::default() }
    pub fn max(&self) -> T where T: Default { T::default() }
}
