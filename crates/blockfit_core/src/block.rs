//! Memory blocks and the fixed template

use serde::Serialize;

/// A fixed-size partition of simulated memory.
///
/// `allocated` holds the size of the occupying process, or `None` when the
/// block is free. Blocks are handed out whole; there is no splitting.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryBlock {
    pub size: u64,
    pub allocated: Option<u64>,
}

impl MemoryBlock {
    pub const fn free(size: u64) -> Self {
        Self {
            size,
            allocated: None,
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.allocated.is_none()
    }

    /// Free and large enough to hold `request_size`.
    #[inline]
    pub fn fits(&self, request_size: u64) -> bool {
        self.is_free() && self.size >= request_size
    }

    /// Space left over if `request_size` were placed here.
    ///
    /// Only meaningful when [`fits`](Self::fits) holds.
    #[inline]
    pub fn slack(&self, request_size: u64) -> u64 {
        self.size - request_size
    }
}

/// Baseline block table: ten blocks of 100, 200, ... 1000.
pub const BLOCK_TEMPLATE: [MemoryBlock; 10] = [
    MemoryBlock::free(100),
    MemoryBlock::free(200),
    MemoryBlock::free(300),
    MemoryBlock::free(400),
    MemoryBlock::free(500),
    MemoryBlock::free(600),
    MemoryBlock::free(700),
    MemoryBlock::free(800),
    MemoryBlock::free(900),
    MemoryBlock::free(1000),
];
