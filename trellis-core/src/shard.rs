//! Deterministic symbol-to-shard partitioning.
//!
//! Shards are contiguous ranges over the universe's insertion order, not a
//! hash: symbol at position `i` belongs to shard `i / ratio`, and the shard
//! count is `ceil(n / ratio)`. The plan is immutable for the session.

use std::collections::HashMap;

use thiserror::Error;

use crate::{Symbol, SymbolUniverse};

#[derive(Debug, Error)]
pub enum ShardError {
    #[error("symbols-per-shard ratio must be at least 1 (got {0})")]
    InvalidRatio(usize),
}

/// Mapping of every universe symbol to its owning shard index.
#[derive(Clone, Debug)]
pub struct ShardPlan {
    ratio: usize,
    shards: Vec<Vec<Symbol>>,
    index: HashMap<Symbol, usize>,
}

impl ShardPlan {
    /// Partition `universe` into `ceil(len / ratio)` contiguous shards.
    ///
    /// An empty universe yields an empty plan (zero shards); callers must not
    /// start the pipeline in that case.
    pub fn build(universe: &SymbolUniverse, ratio: usize) -> Result<Self, ShardError> {
        if ratio == 0 {
            return Err(ShardError::InvalidRatio(ratio));
        }
        let count = universe.len().div_ceil(ratio);
        let mut shards: Vec<Vec<Symbol>> = vec![Vec::new(); count];
        let mut index = HashMap::with_capacity(universe.len());
        for (position, symbol) in universe.iter().enumerate() {
            let shard = position / ratio;
            shards[shard].push(symbol.clone());
            index.insert(symbol.clone(), shard);
        }
        Ok(Self {
            ratio,
            shards,
            index,
        })
    }

    /// Number of shards in the plan.
    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// The configured symbols-per-shard target.
    #[must_use]
    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// Owning shard for a symbol, or `None` when the symbol is not in the
    /// plan (events for such symbols are unroutable and must be dropped).
    #[must_use]
    pub fn shard_of(&self, symbol: &str) -> Option<usize> {
        self.index.get(symbol).copied()
    }

    /// Symbols assigned to one shard, in universe order.
    #[must_use]
    pub fn symbols(&self, shard: usize) -> &[Symbol] {
        &self.shards[shard]
    }

    /// All shards in index order.
    #[must_use]
    pub fn shards(&self) -> &[Vec<Symbol>] {
        &self.shards
    }
}
