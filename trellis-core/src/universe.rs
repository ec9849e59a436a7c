//! Ordered, deduplicated symbol set with first-seen insertion order.
//!
//! Order matters: shard assignment is index-based, so the universe must
//! preserve discovery order (scanner output first, then open positions).

use std::collections::HashSet;

use crate::Symbol;

/// The deduplicated, ordered set of symbols under consideration for a session.
#[derive(Clone, Debug, Default)]
pub struct SymbolUniverse {
    symbols: Vec<Symbol>,
    seen: HashSet<Symbol>,
}

impl SymbolUniverse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a universe from concatenated scanner output, deduplicating while
    /// preserving each symbol's first occurrence.
    pub fn from_scanner_output<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut universe = Self::new();
        for symbol in symbols {
            universe.insert(symbol.into());
        }
        universe
    }

    /// Insert a symbol, returning `true` when it was not already present.
    pub fn insert(&mut self, symbol: Symbol) -> bool {
        if self.seen.contains(&symbol) {
            return false;
        }
        self.seen.insert(symbol.clone());
        self.symbols.push(symbol);
        true
    }

    /// Append open-position symbols not already tracked, preserving the order
    /// positions were returned. Guarantees every open position is tracked
    /// even if no scanner selected it.
    pub fn track_positions<I, S>(&mut self, positions: I) -> Vec<Symbol>
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        let mut added = Vec::new();
        for symbol in positions {
            let symbol = symbol.into();
            if self.insert(symbol.clone()) {
                added.push(symbol);
            }
        }
        added
    }

    /// Keep only the symbols satisfying `keep`, preserving relative order.
    /// Used to narrow the universe to symbols with retrievable history.
    pub fn retain<F>(&mut self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.symbols.retain(|symbol| {
            let kept = keep(symbol);
            if !kept {
                self.seen.remove(symbol);
            }
            kept
        });
    }

    #[must_use]
    pub fn contains(&self, symbol: &str) -> bool {
        self.seen.contains(symbol)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Position of a symbol in discovery order.
    #[must_use]
    pub fn position(&self, symbol: &str) -> Option<usize> {
        self.symbols.iter().position(|s| s == symbol)
    }

    #[must_use]
    pub fn as_slice(&self) -> &[Symbol] {
        &self.symbols
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }
}

impl<'a> IntoIterator for &'a SymbolUniverse {
    type Item = &'a Symbol;
    type IntoIter = std::slice::Iter<'a, Symbol>;

    fn into_iter(self) -> Self::IntoIter {
        self.symbols.iter()
    }
}
