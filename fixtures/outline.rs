//! Page ledger used by the outline tests.

use std::collections::HashMap;
use std::fmt;

/// Largest page the ledger accepts
pub const MAX_PAGE_TOKENS: usize = 4096;

pub type PageId = u64;

/// Token spend per page
pub struct Ledger<K> {
    pages: HashMap<K, usize>,
}

pub enum Entry {
    Open(PageId),
    Closed,
}

pub trait Budgeted {
    fn tokens(&self) -> usize;
}

impl<K: std::hash::Hash + Eq> Ledger<K> {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    pub fn record(&mut self, key: K, tokens: usize) {
        *self.pages.entry(key).or_default() += tokens;
    }
}

impl fmt::Display for Entry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Entry::Open(id) => write!(f, "open {id}"),
            Entry::Closed => f.write_str("closed"),
        }
    }
}

pub fn total<K>(ledger: &Ledger<K>) -> usize {
    ledger.pages.values().sum()
}

fn clamp(tokens: usize) -> usize {
    tokens.min(MAX_PAGE_TOKENS)
}

pub mod export {
    pub fn header() -> &'static str {
        "# Ledger"
    }
}
