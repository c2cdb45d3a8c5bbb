//! Memory accounting for a single extraction request.
//!
//! The whole workbook is held in memory while it is walked, so the only
//! resource worth guarding is the number of bytes spent on parsed cells and
//! on formatted strings. A request carries one [`MemoryBudget`]; every
//! allocation of note is charged against it and the request fails with
//! [`BudgetError`] once the limit is crossed.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Allowed memory size of {limit} bytes exhausted (tried to allocate {requested} bytes)")]
pub struct BudgetError {
    pub limit: usize,
    pub requested: usize,
}

/// Running byte counter with an optional upper bound.
#[derive(Clone, Debug, Default)]
pub struct MemoryBudget {
    limit: Option<usize>,
    used: usize,
}

impl MemoryBudget {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit, used: 0 }
    }

    pub fn unlimited() -> Self {
        Self::default()
    }

    pub fn used(&self) -> usize {
        self.used
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Records `bytes` as spent, failing when the limit would be exceeded.
    pub fn charge(&mut self, bytes: usize) -> Result<(), BudgetError> {
        let used = self.used.saturating_add(bytes);
        match self.limit {
            Some(limit) if used > limit => Err(BudgetError { limit, requested: bytes }),
            _ => {
                self.used = used;
                Ok(())
            }
        }
    }
}

/// Parses a memory limit such as `128M`, `1G`, `512k` or a plain byte count.
///
/// Returns `Some(None)` for `-1` (unlimited) and `None` when the value cannot
/// be understood.
pub fn parse_memory_limit(value: &str) -> Option<Option<usize>> {
    let value = value.trim();
    if value == "-1" {
        return Some(None);
    }
    let (digits, multiplier) = match value.char_indices().last()? {
        (index, 'k' | 'K') => (&value[..index], 1usize << 10),
        (index, 'm' | 'M') => (&value[..index], 1 << 20),
        (index, 'g' | 'G') => (&value[..index], 1 << 30),
        _ => (value, 1),
    };
    digits
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|amount| amount.checked_mul(multiplier))
        .map(Some)
}
