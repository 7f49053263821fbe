//! Limit executor.

use tabula_core::Table;

/// Limit executor - applies LIMIT and OFFSET to a table.
pub struct LimitExecutor {
    limit: usize,
    offset: usize,
}

impl LimitExecutor {
    /// Creates a new limit executor.
    pub fn new(limit: usize, offset: usize) -> Self {
        Self { limit, offset }
    }

    /// Keeps at most `limit` rows starting at `offset`.
    pub fn execute(&self, input: Table) -> Table {
        input.slice(self.offset, self.limit)
    }
}
