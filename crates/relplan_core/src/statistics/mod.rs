pub mod selectivity;

use serde::{Deserialize, Serialize};

use crate::types::ScalarValue;

pub mod assumptions {
    //! Cost model constants and fallbacks for when statistics are missing.
    //!
    //! These are tuning knobs relative to each other, not measured costs.

    /// Cost of reading a page sequentially.
    pub const SEQ_PAGE_COST: f64 = 1.0;
    /// Cost of reading a page at a random location.
    pub const RANDOM_PAGE_COST: f64 = 4.0;
    /// Cost of producing or processing a single row.
    pub const CPU_TUPLE_COST: f64 = 0.01;
    /// Cost of evaluating a single operator or function.
    pub const CPU_OPERATOR_COST: f64 = 0.0025;
    /// Selectivity used when a predicate shape or its statistics are unknown.
    pub const DEFAULT_SELECTIVITY: f64 = 0.25;
}

/// Statistics for a single column. `None` means unknown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub distinct_count: Option<u64>,
    pub null_count: Option<u64>,
    pub min: Option<ScalarValue>,
    pub max: Option<ScalarValue>,
}

impl ColumnStats {
    pub fn unknown() -> Self {
        Self::default()
    }

    /// If min and max are both known and differ.
    pub fn has_different_min_max(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => min != max,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableStats {
    pub row_count: u64,
    pub page_count: u64,
    /// Average width of a row, in bytes.
    pub avg_tuple_size: f64,
    /// One entry per column of the table's schema.
    pub columns: Vec<ColumnStats>,
}

impl TableStats {
    /// Stats for a table that has never been analyzed.
    pub fn unknown(num_columns: usize) -> Self {
        TableStats {
            row_count: 0,
            page_count: 0,
            avg_tuple_size: 0.0,
            columns: vec![ColumnStats::unknown(); num_columns],
        }
    }
}
