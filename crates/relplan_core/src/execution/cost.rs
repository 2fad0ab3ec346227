use std::fmt;

use serde::{Deserialize, Serialize};

/// Estimated cost of executing a plan, including all of its children.
///
/// Costs are accumulated bottom up. A node starts from its children's costs
/// and adds its own overhead.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PlanCost {
    /// Estimated number of rows produced.
    pub num_tuples: f64,
    /// Average width of a produced row, in bytes.
    pub tuple_size: f64,
    pub cpu_cost: f64,
    /// Number of block reads needed.
    pub num_block_ios: u64,
    pub io_cost: f64,
}

impl PlanCost {
    pub fn new(
        num_tuples: f64,
        tuple_size: f64,
        cpu_cost: f64,
        num_block_ios: u64,
        io_cost: f64,
    ) -> Self {
        PlanCost {
            num_tuples,
            tuple_size,
            cpu_cost,
            num_block_ios,
            io_cost,
        }
    }

    /// Single number used to compare candidate plans.
    pub fn total(&self) -> f64 {
        self.cpu_cost + self.io_cost
    }
}

impl fmt::Display for PlanCost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={:.1} size={:.1} cpu={:.4} blocks={} io={:.4}",
            self.num_tuples, self.tuple_size, self.cpu_cost, self.num_block_ios, self.io_cost
        )
    }
}
