use std::fmt::Debug;
use std::time::{Duration, Instant};

use relplan_error::Result;
use tracing::{debug, info};

use super::operators::PlanNode;
use crate::schema::Schema;
use crate::tuple::Tuple;

/// Receives the output of an executed plan.
pub trait TupleSink: Debug {
    /// Called once before any rows are pushed.
    fn set_schema(&mut self, schema: &Schema) -> Result<()>;

    fn process(&mut self, tuple: Tuple) -> Result<()>;

    /// Called once after the last row. Not called if execution fails.
    fn finish(&mut self) -> Result<()>;
}

/// Sink that keeps every row in memory.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub schema: Option<Schema>,
    pub rows: Vec<Tuple>,
    pub finished: bool,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_rows(self) -> Vec<Tuple> {
        self.rows
    }
}

impl TupleSink for CollectingSink {
    fn set_schema(&mut self, schema: &Schema) -> Result<()> {
        self.schema = Some(schema.clone());
        Ok(())
    }

    fn process(&mut self, tuple: Tuple) -> Result<()> {
        self.rows.push(tuple);
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.finished = true;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalStats {
    pub rows_produced: u64,
    pub elapsed: Duration,
}

/// Run a prepared plan to completion, pushing every row into `sink`.
///
/// The plan is cleaned up whether or not execution succeeds.
pub fn execute_plan(plan: &mut PlanNode, sink: &mut dyn TupleSink) -> Result<EvalStats> {
    let start = Instant::now();
    debug!(operator = plan.operator_name(), "executing plan");

    let result = drive(plan, sink);
    plan.clean_up();

    let rows_produced = result?;
    let elapsed = start.elapsed();
    info!(rows_produced, elapsed_ms = elapsed.as_millis() as u64, "plan executed");

    Ok(EvalStats {
        rows_produced,
        elapsed,
    })
}

fn drive(plan: &mut PlanNode, sink: &mut dyn TupleSink) -> Result<u64> {
    plan.initialize()?;
    sink.set_schema(plan.schema())?;

    let mut rows = 0;
    while let Some(tuple) = plan.next_tuple()? {
        sink.process(tuple)?;
        rows += 1;
    }

    sink.finish()?;
    Ok(rows)
}
