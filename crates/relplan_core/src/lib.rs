//! Query planning and execution for single select blocks.
//!
//! A `SelectClause` is turned into a prepared `PlanNode` tree by a planner
//! (cost based by default) and driven to completion by the evaluator.

pub mod ast;
pub mod config;
pub mod execution;
pub mod explain;
pub mod expr;
pub mod functions;
pub mod planner;
pub mod schema;
pub mod statistics;
pub mod storage;
pub mod tuple;
pub mod types;
