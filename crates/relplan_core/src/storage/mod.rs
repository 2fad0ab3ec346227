//! Interfaces to the storage layer consumed by plan nodes.

pub mod memory;

use std::fmt::Debug;
use std::sync::Arc;

use relplan_error::{DbError, Result};

use crate::schema::Schema;
use crate::statistics::TableStats;
use crate::tuple::Tuple;

/// Opens tables by name.
pub trait TableProvider: Debug + Sync + Send {
    fn open_table(&self, name: &str) -> Result<Arc<dyn TableHandle>>;
}

/// An opened table.
///
/// The schema and stats are snapshots taken when the table was opened.
pub trait TableHandle: Debug + Sync + Send {
    fn name(&self) -> &str;

    /// Schema with every column qualified by the table name.
    fn schema(&self) -> &Schema;

    fn stats(&self) -> &TableStats;

    /// Begin a new scan from the start of the table.
    fn scan(&self) -> Result<Box<dyn TupleStream>>;
}

/// Cursor over the rows of a table.
pub trait TupleStream: Debug + Send {
    /// Pull the next row.
    ///
    /// Returns None once the stream is exhausted.
    fn next_tuple(&mut self) -> Result<Option<Tuple>>;

    /// Remember the most recently returned row.
    fn mark(&mut self) -> Result<()> {
        Err(DbError::unsupported("Tuple stream does not support marking"))
    }

    /// Rewind so that the next pull returns the marked row again.
    fn reset(&mut self) -> Result<()> {
        Err(DbError::unsupported("Tuple stream does not support marking"))
    }
}
