//! In memory tables.

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use relplan_error::{DbError, Result};
use tracing::debug;

use super::{TableHandle, TableProvider, TupleStream};
use crate::schema::{ColumnInfo, Schema};
use crate::statistics::{ColumnStats, TableStats};
use crate::tuple::Tuple;
use crate::types::{DataType, ScalarValue};

/// Size of a page used when estimating page counts.
pub const PAGE_SIZE: usize = 8192;

#[derive(Debug, Clone)]
struct MemoryTable {
    name: String,
    schema: Schema,
    stats: TableStats,
    rows: Arc<Vec<Tuple>>,
}

/// Tables held entirely in memory.
///
/// Opened handles see the rows and stats as they were at open time.
/// Statistics are only refreshed by `analyze_table`.
#[derive(Debug, Default)]
pub struct MemoryTableManager {
    tables: HashMap<String, MemoryTable>,
}

impl MemoryTableManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty table. Column names are qualified with the table name.
    pub fn create_table(&mut self, name: &str, columns: &[(&str, DataType)]) -> Result<()> {
        let key = name.to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(DbError::new(format!("Table '{name}' already exists")));
        }

        let mut seen = HashSet::new();
        for (col, _) in columns {
            if !seen.insert(col.to_ascii_lowercase()) {
                return Err(DbError::new(format!("Duplicate column '{col}'"))
                    .with_field("table", name));
            }
        }

        let schema = Schema::new(
            columns
                .iter()
                .map(|(col, datatype)| ColumnInfo::new(Some(name), *col, *datatype)),
        );

        debug!(table = name, %schema, "created table");

        self.tables.insert(
            key,
            MemoryTable {
                name: name.to_string(),
                stats: TableStats::unknown(schema.num_columns()),
                schema,
                rows: Arc::new(Vec::new()),
            },
        );

        Ok(())
    }

    /// Append rows to a table.
    ///
    /// Each value must match the column's type or be NULL. Nothing is
    /// inserted if any row is invalid.
    pub fn insert(&mut self, name: &str, rows: impl IntoIterator<Item = Tuple>) -> Result<usize> {
        let table = self.table_mut(name)?;
        let rows: Vec<Tuple> = rows.into_iter().collect();

        for row in &rows {
            if row.len() != table.schema.num_columns() {
                return Err(DbError::new("Row does not match table arity")
                    .with_field("table", &table.name)
                    .with_field("expected", table.schema.num_columns())
                    .with_field("got", row.len()));
            }
            for (value, col) in row.values().iter().zip(table.schema.columns()) {
                if !value.is_null() && value.datatype() != col.datatype {
                    return Err(DbError::new(format!(
                        "Value {value} does not match type of column '{col}'"
                    ))
                    .with_field("expected", col.datatype)
                    .with_field("got", value.datatype()));
                }
            }
        }

        let count = rows.len();
        Arc::make_mut(&mut table.rows).extend(rows);

        Ok(count)
    }

    /// Recompute statistics for a table from its current rows.
    pub fn analyze_table(&mut self, name: &str) -> Result<&TableStats> {
        let table = self.table_mut(name)?;
        table.stats = compute_stats(&table.schema, &table.rows);

        debug!(
            table = %table.name,
            rows = table.stats.row_count,
            pages = table.stats.page_count,
            "analyzed table"
        );

        Ok(&table.stats)
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut MemoryTable> {
        self.tables
            .get_mut(&name.to_ascii_lowercase())
            .ok_or_else(|| missing_table(name))
    }
}

fn missing_table(name: &str) -> DbError {
    DbError::planning(format!("Table '{name}' does not exist"))
}

impl TableProvider for MemoryTableManager {
    fn open_table(&self, name: &str) -> Result<Arc<dyn TableHandle>> {
        let table = self
            .tables
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| missing_table(name))?;
        Ok(Arc::new(MemoryTableHandle {
            table: table.clone(),
        }))
    }
}

#[derive(Debug)]
struct MemoryTableHandle {
    table: MemoryTable,
}

impl TableHandle for MemoryTableHandle {
    fn name(&self) -> &str {
        &self.table.name
    }

    fn schema(&self) -> &Schema {
        &self.table.schema
    }

    fn stats(&self) -> &TableStats {
        &self.table.stats
    }

    fn scan(&self) -> Result<Box<dyn TupleStream>> {
        Ok(Box::new(MemoryTupleStream {
            rows: self.table.rows.clone(),
            pos: 0,
            mark: None,
        }))
    }
}

#[derive(Debug)]
struct MemoryTupleStream {
    rows: Arc<Vec<Tuple>>,
    /// Index of the next row to return.
    pos: usize,
    mark: Option<usize>,
}

impl TupleStream for MemoryTupleStream {
    fn next_tuple(&mut self) -> Result<Option<Tuple>> {
        match self.rows.get(self.pos) {
            Some(row) => {
                self.pos += 1;
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    fn mark(&mut self) -> Result<()> {
        self.mark = Some(self.pos.saturating_sub(1));
        Ok(())
    }

    fn reset(&mut self) -> Result<()> {
        match self.mark {
            Some(mark) => {
                self.pos = mark;
                Ok(())
            }
            None => Err(DbError::state("Reset called on a stream without a mark")),
        }
    }
}

fn compute_stats(schema: &Schema, rows: &[Tuple]) -> TableStats {
    let mut columns = Vec::with_capacity(schema.num_columns());
    for idx in 0..schema.num_columns() {
        columns.push(compute_column_stats(idx, rows));
    }

    let total_bytes: usize = rows
        .iter()
        .map(|row| row.values().iter().map(value_size).sum::<usize>())
        .sum();

    let avg_tuple_size = if rows.is_empty() {
        schema.estimated_tuple_size() as f64
    } else {
        total_bytes as f64 / rows.len() as f64
    };

    TableStats {
        row_count: rows.len() as u64,
        page_count: total_bytes.div_ceil(PAGE_SIZE) as u64,
        avg_tuple_size,
        columns,
    }
}

fn compute_column_stats(idx: usize, rows: &[Tuple]) -> ColumnStats {
    let mut distinct = HashSet::new();
    let mut nulls = 0;
    let mut min: Option<ScalarValue> = None;
    let mut max: Option<ScalarValue> = None;

    for row in rows {
        let value = match row.get(idx) {
            Some(value) => value,
            None => continue,
        };
        if value.is_null() {
            nulls += 1;
            continue;
        }

        if min
            .as_ref()
            .is_none_or(|m| value.compare(m).ok().flatten() == Some(std::cmp::Ordering::Less))
        {
            min = Some(value.clone());
        }
        if max
            .as_ref()
            .is_none_or(|m| value.compare(m).ok().flatten() == Some(std::cmp::Ordering::Greater))
        {
            max = Some(value.clone());
        }
        distinct.insert(value.clone());
    }

    ColumnStats {
        distinct_count: Some(distinct.len() as u64),
        null_count: Some(nulls),
        min,
        max,
    }
}

fn value_size(value: &ScalarValue) -> usize {
    match value {
        ScalarValue::Utf8(s) => s.len() + 2,
        other => other.datatype().estimated_size(),
    }
}
