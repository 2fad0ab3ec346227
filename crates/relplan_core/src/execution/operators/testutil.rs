//! Helpers for operator tests.

use relplan_error::Result;

use super::PlanNode;
use crate::storage::TableProvider;
use crate::storage::memory::MemoryTableManager;
use crate::tuple::Tuple;
use crate::types::{DataType, ScalarValue};

/// Build rows of nullable ints.
pub fn opt_int_rows(rows: &[&[Option<i32>]]) -> Vec<Tuple> {
    rows.iter()
        .map(|row| Tuple::new(row.iter().map(|v| ScalarValue::from(*v))))
        .collect()
}

pub fn int_rows(rows: &[&[i32]]) -> Vec<Tuple> {
    rows.iter()
        .map(|row| Tuple::new(row.iter().map(|v| ScalarValue::Int32(*v))))
        .collect()
}

/// Tables:
///
/// - t1(a): 1, 3
/// - t2(b): 1, 5
/// - groups(g, v): (1, 10), (2, 20), (1, 30), (3, NULL), (2, 5)
/// - empty(e)
pub fn test_tables() -> MemoryTableManager {
    let mut tables = MemoryTableManager::new();

    tables.create_table("t1", &[("a", DataType::Int32)]).unwrap();
    tables.insert("t1", int_rows(&[&[1], &[3]])).unwrap();

    tables.create_table("t2", &[("b", DataType::Int32)]).unwrap();
    tables.insert("t2", int_rows(&[&[1], &[5]])).unwrap();

    tables
        .create_table("groups", &[("g", DataType::Int32), ("v", DataType::Int32)])
        .unwrap();
    tables
        .insert(
            "groups",
            opt_int_rows(&[
                &[Some(1), Some(10)],
                &[Some(2), Some(20)],
                &[Some(1), Some(30)],
                &[Some(3), None],
                &[Some(2), Some(5)],
            ]),
        )
        .unwrap();

    tables.create_table("empty", &[("e", DataType::Int32)]).unwrap();

    for name in ["t1", "t2", "groups", "empty"] {
        tables.analyze_table(name).unwrap();
    }

    tables
}

/// Scan of one of the `test_tables`.
pub fn scan(tables: &MemoryTableManager, name: &str) -> PlanNode {
    PlanNode::file_scan(tables.open_table(name).unwrap(), None)
}

/// Initialize a prepared plan and pull every row out of it.
pub fn collect_rows(plan: &mut PlanNode) -> Result<Vec<Tuple>> {
    plan.initialize()?;
    let mut rows = Vec::new();
    while let Some(row) = plan.next_tuple()? {
        rows.push(row);
    }
    plan.clean_up();
    Ok(rows)
}
