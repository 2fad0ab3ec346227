use std::fmt;

use hashbrown::HashSet;
use relplan_error::{DbError, Result};
use serde::{Deserialize, Serialize};

use crate::types::DataType;

/// Possibly qualified column reference, `t.a` or `a`.
///
/// Identifiers are matched case insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnName {
    pub table: Option<String>,
    pub column: String,
}

impl ColumnName {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        ColumnName {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    pub fn unqualified(column: impl Into<String>) -> Self {
        ColumnName {
            table: None,
            column: column.into(),
        }
    }

    /// Check if this reference resolves to the given column.
    pub fn matches(&self, info: &ColumnInfo) -> bool {
        if !self.column.eq_ignore_ascii_case(&info.name) {
            return false;
        }
        match (&self.table, &info.table) {
            (None, _) => true,
            (Some(want), Some(have)) => want.eq_ignore_ascii_case(have),
            (Some(_), None) => false,
        }
    }
}

impl fmt::Display for ColumnName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table {
            Some(table) => write!(f, "{table}.{}", self.column),
            None => write!(f, "{}", self.column),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Owning table or alias, if any.
    pub table: Option<String>,
    pub datatype: DataType,
}

impl ColumnInfo {
    pub fn new(table: Option<&str>, name: impl Into<String>, datatype: DataType) -> Self {
        ColumnInfo {
            name: name.into(),
            table: table.map(|t| t.to_string()),
            datatype,
        }
    }

    pub fn column_name(&self) -> ColumnName {
        ColumnName {
            table: self.table.clone(),
            column: self.name.clone(),
        }
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.column_name())
    }
}

/// Ordered list of column descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnInfo>,
}

impl Schema {
    pub fn new(columns: impl IntoIterator<Item = ColumnInfo>) -> Self {
        Schema {
            columns: columns.into_iter().collect(),
        }
    }

    pub fn empty() -> Self {
        Schema {
            columns: Vec::new(),
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column(&self, idx: usize) -> Option<&ColumnInfo> {
        self.columns.get(idx)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn push(&mut self, column: ColumnInfo) {
        self.columns.push(column);
    }

    /// Find the index of the column a name resolves to.
    ///
    /// Errors if the name matches more than one column.
    pub fn find_column(&self, name: &ColumnName) -> Result<Option<usize>> {
        let mut found = None;
        for (idx, col) in self.columns.iter().enumerate() {
            if name.matches(col) {
                if found.is_some() {
                    return Err(DbError::planning(format!("Ambiguous column reference '{name}'"))
                        .with_field("schema", self));
                }
                found = Some(idx);
            }
        }
        Ok(found)
    }

    /// Like `find_column`, but ambiguity is treated as "not found".
    pub fn find_unambiguous(&self, name: &ColumnName) -> Option<usize> {
        self.find_column(name).ok().flatten()
    }

    /// Check if a name resolves to at least one column in this schema.
    pub fn contains(&self, name: &ColumnName) -> bool {
        self.columns.iter().any(|c| name.matches(c))
    }

    /// Check if every name resolves against this schema.
    pub fn contains_all<'a>(&self, names: impl IntoIterator<Item = &'a ColumnName>) -> bool {
        names.into_iter().all(|n| self.contains(n))
    }

    /// Concatenate two schemas, left columns first.
    pub fn concat(&self, other: &Schema) -> Schema {
        let mut columns = self.columns.clone();
        columns.extend(other.columns.iter().cloned());
        Schema { columns }
    }

    /// Re-qualify every column with a new table alias.
    pub fn with_table_alias(&self, alias: &str) -> Schema {
        Schema {
            columns: self
                .columns
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    table: Some(alias.to_string()),
                    datatype: c.datatype,
                })
                .collect(),
        }
    }

    /// Table names referenced by columns in this schema.
    pub fn table_names(&self) -> HashSet<String> {
        self.columns.iter().filter_map(|c| c.table.clone()).collect()
    }

    /// Estimated width of a row, in bytes.
    pub fn estimated_tuple_size(&self) -> usize {
        self.columns.iter().map(|c| c.datatype.estimated_size()).sum()
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (idx, col) in self.columns.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{col}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> Schema {
        Schema::new([
            ColumnInfo::new(Some("t1"), "a", DataType::Int32),
            ColumnInfo::new(Some("t2"), "a", DataType::Int32),
            ColumnInfo::new(Some("t2"), "b", DataType::Utf8),
        ])
    }

    #[test]
    fn find_qualified() {
        let schema = test_schema();
        assert_eq!(Some(1), schema.find_column(&ColumnName::new("t2", "a")).unwrap());
        assert_eq!(Some(2), schema.find_column(&ColumnName::new("T2", "B")).unwrap());
        assert_eq!(None, schema.find_column(&ColumnName::new("t3", "a")).unwrap());
    }

    #[test]
    fn find_unqualified_ambiguous() {
        let schema = test_schema();
        schema.find_column(&ColumnName::unqualified("a")).unwrap_err();
        assert_eq!(Some(2), schema.find_column(&ColumnName::unqualified("b")).unwrap());
        assert!(schema.contains(&ColumnName::unqualified("a")));
    }

    #[test]
    fn alias_requalifies() {
        let schema = test_schema().with_table_alias("x");
        assert_eq!("[x.a, x.a, x.b]", schema.to_string());
        assert_eq!(1, schema.table_names().len());
    }

    #[test]
    fn concat_keeps_order() {
        let left = Schema::new([ColumnInfo::new(Some("t1"), "a", DataType::Int32)]);
        let right = Schema::new([ColumnInfo::new(Some("t2"), "b", DataType::Int64)]);
        assert_eq!("[t1.a, t2.b]", left.concat(&right).to_string());
        assert_eq!(12, left.concat(&right).estimated_tuple_size());
    }
}
