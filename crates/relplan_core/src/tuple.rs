use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::ScalarValue;

/// A materialized row.
///
/// Rows handed out by plan nodes are owned values. Storage backed rows are
/// copied out of the storage layer when read, so there is no pin to release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tuple {
    values: Vec<ScalarValue>,
}

impl Tuple {
    pub fn new(values: impl IntoIterator<Item = ScalarValue>) -> Self {
        Tuple {
            values: values.into_iter().collect(),
        }
    }

    /// Row of `n` NULLs, used for outer join padding.
    pub fn nulls(n: usize) -> Self {
        Tuple {
            values: vec![ScalarValue::Null; n],
        }
    }

    pub fn values(&self) -> &[ScalarValue] {
        &self.values
    }

    pub fn into_values(self) -> Vec<ScalarValue> {
        self.values
    }

    pub fn get(&self, idx: usize) -> Option<&ScalarValue> {
        self.values.get(idx)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// New row with this row's values followed by `other`'s.
    pub fn concat(&self, other: &Tuple) -> Tuple {
        let mut values = Vec::with_capacity(self.values.len() + other.values.len());
        values.extend(self.values.iter().cloned());
        values.extend(other.values.iter().cloned());
        Tuple { values }
    }
}

impl From<Vec<ScalarValue>> for Tuple {
    fn from(values: Vec<ScalarValue>) -> Self {
        Tuple { values }
    }
}

impl FromIterator<ScalarValue> for Tuple {
    fn from_iter<I: IntoIterator<Item = ScalarValue>>(iter: I) -> Self {
        Tuple::new(iter)
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (idx, v) in self.values.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn concat_and_display() {
        let left = Tuple::new([ScalarValue::Int32(1)]);
        let right = Tuple::nulls(2);
        let out = left.concat(&right);
        assert_eq!(3, out.len());
        assert_eq!("(1, NULL, NULL)", out.to_string());
    }
}
