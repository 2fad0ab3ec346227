//! Heuristic predicate selectivity.
//!
//! Terms of a conjunction or disjunction are assumed to be independent, so
//! estimates can be far off for correlated predicates.

use hashbrown::HashSet;
use tracing::trace;

use super::ColumnStats;
use super::assumptions::DEFAULT_SELECTIVITY;
use crate::expr::Expression;
use crate::expr::comparison_expr::{ComparisonExpr, ComparisonOperator};
use crate::expr::conjunction_expr::{ConjunctionExpr, ConjunctionOperator};
use crate::schema::{ColumnName, Schema};
use crate::types::ScalarValue;

/// Estimate the fraction of rows satisfying `expr`.
///
/// `stats` holds one entry per column of `schema`. The result is always in
/// `[0, 1]`; shapes that aren't understood get `DEFAULT_SELECTIVITY`.
pub fn estimate_selectivity(expr: &Expression, schema: &Schema, stats: &[ColumnStats]) -> f64 {
    let sel = match expr {
        Expression::InValues(in_vals) => {
            let sel = match in_vals.expr.as_column() {
                Some(col) => estimate_in_values(col, &in_vals.values, schema, stats),
                None => DEFAULT_SELECTIVITY,
            };
            if in_vals.negated { 1.0 - sel } else { sel }
        }
        Expression::Conjunction(conj) => estimate_conjunction(conj, schema, stats),
        Expression::Not(inner) => 1.0 - estimate_selectivity(inner, schema, stats),
        Expression::Comparison(cmp) => estimate_comparison(cmp, schema, stats),
        _ => DEFAULT_SELECTIVITY,
    };
    clamp(sel)
}

/// Estimate selectivity of an optional predicate. No predicate selects
/// everything.
pub fn estimate_optional(expr: Option<&Expression>, schema: &Schema, stats: &[ColumnStats]) -> f64 {
    match expr {
        Some(expr) => estimate_selectivity(expr, schema, stats),
        None => 1.0,
    }
}

fn clamp(v: f64) -> f64 {
    if v.is_nan() {
        return DEFAULT_SELECTIVITY;
    }
    v.clamp(0.0, 1.0)
}

fn column_stats<'a>(
    col: &ColumnName,
    schema: &Schema,
    stats: &'a [ColumnStats],
) -> Option<(usize, &'a ColumnStats)> {
    let idx = schema.find_unambiguous(col)?;
    stats.get(idx).map(|s| (idx, s))
}

fn known_distinct(stats: &ColumnStats) -> Option<u64> {
    stats.distinct_count.filter(|d| *d > 0)
}

/// `col IN (v1, v2, ...)`
///
/// Literal values outside the column's `[min, max]` range are discarded when
/// the range is known. Non-literal values are each assumed to match one
/// distinct value. NULL literals never match.
fn estimate_in_values(
    col: &ColumnName,
    values: &[Expression],
    schema: &Schema,
    stats: &[ColumnStats],
) -> f64 {
    let Some((_, col_stats)) = column_stats(col, schema, stats) else {
        return DEFAULT_SELECTIVITY;
    };
    let Some(distinct) = known_distinct(col_stats) else {
        return DEFAULT_SELECTIVITY;
    };

    let mut total = distinct;
    if col_stats.null_count.unwrap_or(0) > 0 {
        total += 1;
    }

    let mut relevant: u64 = 0;
    let mut literals: Vec<&ScalarValue> = Vec::new();
    for value in values {
        match value {
            Expression::Literal(ScalarValue::Null) => (),
            Expression::Literal(lit) => literals.push(lit),
            _ => relevant += 1,
        }
    }

    match (&col_stats.min, &col_stats.max) {
        (Some(min), Some(max)) if col_stats.has_different_min_max() => {
            relevant += literals
                .iter()
                .filter(|lit| in_range(lit, min, max))
                .count() as u64;
        }
        _ => {
            let unique: HashSet<&ScalarValue> = literals.into_iter().collect();
            relevant += unique.len() as u64;
        }
    }

    let sel = relevant.min(distinct) as f64 / total as f64;
    trace!(%col, relevant, distinct, total, sel, "estimated IN selectivity");
    sel
}

/// Inclusive range check. Values that can't be compared with the bounds are
/// kept.
fn in_range(value: &ScalarValue, min: &ScalarValue, max: &ScalarValue) -> bool {
    let above_min = match value.compare(min) {
        Ok(Some(ord)) => ord != std::cmp::Ordering::Less,
        _ => true,
    };
    let below_max = match value.compare(max) {
        Ok(Some(ord)) => ord != std::cmp::Ordering::Greater,
        _ => true,
    };
    above_min && below_max
}

fn estimate_conjunction(conj: &ConjunctionExpr, schema: &Schema, stats: &[ColumnStats]) -> f64 {
    let sel = match conj.op {
        ConjunctionOperator::And => conj
            .expressions
            .iter()
            .map(|e| estimate_selectivity(e, schema, stats))
            .product(),
        ConjunctionOperator::Or => match or_as_in_values(&conj.expressions) {
            Some((col, values)) => estimate_in_values(&col, &values, schema, stats),
            None => {
                1.0 - conj
                    .expressions
                    .iter()
                    .map(|e| 1.0 - estimate_selectivity(e, schema, stats))
                    .product::<f64>()
            }
        },
    };
    trace!(%conj, sel, "estimated conjunction selectivity");
    clamp(sel)
}

/// Rewrite `c = v1 OR c = v2 OR ...` as `(c, [v1, v2, ...])`.
///
/// Every term must be an equality between the same column and a non-column
/// value.
fn or_as_in_values(terms: &[Expression]) -> Option<(ColumnName, Vec<Expression>)> {
    let mut column: Option<ColumnName> = None;
    let mut values = Vec::with_capacity(terms.len());

    for term in terms {
        let Expression::Comparison(cmp) = term else {
            return None;
        };
        let cmp = cmp.clone().normalize();
        if cmp.op != ComparisonOperator::Eq {
            return None;
        }
        let left = cmp.left.as_column()?;
        if cmp.right.as_column().is_some() {
            return None;
        }

        match &column {
            None => column = Some(left.clone()),
            Some(existing) if existing == left => (),
            Some(_) => return None,
        }
        values.push(*cmp.right);
    }

    column.map(|c| (c, values))
}

fn estimate_comparison(cmp: &ComparisonExpr, schema: &Schema, stats: &[ColumnStats]) -> f64 {
    let cmp = cmp.clone().normalize();
    let sel = match (cmp.left.as_ref(), cmp.right.as_ref()) {
        (Expression::Column(col), Expression::Literal(value)) => {
            estimate_column_value(cmp.op, col, value, schema, stats)
        }
        (Expression::Column(left), Expression::Column(right)) => {
            estimate_column_column(cmp.op, left, right, schema, stats)
        }
        _ => DEFAULT_SELECTIVITY,
    };
    trace!(%cmp, sel, "estimated comparison selectivity");
    sel
}

fn estimate_column_value(
    op: ComparisonOperator,
    col: &ColumnName,
    value: &ScalarValue,
    schema: &Schema,
    stats: &[ColumnStats],
) -> f64 {
    let Some((idx, col_stats)) = column_stats(col, schema, stats) else {
        return DEFAULT_SELECTIVITY;
    };

    match op {
        ComparisonOperator::Eq | ComparisonOperator::NotEq => match known_distinct(col_stats) {
            Some(distinct) => {
                let sel = 1.0 / distinct as f64;
                if op == ComparisonOperator::NotEq { 1.0 - sel } else { sel }
            }
            None => DEFAULT_SELECTIVITY,
        },
        ComparisonOperator::GtEq | ComparisonOperator::Lt => {
            match range_bounds(idx, value, schema, col_stats) {
                Some((v, min, max)) => {
                    let sel = ratio(v, max, min, max);
                    if op == ComparisonOperator::Lt { 1.0 - sel } else { sel }
                }
                None => DEFAULT_SELECTIVITY,
            }
        }
        ComparisonOperator::LtEq | ComparisonOperator::Gt => {
            match range_bounds(idx, value, schema, col_stats) {
                Some((v, min, max)) => {
                    let sel = ratio(min, v, min, max);
                    if op == ComparisonOperator::Gt { 1.0 - sel } else { sel }
                }
                None => DEFAULT_SELECTIVITY,
            }
        }
    }
}

/// Numeric (value, min, max) if range estimates apply to this column.
fn range_bounds(
    idx: usize,
    value: &ScalarValue,
    schema: &Schema,
    stats: &ColumnStats,
) -> Option<(f64, f64, f64)> {
    let col = schema.column(idx)?;
    if !col.datatype.is_numeric() || !stats.has_different_min_max() {
        return None;
    }
    let min = stats.min.as_ref()?.to_f64()?;
    let max = stats.max.as_ref()?.to_f64()?;
    let v = value.to_f64()?;
    Some((v, min, max))
}

/// `(high1 - low1) / (high2 - low2)` clamped to `[0, 1]`.
fn ratio(low1: f64, high1: f64, low2: f64, high2: f64) -> f64 {
    let denom = high2 - low2;
    if denom == 0.0 {
        return DEFAULT_SELECTIVITY;
    }
    clamp((high1 - low1) / denom)
}

fn estimate_column_column(
    op: ComparisonOperator,
    left: &ColumnName,
    right: &ColumnName,
    schema: &Schema,
    stats: &[ColumnStats],
) -> f64 {
    let (Some((_, left_stats)), Some((_, right_stats))) = (
        column_stats(left, schema, stats),
        column_stats(right, schema, stats),
    ) else {
        return DEFAULT_SELECTIVITY;
    };

    match (op, known_distinct(left_stats), known_distinct(right_stats)) {
        (ComparisonOperator::Eq | ComparisonOperator::NotEq, Some(d1), Some(d2)) => {
            let sel = d1.min(d2) as f64 / (d1 as f64 * d2 as f64);
            if op == ComparisonOperator::NotEq { 1.0 - sel } else { sel }
        }
        _ => DEFAULT_SELECTIVITY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ColumnInfo;
    use crate::types::DataType;

    fn int_schema() -> (Schema, Vec<ColumnStats>) {
        let schema = Schema::new([
            ColumnInfo::new(Some("t1"), "a", DataType::Int32),
            ColumnInfo::new(Some("t1"), "b", DataType::Int32),
        ]);
        let stats = vec![
            // Uniform 1..=4
            ColumnStats {
                distinct_count: Some(4),
                null_count: Some(0),
                min: Some(ScalarValue::Int32(1)),
                max: Some(ScalarValue::Int32(4)),
            },
            ColumnStats {
                distinct_count: Some(10),
                null_count: Some(0),
                min: Some(ScalarValue::Int32(0)),
                max: Some(ScalarValue::Int32(100)),
            },
        ];
        (schema, stats)
    }

    fn col_a() -> Expression {
        Expression::column("t1", "a")
    }

    fn in_lits(vals: &[i32]) -> Expression {
        Expression::in_values(col_a(), vals.iter().map(|v| Expression::lit(*v)).collect(), false)
    }

    fn or_lits(vals: &[i32]) -> Expression {
        Expression::or(
            vals.iter()
                .map(|v| Expression::eq(col_a(), Expression::lit(*v)))
                .collect(),
        )
    }

    #[test]
    fn in_values_uniform() {
        let (schema, stats) = int_schema();
        assert_eq!(0.25, estimate_selectivity(&in_lits(&[1, 5]), &schema, &stats));
        assert_eq!(0.0, estimate_selectivity(&in_lits(&[5, 6, 7, 8]), &schema, &stats));
        assert_eq!(1.0, estimate_selectivity(&in_lits(&[1, 2, 3, 4]), &schema, &stats));
    }

    #[test]
    fn or_same_column_matches_in_values() {
        let (schema, stats) = int_schema();
        for vals in [&[1, 5][..], &[5, 6, 7, 8][..], &[1, 2, 3, 4][..], &[2][..]] {
            assert_eq!(
                estimate_selectivity(&in_lits(vals), &schema, &stats),
                estimate_selectivity(&or_lits(vals), &schema, &stats),
                "values: {vals:?}",
            );
        }
    }

    #[test]
    fn or_with_flipped_comparison_still_in_values() {
        let (schema, stats) = int_schema();
        let expr = Expression::or(vec![
            Expression::eq(Expression::lit(1), col_a()),
            Expression::eq(col_a(), Expression::lit(5)),
        ]);
        assert_eq!(0.25, estimate_selectivity(&expr, &schema, &stats));
    }

    #[test]
    fn or_different_columns_uses_independence() {
        let (schema, stats) = int_schema();
        let expr = Expression::or(vec![
            Expression::eq(col_a(), Expression::lit(1)),
            Expression::eq(Expression::column("t1", "b"), Expression::lit(1)),
        ]);
        let expected = 1.0 - (1.0 - 0.25) * (1.0 - 0.1);
        let got = estimate_selectivity(&expr, &schema, &stats);
        assert!((expected - got).abs() < 1e-9, "got {got}");
    }

    #[test]
    fn and_not_products() {
        let (schema, stats) = int_schema();
        let eq_a = Expression::eq(col_a(), Expression::lit(1));
        let eq_b = Expression::eq(Expression::column("t1", "b"), Expression::lit(1));
        let and = Expression::and(vec![eq_a.clone(), eq_b]);
        assert!((0.025 - estimate_selectivity(&and, &schema, &stats)).abs() < 1e-9);
        assert_eq!(0.75, estimate_selectivity(&Expression::not(eq_a), &schema, &stats));
    }

    #[test]
    fn range_comparisons() {
        let (schema, stats) = int_schema();
        let b = Expression::column("t1", "b");
        let cmp = |op, v: i32| Expression::compare(op, b.clone(), Expression::lit(v));

        assert_eq!(0.75, estimate_selectivity(&cmp(ComparisonOperator::GtEq, 25), &schema, &stats));
        assert_eq!(0.25, estimate_selectivity(&cmp(ComparisonOperator::Lt, 25), &schema, &stats));
        assert_eq!(0.25, estimate_selectivity(&cmp(ComparisonOperator::LtEq, 25), &schema, &stats));
        assert_eq!(0.75, estimate_selectivity(&cmp(ComparisonOperator::Gt, 25), &schema, &stats));
        // Out of range values clamp.
        assert_eq!(0.0, estimate_selectivity(&cmp(ComparisonOperator::Gt, 500), &schema, &stats));
        assert_eq!(1.0, estimate_selectivity(&cmp(ComparisonOperator::GtEq, -5), &schema, &stats));
    }

    #[test]
    fn range_comparison_literal_on_left() {
        let (schema, stats) = int_schema();
        // 25 > b  ==  b < 25
        let expr = Expression::compare(
            ComparisonOperator::Gt,
            Expression::lit(25),
            Expression::column("t1", "b"),
        );
        assert_eq!(0.25, estimate_selectivity(&expr, &schema, &stats));
    }

    #[test]
    fn range_on_string_uses_default() {
        let schema = Schema::new([ColumnInfo::new(Some("t"), "s", DataType::Utf8)]);
        let stats = vec![ColumnStats {
            distinct_count: Some(3),
            null_count: Some(0),
            min: Some("a".into()),
            max: Some("z".into()),
        }];
        let expr = Expression::compare(
            ComparisonOperator::Lt,
            Expression::column("t", "s"),
            Expression::lit("m"),
        );
        assert_eq!(DEFAULT_SELECTIVITY, estimate_selectivity(&expr, &schema, &stats));
    }

    #[test]
    fn equality_fallbacks() {
        let (schema, mut stats) = int_schema();
        let eq = Expression::eq(col_a(), Expression::lit(2));
        let ne = Expression::compare(ComparisonOperator::NotEq, col_a(), Expression::lit(2));
        assert_eq!(0.25, estimate_selectivity(&eq, &schema, &stats));
        assert_eq!(0.75, estimate_selectivity(&ne, &schema, &stats));

        stats[0].distinct_count = Some(0);
        assert_eq!(DEFAULT_SELECTIVITY, estimate_selectivity(&eq, &schema, &stats));
        stats[0].distinct_count = None;
        assert_eq!(DEFAULT_SELECTIVITY, estimate_selectivity(&ne, &schema, &stats));
    }

    #[test]
    fn column_column() {
        let (schema, stats) = int_schema();
        let eq = Expression::eq(col_a(), Expression::column("t1", "b"));
        assert!((0.1 - estimate_selectivity(&eq, &schema, &stats)).abs() < 1e-9);

        let ne = Expression::compare(ComparisonOperator::NotEq, col_a(), Expression::column("t1", "b"));
        assert!((0.9 - estimate_selectivity(&ne, &schema, &stats)).abs() < 1e-9);

        let lt = Expression::compare(ComparisonOperator::Lt, col_a(), Expression::column("t1", "b"));
        assert_eq!(DEFAULT_SELECTIVITY, estimate_selectivity(&lt, &schema, &stats));

        let unknown = Expression::eq(col_a(), Expression::column("t9", "z"));
        assert_eq!(DEFAULT_SELECTIVITY, estimate_selectivity(&unknown, &schema, &stats));
    }

    #[test]
    fn varchar_in_values_no_nulls() {
        let schema = Schema::new([ColumnInfo::new(Some("t2"), "a", DataType::Utf8)]);
        let stats = vec![ColumnStats {
            distinct_count: Some(4),
            null_count: Some(0),
            min: Some("a".into()),
            max: Some("t".into()),
        }];
        let or = |vals: &[&str]| {
            Expression::or(
                vals.iter()
                    .map(|v| Expression::eq(Expression::column("t2", "a"), Expression::lit(*v)))
                    .collect(),
            )
        };
        assert_eq!(0.5, estimate_selectivity(&or(&["t", "n"]), &schema, &stats));
        assert_eq!(0.25, estimate_selectivity(&or(&["a"]), &schema, &stats));
        assert_eq!(1.0, estimate_selectivity(&or(&["t", "n", "a", "c", "d"]), &schema, &stats));
    }

    #[test]
    fn varchar_in_values_with_nulls() {
        let schema = Schema::new([ColumnInfo::new(Some("t3"), "a", DataType::Utf8)]);
        let stats = vec![ColumnStats {
            distinct_count: Some(3),
            null_count: Some(1),
            min: Some("a".into()),
            max: Some("t".into()),
        }];
        // Built directly so a single equality stays a disjunction.
        let or = |vals: &[&str]| {
            Expression::Conjunction(ConjunctionExpr {
                op: ConjunctionOperator::Or,
                expressions: vals
                    .iter()
                    .map(|v| Expression::eq(Expression::column("t3", "a"), Expression::lit(*v)))
                    .collect(),
            })
        };
        assert_eq!(0.5, estimate_selectivity(&or(&["t", "n"]), &schema, &stats));
        assert_eq!(0.25, estimate_selectivity(&or(&["a"]), &schema, &stats));
        assert_eq!(0.75, estimate_selectivity(&or(&["t", "n", "a", "c", "d"]), &schema, &stats));
    }

    #[test]
    fn in_values_equal_min_max_counts_distinct_literals() {
        let schema = Schema::new([ColumnInfo::new(Some("t"), "a", DataType::Int32)]);
        let stats = vec![ColumnStats {
            distinct_count: Some(1),
            null_count: Some(1),
            min: Some(ScalarValue::Int32(3)),
            max: Some(ScalarValue::Int32(3)),
        }];
        let expr = Expression::in_values(
            Expression::column("t", "a"),
            vec![Expression::lit(3), Expression::lit(3), Expression::null()],
            false,
        );
        assert_eq!(0.5, estimate_selectivity(&expr, &schema, &stats));
    }

    #[test]
    fn unknown_shapes_default() {
        let (schema, stats) = int_schema();
        let expr = Expression::is_null(col_a(), false);
        assert_eq!(DEFAULT_SELECTIVITY, estimate_selectivity(&expr, &schema, &stats));
        assert_eq!(1.0, estimate_optional(None, &schema, &stats));
    }
}
