use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use relplan_core::expr::Expression;
use relplan_core::expr::comparison_expr::ComparisonOperator;
use relplan_core::schema::{ColumnInfo, Schema};
use relplan_core::statistics::ColumnStats;
use relplan_core::statistics::selectivity::estimate_selectivity;
use relplan_core::types::{DataType, ScalarValue};

const COLUMNS: [&str; 3] = ["a", "b", "c"];

const OPS: [ComparisonOperator; 6] = [
    ComparisonOperator::Eq,
    ComparisonOperator::NotEq,
    ComparisonOperator::Lt,
    ComparisonOperator::LtEq,
    ComparisonOperator::Gt,
    ComparisonOperator::GtEq,
];

fn random_value(rng: &mut ChaCha8Rng) -> ScalarValue {
    match rng.random_range(0..4) {
        0 => ScalarValue::Null,
        1 => ScalarValue::Float64(rng.random_range(-20.0..20.0)),
        _ => ScalarValue::Int32(rng.random_range(-20..20)),
    }
}

fn random_stats(rng: &mut ChaCha8Rng) -> ColumnStats {
    let bound = |rng: &mut ChaCha8Rng| {
        if rng.random_bool(0.2) {
            None
        } else {
            Some(ScalarValue::Int32(rng.random_range(-10..10)))
        }
    };
    ColumnStats {
        // Includes zero distinct values and min == max.
        distinct_count: rng.random_bool(0.8).then(|| rng.random_range(0..8)),
        null_count: rng.random_bool(0.8).then(|| rng.random_range(0..4)),
        min: bound(rng),
        max: bound(rng),
    }
}

fn random_column(rng: &mut ChaCha8Rng) -> Expression {
    Expression::column("t", COLUMNS[rng.random_range(0..COLUMNS.len())])
}

fn random_expr(rng: &mut ChaCha8Rng, depth: usize) -> Expression {
    let choice = if depth == 0 {
        rng.random_range(0..4)
    } else {
        rng.random_range(0..7)
    };
    match choice {
        0 => {
            let op = OPS[rng.random_range(0..OPS.len())];
            let (left, right) = (random_column(rng), Expression::lit(random_value(rng)));
            // Literal on the left gets normalized.
            if rng.random_bool(0.5) {
                Expression::compare(op, left, right)
            } else {
                Expression::compare(op, right, left)
            }
        }
        1 => {
            let op = OPS[rng.random_range(0..OPS.len())];
            Expression::compare(op, random_column(rng), random_column(rng))
        }
        2 => {
            let values = (0..rng.random_range(0..6))
                .map(|_| Expression::lit(random_value(rng)))
                .collect();
            Expression::in_values(random_column(rng), values, rng.random_bool(0.3))
        }
        3 => Expression::is_null(random_column(rng), rng.random_bool(0.5)),
        4 => Expression::and(
            (0..rng.random_range(1..4))
                .map(|_| random_expr(rng, depth - 1))
                .collect(),
        ),
        5 => Expression::or(
            (0..rng.random_range(1..4))
                .map(|_| random_expr(rng, depth - 1))
                .collect(),
        ),
        _ => Expression::not(random_expr(rng, depth - 1)),
    }
}

#[test]
fn selectivity_always_in_unit_range() {
    let mut rng = ChaCha8Rng::seed_from_u64(0x5e1ec7);
    let schema = Schema::new(
        COLUMNS
            .iter()
            .map(|name| ColumnInfo::new(Some("t"), *name, DataType::Int32)),
    );

    for _ in 0..2000 {
        let stats: Vec<_> = COLUMNS.iter().map(|_| random_stats(&mut rng)).collect();
        let expr = random_expr(&mut rng, 3);

        let sel = estimate_selectivity(&expr, &schema, &stats);
        assert!((0.0..=1.0).contains(&sel), "selectivity {sel} for {expr} with {stats:?}");
    }
}

#[test]
fn or_of_equalities_matches_in_values() {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let schema = Schema::new([ColumnInfo::new(Some("t"), "a", DataType::Int32)]);

    for _ in 0..200 {
        let stats = vec![random_stats(&mut rng)];
        // A single term is a plain equality, not an OR.
        let values: Vec<i32> = (0..rng.random_range(2..6))
            .map(|_| rng.random_range(-10..10))
            .collect();

        let or = Expression::or(
            values
                .iter()
                .map(|v| Expression::eq(Expression::column("t", "a"), Expression::lit(*v)))
                .collect(),
        );
        let in_values = Expression::in_values(
            Expression::column("t", "a"),
            values.iter().map(|v| Expression::lit(*v)).collect(),
            false,
        );

        assert_eq!(
            estimate_selectivity(&in_values, &schema, &stats),
            estimate_selectivity(&or, &schema, &stats),
            "{or} with {stats:?}"
        );
    }
}
