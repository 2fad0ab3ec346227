
use relplan_core::ast::{FromClause, JoinType, SelectClause};
use relplan_core::config::PlannerConfig;
use relplan_core::expr::Expression;
use relplan_core::expr::comparison_expr::ComparisonOperator;
use relplan_core::planner::create_planner;

use crate::setup::{configs, rows, run, sorted, test_tables};

fn a_eq_b() -> Expression {
    Expression::eq(Expression::column("t1", "a"), Expression::column("t2", "b"))
}

fn t1_join_t2(join_type: JoinType) -> SelectClause {
    SelectClause::star(FromClause::join(
        FromClause::base_table("t1"),
        FromClause::base_table("t2"),
        join_type,
        Some(a_eq_b()),
    ))
}

#[test]
fn inner_left_right_joins() {
    let tables = test_tables();
    for config in configs() {
        assert_eq!(
            rows(&[&[Some(1), Some(1)]]),
            run(&tables, &config, &t1_join_t2(JoinType::Inner)).unwrap()
        );
        assert_eq!(
            sorted(rows(&[&[Some(1), Some(1)], &[Some(3), None]])),
            sorted(run(&tables, &config, &t1_join_t2(JoinType::Left)).unwrap())
        );
        assert_eq!(
            sorted(rows(&[&[Some(1), Some(1)], &[None, Some(5)]])),
            sorted(run(&tables, &config, &t1_join_t2(JoinType::Right)).unwrap())
        );
    }
}

#[test]
fn joins_with_empty_tables() {
    let tables = test_tables();
    let with_empty = |join_type, empty_on_left| {
        let (left, right) = if empty_on_left {
            (FromClause::base_table("empty"), FromClause::base_table("t1"))
        } else {
            (FromClause::base_table("t1"), FromClause::base_table("empty"))
        };
        SelectClause::star(FromClause::join(
            left,
            right,
            join_type,
            Some(Expression::eq(
                Expression::column("t1", "a"),
                Expression::column("empty", "e"),
            )),
        ))
    };

    for config in configs() {
        assert!(run(&tables, &config, &with_empty(JoinType::Inner, false)).unwrap().is_empty());
        assert!(run(&tables, &config, &with_empty(JoinType::Left, true)).unwrap().is_empty());
        assert_eq!(
            rows(&[&[Some(1), None], &[Some(3), None]]),
            run(&tables, &config, &with_empty(JoinType::Left, false)).unwrap()
        );
        assert_eq!(
            rows(&[&[None, Some(1)], &[None, Some(3)]]),
            run(&tables, &config, &with_empty(JoinType::Right, true)).unwrap()
        );
    }
}

#[test]
fn three_way_join_keeps_written_column_order() {
    let tables = test_tables();
    // SELECT * FROM groups JOIN t3 ON g = c JOIN t1 ON a = c WHERE v > 10
    let from = FromClause::join(
        FromClause::join(
            FromClause::base_table("groups"),
            FromClause::base_table("t3"),
            JoinType::Inner,
            Some(Expression::eq(
                Expression::column("groups", "g"),
                Expression::column("t3", "c"),
            )),
        ),
        FromClause::base_table("t1"),
        JoinType::Inner,
        Some(Expression::eq(
            Expression::column("t1", "a"),
            Expression::column("t3", "c"),
        )),
    );
    let select = SelectClause::star(from).with_where(Expression::compare(
        ComparisonOperator::Gt,
        Expression::column("groups", "v"),
        Expression::lit(10),
    ));

    let config = PlannerConfig::default();
    let plan = create_planner(&tables, &config).make_plan(&select, &[]).unwrap();
    assert_eq!("[groups.g, groups.v, t3.c, t1.a]", plan.schema().to_string());

    // Only (1, 30) passes the filter, and matches both rows of t3 with c = 1.
    let expected = rows(&[
        &[Some(1), Some(30), Some(1), Some(1)],
        &[Some(1), Some(30), Some(1), Some(1)],
    ]);
    for config in configs() {
        assert_eq!(expected, run(&tables, &config, &select).unwrap());
    }
}

#[test]
fn join_order_covers_every_conjunct() {
    let tables = test_tables();
    let names = ["t1", "t2", "t3", "groups"];
    let cols = [("t1", "a"), ("t2", "b"), ("t3", "c"), ("groups", "g")];

    // Every chain of equalities over a rotation of the tables, written as
    // cross joins with the conditions in WHERE.
    for rotation in 0..names.len() {
        let order: Vec<_> = (0..names.len()).map(|i| (i + rotation) % names.len()).collect();

        let mut from = FromClause::base_table(names[order[0]]);
        for &idx in &order[1..] {
            from = FromClause::join(from, FromClause::base_table(names[idx]), JoinType::Cross, None);
        }
        let conjuncts = order
            .windows(2)
            .map(|pair| {
                let (lt, lc) = cols[pair[0]];
                let (rt, rc) = cols[pair[1]];
                Expression::eq(Expression::column(lt, lc), Expression::column(rt, rc))
            })
            .collect();
        let select = SelectClause::star(from).with_where(Expression::and(conjuncts));

        let [cost_based, simple] = configs();
        let expected = sorted(run(&tables, &simple, &select).unwrap());
        assert_eq!(expected, sorted(run(&tables, &cost_based, &select).unwrap()));
        // a = b = c = g = 1: one row of t1 and t2, two of t3, two of groups.
        assert_eq!(4, expected.len());
    }
}

#[test]
fn nullable_side_conjunct_applied_after_outer_join() {
    let tables = test_tables();
    // SELECT * FROM t1 LEFT JOIN t2 ON a = b WHERE t2.b IS NULL
    let select = t1_join_t2(JoinType::Left)
        .with_where(Expression::is_null(Expression::column("t2", "b"), false));

    for config in configs() {
        assert_eq!(
            rows(&[&[Some(3), None]]),
            run(&tables, &config, &select).unwrap()
        );
    }
}

#[test]
fn outer_join_inside_inner_join() {
    let tables = test_tables();
    // SELECT * FROM t1 LEFT JOIN t2 ON a = b JOIN t3 ON a = c
    let select = SelectClause::star(FromClause::join(
        FromClause::join(
            FromClause::base_table("t1"),
            FromClause::base_table("t2"),
            JoinType::Left,
            Some(a_eq_b()),
        ),
        FromClause::base_table("t3"),
        JoinType::Inner,
        Some(Expression::eq(
            Expression::column("t1", "a"),
            Expression::column("t3", "c"),
        )),
    ));

    let expected = rows(&[&[Some(1), Some(1), Some(1)], &[Some(1), Some(1), Some(1)]]);
    for config in configs() {
        assert_eq!(expected, run(&tables, &config, &select).unwrap());
    }
}

#[test]
fn unrecognised_conjunct_fails() {
    let tables = test_tables();
    let config = PlannerConfig::default();

    let select = t1_join_t2(JoinType::Inner).with_where(Expression::eq(
        Expression::column("t1", "a"),
        Expression::column("nowhere", "x"),
    ));
    let err = run(&tables, &config, &select).unwrap_err();
    assert!(err.to_string().starts_with("Some conjuncts weren't recognised"));
}

#[test]
fn aliased_and_derived_tables() {
    let tables = test_tables();
    // SELECT * FROM t1 AS x JOIN (SELECT * FROM t2 WHERE b < 3) AS y ON x.a = y.b
    let derived = SelectClause::star(FromClause::base_table("t2")).with_where(Expression::compare(
        ComparisonOperator::Lt,
        Expression::column("t2", "b"),
        Expression::lit(3),
    ));
    let select = SelectClause::star(FromClause::join(
        FromClause::base_table("t1").with_alias("x"),
        FromClause::derived(derived, "y"),
        JoinType::Inner,
        Some(Expression::eq(
            Expression::column("x", "a"),
            Expression::column("y", "b"),
        )),
    ));

    for config in configs() {
        assert_eq!(rows(&[&[Some(1), Some(1)]]), run(&tables, &config, &select).unwrap());
    }
}
