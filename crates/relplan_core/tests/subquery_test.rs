
use relplan_core::ast::{FromClause, JoinType, SelectClause, SelectValue};
use relplan_core::config::PlannerConfig;
use relplan_core::expr::Expression;
use relplan_core::planner::create_planner;

use crate::setup::{configs, rows, run, sorted, test_tables};

fn b_eq_a() -> Expression {
    Expression::eq(Expression::column("t2", "b"), Expression::column("t1", "a"))
}

/// `SELECT t1.a, (SELECT t2.b FROM t2 WHERE t2.b = t1.a) AS m FROM t1`
fn scalar_lookup() -> SelectClause {
    let lookup = SelectClause::new(vec![SelectValue::expr(Expression::column("t2", "b"))])
        .with_from(FromClause::base_table("t2"))
        .with_where(b_eq_a());
    SelectClause::new(vec![
        SelectValue::expr(Expression::column("t1", "a")),
        SelectValue::aliased(Expression::scalar_subquery(lookup), "m"),
    ])
    .with_from(FromClause::base_table("t1"))
}

#[test]
fn correlated_exists() {
    let tables = test_tables();
    // SELECT * FROM t1 WHERE EXISTS (SELECT * FROM t2 WHERE t2.b = t1.a)
    let select = SelectClause::star(FromClause::base_table("t1")).with_where(Expression::exists(
        SelectClause::star(FromClause::base_table("t2")).with_where(b_eq_a()),
    ));

    for config in configs() {
        assert_eq!(rows(&[&[Some(1)]]), run(&tables, &config, &select).unwrap());
    }
}

#[test]
fn uncorrelated_in_and_not_in() {
    let tables = test_tables();
    let subquery =
        || SelectClause::new(vec![SelectValue::expr(Expression::column("t3", "c"))])
            .with_from(FromClause::base_table("t3"));

    let select_in = SelectClause::star(FromClause::base_table("t2")).with_where(
        Expression::in_subquery(Expression::column("t2", "b"), subquery(), false),
    );
    let select_not_in = SelectClause::star(FromClause::base_table("t1")).with_where(
        Expression::in_subquery(Expression::column("t1", "a"), subquery(), true),
    );

    for config in configs() {
        assert_eq!(
            rows(&[&[Some(1)], &[Some(5)]]),
            run(&tables, &config, &select_in).unwrap()
        );
        assert_eq!(rows(&[&[Some(3)]]), run(&tables, &config, &select_not_in).unwrap());
    }
}

#[test]
fn scalar_lookup_with_and_without_decorrelation() {
    let tables = test_tables();
    let expected = rows(&[&[Some(1), Some(1)], &[Some(3), None]]);

    for mut config in configs() {
        for decorrelate in [true, false] {
            config.enable_subquery_decorrelation = decorrelate;
            assert_eq!(
                expected,
                sorted(run(&tables, &config, &scalar_lookup()).unwrap()),
                "decorrelate: {decorrelate}, join reorder: {}",
                config.enable_join_reorder
            );
        }
    }
}

#[test]
fn decorrelated_lookup_is_a_join() {
    let tables = test_tables();
    let config = PlannerConfig::default();
    let plan = create_planner(&tables, &config)
        .make_plan(&scalar_lookup(), &[])
        .unwrap();

    assert_eq!("Project", plan.operator_name());
    assert_eq!("NestedLoopJoin", plan.children()[0].operator_name());
    assert_eq!("[t1.a, m]", plan.schema().to_string());
}

#[test]
fn scalar_subquery_with_multiple_rows_fails_at_runtime() {
    let tables = test_tables();
    let config = PlannerConfig {
        enable_subquery_decorrelation: false,
        ..Default::default()
    };
    // SELECT (SELECT c FROM t3 WHERE t3.c = t1.a) FROM t1, t1.a = 1 matches
    // two rows of t3.
    let lookup = SelectClause::new(vec![SelectValue::expr(Expression::column("t3", "c"))])
        .with_from(FromClause::base_table("t3"))
        .with_where(Expression::eq(
            Expression::column("t3", "c"),
            Expression::column("t1", "a"),
        ));
    let select = SelectClause::new(vec![SelectValue::expr(Expression::scalar_subquery(lookup))])
        .with_from(FromClause::base_table("t1"));

    run(&tables, &config, &select).unwrap_err();
}

#[test]
fn correlated_conjunct_inside_join() {
    let tables = test_tables();
    // SELECT * FROM t1 WHERE EXISTS (
    //     SELECT * FROM t2 JOIN groups ON t2.b = groups.g WHERE groups.g = t1.a)
    let inner = SelectClause::star(FromClause::join(
        FromClause::base_table("t2"),
        FromClause::base_table("groups"),
        JoinType::Inner,
        Some(Expression::eq(
            Expression::column("t2", "b"),
            Expression::column("groups", "g"),
        )),
    ))
    .with_where(Expression::eq(
        Expression::column("groups", "g"),
        Expression::column("t1", "a"),
    ));
    let select =
        SelectClause::star(FromClause::base_table("t1")).with_where(Expression::exists(inner.clone()));

    for config in configs() {
        assert_eq!(rows(&[&[Some(1)]]), run(&tables, &config, &select).unwrap());
    }

    // On its own the outer reference can't be placed anywhere.
    let err = run(&tables, &PlannerConfig::default(), &inner).unwrap_err();
    assert!(err.to_string().starts_with("Some conjuncts weren't recognised"));
}

#[test]
fn simple_select_with_enclosing_select() {
    let tables = test_tables();
    let config = PlannerConfig::default();
    let planner = create_planner(&tables, &config);
    let outer = SelectClause::star(FromClause::base_table("t1"));

    let plan = planner
        .make_simple_select("t2", Some(b_eq_a()), &[&outer])
        .unwrap();
    assert!(plan.is_prepared());
    assert_eq!("[t2.b]", plan.schema().to_string());
}
