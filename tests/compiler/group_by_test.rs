//! Grouping: keys, aggregates over groups, HAVING and grouping boundaries.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use quarry::compile::compile;
use quarry::metadata::Value;
use quarry::plan::{lambda, param, record, Grouping, Method, NodeExt, QueryPlan};
use quarry::sql::Dialect;

fn by_status() -> QueryPlan<Grouping> {
    QueryPlan::<Order>::new().group_by(lambda("o", param("o").member("Status")))
}

fn totals(plan: &QueryPlan<Grouping>) -> QueryPlan<Order> {
    plan.select(lambda(
        "g",
        record(vec![
            ("Status", param("g").member("Key")),
            ("Total", param("g").sum(lambda("x", param("x").member("Total")))),
            ("Orders", param("g").count()),
        ]),
    ))
}

#[test]
fn test_group_by_with_aggregates() {
    let command = pg(&totals(&by_status()));
    assert_eq!(
        command.sql,
        "SELECT \"t0\".\"Status\" AS \"Status\", SUM(\"t0\".\"Total\") AS \"Total\", \
         COUNT(*) AS \"Orders\" FROM \"sales\".\"Orders\" AS \"t0\" GROUP BY \"t0\".\"Status\""
    );
    assert!(command.parameters.is_empty());
    assert_eq!(command.shape.column_count(), 3);
}

#[test]
fn test_filter_before_and_after_grouping() {
    let plan = QueryPlan::<Order>::new()
        .filter(lambda("o", param("o").member("Total").gt(10)))
        .group_by(lambda("o", param("o").member("Status")))
        .filter(lambda("g", param("g").count().gt(1)));
    let command = pg(&totals(&plan));

    assert!(
        command.sql.ends_with(
            "WHERE \"t0\".\"Total\" > $1 GROUP BY \"t0\".\"Status\" HAVING COUNT(*) > $2"
        ),
        "{}",
        command.sql
    );
    assert_eq!(command.parameters.len(), 2);
    assert_eq!(command.parameters[1].value, Value::Int(1));
}

#[test]
fn test_count_with_predicate_in_group() {
    let plan = by_status().select::<Order>(lambda(
        "g",
        record(vec![
            ("Status", param("g").member("Key")),
            (
                "Large",
                param("g").count_where(lambda("x", param("x").member("Total").gt(500))),
            ),
        ]),
    ));
    let command = pg(&plan);
    assert!(
        command
            .sql
            .contains("SUM(CASE WHEN \"t0\".\"Total\" > $1 THEN 1 ELSE 0 END) AS \"Large\""),
        "{}",
        command.sql
    );
}

#[test]
fn test_group_element_selector() {
    let plan = QueryPlan::<Order>::new()
        .group_by_element(
            lambda("o", param("o").member("CustomerId")),
            lambda("o", param("o").member("Total")),
        )
        .select::<Order>(lambda(
            "g",
            record(vec![
                ("CustomerId", param("g").member("Key")),
                ("Largest", param("g").call(Method::Max, vec![])),
            ]),
        ));
    let command = pg(&plan);
    assert!(command.sql.contains("MAX(\"t0\".\"Total\") AS \"Largest\""), "{}", command.sql);
    assert!(command.sql.ends_with("GROUP BY \"t0\".\"CustomerId\""), "{}", command.sql);
}

#[test]
fn test_average_over_group() {
    let plan = by_status().select::<Order>(lambda(
        "g",
        record(vec![
            ("Status", param("g").member("Key")),
            ("Mean", param("g").average(lambda("x", param("x").member("Total")))),
        ]),
    ));
    let command = pg(&plan);
    assert!(command.sql.contains("AVG(\"t0\".\"Total\") AS \"Mean\""), "{}", command.sql);
}

#[test]
fn test_composite_key() {
    let plan = QueryPlan::<Order>::new()
        .group_by(lambda(
            "o",
            record(vec![
                ("Status", param("o").member("Status")),
                ("CustomerId", param("o").member("CustomerId")),
            ]),
        ))
        .select::<Order>(lambda(
            "g",
            record(vec![
                ("Status", param("g").member("Key").member("Status")),
                ("Orders", param("g").count()),
            ]),
        ));
    let command = pg(&plan);
    assert!(
        command
            .sql
            .ends_with("GROUP BY \"t0\".\"Status\", \"t0\".\"CustomerId\""),
        "{}",
        command.sql
    );
    assert!(command.sql.starts_with("SELECT \"t0\".\"Status\" AS \"Status\", COUNT(*)"));
}

#[test]
fn test_group_by_navigation_member() {
    let plan = QueryPlan::<Order>::new()
        .group_by(lambda("o", param("o").member("Customer").member("Name")))
        .select::<Order>(lambda(
            "g",
            record(vec![
                ("Name", param("g").member("Key")),
                ("Orders", param("g").count()),
            ]),
        ));
    let command = pg(&plan);
    assert!(
        command.sql.contains(
            "LEFT JOIN \"sales\".\"Customers\" AS \"t1\" ON \"t0\".\"CustomerId\" = \"t1\".\"Id\""
        ),
        "{}",
        command.sql
    );
    assert!(command.sql.ends_with("GROUP BY \"t1\".\"Name\""), "{}", command.sql);
}

#[test]
fn test_paging_groups_nests() {
    let plan = totals(&by_status())
        .order_by(lambda("r", param("r").member("Status")))
        .skip(1)
        .take(2);
    let command = pg(&plan);

    assert_eq!(command.sql.matches("SELECT").count(), 2);
    assert!(command.sql.contains("GROUP BY \"t0\".\"Status\") AS \"t0\""), "{}", command.sql);
    assert!(
        command.sql.ends_with("ORDER BY \"t0\".\"Status\" LIMIT 2 OFFSET 1"),
        "{}",
        command.sql
    );
}

#[test]
fn test_count_of_groups_nests() {
    let command = pg(&totals(&by_status()).count());
    assert!(
        command
            .sql
            .starts_with("SELECT COUNT(*) AS \"Value\" FROM (SELECT \"t0\".\"Status\""),
        "{}",
        command.sql
    );
    assert!(command.shape.scalar);
}

#[test]
fn test_grouping_must_be_projected() {
    let err = compile(&by_status(), &options(Dialect::Postgres)).unwrap_err();
    assert!(err.is_plan_error());
}

#[test]
fn test_group_by_tsql() {
    let command = compile_for(&totals(&by_status()), Dialect::TSql);
    assert!(command.sql.ends_with("GROUP BY [t0].[Status]"), "{}", command.sql);
    validate_sql(&command.sql, Dialect::TSql).unwrap();
}
