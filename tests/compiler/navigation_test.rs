//! Navigation handling: reference joins, correlated collection subqueries
//! and eager loading through Include.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use quarry::compile::compile;
use quarry::compiler::{ColumnKind, CompileError};
use quarry::metadata::Value;
use quarry::plan::{lambda, null, param, record, NodeExt, QueryPlan};
use quarry::sql::Dialect;

fn orders() -> QueryPlan<Order> {
    QueryPlan::<Order>::new()
}

#[test]
fn test_reference_path_joined_once() {
    let plan = orders().filter(lambda(
        "o",
        param("o")
            .member("Customer")
            .member("Name")
            .eq("Acme")
            .or(param("o").member("Customer").member("Address").member("City").eq("Oslo")),
    ));
    let command = pg(&plan);

    assert_eq!(command.sql.matches("LEFT JOIN \"sales\".\"Customers\"").count(), 1);
    assert!(
        command.sql.contains(
            "LEFT JOIN \"sales\".\"Customers\" AS \"t1\" ON \"t0\".\"CustomerId\" = \"t1\".\"Id\" \
             LEFT JOIN \"sales\".\"Addresses\" AS \"t2\" ON \"t1\".\"AddressId\" = \"t2\".\"Id\""
        ),
        "{}",
        command.sql
    );
    assert!(command.sql.contains("\"t1\".\"Name\" = $1"));
    assert!(command.sql.contains("\"t2\".\"City\" = $2"));
    // filtering through a reference never fans out
    assert!(command.shape.root_key.is_empty());
}

#[test]
fn test_missing_reference_compares_its_key() {
    let plan = orders().filter(lambda("o", param("o").member("Customer").eq(null())));
    let command = pg(&plan);
    assert!(command.sql.ends_with("WHERE \"t1\".\"Id\" IS NULL"), "{}", command.sql);
}

#[test]
fn test_any_is_correlated_exists() {
    let plan = orders().filter(lambda(
        "o",
        param("o")
            .member("Lines")
            .any_where(lambda("l", param("l").member("Quantity").gt(5))),
    ));
    let command = pg(&plan);
    assert!(
        command.sql.ends_with(
            "WHERE EXISTS (SELECT 1 FROM \"sales\".\"OrderLines\" AS \"s0\" \
             WHERE \"t0\".\"Id\" = \"s0\".\"OrderId\" AND \"s0\".\"Quantity\" > $1)"
        ),
        "{}",
        command.sql
    );
    assert!(!command.sql.contains("LEFT JOIN"));
    assert_eq!(command.parameters[0].value, Value::Int(5));
}

#[test]
fn test_any_without_predicate() {
    let plan = orders().filter(lambda("o", param("o").member("Payments").any().not()));
    let command = pg(&plan);
    assert!(
        command.sql.contains(
            "EXISTS (SELECT 1 FROM \"sales\".\"Payments\" AS \"s0\" WHERE \"t0\".\"Id\" = \"s0\".\"OrderId\")"
        ),
        "{}",
        command.sql
    );
    assert!(command.sql.contains("NOT"), "{}", command.sql);
}

#[test]
fn test_all_is_negated_exists() {
    let plan = orders().filter(lambda(
        "o",
        param("o")
            .member("Lines")
            .all(lambda("l", param("l").member("Quantity").gt(0))),
    ));
    let command = pg(&plan);
    assert!(command.sql.contains("WHERE NOT EXISTS (SELECT 1 FROM \"sales\".\"OrderLines\""), "{}", command.sql);
}

#[test]
fn test_count_is_scalar_subquery() {
    let by_method = pg(&orders().filter(lambda("o", param("o").member("Lines").count().gt(2))));
    let by_property = pg(&orders().filter(lambda("o", param("o").member("Lines").member("Count").gt(2))));

    let expected = "WHERE (SELECT COUNT(*) FROM \"sales\".\"OrderLines\" AS \"s0\" \
                    WHERE \"t0\".\"Id\" = \"s0\".\"OrderId\") > $1";
    assert!(by_method.sql.ends_with(expected), "{}", by_method.sql);
    assert_eq!(by_method.sql, by_property.sql);
}

#[test]
fn test_correlated_subqueries_take_distinct_aliases() {
    let plan = orders().select::<OrderSummary>(lambda(
        "o",
        record(vec![
            ("Number", param("o").member("Number")),
            ("LineCount", param("o").member("Lines").count()),
            (
                "Paid",
                param("o").member("Payments").sum(lambda("p", param("p").member("Amount"))),
            ),
        ]),
    ));
    let command = pg(&plan);

    assert!(command.sql.contains("\"sales\".\"OrderLines\" AS \"s0\""), "{}", command.sql);
    assert!(command.sql.contains("SELECT SUM(\"s1\".\"Amount\") FROM \"sales\".\"Payments\" AS \"s1\""), "{}", command.sql);
    assert!(command.sql.contains(") AS \"LineCount\""));
    assert!(command.sql.contains(") AS \"Paid\""));
    // aggregates over a collection never multiply rows
    assert!(command.shape.root_key.is_empty());
    assert!(!command.shape.has_collections());
}

#[test]
fn test_reference_include_adds_split_column() {
    let plan = orders().include(lambda("o", param("o").member("Customer")));
    let command = pg(&plan);

    assert!(
        command.sql.contains(
            "CASE WHEN \"t1\".\"Id\" IS NOT NULL THEN 1 END AS \"split\", \"t1\".\"Id\" AS \"Id1\""
        ),
        "{}",
        command.sql
    );
    assert!(command.sql.ends_with("LEFT JOIN \"sales\".\"Customers\" AS \"t1\" ON \"t0\".\"CustomerId\" = \"t1\".\"Id\""));

    let shape = &command.shape;
    assert_eq!(shape.navigations.len(), 1);
    let nav = &shape.navigations[0];
    assert_eq!(nav.path, "Order.Customer");
    assert_eq!(nav.member, "Customer");
    assert_eq!(nav.split_index, Some(6));
    assert_eq!(nav.start_index, 7);
    assert_eq!(nav.field_count, 3);
    assert!(!nav.collection);
    assert_eq!(shape.columns[6].kind, ColumnKind::Split);
    assert_eq!(shape.columns[7].owner, Some(0));
    assert!(shape.root_key.is_empty());
}

#[test]
fn test_nested_include_chains_parents() {
    let plan = orders()
        .include(lambda("o", param("o").member("Customer")))
        .include(lambda("o", param("o").member("Customer").member("Address")));
    let command = pg(&plan);
    let shape = &command.shape;

    assert_eq!(command.sql.matches("LEFT JOIN").count(), 2);
    assert_eq!(shape.navigations.len(), 2);
    assert_eq!(shape.navigations[1].path, "Order.Customer.Address");
    assert_eq!(shape.navigations[1].parent, Some(0));
    let split = shape.navigations[1].split_index.unwrap();
    assert_eq!(shape.columns[split].owner, Some(0));
}

#[test]
fn test_deep_include_alone_loads_intermediate() {
    let plan = orders().include(lambda("o", param("o").member("Customer").member("Address")));
    let command = pg(&plan);
    let paths: Vec<_> = command.shape.navigations.iter().map(|n| n.path.as_str()).collect();
    assert_eq!(paths, vec!["Order.Customer", "Order.Customer.Address"]);
}

#[test]
fn test_collection_include_orders_by_root_key() {
    let plan = orders().include(lambda("o", param("o").member("Lines")));
    let command = pg(&plan);

    assert!(
        command.sql.contains(
            "LEFT JOIN \"sales\".\"OrderLines\" AS \"t1\" ON \"t0\".\"Id\" = \"t1\".\"OrderId\""
        ),
        "{}",
        command.sql
    );
    assert!(command.sql.ends_with("ORDER BY \"t0\".\"Id\""), "{}", command.sql);

    let shape = &command.shape;
    assert_eq!(shape.root_key, vec![0]);
    let nav = &shape.navigations[0];
    assert!(nav.collection);
    assert_eq!(nav.split_index, None);
    assert_eq!(nav.start_index, 6);
    assert_eq!(nav.key_columns, vec![6]);
}

#[test]
fn test_existing_order_precedes_root_key() {
    let plan = orders()
        .include(lambda("o", param("o").member("Payments")))
        .order_by_desc(lambda("o", param("o").member("Total")));
    let command = pg(&plan);
    assert!(
        command.sql.ends_with("ORDER BY \"t0\".\"Total\" DESC, \"t0\".\"Id\""),
        "{}",
        command.sql
    );
}

#[test]
fn test_root_key_not_repeated_when_already_ordered() {
    let plan = orders()
        .include(lambda("o", param("o").member("Lines")))
        .order_by(lambda("o", param("o").member("Id")));
    let command = pg(&plan);
    assert!(command.sql.ends_with("ORDER BY \"t0\".\"Id\""), "{}", command.sql);
}

#[test]
fn test_sibling_collections() {
    let plan = orders()
        .include(lambda("o", param("o").member("Lines")))
        .include(lambda("o", param("o").member("Payments")));
    let command = pg(&plan);

    assert!(command.sql.contains("LEFT JOIN \"sales\".\"OrderLines\" AS \"t1\""));
    assert!(command.sql.contains("LEFT JOIN \"sales\".\"Payments\" AS \"t2\""));
    let navs = &command.shape.navigations;
    assert_eq!(navs.len(), 2);
    assert!(navs.iter().all(|n| n.collection && n.parent.is_none()));
}

#[test]
fn test_filtered_include_extends_join_condition() {
    let plan = orders()
        .filter(lambda("o", param("o").member("Status").eq("open")))
        .include_filtered(
            lambda("o", param("o").member("Lines")),
            lambda("l", param("l").member("Quantity").gt(1)),
        );
    let command = pg(&plan);

    assert!(
        command.sql.contains(
            "LEFT JOIN \"sales\".\"OrderLines\" AS \"t1\" ON \"t0\".\"Id\" = \"t1\".\"OrderId\" AND \"t1\".\"Quantity\" > $1"
        ),
        "{}",
        command.sql
    );
    assert!(command.sql.contains("WHERE \"t0\".\"Status\" = $2"), "{}", command.sql);
    // placeholders follow text order
    assert_eq!(command.parameters[0].value, Value::Int(1));
    assert_eq!(command.parameters[1].value, Value::Text("open".into()));
}

#[test]
fn test_include_ignored_under_projection() {
    let projected_first = orders()
        .select::<Order>(lambda("o", record(vec![("Number", param("o").member("Number"))])))
        .include(lambda("o", param("o").member("Customer")));
    let command = pg(&projected_first);
    assert!(!command.sql.contains("JOIN"), "{}", command.sql);

    let included_first = orders()
        .include(lambda("o", param("o").member("Lines")))
        .select::<Order>(lambda("o", record(vec![("Number", param("o").member("Number"))])));
    let command = pg(&included_first);
    assert!(!command.sql.contains("JOIN"), "{}", command.sql);
    assert!(command.shape.navigations.is_empty());
}

#[test]
fn test_projected_collection_adds_hidden_key() {
    let plan = orders().select::<OrderSummary>(lambda(
        "o",
        record(vec![
            ("Number", param("o").member("Number")),
            ("Lines", param("o").member("Lines")),
        ]),
    ));
    let command = pg(&plan);
    let shape = &command.shape;

    let key = shape.columns.last().unwrap();
    assert_eq!(key.kind, ColumnKind::Key);
    assert_eq!(key.member, "Id");
    assert_eq!(shape.root_key, vec![shape.columns.len() - 1]);
    assert_eq!(shape.navigations[0].path, "Order.Lines");
    assert!(command.sql.ends_with("ORDER BY \"t0\".\"Id\""), "{}", command.sql);
}

#[test]
fn test_include_of_unknown_member() {
    let plan = orders().include(lambda("o", param("o").member("Invoices")));
    let err = compile(&plan, &options(Dialect::Postgres)).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnknownMember {
            entity: "Order".into(),
            member: "Invoices".into()
        }
    );
}

#[test]
fn test_include_path_must_be_member_chain() {
    let plan = orders().include(lambda("o", param("o").member("Total").gt(1)));
    let err = compile(&plan, &options(Dialect::Postgres)).unwrap_err();
    assert!(err.is_plan_error());
}
