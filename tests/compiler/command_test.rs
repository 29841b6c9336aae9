//! INSERT, UPDATE and DELETE commands.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use quarry::compile::compile;
use quarry::compiler::{CommandKind, CompileError};
use quarry::metadata::{DataType, Value};
use quarry::plan::{init, lambda, lit, param, NodeExt, QueryPlan};
use quarry::sql::Dialect;

fn order(number: &str, total: f64) -> Order {
    Order {
        id: 0,
        number: number.into(),
        total,
        status: "open".into(),
        customer_id: Some(4),
        placed_at: Some("2024-03-01 09:30:00".into()),
        ..Default::default()
    }
}

#[test]
fn test_multi_row_insert() {
    let plan = QueryPlan::insert(&[order("SO-1", 10.0), order("SO-2", 20.0)]);
    let command = pg(&plan);

    assert_eq!(
        command.sql,
        "INSERT INTO \"sales\".\"Orders\" (\"Number\", \"Total\", \"Status\", \"CustomerId\", \"PlacedAt\") \
         VALUES ($1, $2, $3, $4, $5), ($6, $7, $8, $9, $10)"
    );
    assert_eq!(command.kind, CommandKind::Insert);
    assert_eq!(command.parameters.len(), 10);
    assert_eq!(command.parameters[5].value, Value::Text("SO-2".into()));
    assert_eq!(command.parameters[1].data_type, Some(DataType::Decimal));
    assert!(!command.returns_rows());
}

#[test]
fn test_insert_applies_column_defaults() {
    let draft = Order {
        number: "SO-3".into(),
        placed_at: None,
        customer_id: None,
        ..order("", 0.0)
    };
    let command = pg(&QueryPlan::insert(&[draft]));

    // PlacedAt falls back to its default, CustomerId has none
    assert_eq!(
        command.parameters[4].value,
        Value::Timestamp("1970-01-01 00:00:00".into())
    );
    assert_eq!(command.parameters[3].value, Value::Null);
    assert_eq!(command.parameters[3].data_type, Some(DataType::Int));
}

#[test]
fn test_identity_capture_per_dialect() {
    let plan = QueryPlan::insert_returning_identity(&order("SO-1", 10.0));

    let command = pg(&plan);
    assert!(command.sql.ends_with(") RETURNING \"Id\""), "{}", command.sql);
    assert!(command.shape.scalar);
    assert!(command.returns_rows());

    let duck = compile_for(&plan, Dialect::DuckDb);
    assert!(duck.sql.ends_with("RETURNING \"Id\""), "{}", duck.sql);

    let tsql = compile_for(&plan, Dialect::TSql);
    assert!(
        tsql.sql
            .contains("([Number], [Total], [Status], [CustomerId], [PlacedAt]) OUTPUT INSERTED.[Id] VALUES"),
        "{}",
        tsql.sql
    );
    assert!(tsql.sql.contains("VALUES (@p0, @p1"), "{}", tsql.sql);

    let mysql = compile_for(&plan, Dialect::MySql);
    assert!(mysql.sql.contains(';'), "{}", mysql.sql);
    assert!(mysql.sql.ends_with("SELECT LAST_INSERT_ID()"), "{}", mysql.sql);
}

#[test]
fn test_identity_capture_can_be_disabled() {
    let plan = QueryPlan::insert_returning_identity(&order("SO-1", 10.0));
    let command = compile(&plan, &options(Dialect::Postgres).without_identity_capture()).unwrap();
    assert!(!command.sql.contains("RETURNING"), "{}", command.sql);
    assert!(!command.returns_rows());
}

#[test]
fn test_identity_capture_needs_identity_column() {
    let customer = Customer {
        id: 1,
        name: "Ada".into(),
        ..Default::default()
    };
    let err = compile(
        &QueryPlan::insert_returning_identity(&customer),
        &options(Dialect::Postgres),
    )
    .unwrap_err();
    assert!(err.is_plan_error());

    // a plain insert of the same row is fine, keys included
    let command = pg(&QueryPlan::insert(&[customer]));
    assert!(command.sql.starts_with(
        "INSERT INTO \"sales\".\"Customers\" (\"Id\", \"Name\", \"AddressId\")"
    ));
}

#[test]
fn test_update_entity_by_key() {
    let mut existing = order("SO-9", 99.5);
    existing.id = 42;
    let command = pg(&QueryPlan::update(&existing));

    assert_eq!(
        command.sql,
        "UPDATE \"sales\".\"Orders\" SET \"Number\" = $1, \"Total\" = $2, \"Status\" = $3, \
         \"CustomerId\" = $4, \"PlacedAt\" = $5 WHERE \"Id\" = $6"
    );
    assert_eq!(command.kind, CommandKind::Update);
    assert_eq!(command.parameters[5].value, Value::Int(42));
    assert!(command.shape.columns.is_empty());
}

#[test]
fn test_update_set_with_filter() {
    let plan = QueryPlan::<Order>::new()
        .filter(lambda("o", param("o").member("Total").gt(100)))
        .update_set(lambda(
            "o",
            init(
                "Order",
                vec![
                    ("Status", lit("priority")),
                    ("Total", param("o").member("Total").mul(0.9)),
                ],
            ),
        ));
    let command = pg(&plan);

    assert_eq!(
        command.sql,
        "UPDATE \"sales\".\"Orders\" SET \"Status\" = $1, \"Total\" = \"Orders\".\"Total\" * $2 \
         WHERE \"Orders\".\"Total\" > $3"
    );
    assert_eq!(command.parameters[0].value, Value::Text("priority".into()));
    assert_eq!(command.parameters[2].value, Value::Int(100));
}

#[test]
fn test_update_through_navigation_filter() {
    let plan = QueryPlan::<Order>::new()
        .filter(lambda("o", param("o").member("Customer").member("Name").eq("Ada")))
        .update_set(lambda("o", init("Order", vec![("Status", lit("vip"))])));
    let command = pg(&plan);

    assert!(
        command.sql.ends_with(
            "WHERE \"Orders\".\"Id\" IN (SELECT \"t0\".\"Id\" FROM \"sales\".\"Orders\" AS \"t0\" \
             LEFT JOIN \"sales\".\"Customers\" AS \"t1\" ON \"t0\".\"CustomerId\" = \"t1\".\"Id\" \
             WHERE \"t1\".\"Name\" = $2)"
        ),
        "{}",
        command.sql
    );
}

#[test]
fn test_update_assignment_errors() {
    let unknown = QueryPlan::<Order>::new()
        .update_set(lambda("o", init("Order", vec![("Discount", lit(5))])));
    let err = compile(&unknown, &options(Dialect::Postgres)).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnknownMember {
            entity: "Order".into(),
            member: "Discount".into(),
        }
    );

    let navigating = QueryPlan::<Order>::new().update_set(lambda(
        "o",
        init("Order", vec![("Number", param("o").member("Customer").member("Name"))]),
    ));
    let err = compile(&navigating, &options(Dialect::Postgres)).unwrap_err();
    assert!(err.is_plan_error());

    let not_an_initializer = QueryPlan::<Order>::new().update_set(lambda("o", param("o")));
    assert!(compile(&not_an_initializer, &options(Dialect::Postgres)).is_err());
}

#[test]
fn test_delete_entity_and_key() {
    let mut existing = order("SO-1", 1.0);
    existing.id = 8;
    let command = pg(&QueryPlan::delete(&existing));
    assert_eq!(command.sql, "DELETE FROM \"sales\".\"Orders\" WHERE \"Id\" = $1");
    assert_eq!(command.parameters[0].value, Value::Int(8));
    assert_eq!(command.kind, CommandKind::Delete);

    let by_key = pg(&QueryPlan::<Order>::delete_by_key(vec![Value::Int(8)]));
    assert_eq!(by_key.sql, command.sql);

    let tsql = compile_for(&QueryPlan::<Order>::delete_by_key(vec![Value::Int(8)]), Dialect::TSql);
    assert_eq!(tsql.sql, "DELETE FROM [sales].[Orders] WHERE [Id] = @p0");
}

#[test]
fn test_delete_key_arity() {
    let plan = QueryPlan::<Order>::delete_by_key(vec![Value::Int(1), Value::Int(2)]);
    let err = compile(&plan, &options(Dialect::Postgres)).unwrap_err();
    assert!(err.is_plan_error());
}

#[test]
fn test_delete_matching() {
    let plan = QueryPlan::<Order>::new()
        .filter(lambda("o", param("o").member("Status").eq("cancelled")))
        .delete_matching();
    let command = pg(&plan);
    assert_eq!(
        command.sql,
        "DELETE FROM \"sales\".\"Orders\" WHERE \"Orders\".\"Status\" = $1"
    );

    let everything = pg(&QueryPlan::<Order>::new().delete_matching());
    assert_eq!(everything.sql, "DELETE FROM \"sales\".\"Orders\"");
}

#[test]
fn test_delete_through_collection_filter() {
    let plan = QueryPlan::<Order>::new()
        .filter(lambda("o", param("o").member("Lines").any().not()))
        .delete_matching();
    let command = pg(&plan);
    assert!(
        command.sql.starts_with("DELETE FROM \"sales\".\"Orders\" WHERE NOT"),
        "{}",
        command.sql
    );
    assert!(
        command.sql.contains(
            "EXISTS (SELECT 1 FROM \"sales\".\"OrderLines\" AS \"s0\" WHERE \"Orders\".\"Id\" = \"s0\".\"OrderId\")"
        ),
        "{}",
        command.sql
    );
    assert!(command.parameters.is_empty());
}

#[test]
fn test_commands_must_end_the_plan() {
    let plan = QueryPlan::<Order>::delete_by_key(vec![Value::Int(1)])
        .filter(lambda("o", param("o").member("Total").gt(1)));
    let err = compile(&plan, &options(Dialect::Postgres)).unwrap_err();
    assert_eq!(err, CompileError::Plan("Delete must be the last operation".into()));

    let after_order = QueryPlan::<Order>::new()
        .order_by(lambda("o", param("o").member("Id")))
        .delete_matching();
    assert!(compile(&after_order, &options(Dialect::Postgres)).is_err());
}

#[test]
fn test_command_serializes_for_executors() {
    let command = pg(&QueryPlan::insert(&[order("SO-1", 10.0)]));
    let json = command.to_json().unwrap();
    assert!(json.contains("\"kind\":\"insert\""), "{}", json);
    assert!(json.contains("\"dialect\":\"postgres\""), "{}", json);
}
