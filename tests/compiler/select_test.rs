//! SELECT compilation: filters, projections, operators and terminal
//! aggregates against the shared order fixtures.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use quarry::compile::compile;
use quarry::compiler::{CommandKind, CompileError};
use quarry::metadata::{DataType, Value};
use quarry::plan::{
    captured, cond, init, lambda, lambda2, list, null, param, record, Method, NodeExt, QueryPlan,
};
use quarry::sql::Dialect;

fn orders() -> QueryPlan<Order> {
    QueryPlan::<Order>::new()
}

#[test]
fn test_full_row_select_lists_every_column() {
    let command = pg(&orders());
    assert_eq!(
        command.sql,
        "SELECT \"t0\".\"Id\" AS \"Id\", \"t0\".\"Number\" AS \"Number\", \
         \"t0\".\"Total\" AS \"Total\", \"t0\".\"Status\" AS \"Status\", \
         \"t0\".\"CustomerId\" AS \"CustomerId\", \"t0\".\"PlacedAt\" AS \"PlacedAt\" \
         FROM \"sales\".\"Orders\" AS \"t0\""
    );
    assert_eq!(command.kind, CommandKind::Select);
    assert!(command.parameters.is_empty());
    assert_eq!(command.shape.column_count(), 6);
    assert!(!command.shape.scalar);
}

#[test]
fn test_schema_qualified_table_per_dialect() {
    let plan = orders();
    let tsql = compile_for(&plan, Dialect::TSql);
    assert!(tsql.sql.contains("FROM [sales].[Orders] AS [t0]"), "{}", tsql.sql);
    let mysql = compile_for(&plan, Dialect::MySql);
    assert!(mysql.sql.contains("FROM `sales`.`Orders` AS `t0`"), "{}", mysql.sql);
}

#[test]
fn test_filters_are_anded_in_order() {
    let plan = orders()
        .filter(lambda("o", param("o").member("Status").eq("open")))
        .filter(lambda("o", param("o").member("Total").gt(100)));
    let command = pg(&plan);

    assert!(
        command
            .sql
            .ends_with("WHERE \"t0\".\"Status\" = $1 AND \"t0\".\"Total\" > $2"),
        "{}",
        command.sql
    );
    assert_eq!(command.parameters.len(), 2);
    assert_eq!(command.parameters[0].value, Value::Text("open".into()));
    assert_eq!(command.parameters[0].data_type, Some(DataType::Text));
    assert_eq!(command.parameters[1].value, Value::Int(100));
    // typed from the column it is compared against
    assert_eq!(command.parameters[1].data_type, Some(DataType::Decimal));
}

#[test]
fn test_placeholders_per_dialect() {
    let plan = orders()
        .filter(lambda("o", param("o").member("Status").eq("open")))
        .filter(lambda("o", param("o").member("Total").gt(100)));

    let tsql = compile_for(&plan, Dialect::TSql);
    assert!(tsql.sql.contains("[t0].[Status] = @p0 AND [t0].[Total] > @p1"), "{}", tsql.sql);

    let mysql = compile_for(&plan, Dialect::MySql);
    assert!(mysql.sql.contains("`t0`.`Status` = ? AND `t0`.`Total` > ?"), "{}", mysql.sql);
    validate_sql(&mysql.sql, Dialect::MySql).unwrap();

    let duck = compile_for(&plan, Dialect::DuckDb);
    assert_eq!(duck.dialect, "duckdb");
    assert!(duck.sql.contains("\"t0\".\"Status\" = $1"), "{}", duck.sql);
}

#[test]
fn test_captured_values_stay_parameters_when_inlining() {
    let plan = orders().filter(lambda(
        "o",
        param("o")
            .member("Id")
            .eq(captured("id", 42))
            .and(param("o").member("Number").eq("SO-1")),
    ));
    let options = options(Dialect::Postgres).inline_literals();
    let command = compile(&plan, &options).unwrap();

    assert!(
        command
            .sql
            .ends_with("WHERE \"t0\".\"Id\" = $1 AND \"t0\".\"Number\" = 'SO-1'"),
        "{}",
        command.sql
    );
    assert_eq!(command.parameters.len(), 1);
    assert_eq!(command.parameters[0].value, Value::Int(42));
}

#[test]
fn test_null_comparisons_become_is_null() {
    let plan = orders().filter(lambda("o", param("o").member("CustomerId").eq(null())));
    let command = pg(&plan);
    assert!(command.sql.ends_with("WHERE \"t0\".\"CustomerId\" IS NULL"), "{}", command.sql);
    assert!(command.parameters.is_empty());

    let flipped = orders().filter(lambda("o", null().ne(param("o").member("CustomerId"))));
    let command = pg(&flipped);
    assert!(command.sql.ends_with("WHERE \"t0\".\"CustomerId\" IS NOT NULL"), "{}", command.sql);
}

#[test]
fn test_captured_null_becomes_is_null() {
    let plan = orders().filter(lambda(
        "o",
        param("o").member("CustomerId").eq(captured("cid", Value::Null)),
    ));
    let command = pg(&plan);
    assert!(command.sql.ends_with("WHERE \"t0\".\"CustomerId\" IS NULL"), "{}", command.sql);
    assert!(command.parameters.is_empty());

    let flipped = orders().filter(lambda(
        "o",
        captured("cid", Value::Null).ne(param("o").member("CustomerId")),
    ));
    let command = pg(&flipped);
    assert!(command.sql.ends_with("WHERE \"t0\".\"CustomerId\" IS NOT NULL"), "{}", command.sql);

    // a captured value that is set still binds
    let bound = orders().filter(lambda(
        "o",
        param("o").member("CustomerId").eq(captured("cid", 7)),
    ));
    let command = pg(&bound);
    assert!(command.sql.ends_with("WHERE \"t0\".\"CustomerId\" = $1"), "{}", command.sql);
}

#[test]
fn test_list_contains_becomes_in() {
    let plan = orders().filter(lambda(
        "o",
        list(vec![3i64, 5, 8]).contains(param("o").member("Id")),
    ));
    let command = pg(&plan);
    assert!(command.sql.ends_with("WHERE \"t0\".\"Id\" IN ($1, $2, $3)"), "{}", command.sql);
    let values: Vec<_> = command.parameters.iter().map(|p| p.value.clone()).collect();
    assert_eq!(values, vec![Value::Int(3), Value::Int(5), Value::Int(8)]);
}

#[test]
fn test_empty_list_contains_matches_nothing() {
    let none: Vec<i64> = Vec::new();
    let plan = orders().filter(lambda("o", list(none).contains(param("o").member("Id"))));
    let command = pg(&plan);
    assert!(command.sql.ends_with("WHERE 1 = 0"), "{}", command.sql);
    assert!(command.parameters.is_empty());
}

#[test]
fn test_string_methods() {
    let plan = orders()
        .filter(lambda("o", param("o").member("Number").starts_with("SO-")))
        .filter(lambda("o", param("o").member("Status").to_upper().eq("OPEN")))
        .filter(lambda("o", param("o").member("Number").member("Length").gt(3)));
    let command = pg(&plan);

    assert!(command.sql.contains("\"t0\".\"Number\" LIKE $1 ESCAPE '\\'"), "{}", command.sql);
    assert!(command.sql.contains("UPPER(\"t0\".\"Status\") = $2"), "{}", command.sql);
    assert!(command.sql.contains("LENGTH(\"t0\".\"Number\") > $3"), "{}", command.sql);
    assert_eq!(command.parameters[0].value, Value::Text("SO-%".into()));
}

#[test]
fn test_like_patterns_escape_wildcards() {
    let plan = orders()
        .filter(lambda("o", param("o").member("Number").contains("50%")))
        .filter(lambda("o", param("o").member("Status").ends_with("_x")));
    let command = compile_for(&plan, Dialect::Postgres);
    assert_eq!(command.parameters[0].value, Value::Text("%50\\%%".into()));
    assert_eq!(command.parameters[1].value, Value::Text("%\\_x".into()));
}

#[test]
fn test_length_is_remapped_per_dialect() {
    let plan = orders().filter(lambda("o", param("o").member("Number").member("Length").gt(3)));
    let tsql = compile_for(&plan, Dialect::TSql);
    assert!(tsql.sql.contains("LEN([t0].[Number]) > @p0"), "{}", tsql.sql);
    let mysql = compile_for(&plan, Dialect::MySql);
    assert!(mysql.sql.contains("CHAR_LENGTH(`t0`.`Number`) > ?"), "{}", mysql.sql);
}

#[test]
fn test_date_parts_per_dialect() {
    let plan = orders().filter(lambda("o", param("o").member("PlacedAt").member("Year").eq(2024)));

    let command = pg(&plan);
    assert!(
        command.sql.contains("EXTRACT(YEAR FROM \"t0\".\"PlacedAt\") = $1"),
        "{}",
        command.sql
    );
    assert_eq!(command.parameters[0].data_type, Some(DataType::Int));

    let tsql = compile_for(&plan, Dialect::TSql);
    assert!(tsql.sql.contains("DATEPART(year, [t0].[PlacedAt]) = @p0"), "{}", tsql.sql);

    let mysql = compile_for(&plan, Dialect::MySql);
    assert!(mysql.sql.contains("YEAR(`t0`.`PlacedAt`) = ?"), "{}", mysql.sql);
}

#[test]
fn test_text_addition_concatenates_per_dialect() {
    let plan = orders().filter(lambda("o", param("o").member("Number").add("-A").eq("SO-1-A")));

    let command = pg(&plan);
    assert!(command.sql.contains("\"t0\".\"Number\" || $1 = $2"), "{}", command.sql);

    let tsql = compile_for(&plan, Dialect::TSql);
    assert!(tsql.sql.contains("[t0].[Number] + @p0 = @p1"), "{}", tsql.sql);

    let mysql = compile_for(&plan, Dialect::MySql);
    assert!(mysql.sql.contains("CONCAT(`t0`.`Number`, ?)"), "{}", mysql.sql);
}

#[test]
fn test_record_projection_joins_reference() {
    let plan = orders().select::<OrderSummary>(lambda(
        "o",
        record(vec![
            ("Number", param("o").member("Number")),
            ("CustomerName", param("o").member("Customer").member("Name")),
        ]),
    ));
    let command = pg(&plan);

    assert_eq!(
        command.sql,
        "SELECT \"t0\".\"Number\" AS \"Number\", \"t1\".\"Name\" AS \"CustomerName\" \
         FROM \"sales\".\"Orders\" AS \"t0\" \
         LEFT JOIN \"sales\".\"Customers\" AS \"t1\" ON \"t0\".\"CustomerId\" = \"t1\".\"Id\""
    );
    let outputs: Vec<_> = command.shape.columns.iter().map(|c| c.output.as_str()).collect();
    assert_eq!(outputs, vec!["Number", "CustomerName"]);
    assert!(command.shape.navigations.is_empty());
}

#[test]
fn test_initializer_with_computed_members() {
    let plan = orders().select::<OrderSummary>(lambda(
        "o",
        init(
            "OrderView",
            vec![
                ("Number", param("o").member("Number")),
                ("Doubled", param("o").member("Total").mul(2)),
                (
                    "Kind",
                    cond(param("o").member("CustomerId").eq(null()), "guest", "member"),
                ),
                ("Owner", param("o").member("CustomerId").coalesce(0)),
            ],
        ),
    ));
    let command = pg(&plan);

    assert!(command.sql.contains("\"t0\".\"Total\" * $1 AS \"Doubled\""), "{}", command.sql);
    assert!(
        command
            .sql
            .contains("CASE WHEN \"t0\".\"CustomerId\" IS NULL THEN $2 ELSE $3 END AS \"Kind\""),
        "{}",
        command.sql
    );
    assert!(
        command.sql.contains("COALESCE(\"t0\".\"CustomerId\", $4) AS \"Owner\""),
        "{}",
        command.sql
    );
    assert_eq!(command.shape.column_count(), 4);
}

#[test]
fn test_scalar_projection() {
    let plan = orders().select::<f64>(lambda("o", param("o").member("Total")));
    let command = pg(&plan);
    assert_eq!(
        command.sql,
        "SELECT \"t0\".\"Total\" AS \"Total\" FROM \"sales\".\"Orders\" AS \"t0\""
    );
    assert!(command.shape.scalar);
}

#[test]
fn test_distinct_projection() {
    let plan = orders()
        .select::<String>(lambda("o", param("o").member("Status")))
        .distinct();
    let command = pg(&plan);
    assert!(command.sql.starts_with("SELECT DISTINCT \"t0\".\"Status\""), "{}", command.sql);
}

#[test]
fn test_terminal_aggregates() {
    let count = pg(&orders().count());
    assert_eq!(
        count.sql,
        "SELECT COUNT(*) AS \"Value\" FROM \"sales\".\"Orders\" AS \"t0\""
    );
    assert!(count.shape.scalar);

    let filtered = pg(&orders().count_where(lambda("o", param("o").member("Total").gt(5))));
    assert!(filtered.sql.ends_with("WHERE \"t0\".\"Total\" > $1"), "{}", filtered.sql);

    let sum = pg(&orders().sum(lambda("o", param("o").member("Total"))));
    assert!(sum.sql.starts_with("SELECT SUM(\"t0\".\"Total\") AS \"Value\""), "{}", sum.sql);

    let avg = pg(&orders().average(lambda("o", param("o").member("Total"))));
    assert!(avg.sql.starts_with("SELECT AVG(\"t0\".\"Total\") AS \"Value\""), "{}", avg.sql);

    let max = pg(&orders().max(lambda("o", param("o").member("PlacedAt"))));
    assert!(max.sql.starts_with("SELECT MAX(\"t0\".\"PlacedAt\")"), "{}", max.sql);

    let any = compile_for(&orders().any_where(lambda("o", param("o").member("Status").eq("void"))), Dialect::Postgres);
    assert!(any.sql.contains("COUNT(1) > 0"), "{}", any.sql);
}

#[test]
fn test_sum_of_whole_rows_is_rejected() {
    let plan = orders().sum(lambda("o", param("o")));
    assert!(compile(&plan, &options(Dialect::Postgres)).is_err());
}

#[test]
fn test_union_all_keeps_parameter_order() {
    let open = orders().filter(lambda("o", param("o").member("Status").eq("open")));
    let large = orders().filter(lambda("o", param("o").member("Total").gt(1000)));
    let command = pg(&open.union(&large));

    assert_eq!(command.sql.matches("UNION ALL").count(), 1);
    assert_eq!(command.parameters.len(), 2);
    assert_eq!(command.parameters[0].value, Value::Text("open".into()));
    assert_eq!(command.parameters[1].value, Value::Int(1000));
}

#[test]
fn test_explicit_joins() {
    let customers = QueryPlan::<Customer>::new();
    let joined = orders().join::<Customer, OrderSummary>(
        &customers,
        lambda("o", param("o").member("CustomerId")),
        lambda("c", param("c").member("Id")),
        lambda2(
            "o",
            "c",
            record(vec![
                ("Number", param("o").member("Number")),
                ("CustomerName", param("c").member("Name")),
            ]),
        ),
    );
    let command = pg(&joined);
    assert!(
        command.sql.contains(
            "INNER JOIN \"sales\".\"Customers\" AS \"t1\" ON \"t0\".\"CustomerId\" = \"t1\".\"Id\""
        ),
        "{}",
        command.sql
    );
    assert!(command.sql.contains("\"t1\".\"Name\" AS \"CustomerName\""));

    let left = orders().group_join::<Customer, OrderSummary>(
        &customers,
        lambda("o", param("o").member("CustomerId")),
        lambda("c", param("c").member("Id")),
        lambda2("o", "c", record(vec![("Name", param("c").member("Name"))])),
    );
    assert!(pg(&left).sql.contains("LEFT JOIN \"sales\".\"Customers\" AS \"t1\" ON"));

    let cross = orders().cross_join::<Customer, OrderSummary>(
        &customers,
        lambda2(
            "o",
            "c",
            record(vec![
                ("Number", param("o").member("Number")),
                ("Name", param("c").member("Name")),
            ]),
        ),
    );
    let command = pg(&cross);
    assert!(command.sql.contains("CROSS JOIN \"sales\".\"Customers\" AS \"t1\""), "{}", command.sql);
}

#[test]
fn test_join_with_filtered_inner_uses_derived_table() {
    let named = QueryPlan::<Customer>::new().filter(lambda("c", param("c").member("Name").ne("")));
    let plan = orders().join::<Customer, OrderSummary>(
        &named,
        lambda("o", param("o").member("CustomerId")),
        lambda("c", param("c").member("Id")),
        lambda2("o", "c", record(vec![("Name", param("c").member("Name"))])),
    );
    let command = pg(&plan);
    assert!(command.sql.contains("INNER JOIN (SELECT"), "{}", command.sql);
    assert_eq!(command.parameters.len(), 1);
}

#[test]
fn test_as_subquery_freezes_the_row_set() {
    let plan = orders()
        .filter(lambda("o", param("o").member("Total").gt(10)))
        .as_subquery()
        .filter(lambda("o", param("o").member("Status").eq("open")));
    let command = pg(&plan);

    assert_eq!(command.sql.matches("SELECT").count(), 2);
    assert!(command.sql.contains("FROM (SELECT"), "{}", command.sql);
    assert!(command.sql.ends_with("WHERE \"t0\".\"Status\" = $2"), "{}", command.sql);
    assert_eq!(command.parameters[0].value, Value::Int(10));
    assert_eq!(command.parameters[1].value, Value::Text("open".into()));
}

#[test]
fn test_unsupported_method_names_the_expression() {
    let plan = orders().filter(lambda(
        "o",
        param("o")
            .member("Number")
            .call(Method::Other("Soundex".into()), vec![])
            .eq("S530"),
    ));
    let err = compile(&plan, &options(Dialect::Postgres)).unwrap_err();
    match &err {
        CompileError::UnsupportedExpression { clause, node } => {
            assert_eq!(*clause, "WHERE");
            assert!(node.contains("Soundex"), "{}", node);
        }
        other => panic!("unexpected error {:?}", other),
    }
    assert!(!err.is_plan_error());
}

#[test]
fn test_unknown_member_is_a_plan_error() {
    let plan = orders().filter(lambda("o", param("o").member("Discount").gt(1)));
    let err = compile(&plan, &options(Dialect::Postgres)).unwrap_err();
    assert_eq!(
        err,
        CompileError::UnknownMember {
            entity: "Order".into(),
            member: "Discount".into()
        }
    );
    assert!(err.is_plan_error());
}

#[test]
fn test_pretty_output_breaks_clauses() {
    let plan = orders().filter(lambda("o", param("o").member("Total").gt(1)));
    let command = compile(&plan, &quarry::compile::CompileOptions::default()).unwrap();
    assert!(command.sql.contains('\n'), "{}", command.sql);
    assert_eq!(command.dialect, "duckdb");
}
