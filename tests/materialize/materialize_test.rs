//! Reading flat and scalar results through compiled shapes.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use quarry::compiler::ResultShape;
use quarry::materialize::{materialize, MaterializeError, MaterializeResult, VecCursor};
use quarry::metadata::Value;
use quarry::plan::{lambda, param, record, NodeExt, QueryPlan};

fn cursor_for(shape: &ResultShape, rows: Vec<Vec<Value>>) -> VecCursor {
    VecCursor::new(shape.columns.iter().map(|c| c.output.clone()).collect(), rows)
}

fn order_row(id: i64, number: &str, status: Value) -> Vec<Value> {
    vec![
        Value::Int(id),
        number.into(),
        Value::Decimal("12.50".into()),
        status,
        Value::Null,
        Value::Timestamp("2024-01-02 03:04:05".into()),
    ]
}

#[test]
fn test_flat_rows_become_orders() {
    let command = pg(&QueryPlan::<Order>::new());
    let cursor = cursor_for(
        &command.shape,
        vec![
            order_row(1, "SO-1", "open".into()),
            order_row(2, "SO-2", "shipped".into()),
        ],
    );
    let orders: Vec<Order> = command
        .materialize::<Order, _>(cursor)
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(
        orders[0],
        Order {
            id: 1,
            number: "SO-1".into(),
            total: 12.5,
            status: "open".into(),
            customer_id: None,
            placed_at: Some("2024-01-02 03:04:05".into()),
            ..Default::default()
        }
    );
    assert_eq!(orders[1].status, "shipped");
}

#[test]
fn test_null_takes_column_default() {
    let command = pg(&QueryPlan::<Order>::new());
    let cursor = cursor_for(&command.shape, vec![order_row(1, "SO-1", Value::Null)]);
    let order = command
        .materialize::<Order, _>(cursor)
        .unwrap()
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(order.status, "open");
}

#[test]
fn test_null_in_required_column() {
    let command = pg(&QueryPlan::<Order>::new());
    let mut row = order_row(1, "SO-1", "open".into());
    row[1] = Value::Null;
    let err = command
        .materialize::<Order, _>(cursor_for(&command.shape, vec![row]))
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    assert_eq!(
        err,
        MaterializeError::Materialization {
            entity: "Order".into(),
            member: "Number".into(),
            reason: "NULL in a non-nullable column".into(),
        }
    );
}

#[test]
fn test_cell_of_wrong_type() {
    let command = pg(&QueryPlan::<Order>::new());
    let mut row = order_row(1, "SO-1", "open".into());
    row[2] = Value::Text("lots".into());
    let err = command
        .materialize::<Order, _>(cursor_for(&command.shape, vec![row]))
        .unwrap()
        .next()
        .unwrap()
        .unwrap_err();
    assert!(
        matches!(err, MaterializeError::Conversion { ref member, .. } if member == "Total"),
        "{:?}",
        err
    );
}

#[test]
fn test_cursor_width_must_match_shape() {
    let command = pg(&QueryPlan::<Order>::new());
    let cursor = VecCursor::from_rows(&["Id", "Number"], vec![vec![Value::Int(1), "SO-1".into()]]);
    let err = materialize::<Order, _>(cursor, &command.shape).err().unwrap();
    assert_eq!(err, MaterializeError::ShapeMismatch { expected: 6, actual: 2 });
}

#[test]
fn test_projection_into_record_type() {
    let plan = QueryPlan::<Order>::new().select::<OrderSummary>(lambda(
        "o",
        record(vec![
            ("Number", param("o").member("Number")),
            ("CustomerName", param("o").member("Customer").member("Name")),
        ]),
    ));
    let command = pg(&plan);
    let cursor = cursor_for(
        &command.shape,
        vec![vec!["SO-1".into(), "Ada".into()], vec!["SO-2".into(), Value::Null]],
    );
    let summaries: Vec<OrderSummary> = command
        .materialize::<OrderSummary, _>(cursor)
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();

    assert_eq!(summaries[0].customer_name.as_deref(), Some("Ada"));
    assert_eq!(summaries[1].customer_name, None);
    assert!(summaries[1].lines.is_empty());
}

#[test]
fn test_projection_member_missing_on_target() {
    let plan = QueryPlan::<Order>::new().select::<OrderSummary>(lambda(
        "o",
        record(vec![("Reference", param("o").member("Number"))]),
    ));
    let command = pg(&plan);
    let cursor = cursor_for(&command.shape, vec![vec!["SO-1".into()]]);
    assert!(command.materialize::<OrderSummary, _>(cursor).is_err());
}

#[test]
fn test_count_reads_back_as_scalar() {
    let plan = QueryPlan::<Order>::new()
        .filter(lambda("o", param("o").member("Status").eq("open")))
        .count();
    let command = pg(&plan);
    let cursor = VecCursor::from_rows(&["Value"], vec![vec![17i64]]);
    let counts: Vec<i64> = command
        .scalars::<i64, _>(cursor)
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();
    assert_eq!(counts, vec![17]);
}

#[test]
fn test_projected_member_values() {
    let plan = QueryPlan::<Order>::new().select::<String>(lambda("o", param("o").member("Number")));
    let command = pg(&plan);
    let cursor = VecCursor::from_rows(&["Number"], vec![vec!["SO-1"], vec!["SO-2"]]);
    let numbers: Vec<String> = command
        .scalars::<String, _>(cursor)
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();
    assert_eq!(numbers, vec!["SO-1".to_string(), "SO-2".to_string()]);
}

#[test]
fn test_generated_identity_reads_back() {
    let order = Order {
        number: "SO-5".into(),
        status: "open".into(),
        ..Default::default()
    };
    let command = pg(&QueryPlan::insert_returning_identity(&order));
    let cursor = VecCursor::from_rows(&["Id"], vec![vec![Value::Int(501)]]);
    let id = quarry::materialize::materialize_scalar::<i64, _>(cursor, &command.shape).unwrap();
    assert_eq!(id, Some(501));
}

#[test]
fn test_streaming_stops_at_consumer() {
    let command = pg(&QueryPlan::<Order>::new());
    let mut cursor = cursor_for(
        &command.shape,
        (1..=4).map(|id| order_row(id, "SO", "open".into())).collect(),
    );
    {
        let mut rows = command.materialize::<Order, _>(&mut cursor).unwrap();
        assert_eq!(rows.next().unwrap().unwrap().id, 1);
        assert_eq!(rows.rows_read(), 1);
    }
    assert_eq!(cursor.remaining(), 3);
}
