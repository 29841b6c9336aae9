//! Compile a plan, fabricate the rows a database would return for its
//! shape, and read them back into the object graph they came from.

#[path = "../common/mod.rs"]
mod common;

use common::*;
use quarry::compiler::{ColumnKind, ResultShape};
use quarry::materialize::{MaterializeResult, VecCursor};
use quarry::metadata::{describe, Entity, Value};
use quarry::plan::{lambda, param, record, NodeExt, QueryPlan};

/// One result row. `lookup(path, member)` answers a member of the root
/// object (`None`) or of the navigation at `path`.
fn row(shape: &ResultShape, lookup: impl Fn(Option<&str>, &str) -> Value) -> Vec<Value> {
    shape
        .columns
        .iter()
        .enumerate()
        .map(|(position, column)| match column.kind {
            ColumnKind::Split => {
                let nav = shape
                    .navigations
                    .iter()
                    .find(|n| n.split_index == Some(position))
                    .expect("split column without navigation");
                match lookup(Some(&nav.path), "Id") {
                    Value::Null => Value::Null,
                    _ => Value::Int(1),
                }
            }
            ColumnKind::Key => lookup(None, &column.member),
            ColumnKind::Member => {
                let path = column.owner.map(|o| shape.navigations[o].path.as_str());
                lookup(path, &column.member)
            }
        })
        .collect()
}

fn get<T: Entity>(object: Option<&T>, member: &str) -> Value {
    let Some(object) = object else {
        return Value::Null;
    };
    let (slot, _) = describe::<T>()
        .field(member)
        .unwrap_or_else(|| panic!("no member {}", member));
    object.field(slot)
}

fn cursor(shape: &ResultShape, rows: Vec<Vec<Value>>) -> VecCursor {
    VecCursor::new(shape.columns.iter().map(|c| c.output.clone()).collect(), rows)
}

fn line(id: i64, order_id: i64, product: &str) -> OrderLine {
    OrderLine {
        id,
        order_id,
        product: product.into(),
        quantity: id % 3 + 1,
        price: 2.5,
    }
}

/// Order 1 has a customer with an address and two lines; order 2 has
/// neither.
fn orders() -> Vec<Order> {
    vec![
        Order {
            id: 1,
            number: "SO-1".into(),
            total: 40.0,
            status: "open".into(),
            customer_id: Some(7),
            placed_at: Some("2024-05-01 10:00:00".into()),
            customer: Some(Customer {
                id: 7,
                name: "Ada".into(),
                address_id: Some(3),
                address: Some(Address {
                    id: 3,
                    city: "Oslo".into(),
                    street: None,
                }),
            }),
            lines: vec![line(10, 1, "pen"), line(11, 1, "ink")],
            payments: Vec::new(),
        },
        Order {
            id: 2,
            number: "SO-2".into(),
            total: 0.0,
            status: "draft".into(),
            customer_id: None,
            placed_at: Some("2024-05-02 08:15:00".into()),
            customer: None,
            lines: Vec::new(),
            payments: Vec::new(),
        },
    ]
}

/// Rows of `order` under `shape`: one per line, or a single row without one.
fn order_rows(shape: &ResultShape, order: &Order) -> Vec<Vec<Value>> {
    let lines: Vec<Option<&OrderLine>> = if order.lines.is_empty() {
        vec![None]
    } else {
        order.lines.iter().map(Some).collect()
    };
    lines
        .into_iter()
        .map(|line| {
            row(shape, |path, member| match path {
                None => get(Some(order), member),
                Some("Order.Customer") => get(order.customer.as_ref(), member),
                Some("Order.Customer.Address") => get(
                    order.customer.as_ref().and_then(|c| c.address.as_ref()),
                    member,
                ),
                Some("Order.Lines") => get(line, member),
                Some(other) => panic!("unexpected navigation {}", other),
            })
        })
        .collect()
}

#[test]
fn test_included_graph_round_trips() {
    let plan = QueryPlan::<Order>::new()
        .include(lambda("o", param("o").member("Customer").member("Address")))
        .include(lambda("o", param("o").member("Lines")));
    let command = pg(&plan);
    let shape = &command.shape;
    assert!(shape.has_collections());

    let source = orders();
    let rows = source.iter().flat_map(|o| order_rows(shape, o)).collect();
    let result: Vec<Order> = command
        .materialize::<Order, _>(cursor(shape, rows))
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();

    assert_eq!(result, source);
}

#[test]
fn test_reference_include_without_collections() {
    let plan = QueryPlan::<Order>::new().include(lambda("o", param("o").member("Customer")));
    let command = pg(&plan);
    let shape = &command.shape;
    assert!(shape.root_key.is_empty());

    let mut source = orders();
    for order in &mut source {
        order.lines.clear();
        if let Some(customer) = order.customer.as_mut() {
            customer.address = None;
        }
    }
    let rows = source.iter().flat_map(|o| order_rows(shape, o)).collect();
    let result: Vec<Order> = command
        .materialize::<Order, _>(cursor(shape, rows))
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();

    assert_eq!(result, source);
}

#[test]
fn test_projection_with_nested_collection_round_trips() {
    let plan = QueryPlan::<Order>::new().select::<OrderSummary>(lambda(
        "o",
        record(vec![
            ("Number", param("o").member("Number")),
            ("CustomerName", param("o").member("Customer").member("Name")),
            ("Lines", param("o").member("Lines")),
        ]),
    ));
    let command = pg(&plan);
    let shape = &command.shape;

    let source = orders();
    let rows = source
        .iter()
        .flat_map(|order| {
            let lines: Vec<Option<&OrderLine>> = if order.lines.is_empty() {
                vec![None]
            } else {
                order.lines.iter().map(Some).collect()
            };
            lines.into_iter().map(move |line| {
                row(shape, |path, member| match (path, member) {
                    (None, "CustomerName") => order
                        .customer
                        .as_ref()
                        .map_or(Value::Null, |c| c.name.clone().into()),
                    (None, member) => get(Some(order), member),
                    (Some("Order.Lines"), member) => get(line, member),
                    (Some(other), _) => panic!("unexpected navigation {}", other),
                })
            })
        })
        .collect();

    let result: Vec<OrderSummary> = command
        .materialize::<OrderSummary, _>(cursor(shape, rows))
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();

    assert_eq!(
        result,
        vec![
            OrderSummary {
                number: "SO-1".into(),
                customer_name: Some("Ada".into()),
                lines: source[0].lines.clone(),
            },
            OrderSummary {
                number: "SO-2".into(),
                customer_name: None,
                lines: Vec::new(),
            },
        ]
    );
}

#[test]
fn test_paged_include_round_trips() {
    let plan = QueryPlan::<Order>::new()
        .include(lambda("o", param("o").member("Lines")))
        .order_by(lambda("o", param("o").member("Number")))
        .take(2);
    let command = pg(&plan);
    let shape = &command.shape;

    let mut source = orders();
    for order in &mut source {
        order.customer = None;
    }
    let rows = source.iter().flat_map(|o| order_rows(shape, o)).collect();
    let result: Vec<Order> = command
        .materialize::<Order, _>(cursor(shape, rows))
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();

    assert_eq!(result.len(), 2);
    assert_eq!(result[0].lines, source[0].lines);
    assert!(result[1].lines.is_empty());
}

fn payment(id: i64, order_id: i64, amount: f64) -> Payment {
    Payment {
        id,
        order_id,
        amount,
        method: "card".into(),
    }
}

#[test]
fn test_independent_collections_fan_out_once() {
    let plan = QueryPlan::<Order>::new()
        .include(lambda("o", param("o").member("Lines")))
        .include(lambda("o", param("o").member("Payments")));
    let command = pg(&plan);
    let shape = &command.shape;

    let mut order = orders().swap_remove(0);
    order.customer = None;
    order.payments = vec![
        payment(20, 1, 10.0),
        payment(21, 1, 15.0),
        payment(22, 1, 15.0),
    ];

    // every line paired with every payment
    let rows: Vec<Vec<Value>> = order
        .lines
        .iter()
        .flat_map(|line| order.payments.iter().map(move |p| (line, p)))
        .map(|(line, p)| {
            row(shape, |path, member| match path {
                None => get(Some(&order), member),
                Some("Order.Lines") => get(Some(line), member),
                Some("Order.Payments") => get(Some(p), member),
                Some(other) => panic!("unexpected navigation {}", other),
            })
        })
        .collect();
    assert_eq!(rows.len(), 6);

    let result: Vec<Order> = command
        .materialize::<Order, _>(cursor(shape, rows))
        .unwrap()
        .collect::<MaterializeResult<_>>()
        .unwrap();

    assert_eq!(result.len(), 1);
    assert_eq!(result[0].lines.iter().map(|l| l.id).collect::<Vec<_>>(), vec![10, 11]);
    assert_eq!(
        result[0].payments.iter().map(|p| p.id).collect::<Vec<_>>(),
        vec![20, 21, 22]
    );
    assert_eq!(result[0], order);
}
