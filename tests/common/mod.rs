//! Shared fixture entities for integration tests.
//!
//! ```text
//! Order ──► Customer ──► Address
//!   ├──< OrderLine
//!   └──< Payment
//! ```

#![allow(dead_code)]

use std::any::Any;

use quarry::compile::{compile, CompileOptions, CompiledCommand};
use quarry::metadata::{
    downcast_child, AttachError, ConversionError, DataType, Entity, EntityDescriptor, FromValue,
    Value,
};
use quarry::plan::QueryPlan;
use quarry::sql::Dialect;
use sqlparser::dialect::{DuckDbDialect, MsSqlDialect, MySqlDialect, PostgreSqlDialect};
use sqlparser::parser::Parser;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Order {
    pub id: i64,
    pub number: String,
    pub total: f64,
    pub status: String,
    pub customer_id: Option<i64>,
    pub placed_at: Option<String>,
    pub customer: Option<Customer>,
    pub lines: Vec<OrderLine>,
    pub payments: Vec<Payment>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Customer {
    pub id: i64,
    pub name: String,
    pub address_id: Option<i64>,
    pub address: Option<Address>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Address {
    pub id: i64,
    pub city: String,
    pub street: Option<String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct OrderLine {
    pub id: i64,
    pub order_id: i64,
    pub product: String,
    pub quantity: i64,
    pub price: f64,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Payment {
    pub id: i64,
    pub order_id: i64,
    pub amount: f64,
    pub method: String,
}

/// Projection target: `o => new OrderSummary { Number, CustomerName, Lines }`.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct OrderSummary {
    pub number: String,
    pub customer_name: Option<String>,
    pub lines: Vec<OrderLine>,
}

impl Entity for Order {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::builder::<Order>("Order")
            .table("Orders")
            .schema("sales")
            .key("Id", DataType::Int)
            .identity()
            .column("Number", DataType::Text)
            .column("Total", DataType::Decimal)
            .column("Status", DataType::Text)
            .default_value("open")
            .column("CustomerId", DataType::Int)
            .nullable()
            .column("PlacedAt", DataType::Timestamp)
            .default_value(Value::Timestamp("1970-01-01 00:00:00".into()))
            .references::<Customer>("Customer", &["CustomerId"], &["Id"])
            .has_many::<OrderLine>("Lines", &["Id"], &["OrderId"])
            .has_many::<Payment>("Payments", &["Id"], &["OrderId"])
            .build()
    }

    fn set_field(&mut self, slot: usize, value: Value) -> Result<(), ConversionError> {
        match slot {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.number = FromValue::from_value(value)?,
            2 => self.total = FromValue::from_value(value)?,
            3 => self.status = FromValue::from_value(value)?,
            4 => self.customer_id = FromValue::from_value(value)?,
            5 => self.placed_at = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn field(&self, slot: usize) -> Value {
        match slot {
            0 => self.id.into(),
            1 => self.number.clone().into(),
            2 => self.total.into(),
            3 => self.status.clone().into(),
            4 => self.customer_id.into(),
            5 => self
                .placed_at
                .clone()
                .map_or(Value::Null, Value::Timestamp),
            _ => Value::Null,
        }
    }

    fn attach(&mut self, member: &str, child: Box<dyn Any>) -> Result<(), AttachError> {
        match member {
            "Customer" => self.customer = Some(downcast_child(member, child)?),
            "Lines" => self.lines.push(downcast_child(member, child)?),
            "Payments" => self.payments.push(downcast_child(member, child)?),
            _ => return Err(AttachError::UnknownMember(member.to_string())),
        }
        Ok(())
    }
}

impl Entity for Customer {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::builder::<Customer>("Customer")
            .table("Customers")
            .schema("sales")
            .key("Id", DataType::Int)
            .column("Name", DataType::Text)
            .column("AddressId", DataType::Int)
            .nullable()
            .references::<Address>("Address", &["AddressId"], &["Id"])
            .build()
    }

    fn set_field(&mut self, slot: usize, value: Value) -> Result<(), ConversionError> {
        match slot {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.name = FromValue::from_value(value)?,
            2 => self.address_id = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn field(&self, slot: usize) -> Value {
        match slot {
            0 => self.id.into(),
            1 => self.name.clone().into(),
            2 => self.address_id.into(),
            _ => Value::Null,
        }
    }

    fn attach(&mut self, member: &str, child: Box<dyn Any>) -> Result<(), AttachError> {
        match member {
            "Address" => self.address = Some(downcast_child(member, child)?),
            _ => return Err(AttachError::UnknownMember(member.to_string())),
        }
        Ok(())
    }
}

impl Entity for Address {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::builder::<Address>("Address")
            .table("Addresses")
            .schema("sales")
            .key("Id", DataType::Int)
            .column("City", DataType::Text)
            .column("Street", DataType::Text)
            .nullable()
            .build()
    }

    fn set_field(&mut self, slot: usize, value: Value) -> Result<(), ConversionError> {
        match slot {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.city = FromValue::from_value(value)?,
            2 => self.street = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn field(&self, slot: usize) -> Value {
        match slot {
            0 => self.id.into(),
            1 => self.city.clone().into(),
            2 => self.street.clone().into(),
            _ => Value::Null,
        }
    }
}

impl Entity for OrderLine {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::builder::<OrderLine>("OrderLine")
            .table("OrderLines")
            .schema("sales")
            .key("Id", DataType::Int)
            .column("OrderId", DataType::Int)
            .column("Product", DataType::Text)
            .column("Quantity", DataType::Int)
            .column("Price", DataType::Decimal)
            .build()
    }

    fn set_field(&mut self, slot: usize, value: Value) -> Result<(), ConversionError> {
        match slot {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.order_id = FromValue::from_value(value)?,
            2 => self.product = FromValue::from_value(value)?,
            3 => self.quantity = FromValue::from_value(value)?,
            4 => self.price = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn field(&self, slot: usize) -> Value {
        match slot {
            0 => self.id.into(),
            1 => self.order_id.into(),
            2 => self.product.clone().into(),
            3 => self.quantity.into(),
            4 => self.price.into(),
            _ => Value::Null,
        }
    }
}

impl Entity for Payment {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::builder::<Payment>("Payment")
            .table("Payments")
            .schema("sales")
            .key("Id", DataType::Int)
            .column("OrderId", DataType::Int)
            .column("Amount", DataType::Decimal)
            .column("Method", DataType::Text)
            .build()
    }

    fn set_field(&mut self, slot: usize, value: Value) -> Result<(), ConversionError> {
        match slot {
            0 => self.id = FromValue::from_value(value)?,
            1 => self.order_id = FromValue::from_value(value)?,
            2 => self.amount = FromValue::from_value(value)?,
            3 => self.method = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn field(&self, slot: usize) -> Value {
        match slot {
            0 => self.id.into(),
            1 => self.order_id.into(),
            2 => self.amount.into(),
            3 => self.method.clone().into(),
            _ => Value::Null,
        }
    }
}

impl Entity for OrderSummary {
    fn describe() -> EntityDescriptor {
        EntityDescriptor::builder::<OrderSummary>("OrderSummary")
            .projection()
            .column("Number", DataType::Text)
            .column("CustomerName", DataType::Text)
            .nullable()
            .nested_many::<OrderLine>("Lines")
            .build()
    }

    fn set_field(&mut self, slot: usize, value: Value) -> Result<(), ConversionError> {
        match slot {
            0 => self.number = FromValue::from_value(value)?,
            1 => self.customer_name = FromValue::from_value(value)?,
            _ => {}
        }
        Ok(())
    }

    fn field(&self, slot: usize) -> Value {
        match slot {
            0 => self.number.clone().into(),
            1 => self.customer_name.clone().into(),
            _ => Value::Null,
        }
    }

    fn attach(&mut self, member: &str, child: Box<dyn Any>) -> Result<(), AttachError> {
        match member {
            "Lines" => self.lines.push(downcast_child(member, child)?),
            _ => return Err(AttachError::UnknownMember(member.to_string())),
        }
        Ok(())
    }
}

/// Single-line options for `dialect`.
pub fn options(dialect: Dialect) -> CompileOptions {
    CompileOptions::default().with_dialect(dialect).compact()
}

/// Route library logs through `RUST_LOG` while tests run.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn compile_for<T>(plan: &QueryPlan<T>, dialect: Dialect) -> CompiledCommand {
    init_logging();
    compile(plan, &options(dialect)).unwrap()
}

/// Compile for Postgres and check the output parses.
pub fn pg<T>(plan: &QueryPlan<T>) -> CompiledCommand {
    let command = compile_for(plan, Dialect::Postgres);
    validate_sql(&command.sql, Dialect::Postgres).unwrap();
    command
}

/// Validates that a SQL string is syntactically valid for the given dialect.
pub fn validate_sql(sql: &str, dialect: Dialect) -> Result<(), String> {
    let parser_dialect: Box<dyn sqlparser::dialect::Dialect> = match dialect {
        Dialect::Postgres => Box::new(PostgreSqlDialect {}),
        Dialect::DuckDb => Box::new(DuckDbDialect {}),
        Dialect::MySql => Box::new(MySqlDialect {}),
        Dialect::TSql => Box::new(MsSqlDialect {}),
    };

    Parser::parse_sql(&*parser_dialect, sql)
        .map(|_| ())
        .map_err(|e| format!("Invalid SQL for {:?}: {}\nSQL: {}", dialect, e, sql))
}
