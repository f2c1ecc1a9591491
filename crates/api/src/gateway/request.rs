//! Field dispatch: turns `(fieldName, arguments)` into a typed request.

use common::{CustomerId, ItemId, OrderId};
use domain::{ItemChanges, NewItem, OrderStatus};
use serde_json::Value;

use super::arguments::Arguments;
use super::error::{GatewayError, Result};

/// Field names the gateway resolves.
pub const FIELDS: [&str; 10] = [
    "createItem",
    "updateItem",
    "deleteItem",
    "getItem",
    "listItems",
    "createOrder",
    "updateOrderStatus",
    "cancelOrder",
    "getOrder",
    "listOrders",
];

/// One requested line of a new order. The price is resolved from the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderLineInput {
    pub item_id: ItemId,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderInput {
    pub customer_id: CustomerId,
    pub lines: Vec<OrderLineInput>,
}

/// A validated gateway call.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayRequest {
    CreateItem(NewItem),
    UpdateItem { id: ItemId, changes: ItemChanges },
    DeleteItem { id: ItemId },
    GetItem { id: ItemId },
    ListItems { category: Option<String> },
    CreateOrder(CreateOrderInput),
    UpdateOrderStatus { id: OrderId, status: OrderStatus },
    CancelOrder { id: OrderId },
    GetOrder { id: OrderId },
    ListOrders {
        customer_id: Option<CustomerId>,
        status: Option<OrderStatus>,
    },
}

impl GatewayRequest {
    /// Parses and shape-checks the argument bag for `field`.
    pub fn parse(field: &str, arguments: &Value) -> Result<Self> {
        let args = Arguments::root(arguments)?;
        let request = match field {
            "createItem" => {
                let input = args.input()?;
                GatewayRequest::CreateItem(NewItem {
                    name: input.required_string("name")?,
                    description: input.string("description")?.unwrap_or_default(),
                    sku: input.string("sku")?,
                    quantity: input.required_count("quantity")?,
                    unit_price: input.required_money("unitPrice")?,
                    category: input.string("category")?.unwrap_or_default(),
                })
            }
            "updateItem" => {
                let input = args.input()?;
                GatewayRequest::UpdateItem {
                    id: ItemId::new(entity_id(&args, &input, &["id"])?),
                    changes: ItemChanges {
                        name: input.string("name")?,
                        description: input.string("description")?,
                        sku: input.string("sku")?,
                        quantity: input.count("quantity")?,
                        unit_price: input.money("unitPrice")?,
                        category: input.string("category")?,
                    },
                }
            }
            "deleteItem" => GatewayRequest::DeleteItem {
                id: ItemId::new(entity_id(&args, &args.input()?, &["id"])?),
            },
            "getItem" => GatewayRequest::GetItem {
                id: ItemId::new(entity_id(&args, &args.input()?, &["id"])?),
            },
            "listItems" => GatewayRequest::ListItems {
                category: args.filter()?.string("category")?,
            },
            "createOrder" => {
                let input = args.input()?;
                let lines = input
                    .objects("items")?
                    .iter()
                    .map(|line| {
                        Ok(OrderLineInput {
                            item_id: ItemId::new(line.required_string("itemId")?),
                            quantity: line.required_count("quantity")?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                GatewayRequest::CreateOrder(CreateOrderInput {
                    customer_id: CustomerId::new(input.required_string("customerId")?),
                    lines,
                })
            }
            "updateOrderStatus" => {
                let input = args.input()?;
                GatewayRequest::UpdateOrderStatus {
                    id: OrderId::new(entity_id(&args, &input, &["orderId", "id"])?),
                    status: input
                        .status("status")?
                        .ok_or_else(|| GatewayError::MissingArgument("status".into()))?,
                }
            }
            "cancelOrder" => GatewayRequest::CancelOrder {
                id: OrderId::new(entity_id(&args, &args.input()?, &["id", "orderId"])?),
            },
            "getOrder" => GatewayRequest::GetOrder {
                id: OrderId::new(entity_id(&args, &args.input()?, &["id", "orderId"])?),
            },
            "listOrders" => {
                let filter = args.filter()?;
                GatewayRequest::ListOrders {
                    customer_id: filter.string("customerId")?.map(CustomerId::new),
                    status: filter.status("status")?,
                }
            }
            other => return Err(GatewayError::UnknownField(other.to_string())),
        };
        Ok(request)
    }

    /// The field name this request was parsed from.
    pub fn field(&self) -> &'static str {
        match self {
            GatewayRequest::CreateItem(_) => "createItem",
            GatewayRequest::UpdateItem { .. } => "updateItem",
            GatewayRequest::DeleteItem { .. } => "deleteItem",
            GatewayRequest::GetItem { .. } => "getItem",
            GatewayRequest::ListItems { .. } => "listItems",
            GatewayRequest::CreateOrder(_) => "createOrder",
            GatewayRequest::UpdateOrderStatus { .. } => "updateOrderStatus",
            GatewayRequest::CancelOrder { .. } => "cancelOrder",
            GatewayRequest::GetOrder { .. } => "getOrder",
            GatewayRequest::ListOrders { .. } => "listOrders",
        }
    }
}

/// Finds the entity id at the top level or inside `input`, trying each name
/// in order.
fn entity_id(args: &Arguments<'_>, input: &Arguments<'_>, names: &[&str]) -> Result<String> {
    for name in names {
        for bag in [args, input] {
            if let Some(id) = bag.string(name)? {
                if id.trim().is_empty() {
                    return Err(GatewayError::invalid(*name, "must not be empty"));
                }
                return Ok(id);
            }
        }
    }
    Err(GatewayError::MissingArgument(names[0].to_string()))
}

#[cfg(test)]
mod tests {
    use domain::Money;
    use serde_json::json;

    use super::*;

    #[test]
    fn unknown_field_is_named() {
        let err = GatewayRequest::parse("dropTables", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "unknown field: dropTables");
    }

    #[test]
    fn every_field_round_trips_its_name() {
        let args = json!({
            "id": "x",
            "input": {
                "name": "Widget",
                "quantity": 1,
                "unitPrice": 1.5,
                "orderId": "o1",
                "status": "CONFIRMED",
                "customerId": "c1",
                "items": [{"itemId": "i1", "quantity": 1}]
            }
        });
        for field in FIELDS {
            let request = GatewayRequest::parse(field, &args).unwrap();
            assert_eq!(request.field(), field);
        }
    }

    #[test]
    fn create_item_accepts_flat_arguments() {
        let request = GatewayRequest::parse(
            "createItem",
            &json!({"name": "Widget", "quantity": 10, "unitPrice": 9.99, "category": "tools"}),
        )
        .unwrap();
        let GatewayRequest::CreateItem(item) = request else {
            panic!("expected createItem");
        };
        assert_eq!(item.name, "Widget");
        assert_eq!(item.quantity, 10);
        assert_eq!(item.unit_price, Money::from_cents(999));
        assert_eq!(item.category, "tools");
        assert_eq!(item.sku, None);
    }

    #[test]
    fn create_item_requires_name_and_non_negative_values() {
        let missing = GatewayRequest::parse("createItem", &json!({"quantity": 1, "unitPrice": 1}));
        assert!(matches!(missing, Err(GatewayError::MissingArgument(n)) if n == "name"));

        let negative = GatewayRequest::parse(
            "createItem",
            &json!({"name": "W", "quantity": -1, "unitPrice": 1}),
        );
        assert!(matches!(negative, Err(GatewayError::InvalidArgument { name, .. }) if name == "quantity"));
    }

    #[test]
    fn update_item_keeps_absent_fields_unchanged() {
        let request =
            GatewayRequest::parse("updateItem", &json!({"id": "i1", "quantity": 4})).unwrap();
        assert_eq!(
            request,
            GatewayRequest::UpdateItem {
                id: ItemId::new("i1"),
                changes: ItemChanges {
                    quantity: Some(4),
                    ..Default::default()
                },
            }
        );
    }

    #[test]
    fn create_order_reads_nested_input() {
        let request = GatewayRequest::parse(
            "createOrder",
            &json!({"input": {"customerId": "c1", "items": [
                {"itemId": "i1", "quantity": 2},
                {"itemId": "i2", "quantity": 1}
            ]}}),
        )
        .unwrap();
        let GatewayRequest::CreateOrder(input) = request else {
            panic!("expected createOrder");
        };
        assert_eq!(input.customer_id, CustomerId::new("c1"));
        assert_eq!(input.lines.len(), 2);
        assert_eq!(input.lines[1].item_id, ItemId::new("i2"));
    }

    #[test]
    fn create_order_names_the_bad_line_argument() {
        let err = GatewayRequest::parse(
            "createOrder",
            &json!({"input": {"customerId": "c1", "items": [{"itemId": "i1", "quantity": "two"}]}}),
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid argument 'quantity': expected a number, got a string"
        );
    }

    #[test]
    fn update_order_status_rejects_unknown_status() {
        let err = GatewayRequest::parse(
            "updateOrderStatus",
            &json!({"input": {"orderId": "o1", "status": "LOST"}}),
        )
        .unwrap_err();
        assert!(matches!(err, GatewayError::InvalidArgument { name, .. } if name == "status"));
    }

    #[test]
    fn list_filters_are_optional() {
        assert_eq!(
            GatewayRequest::parse("listItems", &Value::Null).unwrap(),
            GatewayRequest::ListItems { category: None }
        );
        assert_eq!(
            GatewayRequest::parse(
                "listOrders",
                &json!({"filter": {"customerId": "c1", "status": "PENDING"}})
            )
            .unwrap(),
            GatewayRequest::ListOrders {
                customer_id: Some(CustomerId::new("c1")),
                status: Some(OrderStatus::Pending),
            }
        );
    }

    #[test]
    fn missing_id_is_reported() {
        let err = GatewayRequest::parse("getOrder", &json!({})).unwrap_err();
        assert_eq!(err.to_string(), "missing required argument 'id'");
    }
}
