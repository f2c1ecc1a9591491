//! Record key layout.
//!
//! ```text
//! pk                          sk               record
//! ITEM#<itemId>               ITEM#<itemId>    Item
//! METADATA#CATEGORY#<cat>     ITEM#<itemId>    category index entry
//! ORDER#<orderId>             ORDER#<orderId>  Order (line items embedded)
//! CUSTOMER#<customerId>       ORDER#<orderId>  customer index entry
//! RESERVATION#<orderId>       ITEM#<itemId>    Reservation
//! ```

use common::{CustomerId, ItemId, OrderId};
use record_store::RecordKey;

pub const ITEM_PREFIX: &str = "ITEM#";
pub const CATEGORY_INDEX_PREFIX: &str = "METADATA#CATEGORY#";
pub const ORDER_PREFIX: &str = "ORDER#";
pub const CUSTOMER_INDEX_PREFIX: &str = "CUSTOMER#";
pub const RESERVATION_PREFIX: &str = "RESERVATION#";

pub fn item(id: &ItemId) -> RecordKey {
    RecordKey::primary(format!("{ITEM_PREFIX}{id}"))
}

pub fn category_partition(category: &str) -> String {
    format!("{CATEGORY_INDEX_PREFIX}{category}")
}

pub fn category_entry(category: &str, id: &ItemId) -> RecordKey {
    RecordKey::new(category_partition(category), format!("{ITEM_PREFIX}{id}"))
}

pub fn order(id: &OrderId) -> RecordKey {
    RecordKey::primary(format!("{ORDER_PREFIX}{id}"))
}

pub fn customer_partition(customer: &CustomerId) -> String {
    format!("{CUSTOMER_INDEX_PREFIX}{customer}")
}

pub fn customer_entry(customer: &CustomerId, order: &OrderId) -> RecordKey {
    RecordKey::new(customer_partition(customer), format!("{ORDER_PREFIX}{order}"))
}

pub fn reservation(order: &OrderId, item: &ItemId) -> RecordKey {
    RecordKey::new(
        format!("{RESERVATION_PREFIX}{order}"),
        format!("{ITEM_PREFIX}{item}"),
    )
}

/// Returns true if the key addresses an entity's primary row.
pub fn is_primary(key: &RecordKey) -> bool {
    key.partition_key == key.sort_key
}
