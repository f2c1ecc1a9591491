//! Orders, their status machine and persistence.

mod model;
mod repository;
mod state;

pub use model::{NewOrder, NewOrderLine, Order, OrderItem};
pub use repository::OrderRepository;
pub use state::OrderStatus;
