//! Inventory items, stock reservations and the reservation ledger.

mod item;
mod repository;
mod reservation;

pub use item::{Item, ItemChanges, NewItem};
pub use repository::ItemRepository;
pub use reservation::{
    Reservation, ReservationRepository, ReservationState, ReserveOutcome, RestoreOutcome,
};
