//! Order persistence.

mod in_memory;
mod postgres;
mod r#trait;

pub use in_memory::InMemoryOrderStore;
pub use postgres::PostgresOrderStore;
pub use r#trait::{OrderStore, OrderStoreError};
