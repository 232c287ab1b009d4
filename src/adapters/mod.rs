pub mod in_memory;
pub mod postgres_product_repository;
pub mod postgres_transaction_repository;

pub use in_memory::{InMemoryProductRepository, InMemoryTransactionRepository};
pub use postgres_product_repository::PostgresProductRepository;
pub use postgres_transaction_repository::PostgresTransactionRepository;
