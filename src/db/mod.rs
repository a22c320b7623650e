//! Database module
//!
//! PostgreSQL integration using sqlx with:
//! - Connection pool management
//! - Row types with FromRow
//! - Repository pattern for data access
//! - Catalog writes with the COPY protocol inside one transaction

pub mod models;
pub mod pool;
pub mod repository;
pub mod store;

// Re-export commonly used items
pub use pool::{create_pool, health_check, run_migrations};
pub use store::PgCatalogStore;
