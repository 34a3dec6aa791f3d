//! `PostgreSQL` storage for EventPass.
//!
//! [`PostgresEntityStore`] implements [`eventpass_core::store::EntityStore`]
//! on a sqlx connection pool. Each commit is one transaction; inventory,
//! status transitions and uniqueness are enforced by the database itself, so
//! any number of server processes can share one database.
//!
//! # Example
//!
//! ```ignore
//! use eventpass_postgres::PostgresEntityStore;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresEntityStore::connect("postgres://localhost/eventpass", 10).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod rows;
mod store;

pub use store::PostgresEntityStore;
