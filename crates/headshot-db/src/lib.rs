//! Headshot DB - Persistence layer
//!
//! SQLx-based PostgreSQL repositories plus an in-memory store with the same
//! semantics, used by tests and local development.
//!
//! # Example
//!
//! ```rust,ignore
//! use headshot_db::{create_pool, run_migrations, Repositories};
//!
//! let pool = create_pool("postgres://localhost/headshot").await?;
//! run_migrations(&pool).await?;
//! let repos = Repositories::postgres(pool);
//!
//! let account = repos.accounts.find_by_subject("auth0|123").await?;
//! ```

pub mod error;
pub mod memory;
pub mod models;
pub mod pg;
pub mod pool;
pub mod repo;
pub mod rules;

pub use error::{DbError, DbResult};
pub use memory::MemoryStore;
pub use models::*;
pub use pool::{create_pool, create_pool_with_options, run_migrations, DbPool, PoolOptions};
pub use repo::*;
