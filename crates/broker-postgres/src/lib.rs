//! PostgreSQL implementation of the document-processing broker's [`Store`]
//! trait (`broker_core::Store`).
//!
//! # Features
//!
//! - `FOR UPDATE SKIP LOCKED` claiming, sweep and claim in one transaction
//! - Readiness-gated NEW -> QUEUED transition as a single atomic `UPDATE`
//! - Attempt-budgeted retry with dead-letter into FAILED
//!
//! # Usage
//!
//! ```rust,ignore
//! use broker_postgres::PgStore;
//! use sqlx::PgPool;
//!
//! let pool = PgPool::connect("postgres://localhost/broker").await?;
//! let store = PgStore::new(pool);
//! store.migrate().await?;
//! ```

mod rows;
mod store;

pub use store::PgStore;
