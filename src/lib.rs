//! # firebase-orm
//!
//! Schema-driven document mapping over Cloud Firestore, with session helpers for
//! Firebase Authentication and Cloud Storage uploads.
//!
//! - [`schema`] declares typed, defaulted fields for a named collection.
//! - [`document`] binds a schema to a session and moves [`document::Record`]s to
//!   and from the remote store (`fetch`, `put`, `query`).
//! - [`query`] validates and builds filter / order / limit conditions.
//! - [`session`] owns the backends for one app: auth-state subscription, email
//!   and Google sign-in, and resumable uploads with progress events.
//! - [`app`] resolves connection parameters (explicit, process default, environment).
//! - [`remote`] holds the backend traits with REST and in-memory implementations.
//!
//! ```no_run
//! use firebase_orm::app::{set_default_config, ConnectionConfig};
//! use firebase_orm::document::DocumentMapping;
//! use firebase_orm::query::{FilterOperator, QueryCondition};
//! use firebase_orm::schema::{DocumentSchema, FieldSchema};
//!
//! # async fn run() -> firebase_orm::error::OrmResult<()> {
//! set_default_config(ConnectionConfig::new("my-app", "api-key"))?;
//!
//! let schema = DocumentSchema::builder("users")
//!     .field("name", FieldSchema::string())
//!     .field("age", FieldSchema::number().with_default(0))
//!     .build()?;
//! let users = DocumentMapping::new(schema, None)?;
//!
//! let mut ada = users.new_record();
//! ada.set("name", "Ada");
//! ada.put().await?;
//!
//! let adults = users
//!     .query(&[QueryCondition::filter("age", FilterOperator::GreaterThanOrEqual, 18)])
//!     .await?;
//! println!("{} adult(s)", adults.len());
//! # Ok(())
//! # }
//! ```

pub mod app;
pub mod document;
pub mod error;
pub mod logger;
pub mod platform;
pub mod query;
pub mod remote;
pub mod schema;
pub mod session;
pub mod value;
