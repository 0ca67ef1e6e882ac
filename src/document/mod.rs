//! Document mappings and the records they produce.
//!
//! A [`DocumentMapping`] pairs a [`crate::schema::DocumentSchema`] with a
//! [`crate::session::Session`]; [`Record`]s are the in-memory instances that are
//! fetched, modified and put back.

mod converter;
mod mapping;
mod payload;
mod record;

use std::sync::LazyLock;

use crate::logger::Logger;

pub use converter::{DocumentConverter, FieldMapConverter};
pub use mapping::DocumentMapping;
pub use payload::PayloadMode;
pub use record::Record;

pub(crate) static LOGGER: LazyLock<Logger> =
    LazyLock::new(|| Logger::new("@firebase-orm/document"));
