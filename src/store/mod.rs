//! In-memory state store: accounts, positions, history, credentials.
//! Source of truth at runtime; hydrated from and flushed to Postgres by
//! the persistence layer.

mod book;
pub mod locks;

pub use book::{Book, Credential, SharedBook, shared};
