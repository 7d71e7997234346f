//! SQLite backend for the order workflow engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
