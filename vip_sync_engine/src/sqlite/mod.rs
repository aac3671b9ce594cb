//! SQLite database module for the VIP sync engine.
mod sqlite_impl;

pub mod db;
pub use sqlite_impl::SqliteDatabase;
