//! Customer records of the `users` database and the document store that holds them.
//!
//! [`DocumentStore`] is the storage boundary. [`MongoStore`] talks to a MongoDB
//! server; [`MemoryStore`] keeps everything in process for tests and dry runs.

pub mod database;
pub mod errors;
pub mod memory;
pub mod models;

pub use database::{DocumentStore, MongoStore};
pub use errors::StoreError;
pub use memory::MemoryStore;
