//! Fixture seeding for the `users` database.
//!
//! This crate loads the fixed set of customers, addresses and cards that a
//! fresh environment starts with, and checks that every customer reference
//! resolves once they are stored.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use seed_data::prelude::*;
//!
//! let config = SeedConfig::from_env()?;
//! let store = MongoStore::connect(config.client_options().await?, &config.database)?;
//!
//! let seeder = Seeder::new(store, FixtureSet::embedded()?).with_mode(config.mode);
//! seeder.seed().await?;
//! assert!(seeder.verify().await?.is_consistent());
//! ```

pub mod config;
pub mod db;
pub mod fixtures;

// Re-export core types from users crate
pub use users::models::{Address, Card, Customer, FixedIdGenerator, RecordId};

pub mod prelude {
    //! Convenient re-exports for common usage.

    pub use crate::config::{SeedConfig, SeedMode};
    pub use crate::db::{SeedError, SeedReport, Seeder, VerifyReport};
    pub use crate::fixtures::{FixtureError, FixtureSet};
    pub use crate::{Address, Card, Customer, FixedIdGenerator, RecordId};
    pub use users::{DocumentStore, MemoryStore, MongoStore};
}
