//! Database integration for seeding fixture data.
//!
//! The [`Seeder`] ensures the customer collections exist and loads a
//! [`FixtureSet`](crate::fixtures::FixtureSet) into any
//! [`DocumentStore`](users::DocumentStore), either insert-only or as upserts.

mod seeder;

pub use seeder::{SeedError, SeedReport, Seeder, VerifyReport};
