//! Seeds the users database with the fixture customers, addresses and cards.
//!
//! Run with:
//! ```
//! MONGO_HOST=localhost:27017 cargo run -p seed-data --bin seed
//! ```
//!
//! Set `SEED_MODE=upsert` to make the run repeatable, `SEED_RESET=true` to drop
//! the collections first, or `SEED_DRY_RUN=true` to seed an in-memory store.

use anyhow::{Context, bail};
use seed_data::prelude::*;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = SeedConfig::from_env()?;

    let fixtures = match &config.fixtures_path {
        Some(path) => FixtureSet::load_file(path)
            .with_context(|| format!("failed to load fixtures from {}", path.display()))?,
        None => FixtureSet::embedded()?,
    };
    fixtures.validate()?;

    if config.dry_run {
        tracing::info!("Dry run: seeding an in-memory store");
        return run(Seeder::new(MemoryStore::new(), fixtures), &config).await;
    }

    tracing::info!("Connecting to {}", config.connection_uri());
    let store = MongoStore::connect(config.client_options().await?, &config.database)?;
    store
        .ping()
        .await
        .with_context(|| format!("MongoDB at {} is unreachable", config.mongo_host))?;

    tracing::info!("Connected to database");

    run(Seeder::new(store, fixtures), &config).await
}

async fn run<S: DocumentStore>(seeder: Seeder<S>, config: &SeedConfig) -> anyhow::Result<()> {
    let seeder = seeder.with_mode(config.mode);

    if config.reset {
        seeder.clear_all().await?;
    }

    let report = seeder.seed().await?;
    let verified = seeder.verify().await?;

    if !verified.is_consistent() {
        bail!(
            "seeded data is inconsistent: {} missing records, {} dangling references",
            verified.missing.len(),
            verified.dangling.len()
        );
    }

    // Summary output
    tracing::info!("Seed completed! ({} mode)", report.mode.as_str());
    tracing::info!("  Customers: {}", verified.customers);
    tracing::info!("  Addresses: {}", verified.addresses);
    tracing::info!("  Cards: {}", verified.cards);

    Ok(())
}
