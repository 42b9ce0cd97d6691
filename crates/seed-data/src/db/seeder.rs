//! Database seeding utilities.

use std::collections::HashSet;

use thiserror::Error;
use tracing::{info, warn};
use users::database::{DocumentStore, to_documents};
use users::errors::StoreError;
use users::models::{ADDRESSES, CARDS, COLLECTIONS, CUSTOMERS, Record, RecordId};

use crate::config::SeedMode;
use crate::fixtures::{DanglingReference, FixtureSet};

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("Duplicate identifier: {}", join_collection_ids(.ids))]
    DuplicateIdentifier {
        /// Colliding ids with the collection each was found in.
        ids: Vec<(String, RecordId)>,
    },
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for SeedError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateKey { collection, ids } => Self::DuplicateIdentifier {
                ids: ids.into_iter().map(|id| (collection.clone(), id)).collect(),
            },
            other => Self::Store(other),
        }
    }
}

fn join_collection_ids(ids: &[(String, RecordId)]) -> String {
    ids.iter()
        .map(|(collection, id)| format!("{collection} {id}"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Counts written by one `load_fixtures` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedReport {
    pub mode: SeedMode,
    pub customers: usize,
    pub addresses: usize,
    pub cards: usize,
}

/// State of the seeded collections as read back from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyReport {
    pub customers: u64,
    pub addresses: u64,
    pub cards: u64,
    /// Fixture records not present in the store, as (collection, id).
    pub missing: Vec<(&'static str, RecordId)>,
    /// Customer references that do not resolve in the store.
    pub dangling: Vec<DanglingReference>,
}

impl VerifyReport {
    pub fn is_consistent(&self) -> bool {
        self.missing.is_empty() && self.dangling.is_empty()
    }
}

/// Loads a [`FixtureSet`] into a document store.
pub struct Seeder<S> {
    store: S,
    fixtures: FixtureSet,
    mode: SeedMode,
}

impl<S: DocumentStore> Seeder<S> {
    /// Creates an insert-only seeder for the given store and fixtures.
    pub fn new(store: S, fixtures: FixtureSet) -> Self {
        Self {
            store,
            fixtures,
            mode: SeedMode::Insert,
        }
    }

    pub fn with_mode(mut self, mode: SeedMode) -> Self {
        self.mode = mode;
        self
    }

    /// Runs a full seed: collections, indexes, then fixtures.
    pub async fn seed(&self) -> Result<SeedReport, SeedError> {
        self.ensure_collections().await?;
        self.ensure_indexes().await?;
        self.load_fixtures().await
    }

    /// Creates the customer, address and card collections if they are missing.
    pub async fn ensure_collections(&self) -> Result<(), SeedError> {
        let existing: HashSet<String> = self.store.collection_names().await?.into_iter().collect();

        for name in COLLECTIONS {
            if existing.contains(name) {
                info!("Collection {} already exists", name);
                continue;
            }
            if self.store.create_collection(name).await? {
                info!("Created collection {}", name);
            }
        }

        Ok(())
    }

    /// Ensures usernames are unique across customers.
    pub async fn ensure_indexes(&self) -> Result<(), SeedError> {
        self.store.ensure_unique_index(CUSTOMERS, "username").await?;
        info!("Ensured unique index on {}.username", CUSTOMERS);
        Ok(())
    }

    /// Writes every fixture record into its collection, customers first.
    ///
    /// In [`SeedMode::Insert`] nothing is written if any fixture id is already
    /// stored; the error lists every colliding id.
    pub async fn load_fixtures(&self) -> Result<SeedReport, SeedError> {
        if self.mode == SeedMode::Insert {
            self.check_conflicts().await?;
        }

        let report = SeedReport {
            mode: self.mode,
            customers: self.load(&self.fixtures.customers).await?,
            addresses: self.load(&self.fixtures.addresses).await?,
            cards: self.load(&self.fixtures.cards).await?,
        };

        info!(
            "Loaded fixtures ({}): {} customers, {} addresses, {} cards",
            report.mode.as_str(),
            report.customers,
            report.addresses,
            report.cards
        );
        Ok(report)
    }

    /// Fails with every fixture id that is already present in the store.
    async fn check_conflicts(&self) -> Result<(), SeedError> {
        let mut ids = Vec::new();

        for (collection, fixture_ids) in self.fixture_ids() {
            let existing = self.store.existing_ids(collection, &fixture_ids).await?;
            ids.extend(existing.into_iter().map(|id| (collection.to_string(), id)));
        }

        if ids.is_empty() {
            return Ok(());
        }

        warn!("{} fixture ids already stored", ids.len());
        Err(SeedError::DuplicateIdentifier { ids })
    }

    async fn load<R: Record>(&self, records: &[R]) -> Result<usize, SeedError> {
        info!("Seeding {} {}...", records.len(), R::COLLECTION);

        let documents = to_documents(records)?;
        match self.mode {
            SeedMode::Insert => self.store.insert_many(R::COLLECTION, documents).await?,
            SeedMode::Upsert => self.store.upsert_many(R::COLLECTION, documents).await?,
        }

        info!("Seeded {} {}", records.len(), R::COLLECTION);
        Ok(records.len())
    }

    /// Reads the collections back and checks fixtures and references resolve.
    pub async fn verify(&self) -> Result<VerifyReport, SeedError> {
        let mut missing = Vec::new();
        for (collection, ids) in self.fixture_ids() {
            let present: HashSet<RecordId> = self
                .store
                .existing_ids(collection, &ids)
                .await?
                .into_iter()
                .collect();
            missing.extend(
                ids.into_iter()
                    .filter(|id| !present.contains(id))
                    .map(|id| (collection, id)),
            );
        }

        let references: Vec<_> = self.fixtures.references().collect();
        let mut resolved = HashSet::new();
        for collection in [ADDRESSES, CARDS] {
            let ids: Vec<RecordId> = references
                .iter()
                .filter(|(_, target, _)| *target == collection)
                .map(|(_, _, id)| *id)
                .collect();
            for id in self.store.existing_ids(collection, &ids).await? {
                resolved.insert((collection, id));
            }
        }

        let dangling = references
            .into_iter()
            .filter(|(_, collection, id)| !resolved.contains(&(*collection, *id)))
            .map(|(customer, collection, id)| DanglingReference {
                customer,
                collection,
                id,
            })
            .collect();

        let report = VerifyReport {
            customers: self.store.count(CUSTOMERS).await?,
            addresses: self.store.count(ADDRESSES).await?,
            cards: self.store.count(CARDS).await?,
            missing,
            dangling,
        };

        if report.is_consistent() {
            info!(
                "Verified {} customers, {} addresses, {} cards",
                report.customers, report.addresses, report.cards
            );
        } else {
            for (collection, id) in &report.missing {
                warn!("Missing {} {}", collection, id);
            }
            for reference in &report.dangling {
                warn!("Dangling reference {}", reference);
            }
        }

        Ok(report)
    }

    /// Drops the seeded collections.
    ///
    /// **WARNING**: This deletes every document in them, not just fixtures.
    pub async fn clear_all(&self) -> Result<(), SeedError> {
        info!("Clearing seeded collections...");

        for name in COLLECTIONS {
            self.store.drop_collection(name).await?;
        }

        info!("All seeded collections dropped");
        Ok(())
    }

    fn fixture_ids(&self) -> [(&'static str, Vec<RecordId>); 3] {
        [
            (CUSTOMERS, self.fixtures.customers.iter().map(|c| c.id).collect()),
            (ADDRESSES, self.fixtures.addresses.iter().map(|a| a.id).collect()),
            (CARDS, self.fixtures.cards.iter().map(|c| c.id).collect()),
        ]
    }

    pub fn fixtures(&self) -> &FixtureSet {
        &self.fixtures
    }

    pub fn mode(&self) -> SeedMode {
        self.mode
    }

    /// Returns a reference to the store for advanced usage.
    pub fn store(&self) -> &S {
        &self.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use users::MemoryStore;
    use users::database::{document_id, find_record};
    use users::models::{Address, Customer};

    fn id(hex: &str) -> RecordId {
        hex.parse().unwrap()
    }

    fn seeder() -> Seeder<MemoryStore> {
        Seeder::new(MemoryStore::new(), FixtureSet::embedded().unwrap())
    }

    #[tokio::test]
    async fn test_seed_counts() {
        let seeder = seeder();
        let report = seeder.seed().await.unwrap();

        assert_eq!(report.customers, 3);
        assert_eq!(report.addresses, 4);
        assert_eq!(report.cards, 4);

        let store = seeder.store();
        assert_eq!(store.count(CUSTOMERS).await.unwrap(), 3);
        assert_eq!(store.count(ADDRESSES).await.unwrap(), 4);
        assert_eq!(store.count(CARDS).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_ensure_collections_twice() {
        let seeder = seeder();
        seeder.ensure_collections().await.unwrap();
        seeder.ensure_collections().await.unwrap();

        let mut names = seeder.store().collection_names().await.unwrap();
        names.sort();
        assert_eq!(names, ["addresses", "cards", "customers"]);
    }

    #[tokio::test]
    async fn test_verify_after_seed() {
        let seeder = seeder();
        seeder.seed().await.unwrap();

        let report = seeder.verify().await.unwrap();
        assert!(report.is_consistent());
        assert_eq!((report.customers, report.addresses, report.cards), (3, 4, 4));
    }

    #[tokio::test]
    async fn test_verify_before_seed_reports_everything_missing() {
        let seeder = seeder();
        let report = seeder.verify().await.unwrap();

        assert!(!report.is_consistent());
        assert_eq!(report.missing.len(), 11);
        assert_eq!(report.dangling.len(), 6);
    }

    #[tokio::test]
    async fn test_reseed_insert_fails_with_every_id() {
        let seeder = seeder();
        seeder.seed().await.unwrap();

        let err = seeder.seed().await.unwrap_err();
        match err {
            SeedError::DuplicateIdentifier { ids } => {
                assert_eq!(ids.len(), 11);
                assert_eq!(ids[0], (CUSTOMERS.to_string(), id("57a98d98e4b00679b4a830af")));
                assert_eq!(ids.iter().filter(|(c, _)| c == ADDRESSES).count(), 4);
                assert_eq!(ids[10], (CARDS.to_string(), id("57a98ddce4b00679b4a830d2")));
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(seeder.store().count(CUSTOMERS).await.unwrap(), 3);
        assert_eq!(seeder.store().count(CARDS).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_partial_conflict_writes_nothing() {
        let seeder = seeder();
        let london = seeder.fixtures().address(id("57a98ddce4b00679b4a830d1")).unwrap();
        seeder
            .store()
            .insert_many(ADDRESSES, to_documents(std::slice::from_ref(london)).unwrap())
            .await
            .unwrap();

        let err = seeder.load_fixtures().await.unwrap_err();
        assert!(matches!(
            err,
            SeedError::DuplicateIdentifier { ref ids }
                if ids == &[(ADDRESSES.to_string(), id("57a98ddce4b00679b4a830d1"))]
        ));
        assert_eq!(seeder.store().count(CUSTOMERS).await.unwrap(), 0);
        assert_eq!(seeder.store().count(ADDRESSES).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reseed_upsert_is_idempotent() {
        let seeder = seeder().with_mode(SeedMode::Upsert);
        seeder.seed().await.unwrap();
        let first = seeder.store().documents(CUSTOMERS).await;

        let report = seeder.seed().await.unwrap();
        assert_eq!(report.mode, SeedMode::Upsert);

        assert_eq!(seeder.store().documents(CUSTOMERS).await, first);
        assert_eq!(seeder.store().count(ADDRESSES).await.unwrap(), 4);
        assert_eq!(seeder.store().count(CARDS).await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_upsert_after_insert_keeps_counts() {
        let store = MemoryStore::new();
        let fixtures = FixtureSet::embedded().unwrap();

        let insert = Seeder::new(store, fixtures.clone());
        insert.seed().await.unwrap();

        let upsert = Seeder::new(insert.store, fixtures).with_mode(SeedMode::Upsert);
        upsert.seed().await.unwrap();
        assert!(upsert.verify().await.unwrap().is_consistent());
        assert_eq!(upsert.store().count(CUSTOMERS).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_london_address_field_fidelity() {
        let seeder = seeder();
        seeder.seed().await.unwrap();

        let document = seeder
            .store()
            .find_by_id(ADDRESSES, id("57a98ddce4b00679b4a830d1"))
            .await
            .unwrap()
            .unwrap();

        let keys: Vec<&str> = document.keys().map(String::as_str).collect();
        assert_eq!(keys, ["_id", "number", "street", "city", "country"]);
        assert_eq!(document.get_str("number").unwrap(), "3");
        assert_eq!(document.get_str("street").unwrap(), "my road");
        assert_eq!(document.get_str("city").unwrap(), "London");
        assert_eq!(document.get_str("country").unwrap(), "UK");
        assert!(!document.contains_key("postcode"));
    }

    #[tokio::test]
    async fn test_eve_berger_card_reference() {
        let seeder = seeder();
        seeder.seed().await.unwrap();

        let eve: Customer = find_record(seeder.store(), id("57a98d98e4b00679b4a830af"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(eve.username, "Eve_Berger");
        assert_eq!(eve.card_ids, [id("57a98d98e4b00679b4a830ae")]);

        let address: Option<Address> = find_record(seeder.store(), eve.address_ids[0])
            .await
            .unwrap();
        assert_eq!(address.unwrap().city, "Glasgow");
    }

    #[tokio::test]
    async fn test_insertion_order_matches_fixtures() {
        let seeder = seeder();
        seeder.seed().await.unwrap();

        let stored: Vec<RecordId> = seeder
            .store()
            .documents(CARDS)
            .await
            .iter()
            .map(|d| document_id(CARDS, d).unwrap())
            .collect();
        let expected: Vec<RecordId> = seeder.fixtures().cards.iter().map(|c| c.id).collect();
        assert_eq!(stored, expected);
    }

    #[tokio::test]
    async fn test_clear_all_allows_fresh_insert() {
        let seeder = seeder();
        seeder.seed().await.unwrap();

        seeder.clear_all().await.unwrap();
        assert!(seeder.store().collection_names().await.unwrap().is_empty());

        seeder.seed().await.unwrap();
        assert_eq!(seeder.store().count(CUSTOMERS).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_duplicate_username_is_rejected() {
        let seeder = seeder();
        seeder.seed().await.unwrap();

        let mut impostor = seeder.fixtures().customers[0].clone();
        impostor.id = RecordId::generate();
        let err: SeedError = seeder
            .store()
            .insert_many(CUSTOMERS, to_documents(&[impostor.clone()]).unwrap())
            .await
            .unwrap_err()
            .into();

        match err {
            SeedError::Store(StoreError::DuplicateField { field, ids, .. }) => {
                assert_eq!(field, "username");
                assert_eq!(ids, [impostor.id]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
