//! The fixture dataset loaded by the seeder.
//!
//! Fixtures are authored in `fixtures/users.json` using MongoDB extended JSON
//! for identifiers. That file is compiled into the crate; a substitute file can
//! be loaded at runtime instead.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use users::models::{ADDRESSES, Address, CARDS, CUSTOMERS, Card, Customer, RecordId};

/// The fixture file shipped with the crate.
pub const EMBEDDED_FIXTURES: &str = include_str!("../fixtures/users.json");

#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Fixture parse error: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(
        "Inconsistent fixtures: {} dangling references, {} duplicate ids",
        .dangling.len(),
        .duplicates.len()
    )]
    Inconsistent {
        dangling: Vec<DanglingReference>,
        duplicates: Vec<(&'static str, RecordId)>,
    },
}

/// A customer reference with no matching record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DanglingReference {
    pub customer: RecordId,
    /// Collection the reference points into.
    pub collection: &'static str,
    pub id: RecordId,
}

impl fmt::Display for DanglingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "customer {} -> {} {}",
            self.customer, self.collection, self.id
        )
    }
}

/// Customers, addresses and cards to load, in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureSet {
    #[serde(default)]
    pub customers: Vec<Customer>,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub cards: Vec<Card>,
}

impl FixtureSet {
    /// Parses the fixture file compiled into the crate.
    pub fn embedded() -> Result<Self, FixtureError> {
        Self::from_json(EMBEDDED_FIXTURES)
    }

    pub fn from_json(json: &str) -> Result<Self, FixtureError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, FixtureError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Number of records per collection, keyed by collection name.
    pub fn counts(&self) -> HashMap<&'static str, usize> {
        HashMap::from([
            (CUSTOMERS, self.customers.len()),
            (ADDRESSES, self.addresses.len()),
            (CARDS, self.cards.len()),
        ])
    }

    pub fn customer(&self, id: RecordId) -> Option<&Customer> {
        self.customers.iter().find(|c| c.id == id)
    }

    pub fn address(&self, id: RecordId) -> Option<&Address> {
        self.addresses.iter().find(|a| a.id == id)
    }

    pub fn card(&self, id: RecordId) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == id)
    }

    /// Every (customer, collection, id) reference held by the customers, in order.
    pub fn references(&self) -> impl Iterator<Item = (RecordId, &'static str, RecordId)> + '_ {
        self.customers.iter().flat_map(|customer| {
            let addresses = customer
                .address_ids
                .iter()
                .map(move |id| (customer.id, ADDRESSES, *id));
            let cards = customer
                .card_ids
                .iter()
                .map(move |id| (customer.id, CARDS, *id));
            addresses.chain(cards)
        })
    }

    /// Customer references that do not resolve within this set.
    pub fn dangling_references(&self) -> Vec<DanglingReference> {
        let addresses: HashSet<RecordId> = self.addresses.iter().map(|a| a.id).collect();
        let cards: HashSet<RecordId> = self.cards.iter().map(|c| c.id).collect();

        self.references()
            .filter(|(_, collection, id)| {
                let known = if *collection == ADDRESSES {
                    &addresses
                } else {
                    &cards
                };
                !known.contains(id)
            })
            .map(|(customer, collection, id)| DanglingReference {
                customer,
                collection,
                id,
            })
            .collect()
    }

    /// Ids that appear more than once within the same collection.
    pub fn duplicate_ids(&self) -> Vec<(&'static str, RecordId)> {
        let mut duplicates = Vec::new();
        let groups = [
            (CUSTOMERS, self.customers.iter().map(|c| c.id).collect::<Vec<_>>()),
            (ADDRESSES, self.addresses.iter().map(|a| a.id).collect()),
            (CARDS, self.cards.iter().map(|c| c.id).collect()),
        ];

        for (collection, ids) in groups {
            let mut seen = HashSet::new();
            for id in ids {
                if !seen.insert(id) {
                    duplicates.push((collection, id));
                }
            }
        }

        duplicates
    }

    /// Checks that references resolve and ids are unique per collection.
    pub fn validate(&self) -> Result<(), FixtureError> {
        let dangling = self.dangling_references();
        let duplicates = self.duplicate_ids();

        if dangling.is_empty() && duplicates.is_empty() {
            Ok(())
        } else {
            Err(FixtureError::Inconsistent {
                dangling,
                duplicates,
            })
        }
    }
}
