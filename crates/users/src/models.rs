use std::fmt;
use std::str::FromStr;

use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

/// Default database holding the customer collections.
pub const DATABASE: &str = "users";

pub const CUSTOMERS: &str = "customers";
pub const ADDRESSES: &str = "addresses";
pub const CARDS: &str = "cards";

/// Every collection this crate owns, in seeding order.
pub const COLLECTIONS: [&str; 3] = [CUSTOMERS, ADDRESSES, CARDS];

/// Opaque document identifier.
///
/// Stored as a BSON ObjectId in the `_id` field and rendered as 24 hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(ObjectId);

impl RecordId {
    /// Generates a fresh identifier the way the driver does for new documents.
    pub fn generate() -> Self {
        Self(ObjectId::new())
    }

    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(ObjectId::from_bytes(bytes))
    }

    pub const fn object_id(&self) -> ObjectId {
        self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex()
    }
}

impl From<ObjectId> for RecordId {
    fn from(oid: ObjectId) -> Self {
        Self(oid)
    }
}

impl From<RecordId> for bson::Bson {
    fn from(id: RecordId) -> Self {
        bson::Bson::ObjectId(id.0)
    }
}

impl FromStr for RecordId {
    type Err = bson::oid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectId::parse_str(s).map(Self)
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Deterministic identifier source for tests and fixture authoring.
///
/// Produces ObjectId-shaped ids from a fixed timestamp, a fixed 5-byte
/// discriminator and a 24-bit counter, so the same generator always yields the
/// same sequence. Ids from the default discriminator never overlap the ones in
/// the shipped fixture file.
#[derive(Debug, Clone)]
pub struct FixedIdGenerator {
    timestamp: u32,
    discriminator: [u8; 5],
    counter: u32,
}

impl FixedIdGenerator {
    const COUNTER_MASK: u32 = 0x00ff_ffff;

    pub const fn new(timestamp: u32, discriminator: [u8; 5], start: u32) -> Self {
        Self {
            timestamp,
            discriminator,
            counter: start & Self::COUNTER_MASK,
        }
    }

    /// Returns the next id in the sequence. The counter wraps at 24 bits.
    pub fn next_id(&mut self) -> RecordId {
        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&self.timestamp.to_be_bytes());
        bytes[4..9].copy_from_slice(&self.discriminator);
        bytes[9..].copy_from_slice(&self.counter.to_be_bytes()[1..]);
        self.counter = (self.counter + 1) & Self::COUNTER_MASK;
        RecordId::from_bytes(bytes)
    }
}

impl Default for FixedIdGenerator {
    fn default() -> Self {
        Self::new(0x6000_0000, *b"fixed", 1)
    }
}

impl Iterator for FixedIdGenerator {
    type Item = RecordId;

    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_id())
    }
}

/// A document type that belongs to exactly one collection.
pub trait Record: Serialize + Send + Sync {
    const COLLECTION: &'static str;

    fn id(&self) -> RecordId;
}

/// A registered customer.
///
/// `addresses` and `cards` are weak references by id: nothing enforces that
/// the referenced documents exist and nothing cascades on delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    /// Password hash, never the plain password.
    pub password: String,
    pub salt: String,
    #[serde(rename = "addresses", default)]
    pub address_ids: Vec<RecordId>,
    #[serde(rename = "cards", default)]
    pub card_ids: Vec<RecordId>,
}

impl Record for Customer {
    const COLLECTION: &'static str = CUSTOMERS;

    fn id(&self) -> RecordId {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub number: String,
    pub street: String,
    pub city: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub postcode: Option<String>,
    pub country: String,
}

impl Record for Address {
    const COLLECTION: &'static str = ADDRESSES;

    fn id(&self) -> RecordId {
        self.id
    }
}

/// A stored payment card. Values are kept as authored, without validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    #[serde(rename = "_id")]
    pub id: RecordId,
    pub long_num: String,
    /// `MM/YY`
    pub expires: String,
    pub ccv: String,
}

impl Record for Card {
    const COLLECTION: &'static str = CARDS;

    fn id(&self) -> RecordId {
        self.id
    }
}
