use thiserror::Error;

use crate::models::RecordId;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bson::ser::Error),

    #[error("Deserialization error: {0}")]
    Deserialization(#[from] bson::de::Error),

    #[error("Duplicate identifier in {collection}: {}", join_ids(.ids))]
    DuplicateKey {
        collection: String,
        ids: Vec<RecordId>,
    },

    /// A unique index other than `_id` rejected the documents with these ids.
    #[error("Duplicate {field} in {collection} for documents: {}", join_ids(.ids))]
    DuplicateField {
        collection: String,
        field: String,
        ids: Vec<RecordId>,
    },

    #[error("Document in {collection} has no ObjectId _id")]
    MissingId { collection: String },
}

impl StoreError {
    /// Builds the error for rejected documents, each paired with the unique
    /// field it clashed on (`None` for `_id`).
    ///
    /// `_id` clashes take precedence; otherwise the first clashing field is
    /// reported with every document that clashed on it.
    pub fn from_conflicts(
        collection: &str,
        conflicts: Vec<(RecordId, Option<String>)>,
    ) -> Option<Self> {
        let (id_clashes, field_clashes): (Vec<_>, Vec<_>) =
            conflicts.into_iter().partition(|(_, field)| field.is_none());

        if !id_clashes.is_empty() {
            return Some(Self::DuplicateKey {
                collection: collection.to_string(),
                ids: id_clashes.into_iter().map(|(id, _)| id).collect(),
            });
        }

        let field = field_clashes.first()?.1.clone()?;
        let ids = field_clashes
            .into_iter()
            .filter(|(_, clashed)| clashed.as_deref() == Some(field.as_str()))
            .map(|(id, _)| id)
            .collect();

        Some(Self::DuplicateField {
            collection: collection.to_string(),
            field,
            ids,
        })
    }
}

/// Renders ids as a comma-separated hex list for error messages.
fn join_ids(ids: &[RecordId]) -> String {
    ids.iter()
        .map(RecordId::to_hex)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FixedIdGenerator;

    #[test]
    fn test_no_conflicts_is_no_error() {
        assert!(StoreError::from_conflicts("customers", Vec::new()).is_none());
    }

    #[test]
    fn test_id_clash_wins_over_field_clash() {
        let mut ids = FixedIdGenerator::default();
        let (a, b) = (ids.next_id(), ids.next_id());

        let err = StoreError::from_conflicts(
            "customers",
            vec![(a, Some("username".to_string())), (b, None)],
        );

        assert!(matches!(err, Some(StoreError::DuplicateKey { ref ids, .. }) if ids == &[b]));
    }

    #[test]
    fn test_field_clash_names_the_field() {
        let mut ids = FixedIdGenerator::default();
        let (a, b) = (ids.next_id(), ids.next_id());

        let err = StoreError::from_conflicts(
            "customers",
            vec![
                (a, Some("username".to_string())),
                (b, Some("username".to_string())),
            ],
        )
        .unwrap();

        assert_eq!(
            err.to_string(),
            format!("Duplicate username in customers for documents: {a}, {b}")
        );
    }
}
