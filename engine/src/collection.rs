//! Typed in-memory collections.
//!
//! Each entity type lives in a [`Collection`], an insertion-ordered list that
//! serializes as a bare JSON array. Records are never edited in place: an
//! update swaps the whole record at its index so holders of the previous
//! value keep an unchanged copy.

use crate::state::ClinicState;
use serde::{Deserialize, Serialize};

/// A record type stored in one of the state's collections.
pub trait Entity: Clone {
    /// Name of the collection, as used in the persisted state.
    const COLLECTION: &'static str;

    /// Record identifier.
    fn id(&self) -> &str;

    /// Identifier of the clinic that owns this record.
    fn tenant_id(&self) -> &str;

    /// The collection holding records of this type.
    fn collection(state: &ClinicState) -> &Collection<Self>;

    /// Mutable access to the collection holding records of this type.
    fn collection_mut(state: &mut ClinicState) -> &mut Collection<Self>;
}

/// Implements [`Entity`] for a struct with `id` and `clinic_id` fields.
macro_rules! impl_entity {
    ($ty:ty, $name:literal, $field:ident) => {
        impl $crate::collection::Entity for $ty {
            const COLLECTION: &'static str = $name;

            fn id(&self) -> &str {
                &self.id
            }

            fn tenant_id(&self) -> &str {
                &self.clinic_id
            }

            fn collection(
                state: &$crate::state::ClinicState,
            ) -> &$crate::collection::Collection<Self> {
                &state.$field
            }

            fn collection_mut(
                state: &mut $crate::state::ClinicState,
            ) -> &mut $crate::collection::Collection<Self> {
                &mut state.$field
            }
        }
    };
}

pub(crate) use impl_entity;

/// An ordered collection of records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Collection<T> {
    records: Vec<T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
        }
    }
}

impl<T> From<Vec<T>> for Collection<T> {
    fn from(records: Vec<T>) -> Self {
        Self { records }
    }
}

impl<T: Entity> Collection<T> {
    /// Create an empty collection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a record by ID.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.records.iter().find(|r| r.id() == id)
    }

    /// Check if a record exists.
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.records.iter().position(|r| r.id() == id)
    }

    /// Append a record.
    pub fn insert(&mut self, record: T) {
        self.records.push(record);
    }

    /// Swap the stored record with the same ID for `record`.
    ///
    /// Returns the previous value, or `None` (and stores nothing) when no
    /// record with that ID exists.
    pub fn replace(&mut self, record: T) -> Option<T> {
        let index = self.position(record.id())?;
        Some(std::mem::replace(&mut self.records[index], record))
    }

    /// Remove a record by ID.
    pub fn remove(&mut self, id: &str) -> Option<T> {
        let index = self.position(id)?;
        Some(self.records.remove(index))
    }

    /// Keep only the records matching the predicate. Returns how many were dropped.
    pub fn retain<F>(&mut self, keep: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.records.len();
        self.records.retain(keep);
        before - self.records.len()
    }

    /// All records.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.iter()
    }

    /// Records belonging to one clinic.
    pub fn for_tenant<'a>(&'a self, tenant_id: &str) -> impl Iterator<Item = &'a T> + 'a {
        let tenant_id = tenant_id.to_string();
        self.records.iter().filter(move |r| r.tenant_id() == tenant_id)
    }

    /// Move out the records of every clinic other than `tenant_id`.
    pub fn split_off_others(&mut self, tenant_id: &str) -> Collection<T> {
        let (own, others): (Vec<T>, Vec<T>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|r| r.tenant_id() == tenant_id);
        self.records = own;
        Collection { records: others }
    }

    /// Append copies of the records of `other` whose IDs are not present.
    pub fn absorb(&mut self, other: &Collection<T>) {
        for record in other.iter() {
            if !self.contains(record.id()) {
                self.records.push(record.clone());
            }
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::ExamRequest;
    use chrono::{TimeZone, Utc};

    fn request(id: &str, clinic: &str) -> ExamRequest {
        ExamRequest {
            id: id.into(),
            clinic_id: clinic.into(),
            patient_id: "p-1".into(),
            professional_id: None,
            exams: vec!["TSH".into()],
            notes: None,
            created_at: Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap(),
        }
    }

    #[test]
    fn insert_and_get() {
        let mut collection = Collection::new();
        collection.insert(request("r-1", "c-1"));

        assert_eq!(collection.len(), 1);
        assert!(collection.contains("r-1"));
        assert_eq!(collection.get("r-1").unwrap().clinic_id, "c-1");
        assert!(collection.get("r-2").is_none());
    }

    #[test]
    fn replace_keeps_position() {
        let mut collection = Collection::new();
        collection.insert(request("r-1", "c-1"));
        collection.insert(request("r-2", "c-1"));

        let mut updated = request("r-1", "c-1");
        updated.notes = Some("fasting".into());
        let previous = collection.replace(updated).unwrap();

        assert!(previous.notes.is_none());
        let ids: Vec<_> = collection.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-1", "r-2"]);
        assert_eq!(collection.get("r-1").unwrap().notes.as_deref(), Some("fasting"));
    }

    #[test]
    fn replace_missing_is_noop() {
        let mut collection: Collection<ExamRequest> = Collection::new();
        assert!(collection.replace(request("r-9", "c-1")).is_none());
        assert!(collection.is_empty());
    }

    #[test]
    fn remove_and_retain() {
        let mut collection = Collection::new();
        collection.insert(request("r-1", "c-1"));
        collection.insert(request("r-2", "c-2"));
        collection.insert(request("r-3", "c-1"));

        assert!(collection.remove("r-2").is_some());
        assert!(collection.remove("r-2").is_none());

        let dropped = collection.retain(|r| r.id != "r-3");
        assert_eq!(dropped, 1);
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn tenant_filter() {
        let mut collection = Collection::new();
        collection.insert(request("r-1", "c-1"));
        collection.insert(request("r-2", "c-2"));

        let ids: Vec<_> = collection.for_tenant("c-2").map(|r| r.id.clone()).collect();
        assert_eq!(ids, vec!["r-2".to_string()]);
    }

    #[test]
    fn tenant_filter_outlives_its_key() {
        let mut collection = Collection::new();
        collection.insert(request("r-1", "c-1"));

        let found: Vec<&ExamRequest> = {
            let key = String::from("c-1");
            collection.for_tenant(&key).collect()
        };
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, "r-1");
    }

    #[test]
    fn split_and_absorb_by_tenant() {
        let mut collection = Collection::new();
        collection.insert(request("r-1", "c-1"));
        collection.insert(request("r-2", "c-2"));
        collection.insert(request("r-3", "c-1"));

        let others = collection.split_off_others("c-1");
        assert_eq!(collection.len(), 2);
        assert_eq!(others.len(), 1);
        assert!(others.contains("r-2"));

        collection.absorb(&others);
        collection.absorb(&others);
        let ids: Vec<_> = collection.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r-1", "r-3", "r-2"]);
    }

    #[test]
    fn serializes_as_array() {
        let mut collection = Collection::new();
        collection.insert(request("r-1", "c-1"));

        let json = serde_json::to_value(&collection).unwrap();
        assert!(json.is_array());

        let parsed: Collection<ExamRequest> = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, collection);
    }
}
