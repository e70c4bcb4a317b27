//! The document-database collaborator consumed by the coordinator.
//!
//! The coordinator never talks to a backend directly. It composes [`Query`]
//! values and hands them to a [`DocumentDatabase`], which owns transport,
//! query validation and snapshot delivery.

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::subscriber::error::{invalid_argument, SubscriberResult};
use crate::subscriber::spec::FieldFilter;
use crate::util::{PartialObserver, Unsubscribe};

mod memory;
mod query_evaluator;

pub use memory::MemoryDatabase;
pub use query_evaluator::FilterOperator;

/// Field map of a stored document.
pub type DocumentData = Map<String, Value>;

/// A document as delivered by a snapshot: its identifier plus its fields.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    id: String,
    data: DocumentData,
}

impl Document {
    pub fn new(id: impl Into<String>, data: DocumentData) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &DocumentData {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn into_data(self) -> DocumentData {
        self.data
    }
}

/// Serializes as `{ "id": ..., ...fields }`. The snapshot identifier always wins
/// over a stored field called `id`.
impl Serialize for Document {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        for (key, value) in self.data.iter().filter(|(key, _)| key.as_str() != "id") {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Handle to a named collection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollectionReference {
    path: String,
}

impl CollectionReference {
    /// Validates that `path` names a collection (odd number of non-empty segments).
    pub fn new(path: impl Into<String>) -> SubscriberResult<Self> {
        let path = path.into();
        let segments: Vec<&str> = path.split('/').collect();
        if segments.iter().any(|segment| segment.is_empty()) {
            return Err(invalid_argument(format!(
                "Invalid collection path `{path}`: empty segment"
            )));
        }
        if segments.len() % 2 == 0 {
            return Err(invalid_argument(format!(
                "Invalid collection path `{path}`: collections must have an odd number of segments"
            )));
        }
        Ok(Self { path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// The identifier (last segment) of the collection.
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }
}

/// A collection plus a conjunction of field filters.
#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    collection: CollectionReference,
    filters: Vec<FieldFilter>,
}

impl Query {
    pub fn new(collection: CollectionReference) -> Self {
        Self {
            collection,
            filters: Vec::new(),
        }
    }

    /// Adds a constraint. No validation happens here; the database rejects
    /// unsupported operators when the query is listened to.
    pub fn filter(mut self, filter: FieldFilter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn collection(&self) -> &CollectionReference {
        &self.collection
    }

    pub fn filters(&self) -> &[FieldFilter] {
        &self.filters
    }
}

/// Full result set of a query at one point in time.
#[derive(Clone, Debug)]
pub struct QuerySnapshot {
    query: Query,
    documents: Vec<Document>,
}

impl QuerySnapshot {
    pub fn new(query: Query, documents: Vec<Document>) -> Self {
        Self { query, documents }
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn into_documents(self) -> Vec<Document> {
        self.documents
    }
}

impl IntoIterator for QuerySnapshot {
    type Item = Document;
    type IntoIter = std::vec::IntoIter<Document>;

    fn into_iter(self) -> Self::IntoIter {
        self.documents.into_iter()
    }
}

/// Real-time document store the coordinator subscribes against.
pub trait DocumentDatabase: Send + Sync + 'static {
    /// Returns a handle bound to the named collection.
    fn collection(&self, path: &str) -> SubscriberResult<CollectionReference> {
        CollectionReference::new(path)
    }

    /// Composes a query from a collection and zero or more constraints.
    fn query(&self, collection: CollectionReference, filters: Vec<FieldFilter>) -> Query {
        filters.into_iter().fold(Query::new(collection), Query::filter)
    }

    /// Opens a real-time subscription.
    ///
    /// `observer.next` receives a full snapshot on every change and
    /// `observer.error` is invoked once if the stream fails. After the returned
    /// handle has run, implementations should stop invoking the observer.
    fn listen(
        &self,
        query: &Query,
        observer: PartialObserver<QuerySnapshot>,
    ) -> SubscriberResult<Unsubscribe>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_paths_are_validated() {
        assert!(CollectionReference::new("tasks").is_ok());
        assert_eq!(
            CollectionReference::new("users/alice/tasks").unwrap().id(),
            "tasks"
        );
        assert!(CollectionReference::new("users/alice").is_err());
        assert!(CollectionReference::new("tasks//x").is_err());
        assert!(CollectionReference::new("").is_err());
    }

    #[test]
    fn document_serializes_flat_with_snapshot_id() {
        let data = json!({"title": "write docs", "id": "stale"});
        let document = Document::new("t1", data.as_object().cloned().unwrap());
        assert_eq!(
            serde_json::to_value(&document).unwrap(),
            json!({"id": "t1", "title": "write docs"})
        );
    }
}
