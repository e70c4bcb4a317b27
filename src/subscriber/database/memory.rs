use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use serde_json::Value;

use crate::subscriber::error::{invalid_argument, SubscriberError, SubscriberResult};
use crate::util::{PartialObserver, Unsubscribe};

use super::query_evaluator::{apply_query_to_documents, validate_query};
use super::{Document, DocumentData, DocumentDatabase, Query, QuerySnapshot};

#[derive(Clone)]
struct ListenerEntry {
    id: u64,
    query: Query,
    observer: PartialObserver<QuerySnapshot>,
}

#[derive(Default)]
struct MemoryInner {
    // collection path -> document id -> fields
    documents: Mutex<BTreeMap<String, BTreeMap<String, DocumentData>>>,
    listeners: Mutex<Vec<ListenerEntry>>,
    listener_counter: AtomicU64,
}

/// In-process [`DocumentDatabase`] with real-time listeners.
///
/// Every write re-evaluates the listeners of the touched collection and sends
/// each of them a fresh full snapshot, ordered by document id. Useful for tests,
/// demos and offline embedding.
#[derive(Clone, Default)]
pub struct MemoryDatabase {
    inner: Arc<MemoryInner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites a document. `data` must be a JSON object.
    pub fn set_document(&self, collection: &str, id: &str, data: Value) -> SubscriberResult<()> {
        let Value::Object(fields) = data else {
            return Err(invalid_argument(format!(
                "Document {collection}/{id} must be a JSON object"
            )));
        };
        self.inner
            .documents
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), fields);
        self.notify_collection(collection);
        Ok(())
    }

    /// Removes a document. Returns whether it existed.
    pub fn delete_document(&self, collection: &str, id: &str) -> bool {
        let removed = self
            .inner
            .documents
            .lock()
            .unwrap()
            .get_mut(collection)
            .and_then(|documents| documents.remove(id))
            .is_some();
        if removed {
            self.notify_collection(collection);
        }
        removed
    }

    /// Terminates every listener on `collection` with `error`, the way a backend
    /// closes a watch stream after a failure.
    pub fn fail_listeners(&self, collection: &str, error: SubscriberError) {
        let failed: Vec<ListenerEntry> = {
            let mut listeners = self.inner.listeners.lock().unwrap();
            let (failed, kept): (Vec<_>, Vec<_>) = listeners
                .drain(..)
                .partition(|entry| entry.query.collection().path() == collection);
            *listeners = kept;
            failed
        };
        for entry in failed {
            log::debug!("failing listener {} on `{collection}`", entry.id);
            entry.observer.notify_error(&error);
        }
    }

    /// Number of listeners currently registered.
    pub fn active_listeners(&self) -> usize {
        self.inner.listeners.lock().unwrap().len()
    }

    /// Number of listeners currently registered on `collection`.
    pub fn active_listeners_for(&self, collection: &str) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.query.collection().path() == collection)
            .count()
    }

    fn run_query(&self, query: &Query) -> QuerySnapshot {
        let candidates: Vec<Document> = self
            .inner
            .documents
            .lock()
            .unwrap()
            .get(query.collection().path())
            .map(|documents| {
                documents
                    .iter()
                    .map(|(id, data)| Document::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default();
        QuerySnapshot::new(query.clone(), apply_query_to_documents(candidates, query))
    }

    fn notify_collection(&self, collection: &str) {
        let targets: Vec<ListenerEntry> = self
            .inner
            .listeners
            .lock()
            .unwrap()
            .iter()
            .filter(|entry| entry.query.collection().path() == collection)
            .cloned()
            .collect();
        for entry in targets {
            let snapshot = self.run_query(&entry.query);
            entry.observer.notify_next(&snapshot);
        }
    }
}

impl MemoryInner {
    fn remove_listener(&self, listener_id: u64) {
        self.listeners
            .lock()
            .unwrap()
            .retain(|entry| entry.id != listener_id);
    }
}

impl DocumentDatabase for MemoryDatabase {
    fn listen(
        &self,
        query: &Query,
        observer: PartialObserver<QuerySnapshot>,
    ) -> SubscriberResult<Unsubscribe> {
        validate_query(query)?;

        let id = self.inner.listener_counter.fetch_add(1, Ordering::SeqCst);
        self.inner.listeners.lock().unwrap().push(ListenerEntry {
            id,
            query: query.clone(),
            observer: observer.clone(),
        });

        let snapshot = self.run_query(query);
        observer.notify_next(&snapshot);

        let inner: Weak<MemoryInner> = Arc::downgrade(&self.inner);
        Ok(Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner.remove_listener(id);
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subscriber::database::CollectionReference;
    use crate::subscriber::error::unavailable;
    use crate::subscriber::spec::FieldFilter;
    use serde_json::json;

    fn recording_observer() -> (PartialObserver<QuerySnapshot>, Arc<Mutex<Vec<Vec<String>>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);
        let observer = PartialObserver::new().with_next(move |snapshot: &QuerySnapshot| {
            captured.lock().unwrap().push(
                snapshot
                    .documents()
                    .iter()
                    .map(|document| document.id().to_string())
                    .collect(),
            );
        });
        (observer, seen)
    }

    #[test]
    fn listener_receives_initial_and_updated_snapshots() {
        let database = MemoryDatabase::new();
        database
            .set_document("tasks", "b", json!({"owner": "u1"}))
            .unwrap();
        let query = Query::new(CollectionReference::new("tasks").unwrap())
            .filter(FieldFilter::new("owner", "==", "u1"));
        let (observer, seen) = recording_observer();

        let unsubscribe = database.listen(&query, observer).unwrap();
        database
            .set_document("tasks", "a", json!({"owner": "u1"}))
            .unwrap();
        database
            .set_document("tasks", "c", json!({"owner": "u2"}))
            .unwrap();
        assert!(database.delete_document("tasks", "b"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                vec!["b".to_string()],
                vec!["a".to_string(), "b".to_string()],
                vec!["a".to_string(), "b".to_string()],
                vec!["a".to_string()],
            ]
        );

        unsubscribe();
        assert_eq!(database.active_listeners(), 0);
        database.set_document("tasks", "d", json!({"owner": "u1"})).unwrap();
        assert_eq!(seen.lock().unwrap().len(), 4);
    }

    #[test]
    fn unknown_operator_is_rejected_at_listen() {
        let database = MemoryDatabase::new();
        let query = Query::new(CollectionReference::new("tasks").unwrap())
            .filter(FieldFilter::new("owner", "equals", "u1"));
        let (observer, _) = recording_observer();
        let err = database.listen(&query, observer).err().unwrap();
        assert_eq!(err.code_str(), "subscriber/invalid-argument");
        assert_eq!(database.active_listeners(), 0);
    }

    #[test]
    fn failing_listeners_removes_them() {
        let database = MemoryDatabase::new();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&errors);
        let observer = PartialObserver::new()
            .with_error(move |err: &dyn std::error::Error| {
                captured.lock().unwrap().push(err.to_string())
            });
        let tasks = Query::new(CollectionReference::new("tasks").unwrap());
        let notes = Query::new(CollectionReference::new("notes").unwrap());
        let _tasks = database.listen(&tasks, observer.clone()).unwrap();
        let _notes = database.listen(&notes, observer).unwrap();

        database.fail_listeners("tasks", unavailable("backend offline"));

        assert_eq!(
            *errors.lock().unwrap(),
            vec!["backend offline (subscriber/unavailable)".to_string()]
        );
        assert_eq!(database.active_listeners_for("tasks"), 0);
        assert_eq!(database.active_listeners_for("notes"), 1);
    }

    #[test]
    fn non_object_documents_are_rejected() {
        let database = MemoryDatabase::new();
        assert!(database.set_document("tasks", "a", json!(3)).is_err());
    }
}
