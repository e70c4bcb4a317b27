use std::collections::{BTreeMap, HashSet};
use std::error::Error;
use std::sync::{Arc, Mutex};

use crate::util::{unsubscribe_all, PartialObserver, Unsubscribe};

use super::database::{Document, DocumentDatabase, Query, QuerySnapshot};
use super::state::SubscriberState;

/// Concatenates the buffers in order and keeps the first document seen for each id.
pub fn merge_snapshots<'a, I>(buffers: I) -> Vec<Document>
where
    I: IntoIterator<Item = &'a [Document]>,
{
    let mut seen = HashSet::new();
    let mut merged = Vec::new();
    for document in buffers.into_iter().flatten() {
        if seen.insert(document.id().to_string()) {
            merged.push(document.clone());
        }
    }
    merged
}

// Latest full snapshot per query index.
#[derive(Default)]
struct ResultBuffer {
    results: BTreeMap<usize, Vec<Document>>,
    revision: u64,
}

impl ResultBuffer {
    fn replace(&mut self, index: usize, documents: Vec<Document>) -> (u64, Vec<Document>) {
        self.results.insert(index, documents);
        self.revision += 1;
        let merged = merge_snapshots(self.results.values().map(Vec::as_slice));
        (self.revision, merged)
    }
}

/// One logical subscription to a collection, fanned out over one stream per query.
///
/// Every stream writes into a shared buffer; the collection's published list is
/// recomputed from the whole buffer on each update. Dropping the subscription
/// cancels it.
pub(crate) struct CollectionSubscription {
    collection: String,
    generation: u64,
    state: SubscriberState,
    handles: Vec<Unsubscribe>,
    cancelled: bool,
}

impl CollectionSubscription {
    pub(crate) fn open(
        database: &dyn DocumentDatabase,
        collection: &str,
        queries: Vec<Query>,
        generation: u64,
        state: SubscriberState,
    ) -> Self {
        // Claim the slot before listening: databases may deliver the first
        // snapshot synchronously from `listen`.
        if !state.begin_collection(collection, generation) {
            log::debug!("`{collection}` already belongs to a newer generation than {generation}");
            return Self {
                collection: collection.to_string(),
                generation,
                state,
                handles: Vec::new(),
                cancelled: false,
            };
        }

        let buffer = Arc::new(Mutex::new(ResultBuffer::default()));
        let mut handles = Vec::with_capacity(queries.len());
        for (index, query) in queries.iter().enumerate() {
            let observer = stream_observer(collection, index, generation, &buffer, &state);
            match database.listen(query, observer) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    log::warn!("failed to listen to query {index} of `{collection}`: {err}");
                    state.publish_error(collection, generation, err.to_string());
                }
            }
        }
        log::debug!(
            "subscribed `{collection}` with {} of {} streams (generation {generation})",
            handles.len(),
            queries.len()
        );

        Self {
            collection: collection.to_string(),
            generation,
            state,
            handles,
            cancelled: false,
        }
    }

    pub(crate) fn collection(&self) -> &str {
        &self.collection
    }

    /// Number of live underlying streams.
    pub(crate) fn stream_count(&self) -> usize {
        self.handles.len()
    }

    /// Stops every underlying stream. Nothing from this generation reaches the
    /// state once this returns; what it already published stays.
    pub(crate) fn cancel(&mut self) {
        self.close(false);
    }

    /// Like [`cancel`](Self::cancel), but also withdraws this generation's
    /// published documents and error.
    pub(crate) fn discard(&mut self) {
        self.close(true);
    }

    fn close(&mut self, retract: bool) {
        if self.cancelled {
            return;
        }
        self.cancelled = true;
        if retract {
            self.state.retract_collection(&self.collection, self.generation);
        } else {
            self.state.end_collection(&self.collection, self.generation);
        }
        unsubscribe_all(std::mem::take(&mut self.handles))();
        log::debug!(
            "cancelled `{}` (generation {})",
            self.collection,
            self.generation
        );
    }
}

impl Drop for CollectionSubscription {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn stream_observer(
    collection: &str,
    index: usize,
    generation: u64,
    buffer: &Arc<Mutex<ResultBuffer>>,
    state: &SubscriberState,
) -> PartialObserver<QuerySnapshot> {
    let next_collection = collection.to_string();
    let next_buffer = Arc::clone(buffer);
    let next_state = state.clone();
    let error_collection = collection.to_string();
    let error_state = state.clone();

    PartialObserver::new()
        .with_next(move |snapshot: &QuerySnapshot| {
            let (revision, merged) = next_buffer
                .lock()
                .unwrap()
                .replace(index, snapshot.documents().to_vec());
            next_state.publish_documents(&next_collection, generation, revision, merged);
        })
        .with_error(move |err: &dyn Error| {
            log::warn!("stream {index} of `{error_collection}` failed: {err}");
            error_state.publish_error(&error_collection, generation, err.to_string());
        })
}
