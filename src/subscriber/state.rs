//! Published state: the merged documents of every followed collection plus
//! `loading` and error bookkeeping, observable by the embedding application.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use async_channel::{Receiver, Sender};
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::util::{PartialObserver, Unsubscribe};

use super::database::Document;

const LOADING_KEY: &str = "loading";
const ERROR_KEY: &str = "error";

/// Read-only view of the published state at one point in time.
#[derive(Clone, Debug, PartialEq)]
pub struct StateSnapshot {
    collections: BTreeMap<String, Vec<Document>>,
    loading: bool,
    errors: BTreeMap<String, String>,
    last_error: Option<String>,
}

impl Default for StateSnapshot {
    fn default() -> Self {
        Self {
            collections: BTreeMap::new(),
            loading: true,
            errors: BTreeMap::new(),
            last_error: None,
        }
    }
}

impl StateSnapshot {
    /// Merged documents published for `name`, if any snapshot has arrived.
    pub fn collection(&self, name: &str) -> Option<&[Document]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    pub fn collections(&self) -> &BTreeMap<String, Vec<Document>> {
        &self.collections
    }

    pub fn loading(&self) -> bool {
        self.loading
    }

    /// Most recently reported stream error across all collections.
    pub fn error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Error reported for a specific collection.
    pub fn collection_error(&self, name: &str) -> Option<&str> {
        self.errors.get(name).map(String::as_str)
    }

    pub fn errors(&self) -> &BTreeMap<String, String> {
        &self.errors
    }
}

/// Serializes to `{ "<collection>": [...], "loading": bool, "error": string | null }`.
/// Collections named `loading` or `error` are omitted from this flat view.
impl Serialize for StateSnapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        for (name, documents) in &self.collections {
            if name != LOADING_KEY && name != ERROR_KEY {
                map.serialize_entry(name, documents)?;
            }
        }
        map.serialize_entry(LOADING_KEY, &self.loading)?;
        map.serialize_entry(ERROR_KEY, &self.last_error)?;
        map.end()
    }
}

// Ownership tag for one collection's slot. Writes carrying another generation,
// or an older revision, are stale and dropped.
#[derive(Clone, Copy, Debug)]
struct CollectionSlot {
    generation: u64,
    revision: u64,
}

#[derive(Default)]
struct StateData {
    snapshot: StateSnapshot,
    slots: BTreeMap<String, CollectionSlot>,
    // Generations at or below this were handed out before the latest reset.
    floor: u64,
}

#[derive(Default)]
struct StateInner {
    data: Mutex<StateData>,
    observers: Mutex<Vec<(u64, PartialObserver<StateSnapshot>)>>,
    observer_counter: AtomicU64,
}

/// Observable container holding the published state of one coordinator.
#[derive(Clone, Default)]
pub struct SubscriberState {
    inner: Arc<StateInner>,
}

impl SubscriberState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the current state.
    pub fn snapshot(&self) -> StateSnapshot {
        self.inner.data.lock().unwrap().snapshot.clone()
    }

    /// Registers an observer invoked with the new state after every change.
    pub fn subscribe(&self, observer: PartialObserver<StateSnapshot>) -> Unsubscribe {
        let id = self.inner.observer_counter.fetch_add(1, Ordering::SeqCst);
        self.inner.observers.lock().unwrap().push((id, observer));

        let inner: Weak<StateInner> = Arc::downgrade(&self.inner);
        Box::new(move || {
            if let Some(inner) = inner.upgrade() {
                inner
                    .observers
                    .lock()
                    .unwrap()
                    .retain(|(observer_id, _)| *observer_id != id);
            }
        })
    }

    /// Returns an async feed of state changes. The feed stops when dropped.
    pub fn changes(&self) -> StateChanges {
        let (sender, receiver): (Sender<StateSnapshot>, Receiver<StateSnapshot>) =
            async_channel::unbounded();
        let unsubscribe = self.subscribe(PartialObserver::new().with_next(
            move |snapshot: &StateSnapshot| {
                let _ = sender.try_send(snapshot.clone());
            },
        ));
        StateChanges {
            receiver,
            unsubscribe: Some(unsubscribe),
        }
    }

    /// Drops every collection and error published by generations up to
    /// `floor` and sets `loading`. A reset older than the last one is ignored.
    pub(crate) fn reset(&self, floor: u64) {
        self.mutate(|data| {
            if floor < data.floor {
                return false;
            }
            data.floor = floor;
            data.slots.retain(|_, slot| slot.generation > floor);
            let slots = &data.slots;
            let snapshot = &mut data.snapshot;
            snapshot.collections.retain(|name, _| slots.contains_key(name));
            snapshot.errors.retain(|name, _| slots.contains_key(name));
            if snapshot.errors.is_empty() {
                snapshot.last_error = None;
            }
            snapshot.loading = snapshot.collections.is_empty() && snapshot.errors.is_empty();
            true
        });
    }

    /// Hands the `collection` slot to `generation`, discarding what an earlier
    /// generation published there. Refused if the slot belongs to a newer
    /// generation or `generation` predates the last reset.
    pub(crate) fn begin_collection(&self, collection: &str, generation: u64) -> bool {
        let mut claimed = false;
        self.mutate(|data| {
            if generation <= data.floor {
                return false;
            }
            if let Some(slot) = data.slots.get(collection) {
                if slot.generation > generation {
                    return false;
                }
            }
            claimed = true;
            data.slots.insert(
                collection.to_string(),
                CollectionSlot {
                    generation,
                    revision: 0,
                },
            );
            let had_documents = data.snapshot.collections.remove(collection).is_some();
            let had_error = data.snapshot.errors.remove(collection).is_some();
            had_documents || had_error
        });
        claimed
    }

    /// Releases the slot if `generation` still owns it. Published data stays.
    pub(crate) fn end_collection(&self, collection: &str, generation: u64) {
        let mut data = self.inner.data.lock().unwrap();
        if owns(&data, collection, generation) {
            data.slots.remove(collection);
        }
    }

    /// Releases the slot and removes whatever `generation` published there.
    pub(crate) fn retract_collection(&self, collection: &str, generation: u64) {
        self.mutate(|data| {
            if !owns(data, collection, generation) {
                return false;
            }
            data.slots.remove(collection);
            data.snapshot.collections.remove(collection);
            data.snapshot.errors.remove(collection);
            if data.snapshot.errors.is_empty() {
                data.snapshot.last_error = None;
                if data.snapshot.collections.is_empty() {
                    data.snapshot.loading = true;
                }
            }
            true
        });
    }

    /// Publishes merged documents. Returns `false` if the write was stale.
    pub(crate) fn publish_documents(
        &self,
        collection: &str,
        generation: u64,
        revision: u64,
        documents: Vec<Document>,
    ) -> bool {
        self.mutate(|data| {
            let Some(slot) = data.slots.get_mut(collection) else {
                return false;
            };
            if slot.generation != generation || revision <= slot.revision {
                return false;
            }
            slot.revision = revision;
            data.snapshot
                .collections
                .insert(collection.to_string(), documents);
            data.snapshot.loading = false;
            true
        })
    }

    /// Records a stream failure for `collection`. Returns `false` if stale.
    pub(crate) fn publish_error(&self, collection: &str, generation: u64, message: String) -> bool {
        self.mutate(|data| {
            if !owns(data, collection, generation) {
                return false;
            }
            data.snapshot
                .errors
                .insert(collection.to_string(), message.clone());
            data.snapshot.last_error = Some(message);
            data.snapshot.loading = false;
            true
        })
    }

    // Applies `change` under the lock; observers run after the lock is released.
    fn mutate<F>(&self, change: F) -> bool
    where
        F: FnOnce(&mut StateData) -> bool,
    {
        let snapshot = {
            let mut data = self.inner.data.lock().unwrap();
            if !change(&mut data) {
                return false;
            }
            data.snapshot.clone()
        };

        let observers: Vec<PartialObserver<StateSnapshot>> = self
            .inner
            .observers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer.notify_next(&snapshot);
        }
        true
    }
}

fn owns(data: &StateData, collection: &str, generation: u64) -> bool {
    data.slots
        .get(collection)
        .map(|slot| slot.generation == generation)
        .unwrap_or(false)
}

/// Async feed returned by [`SubscriberState::changes`].
pub struct StateChanges {
    receiver: Receiver<StateSnapshot>,
    unsubscribe: Option<Unsubscribe>,
}

impl StateChanges {
    /// Waits for the next state change.
    pub async fn next(&self) -> Option<StateSnapshot> {
        self.receiver.recv().await.ok()
    }

    /// Returns a change that is already queued, without waiting.
    pub fn try_next(&self) -> Option<StateSnapshot> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for StateChanges {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.take() {
            unsubscribe();
        }
    }
}
