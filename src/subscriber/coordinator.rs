use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, Weak};

use futures::{Stream, StreamExt};

use crate::util::{PartialObserver, Unsubscribe};

use super::database::DocumentDatabase;
use super::identity::{Identity, IdentitySource};
use super::merger::CollectionSubscription;
use super::query_builder::build_queries;
use super::settings::SubscriberSettings;
use super::spec::SubscriptionSpec;
use super::state::{StateSnapshot, SubscriberState};

/// Where the coordinator is in its sign-in lifecycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// No identity; nothing subscribed.
    Idle,
    /// Subscriptions are open for `uid`.
    Subscribed { uid: String },
}

struct Lifecycle {
    phase: LifecyclePhase,
    active: BTreeMap<String, CollectionSubscription>,
    // Bumped on every transition so a superseded transition can detect it lost.
    epoch: u64,
    // Last collection generation handed out. Only advanced under this lock.
    generation: u64,
}

impl Lifecycle {
    // Next generation for a transition started at `epoch`, unless a newer
    // transition has begun since.
    fn next_generation(&mut self, epoch: u64) -> Option<u64> {
        if self.epoch != epoch {
            return None;
        }
        self.generation += 1;
        Some(self.generation)
    }
}

struct CoordinatorInner {
    database: Option<Arc<dyn DocumentDatabase>>,
    spec: SubscriptionSpec,
    settings: SubscriberSettings,
    state: SubscriberState,
    lifecycle: Mutex<Lifecycle>,
    identity_registration: Mutex<Option<Unsubscribe>>,
}

/// Keeps one merged, deduplicated document list per collection in sync with the
/// signed-in identity.
///
/// Every identity notification tears down all open subscriptions and, if an
/// identity is present, rebuilds them with the identity substituted into the
/// filters. Results are published to a [`SubscriberState`].
///
/// ```
/// use firestore_subscriber::{
///     FieldFilter, IdentityCell, MemoryDatabase, SubscriptionCoordinator, SubscriptionSpec,
/// };
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let database = MemoryDatabase::new();
/// database.set_document("tasks", "t1", json!({"owner": "alice"})).unwrap();
///
/// let spec = SubscriptionSpec::new().collection(
///     "tasks",
///     vec![vec![FieldFilter::new("owner", "==", "{userId}")]],
/// );
/// let identity = IdentityCell::new(None);
/// let coordinator =
///     SubscriptionCoordinator::initialize(Some(Arc::new(database)), spec, &identity);
/// assert!(coordinator.current_state().loading());
///
/// identity.sign_in("alice");
/// let state = coordinator.current_state();
/// assert_eq!(state.collection("tasks").unwrap()[0].id(), "t1");
/// ```
#[derive(Clone)]
pub struct SubscriptionCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl SubscriptionCoordinator {
    /// Creates an idle coordinator. Nothing happens until an identity arrives
    /// through [`attach`](Self::attach), [`set_identity`](Self::set_identity) or
    /// [`drive`](Self::drive).
    ///
    /// Without a database the coordinator stays idle and reports an empty,
    /// loading state.
    pub fn new(
        database: Option<Arc<dyn DocumentDatabase>>,
        spec: SubscriptionSpec,
        settings: SubscriberSettings,
    ) -> Self {
        if database.is_none() {
            log::warn!("subscription coordinator created without a database; staying idle");
        }
        Self {
            inner: Arc::new(CoordinatorInner {
                database,
                spec,
                settings,
                state: SubscriberState::new(),
                lifecycle: Mutex::new(Lifecycle {
                    phase: LifecyclePhase::Idle,
                    active: BTreeMap::new(),
                    epoch: 0,
                    generation: 0,
                }),
                identity_registration: Mutex::new(None),
            }),
        }
    }

    /// Creates a coordinator with default settings and starts listening to
    /// `identity` right away.
    pub fn initialize(
        database: Option<Arc<dyn DocumentDatabase>>,
        spec: SubscriptionSpec,
        identity: &dyn IdentitySource,
    ) -> Self {
        let coordinator = Self::new(database, spec, SubscriberSettings::default());
        coordinator.attach(identity);
        coordinator
    }

    /// Starts following `source`, replacing any previously attached source.
    pub fn attach(&self, source: &dyn IdentitySource) {
        self.detach();

        let next_inner = Arc::downgrade(&self.inner);
        let observer = PartialObserver::new()
            .with_next(move |identity: &Option<Identity>| {
                if let Some(inner) = Weak::upgrade(&next_inner) {
                    inner.apply_identity(identity.as_ref());
                }
            })
            .with_error(|err: &dyn std::error::Error| {
                log::warn!("identity source reported an error: {err}");
            });

        let registration = source.on_identity_changed(observer);
        let previous = self
            .inner
            .identity_registration
            .lock()
            .unwrap()
            .replace(registration);
        if let Some(previous) = previous {
            previous();
        }
    }

    /// Stops following the attached identity source. Open subscriptions stay.
    pub fn detach(&self) {
        let registration = self.inner.identity_registration.lock().unwrap().take();
        if let Some(unsubscribe) = registration {
            unsubscribe();
        }
    }

    /// Applies an identity change directly.
    pub fn set_identity(&self, identity: Option<Identity>) {
        self.inner.apply_identity(identity.as_ref());
    }

    /// Applies every identity yielded by `identities` until the stream ends.
    pub async fn drive<S>(&self, identities: S)
    where
        S: Stream<Item = Option<Identity>>,
    {
        futures::pin_mut!(identities);
        while let Some(identity) = identities.next().await {
            self.set_identity(identity);
        }
    }

    /// Detaches the identity source, cancels all subscriptions and resets the state.
    pub fn shutdown(&self) {
        self.detach();
        self.inner.apply_identity(None);
    }

    /// Read-only copy of the published state.
    pub fn current_state(&self) -> StateSnapshot {
        self.inner.state.snapshot()
    }

    /// The observable state container, for registering change observers.
    pub fn state(&self) -> &SubscriberState {
        &self.inner.state
    }

    pub fn spec(&self) -> &SubscriptionSpec {
        &self.inner.spec
    }

    pub fn settings(&self) -> &SubscriberSettings {
        &self.inner.settings
    }

    pub fn phase(&self) -> LifecyclePhase {
        self.inner.lifecycle.lock().unwrap().phase.clone()
    }

    /// Collections with an open subscription.
    pub fn active_collections(&self) -> Vec<String> {
        self.inner
            .lifecycle
            .lock()
            .unwrap()
            .active
            .keys()
            .cloned()
            .collect()
    }

    /// Number of live streams behind `collection`, if it is subscribed.
    pub fn stream_count(&self, collection: &str) -> Option<usize> {
        self.inner
            .lifecycle
            .lock()
            .unwrap()
            .active
            .get(collection)
            .map(CollectionSubscription::stream_count)
    }
}

impl CoordinatorInner {
    fn apply_identity(&self, identity: Option<&Identity>) {
        let (epoch, floor, previous) = {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            lifecycle.epoch += 1;
            lifecycle.phase = LifecyclePhase::Idle;
            (
                lifecycle.epoch,
                lifecycle.generation,
                std::mem::take(&mut lifecycle.active),
            )
        };

        self.teardown(previous, floor);

        let (Some(identity), Some(database)) = (identity, self.database.as_deref()) else {
            if identity.is_none() {
                log::info!("identity cleared; all subscriptions closed");
            }
            return;
        };

        log::info!("subscribing {} collections for {}", self.spec.len(), identity.uid());
        let mut opened = BTreeMap::new();
        let mut superseded = false;
        for (collection, groups) in self.spec.iter() {
            // Observers may re-enter during `open`; stop once a newer
            // transition owns the state.
            let Some(generation) = self.lifecycle.lock().unwrap().next_generation(epoch) else {
                superseded = true;
                break;
            };
            match build_queries(
                database,
                collection,
                groups,
                identity.uid(),
                &self.settings,
            ) {
                Ok(queries) => {
                    let subscription = CollectionSubscription::open(
                        database,
                        collection,
                        queries,
                        generation,
                        self.state.clone(),
                    );
                    opened.insert(collection.to_string(), subscription);
                }
                Err(err) => {
                    log::warn!("cannot build queries for `{collection}`: {err}");
                    if self.state.begin_collection(collection, generation) {
                        self.state
                            .publish_error(collection, generation, err.to_string());
                        self.state.end_collection(collection, generation);
                    }
                }
            }
        }

        if !superseded {
            let mut lifecycle = self.lifecycle.lock().unwrap();
            if lifecycle.epoch == epoch {
                lifecycle.active = std::mem::take(&mut opened);
                lifecycle.phase = LifecyclePhase::Subscribed {
                    uid: identity.uid().to_string(),
                };
            }
        }

        if !opened.is_empty() {
            log::debug!(
                "identity changed while subscribing; discarding {} subscriptions",
                opened.len()
            );
            for (_, mut subscription) in opened {
                subscription.discard();
            }
        }
    }

    // Cancels every subscription first, then clears what generations up to
    // `floor` published.
    fn teardown(&self, previous: BTreeMap<String, CollectionSubscription>, floor: u64) {
        for (_, mut subscription) in previous {
            log::debug!("closing `{}`", subscription.collection());
            subscription.cancel();
        }
        self.state.reset(floor);
    }
}

impl Drop for CoordinatorInner {
    fn drop(&mut self) {
        if let Ok(mut registration) = self.identity_registration.lock() {
            if let Some(unsubscribe) = registration.take() {
                unsubscribe();
            }
        }
    }
}
