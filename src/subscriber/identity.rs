//! Identity-change sources that drive the coordinator's lifecycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::util::{PartialObserver, Unsubscribe};

/// The signed-in principal. Only the stable identifier matters here.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    uid: String,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into() }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }
}

/// Something that reports sign-in and sign-out events.
///
/// `None` means signed out. Implementations decide whether the current value is
/// delivered on registration.
pub trait IdentitySource: Send + Sync {
    fn on_identity_changed(&self, observer: PartialObserver<Option<Identity>>) -> Unsubscribe;
}

#[derive(Default)]
struct CellInner {
    current: Mutex<Option<Identity>>,
    observers: Mutex<Vec<(u64, PartialObserver<Option<Identity>>)>>,
    observer_counter: AtomicU64,
}

/// A watchable identity value.
///
/// Observers get the current value as soon as they register and every value
/// passed to [`IdentityCell::set`] afterwards.
#[derive(Clone, Default)]
pub struct IdentityCell {
    inner: Arc<CellInner>,
}

impl IdentityCell {
    pub fn new(initial: Option<Identity>) -> Self {
        let cell = Self::default();
        *cell.inner.current.lock().unwrap() = initial;
        cell
    }

    pub fn current(&self) -> Option<Identity> {
        self.inner.current.lock().unwrap().clone()
    }

    pub fn sign_in(&self, uid: impl Into<String>) {
        self.set(Some(Identity::new(uid)));
    }

    pub fn sign_out(&self) {
        self.set(None);
    }

    /// Stores `identity` and notifies every observer.
    pub fn set(&self, identity: Option<Identity>) {
        *self.inner.current.lock().unwrap() = identity.clone();
        let observers: Vec<PartialObserver<Option<Identity>>> = self
            .inner
            .observers
            .lock()
            .unwrap()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer.notify_next(&identity);
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().unwrap().len()
    }
}

impl IdentitySource for IdentityCell {
    fn on_identity_changed(&self, observer: PartialObserver<Option<Identity>>) -> Unsubscribe {
        let id = self.inner.observer_counter.fetch_add(1, Ordering::SeqCst);
        self.inner
            .observers
            .lock()
            .unwrap()
            .push((id, observer.clone()));
        observer.notify_next(&self.current());

        let inner: Weak<CellInner> = Arc::downgrade(&self.inner);
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_delivers_current_value_then_changes() {
        let cell = IdentityCell::new(Some(Identity::new("alice")));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&seen);

        let unsubscribe = cell.on_identity_changed(PartialObserver::new().with_next(
            move |identity: &Option<Identity>| {
                captured
                    .lock()
                    .unwrap()
                    .push(identity.as_ref().map(|id| id.uid().to_string()));
            },
        ));
        cell.sign_out();
        cell.sign_in("bob");
        unsubscribe();
        cell.sign_in("carol");

        assert_eq!(
            *seen.lock().unwrap(),
            vec![Some("alice".to_string()), None, Some("bob".to_string())]
        );
        assert_eq!(cell.observer_count(), 0);
        assert_eq!(cell.current(), Some(Identity::new("carol")));
    }
}
