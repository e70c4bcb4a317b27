use std::error::Error;
use std::sync::Arc;

pub type NextFn<T> = Arc<dyn Fn(&T) + Send + Sync + 'static>;
pub type ErrorFn = Arc<dyn Fn(&dyn Error) + Send + Sync + 'static>;

/// Callback bundle handed to anything that produces a sequence of values.
///
/// Both halves are optional; a missing half silently drops the corresponding
/// notification.
#[derive(Clone)]
pub struct PartialObserver<T> {
    pub next: Option<NextFn<T>>,
    pub error: Option<ErrorFn>,
}

impl<T> PartialObserver<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_next<F>(mut self, callback: F) -> Self
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.next = Some(Arc::new(callback));
        self
    }

    pub fn with_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&dyn Error) + Send + Sync + 'static,
    {
        self.error = Some(Arc::new(callback));
        self
    }

    /// Delivers `value` to the `next` callback if one is registered.
    pub fn notify_next(&self, value: &T) {
        if let Some(next) = &self.next {
            next(value);
        }
    }

    /// Delivers `error` to the `error` callback if one is registered.
    pub fn notify_error(&self, error: &dyn Error) {
        if let Some(callback) = &self.error {
            callback(error);
        }
    }
}

impl<T> Default for PartialObserver<T> {
    fn default() -> Self {
        Self {
            next: None,
            error: None,
        }
    }
}

/// Cancellation handle returned by every registration in this crate.
pub type Unsubscribe = Box<dyn FnOnce() + Send + 'static>;

/// Combines several cancellation handles into one that runs them in order.
pub fn unsubscribe_all(handles: Vec<Unsubscribe>) -> Unsubscribe {
    Box::new(move || {
        for handle in handles {
            handle();
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn missing_callbacks_are_ignored() {
        let observer: PartialObserver<u32> = PartialObserver::new();
        observer.notify_next(&1);
    }

    #[test]
    fn combined_unsubscribe_runs_in_order() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<Unsubscribe> = (0..3)
            .map(|index| {
                let calls = Arc::clone(&calls);
                Box::new(move || calls.lock().unwrap().push(index)) as Unsubscribe
            })
            .collect();

        unsubscribe_all(handles)();
        assert_eq!(*calls.lock().unwrap(), vec![0, 1, 2]);
    }
}
