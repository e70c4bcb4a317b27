pub mod subscribe;

pub use subscribe::{unsubscribe_all, PartialObserver, Unsubscribe};
