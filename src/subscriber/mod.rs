//! Identity-aware, multi-query subscriptions merged into one observable state.
//!
//! A [`SubscriptionSpec`] lists the collections to follow and, per collection,
//! the filter groups whose results are merged. A [`SubscriptionCoordinator`]
//! watches an [`IdentitySource`] and rebuilds every subscription whenever the
//! signed-in identity changes, publishing into a [`SubscriberState`].

mod coordinator;
pub mod database;
pub mod error;
mod identity;
mod merger;
mod query_builder;
mod settings;
mod spec;
mod state;

pub use coordinator::{LifecyclePhase, SubscriptionCoordinator};
pub use database::{
    CollectionReference, Document, DocumentData, DocumentDatabase, FilterOperator, MemoryDatabase,
    Query, QuerySnapshot,
};
pub use error::{SubscriberError, SubscriberErrorCode, SubscriberResult};
pub use identity::{Identity, IdentityCell, IdentitySource};
pub use merger::merge_snapshots;
pub use query_builder::{build_queries, substitute_placeholder};
pub use settings::{SubscriberSettings, USER_ID_PLACEHOLDER};
pub use spec::{FieldFilter, FilterGroup, SubscriptionSpec};
pub use state::{StateChanges, StateSnapshot, SubscriberState};
