//! Keeps a reactive, collection-keyed document state in sync with a real-time
//! document database, re-subscribing whenever the signed-in identity changes.
//!
//! ```
//! use std::sync::Arc;
//!
//! use firestore_subscriber::{
//!     IdentityCell, MemoryDatabase, SubscriptionCoordinator, SubscriptionSpec,
//! };
//! use serde_json::json;
//!
//! let database = MemoryDatabase::new();
//! let spec = SubscriptionSpec::from_json(&json!({
//!     "tasks": [
//!         [["owner", "==", "{userId}"]],
//!         [["shared_with", "array-contains", "{userId}"]]
//!     ]
//! }))
//! .unwrap();
//!
//! let identity = IdentityCell::new(None);
//! let coordinator =
//!     SubscriptionCoordinator::initialize(Some(Arc::new(database.clone())), spec, &identity);
//!
//! identity.sign_in("alice");
//! database
//!     .set_document("tasks", "t1", json!({"owner": "alice", "shared_with": ["alice"]}))
//!     .unwrap();
//!
//! let state = coordinator.current_state();
//! assert!(!state.loading());
//! assert_eq!(state.collection("tasks").unwrap().len(), 1);
//! ```

pub mod subscriber;
pub mod util;

pub use subscriber::*;
