#![cfg(not(target_arch = "wasm32"))]

use std::sync::Arc;
use std::time::Duration;

use firestore_subscriber::{
    FieldFilter, Identity, LifecyclePhase, MemoryDatabase, SubscriberSettings,
    SubscriptionCoordinator, SubscriptionSpec,
};
use serde_json::json;

fn coordinator(database: &MemoryDatabase) -> SubscriptionCoordinator {
    let spec = SubscriptionSpec::new().collection(
        "notes",
        vec![vec![FieldFilter::new("author", "==", "{userId}")]],
    );
    SubscriptionCoordinator::new(
        Some(Arc::new(database.clone())),
        spec,
        SubscriberSettings::default(),
    )
}

fn seeded() -> MemoryDatabase {
    let database = MemoryDatabase::new();
    database
        .set_document("notes", "n1", json!({"author": "ana"}))
        .unwrap();
    database
        .set_document("notes", "n2", json!({"author": "ben"}))
        .unwrap();
    database
}

#[tokio::test]
async fn drive_applies_every_identity_in_order() {
    let database = seeded();
    let coordinator = coordinator(&database);

    let identities = futures::stream::iter(vec![
        Some(Identity::new("ana")),
        None,
        Some(Identity::new("ben")),
    ]);
    coordinator.drive(identities).await;

    assert_eq!(
        coordinator.phase(),
        LifecyclePhase::Subscribed {
            uid: "ben".to_string()
        }
    );
    let state = coordinator.current_state();
    let notes = state.collection("notes").unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id(), "n2");
    assert_eq!(database.active_listeners(), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn channel_driven_identity_updates_state_feed() {
    let database = seeded();
    let coordinator = coordinator(&database);
    let changes = coordinator.state().changes();

    let (sender, receiver) = async_channel::unbounded();
    let driver = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.drive(receiver).await })
    };

    sender.send(Some(Identity::new("ana"))).await.unwrap();

    let published = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match changes.next().await {
                Some(state) if state.collection("notes").is_some() => break state,
                Some(_) => continue,
                None => panic!("state feed closed"),
            }
        }
    })
    .await
    .expect("state published");
    assert!(!published.loading());
    assert_eq!(published.collection("notes").unwrap()[0].id(), "n1");

    sender.send(None).await.unwrap();
    sender.close();
    driver.await.unwrap();

    let state = coordinator.current_state();
    assert!(state.loading());
    assert!(state.collections().is_empty());
    assert_eq!(database.active_listeners(), 0);
}
