//! Follows a user's tasks across sign-in, account switch and sign-out.
//!
//! Uses the in-memory database so it runs without a backend. The subscription merges
//! tasks the user owns with tasks shared with them; every state change is
//! printed as the flat JSON view a UI layer would bind to.

use std::sync::Arc;

use firestore_subscriber::util::PartialObserver;
use firestore_subscriber::{
    Identity, MemoryDatabase, StateSnapshot, SubscriptionCoordinator, SubscriptionSpec,
};
use serde_json::json;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let database = MemoryDatabase::new();
    database.set_document(
        "tasks",
        "t1",
        json!({"title": "write report", "owner": "ana", "shared_with": []}),
    )?;
    database.set_document(
        "tasks",
        "t2",
        json!({"title": "review PR", "owner": "ben", "shared_with": ["ana"]}),
    )?;
    database.set_document(
        "tasks",
        "t3",
        json!({"title": "plan sprint", "owner": "ana", "shared_with": ["ben"]}),
    )?;

    let spec = SubscriptionSpec::from_json_str(
        r#"{
            "tasks": [
                [["owner", "==", "{userId}"]],
                [["shared_with", "array-contains", "{userId}"]]
            ]
        }"#,
    )?;

    let coordinator = SubscriptionCoordinator::new(
        Some(Arc::new(database.clone())),
        spec,
        Default::default(),
    );
    let _observer = coordinator.state().subscribe(PartialObserver::new().with_next(
        |state: &StateSnapshot| match serde_json::to_string(state) {
            Ok(text) => println!("state: {text}"),
            Err(err) => eprintln!("cannot render state: {err}"),
        },
    ));

    let (sender, receiver) = async_channel::unbounded();
    sender.send(Some(Identity::new("ana"))).await?;
    sender.send(Some(Identity::new("ben"))).await?;
    sender.send(None).await?;
    sender.close();

    coordinator.drive(receiver).await;
    println!("final phase: {:?}", coordinator.phase());
    Ok(())
}
