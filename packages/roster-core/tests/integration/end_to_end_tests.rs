//! Store and change feed working together.

use std::sync::Arc;
use std::time::Duration;

use roster_core::person::PERSON_TABLE;
use roster_core::{ChangeFeed, ChangeKind, FieldPatch, PersonDraft, PersonField, PersonTable};

/// Every write, whoever issues it, shows up on the feed in order.
#[tokio::test]
async fn test_long_poll_observes_writes_from_other_writers() {
    let feed = Arc::new(ChangeFeed::new(32));
    let table = Arc::new(PersonTable::new(feed.clone()));
    let cursor = feed.head().unwrap();

    let writer = table.clone();
    let handle = tokio::task::spawn_blocking(move || {
        std::thread::sleep(Duration::from_millis(20));
        let person = writer.create(PersonDraft::new("Ada", "Lovelace", 36)).unwrap();
        writer
            .update(&person.id, &FieldPatch::parse_input(PersonField::FirstName, "Augusta").unwrap())
            .unwrap();
    });

    let first = feed.wait_since(cursor, Duration::from_secs(5)).await.unwrap();
    assert!(first.has_changes());
    assert_eq!(first.events[0].kind, ChangeKind::Insert);
    assert_eq!(first.events[0].table, PERSON_TABLE);

    handle.await.unwrap();
    let rest = feed.since(cursor).unwrap();
    assert_eq!(rest.events.len(), 2);
    assert_eq!(rest.events[1].kind, ChangeKind::Update);
    assert_eq!(table.find_many()[0].first_name, "Augusta");
}

/// Subscribers attached through the broadcast channel see live events.
#[tokio::test]
async fn test_broadcast_subscriber_receives_events() {
    let feed = Arc::new(ChangeFeed::new(8));
    let table = PersonTable::new(feed.clone());
    let mut rx = feed.subscribe();

    let person = table.create(PersonDraft::new("Grace", "Hopper", 85)).unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event.record_id, person.id);
    assert_eq!(event.seq, 1);
}
