mod common;

use chrono::{TimeZone, Utc};

use sms_relay::Error;
use sms_relay::database::{MessageRepository, NewMessage};
use sms_relay::relay::ChannelKind;

fn new_message(reference: Option<u16>, total_parts: Option<u8>) -> NewMessage {
    NewMessage {
        sender: "+111".to_string(),
        timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap(),
        text: "hello".to_string(),
        reference,
        total_parts,
    }
}

#[tokio::test]
async fn test_create_and_get() {
    let repo = common::memory_repo().await;

    let id = repo.create(&new_message(Some(7), Some(2))).await.unwrap();
    let row = repo.get(id).await.unwrap();

    assert_eq!(row.sender, "+111");
    assert_eq!(row.message_text, "hello");
    assert_eq!(row.reference, Some(7));
    assert_eq!(row.total_parts, Some(2));
    assert!(!row.api_forwarded && !row.sms_forwarded && !row.email_forwarded);
    assert!(row.timestamp.starts_with("2025-03-01T10:00:00"));
    assert!(!row.created_at.is_empty());
}

#[tokio::test]
async fn test_ids_are_unique() {
    let repo = common::memory_repo().await;
    let a = repo.create(&new_message(None, None)).await.unwrap();
    let b = repo.create(&new_message(None, None)).await.unwrap();
    assert_ne!(a, b);
}

#[tokio::test]
async fn test_update_text() {
    let repo = common::memory_repo().await;
    let id = repo.create(&new_message(None, None)).await.unwrap();

    repo.update_text(id, "hello world").await.unwrap();
    assert_eq!(repo.get(id).await.unwrap().message_text, "hello world");
}

#[tokio::test]
async fn test_set_forwarded_is_idempotent_and_per_column() {
    let repo = common::memory_repo().await;
    let id = repo.create(&new_message(None, None)).await.unwrap();

    repo.set_forwarded(id, ChannelKind::Sms).await.unwrap();
    repo.set_forwarded(id, ChannelKind::Sms).await.unwrap();

    let row = repo.get(id).await.unwrap();
    assert!(row.sms_forwarded);
    assert!(!row.api_forwarded);
    assert!(!row.email_forwarded);

    repo.set_forwarded(id, ChannelKind::Api).await.unwrap();
    repo.set_forwarded(id, ChannelKind::Email).await.unwrap();
    assert!(repo.get(id).await.unwrap().is_fully_forwarded());
}

#[tokio::test]
async fn test_missing_id_is_not_found() {
    let repo = common::memory_repo().await;

    assert!(matches!(
        repo.update_text(42, "x").await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(
        repo.set_forwarded(42, ChannelKind::Api).await,
        Err(Error::NotFound { .. })
    ));
    assert!(matches!(repo.get(42).await, Err(Error::NotFound { .. })));
}
