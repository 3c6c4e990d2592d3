//! Integration test: Sled-backed message store.
//!
//! Verifies that:
//! 1. A combined create+append stores the first user message.
//! 2. Appends come back in arrival order with metadata intact.
//! 3. Title updates survive reopening the database.
//! 4. A conversation created with its first message reopens with both.
//! 5. A title update racing message appends is never lost.

use persona_core::{
    MessageStore, NewMessage, Role, SledMessageStore, SourceCitation, ToolCallRecord,
};
use std::sync::Arc;

#[tokio::test]
async fn messages_come_back_in_arrival_order() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledMessageStore::open_in(dir.path()).unwrap();

    let id = store
        .create_conversation("What is photosynthesis?", Some(NewMessage::user("What is photosynthesis?", Vec::new())))
        .await
        .unwrap();

    let call = ToolCallRecord::new("search_kb").with_query("photosynthesis", 3);
    store
        .append_message(
            &id,
            NewMessage::agent("Photosynthesis is...", vec![SourceCitation::titled("Biology 101")], vec![call.clone()]),
        )
        .await
        .unwrap();
    store
        .append_message(&id, NewMessage::user("And respiration?", Vec::new()))
        .await
        .unwrap();

    let msgs = store.messages(&id).await.unwrap();
    let roles: Vec<Role> = msgs.iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Agent, Role::User]);
    assert_eq!(msgs[1].tool_calls, vec![call]);
    assert_eq!(msgs[1].citations[0].title, "Biology 101");
    assert!(msgs[0].tool_calls.is_empty());
}

#[tokio::test]
async fn title_update_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = SledMessageStore::open_in(dir.path()).unwrap();
        let id = store.create_conversation("Provisional", None).await.unwrap();
        store.update_title(&id, "Photosynthesis Basics").await.unwrap();
        id
    };

    let store = SledMessageStore::open_in(dir.path()).unwrap();
    let conv = store.conversation(&id).await.unwrap().expect("conversation should exist");
    assert_eq!(conv.title, "Photosynthesis Basics");
    assert!(store.messages(&id).await.unwrap().is_empty());
}

#[tokio::test]
async fn append_to_missing_conversation_is_a_persistence_error() {
    let dir = tempfile::tempdir().unwrap();
    let store = SledMessageStore::open_in(dir.path()).unwrap();
    let err = store
        .append_message("nope", NewMessage::user("hi", Vec::new()))
        .await
        .unwrap_err();
    assert!(matches!(err, persona_core::ChatError::Persistence(_)));
}

#[tokio::test]
async fn created_conversation_reopens_with_first_message() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let store = SledMessageStore::open_in(dir.path()).unwrap();
        store
            .create_conversation("Hello", Some(NewMessage::user("Hello", Vec::new())))
            .await
            .unwrap()
    };

    let store = SledMessageStore::open_in(dir.path()).unwrap();
    let conv = store.conversation(&id).await.unwrap().expect("conversation should exist");
    assert_eq!(conv.title, "Hello");
    let msgs = store.messages(&id).await.unwrap();
    assert_eq!(msgs.len(), 1);
    assert_eq!(msgs[0].text, "Hello");
    assert_eq!(msgs[0].role, Role::User);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn title_update_racing_appends_is_kept() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(SledMessageStore::open_in(dir.path()).unwrap());

    for round in 0..5 {
        let id = store.create_conversation("Provisional", None).await.unwrap();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = Arc::clone(&store);
            let id = id.clone();
            tasks.push(tokio::spawn(async move {
                store
                    .append_message(&id, NewMessage::user(format!("message {}", i), Vec::new()))
                    .await
                    .unwrap();
            }));
        }
        let titled = {
            let store = Arc::clone(&store);
            let id = id.clone();
            tokio::spawn(async move { store.update_title(&id, "Photosynthesis Basics").await.unwrap() })
        };
        for task in tasks {
            task.await.unwrap();
        }
        titled.await.unwrap();

        let conv = store.conversation(&id).await.unwrap().unwrap();
        assert_eq!(conv.title, "Photosynthesis Basics", "round {}", round);
        assert!(conv.updated_at >= conv.created_at);
        assert_eq!(store.messages(&id).await.unwrap().len(), 8);
    }
}
