mod common;

use client::{ClientError, PollConfig, PollingLoop, TickOutcome, Visibility};
use common::{FakeGateway, message, store, thread_detail};
use serde_json::json;

fn ids(messages: &[shared::models::Message]) -> Vec<&str> {
    messages.iter().map(|m| m.id.as_str()).collect()
}

#[tokio::test]
async fn test_selecting_thread_clears_unread_before_mark_read_settles() {
    let gateway = FakeGateway::new();
    gateway.set_threads(json!([{ "id": "t1", "unreadCount": 3, "lastMessageSnippet": "hello" }]));
    gateway.set_unread(json!({ "success": true, "data": { "unread": 3 } }));
    gateway.set_detail(
        "t1",
        thread_detail("t1", json!([message("m1", "hello", "2025-03-08T09:00:00Z", "d1")])),
    );
    gateway.fail("mark_read");
    let mark_read = gateway.gate("mark_read");
    let store = store(&gateway);

    assert_eq!(store.refresh_unread_count().await.unwrap(), 3);
    store.load_threads(None).await.unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.active_thread_id.as_deref(), Some("t1"));
    assert_eq!(state.threads[0].unread_count, 0);
    assert_eq!(state.unread_total, 0);
    assert_eq!(ids(&state.messages), ["m1"]);

    gateway.wait_for("mark_read", 1).await;
    mark_read.add_permits(1);
    gateway.wait_for("unread_count", 2).await;

    let state = store.snapshot().await;
    assert_eq!(state.threads[0].unread_count, 0);
    assert!(state.pane_error.is_none());
}

#[tokio::test]
async fn test_stale_poll_does_not_touch_new_selection() {
    let gateway = FakeGateway::new();
    gateway.set_detail(
        "t1",
        thread_detail("t1", json!([message("m1", "from t1", "2025-03-08T09:00:00Z", "d1")])),
    );
    gateway.set_detail(
        "t2",
        thread_detail("t2", json!([message("m2", "from t2", "2025-03-08T09:30:00Z", "d1")])),
    );
    gateway.set_messages(
        "t1",
        json!([
            message("m1", "from t1", "2025-03-08T09:00:00Z", "d1"),
            message("m3", "late t1", "2025-03-08T10:00:00Z", "d1")
        ]),
    );
    let store = store(&gateway);
    store.select_thread("t1").await.unwrap();

    let gate = gateway.gate("list_messages");
    let poller = PollingLoop::new(store.clone(), Visibility::new(), PollConfig::default());
    let tick = tokio::spawn({
        let poller = poller.clone();
        async move { poller.tick_once().await }
    });

    gateway.wait_for("list_messages", 1).await;
    store.select_thread("t2").await.unwrap();
    gate.add_permits(1);

    assert_eq!(tick.await.unwrap(), TickOutcome::Discarded);
    let state = store.snapshot().await;
    assert_eq!(state.active_thread_id.as_deref(), Some("t2"));
    assert_eq!(ids(&state.messages), ["m2"]);
}

#[tokio::test]
async fn test_superseded_selection_is_discarded() {
    let gateway = FakeGateway::new();
    gateway.set_detail(
        "t1",
        thread_detail("t1", json!([message("m1", "from t1", "2025-03-08T09:00:00Z", "d1")])),
    );
    gateway.set_detail(
        "t2",
        thread_detail("t2", json!([message("m2", "from t2", "2025-03-08T09:30:00Z", "d1")])),
    );
    let store = store(&gateway);
    let gate = gateway.gate("get_thread");

    let first = tokio::spawn({
        let store = store.clone();
        async move { store.select_thread("t1").await }
    });
    gateway.wait_for("get_thread", 1).await;
    let second = tokio::spawn({
        let store = store.clone();
        async move { store.select_thread("t2").await }
    });
    gateway.wait_for("get_thread", 2).await;

    gate.add_permits(2);
    first.await.unwrap().unwrap();
    second.await.unwrap().unwrap();

    let state = store.snapshot().await;
    assert_eq!(state.active_thread_id.as_deref(), Some("t2"));
    assert_eq!(ids(&state.messages), ["m2"]);
}

#[tokio::test]
async fn test_failed_reload_keeps_previous_data() {
    let gateway = FakeGateway::new();
    gateway.set_threads(json!({ "data": [{ "id": "t1" }, { "id": "t2" }] }));
    gateway.set_detail(
        "t1",
        thread_detail("t1", json!([message("m1", "hi", "2025-03-08T09:00:00Z", "d1")])),
    );
    let store = store(&gateway);
    store.load_threads(None).await.unwrap();

    gateway.fail("list_threads");
    let err = store.load_threads(None).await.unwrap_err();
    assert!(err.is_retryable());

    let state = store.snapshot().await;
    assert_eq!(state.threads.len(), 2);
    assert_eq!(state.active_thread_id.as_deref(), Some("t1"));
    assert_eq!(ids(&state.messages), ["m1"]);
    let banner = state.list_error.unwrap();
    assert!(banner.retryable);
    assert_eq!(banner.message, "request timed out");

    store.dismiss_error().await;
    assert!(store.snapshot().await.list_error.is_none());

    gateway.recover("list_threads");
    store.load_threads(None).await.unwrap();
    assert!(store.snapshot().await.list_error.is_none());
}

#[tokio::test]
async fn test_rejected_token_marks_session_expired() {
    let gateway = FakeGateway::new();
    gateway.reject_token("list_threads");
    let store = store(&gateway);

    let err = store.load_threads(None).await.unwrap_err();
    assert!(matches!(err, ClientError::SessionExpired));
    let state = store.snapshot().await;
    assert!(state.session_expired);
    assert!(!state.list_error.unwrap().retryable);
}

#[tokio::test]
async fn test_selection_survives_reload_and_falls_back() {
    let gateway = FakeGateway::new();
    gateway.set_threads(json!([{ "id": "t1" }, { "id": "t2" }]));
    let store = store(&gateway);

    store.load_threads(None).await.unwrap();
    assert_eq!(store.active_thread_id().await.as_deref(), Some("t1"));

    store.select_thread("t2").await.unwrap();
    store.load_threads(None).await.unwrap();
    assert_eq!(store.active_thread_id().await.as_deref(), Some("t2"));

    gateway.set_threads(json!([{ "id": "t3" }]));
    store.load_threads(None).await.unwrap();
    assert_eq!(store.active_thread_id().await.as_deref(), Some("t3"));

    gateway.set_threads(json!([]));
    let generation = store.generation();
    store.load_threads(None).await.unwrap();
    let state = store.snapshot().await;
    assert!(state.active_thread_id.is_none());
    assert!(state.messages.is_empty());
    assert!(store.generation() > generation);
}

#[tokio::test]
async fn test_browsing_threads_leaves_selection_alone() {
    let gateway = FakeGateway::new();
    gateway.set_threads(json!([{ "id": "t1", "unreadCount": 2 }, { "id": "t2" }]));
    let store = store(&gateway);

    let threads = store.browse_threads(None).await.unwrap();
    assert_eq!(threads.len(), 2);
    let state = store.snapshot().await;
    assert!(state.active_thread_id.is_none());
    assert_eq!(state.threads[0].unread_count, 2);
    assert_eq!(store.generation(), 0);
    assert_eq!(gateway.count("get_thread"), 0);
    assert_eq!(gateway.count("mark_read"), 0);
}

#[tokio::test]
async fn test_search_is_sent_to_server() {
    let gateway = FakeGateway::new();
    gateway.set_threads(json!([{ "id": "t1", "subject": "Lab results" }]));
    let store = store(&gateway);

    store.load_threads(Some("  lab ")).await.unwrap();
    assert!(gateway.calls().contains(&"list_threads:lab".to_string()));
    assert_eq!(store.snapshot().await.search.as_deref(), Some("lab"));
    assert_eq!(store.filtered_threads("RESULTS").await.len(), 1);
}

#[tokio::test]
async fn test_detail_without_messages_falls_back_to_history_endpoint() {
    let gateway = FakeGateway::new();
    gateway.set_detail("t1", json!({ "id": "t1", "subject": "Follow-up" }));
    gateway.set_messages(
        "t1",
        json!({ "items": [
            message("m2", "second", "2025-03-08T10:00:00Z", "u9"),
            message("m1", "first", "2025-03-08T09:00:00Z", "d1")
        ], "nextCursor": "c1" }),
    );
    let store = store(&gateway);

    store.select_thread("t1").await.unwrap();
    let state = store.snapshot().await;
    assert_eq!(ids(&state.messages), ["m1", "m2"]);
    assert!(state.messages[1].is_mine);
    assert_eq!(state.messages_cursor.as_deref(), Some("c1"));
}

#[tokio::test]
async fn test_load_older_messages_prepends_without_duplicates() {
    let gateway = FakeGateway::new();
    gateway.set_detail(
        "t1",
        json!({ "data": {
            "id": "t1",
            "messages": { "items": [message("m2", "second", "2025-03-08T10:00:00Z", "d1")], "nextCursor": "c1" }
        } }),
    );
    gateway.set_messages(
        "t1@c1",
        json!([
            message("m1", "first", "2025-03-08T09:00:00Z", "d1"),
            message("m2", "second", "2025-03-08T10:00:00Z", "d1")
        ]),
    );
    let store = store(&gateway);
    store.select_thread("t1").await.unwrap();

    assert_eq!(store.load_older_messages(None).await.unwrap(), 1);
    let state = store.snapshot().await;
    assert_eq!(ids(&state.messages), ["m1", "m2"]);
    assert!(state.messages_cursor.is_none());
}

#[tokio::test]
async fn test_load_older_without_active_thread_is_a_no_op() {
    let gateway = FakeGateway::new();
    let store = store(&gateway);
    assert_eq!(store.load_older_messages(Some("c1")).await.unwrap(), 0);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_load_older_without_cursor_fetches_nothing() {
    let gateway = FakeGateway::new();
    gateway.set_detail(
        "t1",
        thread_detail("t1", json!([message("m1", "only", "2025-03-08T09:00:00Z", "d1")])),
    );
    let store = store(&gateway);
    store.select_thread("t1").await.unwrap();
    assert!(store.snapshot().await.messages_cursor.is_none());

    assert_eq!(store.load_older_messages(None).await.unwrap(), 0);
    assert_eq!(gateway.count("list_messages"), 0);
    assert_eq!(ids(&store.snapshot().await.messages), ["m1"]);
}

#[tokio::test]
async fn test_failed_message_load_sets_pane_error() {
    let gateway = FakeGateway::new();
    gateway.fail("get_thread");
    let store = store(&gateway);

    assert!(store.select_thread("t1").await.is_err());
    let state = store.snapshot().await;
    assert_eq!(state.active_thread_id.as_deref(), Some("t1"));
    assert!(matches!(state.pane_error, Some(client::PaneError::LoadFailed(_))));
}

#[tokio::test]
async fn test_create_thread_validates_before_any_request() {
    let gateway = FakeGateway::new();
    let store = store(&gateway);

    for (doctor, subject, body) in [("", "Refill", "Please"), ("d1", "  ", "Please"), ("d1", "Refill", "")] {
        let err = store.create_thread(doctor, subject, body).await.unwrap_err();
        assert!(matches!(err, ClientError::Validation(_)));
    }
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn test_create_thread_opens_new_thread() {
    let gateway = FakeGateway::new();
    gateway.set_created(json!({ "success": true, "data": { "id": "t7" } }));
    gateway.set_threads(json!([{ "id": "t1" }, { "id": "t7", "subject": "Refill" }]));
    gateway.set_detail(
        "t7",
        thread_detail("t7", json!([message("m1", "Could you renew it?", "2025-03-08T09:00:00Z", "u9")])),
    );
    let store = store(&gateway);

    let created = store.create_thread("d1", " Refill ", "Could you renew it?").await.unwrap();
    assert_eq!(created.as_deref(), Some("t7"));

    let state = store.snapshot().await;
    assert_eq!(state.active_thread_id.as_deref(), Some("t7"));
    assert_eq!(state.threads.len(), 2);
    assert_eq!(state.counterpart("t7").unwrap().name, "Dr. Grace Hopper");
    assert_eq!(gateway.count("create_thread"), 1);
    assert_eq!(gateway.count("get_thread"), 1);
}

#[tokio::test]
async fn test_list_doctors_for_picker() {
    let gateway = FakeGateway::new();
    gateway.set_doctors(json!({ "data": { "doctors": [
        { "id": 1, "userId": "d1", "firstName": "Grace", "lastName": "Hopper" }
    ] } }));
    let store = store(&gateway);

    let doctors = store.list_doctors().await.unwrap();
    assert_eq!(doctors.len(), 1);
    assert_eq!(doctors[0].display_name, "Dr. Grace Hopper");
    assert!(gateway.calls().contains(&"list_doctors:100".to_string()));
}

#[tokio::test]
async fn test_counterparts_resolved_once() {
    let gateway = FakeGateway::new();
    gateway.set_threads(json!([{ "id": "t1" }, { "id": "t2" }]));
    gateway.set_detail("t1", thread_detail("t1", json!([])));
    gateway.set_detail("t2", thread_detail("t2", json!([])));
    let store = store(&gateway);
    store.load_threads(None).await.unwrap();

    assert_eq!(store.resolve_counterparts().await, 1);
    assert_eq!(store.resolve_counterparts().await, 0);

    let state = store.snapshot().await;
    assert!(
        state
            .threads
            .iter()
            .all(|thread| thread.counterpart_name == "Dr. Grace Hopper")
    );
    assert_eq!(state.threads[1].counterpart_role, "Cardiology");

    store.load_threads(None).await.unwrap();
    assert_eq!(store.snapshot().await.threads[1].counterpart_initials, "GH");
}

#[tokio::test]
async fn test_load_more_threads_uses_cursor() {
    let gateway = FakeGateway::new();
    gateway.set_threads(json!({ "items": [{ "id": "t1" }], "nextCursor": "p2" }));
    let store = store(&gateway);
    store.load_threads(None).await.unwrap();
    assert_eq!(store.snapshot().await.threads_cursor.as_deref(), Some("p2"));

    gateway.set_threads(json!({ "items": [{ "id": "t1" }, { "id": "t2" }] }));
    assert_eq!(store.load_more_threads().await.unwrap(), 1);
    let state = store.snapshot().await;
    assert_eq!(state.threads.len(), 2);
    assert!(state.threads_cursor.is_none());
    assert_eq!(store.load_more_threads().await.unwrap(), 0);
}
