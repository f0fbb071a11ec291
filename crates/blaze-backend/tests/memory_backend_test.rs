#![allow(clippy::unwrap_used)]
// Integration tests for `MemoryBackend` through the `Backend` trait object.

use std::sync::{Arc, Mutex};

use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use url::Url;

use blaze_backend::{
    ActionCodeOperation, Backend, BackendConfig, Connector, Credential, EventKind, MemoryBackend,
    Password, Persistence, Priority, ProfileUpdate, SessionEvent, SnapshotCallback,
};

// ── Helpers ─────────────────────────────────────────────────────────

fn config() -> BackendConfig {
    BackendConfig {
        api_key: "test-key".to_string().into(),
        auth_domain: "demo.example.com".into(),
        database_url: Url::parse("https://demo.example.com").unwrap(),
        project_id: "demo".into(),
        storage_bucket: None,
        messaging_sender_id: None,
    }
}

fn connect(memory: &MemoryBackend) -> Arc<dyn Backend> {
    memory.connect(&config(), "[DEFAULT]").unwrap()
}

fn recorder() -> (SnapshotCallback, Arc<Mutex<Vec<(String, Value)>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: SnapshotCallback = Arc::new(move |res| {
        if let Ok(Some(snap)) = res {
            sink.lock().unwrap().push((snap.path.clone(), snap.into_val()));
        }
    });
    (callback, seen)
}

// ── Store tests ─────────────────────────────────────────────────────

#[tokio::test]
async fn test_connected_handle_shares_state() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);

    backend.set("rooms/lobby", &json!({"topic": "hi"})).await.unwrap();

    assert_eq!(memory.value_at("rooms/lobby/topic"), json!("hi"));
    assert_eq!(memory.calls("set").len(), 1);
}

#[tokio::test]
async fn test_child_removed_reports_old_value() {
    let memory = MemoryBackend::new();
    memory.seed("list", json!({"a": 1, "b": 2}));
    let backend = connect(&memory);
    let (callback, seen) = recorder();

    backend.listen("list", EventKind::ChildRemoved, callback);
    backend.remove("list/a").await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![("list/a".to_string(), json!(1))]);
}

#[tokio::test]
async fn test_child_changed_only_for_modified_children() {
    let memory = MemoryBackend::new();
    memory.seed("list", json!({"a": 1, "b": 2}));
    let backend = connect(&memory);
    let (callback, seen) = recorder();

    backend.listen("list", EventKind::ChildChanged, callback);
    backend
        .update("list", json!({"a": 10, "c": 3}).as_object().unwrap())
        .await
        .unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![("list/a".to_string(), json!(10))]);
}

#[tokio::test]
async fn test_child_added_replays_existing_children() {
    let memory = MemoryBackend::new();
    memory.seed("list", json!({"a": 1, "b": 2}));
    let backend = connect(&memory);
    let (callback, seen) = recorder();

    backend.listen("list", EventKind::ChildAdded, callback);

    let paths: Vec<String> = seen.lock().unwrap().iter().map(|(p, _)| p.clone()).collect();
    assert_eq!(paths, vec!["list/a".to_string(), "list/b".to_string()]);
}

#[tokio::test]
async fn test_listener_errors_for_invalid_path() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);
    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);

    backend.listen(
        "bad.path",
        EventKind::Value,
        Arc::new(move |res| {
            if let Err(e) = res {
                sink.lock().unwrap().push(e.code);
            }
        }),
    );

    assert_eq!(*errors.lock().unwrap(), vec!["database/invalid-path".to_string()]);
    assert_eq!(memory.active_listeners(), 0);
}

#[tokio::test]
async fn test_priorities() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);

    backend
        .set_with_priority("item", &json!("x"), &Priority::Number(2.0))
        .await
        .unwrap();
    assert_eq!(memory.priority_at("item"), Some(Priority::Number(2.0)));

    backend
        .set_priority("item", &Priority::Text("b".into()))
        .await
        .unwrap();
    assert_eq!(memory.priority_at("item"), Some(Priority::Text("b".into())));

    backend.set("item", &json!("y")).await.unwrap();
    assert_eq!(memory.priority_at("item"), None);
}

#[tokio::test]
async fn test_online_toggle_is_journaled() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);

    backend.go_offline();
    assert!(!memory.is_online());
    backend.go_online();
    assert!(memory.is_online());

    let ops: Vec<&str> = memory.journal().iter().map(|c| c.op).collect();
    assert_eq!(ops, vec!["goOffline", "goOnline"]);
}

// ── Session tests ───────────────────────────────────────────────────

#[tokio::test]
async fn test_email_verification_flow() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);
    backend
        .create_user_with_email_and_password("ada@example.com", &Password::new("analytical"))
        .await
        .unwrap();

    let code = memory.issue_email_verification("ada@example.com").unwrap();
    let info = backend.check_action_code(&code).await.unwrap();
    assert_eq!(info.operation, ActionCodeOperation::VerifyEmail);

    backend.apply_action_code(&code).await.unwrap();
    assert!(memory.current_user().unwrap().email_verified);
}

#[tokio::test]
async fn test_password_reset_via_inbox() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);
    backend
        .create_user_with_email_and_password("ada@example.com", &Password::new("analytical"))
        .await
        .unwrap();
    backend.sign_out().await.unwrap();

    backend.send_password_reset_email("ada@example.com").await.unwrap();
    let code = memory.action_codes_for("ada@example.com").pop().unwrap();
    assert_eq!(
        backend.verify_password_reset_code(&code).await.unwrap(),
        "ada@example.com"
    );
    backend
        .confirm_password_reset(&code, &Password::new("difference"))
        .await
        .unwrap();

    let cred = backend
        .sign_in_with_email_and_password("ada@example.com", &Password::new("difference"))
        .await
        .unwrap();
    assert!(!cred.is_new_user);
}

#[tokio::test]
async fn test_phone_sign_in() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);

    let verification_id = backend
        .sign_in_with_phone_number("+15550100", "recaptcha-token")
        .await
        .unwrap();
    let code = memory.verification_code(&verification_id).unwrap();
    let cred = backend
        .sign_in_with_credential(&Credential::phone(verification_id, code))
        .await
        .unwrap();

    assert_eq!(cred.provider_id.as_deref(), Some("phone"));
    assert_eq!(
        backend
            .sign_in_with_phone_number("5550100", "recaptcha-token")
            .await
            .unwrap_err()
            .code,
        "auth/invalid-phone-number"
    );
}

#[tokio::test]
async fn test_profile_update_fires_id_token_listener_only() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);
    let cred = backend.sign_in_anonymously().await.unwrap();

    let state = Arc::new(Mutex::new(0_usize));
    let token = Arc::new(Mutex::new(Vec::new()));
    let state_sink = Arc::clone(&state);
    let token_sink = Arc::clone(&token);
    backend.listen_session(
        SessionEvent::StateChanged,
        Arc::new(move |_| *state_sink.lock().unwrap() += 1),
    );
    backend.listen_session(
        SessionEvent::IdTokenChanged,
        Arc::new(move |res| {
            let name = res.unwrap().and_then(|u| u.display_name);
            token_sink.lock().unwrap().push(name);
        }),
    );

    let profile = ProfileUpdate {
        display_name: Some("Ada".into()),
        photo_url: None,
    };
    backend
        .update_profile(&cred.user.handle(), &profile)
        .await
        .unwrap();

    // One registration replay each, then only the token listener fires.
    assert_eq!(*state.lock().unwrap(), 1);
    assert_eq!(*token.lock().unwrap(), vec![None, Some("Ada".to_string())]);
}

#[tokio::test]
async fn test_popup_is_unsupported() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);
    let err = backend
        .sign_in_with_popup(&blaze_backend::AuthProvider::new("google.com"))
        .await
        .unwrap_err();
    assert_eq!(err.code, "auth/operation-not-supported-in-this-environment");
    assert_eq!(backend.redirect_result().await.unwrap(), None);
}

#[tokio::test]
async fn test_set_persistence() {
    let memory = MemoryBackend::new();
    let backend = connect(&memory);
    backend.set_persistence(Persistence::Session).await.unwrap();
    assert_eq!(memory.persistence(), Persistence::Session);
}
