use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tollgate_core::transport::HttpResponse;
use tollgate_core::{
    AuthConfig, AuthError, AuthManager, FileTokenStore, Method, MockTransport, SessionStatus,
    TokenStore,
};

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

struct Fixture {
    _dir: TempDir,
    store: Arc<FileTokenStore>,
    transport: Arc<MockTransport>,
    manager: AuthManager,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().expect("temp dir");
    let store = Arc::new(FileTokenStore::new(dir.path().join("store")));
    let (transport, manager) = manager_over(store.clone());
    Fixture {
        _dir: dir,
        store,
        transport,
        manager,
    }
}

/// Fresh manager sharing `store`, as after a process restart.
fn manager_over(store: Arc<FileTokenStore>) -> (Arc<MockTransport>, AuthManager) {
    let transport = Arc::new(MockTransport::new());
    let manager = AuthManager::builder(AuthConfig::new("http://api.test"))
        .transport(transport.clone())
        .store(store)
        .build();
    (transport, manager)
}

fn login_ok(transport: &MockTransport, token: &str) {
    transport.enqueue_json(
        Method::POST,
        "/auth/login",
        200,
        json!({ "token": token, "user": { "id": 1, "name": "Ada", "email": "ada@example.com" } }),
    );
}

#[test]
fn sign_in_persists_token_to_disk() {
    let runtime = test_runtime();
    let fx = fixture();
    login_ok(&fx.transport, "jwt-1");

    runtime
        .block_on(fx.manager.sign_in("ada@example.com", "secret"))
        .expect("sign in");

    assert_eq!(fx.manager.session().token().as_deref(), Some("jwt-1"));
    assert_eq!(fx.store.load().unwrap().as_deref(), Some("jwt-1"));
    assert_eq!(fx.manager.session().snapshot().status(), SessionStatus::Authenticated);
}

#[test]
fn invalid_credentials_surface_server_message() {
    let runtime = test_runtime();
    let fx = fixture();
    fx.transport.enqueue_json(
        Method::POST,
        "/auth/login",
        401,
        json!({ "error": "invalid credentials" }),
    );

    let err = runtime
        .block_on(fx.manager.sign_in("ada@example.com", "nope"))
        .unwrap_err();
    assert!(matches!(err, AuthError::Request { status: 401, .. }));
    assert_eq!(err.to_string(), "invalid credentials");
    assert!(fx.manager.session().token().is_none());
    assert_eq!(fx.store.load().unwrap(), None);
}

#[test]
fn sign_in_then_sign_out_leaves_no_file() {
    let runtime = test_runtime();
    let fx = fixture();
    login_ok(&fx.transport, "jwt-1");
    runtime
        .block_on(fx.manager.sign_in("ada@example.com", "secret"))
        .expect("sign in");

    fx.manager.sign_out();
    assert!(fx.manager.session().token().is_none());
    assert!(!fx.store.root().join("token").exists());
}

#[test]
fn restart_restores_valid_session() {
    let runtime = test_runtime();
    let fx = fixture();
    login_ok(&fx.transport, "jwt-1");
    runtime
        .block_on(fx.manager.sign_in("ada@example.com", "secret"))
        .expect("sign in");

    let (transport, restarted) = manager_over(fx.store.clone());
    transport.enqueue_json(
        Method::GET,
        "/auth/me",
        200,
        json!({ "user": { "id": 1, "name": "Ada" } }),
    );
    let mut changes = restarted.session().subscribe();
    runtime.block_on(restarted.init_auth());

    let session = restarted.session().snapshot();
    assert!(session.ready);
    assert_eq!(session.token.as_deref(), Some("jwt-1"));
    assert_eq!(session.user.as_ref().and_then(|u| u.name()), Some("Ada"));
    assert!(changes.has_changed().unwrap());
    assert!(changes.borrow_and_update().ready);
}

#[test]
fn restart_with_expired_token_resets_to_anonymous() {
    let runtime = test_runtime();
    let fx = fixture();
    fx.store.save("stale").unwrap();

    fx.transport.enqueue_json(
        Method::GET,
        "/auth/me",
        401,
        json!({ "error": "Token expired" }),
    );
    runtime.block_on(fx.manager.init_auth());

    let session = fx.manager.session().snapshot();
    assert!(session.ready);
    assert!(session.token.is_none());
    assert!(session.user.is_none());
    assert_eq!(fx.store.load().unwrap(), None);
}

#[test]
fn restart_without_token_is_ready_and_empty() {
    let runtime = test_runtime();
    let fx = fixture();
    runtime.block_on(fx.manager.init_auth());

    let session = fx.manager.session().snapshot();
    assert!(session.ready);
    assert!(session.token.is_none());
    assert!(session.user.is_none());
    assert_eq!(fx.transport.request_count(), 0);
}

#[test]
fn empty_profile_body_is_tolerated() {
    let runtime = test_runtime();
    let fx = fixture();
    fx.store.save("jwt-1").unwrap();
    fx.transport
        .enqueue(Method::GET, "/auth/me", HttpResponse::empty(200));

    runtime.block_on(fx.manager.init_auth());
    let session = fx.manager.session().snapshot();
    assert!(session.ready);
    assert!(session.user.is_none());
}

#[test]
fn cli_commands_share_the_persisted_session() {
    let runtime = test_runtime();
    let fx = fixture();
    login_ok(&fx.transport, "jwt-cli");
    let user = runtime
        .block_on(tollgate::commands::login(&fx.manager, "ada@example.com", "secret"))
        .expect("login");
    assert_eq!(user["name"], "Ada");

    let (transport, restarted) = manager_over(fx.store.clone());
    transport.enqueue_json(
        Method::GET,
        "/auth/me",
        200,
        json!({ "user": { "id": 1, "name": "Ada" } }),
    );
    let report = runtime.block_on(tollgate::commands::whoami(&restarted));
    assert_eq!(report["status"], "authenticated");
    assert_eq!(report["user"]["name"], "Ada");
}
