use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tollgate_core::identity::{MockIdentitySdk, MockPromptBehavior};
use tollgate_core::{
    AuthConfig, AuthError, AuthManager, ButtonContainer, CancelSignal, FileTokenStore,
    GoogleIdentity, Method, MockTransport, SdkReadiness, TokenStore,
};

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn manager(
    dir: &TempDir,
    config: AuthConfig,
    identity: GoogleIdentity,
) -> (AuthManager, Arc<MockTransport>, Arc<FileTokenStore>) {
    let transport = Arc::new(MockTransport::new());
    let store = Arc::new(FileTokenStore::new(dir.path()));
    let manager = AuthManager::builder(config)
        .transport(transport.clone())
        .store(store.clone())
        .identity(identity)
        .build();
    (manager, transport, store)
}

#[test]
fn missing_client_id_fails_before_any_network_call() {
    let runtime = test_runtime();
    let dir = TempDir::new().expect("temp dir");
    let sdk = Arc::new(MockIdentitySdk::new(MockPromptBehavior::IssueCredential(
        "cred".into(),
    )));
    let (manager, transport, _) = manager(
        &dir,
        AuthConfig::new("http://api.test"),
        GoogleIdentity::new(sdk, SdkReadiness::ready()),
    );

    let err = runtime.block_on(manager.sign_in_with_google()).unwrap_err();
    assert!(matches!(err, AuthError::Config(_)));
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn sign_in_waits_for_sdk_to_load() {
    let runtime = test_runtime();
    let dir = TempDir::new().expect("temp dir");
    let sdk = Arc::new(MockIdentitySdk::new(MockPromptBehavior::IssueCredential(
        "cred".into(),
    )));
    let readiness = SdkReadiness::new();
    let (manager, transport, store) = manager(
        &dir,
        AuthConfig::new("http://api.test").with_google_client_id("client-1"),
        GoogleIdentity::new(sdk, readiness.clone()),
    );
    transport.enqueue_json(
        Method::POST,
        "/auth/google",
        200,
        json!({ "token": "g-jwt", "user": { "id": 3, "name": "Grace" } }),
    );

    let user = runtime
        .block_on(async {
            let loader = readiness.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                loader.mark_ready();
            });
            manager.sign_in_with_google().await
        })
        .expect("google sign in");
    assert_eq!(user.name(), Some("Grace"));
    assert_eq!(store.load().unwrap().as_deref(), Some("g-jwt"));
}

#[test]
fn cancelled_sign_in_leaves_session_alone() {
    let runtime = test_runtime();
    let dir = TempDir::new().expect("temp dir");
    let sdk = Arc::new(MockIdentitySdk::new(MockPromptBehavior::Silent));
    let (manager, transport, _) = manager(
        &dir,
        AuthConfig::new("http://api.test").with_google_client_id("client-1"),
        GoogleIdentity::new(sdk.clone(), SdkReadiness::ready()),
    );

    let cancel = CancelSignal::new();
    let err = runtime
        .block_on(async {
            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                trigger.cancel();
            });
            manager.sign_in_with_google_cancellable(&cancel).await
        })
        .unwrap_err();
    assert!(matches!(err, AuthError::Cancelled));
    assert_eq!(sdk.prompt_count(), 1);
    assert!(manager.session().token().is_none());
    assert_eq!(transport.request_count(), 0);
}

#[test]
fn button_without_container_is_a_no_op() {
    let runtime = test_runtime();
    let dir = TempDir::new().expect("temp dir");
    let sdk = Arc::new(MockIdentitySdk::new(MockPromptBehavior::Silent));
    let (manager, _, _) = manager(
        &dir,
        AuthConfig::new("http://api.test").with_google_client_id("client-1"),
        GoogleIdentity::new(sdk.clone(), SdkReadiness::ready()),
    );
    assert!(!runtime.block_on(manager.render_google_button(None, |_| {})));
    assert!(sdk.client_id().is_none());
}

#[test]
fn button_sign_in_persists_token() {
    let runtime = test_runtime();
    let dir = TempDir::new().expect("temp dir");
    let sdk = Arc::new(MockIdentitySdk::new(MockPromptBehavior::Silent));
    let (manager, transport, store) = manager(
        &dir,
        AuthConfig::new("http://api.test").with_google_client_id("client-1"),
        GoogleIdentity::new(sdk.clone(), SdkReadiness::ready()),
    );
    transport.enqueue_json(
        Method::POST,
        "/auth/google",
        200,
        json!({ "token": "btn-jwt", "user": { "id": 3, "name": "Grace" } }),
    );

    let name = runtime.block_on(async {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let container = ButtonContainer::new("signin");
        let wired = manager
            .render_google_button(Some(&container), move |user| {
                let _ = tx.send(user.name().map(str::to_string));
            })
            .await;
        assert!(wired);
        sdk.emit_credential("clicked");
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("on_success called")
            .flatten()
    });
    assert_eq!(name.as_deref(), Some("Grace"));
    assert_eq!(store.load().unwrap().as_deref(), Some("btn-jwt"));
}
