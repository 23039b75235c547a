use crate::api::{ApiClient, AuthGrant, RequestOptions};
use crate::config::AuthConfig;
use crate::error::{AuthError, AuthResult};
use crate::identity::{
    ButtonContainer, ButtonOptions, CancelSignal, CredentialResponse, GoogleIdentity,
    IdentityConfig,
};
use crate::session::{SessionContext, UserProfile};
use crate::store::{FileTokenStore, MemoryTokenStore, TokenStore};
use crate::transport::{HttpTransport, ReqwestTransport};
use serde_json::{json, Value};
use std::sync::{Arc, Weak};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Owns the session record and every operation that mutates it.
///
/// Cloning is cheap; clones share the same session, store and transport.
#[derive(Clone)]
pub struct AuthManager {
    inner: Arc<Inner>,
}

struct Inner {
    config: AuthConfig,
    api: ApiClient,
    session: SessionContext,
    store: Arc<dyn TokenStore>,
    identity: Option<GoogleIdentity>,
    // Credential exchanges and bootstrap run one at a time so the session and
    // the persisted token always end up describing the same grant.
    exchange_lock: Mutex<()>,
}

pub struct AuthManagerBuilder {
    config: AuthConfig,
    transport: Option<Arc<dyn HttpTransport>>,
    store: Option<Arc<dyn TokenStore>>,
    session: Option<SessionContext>,
    identity: Option<GoogleIdentity>,
}

impl AuthManagerBuilder {
    pub fn transport(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn store(mut self, store: Arc<dyn TokenStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Share an existing session context, e.g. one already handed to UI code.
    pub fn session(mut self, session: SessionContext) -> Self {
        self.session = Some(session);
        self
    }

    pub fn identity(mut self, identity: GoogleIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn build(self) -> AuthManager {
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(ReqwestTransport::new()));
        let store = self.store.unwrap_or_else(|| default_store(&self.config));
        let api = ApiClient::new(self.config.api_base.clone(), transport);
        AuthManager {
            inner: Arc::new(Inner {
                config: self.config,
                api,
                session: self.session.unwrap_or_default(),
                store,
                identity: self.identity,
                exchange_lock: Mutex::new(()),
            }),
        }
    }
}

fn default_store(config: &AuthConfig) -> Arc<dyn TokenStore> {
    match config.resolved_store_dir() {
        Some(dir) => Arc::new(FileTokenStore::new(dir)),
        None => {
            warn!("no data directory available; token will not survive restarts");
            Arc::new(MemoryTokenStore::new())
        }
    }
}

impl AuthManager {
    pub fn builder(config: AuthConfig) -> AuthManagerBuilder {
        AuthManagerBuilder {
            config,
            transport: None,
            store: None,
            session: None,
            identity: None,
        }
    }

    pub fn session(&self) -> &SessionContext {
        &self.inner.session
    }

    pub fn config(&self) -> &AuthConfig {
        &self.inner.config
    }

    pub fn identity(&self) -> Option<&GoogleIdentity> {
        self.inner.identity.as_ref()
    }

    /// JSON request against the backend carrying the current bearer token.
    pub async fn auth_fetch(&self, path: &str, options: RequestOptions) -> AuthResult<Value> {
        let token = self.inner.session.token();
        self.inner
            .api
            .auth_fetch(token.as_deref(), path, options)
            .await
    }

    /// Restore the persisted session, validating it against `/auth/me`.
    ///
    /// Never fails: a rejected token is discarded. The session is marked
    /// ready on return whatever happened.
    pub async fn init_auth(&self) {
        let _guard = self.inner.exchange_lock.lock().await;
        if self.inner.session.is_ready() {
            debug!("session already bootstrapped");
            return;
        }

        match self.inner.store.load() {
            Ok(Some(token)) => {
                self.inner.session.set_token(Some(token.clone()));
                match self.auth_fetch("/auth/me", RequestOptions::get()).await {
                    Ok(body) => {
                        let user = body
                            .get("user")
                            .filter(|user| !user.is_null())
                            .cloned()
                            .map(UserProfile::new);
                        if user.is_none() {
                            debug!("profile endpoint returned no user");
                        }
                        // sign_out does not take the exchange lock and may
                        // have dropped the token while the profile was loading.
                        if self.inner.session.set_user_if_token(&token, user) {
                            info!("restored persisted session");
                        } else {
                            info!("session signed out during bootstrap, profile discarded");
                        }
                    }
                    Err(err) => {
                        warn!(%err, "persisted token rejected, clearing session");
                        self.inner.session.clear();
                        if let Err(err) = self.inner.store.clear() {
                            warn!(%err, "failed to remove persisted token");
                        }
                    }
                }
            }
            Ok(None) => debug!("no persisted token"),
            Err(err) => warn!(%err, "failed to read persisted token"),
        }

        self.inner.session.mark_ready();
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<UserProfile> {
        let user = self
            .exchange(
                "/auth/login",
                json!({ "email": email, "password": password }),
            )
            .await?;
        info!(user = ?user.id(), "signed in");
        Ok(user)
    }

    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> AuthResult<UserProfile> {
        let user = self
            .exchange(
                "/auth/register",
                json!({ "name": name, "email": email, "password": password }),
            )
            .await?;
        info!(user = ?user.id(), "registered");
        Ok(user)
    }

    pub fn sign_out(&self) {
        self.inner.session.clear();
        if let Err(err) = self.inner.store.clear() {
            warn!(%err, "failed to remove persisted token");
        }
        info!("signed out");
    }

    pub async fn sign_in_with_google(&self) -> AuthResult<UserProfile> {
        self.sign_in_with_google_cancellable(&CancelSignal::new())
            .await
    }

    /// Interactive Google sign-in. `cancel` aborts the readiness wait and the
    /// prompt; once the credential exchange has started it runs to completion.
    pub async fn sign_in_with_google_cancellable(
        &self,
        cancel: &CancelSignal,
    ) -> AuthResult<UserProfile> {
        let client_id = self.google_client_id()?;
        let identity = self.attached_identity()?;
        let credential = identity
            .request_credential(&client_id, self.inner.config.sdk_ready_timeout, cancel)
            .await?;
        self.exchange_google_credential(&credential).await
    }

    /// Trade a Google identity token for a backend session.
    pub async fn exchange_google_credential(&self, credential: &str) -> AuthResult<UserProfile> {
        let user = self
            .exchange("/auth/google", json!({ "id_token": credential }))
            .await?;
        info!(user = ?user.id(), "signed in with Google");
        Ok(user)
    }

    /// Wire a persistent Google button into `container`.
    ///
    /// Returns `false` without touching the SDK when there is no container,
    /// no client id, no attached SDK, or the SDK never became ready. Sign-in
    /// attempts made through the button report success through `on_success`
    /// and are logged on failure.
    pub async fn render_google_button<F>(
        &self,
        container: Option<&ButtonContainer>,
        on_success: F,
    ) -> bool
    where
        F: Fn(UserProfile) + Send + Sync + 'static,
    {
        let Some(container) = container else {
            return false;
        };
        let Some(client_id) = self.inner.config.google_client_id.clone() else {
            return false;
        };
        let Some(identity) = self.inner.identity.clone() else {
            warn!("no identity sdk attached, Google button not rendered");
            return false;
        };
        if let Err(err) = identity
            .wait_ready(self.inner.config.sdk_ready_timeout, &CancelSignal::new())
            .await
        {
            warn!(%err, "identity sdk unavailable, Google button not rendered");
            return false;
        }

        let manager: Weak<Inner> = Arc::downgrade(&self.inner);
        let on_success = Arc::new(on_success);
        let runtime = tokio::runtime::Handle::current();
        identity.sdk().initialize(IdentityConfig {
            client_id,
            callback: Arc::new(move |response: CredentialResponse| {
                let Some(inner) = manager.upgrade() else {
                    debug!("auth manager dropped, ignoring credential");
                    return;
                };
                let manager = AuthManager { inner };
                let on_success = on_success.clone();
                runtime.spawn(async move {
                    match manager.exchange_google_credential(&response.credential).await {
                        Ok(user) => on_success(user),
                        Err(err) => error!(%err, "Google sign-in failed"),
                    }
                });
            }),
        });

        if let Err(err) = identity
            .sdk()
            .render_button(container, &ButtonOptions::default())
        {
            warn!(%err, container = container.id(), "render_button failed, falling back to prompt");
            identity.sdk().prompt(None);
        }
        true
    }

    fn google_client_id(&self) -> AuthResult<String> {
        self.inner
            .config
            .google_client_id
            .clone()
            .ok_or_else(|| AuthError::Config("missing Google client id".into()))
    }

    fn attached_identity(&self) -> AuthResult<&GoogleIdentity> {
        self.inner
            .identity
            .as_ref()
            .ok_or_else(|| AuthError::Config("no identity sdk attached".into()))
    }

    async fn exchange(&self, path: &str, body: Value) -> AuthResult<UserProfile> {
        let _guard = self.inner.exchange_lock.lock().await;
        let data = self.auth_fetch(path, RequestOptions::post(body)).await?;
        let grant = AuthGrant::from_body(&data)?;
        self.adopt(grant)
    }

    // Persist first so a storage failure leaves the session untouched.
    fn adopt(&self, grant: AuthGrant) -> AuthResult<UserProfile> {
        self.inner.store.save(&grant.token)?;
        self.inner.session.adopt(grant.token, grant.user.clone());
        Ok(grant.user)
    }
}
