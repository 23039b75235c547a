//! Federated sign-in through a Google Identity Services style SDK.
//!
//! The SDK speaks in callbacks: `initialize` registers a credential callback,
//! `prompt` reports whether its UI was shown through a second callback, and
//! `render_button` draws a persistent button that fires the credential
//! callback on click. [`GoogleIdentity`] folds that into awaitable calls.
//!
//! The SDK script loads on its own schedule. Whoever hosts it calls
//! [`SdkReadiness::mark_ready`] once it is usable; waiters are bounded by a
//! timeout and a [`CancelSignal`].

use crate::error::{AuthError, AuthResult};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialResponse {
    /// Identity token to hand to the backend.
    pub credential: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub select_by: Option<String>,
}

impl CredentialResponse {
    pub fn new(credential: impl Into<String>) -> Self {
        Self {
            credential: credential.into(),
            select_by: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptNotification {
    not_displayed: bool,
    reason: Option<String>,
}

impl PromptNotification {
    pub fn displayed() -> Self {
        Self {
            not_displayed: false,
            reason: None,
        }
    }

    pub fn not_displayed(reason: Option<String>) -> Self {
        Self {
            not_displayed: true,
            reason,
        }
    }

    pub fn is_not_displayed(&self) -> bool {
        self.not_displayed
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

pub type CredentialCallback = Arc<dyn Fn(CredentialResponse) + Send + Sync>;
pub type PromptListener = Box<dyn FnOnce(PromptNotification) + Send>;

#[derive(Clone)]
pub struct IdentityConfig {
    pub client_id: String,
    pub callback: CredentialCallback,
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Handle to the host element a sign-in button is drawn into.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ButtonContainer(String);

impl ButtonContainer {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonOptions {
    pub theme: String,
    pub size: String,
    pub text: String,
    pub shape: String,
    pub width: u32,
    pub logo_alignment: String,
}

impl Default for ButtonOptions {
    fn default() -> Self {
        Self {
            theme: "outline".into(),
            size: "large".into(),
            text: "continue_with".into(),
            shape: "pill".into(),
            width: 280,
            logo_alignment: "left".into(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("identity sdk error: {0}")]
pub struct IdentityError(pub String);

/// Surface of the third-party identity SDK.
pub trait IdentitySdk: Send + Sync {
    /// Register the client id and the credential callback. Replaces any
    /// previous registration.
    fn initialize(&self, config: IdentityConfig);
    fn prompt(&self, listener: Option<PromptListener>);
    fn render_button(
        &self,
        container: &ButtonContainer,
        options: &ButtonOptions,
    ) -> Result<(), IdentityError>;
}

/// Cloneable cancellation flag.
#[derive(Clone)]
pub struct CancelSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves once [`CancelSignal::cancel`] has been called.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        wait_until_set(&mut rx).await;
    }
}

async fn wait_until_set(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone: the flag can never flip.
            std::future::pending::<()>().await;
        }
    }
}

/// One-way latch raised when the SDK script becomes usable.
#[derive(Clone)]
pub struct SdkReadiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for SdkReadiness {
    fn default() -> Self {
        Self::new()
    }
}

impl SdkReadiness {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn ready() -> Self {
        let readiness = Self::new();
        readiness.mark_ready();
        readiness
    }

    pub fn mark_ready(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    pub async fn wait(&self, timeout: Duration, cancel: &CancelSignal) -> AuthResult<()> {
        if self.is_ready() {
            return Ok(());
        }
        if cancel.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        let mut rx = self.tx.subscribe();
        tokio::select! {
            waited = tokio::time::timeout(timeout, wait_until_set(&mut rx)) => {
                waited.map_err(|_| AuthError::ReadinessTimeout(timeout))
            }
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum IdentityEvent {
    Credential(String),
    NotDisplayed(Option<String>),
}

/// Delivery slot shared by the credential callback and the prompt listener.
/// The first event disarms it; later events are dropped.
#[derive(Clone)]
struct EventSlot(Arc<Mutex<Option<oneshot::Sender<IdentityEvent>>>>);

impl EventSlot {
    fn new() -> (Self, oneshot::Receiver<IdentityEvent>) {
        let (tx, rx) = oneshot::channel();
        (Self(Arc::new(Mutex::new(Some(tx)))), rx)
    }

    fn deliver(&self, event: IdentityEvent) -> bool {
        let Some(tx) = self.0.lock().take() else {
            debug!("identity event arrived after sign-in settled, ignoring");
            return false;
        };
        tx.send(event).is_ok()
    }

    fn disarm(&self) {
        self.0.lock().take();
    }
}

/// Adapter that turns the SDK's callbacks into awaited results.
#[derive(Clone)]
pub struct GoogleIdentity {
    sdk: Arc<dyn IdentitySdk>,
    readiness: SdkReadiness,
}

impl GoogleIdentity {
    pub fn new(sdk: Arc<dyn IdentitySdk>, readiness: SdkReadiness) -> Self {
        Self { sdk, readiness }
    }

    pub fn readiness(&self) -> &SdkReadiness {
        &self.readiness
    }

    pub fn sdk(&self) -> &Arc<dyn IdentitySdk> {
        &self.sdk
    }

    pub async fn wait_ready(&self, timeout: Duration, cancel: &CancelSignal) -> AuthResult<()> {
        self.readiness.wait(timeout, cancel).await
    }

    /// Run the interactive prompt and return the first credential it yields.
    pub async fn request_credential(
        &self,
        client_id: &str,
        timeout: Duration,
        cancel: &CancelSignal,
    ) -> AuthResult<String> {
        self.wait_ready(timeout, cancel).await?;

        let (slot, rx) = EventSlot::new();
        let credential_slot = slot.clone();
        self.sdk.initialize(IdentityConfig {
            client_id: client_id.to_string(),
            callback: Arc::new(move |response: CredentialResponse| {
                credential_slot.deliver(IdentityEvent::Credential(response.credential));
            }),
        });
        let prompt_slot = slot.clone();
        self.sdk
            .prompt(Some(Box::new(move |notification: PromptNotification| {
                if notification.is_not_displayed() {
                    prompt_slot.deliver(IdentityEvent::NotDisplayed(notification.reason));
                }
            })));

        let outcome = tokio::select! {
            event = rx => match event {
                Ok(IdentityEvent::Credential(credential)) => Ok(credential),
                Ok(IdentityEvent::NotDisplayed(reason)) => {
                    Err(AuthError::PromptNotDisplayed { reason })
                }
                Err(_) => Err(AuthError::Cancelled),
            },
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
        };
        // Disarm on cancellation too, so a late click goes nowhere.
        slot.disarm();
        outcome
    }
}

/// How [`MockIdentitySdk`] answers a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockPromptBehavior {
    IssueCredential(String),
    Decline(Option<String>),
    Silent,
}

/// Scriptable stand-in for the browser SDK.
pub struct MockIdentitySdk {
    behavior: Mutex<MockPromptBehavior>,
    render_error: Mutex<Option<String>>,
    config: Mutex<Option<IdentityConfig>>,
    rendered: Mutex<Vec<(ButtonContainer, ButtonOptions)>>,
    prompts: AtomicUsize,
}

impl MockIdentitySdk {
    pub fn new(behavior: MockPromptBehavior) -> Self {
        Self {
            behavior: Mutex::new(behavior),
            render_error: Mutex::new(None),
            config: Mutex::new(None),
            rendered: Mutex::new(Vec::new()),
            prompts: AtomicUsize::new(0),
        }
    }

    pub fn set_behavior(&self, behavior: MockPromptBehavior) {
        *self.behavior.lock() = behavior;
    }

    pub fn fail_render_button(&self, message: impl Into<String>) {
        *self.render_error.lock() = Some(message.into());
    }

    /// Fire the registered credential callback, as a button click would.
    /// Returns `false` when nothing has been initialized.
    pub fn emit_credential(&self, credential: &str) -> bool {
        let callback = self.config.lock().as_ref().map(|config| config.callback.clone());
        match callback {
            Some(callback) => {
                callback(CredentialResponse::new(credential));
                true
            }
            None => false,
        }
    }

    pub fn client_id(&self) -> Option<String> {
        self.config.lock().as_ref().map(|config| config.client_id.clone())
    }

    pub fn prompt_count(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn rendered(&self) -> Vec<(ButtonContainer, ButtonOptions)> {
        self.rendered.lock().clone()
    }
}

impl IdentitySdk for MockIdentitySdk {
    fn initialize(&self, config: IdentityConfig) {
        *self.config.lock() = Some(config);
    }

    fn prompt(&self, listener: Option<PromptListener>) {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.lock().clone();
        match behavior {
            MockPromptBehavior::IssueCredential(credential) => {
                if let Some(listener) = listener {
                    listener(PromptNotification::displayed());
                }
                self.emit_credential(&credential);
            }
            MockPromptBehavior::Decline(reason) => {
                if let Some(listener) = listener {
                    listener(PromptNotification::not_displayed(reason));
                }
            }
            MockPromptBehavior::Silent => {
                if let Some(listener) = listener {
                    listener(PromptNotification::displayed());
                }
            }
        }
    }

    fn render_button(
        &self,
        container: &ButtonContainer,
        options: &ButtonOptions,
    ) -> Result<(), IdentityError> {
        if let Some(message) = self.render_error.lock().clone() {
            return Err(IdentityError(message));
        }
        self.rendered
            .lock()
            .push((container.clone(), options.clone()));
        Ok(())
    }
}
