use anyhow::{anyhow, Context, Result};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tollgate_core::config::resolve_api_base;
use tollgate_core::{
    AuthConfig, AuthManager, FileTokenStore, Method, RequestOptions, ReqwestTransport,
};
use tracing::{debug, info, warn};

/// Command-line overrides layered over the loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_base: Option<String>,
    pub store_dir: Option<PathBuf>,
}

pub fn load_config(overrides: &Overrides) -> Result<AuthConfig> {
    let mut config = AuthConfig::load().map_err(|err| anyhow!(err.user_message()))?;
    if let Some(base) = overrides.api_base.as_deref() {
        config.api_base = resolve_api_base(Some(base))?;
        if config.api_base != base.trim().trim_end_matches('/') {
            warn!(requested = base, using = %config.api_base, "api base replaced");
        }
    }
    if let Some(dir) = overrides.store_dir.clone() {
        config.store_dir = Some(dir);
    }
    Ok(config)
}

pub fn build_manager(config: AuthConfig) -> Result<AuthManager> {
    let store_dir = config
        .resolved_store_dir()
        .context("no data directory available; pass --store-dir")?;
    debug!(api_base = %config.api_base, store = %store_dir.display(), "building auth manager");
    Ok(AuthManager::builder(config)
        .transport(Arc::new(ReqwestTransport::new()))
        .store(Arc::new(FileTokenStore::new(store_dir)))
        .build())
}

pub async fn login(manager: &AuthManager, email: &str, password: &str) -> Result<Value> {
    let user = manager.sign_in(email, password).await?;
    info!(email, "login succeeded");
    Ok(user.into_value())
}

pub async fn register(
    manager: &AuthManager,
    name: &str,
    email: &str,
    password: &str,
) -> Result<Value> {
    let user = manager.sign_up(name, email, password).await?;
    info!(email, "account registered");
    Ok(user.into_value())
}

pub fn logout(manager: &AuthManager) -> Value {
    manager.sign_out();
    json!({ "status": "anonymous" })
}

/// Bootstrap from the persisted token and describe the resulting session.
pub async fn whoami(manager: &AuthManager) -> Value {
    manager.init_auth().await;
    let session = manager.session().snapshot();
    json!({
        "status": session.status(),
        "user": session.user,
    })
}

pub async fn fetch(
    manager: &AuthManager,
    path: &str,
    method: &str,
    data: Option<&str>,
) -> Result<Value> {
    let method = parse_method(method)?;
    let mut options = RequestOptions::get().method(method.clone());
    if let Some(data) = data {
        let body: Value = serde_json::from_str(data).context("--data is not valid JSON")?;
        options = options.body(body);
    }
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    manager.init_auth().await;
    info!(%method, path = %path, authenticated = manager.session().is_authenticated(), "sending request");
    Ok(manager.auth_fetch(&path, options).await?)
}

/// Accepts any well-formed method token, case-insensitively.
fn parse_method(raw: &str) -> Result<Method> {
    Method::from_bytes(raw.trim().to_ascii_uppercase().as_bytes())
        .map_err(|_| anyhow!("invalid HTTP method `{raw}`"))
}
