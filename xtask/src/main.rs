use anyhow::{ensure, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tollgate_core::{
    telemetry, AuthConfig, AuthManager, FileTokenStore, Method, MockTransport, RequestOptions,
    TokenStore,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Tollgate")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run bootstrap, sign-in, an authenticated call and sign-out against a mock backend.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_tracing(EnvFilter::new("info"))?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let store = Arc::new(FileTokenStore::new(temp_dir.path()));
    let transport = Arc::new(MockTransport::new());
    transport.enqueue_json(
        Method::POST,
        "/auth/login",
        200,
        json!({ "token": "smoke-token", "user": { "id": 1, "name": "Smoke" } }),
    );
    transport.enqueue_json(Method::GET, "/sources", 200, json!([]));

    let manager = AuthManager::builder(AuthConfig::default())
        .transport(transport.clone())
        .store(store.clone())
        .build();

    runtime.block_on(async {
        manager.init_auth().await;
        ensure!(manager.session().is_ready(), "bootstrap did not mark ready");

        manager.sign_in("smoke@example.com", "smoke").await?;
        ensure!(
            store.load()?.as_deref() == Some("smoke-token"),
            "token was not persisted"
        );

        manager.auth_fetch("/sources", RequestOptions::get()).await?;
        let last = transport.last_request();
        ensure!(
            last.as_ref()
                .and_then(|r| r.headers.get("authorization"))
                .is_some_and(|value| value == "Bearer smoke-token"),
            "bearer token missing on authenticated call"
        );

        manager.sign_out();
        ensure!(store.load()?.is_none(), "token survived sign-out");
        Ok::<(), anyhow::Error>(())
    })?;

    info!(
        "requests" = transport.request_count(),
        "smoke test session flow completed"
    );
    Ok(())
}
