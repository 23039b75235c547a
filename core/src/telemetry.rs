//! Log output for Tollgate binaries.
//!
//! The auth manager reports bootstrap outcomes, sign-in results and swallowed
//! storage failures through `tracing`. Events go to stderr so that commands
//! printing JSON on stdout stay machine-readable.

use anyhow::Result;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

static SUBSCRIBER_GUARD: OnceLock<()> = OnceLock::new();

/// Install the process-wide subscriber. The `tollgate` CLI passes the
/// `RUST_LOG` filter, `xtask` forces `info`.
///
/// Only the first call installs anything; later calls return `Ok(())`.
pub fn init_tracing(filter: EnvFilter) -> Result<()> {
    if SUBSCRIBER_GUARD.get().is_some() {
        return Ok(());
    }

    let subscriber = Registry::default().with(filter).with(
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr),
    );
    tracing::subscriber::set_global_default(subscriber)?;
    SUBSCRIBER_GUARD.set(()).ok();

    Ok(())
}
