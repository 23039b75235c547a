use clap::{Parser, Subcommand};
use serde_json::Value;
use std::path::PathBuf;
use tokio::runtime::Runtime;
use tollgate::{build_manager, commands, load_config, Overrides};
use tollgate_core::telemetry;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tollgate", version, about = "Sign in to a Tollgate backend and make authenticated calls")]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// Backend base URL, overriding configuration.
    #[arg(long, global = true)]
    api_base: Option<String>,
    /// Directory holding the persisted token.
    #[arg(long, global = true)]
    store_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Sign in with email and password.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "TOLLGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign in.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "TOLLGATE_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Forget the persisted session.
    Logout,
    /// Restore the persisted session and show who it belongs to.
    Whoami,
    /// Send an authenticated JSON request.
    Fetch {
        path: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// JSON request body.
        #[arg(long)]
        data: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    telemetry::init_tracing(EnvFilter::from_default_env())?;
    let cli = Cli::parse();

    let overrides = Overrides {
        api_base: cli.api_base.clone(),
        store_dir: cli.store_dir.clone(),
    };
    let manager = build_manager(load_config(&overrides)?)?;
    let runtime = Runtime::new()?;

    let output = runtime.block_on(async {
        match &cli.command {
            Command::Login { email, password } => {
                commands::login(&manager, email, password).await
            }
            Command::Register {
                name,
                email,
                password,
            } => commands::register(&manager, name, email, password).await,
            Command::Logout => Ok(commands::logout(&manager)),
            Command::Whoami => Ok(commands::whoami(&manager).await),
            Command::Fetch { path, method, data } => {
                commands::fetch(&manager, path, method, data.as_deref()).await
            }
        }
    })?;

    print_json(&output)
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
