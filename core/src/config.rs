use directories::{BaseDirs, ProjectDirs};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
pub const DEFAULT_SDK_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Ports of front-end dev servers. A base URL pointing at one of them would
/// send API calls to the bundler instead of the backend.
const DEV_SERVER_PORTS: [u16; 2] = [5173, 3000];

const ENV_API_BASE: &str = "TOLLGATE_API_BASE";
const ENV_API_BASE_URL: &str = "TOLLGATE_API_BASE_URL";
const ENV_GOOGLE_CLIENT_ID: &str = "TOLLGATE_GOOGLE_CLIENT_ID";
const ENV_SDK_TIMEOUT_MS: &str = "TOLLGATE_SDK_TIMEOUT_MS";
const ENV_STORE_DIR: &str = "TOLLGATE_STORE_DIR";

#[derive(Debug, Clone, PartialEq)]
pub struct AuthConfig {
    pub api_base: String,
    pub google_client_id: Option<String>,
    pub sdk_ready_timeout: Duration,
    pub store_dir: Option<PathBuf>,
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {detail}")]
    Unreadable { path: PathBuf, detail: String },
    #[error("configuration invalid: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn user_message(&self) -> String {
        match self {
            Self::Unreadable { path, .. } => {
                format!("Could not read {}. Check file permissions.", path.display())
            }
            Self::Invalid(detail) => format!("Tollgate not configured: {detail}."),
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE)
    }
}

impl AuthConfig {
    pub fn new(api_base: impl Into<String>) -> Self {
        Self {
            api_base: api_base.into(),
            google_client_id: None,
            sdk_ready_timeout: DEFAULT_SDK_READY_TIMEOUT,
            store_dir: None,
        }
    }

    pub fn with_google_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.google_client_id = non_blank(Some(client_id.into()));
        self
    }

    pub fn with_sdk_ready_timeout(mut self, timeout: Duration) -> Self {
        self.sdk_ready_timeout = timeout;
        self
    }

    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Load from `tollgate.yaml` (if present) and the environment, with the
    /// environment taking precedence. A `.env` file in the working directory
    /// is honoured.
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let file = match locate_config_file() {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        resolve(file, |key| std::env::var(key).ok())
    }

    /// Directory for the persisted token: the configured one, else the
    /// platform data directory.
    pub fn resolved_store_dir(&self) -> Option<PathBuf> {
        self.store_dir.clone().or_else(default_store_dir)
    }
}

pub fn default_store_dir() -> Option<PathBuf> {
    ProjectDirs::from("dev", "tollgate", "tollgate").map(|dirs| dirs.data_dir().to_path_buf())
}

/// Normalise a configured API base.
///
/// Missing or blank values, and values pointing at a dev-server port, fall
/// back to [`DEFAULT_API_BASE`].
pub fn resolve_api_base(raw: Option<&str>) -> Result<String, ConfigError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(DEFAULT_API_BASE.to_string());
    };
    let url = Url::parse(raw)
        .map_err(|err| ConfigError::Invalid(format!("api base `{raw}` is not a URL: {err}")))?;
    if url
        .port()
        .is_some_and(|port| DEV_SERVER_PORTS.contains(&port))
    {
        return Ok(DEFAULT_API_BASE.to_string());
    }
    Ok(raw.trim_end_matches('/').to_string())
}

fn resolve(
    file: Option<AuthSection>,
    env: impl Fn(&str) -> Option<String>,
) -> Result<AuthConfig, ConfigError> {
    let file = file.unwrap_or_default();

    let api_base = non_blank(env(ENV_API_BASE))
        .or_else(|| non_blank(env(ENV_API_BASE_URL)))
        .or(file.api_base);
    let api_base = resolve_api_base(api_base.as_deref())?;

    let google_client_id = non_blank(env(ENV_GOOGLE_CLIENT_ID)).or(non_blank(file.google_client_id));

    let timeout_ms = match non_blank(env(ENV_SDK_TIMEOUT_MS)) {
        Some(raw) => Some(raw.trim().parse::<u64>().map_err(|err| {
            ConfigError::Invalid(format!("{ENV_SDK_TIMEOUT_MS}=`{raw}` is not a number: {err}"))
        })?),
        None => file.sdk_ready_timeout_ms,
    };
    let sdk_ready_timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or(DEFAULT_SDK_READY_TIMEOUT);

    let store_dir = non_blank(env(ENV_STORE_DIR))
        .map(PathBuf::from)
        .or(file.store_dir);

    Ok(AuthConfig {
        api_base,
        google_client_id,
        sdk_ready_timeout,
        store_dir,
    })
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<AuthSection, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|err| ConfigError::Unreadable {
        path: path.to_path_buf(),
        detail: err.to_string(),
    })?;
    parse_config(&contents)
}

fn parse_config(contents: &str) -> Result<AuthSection, ConfigError> {
    let config: TollgateConfig = serde_yaml::from_str(contents)
        .map_err(|err| ConfigError::Invalid(format!("invalid tollgate.yaml: {err}")))?;
    Ok(config.auth.unwrap_or_default())
}

fn locate_config_file() -> Option<PathBuf> {
    config_candidates().into_iter().find(|path| path.exists())
}

fn config_candidates() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(base) = BaseDirs::new() {
        let config_dir = base.config_dir().join("tollgate");
        paths.push(config_dir.join("tollgate.yaml"));
        paths.push(config_dir.join("tollgate.yml"));
        let home_dir = base.home_dir();
        paths.push(home_dir.join(".tollgate").join("tollgate.yaml"));
        paths.push(home_dir.join(".tollgate").join("tollgate.yml"));
    } else {
        paths.push(PathBuf::from("tollgate.yaml"));
        paths.push(PathBuf::from("tollgate.yml"));
    }
    paths
}

#[derive(Debug, Deserialize)]
struct TollgateConfig {
    auth: Option<AuthSection>,
}

#[derive(Debug, Default, Deserialize)]
struct AuthSection {
    #[serde(default)]
    api_base: Option<String>,
    #[serde(default)]
    google_client_id: Option<String>,
    #[serde(default)]
    sdk_ready_timeout_ms: Option<u64>,
    #[serde(default)]
    store_dir: Option<PathBuf>,
}
