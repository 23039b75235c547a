use anyhow::{Context, Result};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Key under which the bearer token is persisted.
pub const TOKEN_KEY: &str = "token";

/// Durable home for the session token.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Result<Option<String>>;
    fn save(&self, token: &str) -> Result<()>;
    /// Remove the persisted token. Succeeds when nothing is stored.
    fn clear(&self) -> Result<()>;
}

/// Token persisted as a single file named after [`TOKEN_KEY`].
#[derive(Clone, Debug)]
pub struct FileTokenStore {
    root: PathBuf,
}

impl FileTokenStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn temporary() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("tollgate-{}", Uuid::new_v4()));
        Self::new(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn token_path(&self) -> PathBuf {
        self.root.join(TOKEN_KEY)
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        let path = self.token_path();
        match fs::read_to_string(&path) {
            Ok(contents) => {
                let token = contents.trim();
                if token.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(token.to_string()))
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn save(&self, token: &str) -> Result<()> {
        fs::create_dir_all(&self.root)
            .with_context(|| format!("failed to create directory {}", self.root.display()))?;
        let path = self.token_path();
        fs::write(&path, token.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))
    }

    fn clear(&self) -> Result<()> {
        let path = self.token_path();
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
        }
    }
}

/// Process-local store for tests and dry runs.
#[derive(Default)]
pub struct MemoryTokenStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.entries.write().insert(TOKEN_KEY.to_string(), token.into());
        store
    }

    pub fn contains_token(&self) -> bool {
        self.entries.read().contains_key(TOKEN_KEY)
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.entries.read().get(TOKEN_KEY).cloned())
    }

    fn save(&self, token: &str) -> Result<()> {
        self.entries
            .write()
            .insert(TOKEN_KEY.to_string(), token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries.write().remove(TOKEN_KEY);
        Ok(())
    }
}
