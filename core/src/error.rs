use std::time::Duration;

/// Failures surfaced by the session manager and its collaborators.
#[derive(thiserror::Error, Debug)]
pub enum AuthError {
    /// The backend answered with a non-2xx status.
    #[error("{message}")]
    Request { status: u16, message: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("configuration missing: {0}")]
    Config(String),
    #[error("Google prompt not displayed")]
    PromptNotDisplayed { reason: Option<String> },
    #[error("identity provider not ready after {0:?}")]
    ReadinessTimeout(Duration),
    #[error("operation cancelled")]
    Cancelled,
    #[error("malformed auth response: {0}")]
    MalformedResponse(String),
    #[error("token storage failure: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AuthError {
    /// HTTP status carried by a request failure, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Request { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

pub type AuthResult<T> = std::result::Result<T, AuthError>;
