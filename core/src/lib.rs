pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod identity;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod transport;

pub use api::{ApiClient, AuthGrant, RequestOptions};
pub use auth::{AuthManager, AuthManagerBuilder};
pub use config::{AuthConfig, ConfigError};
pub use error::{AuthError, AuthResult};
pub use identity::{
    ButtonContainer, ButtonOptions, CancelSignal, GoogleIdentity, IdentitySdk, SdkReadiness,
};
pub use session::{Session, SessionContext, SessionStatus, UserProfile};
pub use store::{FileTokenStore, MemoryTokenStore, TokenStore};
pub use transport::{HeaderMap, HeaderValue, HttpTransport, Method, MockTransport, ReqwestTransport};
