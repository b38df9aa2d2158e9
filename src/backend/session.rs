//! Connection credentials passed explicitly to every backend call.

use secrecy::SecretString;

/// Default values used when a connection option is not supplied.
pub const DEFAULT_SERVER_URL: &str = "http://localhost:1337/parse";
pub const DEFAULT_APPLICATION_ID: &str = "app_id";
pub const DEFAULT_JAVASCRIPT_KEY: &str = "javascript_key";
pub const DEFAULT_MASTER_KEY: &str = "master_key";

/// Credentials for one backend connection.
///
/// Secret fields are wrapped in `SecretString` so they never show up in
/// `Debug` output or logs.
#[derive(Clone)]
pub struct Session {
    /// Application id sent with every request.
    pub application_id: String,
    /// JavaScript key, sent when present.
    pub javascript_key: Option<SecretString>,
    /// Master key, sent when present. Bypasses record-level ACLs.
    pub master_key: Option<SecretString>,
    /// Session token obtained from a user login.
    pub session_token: Option<SecretString>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("application_id", &self.application_id)
            .field(
                "javascript_key",
                &self.javascript_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("master_key", &self.master_key.as_ref().map(|_| "[REDACTED]"))
            .field(
                "session_token",
                &self.session_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

impl Session {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            javascript_key: None,
            master_key: None,
            session_token: None,
        }
    }

    pub fn with_javascript_key(mut self, key: impl Into<String>) -> Self {
        self.javascript_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_master_key(mut self, key: impl Into<String>) -> Self {
        self.master_key = Some(SecretString::from(key.into()));
        self
    }

    pub fn with_session_token(mut self, token: SecretString) -> Self {
        self.session_token = Some(token);
        self
    }

    /// Session using the local development defaults.
    pub fn local_defaults() -> Self {
        Self::new(DEFAULT_APPLICATION_ID)
            .with_javascript_key(DEFAULT_JAVASCRIPT_KEY)
            .with_master_key(DEFAULT_MASTER_KEY)
    }
}
