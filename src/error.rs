use serde::Serialize;
use thiserror::Error;

use crate::backend::EntityKind;

/// Patterns (lowercase) that indicate sensitive data not safe for display.
/// Used by `contains_sensitive()` for case-insensitive matching.
pub(crate) const SENSITIVE_PATTERNS: &[&str] = &[
    "x-parse-master-key",
    "x-parse-session-token",
    "master_key",
    "masterkey",
    "sessiontoken",
    "session_token",
    "password",
];

/// Returns true if the message contains any sensitive pattern (case-insensitive).
fn contains_sensitive(msg: &str) -> bool {
    let lower = msg.to_ascii_lowercase();
    SENSITIVE_PATTERNS.iter().any(|p| lower.contains(p))
}

/// Sanitizes a message for display.
/// If sensitive content is detected, returns the fallback instead.
fn sanitize_message(msg: &str, fallback: &str) -> String {
    if contains_sensitive(msg) {
        fallback.into()
    } else {
        msg.to_string()
    }
}

/// User-friendly error presentation for the terminal.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorPresentation {
    pub title: String,
    pub message: String,
    pub action: Option<String>,
}

/// Application-wide error type.
///
/// These are setup-level failures: any of them reaching `main` aborts the
/// run. Failures scoped to a single row are [`RowError`]s instead.
#[derive(Debug, Error)]
pub enum AppError {
    // ── Auth ──────────────────────────────────────────────────────────────────
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    // ── Backend ───────────────────────────────────────────────────────────────
    #[error("Backend error {code}: {message}")]
    Backend { code: i64, message: String },

    #[error("Unexpected backend response: {0}")]
    UnexpectedResponse(String),

    #[error("Invalid server URL: {0}")]
    InvalidServerUrl(String),

    // ── File / CSV ────────────────────────────────────────────────────────────
    #[error("Failed to read input file: {0}")]
    Io(String),

    #[error("File is not valid UTF-8")]
    NotUtf8,

    #[error("Invalid CSV: {0}")]
    CsvInvalid(String),

    #[error("Invalid column schema: {0}")]
    InvalidSchema(String),

    // ── Network ───────────────────────────────────────────────────────────────
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // ── Generic fallback ──────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Converts the error into a presentation suitable for terminal output.
    /// Never leaks keys, session tokens, or passwords.
    pub fn to_presentation(&self) -> ErrorPresentation {
        match self {
            // ── Auth ──────────────────────────────────────────────────────────
            AppError::NotAuthenticated => ErrorPresentation {
                title: "Not Authorized".into(),
                message: "The backend rejected the supplied credentials.".into(),
                action: Some("Check the application id and master key".into()),
            },

            AppError::LoginFailed(_) => ErrorPresentation {
                title: "Login Failed".into(),
                message: "Could not log in with the supplied username and password.".into(),
                action: Some("Check the username and password and log in again".into()),
            },

            // ── Backend ───────────────────────────────────────────────────────
            AppError::Backend { code, message } => ErrorPresentation {
                title: "Backend Error".into(),
                message: format!(
                    "[{}] {}",
                    code,
                    sanitize_message(message, "The backend reported an error.")
                ),
                action: None,
            },

            AppError::UnexpectedResponse(msg) => ErrorPresentation {
                title: "Unexpected Response".into(),
                message: sanitize_message(msg, "The backend returned an unexpected response."),
                action: Some("Check the server URL points at a Parse server".into()),
            },

            AppError::InvalidServerUrl(url) => ErrorPresentation {
                title: "Invalid Server URL".into(),
                message: format!("'{}' is not a valid server URL.", url),
                action: Some("Pass a full URL such as http://localhost:1337/parse".into()),
            },

            // ── File / CSV ────────────────────────────────────────────────────
            AppError::Io(msg) => ErrorPresentation {
                title: "Cannot Read File".into(),
                message: msg.clone(),
                action: Some("Check the CSV file path".into()),
            },

            AppError::NotUtf8 => ErrorPresentation {
                title: "Invalid File Encoding".into(),
                message: "The file must be UTF-8 encoded. Please re-save your file with UTF-8 encoding.".into(),
                action: Some("Convert file to UTF-8".into()),
            },

            AppError::CsvInvalid(msg) => ErrorPresentation {
                title: "Invalid CSV".into(),
                message: format!("The CSV file has a formatting problem: {}", msg),
                action: Some("Fix the CSV file and try again".into()),
            },

            AppError::InvalidSchema(msg) => ErrorPresentation {
                title: "Invalid Column Schema".into(),
                message: msg.clone(),
                action: None,
            },

            // ── Network ───────────────────────────────────────────────────────
            AppError::ConnectionFailed(_) => ErrorPresentation {
                title: "Connection Failed".into(),
                message: "Could not connect to the backend. Please check the server URL and network.".into(),
                action: Some("Check network and retry".into()),
            },

            // ── Generic ───────────────────────────────────────────────────────
            AppError::Internal(_) => ErrorPresentation {
                title: "Unexpected Error".into(),
                message: "Something went wrong. Please try again.".into(),
                action: Some("Try again".into()),
            },
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RowError
// ─────────────────────────────────────────────────────────────────────────────

/// Failure confined to a single input row.
///
/// Row errors never abort the run. Data errors (`is_data_error`) mark the row
/// as skipped; everything else marks it as errored.
#[derive(Debug, Error)]
pub enum RowError {
    #[error("missing value for column '{column}'")]
    MissingValue { column: String },

    #[error("invalid value '{value}' for column '{column}': {reason}")]
    InvalidValue {
        column: String,
        value: String,
        reason: String,
    },

    #[error("no {} found for actor {} with {field} '{value}'", .kind.label(), actor_label(.actor))]
    NotFound {
        kind: EntityKind,
        actor: Option<String>,
        field: String,
        value: String,
    },

    #[error(
        "multiple {} found for actor {} with {field} '{value}' (ids: {})",
        .kind.label(),
        actor_label(.actor),
        .ids.join(", ")
    )]
    Ambiguous {
        kind: EntityKind,
        actor: Option<String>,
        field: String,
        value: String,
        ids: Vec<String>,
    },

    #[error(
        "backend call failed for {} of actor {} with {field} '{value}': {source}",
        .kind.label(),
        actor_label(.actor)
    )]
    Remote {
        kind: EntityKind,
        actor: Option<String>,
        field: String,
        value: String,
        source: AppError,
    },

    #[error("backend call failed: {0}")]
    Backend(#[from] AppError),

    #[error("row handler panicked: {0}")]
    Panicked(String),
}

fn actor_label(actor: &Option<String>) -> &str {
    actor.as_deref().unwrap_or("-")
}

impl RowError {
    /// Returns true for authoring defects in the input data, as opposed to
    /// failures while talking to the backend.
    pub fn is_data_error(&self) -> bool {
        !matches!(
            self,
            RowError::Remote { .. } | RowError::Backend(_) | RowError::Panicked(_)
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
