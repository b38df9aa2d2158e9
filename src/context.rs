//! Import context shared by every row of a run.
//!
//! Passed explicitly into the engine; nothing reads credentials from
//! process-wide state.

use std::sync::Arc;

use crate::backend::{EntityService, Session};
use crate::engine::localize::DEFAULT_LANGUAGES;

// ─────────────────────────────────────────────────────────────────────────────
// ImportContext
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a row handler needs besides its own row.
///
/// Read-only once built, so it is shared between concurrent rows behind an
/// `Arc` without locking.
pub struct ImportContext {
    /// Remote store every lookup and write goes through.
    pub service: Arc<dyn EntityService>,
    /// Credentials attached to every backend call.
    pub session: Session,
    /// Localized column languages, primary first.
    pub languages: Vec<String>,
}

impl ImportContext {
    pub fn new(service: Arc<dyn EntityService>, session: Session) -> Self {
        Self {
            service,
            session,
            languages: DEFAULT_LANGUAGES.iter().map(|l| l.to_string()).collect(),
        }
    }

    pub fn with_languages(mut self, languages: Vec<String>) -> Self {
        self.languages = languages;
        self
    }
}

impl std::fmt::Debug for ImportContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImportContext")
            .field("session", &self.session)
            .field("languages", &self.languages)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryStore;

    #[test]
    fn defaults_to_three_languages() {
        let ctx = ImportContext::new(Arc::new(MemoryStore::new()), Session::local_defaults());
        assert_eq!(ctx.languages, vec!["en_NZ", "zh", "jp"]);
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let ctx = ImportContext::new(Arc::new(MemoryStore::new()), Session::local_defaults());
        let output = format!("{:?}", ctx);
        assert!(!output.contains("master_key\""));
        assert!(output.contains("[REDACTED]"));
    }
}
