//! Secret redaction for logged command lines and CLI output
//!
//! Auth URLs and access tokens pass through the process runner as arguments
//! and JSON output. Values registered here are replaced before anything is
//! written to the log. Detection is plain substring replacement with a length
//! threshold so short values never mask unrelated text.

use std::collections::HashSet;
use std::sync::{Arc, RwLock};

/// Minimum length for a value to be considered for redaction
const MIN_REDACTION_LENGTH: usize = 8;

/// Replacement text for redacted secrets
pub const REDACTION_PLACEHOLDER: &str = "****";

/// Thread-safe registry of secret values that must never reach the logs
#[derive(Debug, Clone, Default)]
pub struct SecretRegistry {
    inner: Arc<RwLock<HashSet<String>>>,
}

impl SecretRegistry {
    /// Create a new empty secret registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret value; values shorter than the threshold are ignored
    pub fn add_secret(&self, secret: &str) {
        let secret = secret.trim();
        if secret.len() < MIN_REDACTION_LENGTH {
            return;
        }
        if let Ok(mut inner) = self.inner.write() {
            inner.insert(secret.to_string());
        }
    }

    /// Replace every registered secret in `text`
    pub fn redact_text(&self, text: &str) -> String {
        let Ok(inner) = self.inner.read() else {
            return text.to_string();
        };
        if inner.is_empty() {
            return text.to_string();
        }

        // Longest first so a secret containing another is replaced whole
        let mut secrets: Vec<&String> = inner.iter().collect();
        secrets.sort_by_key(|s| std::cmp::Reverse(s.len()));

        let mut redacted = text.to_string();
        for secret in secrets {
            if redacted.contains(secret.as_str()) {
                redacted = redacted.replace(secret.as_str(), REDACTION_PLACEHOLDER);
            }
        }
        redacted
    }

    /// Number of registered secrets
    pub fn secret_count(&self) -> usize {
        self.inner.read().map(|inner| inner.len()).unwrap_or(0)
    }

    /// Remove all registered secrets
    pub fn clear(&self) {
        if let Ok(mut inner) = self.inner.write() {
            inner.clear();
        }
    }
}

static GLOBAL_REGISTRY: once_cell::sync::Lazy<SecretRegistry> =
    once_cell::sync::Lazy::new(SecretRegistry::new);

/// Process-wide registry consulted by the process runner
pub fn global_registry() -> &'static SecretRegistry {
    &GLOBAL_REGISTRY
}

/// Register a secret with the process-wide registry
pub fn add_global_secret(secret: &str) {
    global_registry().add_secret(secret);
}

/// Redact text using the process-wide registry
pub fn redact(text: &str) -> String {
    global_registry().redact_text(text)
}
