//! Credential redaction for error messages and logs.
//!
//! Every message crossing the engine boundary is passed through a
//! [`Redactor`]: known secrets are replaced verbatim, and anything that
//! merely looks like a credential is replaced by pattern.

use std::sync::LazyLock;

use regex::Regex;

/// Fixed marker substituted for every redacted substring.
pub const REDACTION_MARKER: &str = "[REDACTED]";

/// Credential-shaped substrings: Google-style API keys, `sk-` keys,
/// bearer tokens and `key=` / `api_key=` query parameters.
static CREDENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)
        AIza[0-9A-Za-z_\-]{20,}
        | \bsk-[A-Za-z0-9_\-]{16,}
        | (?i:bearer)\s+[A-Za-z0-9._~+/\-]+=*
        ",
    )
    .expect("valid regex")
});

static KEY_PARAM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b((?:api_?)?key=)[^&\s]+").expect("valid regex")
});

/// Replaces secrets in free-form text.
#[derive(Clone, Default)]
pub struct Redactor {
    known: Vec<String>,
}

impl Redactor {
    /// Build a redactor that also scrubs the given exact secrets.
    pub fn new(known: Vec<String>) -> Self {
        let mut known: Vec<String> = known.into_iter().filter(|s| !s.is_empty()).collect();
        // Longest first so a secret containing another is replaced whole.
        known.sort_by_key(|s| std::cmp::Reverse(s.len()));
        Self { known }
    }

    pub fn redact(&self, message: &str) -> String {
        let mut out = message.to_string();
        for secret in &self.known {
            if out.contains(secret.as_str()) {
                out = out.replace(secret.as_str(), REDACTION_MARKER);
            }
        }
        redact_patterns(&out)
    }
}

impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("known", &self.known.len())
            .finish()
    }
}

/// Redact credential-shaped substrings only.
pub fn redact_patterns(message: &str) -> String {
    let out = CREDENTIAL_RE.replace_all(message, REDACTION_MARKER);
    KEY_PARAM_RE
        .replace_all(&out, format!("${{1}}{REDACTION_MARKER}"))
        .into_owned()
}
