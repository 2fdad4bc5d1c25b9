//! # Raw task inputs and their normalization.
//!
//! A start request carries two text blobs: one credential per line and one
//! message per line. They are parsed exactly once, when the task is built:
//!
//! ```text
//! credentials: "tok-a\n\n  tok-b \n"  ──► [Credential("tok-a"), Credential("tok-b")]
//! messages:    "hello\r\nworld\n\n"   ──► ["<prefix> hello <suffix>", "<prefix> world <suffix>"]
//! ```
//!
//! The raw inputs are kept verbatim for snapshots (`originalInputs`).

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Opaque login material for one channel. Never mutated, never logged.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    /// Wraps raw credential text.
    pub fn new(raw: impl Into<Arc<str>>) -> Self {
        Self(raw.into())
    }

    /// Raw credential text, for the channel factory.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Credential(<{} bytes>)", self.0.len())
    }
}

/// Inputs of a start request, as supplied by the owner.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInputs {
    /// One credential per line.
    pub credentials: String,
    /// One message per line.
    pub messages: String,
    /// Prepended to every message.
    pub prefix: String,
    /// Appended to every message.
    pub suffix: String,
    /// Destination every message is delivered to.
    pub destination: String,
    /// Delay between resolved sends, in seconds. `0` uses the engine default.
    pub delay_seconds: u64,
}

impl TaskInputs {
    /// Splits the credential blob into trimmed, non-empty lines.
    pub fn parse_credentials(&self) -> Vec<Credential> {
        self.credentials
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Credential::new)
            .collect()
    }

    /// Formats every non-blank message line as `prefix + " " + line + " " + suffix`.
    ///
    /// Carriage returns are stripped before trimming.
    pub fn format_messages(&self) -> Vec<String> {
        self.messages
            .split('\n')
            .map(|line| line.replace('\r', ""))
            .map(|line| line.trim().to_string())
            .filter(|line| !line.is_empty())
            .map(|line| format!("{} {} {}", self.prefix, line, self.suffix))
            .collect()
    }
}
