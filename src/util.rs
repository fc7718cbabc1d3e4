//! Shared utilities

use std::fmt;

/// A string wrapper that masks its contents in Debug/Display output.
/// Keeps API keys out of logs.
#[derive(Clone)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(s)
    }

    /// Access the raw secret value (for request headers)
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Empty keys and the literal "none" mean "send no Authorization header".
    pub fn is_usable(&self) -> bool {
        !self.0.is_empty() && self.0.to_lowercase() != "none"
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "***")
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Flatten free text to one line: line endings unified, each line trimmed,
/// blank lines dropped, whitespace runs collapsed, lines joined by one space.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}
