//! Printer event detection.

/// Decides whether a kernel log line is a printer event.
///
/// A line matches when any token occurs in it verbatim (case-sensitive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMatcher {
    tokens: Vec<String>,
}

impl EventMatcher {
    /// Creates a matcher for the given tokens. Empty tokens are dropped.
    #[must_use]
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens
                .into_iter()
                .map(Into::into)
                .filter(|token: &String| !token.is_empty())
                .collect(),
        }
    }

    /// Returns true if `line` contains any token.
    #[must_use]
    pub fn matches(&self, line: &str) -> bool {
        self.tokens.iter().any(|token| line.contains(token.as_str()))
    }

    /// The tokens this matcher looks for.
    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}
