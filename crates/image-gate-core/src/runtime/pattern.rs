// crates/image-gate-core/src/runtime/pattern.rs
// ============================================================================
// Module: Image Gate Pattern Matcher
// Description: Glob-style matchers where `*` is the only wildcard.
// Purpose: Compare registries, repositories, tags, digests, and trigger ids.
// Dependencies: regex, thiserror
// ============================================================================

//! ## Overview
//! A glob is split on `*`, every literal segment is escaped, the segments are
//! joined with `(.*)`, and the result is anchored with `^...$`. Regex
//! metacharacters in the glob are therefore always literal.

use regex::Regex;
use thiserror::Error;

/// Errors raised when compiling a glob.
#[derive(Debug, Error)]
pub enum PatternError {
    /// The generated expression was rejected by the regex engine.
    #[error("invalid pattern `{pattern}`: {error}")]
    Invalid {
        /// Source glob.
        pattern: String,
        /// Regex engine error text.
        error: String,
    },
}

/// Compiled glob matcher.
#[derive(Debug, Clone)]
pub struct GlobPattern {
    /// Source glob.
    raw: String,
    /// Anchored expression, absent for plain literals.
    regex: Option<Regex>,
}

impl GlobPattern {
    /// Compiles a glob.
    ///
    /// # Errors
    ///
    /// Returns [`PatternError::Invalid`] when the generated expression is rejected.
    pub fn new(glob: &str) -> Result<Self, PatternError> {
        if !glob.contains('*') {
            return Ok(Self {
                raw: glob.to_string(),
                regex: None,
            });
        }
        let body = glob.split('*').map(regex::escape).collect::<Vec<_>>().join("(.*)");
        let regex = Regex::new(&format!("^{body}$")).map_err(|err| PatternError::Invalid {
            pattern: glob.to_string(),
            error: err.to_string(),
        })?;
        Ok(Self {
            raw: glob.to_string(),
            regex: Some(regex),
        })
    }

    /// Returns the source glob.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns true when the glob contains a wildcard.
    #[must_use]
    pub const fn is_wildcard(&self) -> bool {
        self.regex.is_some()
    }

    /// Returns true when the candidate matches the whole glob.
    #[must_use]
    pub fn matches(&self, candidate: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(candidate),
            None => self.raw == candidate,
        }
    }

    /// Returns true when any candidate matches.
    pub fn matches_any<'a, I>(&self, candidates: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        candidates.into_iter().any(|candidate| self.matches(candidate))
    }
}
