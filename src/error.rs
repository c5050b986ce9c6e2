//! Error types for the execution engine
//!
//! Case failures never show up here: they are recorded as data on the
//! [`Test`](crate::case::Test) that produced them. This enum covers the
//! failures that abort an invocation (broken hooks, missing or failing
//! modules, unreadable configuration).

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Which lifecycle hook raised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    Setup,
    Teardown,
    BeforeEach,
    AfterEach,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HookKind::Setup => "on_setup",
            HookKind::Teardown => "on_teardown",
            HookKind::BeforeEach => "on_before_each",
            HookKind::AfterEach => "on_after_each",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// A lifecycle hook failed; fatal to the suite and the enclosing run
    #[error("{hook} hook of suite `{suite}` failed: {source}")]
    Hook {
        suite: String,
        hook: HookKind,
        #[source]
        source: anyhow::Error,
    },

    /// The module loader could not produce a module
    #[error("failed to load module `{locator}`: {source}")]
    Load {
        locator: String,
        #[source]
        source: anyhow::Error,
    },

    /// No module is registered under this locator
    #[error("no module registered for locator `{0}`")]
    UnknownLocator(String),

    /// Configuration file could not be parsed
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hook_error_display() {
        let err = Error::Hook {
            suite: "CounterSuite".to_string(),
            hook: HookKind::BeforeEach,
            source: anyhow::anyhow!("database offline"),
        };
        let msg = err.to_string();
        assert!(msg.contains("on_before_each"));
        assert!(msg.contains("CounterSuite"));
        assert!(msg.contains("database offline"));
    }

    #[test]
    fn test_load_error_keeps_source() {
        let err = Error::Load {
            locator: "math".to_string(),
            source: anyhow::anyhow!("boom"),
        };
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_toml_error_converts_to_config() {
        let parsed: std::result::Result<toml::Table, _> = toml::from_str("run = [");
        let err: Error = parsed.unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }
}
