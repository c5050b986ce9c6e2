//! Error Capture: structured records for failed cases
//!
//! A case fails by returning an error or by panicking. Either way the failure
//! is folded into a [`TestError`]: a serializable record with the failure's
//! name, message, raw stack text, optional expected/actual values and the
//! source location of the first meaningful frame.
//!
//! Location parsing never fails. If no frame in the stack text looks like
//! `file:line:column`, the location fields stay empty.

use regex::Regex;
use serde::Serialize;
use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::Location;
use std::sync::OnceLock;
use thiserror::Error;

/// Frames from these paths belong to the toolchain or dependencies, not to the
/// code under test
const FOREIGN_FRAME_MARKERS: &[&str] = &["/rustc/", "/.cargo/registry/", "/.cargo/git/", "<"];

static FRAME_PATTERN: OnceLock<Regex> = OnceLock::new();
static PANIC_HOOK: OnceLock<()> = OnceLock::new();

thread_local! {
    /// Location of the most recent panic on this thread, set by the panic hook
    static LAST_PANIC_SITE: RefCell<Option<String>> = const { RefCell::new(None) };
}

fn frame_pattern() -> &'static Regex {
    FRAME_PATTERN.get_or_init(|| {
        Regex::new(r"(?:\(|\bat )(?P<file>[^\s()]+?):(?P<line>\d+):(?P<column>\d+)")
            .expect("frame pattern is valid")
    })
}

/// Line/column pair of a source location
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileLocation {
    pub line: u32,
    pub column: u32,
}

/// Structured record of a failed case
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestError {
    pub name: String,
    pub message: String,
    pub stack: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_location: Option<FileLocation>,
}

impl TestError {
    /// Build a record from raw parts, resolving the location from `stack`
    pub fn new(name: impl Into<String>, message: impl Into<String>, stack: impl Into<String>) -> Self {
        let stack = stack.into();
        let (source_file, file_location) = match parse_location(&stack) {
            Some((file, location)) => (Some(file), Some(location)),
            None => (None, None),
        };
        Self {
            name: name.into(),
            message: message.into(),
            stack,
            actual_value: None,
            expected_value: None,
            source_file,
            file_location,
        }
    }

    pub fn with_values(mut self, actual: impl Into<String>, expected: impl Into<String>) -> Self {
        self.actual_value = Some(actual.into());
        self.expected_value = Some(expected.into());
        self
    }

    /// Capture an error returned by a case body
    pub fn from_error(err: &anyhow::Error) -> Self {
        if let Some(mismatch) = err.downcast_ref::<Mismatch>() {
            let stack = format!("{err}\n    at {}", mismatch.location_string());
            return Self::new("Mismatch", err.to_string(), stack)
                .with_values(mismatch.actual.clone(), mismatch.expected.clone());
        }
        Self::new("Error", err.to_string(), format!("{err:?}"))
    }

    /// Capture a panic payload caught while polling a case body
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = panic_message(payload.as_ref());
        let site = LAST_PANIC_SITE.with(|slot| slot.borrow_mut().take());
        let stack = match &site {
            Some(site) => format!("panicked at {site}:\n{message}"),
            None => message.clone(),
        };

        match assertion_operands(&message) {
            Some((left, right)) => {
                let headline = message.lines().next().unwrap_or_default().to_string();
                Self::new("AssertionError", headline, stack).with_values(left, right)
            }
            None => Self::new("Panic", message, stack),
        }
    }

    /// `file:line:column`, when the location was resolved
    pub fn location_string(&self) -> Option<String> {
        match (&self.source_file, &self.file_location) {
            (Some(file), Some(loc)) => Some(format!("{}:{}:{}", file, loc.line, loc.column)),
            _ => None,
        }
    }
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let message = if self.message.is_empty() {
            "unknown"
        } else {
            self.message.as_str()
        };
        write!(f, "{}: {}", self.name, message)
    }
}

/// Expected/actual pair a case can return to describe a failed comparison.
///
/// Records the caller's location so the capture points at the case body.
#[derive(Debug, Error)]
#[error("expected {expected}, found {actual}")]
pub struct Mismatch {
    pub expected: String,
    pub actual: String,
    location: &'static Location<'static>,
}

impl Mismatch {
    #[track_caller]
    pub fn new(expected: impl fmt::Debug, actual: impl fmt::Debug) -> Self {
        Self {
            expected: format!("{expected:?}"),
            actual: format!("{actual:?}"),
            location: Location::caller(),
        }
    }

    fn location_string(&self) -> String {
        format!(
            "{}:{}:{}",
            self.location.file(),
            self.location.line(),
            self.location.column()
        )
    }
}

/// Find the first frame that points into the code under test.
///
/// Returns `None` instead of failing when nothing matches.
pub fn parse_location(stack: &str) -> Option<(String, FileLocation)> {
    stack.lines().find_map(|line| {
        frame_pattern().captures_iter(line).find_map(|caps| {
            let file = caps.name("file")?.as_str();
            if FOREIGN_FRAME_MARKERS.iter().any(|m| file.contains(m)) {
                return None;
            }
            let line = caps.name("line")?.as_str().parse().ok()?;
            let column = caps.name("column")?.as_str().parse().ok()?;
            Some((file.to_string(), FileLocation { line, column }))
        })
    })
}

/// Install the process-wide hook that remembers where a panic happened.
///
/// The previous hook still runs, so panic messages keep printing as usual.
pub fn install_panic_hook() {
    PANIC_HOOK.get_or_init(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                let site = format!(
                    "{}:{}:{}",
                    location.file(),
                    location.line(),
                    location.column()
                );
                LAST_PANIC_SITE.with(|slot| *slot.borrow_mut() = Some(site));
            }
            previous(info);
        }));
    });
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Box<dyn Any>".to_string()
    }
}

/// Pull `left`/`right` out of an `assert_eq!`/`assert_ne!` panic message
fn assertion_operands(message: &str) -> Option<(String, String)> {
    if !message.starts_with("assertion") {
        return None;
    }
    let mut left = None;
    let mut right = None;
    for line in message.lines() {
        let trimmed = line.trim_start();
        if let Some(value) = trimmed.strip_prefix("left:") {
            left = Some(value.trim().to_string());
        } else if let Some(value) = trimmed.strip_prefix("right:") {
            right = Some(value.trim().to_string());
        }
    }
    Some((left?, right?))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parenthesised_frame() {
        let stack = "AssertionError: nope\n    at Object.check (file:///work/math.test.ts:12:9)";
        let (file, loc) = parse_location(stack).unwrap();
        assert_eq!(file, "file:///work/math.test.ts");
        assert_eq!(loc, FileLocation { line: 12, column: 9 });
    }

    #[test]
    fn test_parse_panic_header() {
        let stack = "panicked at src/suites/math.rs:40:5:\nboom";
        let (file, loc) = parse_location(stack).unwrap();
        assert_eq!(file, "src/suites/math.rs");
        assert_eq!(loc.line, 40);
        assert_eq!(loc.column, 5);
    }

    #[test]
    fn test_parse_skips_toolchain_frames() {
        let stack = "\
   0: std::panicking::begin_panic
             at /rustc/abc123/library/std/src/panicking.rs:611:12
   1: anyhow::error::construct
             at /home/dev/.cargo/registry/src/anyhow-1.0.80/src/error.rs:20:1
   2: demo::suite::case
             at ./src/suite.rs:77:13";
        let (file, loc) = parse_location(stack).unwrap();
        assert_eq!(file, "./src/suite.rs");
        assert_eq!(loc.line, 77);
    }

    #[test]
    fn test_parse_miss_leaves_location_empty() {
        assert!(parse_location("no frames in here").is_none());

        let err = TestError::new("Error", "plain", "nothing to see");
        assert!(err.source_file.is_none());
        assert!(err.file_location.is_none());
        assert!(err.location_string().is_none());
    }

    #[test]
    fn test_from_error_plain() {
        let err = anyhow::anyhow!("connection refused");
        let captured = TestError::from_error(&err);
        assert_eq!(captured.name, "Error");
        assert_eq!(captured.message, "connection refused");
        assert!(captured.actual_value.is_none());
    }

    #[test]
    fn test_from_error_mismatch_carries_values_and_location() {
        let err: anyhow::Error = Mismatch::new(2, 3).into();
        let captured = TestError::from_error(&err);
        assert_eq!(captured.name, "Mismatch");
        assert_eq!(captured.expected_value.as_deref(), Some("2"));
        assert_eq!(captured.actual_value.as_deref(), Some("3"));
        assert!(captured.source_file.unwrap().ends_with("capture.rs"));
    }

    #[test]
    fn test_from_panic_assertion_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from(
            "assertion `left == right` failed\n  left: 1\n right: 2",
        ));
        let captured = TestError::from_panic(payload);
        assert_eq!(captured.name, "AssertionError");
        assert_eq!(captured.message, "assertion `left == right` failed");
        assert_eq!(captured.actual_value.as_deref(), Some("1"));
        assert_eq!(captured.expected_value.as_deref(), Some("2"));
    }

    #[test]
    fn test_from_panic_records_hook_location() {
        install_panic_hook();
        let payload = std::panic::catch_unwind(|| panic!("kaboom")).unwrap_err();
        let captured = TestError::from_panic(payload);
        assert_eq!(captured.name, "Panic");
        assert_eq!(captured.message, "kaboom");
        assert!(captured.source_file.unwrap().ends_with("capture.rs"));
    }

    #[test]
    fn test_display_uses_unknown_for_empty_message() {
        let err = TestError::new("Panic", "", "");
        assert_eq!(err.to_string(), "Panic: unknown");
    }

    #[test]
    fn test_serializes_camel_case() {
        let err = TestError::new("Error", "bad", "at src/lib.rs:1:2").with_values("a", "b");
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("\"sourceFile\":\"src/lib.rs\""));
        assert!(json.contains("\"fileLocation\":{\"line\":1,\"column\":2}"));
        assert!(json.contains("\"actualValue\":\"a\""));
    }
}
