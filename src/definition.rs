//! Suite Definitions: what a suite author registers
//!
//! A suite is declared with the [`SuiteDefinition`] builder: a class name, a
//! constructor for the fixture type, the case bodies in declaration order and
//! the resolved metadata (sequential marker, debug marker, hooks,
//! descriptions). The engine never sees the fixture type itself: it works
//! through the object-safe [`SuiteBlueprint`] and [`FixtureInstance`] traits,
//! and a loaded module exports suites as [`SuiteHandle`]s.
//!
//! ## Hooks
//!
//! - Suite-level `on_setup` / `on_teardown` run once per suite run and do not
//!   touch a fixture.
//! - Member hooks (`on_member_setup`, `on_member_teardown`, `on_before_each`,
//!   `on_after_each`) run against a fixture instance. Declaring any of them
//!   forces the sequential discipline so hook and case see the same state.

use crate::case::Test;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Outcome of a case body or hook
pub type CaseResult = anyhow::Result<()>;

type CaseFn<F> = Arc<dyn for<'a> Fn(&'a mut F) -> BoxFuture<'a, CaseResult> + Send + Sync>;
type MemberHookFn<F> = Arc<dyn for<'a> Fn(&'a mut F) -> BoxFuture<'a, CaseResult> + Send + Sync>;
type CaseHookFn<F> =
    Arc<dyn for<'a> Fn(&'a mut F, &'a Test) -> BoxFuture<'a, CaseResult> + Send + Sync>;
type SuiteHookFn = Arc<dyn Fn() -> BoxFuture<'static, CaseResult> + Send + Sync>;

/// Names that never become cases: constructors and hook names
pub const RESERVED_NAMES: &[&str] = &[
    "new",
    "constructor",
    "on_setup",
    "on_teardown",
    "on_before_each",
    "on_after_each",
    "on_member_setup",
    "on_member_teardown",
];

/// Resolved metadata read by the engine
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SuiteMetadata {
    /// Explicit "run sequentially" marker
    pub sequential: bool,
    /// Name of the single case marked for debug isolation
    pub debug_case: Option<String>,
    /// Free-text descriptions keyed by case name
    pub descriptions: HashMap<String, String>,
}

/// Type-erased view of a suite definition
pub trait SuiteBlueprint: Send + Sync {
    fn class_name(&self) -> &str;

    /// Case names in declaration order
    fn case_names(&self) -> Vec<String>;

    fn metadata(&self) -> &SuiteMetadata;

    /// True when any hook runs against a fixture instance
    fn has_member_hooks(&self) -> bool;

    fn suite_setup(&self) -> Option<BoxFuture<'static, CaseResult>>;

    fn suite_teardown(&self) -> Option<BoxFuture<'static, CaseResult>>;

    /// Construct a fresh fixture instance
    fn instantiate(self: Arc<Self>) -> Box<dyn FixtureInstance>;
}

/// One constructed fixture, able to run cases and member hooks against itself
pub trait FixtureInstance: Send {
    fn run_case<'a>(&'a mut self, case: &'a str) -> BoxFuture<'a, CaseResult>;

    fn setup(&mut self) -> Option<BoxFuture<'_, CaseResult>>;

    fn teardown(&mut self) -> Option<BoxFuture<'_, CaseResult>>;

    fn before_each<'a>(&'a mut self, test: &'a Test) -> Option<BoxFuture<'a, CaseResult>>;

    fn after_each<'a>(&'a mut self, test: &'a Test) -> Option<BoxFuture<'a, CaseResult>>;
}

/// Builder for a suite over fixture type `F`
pub struct SuiteDefinition<F> {
    class_name: String,
    construct: Arc<dyn Fn() -> F + Send + Sync>,
    cases: Vec<(String, CaseFn<F>)>,
    metadata: SuiteMetadata,
    suite_setup: Option<SuiteHookFn>,
    suite_teardown: Option<SuiteHookFn>,
    member_setup: Option<MemberHookFn<F>>,
    member_teardown: Option<MemberHookFn<F>>,
    before_each: Option<CaseHookFn<F>>,
    after_each: Option<CaseHookFn<F>>,
}

impl<F: Send + 'static> SuiteDefinition<F> {
    pub fn new(class_name: impl Into<String>, construct: impl Fn() -> F + Send + Sync + 'static) -> Self {
        Self {
            class_name: class_name.into(),
            construct: Arc::new(construct),
            cases: Vec::new(),
            metadata: SuiteMetadata::default(),
            suite_setup: None,
            suite_teardown: None,
            member_setup: None,
            member_teardown: None,
            before_each: None,
            after_each: None,
        }
    }

    /// Register a case. Reserved and duplicate names are ignored.
    pub fn case<C>(mut self, name: impl Into<String>, body: C) -> Self
    where
        C: for<'a> Fn(&'a mut F) -> BoxFuture<'a, CaseResult> + Send + Sync + 'static,
    {
        let name = name.into();
        if RESERVED_NAMES.contains(&name.as_str()) {
            tracing::warn!(suite = %self.class_name, case = %name, "reserved name is not a case");
            return self;
        }
        if self.cases.iter().any(|(existing, _)| *existing == name) {
            tracing::warn!(suite = %self.class_name, case = %name, "duplicate case ignored");
            return self;
        }
        self.cases.push((name, Arc::new(body)));
        self
    }

    pub fn describe(mut self, case: impl Into<String>, text: impl Into<String>) -> Self {
        self.metadata.descriptions.insert(case.into(), text.into());
        self
    }

    /// Run every case on one shared fixture, in declaration order
    pub fn sequential(mut self) -> Self {
        self.metadata.sequential = true;
        self
    }

    /// Mark one case for debug isolation. A later call replaces the marker.
    pub fn debug(mut self, case: impl Into<String>) -> Self {
        self.metadata.debug_case = Some(case.into());
        self
    }

    pub fn on_setup<H>(mut self, hook: H) -> Self
    where
        H: Fn() -> BoxFuture<'static, CaseResult> + Send + Sync + 'static,
    {
        self.suite_setup = Some(Arc::new(hook));
        self
    }

    pub fn on_teardown<H>(mut self, hook: H) -> Self
    where
        H: Fn() -> BoxFuture<'static, CaseResult> + Send + Sync + 'static,
    {
        self.suite_teardown = Some(Arc::new(hook));
        self
    }

    pub fn on_member_setup<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a mut F) -> BoxFuture<'a, CaseResult> + Send + Sync + 'static,
    {
        self.member_setup = Some(Arc::new(hook));
        self
    }

    pub fn on_member_teardown<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a mut F) -> BoxFuture<'a, CaseResult> + Send + Sync + 'static,
    {
        self.member_teardown = Some(Arc::new(hook));
        self
    }

    pub fn on_before_each<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a mut F, &'a Test) -> BoxFuture<'a, CaseResult> + Send + Sync + 'static,
    {
        self.before_each = Some(Arc::new(hook));
        self
    }

    pub fn on_after_each<H>(mut self, hook: H) -> Self
    where
        H: for<'a> Fn(&'a mut F, &'a Test) -> BoxFuture<'a, CaseResult> + Send + Sync + 'static,
    {
        self.after_each = Some(Arc::new(hook));
        self
    }
}

impl<F: Send + 'static> SuiteBlueprint for SuiteDefinition<F> {
    fn class_name(&self) -> &str {
        &self.class_name
    }

    fn case_names(&self) -> Vec<String> {
        self.cases.iter().map(|(name, _)| name.clone()).collect()
    }

    fn metadata(&self) -> &SuiteMetadata {
        &self.metadata
    }

    fn has_member_hooks(&self) -> bool {
        self.member_setup.is_some()
            || self.member_teardown.is_some()
            || self.before_each.is_some()
            || self.after_each.is_some()
    }

    fn suite_setup(&self) -> Option<BoxFuture<'static, CaseResult>> {
        self.suite_setup.as_ref().map(|hook| hook())
    }

    fn suite_teardown(&self) -> Option<BoxFuture<'static, CaseResult>> {
        self.suite_teardown.as_ref().map(|hook| hook())
    }

    fn instantiate(self: Arc<Self>) -> Box<dyn FixtureInstance> {
        let fixture = (self.construct)();
        Box::new(Instance {
            fixture,
            definition: self,
        })
    }
}

struct Instance<F> {
    fixture: F,
    definition: Arc<SuiteDefinition<F>>,
}

impl<F: Send + 'static> FixtureInstance for Instance<F> {
    fn run_case<'a>(&'a mut self, case: &'a str) -> BoxFuture<'a, CaseResult> {
        let body = self
            .definition
            .cases
            .iter()
            .find(|(name, _)| name == case)
            .map(|(_, body)| Arc::clone(body));
        match body {
            Some(body) => body(&mut self.fixture),
            None => Box::pin(async move { Err(anyhow::anyhow!("no case named `{case}`")) }),
        }
    }

    fn setup(&mut self) -> Option<BoxFuture<'_, CaseResult>> {
        let hook = self.definition.member_setup.clone()?;
        Some(hook(&mut self.fixture))
    }

    fn teardown(&mut self) -> Option<BoxFuture<'_, CaseResult>> {
        let hook = self.definition.member_teardown.clone()?;
        Some(hook(&mut self.fixture))
    }

    fn before_each<'a>(&'a mut self, test: &'a Test) -> Option<BoxFuture<'a, CaseResult>> {
        let hook = self.definition.before_each.clone()?;
        Some(hook(&mut self.fixture, test))
    }

    fn after_each<'a>(&'a mut self, test: &'a Test) -> Option<BoxFuture<'a, CaseResult>> {
        let hook = self.definition.after_each.clone()?;
        Some(hook(&mut self.fixture, test))
    }
}

/// A suite definition as exported from a module
#[derive(Clone)]
pub struct SuiteHandle(Arc<dyn SuiteBlueprint>);

impl SuiteHandle {
    pub fn new(blueprint: impl SuiteBlueprint + 'static) -> Self {
        Self(Arc::new(blueprint))
    }

    pub fn blueprint(&self) -> &Arc<dyn SuiteBlueprint> {
        &self.0
    }

    pub fn class_name(&self) -> &str {
        self.0.class_name()
    }
}

impl<F: Send + 'static> From<SuiteDefinition<F>> for SuiteHandle {
    fn from(definition: SuiteDefinition<F>) -> Self {
        Self::new(definition)
    }
}

impl fmt::Debug for SuiteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SuiteHandle").field(&self.class_name()).finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: u32,
    }

    fn bump(c: &mut Counter) -> BoxFuture<'_, CaseResult> {
        Box::pin(async move {
            c.value += 1;
            Ok(())
        })
    }

    fn noop(_: &mut Counter) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_case_order_is_declaration_order() {
        let def = SuiteDefinition::new("Counter", Counter::default)
            .case("zeta", bump)
            .case("alpha", noop)
            .case("mid", noop);
        assert_eq!(def.case_names(), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_reserved_and_duplicate_names_are_skipped() {
        let def = SuiteDefinition::new("Counter", Counter::default)
            .case("constructor", noop)
            .case("on_before_each", noop)
            .case("first", bump)
            .case("first", noop);
        assert_eq!(def.case_names(), vec!["first"]);
    }

    #[test]
    fn test_member_hooks_detected() {
        let plain = SuiteDefinition::new("Counter", Counter::default).case("a", noop);
        assert!(!plain.has_member_hooks());

        let hooked = SuiteDefinition::new("Counter", Counter::default)
            .case("a", noop)
            .on_member_setup(noop);
        assert!(hooked.has_member_hooks());

        let suite_level = SuiteDefinition::new("Counter", Counter::default)
            .case("a", noop)
            .on_setup(|| Box::pin(async { Ok(()) }));
        assert!(!suite_level.has_member_hooks());
    }

    #[test]
    fn test_metadata_builders() {
        let def = SuiteDefinition::new("Counter", Counter::default)
            .case("a", noop)
            .sequential()
            .debug("a")
            .describe("a", "does nothing");
        let meta = def.metadata();
        assert!(meta.sequential);
        assert_eq!(meta.debug_case.as_deref(), Some("a"));
        assert_eq!(meta.descriptions.get("a").map(String::as_str), Some("does nothing"));
    }

    #[tokio::test]
    async fn test_instances_are_independent() {
        let handle = SuiteHandle::from(SuiteDefinition::new("Counter", Counter::default).case("bump", bump));

        let mut first = Arc::clone(handle.blueprint()).instantiate();
        first.run_case("bump").await.unwrap();
        first.run_case("bump").await.unwrap();

        // A second instance starts from the constructor again
        let mut second = Arc::clone(handle.blueprint()).instantiate();
        second.run_case("bump").await.unwrap();
        assert!(second.setup().is_none());
    }

    #[tokio::test]
    async fn test_unknown_case_is_an_error() {
        let handle = SuiteHandle::from(SuiteDefinition::new("Counter", Counter::default));
        let mut instance = Arc::clone(handle.blueprint()).instantiate();
        let err = instance.run_case("missing").await.unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
