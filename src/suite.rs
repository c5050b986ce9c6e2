//! Test Suite: execution discipline and hook orchestration
//!
//! ## Disciplines
//!
//! - **Sequential**: one fixture shared by every case, cases in declaration
//!   order, hooks strictly interleaved with cases. Chosen when the definition
//!   is marked sequential or declares any member hook.
//! - **Parallel**: a fresh fixture per case, all cases started together and
//!   joined. Suite-level setup/teardown bracket the whole join.
//!
//! Case failures are data on the tests and never stop siblings or hooks. Hook
//! failures are not caught here: they end the suite run with
//! [`Error::Hook`].

use crate::case::Test;
use crate::definition::{CaseResult, FixtureInstance, SuiteBlueprint, SuiteHandle};
use crate::error::{Error, HookKind, Result};
use crate::signal::Lifecycle;
use futures_util::future::{try_join_all, BoxFuture};
use std::sync::{Arc, Mutex, RwLock};

pub struct Suite {
    handle: SuiteHandle,
    name: String,
    is_sequential: bool,
    has_member_hooks: bool,
    /// Cases this suite runs, in declaration order
    case_names: Vec<String>,
    tests: RwLock<Vec<Arc<Test>>>,
    lifecycle: Mutex<Lifecycle>,
}

impl Suite {
    pub fn new(handle: SuiteHandle) -> Self {
        let blueprint = handle.blueprint();
        let metadata = blueprint.metadata();
        let has_member_hooks = blueprint.has_member_hooks();
        let case_names = blueprint.case_names();

        if let Some(debug_case) = &metadata.debug_case {
            if !case_names.contains(debug_case) {
                tracing::warn!(
                    suite = %blueprint.class_name(),
                    case = %debug_case,
                    "debug marker names an unknown case and is ignored"
                );
            }
        }

        let suite = Self {
            name: blueprint.class_name().to_string(),
            is_sequential: metadata.sequential || has_member_hooks,
            has_member_hooks,
            case_names,
            tests: RwLock::new(Vec::new()),
            lifecycle: Mutex::new(Lifecycle::new()),
            handle,
        };
        *suite.tests.write().unwrap_or_else(|e| e.into_inner()) = suite.build_tests();
        suite
    }

    /// Class name of the definition
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handle(&self) -> &SuiteHandle {
        &self.handle
    }

    pub fn is_sequential(&self) -> bool {
        self.is_sequential
    }

    pub fn has_member_hooks(&self) -> bool {
        self.has_member_hooks
    }

    pub fn case_names(&self) -> &[String] {
        &self.case_names
    }

    /// Tests of the current (or most recent) run
    pub fn tests(&self) -> Vec<Arc<Test>> {
        self.tests.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn passed_tests(&self) -> Vec<Arc<Test>> {
        self.tests().into_iter().filter(|t| t.passed()).collect()
    }

    pub fn failed_tests(&self) -> Vec<Arc<Test>> {
        self.tests().into_iter().filter(|t| t.failed()).collect()
    }

    /// First test carrying the debug marker, if any
    pub fn debug_test(&self) -> Option<Arc<Test>> {
        self.tests().into_iter().find(|t| t.is_debug())
    }

    /// Signals of the current (or upcoming) run
    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Restrict the suite to what a focused run of `case` needs.
    ///
    /// Sequential suites keep every case declared before `case`, since it may
    /// depend on the state they leave on the shared fixture. Parallel suites
    /// keep `case` alone. Unknown names leave the suite untouched.
    pub fn isolate_case(&mut self, case: &str) {
        let Some(position) = self.case_names.iter().position(|name| name == case) else {
            return;
        };
        if self.is_sequential {
            self.case_names.truncate(position + 1);
        } else {
            self.case_names = vec![case.to_string()];
        }
        let tests = self.build_tests();
        *self.tests.get_mut().unwrap_or_else(|e| e.into_inner()) = tests;
    }

    /// Run every case under the suite's discipline
    pub async fn run(&self) -> Result<()> {
        let (lifecycle, tests) = self.begin_run();
        let blueprint = self.handle.blueprint();

        tracing::debug!(
            suite = %self.name,
            sequential = self.is_sequential,
            cases = tests.len(),
            "suite started"
        );
        lifecycle.started.fire();

        if self.is_sequential {
            self.run_sequential(blueprint, &tests).await?;
        } else {
            self.run_parallel(blueprint, &tests).await?;
        }

        tracing::debug!(suite = %self.name, failed = self.failed_tests().len(), "suite completed");
        lifecycle.completed.fire();
        Ok(())
    }

    async fn run_sequential(&self, blueprint: &Arc<dyn SuiteBlueprint>, tests: &[Arc<Test>]) -> Result<()> {
        let mut fixture = Arc::clone(blueprint).instantiate();

        self.invoke_hook(HookKind::Setup, blueprint.suite_setup()).await?;
        self.invoke_hook(HookKind::Setup, fixture.setup()).await?;

        for test in tests {
            self.invoke_hook(HookKind::BeforeEach, fixture.before_each(test)).await?;
            test.run(fixture.as_mut()).await;
            self.invoke_hook(HookKind::AfterEach, fixture.after_each(test)).await?;
        }

        self.invoke_hook(HookKind::Teardown, fixture.teardown()).await?;
        self.invoke_hook(HookKind::Teardown, blueprint.suite_teardown()).await
    }

    async fn run_parallel(&self, blueprint: &Arc<dyn SuiteBlueprint>, tests: &[Arc<Test>]) -> Result<()> {
        self.invoke_hook(HookKind::Setup, blueprint.suite_setup()).await?;

        // `SuiteDefinition` routes member hooks to the sequential path, but a
        // custom blueprint may still hand out per-instance hooks here. A
        // failing one aborts the whole join.
        let runs = tests.iter().map(|test| async move {
            let mut fixture = Arc::clone(blueprint).instantiate();
            self.run_isolated(fixture.as_mut(), test).await
        });
        try_join_all(runs).await?;

        self.invoke_hook(HookKind::Teardown, blueprint.suite_teardown()).await
    }

    async fn run_isolated(&self, fixture: &mut dyn FixtureInstance, test: &Test) -> Result<()> {
        self.invoke_hook(HookKind::Setup, fixture.setup()).await?;
        self.invoke_hook(HookKind::BeforeEach, fixture.before_each(test)).await?;
        test.run(&mut *fixture).await;
        self.invoke_hook(HookKind::AfterEach, fixture.after_each(test)).await?;
        self.invoke_hook(HookKind::Teardown, fixture.teardown()).await
    }

    async fn invoke_hook(&self, hook: HookKind, future: Option<BoxFuture<'_, CaseResult>>) -> Result<()> {
        let Some(future) = future else {
            return Ok(());
        };
        future.await.map_err(|source| Error::Hook {
            suite: self.name.clone(),
            hook,
            source,
        })
    }

    /// Fresh tests for this run; fresh signals if the previous ones already fired
    fn begin_run(&self) -> (Lifecycle, Vec<Arc<Test>>) {
        let tests = self.build_tests();
        *self.tests.write().unwrap_or_else(|e| e.into_inner()) = tests.clone();

        let mut lifecycle = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
        if lifecycle.started.is_fired() {
            *lifecycle = Lifecycle::new();
        }
        (lifecycle.clone(), tests)
    }

    fn build_tests(&self) -> Vec<Arc<Test>> {
        let metadata = self.handle.blueprint().metadata();
        self.case_names
            .iter()
            .map(|case| {
                Arc::new(Test::new(
                    self.name.clone(),
                    case.clone(),
                    metadata.descriptions.get(case).cloned(),
                    metadata.debug_case.as_deref() == Some(case.as_str()),
                ))
            })
            .collect()
    }
}

impl std::fmt::Debug for Suite {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("is_sequential", &self.is_sequential)
            .field("case_names", &self.case_names)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{SuiteDefinition, SuiteMetadata};

    #[derive(Default)]
    struct Ledger {
        entries: Vec<&'static str>,
    }

    fn record(l: &mut Ledger) -> BoxFuture<'_, CaseResult> {
        Box::pin(async move {
            l.entries.push("case");
            Ok(())
        })
    }

    fn expects_empty(l: &mut Ledger) -> BoxFuture<'_, CaseResult> {
        Box::pin(async move {
            anyhow::ensure!(l.entries.is_empty(), "ledger had {} entries", l.entries.len());
            Ok(())
        })
    }

    fn broken_setup(_: &mut Ledger) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Err(anyhow::anyhow!("fixture unavailable")) })
    }

    fn before<'a>(l: &'a mut Ledger, _test: &'a Test) -> BoxFuture<'a, CaseResult> {
        Box::pin(async move {
            l.entries.push("before");
            Ok(())
        })
    }

    /// Blueprint that reports no member hooks yet guards case `b`
    struct Guarded {
        metadata: SuiteMetadata,
    }

    struct GuardedFixture;

    impl SuiteBlueprint for Guarded {
        fn class_name(&self) -> &str {
            "Guarded"
        }

        fn case_names(&self) -> Vec<String> {
            vec!["a".to_string(), "b".to_string()]
        }

        fn metadata(&self) -> &SuiteMetadata {
            &self.metadata
        }

        fn has_member_hooks(&self) -> bool {
            false
        }

        fn suite_setup(&self) -> Option<BoxFuture<'static, CaseResult>> {
            None
        }

        fn suite_teardown(&self) -> Option<BoxFuture<'static, CaseResult>> {
            None
        }

        fn instantiate(self: Arc<Self>) -> Box<dyn FixtureInstance> {
            Box::new(GuardedFixture)
        }
    }

    impl FixtureInstance for GuardedFixture {
        fn run_case<'a>(&'a mut self, _case: &'a str) -> BoxFuture<'a, CaseResult> {
            Box::pin(async { Ok(()) })
        }

        fn setup(&mut self) -> Option<BoxFuture<'_, CaseResult>> {
            None
        }

        fn teardown(&mut self) -> Option<BoxFuture<'_, CaseResult>> {
            None
        }

        fn before_each<'a>(&'a mut self, test: &'a Test) -> Option<BoxFuture<'a, CaseResult>> {
            if test.case_name() != "b" {
                return None;
            }
            let hook: BoxFuture<'a, CaseResult> = Box::pin(async { Err(anyhow::anyhow!("not ready")) });
            Some(hook)
        }

        fn after_each<'a>(&'a mut self, _test: &'a Test) -> Option<BoxFuture<'a, CaseResult>> {
            None
        }
    }

    fn suite(definition: SuiteDefinition<Ledger>) -> Suite {
        Suite::new(SuiteHandle::from(definition))
    }

    #[test]
    fn test_discipline_resolution() {
        let parallel = suite(SuiteDefinition::new("Plain", Ledger::default).case("a", record));
        assert!(!parallel.is_sequential());

        let marked = suite(
            SuiteDefinition::new("Marked", Ledger::default)
                .case("a", record)
                .sequential(),
        );
        assert!(marked.is_sequential());
        assert!(!marked.has_member_hooks());

        let hooked = suite(
            SuiteDefinition::new("Hooked", Ledger::default)
                .case("a", record)
                .on_before_each(before),
        );
        assert!(hooked.is_sequential());
        assert!(hooked.has_member_hooks());
    }

    #[test]
    fn test_isolate_case_sequential_keeps_predecessors() {
        let mut s = suite(
            SuiteDefinition::new("Seq", Ledger::default)
                .case("first", record)
                .case("second", record)
                .case("third", record)
                .sequential(),
        );
        s.isolate_case("second");
        assert_eq!(s.case_names(), ["first", "second"]);
        assert_eq!(s.tests().len(), 2);
    }

    #[test]
    fn test_isolate_case_parallel_keeps_only_target() {
        let mut s = suite(
            SuiteDefinition::new("Par", Ledger::default)
                .case("first", record)
                .case("second", record)
                .case("third", record),
        );
        s.isolate_case("second");
        assert_eq!(s.case_names(), ["second"]);

        s.isolate_case("missing");
        assert_eq!(s.case_names(), ["second"]);
    }

    #[test]
    fn test_debug_flag_on_tests() {
        let s = suite(
            SuiteDefinition::new("Par", Ledger::default)
                .case("first", record)
                .case("second", record)
                .debug("second"),
        );
        let debug = s.debug_test().unwrap();
        assert_eq!(debug.case_name(), "second");
        assert_eq!(s.tests().iter().filter(|t| t.is_debug()).count(), 1);
    }

    #[tokio::test]
    async fn test_parallel_cases_get_fresh_fixtures() {
        let s = suite(
            SuiteDefinition::new("Par", Ledger::default)
                .case("record", record)
                .case("expects_empty", expects_empty),
        );
        s.run().await.unwrap();
        assert_eq!(s.passed_tests().len(), 2);
    }

    #[tokio::test]
    async fn test_sequential_cases_share_fixture() {
        let s = suite(
            SuiteDefinition::new("Seq", Ledger::default)
                .case("record", record)
                .case("expects_empty", expects_empty)
                .sequential(),
        );
        s.run().await.unwrap();
        let failed = s.failed_tests();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].case_name(), "expects_empty");
    }

    #[tokio::test]
    async fn test_hook_failure_propagates() {
        let s = suite(
            SuiteDefinition::new("Broken", Ledger::default)
                .case("record", record)
                .on_member_setup(broken_setup),
        );
        let err = s.run().await.unwrap_err();
        assert!(matches!(err, Error::Hook { hook: HookKind::Setup, .. }));
        assert!(!s.lifecycle().completed.is_fired());
        assert!(!s.tests()[0].is_completed());
    }

    #[tokio::test]
    async fn test_rerun_builds_fresh_tests() {
        let s = suite(SuiteDefinition::new("Par", Ledger::default).case("record", record));
        s.run().await.unwrap();
        let first = s.tests();
        let first_lifecycle = s.lifecycle();

        s.run().await.unwrap();
        let second = s.tests();
        assert!(!Arc::ptr_eq(&first[0], &second[0]));
        assert!(second[0].passed());
        assert!(first_lifecycle.completed.is_fired());
        assert!(s.lifecycle().completed.is_fired());
    }

    #[tokio::test]
    async fn test_parallel_instance_hook_failure_aborts_join() {
        let s = Suite::new(SuiteHandle::new(Guarded {
            metadata: SuiteMetadata::default(),
        }));
        assert!(!s.is_sequential());

        let err = s.run().await.unwrap_err();
        assert!(matches!(err, Error::Hook { hook: HookKind::BeforeEach, .. }));
        assert!(err.to_string().contains("not ready"));
        assert!(!s.lifecycle().completed.is_fired());
    }
}
