//! Test Modules: loading and suite discovery
//!
//! A loaded program unit is a [`RawModule`]: an ordered list of named exports
//! of any type. Discovery keeps the exports that are suite definitions
//! ([`SuiteHandle`]) and silently skips the rest.
//!
//! How a locator turns into a `RawModule` is up to the injected
//! [`ModuleLoader`]. [`ModuleRegistry`] is the in-process loader used by test
//! binaries: locators map to constructor functions compiled into the binary.

use crate::case::Test;
use crate::definition::{SuiteDefinition, SuiteHandle};
use crate::error::{Error, Result};
use crate::signal::Lifecycle;
use crate::suite::Suite;
use futures_util::future::{join_all, BoxFuture};
use std::any::Any;
use std::sync::{Arc, Mutex};

// =============================================================================
// RawModule: what a loader produces
// =============================================================================

type Export = Box<dyn Any + Send + Sync>;

/// Exported members of one loaded program unit, in export order
#[derive(Default)]
pub struct RawModule {
    exports: Vec<(String, Export)>,
}

impl RawModule {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export an arbitrary value under `name`
    pub fn export<V: Any + Send + Sync>(mut self, name: impl Into<String>, value: V) -> Self {
        self.exports.push((name.into(), Box::new(value)));
        self
    }

    /// Export a suite definition under its class name
    pub fn suite<F: Send + 'static>(self, definition: SuiteDefinition<F>) -> Self {
        let handle = SuiteHandle::from(definition);
        let name = handle.class_name().to_string();
        self.export(name, handle)
    }

    /// Exports that are suite definitions, in export order
    pub fn suite_handles(&self) -> Vec<SuiteHandle> {
        self.exports
            .iter()
            .filter_map(|(_, value)| value.downcast_ref::<SuiteHandle>().cloned())
            .collect()
    }
}

// =============================================================================
// Loading
// =============================================================================

/// Turns a locator into a loaded module
pub trait ModuleLoader: Send + Sync {
    fn load<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, anyhow::Result<RawModule>>;
}

type ModuleFactory = Arc<dyn Fn() -> anyhow::Result<RawModule> + Send + Sync>;

/// Loader over modules compiled into the current binary
#[derive(Default, Clone)]
pub struct ModuleRegistry {
    modules: Vec<(String, ModuleFactory)>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a module under `locator`. Re-registering replaces the factory.
    pub fn register(self, locator: impl Into<String>, factory: fn() -> RawModule) -> Self {
        self.register_fallible(locator, move || Ok(factory()))
    }

    /// Register a module whose construction can fail
    pub fn register_fallible<F>(mut self, locator: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<RawModule> + Send + Sync + 'static,
    {
        let locator = locator.into();
        let factory: ModuleFactory = Arc::new(factory);
        match self.modules.iter_mut().find(|(existing, _)| *existing == locator) {
            Some(entry) => entry.1 = factory,
            None => self.modules.push((locator, factory)),
        }
        self
    }

    /// Registered locators in registration order
    pub fn locators(&self) -> Vec<String> {
        self.modules.iter().map(|(locator, _)| locator.clone()).collect()
    }

    /// Locators containing any of `filters`; every locator when `filters` is empty
    pub fn select(&self, filters: &[String]) -> Vec<String> {
        self.modules
            .iter()
            .map(|(locator, _)| locator)
            .filter(|locator| filters.is_empty() || filters.iter().any(|f| locator.contains(f.as_str())))
            .cloned()
            .collect()
    }
}

impl ModuleLoader for ModuleRegistry {
    fn load<'a>(&'a self, locator: &'a str) -> BoxFuture<'a, anyhow::Result<RawModule>> {
        Box::pin(async move {
            let factory = self
                .modules
                .iter()
                .find(|(registered, _)| registered == locator)
                .map(|(_, factory)| Arc::clone(factory))
                .ok_or_else(|| Error::UnknownLocator(locator.to_string()))?;
            factory()
        })
    }
}

// =============================================================================
// TestModule: discovered suites of one module
// =============================================================================

pub struct TestModule {
    path: String,
    suites: Vec<Suite>,
    lifecycle: Mutex<Lifecycle>,
}

impl TestModule {
    /// Discover the suites exported by `raw`
    pub fn new(path: impl Into<String>, raw: &RawModule) -> Self {
        let path = path.into();
        let suites: Vec<Suite> = raw.suite_handles().into_iter().map(Suite::new).collect();
        tracing::debug!(module = %path, suites = suites.len(), "module discovered");
        Self {
            path,
            suites,
            lifecycle: Mutex::new(Lifecycle::new()),
        }
    }

    /// Load `locator` through `loader` and discover its suites
    pub async fn load(locator: &str, loader: &dyn ModuleLoader) -> Result<Self> {
        let raw = loader.load(locator).await.map_err(|source| Error::Load {
            locator: locator.to_string(),
            source,
        })?;
        Ok(Self::new(locator, &raw))
    }

    /// Locator the module was loaded from
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn suites(&self) -> &[Suite] {
        &self.suites
    }

    pub(crate) fn suites_mut(&mut self) -> &mut Vec<Suite> {
        &mut self.suites
    }

    pub fn tests(&self) -> Vec<Arc<Test>> {
        self.suites.iter().flat_map(|suite| suite.tests()).collect()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Start every suite, then wait for all of them.
    ///
    /// Suites are not cancelled when a sibling fails; the first hook failure
    /// is returned once all of them settled.
    pub async fn run(&self) -> Result<()> {
        let lifecycle = {
            let mut current = self.lifecycle.lock().unwrap_or_else(|e| e.into_inner());
            if current.started.is_fired() {
                *current = Lifecycle::new();
            }
            current.clone()
        };

        lifecycle.started.fire();
        let results = join_all(self.suites.iter().map(Suite::run)).await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        lifecycle.completed.fire();
        Ok(())
    }
}

impl std::fmt::Debug for TestModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestModule")
            .field("path", &self.path)
            .field("suites", &self.suites)
            .finish()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::CaseResult;

    #[derive(Default)]
    struct Empty;

    fn ok(_: &mut Empty) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Ok(()) })
    }

    fn two_suites() -> RawModule {
        RawModule::new()
            .suite(SuiteDefinition::new("FirstTest", Empty::default).case("a", ok))
            .export("VERSION", "1.0.0")
            .export("helper", 42_u32)
            .suite(SuiteDefinition::new("SecondTest", Empty::default).case("b", ok))
    }

    #[test]
    fn test_only_suite_exports_are_discovered() {
        let module = TestModule::new("two.rs", &two_suites());
        let names: Vec<&str> = module.suites().iter().map(|s| s.name()).collect();
        assert_eq!(names, vec!["FirstTest", "SecondTest"]);
        assert_eq!(module.tests().len(), 2);
    }

    #[test]
    fn test_empty_module_is_not_an_error() {
        let module = TestModule::new("empty.rs", &RawModule::new().export("x", 1_i32));
        assert!(module.suites().is_empty());
        assert!(module.tests().is_empty());
    }

    #[test]
    fn test_registry_select_and_replace() {
        let registry = ModuleRegistry::new()
            .register("suites/math", two_suites)
            .register("suites/strings", RawModule::new)
            .register("suites/math", RawModule::new);
        assert_eq!(registry.locators(), vec!["suites/math", "suites/strings"]);
        assert_eq!(registry.select(&["str".to_string()]), vec!["suites/strings"]);
        assert_eq!(registry.select(&[]).len(), 2);
    }

    #[tokio::test]
    async fn test_load_unknown_locator_fails() {
        let registry = ModuleRegistry::new();
        let err = TestModule::load("nowhere", &registry).await.unwrap_err();
        assert!(matches!(err, Error::Load { .. }));
        assert!(err.to_string().contains("nowhere"));
    }

    #[tokio::test]
    async fn test_load_propagates_factory_error() {
        let registry =
            ModuleRegistry::new().register_fallible("broken", || Err(anyhow::anyhow!("syntax error")));
        let err = TestModule::load("broken", &registry).await.unwrap_err();
        assert!(err.to_string().contains("syntax error"));
    }

    #[tokio::test]
    async fn test_run_fires_lifecycle() {
        let registry = ModuleRegistry::new().register("two", two_suites);
        let module = TestModule::load("two", &registry).await.unwrap();
        let lifecycle = module.lifecycle();

        module.run().await.unwrap();

        assert!(lifecycle.started.is_fired());
        assert!(lifecycle.completed.is_fired());
        assert!(module.tests().iter().all(|t| t.passed()));
    }
}
