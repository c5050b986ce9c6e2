//! Specification: every module of one run, plus the result tree
//!
//! Flattened views (`suites`, `tests`) are computed on each call, so they
//! always reflect the modules as they are right now. [`Specification::serialize`]
//! only reads, and may be called at any point of a run.

use crate::capture::TestError;
use crate::case::Test;
use crate::error::Result;
use crate::module::{ModuleLoader, TestModule};
use crate::suite::Suite;
use futures_util::future::{join_all, try_join_all};
use serde::Serialize;
use std::sync::Arc;

// =============================================================================
// Result tree
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecificationReport {
    pub modules: Vec<ModuleReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModuleReport {
    pub path: String,
    pub suites: Vec<SuiteReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SuiteReport {
    pub name: String,
    pub tests: Vec<TestReport>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestReport {
    pub name: String,
    pub description: Option<String>,
    pub error: Option<TestError>,
}

// =============================================================================
// Specification
// =============================================================================

#[derive(Debug, Default)]
pub struct Specification {
    modules: Vec<TestModule>,
}

impl Specification {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_modules(modules: Vec<TestModule>) -> Self {
        Self { modules }
    }

    /// Load every locator concurrently; the first loader failure aborts.
    ///
    /// Duplicate locators are loaded once. Modules keep the requested order.
    pub async fn load(locators: &[String], loader: &dyn ModuleLoader) -> Result<Self> {
        let mut unique: Vec<&str> = Vec::with_capacity(locators.len());
        for locator in locators {
            if !unique.contains(&locator.as_str()) {
                unique.push(locator);
            }
        }

        let modules = try_join_all(unique.into_iter().map(|locator| TestModule::load(locator, loader))).await?;
        tracing::debug!(modules = modules.len(), "specification loaded");
        Ok(Self { modules })
    }

    pub fn add_module(&mut self, module: TestModule) {
        self.modules.push(module);
    }

    pub fn modules(&self) -> &[TestModule] {
        &self.modules
    }

    pub(crate) fn modules_mut(&mut self) -> &mut Vec<TestModule> {
        &mut self.modules
    }

    pub fn suites(&self) -> Vec<&Suite> {
        self.modules.iter().flat_map(|module| module.suites()).collect()
    }

    pub fn tests(&self) -> Vec<Arc<Test>> {
        self.modules.iter().flat_map(|module| module.tests()).collect()
    }

    pub fn failed_tests(&self) -> Vec<Arc<Test>> {
        self.tests().into_iter().filter(|t| t.failed()).collect()
    }

    pub fn failed_count(&self) -> usize {
        self.tests().iter().filter(|t| t.failed()).count()
    }

    /// Run every module concurrently and wait for all of them.
    ///
    /// Returns the first hook failure after every module settled.
    pub async fn run(&self) -> Result<()> {
        let results = join_all(self.modules.iter().map(TestModule::run)).await;
        results.into_iter().collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    /// Snapshot of the result tree as currently observed
    pub fn serialize(&self) -> SpecificationReport {
        SpecificationReport {
            modules: self
                .modules
                .iter()
                .map(|module| ModuleReport {
                    path: module.path().to_string(),
                    suites: module
                        .suites()
                        .iter()
                        .map(|suite| SuiteReport {
                            name: suite.name().to_string(),
                            tests: suite
                                .tests()
                                .iter()
                                .map(|test| TestReport {
                                    name: test.name().to_string(),
                                    description: test.description().map(str::to_string),
                                    error: test.error(),
                                })
                                .collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    /// The result tree as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.serialize())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{CaseResult, SuiteDefinition};
    use crate::module::{ModuleRegistry, RawModule};
    use futures_util::future::BoxFuture;

    #[derive(Default)]
    struct Numbers;

    fn adds(_: &mut Numbers) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Ok(()) })
    }

    fn divides(_: &mut Numbers) -> BoxFuture<'_, CaseResult> {
        Box::pin(async { Err(anyhow::anyhow!("division by zero")) })
    }

    fn numbers() -> RawModule {
        RawModule::new().suite(
            SuiteDefinition::new("NumberTests", Numbers::default)
                .case("adds", adds)
                .case("divides", divides)
                .describe("adds", "1 + 1"),
        )
    }

    fn registry() -> ModuleRegistry {
        ModuleRegistry::new()
            .register("numbers", numbers)
            .register("empty", RawModule::new)
    }

    #[tokio::test]
    async fn test_load_dedupes_and_keeps_order() {
        let locators = vec!["empty".to_string(), "numbers".to_string(), "empty".to_string()];
        let spec = Specification::load(&locators, &registry()).await.unwrap();
        let paths: Vec<&str> = spec.modules().iter().map(|m| m.path()).collect();
        assert_eq!(paths, vec!["empty", "numbers"]);
        assert_eq!(spec.suites().len(), 1);
        assert_eq!(spec.tests().len(), 2);
    }

    #[tokio::test]
    async fn test_load_failure_aborts() {
        let locators = vec!["numbers".to_string(), "missing".to_string()];
        assert!(Specification::load(&locators, &registry()).await.is_err());
    }

    #[tokio::test]
    async fn test_serialize_shape_and_idempotence() {
        let spec = Specification::load(&["numbers".to_string()], &registry()).await.unwrap();

        let before = spec.serialize();
        assert!(before.modules[0].suites[0].tests.iter().all(|t| t.error.is_none()));

        spec.run().await.unwrap();
        let first = spec.serialize();
        let second = spec.serialize();
        assert_eq!(first, second);

        let suite = &first.modules[0].suites[0];
        assert_eq!(suite.name, "NumberTests");
        assert_eq!(suite.tests[0].name, "Adds");
        assert_eq!(suite.tests[0].description.as_deref(), Some("1 + 1"));
        assert!(suite.tests[0].error.is_none());
        assert_eq!(suite.tests[1].error.as_ref().unwrap().message, "division by zero");
        assert_eq!(spec.failed_count(), 1);
    }

    #[tokio::test]
    async fn test_json_uses_result_tree_keys() {
        let spec = Specification::load(&["numbers".to_string()], &registry()).await.unwrap();
        spec.run().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&spec.to_json().unwrap()).unwrap();
        assert_eq!(value["modules"][0]["path"], "numbers");
        assert_eq!(value["modules"][0]["suites"][0]["tests"][1]["error"]["name"], "Error");
        assert!(value["modules"][0]["suites"][0]["tests"][0]["error"].is_null());
    }
}
