//! Command-line harness
//!
//! A test binary hands its [`ModuleRegistry`] to [`main`], which parses the
//! command line, loads the selected modules and either lists or runs them.
//!
//! Exit codes: 0 when every test passed (or after `list`), 1 when a test
//! failed, 2 when the invocation itself failed (config, loading, hook
//! failure, timeout).

use crate::config::{Action, Cli, OutputFormat, Settings};
use crate::junit::JunitReporter;
use crate::module::ModuleRegistry;
use crate::reporter::{HumanReporter, JsonReporter, MultiReporter, NdjsonReporter};
use crate::runner::{RunSummary, Runner};
use crate::specification::Specification;
use anyhow::{bail, Context};
use clap::Parser;
use std::fmt::Write as _;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Env var holding the diagnostics filter (e.g. `unitium=debug`)
pub const LOG_ENV: &str = "UNITIUM_LOG";

pub const EXIT_INVOCATION_FAILED: u8 = 2;

/// What an invocation did
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Listed { tests: usize },
    Ran(RunSummary),
}

impl Outcome {
    pub fn exit_code(&self) -> u8 {
        match self {
            Outcome::Listed { .. } => 0,
            Outcome::Ran(summary) if summary.success() => 0,
            Outcome::Ran(_) => 1,
        }
    }
}

/// Entry point for test binaries
pub fn main(registry: ModuleRegistry) -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run_cli(&cli, &registry) {
        Ok(outcome) => ExitCode::from(outcome.exit_code()),
        Err(e) => {
            eprintln!("[unitium] FATAL ERROR: {:#}", e);
            ExitCode::from(EXIT_INVOCATION_FAILED)
        }
    }
}

/// Diagnostics go to stderr; stdout stays reserved for machine output
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn run_cli(cli: &Cli, registry: &ModuleRegistry) -> anyhow::Result<Outcome> {
    let root = std::env::current_dir().context("cannot determine working directory")?;
    let settings = Settings::resolve(cli, &root).context("failed to load configuration")?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(execute(&settings, registry))
}

/// Load the modules `settings` selects, then list or run them
pub async fn execute(settings: &Settings, registry: &ModuleRegistry) -> anyhow::Result<Outcome> {
    let locators = registry.select(&settings.filters);
    if locators.is_empty() && !settings.filters.is_empty() {
        bail!("no module matches {:?}", settings.filters);
    }

    let mut spec = Specification::load(&locators, registry).await?;
    tracing::debug!(modules = spec.modules().len(), tests = spec.tests().len(), "modules loaded");

    match settings.action {
        Action::List => {
            print!("{}", render_list(&spec));
            Ok(Outcome::Listed {
                tests: spec.tests().len(),
            })
        }
        Action::Test => {
            let mut runner = Runner::new(build_reporter(settings));
            let summary = match settings.timeout {
                Some(limit) => tokio::time::timeout(limit, runner.run(&mut spec))
                    .await
                    .with_context(|| format!("run timed out after {}s", limit.as_secs()))??,
                None => runner.run(&mut spec).await?,
            };
            Ok(Outcome::Ran(summary))
        }
    }
}

/// Reporters for the configured output
pub fn build_reporter(settings: &Settings) -> MultiReporter {
    let mut reporter = MultiReporter::default();
    if !settings.silent {
        match settings.format {
            OutputFormat::Human => reporter.push(Box::new(HumanReporter)),
            OutputFormat::Json => reporter.push(Box::new(JsonReporter)),
            OutputFormat::Ndjson => reporter.push(Box::new(NdjsonReporter::stdout())),
        }
    }
    // The JUnit file is an artifact, not console output
    if let Some(path) = &settings.junit_xml {
        reporter.push(Box::new(JunitReporter::new(path.clone())));
    }
    reporter
}

/// Discovered tree: modules, suites with their discipline, test names
pub fn render_list(spec: &Specification) -> String {
    let mut out = String::new();
    for module in spec.modules() {
        let _ = writeln!(out, "{}", module.path());
        for suite in module.suites() {
            let discipline = if suite.is_sequential() { "sequential" } else { "parallel" };
            let _ = writeln!(out, "  {} ({})", suite.name(), discipline);
            for test in suite.tests() {
                let marker = if test.is_debug() { " [debug]" } else { "" };
                let _ = writeln!(out, "    {}{}", test.name(), marker);
            }
        }
    }
    out
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn summary(failed: usize) -> RunSummary {
        RunSummary {
            total: 3,
            passed: 3 - failed,
            failed,
            debug: None,
            duration_ms: 5,
        }
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(Outcome::Listed { tests: 0 }.exit_code(), 0);
        assert_eq!(Outcome::Ran(summary(0)).exit_code(), 0);
        assert_eq!(Outcome::Ran(summary(2)).exit_code(), 1);
    }

    #[test]
    fn test_silent_drops_console_reporters() {
        let settings = Settings {
            action: Action::Test,
            format: OutputFormat::Json,
            junit_xml: Some("report.xml".into()),
            silent: true,
            timeout: None,
            filters: vec![],
        };
        assert_eq!(build_reporter(&settings).len(), 1);

        let settings = Settings {
            silent: false,
            junit_xml: None,
            ..settings
        };
        assert_eq!(build_reporter(&settings).len(), 1);
    }

    #[test]
    fn test_render_list_of_empty_spec() {
        assert!(render_list(&Specification::new()).is_empty());
    }
}
