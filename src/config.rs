//! Configuration Loader
//! - Provides CLI argument parsing with clap
//! - Reads `unitium.toml` for run defaults and environment variables
//!
//! Precedence: command line (and its env vars) over the file, file over the
//! built-in defaults.

use crate::error::{Error, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "unitium.toml";

// =============================================================================
// CLI Configuration
// =============================================================================

/// Output format for unitium results
#[derive(ValueEnum, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable CLI output (to stderr)
    #[default]
    Human,
    /// Result tree as one JSON document (to stdout)
    Json,
    /// One JSON event per line (to stdout)
    Ndjson,
}

/// Unitium CLI - async unit-test runner
#[derive(Parser, Debug)]
#[command(name = "unitium", version, about = "Async unit-test runner")]
#[command(subcommand_precedence_over_arg = true)]
pub struct Cli {
    /// Output format (also: UNITIUM_FORMAT env var)
    #[arg(long, value_enum, env = "UNITIUM_FORMAT")]
    pub format: Option<OutputFormat>,

    /// Path to generate JUnit XML report (also: UNITIUM_JUNIT_XML env var)
    #[arg(long, env = "UNITIUM_JUNIT_XML")]
    pub junit_xml: Option<PathBuf>,

    /// Run without any reporter output
    #[arg(long, short = 's')]
    pub silent: bool,

    /// Abort the run after this many seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Config file (default: ./unitium.toml when present)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only load modules whose locator contains one of these
    pub filters: Vec<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Subcommands
#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Run tests (default if no subcommand)
    Test {
        /// Only load modules whose locator contains one of these
        filters: Vec<String>,
    },
    /// List discovered tests without running
    List {
        /// Only load modules whose locator contains one of these
        filters: Vec<String>,
    },
}

/// What an invocation does once the modules are loaded
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Action {
    #[default]
    Test,
    List,
}

// =============================================================================
// unitium.toml
// =============================================================================

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub run: RunSection,
    /// Variables set on the process before any module is loaded
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

#[derive(Deserialize, Default, Debug)]
#[serde(deny_unknown_fields)]
pub struct RunSection {
    pub format: Option<OutputFormat>,
    pub junit_xml: Option<PathBuf>,
    pub timeout_secs: Option<u64>,
    pub silent: Option<bool>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents).map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Apply the `[env]` table to the current process.
    ///
    /// Must run before modules are loaded so their factories see the values.
    pub fn apply_env(&self) {
        for (key, value) in &self.env {
            std::env::set_var(key, value);
            tracing::debug!(key = %key, value = %value, "set env from config");
        }
    }
}

// =============================================================================
// Resolved settings
// =============================================================================

/// Effective settings of one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub action: Action,
    pub format: OutputFormat,
    pub junit_xml: Option<PathBuf>,
    pub silent: bool,
    pub timeout: Option<Duration>,
    pub filters: Vec<String>,
}

impl Settings {
    /// Merge `cli` over `file`
    ///
    /// Filters given before and after the subcommand are combined.
    pub fn merge(cli: &Cli, file: &FileConfig) -> Self {
        let mut filters = cli.filters.clone();
        let action = match &cli.command {
            None => Action::Test,
            Some(Commands::Test { filters: extra }) => {
                filters.extend(extra.iter().cloned());
                Action::Test
            }
            Some(Commands::List { filters: extra }) => {
                filters.extend(extra.iter().cloned());
                Action::List
            }
        };
        Self {
            action,
            format: cli.format.or(file.run.format).unwrap_or_default(),
            junit_xml: cli.junit_xml.clone().or_else(|| file.run.junit_xml.clone()),
            silent: cli.silent || file.run.silent.unwrap_or(false),
            timeout: cli.timeout.or(file.run.timeout_secs).map(Duration::from_secs),
            filters,
        }
    }

    /// Read the config file `cli` points to (or the default one), apply its
    /// `[env]` table and merge.
    ///
    /// An explicit `--config` that does not exist is an error; a missing
    /// default file is not.
    pub fn resolve(cli: &Cli, root: &Path) -> Result<Self> {
        let file = match &cli.config {
            Some(path) => FileConfig::load(path)?,
            None => {
                let path = root.join(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    FileConfig::load(&path)?
                } else {
                    FileConfig::default()
                }
            }
        };
        file.apply_env();
        Ok(Self::merge(cli, &file))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
